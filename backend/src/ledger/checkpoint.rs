//! Checkpoint - Save/Load Ledger State
//!
//! Serializes the complete ledger (loans, schedules, audit journal,
//! idempotency memo) for durable storage, and restores it with integrity
//! checks. The journal is part of the snapshot, so a restored ledger can
//! also be rebuilt by replaying events from an empty state: installment
//! state is derived, never blindly overwritten.
//!
//! # Critical Invariants
//!
//! - **Integrity**: the snapshot carries a SHA-256 over its canonical JSON;
//!   a tampered snapshot fails restoration
//! - **Dense sequences**: every schedule is 1..=N with strictly increasing
//!   original due dates
//! - **Bounded payment**: amount_paid ≤ amount_due everywhere
//! - **Replay identity**: replaying the journal reproduces the snapshot's
//!   loan and installment state exactly

use crate::ledger::service::LedgerService;
use crate::models::event::{Event, EventLog};
use crate::models::installment::{Installment, InstallmentStatus};
use crate::models::loan::{Loan, LoanStatus, LoanTerms};
use crate::models::requests::SubmissionResponse;
use crate::models::LedgerState;
use crate::schedule::generate_schedule;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Errors during checkpoint save/load/replay
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("integrity hash mismatch: snapshot carries {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    #[error("snapshot validation failed: {0}")]
    Validation(String),

    #[error("journal replay failed: {0}")]
    Replay(String),
}

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete ledger snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// All loans with their schedules
    pub loans: Vec<LoanSnapshot>,

    /// The full audit journal, in application order
    pub events: Vec<Event>,

    /// Idempotency memo (client_local_id → response), sorted by key
    pub applied: Vec<(String, SubmissionResponse)>,

    /// SHA-256 over the canonical JSON of (loans, events, applied)
    pub state_hash: String,
}

/// Loan state snapshot, schedule included
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSnapshot {
    pub id: String,
    pub client_ref: String,
    pub terms: LoanTerms,
    pub status: LoanStatus,
    pub version: u64,
    pub blacklisted: bool,
    pub installments: Vec<InstallmentSnapshot>,
}

/// Installment state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentSnapshot {
    pub sequence: u32,
    pub due_date: chrono::NaiveDate,
    pub original_due_date: chrono::NaiveDate,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub status: InstallmentStatus,
}

impl From<&Installment> for InstallmentSnapshot {
    fn from(installment: &Installment) -> Self {
        InstallmentSnapshot {
            sequence: installment.sequence(),
            due_date: installment.due_date(),
            original_due_date: installment.original_due_date(),
            amount_due: installment.amount_due(),
            amount_paid: installment.amount_paid(),
            status: installment.status().clone(),
        }
    }
}

impl From<InstallmentSnapshot> for Installment {
    fn from(snapshot: InstallmentSnapshot) -> Self {
        Installment::from_snapshot(
            snapshot.sequence,
            snapshot.due_date,
            snapshot.original_due_date,
            snapshot.amount_due,
            snapshot.amount_paid,
            snapshot.status,
        )
    }
}

impl LedgerSnapshot {
    /// Capture the current ledger state
    pub fn capture(service: &LedgerService) -> Result<Self, CheckpointError> {
        let state = service.state();
        let loans: Vec<LoanSnapshot> = state
            .loans()
            .values()
            .map(|loan| LoanSnapshot {
                id: loan.id().to_string(),
                client_ref: loan.client_ref().to_string(),
                terms: loan.terms().clone(),
                status: loan.status().clone(),
                version: loan.version(),
                blacklisted: loan.is_blacklisted(),
                installments: state
                    .schedule(loan.id())
                    .unwrap_or(&[])
                    .iter()
                    .map(InstallmentSnapshot::from)
                    .collect(),
            })
            .collect();

        let events = service.event_log().events().to_vec();

        let mut applied: Vec<(String, SubmissionResponse)> = service
            .applied()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        applied.sort_by(|a, b| a.0.cmp(&b.0));

        let state_hash = compute_state_hash(&(&loans, &events, &applied))?;
        Ok(LedgerSnapshot {
            loans,
            events,
            applied,
            state_hash,
        })
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string(self).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        serde_json::from_str(json).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }
}

// ============================================================================
// State Hashing
// ============================================================================

/// Compute a deterministic SHA-256 hash of any serializable value
///
/// Uses canonical JSON with recursively sorted object keys so the hash is
/// independent of map iteration order.
pub fn compute_state_hash<T: Serialize>(value: &T) -> Result<String, CheckpointError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(value)
        .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation and Restore
// ============================================================================

/// Validate snapshot invariants before restoring
pub fn validate_snapshot(snapshot: &LedgerSnapshot) -> Result<(), CheckpointError> {
    for loan in &snapshot.loans {
        if loan.version == 0 {
            return Err(CheckpointError::Validation(format!(
                "loan {} has version 0",
                loan.id
            )));
        }

        let mut prev_original_due = None;
        for (idx, installment) in loan.installments.iter().enumerate() {
            // Dense 1..=N sequence
            if installment.sequence != idx as u32 + 1 {
                return Err(CheckpointError::Validation(format!(
                    "loan {} schedule not dense at position {} (sequence {})",
                    loan.id, idx, installment.sequence
                )));
            }
            // Strictly increasing original due dates (current due dates may
            // legitimately cross after a reschedule)
            if let Some(prev) = prev_original_due {
                if installment.original_due_date <= prev {
                    return Err(CheckpointError::Validation(format!(
                        "loan {} original due dates not increasing at sequence {}",
                        loan.id, installment.sequence
                    )));
                }
            }
            prev_original_due = Some(installment.original_due_date);

            if installment.amount_paid < 0 || installment.amount_paid > installment.amount_due {
                return Err(CheckpointError::Validation(format!(
                    "loan {} sequence {} pays {} against due {}",
                    loan.id, installment.sequence, installment.amount_paid, installment.amount_due
                )));
            }
        }
    }
    Ok(())
}

/// Restore a ledger service from a snapshot
///
/// Verifies the integrity hash, validates invariants, then rebuilds state.
pub fn restore_snapshot(snapshot: &LedgerSnapshot) -> Result<LedgerService, CheckpointError> {
    let computed =
        compute_state_hash(&(&snapshot.loans, &snapshot.events, &snapshot.applied))?;
    if computed != snapshot.state_hash {
        return Err(CheckpointError::HashMismatch {
            expected: snapshot.state_hash.clone(),
            computed,
        });
    }
    validate_snapshot(snapshot)?;

    let mut state = LedgerState::new();
    for loan_snapshot in &snapshot.loans {
        let loan = Loan::from_snapshot(
            loan_snapshot.id.clone(),
            loan_snapshot.client_ref.clone(),
            loan_snapshot.terms.clone(),
            loan_snapshot.status.clone(),
            loan_snapshot.version,
            loan_snapshot.blacklisted,
        );
        let schedule = loan_snapshot
            .installments
            .iter()
            .cloned()
            .map(Installment::from)
            .collect();
        state.add_loan(loan, schedule);
    }

    let event_log = EventLog::from_events(snapshot.events.clone());
    let applied: HashMap<String, SubmissionResponse> =
        snapshot.applied.iter().cloned().collect();

    Ok(LedgerService::from_parts(state, event_log, applied))
}

// ============================================================================
// Journal Replay
// ============================================================================

/// Rebuild ledger state by replaying the audit journal from empty
///
/// The journal's insertion order is the canonical application order;
/// replaying it front to back reproduces loan and installment state
/// exactly, including versions.
pub fn replay_journal(events: &[Event]) -> Result<LedgerState, CheckpointError> {
    let mut state = LedgerState::new();

    for event in events {
        match event {
            Event::LoanRegistered {
                loan_id,
                client_ref,
                terms,
                total_due,
            } => {
                let schedule = generate_schedule(terms)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                if schedule.total_due != *total_due {
                    return Err(CheckpointError::Replay(format!(
                        "loan {} regenerated total {} does not match journal {}",
                        loan_id, schedule.total_due, total_due
                    )));
                }
                state.add_loan(
                    Loan::with_id(loan_id.clone(), client_ref.clone(), terms.clone()),
                    schedule.installments,
                );
            }

            Event::LoanApproved { loan_id, on } => {
                let loan = replay_loan(&mut state, loan_id)?;
                loan.approve(*on)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                loan.bump_version();
            }

            Event::LoanCancelled { loan_id, on } => {
                let loan = replay_loan(&mut state, loan_id)?;
                loan.cancel(*on)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                loan.bump_version();
            }

            Event::PaymentApplied {
                loan_id,
                allocations,
                on,
                ..
            } => {
                let schedule = state.schedule_mut(loan_id).ok_or_else(|| {
                    CheckpointError::Replay(format!("payment for unknown loan {}", loan_id))
                })?;
                for allocation in allocations {
                    let installment = schedule
                        .iter_mut()
                        .find(|i| i.sequence() == allocation.sequence)
                        .ok_or_else(|| {
                            CheckpointError::Replay(format!(
                                "allocation to unknown installment {} on loan {}",
                                allocation.sequence, loan_id
                            ))
                        })?;
                    installment
                        .record_payment(allocation.amount, *on)
                        .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                }
                replay_loan(&mut state, loan_id)?.bump_version();
            }

            Event::InstallmentRescheduled {
                loan_id,
                sequence,
                to,
                partial_amount,
                on,
                ..
            } => {
                let schedule = state.schedule_mut(loan_id).ok_or_else(|| {
                    CheckpointError::Replay(format!("reschedule for unknown loan {}", loan_id))
                })?;
                let installment = schedule
                    .iter_mut()
                    .find(|i| i.sequence() == *sequence)
                    .ok_or_else(|| {
                        CheckpointError::Replay(format!(
                            "reschedule of unknown installment {} on loan {}",
                            sequence, loan_id
                        ))
                    })?;
                installment
                    .reschedule(*to)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                if let Some(partial) = partial_amount {
                    installment
                        .record_payment(*partial, *on)
                        .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                }
                replay_loan(&mut state, loan_id)?.bump_version();
            }

            Event::InstallmentOverdue {
                loan_id,
                sequence,
                since,
            } => {
                let schedule = state.schedule_mut(loan_id).ok_or_else(|| {
                    CheckpointError::Replay(format!("overdue mark for unknown loan {}", loan_id))
                })?;
                let installment = schedule
                    .iter_mut()
                    .find(|i| i.sequence() == *sequence)
                    .ok_or_else(|| {
                        CheckpointError::Replay(format!(
                            "overdue mark on unknown installment {} of loan {}",
                            sequence, loan_id
                        ))
                    })?;
                installment
                    .mark_overdue(*since)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                // Maintenance event: no version bump
            }

            Event::LoanPaidOff { loan_id, on } => {
                // Settlement belongs to the payment mutation that caused it
                replay_loan(&mut state, loan_id)?
                    .mark_paid(*on)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
            }

            Event::LoanDefaulted { loan_id, on } => {
                let loan = replay_loan(&mut state, loan_id)?;
                loan.mark_defaulted(*on)
                    .map_err(|e| CheckpointError::Replay(e.to_string()))?;
                loan.bump_version();
            }

            Event::BlacklistChanged {
                loan_id, flagged, ..
            } => {
                let loan = replay_loan(&mut state, loan_id)?;
                loan.set_blacklisted(*flagged);
                loan.bump_version();
            }

            Event::NoteRecorded { loan_id, .. } => {
                replay_loan(&mut state, loan_id)?.bump_version();
            }
        }
    }

    Ok(state)
}

fn replay_loan<'a>(
    state: &'a mut LedgerState,
    loan_id: &str,
) -> Result<&'a mut Loan, CheckpointError> {
    state
        .loan_mut(loan_id)
        .ok_or_else(|| CheckpointError::Replay(format!("event for unknown loan {}", loan_id)))
}
