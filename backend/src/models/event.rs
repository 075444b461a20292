//! Audit journal for ledger replay and reconciliation
//!
//! Every state change in the canonical ledger appends a tagged [`Event`].
//! The journal enables:
//! - Replay: installment state is derived by re-applying validated events
//!   in order, never by blind field overwrite
//! - Reconciliation: field supervisors audit what happened per loan and day
//! - Debugging: the exact mutation order is preserved
//!
//! Events carry everything replay needs: `LoanRegistered` includes the full
//! terms so the schedule can be regenerated deterministically, and
//! `PaymentApplied` records its per-installment allocations rather than the
//! raw request.

use crate::models::loan::LoanTerms;
use crate::models::payment::{Allocation, PaymentMethod};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Ledger event capturing one state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Loan registered in PENDING_APPROVAL; terms are replay-sufficient
    LoanRegistered {
        loan_id: String,
        client_ref: String,
        terms: LoanTerms,
        total_due: i64,
    },

    /// Approval workflow activated the loan; schedule is now immutable
    LoanApproved { loan_id: String, on: NaiveDate },

    /// Loan withdrawn before approval
    LoanCancelled { loan_id: String, on: NaiveDate },

    /// A payment was applied; allocations list every touched installment
    PaymentApplied {
        loan_id: String,
        payment_id: String,
        client_local_id: String,
        method: PaymentMethod,
        allocations: Vec<Allocation>,
        recorded_at: DateTime<Utc>,
        on: NaiveDate,
    },

    /// An installment's due date moved inside the slack window
    InstallmentRescheduled {
        loan_id: String,
        sequence: u32,
        from: NaiveDate,
        to: NaiveDate,
        reason: String,
        partial_amount: Option<i64>,
        on: NaiveDate,
    },

    /// An unpaid installment passed its due date
    InstallmentOverdue {
        loan_id: String,
        sequence: u32,
        since: NaiveDate,
    },

    /// Every installment is PAID; loan settled
    LoanPaidOff { loan_id: String, on: NaiveDate },

    /// Collection policy flagged the loan; balance stays collectible
    LoanDefaulted { loan_id: String, on: NaiveDate },

    /// Manual risk override toggled
    BlacklistChanged {
        loan_id: String,
        flagged: bool,
        on: NaiveDate,
    },

    /// Free-form annotation recorded against the loan
    NoteRecorded {
        loan_id: String,
        note: String,
        on: NaiveDate,
    },
}

impl Event {
    /// Loan this event belongs to
    pub fn loan_id(&self) -> &str {
        match self {
            Event::LoanRegistered { loan_id, .. } => loan_id,
            Event::LoanApproved { loan_id, .. } => loan_id,
            Event::LoanCancelled { loan_id, .. } => loan_id,
            Event::PaymentApplied { loan_id, .. } => loan_id,
            Event::InstallmentRescheduled { loan_id, .. } => loan_id,
            Event::InstallmentOverdue { loan_id, .. } => loan_id,
            Event::LoanPaidOff { loan_id, .. } => loan_id,
            Event::LoanDefaulted { loan_id, .. } => loan_id,
            Event::BlacklistChanged { loan_id, .. } => loan_id,
            Event::NoteRecorded { loan_id, .. } => loan_id,
        }
    }

    /// Short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::LoanRegistered { .. } => "LoanRegistered",
            Event::LoanApproved { .. } => "LoanApproved",
            Event::LoanCancelled { .. } => "LoanCancelled",
            Event::PaymentApplied { .. } => "PaymentApplied",
            Event::InstallmentRescheduled { .. } => "InstallmentRescheduled",
            Event::InstallmentOverdue { .. } => "InstallmentOverdue",
            Event::LoanPaidOff { .. } => "LoanPaidOff",
            Event::LoanDefaulted { .. } => "LoanDefaulted",
            Event::BlacklistChanged { .. } => "BlacklistChanged",
            Event::NoteRecorded { .. } => "NoteRecorded",
        }
    }
}

/// Append-only event journal with query helpers
///
/// Insertion order is the canonical application order: mutations are
/// serialized per ledger, so replaying the journal front to back
/// reproduces installment state exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Restore a journal from checkpointed events
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// All events for one loan, in application order
    pub fn events_for_loan(&self, loan_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.loan_id() == loan_id)
            .collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }
}
