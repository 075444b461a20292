//! Ledger Service
//!
//! The sole owner of canonical ledger state. Every mutation enters through
//! `&mut self` methods, so application is serialized per ledger instance:
//! one in-flight mutation at a time, which is exactly the per-loan
//! serialization the sync protocol relies on.
//!
//! # Submission protocol
//!
//! Devices talk to the ledger through [`LedgerService::submit`]:
//!
//! 1. **Idempotency**: a `client_local_id` already applied returns its
//!    memoized response unchanged: replaying a payment is a no-op
//! 2. **Optimistic concurrency**: `assumed_version` must match the loan's
//!    current version exactly, otherwise the answer is CONFLICT and nothing
//!    is applied
//! 3. **Application**: the mutation dispatches to the payment recorder,
//!    reschedule engine, or schedule generator; success bumps the loan
//!    version by exactly one and appends audit events
//!
//! Validation and state errors become REJECTED responses: terminal,
//! deterministic, never retried.

use crate::ledger::payments::{apply_payment, PaymentOutcome};
use crate::ledger::reschedule::apply_reschedule;
use crate::ledger::LedgerError;
use crate::models::event::{Event, EventLog};
use crate::models::loan::{Loan, LoanTerms};
use crate::models::payment::PaymentEvent;
use crate::models::requests::{
    MutationPayload, NewLoanRequest, PaymentRequest, RescheduleRequest, SubmissionRequest,
    SubmissionResponse,
};
use crate::models::{LedgerState, ValidationError};
use crate::risk::{classify, RiskTier};
use crate::schedule::generate_schedule;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Canonical loan ledger with serialized mutation and audit journal
#[derive(Debug, Default)]
pub struct LedgerService {
    /// Loans and schedules
    state: LedgerState,

    /// Append-only audit journal (replay source of truth)
    event_log: EventLog,

    /// Memoized responses per client_local_id (exactly-once application)
    applied: HashMap<String, SubmissionResponse>,
}

impl LedgerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a service from checkpointed parts
    pub(crate) fn from_parts(
        state: LedgerState,
        event_log: EventLog,
        applied: HashMap<String, SubmissionResponse>,
    ) -> Self {
        Self {
            state,
            event_log,
            applied,
        }
    }

    // ========================================================================
    // Submission protocol (device-facing)
    // ========================================================================

    /// Process one submission; never fails, every outcome is a response
    ///
    /// `today` is the ledger's business date for this submission.
    pub fn submit(&mut self, request: &SubmissionRequest, today: NaiveDate) -> SubmissionResponse {
        // Exactly-once: a replayed key returns the prior outcome unchanged
        if let Some(previous) = self.applied.get(&request.client_local_id) {
            return previous.clone();
        }

        let response = match &request.payload {
            MutationPayload::NewLoan(new_loan) => self.submit_new_loan(new_loan),
            MutationPayload::Payment(payment) => self.submit_payment(request, payment, today),
            MutationPayload::Reschedule(reschedule) => {
                self.submit_reschedule(request, reschedule, today)
            }
            MutationPayload::Metadata(note) => self.submit_note(request, &note.note, today),
        };

        // Memoize only applied mutations; rejections and conflicts are
        // recomputed (and may succeed later under a rebased version)
        if matches!(
            response.status,
            crate::models::requests::SubmissionStatus::Accepted
        ) {
            self.applied
                .insert(request.client_local_id.clone(), response.clone());
        }
        response
    }

    fn submit_new_loan(&mut self, request: &NewLoanRequest) -> SubmissionResponse {
        match self.register_loan_with_id(
            request.loan_id.clone(),
            request.client_ref.clone(),
            request.terms.clone(),
        ) {
            Ok(version) => SubmissionResponse::accepted(version),
            Err(err) => SubmissionResponse::rejected(0, err.to_string()),
        }
    }

    fn submit_payment(
        &mut self,
        request: &SubmissionRequest,
        payment: &PaymentRequest,
        today: NaiveDate,
    ) -> SubmissionResponse {
        let loan_id = match self.resolve_target(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        if let Some(conflict) = self.version_conflict(&loan_id, request.assumed_version) {
            return conflict;
        }

        let event = PaymentEvent::new(
            loan_id.clone(),
            payment.target.clone(),
            payment.amount,
            payment.method,
            payment.recorded_at,
            request.client_local_id.clone(),
        );
        match apply_payment(&mut self.state, &event, today) {
            Ok(outcome) => {
                let version = self.finish_payment(&loan_id, &event, &outcome, today);
                SubmissionResponse::accepted(version)
            }
            Err(err) => self.reject(&loan_id, err),
        }
    }

    fn submit_reschedule(
        &mut self,
        request: &SubmissionRequest,
        reschedule: &RescheduleRequest,
        today: NaiveDate,
    ) -> SubmissionResponse {
        let loan_id = match self.resolve_target(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        if let Some(conflict) = self.version_conflict(&loan_id, request.assumed_version) {
            return conflict;
        }

        match apply_reschedule(&mut self.state, &loan_id, reschedule, today) {
            Ok(outcome) => {
                self.event_log.log(Event::InstallmentRescheduled {
                    loan_id: loan_id.clone(),
                    sequence: outcome.sequence,
                    from: outcome.previous_due,
                    to: outcome.new_due,
                    reason: reschedule.reason.clone(),
                    partial_amount: outcome.partial_amount,
                    on: today,
                });
                if outcome.loan_paid_off {
                    self.event_log.log(Event::LoanPaidOff {
                        loan_id: loan_id.clone(),
                        on: today,
                    });
                }
                let version = self.bump(&loan_id);
                SubmissionResponse::accepted(version)
            }
            Err(err) => self.reject(&loan_id, err),
        }
    }

    fn submit_note(
        &mut self,
        request: &SubmissionRequest,
        note: &str,
        today: NaiveDate,
    ) -> SubmissionResponse {
        let loan_id = match self.resolve_target(request) {
            Ok(id) => id,
            Err(response) => return response,
        };
        if let Some(conflict) = self.version_conflict(&loan_id, request.assumed_version) {
            return conflict;
        }

        self.event_log.log(Event::NoteRecorded {
            loan_id: loan_id.clone(),
            note: note.to_string(),
            on: today,
        });
        SubmissionResponse::accepted(self.bump(&loan_id))
    }

    /// Resolve the loan a submission addresses, or produce the rejection
    fn resolve_target(&self, request: &SubmissionRequest) -> Result<String, SubmissionResponse> {
        match &request.loan_id {
            Some(id) if self.state.loan(id).is_some() => Ok(id.clone()),
            Some(id) => Err(SubmissionResponse::rejected(
                0,
                ValidationError::UnknownLoan(id.clone()).to_string(),
            )),
            None => Err(SubmissionResponse::rejected(
                0,
                "submission carries no loan id".to_string(),
            )),
        }
    }

    /// CONFLICT response when the assumed version does not match
    fn version_conflict(&self, loan_id: &str, assumed: u64) -> Option<SubmissionResponse> {
        let current = self.state.loan(loan_id).map(Loan::version).unwrap_or(0);
        if assumed != current {
            Some(SubmissionResponse::conflict(
                current,
                format!(
                    "loan {} is at version {}, submission assumed {}",
                    loan_id, current, assumed
                ),
            ))
        } else {
            None
        }
    }

    fn reject(&self, loan_id: &str, err: LedgerError) -> SubmissionResponse {
        let version = self.state.loan(loan_id).map(Loan::version).unwrap_or(0);
        SubmissionResponse::rejected(version, err.to_string())
    }

    fn finish_payment(
        &mut self,
        loan_id: &str,
        event: &PaymentEvent,
        outcome: &PaymentOutcome,
        today: NaiveDate,
    ) -> u64 {
        self.event_log.log(Event::PaymentApplied {
            loan_id: loan_id.to_string(),
            payment_id: event.id.clone(),
            client_local_id: event.client_local_id.clone(),
            method: event.method,
            allocations: outcome.allocations.clone(),
            recorded_at: event.recorded_at,
            on: today,
        });
        if outcome.loan_paid_off {
            self.event_log.log(Event::LoanPaidOff {
                loan_id: loan_id.to_string(),
                on: today,
            });
        }
        self.bump(loan_id)
    }

    fn bump(&mut self, loan_id: &str) -> u64 {
        self.state
            .loan_mut(loan_id)
            .expect("loan exists for applied mutation")
            .bump_version()
    }

    // ========================================================================
    // Direct operations (canonical-side collaborators)
    // ========================================================================

    /// Register a loan with a fresh server-assigned id
    pub fn register_loan(
        &mut self,
        client_ref: String,
        terms: LoanTerms,
    ) -> Result<String, LedgerError> {
        let loan = Loan::new(client_ref, terms);
        let id = loan.id().to_string();
        self.commit_registration(loan)?;
        Ok(id)
    }

    /// Register a loan under a device-assigned id; returns the version (1)
    pub fn register_loan_with_id(
        &mut self,
        loan_id: String,
        client_ref: String,
        terms: LoanTerms,
    ) -> Result<u64, LedgerError> {
        if self.state.loan(&loan_id).is_some() {
            return Err(ValidationError::DuplicateLoan(loan_id).into());
        }
        let loan = Loan::with_id(loan_id, client_ref, terms);
        self.commit_registration(loan)
    }

    fn commit_registration(&mut self, loan: Loan) -> Result<u64, LedgerError> {
        // Generating the schedule is the terms validation
        let schedule = generate_schedule(loan.terms())?;
        let version = loan.version();
        self.event_log.log(Event::LoanRegistered {
            loan_id: loan.id().to_string(),
            client_ref: loan.client_ref().to_string(),
            terms: loan.terms().clone(),
            total_due: schedule.total_due,
        });
        self.state.add_loan(loan, schedule.installments);
        Ok(version)
    }

    /// Approval workflow: PENDING_APPROVAL → ACTIVE, schedule committed
    pub fn approve(&mut self, loan_id: &str, on: NaiveDate) -> Result<u64, LedgerError> {
        let loan = self
            .state
            .loan_mut(loan_id)
            .ok_or_else(|| ValidationError::UnknownLoan(loan_id.to_string()))?;
        loan.approve(on)?;
        self.event_log.log(Event::LoanApproved {
            loan_id: loan_id.to_string(),
            on,
        });
        Ok(self.bump(loan_id))
    }

    /// Withdraw a loan before approval
    pub fn cancel(&mut self, loan_id: &str, on: NaiveDate) -> Result<u64, LedgerError> {
        let loan = self
            .state
            .loan_mut(loan_id)
            .ok_or_else(|| ValidationError::UnknownLoan(loan_id.to_string()))?;
        loan.cancel(on)?;
        self.event_log.log(Event::LoanCancelled {
            loan_id: loan_id.to_string(),
            on,
        });
        Ok(self.bump(loan_id))
    }

    /// Collection policy flags the loan; balance stays collectible
    pub fn flag_defaulted(&mut self, loan_id: &str, on: NaiveDate) -> Result<u64, LedgerError> {
        let loan = self
            .state
            .loan_mut(loan_id)
            .ok_or_else(|| ValidationError::UnknownLoan(loan_id.to_string()))?;
        loan.mark_defaulted(on)?;
        self.event_log.log(Event::LoanDefaulted {
            loan_id: loan_id.to_string(),
            on,
        });
        Ok(self.bump(loan_id))
    }

    /// Toggle the manual blacklist override
    pub fn set_blacklisted(
        &mut self,
        loan_id: &str,
        flagged: bool,
        on: NaiveDate,
    ) -> Result<u64, LedgerError> {
        let loan = self
            .state
            .loan_mut(loan_id)
            .ok_or_else(|| ValidationError::UnknownLoan(loan_id.to_string()))?;
        loan.set_blacklisted(flagged);
        self.event_log.log(Event::BlacklistChanged {
            loan_id: loan_id.to_string(),
            flagged,
            on,
        });
        Ok(self.bump(loan_id))
    }

    /// Sweep schedules and mark unpaid installments past their due date
    ///
    /// Maintenance, not a device mutation: it appends audit events but does
    /// not bump loan versions, so queued submissions are not invalidated by
    /// the passage of time alone.
    pub fn refresh_overdue(&mut self, today: NaiveDate) -> usize {
        let mut marked = 0;
        let loan_ids: Vec<String> = self.state.loans().keys().cloned().collect();
        for loan_id in loan_ids {
            if !self.state.loan(&loan_id).map(Loan::is_open).unwrap_or(false) {
                continue;
            }
            let schedule = self.state.schedule_mut(&loan_id).expect("schedule exists");
            let mut newly_overdue = Vec::new();
            for installment in schedule.iter_mut() {
                if !installment.is_paid() && installment.due_date() < today {
                    if let Ok(true) = installment.mark_overdue(today) {
                        newly_overdue.push((installment.sequence(), today));
                    }
                }
            }
            for (sequence, since) in newly_overdue {
                self.event_log.log(Event::InstallmentOverdue {
                    loan_id: loan_id.clone(),
                    sequence,
                    since,
                });
                marked += 1;
            }
        }
        marked
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn loan(&self, loan_id: &str) -> Option<&Loan> {
        self.state.loan(loan_id)
    }

    pub fn schedule(&self, loan_id: &str) -> Option<&[crate::models::Installment]> {
        self.state.schedule(loan_id)
    }

    pub fn version(&self, loan_id: &str) -> Option<u64> {
        self.state.loan(loan_id).map(Loan::version)
    }

    pub fn outstanding(&self, loan_id: &str) -> i64 {
        self.state.outstanding(loan_id)
    }

    /// Delinquency tier as of `today`; None for unknown loans
    pub fn risk_tier(&self, loan_id: &str, today: NaiveDate) -> Option<RiskTier> {
        let loan = self.state.loan(loan_id)?;
        let schedule = self.state.schedule(loan_id)?;
        Some(classify(loan, schedule, today))
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn num_loans(&self) -> usize {
        self.state.num_loans()
    }

    pub(crate) fn state(&self) -> &LedgerState {
        &self.state
    }

    pub(crate) fn applied(&self) -> &HashMap<String, SubmissionResponse> {
        &self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::Frequency;
    use crate::models::loan::InterestMode;
    use crate::models::payment::{PaymentMethod, PaymentTarget};
    use crate::models::requests::SubmissionStatus;
    use chrono::{TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn weekly_terms() -> LoanTerms {
        LoanTerms::cash(
            1_000_000,
            1000,
            InterestMode::Simple,
            10,
            Frequency::Weekly,
            d(2024, 1, 1),
        )
    }

    fn active_loan(service: &mut LedgerService) -> String {
        let id = service
            .register_loan("CLIENT_1".to_string(), weekly_terms())
            .unwrap();
        service.approve(&id, d(2024, 1, 2)).unwrap();
        id
    }

    fn payment_request(
        loan_id: &str,
        assumed_version: u64,
        amount: i64,
        key: &str,
    ) -> SubmissionRequest {
        SubmissionRequest {
            client_local_id: key.to_string(),
            loan_id: Some(loan_id.to_string()),
            assumed_version,
            payload: MutationPayload::Payment(PaymentRequest {
                target: PaymentTarget::Advance,
                amount,
                method: PaymentMethod::Cash,
                recorded_at: Utc.timestamp_opt(1_704_700_000, 0).unwrap(),
            }),
        }
    }

    #[test]
    fn test_register_generates_schedule_and_events() {
        let mut service = LedgerService::new();
        let id = service
            .register_loan("CLIENT_1".to_string(), weekly_terms())
            .unwrap();

        assert_eq!(service.schedule(&id).unwrap().len(), 10);
        assert_eq!(service.outstanding(&id), 1_100_000);
        assert_eq!(service.event_log().events_of_type("LoanRegistered").len(), 1);
        assert_eq!(service.version(&id), Some(1));
    }

    #[test]
    fn test_approve_bumps_version() {
        let mut service = LedgerService::new();
        let id = service
            .register_loan("CLIENT_1".to_string(), weekly_terms())
            .unwrap();
        let version = service.approve(&id, d(2024, 1, 2)).unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_submit_payment_accepted_and_versioned() {
        let mut service = LedgerService::new();
        let id = active_loan(&mut service);

        let response = service.submit(&payment_request(&id, 2, 110_000, "key-1"), d(2024, 1, 8));
        assert_eq!(response.status, SubmissionStatus::Accepted);
        assert_eq!(response.server_version, 3);
        assert_eq!(service.outstanding(&id), 990_000);
    }

    #[test]
    fn test_submit_is_idempotent_per_client_local_id() {
        let mut service = LedgerService::new();
        let id = active_loan(&mut service);

        let first = service.submit(&payment_request(&id, 2, 110_000, "key-1"), d(2024, 1, 8));
        // Replay with the same key and a stale version: identical response,
        // no double application
        let replay = service.submit(&payment_request(&id, 2, 110_000, "key-1"), d(2024, 1, 9));

        assert_eq!(first, replay);
        assert_eq!(service.outstanding(&id), 990_000);
        assert_eq!(service.event_log().events_of_type("PaymentApplied").len(), 1);
    }

    #[test]
    fn test_version_mismatch_is_conflict_not_overwrite() {
        let mut service = LedgerService::new();
        let id = active_loan(&mut service);

        // First device applies at version 2 → version becomes 3
        service.submit(&payment_request(&id, 2, 110_000, "key-1"), d(2024, 1, 8));

        // Second device still assumes version 2
        let response = service.submit(&payment_request(&id, 2, 110_000, "key-2"), d(2024, 1, 8));
        assert_eq!(response.status, SubmissionStatus::Conflict);
        assert_eq!(response.server_version, 3);
        // Nothing applied for the conflicting submission
        assert_eq!(service.outstanding(&id), 990_000);
    }

    #[test]
    fn test_rejection_is_not_memoized() {
        let mut service = LedgerService::new();
        let id = active_loan(&mut service);

        // Over-target rejection
        let bad = SubmissionRequest {
            client_local_id: "key-x".to_string(),
            loan_id: Some(id.clone()),
            assumed_version: 2,
            payload: MutationPayload::Payment(PaymentRequest {
                target: PaymentTarget::Installment { sequence: 1 },
                amount: 200_000,
                method: PaymentMethod::Cash,
                recorded_at: Utc.timestamp_opt(1_704_700_000, 0).unwrap(),
            }),
        };
        let response = service.submit(&bad, d(2024, 1, 8));
        assert_eq!(response.status, SubmissionStatus::Rejected);

        // The same key with a corrected amount can still apply
        let good = SubmissionRequest {
            payload: MutationPayload::Payment(PaymentRequest {
                target: PaymentTarget::Installment { sequence: 1 },
                amount: 110_000,
                method: PaymentMethod::Cash,
                recorded_at: Utc.timestamp_opt(1_704_700_000, 0).unwrap(),
            }),
            ..bad
        };
        assert_eq!(
            service.submit(&good, d(2024, 1, 8)).status,
            SubmissionStatus::Accepted
        );
    }

    #[test]
    fn test_new_loan_submission_roundtrip() {
        let mut service = LedgerService::new();
        let request = SubmissionRequest {
            client_local_id: "key-new".to_string(),
            loan_id: None,
            assumed_version: 0,
            payload: MutationPayload::NewLoan(NewLoanRequest {
                loan_id: "loan-device-1".to_string(),
                client_ref: "CLIENT_9".to_string(),
                terms: weekly_terms(),
            }),
        };

        let response = service.submit(&request, d(2024, 1, 1));
        assert_eq!(response.status, SubmissionStatus::Accepted);
        assert_eq!(response.server_version, 1);
        assert!(service.loan("loan-device-1").is_some());

        // Duplicate registration under a fresh key is rejected
        let dup = SubmissionRequest {
            client_local_id: "key-new-2".to_string(),
            ..request
        };
        assert_eq!(service.submit(&dup, d(2024, 1, 1)).status, SubmissionStatus::Rejected);
    }

    #[test]
    fn test_refresh_overdue_marks_and_logs() {
        let mut service = LedgerService::new();
        let id = active_loan(&mut service);
        let version_before = service.version(&id).unwrap();

        // Two installments past due by Jan 16
        let marked = service.refresh_overdue(d(2024, 1, 16));
        assert_eq!(marked, 2);
        assert!(service.schedule(&id).unwrap()[0].is_overdue());
        assert!(service.schedule(&id).unwrap()[1].is_overdue());

        // Maintenance does not bump versions
        assert_eq!(service.version(&id), Some(version_before));

        // Idempotent sweep
        assert_eq!(service.refresh_overdue(d(2024, 1, 16)), 0);
    }

    #[test]
    fn test_risk_query_uses_blacklist() {
        let mut service = LedgerService::new();
        let id = active_loan(&mut service);
        service.set_blacklisted(&id, true, d(2024, 1, 3)).unwrap();
        assert_eq!(
            service.risk_tier(&id, d(2024, 1, 3)).unwrap(),
            RiskTier::Blacklist
        );
    }
}
