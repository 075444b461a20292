//! Tests for the reschedule engine
//!
//! The slack window is anchored to the installment's original due date:
//! DAILY +2, WEEKLY +6, BIWEEKLY +14, MONTHLY +29 days. A proposed date in
//! the past or beyond the window rejects; the last day before the boundary
//! warns. An optional partial pre-payment applies atomically.

use chrono::NaiveDate;
use collection_ledger_core_rs::ledger::reschedule::validate_window;
use collection_ledger_core_rs::ledger::RescheduleVerdict;
use chrono::{TimeZone, Utc};
use collection_ledger_core_rs::{
    Frequency, InterestMode, LedgerService, LoanTerms, MutationPayload, PaymentMethod,
    PaymentRequest, PaymentTarget, RescheduleRequest, SubmissionRequest, SubmissionStatus,
};

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

fn reschedule(
    loan_id: &str,
    sequence: u32,
    proposed: NaiveDate,
    partial: Option<i64>,
    key: &str,
) -> SubmissionRequest {
    SubmissionRequest {
        client_local_id: key.to_string(),
        loan_id: Some(loan_id.to_string()),
        assumed_version: 2,
        payload: MutationPayload::Reschedule(RescheduleRequest {
            sequence,
            proposed_date: proposed,
            reason: "client asked".to_string(),
            partial_amount: partial,
        }),
    }
}

// ============================================================================
// Window validation across frequencies
// ============================================================================

#[test]
fn test_window_bounds_per_frequency() {
    let original = d(2024, 3, 10);
    let today = d(2024, 3, 10);
    let cases = [
        (Frequency::Daily, d(2024, 3, 12), d(2024, 3, 13)),
        (Frequency::Weekly, d(2024, 3, 16), d(2024, 3, 17)),
        (Frequency::Biweekly, d(2024, 3, 24), d(2024, 3, 25)),
        (Frequency::Monthly, d(2024, 4, 8), d(2024, 4, 9)),
    ];

    for (frequency, last_inside, first_outside) in cases {
        assert!(
            validate_window(frequency, original, last_inside, today).is_acceptable(),
            "{:?}: {} should be inside",
            frequency,
            last_inside
        );
        assert!(
            !validate_window(frequency, original, first_outside, today).is_acceptable(),
            "{:?}: {} should be outside",
            frequency,
            first_outside
        );
    }
}

#[test]
fn test_window_rejects_dates_before_original_or_today() {
    // Before the original due date
    assert!(!validate_window(Frequency::Weekly, d(2024, 3, 10), d(2024, 3, 9), d(2024, 3, 1))
        .is_acceptable());
    // Before today
    assert!(!validate_window(Frequency::Weekly, d(2024, 3, 10), d(2024, 3, 11), d(2024, 3, 12))
        .is_acceptable());
    // Exactly today is fine
    assert!(validate_window(Frequency::Weekly, d(2024, 3, 10), d(2024, 3, 12), d(2024, 3, 12))
        .is_acceptable());
}

#[test]
fn test_window_warns_within_one_day_of_boundary() {
    // WEEKLY boundary = original + 6
    let original = d(2024, 3, 10);
    let today = d(2024, 3, 10);

    assert_eq!(
        validate_window(Frequency::Weekly, original, d(2024, 3, 15), today),
        RescheduleVerdict::Warning { days_to_boundary: 1 }
    );
    assert_eq!(
        validate_window(Frequency::Weekly, original, d(2024, 3, 16), today),
        RescheduleVerdict::Warning { days_to_boundary: 0 }
    );
    assert_eq!(
        validate_window(Frequency::Weekly, original, d(2024, 3, 14), today),
        RescheduleVerdict::Valid
    );
}

// ============================================================================
// Application through the ledger service
// ============================================================================

#[test]
fn test_reschedule_moves_date_keeps_audit_anchor() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    let response = service.submit(
        &reschedule(&id, 1, d(2024, 1, 11), None, "r1"),
        d(2024, 1, 8),
    );
    assert_eq!(response.status, SubmissionStatus::Accepted);

    let installment = &service.schedule(&id).unwrap()[0];
    assert_eq!(installment.due_date(), d(2024, 1, 11));
    assert_eq!(installment.original_due_date(), d(2024, 1, 8));
    assert_eq!(installment.status().label(), "RESCHEDULED");
    assert_eq!(
        service
            .event_log()
            .events_of_type("InstallmentRescheduled")
            .len(),
        1
    );
}

#[test]
fn test_reschedule_outside_window_rejected() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    // WEEKLY slack ends Jan 14
    let response = service.submit(
        &reschedule(&id, 1, d(2024, 1, 15), None, "r1"),
        d(2024, 1, 8),
    );
    assert_eq!(response.status, SubmissionStatus::Rejected);
    assert!(response.reason.unwrap().contains("slack window"));
    assert_eq!(service.schedule(&id).unwrap()[0].due_date(), d(2024, 1, 8));
}

#[test]
fn test_second_reschedule_still_anchored_to_original() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    service.submit(&reschedule(&id, 1, d(2024, 1, 11), None, "r1"), d(2024, 1, 8));

    // Jan 14 is the last day of the original window, still allowed
    let ok = service.submit(
        &SubmissionRequest {
            assumed_version: 3,
            ..reschedule(&id, 1, d(2024, 1, 14), None, "r2")
        },
        d(2024, 1, 11),
    );
    assert_eq!(ok.status, SubmissionStatus::Accepted);

    // Jan 15 is beyond it, even though the current due date moved
    let rejected = service.submit(
        &SubmissionRequest {
            assumed_version: 4,
            ..reschedule(&id, 1, d(2024, 1, 15), None, "r3")
        },
        d(2024, 1, 11),
    );
    assert_eq!(rejected.status, SubmissionStatus::Rejected);
}

#[test]
fn test_partial_prepayment_applies_atomically() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    let response = service.submit(
        &reschedule(&id, 1, d(2024, 1, 11), Some(60_000), "r1"),
        d(2024, 1, 8),
    );
    assert_eq!(response.status, SubmissionStatus::Accepted);

    let installment = &service.schedule(&id).unwrap()[0];
    assert_eq!(installment.due_date(), d(2024, 1, 11));
    assert_eq!(installment.amount_paid(), 60_000);
    assert_eq!(service.outstanding(&id), 1_040_000);
}

#[test]
fn test_invalid_partial_rejects_whole_request() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    // Partial above the installment's remaining due
    let response = service.submit(
        &reschedule(&id, 1, d(2024, 1, 11), Some(120_000), "r1"),
        d(2024, 1, 8),
    );
    assert_eq!(response.status, SubmissionStatus::Rejected);

    // Neither the date nor the payment applied
    let installment = &service.schedule(&id).unwrap()[0];
    assert_eq!(installment.due_date(), d(2024, 1, 8));
    assert_eq!(installment.amount_paid(), 0);
}

#[test]
fn test_paid_installment_cannot_move() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    service.submit(
        &SubmissionRequest {
            payload: MutationPayload::Payment(PaymentRequest {
                target: PaymentTarget::Installment { sequence: 1 },
                amount: 110_000,
                method: PaymentMethod::Cash,
                recorded_at: Utc.timestamp_opt(1_704_700_000, 0).unwrap(),
            }),
            ..reschedule(&id, 1, d(2024, 1, 11), None, "p1")
        },
        d(2024, 1, 8),
    );

    let response = service.submit(
        &SubmissionRequest {
            assumed_version: 3,
            ..reschedule(&id, 1, d(2024, 1, 11), None, "r1")
        },
        d(2024, 1, 8),
    );
    assert_eq!(response.status, SubmissionStatus::Rejected);
    assert!(response.reason.unwrap().contains("already fully paid"));
}

#[test]
fn test_unknown_installment_rejected() {
    let mut service = LedgerService::new();
    let id = active_loan(&mut service);

    let response = service.submit(
        &reschedule(&id, 99, d(2024, 1, 11), None, "r1"),
        d(2024, 1, 8),
    );
    assert_eq!(response.status, SubmissionStatus::Rejected);
    assert!(response.reason.unwrap().contains("no installment 99"));
}
