//! Payment Recorder
//!
//! Applies a validated [`PaymentEvent`] to a loan's schedule.
//!
//! # Allocation modes
//!
//! - **Targeted**: the amount applies to exactly one installment. Overflow
//!   above that installment's remaining due is rejected: the caller must
//!   use advance mode to spread money across installments.
//! - **Advance ("abono")**: the amount is allocated FIFO across outstanding
//!   installments in sequence order until exhausted. An amount exceeding
//!   the loan's total outstanding is rejected; the ledger carries no credit
//!   balances.
//!
//! # Critical Invariants
//!
//! - Validation completes before any mutation: a rejected payment leaves
//!   the schedule untouched
//! - amount_paid never exceeds amount_due on any installment
//! - When the last installment settles, the loan transitions to PAID

use crate::ledger::LedgerError;
use crate::models::payment::{Allocation, PaymentEvent, PaymentTarget};
use crate::models::{LedgerState, StateError, ValidationError};
use chrono::NaiveDate;

/// Result of applying one payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// Per-installment allocations, in sequence order
    pub allocations: Vec<Allocation>,

    /// True when this payment settled the loan's final open installment
    pub loan_paid_off: bool,
}

/// Apply a payment to the loan it references
///
/// `today` is the ledger's business date, used for PAID timestamps and the
/// loan's settlement date.
pub fn apply_payment(
    state: &mut LedgerState,
    payment: &PaymentEvent,
    today: NaiveDate,
) -> Result<PaymentOutcome, LedgerError> {
    if payment.amount <= 0 {
        return Err(ValidationError::NonPositiveAmount(payment.amount).into());
    }

    let loan = state
        .loan(&payment.loan_ref)
        .ok_or_else(|| ValidationError::UnknownLoan(payment.loan_ref.clone()))?;
    if !loan.is_open() {
        return Err(StateError::LoanClosed {
            loan_id: loan.id().to_string(),
            status: loan.status().label().to_string(),
        }
        .into());
    }

    // Validate the allocation plan fully before mutating anything
    let allocations = plan_allocations(state, payment)?;

    let schedule = state
        .schedule_mut(&payment.loan_ref)
        .expect("schedule exists for registered loan");
    for allocation in &allocations {
        let installment = schedule
            .iter_mut()
            .find(|i| i.sequence() == allocation.sequence)
            .expect("planned allocation targets existing installment");
        installment
            .record_payment(allocation.amount, today)
            .expect("planned allocation fits remaining due");
    }

    let loan_paid_off = state.all_installments_paid(&payment.loan_ref);
    if loan_paid_off {
        state
            .loan_mut(&payment.loan_ref)
            .expect("loan exists")
            .mark_paid(today)?;
    }

    Ok(PaymentOutcome {
        allocations,
        loan_paid_off,
    })
}

/// Compute the allocation plan without mutating state
fn plan_allocations(
    state: &LedgerState,
    payment: &PaymentEvent,
) -> Result<Vec<Allocation>, LedgerError> {
    let schedule = state
        .schedule(&payment.loan_ref)
        .ok_or_else(|| ValidationError::UnknownLoan(payment.loan_ref.clone()))?;

    match payment.target {
        PaymentTarget::Installment { sequence } => {
            let installment = schedule
                .iter()
                .find(|i| i.sequence() == sequence)
                .ok_or_else(|| ValidationError::UnknownInstallment {
                    loan_id: payment.loan_ref.clone(),
                    sequence,
                })?;
            if installment.is_paid() {
                return Err(StateError::InstallmentSettled { sequence }.into());
            }
            let remaining = installment.remaining_due();
            if payment.amount > remaining {
                return Err(ValidationError::ExceedsRemainingDue {
                    amount: payment.amount,
                    remaining,
                }
                .into());
            }
            Ok(vec![Allocation {
                sequence,
                amount: payment.amount,
            }])
        }

        PaymentTarget::Advance => {
            let outstanding: i64 = schedule.iter().map(|i| i.remaining_due()).sum();
            if payment.amount > outstanding {
                return Err(ValidationError::ExceedsOutstanding {
                    amount: payment.amount,
                    outstanding,
                }
                .into());
            }

            let mut left = payment.amount;
            let mut allocations = Vec::new();
            for installment in schedule {
                if left == 0 {
                    break;
                }
                let remaining = installment.remaining_due();
                if remaining == 0 {
                    continue;
                }
                let slice = left.min(remaining);
                allocations.push(Allocation {
                    sequence: installment.sequence(),
                    amount: slice,
                });
                left -= slice;
            }
            Ok(allocations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::Frequency;
    use crate::models::loan::{InterestMode, Loan, LoanTerms};
    use crate::models::payment::PaymentMethod;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn active_state() -> (LedgerState, String) {
        let terms = LoanTerms::cash(
            300_000,
            0,
            InterestMode::Simple,
            3,
            Frequency::Weekly,
            d(2024, 1, 1),
        );
        let mut loan = Loan::new("CLIENT_1".to_string(), terms.clone());
        loan.approve(d(2024, 1, 2)).unwrap();
        let id = loan.id().to_string();

        let schedule = crate::schedule::generate_schedule(&terms).unwrap();
        let mut state = LedgerState::new();
        state.add_loan(loan, schedule.installments);
        (state, id)
    }

    fn payment(loan_id: &str, target: PaymentTarget, amount: i64) -> PaymentEvent {
        PaymentEvent::new(
            loan_id.to_string(),
            target,
            amount,
            PaymentMethod::Cash,
            Utc.timestamp_opt(1_704_700_000, 0).unwrap(),
            uuid::Uuid::new_v4().to_string(),
        )
    }

    #[test]
    fn test_targeted_payment() {
        let (mut state, id) = active_state();
        let outcome = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Installment { sequence: 1 }, 100_000),
            d(2024, 1, 8),
        )
        .unwrap();

        assert_eq!(
            outcome.allocations,
            vec![Allocation {
                sequence: 1,
                amount: 100_000
            }]
        );
        assert!(!outcome.loan_paid_off);
        assert_eq!(state.outstanding(&id), 200_000);
    }

    #[test]
    fn test_targeted_overflow_rejected() {
        let (mut state, id) = active_state();
        let err = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Installment { sequence: 1 }, 150_000),
            d(2024, 1, 8),
        )
        .unwrap_err();

        assert_eq!(
            err,
            LedgerError::Validation(ValidationError::ExceedsRemainingDue {
                amount: 150_000,
                remaining: 100_000
            })
        );
        // Rejection leaves the schedule untouched
        assert_eq!(state.outstanding(&id), 300_000);
    }

    #[test]
    fn test_advance_allocates_fifo() {
        let (mut state, id) = active_state();
        let outcome = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Advance, 150_000),
            d(2024, 1, 8),
        )
        .unwrap();

        assert_eq!(
            outcome.allocations,
            vec![
                Allocation {
                    sequence: 1,
                    amount: 100_000
                },
                Allocation {
                    sequence: 2,
                    amount: 50_000
                },
            ]
        );
        let schedule = state.schedule(&id).unwrap();
        assert!(schedule[0].is_paid());
        assert_eq!(schedule[1].remaining_due(), 50_000);
    }

    #[test]
    fn test_advance_beyond_outstanding_rejected() {
        let (mut state, id) = active_state();
        let err = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Advance, 300_001),
            d(2024, 1, 8),
        )
        .unwrap_err();

        assert_eq!(
            err,
            LedgerError::Validation(ValidationError::ExceedsOutstanding {
                amount: 300_001,
                outstanding: 300_000
            })
        );
    }

    #[test]
    fn test_final_payment_settles_loan() {
        let (mut state, id) = active_state();
        let outcome = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Advance, 300_000),
            d(2024, 1, 22),
        )
        .unwrap();

        assert!(outcome.loan_paid_off);
        assert_eq!(state.loan(&id).unwrap().status().label(), "PAID");
    }

    #[test]
    fn test_paid_loan_rejects_payment() {
        let (mut state, id) = active_state();
        apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Advance, 300_000),
            d(2024, 1, 22),
        )
        .unwrap();

        let err = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Advance, 1_000),
            d(2024, 1, 23),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::State(StateError::LoanClosed { .. })));
    }

    #[test]
    fn test_pending_loan_rejects_payment() {
        let terms = LoanTerms::cash(
            300_000,
            0,
            InterestMode::Simple,
            3,
            Frequency::Weekly,
            d(2024, 1, 1),
        );
        let loan = Loan::new("CLIENT_1".to_string(), terms.clone());
        let id = loan.id().to_string();
        let schedule = crate::schedule::generate_schedule(&terms).unwrap();
        let mut state = LedgerState::new();
        state.add_loan(loan, schedule.installments);

        let err = apply_payment(
            &mut state,
            &payment(&id, PaymentTarget::Advance, 1_000),
            d(2024, 1, 2),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::State(StateError::LoanClosed { .. })));
    }

    #[test]
    fn test_unknown_loan_rejected() {
        let mut state = LedgerState::new();
        let err = apply_payment(
            &mut state,
            &payment("nope", PaymentTarget::Advance, 1_000),
            d(2024, 1, 2),
        )
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::Validation(ValidationError::UnknownLoan("nope".to_string()))
        );
    }
}
