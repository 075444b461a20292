//! Reschedule Engine
//!
//! Validates and applies installment date changes under frequency-bound
//! slack windows.
//!
//! # Window rule
//!
//! Measured from the installment's **original** due date (so repeated
//! reschedules cannot walk a date forward indefinitely):
//!
//! ```text
//! original_due ≤ proposed ≤ original_due + slack(frequency)
//! proposed ≥ today
//! ```
//!
//! A date within one day of the window's upper boundary validates as
//! WARNING so the UI can ask the operator to confirm. An optional partial
//! pre-payment is captured atomically with the date change: both apply or
//! neither does.

use crate::ledger::LedgerError;
use crate::models::requests::RescheduleRequest;
use crate::models::{LedgerState, StateError, ValidationError};
use crate::core::calendar::Frequency;
use chrono::NaiveDate;

/// Verdict of window validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleVerdict {
    /// Inside the window with room to spare
    Valid,

    /// Inside the window but within one day of its upper boundary
    Warning { days_to_boundary: i64 },

    /// Outside the window; the reason is operator-facing
    Invalid { reason: String },
}

impl RescheduleVerdict {
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, RescheduleVerdict::Invalid { .. })
    }
}

/// Result of an applied reschedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescheduleOutcome {
    pub sequence: u32,
    pub previous_due: NaiveDate,
    pub new_due: NaiveDate,

    /// Partial pre-payment captured with the date change, if any
    pub partial_amount: Option<i64>,

    /// True when the partial payment settled the loan's final open installment
    pub loan_paid_off: bool,
}

/// Validate a proposed date against the slack window
pub fn validate_window(
    frequency: Frequency,
    original_due: NaiveDate,
    proposed: NaiveDate,
    today: NaiveDate,
) -> RescheduleVerdict {
    let latest = original_due + chrono::Days::new(frequency.slack_days() as u64);

    if proposed < original_due {
        return RescheduleVerdict::Invalid {
            reason: format!(
                "proposed {} is before the original due date {}",
                proposed, original_due
            ),
        };
    }
    if proposed < today {
        return RescheduleVerdict::Invalid {
            reason: format!("proposed {} is in the past (today {})", proposed, today),
        };
    }
    if proposed > latest {
        return RescheduleVerdict::Invalid {
            reason: format!(
                "proposed {} is beyond the {} slack window ending {}",
                proposed,
                frequency.label(),
                latest
            ),
        };
    }

    let days_to_boundary = (latest - proposed).num_days();
    if days_to_boundary <= 1 {
        RescheduleVerdict::Warning { days_to_boundary }
    } else {
        RescheduleVerdict::Valid
    }
}

/// Apply a reschedule request to the loan it references
///
/// Validates the window and the optional partial payment fully before
/// mutating; a rejected request leaves the schedule untouched.
pub fn apply_reschedule(
    state: &mut LedgerState,
    loan_id: &str,
    request: &RescheduleRequest,
    today: NaiveDate,
) -> Result<RescheduleOutcome, LedgerError> {
    let loan = state
        .loan(loan_id)
        .ok_or_else(|| ValidationError::UnknownLoan(loan_id.to_string()))?;
    if !loan.is_open() {
        return Err(StateError::LoanClosed {
            loan_id: loan_id.to_string(),
            status: loan.status().label().to_string(),
        }
        .into());
    }
    let frequency = loan.terms().frequency;

    let schedule = state
        .schedule(loan_id)
        .ok_or_else(|| ValidationError::UnknownLoan(loan_id.to_string()))?;
    let installment = schedule
        .iter()
        .find(|i| i.sequence() == request.sequence)
        .ok_or_else(|| ValidationError::UnknownInstallment {
            loan_id: loan_id.to_string(),
            sequence: request.sequence,
        })?;
    if installment.is_paid() {
        return Err(StateError::InstallmentSettled {
            sequence: request.sequence,
        }
        .into());
    }

    let verdict = validate_window(
        frequency,
        installment.original_due_date(),
        request.proposed_date,
        today,
    );
    if let RescheduleVerdict::Invalid { reason } = verdict {
        return Err(ValidationError::OutsideRescheduleWindow(reason).into());
    }

    let remaining = installment.remaining_due();
    if let Some(partial) = request.partial_amount {
        if partial <= 0 || partial > remaining {
            return Err(ValidationError::InvalidPartialAmount {
                amount: partial,
                remaining,
            }
            .into());
        }
    }
    let previous_due = installment.due_date();

    // Validation done; mutate date and partial payment together
    let installments = state.schedule_mut(loan_id).expect("schedule exists");
    let installment = installments
        .iter_mut()
        .find(|i| i.sequence() == request.sequence)
        .expect("installment validated above");
    installment.reschedule(request.proposed_date)?;
    if let Some(partial) = request.partial_amount {
        installment
            .record_payment(partial, today)
            .expect("partial validated against remaining due");
    }

    let loan_paid_off = state.all_installments_paid(loan_id);
    if loan_paid_off {
        state.loan_mut(loan_id).expect("loan exists").mark_paid(today)?;
    }

    Ok(RescheduleOutcome {
        sequence: request.sequence,
        previous_due,
        new_due: request.proposed_date,
        partial_amount: request.partial_amount,
        loan_paid_off,
    })
}
