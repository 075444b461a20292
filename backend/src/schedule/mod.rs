//! Schedule Generator
//!
//! Derives the ordered installment plan from loan terms. This is the only
//! place installment amounts are ever computed; afterwards the schedule is
//! immutable except for payment and reschedule events.
//!
//! # Allocation rules
//!
//! - CASH/SIMPLE: total = principal + flat interest (rate_bps, half-up);
//!   each installment is ceil(total / term_count), the last absorbs the
//!   remainder.
//! - CASH/AMORTIZED: declining-balance level payment at per-period rate
//!   rate_bps. The level payment is rounded up to whole cents; per-period
//!   interest rounds half-up against the running balance; the final
//!   installment clears the remaining balance plus its interest and absorbs
//!   all rounding.
//! - ARTICLE: no interest; financed = total_price − down_payment, split like
//!   CASH/SIMPLE at rate 0 over the month-derived term count.
//!
//! # Critical Invariants
//!
//! - Σ amount_due == total_due exactly, in every mode
//! - Due dates are strictly increasing and strictly after the origin date
//!
//! CRITICAL: All money values are i64 (cents). The annuity factor is the
//! only floating-point computation, and it only seeds the level payment;
//! every balance mutation is integer arithmetic.

use crate::models::installment::Installment;
use crate::models::loan::{Financing, InterestMode, LoanTerms};
use crate::models::ValidationError;

/// A generated installment plan, ready to commit to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSchedule {
    /// Total the client will pay across the whole schedule (cents)
    pub total_due: i64,

    /// Installments in dense sequence order 1..=N
    pub installments: Vec<Installment>,
}

/// Generate the installment plan for the given terms
///
/// # Errors
///
/// [`ValidationError`] on non-positive principal or term count, a down
/// payment at or above the article price, or a term count too fine for the
/// financed amount to give every installment a positive due.
///
/// # Example
///
/// ```
/// use collection_ledger_core_rs::{generate_schedule, Frequency, InterestMode, LoanTerms};
/// use chrono::NaiveDate;
///
/// let origin = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let terms = LoanTerms::cash(1_000_000, 1000, InterestMode::Simple, 10, Frequency::Weekly, origin);
/// let schedule = generate_schedule(&terms).unwrap();
///
/// assert_eq!(schedule.total_due, 1_100_000);
/// assert!(schedule.installments.iter().all(|i| i.amount_due() == 110_000));
/// ```
pub fn generate_schedule(terms: &LoanTerms) -> Result<GeneratedSchedule, ValidationError> {
    validate_terms(terms)?;

    let amounts = match terms.interest_mode {
        InterestMode::Simple => simple_amounts(terms.principal, terms.rate_bps, terms.term_count)?,
        InterestMode::Amortized => {
            amortized_amounts(terms.principal, terms.rate_bps, terms.term_count)?
        }
    };

    let total_due: i64 = amounts.iter().sum();
    let installments = amounts
        .into_iter()
        .enumerate()
        .map(|(idx, amount)| {
            let sequence = idx as u32 + 1;
            let due = terms.frequency.due_date(terms.origin_date, sequence);
            Installment::new(sequence, due, amount)
        })
        .collect();

    Ok(GeneratedSchedule {
        total_due,
        installments,
    })
}

fn validate_terms(terms: &LoanTerms) -> Result<(), ValidationError> {
    if let Financing::Article {
        total_price,
        down_payment,
        ..
    } = &terms.financing
    {
        if *down_payment < 0 {
            return Err(ValidationError::NonPositiveAmount(*down_payment));
        }
        if *down_payment >= *total_price {
            return Err(ValidationError::DownPaymentExceedsPrice {
                down_payment: *down_payment,
                total_price: *total_price,
            });
        }
    }
    if terms.principal <= 0 {
        return Err(ValidationError::NonPositivePrincipal(terms.principal));
    }
    if terms.term_count == 0 {
        return Err(ValidationError::NonPositiveTermCount);
    }
    Ok(())
}

/// Flat-interest split: ceil per installment, remainder on the last
fn simple_amounts(principal: i64, rate_bps: u32, term_count: u32) -> Result<Vec<i64>, ValidationError> {
    let total = principal + interest_on(principal, rate_bps);
    level_split(total, term_count)
}

/// Split `total` into `term_count` parts of ceil(total/n); the last part
/// absorbs the remainder and must stay positive
fn level_split(total: i64, term_count: u32) -> Result<Vec<i64>, ValidationError> {
    let n = i64::from(term_count);
    let per = ceil_div(total, n);
    let last = total - per * (n - 1);
    if last <= 0 {
        return Err(ValidationError::TermCountExceedsTotal {
            total_due: total,
            term_count,
        });
    }

    let mut amounts = vec![per; term_count as usize];
    amounts[term_count as usize - 1] = last;
    debug_assert_eq!(amounts.iter().sum::<i64>(), total);
    Ok(amounts)
}

/// Declining-balance level payment; final installment clears the balance
fn amortized_amounts(
    principal: i64,
    rate_bps: u32,
    term_count: u32,
) -> Result<Vec<i64>, ValidationError> {
    if rate_bps == 0 {
        // Zero-rate amortization degenerates to an even split
        return level_split(principal, term_count);
    }

    let n = term_count as usize;
    let rate = f64::from(rate_bps) / 10_000.0;
    let compound = (1.0 + rate).powi(term_count as i32);
    let payment = ((principal as f64) * rate * compound / (compound - 1.0)).ceil() as i64;

    let mut amounts = Vec::with_capacity(n);
    let mut balance = principal;
    for _ in 1..n {
        let interest = interest_on(balance, rate_bps);
        let principal_part = payment - interest;
        if principal_part <= 0 {
            return Err(ValidationError::AmortizedPaymentTooSmall);
        }
        if principal_part >= balance {
            // Rounding paid the loan off early; the term is too fine
            return Err(ValidationError::TermCountExceedsTotal {
                total_due: principal,
                term_count,
            });
        }
        amounts.push(payment);
        balance -= principal_part;
    }

    // Last installment clears the running balance exactly
    amounts.push(balance + interest_on(balance, rate_bps));
    Ok(amounts)
}

/// Interest at `rate_bps` on `amount`, rounded half-up (exact i128 interim)
fn interest_on(amount: i64, rate_bps: u32) -> i64 {
    let numer = i128::from(amount) * i128::from(rate_bps) + 5_000;
    (numer / 10_000) as i64
}

fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}
