//! Risk Classifier
//!
//! Pure derived function over ledger state: given a loan, its schedule, and
//! today's date, produce a delinquency tier. Recomputed on every read and
//! never stored: the mutation source of truth is always the ledger itself.

use crate::models::installment::Installment;
use crate::models::loan::Loan;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Delinquency tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Nothing overdue
    Green,

    /// 1–29 days overdue
    Yellow,

    /// 30+ days overdue
    Red,

    /// Manual override; wins regardless of arrears
    Blacklist,
}

impl RiskTier {
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Green => "GREEN",
            RiskTier::Yellow => "YELLOW",
            RiskTier::Red => "RED",
            RiskTier::Blacklist => "BLACKLIST",
        }
    }
}

/// Days the loan is overdue as of `today`
///
/// Measured against the due date of the earliest unpaid installment;
/// 0 when nothing is overdue (including a fully paid schedule).
pub fn days_overdue(schedule: &[Installment], today: NaiveDate) -> i64 {
    schedule
        .iter()
        .find(|installment| !installment.is_paid())
        .map(|installment| (today - installment.due_date()).num_days().max(0))
        .unwrap_or(0)
}

/// Classify a loan's delinquency tier as of `today`
///
/// Deterministic in (loan, schedule, today): the same snapshot always
/// yields the same tier.
pub fn classify(loan: &Loan, schedule: &[Installment], today: NaiveDate) -> RiskTier {
    if loan.is_blacklisted() {
        return RiskTier::Blacklist;
    }
    match days_overdue(schedule, today) {
        0 => RiskTier::Green,
        1..=29 => RiskTier::Yellow,
        _ => RiskTier::Red,
    }
}
