//! Loan model
//!
//! Represents a cash loan or an article-financed credit held by a client.
//! Each loan has:
//! - Commercial terms (principal, interest mode, rate, term count, frequency)
//! - A financing kind (disbursed cash, or a financed article)
//! - A status state machine (PendingApproval → Active → Paid/Defaulted,
//!   PendingApproval → Cancelled)
//! - An optimistic-concurrency version bumped once per applied mutation
//!
//! CRITICAL: All money values are i64 (cents); rates are u32 basis points.

use crate::core::calendar::Frequency;
use crate::models::StateError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How interest is computed for a cash loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestMode {
    /// Flat interest: total due = principal × (1 + rate)
    Simple,

    /// Declining-balance level payment (standard amortization)
    Amortized,
}

/// What the loan finances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Financing {
    /// Principal is disbursed as cash
    Cash,

    /// Principal is the unpaid share of a financed article's price
    ///
    /// Article plans are quoted in months; the installment count is derived
    /// from the plan length and the collection frequency.
    Article {
        article_ref: String,
        total_price: i64,
        down_payment: i64,
        months: u32,
    },
}

/// Loan lifecycle status
///
/// Transitions are monotonic: a loan never moves backwards. The single
/// exception is explicit cancellation, allowed only before approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoanStatus {
    /// Registered, schedule generated, awaiting the approval workflow
    PendingApproval,

    /// Approved; terms are frozen, installments mutate via events
    Active { approved_on: NaiveDate },

    /// Every installment fully paid
    Paid { settled_on: NaiveDate },

    /// Flagged by collection policy; outstanding balance remains collectible
    Defaulted { flagged_on: NaiveDate },

    /// Withdrawn before approval; terminal
    Cancelled { cancelled_on: NaiveDate },
}

impl LoanStatus {
    /// Short label for error messages and projections
    pub fn label(&self) -> &'static str {
        match self {
            LoanStatus::PendingApproval => "PENDING_APPROVAL",
            LoanStatus::Active { .. } => "ACTIVE",
            LoanStatus::Paid { .. } => "PAID",
            LoanStatus::Defaulted { .. } => "DEFAULTED",
            LoanStatus::Cancelled { .. } => "CANCELLED",
        }
    }
}

/// Commercial terms of a loan, immutable once the loan is approved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Financed principal (cents). For article credits this is
    /// total_price − down_payment.
    pub principal: i64,

    /// Interest rate in basis points (1000 = 10%). Article credits carry 0.
    pub rate_bps: u32,

    /// Interest computation mode
    pub interest_mode: InterestMode,

    /// Number of installments
    pub term_count: u32,

    /// Collection frequency
    pub frequency: Frequency,

    /// Date the loan was originated; first installment falls one period later
    pub origin_date: NaiveDate,

    /// Financing kind
    pub financing: Financing,
}

impl LoanTerms {
    /// Terms for a cash loan
    pub fn cash(
        principal: i64,
        rate_bps: u32,
        interest_mode: InterestMode,
        term_count: u32,
        frequency: Frequency,
        origin_date: NaiveDate,
    ) -> Self {
        Self {
            principal,
            rate_bps,
            interest_mode,
            term_count,
            frequency,
            origin_date,
            financing: Financing::Cash,
        }
    }

    /// Terms for an article-financed credit
    ///
    /// The plan is quoted in months; the installment count is
    /// months × periods-per-month for the chosen frequency. Article credits
    /// carry no interest: the financed amount is the article price minus the
    /// down payment.
    pub fn article(
        article_ref: String,
        total_price: i64,
        down_payment: i64,
        months: u32,
        frequency: Frequency,
        origin_date: NaiveDate,
    ) -> Self {
        Self {
            principal: total_price - down_payment,
            rate_bps: 0,
            interest_mode: InterestMode::Simple,
            term_count: months * frequency.periods_per_month(),
            frequency,
            origin_date,
            financing: Financing::Article {
                article_ref,
                total_price,
                down_payment,
                months,
            },
        }
    }
}

/// A client loan in the canonical ledger
///
/// Fields are private; all mutation goes through the state-machine methods
/// so invalid transitions are unrepresentable from outside this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Unique loan identifier (UUID, client-generated for offline creation)
    id: String,

    /// Reference into the external client directory
    client_ref: String,

    /// Commercial terms (frozen once Active)
    terms: LoanTerms,

    /// Current lifecycle status
    status: LoanStatus,

    /// Optimistic-concurrency version; bumped once per applied mutation
    version: u64,

    /// Manual risk override: forces the BLACKLIST tier regardless of arrears
    blacklisted: bool,
}

impl Loan {
    /// Register a new loan in PENDING_APPROVAL with a fresh UUID
    pub fn new(client_ref: String, terms: LoanTerms) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), client_ref, terms)
    }

    /// Register a new loan with a caller-supplied id
    ///
    /// Field devices create loans offline and must know the id before the
    /// canonical ledger has seen the loan, so the id travels with the
    /// mutation rather than being assigned server-side.
    pub fn with_id(id: String, client_ref: String, terms: LoanTerms) -> Self {
        Self {
            id,
            client_ref,
            terms,
            status: LoanStatus::PendingApproval,
            version: 1,
            blacklisted: false,
        }
    }

    /// Restore a loan from a checkpoint snapshot, all fields preserved
    pub fn from_snapshot(
        id: String,
        client_ref: String,
        terms: LoanTerms,
        status: LoanStatus,
        version: u64,
        blacklisted: bool,
    ) -> Self {
        Self {
            id,
            client_ref,
            terms,
            status,
            version,
            blacklisted,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client_ref(&self) -> &str {
        &self.client_ref
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    pub fn status(&self) -> &LoanStatus {
        &self.status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_blacklisted(&self) -> bool {
        self.blacklisted
    }

    /// Check if the loan accepts collection operations (payments, reschedules)
    ///
    /// True for ACTIVE and DEFAULTED: flagging a loan as defaulted does not
    /// erase the outstanding balance, so collection continues.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            LoanStatus::Active { .. } | LoanStatus::Defaulted { .. }
        )
    }

    /// Bump the optimistic-concurrency version after an applied mutation
    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Set or clear the manual blacklist flag
    pub(crate) fn set_blacklisted(&mut self, flag: bool) {
        self.blacklisted = flag;
    }

    /// Approve the loan: PENDING_APPROVAL → ACTIVE
    ///
    /// Commits the generated schedule immutably; terms never change after
    /// this transition.
    pub fn approve(&mut self, on: NaiveDate) -> Result<(), StateError> {
        match self.status {
            LoanStatus::PendingApproval => {
                self.status = LoanStatus::Active { approved_on: on };
                Ok(())
            }
            _ => Err(StateError::NotPendingApproval {
                loan_id: self.id.clone(),
                status: self.status.label().to_string(),
            }),
        }
    }

    /// Cancel the loan: PENDING_APPROVAL → CANCELLED
    pub fn cancel(&mut self, on: NaiveDate) -> Result<(), StateError> {
        match self.status {
            LoanStatus::PendingApproval => {
                self.status = LoanStatus::Cancelled { cancelled_on: on };
                Ok(())
            }
            _ => Err(StateError::NotPendingApproval {
                loan_id: self.id.clone(),
                status: self.status.label().to_string(),
            }),
        }
    }

    /// Mark the loan fully paid once every installment is PAID
    ///
    /// Reachable from ACTIVE and from DEFAULTED (a defaulted loan that is
    /// collected in full is settled, not stuck).
    pub fn mark_paid(&mut self, on: NaiveDate) -> Result<(), StateError> {
        match self.status {
            LoanStatus::Active { .. } | LoanStatus::Defaulted { .. } => {
                self.status = LoanStatus::Paid { settled_on: on };
                Ok(())
            }
            LoanStatus::Paid { .. } => Ok(()), // idempotent
            _ => Err(StateError::LoanNotActive {
                loan_id: self.id.clone(),
                status: self.status.label().to_string(),
            }),
        }
    }

    /// Flag the loan as defaulted: ACTIVE → DEFAULTED
    ///
    /// A policy flag, not a destructive transition: the installment schedule
    /// and outstanding balance are untouched.
    pub fn mark_defaulted(&mut self, on: NaiveDate) -> Result<(), StateError> {
        match self.status {
            LoanStatus::Active { .. } => {
                self.status = LoanStatus::Defaulted { flagged_on: on };
                Ok(())
            }
            LoanStatus::Defaulted { .. } => Ok(()), // idempotent
            _ => Err(StateError::LoanNotActive {
                loan_id: self.id.clone(),
                status: self.status.label().to_string(),
            }),
        }
    }
}
