//! Domain models for the collection ledger
//!
//! CRITICAL: All money values are i64 (minor units / cents). Interest rates
//! are u32 basis points so monetary arithmetic stays exact.

use thiserror::Error;

pub mod event;
pub mod installment;
pub mod loan;
pub mod payment;
pub mod requests;
pub mod state;
pub mod sync;

// Re-exports
pub use event::{Event, EventLog};
pub use installment::{Installment, InstallmentStatus};
pub use loan::{Financing, InterestMode, Loan, LoanStatus, LoanTerms};
pub use payment::{Allocation, PaymentEvent, PaymentMethod, PaymentTarget};
pub use requests::{
    MutationKind, MutationPayload, NewLoanRequest, PaymentRequest, RescheduleRequest,
    SubmissionRequest, SubmissionResponse, SubmissionStatus,
};
pub use state::LedgerState;
pub use sync::{
    Conflict, ConflictResolution, ConflictSide, SyncPriority, SyncStatus, SyncTransaction,
};

/// Input rejected before it touches ledger state
///
/// Validation failures are synchronous and terminal: a request that fails
/// validation is never queued and never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(i64),

    #[error("term count must be positive")]
    NonPositiveTermCount,

    #[error("down payment {down_payment} must be below total price {total_price}")]
    DownPaymentExceedsPrice { down_payment: i64, total_price: i64 },

    #[error("term count {term_count} too fine for total due {total_due}")]
    TermCountExceedsTotal { total_due: i64, term_count: u32 },

    #[error("amortized payment does not cover per-period interest")]
    AmortizedPaymentTooSmall,

    #[error("unknown loan {0}")]
    UnknownLoan(String),

    #[error("loan {loan_id} has no installment {sequence}")]
    UnknownInstallment { loan_id: String, sequence: u32 },

    #[error("payment {amount} exceeds remaining due {remaining} on targeted installment")]
    ExceedsRemainingDue { amount: i64, remaining: i64 },

    #[error("advance payment {amount} exceeds total outstanding {outstanding}")]
    ExceedsOutstanding { amount: i64, outstanding: i64 },

    #[error("proposed date outside reschedule window: {0}")]
    OutsideRescheduleWindow(String),

    #[error("partial amount {amount} invalid against remaining due {remaining}")]
    InvalidPartialAmount { amount: i64, remaining: i64 },

    #[error("loan {0} already registered")]
    DuplicateLoan(String),
}

/// Operation rejected because the entity's current status forbids it
///
/// Distinct from [`ValidationError`]: the request was well-formed, but the
/// state machine does not permit the transition right now.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("loan {loan_id} is {status}, expected PENDING_APPROVAL")]
    NotPendingApproval { loan_id: String, status: String },

    #[error("loan {loan_id} is {status} and does not accept collection operations")]
    LoanClosed { loan_id: String, status: String },

    #[error("loan {loan_id} is {status}, expected ACTIVE")]
    LoanNotActive { loan_id: String, status: String },

    #[error("installment {sequence} is already fully paid")]
    InstallmentSettled { sequence: u32 },
}
