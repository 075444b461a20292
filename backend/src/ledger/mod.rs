//! Loan Ledger
//!
//! The canonical state machine for loans and installments:
//! - **service**: the sole owner of ledger state; serializes mutations,
//!   enforces idempotency, bumps versions, appends audit events
//! - **payments**: targeted and advance ("abono") payment application
//! - **reschedule**: slack-window validation and atomic date changes
//! - **checkpoint**: durable snapshots with integrity hashes, plus journal
//!   replay

pub mod checkpoint;
pub mod payments;
pub mod reschedule;
pub mod service;

use crate::models::{StateError, ValidationError};
use thiserror::Error;

pub use checkpoint::{CheckpointError, LedgerSnapshot};
pub use payments::{apply_payment, PaymentOutcome};
pub use reschedule::{
    apply_reschedule, validate_window, RescheduleOutcome, RescheduleVerdict,
};
pub use service::LedgerService;

/// Synchronous rejection from a ledger operation
///
/// Both variants reject before any state change; neither is ever queued or
/// retried. Transient and conflict outcomes are not errors at this layer;
/// they are sync-protocol responses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    State(#[from] StateError),
}
