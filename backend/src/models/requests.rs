//! Mutation payloads and the ledger submission protocol
//!
//! Every mutating action a field device takes is expressed as a
//! [`MutationPayload`] wrapped in a [`SubmissionRequest`]. The request
//! carries the device's idempotency key and the ledger version the device
//! assumed when it recorded the mutation; the canonical ledger answers with
//! a [`SubmissionResponse`].
//!
//! These are the only wire types between a device queue and the ledger;
//! installment state itself never crosses the boundary as a blind field
//! overwrite.

use crate::models::loan::LoanTerms;
use crate::models::payment::{PaymentMethod, PaymentTarget};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a queued mutation; determines queue priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    NewLoan,
    Payment,
    Reschedule,
    Metadata,
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::NewLoan => "NEW_LOAN",
            MutationKind::Payment => "PAYMENT",
            MutationKind::Reschedule => "RESCHEDULE",
            MutationKind::Metadata => "METADATA",
        }
    }
}

/// Register a loan created on a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLoanRequest {
    /// Client-generated loan id (UUID) so offline references stay stable
    pub loan_id: String,

    /// Reference into the external client directory
    pub client_ref: String,

    /// Commercial terms; the ledger generates and commits the schedule
    pub terms: LoanTerms,
}

/// Record a collected payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub target: PaymentTarget,
    pub amount: i64,
    pub method: PaymentMethod,
    pub recorded_at: DateTime<Utc>,
}

/// Move one installment's due date inside the slack window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    /// Installment to move (sequence within the loan's schedule)
    pub sequence: u32,

    /// Proposed new due date
    pub proposed_date: NaiveDate,

    /// Operator-supplied reason, kept for audit
    pub reason: String,

    /// Optional partial pre-payment captured atomically with the date change
    pub partial_amount: Option<i64>,
}

/// Low-priority annotation attached to a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataNote {
    pub note: String,
}

/// The payload of one queued mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationPayload {
    NewLoan(NewLoanRequest),
    Payment(PaymentRequest),
    Reschedule(RescheduleRequest),
    Metadata(MetadataNote),
}

impl MutationPayload {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationPayload::NewLoan(_) => MutationKind::NewLoan,
            MutationPayload::Payment(_) => MutationKind::Payment,
            MutationPayload::Reschedule(_) => MutationKind::Reschedule,
            MutationPayload::Metadata(_) => MutationKind::Metadata,
        }
    }

    /// Monetary amount carried by the payload, for queue projections
    pub fn amount(&self) -> Option<i64> {
        match self {
            MutationPayload::NewLoan(req) => Some(req.terms.principal),
            MutationPayload::Payment(req) => Some(req.amount),
            MutationPayload::Reschedule(req) => req.partial_amount,
            MutationPayload::Metadata(_) => None,
        }
    }
}

/// One mutation submitted to the canonical ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Device-assigned idempotency key
    pub client_local_id: String,

    /// Target loan; `None` only for NEW_LOAN (the id travels in the payload)
    pub loan_id: Option<String>,

    /// Ledger version the device assumed when recording the mutation
    pub assumed_version: u64,

    /// The mutation itself
    pub payload: MutationPayload,
}

/// Outcome classes of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Mutation applied (or replayed idempotently)
    Accepted,

    /// Validation or state error; terminal, never retried
    Rejected,

    /// Assumed version did not match the ledger; requires human resolution
    Conflict,
}

/// The canonical ledger's answer to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub status: SubmissionStatus,

    /// The loan's version after (for ACCEPTED) or at (for CONFLICT/REJECTED)
    /// the time of processing
    pub server_version: u64,

    /// Human-readable rejection or conflict reason
    pub reason: Option<String>,
}

impl SubmissionResponse {
    pub fn accepted(server_version: u64) -> Self {
        Self {
            status: SubmissionStatus::Accepted,
            server_version,
            reason: None,
        }
    }

    pub fn rejected(server_version: u64, reason: impl Into<String>) -> Self {
        Self {
            status: SubmissionStatus::Rejected,
            server_version,
            reason: Some(reason.into()),
        }
    }

    pub fn conflict(server_version: u64, reason: impl Into<String>) -> Self {
        Self {
            status: SubmissionStatus::Conflict,
            server_version,
            reason: Some(reason.into()),
        }
    }
}
