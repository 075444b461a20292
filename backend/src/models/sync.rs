//! Offline sync transaction model
//!
//! Every mutating action on a field device first becomes a
//! [`SyncTransaction`], even when the device is online, so the queue is
//! the single source of truth for what has and has not reached the
//! canonical ledger. The transaction's status is an explicit state machine:
//!
//! ```text
//! PENDING ──attempt──▶ SYNCING ──ack──▶ COMPLETED (archived)
//!    ▲                   │ │
//!    │   transient error │ │ version mismatch
//!    └───────────────────┘ └──▶ CONFLICT (human resolution only)
//!    │
//!    └──▶ FAILED (retries exhausted or rejected; manual retry)
//! ```

use crate::models::requests::{MutationKind, MutationPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue priority class; lower rank drains first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPriority {
    /// Payments: money already collected must reach the ledger first
    High,

    /// New loans and reschedules
    Normal,

    /// Notes and other metadata
    Low,
}

impl SyncPriority {
    /// Default priority class for a mutation kind
    pub fn for_kind(kind: MutationKind) -> Self {
        match kind {
            MutationKind::Payment => SyncPriority::High,
            MutationKind::NewLoan | MutationKind::Reschedule => SyncPriority::Normal,
            MutationKind::Metadata => SyncPriority::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncPriority::High => "HIGH",
            SyncPriority::Normal => "NORMAL",
            SyncPriority::Low => "LOW",
        }
    }
}

/// Sync transaction status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting for the next sync cycle (or for its backoff gate to open)
    Pending,

    /// Submission in flight; cancellation is not honored in this state
    Syncing { started_at: DateTime<Utc> },

    /// Acknowledged by the canonical ledger; entry is archived
    Completed { completed_at: DateTime<Utc> },

    /// Terminal until a human retries or discards it
    Failed { reason: String },

    /// Version mismatch recorded; excluded from auto-retry
    Conflict { conflict_id: String },
}

impl SyncStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Syncing { .. } => "SYNCING",
            SyncStatus::Completed { .. } => "COMPLETED",
            SyncStatus::Failed { .. } => "FAILED",
            SyncStatus::Conflict { .. } => "CONFLICT",
        }
    }
}

/// A locally queued mutation awaiting canonical-ledger confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTransaction {
    /// Queue entry identifier (UUID)
    id: String,

    /// The mutation to submit
    payload: MutationPayload,

    /// Target loan, if the payload addresses an existing loan
    loan_id: Option<String>,

    /// Idempotency key sent with every submission attempt
    client_local_id: String,

    /// Ledger version assumed at recording time (optimistic concurrency)
    assumed_version: u64,

    /// Priority class; HIGH drains before NORMAL before LOW
    priority: SyncPriority,

    /// Current status
    status: SyncStatus,

    /// Failed submission attempts so far
    retries: u32,

    /// Moment the mutation was recorded on the device
    created_at: DateTime<Utc>,

    /// Backoff gate: not eligible for submission before this instant
    not_before: Option<DateTime<Utc>>,
}

impl SyncTransaction {
    pub fn new(
        payload: MutationPayload,
        loan_id: Option<String>,
        assumed_version: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let priority = SyncPriority::for_kind(payload.kind());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            loan_id,
            client_local_id: uuid::Uuid::new_v4().to_string(),
            assumed_version,
            priority,
            status: SyncStatus::Pending,
            retries: 0,
            created_at,
            not_before: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &MutationPayload {
        &self.payload
    }

    pub fn kind(&self) -> MutationKind {
        self.payload.kind()
    }

    pub fn loan_id(&self) -> Option<&str> {
        self.loan_id.as_deref()
    }

    pub fn client_local_id(&self) -> &str {
        &self.client_local_id
    }

    pub fn assumed_version(&self) -> u64 {
        self.assumed_version
    }

    pub fn priority(&self) -> SyncPriority {
        self.priority
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, SyncStatus::Pending)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, SyncStatus::Completed { .. })
    }

    /// Eligible for submission: PENDING and past its backoff gate
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.not_before.map_or(true, |gate| now >= gate)
    }

    /// PENDING → SYNCING at the start of a submission attempt
    pub(crate) fn begin_attempt(&mut self, now: DateTime<Utc>) {
        debug_assert!(self.is_pending(), "attempt on non-pending transaction");
        self.status = SyncStatus::Syncing { started_at: now };
        self.not_before = None;
    }

    /// SYNCING → COMPLETED on acknowledgement
    pub(crate) fn complete(&mut self, now: DateTime<Utc>) {
        self.status = SyncStatus::Completed { completed_at: now };
    }

    /// Any in-flight state → FAILED; terminal until manual retry
    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = SyncStatus::Failed {
            reason: reason.into(),
        };
    }

    /// SYNCING → CONFLICT once a version mismatch is recorded
    pub(crate) fn mark_conflict(&mut self, conflict_id: String) {
        self.status = SyncStatus::Conflict { conflict_id };
    }

    /// Transient failure: back to PENDING with the backoff gate set
    pub(crate) fn defer(&mut self, not_before: DateTime<Utc>) {
        self.retries += 1;
        self.status = SyncStatus::Pending;
        self.not_before = Some(not_before);
    }

    /// Manual retry of a FAILED or CONFLICT-resolved entry: counters reset
    pub(crate) fn reset_for_retry(&mut self) {
        self.retries = 0;
        self.status = SyncStatus::Pending;
        self.not_before = None;
    }

    /// Rebase the optimistic version after a conflict is resolved in favor
    /// of the local mutation
    pub(crate) fn rebase_version(&mut self, server_version: u64) {
        self.assumed_version = server_version;
    }

    /// Instant the current SYNCING attempt started, if in flight
    pub fn syncing_since(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SyncStatus::Syncing { started_at } => Some(started_at),
            _ => None,
        }
    }
}

/// Which side a resolved conflict kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSide {
    Local,
    Server,
}

/// Conflict resolution state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Awaiting a human decision
    Pending,

    /// Decided; the kept side is recorded for audit
    Resolved { kept: ConflictSide },

    /// Explicitly left unresolved; the transaction stays parked
    Ignored,
}

/// A recorded version mismatch between a device and the canonical ledger
///
/// Created when a submission's assumed version does not match the ledger.
/// Never auto-resolved: it exists until a human keeps the local mutation
/// (resubmitting against the current server version) or the server state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub transaction_ref: String,
    pub local_version: u64,
    pub server_version: u64,
    pub description: String,
    pub resolution: ConflictResolution,
}

impl Conflict {
    pub fn new(
        transaction_ref: String,
        local_version: u64,
        server_version: u64,
        description: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_ref,
            local_version,
            server_version,
            description,
            resolution: ConflictResolution::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.resolution, ConflictResolution::Pending)
    }
}
