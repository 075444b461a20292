//! Offline Queue & Sync Coordinator
//!
//! A field device records every mutation locally first (even when online),
//! and a single-threaded cooperative sync cycle drains the queue toward the
//! canonical ledger:
//!
//! ```text
//! UI action → OfflineQueue (PENDING) → SyncCoordinator cycle
//!     → LedgerTransport.submit → ACCEPTED / REJECTED / CONFLICT
//!     → queue entry updated (COMPLETED / FAILED / CONFLICT)
//! ```
//!
//! - **queue**: priority-ordered store of [`SyncTransaction`]s, UI projections
//! - **coordinator**: connectivity probing, retry/backoff, conflict records
//! - **transport**: the submission boundary to the canonical ledger
//!
//! [`SyncTransaction`]: crate::models::SyncTransaction

pub mod coordinator;
pub mod queue;
pub mod transport;

pub use coordinator::{
    Connectivity, ConnectivityProbe, CycleReport, FixedConnectivity, SyncCoordinator, SyncPolicy,
};
pub use queue::{ConflictView, OfflineQueue, QueueEntryView, SyncQueueError};
pub use transport::{InProcessTransport, LedgerTransport, TransportError};
