//! Collection Ledger Core - Rust Engine
//!
//! Loan/installment ledger with an offline sync queue for field-based
//! microfinance collection.
//!
//! # Architecture
//!
//! - **core**: Calendar-aware date arithmetic
//! - **models**: Domain types (Loan, Installment, PaymentEvent, SyncTransaction)
//! - **schedule**: Installment plan generation
//! - **ledger**: Canonical state machine (payments, reschedules, checkpoints)
//! - **risk**: Derived delinquency classification
//! - **sync**: Offline queue and sync coordinator
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents); rates are u32 basis points
//! 2. Σ amount_due of a schedule equals the financed total exactly
//! 3. The ledger applies at most one mutation per client_local_id
//! 4. Mutations are serialized per loan; versions bump by exactly one

// Module declarations
pub mod core;
pub mod ledger;
pub mod models;
pub mod risk;
pub mod schedule;
pub mod sync;

// Re-exports for convenience
pub use crate::core::calendar::Frequency;
pub use ledger::{
    checkpoint::{replay_journal, restore_snapshot, LedgerSnapshot},
    service::LedgerService,
    LedgerError,
};
pub use models::{
    Allocation, Conflict, ConflictResolution, Event, EventLog, Financing, Installment,
    InstallmentStatus, InterestMode, LedgerState, Loan, LoanStatus, LoanTerms, MutationKind,
    MutationPayload, NewLoanRequest, PaymentEvent, PaymentMethod, PaymentRequest, PaymentTarget,
    RescheduleRequest, StateError, SubmissionRequest, SubmissionResponse, SubmissionStatus,
    SyncPriority, SyncStatus, SyncTransaction, ValidationError,
};
pub use risk::{classify, days_overdue, RiskTier};
pub use schedule::{generate_schedule, GeneratedSchedule};
pub use sync::{
    Connectivity, ConnectivityProbe, CycleReport, FixedConnectivity, InProcessTransport,
    LedgerTransport, OfflineQueue, SyncCoordinator, SyncPolicy, TransportError,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn collection_ledger_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::PyFieldDevice>()?;
    Ok(())
}
