//! PyO3 wrapper for a field device
//!
//! A `FieldDevice` bundles the offline queue, the sync coordinator, and an
//! in-process canonical ledger. The embedding application records mutations,
//! drives sync cycles, and renders projections; every business decision
//! stays on the Rust side.
//!
//! # Example (from Python)
//!
//! ```python
//! from collection_ledger_core_rs import FieldDevice
//!
//! device = FieldDevice()
//! loan_id = device.enqueue_new_loan({
//!     "loan_id": "loan-1",
//!     "client_ref": "CLIENT_7",
//!     "terms": {
//!         "principal": 1_000_000,
//!         "rate_bps": 1000,
//!         "interest_mode": "SIMPLE",
//!         "term_count": 10,
//!         "frequency": "WEEKLY",
//!         "origin_date": "2024-01-01",
//!     },
//! })
//! device.run_sync_cycle("2024-01-01T09:00:00Z")
//! device.approve_loan("loan-1", "2024-01-02")
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use super::types::{
    conflict_to_py, cycle_report_to_py, extract_optional, extract_required, parse_connectivity,
    parse_date, parse_datetime, parse_loan_terms, parse_method, parse_payment_target,
    parse_reschedule, parse_sync_policy, queue_entry_to_py, schedule_to_py,
};
use crate::ledger::checkpoint::{restore_snapshot, LedgerSnapshot};
use crate::ledger::service::LedgerService;
use crate::sync::coordinator::{FixedConnectivity, SyncCoordinator, Connectivity};
use crate::sync::transport::InProcessTransport;

/// Python handle to one field device plus its in-process ledger
///
/// Marked unsendable: a device handle lives on the thread that created it,
/// matching the single-threaded cooperative sync model.
#[pyclass(name = "FieldDevice", unsendable)]
pub struct PyFieldDevice {
    inner: SyncCoordinator<InProcessTransport>,
}

#[pymethods]
impl PyFieldDevice {
    /// Create a device with an empty ledger
    ///
    /// `config` may override the sync policy: `max_retries`,
    /// `base_backoff_secs`, `max_backoff_secs`, `attempt_timeout_secs`.
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let policy = parse_sync_policy(config)?;
        Ok(PyFieldDevice {
            inner: SyncCoordinator::new(
                InProcessTransport::new(LedgerService::new()),
                Box::new(FixedConnectivity(Connectivity::Online)),
                policy,
            ),
        })
    }

    // ====================================================================
    // Local recording
    // ====================================================================

    /// Queue a collected payment
    ///
    /// `request`: `{loan_id, amount, method?, sequence?, assumed_version,
    /// recorded_at}`. Omitting `sequence` records an advance ("abono").
    /// Returns the queue entry id.
    fn enqueue_payment(&mut self, request: &Bound<'_, PyDict>) -> PyResult<String> {
        let loan_id: String = extract_required(request, "loan_id")?;
        let amount: i64 = extract_required(request, "amount")?;
        let method = parse_method(
            &extract_optional::<String>(request, "method")?.unwrap_or_else(|| "CASH".to_string()),
        )?;
        let target = parse_payment_target(request)?;
        let assumed_version: u64 = extract_required(request, "assumed_version")?;
        let now = parse_datetime(&extract_required::<String>(request, "recorded_at")?)?;

        Ok(self
            .inner
            .enqueue_payment(loan_id, target, amount, method, assumed_version, now))
    }

    /// Queue a loan created on this device
    ///
    /// `request`: `{loan_id, client_ref, terms, recorded_at?}`
    fn enqueue_new_loan(&mut self, request: &Bound<'_, PyDict>) -> PyResult<String> {
        let loan_id: String = extract_required(request, "loan_id")?;
        let client_ref: String = extract_required(request, "client_ref")?;
        let terms_dict: Bound<'_, PyDict> = extract_required(request, "terms")?;
        let terms = parse_loan_terms(&terms_dict)?;
        let now = match extract_optional::<String>(request, "recorded_at")? {
            Some(value) => parse_datetime(&value)?,
            None => chrono::Utc::now(),
        };

        Ok(self.inner.enqueue_new_loan(loan_id, client_ref, terms, now))
    }

    /// Queue an installment reschedule
    ///
    /// `request`: `{loan_id, sequence, proposed_date, reason?,
    /// partial_amount?, assumed_version, recorded_at}`
    fn enqueue_reschedule(&mut self, request: &Bound<'_, PyDict>) -> PyResult<String> {
        let loan_id: String = extract_required(request, "loan_id")?;
        let reschedule = parse_reschedule(request)?;
        let assumed_version: u64 = extract_required(request, "assumed_version")?;
        let now = parse_datetime(&extract_required::<String>(request, "recorded_at")?)?;

        Ok(self
            .inner
            .enqueue_reschedule(loan_id, reschedule, assumed_version, now))
    }

    /// Queue a low-priority note against a loan
    fn enqueue_note(&mut self, request: &Bound<'_, PyDict>) -> PyResult<String> {
        let loan_id: String = extract_required(request, "loan_id")?;
        let note: String = extract_required(request, "note")?;
        let assumed_version: u64 = extract_required(request, "assumed_version")?;
        let now = parse_datetime(&extract_required::<String>(request, "recorded_at")?)?;

        Ok(self.inner.enqueue_note(loan_id, note, assumed_version, now))
    }

    /// Withdraw a PENDING queue entry
    fn withdraw(&mut self, entry_id: &str) -> PyResult<()> {
        self.inner
            .withdraw(entry_id)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Manually requeue a FAILED entry
    fn retry(&mut self, entry_id: &str) -> PyResult<()> {
        self.inner
            .retry(entry_id)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    // ====================================================================
    // Sync cycle
    // ====================================================================

    /// Report probed connectivity: "ONLINE", "OFFLINE", or "LOCAL_ONLY"
    fn set_connectivity(&mut self, state: &str) -> PyResult<()> {
        let connectivity = parse_connectivity(state)?;
        self.inner
            .set_probe(Box::new(FixedConnectivity(connectivity)));
        Ok(())
    }

    /// Run one sync cycle at the given RFC 3339 instant
    fn run_sync_cycle(&mut self, py: Python, now: &str) -> PyResult<Py<PyDict>> {
        let now = parse_datetime(now)?;
        let report = self.inner.run_cycle(now);
        cycle_report_to_py(py, &report)
    }

    // ====================================================================
    // Projections
    // ====================================================================

    /// Live queue entries in drain order, as dicts
    fn queue(&self, py: Python) -> PyResult<Py<PyList>> {
        let list = PyList::empty(py);
        for view in self.inner.queue_projection() {
            list.append(queue_entry_to_py(py, &view)?)?;
        }
        Ok(list.into())
    }

    /// Recorded conflicts, as dicts
    fn conflicts(&self, py: Python) -> PyResult<Py<PyList>> {
        let list = PyList::empty(py);
        for view in self.inner.conflict_projection() {
            list.append(conflict_to_py(py, &view)?)?;
        }
        Ok(list.into())
    }

    /// Resolve a conflict: `choice` is "LOCAL", "SERVER", or "IGNORE"
    fn resolve_conflict(&mut self, conflict_id: &str, choice: &str) -> PyResult<()> {
        let result = match choice {
            "LOCAL" => self.inner.resolve_keep_local(conflict_id),
            "SERVER" => self.inner.resolve_keep_server(conflict_id),
            "IGNORE" => self.inner.ignore_conflict(conflict_id),
            other => {
                return Err(PyValueError::new_err(format!(
                    "Unknown resolution choice '{}'",
                    other
                )))
            }
        };
        result.map_err(|e| PyValueError::new_err(e.to_string()))
    }

    // ====================================================================
    // Ledger queries and canonical-side operations
    // ====================================================================

    /// Loan status label, or None if unknown
    fn loan_status(&self, loan_id: &str) -> Option<String> {
        self.ledger()
            .loan(loan_id)
            .map(|loan| loan.status().label().to_string())
    }

    /// Loan version, or None if unknown
    fn loan_version(&self, loan_id: &str) -> Option<u64> {
        self.ledger().version(loan_id)
    }

    /// Outstanding balance in cents
    fn outstanding(&self, loan_id: &str) -> i64 {
        self.ledger().outstanding(loan_id)
    }

    /// Installment schedule as a list of dicts
    fn schedule(&self, py: Python, loan_id: &str) -> PyResult<Option<Py<PyList>>> {
        match self.ledger().schedule(loan_id) {
            Some(schedule) => Ok(Some(schedule_to_py(py, schedule)?)),
            None => Ok(None),
        }
    }

    /// Risk tier label as of `today` (YYYY-MM-DD)
    fn risk_tier(&self, loan_id: &str, today: &str) -> PyResult<Option<String>> {
        let today = parse_date(today)?;
        Ok(self
            .ledger()
            .risk_tier(loan_id, today)
            .map(|tier| tier.label().to_string()))
    }

    /// Approval workflow hook: activate a pending loan
    fn approve_loan(&mut self, loan_id: &str, on: &str) -> PyResult<u64> {
        let on = parse_date(on)?;
        self.ledger_mut()
            .approve(loan_id, on)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Cancel a loan still pending approval
    fn cancel_loan(&mut self, loan_id: &str, on: &str) -> PyResult<u64> {
        let on = parse_date(on)?;
        self.ledger_mut()
            .cancel(loan_id, on)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Sweep schedules for newly overdue installments
    fn refresh_overdue(&mut self, today: &str) -> PyResult<usize> {
        let today = parse_date(today)?;
        Ok(self.ledger_mut().refresh_overdue(today))
    }

    // ====================================================================
    // Checkpointing
    // ====================================================================

    /// Serialize the ledger to a checkpoint JSON string
    fn checkpoint_json(&self) -> PyResult<String> {
        let snapshot = LedgerSnapshot::capture(self.ledger())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        snapshot
            .to_json()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Replace the ledger with one restored from checkpoint JSON
    fn restore_ledger(&mut self, json: &str) -> PyResult<()> {
        let snapshot =
            LedgerSnapshot::from_json(json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let service =
            restore_snapshot(&snapshot).map_err(|e| PyValueError::new_err(e.to_string()))?;
        *self.inner.transport_mut().ledger_mut() = service;
        Ok(())
    }
}

impl PyFieldDevice {
    fn ledger(&self) -> &LedgerService {
        self.inner.transport().ledger()
    }

    fn ledger_mut(&mut self) -> &mut LedgerService {
        self.inner.transport_mut().ledger_mut()
    }
}
