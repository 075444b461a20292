//! Type conversion utilities for the FFI boundary
//!
//! Converts between Rust domain types and PyO3-compatible types (PyDict,
//! PyList). All parsing errors surface as Python ValueError with the field
//! name in the message.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::core::calendar::Frequency;
use crate::models::installment::Installment;
use crate::models::loan::{InterestMode, LoanTerms};
use crate::models::payment::{PaymentMethod, PaymentTarget};
use crate::models::requests::RescheduleRequest;
use crate::sync::coordinator::{Connectivity, CycleReport, SyncPolicy};
use crate::sync::queue::{ConflictView, QueueEntryView};
use chrono::{DateTime, NaiveDate, Utc};

// ========================================================================
// PyDict Extraction Helpers
// ========================================================================

/// Extract a required field from a Python dict with a clear error message
pub fn extract_required<'py, T: FromPyObject<'py>>(
    dict: &Bound<'py, PyDict>,
    key: &str,
) -> PyResult<T> {
    dict.get_item(key)?
        .ok_or_else(|| PyValueError::new_err(format!("Missing required field '{}'", key)))?
        .extract()
}

/// Extract an optional field from a Python dict
pub fn extract_optional<'py, T: FromPyObject<'py>>(
    dict: &Bound<'py, PyDict>,
    key: &str,
) -> PyResult<Option<T>> {
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => Ok(Some(value.extract()?)),
        _ => Ok(None),
    }
}

/// Parse a `YYYY-MM-DD` date string
pub fn parse_date(value: &str) -> PyResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| PyValueError::new_err(format!("Invalid date '{}': {}", value, e)))
}

/// Parse an RFC 3339 timestamp string
pub fn parse_datetime(value: &str) -> PyResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PyValueError::new_err(format!("Invalid timestamp '{}': {}", value, e)))
}

pub fn parse_frequency(value: &str) -> PyResult<Frequency> {
    match value {
        "DAILY" => Ok(Frequency::Daily),
        "WEEKLY" => Ok(Frequency::Weekly),
        "BIWEEKLY" => Ok(Frequency::Biweekly),
        "MONTHLY" => Ok(Frequency::Monthly),
        other => Err(PyValueError::new_err(format!(
            "Unknown frequency '{}'",
            other
        ))),
    }
}

pub fn parse_method(value: &str) -> PyResult<PaymentMethod> {
    match value {
        "CASH" => Ok(PaymentMethod::Cash),
        "TRANSFER" => Ok(PaymentMethod::Transfer),
        "OTHER" => Ok(PaymentMethod::Other),
        other => Err(PyValueError::new_err(format!(
            "Unknown payment method '{}'",
            other
        ))),
    }
}

pub fn parse_connectivity(value: &str) -> PyResult<Connectivity> {
    match value {
        "ONLINE" => Ok(Connectivity::Online),
        "OFFLINE" => Ok(Connectivity::Offline),
        "LOCAL_ONLY" => Ok(Connectivity::LocalOnly),
        other => Err(PyValueError::new_err(format!(
            "Unknown connectivity '{}'",
            other
        ))),
    }
}

/// Parse loan terms from a dict
///
/// Cash loans: `{principal, rate_bps, interest_mode, term_count, frequency,
/// origin_date}`. Article credits: `{article_ref, total_price, down_payment,
/// months, frequency, origin_date}`.
pub fn parse_loan_terms(dict: &Bound<'_, PyDict>) -> PyResult<LoanTerms> {
    let frequency = parse_frequency(&extract_required::<String>(dict, "frequency")?)?;
    let origin_date = parse_date(&extract_required::<String>(dict, "origin_date")?)?;

    if dict.contains("article_ref")? {
        Ok(LoanTerms::article(
            extract_required(dict, "article_ref")?,
            extract_required(dict, "total_price")?,
            extract_required(dict, "down_payment")?,
            extract_required(dict, "months")?,
            frequency,
            origin_date,
        ))
    } else {
        let interest_mode = match extract_required::<String>(dict, "interest_mode")?.as_str() {
            "SIMPLE" => InterestMode::Simple,
            "AMORTIZED" => InterestMode::Amortized,
            other => {
                return Err(PyValueError::new_err(format!(
                    "Unknown interest mode '{}'",
                    other
                )))
            }
        };
        Ok(LoanTerms::cash(
            extract_required(dict, "principal")?,
            extract_required(dict, "rate_bps")?,
            interest_mode,
            extract_required(dict, "term_count")?,
            frequency,
            origin_date,
        ))
    }
}

/// Parse a payment target: a `sequence` field targets one installment,
/// its absence means an advance ("abono")
pub fn parse_payment_target(dict: &Bound<'_, PyDict>) -> PyResult<PaymentTarget> {
    Ok(match extract_optional::<u32>(dict, "sequence")? {
        Some(sequence) => PaymentTarget::Installment { sequence },
        None => PaymentTarget::Advance,
    })
}

/// Parse a reschedule request from a dict
pub fn parse_reschedule(dict: &Bound<'_, PyDict>) -> PyResult<RescheduleRequest> {
    Ok(RescheduleRequest {
        sequence: extract_required(dict, "sequence")?,
        proposed_date: parse_date(&extract_required::<String>(dict, "proposed_date")?)?,
        reason: extract_optional(dict, "reason")?.unwrap_or_default(),
        partial_amount: extract_optional(dict, "partial_amount")?,
    })
}

/// Parse sync policy overrides from an optional config dict
pub fn parse_sync_policy(dict: Option<&Bound<'_, PyDict>>) -> PyResult<SyncPolicy> {
    let mut policy = SyncPolicy::default();
    if let Some(dict) = dict {
        if let Some(value) = extract_optional(dict, "max_retries")? {
            policy.max_retries = value;
        }
        if let Some(value) = extract_optional(dict, "base_backoff_secs")? {
            policy.base_backoff_secs = value;
        }
        if let Some(value) = extract_optional(dict, "max_backoff_secs")? {
            policy.max_backoff_secs = value;
        }
        if let Some(value) = extract_optional(dict, "attempt_timeout_secs")? {
            policy.attempt_timeout_secs = value;
        }
    }
    Ok(policy)
}

// ========================================================================
// Projections to Python
// ========================================================================

pub fn cycle_report_to_py(py: Python, report: &CycleReport) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("attempted", report.attempted)?;
    dict.set_item("completed", report.completed)?;
    dict.set_item("deferred", report.deferred)?;
    dict.set_item("failed", report.failed)?;
    dict.set_item("conflicts", report.conflicts)?;
    dict.set_item("recovered", report.recovered)?;
    dict.set_item("skipped_offline", report.skipped_offline)?;
    Ok(dict.into())
}

pub fn queue_entry_to_py(py: Python, view: &QueueEntryView) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("id", &view.id)?;
    dict.set_item("kind", &view.kind)?;
    dict.set_item("description", &view.description)?;
    dict.set_item("amount", view.amount)?;
    dict.set_item("status", &view.status)?;
    dict.set_item("retries", view.retries)?;
    dict.set_item("priority", &view.priority)?;
    dict.set_item("created_at", view.created_at.to_rfc3339())?;
    Ok(dict.into())
}

pub fn conflict_to_py(py: Python, view: &ConflictView) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("id", &view.id)?;
    dict.set_item("transaction_id", &view.transaction_id)?;
    dict.set_item("local_version", view.local_version)?;
    dict.set_item("server_version", view.server_version)?;
    dict.set_item("description", &view.description)?;
    dict.set_item("resolution", &view.resolution)?;
    Ok(dict.into())
}

pub fn installment_to_py(py: Python, installment: &Installment) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("sequence", installment.sequence())?;
    dict.set_item("due_date", installment.due_date().to_string())?;
    dict.set_item("original_due_date", installment.original_due_date().to_string())?;
    dict.set_item("amount_due", installment.amount_due())?;
    dict.set_item("amount_paid", installment.amount_paid())?;
    dict.set_item("status", installment.status().label())?;
    Ok(dict.into())
}

pub fn schedule_to_py(py: Python, schedule: &[Installment]) -> PyResult<Py<PyList>> {
    let list = PyList::empty(py);
    for installment in schedule {
        list.append(installment_to_py(py, installment)?)?;
    }
    Ok(list.into())
}
