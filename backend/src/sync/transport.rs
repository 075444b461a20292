//! Submission boundary to the canonical ledger
//!
//! The coordinator never touches ledger state directly: every mutation
//! crosses this trait. Transport errors are transient by definition;
//! validation, state, and version problems travel inside a successful
//! [`SubmissionResponse`], not as transport failures.

use crate::ledger::service::LedgerService;
use crate::models::requests::{SubmissionRequest, SubmissionResponse};
use chrono::NaiveDate;
use thiserror::Error;

/// Transient transport failure; always retryable with backoff
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("ledger endpoint unreachable")]
    Unreachable,

    #[error("submission attempt timed out")]
    Timeout,
}

/// One-way submission channel to the canonical ledger
pub trait LedgerTransport {
    /// Submit a mutation; `today` is the ledger business date to apply under
    fn submit(
        &mut self,
        request: &SubmissionRequest,
        today: NaiveDate,
    ) -> Result<SubmissionResponse, TransportError>;
}

/// Transport wrapping an in-process [`LedgerService`]
///
/// Used by tests and single-host embeddings; a networked deployment
/// implements [`LedgerTransport`] over its own wire instead.
#[derive(Debug, Default)]
pub struct InProcessTransport {
    ledger: LedgerService,
}

impl InProcessTransport {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut LedgerService {
        &mut self.ledger
    }
}

impl LedgerTransport for InProcessTransport {
    fn submit(
        &mut self,
        request: &SubmissionRequest,
        today: NaiveDate,
    ) -> Result<SubmissionResponse, TransportError> {
        Ok(self.ledger.submit(request, today))
    }
}
