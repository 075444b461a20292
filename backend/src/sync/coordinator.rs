//! Sync Coordinator
//!
//! Drives one device's offline queue toward the canonical ledger. The cycle
//! is single-threaded and cooperative: entries are processed sequentially
//! in priority order, one cycle at a time per device. The UI never waits on
//! a cycle: it enqueues and returns, observing status via projections.
//!
//! # Cycle outcomes per entry
//!
//! | Transport result        | Effect                                        |
//! |-------------------------|-----------------------------------------------|
//! | ACCEPTED                | COMPLETED, archived                           |
//! | REJECTED                | FAILED with reason (no auto-retry)            |
//! | CONFLICT                | Conflict recorded, entry parked as CONFLICT   |
//! | transport error         | retries+1, PENDING behind exponential backoff |
//! | retries > max           | FAILED requiring manual retry                 |
//!
//! Apparent duplicates resolve themselves: the ledger's idempotency memo
//! answers a replayed `client_local_id` with the original ACCEPTED response,
//! so a retried payment can never double-book. True conflicts (divergent
//! assumed versions) always wait for a human.

use crate::models::payment::{PaymentMethod, PaymentTarget};
use crate::models::requests::{
    MetadataNote, MutationPayload, NewLoanRequest, PaymentRequest, RescheduleRequest,
    SubmissionStatus,
};
use crate::models::sync::{Conflict, ConflictResolution, ConflictSide};
use crate::models::loan::LoanTerms;
use crate::sync::queue::{ConflictView, OfflineQueue, QueueEntryView, SyncQueueError};
use crate::sync::transport::LedgerTransport;
use chrono::{DateTime, Duration, Utc};

/// Device connectivity as seen by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// Canonical ledger reachable; the cycle submits
    Online,

    /// No link; the cycle holds everything PENDING
    Offline,

    /// Reduced-trust local cache node reachable, canonical ledger not.
    /// Entries are not archived on a local ack, so the cycle holds them
    /// PENDING just like OFFLINE until the canonical ledger answers.
    LocalOnly,
}

/// Connectivity source probed at the start of every cycle
///
/// The embedder supplies a real probe; tests script one.
pub trait ConnectivityProbe {
    fn probe(&mut self) -> Connectivity;
}

/// Probe that always reports the same state; embedders that receive
/// connectivity callbacks swap it via [`SyncCoordinator::set_probe`]
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub Connectivity);

impl ConnectivityProbe for FixedConnectivity {
    fn probe(&mut self) -> Connectivity {
        self.0
    }
}

/// Retry and timeout policy for the sync cycle
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Transient failures tolerated before an entry turns FAILED
    pub max_retries: u32,

    /// First backoff delay; doubles per retry
    pub base_backoff_secs: i64,

    /// Backoff cap
    pub max_backoff_secs: i64,

    /// A SYNCING attempt older than this reverts to PENDING
    pub attempt_timeout_secs: i64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff_secs: 30,
            max_backoff_secs: 900,
            attempt_timeout_secs: 120,
        }
    }
}

impl SyncPolicy {
    /// Backoff before attempt `retries`+1: base × 2^(retries−1), capped
    fn backoff(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(30);
        let delay = self
            .base_backoff_secs
            .saturating_mul(1i64 << exponent)
            .min(self.max_backoff_secs);
        Duration::seconds(delay)
    }
}

/// Summary of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Submission attempts made
    pub attempted: usize,

    /// Entries acknowledged and archived
    pub completed: usize,

    /// Entries deferred behind backoff after a transient failure
    pub deferred: usize,

    /// Entries terminally failed (rejected or retries exhausted)
    pub failed: usize,

    /// Conflicts recorded
    pub conflicts: usize,

    /// SYNCING entries reverted to PENDING by the attempt timeout
    pub recovered: usize,

    /// True when the probe reported no usable link and nothing was submitted
    pub skipped_offline: bool,
}

/// Per-device sync coordinator
pub struct SyncCoordinator<T: LedgerTransport> {
    queue: OfflineQueue,
    transport: T,
    probe: Box<dyn ConnectivityProbe>,
    policy: SyncPolicy,
    conflicts: Vec<Conflict>,
}

impl<T: LedgerTransport> SyncCoordinator<T> {
    pub fn new(transport: T, probe: Box<dyn ConnectivityProbe>, policy: SyncPolicy) -> Self {
        Self {
            queue: OfflineQueue::new(),
            transport,
            probe,
            policy,
            conflicts: Vec::new(),
        }
    }

    /// Replace the connectivity probe (e.g. when the embedder's network
    /// callbacks fire)
    pub fn set_probe(&mut self, probe: Box<dyn ConnectivityProbe>) {
        self.probe = probe;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    // ========================================================================
    // Local recording (always immediate, never touches the network)
    // ========================================================================

    /// Queue a collected payment; HIGH priority
    pub fn enqueue_payment(
        &mut self,
        loan_id: String,
        target: PaymentTarget,
        amount: i64,
        method: PaymentMethod,
        assumed_version: u64,
        now: DateTime<Utc>,
    ) -> String {
        self.queue.enqueue(
            MutationPayload::Payment(PaymentRequest {
                target,
                amount,
                method,
                recorded_at: now,
            }),
            Some(loan_id),
            assumed_version,
            now,
        )
    }

    /// Queue a loan created on this device; NORMAL priority
    pub fn enqueue_new_loan(
        &mut self,
        loan_id: String,
        client_ref: String,
        terms: LoanTerms,
        now: DateTime<Utc>,
    ) -> String {
        self.queue.enqueue(
            MutationPayload::NewLoan(NewLoanRequest {
                loan_id,
                client_ref,
                terms,
            }),
            None,
            0,
            now,
        )
    }

    /// Queue an installment reschedule; NORMAL priority
    pub fn enqueue_reschedule(
        &mut self,
        loan_id: String,
        request: RescheduleRequest,
        assumed_version: u64,
        now: DateTime<Utc>,
    ) -> String {
        self.queue.enqueue(
            MutationPayload::Reschedule(request),
            Some(loan_id),
            assumed_version,
            now,
        )
    }

    /// Queue a loan annotation; LOW priority
    pub fn enqueue_note(
        &mut self,
        loan_id: String,
        note: String,
        assumed_version: u64,
        now: DateTime<Utc>,
    ) -> String {
        self.queue.enqueue(
            MutationPayload::Metadata(MetadataNote { note }),
            Some(loan_id),
            assumed_version,
            now,
        )
    }

    /// Withdraw a PENDING entry (cancellation before submission)
    pub fn withdraw(&mut self, id: &str) -> Result<(), SyncQueueError> {
        self.queue.withdraw(id).map(|_| ())
    }

    /// Manually requeue a FAILED entry
    pub fn retry(&mut self, id: &str) -> Result<(), SyncQueueError> {
        self.queue.retry_failed(id)
    }

    // ========================================================================
    // Sync cycle
    // ========================================================================

    /// Run one cooperative sync cycle
    ///
    /// Recovers stalled attempts, probes connectivity, then drains ready
    /// entries in priority order. Returns a summary for the UI/log.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            recovered: self.recover_stalled(now),
            ..CycleReport::default()
        };

        match self.probe.probe() {
            Connectivity::Online => {}
            Connectivity::Offline | Connectivity::LocalOnly => {
                report.skipped_offline = true;
                return report;
            }
        }

        let today = now.date_naive();
        for id in self.queue.ready_ids(now) {
            let request = self
                .queue
                .submission_request(&id)
                .expect("ready entry exists");
            let retries = self.queue.get(&id).map(|tx| tx.retries()).unwrap_or(0);
            self.queue
                .get_mut(&id)
                .expect("ready entry exists")
                .begin_attempt(now);
            report.attempted += 1;

            match self.transport.submit(&request, today) {
                Ok(response) => match response.status {
                    SubmissionStatus::Accepted => {
                        self.queue.get_mut(&id).unwrap().complete(now);
                        report.completed += 1;
                    }
                    SubmissionStatus::Rejected => {
                        let reason = response
                            .reason
                            .unwrap_or_else(|| "rejected by ledger".to_string());
                        self.queue.get_mut(&id).unwrap().fail(reason);
                        report.failed += 1;
                    }
                    SubmissionStatus::Conflict => {
                        let description = response
                            .reason
                            .unwrap_or_else(|| "version mismatch".to_string());
                        let conflict = Conflict::new(
                            id.clone(),
                            request.assumed_version,
                            response.server_version,
                            description,
                        );
                        self.queue
                            .get_mut(&id)
                            .unwrap()
                            .mark_conflict(conflict.id.clone());
                        self.conflicts.push(conflict);
                        report.conflicts += 1;
                    }
                },
                Err(transport_error) => {
                    let attempt = retries + 1;
                    if attempt > self.policy.max_retries {
                        self.queue.get_mut(&id).unwrap().fail(format!(
                            "retries exhausted after {} attempts: {}",
                            attempt, transport_error
                        ));
                        report.failed += 1;
                    } else {
                        let gate = now + self.policy.backoff(attempt);
                        self.queue.get_mut(&id).unwrap().defer(gate);
                        report.deferred += 1;
                    }
                }
            }
        }

        self.queue.archive_completed();
        report
    }

    /// Revert SYNCING entries whose attempt exceeded the timeout
    ///
    /// The attempt may still land on the server; the idempotency key makes
    /// the eventual resubmission harmless.
    pub fn recover_stalled(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = Duration::seconds(self.policy.attempt_timeout_secs);
        let stalled: Vec<String> = self
            .queue
            .entries()
            .iter()
            .filter(|tx| {
                tx.syncing_since()
                    .map(|started| now - started > timeout)
                    .unwrap_or(false)
            })
            .map(|tx| tx.id().to_string())
            .collect();

        for id in &stalled {
            let tx = self.queue.get_mut(id).expect("stalled entry exists");
            if tx.retries() + 1 > self.policy.max_retries {
                tx.fail("attempt timed out and retries exhausted");
            } else {
                tx.defer(now);
            }
        }
        stalled.len()
    }

    // ========================================================================
    // Conflict handling
    // ========================================================================

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn pending_conflicts(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_pending()).count()
    }

    /// Keep the local mutation: rebase it onto the server version and
    /// requeue it for the next cycle
    pub fn resolve_keep_local(&mut self, conflict_id: &str) -> Result<(), SyncQueueError> {
        let conflict = self.find_conflict(conflict_id)?;
        let (transaction_ref, server_version) =
            (conflict.transaction_ref.clone(), conflict.server_version);

        let tx = self
            .queue
            .get_mut(&transaction_ref)
            .ok_or_else(|| SyncQueueError::UnknownTransaction(transaction_ref.clone()))?;
        tx.rebase_version(server_version);
        tx.reset_for_retry();

        self.find_conflict_mut(conflict_id)?.resolution = ConflictResolution::Resolved {
            kept: ConflictSide::Local,
        };
        Ok(())
    }

    /// Keep the server state: explicitly discard the local mutation
    pub fn resolve_keep_server(&mut self, conflict_id: &str) -> Result<(), SyncQueueError> {
        let transaction_ref = self.find_conflict(conflict_id)?.transaction_ref.clone();
        self.queue
            .discard(&transaction_ref, "discarded: server version kept")?;
        self.find_conflict_mut(conflict_id)?.resolution = ConflictResolution::Resolved {
            kept: ConflictSide::Server,
        };
        Ok(())
    }

    /// Leave the conflict unresolved; the transaction stays parked
    pub fn ignore_conflict(&mut self, conflict_id: &str) -> Result<(), SyncQueueError> {
        self.find_conflict_mut(conflict_id)?.resolution = ConflictResolution::Ignored;
        Ok(())
    }

    fn find_conflict(&self, conflict_id: &str) -> Result<&Conflict, SyncQueueError> {
        self.conflicts
            .iter()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| SyncQueueError::UnknownTransaction(conflict_id.to_string()))
    }

    fn find_conflict_mut(&mut self, conflict_id: &str) -> Result<&mut Conflict, SyncQueueError> {
        self.conflicts
            .iter_mut()
            .find(|c| c.id == conflict_id)
            .ok_or_else(|| SyncQueueError::UnknownTransaction(conflict_id.to_string()))
    }

    // ========================================================================
    // Projections
    // ========================================================================

    pub fn queue_projection(&self) -> Vec<QueueEntryView> {
        self.queue.projection()
    }

    pub fn conflict_projection(&self) -> Vec<ConflictView> {
        self.conflicts
            .iter()
            .map(|conflict| ConflictView {
                id: conflict.id.clone(),
                transaction_id: conflict.transaction_ref.clone(),
                local_version: conflict.local_version,
                server_version: conflict.server_version,
                description: conflict.description.clone(),
                resolution: match &conflict.resolution {
                    ConflictResolution::Pending => "PENDING".to_string(),
                    ConflictResolution::Resolved {
                        kept: ConflictSide::Local,
                    } => "RESOLVED_LOCAL".to_string(),
                    ConflictResolution::Resolved {
                        kept: ConflictSide::Server,
                    } => "RESOLVED_SERVER".to_string(),
                    ConflictResolution::Ignored => "IGNORED".to_string(),
                },
            })
            .collect()
    }
}
