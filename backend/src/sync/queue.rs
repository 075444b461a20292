//! Offline transaction queue
//!
//! Device-private store of locally recorded mutations. Entries drain in
//! priority order (HIGH payments before NORMAL loans/reschedules before LOW
//! metadata), FIFO within a class. Nothing is ever silently dropped: an
//! entry stays visible until it completes and is archived, or a human
//! explicitly withdraws or discards it.

use crate::models::requests::{MutationPayload, SubmissionRequest};
use crate::models::sync::{SyncStatus, SyncTransaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Queue operation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncQueueError {
    #[error("unknown sync transaction {0}")]
    UnknownTransaction(String),

    #[error("transaction {id} is {status}; only PENDING entries can be withdrawn")]
    NotPending { id: String, status: String },

    #[error("transaction {id} is {status}; only FAILED entries can be retried")]
    NotFailed { id: String, status: String },
}

/// UI projection of one queue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntryView {
    pub id: String,
    pub kind: String,
    pub description: String,
    pub amount: Option<i64>,
    pub status: String,
    pub retries: u32,
    pub priority: String,
    pub created_at: DateTime<Utc>,
}

/// UI projection of one recorded conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictView {
    pub id: String,
    pub transaction_id: String,
    pub local_version: u64,
    pub server_version: u64,
    pub description: String,
    pub resolution: String,
}

/// Device-private mutation queue
#[derive(Debug, Default)]
pub struct OfflineQueue {
    /// Live entries, insertion-ordered (priority applied at selection time)
    entries: Vec<SyncTransaction>,

    /// Completed or discarded entries kept for device-side audit
    archived: Vec<SyncTransaction>,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation locally; returns the queue entry id
    ///
    /// This always succeeds and never touches the network: the UI enqueues
    /// and returns immediately, observing eventual status via projections.
    pub fn enqueue(
        &mut self,
        payload: MutationPayload,
        loan_id: Option<String>,
        assumed_version: u64,
        now: DateTime<Utc>,
    ) -> String {
        let tx = SyncTransaction::new(payload, loan_id, assumed_version, now);
        let id = tx.id().to_string();
        self.entries.push(tx);
        id
    }

    pub fn get(&self, id: &str) -> Option<&SyncTransaction> {
        self.entries.iter().find(|tx| tx.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SyncTransaction> {
        self.entries.iter_mut().find(|tx| tx.id() == id)
    }

    /// Ids of entries eligible for submission, in drain order
    ///
    /// Drain order is (priority class, created_at, insertion order); the
    /// backoff gate excludes deferred entries until their delay elapses.
    pub fn ready_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut ready: Vec<(usize, &SyncTransaction)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.is_ready(now))
            .collect();
        ready.sort_by(|(ia, a), (ib, b)| {
            a.priority()
                .cmp(&b.priority())
                .then(a.created_at().cmp(&b.created_at()))
                .then(ia.cmp(ib))
        });
        ready.into_iter().map(|(_, tx)| tx.id().to_string()).collect()
    }

    /// Withdraw a PENDING entry before it enters SYNCING
    ///
    /// Once an attempt is in flight, cancellation is not honored: the
    /// attempt completes and its result is handled normally.
    pub fn withdraw(&mut self, id: &str) -> Result<SyncTransaction, SyncQueueError> {
        let position = self
            .entries
            .iter()
            .position(|tx| tx.id() == id)
            .ok_or_else(|| SyncQueueError::UnknownTransaction(id.to_string()))?;
        if !self.entries[position].is_pending() {
            return Err(SyncQueueError::NotPending {
                id: id.to_string(),
                status: self.entries[position].status().label().to_string(),
            });
        }
        Ok(self.entries.remove(position))
    }

    /// Manually requeue a FAILED entry
    pub fn retry_failed(&mut self, id: &str) -> Result<(), SyncQueueError> {
        let tx = self
            .get_mut(id)
            .ok_or_else(|| SyncQueueError::UnknownTransaction(id.to_string()))?;
        match tx.status() {
            SyncStatus::Failed { .. } => {
                tx.reset_for_retry();
                Ok(())
            }
            other => Err(SyncQueueError::NotFailed {
                id: id.to_string(),
                status: other.label().to_string(),
            }),
        }
    }

    /// Move COMPLETED entries to the archive; returns how many moved
    pub fn archive_completed(&mut self) -> usize {
        let mut archived = 0;
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].is_completed() {
                let tx = self.entries.remove(index);
                self.archived.push(tx);
                archived += 1;
            } else {
                index += 1;
            }
        }
        archived
    }

    /// Discard an entry after explicit human resolution, archiving it
    pub fn discard(&mut self, id: &str, reason: &str) -> Result<(), SyncQueueError> {
        let position = self
            .entries
            .iter()
            .position(|tx| tx.id() == id)
            .ok_or_else(|| SyncQueueError::UnknownTransaction(id.to_string()))?;
        let mut tx = self.entries.remove(position);
        tx.fail(reason);
        self.archived.push(tx);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_pending(&self) -> usize {
        self.entries.iter().filter(|tx| tx.is_pending()).count()
    }

    pub fn archived(&self) -> &[SyncTransaction] {
        &self.archived
    }

    pub fn entries(&self) -> &[SyncTransaction] {
        &self.entries
    }

    /// Build the submission request for an entry
    pub fn submission_request(&self, id: &str) -> Option<SubmissionRequest> {
        self.get(id).map(|tx| SubmissionRequest {
            client_local_id: tx.client_local_id().to_string(),
            loan_id: tx.loan_id().map(str::to_string),
            assumed_version: tx.assumed_version(),
            payload: tx.payload().clone(),
        })
    }

    /// Project live entries for the UI, in drain order
    pub fn projection(&self) -> Vec<QueueEntryView> {
        let mut ordered: Vec<(usize, &SyncTransaction)> =
            self.entries.iter().enumerate().collect();
        ordered.sort_by(|(ia, a), (ib, b)| {
            a.priority()
                .cmp(&b.priority())
                .then(a.created_at().cmp(&b.created_at()))
                .then(ia.cmp(ib))
        });
        ordered.into_iter().map(|(_, tx)| entry_view(tx)).collect()
    }
}

fn entry_view(tx: &SyncTransaction) -> QueueEntryView {
    QueueEntryView {
        id: tx.id().to_string(),
        kind: tx.kind().label().to_string(),
        description: describe(tx.payload(), tx.loan_id()),
        amount: tx.payload().amount(),
        status: tx.status().label().to_string(),
        retries: tx.retries(),
        priority: tx.priority().label().to_string(),
        created_at: tx.created_at(),
    }
}

/// Operator-facing one-line description of a queued mutation
fn describe(payload: &MutationPayload, loan_id: Option<&str>) -> String {
    let loan = loan_id.unwrap_or("(new)");
    match payload {
        MutationPayload::NewLoan(req) => format!(
            "register loan {} for {} ({} installments)",
            req.loan_id, req.client_ref, req.terms.term_count
        ),
        MutationPayload::Payment(req) => {
            format!("payment of {} on loan {}", req.amount, loan)
        }
        MutationPayload::Reschedule(req) => format!(
            "move installment {} of loan {} to {}",
            req.sequence, loan, req.proposed_date
        ),
        MutationPayload::Metadata(req) => format!("note on loan {}: {}", loan, req.note),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::{PaymentMethod, PaymentTarget};
    use crate::models::requests::{MetadataNote, PaymentRequest, RescheduleRequest};
    use chrono::{NaiveDate, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn payment_payload(amount: i64) -> MutationPayload {
        MutationPayload::Payment(PaymentRequest {
            target: PaymentTarget::Advance,
            amount,
            method: PaymentMethod::Cash,
            recorded_at: t(0),
        })
    }

    fn note_payload() -> MutationPayload {
        MutationPayload::Metadata(MetadataNote {
            note: "door closed".to_string(),
        })
    }

    fn reschedule_payload() -> MutationPayload {
        MutationPayload::Reschedule(RescheduleRequest {
            sequence: 2,
            proposed_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            reason: "travelling".to_string(),
            partial_amount: None,
        })
    }

    #[test]
    fn test_drain_order_is_priority_then_fifo() {
        let mut queue = OfflineQueue::new();
        // Enqueued oldest-first: note, reschedule, two payments
        let note = queue.enqueue(note_payload(), Some("loan-1".into()), 1, t(0));
        let resched = queue.enqueue(reschedule_payload(), Some("loan-1".into()), 1, t(1));
        let pay_1 = queue.enqueue(payment_payload(100), Some("loan-1".into()), 1, t(2));
        let pay_2 = queue.enqueue(payment_payload(200), Some("loan-1".into()), 1, t(3));

        let ready = queue.ready_ids(t(10));
        assert_eq!(ready, vec![pay_1, pay_2, resched, note]);
    }

    #[test]
    fn test_withdraw_only_pending() {
        let mut queue = OfflineQueue::new();
        let id = queue.enqueue(payment_payload(100), Some("loan-1".into()), 1, t(0));

        queue.get_mut(&id).unwrap().begin_attempt(t(1));
        let err = queue.withdraw(&id).unwrap_err();
        assert!(matches!(err, SyncQueueError::NotPending { .. }));

        queue.get_mut(&id).unwrap().defer(t(30));
        assert!(queue.withdraw(&id).is_ok());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retry_failed_only() {
        let mut queue = OfflineQueue::new();
        let id = queue.enqueue(payment_payload(100), Some("loan-1".into()), 1, t(0));

        assert!(matches!(
            queue.retry_failed(&id).unwrap_err(),
            SyncQueueError::NotFailed { .. }
        ));

        queue.get_mut(&id).unwrap().begin_attempt(t(1));
        queue.get_mut(&id).unwrap().fail("unreachable");
        queue.retry_failed(&id).unwrap();
        assert!(queue.get(&id).unwrap().is_pending());
    }

    #[test]
    fn test_archive_completed() {
        let mut queue = OfflineQueue::new();
        let done = queue.enqueue(payment_payload(100), Some("loan-1".into()), 1, t(0));
        let live = queue.enqueue(payment_payload(200), Some("loan-1".into()), 1, t(1));

        queue.get_mut(&done).unwrap().begin_attempt(t(2));
        queue.get_mut(&done).unwrap().complete(t(3));

        assert_eq!(queue.archive_completed(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.archived().len(), 1);
        assert!(queue.get(&live).is_some());
        assert!(queue.get(&done).is_none());
    }

    #[test]
    fn test_projection_carries_amounts_and_labels() {
        let mut queue = OfflineQueue::new();
        queue.enqueue(payment_payload(110_000), Some("loan-1".into()), 1, t(0));
        queue.enqueue(note_payload(), Some("loan-1".into()), 1, t(1));

        let projection = queue.projection();
        assert_eq!(projection.len(), 2);
        assert_eq!(projection[0].kind, "PAYMENT");
        assert_eq!(projection[0].amount, Some(110_000));
        assert_eq!(projection[0].status, "PENDING");
        assert_eq!(projection[0].priority, "HIGH");
        assert_eq!(projection[1].kind, "METADATA");
        assert_eq!(projection[1].amount, None);
    }
}
