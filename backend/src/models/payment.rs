//! Payment event model
//!
//! A payment event is the atomic record of cash collected in the field. It
//! carries the device-assigned `client_local_id` that the canonical ledger
//! uses as its exactly-once idempotency key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the money was collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Other,
}

/// Where a payment is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum PaymentTarget {
    /// Apply to exactly one installment; overflow above its remaining due
    /// is rejected
    Installment { sequence: u32 },

    /// Advance payment ("abono"): allocate FIFO across outstanding
    /// installments in sequence order until exhausted
    Advance,
}

/// A validated payment collected against a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Unique payment identifier (UUID)
    pub id: String,

    /// Loan the payment belongs to
    pub loan_ref: String,

    /// Allocation target
    pub target: PaymentTarget,

    /// Collected amount (cents), always positive
    pub amount: i64,

    /// Collection method
    pub method: PaymentMethod,

    /// Wall-clock moment the agent recorded the collection on the device
    pub recorded_at: DateTime<Utc>,

    /// Device-assigned idempotency key; the ledger applies at most one
    /// mutation per value of this field
    pub client_local_id: String,
}

/// One slice of a payment applied to a single installment
///
/// Targeted payments produce exactly one allocation; advance payments
/// produce one per installment they touched, in sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub sequence: u32,
    pub amount: i64,
}

impl PaymentEvent {
    pub fn new(
        loan_ref: String,
        target: PaymentTarget,
        amount: i64,
        method: PaymentMethod,
        recorded_at: DateTime<Utc>,
        client_local_id: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            loan_ref,
            target,
            amount,
            method,
            recorded_at,
            client_local_id,
        }
    }
}
