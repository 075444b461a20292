//! Installment model
//!
//! One scheduled repayment unit ("cuota") of a loan. The schedule generator
//! produces these; afterwards only payment and reschedule events mutate them.
//!
//! # Status lifecycle
//!
//! ```text
//! PENDING ──payment──▶ PARTIAL ──payment──▶ PAID
//!    │  ▲                 │
//!    │  └── reschedule ───┤
//!    └──▶ OVERDUE ────────┘ (due date passed while unpaid)
//!         RESCHEDULED (due date moved; original retained for audit)
//! ```
//!
//! CRITICAL: amount_paid never exceeds amount_due.

use crate::models::{StateError, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Installment status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallmentStatus {
    /// Not yet due, nothing collected
    Pending,

    /// Some amount collected, remainder still due
    Partial,

    /// Fully collected
    Paid { settled_on: NaiveDate },

    /// Due date passed while the installment was still unpaid
    Overdue { since: NaiveDate },

    /// Due date moved inside the slack window; original date retained
    Rescheduled,
}

impl InstallmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "PENDING",
            InstallmentStatus::Partial => "PARTIAL",
            InstallmentStatus::Paid { .. } => "PAID",
            InstallmentStatus::Overdue { .. } => "OVERDUE",
            InstallmentStatus::Rescheduled => "RESCHEDULED",
        }
    }
}

/// One scheduled repayment unit of a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    /// Position in the schedule, dense 1..=N
    sequence: u32,

    /// Current due date (moves on reschedule)
    due_date: NaiveDate,

    /// Due date assigned at generation; audit anchor for the slack window
    original_due_date: NaiveDate,

    /// Amount owed for this installment (cents)
    amount_due: i64,

    /// Amount collected so far (cents)
    amount_paid: i64,

    /// Current status
    status: InstallmentStatus,
}

impl Installment {
    /// Create a fresh installment as emitted by the schedule generator
    pub fn new(sequence: u32, due_date: NaiveDate, amount_due: i64) -> Self {
        assert!(amount_due > 0, "amount_due must be positive");
        assert!(sequence > 0, "sequence is 1-based");
        Self {
            sequence,
            due_date,
            original_due_date: due_date,
            amount_due,
            amount_paid: 0,
            status: InstallmentStatus::Pending,
        }
    }

    /// Restore from a checkpoint snapshot, all fields preserved
    pub fn from_snapshot(
        sequence: u32,
        due_date: NaiveDate,
        original_due_date: NaiveDate,
        amount_due: i64,
        amount_paid: i64,
        status: InstallmentStatus,
    ) -> Self {
        Self {
            sequence,
            due_date,
            original_due_date,
            amount_due,
            amount_paid,
            status,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn original_due_date(&self) -> NaiveDate {
        self.original_due_date
    }

    pub fn amount_due(&self) -> i64 {
        self.amount_due
    }

    pub fn amount_paid(&self) -> i64 {
        self.amount_paid
    }

    pub fn status(&self) -> &InstallmentStatus {
        &self.status
    }

    /// Amount still owed (cents)
    pub fn remaining_due(&self) -> i64 {
        self.amount_due - self.amount_paid
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.status, InstallmentStatus::Paid { .. })
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self.status, InstallmentStatus::Overdue { .. })
    }

    /// Apply a collected amount to this installment
    ///
    /// The amount must be positive and must not exceed the remaining due;
    /// FIFO allocation across installments is the payment recorder's job,
    /// not this model's.
    pub fn record_payment(&mut self, amount: i64, on: NaiveDate) -> Result<(), ValidationError> {
        if amount <= 0 {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        let remaining = self.remaining_due();
        if amount > remaining {
            return Err(ValidationError::ExceedsRemainingDue { amount, remaining });
        }

        self.amount_paid += amount;
        self.status = if self.amount_paid >= self.amount_due {
            InstallmentStatus::Paid { settled_on: on }
        } else {
            InstallmentStatus::Partial
        };
        Ok(())
    }

    /// Mark the installment overdue (idempotent)
    ///
    /// Keeps the original `since` date when already overdue; a fully paid
    /// installment can never become overdue.
    pub fn mark_overdue(&mut self, since: NaiveDate) -> Result<bool, StateError> {
        match self.status {
            InstallmentStatus::Pending
            | InstallmentStatus::Partial
            | InstallmentStatus::Rescheduled => {
                self.status = InstallmentStatus::Overdue { since };
                Ok(true)
            }
            InstallmentStatus::Overdue { .. } => Ok(false),
            InstallmentStatus::Paid { .. } => Err(StateError::InstallmentSettled {
                sequence: self.sequence,
            }),
        }
    }

    /// Move the due date; the original due date is retained for audit
    pub fn reschedule(&mut self, new_due: NaiveDate) -> Result<(), StateError> {
        if self.is_paid() {
            return Err(StateError::InstallmentSettled {
                sequence: self.sequence,
            });
        }
        self.due_date = new_due;
        self.status = InstallmentStatus::Rescheduled;
        Ok(())
    }
}
