//! Ledger State
//!
//! Holds every loan and its installment schedule. This is the canonical
//! state that the ledger service mutates and the sync protocol converges
//! devices toward.
//!
//! # Critical Invariants
//!
//! 1. **Total Conservation**: for every loan, Σ amount_due never changes
//!    after the schedule is committed
//! 2. **Dense Sequences**: installments are stored in sequence order 1..=N
//! 3. **No Orphans**: every schedule belongs to a registered loan
//! 4. **Bounded Payment**: amount_paid ≤ amount_due on every installment

use crate::models::installment::Installment;
use crate::models::loan::Loan;
use std::collections::BTreeMap;

/// Canonical ledger state: loans and their schedules
///
/// BTreeMaps keep iteration deterministic, so projections, snapshots, and
/// replay all observe the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerState {
    /// All loans, indexed by loan id
    loans: BTreeMap<String, Loan>,

    /// Installment schedules, indexed by loan id, sequence-ordered
    schedules: BTreeMap<String, Vec<Installment>>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loan together with its generated schedule
    ///
    /// # Panics
    ///
    /// Panics if the loan id is already registered (duplicate registration
    /// is screened by the service before reaching state).
    pub fn add_loan(&mut self, loan: Loan, schedule: Vec<Installment>) {
        let id = loan.id().to_string();
        assert!(
            !self.loans.contains_key(&id),
            "loan {} already registered",
            id
        );
        self.loans.insert(id.clone(), loan);
        self.schedules.insert(id, schedule);
    }

    pub fn loan(&self, loan_id: &str) -> Option<&Loan> {
        self.loans.get(loan_id)
    }

    pub fn loan_mut(&mut self, loan_id: &str) -> Option<&mut Loan> {
        self.loans.get_mut(loan_id)
    }

    pub fn schedule(&self, loan_id: &str) -> Option<&[Installment]> {
        self.schedules.get(loan_id).map(|v| v.as_slice())
    }

    pub fn schedule_mut(&mut self, loan_id: &str) -> Option<&mut Vec<Installment>> {
        self.schedules.get_mut(loan_id)
    }

    pub fn loans(&self) -> &BTreeMap<String, Loan> {
        &self.loans
    }

    pub fn num_loans(&self) -> usize {
        self.loans.len()
    }

    /// Total still owed across a loan's schedule (cents)
    pub fn outstanding(&self, loan_id: &str) -> i64 {
        self.schedules
            .get(loan_id)
            .map(|installments| installments.iter().map(|i| i.remaining_due()).sum())
            .unwrap_or(0)
    }

    /// Sum of amount_due across a loan's schedule (cents)
    ///
    /// Constant after schedule commit; used by invariant checks.
    pub fn scheduled_total(&self, loan_id: &str) -> i64 {
        self.schedules
            .get(loan_id)
            .map(|installments| installments.iter().map(|i| i.amount_due()).sum())
            .unwrap_or(0)
    }

    /// True when every installment of the loan is fully paid
    pub fn all_installments_paid(&self, loan_id: &str) -> bool {
        self.schedules
            .get(loan_id)
            .map(|installments| installments.iter().all(|i| i.is_paid()))
            .unwrap_or(false)
    }
}
