//! Business-date arithmetic for installment schedules
//!
//! Collection runs on calendar dates, not wall-clock time. This module
//! provides deterministic period stepping for every supported collection
//! frequency. MONTHLY uses real month arithmetic (chrono `Months`) so a loan
//! originated on the 31st never drifts: each due date is derived from the
//! origin date, never from the previous due date.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Collection frequency of a loan
///
/// Determines the spacing of installment due dates and the slack window
/// available when rescheduling a single installment.
///
/// # Example
/// ```
/// use collection_ledger_core_rs::Frequency;
/// use chrono::NaiveDate;
///
/// let origin = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let freq = Frequency::Weekly;
/// assert_eq!(freq.due_date(origin, 1), NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
/// assert_eq!(freq.due_date(origin, 2), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// One installment per calendar day
    Daily,

    /// One installment every 7 days
    Weekly,

    /// One installment every 14 days
    Biweekly,

    /// One installment per calendar month (month-length aware)
    Monthly,
}

impl Frequency {
    /// Due date of the `period`-th installment for a loan originated on `origin`
    ///
    /// Period 0 is the origin date itself; period 1 is the first installment.
    /// Always computed from the origin so rounding at month boundaries never
    /// accumulates across the schedule.
    pub fn due_date(&self, origin: NaiveDate, period: u32) -> NaiveDate {
        match self {
            Frequency::Daily => origin + Days::new(u64::from(period)),
            Frequency::Weekly => origin + Days::new(7 * u64::from(period)),
            Frequency::Biweekly => origin + Days::new(14 * u64::from(period)),
            Frequency::Monthly => origin + Months::new(period),
        }
    }

    /// Reschedule slack in days, measured from an installment's original due date
    ///
    /// A single installment may slip by at most this many days before the
    /// change needs a full restructuring (out of scope here):
    /// DAILY +2, WEEKLY +6, BIWEEKLY +14, MONTHLY +29.
    pub fn slack_days(&self) -> i64 {
        match self {
            Frequency::Daily => 2,
            Frequency::Weekly => 6,
            Frequency::Biweekly => 14,
            Frequency::Monthly => 29,
        }
    }

    /// Number of collection periods that approximate one month
    ///
    /// Used to expand article-financing plans (quoted in months) into an
    /// installment count: DAILY≈30, WEEKLY≈4, BIWEEKLY≈2, MONTHLY=1.
    pub fn periods_per_month(&self) -> u32 {
        match self {
            Frequency::Daily => 30,
            Frequency::Weekly => 4,
            Frequency::Biweekly => 2,
            Frequency::Monthly => 1,
        }
    }

    /// Short label for projections and audit descriptions
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Biweekly => "BIWEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_daily_steps() {
        let origin = d(2024, 1, 1);
        assert_eq!(Frequency::Daily.due_date(origin, 0), origin);
        assert_eq!(Frequency::Daily.due_date(origin, 31), d(2024, 2, 1));
    }

    #[test]
    fn test_biweekly_steps() {
        let origin = d(2024, 1, 1);
        assert_eq!(Frequency::Biweekly.due_date(origin, 1), d(2024, 1, 15));
        assert_eq!(Frequency::Biweekly.due_date(origin, 2), d(2024, 1, 29));
    }

    #[test]
    fn test_monthly_clamps_to_month_end_without_drift() {
        // Originated on the 31st: February clamps to the 29th (leap year),
        // but March returns to the 31st because stepping is origin-based.
        let origin = d(2024, 1, 31);
        assert_eq!(Frequency::Monthly.due_date(origin, 1), d(2024, 2, 29));
        assert_eq!(Frequency::Monthly.due_date(origin, 2), d(2024, 3, 31));
        assert_eq!(Frequency::Monthly.due_date(origin, 3), d(2024, 4, 30));
    }

    #[test]
    fn test_monthly_dates_strictly_increase() {
        let origin = d(2024, 1, 31);
        let mut prev = origin;
        for period in 1..=24 {
            let due = Frequency::Monthly.due_date(origin, period);
            assert!(due > prev, "period {} not after previous", period);
            prev = due;
        }
    }

    #[test]
    fn test_slack_table() {
        assert_eq!(Frequency::Daily.slack_days(), 2);
        assert_eq!(Frequency::Weekly.slack_days(), 6);
        assert_eq!(Frequency::Biweekly.slack_days(), 14);
        assert_eq!(Frequency::Monthly.slack_days(), 29);
    }
}
