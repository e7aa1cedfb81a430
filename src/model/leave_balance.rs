use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One employee's balance for one policy over one accrual period.
///
/// Periods are half open: `period_start` is covered, `period_end` is the
/// first day of the next period. Identity is the composite
/// (employee_id, policy_id, period_start); there is no surrogate id.
///
/// `closing` is stored denormalized so that concurrent spends can be
/// guarded with a single conditional UPDATE, but it must always equal
/// `opening + accrued + adjusted - taken`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "employee_id": 7,
        "policy_id": 1,
        "period_start": "2026-01-01",
        "period_end": "2026-04-01",
        "opening": "5.00",
        "accrued": "6.16",
        "taken": "2.00",
        "adjusted": "0.00",
        "closing": "9.16"
    })
)]
pub struct LeaveBalance {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-04-01", value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[schema(example = "5.00", value_type = String)]
    pub opening: Decimal,
    #[schema(example = "6.16", value_type = String)]
    pub accrued: Decimal,
    #[schema(example = "2.00", value_type = String)]
    pub taken: Decimal,
    #[schema(example = "0.00", value_type = String)]
    pub adjusted: Decimal,
    #[schema(example = "9.16", value_type = String)]
    pub closing: Decimal,
}

impl LeaveBalance {
    pub fn computed_closing(&self) -> Decimal {
        self.opening + self.accrued + self.adjusted - self.taken
    }

    pub fn is_consistent(&self) -> bool {
        self.closing == self.computed_closing()
    }

    /// Whether `date` falls inside this row's period.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.period_start <= date && date < self.period_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> LeaveBalance {
        LeaveBalance {
            employee_id: 7,
            policy_id: 1,
            period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            opening: dec!(5.00),
            accrued: dec!(6.16),
            taken: dec!(2.00),
            adjusted: dec!(0.00),
            closing: dec!(9.16),
        }
    }

    #[test]
    fn closing_matches_ledger_identity() {
        let row = sample();
        assert!(row.is_consistent());
        assert_eq!(row.computed_closing(), dec!(9.16));
    }

    #[test]
    fn detects_drift_between_closing_and_deltas() {
        let mut row = sample();
        row.closing = dec!(9.17);
        assert!(!row.is_consistent());
    }

    #[test]
    fn spend_and_reversal_restore_closing_exactly() {
        let mut row = sample();
        let before = row.closing;

        row.taken += dec!(3.5);
        row.closing = row.computed_closing();
        assert_eq!(row.closing, dec!(5.66));

        row.taken -= dec!(3.5);
        row.closing = row.computed_closing();
        assert_eq!(row.closing, before);
    }

    #[test]
    fn decimals_serialize_as_strings() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["opening"], serde_json::json!("5.00"));
        assert_eq!(v["closing"], serde_json::json!("9.16"));
    }

    #[test]
    fn period_end_is_exclusive() {
        let row = sample();
        assert!(row.covers(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
        assert!(row.covers(NaiveDate::from_ymd_opt(2026, 3, 31).unwrap()));
        assert!(!row.covers(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()));
        assert!(!row.covers(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()));
    }
}
