use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;

use crate::engine::accrual::round_to_balance_scale;
use crate::engine::error::EngineError;
use crate::model::leave_policy::{LeavePolicy, LeaveUnit};

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Days counted by a request spanning `start..=end` (both inclusive),
/// optionally skipping Saturdays and Sundays.
pub fn span_days(
    start: NaiveDate,
    end: NaiveDate,
    exclude_weekends: bool,
) -> Result<i64, EngineError> {
    if end < start {
        return Err(EngineError::InvalidRequest {
            reason: format!("end date {end} is before start date {start}"),
        });
    }

    let counted = start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !exclude_weekends || !is_weekend(*d))
        .count();
    Ok(counted as i64)
}

/// Quantity a request consumes when the caller does not supply one:
/// the counted day span, converted to hours for hour-denominated
/// policies via the employee's standard day length.
pub fn default_quantity(
    policy: &LeavePolicy,
    standard_daily_hours: Decimal,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Decimal, EngineError> {
    let days = Decimal::from(span_days(start, end, policy.exclude_weekends)?);
    let quantity = match policy.unit {
        LeaveUnit::Days => days,
        LeaveUnit::Hours => days * standard_daily_hours,
    };
    Ok(round_to_balance_scale(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::leave_policy::AccrualCadence;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn policy(unit: LeaveUnit, exclude_weekends: bool) -> LeavePolicy {
        LeavePolicy {
            id: 1,
            company_id: 1,
            code: "ANNUAL".into(),
            name: "Annual leave".into(),
            unit,
            accrual_amount: dec!(25),
            accrual_cadence: AccrualCadence::PerYear,
            carry_over_max: None,
            exclude_weekends,
            created_at: None,
        }
    }

    #[test]
    fn monday_to_friday_is_five_days_either_way() {
        // 2026-03-02 is a Monday.
        assert_eq!(span_days(ymd(2026, 3, 2), ymd(2026, 3, 6), false).unwrap(), 5);
        assert_eq!(span_days(ymd(2026, 3, 2), ymd(2026, 3, 6), true).unwrap(), 5);
    }

    #[test]
    fn full_week_drops_the_weekend_when_excluded() {
        assert_eq!(span_days(ymd(2026, 3, 2), ymd(2026, 3, 8), false).unwrap(), 7);
        assert_eq!(span_days(ymd(2026, 3, 2), ymd(2026, 3, 8), true).unwrap(), 5);
    }

    #[test]
    fn weekend_only_span_counts_zero_working_days() {
        assert_eq!(span_days(ymd(2026, 3, 7), ymd(2026, 3, 8), true).unwrap(), 0);
        assert_eq!(span_days(ymd(2026, 3, 7), ymd(2026, 3, 8), false).unwrap(), 2);
    }

    #[test]
    fn single_day_request_counts_one() {
        assert_eq!(span_days(ymd(2026, 3, 4), ymd(2026, 3, 4), true).unwrap(), 1);
    }

    #[test]
    fn inverted_span_is_invalid() {
        assert!(span_days(ymd(2026, 3, 6), ymd(2026, 3, 2), true).is_err());
    }

    #[test]
    fn day_policy_defaults_to_the_day_count() {
        let p = policy(LeaveUnit::Days, true);
        let q = default_quantity(&p, dec!(8), ymd(2026, 3, 2), ymd(2026, 3, 8)).unwrap();
        assert_eq!(q, dec!(5.00));
    }

    #[test]
    fn hour_policy_multiplies_by_standard_day_length() {
        let p = policy(LeaveUnit::Hours, true);
        let q = default_quantity(&p, dec!(7.5), ymd(2026, 3, 2), ymd(2026, 3, 6)).unwrap();
        assert_eq!(q, dec!(37.50));
    }

    #[test]
    fn hour_policy_counts_weekdays_before_pricing() {
        // Full week Mon-Sun: the weekend flag trims the day count for
        // hour policies too, so 5 weekdays at 8 hours, not 7 days.
        let p = policy(LeaveUnit::Hours, true);
        let q = default_quantity(&p, dec!(8), ymd(2026, 3, 2), ymd(2026, 3, 8)).unwrap();
        assert_eq!(q, dec!(40.00));
    }
}
