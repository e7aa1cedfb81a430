use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::engine::error::EngineError;
use crate::model::leave_policy::{AccrualCadence, AccrualRule};

/// Balances are kept at two decimal places everywhere.
pub const BALANCE_SCALE: u32 = 2;

/// Fixed cadence lengths in calendar days. Deliberately constant, so an
/// accrual run produces the same number whichever year it lands in.
fn cadence_length_in_days(cadence: AccrualCadence) -> Decimal {
    match cadence {
        AccrualCadence::PerYear => Decimal::new(36525, 2),
        AccrualCadence::PerMonth => Decimal::new(304375, 4),
        AccrualCadence::PerWeek => Decimal::new(7, 0),
    }
}

pub fn round_to_balance_scale(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(BALANCE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Number of calendar days in the half-open period [start, end).
pub fn calendar_days(period_start: NaiveDate, period_end: NaiveDate) -> i64 {
    (period_end - period_start).num_days()
}

/// Pro-rated amount earned over [period_start, period_end) under `rule`,
/// rounded to `BALANCE_SCALE` with midpoints going away from zero.
pub fn compute_period_accrual(
    rule: &AccrualRule,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<Decimal, EngineError> {
    if rule.amount <= Decimal::ZERO {
        return Err(EngineError::InvalidPolicyRule {
            reason: format!("accrual amount {} must be positive", rule.amount),
        });
    }
    if period_end <= period_start {
        return Err(EngineError::InvalidPeriod {
            reason: format!("period end {period_end} is not after start {period_start}"),
        });
    }

    let days = Decimal::from(calendar_days(period_start, period_end));
    let earned = rule.amount * days / cadence_length_in_days(rule.cadence);
    Ok(round_to_balance_scale(earned))
}

/// Opening balance of a new period given the closing of the previous one.
/// A carry-over cap clamps a positive closing; deficits carry unclamped.
pub fn carry_over_opening(prior_closing: Decimal, carry_over_max: Option<Decimal>) -> Decimal {
    match carry_over_max {
        Some(cap) => prior_closing.min(cap),
        None => prior_closing,
    }
}

/// Amount lost to the carry-over cap at a period boundary. Zero when the
/// cap is absent or not exceeded.
pub fn carry_over_forfeit(prior_closing: Decimal, carry_over_max: Option<Decimal>) -> Decimal {
    prior_closing - carry_over_opening(prior_closing, carry_over_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn yearly(amount: Decimal) -> AccrualRule {
        AccrualRule {
            amount,
            cadence: AccrualCadence::PerYear,
        }
    }

    #[test]
    fn quarter_of_a_yearly_grant() {
        // Jan 1 through Mar 31 inclusive is 90 days in 2026.
        let accrued =
            compute_period_accrual(&yearly(dec!(25)), ymd(2026, 1, 1), ymd(2026, 4, 1)).unwrap();
        assert_eq!(accrued, dec!(6.16));
    }

    #[test]
    fn monthly_cadence_uses_average_month_length() {
        let rule = AccrualRule {
            amount: dec!(2),
            cadence: AccrualCadence::PerMonth,
        };
        // 30 days against a 30.4375-day month.
        let accrued =
            compute_period_accrual(&rule, ymd(2026, 6, 1), ymd(2026, 7, 1)).unwrap();
        assert_eq!(accrued, dec!(1.97));
    }

    #[test]
    fn weekly_cadence_over_exactly_one_week() {
        let rule = AccrualRule {
            amount: dec!(40),
            cadence: AccrualCadence::PerWeek,
        };
        let accrued =
            compute_period_accrual(&rule, ymd(2026, 3, 2), ymd(2026, 3, 9)).unwrap();
        assert_eq!(accrued, dec!(40.00));
    }

    #[test]
    fn midpoints_round_away_from_zero() {
        // 2.345 over one week accrues 2.345 exactly, which must round
        // up to 2.35 rather than to the even neighbour.
        let rule = AccrualRule {
            amount: dec!(2.345),
            cadence: AccrualCadence::PerWeek,
        };
        let accrued =
            compute_period_accrual(&rule, ymd(2026, 3, 2), ymd(2026, 3, 9)).unwrap();
        assert_eq!(accrued, dec!(2.35));
    }

    #[test]
    fn full_calendar_year_is_prorated_against_the_fixed_constant() {
        // 2025 has 365 days; the divisor stays 365.25.
        let accrued =
            compute_period_accrual(&yearly(dec!(25)), ymd(2025, 1, 1), ymd(2026, 1, 1)).unwrap();
        assert_eq!(accrued, dec!(24.98));
    }

    #[test]
    fn empty_or_inverted_periods_are_rejected() {
        let rule = yearly(dec!(25));
        assert!(compute_period_accrual(&rule, ymd(2026, 1, 1), ymd(2026, 1, 1)).is_err());
        assert!(compute_period_accrual(&rule, ymd(2026, 2, 1), ymd(2026, 1, 1)).is_err());
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        for amount in [dec!(0), dec!(-1)] {
            let err = compute_period_accrual(&yearly(amount), ymd(2026, 1, 1), ymd(2026, 2, 1))
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidPolicyRule { .. }));
        }
    }

    #[test]
    fn carry_over_clamps_only_above_the_cap() {
        assert_eq!(carry_over_opening(dec!(30), Some(dec!(5))), dec!(5));
        assert_eq!(carry_over_forfeit(dec!(30), Some(dec!(5))), dec!(25));

        assert_eq!(carry_over_opening(dec!(3.5), Some(dec!(5))), dec!(3.5));
        assert_eq!(carry_over_forfeit(dec!(3.5), Some(dec!(5))), dec!(0));

        assert_eq!(carry_over_opening(dec!(30), None), dec!(30));
        assert_eq!(carry_over_forfeit(dec!(30), None), dec!(0));
    }

    #[test]
    fn deficits_carry_through_uncapped() {
        assert_eq!(carry_over_opening(dec!(-2), Some(dec!(5))), dec!(-2));
        assert_eq!(carry_over_forfeit(dec!(-2), Some(dec!(5))), dec!(0));
    }
}
