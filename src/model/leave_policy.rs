use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::engine::error::EngineError;

/// Unit a policy accrues in. Requests against the policy are quantified in
/// the same unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, ToSchema,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveUnit {
    Days,
    Hours,
}

/// How often the accrual amount is earned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, ToSchema,
)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccrualCadence {
    PerYear,
    PerMonth,
    PerWeek,
}

/// Structured accrual rule: `amount` units earned per one cadence unit
/// elapsed, pro-rated by calendar days for partial periods.
///
/// The legacy free-text form ("25 days per year") is accepted through
/// `FromStr`; the engine only ever sees this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{} {}", amount, cadence)]
pub struct AccrualRule {
    pub amount: Decimal,
    pub cadence: AccrualCadence,
}

impl std::str::FromStr for AccrualRule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let tokens: Vec<&str> = lowered.split_whitespace().collect();
        let unparseable = || EngineError::InvalidPolicyRule {
            reason: format!("unparseable accrual rule: `{}`", s.trim()),
        };

        let (first, mut rest) = tokens.split_first().ok_or_else(unparseable)?;
        let amount: Decimal = first.parse().map_err(|_| unparseable())?;
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidPolicyRule {
                reason: "accrual amount must be positive".into(),
            });
        }

        // Tolerate an optional unit word ("25 days per year").
        if matches!(rest.first(), Some(&"day") | Some(&"days") | Some(&"hour") | Some(&"hours")) {
            rest = &rest[1..];
        }

        let cadence = match rest {
            ["per", "year"] | ["per_year"] | ["yearly"] => AccrualCadence::PerYear,
            ["per", "month"] | ["per_month"] | ["monthly"] => AccrualCadence::PerMonth,
            ["per", "week"] | ["per_week"] | ["weekly"] => AccrualCadence::PerWeek,
            _ => return Err(unparseable()),
        };

        Ok(AccrualRule { amount, cadence })
    }
}

/// A leave type (annual, sick, ...) scoped to one company.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "company_id": 1,
        "code": "ANNUAL",
        "name": "Annual leave",
        "unit": "days",
        "accrual_amount": "25.00",
        "accrual_cadence": "per_year",
        "carry_over_max": "5.00",
        "exclude_weekends": true,
        "created_at": "2026-01-01T00:00:00Z"
    })
)]
pub struct LeavePolicy {
    #[schema(example = 1)]
    pub id: u64,

    /// Owning tenant. Policy codes are unique within a company.
    #[schema(example = 1)]
    pub company_id: u64,

    /// Short identifier, uppercase, at most 10 characters.
    #[schema(example = "ANNUAL")]
    pub code: String,

    #[schema(example = "Annual leave")]
    pub name: String,

    #[schema(example = "days")]
    pub unit: LeaveUnit,

    #[schema(example = "25.00", value_type = String)]
    pub accrual_amount: Decimal,

    #[schema(example = "per_year")]
    pub accrual_cadence: AccrualCadence,

    /// Largest closing balance allowed to roll into the next period.
    /// `None` carries everything over.
    #[schema(example = "5.00", value_type = Option<String>, nullable = true)]
    pub carry_over_max: Option<Decimal>,

    /// When true, weekends do not count towards a request's default quantity.
    #[schema(example = true)]
    pub exclude_weekends: bool,

    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = Option<String>)]
    pub created_at: Option<DateTime<Utc>>,
}

impl LeavePolicy {
    pub fn rule(&self) -> AccrualRule {
        AccrualRule {
            amount: self.accrual_amount,
            cadence: self.accrual_cadence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_legacy_rule_text() {
        let rule: AccrualRule = "25 days per year".parse().unwrap();
        assert_eq!(rule.amount, dec!(25));
        assert_eq!(rule.cadence, AccrualCadence::PerYear);

        let rule: AccrualRule = "1.25 per month".parse().unwrap();
        assert_eq!(rule.amount, dec!(1.25));
        assert_eq!(rule.cadence, AccrualCadence::PerMonth);

        let rule: AccrualRule = "40 hours per week".parse().unwrap();
        assert_eq!(rule.amount, dec!(40));
        assert_eq!(rule.cadence, AccrualCadence::PerWeek);
    }

    #[test]
    fn rule_text_round_trips_through_display() {
        let rule: AccrualRule = "12.5 per_month".parse().unwrap();
        let reparsed: AccrualRule = rule.to_string().parse().unwrap();
        assert_eq!(rule, reparsed);
    }

    #[test]
    fn rejects_malformed_rule_text() {
        for text in ["", "per year", "days per year", "25 days", "25 days per decade"] {
            assert!(
                text.parse::<AccrualRule>().is_err(),
                "`{text}` should not parse"
            );
        }
    }

    #[test]
    fn rejects_non_positive_amount() {
        assert!("0 days per year".parse::<AccrualRule>().is_err());
        assert!("-3 days per month".parse::<AccrualRule>().is_err());
    }
}
