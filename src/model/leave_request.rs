use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::model::leave_policy::LeaveUnit;

/// Lifecycle state of a leave request.
///
/// Allowed transitions:
/// draft -> submitted, submitted -> approved | rejected | cancelled,
/// approved -> cancelled. Rejected and cancelled are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Display, EnumString, ToSchema,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Submitted, Approved)
                | (Submitted, Rejected)
                | (Submitted, Cancelled)
                | (Approved, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Rejected | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    #[schema(example = 42)]
    pub id: u64,
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    #[schema(example = "2026-03-02", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    /// Inclusive last day of leave.
    #[schema(example = "2026-03-06", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    /// Snapshot of the policy's unit at creation time. Always matches
    /// the referenced policy.
    #[schema(example = "days")]
    pub unit: LeaveUnit,
    /// Amount of `unit` this request consumes once approved.
    #[schema(example = "5.00", value_type = String)]
    pub quantity: Decimal,
    #[schema(example = "submitted")]
    pub status: RequestStatus,
    #[schema(example = "family trip", nullable = true)]
    pub reason: Option<String>,
    /// User who approved or rejected the request.
    #[schema(example = 3, nullable = true)]
    pub approver_id: Option<u64>,
    #[schema(example = "overlaps team offsite", nullable = true)]
    pub approver_note: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub approved_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_only_be_submitted() {
        use RequestStatus::*;
        assert!(Draft.can_transition_to(Submitted));
        for next in [Approved, Rejected, Cancelled, Draft] {
            assert!(!Draft.can_transition_to(next));
        }
    }

    #[test]
    fn submitted_fans_out_to_three_states() {
        use RequestStatus::*;
        assert!(Submitted.can_transition_to(Approved));
        assert!(Submitted.can_transition_to(Rejected));
        assert!(Submitted.can_transition_to(Cancelled));
        assert!(!Submitted.can_transition_to(Draft));
    }

    #[test]
    fn approved_can_still_be_cancelled() {
        use RequestStatus::*;
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Submitted));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        use RequestStatus::*;
        for terminal in [Rejected, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Draft, Submitted, Approved, Rejected, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_text_matches_storage_format() {
        assert_eq!(RequestStatus::Submitted.to_string(), "submitted");
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert!("archived".parse::<RequestStatus>().is_err());
    }
}
