use actix_web::{HttpResponse, http::StatusCode};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::leave_request::RequestStatus;

/// Everything the balance engine can refuse to do, mapped onto HTTP at
/// the edge so handlers can just `?` their way through.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid policy rule: {reason}")]
    InvalidPolicyRule { reason: String },

    #[error("invalid period: {reason}")]
    InvalidPeriod { reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: u64 },

    #[error("no balance period covers {date} for employee {employee_id} under policy {policy_id}")]
    NoBalancePeriod {
        employee_id: u64,
        policy_id: u64,
        date: NaiveDate,
    },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("cannot move request from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl actix_web::ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidPolicyRule { .. }
            | EngineError::InvalidPeriod { .. }
            | EngineError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::NoBalancePeriod { .. }
            | EngineError::InsufficientBalance { .. }
            | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let EngineError::Storage(e) = self {
            tracing::error!("storage error: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({ "message": "Internal server error" }));
        }
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "message": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use rust_decimal_macros::dec;

    #[test]
    fn status_codes_follow_error_class() {
        let bad = EngineError::InvalidPeriod {
            reason: "period_end before period_start".into(),
        };
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);

        let missing = EngineError::NotFound { what: "policy", id: 9 };
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let conflict = EngineError::InsufficientBalance {
            requested: dec!(5),
            available: dec!(2.5),
        };
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let transition = EngineError::InvalidTransition {
            from: RequestStatus::Rejected,
            to: RequestStatus::Approved,
        };
        assert_eq!(transition.status_code(), StatusCode::CONFLICT);

        let storage = EngineError::Storage(sqlx::Error::RowNotFound);
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn storage_response_does_not_leak_sql_detail() {
        let storage = EngineError::Storage(sqlx::Error::PoolTimedOut);
        let body = storage.error_response();
        assert_eq!(body.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn messages_name_the_offending_state() {
        let e = EngineError::InvalidTransition {
            from: RequestStatus::Draft,
            to: RequestStatus::Approved,
        };
        assert_eq!(e.to_string(), "cannot move request from draft to approved");
    }
}
