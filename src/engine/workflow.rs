use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySqlConnection, MySqlPool, Row};

use crate::engine::accrual::round_to_balance_scale;
use crate::engine::days::default_quantity;
use crate::engine::error::EngineError;
use crate::engine::{ledger, projector};
use crate::model::leave_policy::LeavePolicy;
use crate::model::leave_request::{LeaveRequest, RequestStatus};

const REQUEST_COLUMNS: &str = "id, employee_id, policy_id, start_date, end_date, unit, quantity, \
     status, reason, approver_id, approver_note, approved_at, created_at, updated_at";

pub async fn fetch_request(
    conn: &mut MySqlConnection,
    id: u64,
) -> Result<LeaveRequest, EngineError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM leave_requests WHERE id = ?");
    sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(EngineError::NotFound {
            what: "leave request",
            id,
        })
}

pub async fn get_request(pool: &MySqlPool, id: u64) -> Result<LeaveRequest, EngineError> {
    let mut conn = pool.acquire().await?;
    fetch_request(&mut conn, id).await
}

/* =========================
Create (draft)
========================= */

/// Create a request in draft. The quantity defaults to the day-count
/// rule over the span (converted for hour policies) unless the caller
/// supplies an explicit override such as a half day.
pub async fn create(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    employee_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    quantity_override: Option<Decimal>,
    reason: Option<String>,
) -> Result<LeaveRequest, EngineError> {
    if end_date < start_date {
        return Err(EngineError::InvalidRequest {
            reason: format!("end date {end_date} is before start date {start_date}"),
        });
    }

    let employee = sqlx::query(
        "SELECT company_id, standard_daily_hours FROM employees WHERE id = ?",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or(EngineError::NotFound {
        what: "employee",
        id: employee_id,
    })?;
    let company_id: u64 = employee.get("company_id");
    let standard_daily_hours: Decimal = employee.get("standard_daily_hours");

    if company_id != policy.company_id {
        return Err(EngineError::InvalidRequest {
            reason: format!(
                "employee {employee_id} does not belong to the company owning policy {}",
                policy.code
            ),
        });
    }

    let quantity = match quantity_override {
        Some(q) => round_to_balance_scale(q),
        None => default_quantity(policy, standard_daily_hours, start_date, end_date)?,
    };
    if quantity <= Decimal::ZERO {
        return Err(EngineError::InvalidRequest {
            reason: format!("quantity {quantity} must be positive"),
        });
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (employee_id, policy_id, start_date, end_date, unit, quantity, status, reason)
        VALUES (?, ?, ?, ?, ?, ?, 'draft', ?)
        "#,
    )
    .bind(employee_id)
    .bind(policy.id)
    .bind(start_date)
    .bind(end_date)
    .bind(policy.unit)
    .bind(quantity)
    .bind(&reason)
    .execute(pool)
    .await?;

    get_request(pool, inserted.last_insert_id()).await
}

/* =========================
Submit
========================= */

/// Draft to submitted, gated on the projector: the request must fit
/// inside currently available balance or the caller gets a blocking
/// `InsufficientBalance` instead of a silently truncated request.
pub async fn submit(pool: &MySqlPool, request_id: u64) -> Result<LeaveRequest, EngineError> {
    let mut tx = pool.begin().await?;

    let request = fetch_request(&mut tx, request_id).await?;
    if !request.status.can_transition_to(RequestStatus::Submitted) {
        return Err(EngineError::InvalidTransition {
            from: request.status,
            to: RequestStatus::Submitted,
        });
    }

    let available = projector::available_balance_in(
        &mut tx,
        request.employee_id,
        request.policy_id,
        request.start_date,
    )
    .await?;
    if !ledger::admits_delta(available, request.quantity) {
        return Err(EngineError::InsufficientBalance {
            requested: request.quantity,
            available,
        });
    }

    let result = sqlx::query(
        "UPDATE leave_requests SET status = 'submitted' WHERE id = ? AND status = 'draft'",
    )
    .bind(request_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        // Lost a race with another transition on the same row.
        let current = fetch_request(&mut tx, request_id).await?;
        return Err(EngineError::InvalidTransition {
            from: current.status,
            to: RequestStatus::Submitted,
        });
    }

    let submitted = fetch_request(&mut tx, request_id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id,
        employee_id = submitted.employee_id,
        policy_id = submitted.policy_id,
        quantity = %submitted.quantity,
        "leave request submitted"
    );
    Ok(submitted)
}

/* =========================
Approve
========================= */

/// Submitted to approved, spending the balance. The status flip, the
/// availability re-check and the ledger spend sit in one transaction;
/// any failure rolls the whole thing back and the request stays
/// submitted for the approver to resolve.
///
/// The flip happens before the re-check so the request's own pending
/// reservation no longer counts against it, while everyone else's
/// submitted requests still do.
pub async fn approve(
    pool: &MySqlPool,
    request_id: u64,
    approver_id: u64,
) -> Result<LeaveRequest, EngineError> {
    let mut tx = pool.begin().await?;

    let request = fetch_request(&mut tx, request_id).await?;
    if !request.status.can_transition_to(RequestStatus::Approved) {
        return Err(EngineError::InvalidTransition {
            from: request.status,
            to: RequestStatus::Approved,
        });
    }

    let result = sqlx::query(
        "UPDATE leave_requests \
         SET status = 'approved', approver_id = ?, approved_at = ? \
         WHERE id = ? AND status = 'submitted'",
    )
    .bind(approver_id)
    .bind(Utc::now())
    .bind(request_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        let current = fetch_request(&mut tx, request_id).await?;
        return Err(EngineError::InvalidTransition {
            from: current.status,
            to: RequestStatus::Approved,
        });
    }

    let available = projector::available_balance_in(
        &mut tx,
        request.employee_id,
        request.policy_id,
        request.start_date,
    )
    .await?;
    if !ledger::admits_delta(available, request.quantity) {
        return Err(EngineError::InsufficientBalance {
            requested: request.quantity,
            available,
        });
    }

    ledger::adjust_taken(
        &mut tx,
        request.employee_id,
        request.policy_id,
        request.start_date,
        request.quantity,
    )
    .await?;

    let approved = fetch_request(&mut tx, request_id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id,
        approver_id,
        employee_id = approved.employee_id,
        quantity = %approved.quantity,
        "leave request approved"
    );
    Ok(approved)
}

/* =========================
Reject
========================= */

/// Submitted to rejected. No ledger effect; the employee's reason
/// stays untouched and the approver's note lands in its own column.
pub async fn reject(
    pool: &MySqlPool,
    request_id: u64,
    approver_id: u64,
    note: Option<String>,
) -> Result<LeaveRequest, EngineError> {
    let result = sqlx::query(
        "UPDATE leave_requests \
         SET status = 'rejected', approver_id = ?, approver_note = ? \
         WHERE id = ? AND status = 'submitted'",
    )
    .bind(approver_id)
    .bind(&note)
    .bind(request_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let current = get_request(pool, request_id).await?;
        return Err(EngineError::InvalidTransition {
            from: current.status,
            to: RequestStatus::Rejected,
        });
    }

    get_request(pool, request_id).await
}

/* =========================
Cancel
========================= */

/// Submitted or approved to cancelled. Cancelling an approved request
/// reverses its spend in the same transaction as the status flip.
pub async fn cancel(pool: &MySqlPool, request_id: u64) -> Result<LeaveRequest, EngineError> {
    let mut tx = pool.begin().await?;

    let request = fetch_request(&mut tx, request_id).await?;
    if !request.status.can_transition_to(RequestStatus::Cancelled) {
        return Err(EngineError::InvalidTransition {
            from: request.status,
            to: RequestStatus::Cancelled,
        });
    }

    let prior_status = request.status;
    let result = sqlx::query(
        "UPDATE leave_requests SET status = 'cancelled' WHERE id = ? AND status = ?",
    )
    .bind(request_id)
    .bind(prior_status)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        let current = fetch_request(&mut tx, request_id).await?;
        return Err(EngineError::InvalidTransition {
            from: current.status,
            to: RequestStatus::Cancelled,
        });
    }

    if prior_status == RequestStatus::Approved {
        ledger::adjust_taken(
            &mut tx,
            request.employee_id,
            request.policy_id,
            request.start_date,
            -request.quantity,
        )
        .await?;
    }

    let cancelled = fetch_request(&mut tx, request_id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id,
        employee_id = cancelled.employee_id,
        reversed = prior_status == RequestStatus::Approved,
        "leave request cancelled"
    );
    Ok(cancelled)
}
