use crate::auth::auth::AuthUser;
use crate::engine::error::EngineError;
use crate::engine::workflow;
use crate::model::leave_request::{LeaveRequest, RequestStatus};
use crate::utils::policy_cache;
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = 1)]
    pub policy_id: u64,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-03-06", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    /// Overrides the computed day-count quantity, e.g. "0.50" for a
    /// half day. Omit to let the engine count the span.
    #[schema(example = "5.00", value_type = Option<String>, nullable = true)]
    pub quantity: Option<Decimal>,
    #[schema(example = "family trip", nullable = true)]
    pub reason: Option<String>,
    /// HR/Admin may file on behalf of another employee
    #[schema(example = 7, nullable = true)]
    pub employee_id: Option<u64>,
    /// Submit immediately instead of leaving the request in draft
    #[schema(example = true, nullable = true)]
    pub submit: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct RejectLeave {
    /// Approver's note, kept separate from the employee's reason
    #[schema(example = "overlaps team offsite", nullable = true)]
    pub note: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by employee ID
    #[schema(example = 7)]
    pub employee_id: Option<u64>,
    /// Filter by policy ID
    #[schema(example = 1)]
    pub policy_id: Option<u64>,
    /// Filter by request status
    #[schema(example = "submitted")]
    pub status: Option<String>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u64>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request created", body = LeaveRequest),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Insufficient balance on immediate submit")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> actix_web::Result<impl Responder> {
    let employee_id = match payload.employee_id {
        Some(id) => {
            auth.require_self_or_staff(id)?;
            id
        }
        None => auth
            .employee_id
            .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?,
    };

    let policy = policy_cache::get_policy(pool.get_ref(), payload.policy_id).await?;

    let request = workflow::create(
        pool.get_ref(),
        &policy,
        employee_id,
        payload.start_date,
        payload.end_date,
        payload.quantity,
        payload.reason.clone(),
    )
    .await?;

    let request = if payload.submit.unwrap_or(false) {
        workflow::submit(pool.get_ref(), request.id).await?
    } else {
        request
    };

    Ok(HttpResponse::Created().json(request))
}

/* =========================
Submit leave
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/submit",
    params(
        ("leave_id" = u64, Path, description = "ID of the draft to submit")
    ),
    responses(
        (status = 200, description = "Leave request submitted", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Not a draft, or insufficient balance")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn submit_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let request = workflow::get_request(pool.get_ref(), leave_id).await?;
    auth.require_self_or_staff(request.employee_id)?;

    let submitted = workflow::submit(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(submitted))
}

/* =========================
Approve leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved, balance spent", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Not submitted, or insufficient balance", body = Object, example = json!({
            "message": "insufficient balance: requested 5.00, available 1.16"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let leave_id = path.into_inner();
    let approved = workflow::approve(pool.get_ref(), leave_id, auth.user_id).await?;

    Ok(HttpResponse::Ok().json(approved))
}

/* =========================
Reject leave (HR/Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body(
        content = RejectLeave,
        description = "Optional approver note",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request is not in submitted state")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RejectLeave>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let leave_id = path.into_inner();
    let rejected =
        workflow::reject(pool.get_ref(), leave_id, auth.user_id, payload.note.clone()).await?;

    Ok(HttpResponse::Ok().json(rejected))
}

/* =========================
Cancel leave
========================= */
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/cancel",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to cancel")
    ),
    responses(
        (status = 200, description = "Leave cancelled; approved spends are reversed", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request is already terminal")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let request = workflow::get_request(pool.get_ref(), leave_id).await?;
    auth.require_self_or_staff(request.employee_id)?;

    let cancelled = workflow::cancel(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(cancelled))
}

/* =========================
Get leave
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let request = workflow::get_request(pool.get_ref(), leave_id).await?;
    auth.require_self_or_staff(request.employee_id)?;

    Ok(HttpResponse::Ok().json(request))
}

/* =========================
List leaves
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> actix_web::Result<impl Responder> {
    // Employees are pinned to their own requests; staff filter freely.
    let employee_filter = if auth.is_employee() {
        let own = auth
            .employee_id
            .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;
        match query.employee_id {
            Some(id) if id != own => {
                return Err(actix_web::error::ErrorForbidden("Not your record"));
            }
            _ => Some(own),
        }
    } else {
        query.employee_id
    };

    // Typed status filter so a typo 400s instead of matching nothing.
    let status_filter = match query.status.as_deref() {
        Some(raw) => Some(raw.parse::<RequestStatus>().map_err(|_| {
            EngineError::InvalidRequest {
                reason: format!("unknown status `{raw}`"),
            }
        })?),
        None => None,
    };

    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).min(100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    // -------------------------
    // WHERE clause
    // -------------------------
    let status_text = status_filter.map(|s| s.to_string());
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(employee_id) = employee_filter {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::U64(employee_id));
    }

    if let Some(policy_id) = query.policy_id {
        where_sql.push_str(" AND policy_id = ?");
        args.push(FilterValue::U64(policy_id));
    }

    if let Some(status) = status_text.as_deref() {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{}", where_sql);

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }

    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(EngineError::Storage)?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        r#"
        SELECT id, employee_id, policy_id, start_date, end_date, unit, quantity,
               status, reason, approver_id, approver_note, approved_at, created_at, updated_at
        FROM leave_requests
        {}
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );

    let mut data_q = sqlx::query_as::<_, LeaveRequest>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }

    let leaves = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Storage)?;

    // -------------------------
    // Response
    // -------------------------
    let response = LeaveListResponse {
        data: leaves,
        page: page as u32,
        per_page: per_page as u32,
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}
