use crate::auth::auth::AuthUser;
use crate::engine::error::EngineError;
use crate::engine::{ledger, projector};
use crate::model::leave_balance::LeaveBalance;
use crate::utils::policy_cache;
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct BalanceFilter {
    /// Filter by employee ID
    #[schema(example = 7)]
    pub employee_id: Option<u64>,
    /// Filter by policy ID
    #[schema(example = 1)]
    pub policy_id: Option<u64>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u64>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct BalanceListResponse {
    pub data: Vec<LeaveBalance>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct AvailableQuery {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    /// Defaults to today
    #[schema(example = "2026-02-01", value_type = Option<String>, format = "date", nullable = true)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct AvailableResponse {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    #[schema(example = "2026-02-01", value_type = String, format = "date")]
    pub as_of: NaiveDate,
    /// Closing of the covering period less pending reservations
    #[schema(example = "1.16", value_type = String)]
    pub available: Decimal,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct CoverageQuery {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    #[schema(example = "2026-03-15", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    /// Inclusive last day
    #[schema(example = "2026-03-21", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = "5.00", value_type = String)]
    pub quantity: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct CoverageResponse {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    /// Whether the quantity fits inside available balance at the span's
    /// start date
    #[schema(example = false)]
    pub can_cover: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct AdjustmentReq {
    #[schema(example = 7)]
    pub employee_id: u64,
    #[schema(example = 1)]
    pub policy_id: u64,
    /// Any date inside the period to adjust
    #[schema(example = "2026-02-01", value_type = String, format = "date")]
    pub date: NaiveDate,
    /// Positive credits, negative debits
    #[schema(example = "1.50", value_type = String)]
    pub delta: Decimal,
}

#[derive(Deserialize, ToSchema)]
pub struct AccrualRunReq {
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    /// Exclusive: the first day of the following period
    #[schema(example = "2026-04-01", value_type = String, format = "date")]
    pub period_end: NaiveDate,
    /// When omitted, every active employee of the policy's company
    #[schema(example = json!([7, 8]), nullable = true)]
    pub employee_ids: Option<Vec<u64>>,
}

#[derive(Serialize, ToSchema)]
pub struct AccrualFailure {
    #[schema(example = 8)]
    pub employee_id: u64,
    #[schema(example = "no balance period covers 2026-01-01")]
    pub error: String,
}

#[derive(Serialize, ToSchema)]
pub struct AccrualRunSummary {
    #[schema(example = 1)]
    pub policy_id: u64,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(example = "2026-04-01", value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[schema(example = 12)]
    pub opened: u32,
    pub failed: Vec<AccrualFailure>,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
}

/// The employee id a caller is allowed to read. Staff pass the filter
/// through; employees are pinned to their own record.
fn effective_employee_filter(
    auth: &AuthUser,
    requested: Option<u64>,
) -> actix_web::Result<Option<u64>> {
    if !auth.is_employee() {
        return Ok(requested);
    }
    let own = auth
        .employee_id
        .ok_or_else(|| actix_web::error::ErrorForbidden("No employee profile"))?;
    match requested {
        Some(id) if id != own => Err(actix_web::error::ErrorForbidden("Not your record")),
        _ => Ok(Some(own)),
    }
}

/* =========================
List ledger entries
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/balances",
    params(BalanceFilter),
    responses(
        (status = 200, description = "Paginated ledger entries", body = BalanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn list_balances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<BalanceFilter>,
) -> actix_web::Result<impl Responder> {
    let employee_filter = effective_employee_filter(&auth, query.employee_id)?;

    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).min(100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    // -------------------------
    // WHERE clause
    // -------------------------
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

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM leave_balances{}", where_sql);

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
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
        SELECT employee_id, policy_id, period_start, period_end,
               opening, accrued, taken, adjusted, closing
        FROM leave_balances
        {}
        ORDER BY period_start DESC, policy_id
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );

    let mut data_q = sqlx::query_as::<_, LeaveBalance>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
        };
    }

    let balances = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Storage)?;

    let response = BalanceListResponse {
        data: balances,
        page: page as u32,
        per_page: per_page as u32,
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}

/* =========================
Available balance (projector)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/balances/available",
    params(AvailableQuery),
    responses(
        (status = 200, description = "Available balance as of the given date", body = AvailableResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No balance period covers the date")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn available_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AvailableQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_self_or_staff(query.employee_id)?;

    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let available =
        projector::available_balance(pool.get_ref(), query.employee_id, query.policy_id, as_of)
            .await?;

    Ok(HttpResponse::Ok().json(AvailableResponse {
        employee_id: query.employee_id,
        policy_id: query.policy_id,
        as_of,
        available,
    }))
}

/* =========================
Coverage check (projector)
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/balances/coverage",
    params(CoverageQuery),
    responses(
        (status = 200, description = "Whether the quantity fits inside available balance", body = CoverageResponse),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No balance period covers the start date")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn check_coverage(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CoverageQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_self_or_staff(query.employee_id)?;

    let can_cover = projector::can_cover(
        pool.get_ref(),
        query.employee_id,
        query.policy_id,
        query.start_date,
        query.end_date,
        query.quantity,
    )
    .await?;

    Ok(HttpResponse::Ok().json(CoverageResponse {
        employee_id: query.employee_id,
        policy_id: query.policy_id,
        can_cover,
    }))
}

/* =========================
Manual adjustment (HR/Admin)
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/balances/adjustments",
    request_body = AdjustmentReq,
    responses(
        (status = 200, description = "Adjusted ledger entry", body = LeaveBalance),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "No balance period covers the date")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn post_adjustment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<AdjustmentReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let mut conn = pool.acquire().await.map_err(EngineError::Storage)?;
    let row = ledger::post_adjustment(
        &mut conn,
        payload.employee_id,
        payload.policy_id,
        payload.date,
        payload.delta,
    )
    .await?;

    info!(
        employee_id = payload.employee_id,
        policy_id = payload.policy_id,
        delta = %payload.delta,
        by = auth.user_id,
        "manual balance adjustment posted"
    );
    Ok(HttpResponse::Ok().json(row))
}

/* =========================
Accrual run (Admin/System)
========================= */
/// One engine run for one policy and period. Each employee is opened in
/// its own transaction so a single bad record cannot sink the batch;
/// failures come back in the summary instead.
#[utoipa::path(
    post,
    path = "/api/v1/policies/{policy_id}/accruals",
    params(
        ("policy_id" = u64, Path, description = "Policy to run the accrual for")
    ),
    request_body = AccrualRunReq,
    responses(
        (status = 200, description = "Run summary", body = AccrualRunSummary),
        (status = 400, description = "Invalid period"),
        (status = 404, description = "Policy not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Balance"
)]
pub async fn run_accrual(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AccrualRunReq>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin_or_system()?;

    if payload.period_end <= payload.period_start {
        return Err(EngineError::InvalidPeriod {
            reason: format!(
                "period end {} is not after start {}",
                payload.period_end, payload.period_start
            ),
        }
        .into());
    }

    let policy_id = path.into_inner();
    let policy = policy_cache::get_policy(pool.get_ref(), policy_id).await?;

    let employee_ids: Vec<u64> = match &payload.employee_ids {
        Some(ids) => ids.clone(),
        None => sqlx::query_scalar::<_, u64>(
            "SELECT id FROM employees WHERE company_id = ? AND status = 'active' ORDER BY id",
        )
        .bind(policy.company_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Storage)?,
    };

    let mut opened = 0u32;
    let mut failed = Vec::new();
    for employee_id in employee_ids {
        match ledger::open_period(
            pool.get_ref(),
            &policy,
            employee_id,
            payload.period_start,
            payload.period_end,
        )
        .await
        {
            Ok(_) => opened += 1,
            Err(e) => {
                warn!(
                    employee_id,
                    policy_id,
                    error = %e,
                    "accrual run failed for employee"
                );
                failed.push(AccrualFailure {
                    employee_id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        policy_id,
        period_start = %payload.period_start,
        period_end = %payload.period_end,
        opened,
        failures = failed.len(),
        "accrual run complete"
    );

    Ok(HttpResponse::Ok().json(AccrualRunSummary {
        policy_id,
        period_start: payload.period_start,
        period_end: payload.period_end,
        opened,
        failed,
    }))
}
