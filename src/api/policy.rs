use crate::auth::auth::AuthUser;
use crate::engine::error::EngineError;
use crate::model::leave_policy::{AccrualCadence, AccrualRule, LeavePolicy, LeaveUnit};
use crate::utils::policy_cache;
use actix_web::{HttpResponse, Responder, web};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreatePolicy {
    #[schema(example = 1)]
    pub company_id: u64,
    /// Short identifier, stored uppercase, at most 10 characters
    #[schema(example = "ANNUAL")]
    pub code: String,
    #[schema(example = "Annual leave")]
    pub name: String,
    #[schema(example = "days")]
    pub unit: LeaveUnit,
    /// Structured rule fields. Either these two or `rule` must be given.
    #[schema(example = "25", value_type = Option<String>, nullable = true)]
    pub accrual_amount: Option<Decimal>,
    #[schema(example = "per_year", nullable = true)]
    pub accrual_cadence: Option<AccrualCadence>,
    /// Legacy free-text form, e.g. "25 days per year"
    #[schema(example = "25 days per year", nullable = true)]
    pub rule: Option<String>,
    #[schema(example = "5", value_type = Option<String>, nullable = true)]
    pub carry_over_max: Option<Decimal>,
    /// Defaults to true
    #[schema(example = true, nullable = true)]
    pub exclude_weekends: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePolicy {
    #[schema(example = "Annual leave", nullable = true)]
    pub name: Option<String>,
    #[schema(example = "30", value_type = Option<String>, nullable = true)]
    pub accrual_amount: Option<Decimal>,
    #[schema(example = "per_year", nullable = true)]
    pub accrual_cadence: Option<AccrualCadence>,
    #[schema(example = "10", value_type = Option<String>, nullable = true)]
    pub carry_over_max: Option<Decimal>,
    #[schema(example = false, nullable = true)]
    pub exclude_weekends: Option<bool>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PolicyFilter {
    /// Filter by owning company
    #[schema(example = 1)]
    pub company_id: Option<u64>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u64>,
    /// Pagination per page number
    #[schema(example = 10)]
    pub per_page: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct PolicyListResponse {
    pub data: Vec<LeavePolicy>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
}

/// Normalize and validate a policy code. Uppercased, 1..=10 chars,
/// alphanumeric plus underscore.
fn normalize_code(raw: &str) -> Result<String, EngineError> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() || code.len() > 10 {
        return Err(EngineError::InvalidPolicyRule {
            reason: "code must be 1 to 10 characters".into(),
        });
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(EngineError::InvalidPolicyRule {
            reason: "code may only contain letters, digits and underscores".into(),
        });
    }
    Ok(code)
}

/// Resolve the rule a create payload describes, from structured fields
/// or the legacy text form.
fn resolve_rule(payload: &CreatePolicy) -> Result<AccrualRule, EngineError> {
    if let Some(text) = payload.rule.as_deref() {
        return text.parse();
    }
    match (payload.accrual_amount, payload.accrual_cadence) {
        (Some(amount), Some(cadence)) if amount > Decimal::ZERO => {
            Ok(AccrualRule { amount, cadence })
        }
        (Some(_), Some(_)) => Err(EngineError::InvalidPolicyRule {
            reason: "accrual amount must be positive".into(),
        }),
        _ => Err(EngineError::InvalidPolicyRule {
            reason: "either `rule` or both `accrual_amount` and `accrual_cadence` are required"
                .into(),
        }),
    }
}

fn validate_carry_over(max: Option<Decimal>) -> Result<(), EngineError> {
    if let Some(cap) = max {
        if cap < Decimal::ZERO {
            return Err(EngineError::InvalidPolicyRule {
                reason: "carry_over_max must not be negative".into(),
            });
        }
    }
    Ok(())
}

/* =========================
Create policy (Admin)
========================= */
#[utoipa::path(
    post,
    path = "/api/v1/policies",
    request_body = CreatePolicy,
    responses(
        (status = 201, description = "Policy created", body = LeavePolicy),
        (status = 400, description = "Invalid rule or code"),
        (status = 409, description = "Policy code already exists in this company"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Policy"
)]
pub async fn create_policy(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePolicy>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let code = normalize_code(&payload.code)?;
    let rule = resolve_rule(&payload)?;
    validate_carry_over(payload.carry_over_max)?;
    let exclude_weekends = payload.exclude_weekends.unwrap_or(true);

    let result = sqlx::query(
        r#"
        INSERT INTO leave_policies
            (company_id, code, name, unit, accrual_amount, accrual_cadence,
             carry_over_max, exclude_weekends)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.company_id)
    .bind(&code)
    .bind(&payload.name)
    .bind(payload.unit)
    .bind(rule.amount)
    .bind(rule.cadence)
    .bind(payload.carry_over_max)
    .bind(exclude_weekends)
    .execute(pool.get_ref())
    .await;

    let inserted = match result {
        Ok(done) => done,
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code() == Some("23000".into()) {
                    return Ok(HttpResponse::Conflict().json(json!({
                        "message": format!("Policy code `{}` already exists in this company", code)
                    })));
                }
            }
            error!(error = %e, company_id = payload.company_id, "Failed to create policy");
            return Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal Server Error"
            })));
        }
    };

    let policy = policy_cache::get_policy(pool.get_ref(), inserted.last_insert_id()).await?;
    Ok(HttpResponse::Created().json(policy))
}

/* =========================
List policies
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/policies",
    params(PolicyFilter),
    responses(
        (status = 200, description = "Paginated policy list", body = PolicyListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Policy"
)]
pub async fn list_policies(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PolicyFilter>,
) -> actix_web::Result<impl Responder> {
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

    if let Some(company_id) = query.company_id {
        where_sql.push_str(" AND company_id = ?");
        args.push(FilterValue::U64(company_id));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM leave_policies{}", where_sql);

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
        SELECT id, company_id, code, name, unit, accrual_amount, accrual_cadence,
               carry_over_max, exclude_weekends, created_at
        FROM leave_policies
        {}
        ORDER BY company_id, code
        LIMIT ? OFFSET ?
        "#,
        where_sql
    );

    let mut data_q = sqlx::query_as::<_, LeavePolicy>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
        };
    }

    let policies = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(EngineError::Storage)?;

    let response = PolicyListResponse {
        data: policies,
        page: page as u32,
        per_page: per_page as u32,
        total,
    };

    Ok(HttpResponse::Ok().json(response))
}

/* =========================
Get policy
========================= */
#[utoipa::path(
    get,
    path = "/api/v1/policies/{policy_id}",
    params(
        ("policy_id" = u64, Path, description = "ID of the policy to fetch")
    ),
    responses(
        (status = 200, description = "Policy found", body = LeavePolicy),
        (status = 404, description = "Policy not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Policy"
)]
pub async fn get_policy(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let policy = policy_cache::get_policy(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(policy))
}

/* =========================
Update policy (Admin)
========================= */
/// Edits apply to future period computations only; existing ledger rows
/// are left alone. `id`, `code`, `company_id` and `unit` are immutable.
#[utoipa::path(
    put,
    path = "/api/v1/policies/{policy_id}",
    params(
        ("policy_id" = u64, Path, description = "ID of the policy to update")
    ),
    request_body = UpdatePolicy,
    responses(
        (status = 200, description = "Policy updated", body = LeavePolicy),
        (status = 400, description = "Invalid rule"),
        (status = 404, description = "Policy not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Policy"
)]
pub async fn update_policy(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdatePolicy>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let policy_id = path.into_inner();
    let current = policy_cache::get_policy(pool.get_ref(), policy_id).await?;

    let name = body.name.clone().unwrap_or(current.name);
    let accrual_amount = body.accrual_amount.unwrap_or(current.accrual_amount);
    let accrual_cadence = body.accrual_cadence.unwrap_or(current.accrual_cadence);
    let carry_over_max = match body.carry_over_max {
        Some(cap) => Some(cap),
        None => current.carry_over_max,
    };
    let exclude_weekends = body.exclude_weekends.unwrap_or(current.exclude_weekends);

    if accrual_amount <= Decimal::ZERO {
        return Err(EngineError::InvalidPolicyRule {
            reason: "accrual amount must be positive".into(),
        }
        .into());
    }
    validate_carry_over(carry_over_max)?;

    sqlx::query(
        r#"
        UPDATE leave_policies
        SET name = ?, accrual_amount = ?, accrual_cadence = ?,
            carry_over_max = ?, exclude_weekends = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(accrual_amount)
    .bind(accrual_cadence)
    .bind(carry_over_max)
    .bind(exclude_weekends)
    .bind(policy_id)
    .execute(pool.get_ref())
    .await
    .map_err(EngineError::Storage)?;

    policy_cache::invalidate(policy_id).await;

    let updated = policy_cache::get_policy(pool.get_ref(), policy_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payload(rule: Option<&str>, amount: Option<Decimal>, cadence: Option<AccrualCadence>) -> CreatePolicy {
        CreatePolicy {
            company_id: 1,
            code: "annual".into(),
            name: "Annual leave".into(),
            unit: LeaveUnit::Days,
            accrual_amount: amount,
            accrual_cadence: cadence,
            rule: rule.map(String::from),
            carry_over_max: None,
            exclude_weekends: None,
        }
    }

    #[test]
    fn codes_are_uppercased_and_bounded() {
        assert_eq!(normalize_code(" annual ").unwrap(), "ANNUAL");
        assert_eq!(normalize_code("sick_p").unwrap(), "SICK_P");
        assert!(normalize_code("").is_err());
        assert!(normalize_code("MUCHTOOLONGCODE").is_err());
        assert!(normalize_code("BAD CODE").is_err());
    }

    #[test]
    fn structured_fields_win_when_no_text_rule_given() {
        let rule = resolve_rule(&payload(None, Some(dec!(25)), Some(AccrualCadence::PerYear)))
            .unwrap();
        assert_eq!(rule.amount, dec!(25));
        assert_eq!(rule.cadence, AccrualCadence::PerYear);
    }

    #[test]
    fn text_rule_is_parsed_when_present() {
        let rule = resolve_rule(&payload(Some("1.5 days per month"), None, None)).unwrap();
        assert_eq!(rule.amount, dec!(1.5));
        assert_eq!(rule.cadence, AccrualCadence::PerMonth);
    }

    #[test]
    fn missing_rule_inputs_are_rejected() {
        assert!(resolve_rule(&payload(None, None, None)).is_err());
        assert!(resolve_rule(&payload(None, Some(dec!(25)), None)).is_err());
        assert!(resolve_rule(&payload(None, Some(dec!(0)), Some(AccrualCadence::PerYear))).is_err());
    }

    #[test]
    fn negative_carry_over_cap_is_rejected() {
        assert!(validate_carry_over(Some(dec!(-1))).is_err());
        assert!(validate_carry_over(Some(dec!(0))).is_ok());
        assert!(validate_carry_over(None).is_ok());
    }
}
