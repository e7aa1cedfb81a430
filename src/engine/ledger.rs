use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{MySqlConnection, MySqlPool};

use crate::engine::accrual::{carry_over_forfeit, carry_over_opening, compute_period_accrual};
use crate::engine::error::EngineError;
use crate::model::leave_balance::LeaveBalance;
use crate::model::leave_policy::LeavePolicy;

const BALANCE_COLUMNS: &str = "employee_id, policy_id, period_start, period_end, \
     opening, accrued, taken, adjusted, closing";

/// The balance row whose period covers `date`, if any.
pub async fn find_covering(
    conn: &mut MySqlConnection,
    employee_id: u64,
    policy_id: u64,
    date: NaiveDate,
) -> Result<Option<LeaveBalance>, EngineError> {
    let sql = format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances \
         WHERE employee_id = ? AND policy_id = ? AND period_start <= ? AND period_end > ?"
    );
    let row = sqlx::query_as::<_, LeaveBalance>(&sql)
        .bind(employee_id)
        .bind(policy_id)
        .bind(date)
        .bind(date)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Most recent period that ended on or before `date`. Carry-over source
/// when opening the period that starts at `date`.
async fn prior_period(
    conn: &mut MySqlConnection,
    employee_id: u64,
    policy_id: u64,
    date: NaiveDate,
) -> Result<Option<LeaveBalance>, EngineError> {
    let sql = format!(
        "SELECT {BALANCE_COLUMNS} FROM leave_balances \
         WHERE employee_id = ? AND policy_id = ? AND period_end <= ? \
         ORDER BY period_end DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, LeaveBalance>(&sql)
        .bind(employee_id)
        .bind(policy_id)
        .bind(date)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Insert the row, or refresh it if the period already exists. `taken`
/// and `adjusted` are never touched on the update path, so a re-run can
/// neither erase spends nor manual adjustments; `closing` is rebuilt
/// from the incoming deltas and the surviving columns to keep the
/// ledger identity intact.
pub async fn upsert_balance(
    conn: &mut MySqlConnection,
    row: &LeaveBalance,
) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO leave_balances
            (employee_id, policy_id, period_start, period_end,
             opening, accrued, taken, adjusted, closing)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            period_end = VALUES(period_end),
            opening = VALUES(opening),
            accrued = VALUES(accrued),
            closing = VALUES(opening) + VALUES(accrued) + adjusted - taken
        "#,
    )
    .bind(row.employee_id)
    .bind(row.policy_id)
    .bind(row.period_start)
    .bind(row.period_end)
    .bind(row.opening)
    .bind(row.accrued)
    .bind(row.taken)
    .bind(row.adjusted)
    .bind(row.opening + row.accrued + row.adjusted - row.taken)
    .execute(conn)
    .await?;
    Ok(())
}

/// Admission rule for spends against a closing balance: a positive
/// delta must be covered in full, a reversal or zero delta always
/// lands. The guard inside [`adjust_taken`]'s UPDATE is the SQL form
/// of this rule; the projector applies it when gating submissions.
pub fn admits_delta(closing: Decimal, delta: Decimal) -> bool {
    delta <= Decimal::ZERO || closing >= delta
}

/// Move `delta` between available and taken on the row covering `date`,
/// in one guarded statement. The guard is [`admits_delta`] evaluated
/// inside the UPDATE itself, so the check and the mutation are one
/// atomic step at the storage layer. Zero rows affected is
/// disambiguated with a follow-up read into `NoBalancePeriod` or
/// `InsufficientBalance`.
pub async fn adjust_taken(
    conn: &mut MySqlConnection,
    employee_id: u64,
    policy_id: u64,
    date: NaiveDate,
    delta: Decimal,
) -> Result<LeaveBalance, EngineError> {
    let result = sqlx::query(
        r#"
        UPDATE leave_balances
        SET taken = taken + ?, closing = closing - ?
        WHERE employee_id = ? AND policy_id = ?
        AND period_start <= ? AND period_end > ?
        AND (? <= 0 OR closing >= ?)
        "#,
    )
    .bind(delta)
    .bind(delta)
    .bind(employee_id)
    .bind(policy_id)
    .bind(date)
    .bind(date)
    .bind(delta)
    .bind(delta)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return match find_covering(&mut *conn, employee_id, policy_id, date).await? {
            Some(row) => Err(EngineError::InsufficientBalance {
                requested: delta,
                available: row.closing,
            }),
            None => Err(EngineError::NoBalancePeriod {
                employee_id,
                policy_id,
                date,
            }),
        };
    }

    find_covering(conn, employee_id, policy_id, date)
        .await?
        .ok_or(EngineError::NoBalancePeriod {
            employee_id,
            policy_id,
            date,
        })
}

/// Manual HR credit or debit against the row covering `date`. Recorded
/// under `adjusted` so it stays distinguishable from accruals and
/// spends in the audit trail.
pub async fn post_adjustment(
    conn: &mut MySqlConnection,
    employee_id: u64,
    policy_id: u64,
    date: NaiveDate,
    delta: Decimal,
) -> Result<LeaveBalance, EngineError> {
    let result = sqlx::query(
        r#"
        UPDATE leave_balances
        SET adjusted = adjusted + ?, closing = closing + ?
        WHERE employee_id = ? AND policy_id = ?
        AND period_start <= ? AND period_end > ?
        "#,
    )
    .bind(delta)
    .bind(delta)
    .bind(employee_id)
    .bind(policy_id)
    .bind(date)
    .bind(date)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::NoBalancePeriod {
            employee_id,
            policy_id,
            date,
        });
    }

    find_covering(conn, employee_id, policy_id, date)
        .await?
        .ok_or(EngineError::NoBalancePeriod {
            employee_id,
            policy_id,
            date,
        })
}

/// Open (or refresh) the period [period_start, period_end) for one
/// employee under one policy.
///
/// In a single transaction: carry the prior closing forward under the
/// policy's carry-over cap, book any forfeited excess against the prior
/// period as a negative adjustment, accrue pro rata over the new period
/// and upsert the row. Re-running for the same period is a no-op apart
/// from refreshing the accrual, because the prior closing is already at
/// the cap the second time around.
pub async fn open_period(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    employee_id: u64,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<LeaveBalance, EngineError> {
    let accrued = compute_period_accrual(&policy.rule(), period_start, period_end)?;

    let mut tx = pool.begin().await?;

    // A different period must not intersect the new one. The row with
    // the same period_start is the refresh case and is allowed through.
    let clash = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leave_balances \
         WHERE employee_id = ? AND policy_id = ? \
         AND period_start < ? AND period_end > ? AND period_start <> ?",
    )
    .bind(employee_id)
    .bind(policy.id)
    .bind(period_end)
    .bind(period_start)
    .bind(period_start)
    .fetch_one(&mut *tx)
    .await?;
    if clash > 0 {
        return Err(EngineError::InvalidPeriod {
            reason: format!(
                "period starting {period_start} overlaps an existing period for employee {employee_id}"
            ),
        });
    }

    let prior = prior_period(&mut *tx, employee_id, policy.id, period_start).await?;
    let opening = match &prior {
        Some(p) => carry_over_opening(p.closing, policy.carry_over_max),
        None => Decimal::ZERO,
    };

    if let Some(p) = &prior {
        let forfeit = carry_over_forfeit(p.closing, policy.carry_over_max);
        if forfeit > Decimal::ZERO {
            sqlx::query(
                "UPDATE leave_balances \
                 SET adjusted = adjusted - ?, closing = closing - ? \
                 WHERE employee_id = ? AND policy_id = ? AND period_start = ?",
            )
            .bind(forfeit)
            .bind(forfeit)
            .bind(employee_id)
            .bind(policy.id)
            .bind(p.period_start)
            .execute(&mut *tx)
            .await?;
            tracing::info!(
                employee_id,
                policy_id = policy.id,
                %forfeit,
                "carry-over cap forfeited excess from prior period"
            );
        }
    }

    let row = LeaveBalance {
        employee_id,
        policy_id: policy.id,
        period_start,
        period_end,
        opening,
        accrued,
        taken: Decimal::ZERO,
        adjusted: Decimal::ZERO,
        closing: opening + accrued,
    };
    upsert_balance(&mut *tx, &row).await?;

    let stored = find_covering(&mut *tx, employee_id, policy.id, period_start)
        .await?
        .ok_or(EngineError::NoBalancePeriod {
            employee_id,
            policy_id: policy.id,
            date: period_start,
        })?;

    tx.commit().await?;
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn spends_need_the_whole_amount_covered() {
        assert!(admits_delta(dec!(5.00), dec!(5.00)));
        assert!(!admits_delta(dec!(4.99), dec!(5.00)));
        assert!(!admits_delta(dec!(0), dec!(0.01)));
    }

    #[test]
    fn reversals_and_zero_deltas_always_land() {
        assert!(admits_delta(dec!(0), dec!(-3.00)));
        assert!(admits_delta(dec!(-2.00), dec!(-0.50)));
        assert!(admits_delta(dec!(-2.00), dec!(0)));
    }
}
