use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{MySqlConnection, MySqlPool};

use crate::engine::error::EngineError;
use crate::engine::ledger;

// Read side of the ledger. Presentation code never derives availability
// itself; it asks here.

/// One submitted-but-undecided request's claim on balance.
#[derive(Debug, sqlx::FromRow)]
struct PendingSpan {
    end_date: NaiveDate,
    quantity: Decimal,
}

/// Total quantity reserved against the period starting at
/// `period_start`. Spans are inclusive of `end_date` and reserve until
/// their last day has left the period entirely, so asking late in the
/// period never shrinks the reservation; only spans that ended before
/// the period began fall out.
fn reserved_quantity(period_start: NaiveDate, spans: &[PendingSpan]) -> Decimal {
    spans
        .iter()
        .filter(|s| s.end_date >= period_start)
        .map(|s| s.quantity)
        .sum()
}

/// Sum of quantities reserved by submitted requests against the period
/// starting at `period_start`.
async fn pending_reservations(
    conn: &mut MySqlConnection,
    employee_id: u64,
    policy_id: u64,
    period_start: NaiveDate,
) -> Result<Decimal, EngineError> {
    let spans = sqlx::query_as::<_, PendingSpan>(
        "SELECT end_date, quantity FROM leave_requests \
         WHERE employee_id = ? AND policy_id = ? AND status = 'submitted'",
    )
    .bind(employee_id)
    .bind(policy_id)
    .fetch_all(conn)
    .await?;
    Ok(reserved_quantity(period_start, &spans))
}

/// Closing balance of the period covering `as_of`, less pending
/// reservations. Pending requests hold balance before approval so two
/// overlapping submissions cannot both look affordable. The reservation
/// window is keyed to the covering period's start, never to `as_of`.
pub async fn available_balance_in(
    conn: &mut MySqlConnection,
    employee_id: u64,
    policy_id: u64,
    as_of: NaiveDate,
) -> Result<Decimal, EngineError> {
    let covering = ledger::find_covering(&mut *conn, employee_id, policy_id, as_of)
        .await?
        .ok_or(EngineError::NoBalancePeriod {
            employee_id,
            policy_id,
            date: as_of,
        })?;
    let reserved =
        pending_reservations(conn, employee_id, policy_id, covering.period_start).await?;
    Ok(covering.closing - reserved)
}

pub async fn available_balance(
    pool: &MySqlPool,
    employee_id: u64,
    policy_id: u64,
    as_of: NaiveDate,
) -> Result<Decimal, EngineError> {
    let mut conn = pool.acquire().await?;
    available_balance_in(&mut conn, employee_id, policy_id, as_of).await
}

/// Whether a request for `quantity` over [start_date, end_date] fits
/// inside what is available at its start date. Applies the same
/// admission rule as the ledger's spend guard.
pub async fn can_cover(
    pool: &MySqlPool,
    employee_id: u64,
    policy_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    quantity: Decimal,
) -> Result<bool, EngineError> {
    if end_date < start_date {
        return Err(EngineError::InvalidRequest {
            reason: format!("end date {end_date} is before start date {start_date}"),
        });
    }
    let available = available_balance(pool, employee_id, policy_id, start_date).await?;
    Ok(ledger::admits_delta(available, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn span(end: NaiveDate, quantity: Decimal) -> PendingSpan {
        PendingSpan {
            end_date: end,
            quantity,
        }
    }

    #[test]
    fn reservations_hold_for_the_whole_period() {
        // A submitted request that already ended early in the period
        // still reserves its quantity; one from before the period does
        // not.
        let spans = vec![
            span(ymd(2026, 2, 1), dec!(5.00)),
            span(ymd(2025, 12, 20), dec!(2.00)),
        ];
        assert_eq!(reserved_quantity(ymd(2026, 1, 1), &spans), dec!(5.00));
    }

    #[test]
    fn spans_reaching_past_the_period_reserve_too() {
        let spans = vec![span(ymd(2026, 5, 10), dec!(3.00))];
        assert_eq!(reserved_quantity(ymd(2026, 1, 1), &spans), dec!(3.00));
    }

    #[test]
    fn only_spans_ended_before_the_period_fall_out() {
        let on_boundary = vec![span(ymd(2026, 1, 1), dec!(1.00))];
        assert_eq!(reserved_quantity(ymd(2026, 1, 1), &on_boundary), dec!(1.00));

        let day_before = vec![span(ymd(2025, 12, 31), dec!(1.00))];
        assert_eq!(reserved_quantity(ymd(2026, 1, 1), &day_before), dec!(0));
    }

    #[test]
    fn nothing_pending_reserves_nothing() {
        assert_eq!(reserved_quantity(ymd(2026, 1, 1), &[]), dec!(0));
    }

    #[actix_web::test]
    async fn can_cover_rejects_inverted_spans_before_touching_storage() {
        let pool = MySqlPool::connect_lazy("mysql://localhost/leaveledger").unwrap();
        let err = can_cover(&pool, 7, 1, ymd(2026, 3, 21), ymd(2026, 3, 15), dec!(5.00))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest { .. }));
    }
}
