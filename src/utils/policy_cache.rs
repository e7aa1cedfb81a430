use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::engine::error::EngineError;
use crate::model::leave_policy::LeavePolicy;

const POLICY_COLUMNS: &str = "id, company_id, code, name, unit, accrual_amount, \
     accrual_cadence, carry_over_max, exclude_weekends, created_at";

/// Policies are read on every request create/submit but change rarely,
/// so they live here between edits. Writers must invalidate.
pub static POLICY_CACHE: Lazy<Cache<u64, LeavePolicy>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(3600)) // 1h TTL
        .build()
});

/// Cached policy lookup, falling through to the database on a miss.
pub async fn get_policy(pool: &MySqlPool, policy_id: u64) -> Result<LeavePolicy, EngineError> {
    if let Some(policy) = POLICY_CACHE.get(&policy_id).await {
        return Ok(policy);
    }

    let sql = format!("SELECT {POLICY_COLUMNS} FROM leave_policies WHERE id = ?");
    let policy = sqlx::query_as::<_, LeavePolicy>(&sql)
        .bind(policy_id)
        .fetch_optional(pool)
        .await?
        .ok_or(EngineError::NotFound {
            what: "leave policy",
            id: policy_id,
        })?;

    POLICY_CACHE.insert(policy_id, policy.clone()).await;
    Ok(policy)
}

/// Drop a cached entry after an edit so the next read sees the new rule.
pub async fn invalidate(policy_id: u64) {
    POLICY_CACHE.invalidate(&policy_id).await;
}

async fn batch_insert(policies: &[LeavePolicy]) {
    let futures: Vec<_> = policies
        .iter()
        .map(|p| POLICY_CACHE.insert(p.id, p.clone()))
        .collect();

    futures::future::join_all(futures).await;
}

/// Preload every policy at startup (batched).
pub async fn warmup_policy_cache(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let sql = format!("SELECT {POLICY_COLUMNS} FROM leave_policies ORDER BY id");
    let mut stream = sqlx::query_as::<_, LeavePolicy>(&sql).fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        batch.push(row?);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_insert(&batch).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        batch_insert(&batch).await;
    }

    log::info!("Policy cache warmup complete: {} policies loaded", total_count);

    Ok(())
}
