use log::info;
use std::time::Duration;

use super::PoolHandle;
use crate::store::VmState;

const PERIOD: Duration = Duration::from_secs(10);

/// Stats loop (spec §4.6, §6): emits `currentSize, available, staging,
/// buffer` on a fixed cadence for external dashboards to scrape from logs.
///
/// Grounded on `manager.rs`'s periodic `tokio::spawn` + `interval.tick()`
/// reporting loop, redirected here to the spec's four counters instead of
/// the teacher's performance snapshot.
pub async fn run(pool: PoolHandle) {
    let mut interval = tokio::time::interval(PERIOD);
    let cancelled = pool.cancelled().clone();

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(e) = tick(&pool).await {
            log::warn!("[STATS] tick failed for pool {}: {e}", pool.pool_id());
        }
    }
}

async fn tick(pool: &PoolHandle) -> crate::error::Result<()> {
    let pool_str = pool.pool_id().to_string();
    let available = pool.store.count(&pool_str, Some(VmState::Available)).await?;
    let staging = pool.store.count(&pool_str, Some(VmState::Staging)).await?;
    let used = pool.store.count(&pool_str, Some(VmState::Used)).await?;
    let current_size = available + staging + used;
    let (low, high) = pool.watermarks();

    info!(
        "[STATS] pool={pool_str} currentSize={current_size} available={available} staging={staging} buffer=[{low},{high}]"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{PoolManager, PoolManagerConfig};
    use crate::pool_id::PoolId;
    use crate::provider::NullProviderAdapter;
    use crate::roomqueue::InMemoryRoomQueue;
    use crate::store::InMemoryStateStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn tick_reads_counts_without_error_on_an_empty_pool() {
        let pool = PoolManager::new(
            PoolId::new("aws", false, "us-east-1"),
            Arc::new(InMemoryStateStore::new()),
            Arc::new(NullProviderAdapter::new()),
            Arc::new(InMemoryRoomQueue::new()),
            PoolManagerConfig {
                min_size: 1,
                limit_size: 10,
                ramp_down_hours: None,
                ramp_up_hours: None,
                min_uptime_seconds: 3000,
                give_up_retries: 240,
                recovery_modulus: 150,
                tag_prefix: "vbrowser-".to_string(),
                environment: crate::config::Environment::Development,
                boot_age_bound_seconds: 60_000,
            },
        );

        tick(&pool).await.unwrap();
    }
}
