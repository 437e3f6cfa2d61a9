use log::{info, warn};
use std::time::Duration;
use uuid::Uuid;

use super::PoolHandle;
use crate::store::VmState;

const PERIOD: Duration = Duration::from_secs(5);

/// Grow loop (spec §4.6): one launch per tick when demand exceeds the low
/// watermark, rate-limiting cloud API calls by construction — growth is
/// linear in ticks, never a burst.
///
/// Grounded on `pool/prewarming.rs` / `performance/prewarming.rs`'s
/// `maintain_pool_levels` (tick, compare current vs. target, launch the
/// shortfall), narrowed here to "at most one launch per tick" rather than
/// filling the whole shortfall at once.
pub async fn run(pool: PoolHandle) {
    let mut interval = tokio::time::interval(PERIOD);
    let cancelled = pool.cancelled().clone();

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(e) = tick(&pool).await {
            warn!("[RESIZE-LAUNCH] grow tick failed for pool {}: {e}", pool.pool_id());
        }
    }
}

async fn tick(pool: &PoolHandle) -> crate::error::Result<()> {
    let pool_str = pool.pool_id().to_string();
    let available = pool.store.count(&pool_str, Some(VmState::Available)).await?;
    let staging = pool.store.count(&pool_str, Some(VmState::Staging)).await?;
    let current_size = available + staging + pool.store.count(&pool_str, Some(VmState::Used)).await?;

    let (low, _high) = pool.watermarks();
    let limit = pool.config.limit_size;
    let under_limit = limit == 0 || current_size < limit;

    if available + staging < low && under_limit {
        let name = Uuid::new_v4().to_string();
        let tag = format!("{}{}", pool.config.tag_prefix, pool.pool_id().region);

        match pool.provider.start_vm(&name, &tag).await {
            Ok(vmid) => {
                pool.store.insert_staging(&pool_str, &vmid).await?;
                pool.metrics.record_launch();
                info!("[RESIZE-LAUNCH] launched vm {vmid} in pool {pool_str}");
            }
            Err(e) => warn!("[RESIZE-LAUNCH] start_vm failed for pool {pool_str}: {e}"),
        }
    }

    Ok(())
}
