use log::{info, warn};
use std::time::Duration;

use super::PoolHandle;
use crate::store::VmState;

const PERIOD: Duration = Duration::from_secs(30);

/// Shrink loop (spec §4.6): when `available > highWatermark`, atomically
/// delete the oldest-eligible row (§4.2) and terminate the underlying VM.
/// Eligibility guarantees at least `min_size` rows remain and clusters
/// decommissions near billing-hour boundaries.
///
/// Grounded on `pool/maintenance.rs`'s periodic health-check tick shape,
/// redirected here to the spec's oldest-eligible-delete semantics instead
/// of a health check.
pub async fn run(pool: PoolHandle) {
    let mut interval = tokio::time::interval(PERIOD);
    let cancelled = pool.cancelled().clone();

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(e) = tick(&pool).await {
            warn!("[RESIZE-UNLAUNCH] shrink tick failed for pool {}: {e}", pool.pool_id());
        }
    }
}

async fn tick(pool: &PoolHandle) -> crate::error::Result<()> {
    let pool_str = pool.pool_id().to_string();
    let available = pool.store.count(&pool_str, Some(VmState::Available)).await?;
    let (_low, high) = pool.watermarks();

    if available <= high {
        return Ok(());
    }

    let deleted = pool
        .store
        .atomic_oldest_eligible_delete(&pool_str, pool.config.min_size, pool.config.min_uptime_seconds)
        .await?;

    if let Some(vmid) = deleted {
        if let Err(e) = pool.provider.terminate_vm(&vmid).await {
            warn!("[RESIZE-UNLAUNCH] terminate_vm failed for {vmid} in pool {pool_str}: {e}");
        } else {
            info!("[RESIZE-UNLAUNCH] decommissioned vm {vmid} in pool {pool_str}");
        }
    }

    Ok(())
}
