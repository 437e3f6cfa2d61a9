use log::{info, warn};
use std::collections::HashSet;
use std::time::Duration;

use super::PoolHandle;

const PERIOD: Duration = Duration::from_secs(5 * 60);
const HEARTBEAT_WINDOW_SECONDS: i64 = 5 * 60;
const TARGET_SPACER: Duration = Duration::from_secs(2);

/// Reconcile loop (spec §4.6): reconciles provider-side truth against the
/// controller's own keep-set, resetting any orphan the provider still shows
/// but the controller no longer recognizes as staging, available, or
/// recently active.
///
/// Grounded on `vm/firecracker.rs`'s `list_vms`/`get_vm` 404 contract for
/// what "provider truth" means, with the sweep itself new: the teacher never
/// reconciles its own bookkeeping against the provider's listing.
pub async fn run(pool: PoolHandle) {
    let mut interval = tokio::time::interval(PERIOD);
    let cancelled = pool.cancelled().clone();

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(e) = tick(&pool).await {
            warn!("[CLEANUP] reconcile tick failed for pool {}: {e}", pool.pool_id());
        }
    }
}

async fn tick(pool: &PoolHandle) -> crate::error::Result<()> {
    let pool_str = pool.pool_id().to_string();
    let tag = format!("{}{}", pool.config.tag_prefix, pool.pool_id().region);

    let listed = pool.provider.list_vms(&tag).await?;
    let keep = pool.store.keep_set(&pool_str, HEARTBEAT_WINDOW_SECONDS).await?;
    let keep_ids: HashSet<&str> = keep.iter().map(|r| r.vmid.as_str()).collect();

    let orphans: Vec<&str> = listed
        .iter()
        .map(|d| d.id.as_str())
        .filter(|vmid| !keep_ids.contains(vmid))
        .collect();

    if orphans.is_empty() {
        return Ok(());
    }

    info!("[CLEANUP] pool {pool_str} found {} orphan vm(s)", orphans.len());

    let mut first = true;
    for vmid in orphans {
        if !first {
            tokio::time::sleep(TARGET_SPACER).await;
        }
        first = false;

        if let Err(e) =
            crate::reset::reset_vm(pool.pool_id(), vmid, None, &pool.store, &pool.provider).await
        {
            warn!("[CLEANUP] failed to reclaim orphan vm {vmid} in pool {pool_str}: {e}");
        } else {
            info!("[CLEANUP] reclaimed orphan vm {vmid} in pool {pool_str}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{PoolManager, PoolManagerConfig};
    use crate::pool_id::PoolId;
    use crate::provider::NullProviderAdapter;
    use crate::roomqueue::InMemoryRoomQueue;
    use crate::store::{InMemoryStateStore, VmRecord, VmState};
    use std::sync::Arc;

    fn test_pool(store: Arc<InMemoryStateStore>, provider: Arc<NullProviderAdapter>) -> PoolHandle {
        PoolManager::new(
            PoolId::new("aws", false, "us-east-1"),
            store,
            provider,
            Arc::new(InMemoryRoomQueue::new()),
            PoolManagerConfig {
                min_size: 0,
                limit_size: 100,
                ramp_down_hours: None,
                ramp_up_hours: None,
                min_uptime_seconds: 3000,
                give_up_retries: 240,
                recovery_modulus: 150,
                tag_prefix: "vbrowser-".to_string(),
                environment: crate::config::Environment::Development,
                boot_age_bound_seconds: 60_000,
            },
        )
    }

    #[tokio::test]
    async fn tick_skips_when_provider_listing_matches_keep_set() {
        let store = Arc::new(InMemoryStateStore::new());
        let provider = Arc::new(NullProviderAdapter::new());

        let vmid = provider.start_vm("vm-1", "vbrowser-us-east-1").await.unwrap();

        let mut row = VmRecord::new_staging(1, "awsus-east-1", vmid.clone());
        row.state = VmState::Available;
        store.seed(row).await;

        let pool = test_pool(store, provider);
        tick(&pool).await.unwrap();

        // Nothing was reset: the sole listed vm is still in the keep-set.
        let row = pool.store.find_by_vmid(&vmid).await.unwrap().unwrap();
        assert_eq!(row.state, VmState::Available);
    }

    #[tokio::test]
    async fn tick_reclaims_vm_the_controller_no_longer_tracks() {
        let store = Arc::new(InMemoryStateStore::new());
        let provider = Arc::new(NullProviderAdapter::new());

        // The provider still reports this vm, but the controller has no
        // record of it at all: it's an orphan.
        let vmid = provider.start_vm("vm-orphan", "vbrowser-us-east-1").await.unwrap();

        let pool = test_pool(store, provider);
        tick(&pool).await.unwrap();

        // reset_vm on an untracked vmid falls through to a direct terminate,
        // which drops it from the provider's live set.
        let remaining = pool.provider.list_vms("vbrowser-us-east-1").await.unwrap();
        assert!(!remaining.iter().any(|d| d.id == vmid));
    }
}
