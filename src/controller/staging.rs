use futures::future::join_all;
use log::{info, warn};
use std::time::Duration;

use super::PoolHandle;
use crate::error::Result;
use crate::store::VmRecord;

const PASS_SLEEP: Duration = Duration::from_secs(1);
const PASS_BUDGET: Duration = Duration::from_secs(30);
/// Fetch the descriptor on the first eligible attempt, then every 20th
/// attempt thereafter, to throttle provider API use (spec §4.6 step 3).
const FETCH_THROTTLE: u32 = 20;

/// Staging-check loop (spec §4.6): continuous, 1 s sleep between passes, a
/// 30 s wall budget per pass. Every `staging` row is driven concurrently
/// through increment-retries → (maybe) fetch → probe → transition.
///
/// Grounded on `pool/maintenance.rs`'s `perform_maintenance` /
/// `execute_maintenance_operation` dispatch (timeout-wrapped per-VM
/// operation, state transition on success/failure/timeout), generalized
/// from one VM to a fan-out over every staging row in the pool, with
/// `tokio::time::timeout` bounding the whole pass rather than one VM.
pub async fn run(pool: PoolHandle) {
    let cancelled = pool.cancelled().clone();

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => return,
            _ = tokio::time::sleep(PASS_SLEEP) => {}
        }

        let pass = pass(&pool);
        if tokio::time::timeout(PASS_BUDGET, pass).await.is_err() {
            warn!(
                "[CHECKSTAGING] pass exceeded {}s budget for pool {}, abandoning stragglers",
                PASS_BUDGET.as_secs(),
                pool.pool_id()
            );
        }
    }
}

async fn pass(pool: &PoolHandle) {
    let pool_str = pool.pool_id().to_string();
    let rows = match pool.store.staging_rows(&pool_str).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("[CHECKSTAGING] failed to list staging rows for pool {pool_str}: {e}");
            return;
        }
    };

    join_all(rows.into_iter().map(|row| check_one(pool, row))).await;
}

async fn check_one(pool: &PoolHandle, row: VmRecord) {
    if let Err(e) = check_one_inner(pool, row).await {
        warn!("[CHECKSTAGING] staging check failed for pool {}: {e}", pool.pool_id());
    }
}

async fn check_one_inner(pool: &PoolHandle, row: VmRecord) -> Result<()> {
    let Some(row) = pool.store.increment_retries(row.id).await? else {
        return Ok(());
    };
    let retries = row.retries as u32;

    if retries < pool.provider.min_retries() {
        return Ok(());
    }

    let mut descriptor = row.data.clone();
    if retries == pool.provider.min_retries() + 1 || retries % FETCH_THROTTLE == 0 {
        match pool.provider.get_vm(&row.vmid).await {
            Ok(Some(fetched)) => {
                if fetched.host.is_some() {
                    pool.store.set_data(row.id, fetched.clone()).await?;
                }
                descriptor = Some(fetched);
            }
            Ok(None) => {}
            Err(crate::error::Error::ProviderNotFound(_)) => {
                pool.store.delete(row.id).await?;
                pool.metrics.record_stage_fail(row.vmid.clone()).await;
                info!("[CHECKSTAGING] vm {} gone (404), record removed", row.vmid);
                return Ok(());
            }
            Err(e) => {
                warn!("[CHECKSTAGING] get_vm failed for {}: {e}", row.vmid);
            }
        }
    }

    let Some(host) = descriptor.and_then(|d| d.host) else {
        return Ok(());
    };

    if pool.probe.check(&host).await {
        pool.store.mark_available(row.id).await?;
        pool.metrics.vbrowser_stage_retries.push(retries as f64).await;
        info!("[CHECKSTAGING] vm {} ready after {retries} retries", row.vmid);
        return Ok(());
    }

    if retries >= pool.config.give_up_retries {
        pool.metrics.record_stage_fail(row.vmid.clone()).await;
        warn!("[CHECKSTAGING] vm {} gave up after {retries} retries, resetting", row.vmid);
        crate::reset::reset_vm(pool.pool_id(), &row.vmid, None, &pool.store, &pool.provider).await?;
    } else if pool.config.recovery_modulus != 0 && retries % pool.config.recovery_modulus == 0 {
        if let Err(e) = pool.provider.power_on(&row.vmid).await {
            warn!("[CHECKSTAGING] power_on recovery failed for {}: {e}", row.vmid);
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
    use crate::store::{InMemoryStateStore, VmState};
    use std::sync::Arc;

    fn test_pool(
        give_up_retries: u32,
        provider: Arc<NullProviderAdapter>,
    ) -> PoolHandle {
        PoolManager::new(
            PoolId::new("aws", false, "us-east-1"),
            Arc::new(InMemoryStateStore::new()),
            provider,
            Arc::new(InMemoryRoomQueue::new()),
            PoolManagerConfig {
                min_size: 1,
                limit_size: 10,
                ramp_down_hours: None,
                ramp_up_hours: None,
                min_uptime_seconds: 3000,
                give_up_retries,
                recovery_modulus: 150,
                tag_prefix: "vbrowser-".to_string(),
                environment: crate::config::Environment::Development,
                boot_age_bound_seconds: 60_000,
            },
        )
    }

    #[tokio::test]
    async fn without_a_host_row_stays_in_staging() {
        let provider = Arc::new(NullProviderAdapter::with_min_retries(1));
        let pool = test_pool(240, provider);
        let id = pool
            .store
            .insert_staging(&pool.pool_id().to_string(), "vm-1")
            .await
            .unwrap();
        let row = VmRecord::new_staging(id, pool.pool_id().to_string(), "vm-1");

        // NullProviderAdapter returns a descriptor with no host until
        // `set_host` is called, so the probe step is never reached.
        for _ in 0..3 {
            check_one(&pool, row.clone()).await;
        }

        assert_eq!(pool.get_staging_vbrowsers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn give_up_threshold_resets_row() {
        let provider = Arc::new(NullProviderAdapter::with_min_retries(1));
        provider.set_host("vm-1", "invalid.invalid/control");
        let pool = test_pool(3, provider);
        let id = pool
            .store
            .insert_staging(&pool.pool_id().to_string(), "vm-1")
            .await
            .unwrap();
        let row = VmRecord::new_staging(id, pool.pool_id().to_string(), "vm-1");

        // 3rd call pushes retries to the give_up_retries(3) threshold and
        // fires the reset; a 4th call would re-increment the now-reset row
        // and spoil the `retries == 0` assertion below.
        for _ in 0..3 {
            check_one(&pool, row.clone()).await;
        }

        let fails = pool.metrics.vbrowser_stage_fails.lock().await;
        assert!(fails.contains(&"vm-1".to_string()));
        drop(fails);

        let row = pool.store.find_by_vmid("vm-1").await.unwrap().unwrap();
        assert_eq!(row.state, VmState::Staging);
        assert_eq!(row.retries, 0);
    }
}
