use log::{info, warn};
use std::sync::Arc;

use crate::error::Result;
use crate::pool_id::PoolId;
use crate::provider::ProviderAdapter;
use crate::store::StateStore;

/// `resetVM(vmid, uid?)` (spec §4.7).
///
/// Grounded on `pool/allocation.rs`'s `VmAllocator::release_vm`
/// (mark-ready-and-record shape), generalized here to the spec's full
/// field-clear / rebind-to-staging semantics, plus the provider reboot call
/// modeled on `vm/firecracker.rs`'s `stop_vm`/`start_vm` pair — reset always
/// reboots, never stops-then-starts, per the spec's credential-rotation note
/// (§9): the provider rotates the password on reboot, which is the whole
/// point of preferring reuse over terminate-and-relaunch for short sessions
/// on hourly-billed VMs.
pub async fn reset_vm(
    pool_id: &PoolId,
    vmid: &str,
    uid: Option<&str>,
    store: &Arc<dyn StateStore>,
    provider: &Arc<dyn ProviderAdapter>,
) -> Result<()> {
    let pool = pool_id.to_string();

    if let Some(uid) = uid {
        if let Some(existing) = store.find_by_vmid(vmid).await? {
            if existing.uid.as_deref() != Some(uid) {
                info!("[RESET] uid mismatch for vm {vmid}, no-op");
                return Ok(());
            }
        }
    }

    if let Err(e) = provider.reboot_vm(vmid).await {
        warn!("[RESET] reboot failed for vm {vmid}: {e}");
    }

    let updated = store.reset_row(&pool, vmid, uid).await?;

    if updated {
        info!("[RESET] vm {vmid} returned to staging");
    } else {
        warn!("[RESET] no record for vm {vmid}, terminating directly to avoid a leak");
        provider.terminate_vm(vmid).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NullProviderAdapter;
    use crate::store::{InMemoryStateStore, VmRecord, VmState};

    fn pool_id() -> PoolId {
        PoolId::new("aws", false, "us-east-1")
    }

    #[tokio::test]
    async fn reset_returns_used_vm_to_staging() {
        let store = Arc::new(InMemoryStateStore::new());
        let provider: Arc<dyn ProviderAdapter> = Arc::new(NullProviderAdapter::new());
        let pool = pool_id();

        let mut row = VmRecord::new_staging(1, pool.to_string(), "vm-1");
        row.state = VmState::Used;
        row.uid = Some("owner".to_string());
        row.retries = 7;
        store.seed(row).await;

        let store: Arc<dyn StateStore> = store;
        reset_vm(&pool, "vm-1", Some("owner"), &store, &provider)
            .await
            .unwrap();

        let row = store.find_by_vmid("vm-1").await.unwrap().unwrap();
        assert_eq!(row.state, VmState::Staging);
        assert_eq!(row.retries, 0);
        assert!(row.uid.is_none());
    }

    #[tokio::test]
    async fn reset_with_mismatched_uid_is_a_no_op() {
        let store = Arc::new(InMemoryStateStore::new());
        let provider: Arc<dyn ProviderAdapter> = Arc::new(NullProviderAdapter::new());
        let pool = pool_id();

        let mut row = VmRecord::new_staging(1, pool.to_string(), "vm-1");
        row.state = VmState::Used;
        row.uid = Some("owner".to_string());
        store.seed(row).await;

        let store: Arc<dyn StateStore> = store;
        reset_vm(&pool, "vm-1", Some("intruder"), &store, &provider)
            .await
            .unwrap();

        let row = store.find_by_vmid("vm-1").await.unwrap().unwrap();
        assert_eq!(row.state, VmState::Used);
    }

    #[tokio::test]
    async fn reset_of_absent_record_terminates_directly() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let provider: Arc<dyn ProviderAdapter> = Arc::new(NullProviderAdapter::new());
        let pool = pool_id();

        // terminate_vm on the null adapter always succeeds; absence of a
        // panic here is the assertion that the fallback path ran.
        reset_vm(&pool, "ghost-vm", None, &store, &provider)
            .await
            .unwrap();
    }
}
