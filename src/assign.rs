use log::{info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::Metrics;
use crate::pool_id::PoolId;
use crate::provider::ProviderAdapter;
use crate::roomqueue::RoomQueue;
use crate::store::{StateStore, VmRecord, VmState};

/// The result of a successful lease: the leased row plus its `assignTime`.
#[derive(Debug, Clone)]
pub struct AssignedVm {
    pub record: VmRecord,
}

/// `assign(roomId, uid) → assignedVM | absent` (spec §4.5).
///
/// Grounded on `pool/allocation.rs`'s `VmAllocator::allocate_vm` — same
/// "filter candidates, pick one, mark allocated, record duration" shape,
/// adapted here from an in-process `Vec<VmInstance>` scan to a
/// transactional database lease (the loop-and-retry structure is the
/// teacher's; the locking primitive underneath it is the state store's).
///
/// Guarantees: at most one consumer per VM (the atomic lease primitive),
/// no waste on cancelled requests (queue-liveness re-checked every
/// iteration), and FIFO over VMs (lease picks ascending `id`). Does not
/// guarantee bounded wait.
pub async fn assign_vm(
    pool_id: &PoolId,
    room_id: &str,
    uid: &str,
    store: &Arc<dyn StateStore>,
    provider: &Arc<dyn ProviderAdapter>,
    room_queue: &Arc<dyn RoomQueue>,
    metrics: &Metrics,
    min_size: u64,
    tag_prefix: &str,
) -> Result<Option<AssignedVm>> {
    let pool = pool_id.to_string();
    let started = Instant::now();

    // Warm-on-demand: a pool with no standing minimum launches synchronously
    // on first demand (spec §4.5 step 2, boundary behavior in §8). This
    // write happens through its own path while the lease loop below may
    // also be running concurrently for other callers — the accepted
    // double-launch drift from spec §9's open question; shrink/reconcile
    // reclaim the excess.
    if min_size == 0 && store.count(&pool, Some(VmState::Available)).await? == 0 {
        start_vm_wrapper(pool_id, store, provider, tag_prefix).await;
    }

    loop {
        if !room_queue.is_waiting(room_id).await? {
            info!("[ASSIGN] room {room_id} no longer waiting, rolling back");
            return Ok(None);
        }

        match store.atomic_lease(&pool, room_id, uid).await {
            Ok(Some(record)) => {
                let latency_ms = started.elapsed().as_millis() as f64;
                metrics.vbrowser_start_ms.push(latency_ms).await;
                info!(
                    "[ASSIGN] leased vm {} to room {room_id} in {latency_ms:.0}ms",
                    record.vmid
                );
                return Ok(Some(AssignedVm { record }));
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(e) => {
                warn!("[ASSIGN] state store error leasing for room {room_id}: {e}");
                return Ok(None);
            }
        }
    }
}

/// Fire-and-forget warm-on-demand launch: provisions one VM and enqueues
/// its staging record via the store's own write path, independent of the
/// surrounding lease loop.
async fn start_vm_wrapper(
    pool_id: &PoolId,
    store: &Arc<dyn StateStore>,
    provider: &Arc<dyn ProviderAdapter>,
    tag_prefix: &str,
) {
    let pool = pool_id.to_string();
    let name = Uuid::new_v4().to_string();
    let tag = format!("{tag_prefix}{}", pool_id.region);

    match provider.start_vm(&name, &tag).await {
        Ok(vmid) => {
            if let Err(e) = store.insert_staging(&pool, &vmid).await {
                warn!("[ASSIGN] warm-on-demand insert_staging failed for {vmid}: {e}");
            } else {
                info!("[ASSIGN] warm-on-demand launch {vmid} for pool {pool}");
            }
        }
        Err(e) => warn!("[ASSIGN] warm-on-demand start_vm failed for pool {pool}: {e}"),
    }
}
