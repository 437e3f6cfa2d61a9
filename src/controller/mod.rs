use log::info;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assign::{assign_vm, AssignedVm};
use crate::buffer::BufferCalculator;
use crate::config::{Environment, HourWindow};
use crate::error::Result;
use crate::metrics::Metrics;
use crate::pool_id::PoolId;
use crate::probe::ReadinessProbe;
use crate::provider::ProviderAdapter;
use crate::reset::reset_vm;
use crate::roomqueue::RoomQueue;
use crate::store::StateStore;

pub mod grow;
pub mod reconcile;
pub mod shrink;
pub mod staging;
pub mod stats;

/// Per-pool tunables (spec §6 configuration table, scoped to one pool).
#[derive(Debug, Clone)]
pub struct PoolManagerConfig {
    pub min_size: u64,
    pub limit_size: u64,
    pub ramp_down_hours: Option<HourWindow>,
    pub ramp_up_hours: Option<HourWindow>,
    pub min_uptime_seconds: u64,
    pub give_up_retries: u32,
    pub recovery_modulus: u32,
    pub tag_prefix: String,
    pub environment: Environment,
    pub boot_age_bound_seconds: u64,
}

/// One Pool Manager per `(provider, region, size-class)` tuple (spec §2).
///
/// Grounded on the teacher's `VmPoolManager`/`TerraphimVmManager` composing
/// an `Arc<dyn VmManager>` plus config rather than subclassing it — the
/// interface+composition re-architecture spec §9 calls for explicitly.
/// `PoolHandle` (the `Arc<PoolManager>` callers hold) mirrors the teacher's
/// own `Arc<VmPoolManager>` usage pattern in `manager.rs`.
pub struct PoolManager {
    pool_id: PoolId,
    store: Arc<dyn StateStore>,
    provider: Arc<dyn ProviderAdapter>,
    room_queue: Arc<dyn RoomQueue>,
    metrics: Arc<Metrics>,
    buffer: BufferCalculator,
    probe: ReadinessProbe,
    config: PoolManagerConfig,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// `Arc`-wrapped handle a caller uses to reach a running pool's public
/// surface.
pub type PoolHandle = Arc<PoolManager>;

impl PoolManager {
    pub fn new(
        pool_id: PoolId,
        store: Arc<dyn StateStore>,
        provider: Arc<dyn ProviderAdapter>,
        room_queue: Arc<dyn RoomQueue>,
        config: PoolManagerConfig,
    ) -> PoolHandle {
        let buffer = BufferCalculator::new(config.ramp_down_hours, config.ramp_up_hours);
        let probe = ReadinessProbe::new(config.environment, config.boot_age_bound_seconds);
        Arc::new(Self {
            pool_id,
            store,
            provider,
            room_queue,
            metrics: Arc::new(Metrics::new()),
            buffer,
            probe,
            config,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn pool_id(&self) -> &PoolId {
        &self.pool_id
    }

    /// `assignVM(roomId, uid) → AssignedVM | absent` (spec §4.5, §6).
    pub async fn assign_vbrowser(&self, room_id: &str, uid: &str) -> Result<Option<AssignedVm>> {
        assign_vm(
            &self.pool_id,
            room_id,
            uid,
            &self.store,
            &self.provider,
            &self.room_queue,
            &self.metrics,
            self.config.min_size,
            &self.config.tag_prefix,
        )
        .await
    }

    /// `resetVM(vmid, uid?) → ()` (spec §4.7, §6).
    pub async fn reset_vbrowser(&self, vmid: &str, uid: Option<&str>) -> Result<()> {
        reset_vm(&self.pool_id, vmid, uid, &self.store, &self.provider).await
    }

    /// `getAvailableVBrowsers() → [vmid]` (spec §6): projection for ops dashboards.
    pub async fn get_available_vbrowsers(&self) -> Result<Vec<String>> {
        let rows = self.store.available_rows(&self.pool_id.to_string()).await?;
        Ok(rows.into_iter().map(|r| r.vmid).collect())
    }

    /// `getStagingVBrowsers() → [vmid]` (spec §6).
    pub async fn get_staging_vbrowsers(&self) -> Result<Vec<String>> {
        let rows = self.store.staging_rows(&self.pool_id.to_string()).await?;
        Ok(rows.into_iter().map(|r| r.vmid).collect())
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// `startBackgroundJobs() → ()` (spec §4.6, §6): starts the five
    /// lifecycle loops. One-shot; idempotency across calls is not required
    /// (spec §6), so callers should invoke this exactly once per pool.
    ///
    /// Grounded on the teacher's `VmPoolManager::start_background_tasks`
    /// (`tokio::spawn` + `tokio::time::interval`, repeated per loop), with
    /// each loop additionally racing the shared `CancellationToken` inside
    /// a `tokio::select!` — the supervised-shutdown generalization spec §9
    /// requires over the teacher's fire-and-forget tasks.
    pub fn start_background_jobs(self: &PoolHandle) {
        info!("[VMWORKER] starting background jobs for pool {}", self.pool_id);
        let mut tasks = self.tasks.try_lock().expect("start_background_jobs called once at startup");

        tasks.push(tokio::spawn(grow::run(self.clone())));
        tasks.push(tokio::spawn(shrink::run(self.clone())));
        tasks.push(tokio::spawn(staging::run(self.clone())));
        tasks.push(tokio::spawn(reconcile::run(self.clone())));
        tasks.push(tokio::spawn(stats::run(self.clone())));
    }

    /// Cancels the shared shutdown token and waits for every in-flight loop
    /// iteration to observe it and return.
    pub async fn shutdown(&self) {
        info!("[VMWORKER] shutting down pool {}", self.pool_id);
        self.shutdown.cancel();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }

    fn cancelled(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn watermarks(&self) -> (u64, u64) {
        self.buffer.watermarks(self.config.limit_size, chrono::Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NullProviderAdapter;
    use crate::roomqueue::InMemoryRoomQueue;
    use crate::store::InMemoryStateStore;

    fn test_pool() -> PoolHandle {
        PoolManager::new(
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
        )
    }

    #[tokio::test]
    async fn empty_pool_reports_no_vbrowsers() {
        let pool = test_pool();
        assert!(pool.get_available_vbrowsers().await.unwrap().is_empty());
        assert!(pool.get_staging_vbrowsers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_background_jobs() {
        let pool = test_pool();
        pool.start_background_jobs();
        pool.shutdown().await;
    }
}
