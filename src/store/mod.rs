use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::VmDescriptor;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStateStore;
pub use postgres::PostgresStateStore;

/// Lifecycle state of one managed VM row (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Staging,
    Available,
    Used,
}

/// One row per managed VM (spec §3). `(pool, vmid)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    /// Monotonic ordering key for FIFO lease and FIFO decommission.
    pub id: i64,
    pub pool: String,
    pub vmid: String,
    pub state: VmState,
    pub creation_time: chrono::DateTime<chrono::Utc>,
    pub ready_time: Option<chrono::DateTime<chrono::Utc>>,
    pub assign_time: Option<chrono::DateTime<chrono::Utc>>,
    pub heartbeat_time: Option<chrono::DateTime<chrono::Utc>>,
    pub reset_time: Option<chrono::DateTime<chrono::Utc>>,
    pub retries: i32,
    pub room_id: Option<String>,
    pub uid: Option<String>,
    pub data: Option<VmDescriptor>,
}

impl VmRecord {
    /// A freshly-provisioned row, created by the assignment protocol or the
    /// grow loop. Lands in `staging` with every lessee field null.
    pub fn new_staging(id: i64, pool: impl Into<String>, vmid: impl Into<String>) -> Self {
        Self {
            id,
            pool: pool.into(),
            vmid: vmid.into(),
            state: VmState::Staging,
            creation_time: chrono::Utc::now(),
            ready_time: None,
            assign_time: None,
            heartbeat_time: None,
            reset_time: None,
            retries: 0,
            room_id: None,
            uid: None,
            data: None,
        }
    }
}

/// The durable relational store of VM records (spec §4.2).
///
/// Every mutating primitive must be safe under many concurrent callers;
/// [`atomic_lease`](StateStore::atomic_lease) and
/// [`atomic_oldest_eligible_delete`](StateStore::atomic_oldest_eligible_delete)
/// are the two primitives that must use single-row skip-locked selection so
/// concurrent callers never collide.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Number of rows in `pool`, optionally narrowed to one state.
    async fn count(&self, pool: &str, state: Option<VmState>) -> Result<u64>;

    /// Insert a freshly-provisioned `staging` row, returning its assigned id.
    async fn insert_staging(&self, pool: &str, vmid: &str) -> Result<i64>;

    /// Atomically update the row of lowest `id` matching
    /// `(pool, state=available)`: set lessee fields, `state=used`,
    /// `assign_time=now`, and return the row as updated (its `data` is the
    /// prior cached provider descriptor, untouched by the lease itself).
    /// Must select at most one row per call and never collide with a
    /// concurrent caller.
    async fn atomic_lease(
        &self,
        pool: &str,
        room_id: &str,
        uid: &str,
    ) -> Result<Option<VmRecord>>;

    /// Within `(pool, state=available)`, ordered by `id` ascending, skip the
    /// first `min_size` rows and delete the first whose
    /// `(now - creation_time) mod 1h` exceeds `min_uptime` seconds. Returns
    /// the deleted row's `vmid`, if any.
    async fn atomic_oldest_eligible_delete(
        &self,
        pool: &str,
        min_size: u64,
        min_uptime_seconds: u64,
    ) -> Result<Option<String>>;

    /// Every row currently in `staging` for `pool`.
    async fn staging_rows(&self, pool: &str) -> Result<Vec<VmRecord>>;

    /// Every row currently in `available` for `pool`, for dashboard projections.
    async fn available_rows(&self, pool: &str) -> Result<Vec<VmRecord>>;

    /// Increment `retries` on `id`, returning the row's new state.
    async fn increment_retries(&self, id: i64) -> Result<Option<VmRecord>>;

    /// Persist a fetched provider descriptor onto the row.
    async fn set_data(&self, id: i64, data: VmDescriptor) -> Result<()>;

    /// Transition a `staging` row to `available`.
    async fn mark_available(&self, id: i64) -> Result<()>;

    /// Unconditionally delete a row by id (used on 404 from the provider).
    async fn delete(&self, id: i64) -> Result<()>;

    /// Clear lessee/retry/timestamp fields and return the row to `staging`.
    /// Returns `false` if no row matched `vmid` (optionally constrained to
    /// `uid`, for the reset protocol's ownership check).
    async fn reset_row(&self, pool: &str, vmid: &str, uid: Option<&str>) -> Result<bool>;

    /// Look a row up by its provider-side id, regardless of pool.
    async fn find_by_vmid(&self, vmid: &str) -> Result<Option<VmRecord>>;

    /// Every row in `pool` with `state in {staging, available}` or a
    /// heartbeat within the last `heartbeat_window_seconds` — the
    /// reconcile loop's keep-set.
    async fn keep_set(&self, pool: &str, heartbeat_window_seconds: i64) -> Result<Vec<VmRecord>>;
}
