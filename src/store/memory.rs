use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::{StateStore, VmRecord, VmState};
use crate::error::Result;
use crate::provider::VmDescriptor;

/// A `tokio::sync::RwLock`-guarded in-memory [`StateStore`] for tests.
///
/// Grounded on the teacher's `InMemoryVmStorage` (`storage/memory.rs`): an
/// async lock rather than a `std::sync` one, so holding it never blocks the
/// runtime's other tasks across a suspension point, even though this
/// backend's own operations never actually await mid-mutation.
pub struct InMemoryStateStore {
    rows: RwLock<HashMap<i64, VmRecord>>,
    next_id: AtomicI64,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Seed a row directly, bypassing `insert_staging`, for test setup that
    /// needs specific ids/states/timestamps (the end-to-end scenarios in
    /// spec §8 seed rows with explicit ids and ages).
    pub async fn seed(&self, row: VmRecord) {
        self.rows.write().await.insert(row.id, row);
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn count(&self, pool: &str, state: Option<VmState>) -> Result<u64> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.pool == pool && state.map_or(true, |s| r.state == s))
            .count() as u64)
    }

    async fn insert_staging(&self, pool: &str, vmid: &str) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = VmRecord::new_staging(id, pool, vmid);
        self.rows.write().await.insert(id, row);
        Ok(id)
    }

    async fn atomic_lease(
        &self,
        pool: &str,
        room_id: &str,
        uid: &str,
    ) -> Result<Option<VmRecord>> {
        let mut rows = self.rows.write().await;
        let candidate_id = rows
            .values()
            .filter(|r| r.pool == pool && r.state == VmState::Available)
            .min_by_key(|r| r.id)
            .map(|r| r.id);

        let Some(id) = candidate_id else {
            return Ok(None);
        };

        let row = rows.get_mut(&id).expect("candidate id just selected");
        row.state = VmState::Used;
        row.room_id = Some(room_id.to_string());
        row.uid = Some(uid.to_string());
        row.assign_time = Some(chrono::Utc::now());
        Ok(Some(row.clone()))
    }

    async fn atomic_oldest_eligible_delete(
        &self,
        pool: &str,
        min_size: u64,
        min_uptime_seconds: u64,
    ) -> Result<Option<String>> {
        let mut rows = self.rows.write().await;
        let mut candidates: Vec<i64> = rows
            .values()
            .filter(|r| r.pool == pool && r.state == VmState::Available)
            .map(|r| r.id)
            .collect();
        candidates.sort_unstable();

        let eligible = candidates.into_iter().skip(min_size as usize).find(|id| {
            let row = &rows[id];
            let age_seconds = (chrono::Utc::now() - row.creation_time).num_seconds().max(0) as u64;
            (age_seconds % 3600) > min_uptime_seconds
        });

        if let Some(id) = eligible {
            let vmid = rows.remove(&id).map(|r| r.vmid);
            Ok(vmid)
        } else {
            Ok(None)
        }
    }

    async fn staging_rows(&self, pool: &str) -> Result<Vec<VmRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.pool == pool && r.state == VmState::Staging)
            .cloned()
            .collect())
    }

    async fn available_rows(&self, pool: &str) -> Result<Vec<VmRecord>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.pool == pool && r.state == VmState::Available)
            .cloned()
            .collect())
    }

    async fn increment_retries(&self, id: i64) -> Result<Option<VmRecord>> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&id) {
            row.retries += 1;
            Ok(Some(row.clone()))
        } else {
            Ok(None)
        }
    }

    async fn set_data(&self, id: i64, data: VmDescriptor) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&id) {
            row.data = Some(data);
        }
        Ok(())
    }

    async fn mark_available(&self, id: i64) -> Result<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.get_mut(&id) {
            row.state = VmState::Available;
            row.ready_time = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.rows.write().await.remove(&id);
        Ok(())
    }

    async fn reset_row(&self, pool: &str, vmid: &str, uid: Option<&str>) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let target = rows
            .values_mut()
            .find(|r| r.pool == pool && r.vmid == vmid);

        let Some(row) = target else {
            return Ok(false);
        };

        if let Some(expected_uid) = uid {
            if row.uid.as_deref() != Some(expected_uid) {
                return Ok(false);
            }
        }

        row.room_id = None;
        row.uid = None;
        row.retries = 0;
        row.heartbeat_time = None;
        row.ready_time = None;
        row.assign_time = None;
        row.data = None;
        row.reset_time = Some(chrono::Utc::now());
        row.state = VmState::Staging;
        Ok(true)
    }

    async fn find_by_vmid(&self, vmid: &str) -> Result<Option<VmRecord>> {
        let rows = self.rows.read().await;
        Ok(rows.values().find(|r| r.vmid == vmid).cloned())
    }

    async fn keep_set(&self, pool: &str, heartbeat_window_seconds: i64) -> Result<Vec<VmRecord>> {
        let rows = self.rows.read().await;
        let now = chrono::Utc::now();
        Ok(rows
            .values()
            .filter(|r| {
                r.pool == pool
                    && (matches!(r.state, VmState::Staging | VmState::Available)
                        || r.heartbeat_time
                            .map(|hb| (now - hb).num_seconds() <= heartbeat_window_seconds)
                            .unwrap_or(false))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_picks_lowest_id_among_available() {
        let store = InMemoryStateStore::new();
        for id in [3, 1, 2] {
            let mut row = VmRecord::new_staging(id, "pool", format!("vm-{id}"));
            row.state = VmState::Available;
            store.seed(row).await;
        }

        let leased = store.atomic_lease("pool", "room", "uid").await.unwrap().unwrap();
        assert_eq!(leased.id, 1);
        assert_eq!(store.count("pool", Some(VmState::Used)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lease_returns_none_when_pool_empty() {
        let store = InMemoryStateStore::new();
        assert!(store.atomic_lease("pool", "room", "uid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_row_rejects_uid_mismatch() {
        let store = InMemoryStateStore::new();
        let mut row = VmRecord::new_staging(1, "pool", "vm-1");
        row.state = VmState::Used;
        row.uid = Some("owner".to_string());
        store.seed(row).await;

        assert!(!store
            .reset_row("pool", "vm-1", Some("not-owner"))
            .await
            .unwrap());
        assert!(store.reset_row("pool", "vm-1", Some("owner")).await.unwrap());

        let row = store.find_by_vmid("vm-1").await.unwrap().unwrap();
        assert_eq!(row.state, VmState::Staging);
        assert_eq!(row.retries, 0);
        assert!(row.uid.is_none());
    }

    #[tokio::test]
    async fn oldest_eligible_delete_skips_min_size() {
        let store = InMemoryStateStore::new();
        for id in 1..=3 {
            let mut row = VmRecord::new_staging(id, "pool", format!("vm-{id}"));
            row.state = VmState::Available;
            row.creation_time = chrono::Utc::now() - chrono::Duration::minutes(90);
            store.seed(row).await;
        }

        // min_size=2 leaves only id=3 eligible for deletion.
        let deleted = store
            .atomic_oldest_eligible_delete("pool", 2, 10)
            .await
            .unwrap();
        assert_eq!(deleted, Some("vm-3".to_string()));
        assert_eq!(store.count("pool", Some(VmState::Available)).await.unwrap(), 2);
    }
}
