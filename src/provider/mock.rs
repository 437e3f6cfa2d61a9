use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{ProviderAdapter, VmDescriptor};
use crate::error::Result;

/// A deterministic provider adapter for tests.
///
/// Grounded on the teacher's in-module `MockVmManager` test double: every
/// call succeeds, VMs are fabricated in memory, and nothing ever crosses the
/// network. Every control loop's unit tests run against this rather than a
/// real cloud account — the point of treating the provider as "the
/// replaceable edge" (spec §2).
pub struct NullProviderAdapter {
    next_id: AtomicU64,
    hosts: Mutex<std::collections::HashMap<String, String>>,
    live: Mutex<std::collections::HashSet<String>>,
    min_retries: u32,
}

impl NullProviderAdapter {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            hosts: Mutex::new(std::collections::HashMap::new()),
            live: Mutex::new(std::collections::HashSet::new()),
            min_retries: 3,
        }
    }

    pub fn with_min_retries(min_retries: u32) -> Self {
        Self {
            min_retries,
            ..Self::new()
        }
    }

    /// Assign the descriptor `get_vm` will return for `vmid` a host, so
    /// tests can exercise the readiness probe without a real network call.
    pub fn set_host(&self, vmid: &str, host: &str) {
        self.hosts
            .lock()
            .expect("mock provider mutex poisoned")
            .insert(vmid.to_string(), host.to_string());
    }
}

impl Default for NullProviderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for NullProviderAdapter {
    async fn start_vm(&self, name: &str, _tag: &str) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let vmid = format!("mock-{}-{}", id, name);
        self.live
            .lock()
            .expect("mock provider mutex poisoned")
            .insert(vmid.clone());
        Ok(vmid)
    }

    async fn terminate_vm(&self, vmid: &str) -> Result<()> {
        self.live
            .lock()
            .expect("mock provider mutex poisoned")
            .remove(vmid);
        Ok(())
    }

    async fn reboot_vm(&self, _vmid: &str) -> Result<()> {
        Ok(())
    }

    async fn get_vm(&self, vmid: &str) -> Result<Option<VmDescriptor>> {
        let host = self
            .hosts
            .lock()
            .expect("mock provider mutex poisoned")
            .get(vmid)
            .cloned();

        Ok(Some(VmDescriptor {
            id: vmid.to_string(),
            pass: "mock-password".to_string(),
            host,
            private_ip: Some("10.0.0.1".to_string()),
            state: "running".to_string(),
            tags: vec!["mock".to_string()],
            creation_date: chrono::Utc::now(),
            provider: "mock".to_string(),
            large: false,
            region: "mock-region".to_string(),
        }))
    }

    async fn list_vms(&self, _tag_filter: &str) -> Result<Vec<VmDescriptor>> {
        let live = self.live.lock().expect("mock provider mutex poisoned").clone();
        let hosts = self.hosts.lock().expect("mock provider mutex poisoned");
        Ok(live
            .into_iter()
            .map(|vmid| VmDescriptor {
                host: hosts.get(&vmid).cloned(),
                pass: "mock-password".to_string(),
                private_ip: Some("10.0.0.1".to_string()),
                state: "running".to_string(),
                tags: vec!["mock".to_string()],
                creation_date: chrono::Utc::now(),
                provider: "mock".to_string(),
                large: false,
                region: "mock-region".to_string(),
                id: vmid,
            })
            .collect())
    }

    async fn power_on(&self, _vmid: &str) -> Result<()> {
        Ok(())
    }

    async fn attach_to_network(&self, _vmid: &str) -> Result<()> {
        Ok(())
    }

    async fn update_snapshot(&self) -> Result<String> {
        Ok("mock-snapshot".to_string())
    }

    fn size(&self) -> &str {
        "small"
    }

    fn large_size(&self) -> &str {
        "large"
    }

    fn min_retries(&self) -> u32 {
        self.min_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_vm_returns_unique_ids() {
        let adapter = NullProviderAdapter::new();
        let a = adapter.start_vm("alpha", "tag").await.unwrap();
        let b = adapter.start_vm("alpha", "tag").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn get_vm_reflects_set_host() {
        let adapter = NullProviderAdapter::new();
        adapter.set_host("vm-1", "10.1.1.1/control");
        let descriptor = adapter.get_vm("vm-1").await.unwrap().unwrap();
        assert_eq!(descriptor.host.as_deref(), Some("10.1.1.1/control"));
    }
}
