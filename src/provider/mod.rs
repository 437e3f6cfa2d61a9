use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod mock;

pub use mock::NullProviderAdapter;

/// The projection the controller sees of a provider-side VM (spec §3).
///
/// Opaque beyond `host` (consumed by the readiness probe) and `id` (the
/// stable external identifier threaded through `VmRecord::vmid`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub id: String,
    pub pass: String,
    pub host: Option<String>,
    pub private_ip: Option<String>,
    pub state: String,
    pub tags: Vec<String>,
    pub creation_date: chrono::DateTime<chrono::Utc>,
    pub provider: String,
    pub large: bool,
    pub region: String,
}

/// A capability set a concrete cloud provider must furnish (spec §4.1).
///
/// Every operation is asynchronous and fails with [`crate::error::Error::Provider`]
/// for anything the caller should treat as transient; [`crate::error::Error::ProviderNotFound`]
/// is reserved for the 404-class "the VM is gone" case that callers handle by
/// removing the record rather than retrying.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provisions a new VM tagged with the pool's tag
    /// (`tagPrefix + region + ("Large"|"")`). `name` doubles as the initial
    /// password material (spec §9's name/password coupling) — the adapter
    /// owns this contract; the controller never inspects it.
    async fn start_vm(&self, name: &str, tag: &str) -> Result<String>;

    /// Best-effort delete.
    async fn terminate_vm(&self, vmid: &str) -> Result<()>;

    /// Returns the VM to a clean boot with newly rotated credential
    /// material. Providers that do not rotate credentials on reboot must
    /// rename and rebuild instead.
    async fn reboot_vm(&self, vmid: &str) -> Result<()>;

    /// `None` when the descriptor is incomplete (e.g. missing IP).
    /// [`crate::error::Error::ProviderNotFound`] distinguishes "gone" from transient failure.
    async fn get_vm(&self, vmid: &str) -> Result<Option<VmDescriptor>>;

    /// Enumerates every provider-side VM bearing `tag_filter`. Pagination,
    /// if the provider requires it, is the adapter's concern.
    async fn list_vms(&self, tag_filter: &str) -> Result<Vec<VmDescriptor>>;

    /// Idempotent recovery hook used during staging.
    async fn power_on(&self, vmid: &str) -> Result<()>;

    /// Idempotent recovery hook used during staging.
    async fn attach_to_network(&self, vmid: &str) -> Result<()>;

    /// Operational maintenance path; not on the hot path.
    async fn update_snapshot(&self) -> Result<String>;

    /// Normal-size VM tag component.
    fn size(&self) -> &str;

    /// Large-size VM tag component.
    fn large_size(&self) -> &str;

    /// Lower bound on staging attempts before the readiness probe is
    /// trusted — a proxy for reboot time.
    fn min_retries(&self) -> u32;
}
