use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the pool controller (see spec §7).
///
/// Every variant maps to one of the six buckets the controller distinguishes:
/// transient provider error, permanent 404, state-store error, probe
/// failure, give-up-after-retries, and orphan provider VM. No error of this
/// type is allowed to escape a background loop — every loop body logs and
/// continues instead of propagating.
#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum Error {
    /// Transient provider error (5xx, timeout). Caller should retry next tick.
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider returned 404 for a vmid: the VM is gone, the record can be removed.
    #[error("provider vm not found: {0}")]
    ProviderNotFound(String),

    /// State-store error (query failure, pool exhausted, connection dropped).
    #[error("state store error: {0}")]
    Store(String),

    /// Readiness probe failed (network, timeout, non-2xx).
    #[error("readiness probe failed: {0}")]
    ProbeFailed(String),

    /// Staging retries exceeded the give-up bound.
    #[error("vm {0} gave up staging after {1} retries")]
    GivenUp(String, u32),

    /// Reconcile found a provider-side VM with no corresponding record and no heartbeat.
    #[error("orphan vm: {0}")]
    Orphan(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
