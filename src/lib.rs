//! # vBrowser Pool Manager
//!
//! Control plane that pools, assigns, and reclaims remote virtual-browser
//! VMs across cloud providers.
//!
//! This crate provides:
//! - A provider-agnostic [`provider::ProviderAdapter`] boundary to a cloud VM API
//! - A [`store::StateStore`] abstraction over the durable VM ledger
//! - The assignment and reset protocols (lease/release of a VM to a room)
//! - A [`controller::PoolManager`] that drives the five lifecycle loops
//!   (grow, shrink, staging-check, reconcile, stats) per pool
//!
//! ## Architecture
//!
//! ```text
//! PoolManager
//!     ├── Arc<dyn ProviderAdapter>  (cloud API: start/terminate/reboot/list)
//!     ├── Arc<dyn StateStore>       (durable VM ledger, skip-locked leasing)
//!     ├── Arc<dyn RoomQueue>        (externally owned cancellation signal)
//!     ├── BufferCalculator          (watermark math, ramp windows)
//!     ├── ReadinessProbe            (health-endpoint polling)
//!     └── Metrics                   (bounded rings + counters)
//! ```
//!
//! Each pool is identified by `(provider, region, size class)` (see
//! [`pool_id::PoolId`]); callers hold a [`controller::PoolHandle`] and drive
//! its public surface ([`controller::PoolManager::assign_vbrowser`],
//! [`controller::PoolManager::reset_vbrowser`], and friends).

pub mod assign;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod pool_id;
pub mod probe;
pub mod provider;
pub mod reset;
pub mod roomqueue;
pub mod store;

pub use assign::AssignedVm;
pub use config::Config;
pub use controller::{PoolHandle, PoolManager, PoolManagerConfig};
pub use error::{Error, Result};
pub use pool_id::PoolId;
pub use provider::{NullProviderAdapter, ProviderAdapter, VmDescriptor};
pub use roomqueue::RoomQueue;
pub use store::{StateStore, VmRecord, VmState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
