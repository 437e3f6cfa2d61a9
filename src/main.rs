use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use vbrowser_pool_manager::roomqueue::InMemoryRoomQueue;
use vbrowser_pool_manager::store::InMemoryStateStore;
use vbrowser_pool_manager::{
    Config, NullProviderAdapter, PoolId, PoolManager, ProviderAdapter, RoomQueue,
};

#[derive(Parser)]
#[command(name = "pool-manager")]
#[command(about = "Control plane for a warm pool of remote virtual-browser VMs")]
struct Cli {
    /// Path to a TOML config file; defaults are used when absent.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the background lifecycle loops for one pool and block until
    /// interrupted (spec §4.6, §6 `startBackgroundJobs`).
    Serve {
        #[arg(long, default_value = "dev")]
        provider_id: String,
        #[arg(long, default_value = "us-east-1")]
        region: String,
        #[arg(long)]
        large: bool,
    },
    /// Lease one VM to a room (spec §4.5 `assignVM`).
    Assign {
        #[arg(long)]
        room_id: String,
        #[arg(long)]
        uid: String,
        #[arg(long, default_value = "dev")]
        provider_id: String,
        #[arg(long, default_value = "us-east-1")]
        region: String,
    },
    /// Reboot a VM and return it to staging (spec §4.7 `resetVM`).
    Reset {
        #[arg(long)]
        vmid: String,
        #[arg(long)]
        uid: Option<String>,
        #[arg(long, default_value = "dev")]
        provider_id: String,
        #[arg(long, default_value = "us-east-1")]
        region: String,
    },
    /// Print available/staging vmids for ops dashboards (spec §6).
    Status {
        #[arg(long, default_value = "dev")]
        provider_id: String,
        #[arg(long, default_value = "us-east-1")]
        region: String,
    },
}

/// Build a standalone pool against in-memory collaborators. The concrete
/// provider adapter and the room-queue table are external collaborators the
/// spec scopes out (§1); this CLI wires the crate's own in-memory doubles so
/// the control loops run end-to-end without a live cloud account or database.
fn build_pool(config: &Config, pool_id: PoolId) -> vbrowser_pool_manager::PoolHandle {
    let store = Arc::new(InMemoryStateStore::new());
    let provider: Arc<dyn ProviderAdapter> = Arc::new(NullProviderAdapter::new());
    let room_queue: Arc<dyn RoomQueue> = Arc::new(InMemoryRoomQueue::new());

    PoolManager::new(
        pool_id,
        store,
        provider,
        room_queue,
        config.to_pool_manager_config(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let config = match Config::load_from_file(&cli.config).await {
        Ok(config) => config,
        Err(e) => {
            info!("no config at {}, using defaults ({e})", cli.config);
            Config::default()
        }
    }
    .apply_env_overrides();
    config.validate()?;

    match cli.command {
        Commands::Serve {
            provider_id,
            region,
            large,
        } => {
            let pool_id = PoolId::new(provider_id, large, region);
            info!("starting pool manager for pool {pool_id}");
            let pool = build_pool(&config, pool_id);
            pool.start_background_jobs();

            tokio::signal::ctrl_c().await?;
            info!("shutdown signal received");
            pool.shutdown().await;
        }
        Commands::Assign {
            room_id,
            uid,
            provider_id,
            region,
        } => {
            let pool = build_pool(&config, PoolId::new(provider_id, false, region));
            match pool.assign_vbrowser(&room_id, &uid).await? {
                Some(assigned) => println!("leased {}", assigned.record.vmid),
                None => println!("no vm assigned"),
            }
        }
        Commands::Reset {
            vmid,
            uid,
            provider_id,
            region,
        } => {
            let pool = build_pool(&config, PoolId::new(provider_id, false, region));
            pool.reset_vbrowser(&vmid, uid.as_deref()).await?;
            println!("reset {vmid}");
        }
        Commands::Status {
            provider_id,
            region,
        } => {
            let pool = build_pool(&config, PoolId::new(provider_id, false, region));
            println!("available: {:?}", pool.get_available_vbrowsers().await?);
            println!("staging: {:?}", pool.get_staging_vbrowsers().await?);
        }
    }

    Ok(())
}
