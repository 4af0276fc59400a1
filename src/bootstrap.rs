//! Process start-up shared by the long-running binaries.

use crate::config::Config;
use crate::error::IndexerResult;
use crate::node_health::{NodeHealthTable, NodeMonitor};
use crate::repository::Database;
use crate::rpc::RpcClient;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub struct Services {
    pub config: Config,
    pub db: Database,
    pub client: Arc<RpcClient>,
    /// Node health monitor of this process; resolves only on a fatal error.
    pub monitor: JoinHandle<IndexerResult<()>>,
}

/// Loads configuration, opens the store, connects to the endpoints and spawns
/// the health monitor the client fails over on.
pub fn start() -> Result<Services> {
    let config = Config::from_env()?;
    config.validate()?;
    info!("Configuration loaded");
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let health = NodeHealthTable::new(&config.json_rpc_urls);
    let client = RpcClient::new(
        &config.json_rpc_urls,
        health.clone(),
        config.request_timeout,
        config.request_retry_count,
    )?;
    info!("RPC client connected");

    let monitor = NodeMonitor::new(
        client.probes(),
        health,
        db.clone(),
        config.node_sync.clone(),
    );
    let monitor = tokio::spawn(monitor.run());

    Ok(Services {
        config,
        db,
        client: Arc::new(client),
        monitor,
    })
}
