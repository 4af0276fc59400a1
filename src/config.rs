use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Thresholds used by the node health monitor to decide whether an endpoint is synced.
#[derive(Debug, Clone)]
pub struct NodeSyncThresholds {
    /// Maximum `highestBlock - currentBlock` gap tolerated while a node reports syncing.
    pub remaining_blocks: u64,
    /// Percentage of the expected block production a node must reach.
    pub generation_speed_percent: f64,
    pub expected_blocks_per_sec: f64,
    /// Number of samples kept per endpoint; the oldest one is the comparison point.
    pub calc_period: usize,
    pub check_interval: Duration,
}

impl Default for NodeSyncThresholds {
    fn default() -> Self {
        Self {
            remaining_blocks: 2,
            generation_speed_percent: 20.0,
            expected_blocks_per_sec: 1.0,
            calc_period: 3,
            check_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Primary endpoint first, standby endpoints after it.
    pub json_rpc_urls: Vec<String>,
    pub database_url: String,
    pub chain_id: u64,
    pub worker_count: usize,
    pub sleep_interval: Duration,
    pub block_sync_interval: Duration,
    pub snapshot_interval: Duration,
    pub max_block_window: u64,
    pub block_data_window: u64,
    pub genesis_block: u64,
    pub request_timeout: Duration,
    pub request_retry_count: usize,
    pub node_sync: NodeSyncThresholds,
    pub company_list_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let primary = lookup("JSON_RPC_URL").context("JSON_RPC_URL must be set in .env")?;

        let mut json_rpc_urls = vec![primary];
        if let Some(standby) = lookup("JSON_RPC_URL_STANDBY") {
            json_rpc_urls.extend(
                standby
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(String::from),
            );
        }

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:./indexer.db".to_string());

        let node_sync = NodeSyncThresholds {
            remaining_blocks: parse_or(&lookup, "BLOCK_SYNC_REMAINING_THRESHOLD", 2)?,
            generation_speed_percent: parse_or(&lookup, "BLOCK_GENERATION_SPEED_THRESHOLD", 20.0)?,
            expected_blocks_per_sec: parse_or(&lookup, "EXPECTED_BLOCKS_PER_SEC", 1.0)?,
            calc_period: parse_or(&lookup, "BLOCK_SYNC_STATUS_CALC_PERIOD", 3)?,
            check_interval: Duration::from_secs(parse_or(
                &lookup,
                "BLOCK_SYNC_STATUS_SLEEP_INTERVAL",
                3,
            )?),
        };

        Ok(Config {
            json_rpc_urls,
            database_url,
            chain_id: parse_or(&lookup, "CHAIN_ID", 2017)?,
            worker_count: parse_or(&lookup, "WORKER_COUNT", 8)?,
            sleep_interval: Duration::from_secs(parse_or(&lookup, "SLEEP_INTERVAL", 3)?),
            block_sync_interval: Duration::from_secs(parse_or(&lookup, "BLOCK_SYNC_INTERVAL", 5)?),
            snapshot_interval: Duration::from_secs(parse_or(&lookup, "SNAPSHOT_INTERVAL", 10)?),
            max_block_window: parse_or(&lookup, "MAX_BLOCK_WINDOW", 1_000_000)?,
            block_data_window: parse_or(&lookup, "BLOCK_DATA_WINDOW", 100)?,
            genesis_block: parse_or(&lookup, "GENESIS_BLOCK", 0)?,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 5)?),
            request_retry_count: parse_or(&lookup, "REQUEST_RETRY_COUNT", 3)?,
            node_sync,
            company_list_path: lookup("COMPANY_LIST_PATH").map(PathBuf::from),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.json_rpc_urls.iter().any(|url| url.is_empty()) {
            anyhow::bail!("RPC URL cannot be empty");
        }
        if self.max_block_window == 0 || self.block_data_window == 0 {
            anyhow::bail!("Block window widths must be greater than zero");
        }
        if self.worker_count == 0 {
            anyhow::bail!("WORKER_COUNT must be greater than zero");
        }
        if self.node_sync.calc_period == 0 {
            anyhow::bail!("BLOCK_SYNC_STATUS_CALC_PERIOD must be greater than zero");
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")),
        None => Ok(default),
    }
}
