//! Endpoint health monitoring and the shared table the RPC client fails over on.

use crate::chain::SyncStatus;
use crate::config::NodeSyncThresholds;
use crate::error::IndexerResult;
use crate::repository::{Database, NodeRepository};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHealth {
    pub endpoint_uri: String,
    /// 0 for the primary endpoint, 1 for standbys.
    pub priority: u32,
    /// `None` until the first health check.
    pub is_synced: Option<bool>,
}

/// Per-process endpoint health. Readers take snapshots; only [`NodeMonitor`] writes.
#[derive(Debug, Clone, Default)]
pub struct NodeHealthTable {
    nodes: Arc<RwLock<Vec<NodeHealth>>>,
}

impl NodeHealthTable {
    pub fn new(endpoint_uris: &[String]) -> Self {
        let nodes = endpoint_uris
            .iter()
            .enumerate()
            .map(|(index, uri)| NodeHealth {
                endpoint_uri: uri.clone(),
                priority: if index == 0 { 0 } else { 1 },
                is_synced: None,
            })
            .collect();
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    pub fn snapshot(&self) -> Vec<NodeHealth> {
        self.nodes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn select(&self, attempt: usize) -> Option<usize> {
        let nodes = self
            .nodes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        select_endpoint(&nodes, attempt)
    }

    /// Records a check result and returns the previous state.
    pub(crate) fn set_synced(&self, index: usize, synced: bool) -> Option<bool> {
        let mut nodes = self
            .nodes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        nodes
            .get_mut(index)
            .and_then(|node| node.is_synced.replace(synced))
    }
}

/// Index of the endpoint to use for the `attempt`-th try of a request.
///
/// Before any check has completed the primary is used. Afterwards only synced
/// endpoints qualify, ordered by priority then configuration order; retries
/// rotate through them.
pub fn select_endpoint(nodes: &[NodeHealth], attempt: usize) -> Option<usize> {
    if nodes.is_empty() {
        return None;
    }
    if nodes.iter().all(|node| node.is_synced.is_none()) {
        return Some(0);
    }

    let mut synced: Vec<(u32, usize)> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.is_synced == Some(true))
        .map(|(index, node)| (node.priority, index))
        .collect();
    if synced.is_empty() {
        return None;
    }
    synced.sort_unstable();
    Some(synced[attempt % synced.len()].1)
}

#[async_trait]
pub trait EndpointProbe: Send + Sync {
    fn uri(&self) -> &str;

    async fn syncing(&self) -> IndexerResult<SyncStatus>;

    async fn block_number(&self) -> IndexerResult<u64>;
}

#[derive(Debug, Clone, Copy)]
pub struct BlockSample {
    pub block_number: u64,
    pub observed_at: Instant,
}

/// Fixed-size history of head samples for one endpoint.
#[derive(Debug)]
struct SampleRing {
    capacity: usize,
    samples: VecDeque<BlockSample>,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    fn oldest(&self) -> Option<&BlockSample> {
        self.samples.front()
    }

    fn push(&mut self, sample: BlockSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

/// Whether an endpoint counts as synced given its `eth_syncing` answer, its current
/// head and the oldest retained head sample.
pub fn evaluate(
    status: SyncStatus,
    head: u64,
    now: Instant,
    oldest: Option<&BlockSample>,
    thresholds: &NodeSyncThresholds,
) -> bool {
    if let SyncStatus::Syncing {
        current_block,
        highest_block,
    } = status
    {
        if highest_block.saturating_sub(current_block) > thresholds.remaining_blocks {
            return false;
        }
    }

    if let Some(oldest) = oldest {
        let elapsed = now.saturating_duration_since(oldest.observed_at).as_secs_f64();
        if elapsed > 0.0 {
            let produced = head.saturating_sub(oldest.block_number) as f64;
            let required = elapsed
                * thresholds.expected_blocks_per_sec
                * thresholds.generation_speed_percent
                / 100.0;
            if produced < required {
                return false;
            }
        }
    }

    true
}

/// Periodically checks every endpoint, updates the shared [`NodeHealthTable`] and
/// mirrors the result into the `node` table.
pub struct NodeMonitor {
    probes: Vec<Arc<dyn EndpointProbe>>,
    health: NodeHealthTable,
    db: Database,
    thresholds: NodeSyncThresholds,
    samples: Vec<SampleRing>,
}

impl NodeMonitor {
    pub fn new(
        probes: Vec<Arc<dyn EndpointProbe>>,
        health: NodeHealthTable,
        db: Database,
        thresholds: NodeSyncThresholds,
    ) -> Self {
        let samples = probes
            .iter()
            .map(|_| SampleRing::new(thresholds.calc_period))
            .collect();
        Self {
            probes,
            health,
            db,
            thresholds,
            samples,
        }
    }

    /// Removes rows of endpoints that are no longer configured.
    pub fn initialize(&self) -> IndexerResult<()> {
        let uris: Vec<String> = self.probes.iter().map(|p| p.uri().to_string()).collect();
        let conn = self.db.lock()?;
        let removed = NodeRepository::new(&conn).retain(&uris)?;
        if removed > 0 {
            info!("Removed {} stale node entries", removed);
        }
        Ok(())
    }

    pub async fn check_all(&mut self) -> IndexerResult<()> {
        for index in 0..self.probes.len() {
            let synced = self.check_endpoint(index).await;
            let probe = &self.probes[index];
            let previous = self.health.set_synced(index, synced);

            match (previous, synced) {
                (Some(false), true) => info!("{} recovered and is synced", probe.uri()),
                (None, true) => debug!("{} is synced", probe.uri()),
                (Some(true) | None, false) => error!("{} is not synced", probe.uri()),
                (Some(false), false) => warn!("{} is still not synced", probe.uri()),
                (Some(true), true) => {}
            }
        }

        self.persist()
    }

    async fn check_endpoint(&mut self, index: usize) -> bool {
        let probe = Arc::clone(&self.probes[index]);

        let status = match probe.syncing().await {
            Ok(status) => status,
            Err(e) => {
                warn!("eth_syncing failed on {}: {}", probe.uri(), e);
                return false;
            }
        };
        let head = match probe.block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!("eth_blockNumber failed on {}: {}", probe.uri(), e);
                return false;
            }
        };

        let now = Instant::now();
        let ring = &mut self.samples[index];
        let synced = evaluate(status, head, now, ring.oldest(), &self.thresholds);
        ring.push(BlockSample {
            block_number: head,
            observed_at: now,
        });
        synced
    }

    fn persist(&self) -> IndexerResult<()> {
        let conn = self.db.lock()?;
        let repo = NodeRepository::new(&conn);
        for node in self.health.snapshot() {
            repo.upsert(
                &node.endpoint_uri,
                node.priority,
                node.is_synced.unwrap_or(false),
            )?;
        }
        Ok(())
    }

    /// Checks forever on the configured interval. Returns only on a fatal error.
    pub async fn run(mut self) -> IndexerResult<()> {
        self.initialize()?;
        loop {
            if let Err(e) = self.check_all().await {
                if e.is_fatal() {
                    return Err(e);
                }
                error!("Failed to record node status: {}", e);
            }
            tokio::time::sleep(self.thresholds.check_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexerError;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeProbe {
        uri: String,
        state: Mutex<IndexerResult<(SyncStatus, u64)>>,
    }

    impl FakeProbe {
        fn new(uri: &str, status: SyncStatus, head: u64) -> Arc<Self> {
            Arc::new(Self {
                uri: uri.to_string(),
                state: Mutex::new(Ok((status, head))),
            })
        }

        fn set(&self, state: IndexerResult<(SyncStatus, u64)>) {
            *self.state.lock().unwrap() = state;
        }

        fn current(&self) -> IndexerResult<(SyncStatus, u64)> {
            match &*self.state.lock().unwrap() {
                Ok(value) => Ok(*value),
                Err(e) => Err(IndexerError::Rpc(e.to_string())),
            }
        }
    }

    #[async_trait]
    impl EndpointProbe for FakeProbe {
        fn uri(&self) -> &str {
            &self.uri
        }

        async fn syncing(&self) -> IndexerResult<SyncStatus> {
            self.current().map(|(status, _)| status)
        }

        async fn block_number(&self) -> IndexerResult<u64> {
            self.current().map(|(_, head)| head)
        }
    }

    fn nodes(states: &[Option<bool>]) -> Vec<NodeHealth> {
        states
            .iter()
            .enumerate()
            .map(|(index, state)| NodeHealth {
                endpoint_uri: format!("http://node-{index}"),
                priority: if index == 0 { 0 } else { 1 },
                is_synced: *state,
            })
            .collect()
    }

    #[test]
    fn test_selection_prefers_primary_then_rotates() {
        assert_eq!(select_endpoint(&nodes(&[None, None]), 5), Some(0));
        assert_eq!(select_endpoint(&nodes(&[Some(true), Some(true)]), 0), Some(0));
        assert_eq!(select_endpoint(&nodes(&[Some(true), Some(true)]), 1), Some(1));
        assert_eq!(
            select_endpoint(&nodes(&[Some(false), Some(true), Some(true)]), 0),
            Some(1)
        );
        assert_eq!(select_endpoint(&nodes(&[Some(false), None]), 0), None);
        assert_eq!(select_endpoint(&[], 0), None);
    }

    #[test]
    fn test_evaluate_remaining_blocks_threshold() {
        let thresholds = NodeSyncThresholds::default();
        let now = Instant::now();
        let lagging = SyncStatus::Syncing {
            current_block: 100,
            highest_block: 103,
        };
        let close = SyncStatus::Syncing {
            current_block: 100,
            highest_block: 102,
        };
        assert!(!evaluate(lagging, 100, now, None, &thresholds));
        assert!(evaluate(close, 100, now, None, &thresholds));
        assert!(evaluate(SyncStatus::Synced, 100, now, None, &thresholds));
    }

    #[test]
    fn test_evaluate_generation_speed() {
        let thresholds = NodeSyncThresholds::default();
        let start = Instant::now();
        let oldest = BlockSample {
            block_number: 1_000,
            observed_at: start,
        };
        let later = start + Duration::from_secs(10);

        // 10s at 1 block/s with a 20% threshold requires 2 blocks
        assert!(evaluate(SyncStatus::Synced, 1_002, later, Some(&oldest), &thresholds));
        assert!(!evaluate(SyncStatus::Synced, 1_001, later, Some(&oldest), &thresholds));
    }

    #[test]
    fn test_sample_ring_keeps_capacity() {
        let mut ring = SampleRing::new(2);
        let now = Instant::now();
        for block_number in 1..=3 {
            ring.push(BlockSample {
                block_number,
                observed_at: now,
            });
        }
        assert_eq!(ring.oldest().unwrap().block_number, 2);
    }

    #[tokio::test]
    async fn test_monitor_updates_table_and_store() {
        let db = Database::in_memory().unwrap();
        let urls = vec!["http://primary".to_string(), "http://standby".to_string()];
        let health = NodeHealthTable::new(&urls);
        let primary = FakeProbe::new("http://primary", SyncStatus::Synced, 10);
        let standby = FakeProbe::new("http://standby", SyncStatus::Synced, 10);

        {
            let conn = db.lock().unwrap();
            NodeRepository::new(&conn)
                .upsert("http://retired", 1, true)
                .unwrap();
        }

        let mut monitor = NodeMonitor::new(
            vec![
                primary.clone() as Arc<dyn EndpointProbe>,
                standby.clone() as Arc<dyn EndpointProbe>,
            ],
            health.clone(),
            db.clone(),
            NodeSyncThresholds {
                expected_blocks_per_sec: 0.0,
                ..Default::default()
            },
        );
        monitor.initialize().unwrap();
        monitor.check_all().await.unwrap();
        assert_eq!(health.select(0), Some(0));

        primary.set(Err(IndexerError::Rpc("connection refused".to_string())));
        monitor.check_all().await.unwrap();
        assert_eq!(health.select(0), Some(1));

        let conn = db.lock().unwrap();
        let stored = NodeRepository::new(&conn).list().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].endpoint_uri, "http://primary");
        assert!(!stored[0].is_synced);
        assert!(stored[1].is_synced);
    }
}
