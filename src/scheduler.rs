//! Tick-based scheduler running a set of jobs on a bounded worker pool.

use crate::error::{IndexerError, IndexerResult};
use crate::listing::{ListingSource, WatchedEntity};
use crate::replicator::{BLOCK_DATA_TARGET, BlockReplicator};
use crate::snapshot::HolderSnapshotBuilder;
use crate::watcher::EventWatcher;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// One unit of work run on every tick.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run_once(&self, entities: &[WatchedEntity]) -> IndexerResult<()>;
}

#[async_trait]
impl Job for EventWatcher {
    fn name(&self) -> &str {
        self.target()
    }

    async fn run_once(&self, entities: &[WatchedEntity]) -> IndexerResult<()> {
        EventWatcher::run_once(self, entities).await.map(|_| ())
    }
}

#[async_trait]
impl Job for BlockReplicator {
    fn name(&self) -> &str {
        BLOCK_DATA_TARGET
    }

    async fn run_once(&self, _entities: &[WatchedEntity]) -> IndexerResult<()> {
        BlockReplicator::run_once(self).await.map(|_| ())
    }
}

#[async_trait]
impl Job for HolderSnapshotBuilder {
    fn name(&self) -> &str {
        "holder_snapshot"
    }

    /// Collects every run that is ready now.
    async fn run_once(&self, _entities: &[WatchedEntity]) -> IndexerResult<()> {
        self.collect_ready().await.map(|_| ())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    listing: Option<Arc<dyn ListingSource>>,
    worker_count: usize,
    interval: Duration,
}

impl Scheduler {
    pub fn new(jobs: Vec<Arc<dyn Job>>, worker_count: usize, interval: Duration) -> Self {
        Self {
            jobs,
            listing: None,
            worker_count: worker_count.max(1),
            interval,
        }
    }

    /// Refresh the watch set from `listing` at the start of every tick.
    pub fn with_listing(mut self, listing: Arc<dyn ListingSource>) -> Self {
        self.listing = Some(listing);
        self
    }

    /// Runs every job once and waits for all of them.
    ///
    /// Job failures are logged and counted. A fatal error is returned only after
    /// every sibling finished.
    pub async fn tick(&self) -> IndexerResult<TickReport> {
        let entities = match &self.listing {
            Some(listing) => match listing.list_entities(false).await {
                Ok(entities) => entities,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Could not refresh the watch set: {}", e);
                    return Ok(TickReport::default());
                }
            },
            None => Vec::new(),
        };
        let entities = Arc::new(entities);
        let semaphore = Arc::new(Semaphore::new(self.worker_count));

        let mut set = JoinSet::new();
        for job in &self.jobs {
            let job = Arc::clone(job);
            let entities = Arc::clone(&entities);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let name = job.name().to_string();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let closed = IndexerError::InvalidState(e.to_string());
                        return (name, Err(closed), Duration::ZERO);
                    }
                };
                let start = Instant::now();
                let result = job.run_once(&entities).await;
                (name, result, start.elapsed())
            });
        }

        let mut report = TickReport::default();
        let mut fatal = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, Ok(()), elapsed)) => {
                    report.succeeded += 1;
                    debug!("{} finished in {:?}", name, elapsed);
                }
                Ok((name, Err(e), elapsed)) => {
                    report.failed += 1;
                    match &e {
                        IndexerError::ServiceUnavailable(_) => {
                            warn!("{} skipped after {:?}: {}", name, elapsed, e)
                        }
                        _ => error!("{} failed after {:?}: {}", name, elapsed, e),
                    }
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Job task aborted: {}", e);
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Ticks until a fatal error. The sleep between ticks shrinks by the time the
    /// tick took, so the cadence does not drift under load.
    pub async fn run(&self) -> IndexerResult<()> {
        info!(
            "Scheduler started with {} jobs, {} workers, interval {:?}",
            self.jobs.len(),
            self.worker_count,
            self.interval
        );
        loop {
            let start = Instant::now();
            let report = self.tick().await?;
            let elapsed = start.elapsed();
            info!(
                "Tick finished in {:?}: {} ok, {} failed",
                elapsed, report.succeeded, report.failed
            );
            tokio::time::sleep(self.interval.saturating_sub(elapsed)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NotificationType, definition_for};
    use crate::chain::{ChainBlock, ChainLog, ChainReader};
    use crate::listing::{FileCompanyDirectory, TemplateKind};
    use crate::repository::{CursorRepository, Database};
    use crate::testutil::{StaticListing, entity};
    use crate::watcher::WatcherContext;
    use alloy_primitives::{Address, B256, Bytes};
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Chain {}

        #[async_trait]
        impl ChainReader for Chain {
            async fn head_block(&self) -> IndexerResult<u64>;
            async fn get_block(&self, number: u64, include_tx: bool) -> IndexerResult<ChainBlock>;
            async fn get_logs(
                &self,
                address: Address,
                topic0: B256,
                from_block: u64,
                to_block: u64,
            ) -> IndexerResult<Vec<ChainLog>>;
            async fn get_code_at(&self, address: Address, block_number: u64) -> IndexerResult<Bytes>;
            async fn token_name(&self, token: Address) -> IndexerResult<String>;
            async fn tradable_exchange(&self, token: Address) -> IndexerResult<Address>;
        }
    }

    enum Behaviour {
        Succeed,
        Fail(fn() -> IndexerError),
        Panic,
    }

    struct CountingJob {
        name: String,
        behaviour: Behaviour,
        runs: AtomicUsize,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl CountingJob {
        fn new(name: &str, behaviour: Behaviour) -> Arc<Self> {
            Self::shared(name, behaviour, Arc::default(), Arc::default())
        }

        fn shared(
            name: &str,
            behaviour: Behaviour,
            running: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                behaviour,
                runs: AtomicUsize::new(0),
                running,
                peak,
            })
        }
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run_once(&self, _entities: &[WatchedEntity]) -> IndexerResult<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);

            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail(error) => Err(error()),
                Behaviour::Panic => panic!("job blew up"),
            }
        }
    }

    #[tokio::test]
    async fn test_failing_jobs_do_not_cancel_siblings() {
        let ok = CountingJob::new("ok", Behaviour::Succeed);
        let failing = CountingJob::new(
            "failing",
            Behaviour::Fail(|| IndexerError::Rpc("boom".to_string())),
        );
        let panicking = CountingJob::new("panicking", Behaviour::Panic);
        let scheduler = Scheduler::new(
            vec![
                ok.clone() as Arc<dyn Job>,
                failing.clone() as Arc<dyn Job>,
                panicking as Arc<dyn Job>,
            ],
            4,
            Duration::from_secs(1),
        );

        let report = scheduler.tick().await.unwrap();
        assert_eq!(
            report,
            TickReport {
                succeeded: 1,
                failed: 2
            }
        );
        assert_eq!(ok.runs.load(Ordering::SeqCst), 1);
        assert_eq!(failing.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_surfaces_after_siblings_finish() {
        let ok = CountingJob::new("ok", Behaviour::Succeed);
        let fatal = CountingJob::new(
            "fatal",
            Behaviour::Fail(|| IndexerError::CursorRegression {
                target: "block_data".to_string(),
                current: 10,
                requested: 5,
            }),
        );
        let scheduler = Scheduler::new(
            vec![fatal as Arc<dyn Job>, ok.clone() as Arc<dyn Job>],
            1,
            Duration::from_secs(1),
        );

        let err = scheduler.tick().await.unwrap_err();
        assert!(matches!(err, IndexerError::CursorRegression { .. }));
        assert_eq!(ok.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_worker_count_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<Arc<dyn Job>> = (0..6)
            .map(|i| {
                CountingJob::shared(
                    &format!("job-{i}"),
                    Behaviour::Succeed,
                    running.clone(),
                    peak.clone(),
                ) as Arc<dyn Job>
            })
            .collect();
        let scheduler = Scheduler::new(jobs, 2, Duration::from_secs(1));

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.succeeded, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unavailable_chain_is_tick_local() {
        let mut chain = MockChain::new();
        chain.expect_head_block().returning(|| {
            Err(IndexerError::ServiceUnavailable(
                "no synced endpoint".to_string(),
            ))
        });
        chain.expect_get_logs().never();

        let db = Database::in_memory().unwrap();
        let ctx = WatcherContext {
            chain: Arc::new(chain),
            db: db.clone(),
            companies: Arc::new(FileCompanyDirectory::empty()),
            chain_id: 2017,
            genesis_block: 0,
            max_block_window: 100,
        };
        let watcher = Arc::new(
            EventWatcher::new(
                ctx,
                definition_for(NotificationType::Transfer),
                TemplateKind::IbetShare,
            )
            .unwrap(),
        );
        let listing = Arc::new(StaticListing(vec![entity(
            Address::repeat_byte(0x01),
            TemplateKind::IbetShare,
            true,
        )]));
        let scheduler = Scheduler::new(
            vec![watcher.clone() as Arc<dyn Job>],
            2,
            Duration::from_secs(1),
        )
        .with_listing(listing);

        for _ in 0..3 {
            let report = scheduler.tick().await.unwrap();
            assert_eq!(report.failed, 1);
        }
        let conn = db.lock().unwrap();
        assert_eq!(
            CursorRepository::new(&conn, 2017)
                .get_cursor(watcher.target())
                .unwrap(),
            None
        );
    }
}
