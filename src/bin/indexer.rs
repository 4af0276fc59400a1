use anyhow::Result;
use std::sync::Arc;
use sto_indexer::bootstrap::{Services, init_tracing, start};
use sto_indexer::listing::{CompanyDirectory, FileCompanyDirectory, ListingStore};
use sto_indexer::scheduler::{Job, Scheduler};
use sto_indexer::watcher::{EventWatcher, WatcherContext};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting notification indexer");

    let Services {
        config,
        db,
        client,
        monitor,
    } = start()?;

    let companies: Arc<dyn CompanyDirectory> = match &config.company_list_path {
        Some(path) => Arc::new(FileCompanyDirectory::load(path)?),
        None => Arc::new(FileCompanyDirectory::empty()),
    };

    let ctx = WatcherContext {
        chain: client,
        db: db.clone(),
        companies,
        chain_id: config.chain_id,
        genesis_block: config.genesis_block,
        max_block_window: config.max_block_window,
    };
    let jobs: Vec<Arc<dyn Job>> = EventWatcher::all(&ctx)?
        .into_iter()
        .map(|watcher| Arc::new(watcher) as Arc<dyn Job>)
        .collect();
    info!("{} event watchers configured", jobs.len());

    let scheduler = Scheduler::new(jobs, config.worker_count, config.sleep_interval)
        .with_listing(Arc::new(ListingStore::new(db)));

    tokio::select! {
        result = scheduler.run() => {
            if let Err(e) = result {
                error!("Scheduler error: {}", e);
                return Err(e.into());
            }
        }
        result = monitor => {
            result??;
        }
    }

    Ok(())
}
