use anyhow::Result;
use std::sync::Arc;
use sto_indexer::bootstrap::{Services, init_tracing, start};
use sto_indexer::scheduler::{Job, Scheduler};
use sto_indexer::snapshot::HolderSnapshotBuilder;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting token holder snapshot collector");

    let Services {
        config,
        db,
        client,
        monitor,
    } = start()?;

    let builder = HolderSnapshotBuilder::new(client, db, config.max_block_window)?;
    let scheduler = Scheduler::new(
        vec![Arc::new(builder) as Arc<dyn Job>],
        1,
        config.snapshot_interval,
    );

    tokio::select! {
        result = scheduler.run() => {
            if let Err(e) = result {
                error!("Snapshot collector error: {}", e);
                return Err(e.into());
            }
        }
        result = monitor => {
            result??;
        }
    }

    Ok(())
}
