use anyhow::Result;
use std::sync::Arc;
use sto_indexer::bootstrap::{Services, init_tracing, start};
use sto_indexer::replicator::BlockReplicator;
use sto_indexer::scheduler::{Job, Scheduler};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting block data sync");

    let Services {
        config,
        db,
        client,
        monitor,
    } = start()?;

    let replicator = BlockReplicator::new(
        client,
        db,
        config.chain_id,
        config.genesis_block,
        config.block_data_window,
    );
    let scheduler = Scheduler::new(
        vec![Arc::new(replicator) as Arc<dyn Job>],
        1,
        config.block_sync_interval,
    );

    tokio::select! {
        result = scheduler.run() => {
            if let Err(e) = result {
                error!("Block sync error: {}", e);
                return Err(e.into());
            }
        }
        result = monitor => {
            result??;
        }
    }

    Ok(())
}
