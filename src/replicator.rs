use crate::chain::{ChainBlock, ChainReader};
use crate::cursor::{ScanWindow, plan_window};
use crate::error::IndexerResult;
use crate::repository::{BlockRecord, BlockRepository, CursorRepository, Database, TxRecord};
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub const BLOCK_DATA_TARGET: &str = "block_data";

/// Blocks requested concurrently while filling one window.
const FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplicationOutcome {
    pub window: Option<ScanWindow>,
    pub blocks: usize,
    pub transactions: usize,
}

/// Copies block headers and transactions into `block_data` / `tx_data`.
///
/// A window is committed as one transaction together with its cursor, so a
/// failure anywhere in it leaves no rows behind and the next tick retries the
/// same window.
pub struct BlockReplicator {
    chain: Arc<dyn ChainReader>,
    db: Database,
    chain_id: u64,
    genesis_block: u64,
    window_width: u64,
}

impl BlockReplicator {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        db: Database,
        chain_id: u64,
        genesis_block: u64,
        window_width: u64,
    ) -> Self {
        Self {
            chain,
            db,
            chain_id,
            genesis_block,
            window_width,
        }
    }

    pub async fn run_once(&self) -> IndexerResult<ReplicationOutcome> {
        let start = Instant::now();

        let head = self.chain.head_block().await?;
        let cursor = {
            let conn = self.db.lock()?;
            CursorRepository::new(&conn, self.chain_id).get_cursor(BLOCK_DATA_TARGET)?
        };
        let Some(window) = plan_window(cursor, self.genesis_block, head, self.window_width) else {
            info!("Block data up to date at block {}", head);
            return Ok(ReplicationOutcome::default());
        };

        info!("Fetching {} blocks ({})", window.block_count(), window);
        let chain = self.chain.as_ref();
        let blocks: Vec<ChainBlock> = stream::iter(window.from_block..=window.to_block)
            .map(move |number| chain.get_block(number, true))
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let db = self.db.clone();
        let chain_id = self.chain_id;
        let (block_count, tx_count) =
            tokio::task::spawn_blocking(move || persist_window(&db, chain_id, &blocks, window))
                .await??;

        info!(
            "Stored {} blocks and {} transactions up to block {} in {:?}",
            block_count,
            tx_count,
            window.to_block,
            start.elapsed()
        );

        Ok(ReplicationOutcome {
            window: Some(window),
            blocks: block_count,
            transactions: tx_count,
        })
    }
}

fn persist_window(
    db: &Database,
    chain_id: u64,
    blocks: &[ChainBlock],
    window: ScanWindow,
) -> IndexerResult<(usize, usize)> {
    let conn = db.lock()?;
    let tx = conn.unchecked_transaction()?;
    let repo = BlockRepository::new(&tx);

    let mut tx_count = 0;
    for block in blocks {
        repo.insert_block(&BlockRecord::from(block))?;
        let records: Vec<TxRecord> = block
            .transactions
            .iter()
            .enumerate()
            .map(|(position, t)| TxRecord::from_chain(t, block, position as u64))
            .collect();
        tx_count += repo.insert_transactions(&records)?;
    }

    CursorRepository::new(&tx, chain_id).advance(BLOCK_DATA_TARGET, window.to_block)?;
    tx.commit()?;

    Ok((blocks.len(), tx_count))
}
