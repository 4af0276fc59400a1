//! Chain-facing types and the [`ChainReader`] seam between the indexing core and RPC.

use crate::error::IndexerResult;
use alloy_primitives::{Address, B64, B256, Bytes, U256};
use async_trait::async_trait;

/// A log entry with its full chain position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl ChainLog {
    /// Sort key matching chain order.
    pub fn position(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: B256,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub transaction_index: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub gas: u64,
    pub gas_price: Option<u128>,
    pub value: U256,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub sha3_uncles: Option<B256>,
    pub miner: Option<Address>,
    pub state_root: Option<B256>,
    pub transactions_root: Option<B256>,
    pub receipts_root: Option<B256>,
    pub logs_bloom: Option<Bytes>,
    pub difficulty: Option<U256>,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Option<Bytes>,
    pub mix_hash: Option<B256>,
    pub nonce: Option<B64>,
    pub size: Option<u64>,
    pub transaction_hashes: Vec<B256>,
    /// Populated only when the block was fetched with `include_tx`.
    pub transactions: Vec<ChainTransaction>,
}

/// `eth_syncing` result for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    Syncing {
        current_block: u64,
        highest_block: u64,
    },
}

/// Read access to the chain. Implementations handle endpoint selection and retries;
/// callers only see typed errors.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn head_block(&self) -> IndexerResult<u64>;

    async fn get_block(&self, number: u64, include_tx: bool) -> IndexerResult<ChainBlock>;

    /// Logs emitted by `address` whose first topic is `topic0`, inclusive range.
    ///
    /// Argument filters are not part of the query. Callers apply them to the
    /// decoded log, since the filtered arguments (`status`, the exchange's
    /// `token`) are not all indexed and `eth_getLogs` can only match topics.
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
