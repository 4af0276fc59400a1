//! In-memory chain and listing fixtures for unit tests.

use crate::chain::{ChainBlock, ChainLog, ChainReader, ChainTransaction};
use crate::error::{IndexerError, IndexerResult};
use crate::events::{self, EventAbi};
use crate::listing::{ListingSource, TemplateKind, WatchedEntity};
use alloy::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

pub const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

#[derive(Default)]
struct FakeState {
    head: u64,
    blocks: BTreeMap<u64, ChainBlock>,
    logs: Vec<ChainLog>,
    failing_addresses: HashSet<Address>,
    failing_blocks: HashSet<u64>,
    names: HashMap<Address, String>,
    exchanges: HashMap<Address, Address>,
    deployments: HashMap<Address, u64>,
    unavailable: bool,
    log_queries: usize,
}

/// A [`ChainReader`] over fixtures. Blocks that were not added explicitly are
/// synthesised with `timestamp = GENESIS_TIMESTAMP + number` and no transactions.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn add_log(&self, log: ChainLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn add_block(&self, block: ChainBlock) {
        self.state.lock().unwrap().blocks.insert(block.number, block);
    }

    pub fn fail_address(&self, address: Address) {
        self.state.lock().unwrap().failing_addresses.insert(address);
    }

    pub fn heal_address(&self, address: Address) {
        self.state.lock().unwrap().failing_addresses.remove(&address);
    }

    pub fn fail_block(&self, number: u64) {
        self.state.lock().unwrap().failing_blocks.insert(number);
    }

    pub fn set_name(&self, token: Address, name: &str) {
        self.state
            .lock()
            .unwrap()
            .names
            .insert(token, name.to_string());
    }

    pub fn set_exchange(&self, token: Address, exchange: Address) {
        self.state.lock().unwrap().exchanges.insert(token, exchange);
    }

    pub fn set_deployment(&self, token: Address, block_number: u64) {
        self.state
            .lock()
            .unwrap()
            .deployments
            .insert(token, block_number);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn log_queries(&self) -> usize {
        self.state.lock().unwrap().log_queries
    }

    fn check_available(state: &FakeState) -> IndexerResult<()> {
        if state.unavailable {
            return Err(IndexerError::ServiceUnavailable(
                "no synced endpoint".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn head_block(&self) -> IndexerResult<u64> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.head)
    }

    async fn get_block(&self, number: u64, include_tx: bool) -> IndexerResult<ChainBlock> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        if state.failing_blocks.contains(&number) {
            return Err(IndexerError::Rpc(format!("block {number} unavailable")));
        }
        if number > state.head {
            return Err(IndexerError::NotFound(format!("block {number}")));
        }

        let mut block = state
            .blocks
            .get(&number)
            .cloned()
            .unwrap_or_else(|| chain_block(number, 0));
        if !include_tx {
            block.transactions.clear();
        }
        Ok(block)
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<ChainLog>> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        state.log_queries += 1;
        if state.failing_addresses.contains(&address) {
            return Err(IndexerError::Rpc(format!("eth_getLogs failed for {address}")));
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == address
                    && log.topics.first() == Some(&topic0)
                    && (from_block..=to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn get_code_at(&self, address: Address, block_number: u64) -> IndexerResult<Bytes> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        match state.deployments.get(&address) {
            Some(deployed) if block_number >= *deployed => Ok(Bytes::from_static(&[0x60, 0x80])),
            _ => Ok(Bytes::new()),
        }
    }

    async fn token_name(&self, token: Address) -> IndexerResult<String> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        state
            .names
            .get(&token)
            .cloned()
            .ok_or_else(|| IndexerError::Rpc(format!("name() reverted on {token}")))
    }

    async fn tradable_exchange(&self, token: Address) -> IndexerResult<Address> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.exchanges.get(&token).copied().unwrap_or(Address::ZERO))
    }
}

/// Fixed watch set.
pub struct StaticListing(pub Vec<WatchedEntity>);

#[async_trait]
impl ListingSource for StaticListing {
    async fn list_entities(&self, public_only: bool) -> IndexerResult<Vec<WatchedEntity>> {
        Ok(self
            .0
            .iter()
            .filter(|entity| !public_only || entity.is_public)
            .cloned()
            .collect())
    }
}

pub fn entity(address: Address, template: TemplateKind, is_public: bool) -> WatchedEntity {
    WatchedEntity {
        address,
        template,
        owner_address: Address::repeat_byte(0xee),
        is_public,
    }
}

pub fn chain_block(number: u64, tx_count: u64) -> ChainBlock {
    let hash = B256::from(U256::from(number + 1));
    let transactions: Vec<ChainTransaction> = (0..tx_count)
        .map(|index| ChainTransaction {
            hash: B256::from(U256::from((number << 16) + index + 1)),
            block_hash: Some(hash),
            block_number: Some(number),
            transaction_index: Some(index),
            from: Address::repeat_byte(0x11),
            to: Some(Address::repeat_byte(0x22)),
            input: Bytes::new(),
            gas: 21_000,
            gas_price: Some(0),
            value: U256::ZERO,
            nonce: index,
        })
        .collect();

    ChainBlock {
        number,
        hash,
        parent_hash: B256::from(U256::from(number)),
        sha3_uncles: None,
        miner: Some(Address::ZERO),
        state_root: None,
        transactions_root: None,
        receipts_root: None,
        logs_bloom: None,
        difficulty: Some(U256::from(1u64)),
        gas_limit: 800_000_000,
        gas_used: 21_000 * tx_count,
        timestamp: GENESIS_TIMESTAMP + number,
        extra_data: Some(Bytes::new()),
        mix_hash: None,
        nonce: None,
        size: Some(600),
        transaction_hashes: transactions.iter().map(|tx| tx.hash).collect(),
        transactions,
    }
}

/// Builds a log for `signature` with real ABI encoding of its arguments.
pub fn encode_log(
    token: Address,
    signature: &str,
    indexed: Vec<DynSolValue>,
    body: Vec<DynSolValue>,
    (block_number, transaction_index, log_index): (u64, u64, u64),
) -> ChainLog {
    let abi = EventAbi::parse(signature).unwrap();
    let mut topics = vec![abi.topic0()];
    topics.extend(indexed.iter().map(|value| value.as_word().unwrap()));

    ChainLog {
        address: token,
        topics,
        data: DynSolValue::Tuple(body).abi_encode_params().into(),
        block_number,
        transaction_index,
        log_index,
        transaction_hash: B256::from(U256::from(
            (block_number << 24) + (transaction_index << 8) + 1,
        )),
    }
}

fn amount(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

pub fn transfer_log(
    token: Address,
    from: Address,
    to: Address,
    value: u64,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        token,
        events::TRANSFER,
        vec![DynSolValue::Address(from), DynSolValue::Address(to)],
        vec![amount(value)],
        position,
    )
}

pub fn issue_log(
    token: Address,
    target: Address,
    lock_address: Address,
    value: u64,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        token,
        events::ISSUE,
        vec![
            DynSolValue::Address(Address::repeat_byte(0xee)),
            DynSolValue::Address(target),
            DynSolValue::Address(lock_address),
        ],
        vec![amount(value)],
        position,
    )
}

pub fn redeem_log(
    token: Address,
    target: Address,
    lock_address: Address,
    value: u64,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        token,
        events::REDEEM,
        vec![
            DynSolValue::Address(Address::repeat_byte(0xee)),
            DynSolValue::Address(target),
            DynSolValue::Address(lock_address),
        ],
        vec![amount(value)],
        position,
    )
}

pub fn lock_log(
    token: Address,
    account: Address,
    lock_address: Address,
    value: u64,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        token,
        events::LOCK,
        vec![
            DynSolValue::Address(account),
            DynSolValue::Address(lock_address),
        ],
        vec![amount(value), DynSolValue::String(String::new())],
        position,
    )
}

pub fn unlock_log(
    token: Address,
    account: Address,
    lock_address: Address,
    recipient: Address,
    value: u64,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        token,
        events::UNLOCK,
        vec![
            DynSolValue::Address(account),
            DynSolValue::Address(lock_address),
        ],
        vec![
            DynSolValue::Address(recipient),
            amount(value),
            DynSolValue::String(String::new()),
        ],
        position,
    )
}

pub fn holder_changed_log(
    exchange: Address,
    token: Address,
    from: Address,
    to: Address,
    value: u64,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        exchange,
        events::HOLDER_CHANGED,
        vec![
            DynSolValue::Address(token),
            DynSolValue::Address(from),
            DynSolValue::Address(to),
        ],
        vec![amount(value)],
        position,
    )
}

pub fn status_log(
    token: Address,
    signature: &str,
    status: bool,
    position: (u64, u64, u64),
) -> ChainLog {
    encode_log(
        token,
        signature,
        vec![],
        vec![DynSolValue::Bool(status)],
        position,
    )
}
