use crate::catalog::{NotificationType, Priority};
use crate::chain::{ChainBlock, ChainTransaction};
use alloy_primitives::{Address, U256, hex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    pub company_name: String,
    pub token_address: String,
    pub token_name: String,
    pub exchange_address: String,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub notification_id: String,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub address: Option<Address>,
    pub block_timestamp: u64,
    pub args: Map<String, Value>,
    pub metainfo: NotificationMetadata,
}

/// A stored notification together with the flags the API layer maintains.
#[derive(Debug, Clone)]
pub struct NotificationView {
    pub record: NotificationRecord,
    pub is_read: bool,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub created: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub sha3_uncles: Option<String>,
    pub miner: Option<String>,
    pub state_root: Option<String>,
    pub transactions_root: Option<String>,
    pub receipts_root: Option<String>,
    pub logs_bloom: Option<String>,
    pub difficulty: Option<String>,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub proof_of_authority_data: Option<String>,
    pub mix_hash: Option<String>,
    pub nonce: Option<String>,
    pub size: Option<u64>,
    pub transactions: Vec<String>,
}

impl From<&ChainBlock> for BlockRecord {
    fn from(block: &ChainBlock) -> Self {
        BlockRecord {
            number: block.number,
            hash: format!("{:?}", block.hash),
            parent_hash: format!("{:?}", block.parent_hash),
            sha3_uncles: block.sha3_uncles.map(|h| format!("{h:?}")),
            miner: block.miner.map(|a| format!("{a:?}")),
            state_root: block.state_root.map(|h| format!("{h:?}")),
            transactions_root: block.transactions_root.map(|h| format!("{h:?}")),
            receipts_root: block.receipts_root.map(|h| format!("{h:?}")),
            logs_bloom: block.logs_bloom.as_ref().map(hex::encode_prefixed),
            difficulty: block.difficulty.map(|d| d.to_string()),
            gas_limit: block.gas_limit,
            gas_used: block.gas_used,
            timestamp: block.timestamp,
            proof_of_authority_data: block.extra_data.as_ref().map(hex::encode_prefixed),
            mix_hash: block.mix_hash.map(|h| format!("{h:?}")),
            nonce: block.nonce.map(|n| format!("{n:?}")),
            size: block.size,
            transactions: block
                .transaction_hashes
                .iter()
                .map(|h| format!("{h:?}"))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from_address: String,
    pub to_address: Option<String>,
    pub input: String,
    pub gas: u64,
    pub gas_price: Option<String>,
    pub value: String,
    pub nonce: u64,
}

impl TxRecord {
    /// Maps a transaction fetched as part of `block`; positional fields fall back to
    /// the containing block when the node omits them.
    pub fn from_chain(tx: &ChainTransaction, block: &ChainBlock, position: u64) -> Self {
        TxRecord {
            hash: format!("{:?}", tx.hash),
            block_hash: format!("{:?}", tx.block_hash.unwrap_or(block.hash)),
            block_number: tx.block_number.unwrap_or(block.number),
            transaction_index: tx.transaction_index.unwrap_or(position),
            from_address: format!("{:?}", tx.from),
            to_address: tx.to.map(|a| format!("{a:?}")),
            input: hex::encode_prefixed(&tx.input),
            gas: tx.gas,
            gas_price: tx.gas_price.map(|p| p.to_string()),
            value: tx.value.to_string(),
            nonce: tx.nonce,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Pending,
    Done,
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Pending => "PENDING",
            SnapshotStatus::Done => "DONE",
            SnapshotStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SnapshotStatus::Pending),
            "DONE" => Ok(SnapshotStatus::Done),
            "FAILED" => Ok(SnapshotStatus::Failed),
            other => Err(format!("unknown batch status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRun {
    pub list_id: String,
    pub token_address: Address,
    pub block_number: u64,
    pub status: SnapshotStatus,
    pub created: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderBalance {
    pub account_address: Address,
    pub hold_balance: U256,
    pub locked_balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub endpoint_uri: String,
    pub priority: u32,
    pub is_synced: bool,
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRecord {
    pub chain_id: u64,
    pub target: String,
    pub block_number: u64,
    pub updated_at: u64,
}

/// Pad a U256 amount to 78 digits so TEXT ordering matches numeric ordering.
pub fn pad_amount(amount: &U256) -> String {
    format!("{amount:0>78}")
}

pub fn parse_amount(padded: &str) -> Result<U256, <U256 as FromStr>::Err> {
    let trimmed = padded.trim_start_matches('0');
    if trimmed.is_empty() {
        Ok(U256::ZERO)
    } else {
        U256::from_str(trimmed)
    }
}

pub(crate) fn conversion_error<E>(column: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(error))
}

pub(crate) fn address_column(row: &rusqlite::Row, column: usize) -> rusqlite::Result<Address> {
    Address::from_str(&row.get::<_, String>(column)?).map_err(|e| conversion_error(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_amounts_sort_numerically() {
        let small = pad_amount(&U256::from(9u64));
        let large = pad_amount(&U256::from(10u64));
        assert_eq!(small.len(), 78);
        assert!(small < large);
        assert_eq!(pad_amount(&U256::MAX).len(), 78);
    }

    #[test]
    fn test_parse_amount_accepts_padding_and_zero() {
        assert_eq!(parse_amount(&pad_amount(&U256::from(42u64))).unwrap(), U256::from(42u64));
        assert_eq!(parse_amount(&"0".repeat(78)).unwrap(), U256::ZERO);
        assert!(parse_amount("12x").is_err());
    }

    #[test]
    fn test_metadata_serializes_with_field_names() {
        let metadata = NotificationMetadata {
            company_name: "Acme".to_string(),
            token_type: "IbetShare".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["company_name"], "Acme");
        assert_eq!(json["token_type"], "IbetShare");
        assert_eq!(json["exchange_address"], "");
    }
}
