//! Deterministic notification identities.
//!
//! An identity is `0x` followed by the block number (12 hex digits), the
//! transaction index (6), the log index (6) and a disambiguator (2). Fixed
//! widths make lexicographic order equal chain order, and re-deriving the id
//! for a log that was already indexed always yields the same key.

use crate::chain::ChainLog;

pub fn notification_id(
    block_number: u64,
    transaction_index: u64,
    log_index: u64,
    disambiguator: u8,
) -> String {
    format!("0x{block_number:012x}{transaction_index:06x}{log_index:06x}{disambiguator:02x}")
}

pub fn notification_id_for_log(log: &ChainLog, disambiguator: u8) -> String {
    notification_id(
        log.block_number,
        log.transaction_index,
        log.log_index,
        disambiguator,
    )
}
