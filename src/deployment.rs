use crate::chain::ChainReader;
use crate::error::{IndexerError, IndexerResult};
use alloy_primitives::Address;
use tracing::info;

/// First block at which `address` has code, found by binary search on `eth_getCode`.
pub async fn find_deployment_block(
    chain: &dyn ChainReader,
    address: Address,
    latest_block: u64,
) -> IndexerResult<u64> {
    info!("Searching for deployment block of contract {:?}", address);

    let code = chain.get_code_at(address, latest_block).await?;
    if code.is_empty() {
        return Err(IndexerError::NotFound(format!(
            "{address:?} is not a deployed contract at block {latest_block}"
        )));
    }

    let mut left = 0u64;
    let mut right = latest_block;

    while left < right {
        let mid = left + (right - left) / 2;

        let code = chain.get_code_at(address, mid).await?;

        if code.is_empty() {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    info!("Contract {:?} deployed at block {}", address, left);
    Ok(left)
}
