use crate::chain::{ChainBlock, ChainLog, ChainReader, ChainTransaction, SyncStatus};
use crate::error::{IndexerError, IndexerResult};
use crate::events::{nameCall, tradableExchangeCall};
use crate::node_health::{EndpointProbe, NodeHealthTable};
use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{
    Block, BlockNumberOrTag, Filter, Log, Transaction, TransactionRequest,
    SyncStatus as RpcSyncStatus,
};
use alloy::sol_types::SolCall;
use alloy::transports::TransportResult;
use alloy_primitives::{Address, B256, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

#[derive(Clone)]
struct Endpoint {
    uri: String,
    provider: AlloyFullProvider,
}

/// JSON-RPC client over the configured endpoints. Every request goes to the endpoint
/// the health table currently prefers, with a per-call timeout and bounded retries.
#[derive(Clone)]
pub struct RpcClient {
    endpoints: Arc<Vec<Endpoint>>,
    health: NodeHealthTable,
    request_timeout: Duration,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(
        rpc_urls: &[String],
        health: NodeHealthTable,
        request_timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut endpoints = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            endpoints.push(Endpoint {
                uri: url.clone(),
                provider,
            });
        }

        Ok(RpcClient {
            endpoints: Arc::new(endpoints),
            health,
            request_timeout,
            max_retries,
        })
    }

    /// One probe per endpoint for the node health monitor.
    pub fn probes(&self) -> Vec<Arc<dyn EndpointProbe>> {
        self.endpoints
            .iter()
            .map(|endpoint| {
                Arc::new(HttpEndpoint {
                    endpoint: endpoint.clone(),
                    request_timeout: self.request_timeout,
                }) as Arc<dyn EndpointProbe>
            })
            .collect()
    }

    fn select_endpoint(&self, attempt: usize) -> IndexerResult<&Endpoint> {
        self.health
            .select(attempt)
            .and_then(|index| self.endpoints.get(index))
            .ok_or_else(|| {
                IndexerError::ServiceUnavailable("no synced JSON-RPC endpoint".to_string())
            })
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, uri: &str, method: &str, error_str: String) -> IndexerError {
        if error_str.contains("exceeds max results") {
            debug!("{} on {} exceeded max results", method, uri);
            return IndexerError::LogRangeTooLarge(error_str);
        }
        warn!("RPC error on {} ({}): {}", uri, method, error_str);
        IndexerError::Rpc(format!("{method}: {error_str}"))
    }

    fn handle_timeout(&self, uri: &str, method: &str) -> IndexerError {
        warn!(
            "Request timeout after {} seconds on {} ({})",
            self.request_timeout.as_secs(),
            uri,
            method
        );
        IndexerError::Timeout(self.request_timeout.as_secs())
    }

    /// Runs `call` against the preferred endpoint, retrying transient failures with
    /// jittered backoff. Oversized log ranges are returned at once so the caller can split.
    async fn request<T, F, Fut>(&self, method: &'static str, call: F) -> IndexerResult<T>
    where
        T: Send,
        F: Fn(AlloyFullProvider) -> Fut + Sync,
        Fut: Future<Output = TransportResult<T>> + Send,
    {
        let attempts = AtomicUsize::new(0);
        let call = &call;
        let attempts = &attempts;

        RetryIf::spawn(
            self.get_retry_strategy(),
            move || async move {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                let endpoint = self.select_endpoint(attempt)?;
                match timeout(self.request_timeout, call(endpoint.provider.clone())).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(self.handle_error(&endpoint.uri, method, e.to_string())),
                    Err(_) => Err(self.handle_timeout(&endpoint.uri, method)),
                }
            },
            |e: &IndexerError| !matches!(e, IndexerError::LogRangeTooLarge(_)),
        )
        .await
    }

    async fn get_logs_internal(
        &self,
        contract_address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<Log>> {
        let filter = Filter::new()
            .address(contract_address)
            .event_signature(topic0)
            .from_block(from_block)
            .to_block(to_block);

        self.request("eth_getLogs", |provider| {
            let filter = filter.clone();
            async move { provider.get_logs(&filter).await }
        })
        .await
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    async fn call_contract<C>(&self, to: Address, call: C) -> IndexerResult<C::Return>
    where
        C: SolCall + Send + Sync,
    {
        let input = Bytes::from(call.abi_encode());
        let request = TransactionRequest::default().to(to).input(input.into());

        let raw = self
            .request("eth_call", |provider| {
                let request = request.clone();
                async move { provider.call(request).await }
            })
            .await?;

        C::abi_decode_returns(&raw)
            .map_err(|e| IndexerError::Decode(format!("{} on {to}: {e}", C::SIGNATURE)))
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn head_block(&self) -> IndexerResult<u64> {
        self.request("eth_blockNumber", |provider| async move {
            provider.get_block_number().await
        })
        .await
    }

    async fn get_block(&self, number: u64, include_tx: bool) -> IndexerResult<ChainBlock> {
        let block = self
            .request("eth_getBlockByNumber", |provider| async move {
                let call = provider.get_block_by_number(BlockNumberOrTag::Number(number));
                let call = if include_tx { call.full() } else { call };
                call.await
            })
            .await?
            .ok_or_else(|| IndexerError::NotFound(format!("block {number}")))?;

        Ok(map_block(&block))
    }

    async fn get_logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<ChainLog>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self
                .get_logs_internal(address, topic0, current_from, to_block)
                .await
            {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(IndexerError::LogRangeTooLarge(message)) => {
                    let Some((suggested_from, suggested_to)) =
                        Self::parse_max_results_error(&message)
                    else {
                        return Err(IndexerError::LogRangeTooLarge(message));
                    };
                    if suggested_to < current_from || suggested_to >= to_block {
                        return Err(IndexerError::LogRangeTooLarge(message));
                    }

                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, to_block, suggested_to
                    );

                    let logs = self
                        .get_logs_internal(address, topic0, suggested_from, suggested_to)
                        .await?;
                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(all_logs.iter().filter_map(map_log).collect())
    }

    async fn get_code_at(&self, address: Address, block_number: u64) -> IndexerResult<Bytes> {
        self.request("eth_getCode", |provider| async move {
            provider
                .get_code_at(address)
                .block_id(BlockNumberOrTag::Number(block_number).into())
                .await
        })
        .await
    }

    async fn token_name(&self, token: Address) -> IndexerResult<String> {
        self.call_contract(token, nameCall {}).await
    }

    async fn tradable_exchange(&self, token: Address) -> IndexerResult<Address> {
        self.call_contract(token, tradableExchangeCall {}).await
    }
}

/// A single endpoint, probed without failover.
struct HttpEndpoint {
    endpoint: Endpoint,
    request_timeout: Duration,
}

impl HttpEndpoint {
    async fn call<T, Fut>(&self, method: &str, call: Fut) -> IndexerResult<T>
    where
        Fut: Future<Output = TransportResult<T>> + Send,
    {
        match timeout(self.request_timeout, call).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(IndexerError::Rpc(format!("{method}: {e}"))),
            Err(_) => Err(IndexerError::Timeout(self.request_timeout.as_secs())),
        }
    }
}

#[async_trait]
impl EndpointProbe for HttpEndpoint {
    fn uri(&self) -> &str {
        &self.endpoint.uri
    }

    async fn syncing(&self) -> IndexerResult<SyncStatus> {
        let provider = &self.endpoint.provider;
        match self.call("eth_syncing", provider.syncing().into_future()).await? {
            RpcSyncStatus::None => Ok(SyncStatus::Synced),
            RpcSyncStatus::Info(info) => Ok(SyncStatus::Syncing {
                current_block: info.current_block.saturating_to(),
                highest_block: info.highest_block.saturating_to(),
            }),
        }
    }

    async fn block_number(&self) -> IndexerResult<u64> {
        let provider = &self.endpoint.provider;
        self.call("eth_blockNumber", provider.get_block_number().into_future())
            .await
    }
}

fn map_block(block: &Block) -> ChainBlock {
    let header = &block.header;
    ChainBlock {
        number: header.number,
        hash: header.hash,
        parent_hash: header.parent_hash,
        sha3_uncles: Some(header.ommers_hash),
        miner: Some(header.beneficiary),
        state_root: Some(header.state_root),
        transactions_root: Some(header.transactions_root),
        receipts_root: Some(header.receipts_root),
        logs_bloom: Some(Bytes::copy_from_slice(header.logs_bloom.as_slice())),
        difficulty: Some(header.difficulty),
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        timestamp: header.timestamp,
        extra_data: Some(header.extra_data.clone()),
        mix_hash: Some(header.mix_hash),
        nonce: Some(header.nonce),
        size: header.size.map(|size| size.saturating_to()),
        transaction_hashes: block.transactions.hashes().collect(),
        transactions: block
            .transactions
            .as_transactions()
            .unwrap_or_default()
            .iter()
            .map(map_transaction)
            .collect(),
    }
}

fn map_transaction(tx: &Transaction) -> ChainTransaction {
    ChainTransaction {
        hash: TransactionResponse::tx_hash(tx),
        block_hash: tx.block_hash,
        block_number: tx.block_number,
        transaction_index: tx.transaction_index,
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        input: ConsensusTransaction::input(tx).clone(),
        gas: ConsensusTransaction::gas_limit(tx),
        gas_price: ConsensusTransaction::gas_price(tx).or(tx.effective_gas_price),
        value: ConsensusTransaction::value(tx),
        nonce: ConsensusTransaction::nonce(tx),
    }
}

/// Pending logs carry no position and are dropped.
fn map_log(log: &Log) -> Option<ChainLog> {
    let (Some(block_number), Some(transaction_index), Some(log_index)) =
        (log.block_number, log.transaction_index, log.log_index)
    else {
        warn!("Skipping log without chain position from {}", log.address());
        return None;
    };

    Some(ChainLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number,
        transaction_index,
        log_index,
        transaction_hash: log.transaction_hash.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(urls: &[&str]) -> RpcClient {
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        RpcClient::new(
            &urls,
            NodeHealthTable::new(&urls),
            Duration::from_secs(1),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_max_results_error() {
        let error = "query exceeds max results 10000, retry with the range 100-250";
        assert_eq!(RpcClient::parse_max_results_error(error), Some((100, 250)));
        assert_eq!(RpcClient::parse_max_results_error("timeout"), None);
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let health = NodeHealthTable::new(&[]);
        assert!(RpcClient::new(&[], health.clone(), Duration::from_secs(1), 1).is_err());
        assert!(
            RpcClient::new(&["not a url".to_string()], health, Duration::from_secs(1), 1)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_primary_used_before_any_health_check() {
        let client = client(&["http://primary:8545", "http://standby:8545"]);
        assert_eq!(client.select_endpoint(0).unwrap().uri, "http://primary:8545");
        assert_eq!(client.select_endpoint(3).unwrap().uri, "http://primary:8545");
    }

    #[tokio::test]
    async fn test_fails_over_to_synced_standby() {
        let client = client(&["http://primary:8545", "http://standby:8545"]);
        client.health.set_synced(0, false);
        client.health.set_synced(1, true);
        assert_eq!(client.select_endpoint(0).unwrap().uri, "http://standby:8545");

        client.health.set_synced(1, false);
        assert!(matches!(
            client.select_endpoint(0),
            Err(IndexerError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_after_retries_are_exhausted() {
        let client = client(&["http://primary:8545"]);
        client.health.set_synced(0, false);
        let err = client.head_block().await.unwrap_err();
        assert!(matches!(err, IndexerError::ServiceUnavailable(_)));
        assert_eq!(client.probes().len(), 1);
    }
}
