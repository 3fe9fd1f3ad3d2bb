use super::{LedgerClient, LedgerError, LogQuery, RawLog, RetryConfig, with_retry};
use alloy::eips::BlockNumberOrTag;
use alloy::network::Ethereum;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, Log};
use async_trait::async_trait;
use url::Url;

/// JSON-RPC ledger client over HTTP.
pub struct RpcLedgerClient {
    provider: RootProvider<Ethereum>,
    retry: RetryConfig,
}

impl RpcLedgerClient {
    pub fn new(url: Url, retry: RetryConfig) -> Self {
        Self {
            provider: RootProvider::<Ethereum>::new_http(url),
            retry,
        }
    }

    fn build_filter(query: &LogQuery) -> Filter {
        let filter = Filter::new()
            .address(query.addresses.clone())
            .from_block(query.from_block)
            .to_block(query.to_block);
        if query.event_signatures.is_empty() {
            filter
        } else {
            filter.event_signature(query.event_signatures.clone())
        }
    }
}

fn to_raw_log(log: Log) -> Result<RawLog, LedgerError> {
    let block_number = log
        .block_number
        .ok_or(LedgerError::IncompleteLog("block number"))?;
    let log_index = log.log_index.ok_or(LedgerError::IncompleteLog("log index"))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or(LedgerError::IncompleteLog("transaction hash"))?;

    Ok(RawLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number,
        block_timestamp: log.block_timestamp,
        transaction_hash,
        log_index,
    })
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn block_number(&self) -> Result<u64, LedgerError> {
        with_retry(&self.retry, "eth_blockNumber", || async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| LedgerError::Provider(e.to_string()))
        })
        .await
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, LedgerError> {
        let filter = Self::build_filter(query);
        let op_name = format!("eth_getLogs(blocks {}-{})", query.from_block, query.to_block);
        let logs = with_retry(&self.retry, &op_name, || async {
            self.provider
                .get_logs(&filter)
                .await
                .map_err(|e| LedgerError::Provider(e.to_string()))
        })
        .await?;

        logs.into_iter()
            // Logs flagged as removed belong to an orphaned block
            .filter(|log| !log.removed)
            .map(to_raw_log)
            .collect()
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
        let op_name = format!("eth_getBlockByNumber({block_number})");
        let block = with_retry(&self.retry, &op_name, || async {
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number))
                .await
                .map_err(|e| LedgerError::Provider(e.to_string()))
        })
        .await?
        .ok_or(LedgerError::BlockNotFound(block_number))?;
        Ok(block.header.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};

    #[test]
    fn test_filter_covers_query() {
        let query = LogQuery::new(vec![Address::repeat_byte(0x11)], 100, 199)
            .with_event(B256::repeat_byte(0xaa));
        let filter = RpcLedgerClient::build_filter(&query);
        assert_eq!(filter.get_from_block(), Some(100));
        assert_eq!(filter.get_to_block(), Some(199));
        assert!(filter.address.matches(&Address::repeat_byte(0x11)));
        assert!(!filter.address.matches(&Address::repeat_byte(0x22)));
    }
}
