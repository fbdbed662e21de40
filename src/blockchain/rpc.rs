use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, info};

use super::{CallMsg, ChainClient, ChainError, FeeHistory};
use crate::types::ChainId;

/// 블록체인 RPC 클라이언트 (HTTP)
pub struct RpcChainClient {
    chain_id: ChainId,
    provider: DynProvider,
}

impl RpcChainClient {
    pub fn new(chain_id: ChainId, rpc_url: &str) -> Result<Self, ChainError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidUrl(format!("{}: {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        info!("🔌 RPC 클라이언트 초기화: chain {} ({})", chain_id, rpc_url);
        Ok(Self { chain_id, provider })
    }

    fn to_request(msg: &CallMsg) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .from(msg.from)
            .value(msg.value)
            .input(TransactionInput::new(msg.data.clone()));
        if let Some(to) = msg.to {
            tx = tx.to(to);
        }
        tx
    }
}

fn rpc_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn estimate_gas(&self, msg: CallMsg) -> Result<u64, ChainError> {
        let gas = self
            .provider
            .estimate_gas(Self::to_request(&msg))
            .await
            .map_err(rpc_err)?;
        debug!("⛽ estimate_gas chain {}: {}", self.chain_id, gas);
        Ok(gas)
    }

    async fn pending_nonce_at(&self, account: Address) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(account)
            .pending()
            .await
            .map_err(rpc_err)
    }

    async fn suggest_gas_price(&self) -> Result<U256, ChainError> {
        let price = self.provider.get_gas_price().await.map_err(rpc_err)?;
        Ok(U256::from(price))
    }

    async fn fee_history(&self, block_count: u64, reward_percentiles: &[f64]) -> Result<FeeHistory, ChainError> {
        let history = self
            .provider
            .get_fee_history(block_count, BlockNumberOrTag::Latest, reward_percentiles)
            .await
            .map_err(rpc_err)?;

        Ok(FeeHistory {
            oldest_block: history.oldest_block,
            base_fee_per_gas: history.base_fee_per_gas.iter().map(|v| U256::from(*v)).collect(),
            gas_used_ratio: history.gas_used_ratio.clone(),
            reward: history
                .reward
                .unwrap_or_default()
                .into_iter()
                .map(|row| row.into_iter().map(U256::from).collect())
                .collect(),
        })
    }

    async fn balance_at(&self, account: Address) -> Result<U256, ChainError> {
        self.provider.get_balance(account).await.map_err(rpc_err)
    }

    async fn call_contract(&self, msg: CallMsg) -> Result<Bytes, ChainError> {
        self.provider
            .call(Self::to_request(&msg))
            .await
            .map_err(|e| ChainError::Call(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(rpc_err)?;
        let hash = *pending.tx_hash();
        info!("📤 트랜잭션 전송: chain {} {:#x}", self.chain_id, hash);
        Ok(hash)
    }
}
