pub mod abi;
pub mod rpc;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ChainId;

pub use rpc::RpcChainClient;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChainError {
    #[error("No chain client configured for chain {0}")]
    ChainNotFound(ChainId),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract call failed: {0}")]
    Call(String),

    #[error("ABI decode error: {0}")]
    Decode(String),

    #[error("Invalid RPC url: {0}")]
    InvalidUrl(String),
}

/// eth_call / eth_estimateGas 요청
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallMsg {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

/// eth_feeHistory 응답 (percentile 10/50/90 기준)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeeHistory {
    pub oldest_block: u64,
    /// block_count + 1 개, 마지막 값은 pending 블록의 base fee
    pub base_fee_per_gas: Vec<U256>,
    pub gas_used_ratio: Vec<f64>,
    /// 블록별 [p10, p50, p90]
    pub reward: Vec<Vec<U256>>,
}

/// One chain's JSON-RPC surface as used by the router.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    async fn estimate_gas(&self, msg: CallMsg) -> Result<u64, ChainError>;

    async fn pending_nonce_at(&self, account: Address) -> Result<u64, ChainError>;

    async fn suggest_gas_price(&self) -> Result<U256, ChainError>;

    async fn fee_history(&self, block_count: u64, reward_percentiles: &[f64]) -> Result<FeeHistory, ChainError>;

    async fn balance_at(&self, account: Address) -> Result<U256, ChainError>;

    async fn call_contract(&self, msg: CallMsg) -> Result<Bytes, ChainError>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError>;
}

pub trait ChainClientProvider: Send + Sync {
    fn eth_client(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClient>, ChainError>;
}

/// Fixed set of clients keyed by chain id.
#[derive(Clone, Default)]
pub struct StaticClientProvider {
    clients: HashMap<ChainId, Arc<dyn ChainClient>>,
}

impl StaticClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.clients.insert(client.chain_id(), client);
        self
    }

    pub fn insert(&mut self, client: Arc<dyn ChainClient>) {
        self.clients.insert(client.chain_id(), client);
    }
}

impl ChainClientProvider for StaticClientProvider {
    fn eth_client(&self, chain_id: ChainId) -> Result<Arc<dyn ChainClient>, ChainError> {
        self.clients
            .get(&chain_id)
            .cloned()
            .ok_or(ChainError::ChainNotFound(chain_id))
    }
}

/// ERC20 allowance(owner, spender)
pub async fn erc20_allowance(
    client: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, ChainError> {
    let out = client
        .call_contract(CallMsg {
            from: owner,
            to: Some(token),
            value: U256::ZERO,
            data: abi::encode_erc20_allowance(owner, spender),
        })
        .await?;
    abi::decode_uint256(&out)
}

/// Native balance for the zero address, ERC20 balanceOf otherwise.
pub async fn token_balance(
    client: &dyn ChainClient,
    token: Address,
    account: Address,
) -> Result<U256, ChainError> {
    if token == Address::ZERO {
        return client.balance_at(account).await;
    }
    let out = client
        .call_contract(CallMsg {
            from: account,
            to: Some(token),
            value: U256::ZERO,
            data: abi::encode_erc20_balance_of(account),
        })
        .await?;
    abi::decode_uint256(&out)
}

pub async fn erc1155_balance(
    client: &dyn ChainClient,
    contract: Address,
    account: Address,
    id: U256,
) -> Result<U256, ChainError> {
    let out = client
        .call_contract(CallMsg {
            from: account,
            to: Some(contract),
            value: U256::ZERO,
            data: abi::encode_erc1155_balance_of(account, id),
        })
        .await?;
    abi::decode_uint256(&out)
}
