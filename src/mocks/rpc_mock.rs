use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use tracing::debug;

use super::{get_mock_config, locked, MockConfig};
use crate::blockchain::{CallMsg, ChainClient, ChainError, FeeHistory};
use crate::types::ChainId;

/// In-memory chain: fixed nonce, gas and fee market, recorded sends.
/// Calls without a registered response return one zero word.
pub struct MockChainClient {
    chain_id: ChainId,
    pending_nonce: u64,
    gas_price: U256,
    gas_estimate: u64,
    balance: U256,
    fee_history: FeeHistory,
    call_responses: HashMap<Address, Bytes>,
    send_failure: Option<String>,
    /// (0-based send attempt, message): only that attempt fails
    send_failure_at: Option<(usize, String)>,
    send_attempts: Mutex<usize>,
    sent: Mutex<Vec<Bytes>>,
}

impl MockChainClient {
    pub fn new(chain_id: ChainId) -> Self {
        Self::from_config(chain_id, &MockConfig::default())
    }

    /// Defaults from `MOCK_*` env variables
    pub fn from_env(chain_id: ChainId) -> Self {
        Self::from_config(chain_id, &get_mock_config())
    }

    pub fn from_config(chain_id: ChainId, config: &MockConfig) -> Self {
        Self {
            chain_id,
            pending_nonce: config.pending_nonce,
            gas_price: U256::from(config.gas_price),
            gas_estimate: config.gas_estimate,
            balance: U256::from(config.native_balance),
            fee_history: sample_fee_history(U256::from(config.base_fee), U256::from(config.priority_fee)),
            call_responses: HashMap::new(),
            send_failure: None,
            send_failure_at: None,
            send_attempts: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pending_nonce(mut self, nonce: u64) -> Self {
        self.pending_nonce = nonce;
        self
    }

    pub fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = gas;
        self
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_fee_history(mut self, history: FeeHistory) -> Self {
        self.fee_history = history;
        self
    }

    /// Every eth_call to `to` returns `response`.
    pub fn with_call_response(mut self, to: Address, response: Bytes) -> Self {
        self.call_responses.insert(to, response);
        self
    }

    pub fn with_send_failure(mut self, message: &str) -> Self {
        self.send_failure = Some(message.to_string());
        self
    }

    /// Fail only the `attempt`-th broadcast, e.g. the swap after its approval.
    pub fn with_send_failure_at(mut self, attempt: usize, message: &str) -> Self {
        self.send_failure_at = Some((attempt, message.to_string()));
        self
    }

    pub fn sent_raw_transactions(&self) -> Vec<Bytes> {
        locked(&self.sent).clone()
    }
}

/// Four blocks at `base_fee` with rewards at p10 = priority, p50 = 2x, p90 = 3x.
fn sample_fee_history(base_fee: U256, priority: U256) -> FeeHistory {
    let row = vec![priority, priority * U256::from(2), priority * U256::from(3)];
    FeeHistory {
        oldest_block: 18_000_000,
        base_fee_per_gas: vec![base_fee; 4],
        gas_used_ratio: vec![0.5; 3],
        reward: vec![row; 3],
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn estimate_gas(&self, _msg: CallMsg) -> Result<u64, ChainError> {
        Ok(self.gas_estimate)
    }

    async fn pending_nonce_at(&self, _account: Address) -> Result<u64, ChainError> {
        Ok(self.pending_nonce)
    }

    async fn suggest_gas_price(&self) -> Result<U256, ChainError> {
        Ok(self.gas_price)
    }

    async fn fee_history(&self, _block_count: u64, _reward_percentiles: &[f64]) -> Result<FeeHistory, ChainError> {
        Ok(self.fee_history.clone())
    }

    async fn balance_at(&self, _account: Address) -> Result<U256, ChainError> {
        Ok(self.balance)
    }

    async fn call_contract(&self, msg: CallMsg) -> Result<Bytes, ChainError> {
        let response = msg
            .to
            .and_then(|to| self.call_responses.get(&to).cloned())
            .unwrap_or_else(|| Bytes::from(vec![0u8; 32]));
        Ok(response)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, ChainError> {
        let attempt = {
            let mut attempts = locked(&self.send_attempts);
            *attempts += 1;
            *attempts - 1
        };
        if let Some(message) = &self.send_failure {
            return Err(ChainError::Rpc(message.clone()));
        }
        if let Some((failing, message)) = &self.send_failure_at {
            if *failing == attempt {
                return Err(ChainError::Rpc(message.clone()));
            }
        }
        let hash = keccak256(&raw);
        debug!("🎭 [MOCK] chain {} accepted tx {}", self.chain_id, hash);
        locked(&self.sent).push(raw);
        Ok(hash)
    }
}
