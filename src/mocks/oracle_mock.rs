use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};
use async_trait::async_trait;

use crate::oracle::{OracleError, TokenOracle};
use crate::transactions::TxHashToSign;
use crate::types::{ChainId, Token};

/// Balances and prices from fixed tables. Unknown balances are zero.
#[derive(Debug, Clone, Default)]
pub struct MockTokenOracle {
    balances: HashMap<(ChainId, Address), U256>,
    prices: HashMap<String, f64>,
}

impl MockTokenOracle {
    pub fn with_balance(mut self, chain_id: ChainId, token: Address, amount: U256) -> Self {
        self.balances.insert((chain_id, token), amount);
        self
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }
}

#[async_trait]
impl TokenOracle for MockTokenOracle {
    async fn balance(&self, chain_id: ChainId, token: &Token, _account: Address) -> Result<U256, OracleError> {
        Ok(self.balances.get(&(chain_id, token.address)).copied().unwrap_or_default())
    }

    async fn erc1155_balance(&self, chain_id: ChainId, token: &Token, account: Address) -> Result<U256, OracleError> {
        self.balance(chain_id, token, account).await
    }

    async fn price(&self, symbol: &str, _max_age: Duration) -> Result<f64, OracleError> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| OracleError::PriceNotFound(symbol.to_string()))
    }
}

/// Signs with a throwaway key
pub struct MockSigner {
    inner: PrivateKeySigner,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSigner {
    pub fn new() -> Self {
        Self { inner: PrivateKeySigner::random() }
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// identity key -> signature
    pub fn sign(&self, hashes: &[TxHashToSign]) -> HashMap<String, Signature> {
        hashes
            .iter()
            .filter_map(|entry| {
                self.inner
                    .sign_hash_sync(&entry.hash)
                    .ok()
                    .map(|signature| (entry.identity_key.clone(), signature))
            })
            .collect()
    }
}
