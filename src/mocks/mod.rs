pub mod api_clients;
pub mod oracle_mock;
pub mod rpc_mock;

pub use api_clients::{MockCelerApi, MockHopApi, MockParaswapApi};
pub use oracle_mock::{MockSigner, MockTokenOracle};
pub use rpc_mock::MockChainClient;

use std::env;
use std::sync::{Mutex, MutexGuard};

use alloy::primitives::{keccak256, Address};
#[cfg(test)]
use alloy::primitives::U256;

use crate::constants::{ETHEREUM_MAINNET, ETHEREUM_SEPOLIA, ETH_SYMBOL};
use crate::types::{ChainId, Network, Token};

/// Check if mock mode is enabled
pub fn is_mock_mode() -> bool {
    env::var("API_MODE").unwrap_or_default() == "mock"
}

/// Get mock configuration values
pub fn get_mock_config() -> MockConfig {
    MockConfig {
        pending_nonce: env::var("MOCK_PENDING_NONCE")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0),
        gas_price: env::var("MOCK_GAS_PRICE")
            .unwrap_or_else(|_| "20000000000".to_string())
            .parse()
            .unwrap_or(20_000_000_000u64),
        base_fee: env::var("MOCK_BASE_FEE")
            .unwrap_or_else(|_| "15000000000".to_string())
            .parse()
            .unwrap_or(15_000_000_000u64),
        priority_fee: env::var("MOCK_PRIORITY_FEE")
            .unwrap_or_else(|_| "1000000000".to_string())
            .parse()
            .unwrap_or(1_000_000_000u64),
        gas_estimate: env::var("MOCK_GAS_ESTIMATE")
            .unwrap_or_else(|_| "21000".to_string())
            .parse()
            .unwrap_or(21_000),
        native_balance: env::var("MOCK_NATIVE_BALANCE")
            .unwrap_or_else(|_| "10000000000000000000".to_string())
            .parse()
            .unwrap_or(10_000_000_000_000_000_000u128),
    }
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub pending_nonce: u64,
    pub gas_price: u64,
    pub base_fee: u64,
    pub priority_fee: u64,
    pub gas_estimate: u64,
    pub native_balance: u128,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            pending_nonce: 0,
            gas_price: 20_000_000_000,
            base_fee: 15_000_000_000,
            priority_fee: 1_000_000_000,
            gas_estimate: 21_000,
            native_balance: 10_000_000_000_000_000_000,
        }
    }
}

/// Poisoned mock state is still usable
pub(crate) fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 테스트용 네트워크: EIP-1559, ETH native, mainnet 계열만 L1
pub fn network(chain_id: ChainId) -> Network {
    let layer = if chain_id == ETHEREUM_MAINNET || chain_id == ETHEREUM_SEPOLIA { 1 } else { 2 };
    Network {
        chain_id,
        chain_name: format!("chain-{}", chain_id),
        native_currency_symbol: ETH_SYMBOL.to_string(),
        native_currency_decimals: 18,
        eip1559_enabled: true,
        layer,
        is_test: false,
        block_time_secs: if layer == 1 { 12 } else { 2 },
    }
}

/// ERC20 with an address derived from (chain, symbol)
pub fn token(chain_id: ChainId, symbol: &str, decimals: u8) -> Token {
    let hash = keccak256(format!("{}-{}", chain_id, symbol));
    Token {
        address: Address::from_slice(&hash[12..]),
        name: symbol.to_string(),
        symbol: symbol.to_string(),
        decimals,
        chain_id,
    }
}

pub fn native_token(chain_id: ChainId) -> Token {
    Token {
        address: Address::ZERO,
        name: "Ether".to_string(),
        symbol: ETH_SYMBOL.to_string(),
        decimals: 18,
        chain_id,
    }
}

#[cfg(test)]
pub(crate) fn gwei(v: u64) -> U256 {
    U256::from(v) * U256::from(1_000_000_000u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_tokens_are_stable() {
        assert_eq!(token(1, "USDC", 6), token(1, "USDC", 6));
        assert_ne!(token(1, "USDC", 6).address, token(10, "USDC", 6).address);
        assert!(native_token(10).is_native());
        assert_eq!(network(10).layer, 2);
        assert!(network(10).charges_l1_fee());
    }

    #[test]
    fn test_mock_config_defaults() {
        let config = MockConfig::default();
        assert_eq!(config.gas_estimate, 21_000);
        assert!(config.base_fee > config.priority_fee);
    }
}
