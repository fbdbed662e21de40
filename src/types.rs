use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use alloy::primitives::{Address, U256};

use crate::constants::{ETHEREUM_MAINNET, ETHEREUM_SEPOLIA, OP_STACK_CHAINS};
use crate::constants::{
    PROCESSOR_BRIDGE_CELER_NAME, PROCESSOR_BRIDGE_HOP_NAME, PROCESSOR_ENS_REGISTER_NAME,
    PROCESSOR_ERC1155_NAME, PROCESSOR_ERC721_NAME, PROCESSOR_SWAP_PARASWAP_NAME,
    PROCESSOR_TRANSFER_NAME,
};

pub type ChainId = u64;

/// 라우팅 대상 네트워크
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Network {
    pub chain_id: ChainId,
    pub chain_name: String,
    #[serde(default = "default_native_symbol")]
    pub native_currency_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub native_currency_decimals: u8,
    #[serde(default = "default_true")]
    pub eip1559_enabled: bool,
    #[serde(default = "default_layer")]
    pub layer: u8,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default = "default_block_time")]
    pub block_time_secs: u64,
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_native_decimals() -> u8 {
    18
}

fn default_true() -> bool {
    true
}

fn default_layer() -> u8 {
    1
}

fn default_block_time() -> u64 {
    12
}

impl Network {
    /// OP-stack 체인은 L1 data fee를 별도로 청구한다
    pub fn charges_l1_fee(&self) -> bool {
        OP_STACK_CHAINS.contains(&self.chain_id)
    }

    pub fn is_ens_chain(&self) -> bool {
        self.chain_id == ETHEREUM_MAINNET || self.chain_id == ETHEREUM_SEPOLIA
    }
}

/// Token as seen by the router. Native assets use the zero address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Token {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub chain_id: ChainId,
}

impl Token {
    pub fn is_native(&self) -> bool {
        self.address == Address::ZERO
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendType {
    #[default]
    Transfer,
    EnsRegister,
    Bridge,
    Erc721Transfer,
    Erc1155Transfer,
    Swap,
}

impl SendType {
    pub fn is_collectibles_transfer(&self) -> bool {
        matches!(self, SendType::Erc721Transfer | SendType::Erc1155Transfer)
    }

    pub fn is_ens_transfer(&self) -> bool {
        matches!(self, SendType::EnsRegister)
    }

    /// Send 타입별로 사용할 수 있는 프로세서 제한
    pub fn can_use_processor(&self, processor_name: &str) -> bool {
        match self {
            SendType::Transfer => matches!(
                processor_name,
                PROCESSOR_TRANSFER_NAME | PROCESSOR_BRIDGE_HOP_NAME | PROCESSOR_BRIDGE_CELER_NAME
            ),
            SendType::Bridge => matches!(
                processor_name,
                PROCESSOR_BRIDGE_HOP_NAME | PROCESSOR_BRIDGE_CELER_NAME
            ),
            SendType::Swap => processor_name == PROCESSOR_SWAP_PARASWAP_NAME,
            SendType::Erc721Transfer => processor_name == PROCESSOR_ERC721_NAME,
            SendType::Erc1155Transfer => processor_name == PROCESSOR_ERC1155_NAME,
            SendType::EnsRegister => processor_name == PROCESSOR_ENS_REGISTER_NAME,
        }
    }

    pub fn multi_transaction_type(&self) -> MultiTransactionType {
        match self {
            SendType::Bridge => MultiTransactionType::Bridge,
            SendType::Swap => MultiTransactionType::Swap,
            _ => MultiTransactionType::Send,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MultiTransactionType {
    Send,
    Bridge,
    Swap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum GasFeeMode {
    Slow,
    #[default]
    Normal,
    Fast,
    Custom,
}

/// Caller supplied fee overrides for one leg (approval or main tx).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PathTxCustomParams {
    pub gas_fee_mode: GasFeeMode,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub gas_amount: u64,
    #[serde(default)]
    pub max_fees_per_gas: Option<U256>,
    #[serde(default)]
    pub priority_fee: Option<U256>,
    #[serde(default)]
    pub gas_price: Option<U256>,
}

/// Identity key of one leg: chain, sender, token and approval flag.
pub fn tx_identity_key(chain_id: ChainId, address: Address, token_symbol: &str, is_approval: bool) -> String {
    format!("{}-{:#x}-{}-{}", chain_id, address, token_symbol, is_approval)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PathTxIdentity {
    pub route_uuid: String,
    pub chain_id: ChainId,
    pub address: Address,
    pub token_symbol: String,
    pub is_approval_tx: bool,
}

impl PathTxIdentity {
    pub fn tx_identity_key(&self) -> String {
        tx_identity_key(self.chain_id, self.address, &self.token_symbol, self.is_approval_tx)
    }
}

/// Deterministic gas numbers used instead of node estimation in tests mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestEstimation {
    pub value: u64,
    pub err: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouterTestParams {
    pub token_prices: HashMap<String, f64>,
    pub balances: HashMap<ChainId, U256>,
    pub estimation_map: HashMap<String, TestEstimation>,
    pub bonder_fee_map: HashMap<String, U256>,
    pub approval_gas_estimation: u64,
    pub approval_l1_fee: U256,
}

/// 사용자의 라우팅 요청
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouteInputParams {
    pub uuid: String,
    pub send_type: SendType,
    pub addr_from: Address,
    pub addr_to: Address,
    pub amount_in: U256,
    #[serde(default)]
    pub amount_out: U256,
    pub token_id: String,
    #[serde(default)]
    pub to_token_id: Option<String>,
    #[serde(default)]
    pub disabled_from_chain_ids: Vec<ChainId>,
    #[serde(default)]
    pub disabled_to_chain_ids: Vec<ChainId>,
    #[serde(default)]
    pub gas_fee_mode: GasFeeMode,
    #[serde(default)]
    pub from_locked_amount: HashMap<ChainId, U256>,
    #[serde(default)]
    pub slippage_percentage: f32,
    #[serde(default)]
    pub path_tx_custom_params: HashMap<String, PathTxCustomParams>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub pack_id: Option<U256>,
    #[serde(skip)]
    pub test_params: Option<RouterTestParams>,
}

impl RouteInputParams {
    pub fn tests_mode(&self) -> bool {
        self.test_params.is_some()
    }

    /// Chains the route must visit and chains it must avoid.
    ///
    /// Locked amounts pin a chain in (a zero lock pins it out); disabled
    /// origin chains are always excluded.
    pub fn included_excluded_chains(&self) -> (HashMap<ChainId, bool>, HashMap<ChainId, bool>) {
        let mut included = HashMap::new();
        let mut excluded = HashMap::new();
        for (chain_id, amount) in &self.from_locked_amount {
            if amount.is_zero() {
                excluded.insert(*chain_id, false);
            } else {
                included.insert(*chain_id, false);
            }
        }
        for chain_id in &self.disabled_from_chain_ids {
            excluded.insert(*chain_id, false);
        }
        (included, excluded)
    }
}

/// Stable error payload attached to events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub details: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, details: impl Into<String>) -> Self {
        Self { code: code.into(), details: details.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_distinguishes_approval() {
        let addr = Address::repeat_byte(0x11);
        let main = tx_identity_key(10, addr, "USDC", false);
        let approval = tx_identity_key(10, addr, "USDC", true);
        assert_ne!(main, approval);
        assert!(main.starts_with("10-0x1111"));
    }

    #[test]
    fn test_send_type_processor_restrictions() {
        assert!(SendType::Transfer.can_use_processor(PROCESSOR_BRIDGE_HOP_NAME));
        assert!(!SendType::Bridge.can_use_processor(PROCESSOR_TRANSFER_NAME));
        assert!(SendType::Swap.can_use_processor(PROCESSOR_SWAP_PARASWAP_NAME));
        assert!(!SendType::Swap.can_use_processor(PROCESSOR_TRANSFER_NAME));
        assert_eq!(SendType::Swap.multi_transaction_type(), MultiTransactionType::Swap);
    }

    #[test]
    fn test_locked_amounts_split_into_included_and_excluded() {
        let mut params = RouteInputParams::default();
        params.from_locked_amount.insert(1, U256::from(5));
        params.from_locked_amount.insert(10, U256::ZERO);
        params.disabled_from_chain_ids.push(42161);

        let (included, excluded) = params.included_excluded_chains();
        assert!(included.contains_key(&1));
        assert!(excluded.contains_key(&10));
        assert!(excluded.contains_key(&42161));
        assert_eq!(included.len(), 1);
    }
}
