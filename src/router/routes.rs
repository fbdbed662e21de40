use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::fees::{MaxFeesLevels, NonEip1559Fees, TxFeeParams};
use crate::types::{tx_identity_key, ChainId, GasFeeMode, Network, Token};

/// One chain-local leg of a route.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Path {
    pub processor_name: String,
    pub from_address: Address,
    pub to_address: Address,
    pub from_chain: Network,
    pub to_chain: Network,
    pub from_token: Token,
    pub to_token: Option<Token>,
    pub amount_in: U256,
    pub amount_in_locked: bool,
    /// amount the processor quote was made for
    #[serde(skip)]
    pub quoted_amount_in: U256,
    pub amount_out: U256,

    // fee market suggestions copied at annotation time
    pub suggested_levels_for_max_fees_per_gas: Option<MaxFeesLevels>,
    pub suggested_non_eip1559_fees: Option<NonEip1559Fees>,
    pub suggested_min_priority_fee: U256,
    pub suggested_max_priority_fee: U256,
    pub current_base_fee: U256,

    pub suggested_tx_nonce: Option<u64>,
    pub suggested_tx_gas_amount: u64,
    pub suggested_approval_tx_nonce: Option<u64>,
    pub suggested_approval_gas_amount: u64,

    /// call target of the main tx: contract, or recipient for native sends
    pub tx_to: Address,
    pub tx_value: U256,
    pub tx_nonce: Option<u64>,
    pub tx_gas_fee_mode: GasFeeMode,
    pub tx_fee_params: Option<TxFeeParams>,
    pub tx_gas_amount: u64,
    pub tx_estimated_time: u64,
    pub tx_bonder_fees: U256,
    pub tx_token_fees: U256,
    pub tx_fee: U256,
    pub tx_l1_fee: U256,
    pub tx_total_fee: U256,
    pub tx_packed_data: Bytes,

    pub approval_required: bool,
    pub approval_amount_required: U256,
    pub approval_contract_address: Address,
    pub approval_tx_nonce: Option<u64>,
    pub approval_gas_fee_mode: GasFeeMode,
    pub approval_fee_params: Option<TxFeeParams>,
    pub approval_gas_amount: u64,
    pub approval_estimated_time: u64,
    pub approval_fee: U256,
    pub approval_l1_fee: U256,
    pub approval_packed_data: Bytes,

    pub subtract_fees: bool,
    pub required_token_balance: U256,
    pub required_native_balance: U256,
}

impl Path {
    pub fn tx_identity_key(&self, is_approval: bool) -> String {
        tx_identity_key(self.from_chain.chain_id, self.from_address, &self.from_token.symbol, is_approval)
    }

    pub fn from_chain_id(&self) -> ChainId {
        self.from_chain.chain_id
    }

    pub fn to_token_symbol(&self) -> &str {
        self.to_token.as_ref().map(|t| t.symbol.as_str()).unwrap_or("")
    }
}

pub type Route = Vec<Path>;

/// (from chain, to chain) of the first leg, zero when empty
pub fn first_path_chains(route: &Route) -> (ChainId, ChainId) {
    route
        .first()
        .map(|p| (p.from_chain.chain_id, p.to_chain.chain_id))
        .unwrap_or_default()
}

pub fn route_amount_in(route: &Route) -> U256 {
    route.iter().fold(U256::ZERO, |acc, p| acc + p.amount_in)
}

pub fn route_amount_out(route: &Route) -> U256 {
    route.iter().fold(U256::ZERO, |acc, p| acc + p.amount_out)
}
