//! Path processors: one implementation per transaction kind.
//!
//! The router asks every registered processor whether it is `available_for`
//! a (from, to) pair and then prices, packs and estimates the leg through the
//! same capability set.

pub mod errors;
pub mod transfer;
pub mod erc721;
pub mod erc1155;
pub mod bridge_hop;
pub mod bridge_celer;
pub mod swap_paraswap;
pub mod ens_register;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use crate::constants::INCREASE_ESTIMATED_GAS_FACTOR;
use crate::blockchain::{CallMsg, ChainClientProvider};
use crate::transactions::{SendTxArgs, UnsignedTransaction};
use crate::types::{ChainId, Network, TestEstimation, Token};

pub use errors::ProcessorError;
pub use transfer::TransferProcessor;
pub use erc721::Erc721Processor;
pub use erc1155::Erc1155Processor;
pub use bridge_hop::HopBridgeProcessor;
pub use bridge_celer::CelerBridgeProcessor;
pub use swap_paraswap::SwapParaswapProcessor;
pub use ens_register::EnsRegisterProcessor;

/// Input of every processor call for one candidate leg.
#[derive(Debug, Clone, Default)]
pub struct ProcessorInputParams {
    pub from_chain: Option<Network>,
    pub to_chain: Option<Network>,
    pub from_token: Option<Token>,
    pub to_token: Option<Token>,
    pub from_addr: Address,
    pub to_addr: Address,
    pub amount_in: U256,
    pub amount_out: U256,
    pub slippage_percentage: f32,
    pub username: Option<String>,
    pub public_key: Option<String>,
    pub tests_mode: bool,
    pub test_estimation_map: HashMap<String, TestEstimation>,
    pub test_bonder_fee_map: HashMap<String, U256>,
}

impl ProcessorInputParams {
    pub fn from_chain(&self) -> Result<&Network, ProcessorError> {
        self.from_chain.as_ref().ok_or(ProcessorError::NoChainSet)
    }

    pub fn to_chain(&self) -> Result<&Network, ProcessorError> {
        self.to_chain.as_ref().ok_or(ProcessorError::NoChainSet)
    }

    pub fn from_token(&self) -> Result<&Token, ProcessorError> {
        self.from_token.as_ref().ok_or(ProcessorError::NoTokenSet)
    }

    pub fn to_token(&self) -> Result<&Token, ProcessorError> {
        self.to_token.as_ref().ok_or(ProcessorError::ToAndFromTokensMustBeSet)
    }

    /// Tests-mode gas override for the named processor
    pub fn test_estimation(&self, processor: &str) -> Result<u64, ProcessorError> {
        match self.test_estimation_map.get(processor) {
            Some(TestEstimation { err: Some(err), .. }) => Err(ProcessorError::upstream(
                static_name(processor),
                err,
            )),
            Some(TestEstimation { value, .. }) => Ok(*value),
            None => Err(ProcessorError::NoEstimationFound),
        }
    }
}

fn static_name(processor: &str) -> &'static str {
    use crate::constants::*;
    match processor {
        PROCESSOR_TRANSFER_NAME => PROCESSOR_TRANSFER_NAME,
        PROCESSOR_ERC721_NAME => PROCESSOR_ERC721_NAME,
        PROCESSOR_ERC1155_NAME => PROCESSOR_ERC1155_NAME,
        PROCESSOR_BRIDGE_HOP_NAME => PROCESSOR_BRIDGE_HOP_NAME,
        PROCESSOR_BRIDGE_CELER_NAME => PROCESSOR_BRIDGE_CELER_NAME,
        PROCESSOR_SWAP_PARASWAP_NAME => PROCESSOR_SWAP_PARASWAP_NAME,
        PROCESSOR_ENS_REGISTER_NAME => PROCESSOR_ENS_REGISTER_NAME,
        _ => "processor",
    }
}

/// Cache key shared by quote and transaction caches.
pub fn make_key(from_chain: ChainId, to_chain: ChainId, from_symbol: &str, to_symbol: &str, amount: U256) -> String {
    format!("{}-{}-{}-{}-{}", from_chain, to_chain, from_symbol, to_symbol, amount)
}

pub fn increase_estimated_gas(estimation: u64) -> u64 {
    (estimation as f64 * INCREASE_ESTIMATED_GAS_FACTOR) as u64
}

#[async_trait]
pub trait PathProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap eligibility check for the (from, to) pair of `params`.
    async fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, ProcessorError>;

    /// (bonder fee, token fee)
    async fn calculate_fees(&self, params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError>;

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError>;

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError>;

    async fn estimate_gas(&self, params: &ProcessorInputParams, input: &Bytes) -> Result<u64, ProcessorError>;

    /// Contract the leg calls, also the approval spender.
    async fn get_contract_address(&self, params: &ProcessorInputParams) -> Result<Address, ProcessorError>;

    /// Build the unsigned transaction of the leg; returns it with the nonce used.
    async fn build_transaction(
        &self,
        args: &mut SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(UnsignedTransaction, u64), ProcessorError>;

    /// Drop per-cycle caches
    fn clear(&self) {}
}

pub type ProcessorRegistry = HashMap<&'static str, Arc<dyn PathProcessor>>;

pub fn registry(processors: Vec<Arc<dyn PathProcessor>>) -> ProcessorRegistry {
    processors.into_iter().map(|p| (p.name(), p)).collect()
}

/// eth_estimateGas against `to` bumped by the common safety factor.
pub(crate) async fn estimate_call_gas(
    provider: &Arc<dyn ChainClientProvider>,
    processor: &'static str,
    chain_id: ChainId,
    msg: CallMsg,
) -> Result<u64, ProcessorError> {
    let client = provider.eth_client(chain_id)?;
    let estimation = client
        .estimate_gas(msg)
        .await
        .map_err(|e| ProcessorError::upstream(processor, e))?;
    Ok(increase_estimated_gas(estimation))
}
