use async_trait::async_trait;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::types::ChainId;

/// Bridge operation result type
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge API errors
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(ChainId),

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Hop `/v1/quote` result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HopQuote {
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub destination_amount_out_min: U256,
    pub bonder_fee: U256,
    pub estimated_received: U256,
    pub deadline: U256,
    pub destination_deadline: U256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopQuoteRequest {
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub token_symbol: String,
    pub amount: U256,
    pub slippage_percentage: f32,
}

/// cBridge `/v2/estimateAmt` result
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CelerEstimate {
    pub base_fee: U256,
    pub perc_fee: U256,
    pub estimated_receive_amount: U256,
    pub max_slippage: u32,
}

impl CelerEstimate {
    pub fn total_fee(&self) -> U256 {
        self.base_fee + self.perc_fee
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CelerEstimateRequest {
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub token_symbol: String,
    pub amount: U256,
    pub user: alloy::primitives::Address,
    pub slippage_percentage: f32,
    pub testnet: bool,
}

#[async_trait]
pub trait HopApi: Send + Sync {
    async fn quote(&self, request: &HopQuoteRequest) -> BridgeResult<HopQuote>;
}

#[async_trait]
pub trait CelerApi: Send + Sync {
    async fn estimate_amount(&self, request: &CelerEstimateRequest) -> BridgeResult<CelerEstimate>;
}

/// Decimal string to U256; empty strings read as zero
pub fn parse_amount(value: &str) -> BridgeResult<U256> {
    if value.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(value, 10).map_err(|e| BridgeError::InvalidResponse(format!("{}: {}", value, e)))
}
