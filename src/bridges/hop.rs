use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::traits::{parse_amount, BridgeError, BridgeResult, HopApi, HopQuote, HopQuoteRequest};
use crate::constants::*;
use crate::types::ChainId;

const HOP_API_BASE: &str = "https://api.hop.exchange/v1";

/// Hop chain slug used by the public API
fn chain_slug(chain_id: ChainId) -> BridgeResult<&'static str> {
    match chain_id {
        ETHEREUM_MAINNET | ETHEREUM_SEPOLIA => Ok("ethereum"),
        OPTIMISM_MAINNET | OPTIMISM_SEPOLIA => Ok("optimism"),
        ARBITRUM_MAINNET | ARBITRUM_SEPOLIA => Ok("arbitrum"),
        BASE_MAINNET | BASE_SEPOLIA => Ok("base"),
        other => Err(BridgeError::UnsupportedChain(other)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HopQuoteResponse {
    amount_in: String,
    amount_out_min: String,
    destination_amount_out_min: Option<String>,
    bonder_fee: String,
    // sic: the API spells it this way
    #[serde(alias = "estimatedReceived")]
    estimated_recieved: String,
    deadline: u64,
    destination_deadline: Option<u64>,
}

/// Hop Protocol public API client
pub struct HopHttpClient {
    client: Client,
    base_url: String,
}

impl HopHttpClient {
    pub fn new() -> Self {
        Self::with_base_url(HOP_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self { client: Client::new(), base_url: base_url.trim_end_matches('/').to_string() }
    }
}

impl Default for HopHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HopApi for HopHttpClient {
    async fn quote(&self, request: &HopQuoteRequest) -> BridgeResult<HopQuote> {
        let from = chain_slug(request.from_chain)?;
        let to = chain_slug(request.to_chain)?;
        let url = format!("{}/quote", self.base_url);
        let network = if request.from_chain == ETHEREUM_SEPOLIA || request.from_chain == OPTIMISM_SEPOLIA {
            "sepolia"
        } else {
            "mainnet"
        };

        debug!("🐰 Hop quote: {} {} {} -> {}", request.amount, request.token_symbol, from, to);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("amount", request.amount.to_string()),
                ("token", request.token_symbol.clone()),
                ("fromChain", from.to_string()),
                ("toChain", to.to_string()),
                ("slippage", request.slippage_percentage.to_string()),
                ("network", network.to_string()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::ApiError { message: format!("{}: {}", status, message) });
        }

        let body: HopQuoteResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::InvalidResponse(e.to_string()))?;

        Ok(HopQuote {
            amount_in: parse_amount(&body.amount_in)?,
            amount_out_min: parse_amount(&body.amount_out_min)?,
            destination_amount_out_min: parse_amount(body.destination_amount_out_min.as_deref().unwrap_or(""))?,
            bonder_fee: parse_amount(&body.bonder_fee)?,
            estimated_received: parse_amount(&body.estimated_recieved)?,
            deadline: alloy::primitives::U256::from(body.deadline),
            destination_deadline: alloy::primitives::U256::from(body.destination_deadline.unwrap_or_default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_slugs() {
        assert_eq!(chain_slug(ETHEREUM_MAINNET).unwrap(), "ethereum");
        assert_eq!(chain_slug(BASE_MAINNET).unwrap(), "base");
        assert_eq!(chain_slug(BSC_MAINNET).unwrap_err(), BridgeError::UnsupportedChain(BSC_MAINNET));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "amountIn": "1000000",
            "slippage": 0.5,
            "amountOutMin": "990000",
            "destinationAmountOutMin": "985000",
            "bonderFee": "2500",
            "estimatedRecieved": "996000",
            "deadline": 1700000000,
            "destinationDeadline": 1700000100
        }"#;
        let body: HopQuoteResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.bonder_fee, "2500");
        assert_eq!(body.estimated_recieved, "996000");
        assert_eq!(body.destination_deadline, Some(1700000100));
    }
}
