use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::traits::{parse_amount, BridgeError, BridgeResult, CelerApi, CelerEstimate, CelerEstimateRequest};

const CELER_API_MAINNET: &str = "https://cbridge-prod2.celer.app";
const CELER_API_TESTNET: &str = "https://cbridge-v2-test.celer.network";

#[derive(Debug, Deserialize)]
struct CelerApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct EstimateAmtResponse {
    err: Option<CelerApiError>,
    #[serde(default)]
    perc_fee: String,
    #[serde(default)]
    base_fee: String,
    #[serde(default)]
    max_slippage: u32,
    #[serde(default)]
    estimated_receive_amt: String,
}

/// Celer cBridge gateway client
pub struct CelerHttpClient {
    client: Client,
    mainnet_url: String,
    testnet_url: String,
}

impl CelerHttpClient {
    pub fn new() -> Self {
        Self::with_base_urls(CELER_API_MAINNET, CELER_API_TESTNET)
    }

    pub fn with_base_urls(mainnet_url: &str, testnet_url: &str) -> Self {
        Self {
            client: Client::new(),
            mainnet_url: mainnet_url.trim_end_matches('/').to_string(),
            testnet_url: testnet_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for CelerHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn into_estimate(body: EstimateAmtResponse) -> BridgeResult<CelerEstimate> {
    if let Some(err) = body.err {
        if err.code != 0 || !err.msg.is_empty() {
            return Err(BridgeError::ApiError { message: err.msg });
        }
    }
    Ok(CelerEstimate {
        base_fee: parse_amount(&body.base_fee)?,
        perc_fee: parse_amount(&body.perc_fee)?,
        estimated_receive_amount: parse_amount(&body.estimated_receive_amt)?,
        max_slippage: body.max_slippage,
    })
}

#[async_trait]
impl CelerApi for CelerHttpClient {
    async fn estimate_amount(&self, request: &CelerEstimateRequest) -> BridgeResult<CelerEstimate> {
        let base = if request.testnet { &self.testnet_url } else { &self.mainnet_url };
        let url = format!("{}/v2/estimateAmt", base);
        // slippage in 1e-6 units
        let slippage = (request.slippage_percentage as f64 * 10_000.0) as u64;

        debug!(
            "🌉 cBridge estimate: {} {} {} -> {}",
            request.amount, request.token_symbol, request.from_chain, request.to_chain
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("src_chain_id", request.from_chain.to_string()),
                ("dst_chain_id", request.to_chain.to_string()),
                ("token_symbol", request.token_symbol.clone()),
                ("amt", request.amount.to_string()),
                ("usr_addr", format!("{:#x}", request.user)),
                ("slippage_tolerance", slippage.to_string()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::ApiError { message: format!("{}: {}", status, message) });
        }

        let body: EstimateAmtResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::InvalidResponse(e.to_string()))?;
        into_estimate(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[test]
    fn test_estimate_parsing() {
        let raw = r#"{
            "err": null,
            "eq_value_token_amt": "999000",
            "bridge_rate": 0.999,
            "perc_fee": "500",
            "base_fee": "1500",
            "slippage_tolerance": 5000,
            "max_slippage": 5123,
            "estimated_receive_amt": "997000"
        }"#;
        let body: EstimateAmtResponse = serde_json::from_str(raw).unwrap();
        let estimate = into_estimate(body).unwrap();
        assert_eq!(estimate.total_fee(), U256::from(2000));
        assert_eq!(estimate.estimated_receive_amount, U256::from(997000));
        assert_eq!(estimate.max_slippage, 5123);
    }

    #[test]
    fn test_estimate_api_error() {
        let raw = r#"{"err": {"code": 500, "msg": "bad amount"}}"#;
        let body: EstimateAmtResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            into_estimate(body).unwrap_err(),
            BridgeError::ApiError { message: "bad amount".to_string() }
        );
    }
}
