use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::constants::{PARASWAP_BASE_RETRY_DELAY_MS, PARASWAP_BUILD_MAX_ATTEMPTS};
use crate::types::ChainId;

const PARASWAP_PRICES_URL: &str = "https://api.paraswap.io/prices";
const PARASWAP_TRANSACTIONS_URL: &str = "https://api.paraswap.io/transactions";
const PARASWAP_API_VERSION: &str = "6.2";

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ParaswapError {
    /// `error` field of the API response, verbatim
    #[error("{0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwapSide {
    #[default]
    Sell,
    Buy,
}

impl SwapSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapSide::Sell => "SELL",
            SwapSide::Buy => "BUY",
        }
    }
}

/// Amounts come back as decimal strings; numbers and null are tolerated.
mod decimal_u256 {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        match Value::deserialize(d)? {
            Value::String(s) if s.is_empty() => Ok(U256::ZERO),
            Value::String(s) => U256::from_str_radix(&s, 10).map_err(de::Error::custom),
            Value::Number(n) => n
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| de::Error::custom(format!("amount out of range: {}", n))),
            Value::Null => Ok(U256::ZERO),
            other => Err(de::Error::custom(format!("unexpected amount: {}", other))),
        }
    }
}

/// Aggregator price route. `raw_price_route` is echoed back untouched when
/// building, since the aggregator signs over it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceRoute {
    #[serde(with = "decimal_u256", default)]
    pub gas_cost: U256,
    #[serde(with = "decimal_u256", default)]
    pub src_amount: U256,
    #[serde(rename = "srcToken")]
    pub src_token_address: Address,
    #[serde(rename = "srcDecimals")]
    pub src_token_decimals: u8,
    #[serde(with = "decimal_u256", default)]
    pub dest_amount: U256,
    #[serde(rename = "destToken")]
    pub dest_token_address: Address,
    #[serde(rename = "destDecimals")]
    pub dest_token_decimals: u8,
    #[serde(default)]
    pub side: SwapSide,
    #[serde(default)]
    pub contract_address: Address,
    #[serde(default)]
    pub token_transfer_proxy: Address,
    #[serde(skip)]
    pub raw_price_route: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceRouteResponse {
    #[serde(default)]
    price_route: Option<Value>,
    #[serde(default)]
    error: String,
}

/// Built aggregator transaction
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParaswapTransaction {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub gas_price: String,
    #[serde(default)]
    pub gas: String,
    #[serde(default)]
    pub chain_id: ChainId,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceRouteRequest {
    pub chain_id: ChainId,
    pub src_token: Address,
    pub src_decimals: u8,
    pub dest_token: Address,
    pub dest_decimals: u8,
    pub amount: U256,
    pub user_address: Address,
    pub side: SwapSide,
}

impl PriceRouteRequest {
    /// Request that re-quotes an existing route with the same tokens and amount
    pub fn refresh_of(chain_id: ChainId, route: &PriceRoute, user_address: Address) -> Self {
        let amount = match route.side {
            SwapSide::Sell => route.src_amount,
            SwapSide::Buy => route.dest_amount,
        };
        Self {
            chain_id,
            src_token: route.src_token_address,
            src_decimals: route.src_token_decimals,
            dest_token: route.dest_token_address,
            dest_decimals: route.dest_token_decimals,
            amount,
            user_address,
            side: route.side,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildTransactionRequest {
    pub chain_id: ChainId,
    pub route: PriceRoute,
    pub slippage_bps: u32,
    pub user_address: Address,
    pub partner_address: Option<Address>,
    pub partner_fee_bps: u32,
}

impl BuildTransactionRequest {
    pub fn body(&self, partner_id: &str) -> Value {
        let route = &self.route;
        let mut body = json!({
            "srcToken": format!("{:#x}", route.src_token_address),
            "srcDecimals": route.src_token_decimals,
            "destToken": format!("{:#x}", route.dest_token_address),
            "destDecimals": route.dest_token_decimals,
            "userAddress": format!("{:#x}", self.user_address),
            "priceRoute": route.raw_price_route,
            "partner": partner_id,
        });
        if self.slippage_bps > 0 {
            body["slippage"] = json!(self.slippage_bps);
            match route.side {
                SwapSide::Sell => body["srcAmount"] = json!(route.src_amount.to_string()),
                SwapSide::Buy => body["destAmount"] = json!(route.dest_amount.to_string()),
            }
        } else {
            body["srcAmount"] = json!(route.src_amount.to_string());
            body["destAmount"] = json!(route.dest_amount.to_string());
        }
        if let Some(partner) = self.partner_address {
            if partner != Address::ZERO && self.partner_fee_bps > 0 {
                body["partnerAddress"] = json!(format!("{:#x}", partner));
                body["partnerFeeBps"] = json!(self.partner_fee_bps);
            }
        }
        body
    }
}

#[async_trait]
pub trait ParaswapApi: Send + Sync {
    async fn fetch_price_route(&self, request: &PriceRouteRequest) -> Result<PriceRoute, ParaswapError>;

    async fn build_transaction(&self, request: &BuildTransactionRequest) -> Result<ParaswapTransaction, ParaswapError>;
}

/// ParaSwap REST client
pub struct ParaswapHttpClient {
    client: Client,
    prices_url: String,
    transactions_url: String,
    partner_id: String,
}

impl ParaswapHttpClient {
    pub fn new(partner_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            prices_url: PARASWAP_PRICES_URL.to_string(),
            transactions_url: PARASWAP_TRANSACTIONS_URL.to_string(),
            partner_id: partner_id.into(),
        }
    }

    pub fn with_urls(mut self, prices_url: &str, transactions_url: &str) -> Self {
        self.prices_url = prices_url.trim_end_matches('/').to_string();
        self.transactions_url = transactions_url.trim_end_matches('/').to_string();
        self
    }
}

fn parse_price_route(body: &[u8]) -> Result<PriceRoute, ParaswapError> {
    let response: PriceRouteResponse =
        serde_json::from_slice(body).map_err(|e| ParaswapError::InvalidResponse(e.to_string()))?;
    if !response.error.is_empty() {
        return Err(ParaswapError::Api(response.error));
    }
    let raw = response
        .price_route
        .ok_or_else(|| ParaswapError::InvalidResponse("missing priceRoute".to_string()))?;
    let mut route: PriceRoute =
        serde_json::from_value(raw.clone()).map_err(|e| ParaswapError::InvalidResponse(e.to_string()))?;
    route.raw_price_route = raw;
    Ok(route)
}

fn parse_transaction(body: &[u8]) -> Result<ParaswapTransaction, ParaswapError> {
    let tx: ParaswapTransaction =
        serde_json::from_slice(body).map_err(|e| ParaswapError::InvalidResponse(e.to_string()))?;
    if !tx.error.is_empty() {
        return Err(ParaswapError::Api(tx.error));
    }
    Ok(tx)
}

#[async_trait]
impl ParaswapApi for ParaswapHttpClient {
    async fn fetch_price_route(&self, request: &PriceRouteRequest) -> Result<PriceRoute, ParaswapError> {
        debug!(
            "🔄 ParaSwap price: chain {} {:#x} -> {:#x} amount {} {}",
            request.chain_id,
            request.src_token,
            request.dest_token,
            request.amount,
            request.side.as_str()
        );
        let response = self
            .client
            .get(&self.prices_url)
            .query(&[
                ("srcToken", format!("{:#x}", request.src_token)),
                ("srcDecimals", request.src_decimals.to_string()),
                ("destToken", format!("{:#x}", request.dest_token)),
                ("destDecimals", request.dest_decimals.to_string()),
                ("userAddress", format!("{:#x}", request.user_address)),
                ("network", request.chain_id.to_string()),
                ("amount", request.amount.to_string()),
                ("side", request.side.as_str().to_string()),
                ("partner", self.partner_id.clone()),
                ("excludeContractMethodsWithoutFeeModel", "true".to_string()),
                ("version", PARASWAP_API_VERSION.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ParaswapError::Network(e.to_string()))?;

        // error bodies carry the message we translate, so parse regardless of status
        let body = response.bytes().await.map_err(|e| ParaswapError::Network(e.to_string()))?;
        parse_price_route(&body)
    }

    async fn build_transaction(&self, request: &BuildTransactionRequest) -> Result<ParaswapTransaction, ParaswapError> {
        let url = format!("{}/{}", self.transactions_url, request.chain_id);
        let response = self
            .client
            .post(&url)
            .json(&request.body(&self.partner_id))
            .send()
            .await
            .map_err(|e| ParaswapError::Network(e.to_string()))?;

        let body = response.bytes().await.map_err(|e| ParaswapError::Network(e.to_string()))?;
        parse_transaction(&body)
    }
}

/// Exponential backoff for the build call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: PARASWAP_BUILD_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(PARASWAP_BASE_RETRY_DELAY_MS),
        }
    }
}

/// Build with retries. The last attempt re-quotes first and builds against the
/// fresh route, which is returned alongside the transaction.
pub async fn build_transaction_with_retry(
    api: &dyn ParaswapApi,
    mut request: BuildTransactionRequest,
    policy: &RetryPolicy,
) -> Result<(ParaswapTransaction, Option<PriceRoute>), ParaswapError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut refreshed = None;
    let mut last_error = ParaswapError::Api("build transaction not attempted".to_string());

    for attempt in 0..max_attempts {
        if attempt > 0 && attempt + 1 == max_attempts {
            let refresh = PriceRouteRequest::refresh_of(request.chain_id, &request.route, request.user_address);
            let route = api.fetch_price_route(&refresh).await?;
            debug!("🔁 ParaSwap route refreshed before final build attempt");
            request.route = route.clone();
            refreshed = Some(route);
        }

        match api.build_transaction(&request).await {
            Ok(tx) => return Ok((tx, refreshed)),
            Err(e) => {
                warn!("⚠️ ParaSwap build attempt {}/{} failed: {}", attempt + 1, max_attempts, e);
                last_error = e;
            }
        }

        if attempt + 1 < max_attempts {
            tokio::time::sleep(policy.base_delay * 2u32.pow(attempt)).await;
        }
    }

    Err(last_error)
}
