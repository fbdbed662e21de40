use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::locked;
use crate::bridges::{BridgeError, BridgeResult, CelerApi, CelerEstimate, CelerEstimateRequest, HopApi, HopQuote, HopQuoteRequest};
use crate::dex::paraswap::{BuildTransactionRequest, ParaswapApi, ParaswapError, ParaswapTransaction, PriceRoute, PriceRouteRequest};

/// Hop API returning one canned quote
#[derive(Default)]
pub struct MockHopApi {
    quote: Option<HopQuote>,
    requests: Mutex<Vec<HopQuoteRequest>>,
}

impl MockHopApi {
    pub fn with_quote(quote: HopQuote) -> Self {
        Self { quote: Some(quote), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<HopQuoteRequest> {
        locked(&self.requests).clone()
    }
}

#[async_trait]
impl HopApi for MockHopApi {
    async fn quote(&self, request: &HopQuoteRequest) -> BridgeResult<HopQuote> {
        locked(&self.requests).push(request.clone());
        self.quote
            .clone()
            .ok_or_else(|| BridgeError::ApiError { message: "no quote".to_string() })
    }
}

/// cBridge API with a fixed answer
pub struct MockCelerApi {
    result: BridgeResult<CelerEstimate>,
}

impl MockCelerApi {
    pub fn with_estimate(estimate: CelerEstimate) -> Self {
        Self { result: Ok(estimate) }
    }

    pub fn failing(error: BridgeError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl CelerApi for MockCelerApi {
    async fn estimate_amount(&self, _request: &CelerEstimateRequest) -> BridgeResult<CelerEstimate> {
        self.result.clone()
    }
}

/// ParaSwap API fed from response queues.
///
/// Each queue hands out its entries in order and then keeps repeating the
/// last one.
#[derive(Default)]
pub struct MockParaswapApi {
    routes: Mutex<VecDeque<Result<PriceRoute, ParaswapError>>>,
    builds: Mutex<VecDeque<Result<ParaswapTransaction, ParaswapError>>>,
    route_requests: Mutex<Vec<PriceRouteRequest>>,
    build_requests: Mutex<Vec<BuildTransactionRequest>>,
}

impl MockParaswapApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_route(&self, route: Result<PriceRoute, ParaswapError>) {
        locked(&self.routes).push_back(route);
    }

    pub fn push_build(&self, tx: Result<ParaswapTransaction, ParaswapError>) {
        locked(&self.builds).push_back(tx);
    }

    pub fn build_requests(&self) -> Vec<BuildTransactionRequest> {
        locked(&self.build_requests).clone()
    }

    pub fn route_fetches(&self) -> usize {
        locked(&self.route_requests).len()
    }
}

fn next_sticky<T: Clone>(queue: &Mutex<VecDeque<Result<T, ParaswapError>>>, empty: &str) -> Result<T, ParaswapError> {
    let mut queue = locked(queue);
    if queue.len() > 1 {
        if let Some(next) = queue.pop_front() {
            return next;
        }
    }
    queue
        .front()
        .cloned()
        .unwrap_or_else(|| Err(ParaswapError::Api(empty.to_string())))
}

#[async_trait]
impl ParaswapApi for MockParaswapApi {
    async fn fetch_price_route(&self, request: &PriceRouteRequest) -> Result<PriceRoute, ParaswapError> {
        locked(&self.route_requests).push(request.clone());
        next_sticky(&self.routes, "No routes found with enough liquidity")
    }

    async fn build_transaction(&self, request: &BuildTransactionRequest) -> Result<ParaswapTransaction, ParaswapError> {
        locked(&self.build_requests).push(request.clone());
        next_sticky(&self.builds, "Unable to build transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[tokio::test]
    async fn test_paraswap_queue_repeats_last_entry() {
        let api = MockParaswapApi::new();
        let request = PriceRouteRequest {
            chain_id: 1,
            src_token: Default::default(),
            src_decimals: 18,
            dest_token: Default::default(),
            dest_decimals: 6,
            amount: U256::from(1),
            user_address: Default::default(),
            side: Default::default(),
        };
        assert!(api.fetch_price_route(&request).await.is_err());

        api.push_route(Err(ParaswapError::Api("Price Timeout".to_string())));
        api.push_route(Ok(PriceRoute { dest_amount: U256::from(7), ..Default::default() }));
        assert!(api.fetch_price_route(&request).await.is_err());
        assert_eq!(api.fetch_price_route(&request).await.unwrap().dest_amount, U256::from(7));
        assert_eq!(api.fetch_price_route(&request).await.unwrap().dest_amount, U256::from(7));
        assert_eq!(api.route_fetches(), 4);
    }

    #[tokio::test]
    async fn test_hop_without_quote_fails() {
        let api = MockHopApi::default();
        let request = HopQuoteRequest {
            from_chain: 1,
            to_chain: 10,
            token_symbol: "USDC".to_string(),
            amount: U256::from(1),
            slippage_percentage: 0.5,
        };
        assert!(api.quote(&request).await.is_err());
        assert_eq!(api.requests().len(), 1);
    }
}
