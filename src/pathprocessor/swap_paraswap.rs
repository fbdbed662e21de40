use std::sync::Arc;

use alloy::primitives::{address, Address, Bytes, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use super::{estimate_call_gas, make_key, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::CallMsg;
use crate::constants::*;
use crate::dex::{
    build_transaction_with_retry, BuildTransactionRequest, ParaswapApi, ParaswapError, ParaswapTransaction,
    PriceRoute, PriceRouteRequest, RetryPolicy, SwapSide,
};
use crate::fees::TxFeeParams;
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};
use crate::types::{ChainId, Token};

/// Partner address and fee in basis points per chain; `None` means no partner fee.
pub fn partner_for_chain(chain_id: ChainId) -> Option<(Address, u32)> {
    let partner = match chain_id {
        ETHEREUM_MAINNET => address!("d9abc564bfabefa88a6C2723d78124579600F568"),
        OPTIMISM_MAINNET => address!("E9B59dC0b30cd4646430c25de0111D651c395775"),
        ARBITRUM_MAINNET => address!("9a8278e856C0B191B9daa2d7DD1f7B28268E4DA2"),
        BASE_MAINNET => address!("107E3208A27e2A56D420fE6f8c5B88c821052f89"),
        BSC_MAINNET => address!("EF693aCC26e7fb24B96056b33472D89d7dA5bAC9"),
        _ => return None,
    };
    Some((partner, PARASWAP_PARTNER_FEE_BPS))
}

/// dest amount minus the truncated partner fee (dest * bps / 10_000), exact to the wei
pub fn received_amount_after_fee(dest_amount: U256, fee_bps: u32) -> U256 {
    if fee_bps == 0 {
        return dest_amount;
    }
    let fee = dest_amount
        .checked_mul(U256::from(fee_bps))
        .map(|scaled| scaled / U256::from(10_000u64))
        .unwrap_or_else(|| dest_amount / U256::from(10_000u64) * U256::from(fee_bps));
    dest_amount.saturating_sub(fee)
}

/// Known aggregator messages become typed errors
pub fn map_paraswap_error(err: ParaswapError) -> ProcessorError {
    match &err {
        ParaswapError::Api(message) => match message.as_str() {
            "Price Timeout" => ProcessorError::PriceTimeout,
            "No routes found with enough liquidity" => ProcessorError::NotEnoughLiquidity,
            "ESTIMATED_LOSS_GREATER_THAN_MAX_IMPACT" => ProcessorError::PriceImpactTooHigh,
            _ => ProcessorError::upstream(PROCESSOR_SWAP_PARASWAP_NAME, err),
        },
        _ => ProcessorError::upstream(PROCESSOR_SWAP_PARASWAP_NAME, err),
    }
}

fn aggregator_address(token: &Token) -> Address {
    if token.is_native() {
        NATIVE_TOKEN_PLACEHOLDER
    } else {
        token.address
    }
}

fn parse_decimal(value: &str, field: &str) -> Result<U256, ProcessorError> {
    if value.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(value, 10).map_err(|e| ProcessorError::ConvertingAmount(format!("{}: {}", field, e)))
}

fn parse_address(value: &str, field: &str) -> Result<Address, ProcessorError> {
    value
        .parse::<Address>()
        .map_err(|e| ProcessorError::ConvertingAmount(format!("{}: {}", field, e)))
}

pub struct SwapParaswapProcessor {
    transactor: Arc<Transactor>,
    api: Arc<dyn ParaswapApi>,
    retry: RetryPolicy,
    price_routes: DashMap<String, PriceRoute>,
    transactions: DashMap<String, ParaswapTransaction>,
}

impl SwapParaswapProcessor {
    pub fn new(transactor: Arc<Transactor>, api: Arc<dyn ParaswapApi>) -> Self {
        Self {
            transactor,
            api,
            retry: RetryPolicy::default(),
            price_routes: DashMap::new(),
            transactions: DashMap::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn key_for(params: &ProcessorInputParams) -> Result<String, ProcessorError> {
        Ok(make_key(
            params.from_chain()?.chain_id,
            params.to_chain()?.chain_id,
            &params.from_token()?.symbol,
            &params.to_token()?.symbol,
            params.amount_in,
        ))
    }

    pub fn cached_price_route(&self, key: &str) -> Option<PriceRoute> {
        self.price_routes.get(key).map(|r| r.clone())
    }

    pub fn store_price_route(&self, key: String, route: PriceRoute) {
        self.price_routes.insert(key, route);
    }

    async fn fetch_and_store_price_route(&self, params: &ProcessorInputParams) -> Result<PriceRoute, ProcessorError> {
        let from_token = params.from_token()?;
        let to_token = params.to_token()?;
        let (side, amount) = if params.amount_out > U256::ZERO {
            (SwapSide::Buy, params.amount_out)
        } else {
            (SwapSide::Sell, params.amount_in)
        };

        let request = PriceRouteRequest {
            chain_id: params.from_chain()?.chain_id,
            src_token: aggregator_address(from_token),
            src_decimals: from_token.decimals,
            dest_token: aggregator_address(to_token),
            dest_decimals: to_token.decimals,
            amount,
            user_address: params.from_addr,
            side,
        };
        let route = self.api.fetch_price_route(&request).await.map_err(map_paraswap_error)?;
        self.store_price_route(Self::key_for(params)?, route.clone());
        Ok(route)
    }

    async fn fetch_and_store_transaction(
        &self,
        key: &str,
        chain_id: ChainId,
        from_addr: Address,
        slippage_percentage: f32,
    ) -> Result<ParaswapTransaction, ProcessorError> {
        let route = self.cached_price_route(key).ok_or(ProcessorError::PriceRouteNotFound)?;
        let partner = partner_for_chain(chain_id);
        let request = BuildTransactionRequest {
            chain_id,
            route,
            slippage_bps: (slippage_percentage * 100.0) as u32,
            user_address: from_addr,
            partner_address: partner.map(|(addr, _)| addr),
            partner_fee_bps: partner.map(|(_, bps)| bps).unwrap_or_default(),
        };

        let (tx, refreshed) = build_transaction_with_retry(self.api.as_ref(), request, &self.retry)
            .await
            .map_err(map_paraswap_error)?;
        if let Some(route) = refreshed {
            info!("🔁 ParaSwap quote replaced for {}", key);
            self.store_price_route(key.to_string(), route);
        }
        self.transactions.insert(key.to_string(), tx.clone());
        Ok(tx)
    }
}

#[async_trait]
impl PathProcessor for SwapParaswapProcessor {
    fn name(&self) -> &'static str {
        PROCESSOR_SWAP_PARASWAP_NAME
    }

    async fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, ProcessorError> {
        let from_chain = params.from_chain()?;
        let to_chain = params.to_chain()?;
        let (from_token, to_token) = match (&params.from_token, &params.to_token) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(ProcessorError::ToAndFromTokensMustBeSet),
        };
        if from_chain.chain_id != to_chain.chain_id {
            return Err(ProcessorError::FromAndToChainsMustBeSame);
        }
        if from_token.symbol == to_token.symbol {
            return Err(ProcessorError::FromAndToTokensMustBeDifferent);
        }
        Ok(true)
    }

    async fn calculate_fees(&self, _params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError> {
        Ok((U256::ZERO, U256::ZERO))
    }

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        let key = Self::key_for(params)?;
        let route = self.cached_price_route(&key).ok_or(ProcessorError::PriceRouteNotFound)?;
        let fee_bps = partner_for_chain(params.from_chain()?.chain_id)
            .map(|(_, bps)| bps)
            .unwrap_or_default();
        Ok(received_amount_after_fee(route.dest_amount, fee_bps))
    }

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError> {
        if params.tests_mode {
            return Ok(Bytes::new());
        }
        let key = Self::key_for(params)?;
        let tx = self
            .fetch_and_store_transaction(&key, params.from_chain()?.chain_id, params.from_addr, params.slippage_percentage)
            .await?;
        let data = hex::decode(tx.data.trim_start_matches("0x"))
            .map_err(|e| ProcessorError::upstream(PROCESSOR_SWAP_PARASWAP_NAME, e))?;
        Ok(data.into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams, input: &Bytes) -> Result<u64, ProcessorError> {
        if params.tests_mode {
            return params.test_estimation(self.name());
        }
        let key = Self::key_for(params)?;
        let target = match self.transactions.get(&key) {
            Some(tx) => parse_address(&tx.to, "to")?,
            None => self.get_contract_address(params).await?,
        };
        let from_token = params.from_token()?;
        let value = if from_token.is_native() { params.amount_in } else { U256::ZERO };
        let msg = CallMsg { from: params.from_addr, to: Some(target), value, data: input.clone() };
        estimate_call_gas(self.transactor.provider(), self.name(), params.from_chain()?.chain_id, msg).await
    }

    /// Quotes and caches the route; the spender is the token transfer proxy.
    async fn get_contract_address(&self, params: &ProcessorInputParams) -> Result<Address, ProcessorError> {
        Ok(self.fetch_and_store_price_route(params).await?.token_transfer_proxy)
    }

    async fn build_transaction(
        &self,
        args: &mut SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(UnsignedTransaction, u64), ProcessorError> {
        let key = make_key(args.from_chain_id, args.to_chain_id, &args.from_token_id, &args.to_token_id, args.value_in);
        let tx = match self.transactions.get(&key).map(|tx| tx.clone()) {
            Some(tx) => tx,
            None => {
                debug!("ParaSwap transaction not cached for {}, building", key);
                self.fetch_and_store_transaction(&key, args.from_chain_id, args.from, args.slippage_percentage)
                    .await?
            }
        };

        if tx.chain_id != 0 {
            args.from_chain_id = tx.chain_id;
        }
        if !tx.from.is_empty() {
            args.from = parse_address(&tx.from, "from")?;
        }
        args.to = Some(parse_address(&tx.to, "to")?);
        args.value = parse_decimal(&tx.value, "value")?;
        args.data = hex::decode(tx.data.trim_start_matches("0x"))
            .map_err(|e| ProcessorError::upstream(PROCESSOR_SWAP_PARASWAP_NAME, e))?
            .into();
        if args.gas == 0 {
            args.gas = tx.gas.parse::<u64>().map_err(|e| ProcessorError::ConvertingAmount(format!("gas: {}", e)))?;
        }
        if args.fee.is_none() {
            args.fee = Some(TxFeeParams::Legacy { gas_price: parse_decimal(&tx.gas_price, "gas_price")? });
        }

        Ok(self.transactor.validate_and_build_transaction(args, last_used_nonce).await?)
    }

    fn clear(&self) {
        self.price_routes.clear();
        self.transactions.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::blockchain::StaticClientProvider;
    use crate::mocks::{native_token, network, token, MockChainClient, MockParaswapApi};

    fn test_route() -> PriceRoute {
        PriceRoute {
            gas_cost: U256::from(500),
            src_amount: U256::from(1000),
            src_token_address: Address::repeat_byte(0x12),
            src_token_decimals: 18,
            dest_amount: U256::from(2000),
            dest_token_address: Address::repeat_byte(0x46),
            dest_token_decimals: 6,
            side: SwapSide::Sell,
            contract_address: Address::repeat_byte(0x78),
            token_transfer_proxy: Address::repeat_byte(0xab),
            raw_price_route: serde_json::json!({"blockNumber": 1}),
        }
    }

    fn test_transaction(chain_id: ChainId) -> ParaswapTransaction {
        ParaswapTransaction {
            from: format!("{:#x}", Address::repeat_byte(0x11)),
            to: format!("{:#x}", Address::repeat_byte(0x22)),
            value: "1000".to_string(),
            data: "0xabcd".to_string(),
            gas_price: "100".to_string(),
            gas: "1000".to_string(),
            chain_id,
            error: String::new(),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1) }
    }

    fn processor(api: Arc<MockParaswapApi>, chain_id: ChainId) -> SwapParaswapProcessor {
        let client = Arc::new(MockChainClient::new(chain_id).with_pending_nonce(5));
        let transactor = Arc::new(Transactor::new(Arc::new(StaticClientProvider::new().with_client(client))));
        SwapParaswapProcessor::new(transactor, api).with_retry_policy(fast_retry())
    }

    fn params(chain_id: ChainId) -> ProcessorInputParams {
        ProcessorInputParams {
            from_chain: Some(network(chain_id)),
            to_chain: Some(network(chain_id)),
            from_token: Some(native_token(chain_id)),
            to_token: Some(token(chain_id, "USDC", 6)),
            from_addr: Address::repeat_byte(0x11),
            to_addr: Address::repeat_byte(0x22),
            amount_in: U256::from(1000),
            ..Default::default()
        }
    }

    #[test]
    fn test_partner_fee_per_chain() {
        for chain in [ETHEREUM_MAINNET, OPTIMISM_MAINNET, ARBITRUM_MAINNET, BASE_MAINNET, BSC_MAINNET] {
            let (addr, bps) = partner_for_chain(chain).unwrap();
            assert_ne!(addr, Address::ZERO);
            assert_eq!(bps, 70);
        }
        assert!(partner_for_chain(ETHEREUM_SEPOLIA).is_none());
        assert!(partner_for_chain(0).is_none());
    }

    #[test]
    fn test_received_amount_truncates_fee() {
        // 2000 * 0.7% = 14
        assert_eq!(received_amount_after_fee(U256::from(2000), 70), U256::from(1986));
        // 999 * 0.7% = 6.993 -> 6
        assert_eq!(received_amount_after_fee(U256::from(999), 70), U256::from(993));
        assert_eq!(received_amount_after_fee(U256::from(999), 0), U256::from(999));
        assert_eq!(received_amount_after_fee(U256::ZERO, 70), U256::ZERO);
    }

    #[test]
    fn test_received_amount_exact_for_18_decimal_amounts() {
        // well past 2^53, fee = 864197523086419752
        let dest = U256::from_str_radix("123456789012345678901", 10).unwrap();
        let expected = U256::from_str_radix("122592591489259259149", 10).unwrap();
        assert_eq!(received_amount_after_fee(dest, 70), expected);

        // no overflow at the top of the range
        let received = received_amount_after_fee(U256::MAX, 70);
        assert!(received < U256::MAX);
        assert!(received > U256::MAX / U256::from(2u64));
    }

    #[tokio::test]
    async fn test_amount_out_contract_and_pack_with_partner_fee() {
        for chain_id in [ETHEREUM_MAINNET, ARBITRUM_MAINNET, OPTIMISM_MAINNET, 0] {
            let api = Arc::new(MockParaswapApi::new());
            let p = processor(api.clone(), chain_id);
            let params = params(chain_id);
            let key = make_key(chain_id, chain_id, ETH_SYMBOL, "USDC", U256::from(1000));
            p.store_price_route(key, test_route());

            let expected = if chain_id == 0 { U256::from(2000) } else { U256::from(1986) };
            assert_eq!(p.calculate_amount_out(&params).await.unwrap(), expected);

            api.push_route(Ok(test_route()));
            assert_eq!(p.get_contract_address(&params).await.unwrap(), Address::repeat_byte(0xab));

            api.push_build(Ok(test_transaction(chain_id)));
            let data = p.pack_tx_input_data(&params).await.unwrap();
            assert_eq!(data, Bytes::from(vec![0xab, 0xcd]));
        }
    }

    #[tokio::test]
    async fn test_identical_quotes_share_cache_entry() {
        let api = Arc::new(MockParaswapApi::new());
        let p = processor(api.clone(), ETHEREUM_MAINNET);
        let params = params(ETHEREUM_MAINNET);
        let key = SwapParaswapProcessor::key_for(&params).unwrap();
        assert_eq!(key, make_key(ETHEREUM_MAINNET, ETHEREUM_MAINNET, ETH_SYMBOL, "USDC", U256::from(1000)));

        let mut bigger_route = test_route();
        bigger_route.src_amount = U256::from(5000);
        bigger_route.dest_amount = U256::from(10_000);
        api.push_route(Ok(test_route()));
        api.push_route(Ok(test_route()));
        api.push_route(Ok(bigger_route));

        p.get_contract_address(&params).await.unwrap();
        let first = p.calculate_amount_out(&params).await.unwrap();
        p.get_contract_address(&params).await.unwrap();
        let second = p.calculate_amount_out(&params).await.unwrap();

        assert_eq!(api.route_fetches(), 2);
        assert_eq!(SwapParaswapProcessor::key_for(&params).unwrap(), key);
        assert_eq!(first, second);
        assert_eq!(first, U256::from(1986));

        // another amount lands in its own entry
        let mut bigger = params.clone();
        bigger.amount_in = U256::from(5000);
        p.get_contract_address(&bigger).await.unwrap();

        let bigger_key = SwapParaswapProcessor::key_for(&bigger).unwrap();
        assert_ne!(bigger_key, key);
        assert_eq!(p.calculate_amount_out(&bigger).await.unwrap(), U256::from(9930));
        assert_eq!(p.cached_price_route(&key).unwrap().dest_amount, U256::from(2000));
        assert_eq!(p.calculate_amount_out(&params).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_error_translation() {
        let cases = [
            ("Price Timeout", ProcessorError::PriceTimeout),
            ("No routes found with enough liquidity", ProcessorError::NotEnoughLiquidity),
            ("ESTIMATED_LOSS_GREATER_THAN_MAX_IMPACT", ProcessorError::PriceImpactTooHigh),
        ];
        for (message, expected) in cases {
            let api = Arc::new(MockParaswapApi::new());
            let p = processor(api.clone(), ETHEREUM_MAINNET);
            api.push_route(Err(ParaswapError::Api(message.to_string())));
            assert_eq!(p.get_contract_address(&params(ETHEREUM_MAINNET)).await.unwrap_err(), expected);
        }

        let err = map_paraswap_error(ParaswapError::Api("something else".to_string()));
        assert!(matches!(err, ProcessorError::Upstream { processor: PROCESSOR_SWAP_PARASWAP_NAME, .. }));
    }

    #[tokio::test]
    async fn test_available_for_rules() {
        let p = processor(Arc::new(MockParaswapApi::new()), ETHEREUM_MAINNET);
        let mut params = params(ETHEREUM_MAINNET);
        assert!(p.available_for(&params).await.unwrap());

        params.to_chain = Some(network(OPTIMISM_MAINNET));
        assert_eq!(p.available_for(&params).await.unwrap_err(), ProcessorError::FromAndToChainsMustBeSame);

        params.to_chain = Some(network(ETHEREUM_MAINNET));
        params.to_token = Some(native_token(ETHEREUM_MAINNET));
        assert_eq!(p.available_for(&params).await.unwrap_err(), ProcessorError::FromAndToTokensMustBeDifferent);

        params.to_token = None;
        assert_eq!(p.available_for(&params).await.unwrap_err(), ProcessorError::ToAndFromTokensMustBeSet);
    }

    #[tokio::test]
    async fn test_build_retries_then_uses_refreshed_route() {
        let api = Arc::new(MockParaswapApi::new());
        let p = processor(api.clone(), ETHEREUM_MAINNET);
        let key = make_key(ETHEREUM_MAINNET, ETHEREUM_MAINNET, ETH_SYMBOL, "USDC", U256::from(1000));
        p.store_price_route(key.clone(), test_route());

        let mut fresh = test_route();
        fresh.dest_amount = U256::from(1900);
        fresh.dest_token_address = Address::repeat_byte(0x47);
        api.push_route(Ok(fresh.clone()));
        api.push_build(Err(ParaswapError::Api("Unable to build transaction".to_string())));
        api.push_build(Err(ParaswapError::Api("Unable to build transaction".to_string())));
        api.push_build(Ok(test_transaction(ETHEREUM_MAINNET)));

        let mut args = SendTxArgs {
            from_chain_id: ETHEREUM_MAINNET,
            to_chain_id: ETHEREUM_MAINNET,
            from: Address::repeat_byte(0x11),
            from_token_id: ETH_SYMBOL.to_string(),
            to_token_id: "USDC".to_string(),
            value_in: U256::from(1000),
            slippage_percentage: 0.5,
            ..Default::default()
        };
        let (tx, nonce) = p.build_transaction(&mut args, None).await.unwrap();
        assert_eq!(nonce, 5);
        assert_eq!(tx.to(), Some(Address::repeat_byte(0x22)));
        assert_eq!(tx.gas_limit(), 1000);
        assert_eq!(args.value, U256::from(1000));

        let requests = api.build_requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].route.dest_amount, U256::from(2000));
        assert_eq!(requests[1].route.dest_amount, U256::from(2000));
        // third attempt runs against the refreshed quote
        assert_eq!(requests[2].route.dest_amount, U256::from(1900));
        assert_eq!(requests[2].route.dest_token_address, Address::repeat_byte(0x47));
        assert_eq!(requests[2].slippage_bps, 50);
        assert_eq!(api.route_fetches(), 1);

        assert_eq!(p.cached_price_route(&key).unwrap().dest_amount, U256::from(1900));
    }

    #[tokio::test]
    async fn test_build_fails_after_all_attempts() {
        let api = Arc::new(MockParaswapApi::new());
        let p = processor(api.clone(), ETHEREUM_MAINNET);
        let key = make_key(ETHEREUM_MAINNET, ETHEREUM_MAINNET, ETH_SYMBOL, "USDC", U256::from(1000));
        p.store_price_route(key, test_route());
        api.push_route(Ok(test_route()));
        api.push_build(Err(ParaswapError::Api("Price Timeout".to_string())));

        let mut args = SendTxArgs {
            from_chain_id: ETHEREUM_MAINNET,
            to_chain_id: ETHEREUM_MAINNET,
            from: Address::repeat_byte(0x11),
            from_token_id: ETH_SYMBOL.to_string(),
            to_token_id: "USDC".to_string(),
            value_in: U256::from(1000),
            ..Default::default()
        };
        assert_eq!(p.build_transaction(&mut args, None).await.unwrap_err(), ProcessorError::PriceTimeout);
        assert_eq!(api.build_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_clear_drops_cached_routes() {
        let p = processor(Arc::new(MockParaswapApi::new()), ETHEREUM_MAINNET);
        let key = make_key(ETHEREUM_MAINNET, ETHEREUM_MAINNET, ETH_SYMBOL, "USDC", U256::from(1000));
        p.store_price_route(key.clone(), test_route());
        p.clear();
        assert!(p.cached_price_route(&key).is_none());
        assert_eq!(
            p.calculate_amount_out(&params(ETHEREUM_MAINNET)).await.unwrap_err(),
            ProcessorError::PriceRouteNotFound
        );
    }
}
