use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{estimate_call_gas, make_key, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::abi::ICelerBridge;
use crate::blockchain::CallMsg;
use crate::bridges::{CelerApi, CelerEstimate, CelerEstimateRequest};
use crate::constants::PROCESSOR_BRIDGE_CELER_NAME;
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};
use crate::types::ChainId;

/// chain id → cBridge contract
pub type CelerContracts = HashMap<ChainId, Address>;

pub struct CelerBridgeProcessor {
    transactor: Arc<Transactor>,
    api: Arc<dyn CelerApi>,
    contracts: CelerContracts,
    estimates: DashMap<String, CelerEstimate>,
}

impl CelerBridgeProcessor {
    pub fn new(transactor: Arc<Transactor>, api: Arc<dyn CelerApi>, contracts: CelerContracts) -> Self {
        Self { transactor, api, contracts, estimates: DashMap::new() }
    }

    fn estimate_key(params: &ProcessorInputParams) -> Result<String, ProcessorError> {
        let symbol = &params.from_token()?.symbol;
        Ok(make_key(
            params.from_chain()?.chain_id,
            params.to_chain()?.chain_id,
            symbol,
            symbol,
            params.amount_in,
        ))
    }

    fn cached_estimate(&self, params: &ProcessorInputParams) -> Result<CelerEstimate, ProcessorError> {
        let key = Self::estimate_key(params)?;
        self.estimates
            .get(&key)
            .map(|e| e.clone())
            .ok_or(ProcessorError::PriceRouteNotFound)
    }

    async fn fetch_estimate(&self, params: &ProcessorInputParams) -> Result<CelerEstimate, ProcessorError> {
        let from_chain = params.from_chain()?;
        let token = params.from_token()?;
        let estimate = if params.tests_mode {
            let fee = params.test_bonder_fee_map.get(&token.symbol).copied().unwrap_or_default();
            CelerEstimate {
                base_fee: fee,
                perc_fee: U256::ZERO,
                estimated_receive_amount: params.amount_in.saturating_sub(fee),
                max_slippage: (params.slippage_percentage as f64 * 10_000.0) as u32,
            }
        } else {
            self.api
                .estimate_amount(&CelerEstimateRequest {
                    from_chain: from_chain.chain_id,
                    to_chain: params.to_chain()?.chain_id,
                    token_symbol: token.symbol.clone(),
                    amount: params.amount_in,
                    user: params.from_addr,
                    slippage_percentage: params.slippage_percentage,
                    testnet: from_chain.is_test,
                })
                .await
                .map_err(|e| ProcessorError::upstream(PROCESSOR_BRIDGE_CELER_NAME, e))?
        };
        self.estimates.insert(Self::estimate_key(params)?, estimate.clone());
        Ok(estimate)
    }
}

#[async_trait]
impl PathProcessor for CelerBridgeProcessor {
    fn name(&self) -> &'static str {
        PROCESSOR_BRIDGE_CELER_NAME
    }

    async fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, ProcessorError> {
        let from_chain = params.from_chain()?;
        let to_chain = params.to_chain()?;
        if from_chain.chain_id == to_chain.chain_id {
            return Ok(false);
        }
        if params.to_token.is_some() {
            return Err(ProcessorError::ToTokenShouldNotBeSet);
        }
        params.from_token()?;
        Ok(self.contracts.contains_key(&from_chain.chain_id) && self.contracts.contains_key(&to_chain.chain_id))
    }

    async fn calculate_fees(&self, params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError> {
        let estimate = self.fetch_estimate(params).await?;
        debug!("🌉 cBridge fee: {}", estimate.total_fee());
        Ok((U256::ZERO, estimate.total_fee()))
    }

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        Ok(self.cached_estimate(params)?.estimated_receive_amount)
    }

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError> {
        let estimate = match self.cached_estimate(params) {
            Ok(e) => e,
            Err(_) => self.fetch_estimate(params).await?,
        };
        let token = params.from_token()?;
        let dst_chain_id = params.to_chain()?.chain_id;
        let nonce = chrono::Utc::now().timestamp_millis() as u64;

        let data = if token.is_native() {
            ICelerBridge::sendNativeCall {
                receiver: params.to_addr,
                amount: params.amount_in,
                dstChainId: dst_chain_id,
                nonce,
                maxSlippage: estimate.max_slippage,
            }
            .abi_encode()
        } else {
            ICelerBridge::sendCall {
                receiver: params.to_addr,
                token: token.address,
                amount: params.amount_in,
                dstChainId: dst_chain_id,
                nonce,
                maxSlippage: estimate.max_slippage,
            }
            .abi_encode()
        };
        Ok(data.into())
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams, input: &Bytes) -> Result<u64, ProcessorError> {
        if params.tests_mode {
            return params.test_estimation(self.name());
        }
        let token = params.from_token()?;
        let contract = self.get_contract_address(params).await?;
        let value = if token.is_native() { params.amount_in } else { U256::ZERO };
        let msg = CallMsg { from: params.from_addr, to: Some(contract), value, data: input.clone() };
        estimate_call_gas(self.transactor.provider(), self.name(), params.from_chain()?.chain_id, msg).await
    }

    async fn get_contract_address(&self, params: &ProcessorInputParams) -> Result<Address, ProcessorError> {
        let chain_id = params.from_chain()?.chain_id;
        self.contracts
            .get(&chain_id)
            .copied()
            .ok_or(ProcessorError::TokenNotSupported { processor: PROCESSOR_BRIDGE_CELER_NAME, chain_id })
    }

    async fn build_transaction(
        &self,
        args: &mut SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(UnsignedTransaction, u64), ProcessorError> {
        Ok(self.transactor.validate_and_build_transaction(args, last_used_nonce).await?)
    }

    fn clear(&self) {
        self.estimates.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::StaticClientProvider;
    use crate::bridges::BridgeError;
    use crate::mocks::{native_token, network, token, MockCelerApi};

    fn processor(api: MockCelerApi) -> CelerBridgeProcessor {
        let contracts: CelerContracts =
            [(1, Address::repeat_byte(0xc1)), (42161, Address::repeat_byte(0xc2))].into_iter().collect();
        let transactor = Arc::new(Transactor::new(Arc::new(StaticClientProvider::new())));
        CelerBridgeProcessor::new(transactor, Arc::new(api), contracts)
    }

    fn params() -> ProcessorInputParams {
        ProcessorInputParams {
            from_chain: Some(network(1)),
            to_chain: Some(network(42161)),
            from_token: Some(token(1, "USDT", 6)),
            amount_in: U256::from(5_000_000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fee_is_base_plus_percentage() {
        let p = processor(MockCelerApi::with_estimate(CelerEstimate {
            base_fee: U256::from(1_000),
            perc_fee: U256::from(250),
            estimated_receive_amount: U256::from(4_998_000),
            max_slippage: 5_000,
        }));
        let params = params();
        assert!(p.available_for(&params).await.unwrap());
        assert_eq!(p.calculate_fees(&params).await.unwrap(), (U256::ZERO, U256::from(1_250)));
        assert_eq!(p.calculate_amount_out(&params).await.unwrap(), U256::from(4_998_000));

        let data = p.pack_tx_input_data(&params).await.unwrap();
        assert_eq!(&data[..4], &ICelerBridge::sendCall::SELECTOR);
    }

    #[tokio::test]
    async fn test_native_uses_send_native() {
        let p = processor(MockCelerApi::with_estimate(CelerEstimate::default()));
        let mut params = params();
        params.from_token = Some(native_token(1));
        let data = p.pack_tx_input_data(&params).await.unwrap();
        assert_eq!(&data[..4], &ICelerBridge::sendNativeCall::SELECTOR);
    }

    #[tokio::test]
    async fn test_api_error_is_upstream() {
        let p = processor(MockCelerApi::failing(BridgeError::ApiError { message: "no liquidity".into() }));
        let err = p.calculate_fees(&params()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Upstream { processor: PROCESSOR_BRIDGE_CELER_NAME, .. }));
    }
}
