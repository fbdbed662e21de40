use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{estimate_call_gas, make_key, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::abi::{IHopL1Bridge, IHopL2AmmWrapper};
use crate::blockchain::CallMsg;
use crate::bridges::{HopApi, HopQuote, HopQuoteRequest};
use crate::constants::PROCESSOR_BRIDGE_HOP_NAME;
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};
use crate::types::ChainId;

/// chain id → token symbol → L1 bridge / L2 AMM wrapper
pub type HopContracts = HashMap<ChainId, HashMap<String, Address>>;

/// 7 days, the deadline used when no live quote is available
const TEST_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;

pub struct HopBridgeProcessor {
    transactor: Arc<Transactor>,
    api: Arc<dyn HopApi>,
    contracts: HopContracts,
    quotes: DashMap<String, HopQuote>,
}

impl HopBridgeProcessor {
    pub fn new(transactor: Arc<Transactor>, api: Arc<dyn HopApi>, contracts: HopContracts) -> Self {
        Self { transactor, api, contracts, quotes: DashMap::new() }
    }

    fn contract_for(&self, chain_id: ChainId, symbol: &str) -> Option<Address> {
        self.contracts.get(&chain_id).and_then(|tokens| tokens.get(symbol)).copied()
    }

    fn quote_key(params: &ProcessorInputParams) -> Result<String, ProcessorError> {
        let symbol = &params.from_token()?.symbol;
        Ok(make_key(
            params.from_chain()?.chain_id,
            params.to_chain()?.chain_id,
            symbol,
            symbol,
            params.amount_in,
        ))
    }

    fn cached_quote(&self, params: &ProcessorInputParams) -> Result<HopQuote, ProcessorError> {
        let key = Self::quote_key(params)?;
        self.quotes
            .get(&key)
            .map(|q| q.clone())
            .ok_or(ProcessorError::PriceRouteNotFound)
    }

    async fn fetch_quote(&self, params: &ProcessorInputParams) -> Result<HopQuote, ProcessorError> {
        let token = params.from_token()?;
        let quote = if params.tests_mode {
            let bonder_fee = params
                .test_bonder_fee_map
                .get(&token.symbol)
                .copied()
                .unwrap_or_default();
            let received = params.amount_in.saturating_sub(bonder_fee);
            let deadline = U256::from(chrono::Utc::now().timestamp() as u64 + TEST_DEADLINE_SECS);
            HopQuote {
                amount_in: params.amount_in,
                amount_out_min: received,
                destination_amount_out_min: received,
                bonder_fee,
                estimated_received: received,
                deadline,
                destination_deadline: deadline,
            }
        } else {
            self.api
                .quote(&HopQuoteRequest {
                    from_chain: params.from_chain()?.chain_id,
                    to_chain: params.to_chain()?.chain_id,
                    token_symbol: token.symbol.clone(),
                    amount: params.amount_in,
                    slippage_percentage: params.slippage_percentage,
                })
                .await
                .map_err(|e| ProcessorError::upstream(PROCESSOR_BRIDGE_HOP_NAME, e))?
        };
        self.quotes.insert(Self::quote_key(params)?, quote.clone());
        Ok(quote)
    }
}

#[async_trait]
impl PathProcessor for HopBridgeProcessor {
    fn name(&self) -> &'static str {
        PROCESSOR_BRIDGE_HOP_NAME
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
        let symbol = &params.from_token()?.symbol;
        Ok(self.contract_for(from_chain.chain_id, symbol).is_some())
    }

    async fn calculate_fees(&self, params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError> {
        let quote = self.fetch_quote(params).await?;
        let token_fee = params
            .amount_in
            .saturating_sub(quote.estimated_received)
            .saturating_sub(quote.bonder_fee);
        debug!("🐰 Hop fees: bonder {} token {}", quote.bonder_fee, token_fee);
        Ok((quote.bonder_fee, token_fee))
    }

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        Ok(self.cached_quote(params)?.estimated_received)
    }

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError> {
        let quote = match self.cached_quote(params) {
            Ok(q) => q,
            Err(_) => self.fetch_quote(params).await?,
        };
        let from_chain = params.from_chain()?;
        let to_chain_id = U256::from(params.to_chain()?.chain_id);

        let data = if from_chain.layer == 1 {
            IHopL1Bridge::sendToL2Call {
                chainId: to_chain_id,
                recipient: params.to_addr,
                amount: params.amount_in,
                amountOutMin: quote.amount_out_min,
                deadline: quote.deadline,
                relayer: Address::ZERO,
                relayerFee: U256::ZERO,
            }
            .abi_encode()
        } else {
            IHopL2AmmWrapper::swapAndSendCall {
                chainId: to_chain_id,
                recipient: params.to_addr,
                amount: params.amount_in,
                bonderFee: quote.bonder_fee,
                amountOutMin: quote.amount_out_min,
                deadline: quote.deadline,
                destinationAmountOutMin: quote.destination_amount_out_min,
                destinationDeadline: quote.destination_deadline,
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
        self.contract_for(chain_id, &params.from_token()?.symbol)
            .ok_or(ProcessorError::TokenNotSupported { processor: PROCESSOR_BRIDGE_HOP_NAME, chain_id })
    }

    async fn build_transaction(
        &self,
        args: &mut SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(UnsignedTransaction, u64), ProcessorError> {
        Ok(self.transactor.validate_and_build_transaction(args, last_used_nonce).await?)
    }

    fn clear(&self) {
        self.quotes.clear();
    }
}
