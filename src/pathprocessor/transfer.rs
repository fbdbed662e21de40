use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use super::{estimate_call_gas, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::abi;
use crate::blockchain::CallMsg;
use crate::constants::PROCESSOR_TRANSFER_NAME;
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};

/// Same-chain native or ERC20 transfer
pub struct TransferProcessor {
    transactor: Arc<Transactor>,
}

impl TransferProcessor {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }
}

#[async_trait]
impl PathProcessor for TransferProcessor {
    fn name(&self) -> &'static str {
        PROCESSOR_TRANSFER_NAME
    }

    async fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, ProcessorError> {
        let from_chain = params.from_chain()?;
        let to_chain = params.to_chain()?;
        params.from_token()?;
        if params.to_token.is_some() {
            return Err(ProcessorError::ToTokenShouldNotBeSet);
        }
        Ok(from_chain.chain_id == to_chain.chain_id)
    }

    async fn calculate_fees(&self, _params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError> {
        Ok((U256::ZERO, U256::ZERO))
    }

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        Ok(params.amount_in)
    }

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError> {
        if params.from_token()?.is_native() {
            return Ok(Bytes::new());
        }
        Ok(abi::encode_erc20_transfer(params.to_addr, params.amount_in))
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams, input: &Bytes) -> Result<u64, ProcessorError> {
        if params.tests_mode {
            return params.test_estimation(self.name());
        }
        let token = params.from_token()?;
        let msg = if token.is_native() {
            CallMsg { from: params.from_addr, to: Some(params.to_addr), value: params.amount_in, data: input.clone() }
        } else {
            CallMsg { from: params.from_addr, to: Some(token.address), value: U256::ZERO, data: input.clone() }
        };
        estimate_call_gas(self.transactor.provider(), self.name(), params.from_chain()?.chain_id, msg).await
    }

    async fn get_contract_address(&self, _params: &ProcessorInputParams) -> Result<Address, ProcessorError> {
        Ok(Address::ZERO)
    }

    async fn build_transaction(
        &self,
        args: &mut SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(UnsignedTransaction, u64), ProcessorError> {
        Ok(self.transactor.validate_and_build_transaction(args, last_used_nonce).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::StaticClientProvider;
    use crate::mocks::{network, token, MockChainClient};
    use crate::types::TestEstimation;

    fn processor(client: MockChainClient) -> TransferProcessor {
        let provider = Arc::new(StaticClientProvider::new().with_client(Arc::new(client)));
        TransferProcessor::new(Arc::new(Transactor::new(provider)))
    }

    #[tokio::test]
    async fn test_available_only_on_same_chain() {
        let p = processor(MockChainClient::new(1));
        let mut params = ProcessorInputParams {
            from_chain: Some(network(1)),
            to_chain: Some(network(1)),
            from_token: Some(token(1, "USDC", 6)),
            ..Default::default()
        };
        assert!(p.available_for(&params).await.unwrap());

        params.to_chain = Some(network(10));
        assert!(!p.available_for(&params).await.unwrap());

        params.to_token = Some(token(10, "USDC", 6));
        assert_eq!(p.available_for(&params).await.unwrap_err(), ProcessorError::ToTokenShouldNotBeSet);

        params.from_chain = None;
        assert_eq!(p.available_for(&params).await.unwrap_err(), ProcessorError::NoChainSet);
    }

    #[tokio::test]
    async fn test_pack_native_and_erc20() {
        let p = processor(MockChainClient::new(1));
        let mut params = ProcessorInputParams {
            from_chain: Some(network(1)),
            to_chain: Some(network(1)),
            from_token: Some(crate::mocks::native_token(1)),
            to_addr: Address::repeat_byte(0x22),
            amount_in: U256::from(10),
            ..Default::default()
        };
        assert!(p.pack_tx_input_data(&params).await.unwrap().is_empty());

        params.from_token = Some(token(1, "USDC", 6));
        let data = p.pack_tx_input_data(&params).await.unwrap();
        assert_eq!(data, abi::encode_erc20_transfer(Address::repeat_byte(0x22), U256::from(10)));
    }

    #[tokio::test]
    async fn test_estimate_gas_applies_factor() {
        let p = processor(MockChainClient::new(1).with_gas_estimate(21_000));
        let mut params = ProcessorInputParams {
            from_chain: Some(network(1)),
            to_chain: Some(network(1)),
            from_token: Some(crate::mocks::native_token(1)),
            ..Default::default()
        };
        assert_eq!(p.estimate_gas(&params, &Bytes::new()).await.unwrap(), 23_100);

        params.tests_mode = true;
        params.test_estimation_map.insert(
            PROCESSOR_TRANSFER_NAME.to_string(),
            TestEstimation { value: 30_000, err: None },
        );
        assert_eq!(p.estimate_gas(&params, &Bytes::new()).await.unwrap(), 30_000);
    }
}
