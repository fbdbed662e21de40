use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use super::erc721::collectible_id;
use super::{estimate_call_gas, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::{abi, CallMsg};
use crate::constants::PROCESSOR_ERC1155_NAME;
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};

pub struct Erc1155Processor {
    transactor: Arc<Transactor>,
}

impl Erc1155Processor {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }
}

#[async_trait]
impl PathProcessor for Erc1155Processor {
    fn name(&self) -> &'static str {
        PROCESSOR_ERC1155_NAME
    }

    async fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, ProcessorError> {
        Ok(params.from_chain()?.chain_id == params.to_chain()?.chain_id)
    }

    async fn calculate_fees(&self, _params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError> {
        Ok((U256::ZERO, U256::ZERO))
    }

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        Ok(params.amount_in)
    }

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError> {
        let id = collectible_id(params.from_token()?)?;
        Ok(abi::encode_erc1155_safe_transfer(params.from_addr, params.to_addr, id, params.amount_in))
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams, input: &Bytes) -> Result<u64, ProcessorError> {
        if params.tests_mode {
            return params.test_estimation(self.name());
        }
        let msg = CallMsg {
            from: params.from_addr,
            to: Some(params.from_token()?.address),
            value: U256::ZERO,
            data: input.clone(),
        };
        estimate_call_gas(self.transactor.provider(), self.name(), params.from_chain()?.chain_id, msg).await
    }

    async fn get_contract_address(&self, params: &ProcessorInputParams) -> Result<Address, ProcessorError> {
        Ok(params.from_token()?.address)
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
    use crate::mocks::network;
    use crate::types::Token;

    fn params(to_chain: u64) -> ProcessorInputParams {
        ProcessorInputParams {
            from_chain: Some(network(10)),
            to_chain: Some(network(to_chain)),
            from_token: Some(Token { address: Address::repeat_byte(0x55), symbol: "9".to_string(), chain_id: 10, ..Default::default() }),
            from_addr: Address::repeat_byte(1),
            to_addr: Address::repeat_byte(2),
            amount_in: U256::from(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_same_chain_only_and_packing() {
        let p = Erc1155Processor::new(Arc::new(Transactor::new(Arc::new(StaticClientProvider::new()))));
        assert!(p.available_for(&params(10)).await.unwrap());
        assert!(!p.available_for(&params(1)).await.unwrap());
        assert_eq!(p.calculate_amount_out(&params(10)).await.unwrap(), U256::from(3));

        let data = p.pack_tx_input_data(&params(10)).await.unwrap();
        // safeTransferFrom(address,address,uint256,uint256,bytes)
        assert_eq!(&data[..4], &[0xf2, 0x42, 0x43, 0x2a]);
        assert_eq!(p.get_contract_address(&params(10)).await.unwrap(), Address::repeat_byte(0x55));
    }
}
