use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use super::{estimate_call_gas, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::{abi, CallMsg};
use crate::constants::PROCESSOR_ERC721_NAME;
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};
use crate::types::Token;

/// Collectible token id carried in the token symbol
pub fn collectible_id(token: &Token) -> Result<U256, ProcessorError> {
    U256::from_str_radix(&token.symbol, 10)
        .map_err(|_| ProcessorError::InvalidCollectibleId(token.symbol.clone()))
}

pub struct Erc721Processor {
    transactor: Arc<Transactor>,
}

impl Erc721Processor {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self { transactor }
    }
}

#[async_trait]
impl PathProcessor for Erc721Processor {
    fn name(&self) -> &'static str {
        PROCESSOR_ERC721_NAME
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
        Ok(abi::encode_erc721_safe_transfer(params.from_addr, params.to_addr, id))
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

    #[test]
    fn test_collectible_id_parsing() {
        let mut token = Token { symbol: "1234".to_string(), ..Default::default() };
        assert_eq!(collectible_id(&token).unwrap(), U256::from(1234));
        token.symbol = "CRYPTOKITTY".to_string();
        assert!(matches!(collectible_id(&token), Err(ProcessorError::InvalidCollectibleId(_))));
    }

    #[tokio::test]
    async fn test_pack_safe_transfer() {
        let provider = Arc::new(crate::blockchain::StaticClientProvider::new());
        let p = Erc721Processor::new(Arc::new(Transactor::new(provider)));
        let contract = Address::repeat_byte(0x77);
        let params = ProcessorInputParams {
            from_chain: Some(crate::mocks::network(1)),
            to_chain: Some(crate::mocks::network(1)),
            from_token: Some(Token { address: contract, symbol: "7".to_string(), chain_id: 1, ..Default::default() }),
            from_addr: Address::repeat_byte(1),
            to_addr: Address::repeat_byte(2),
            amount_in: U256::from(1),
            ..Default::default()
        };
        let data = p.pack_tx_input_data(&params).await.unwrap();
        // safeTransferFrom(address,address,uint256)
        assert_eq!(&data[..4], &[0x42, 0x84, 0x2e, 0x0e]);
        assert_eq!(p.get_contract_address(&params).await.unwrap(), contract);
    }
}
