use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;

use super::{estimate_call_gas, PathProcessor, ProcessorError, ProcessorInputParams};
use crate::blockchain::abi;
use crate::blockchain::CallMsg;
use crate::constants::{ETHEREUM_SEPOLIA, PROCESSOR_ENS_REGISTER_NAME, SNT_SYMBOL, STT_SYMBOL};
use crate::transactions::{SendTxArgs, Transactor, UnsignedTransaction};
use crate::types::ChainId;

/// Username registration paid in SNT through `approveAndCall` on the token.
pub struct EnsRegisterProcessor {
    transactor: Arc<Transactor>,
    registrars: HashMap<ChainId, Address>,
}

/// Uncompressed secp256k1 key (`0x04 || X || Y`) split into X and Y
pub fn split_public_key(public_key: &str) -> Result<(B256, B256), ProcessorError> {
    let raw = hex::decode(public_key.trim_start_matches("0x"))
        .map_err(|e| ProcessorError::InvalidPublicKey(e.to_string()))?;
    if raw.len() != 65 || raw[0] != 0x04 {
        return Err(ProcessorError::InvalidPublicKey(format!("expected 65 byte uncompressed key, got {}", raw.len())));
    }
    Ok((B256::from_slice(&raw[1..33]), B256::from_slice(&raw[33..65])))
}

fn fee_token_symbol(chain_id: ChainId) -> &'static str {
    if chain_id == ETHEREUM_SEPOLIA {
        STT_SYMBOL
    } else {
        SNT_SYMBOL
    }
}

impl EnsRegisterProcessor {
    pub fn new(transactor: Arc<Transactor>, registrars: HashMap<ChainId, Address>) -> Self {
        Self { transactor, registrars }
    }

    fn registrar(&self, chain_id: ChainId) -> Result<Address, ProcessorError> {
        self.registrars
            .get(&chain_id)
            .copied()
            .ok_or(ProcessorError::TokenNotSupported { processor: PROCESSOR_ENS_REGISTER_NAME, chain_id })
    }

    /// Registration price from the registrar; the leg amount in tests mode.
    pub async fn registration_price(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        if params.tests_mode {
            return Ok(params.amount_in);
        }
        let chain_id = params.from_chain()?.chain_id;
        let registrar = self.registrar(chain_id)?;
        let client = self.transactor.provider().eth_client(chain_id)?;
        let out = client
            .call_contract(CallMsg {
                from: params.from_addr,
                to: Some(registrar),
                value: U256::ZERO,
                data: abi::encode_registrar_get_price(),
            })
            .await?;
        Ok(abi::decode_uint256(&out)?)
    }
}

#[async_trait]
impl PathProcessor for EnsRegisterProcessor {
    fn name(&self) -> &'static str {
        PROCESSOR_ENS_REGISTER_NAME
    }

    async fn available_for(&self, params: &ProcessorInputParams) -> Result<bool, ProcessorError> {
        let from_chain = params.from_chain()?;
        let to_chain = params.to_chain()?;
        if from_chain.chain_id != to_chain.chain_id || !from_chain.is_ens_chain() {
            return Ok(false);
        }
        let expected = fee_token_symbol(from_chain.chain_id);
        if params.from_token()?.symbol != expected {
            return Err(ProcessorError::OnlyTokenAllowed(expected));
        }
        Ok(self.registrars.contains_key(&from_chain.chain_id))
    }

    async fn calculate_fees(&self, _params: &ProcessorInputParams) -> Result<(U256, U256), ProcessorError> {
        Ok((U256::ZERO, U256::ZERO))
    }

    async fn calculate_amount_out(&self, params: &ProcessorInputParams) -> Result<U256, ProcessorError> {
        Ok(params.amount_in)
    }

    async fn pack_tx_input_data(&self, params: &ProcessorInputParams) -> Result<Bytes, ProcessorError> {
        let (username, public_key) = match (&params.username, &params.public_key) {
            (Some(u), Some(k)) if !u.is_empty() && !k.is_empty() => (u, k),
            _ => return Err(ProcessorError::MissingEnsDetails),
        };
        let (x, y) = split_public_key(public_key)?;
        let registrar = self.registrar(params.from_chain()?.chain_id)?;
        let price = self.registration_price(params).await?;
        let label = keccak256(username.as_bytes());
        Ok(abi::encode_ens_register(registrar, price, label, params.from_addr, x, y))
    }

    async fn estimate_gas(&self, params: &ProcessorInputParams, input: &Bytes) -> Result<u64, ProcessorError> {
        if params.tests_mode {
            return params.test_estimation(self.name());
        }
        let contract = self.get_contract_address(params).await?;
        let msg = CallMsg { from: params.from_addr, to: Some(contract), value: U256::ZERO, data: input.clone() };
        estimate_call_gas(self.transactor.provider(), self.name(), params.from_chain()?.chain_id, msg).await
    }

    /// The SNT token itself receives the `approveAndCall`.
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
    use crate::blockchain::abi::ISNT;
    use crate::blockchain::StaticClientProvider;
    use crate::constants::ETHEREUM_MAINNET;
    use crate::mocks::{network, token, MockChainClient};
    use alloy::sol_types::{SolCall, SolValue};

    const PUBKEY: &str = "0x04\
        1111111111111111111111111111111111111111111111111111111111111111\
        2222222222222222222222222222222222222222222222222222222222222222";

    fn processor(client: MockChainClient) -> EnsRegisterProcessor {
        let provider = StaticClientProvider::new().with_client(Arc::new(client));
        let registrars = [(ETHEREUM_MAINNET, Address::repeat_byte(0xe5))].into_iter().collect();
        EnsRegisterProcessor::new(Arc::new(Transactor::new(Arc::new(provider))), registrars)
    }

    fn params() -> ProcessorInputParams {
        ProcessorInputParams {
            from_chain: Some(network(ETHEREUM_MAINNET)),
            to_chain: Some(network(ETHEREUM_MAINNET)),
            from_token: Some(token(ETHEREUM_MAINNET, SNT_SYMBOL, 18)),
            from_addr: Address::repeat_byte(0x0a),
            amount_in: U256::from(10),
            username: Some("alice".to_string()),
            public_key: Some(PUBKEY.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_public_key() {
        let (x, y) = split_public_key(PUBKEY).unwrap();
        assert_eq!(x, B256::repeat_byte(0x11));
        assert_eq!(y, B256::repeat_byte(0x22));
        assert!(matches!(split_public_key("0x1234"), Err(ProcessorError::InvalidPublicKey(_))));
    }

    #[tokio::test]
    async fn test_available_only_on_ens_chain_with_snt() {
        let p = processor(MockChainClient::new(ETHEREUM_MAINNET));
        assert!(p.available_for(&params()).await.unwrap());

        let mut other_chain = params();
        other_chain.from_chain = Some(network(10));
        other_chain.to_chain = Some(network(10));
        assert!(!p.available_for(&other_chain).await.unwrap());

        let mut wrong_token = params();
        wrong_token.from_token = Some(token(ETHEREUM_MAINNET, "USDC", 6));
        assert_eq!(
            p.available_for(&wrong_token).await.unwrap_err(),
            ProcessorError::OnlyTokenAllowed(SNT_SYMBOL)
        );
    }

    #[tokio::test]
    async fn test_pack_uses_registrar_price() {
        let client = MockChainClient::new(ETHEREUM_MAINNET)
            .with_call_response(Address::repeat_byte(0xe5), U256::from(10_000).abi_encode().into());
        let p = processor(client);
        let data = p.pack_tx_input_data(&params()).await.unwrap();
        assert_eq!(&data[..4], &ISNT::approveAndCallCall::SELECTOR);
        let call = ISNT::approveAndCallCall::abi_decode(&data).unwrap();
        assert_eq!(call.spender, Address::repeat_byte(0xe5));
        assert_eq!(call.amount, U256::from(10_000));
    }

    #[tokio::test]
    async fn test_pack_requires_username_and_key() {
        let p = processor(MockChainClient::new(ETHEREUM_MAINNET));
        let mut missing = params();
        missing.username = None;
        assert_eq!(p.pack_tx_input_data(&missing).await.unwrap_err(), ProcessorError::MissingEnsDetails);
    }
}
