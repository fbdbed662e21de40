use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::Signature;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TransactionError;
use crate::blockchain::ChainClientProvider;
use crate::fees::TxFeeParams;
use crate::types::ChainId;

/// Arguments for building one chain transaction of a path.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SendTxArgs {
    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,
    pub from: Address,
    /// call target (contract, or recipient of a native transfer)
    pub to: Option<Address>,
    /// final receiver of the value
    pub recipient: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: u64,
    pub fee: Option<TxFeeParams>,
    pub nonce: Option<u64>,
    pub from_token_id: String,
    pub to_token_id: String,
    pub value_in: U256,
    pub value_out: U256,
    pub slippage_percentage: f32,
}

/// Unsigned transaction in one of the two fee models
#[derive(Debug, Clone, PartialEq)]
pub enum UnsignedTransaction {
    Legacy(TxLegacy),
    Eip1559(TxEip1559),
}

impl UnsignedTransaction {
    pub fn nonce(&self) -> u64 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.nonce,
            UnsignedTransaction::Eip1559(tx) => tx.nonce,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.chain_id.unwrap_or_default(),
            UnsignedTransaction::Eip1559(tx) => tx.chain_id,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.gas_limit,
            UnsignedTransaction::Eip1559(tx) => tx.gas_limit,
        }
    }

    pub fn to(&self) -> Option<Address> {
        let kind = match self {
            UnsignedTransaction::Legacy(tx) => tx.to,
            UnsignedTransaction::Eip1559(tx) => tx.to,
        };
        kind.to().copied()
    }

    pub fn value(&self) -> U256 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.value,
            UnsignedTransaction::Eip1559(tx) => tx.value,
        }
    }

    pub fn input(&self) -> &Bytes {
        match self {
            UnsignedTransaction::Legacy(tx) => &tx.input,
            UnsignedTransaction::Eip1559(tx) => &tx.input,
        }
    }

    /// Hash the external signer has to sign
    pub fn signature_hash(&self) -> B256 {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.signature_hash(),
            UnsignedTransaction::Eip1559(tx) => tx.signature_hash(),
        }
    }

    /// Attach the signature; returns the tx hash and the EIP-2718 raw bytes.
    pub fn into_signed_raw(self, signature: Signature) -> (B256, Bytes) {
        let envelope: TxEnvelope = match self {
            UnsignedTransaction::Legacy(tx) => tx.into_signed(signature).into(),
            UnsignedTransaction::Eip1559(tx) => tx.into_signed(signature).into(),
        };
        let hash = *envelope.tx_hash();
        (hash, envelope.encoded_2718().into())
    }
}

pub fn to_u128(value: U256, field: &str) -> Result<u128, TransactionError> {
    if value > U256::from(u128::MAX) {
        return Err(TransactionError::ValueOverflow(field.to_string()));
    }
    Ok(value.to::<u128>())
}

/// 트랜잭션 빌더: nonce 결정 및 fee 모델별 트랜잭션 생성
pub struct Transactor {
    provider: Arc<dyn ChainClientProvider>,
}

impl Transactor {
    pub fn new(provider: Arc<dyn ChainClientProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn ChainClientProvider> {
        &self.provider
    }

    /// Explicit nonce wins, then `last_used_nonce + 1`, then the pending nonce on chain.
    pub async fn resolve_nonce(&self, args: &SendTxArgs, last_used_nonce: Option<u64>) -> Result<u64, TransactionError> {
        if let Some(nonce) = args.nonce {
            return Ok(nonce);
        }
        if let Some(last) = last_used_nonce {
            return Ok(last + 1);
        }
        let client = self.provider.eth_client(args.from_chain_id)?;
        Ok(client.pending_nonce_at(args.from).await?)
    }

    pub async fn validate_and_build_transaction(
        &self,
        args: &SendTxArgs,
        last_used_nonce: Option<u64>,
    ) -> Result<(UnsignedTransaction, u64), TransactionError> {
        if args.from == Address::ZERO {
            return Err(TransactionError::MissingSender);
        }
        if args.gas == 0 {
            return Err(TransactionError::ZeroGas);
        }
        let fee = args.fee.ok_or(TransactionError::MissingFeeParams)?;
        let nonce = self.resolve_nonce(args, last_used_nonce).await?;
        let to = match args.to {
            Some(addr) => TxKind::Call(addr),
            None => TxKind::Create,
        };

        let tx = match fee {
            TxFeeParams::Legacy { gas_price } => UnsignedTransaction::Legacy(TxLegacy {
                chain_id: Some(args.from_chain_id),
                nonce,
                gas_price: to_u128(gas_price, "gas_price")?,
                gas_limit: args.gas,
                to,
                value: args.value,
                input: args.data.clone(),
            }),
            TxFeeParams::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas, .. } => {
                UnsignedTransaction::Eip1559(TxEip1559 {
                    chain_id: args.from_chain_id,
                    nonce,
                    gas_limit: args.gas,
                    max_fee_per_gas: to_u128(max_fee_per_gas, "max_fee_per_gas")?,
                    max_priority_fee_per_gas: to_u128(max_priority_fee_per_gas, "max_priority_fee_per_gas")?,
                    to,
                    value: args.value,
                    input: args.data.clone(),
                    ..Default::default()
                })
            }
        };
        debug!(
            "🔨 tx built: chain {} nonce {} gas {} eip1559={}",
            args.from_chain_id,
            nonce,
            args.gas,
            fee.is_eip1559()
        );
        Ok((tx, nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::StaticClientProvider;
    use crate::mocks::MockChainClient;

    fn transactor_with_nonce(nonce: u64) -> Transactor {
        let client = Arc::new(MockChainClient::new(1).with_pending_nonce(nonce));
        Transactor::new(Arc::new(StaticClientProvider::new().with_client(client)))
    }

    fn args() -> SendTxArgs {
        SendTxArgs {
            from_chain_id: 1,
            to_chain_id: 1,
            from: Address::repeat_byte(0xaa),
            to: Some(Address::repeat_byte(0xbb)),
            value: U256::from(5),
            gas: 21_000,
            fee: Some(TxFeeParams::Eip1559 {
                max_fee_per_gas: U256::from(100),
                max_priority_fee_per_gas: U256::from(2),
                base_fee: U256::from(49),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_nonce_resolution_order() {
        let transactor = transactor_with_nonce(7);
        let mut a = args();
        assert_eq!(transactor.resolve_nonce(&a, None).await.unwrap(), 7);
        assert_eq!(transactor.resolve_nonce(&a, Some(3)).await.unwrap(), 4);
        a.nonce = Some(42);
        assert_eq!(transactor.resolve_nonce(&a, Some(3)).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_build_eip1559_and_legacy() {
        let transactor = transactor_with_nonce(1);
        let (tx, nonce) = transactor.validate_and_build_transaction(&args(), None).await.unwrap();
        assert_eq!(nonce, 1);
        assert!(matches!(tx, UnsignedTransaction::Eip1559(_)));
        assert_eq!(tx.to(), Some(Address::repeat_byte(0xbb)));

        let mut legacy = args();
        legacy.fee = Some(TxFeeParams::Legacy { gas_price: U256::from(9) });
        let (tx, _) = transactor.validate_and_build_transaction(&legacy, Some(10)).await.unwrap();
        assert_eq!(tx.nonce(), 11);
        assert!(matches!(tx, UnsignedTransaction::Legacy(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_missing_fields() {
        let transactor = transactor_with_nonce(1);
        let mut a = args();
        a.fee = None;
        assert_eq!(
            transactor.validate_and_build_transaction(&a, None).await.unwrap_err(),
            TransactionError::MissingFeeParams
        );
        let mut a = args();
        a.gas = 0;
        assert_eq!(
            transactor.validate_and_build_transaction(&a, None).await.unwrap_err(),
            TransactionError::ZeroGas
        );
    }

    #[test]
    fn test_u128_overflow_guard() {
        assert!(to_u128(U256::MAX, "max_fee").is_err());
        assert_eq!(to_u128(U256::from(7), "max_fee").unwrap(), 7);
    }
}
