//! L1 data fee for OP-stack rollups.

use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::Signature;
use tracing::debug;

use super::{FeeError, FeeManager};
use crate::blockchain::{abi, CallMsg};
use crate::constants::GAS_PRICE_ORACLE;
use crate::types::Network;

/// Worst-case encoding of a transaction carrying `data`: every numeric field
/// set to its max so the oracle sees the largest possible payload.
pub fn padded_tx_encoding(chain_id: u64, to: Option<Address>, data: &Bytes) -> Bytes {
    let tx = TxEip1559 {
        chain_id,
        nonce: u64::MAX,
        gas_limit: u64::MAX,
        max_fee_per_gas: u128::MAX,
        max_priority_fee_per_gas: u128::MAX,
        to: to.unwrap_or(!Address::ZERO).into(),
        input: data.clone(),
        ..Default::default()
    };
    let signature = Signature::new(U256::MAX, U256::MAX, true);
    let signed = tx.into_signed(signature);
    let mut buf = Vec::with_capacity(signed.eip2718_encoded_length());
    signed.eip2718_encode(&mut buf);
    buf.into()
}

impl FeeManager {
    /// `getL1Fee(bytes)` on the GasPriceOracle predeploy, zero on chains without L1 data fees.
    pub async fn calculate_l1_fee(&self, network: &Network, to: Option<Address>, data: &Bytes) -> Result<U256, FeeError> {
        if !network.charges_l1_fee() {
            return Ok(U256::ZERO);
        }
        let client = self.provider().eth_client(network.chain_id)?;
        let encoded = padded_tx_encoding(network.chain_id, to, data);
        let out = client
            .call_contract(CallMsg {
                from: Address::ZERO,
                to: Some(GAS_PRICE_ORACLE),
                value: U256::ZERO,
                data: abi::encode_get_l1_fee(encoded),
            })
            .await?;
        let fee = abi::decode_uint256(&out)?;
        debug!("🧾 L1 fee chain {}: {}", network.chain_id, fee);
        Ok(fee)
    }
}
