//! Nonce, fee and balance annotation of a selected route.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use super::errors::RouterError;
use super::routes::{Path, Route};
use crate::blockchain::ChainClientProvider;
use crate::fees::{FeeManager, SuggestedFees, TxFeeParams};
use crate::types::{ChainId, GasFeeMode, PathTxCustomParams, RouteInputParams};

/// Shared inputs of one annotation pass.
pub struct Annotator<'a> {
    pub fees: &'a FeeManager,
    pub provider: &'a Arc<dyn ChainClientProvider>,
    pub params: &'a RouteInputParams,
}

impl<'a> Annotator<'a> {
    /// Annotate a private copy of `route`; the input is never touched.
    pub async fn annotate_route(&self, route: &Route) -> Result<Route, RouterError> {
        let mut annotated = route.clone();
        let mut used_nonces: HashMap<ChainId, u64> = HashMap::new();
        let mut fees_by_chain: HashMap<ChainId, SuggestedFees> = HashMap::new();

        for path in annotated.iter_mut() {
            let chain_id = path.from_chain.chain_id;
            let fetched = match fees_by_chain.get(&chain_id) {
                Some(fees) => fees.clone(),
                None => {
                    let fees = self.fees.suggested_fees(&path.from_chain).await?;
                    fees_by_chain.insert(chain_id, fees.clone());
                    fees
                }
            };
            self.evaluate_and_update_path_details(path, &fetched, &mut used_nonces).await?;
        }
        Ok(annotated)
    }

    pub async fn evaluate_and_update_path_details(
        &self,
        path: &mut Path,
        fetched: &SuggestedFees,
        used_nonces: &mut HashMap<ChainId, u64>,
    ) -> Result<(), RouterError> {
        path.from_chain.eip1559_enabled = fetched.eip1559_enabled;
        let needs_l1_fee = path.from_chain.charges_l1_fee();

        let mut l1_approval_fee = U256::ZERO;
        if path.approval_required && needs_l1_fee {
            l1_approval_fee = match &self.params.test_params {
                Some(test) => test.approval_l1_fee,
                None => {
                    self.fees
                        .calculate_l1_fee(&path.from_chain, Some(path.from_token.address), &path.approval_packed_data)
                        .await?
                }
            };
        }

        self.apply_custom_fields(path, fetched, used_nonces).await?;

        let mut l1_tx_fee = U256::ZERO;
        if needs_l1_fee && !self.params.tests_mode() {
            l1_tx_fee = self
                .fees
                .calculate_l1_fee(&path.from_chain, Some(path.tx_to), &path.tx_packed_data)
                .await?;
        }

        rollup_fees(path, l1_tx_fee, l1_approval_fee);
        debug!(
            "🧮 path {} chain {}: total fee {} native required {}",
            path.processor_name, path.from_chain.chain_id, path.tx_total_fee, path.required_native_balance
        );
        Ok(())
    }

    async fn apply_custom_fields(
        &self,
        path: &mut Path,
        fetched: &SuggestedFees,
        used_nonces: &mut HashMap<ChainId, u64>,
    ) -> Result<(), RouterError> {
        // suggestions
        if fetched.eip1559_enabled {
            path.suggested_levels_for_max_fees_per_gas = Some(fetched.max_fees_levels.clone());
            path.suggested_min_priority_fee = fetched.priority_fee_bounds.lower;
            path.suggested_max_priority_fee = fetched.priority_fee_bounds.upper;
        } else {
            path.suggested_non_eip1559_fees = fetched.non_eip1559_fees.clone();
        }
        resolve_suggested_nonce_for_path(self.provider, path, self.params.addr_from, used_nonces).await?;

        path.current_base_fee = fetched.base_fee;
        path.tx_gas_amount = path.suggested_tx_gas_amount;
        path.approval_gas_amount = path.suggested_approval_gas_amount;
        path.tx_nonce = path.suggested_tx_nonce;
        path.approval_tx_nonce = path.suggested_approval_tx_nonce;

        if self.params.path_tx_custom_params.is_empty() {
            let mode = self.params.gas_fee_mode;
            let (fee, time) = fetched.fee_for(mode)?;
            if path.approval_required {
                path.approval_gas_fee_mode = mode;
                path.approval_fee_params = Some(fee);
                path.approval_estimated_time = time;
            }
            path.tx_gas_fee_mode = mode;
            path.tx_fee_params = Some(fee);
            path.tx_estimated_time = time;
            return Ok(());
        }

        if path.approval_required {
            let key = path.tx_identity_key(true);
            if let Some(custom) = self.params.path_tx_custom_params.get(&key) {
                let (nonce, gas, fee, time) = self.resolve_leg(path, fetched, &key, custom).await?;
                path.approval_gas_fee_mode = custom.gas_fee_mode;
                path.approval_fee_params = Some(fee);
                path.approval_estimated_time = time;
                if let Some(nonce) = nonce {
                    path.approval_tx_nonce = Some(nonce);
                }
                if let Some(gas) = gas {
                    path.approval_gas_amount = gas;
                }
            }
        }

        let key = path.tx_identity_key(false);
        if let Some(custom) = self.params.path_tx_custom_params.get(&key) {
            let (nonce, gas, fee, time) = self.resolve_leg(path, fetched, &key, custom).await?;
            path.tx_gas_fee_mode = custom.gas_fee_mode;
            path.tx_fee_params = Some(fee);
            path.tx_estimated_time = time;
            if let Some(nonce) = nonce {
                path.tx_nonce = Some(nonce);
            }
            if let Some(gas) = gas {
                path.tx_gas_amount = gas;
            }
        }
        Ok(())
    }

    /// Fee fields of one leg under custom params: presets for named modes,
    /// the caller's values verbatim for `Custom` (which also pins nonce and gas).
    async fn resolve_leg(
        &self,
        path: &Path,
        fetched: &SuggestedFees,
        key: &str,
        custom: &PathTxCustomParams,
    ) -> Result<(Option<u64>, Option<u64>, TxFeeParams, u64), RouterError> {
        if custom.gas_fee_mode != GasFeeMode::Custom {
            let (fee, time) = fetched.fee_for(custom.gas_fee_mode)?;
            return Ok((None, None, fee, time));
        }

        let fee = custom_fee_params(fetched.eip1559_enabled, key, custom)?;
        let (max_fee, priority) = fee.as_max_and_priority();
        let time = self.fees.transaction_estimated_time_v2(&path.from_chain, max_fee, priority).await;
        Ok((Some(custom.nonce), Some(custom.gas_amount), fee, time))
    }
}

/// Supplied custom fee values as the chain's fee model.
pub fn custom_fee_params(eip1559: bool, key: &str, custom: &PathTxCustomParams) -> Result<TxFeeParams, RouterError> {
    if !eip1559 {
        let gas_price = custom.gas_price.ok_or_else(|| RouterError::InvalidCustomParams(key.to_string()))?;
        return Ok(TxFeeParams::Legacy { gas_price });
    }
    match (custom.max_fees_per_gas, custom.priority_fee) {
        (Some(max_fee), Some(priority)) if priority <= max_fee => Ok(TxFeeParams::Eip1559 {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
            base_fee: max_fee - priority,
        }),
        _ => Err(RouterError::InvalidCustomParams(key.to_string())),
    }
}

/// `used_nonces` holds the last nonce handed out per chain. An approval takes
/// the next slot and its tx the one after.
pub async fn resolve_suggested_nonce_for_path(
    provider: &Arc<dyn ChainClientProvider>,
    path: &mut Path,
    address: Address,
    used_nonces: &mut HashMap<ChainId, u64>,
) -> Result<(), RouterError> {
    let chain_id = path.from_chain.chain_id;
    let next = match used_nonces.get(&chain_id) {
        Some(last) => last + 1,
        None => provider.eth_client(chain_id)?.pending_nonce_at(address).await?,
    };

    if path.approval_required {
        path.suggested_approval_tx_nonce = Some(next);
        path.suggested_tx_nonce = Some(next + 1);
        used_nonces.insert(chain_id, next + 1);
    } else {
        path.suggested_approval_tx_nonce = None;
        path.suggested_tx_nonce = Some(next);
        used_nonces.insert(chain_id, next);
    }
    Ok(())
}

/// tx fee = gas × price, plus approval and L1 fees; required balances follow.
pub fn rollup_fees(path: &mut Path, l1_tx_fee: U256, l1_approval_fee: U256) {
    let tx_fee = path
        .tx_fee_params
        .map(|f| f.fee_per_gas() * U256::from(path.tx_gas_amount))
        .unwrap_or_default();
    let mut total = tx_fee + l1_tx_fee;

    let mut approval_fee = U256::ZERO;
    if path.approval_required {
        approval_fee = path
            .approval_fee_params
            .map(|f| f.fee_per_gas() * U256::from(path.approval_gas_amount))
            .unwrap_or_default();
        total += approval_fee + l1_approval_fee;
    }

    let (native, token) = if path.from_token.is_native() {
        let native = if path.subtract_fees { path.amount_in } else { path.amount_in + total };
        (native, U256::ZERO)
    } else {
        (total, path.amount_in)
    };

    path.tx_fee = tx_fee;
    path.tx_l1_fee = l1_tx_fee;
    path.approval_fee = approval_fee;
    path.approval_l1_fee = if path.approval_required { l1_approval_fee } else { U256::ZERO };
    path.tx_total_fee = total;
    path.required_native_balance = native;
    path.required_token_balance = token;
}
