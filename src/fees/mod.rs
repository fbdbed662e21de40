pub mod estimated_time;
pub mod l1_fee;

use std::sync::Arc;

use alloy::primitives::U256;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::blockchain::{ChainClientProvider, ChainError, FeeHistory};
use crate::constants::{FEE_HISTORY_BLOCK_COUNT, REWARD_PERCENTILES};
use crate::types::{ChainId, GasFeeMode, Network};

pub use estimated_time::{convert_to_sorted, remove_duplicates_from_sorted};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeeError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Empty fee history for chain {0}")]
    EmptyFeeHistory(ChainId),

    #[error("Gas fee mode {0:?} has no preset")]
    NoPresetForMode(GasFeeMode),
}

/// Gas price fields of one transaction. A path never mixes the two models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxFeeParams {
    Legacy {
        gas_price: U256,
    },
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
        base_fee: U256,
    },
}

impl TxFeeParams {
    /// gas price (legacy) or max fee (EIP-1559): the worst-case price per gas
    pub fn fee_per_gas(&self) -> U256 {
        match self {
            TxFeeParams::Legacy { gas_price } => *gas_price,
            TxFeeParams::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }

    pub fn is_eip1559(&self) -> bool {
        matches!(self, TxFeeParams::Eip1559 { .. })
    }

    /// (max fee, priority fee) as used by the time estimator
    pub fn as_max_and_priority(&self) -> (U256, U256) {
        match self {
            TxFeeParams::Legacy { gas_price } => (*gas_price, U256::ZERO),
            TxFeeParams::Eip1559 { max_fee_per_gas, max_priority_fee_per_gas, .. } => {
                (*max_fee_per_gas, *max_priority_fee_per_gas)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaxFeesLevels {
    pub low: U256,
    pub low_priority: U256,
    pub medium: U256,
    pub medium_priority: U256,
    pub high: U256,
    pub high_priority: U256,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityFeeBounds {
    pub lower: U256,
    pub upper: U256,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NonEip1559Fees {
    pub gas_price: U256,
    pub estimated_time: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestedFees {
    pub chain_id: ChainId,
    pub gas_price: U256,
    pub base_fee: U256,
    pub eip1559_enabled: bool,
    pub max_fees_levels: MaxFeesLevels,
    pub priority_fee_bounds: PriorityFeeBounds,
    pub non_eip1559_fees: Option<NonEip1559Fees>,
    /// 초 단위 예상 확정 시간 (slow, normal, fast), 0 = 알 수 없음
    pub estimated_time_low: u64,
    pub estimated_time_medium: u64,
    pub estimated_time_high: u64,
}

impl SuggestedFees {
    /// Resolve a named preset into concrete fee fields and its time estimate.
    pub fn fee_for(&self, mode: GasFeeMode) -> Result<(TxFeeParams, u64), FeeError> {
        if !self.eip1559_enabled {
            let (gas_price, time) = match &self.non_eip1559_fees {
                Some(fees) => (fees.gas_price, fees.estimated_time),
                None => (self.gas_price, 0),
            };
            return match mode {
                GasFeeMode::Custom => Err(FeeError::NoPresetForMode(mode)),
                _ => Ok((TxFeeParams::Legacy { gas_price }, time)),
            };
        }

        let levels = &self.max_fees_levels;
        let (max_fee, priority, time) = match mode {
            GasFeeMode::Slow => (levels.low, levels.low_priority, self.estimated_time_low),
            GasFeeMode::Normal => (levels.medium, levels.medium_priority, self.estimated_time_medium),
            GasFeeMode::Fast => (levels.high, levels.high_priority, self.estimated_time_high),
            GasFeeMode::Custom => return Err(FeeError::NoPresetForMode(mode)),
        };
        Ok((
            TxFeeParams::Eip1559 {
                max_fee_per_gas: max_fee,
                max_priority_fee_per_gas: priority,
                base_fee: self.base_fee,
            },
            time,
        ))
    }
}

/// 수수료 추정기: fee history 기반 제안값 및 예상 시간
pub struct FeeManager {
    provider: Arc<dyn ChainClientProvider>,
    history_cache: DashMap<ChainId, FeeHistory>,
}

impl FeeManager {
    pub fn new(provider: Arc<dyn ChainClientProvider>) -> Self {
        Self { provider, history_cache: DashMap::new() }
    }

    pub fn provider(&self) -> &Arc<dyn ChainClientProvider> {
        &self.provider
    }

    /// Drop cached fee histories; called at the start of each routing cycle.
    pub fn clear_cache(&self) {
        self.history_cache.clear();
    }

    pub async fn fee_history(&self, chain_id: ChainId) -> Result<FeeHistory, FeeError> {
        if let Some(cached) = self.history_cache.get(&chain_id) {
            return Ok(cached.clone());
        }
        let client = self.provider.eth_client(chain_id)?;
        let history = client.fee_history(FEE_HISTORY_BLOCK_COUNT, &REWARD_PERCENTILES).await?;
        if history.base_fee_per_gas.is_empty() {
            return Err(FeeError::EmptyFeeHistory(chain_id));
        }
        self.history_cache.insert(chain_id, history.clone());
        Ok(history)
    }

    pub async fn suggested_fees(&self, network: &Network) -> Result<SuggestedFees, FeeError> {
        let client = self.provider.eth_client(network.chain_id)?;
        let gas_price = client.suggest_gas_price().await?;

        if !network.eip1559_enabled {
            let estimated_time = self
                .transaction_estimated_time_v2(network, gas_price, U256::ZERO)
                .await;
            debug!("⛽ legacy fees chain {}: gas price {}", network.chain_id, gas_price);
            return Ok(SuggestedFees {
                chain_id: network.chain_id,
                gas_price,
                eip1559_enabled: false,
                non_eip1559_fees: Some(NonEip1559Fees { gas_price, estimated_time }),
                estimated_time_low: estimated_time,
                estimated_time_medium: estimated_time,
                estimated_time_high: estimated_time,
                ..Default::default()
            });
        }

        let history = self.fee_history(network.chain_id).await?;
        let mut fees = suggest_from_history(network.chain_id, &history)?;
        fees.gas_price = gas_price;

        let levels = fees.max_fees_levels.clone();
        fees.estimated_time_low =
            estimated_time::estimated_time_secs(&history, network.block_time_secs, levels.low, levels.low_priority);
        fees.estimated_time_medium = estimated_time::estimated_time_secs(
            &history,
            network.block_time_secs,
            levels.medium,
            levels.medium_priority,
        );
        fees.estimated_time_high =
            estimated_time::estimated_time_secs(&history, network.block_time_secs, levels.high, levels.high_priority);

        debug!(
            "⛽ EIP-1559 fees chain {}: base {} / normal {} (priority {})",
            network.chain_id, fees.base_fee, levels.medium, levels.medium_priority
        );
        Ok(fees)
    }

    /// Seconds until inclusion for the given max fee and priority fee, 0 when unknown.
    pub async fn transaction_estimated_time_v2(&self, network: &Network, max_fee: U256, priority_fee: U256) -> u64 {
        match self.fee_history(network.chain_id).await {
            Ok(history) => {
                estimated_time::estimated_time_secs(&history, network.block_time_secs, max_fee, priority_fee)
            }
            Err(e) => {
                warn!("⚠️ 예상 시간 계산 실패 (chain {}): {}", network.chain_id, e);
                0
            }
        }
    }
}

/// Derive EIP-1559 suggestions from one fee-history sample.
pub fn suggest_from_history(chain_id: ChainId, history: &FeeHistory) -> Result<SuggestedFees, FeeError> {
    let base_fee = *history
        .base_fee_per_gas
        .last()
        .ok_or(FeeError::EmptyFeeHistory(chain_id))?;

    let column = |idx: usize| -> Vec<U256> {
        history.reward.iter().filter_map(|row| row.get(idx).copied()).collect()
    };
    let p10 = median(convert_to_sorted(&column(0)));
    let p50 = median(convert_to_sorted(&column(1)));
    let p90 = median(convert_to_sorted(&column(2)));

    let max_fees_levels = MaxFeesLevels {
        low: base_fee + p10,
        low_priority: p10,
        medium: base_fee * U256::from(2) + p50,
        medium_priority: p50,
        high: base_fee * U256::from(3) + p90,
        high_priority: p90,
    };

    Ok(SuggestedFees {
        chain_id,
        base_fee,
        eip1559_enabled: true,
        max_fees_levels,
        priority_fee_bounds: PriorityFeeBounds { lower: p10, upper: p90 },
        ..Default::default()
    })
}

fn median(sorted: Vec<U256>) -> U256 {
    if sorted.is_empty() {
        return U256::ZERO;
    }
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gwei(v: u64) -> U256 {
        U256::from(v) * U256::from(1_000_000_000u64)
    }

    fn sample_history() -> FeeHistory {
        FeeHistory {
            oldest_block: 100,
            base_fee_per_gas: vec![gwei(10), gwei(12), gwei(11), gwei(20)],
            gas_used_ratio: vec![0.5, 0.6, 0.4],
            reward: vec![
                vec![gwei(1), gwei(2), gwei(5)],
                vec![gwei(1), gwei(3), gwei(6)],
                vec![gwei(2), gwei(2), gwei(4)],
            ],
        }
    }

    #[test]
    fn test_suggest_from_history_levels() {
        let fees = suggest_from_history(1, &sample_history()).unwrap();
        assert_eq!(fees.base_fee, gwei(20));
        assert_eq!(fees.priority_fee_bounds.lower, gwei(1));
        assert_eq!(fees.priority_fee_bounds.upper, gwei(5));
        assert_eq!(fees.max_fees_levels.low, gwei(21));
        assert_eq!(fees.max_fees_levels.medium, gwei(42));
        assert_eq!(fees.max_fees_levels.high, gwei(65));
    }

    #[test]
    fn test_empty_history_is_error() {
        let err = suggest_from_history(5, &FeeHistory::default()).unwrap_err();
        assert_eq!(err, FeeError::EmptyFeeHistory(5));
    }

    #[test]
    fn test_fee_for_modes() {
        let mut fees = suggest_from_history(1, &sample_history()).unwrap();
        fees.estimated_time_high = 15;
        let (params, time) = fees.fee_for(GasFeeMode::Fast).unwrap();
        assert_eq!(params.fee_per_gas(), gwei(65));
        assert_eq!(time, 15);
        assert!(fees.fee_for(GasFeeMode::Custom).is_err());

        let legacy = SuggestedFees {
            gas_price: gwei(3),
            non_eip1559_fees: Some(NonEip1559Fees { gas_price: gwei(3), estimated_time: 30 }),
            ..Default::default()
        };
        let (params, time) = legacy.fee_for(GasFeeMode::Slow).unwrap();
        assert_eq!(params, TxFeeParams::Legacy { gas_price: gwei(3) });
        assert_eq!(time, 30);
    }
}
