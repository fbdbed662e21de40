use alloy::primitives::U256;

use crate::blockchain::FeeHistory;
use crate::constants::INCLUSION_BUFFER_SECS;

/// 다음 블록 포함으로 보는 최소 커버리지 (7/10)
const NEXT_BLOCK_COVERAGE: (u64, u64) = (7, 10);
/// 이 미만이면 예측 불가 (1/10)
const MIN_COVERAGE: (u64, u64) = (1, 10);

pub fn convert_to_sorted(values: &[U256]) -> Vec<U256> {
    let mut sorted = values.to_vec();
    sorted.sort();
    sorted
}

pub fn remove_duplicates_from_sorted(mut sorted: Vec<U256>) -> Vec<U256> {
    sorted.dedup();
    sorted
}

/// Expected wait in seconds before inclusion, without the inclusion buffer.
///
/// coverage = 과거 base fee 중 (max_fee - priority_fee) 이하인 비율.
/// - coverage >= 0.7 이면 다음 블록
/// - 그 외에는 block_time / coverage (올림)
/// - priority fee 가 샘플된 최저 reward 보다 낮으면 대기 시간 2배, 다음 블록 판정 없음
pub fn expected_wait_secs(
    history: &FeeHistory,
    block_time_secs: u64,
    max_fee: U256,
    priority_fee: U256,
) -> Option<u64> {
    if history.base_fee_per_gas.is_empty() {
        return None;
    }
    let effective_base = max_fee.saturating_sub(priority_fee);
    let base_fees = convert_to_sorted(&history.base_fee_per_gas);
    let total = base_fees.len() as u64;
    let covered = base_fees.iter().take_while(|fee| **fee <= effective_base).count() as u64;

    if covered == 0 || covered * MIN_COVERAGE.1 < total * MIN_COVERAGE.0 {
        return None;
    }

    let rewards: Vec<U256> = history.reward.iter().flatten().copied().collect();
    let unique_rewards = remove_duplicates_from_sorted(convert_to_sorted(&rewards));
    let underpriced = unique_rewards
        .iter()
        .find(|r| !r.is_zero())
        .is_some_and(|lowest| priority_fee < *lowest);

    if !underpriced && covered * NEXT_BLOCK_COVERAGE.1 >= total * NEXT_BLOCK_COVERAGE.0 {
        return Some(block_time_secs);
    }

    let penalty = if underpriced { 2 } else { 1 };
    let numerator = block_time_secs * total * penalty;
    Some(numerator.div_ceil(covered))
}

/// Seconds until inclusion, 0 = unknown.
pub fn estimated_time_secs(history: &FeeHistory, block_time_secs: u64, max_fee: U256, priority_fee: U256) -> u64 {
    match expected_wait_secs(history, block_time_secs, max_fee, priority_fee) {
        Some(wait) => wait + INCLUSION_BUFFER_SECS,
        None => 0,
    }
}
