//! Candidate legs, route combinations, amount assignment and fiat ranking.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::annotate::rollup_fees;
use super::errors::RouterError;
use super::routes::{Path, Route};
use super::Router;
use crate::blockchain::{abi, erc20_allowance, CallMsg};
use crate::constants::MAX_ROUTE_DEPTH;
use crate::oracle::MAX_PRICE_AGE;
use crate::pathprocessor::{increase_estimated_gas, PathProcessor, ProcessorInputParams};
use crate::types::{ChainId, GasFeeMode, Network, RouteInputParams, SendType, Token};

/// Quoted legs of one cycle plus the from-token balance seen per chain.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub paths: Vec<Path>,
    pub balances: HashMap<ChainId, U256>,
}

impl Router {
    /// Every (from, to, processor) triple the processors accept, quoted at the full amount.
    pub(super) async fn resolve_candidates(
        &self,
        params: &RouteInputParams,
        cancel: &CancellationToken,
    ) -> Result<Candidates, RouterError> {
        let mut candidates = Candidates::default();
        let mut last_error: Option<RouterError> = None;
        let mut processors: Vec<&Arc<dyn PathProcessor>> = self.processors.values().collect();
        processors.sort_by_key(|p| p.name());

        for from_network in &self.networks {
            if params.disabled_from_chain_ids.contains(&from_network.chain_id) {
                continue;
            }
            let Some(from_token) = self.find_from_token(params, from_network) else {
                debug!("token {} not on chain {}", params.token_id, from_network.chain_id);
                continue;
            };

            let balance = match self.from_token_balance(params, from_network, &from_token).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!("⚠️ balance lookup failed on chain {}: {}", from_network.chain_id, e);
                    last_error = Some(e);
                    continue;
                }
            };
            if balance.is_zero() {
                continue;
            }

            for to_network in &self.networks {
                if params.disabled_to_chain_ids.contains(&to_network.chain_id) {
                    continue;
                }
                let to_token = match params.send_type {
                    SendType::Swap => {
                        let Some(to_id) = params.to_token_id.as_deref() else {
                            return Err(RouterError::MissingToToken);
                        };
                        match self.tokens.find_token(to_network, to_id) {
                            Some(token) => Some(token),
                            None => continue,
                        }
                    }
                    _ => None,
                };

                for processor in &processors {
                    if cancel.is_cancelled() {
                        return Err(RouterError::Cancelled);
                    }
                    if !params.send_type.can_use_processor(processor.name()) {
                        continue;
                    }
                    let input = processor_input(params, from_network, to_network, &from_token, to_token.clone(), params.amount_in);
                    match processor.available_for(&input).await {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            debug!("{} not available {} -> {}: {}", processor.name(), from_network.chain_id, to_network.chain_id, e);
                            last_error = Some(e.into());
                            continue;
                        }
                    }

                    match self.quote_path(*processor, &input, params).await {
                        Ok(path) => {
                            debug!(
                                "🧭 candidate {} {} -> {} out {}",
                                path.processor_name, from_network.chain_id, to_network.chain_id, path.amount_out
                            );
                            candidates.paths.push(path);
                            candidates.balances.insert(from_network.chain_id, balance);
                        }
                        Err(e) => {
                            warn!("⚠️ {} quote failed: {}", processor.name(), e);
                            last_error = Some(e);
                        }
                    }
                }
            }
        }

        if candidates.paths.is_empty() {
            return Err(last_error.unwrap_or(RouterError::NoCandidates));
        }
        Ok(candidates)
    }

    fn find_from_token(&self, params: &RouteInputParams, network: &Network) -> Option<Token> {
        if params.send_type.is_collectibles_transfer() {
            self.tokens.find_collectible(network, &params.token_id)
        } else {
            self.tokens.find_token(network, &params.token_id)
        }
    }

    async fn from_token_balance(
        &self,
        params: &RouteInputParams,
        network: &Network,
        token: &Token,
    ) -> Result<U256, RouterError> {
        if let Some(test) = &params.test_params {
            return Ok(test.balances.get(&network.chain_id).copied().unwrap_or_default());
        }
        let balance = if params.send_type == SendType::Erc1155Transfer {
            self.oracle.erc1155_balance(network.chain_id, token, params.addr_from).await?
        } else {
            self.oracle.balance(network.chain_id, token, params.addr_from).await?
        };
        Ok(balance)
    }

    /// Price, pack and estimate one leg at `input.amount_in`.
    pub(super) async fn quote_path(
        &self,
        processor: &Arc<dyn PathProcessor>,
        input: &ProcessorInputParams,
        params: &RouteInputParams,
    ) -> Result<Path, RouterError> {
        let from_chain = input.from_chain()?.clone();
        let from_token = input.from_token()?.clone();

        let contract = processor.get_contract_address(input).await?;
        let (bonder_fee, token_fee) = processor.calculate_fees(input).await?;
        let amount_out = processor.calculate_amount_out(input).await?;
        let (approval_required, approval_amount) = self.require_approval(params.send_type, contract, input).await?;

        let mut approval_packed_data = Default::default();
        let mut approval_gas = 0;
        if approval_required {
            approval_packed_data = abi::encode_erc20_approve(contract, approval_amount);
            approval_gas = match &params.test_params {
                Some(test) => test.approval_gas_estimation,
                None => {
                    let client = self.provider.eth_client(from_chain.chain_id)?;
                    let estimate = client
                        .estimate_gas(CallMsg {
                            from: input.from_addr,
                            to: Some(from_token.address),
                            value: U256::ZERO,
                            data: approval_packed_data.clone(),
                        })
                        .await?;
                    increase_estimated_gas(estimate)
                }
            };
        }

        let packed = processor.pack_tx_input_data(input).await?;
        let gas = processor.estimate_gas(input, &packed).await?;

        let tx_to = if contract != Address::ZERO {
            contract
        } else if from_token.is_native() {
            input.to_addr
        } else {
            from_token.address
        };

        let mut path = Path {
            processor_name: processor.name().to_string(),
            from_address: input.from_addr,
            to_address: input.to_addr,
            from_chain: from_chain.clone(),
            to_chain: input.to_chain()?.clone(),
            from_token: from_token.clone(),
            to_token: input.to_token.clone(),
            amount_in: input.amount_in,
            quoted_amount_in: input.amount_in,
            amount_out,
            suggested_tx_gas_amount: gas,
            suggested_approval_gas_amount: approval_gas,
            tx_to,
            tx_value: if from_token.is_native() { input.amount_in } else { U256::ZERO },
            tx_bonder_fees: bonder_fee,
            tx_token_fees: token_fee,
            tx_packed_data: packed,
            approval_required,
            approval_amount_required: approval_amount,
            approval_contract_address: contract,
            approval_packed_data,
            ..Default::default()
        };
        self.preliminary_fees(&mut path, params.gas_fee_mode).await?;
        Ok(path)
    }

    /// Rough fees under the requested preset, used only to rank routes.
    async fn preliminary_fees(&self, path: &mut Path, mode: GasFeeMode) -> Result<(), RouterError> {
        let fees = self.fees.suggested_fees(&path.from_chain).await?;
        let (fee, _) = fees.fee_for(mode).or_else(|_| fees.fee_for(GasFeeMode::Normal))?;
        path.tx_gas_amount = path.suggested_tx_gas_amount;
        path.approval_gas_amount = path.suggested_approval_gas_amount;
        path.tx_fee_params = Some(fee);
        path.approval_fee_params = path.approval_required.then_some(fee);
        rollup_fees(path, U256::ZERO, U256::ZERO);
        Ok(())
    }

    /// ERC20 legs need an approval when the spender's allowance is short.
    async fn require_approval(
        &self,
        send_type: SendType,
        spender: Address,
        input: &ProcessorInputParams,
    ) -> Result<(bool, U256), RouterError> {
        if send_type.is_collectibles_transfer() || send_type.is_ens_transfer() {
            return Ok((false, U256::ZERO));
        }
        let token = input.from_token()?;
        if token.is_native() || spender == Address::ZERO {
            return Ok((false, U256::ZERO));
        }
        if input.tests_mode {
            return Ok((true, input.amount_in));
        }
        let client = self.provider.eth_client(input.from_chain()?.chain_id)?;
        let allowance = erc20_allowance(client.as_ref(), token.address, input.from_addr, spender).await?;
        if allowance >= input.amount_in {
            return Ok((false, U256::ZERO));
        }
        Ok((true, input.amount_in))
    }

    /// Re-quote every leg whose assigned amount differs from its quote.
    pub(super) async fn requote_changed_paths(&self, route: &Route, params: &RouteInputParams) -> Result<Route, RouterError> {
        let mut requoted = Vec::with_capacity(route.len());
        for path in route {
            if path.amount_in == path.quoted_amount_in {
                requoted.push(path.clone());
                continue;
            }
            let processor = self
                .processors
                .get(path.processor_name.as_str())
                .ok_or_else(|| RouterError::PathNotFound(path.processor_name.clone()))?;
            let input = processor_input(
                params,
                &path.from_chain,
                &path.to_chain,
                &path.from_token,
                path.to_token.clone(),
                path.amount_in,
            );
            debug!("🔁 re-quoting {} on chain {} for {}", path.processor_name, path.from_chain.chain_id, path.amount_in);
            let mut fresh = self.quote_path(processor, &input, params).await?;
            fresh.amount_in_locked = path.amount_in_locked;
            requoted.push(fresh);
        }
        Ok(requoted)
    }

    /// USD price per symbol needed to rank `routes`.
    pub(super) async fn fetch_prices(&self, params: &RouteInputParams, routes: &[Route]) -> Result<HashMap<String, f64>, RouterError> {
        let mut symbols: Vec<String> = routes
            .iter()
            .flatten()
            .flat_map(|p| [p.from_chain.native_currency_symbol.clone(), p.from_token.symbol.clone()])
            .collect();
        symbols.sort();
        symbols.dedup();

        let collectibles = params.send_type.is_collectibles_transfer();
        let mut prices = HashMap::new();
        for symbol in symbols {
            let is_collectible = collectibles && routes.iter().flatten().any(|p| p.from_token.symbol == symbol);
            let price = if is_collectible {
                0.0
            } else if let Some(test) = &params.test_params {
                test.token_prices.get(&symbol).copied().unwrap_or_default()
            } else {
                self.oracle.price(&symbol, MAX_PRICE_AGE).await?
            };
            prices.insert(symbol, price);
        }
        Ok(prices)
    }
}

pub(super) fn processor_input(
    params: &RouteInputParams,
    from_network: &Network,
    to_network: &Network,
    from_token: &Token,
    to_token: Option<Token>,
    amount_in: U256,
) -> ProcessorInputParams {
    let test = params.test_params.as_ref();
    ProcessorInputParams {
        from_chain: Some(from_network.clone()),
        to_chain: Some(to_network.clone()),
        from_token: Some(from_token.clone()),
        to_token,
        from_addr: params.addr_from,
        to_addr: params.addr_to,
        amount_in,
        amount_out: params.amount_out,
        slippage_percentage: params.slippage_percentage,
        username: params.username.clone(),
        public_key: params.public_key.clone(),
        tests_mode: params.tests_mode(),
        test_estimation_map: test.map(|t| t.estimation_map.clone()).unwrap_or_default(),
        test_bonder_fee_map: test.map(|t| t.bonder_fee_map.clone()).unwrap_or_default(),
    }
}

fn max_depth(send_type: SendType) -> usize {
    match send_type {
        SendType::Transfer | SendType::Bridge => MAX_ROUTE_DEPTH,
        _ => 1,
    }
}

/// Combinations of candidates with distinct origin chains, one leg per
/// chain, amounts assigned per route.
pub fn build_routes(candidates: &Candidates, params: &RouteInputParams) -> Vec<Route> {
    let mut by_chain: BTreeMap<ChainId, Vec<&Path>> = BTreeMap::new();
    for path in &candidates.paths {
        by_chain.entry(path.from_chain.chain_id).or_default().push(path);
    }
    let groups: Vec<Vec<&Path>> = by_chain.into_values().collect();
    let depth = max_depth(params.send_type).min(groups.len());

    let mut combos: Vec<Vec<&Path>> = Vec::new();
    let mut current: Vec<&Path> = Vec::new();
    collect_combinations(&groups, 0, depth, &mut current, &mut combos);

    combos
        .into_iter()
        .filter_map(|combo| assign_amounts(&combo, params, &candidates.balances))
        .collect()
}

fn collect_combinations<'a>(
    groups: &[Vec<&'a Path>],
    start: usize,
    depth: usize,
    current: &mut Vec<&'a Path>,
    out: &mut Vec<Vec<&'a Path>>,
) {
    if !current.is_empty() {
        out.push(current.clone());
    }
    if current.len() == depth {
        return;
    }
    for (i, group) in groups.iter().enumerate().skip(start) {
        for path in group {
            current.push(path);
            collect_combinations(groups, i + 1, depth, current, out);
            current.pop();
        }
    }
}

/// Locked chains take their locked amount; the rest goes greedily to the
/// cheapest legs up to each chain's balance. Legs left at zero void the route.
pub fn assign_amounts(combo: &[&Path], params: &RouteInputParams, balances: &HashMap<ChainId, U256>) -> Option<Route> {
    let mut route: Route = combo.iter().map(|p| (*p).clone()).collect();
    let mut remaining = params.amount_in;

    for path in route.iter_mut() {
        if let Some(locked) = params.from_locked_amount.get(&path.from_chain.chain_id) {
            if locked.is_zero() {
                return None;
            }
            path.amount_in = *locked;
            path.amount_in_locked = true;
            remaining = remaining.checked_sub(*locked)?;
        }
    }

    let mut order: Vec<usize> = (0..route.len()).filter(|i| !route[*i].amount_in_locked).collect();
    order.sort_by_key(|i| route[*i].tx_total_fee);
    for i in order {
        let balance = balances.get(&route[i].from_chain.chain_id).copied().unwrap_or_default();
        let give = remaining.min(balance);
        route[i].amount_in = give;
        remaining -= give;
    }

    if route.iter().any(|p| p.amount_in.is_zero()) {
        return None;
    }
    for path in route.iter_mut() {
        scale_quote(path);
    }
    Some(route)
}

/// Scale amount-dependent quote outputs to the assigned amount.
fn scale_quote(path: &mut Path) {
    let quoted = path.quoted_amount_in;
    if quoted.is_zero() || quoted == path.amount_in {
        return;
    }
    let scale = |v: U256| v.saturating_mul(path.amount_in) / quoted;
    path.amount_out = scale(path.amount_out);
    path.tx_bonder_fees = scale(path.tx_bonder_fees);
    path.tx_token_fees = scale(path.tx_token_fees);
    if path.from_token.is_native() {
        path.tx_value = path.amount_in;
    }
    if path.approval_required {
        path.approval_amount_required = path.amount_in;
    }
}

/// Integer amount with `decimals` as a decimal, saturating at `Decimal::MAX`.
pub fn to_decimal(value: U256, decimals: u8) -> Decimal {
    if value > U256::from(i128::MAX as u128) {
        return Decimal::MAX;
    }
    let raw = value.to::<u128>() as i128;
    Decimal::try_from_i128_with_scale(raw, u32::from(decimals.min(28))).unwrap_or(Decimal::MAX)
}

/// Fees in fiat: native fees at the native price, bridge fees at the token price.
pub fn route_fiat_cost(route: &Route, prices: &HashMap<String, f64>) -> Decimal {
    let price_of = |symbol: &str| {
        prices
            .get(symbol)
            .and_then(|p| Decimal::from_f64_retain(*p))
            .unwrap_or_default()
    };
    route.iter().fold(Decimal::ZERO, |acc, path| {
        // 비정상적으로 큰 수수료는 Decimal::MAX 로 포화, 맨 뒤로 정렬됨
        let native = to_decimal(path.tx_total_fee, path.from_chain.native_currency_decimals)
            .checked_mul(price_of(&path.from_chain.native_currency_symbol))
            .unwrap_or(Decimal::MAX);
        let token = to_decimal(path.tx_bonder_fees.saturating_add(path.tx_token_fees), path.from_token.decimals)
            .checked_mul(price_of(&path.from_token.symbol))
            .unwrap_or(Decimal::MAX);
        acc.saturating_add(native.saturating_add(token))
    })
}
