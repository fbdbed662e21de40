//! Route discovery, selection and fee/nonce annotation.
//!
//! One routing cycle quotes every candidate leg, combines legs into routes
//! whose amounts add up to the request, ranks them by fiat fee cost and
//! annotates the winner with nonces and fee parameters. The winner is kept
//! as the best route until the next cycle replaces it.

pub mod annotate;
pub mod candidates;
pub mod errors;
pub mod filter;
pub mod routes;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use alloy::primitives::U256;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::ChainClientProvider;
use crate::common::{spawn_supervised, TaskOutcome};
use crate::constants::DEFAULT_REFRESH_INTERVAL_SECS;
use crate::events::{EventSink, WalletEvent};
use crate::fees::FeeManager;
use crate::oracle::{TokenOracle, TokenRegistry};
use crate::pathprocessor::ProcessorRegistry;
use crate::types::{ChainId, GasFeeMode, Network, PathTxCustomParams, PathTxIdentity, RouteInputParams};

use annotate::Annotator;
use candidates::{build_routes, route_fiat_cost, Candidates};

pub use errors::RouterError;
pub use filter::{calculate_rest_amount_in, filter_routes, is_valid_for_network_compliance};
pub use routes::{first_path_chains, route_amount_in, route_amount_out, Path, Route};

/// Result of one routing cycle.
#[derive(Debug, Clone, Default)]
pub struct SuggestedRoutes {
    pub uuid: String,
    pub best: Route,
    pub candidates: Vec<Path>,
    pub amount_in: U256,
    pub amount_out: U256,
}

#[derive(Default)]
struct RouterState {
    best_route: Route,
    candidates: Vec<Path>,
    last_input_params: Option<RouteInputParams>,
}

pub struct Router {
    provider: Arc<dyn ChainClientProvider>,
    fees: Arc<FeeManager>,
    processors: ProcessorRegistry,
    oracle: Arc<dyn TokenOracle>,
    tokens: TokenRegistry,
    networks: Vec<Network>,
    events: Arc<dyn EventSink>,
    refresh_interval: Duration,
    state: Mutex<RouterState>,
    async_calculation: StdMutex<Option<CancellationToken>>,
}

impl Router {
    pub fn new(
        provider: Arc<dyn ChainClientProvider>,
        processors: ProcessorRegistry,
        oracle: Arc<dyn TokenOracle>,
        tokens: TokenRegistry,
        networks: Vec<Network>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            fees: Arc::new(FeeManager::new(provider.clone())),
            provider,
            processors,
            oracle,
            tokens,
            networks,
            events,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            state: Mutex::new(RouterState::default()),
            async_calculation: StdMutex::new(None),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn get_path_processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn fee_manager(&self) -> &Arc<FeeManager> {
        &self.fees
    }

    pub async fn get_best_route_and_input_params(&self) -> (Route, Option<RouteInputParams>) {
        let state = self.state.lock().await;
        (state.best_route.clone(), state.last_input_params.clone())
    }

    /// Run one routing cycle to completion.
    pub async fn suggested_routes(&self, params: RouteInputParams) -> Result<SuggestedRoutes, RouterError> {
        self.compute(params, &CancellationToken::new()).await
    }

    /// Cancel any running cycle, start a new one in the background and keep
    /// refreshing its fees until stopped.
    pub fn suggested_routes_async(self: &Arc<Self>, params: RouteInputParams) -> JoinHandle<TaskOutcome<()>> {
        let token = self.restart_async_calculation();
        let router = Arc::clone(self);
        spawn_supervised("suggested-routes", async move {
            let uuid = params.uuid.clone();
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("route calculation {} cancelled", uuid);
                    return;
                }
                result = router.compute(params, &token) => result,
            };

            match result {
                Ok(suggested) => {
                    router.publish_suggested(&suggested, None, false).await;
                    router.refresh_loop(&uuid, &token).await;
                }
                Err(RouterError::Cancelled) => debug!("route calculation {} cancelled", uuid),
                Err(e) => {
                    warn!("⚠️ route calculation {} failed: {}", uuid, e);
                    let failed = SuggestedRoutes { uuid, ..Default::default() };
                    router.publish_suggested(&failed, Some(&e), false).await;
                }
            }
        })
    }

    pub fn stop_suggested_routes_async_calculation(&self) {
        let mut guard = self.async_calculation.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = guard.take() {
            debug!("🛑 stopping async route calculation");
            token.cancel();
        }
    }

    fn restart_async_calculation(&self) -> CancellationToken {
        let mut guard = self.async_calculation.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = guard.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        token
    }

    async fn refresh_loop(&self, uuid: &str, token: &CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("fee refresh for {} stopped", uuid);
                    return;
                }
                _ = tokio::time::sleep(self.refresh_interval) => {}
            }
            match self.refresh_fees(uuid).await {
                Ok(suggested) => self.publish_suggested(&suggested, None, true).await,
                Err(RouterError::RouteUuidMismatch(_)) => return,
                Err(e) => warn!("⚠️ fee refresh for {} failed: {}", uuid, e),
            }
        }
    }

    async fn publish_suggested(&self, suggested: &SuggestedRoutes, error: Option<&RouterError>, updated: bool) {
        self.events
            .publish(WalletEvent::SuggestedRoutes {
                uuid: suggested.uuid.clone(),
                best: suggested.best.clone(),
                candidates: suggested.candidates.clone(),
                error: error.map(|e| e.to_response()),
                updated,
            })
            .await;
    }

    fn validate_input(params: &RouteInputParams) -> Result<(), RouterError> {
        if params.amount_in.is_zero() {
            return Err(RouterError::ZeroAmountIn);
        }
        if params.send_type == crate::types::SendType::Swap && params.to_token_id.is_none() {
            return Err(RouterError::MissingToToken);
        }
        let locked = params.from_locked_amount.values().fold(U256::ZERO, |acc, v| acc.saturating_add(*v));
        if locked > params.amount_in {
            return Err(RouterError::LockedAmountExceedsTotal);
        }
        Ok(())
    }

    async fn compute(&self, params: RouteInputParams, cancel: &CancellationToken) -> Result<SuggestedRoutes, RouterError> {
        Self::validate_input(&params)?;
        info!(
            "🧭 routing {} {} {} (type {:?})",
            params.uuid, params.amount_in, params.token_id, params.send_type
        );

        for processor in self.processors.values() {
            processor.clear();
        }
        self.fees.clear_cache();

        let candidates = self.resolve_candidates(&params, cancel).await?;
        let (included, excluded) = params.included_excluded_chains();
        let routes: Vec<Route> = filter_routes(build_routes(&candidates, &params), params.amount_in)
            .into_iter()
            .filter(|route| is_valid_for_network_compliance(route, Some(&included), Some(&excluded)))
            .collect();
        if routes.is_empty() {
            return Err(RouterError::NoBestRouteFound);
        }

        let prices = self.fetch_prices(&params, &routes).await?;
        let mut ranked: Vec<(rust_decimal::Decimal, Route)> =
            routes.into_iter().map(|r| (route_fiat_cost(&r, &prices), r)).collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        let mut last_error = RouterError::NoBestRouteFound;
        let mut best: Option<Route> = None;
        for (cost, route) in ranked {
            if cancel.is_cancelled() {
                return Err(RouterError::Cancelled);
            }
            match self.finalize_route(&route, &params, &candidates).await {
                Ok(annotated) => {
                    debug!("🏆 best route cost {} USD over {} legs", cost, annotated.len());
                    best = Some(annotated);
                    break;
                }
                Err(e) => {
                    debug!("route rejected: {}", e);
                    last_error = e;
                }
            }
        }
        let best = best.ok_or(last_error)?;

        let suggested = SuggestedRoutes {
            uuid: params.uuid.clone(),
            amount_in: route_amount_in(&best),
            amount_out: route_amount_out(&best),
            best: best.clone(),
            candidates: candidates.paths.clone(),
        };

        let mut state = self.state.lock().await;
        state.best_route = best;
        state.candidates = candidates.paths;
        state.last_input_params = Some(params);
        Ok(suggested)
    }

    async fn finalize_route(&self, route: &Route, params: &RouteInputParams, candidates: &Candidates) -> Result<Route, RouterError> {
        let requoted = self.requote_changed_paths(route, params).await?;
        let annotator = Annotator { fees: &self.fees, provider: &self.provider, params };
        let annotated = annotator.annotate_route(&requoted).await?;
        self.check_balances(&annotated, params, &candidates.balances).await?;
        Ok(annotated)
    }

    /// Per chain, the summed requirements of all legs must fit the balances.
    async fn check_balances(
        &self,
        route: &Route,
        params: &RouteInputParams,
        token_balances: &HashMap<ChainId, U256>,
    ) -> Result<(), RouterError> {
        if params.tests_mode() {
            return Ok(());
        }
        let mut required: HashMap<ChainId, (U256, U256, &Network)> = HashMap::new();
        for path in route {
            let entry = required
                .entry(path.from_chain.chain_id)
                .or_insert((U256::ZERO, U256::ZERO, &path.from_chain));
            entry.0 += path.required_token_balance;
            entry.1 += path.required_native_balance;
        }

        for (chain_id, (token_required, native_required, network)) in required {
            let token_balance = token_balances.get(&chain_id).copied().unwrap_or_default();
            if token_required > token_balance {
                return Err(RouterError::NotEnoughTokenBalance { chain_id, required: token_required });
            }
            let native = self
                .tokens
                .find_token(network, &network.native_currency_symbol)
                .ok_or_else(|| RouterError::TokenNotFound(network.native_currency_symbol.clone()))?;
            let native_balance = self.oracle.balance(chain_id, &native, params.addr_from).await?;
            if native_required > native_balance {
                return Err(RouterError::NotEnoughNativeBalance { chain_id, required: native_required });
            }
        }
        Ok(())
    }

    /// Re-annotate the best route with fresh fee data.
    pub async fn refresh_fees(&self, uuid: &str) -> Result<SuggestedRoutes, RouterError> {
        self.fees.clear_cache();
        let (route, params) = self.current_route(uuid).await?;
        self.reannotate(route, params).await
    }

    /// Store caller fee overrides for one leg and re-annotate the route.
    pub async fn set_custom_tx_details(
        &self,
        identity: &PathTxIdentity,
        custom: PathTxCustomParams,
    ) -> Result<SuggestedRoutes, RouterError> {
        let key = identity.tx_identity_key();
        if custom.gas_fee_mode == GasFeeMode::Custom && custom.gas_amount == 0 {
            return Err(RouterError::InvalidCustomParams(key));
        }
        let (route, mut params) = self.current_route(&identity.route_uuid).await?;
        if !route.iter().any(|p| p.tx_identity_key(identity.is_approval_tx) == key) {
            return Err(RouterError::PathNotFound(key));
        }
        params.path_tx_custom_params.insert(key, custom);
        self.reannotate(route, params).await
    }

    /// Re-annotate after the leg with `identity_key` changed.
    pub async fn reevaluate_router_path(&self, uuid: &str, identity_key: &str) -> Result<SuggestedRoutes, RouterError> {
        let (route, params) = self.current_route(uuid).await?;
        let found = route
            .iter()
            .any(|p| p.tx_identity_key(false) == identity_key || p.tx_identity_key(true) == identity_key);
        if !found {
            return Err(RouterError::PathNotFound(identity_key.to_string()));
        }
        self.reannotate(route, params).await
    }

    async fn current_route(&self, uuid: &str) -> Result<(Route, RouteInputParams), RouterError> {
        let state = self.state.lock().await;
        let params = state.last_input_params.clone().ok_or(RouterError::NoRouteInputParams)?;
        if params.uuid != uuid {
            return Err(RouterError::RouteUuidMismatch(uuid.to_string()));
        }
        Ok((state.best_route.clone(), params))
    }

    /// Annotate a copy; commit only if the route was not replaced meanwhile.
    async fn reannotate(&self, route: Route, params: RouteInputParams) -> Result<SuggestedRoutes, RouterError> {
        let annotator = Annotator { fees: &self.fees, provider: &self.provider, params: &params };
        let annotated = annotator.annotate_route(&route).await?;

        let mut state = self.state.lock().await;
        let current_uuid = state.last_input_params.as_ref().map(|p| p.uuid.clone()).unwrap_or_default();
        if current_uuid != params.uuid {
            return Err(RouterError::RouteUuidMismatch(params.uuid));
        }
        state.best_route = annotated.clone();
        let suggested = SuggestedRoutes {
            uuid: params.uuid.clone(),
            amount_in: route_amount_in(&annotated),
            amount_out: route_amount_out(&annotated),
            best: annotated,
            candidates: state.candidates.clone(),
        };
        state.last_input_params = Some(params);
        Ok(suggested)
    }
}
