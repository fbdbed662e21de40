//! Build → sign → send → persist workflow for the router's best route.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::signers::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::common::{spawn_supervised, TaskOutcome};
use crate::constants::{DEFAULT_USER_RESPONSE_TIMEOUT_SECS, PROCESSOR_SWAP_PARASWAP_NAME};
use crate::events::{EventSink, WalletEvent};
use crate::router::{first_path_chains, Router, RouterError};
use crate::storage::{RouteData, RouteStore};
use crate::transactions::{
    MultiTransaction, SentTransaction, SigningDetails, TransactionError, TransactionManager, TransactionSigner,
};
use crate::types::{ErrorResponse, PathTxIdentity, RouteInputParams, SendType};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("cannot resolve route id {0}")]
    CannotResolveRouteId(String),

    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: ExecutionState, to: ExecutionState },

    #[error("timed out waiting for user response")]
    TimedOutWaitingForUser,

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::CannotResolveRouteId(_) => "WRE-001",
            ExecutionError::InvalidTransition { .. } => "WRE-002",
            ExecutionError::TimedOutWaitingForUser => "WRE-003",
            ExecutionError::Router(e) => e.code(),
            ExecutionError::Transaction(e) => e.code(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.code(), self.to_string())
    }
}

/// 실행 상태 머신
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    BuildingForSigning,
    AwaitingSignatures,
    Sending,
    Completed,
    Failed,
    /// swap approval is on chain, the swap itself is not
    AwaitingSecondLeg,
}

impl ExecutionState {
    pub fn can_transition(self, to: ExecutionState) -> bool {
        use ExecutionState::*;
        match (self, to) {
            (BuildingForSigning | Sending, BuildingForSigning) => false,
            (_, BuildingForSigning) => true,
            (BuildingForSigning, AwaitingSignatures | Failed) => true,
            (AwaitingSignatures, Sending | Failed) => true,
            (Sending, Completed | Failed | AwaitingSecondLeg) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed | ExecutionState::AwaitingSecondLeg)
    }
}

/// Local data is kept only for a swap whose approval went out but whose
/// swap tx did not, so the next attempt skips the approval.
pub fn retains_local_data(send_type: SendType, approval_required: bool, approval_placed: bool, tx_placed: bool) -> bool {
    send_type == SendType::Swap && approval_required && approval_placed && !tx_placed
}

pub struct RouteExecutionManager {
    router: Arc<Router>,
    transactions: Arc<TransactionManager>,
    store: Arc<dyn RouteStore>,
    events: Arc<dyn EventSink>,
    state: Mutex<ExecutionState>,
    user_response_timeout: Duration,
}

impl RouteExecutionManager {
    pub fn new(
        router: Arc<Router>,
        transactions: Arc<TransactionManager>,
        store: Arc<dyn RouteStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            router,
            transactions,
            store,
            events,
            state: Mutex::new(ExecutionState::Idle),
            user_response_timeout: Duration::from_secs(DEFAULT_USER_RESPONSE_TIMEOUT_SECS),
        }
    }

    pub fn with_user_response_timeout(mut self, timeout: Duration) -> Self {
        self.user_response_timeout = timeout;
        self
    }

    pub async fn state(&self) -> ExecutionState {
        *self.state.lock().await
    }

    async fn transition(&self, to: ExecutionState) -> Result<(), ExecutionError> {
        let mut state = self.state.lock().await;
        if !state.can_transition(to) {
            return Err(ExecutionError::InvalidTransition { from: *state, to });
        }
        debug!("🔀 execution {:?} -> {:?}", *state, to);
        *state = to;
        Ok(())
    }

    async fn fail(&self) {
        self.clear_local_route_data().await;
        *self.state.lock().await = ExecutionState::Failed;
    }

    pub async fn clear_local_route_data(&self) {
        self.transactions.clear_local_router_transactions_data().await;
    }

    pub async fn reevaluate_router_path(&self, identity: &PathTxIdentity) -> Result<(), ExecutionError> {
        self.router
            .reevaluate_router_path(&identity.route_uuid, &identity.tx_identity_key())
            .await?;
        Ok(())
    }

    async fn resolve_route(&self, uuid: &str) -> Result<(crate::router::Route, RouteInputParams), ExecutionError> {
        let (route, params) = self.router.get_best_route_and_input_params().await;
        match params {
            Some(params) if params.uuid == uuid => Ok((route, params)),
            _ => Err(ExecutionError::CannotResolveRouteId(uuid.to_string())),
        }
    }

    /// Stop route recomputation and build the unsigned transactions of the
    /// best route. Publishes `SendingTransactionsStarted` and then
    /// `SignRouterTransactions` with either the hashes or the error.
    pub async fn build_transactions_from_route(&self, uuid: &str) -> Result<SigningDetails, ExecutionError> {
        self.router.stop_suggested_routes_async_calculation();
        self.transition(ExecutionState::BuildingForSigning).await?;

        let result = self.build_inner(uuid).await;
        let send_type = self
            .router
            .get_best_route_and_input_params()
            .await
            .1
            .map(|p| p.send_type)
            .unwrap_or_default();

        match &result {
            Ok(signing) => {
                *self.state.lock().await = ExecutionState::AwaitingSignatures;
                info!("✍️ route {} ready for signing: {} hashes", uuid, signing.hashes.len());
            }
            Err(e) => {
                warn!("⚠️ building route {} failed: {}", uuid, e);
                self.fail().await;
            }
        }

        self.events
            .publish(WalletEvent::SignRouterTransactions {
                uuid: uuid.to_string(),
                send_type,
                signing_details: result.as_ref().ok().cloned(),
                error: result.as_ref().err().map(|e| e.to_response()),
            })
            .await;
        result
    }

    async fn build_inner(&self, uuid: &str) -> Result<SigningDetails, ExecutionError> {
        let (route, params) = self.resolve_route(uuid).await?;
        self.events
            .publish(WalletEvent::SendingTransactionsStarted { uuid: uuid.to_string(), send_type: params.send_type })
            .await;
        let signing = self
            .transactions
            .build_transactions_from_route(&route, self.router.get_path_processors(), &params)
            .await?;
        Ok(signing)
    }

    /// Fire-and-forget variant; the result also arrives as an event.
    pub fn build_transactions_from_route_async(
        self: &Arc<Self>,
        uuid: String,
    ) -> JoinHandle<TaskOutcome<Result<SigningDetails, ExecutionError>>> {
        let manager = Arc::clone(self);
        spawn_supervised("build-route-transactions", async move { manager.build_transactions_from_route(&uuid).await })
    }

    /// Bounded wait for the user's signatures.
    pub async fn wait_for_user_signatures<F>(&self, signatures: F) -> Result<HashMap<String, Signature>, ExecutionError>
    where
        F: Future<Output = Result<HashMap<String, Signature>, TransactionError>>,
    {
        match tokio::time::timeout(self.user_response_timeout, signatures).await {
            Ok(Ok(signatures)) => Ok(signatures),
            Ok(Err(e)) => {
                self.fail().await;
                Err(e.into())
            }
            Err(_) => {
                warn!("⏰ no user response within {:?}", self.user_response_timeout);
                self.fail().await;
                Err(ExecutionError::TimedOutWaitingForUser)
            }
        }
    }

    /// Attach signatures, broadcast and persist. Legs that fail to send do
    /// not stop the others; the outcome reports what went out.
    pub async fn send_router_transactions_with_signatures(
        &self,
        uuid: &str,
        signatures: &HashMap<String, Signature>,
    ) -> Result<Vec<SentTransaction>, ExecutionError> {
        self.transition(ExecutionState::Sending).await?;

        let resolved = self.resolve_route(uuid).await;
        let (from_chain, to_chain, send_type) = match &resolved {
            Ok((route, params)) => {
                let (from, to) = first_path_chains(route);
                (from, to, params.send_type)
            }
            Err(_) => (0, 0, SendType::default()),
        };

        let mut multi_tx_type = None;
        let result = match resolved {
            Ok((_, params)) => {
                multi_tx_type = Some(params.send_type.multi_transaction_type());
                self.send_inner(&params, signatures).await
            }
            Err(e) => Err(e),
        };

        let retain = retains_local_data(
            send_type,
            self.transactions.approval_required_for_path(PROCESSOR_SWAP_PARASWAP_NAME).await,
            self.transactions.approval_placed_for_path(PROCESSOR_SWAP_PARASWAP_NAME).await,
            self.transactions.tx_placed_for_path(PROCESSOR_SWAP_PARASWAP_NAME).await,
        );
        let next = if retain {
            info!("⏸️ swap approval placed, keeping local data for {}", uuid);
            ExecutionState::AwaitingSecondLeg
        } else {
            self.clear_local_route_data().await;
            match &result {
                Ok((_, None)) => ExecutionState::Completed,
                _ => ExecutionState::Failed,
            }
        };
        *self.state.lock().await = next;

        let (sent, error) = match result {
            Ok((sent, partial)) => (sent, partial.map(ExecutionError::from)),
            Err(e) => (Vec::new(), Some(e)),
        };
        if let Some(e) = &error {
            error!("❌ route {} send: {}", uuid, e);
        }

        self.events
            .publish(WalletEvent::TransactionsSent {
                uuid: uuid.to_string(),
                send_type,
                from_chain,
                to_chain,
                multi_tx_type,
                sent_transactions: sent.clone(),
                error: error.as_ref().map(|e| e.to_response()),
            })
            .await;

        match error {
            Some(e) if sent.is_empty() => Err(e),
            _ => Ok(sent),
        }
    }

    async fn send_inner(
        &self,
        params: &RouteInputParams,
        signatures: &HashMap<String, Signature>,
    ) -> Result<(Vec<SentTransaction>, Option<TransactionError>), ExecutionError> {
        self.transactions.validate_and_add_signatures(signatures).await?;

        let multi_tx = MultiTransaction::from_route_params(params);
        self.transactions.insert_multi_transaction(multi_tx.clone()).await;
        let outcome = self.transactions.send_router_transactions(&multi_tx).await;

        let data = RouteData::new(params.clone(), self.transactions.router_transactions().await);
        if let Err(e) = self.store.put(&data).await {
            error!("❌ storing route data {} failed: {}", params.uuid, e);
        }
        Ok((outcome.sent, outcome.error))
    }

    /// Build, sign with `signer` within the user timeout, send.
    pub async fn execute_with_signer(
        &self,
        uuid: &str,
        signer: &dyn TransactionSigner,
    ) -> Result<Vec<SentTransaction>, ExecutionError> {
        let signing = self.build_transactions_from_route(uuid).await?;
        let signatures = self.wait_for_user_signatures(signer.sign_hashes(&signing.hashes)).await?;
        self.send_router_transactions_with_signatures(uuid, &signatures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{ChainClientProvider, StaticClientProvider};
    use crate::constants::PROCESSOR_TRANSFER_NAME;
    use crate::dex::{ParaswapTransaction, PriceRoute, SwapSide};
    use crate::events::ChannelEventSink;
    use crate::mocks::{network, token, MockChainClient, MockParaswapApi, MockSigner, MockTokenOracle};
    use crate::oracle::TokenRegistry;
    use crate::pathprocessor::{registry, PathProcessor, SwapParaswapProcessor, TransferProcessor};
    use crate::storage::{MemoryRouteStore, StorageError};
    use crate::transactions::{LocalKeySigner, Transactor};
    use crate::types::{RouterTestParams, TestEstimation};
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        manager: RouteExecutionManager,
        router: Arc<Router>,
        store: Arc<MemoryRouteStore>,
        events: UnboundedReceiver<WalletEvent>,
        clients: Vec<Arc<MockChainClient>>,
    }

    fn fixture_with(clients: Vec<MockChainClient>, store: Option<Arc<dyn RouteStore>>) -> Fixture {
        build_fixture(clients, store, None)
    }

    fn build_fixture(
        clients: Vec<MockChainClient>,
        store: Option<Arc<dyn RouteStore>>,
        paraswap: Option<Arc<MockParaswapApi>>,
    ) -> Fixture {
        let clients: Vec<Arc<MockChainClient>> = clients.into_iter().map(Arc::new).collect();
        let mut provider = StaticClientProvider::new();
        for c in &clients {
            provider.insert(c.clone());
        }
        let provider: Arc<dyn ChainClientProvider> = Arc::new(provider);
        let transactor = Arc::new(Transactor::new(provider.clone()));
        let mut processors: Vec<Arc<dyn PathProcessor>> = vec![Arc::new(TransferProcessor::new(transactor.clone()))];
        if let Some(api) = paraswap {
            processors.push(Arc::new(SwapParaswapProcessor::new(transactor.clone(), api)));
        }
        let (router_events, _) = ChannelEventSink::shared();
        let router = Arc::new(Router::new(
            provider,
            registry(processors),
            Arc::new(MockTokenOracle::default()),
            TokenRegistry::new(vec![token(10, "USDC", 6), token(10, "DAI", 18)]),
            vec![network(10)],
            router_events,
        ));
        let memory = Arc::new(MemoryRouteStore::new());
        let store = store.unwrap_or_else(|| memory.clone() as Arc<dyn RouteStore>);
        let (events, rx) = ChannelEventSink::shared();
        let manager = RouteExecutionManager::new(router.clone(), Arc::new(TransactionManager::new(transactor)), store, events)
            .with_user_response_timeout(Duration::from_millis(50));
        Fixture { manager, router, store: memory, events: rx, clients }
    }

    fn fixture(clients: Vec<MockChainClient>) -> Fixture {
        fixture_with(clients, None)
    }

    fn params() -> RouteInputParams {
        let mut estimation_map = HashMap::new();
        estimation_map.insert(PROCESSOR_TRANSFER_NAME.to_string(), TestEstimation { value: 65_000, err: None });
        RouteInputParams {
            uuid: "exec-1".to_string(),
            send_type: SendType::Transfer,
            addr_from: Address::repeat_byte(0xaa),
            addr_to: Address::repeat_byte(0xbb),
            amount_in: U256::from(500),
            token_id: "USDC".to_string(),
            test_params: Some(RouterTestParams {
                token_prices: [("ETH".to_string(), 2000.0), ("USDC".to_string(), 1.0)].into_iter().collect(),
                balances: [(10, U256::from(1_000))].into_iter().collect(),
                estimation_map,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn swap_params() -> RouteInputParams {
        let mut estimation_map = HashMap::new();
        estimation_map.insert(PROCESSOR_SWAP_PARASWAP_NAME.to_string(), TestEstimation { value: 150_000, err: None });
        RouteInputParams {
            uuid: "swap-1".to_string(),
            send_type: SendType::Swap,
            addr_from: Address::repeat_byte(0xaa),
            addr_to: Address::repeat_byte(0xaa),
            amount_in: U256::from(500),
            token_id: "USDC".to_string(),
            to_token_id: Some("DAI".to_string()),
            test_params: Some(RouterTestParams {
                token_prices: [("ETH".to_string(), 2000.0), ("USDC".to_string(), 1.0), ("DAI".to_string(), 1.0)]
                    .into_iter()
                    .collect(),
                balances: [(10, U256::from(1_000))].into_iter().collect(),
                estimation_map,
                approval_gas_estimation: 50_000,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn paraswap_with_quote() -> Arc<MockParaswapApi> {
        let api = Arc::new(MockParaswapApi::new());
        api.push_route(Ok(PriceRoute {
            src_amount: U256::from(500),
            src_token_address: token(10, "USDC", 6).address,
            src_token_decimals: 6,
            dest_amount: U256::from(499),
            dest_token_address: token(10, "DAI", 18).address,
            dest_token_decimals: 18,
            side: SwapSide::Sell,
            contract_address: Address::repeat_byte(0x78),
            token_transfer_proxy: Address::repeat_byte(0xab),
            ..Default::default()
        }));
        api.push_build(Ok(ParaswapTransaction {
            from: format!("{:#x}", Address::repeat_byte(0xaa)),
            to: format!("{:#x}", Address::repeat_byte(0x78)),
            value: "0".to_string(),
            data: "0xabcd".to_string(),
            gas_price: "100".to_string(),
            gas: "150000".to_string(),
            chain_id: 10,
            error: String::new(),
        }));
        api
    }

    #[test]
    fn test_state_transitions() {
        use ExecutionState::*;
        assert!(Idle.can_transition(BuildingForSigning));
        assert!(AwaitingSecondLeg.can_transition(BuildingForSigning));
        assert!(!Sending.can_transition(BuildingForSigning));
        assert!(!Idle.can_transition(Sending));
        assert!(AwaitingSignatures.can_transition(Sending));
        assert!(Sending.can_transition(AwaitingSecondLeg));
        assert!(!Completed.can_transition(Sending));
        assert!(AwaitingSecondLeg.is_terminal());
    }

    #[test]
    fn test_local_data_retained_only_for_half_sent_swap() {
        assert!(retains_local_data(SendType::Swap, true, true, false));
        assert!(!retains_local_data(SendType::Swap, true, true, true));
        assert!(!retains_local_data(SendType::Swap, true, false, false));
        assert!(!retains_local_data(SendType::Transfer, true, true, false));
    }

    #[tokio::test]
    async fn test_build_sign_send_persist() {
        let mut f = fixture(vec![MockChainClient::new(10).with_pending_nonce(2)]);
        f.router.suggested_routes(params()).await.unwrap();

        let signing = f.manager.build_transactions_from_route("exec-1").await.unwrap();
        assert_eq!(signing.hashes.len(), 1);
        assert_eq!(f.manager.state().await, ExecutionState::AwaitingSignatures);

        let signatures = MockSigner::new().sign(&signing.hashes);
        let sent = f.manager.send_router_transactions_with_signatures("exec-1", &signatures).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].nonce, 2);
        assert_eq!(f.manager.state().await, ExecutionState::Completed);
        assert_eq!(f.clients[0].sent_raw_transactions().len(), 1);

        let stored = f.store.get("exec-1").await.unwrap().unwrap();
        assert!(stored.paths_data[0].tx_placed());

        let names: Vec<&str> = [
            f.events.recv().await.unwrap(),
            f.events.recv().await.unwrap(),
            f.events.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.name())
        .collect();
        assert_eq!(
            names,
            vec![
                "wallet.router.sending-transactions-started",
                "wallet.router.sign-transactions",
                "wallet.router.transactions-sent"
            ]
        );
    }

    #[tokio::test]
    async fn test_swap_resumes_after_approval_only_send() {
        // approval (attempt 0) goes out, the swap (attempt 1) is rejected
        let client = MockChainClient::new(10).with_pending_nonce(4).with_send_failure_at(1, "gas price too low");
        let f = build_fixture(vec![client], None, Some(paraswap_with_quote()));
        let suggested = f.router.suggested_routes(swap_params()).await.unwrap();
        assert!(suggested.best[0].approval_required);

        let signing = f.manager.build_transactions_from_route("swap-1").await.unwrap();
        assert_eq!(signing.hashes.len(), 2);
        let sent = f
            .manager
            .send_router_transactions_with_signatures("swap-1", &MockSigner::new().sign(&signing.hashes))
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].approval_tx);
        assert_eq!(sent[0].nonce, 4);
        assert_eq!(f.manager.state().await, ExecutionState::AwaitingSecondLeg);

        let kept = f.manager.transactions.router_transactions().await;
        assert_eq!(kept.len(), 1);
        assert!(kept[0].approval_placed());
        assert!(!kept[0].tx_placed());

        // second attempt signs the swap only, at the nonce after the approval
        let signing = f.manager.build_transactions_from_route("swap-1").await.unwrap();
        assert_eq!(signing.hashes.len(), 1);
        assert!(signing.hashes[0].identity_key.ends_with("false"));
        let sent = f
            .manager
            .send_router_transactions_with_signatures("swap-1", &MockSigner::new().sign(&signing.hashes))
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].approval_tx);
        assert_eq!(sent[0].nonce, 5);
        assert_eq!(f.manager.state().await, ExecutionState::Completed);
        assert!(f.manager.transactions.router_transactions().await.is_empty());
        assert_eq!(f.clients[0].sent_raw_transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_uuid_fails_build() {
        let mut f = fixture(vec![MockChainClient::new(10)]);
        f.router.suggested_routes(params()).await.unwrap();

        let err = f.manager.build_transactions_from_route("stale").await.unwrap_err();
        assert_eq!(err, ExecutionError::CannotResolveRouteId("stale".to_string()));
        assert_eq!(f.manager.state().await, ExecutionState::Failed);
        match f.events.recv().await.unwrap() {
            WalletEvent::SignRouterTransactions { error, signing_details, .. } => {
                assert_eq!(error.unwrap().code, "WRE-001");
                assert!(signing_details.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_requires_built_transactions() {
        let f = fixture(vec![MockChainClient::new(10)]);
        let err = f.manager.send_router_transactions_with_signatures("exec-1", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidTransition { from: ExecutionState::Idle, .. }));
    }

    #[tokio::test]
    async fn test_failed_broadcast_is_reported_and_cleared() {
        let mut f = fixture(vec![MockChainClient::new(10).with_send_failure("insufficient funds")]);
        f.router.suggested_routes(params()).await.unwrap();
        let signing = f.manager.build_transactions_from_route("exec-1").await.unwrap();
        let signatures = MockSigner::new().sign(&signing.hashes);

        let err = f.manager.send_router_transactions_with_signatures("exec-1", &signatures).await.unwrap_err();
        assert_eq!(err, ExecutionError::Transaction(TransactionError::PartialSend { failed: 1, total: 1 }));
        assert_eq!(f.manager.state().await, ExecutionState::Failed);
        assert!(f.manager.transactions.router_transactions().await.is_empty());
        // record is still written
        assert!(f.store.get("exec-1").await.unwrap().is_some());

        let last = loop {
            let event = f.events.recv().await.unwrap();
            if let WalletEvent::TransactionsSent { .. } = event {
                break event;
            }
        };
        match last {
            WalletEvent::TransactionsSent { error, from_chain, .. } => {
                assert_eq!(error.unwrap().code, "WTM-013");
                assert_eq!(from_chain, 10);
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_user_timeout() {
        let f = fixture(vec![MockChainClient::new(10)]);
        f.router.suggested_routes(params()).await.unwrap();
        f.manager.build_transactions_from_route("exec-1").await.unwrap();

        let pending = std::future::pending::<Result<HashMap<String, Signature>, TransactionError>>();
        let err = f.manager.wait_for_user_signatures(pending).await.unwrap_err();
        assert_eq!(err, ExecutionError::TimedOutWaitingForUser);
        assert_eq!(f.manager.state().await, ExecutionState::Failed);
    }

    struct BrokenStore;

    #[async_trait]
    impl RouteStore for BrokenStore {
        async fn put(&self, _data: &RouteData) -> Result<(), StorageError> {
            Err(StorageError::Redis("connection refused".to_string()))
        }

        async fn get(&self, _uuid: &str) -> Result<Option<RouteData>, StorageError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_fail_send() {
        let f = fixture_with(vec![MockChainClient::new(10)], Some(Arc::new(BrokenStore)));
        f.router.suggested_routes(params()).await.unwrap();
        let signer = LocalKeySigner::random();
        let sent = f.manager.execute_with_signer("exec-1", &signer).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(f.manager.state().await, ExecutionState::Completed);
    }

    #[tokio::test]
    async fn test_async_build_reports_through_handle() {
        let f = fixture(vec![MockChainClient::new(10)]);
        f.router.suggested_routes(params()).await.unwrap();
        let manager = Arc::new(f.manager);
        let outcome = manager.build_transactions_from_route_async("exec-1".to_string()).await.unwrap();
        assert_eq!(outcome.finished().unwrap().unwrap().hashes.len(), 1);
    }
}
