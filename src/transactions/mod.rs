//! Building, signing and broadcasting the transactions of a route.

pub mod signer;
pub mod transactor;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::blockchain::ChainError;
use crate::pathprocessor::ProcessorRegistry;
use crate::router::routes::{first_path_chains, Path, Route};
use crate::types::{ChainId, MultiTransactionType, RouteInputParams};

pub use signer::{parse_signature, LocalKeySigner, TransactionSigner};
pub use transactor::{SendTxArgs, Transactor, UnsignedTransaction};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransactionError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("missing sender address")]
    MissingSender,

    #[error("gas amount must be set")]
    ZeroGas,

    #[error("missing fee parameters")]
    MissingFeeParams,

    #[error("value does not fit in u128: {0}")]
    ValueOverflow(String),

    #[error("no transactions built for the route")]
    NoRouterTransactions,

    #[error("path processor not found: {0}")]
    ProcessorNotFound(String),

    #[error("building transaction with {processor} failed: {message}")]
    Build { processor: String, message: String },

    #[error("unexpected signature for {0}")]
    UnexpectedSignature(String),

    #[error("missing signature for {0}")]
    MissingSignature(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("{failed} of {total} transactions failed to send")]
    PartialSend { failed: usize, total: usize },
}

impl TransactionError {
    pub fn code(&self) -> &'static str {
        match self {
            TransactionError::Chain(_) => "WTM-001",
            TransactionError::MissingSender => "WTM-002",
            TransactionError::ZeroGas => "WTM-003",
            TransactionError::MissingFeeParams => "WTM-004",
            TransactionError::ValueOverflow(_) => "WTM-005",
            TransactionError::NoRouterTransactions => "WTM-006",
            TransactionError::ProcessorNotFound(_) => "WTM-007",
            TransactionError::Build { .. } => "WTM-008",
            TransactionError::UnexpectedSignature(_) => "WTM-009",
            TransactionError::MissingSignature(_) => "WTM-010",
            TransactionError::InvalidSignature(_) => "WTM-011",
            TransactionError::Signer(_) => "WTM-012",
            TransactionError::PartialSend { .. } => "WTM-013",
        }
    }
}

/// One unsigned transaction handed to the signer and its send outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionDescription {
    pub chain_id: ChainId,
    pub identity_key: String,
    pub nonce: u64,
    pub args: SendTxArgs,
    #[serde(skip)]
    pub unsigned: Option<UnsignedTransaction>,
    pub hash_to_sign: B256,
    /// 65 byte r || s || v
    pub signature: Option<Bytes>,
    pub sent_hash: Option<B256>,
    pub send_error: Option<String>,
}

impl TransactionDescription {
    pub fn is_sent(&self) -> bool {
        self.sent_hash.is_some()
    }
}

/// Built transactions of one path: optional approval then the main tx.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RouterTransactionDetails {
    pub route_path: Path,
    pub approval: Option<TransactionDescription>,
    pub tx: Option<TransactionDescription>,
}

impl RouterTransactionDetails {
    pub fn approval_required(&self) -> bool {
        self.route_path.approval_required
    }

    pub fn approval_placed(&self) -> bool {
        self.approval.as_ref().map(|a| a.is_sent()).unwrap_or(false)
    }

    pub fn tx_placed(&self) -> bool {
        self.tx.as_ref().map(|t| t.is_sent()).unwrap_or(false)
    }

    fn descriptions_mut(&mut self) -> impl Iterator<Item = &mut TransactionDescription> {
        self.approval.iter_mut().chain(self.tx.iter_mut())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxHashToSign {
    pub identity_key: String,
    pub chain_id: ChainId,
    pub hash: B256,
}

/// What the external signer needs: the account and the hashes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SigningDetails {
    pub address: Address,
    pub hashes: Vec<TxHashToSign>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiTransaction {
    pub id: String,
    pub timestamp: u64,
    pub from_address: Address,
    pub to_address: Address,
    pub from_asset: String,
    pub to_asset: Option<String>,
    pub from_amount: U256,
    pub to_amount: U256,
    pub multi_tx_type: MultiTransactionType,
}

impl MultiTransaction {
    pub fn from_route_params(params: &RouteInputParams) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp() as u64,
            from_address: params.addr_from,
            to_address: params.addr_to,
            from_asset: params.token_id.clone(),
            to_asset: params.to_token_id.clone(),
            from_amount: params.amount_in,
            to_amount: params.amount_out,
            multi_tx_type: params.send_type.multi_transaction_type(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentTransaction {
    pub multi_tx_id: String,
    pub identity_key: String,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
    pub from_address: Address,
    pub to_address: Address,
    pub from_token: String,
    pub to_token: String,
    pub amount: U256,
    pub nonce: u64,
    pub hash: B256,
    pub approval_tx: bool,
}

/// Result of a send pass; `error` is set when at least one leg failed.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    pub sent: Vec<SentTransaction>,
    pub error: Option<TransactionError>,
}

/// Keeps the local transactions of the route being executed.
pub struct TransactionManager {
    transactor: Arc<Transactor>,
    details: Mutex<Vec<RouterTransactionDetails>>,
    multi_transactions: Mutex<Vec<MultiTransaction>>,
}

impl TransactionManager {
    pub fn new(transactor: Arc<Transactor>) -> Self {
        Self {
            transactor,
            details: Mutex::new(Vec::new()),
            multi_transactions: Mutex::new(Vec::new()),
        }
    }

    /// Build one unsigned tx per leg, approval first. An approval already
    /// broadcast in a previous attempt is kept instead of being rebuilt.
    pub async fn build_transactions_from_route(
        &self,
        route: &Route,
        processors: &ProcessorRegistry,
        params: &RouteInputParams,
    ) -> Result<SigningDetails, TransactionError> {
        let mut details = self.details.lock().await;
        let previous: HashMap<String, TransactionDescription> = details
            .drain(..)
            .filter_map(|d| d.approval.filter(|a| a.is_sent()))
            .map(|a| (a.identity_key.clone(), a))
            .collect();

        let mut last_used_nonce: HashMap<ChainId, u64> = HashMap::new();
        let mut signing = SigningDetails { address: params.addr_from, hashes: Vec::new() };

        for path in route {
            let chain_id = path.from_chain.chain_id;
            let mut entry = RouterTransactionDetails { route_path: path.clone(), ..Default::default() };

            if path.approval_required {
                let key = path.tx_identity_key(true);
                let approval = match previous.get(&key) {
                    Some(placed) => {
                        info!("♻️ approval {} already placed, reusing", key);
                        placed.clone()
                    }
                    None => {
                        let mut args = approval_args(path, params);
                        let (unsigned, nonce) = self
                            .transactor
                            .validate_and_build_transaction(&args, last_used_nonce.get(&chain_id).copied())
                            .await?;
                        args.nonce = Some(nonce);
                        let description = describe(key, chain_id, args, unsigned, nonce);
                        signing.hashes.push(description.hash_to_sign_entry());
                        description
                    }
                };
                last_used_nonce.insert(chain_id, approval.nonce);
                entry.approval = Some(approval);
            }

            let processor = processors
                .get(path.processor_name.as_str())
                .ok_or_else(|| TransactionError::ProcessorNotFound(path.processor_name.clone()))?;
            let mut args = tx_args(path, params);
            let (unsigned, nonce) = processor
                .build_transaction(&mut args, last_used_nonce.get(&chain_id).copied())
                .await
                .map_err(|e| TransactionError::Build { processor: path.processor_name.clone(), message: e.to_string() })?;
            args.nonce = Some(nonce);
            last_used_nonce.insert(chain_id, nonce);

            let description = describe(path.tx_identity_key(false), chain_id, args, unsigned, nonce);
            signing.hashes.push(description.hash_to_sign_entry());
            entry.tx = Some(description);
            details.push(entry);
        }

        if details.is_empty() {
            return Err(TransactionError::NoRouterTransactions);
        }
        debug!("🔨 built {} transactions to sign", signing.hashes.len());
        Ok(signing)
    }

    /// Attach externally produced signatures keyed by identity key.
    pub async fn validate_and_add_signatures(
        &self,
        signatures: &HashMap<String, Signature>,
    ) -> Result<(), TransactionError> {
        let mut details = self.details.lock().await;
        if details.is_empty() {
            return Err(TransactionError::NoRouterTransactions);
        }

        for key in signatures.keys() {
            let known = details
                .iter()
                .flat_map(|d| d.approval.iter().chain(d.tx.iter()))
                .any(|desc| !desc.is_sent() && &desc.identity_key == key);
            if !known {
                return Err(TransactionError::UnexpectedSignature(key.clone()));
            }
        }

        for entry in details.iter_mut() {
            for desc in entry.descriptions_mut() {
                if desc.is_sent() {
                    continue;
                }
                let signature = signatures
                    .get(&desc.identity_key)
                    .ok_or_else(|| TransactionError::MissingSignature(desc.identity_key.clone()))?;
                desc.signature = Some(Bytes::copy_from_slice(&signature.as_bytes()));
            }
        }
        Ok(())
    }

    pub async fn insert_multi_transaction(&self, multi_tx: MultiTransaction) -> String {
        let id = multi_tx.id.clone();
        self.multi_transactions.lock().await.push(multi_tx);
        id
    }

    pub async fn multi_transactions(&self) -> Vec<MultiTransaction> {
        self.multi_transactions.lock().await.clone()
    }

    /// Broadcast every signed, unsent tx ordered by (chain, nonce). Failures are
    /// recorded per leg and the remaining legs are still attempted.
    pub async fn send_router_transactions(&self, multi_tx: &MultiTransaction) -> SendOutcome {
        let mut details = self.details.lock().await;
        let mut queue: Vec<(usize, bool)> = Vec::new();
        for (idx, entry) in details.iter().enumerate() {
            if entry.approval.as_ref().map(|a| !a.is_sent()).unwrap_or(false) {
                queue.push((idx, true));
            }
            if entry.tx.as_ref().map(|t| !t.is_sent()).unwrap_or(false) {
                queue.push((idx, false));
            }
        }
        queue.sort_by_key(|(idx, is_approval)| {
            let entry = &details[*idx];
            let desc = if *is_approval { entry.approval.as_ref() } else { entry.tx.as_ref() };
            desc.map(|d| (d.chain_id, d.nonce)).unwrap_or_default()
        });

        let total = queue.len();
        let mut outcome = SendOutcome::default();
        let mut failed = 0;

        for (idx, is_approval) in queue {
            let entry = &mut details[idx];
            let path = entry.route_path.clone();
            let Some(desc) = (if is_approval { entry.approval.as_mut() } else { entry.tx.as_mut() }) else {
                continue;
            };

            match self.send_one(desc).await {
                Ok(hash) => {
                    info!("📤 sent {} on chain {} nonce {}: {:#x}", desc.identity_key, desc.chain_id, desc.nonce, hash);
                    desc.sent_hash = Some(hash);
                    desc.send_error = None;
                    outcome.sent.push(SentTransaction {
                        multi_tx_id: multi_tx.id.clone(),
                        identity_key: desc.identity_key.clone(),
                        from_chain: path.from_chain.chain_id,
                        to_chain: path.to_chain.chain_id,
                        from_address: path.from_address,
                        to_address: path.to_address,
                        from_token: path.from_token.symbol.clone(),
                        to_token: path.to_token_symbol().to_string(),
                        amount: if is_approval { path.approval_amount_required } else { path.amount_in },
                        nonce: desc.nonce,
                        hash,
                        approval_tx: is_approval,
                    });
                }
                Err(e) => {
                    error!("❌ sending {} failed: {}", desc.identity_key, e);
                    desc.send_error = Some(e.to_string());
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            outcome.error = Some(TransactionError::PartialSend { failed, total });
        }
        outcome
    }

    async fn send_one(&self, desc: &TransactionDescription) -> Result<B256, TransactionError> {
        let raw_sig = desc
            .signature
            .as_ref()
            .ok_or_else(|| TransactionError::MissingSignature(desc.identity_key.clone()))?;
        let signature = parse_signature(raw_sig)?;
        let unsigned = desc.unsigned.clone().ok_or(TransactionError::NoRouterTransactions)?;
        let (_hash, raw) = unsigned.into_signed_raw(signature);
        let client = self.transactor.provider().eth_client(desc.chain_id)?;
        Ok(client.send_raw_transaction(raw).await?)
    }

    pub async fn router_transactions(&self) -> Vec<RouterTransactionDetails> {
        self.details.lock().await.clone()
    }

    pub async fn first_path_chains(&self) -> (ChainId, ChainId) {
        let route: Route = self.details.lock().await.iter().map(|d| d.route_path.clone()).collect();
        first_path_chains(&route)
    }

    async fn find_by_processor<F>(&self, processor_name: &str, f: F) -> bool
    where
        F: Fn(&RouterTransactionDetails) -> bool,
    {
        self.details
            .lock()
            .await
            .iter()
            .find(|d| d.route_path.processor_name == processor_name)
            .map(f)
            .unwrap_or(false)
    }

    pub async fn approval_required_for_path(&self, processor_name: &str) -> bool {
        self.find_by_processor(processor_name, |d| d.approval_required()).await
    }

    pub async fn approval_placed_for_path(&self, processor_name: &str) -> bool {
        self.find_by_processor(processor_name, |d| d.approval_placed()).await
    }

    pub async fn tx_placed_for_path(&self, processor_name: &str) -> bool {
        self.find_by_processor(processor_name, |d| d.tx_placed()).await
    }

    pub async fn clear_local_router_transactions_data(&self) {
        let mut details = self.details.lock().await;
        if !details.is_empty() {
            warn!("🧹 clearing {} local route transactions", details.len());
        }
        details.clear();
    }
}

impl TransactionDescription {
    fn hash_to_sign_entry(&self) -> TxHashToSign {
        TxHashToSign { identity_key: self.identity_key.clone(), chain_id: self.chain_id, hash: self.hash_to_sign }
    }
}

fn describe(
    identity_key: String,
    chain_id: ChainId,
    args: SendTxArgs,
    unsigned: UnsignedTransaction,
    nonce: u64,
) -> TransactionDescription {
    TransactionDescription {
        chain_id,
        identity_key,
        nonce,
        args,
        hash_to_sign: unsigned.signature_hash(),
        unsigned: Some(unsigned),
        ..Default::default()
    }
}

/// ERC20 approve on the from token toward the path's spender
fn approval_args(path: &Path, params: &RouteInputParams) -> SendTxArgs {
    SendTxArgs {
        from_chain_id: path.from_chain.chain_id,
        to_chain_id: path.from_chain.chain_id,
        from: params.addr_from,
        to: Some(path.from_token.address),
        recipient: path.approval_contract_address,
        value: U256::ZERO,
        data: path.approval_packed_data.clone(),
        gas: path.approval_gas_amount,
        fee: path.approval_fee_params,
        nonce: path.approval_tx_nonce,
        from_token_id: path.from_token.symbol.clone(),
        value_in: path.approval_amount_required,
        ..Default::default()
    }
}

fn tx_args(path: &Path, params: &RouteInputParams) -> SendTxArgs {
    SendTxArgs {
        from_chain_id: path.from_chain.chain_id,
        to_chain_id: path.to_chain.chain_id,
        from: params.addr_from,
        to: Some(path.tx_to),
        recipient: params.addr_to,
        value: path.tx_value,
        data: path.tx_packed_data.clone(),
        gas: path.tx_gas_amount,
        fee: path.tx_fee_params,
        nonce: path.tx_nonce,
        from_token_id: path.from_token.symbol.clone(),
        to_token_id: path.to_token_symbol().to_string(),
        value_in: path.amount_in,
        value_out: path.amount_out,
        slippage_percentage: params.slippage_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::StaticClientProvider;
    use crate::fees::TxFeeParams;
    use crate::mocks::{native_token, network, token, MockChainClient, MockSigner};
    use crate::pathprocessor::{registry, PathProcessor, TransferProcessor};
    use crate::constants::PROCESSOR_TRANSFER_NAME;

    fn fee() -> Option<TxFeeParams> {
        Some(TxFeeParams::Eip1559 {
            max_fee_per_gas: U256::from(100),
            max_priority_fee_per_gas: U256::from(2),
            base_fee: U256::from(49),
        })
    }

    fn path(chain_id: ChainId, approval: bool, nonce: u64) -> Path {
        let from_token = if approval { token(chain_id, "USDC", 6) } else { native_token(chain_id) };
        Path {
            processor_name: PROCESSOR_TRANSFER_NAME.to_string(),
            from_address: Address::repeat_byte(0xaa),
            to_address: Address::repeat_byte(0xbb),
            from_chain: network(chain_id),
            to_chain: network(chain_id),
            from_token,
            amount_in: U256::from(10),
            tx_to: Address::repeat_byte(0xbb),
            tx_gas_amount: 21_000,
            tx_fee_params: fee(),
            tx_nonce: Some(if approval { nonce + 1 } else { nonce }),
            approval_required: approval,
            approval_amount_required: U256::from(10),
            approval_contract_address: Address::repeat_byte(0xcc),
            approval_gas_amount: 50_000,
            approval_fee_params: fee(),
            approval_tx_nonce: if approval { Some(nonce) } else { None },
            ..Default::default()
        }
    }

    fn params() -> RouteInputParams {
        RouteInputParams {
            uuid: "route-1".to_string(),
            addr_from: Address::repeat_byte(0xaa),
            addr_to: Address::repeat_byte(0xbb),
            amount_in: U256::from(10),
            token_id: "USDC".to_string(),
            ..Default::default()
        }
    }

    fn setup(clients: Vec<MockChainClient>) -> (TransactionManager, ProcessorRegistry, Vec<Arc<MockChainClient>>) {
        let mut provider = StaticClientProvider::new();
        let clients: Vec<Arc<MockChainClient>> = clients.into_iter().map(Arc::new).collect();
        for c in &clients {
            provider.insert(c.clone());
        }
        let transactor = Arc::new(Transactor::new(Arc::new(provider)));
        let processors = registry(vec![Arc::new(TransferProcessor::new(transactor.clone())) as Arc<dyn PathProcessor>]);
        (TransactionManager::new(transactor), processors, clients)
    }

    async fn sign_all(manager: &TransactionManager, signing: &SigningDetails) {
        let signatures = MockSigner::new().sign(&signing.hashes);
        manager.validate_and_add_signatures(&signatures).await.unwrap();
    }

    #[tokio::test]
    async fn test_build_approval_first_with_path_nonces() {
        let (manager, processors, _) = setup(vec![MockChainClient::new(10)]);
        let route = vec![path(10, true, 10)];
        let signing = manager.build_transactions_from_route(&route, &processors, &params()).await.unwrap();
        assert_eq!(signing.hashes.len(), 2);
        assert!(signing.hashes[0].identity_key.ends_with("true"));

        let details = manager.router_transactions().await;
        assert_eq!(details[0].approval.as_ref().unwrap().nonce, 10);
        assert_eq!(details[0].tx.as_ref().unwrap().nonce, 11);
    }

    #[tokio::test]
    async fn test_signature_validation() {
        let (manager, processors, _) = setup(vec![MockChainClient::new(1)]);
        let route = vec![path(1, true, 0)];
        let signing = manager.build_transactions_from_route(&route, &processors, &params()).await.unwrap();

        let mut signatures = MockSigner::new().sign(&signing.hashes);
        let any = *signatures.values().next().unwrap();
        signatures.insert("1-0xdead-ETH-false".to_string(), any);
        assert!(matches!(
            manager.validate_and_add_signatures(&signatures).await,
            Err(TransactionError::UnexpectedSignature(_))
        ));

        let mut partial = MockSigner::new().sign(&signing.hashes);
        partial.remove(&route[0].tx_identity_key(false));
        assert!(matches!(
            manager.validate_and_add_signatures(&partial).await,
            Err(TransactionError::MissingSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_send_orders_by_nonce_and_continues_after_failure() {
        let failing = MockChainClient::new(10).with_send_failure("nonce too low");
        let (manager, processors, clients) = setup(vec![MockChainClient::new(1), failing]);
        let route = vec![path(10, false, 4), path(1, true, 7)];
        let signing = manager.build_transactions_from_route(&route, &processors, &params()).await.unwrap();
        sign_all(&manager, &signing).await;

        let multi_tx = MultiTransaction::from_route_params(&params());
        let outcome = manager.send_router_transactions(&multi_tx).await;
        assert_eq!(outcome.sent.len(), 2);
        assert_eq!(outcome.error, Some(TransactionError::PartialSend { failed: 1, total: 3 }));
        // chain 1 first: approval (7) then tx (8)
        assert_eq!(outcome.sent[0].nonce, 7);
        assert!(outcome.sent[0].approval_tx);
        assert_eq!(outcome.sent[1].nonce, 8);
        assert_eq!(clients[0].sent_raw_transactions().len(), 2);

        let details = manager.router_transactions().await;
        assert!(details[0].tx.as_ref().unwrap().send_error.is_some());
        assert!(manager.tx_placed_for_path(PROCESSOR_TRANSFER_NAME).await == false);
    }

    #[tokio::test]
    async fn test_placed_approval_is_reused_on_rebuild() {
        let (manager, processors, clients) = setup(vec![MockChainClient::new(1).with_pending_nonce(3)]);
        let route = vec![path(1, true, 3)];
        let signing = manager.build_transactions_from_route(&route, &processors, &params()).await.unwrap();
        sign_all(&manager, &signing).await;

        // only the approval goes out
        {
            let mut details = manager.details.lock().await;
            details[0].tx.as_mut().unwrap().signature = None;
        }
        let outcome = manager.send_router_transactions(&MultiTransaction::from_route_params(&params())).await;
        assert_eq!(outcome.sent.len(), 1);
        assert!(manager.approval_placed_for_path(PROCESSOR_TRANSFER_NAME).await);
        assert!(!manager.tx_placed_for_path(PROCESSOR_TRANSFER_NAME).await);

        let signing = manager.build_transactions_from_route(&route, &processors, &params()).await.unwrap();
        assert_eq!(signing.hashes.len(), 1);
        assert!(signing.hashes[0].identity_key.ends_with("false"));
        assert_eq!(clients[0].sent_raw_transactions().len(), 1);

        manager.clear_local_router_transactions_data().await;
        assert!(manager.router_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_multi_transaction_type_follows_send_type() {
        let mut p = params();
        p.send_type = crate::types::SendType::Bridge;
        let multi = MultiTransaction::from_route_params(&p);
        assert_eq!(multi.multi_tx_type, MultiTransactionType::Bridge);

        let (manager, _, _) = setup(vec![]);
        let id = manager.insert_multi_transaction(multi.clone()).await;
        assert_eq!(id, multi.id);
        assert_eq!(manager.multi_transactions().await.len(), 1);
    }
}
