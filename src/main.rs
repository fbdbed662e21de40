use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xcrack_route_planner::blockchain::{ChainClientProvider, RpcChainClient, StaticClientProvider};
use xcrack_route_planner::bridges::{CelerHttpClient, HopHttpClient};
use xcrack_route_planner::dex::ParaswapHttpClient;
use xcrack_route_planner::events::{ChannelEventSink, WalletEvent};
use xcrack_route_planner::mocks::{self, MockCelerApi, MockChainClient, MockHopApi, MockParaswapApi, MockTokenOracle};
use xcrack_route_planner::oracle::{ChainTokenOracle, CryptoCompareFeed, TokenOracle, TokenRegistry};
use xcrack_route_planner::pathprocessor::{
    registry, CelerBridgeProcessor, EnsRegisterProcessor, Erc1155Processor, Erc721Processor, HopBridgeProcessor,
    PathProcessor, SwapParaswapProcessor, TransferProcessor,
};
use xcrack_route_planner::storage::{MemoryRouteStore, RedisRouteStore, RouteStore};
use xcrack_route_planner::transactions::{LocalKeySigner, Transactor, TransactionSigner};
use xcrack_route_planner::types::ChainId;
use xcrack_route_planner::{Config, RouteExecutionManager, RouteInputParams, Router, SendType, TransactionManager};

#[tokio::main]
async fn main() -> Result<()> {
    let route_args = [
        Arg::new("from").long("from").value_name("ADDRESS").help("보내는 주소 (execute는 서명자 주소가 기본)"),
        Arg::new("to").long("to").value_name("ADDRESS").required(true).help("받는 주소"),
        Arg::new("amount").long("amount").value_name("WEI").required(true).help("최소 단위 금액"),
        Arg::new("token").long("token").value_name("SYMBOL").default_value("ETH").help("보낼 토큰 심볼 또는 컬렉터블 id"),
        Arg::new("to-token").long("to-token").value_name("SYMBOL").help("swap 대상 토큰"),
        Arg::new("send-type")
            .long("send-type")
            .value_name("TYPE")
            .default_value("transfer")
            .help("transfer, bridge, swap, ens_register, erc721_transfer, erc1155_transfer"),
        Arg::new("disabled-from").long("disabled-from").value_name("CHAIN").action(ArgAction::Append),
        Arg::new("disabled-to").long("disabled-to").value_name("CHAIN").action(ArgAction::Append),
        Arg::new("locked")
            .long("locked")
            .value_name("CHAIN=AMOUNT")
            .action(ArgAction::Append)
            .help("체인별 고정 금액"),
        Arg::new("username").long("username").value_name("NAME"),
    ];

    let matches = Command::new("route-planner")
        .version("0.1.0")
        .author("xCrack Team <team@xcrack.dev>")
        .about("🦀 멀티체인 지갑 라우트 플래너")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("suggest").about("최적 라우트 계산").args(route_args.clone()))
        .subcommand(
            Command::new("execute")
                .about("라우트 빌드 및 서명 (기본은 dry-run)")
                .args(route_args)
                .arg(
                    Arg::new("broadcast")
                        .long("broadcast")
                        .help("서명된 트랜잭션을 실제로 전송")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    let log_level = matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("info");
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.toml");
    let mut config = Config::load(config_path).await?;
    config.apply_env_overrides();
    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {}", e);
        std::process::exit(1);
    }
    info!("✅ 설정 로드 완료");

    let app = App::build(&config).await?;

    match matches.subcommand() {
        Some(("suggest", sub)) => {
            let params = input_params(sub, None)?;
            app.suggest(params).await
        }
        Some(("execute", sub)) => {
            let signer = load_signer(&config)?;
            let params = input_params(sub, Some(signer.address()))?;
            app.execute(params, &signer, sub.get_flag("broadcast")).await
        }
        _ => Err(anyhow!("unknown command")),
    }
}

struct App {
    router: Arc<Router>,
    execution: RouteExecutionManager,
    events: tokio::sync::mpsc::UnboundedReceiver<WalletEvent>,
}

impl App {
    async fn build(config: &Config) -> Result<Self> {
        let mock_mode = mocks::is_mock_mode();
        let networks = config.network_list();
        let tokens = TokenRegistry::new(config.tokens.clone());

        let mut clients = StaticClientProvider::new();
        for (chain_id, url) in config.rpc_urls() {
            if mock_mode {
                clients.insert(Arc::new(MockChainClient::from_env(chain_id)));
            } else {
                clients.insert(Arc::new(RpcChainClient::new(chain_id, &url)?));
            }
        }
        let provider: Arc<dyn ChainClientProvider> = Arc::new(clients);
        let transactor = Arc::new(Transactor::new(provider.clone()));

        let processors: Vec<Arc<dyn PathProcessor>> = if mock_mode {
            warn!("🎭 mock 모드: 체인/API 호출 없이 실행");
            vec![
                Arc::new(TransferProcessor::new(transactor.clone())),
                Arc::new(Erc721Processor::new(transactor.clone())),
                Arc::new(Erc1155Processor::new(transactor.clone())),
                Arc::new(HopBridgeProcessor::new(transactor.clone(), Arc::new(MockHopApi::default()), config.hop_contracts())),
                Arc::new(CelerBridgeProcessor::new(
                    transactor.clone(),
                    Arc::new(MockCelerApi::failing(xcrack_route_planner::bridges::BridgeError::ApiError {
                        message: "mock mode".to_string(),
                    })),
                    config.celer_contracts(),
                )),
                Arc::new(SwapParaswapProcessor::new(transactor.clone(), Arc::new(MockParaswapApi::new()))),
                Arc::new(EnsRegisterProcessor::new(transactor.clone(), config.ens_registrars())),
            ]
        } else {
            let mut paraswap = ParaswapHttpClient::new(config.paraswap.partner_id.clone());
            if let (Some(prices), Some(transactions)) = (&config.paraswap.prices_url, &config.paraswap.transactions_url) {
                paraswap = paraswap.with_urls(prices, transactions);
            }
            vec![
                Arc::new(TransferProcessor::new(transactor.clone())),
                Arc::new(Erc721Processor::new(transactor.clone())),
                Arc::new(Erc1155Processor::new(transactor.clone())),
                Arc::new(HopBridgeProcessor::new(transactor.clone(), Arc::new(HopHttpClient::new()), config.hop_contracts())),
                Arc::new(CelerBridgeProcessor::new(transactor.clone(), Arc::new(CelerHttpClient::new()), config.celer_contracts())),
                Arc::new(SwapParaswapProcessor::new(transactor.clone(), Arc::new(paraswap))),
                Arc::new(EnsRegisterProcessor::new(transactor.clone(), config.ens_registrars())),
            ]
        };

        let oracle: Arc<dyn TokenOracle> = if mock_mode {
            let balance = U256::from(mocks::get_mock_config().native_balance);
            let mut oracle = MockTokenOracle::default().with_price("ETH", 2000.0).with_price("USDC", 1.0).with_price("DAI", 1.0);
            for network in &networks {
                oracle = oracle.with_balance(network.chain_id, Address::ZERO, balance);
            }
            for token in tokens.tokens() {
                oracle = oracle.with_balance(token.chain_id, token.address, balance);
            }
            Arc::new(oracle)
        } else {
            Arc::new(ChainTokenOracle::new(provider.clone(), CryptoCompareFeed::new()))
        };

        let store: Arc<dyn RouteStore> = match &config.storage.redis_url {
            Some(url) if !mock_mode => Arc::new(RedisRouteStore::new(Some(url.as_str())).await?),
            _ => Arc::new(MemoryRouteStore::new()),
        };

        let (events, rx) = ChannelEventSink::shared();
        let router = Arc::new(
            Router::new(provider, registry(processors), oracle, tokens, networks, events.clone())
                .with_refresh_interval(Duration::from_secs(config.router.refresh_interval_secs)),
        );
        let execution =
            RouteExecutionManager::new(router.clone(), Arc::new(TransactionManager::new(transactor)), store, events)
                .with_user_response_timeout(Duration::from_secs(config.router.user_response_timeout_secs));

        Ok(Self { router, execution, events: rx })
    }

    async fn suggest(&self, params: RouteInputParams) -> Result<()> {
        let token_id = params.token_id.clone();
        let routes = self.router.suggested_routes(params).await?;
        info!("🧭 {} candidate paths, best route has {} legs", routes.candidates.len(), routes.best.len());
        for path in &routes.best {
            info!(
                "  ➡️ {} {} -> {}: {} {} (fee {} wei)",
                path.processor_name,
                path.from_chain.chain_name,
                path.to_chain.chain_name,
                format_units(path.amount_in, path.from_token.decimals),
                token_id,
                path.tx_total_fee
            );
        }
        println!("{}", serde_json::to_string_pretty(&routes.best)?);
        Ok(())
    }

    async fn execute(mut self, params: RouteInputParams, signer: &LocalKeySigner, broadcast: bool) -> Result<()> {
        let uuid = params.uuid.clone();
        self.router.suggested_routes(params).await?;

        if broadcast {
            let sent = self.execution.execute_with_signer(&uuid, signer).await?;
            for tx in &sent {
                info!("📤 chain {} nonce {}: {:#x}", tx.from_chain, tx.nonce, tx.hash);
            }
        } else {
            let signing = self.execution.build_transactions_from_route(&uuid).await?;
            let signatures = signer.sign_hashes(&signing.hashes).await?;
            for entry in &signing.hashes {
                let signed = signatures.contains_key(&entry.identity_key);
                info!("✍️ {} hash {:#x} signed={}", entry.identity_key, entry.hash, signed);
            }
            warn!("🧪 dry-run: 전송하지 않음 (--broadcast 로 전송)");
            self.execution.clear_local_route_data().await;
        }

        while let Ok(event) = self.events.try_recv() {
            info!("📣 event {}", event.name());
        }
        Ok(())
    }
}

fn load_signer(config: &Config) -> Result<LocalKeySigner> {
    match &config.private_key {
        Some(key) => Ok(LocalKeySigner::from_private_key(key)?),
        None if mocks::is_mock_mode() => Ok(LocalKeySigner::random()),
        None => Err(anyhow!("PRIVATE_KEY is required for execute")),
    }
}

fn input_params(matches: &ArgMatches, default_from: Option<Address>) -> Result<RouteInputParams> {
    let from = match matches.get_one::<String>("from") {
        Some(addr) => Address::from_str(addr).context("invalid --from")?,
        None => default_from.ok_or_else(|| anyhow!("--from is required"))?,
    };
    let to = matches
        .get_one::<String>("to")
        .ok_or_else(|| anyhow!("--to is required"))
        .and_then(|a| Address::from_str(a).context("invalid --to"))?;
    let amount = matches
        .get_one::<String>("amount")
        .ok_or_else(|| anyhow!("--amount is required"))
        .and_then(|a| U256::from_str(a).context("invalid --amount"))?;
    let send_type_raw = matches.get_one::<String>("send-type").map(String::as_str).unwrap_or("transfer");
    let send_type: SendType = serde_json::from_value(serde_json::Value::String(send_type_raw.to_string()))
        .map_err(|_| anyhow!("unknown send type {}", send_type_raw))?;

    let chains = |name: &str| -> Result<Vec<ChainId>> {
        matches
            .get_many::<String>(name)
            .into_iter()
            .flatten()
            .map(|c| c.parse::<ChainId>().with_context(|| format!("invalid chain id {}", c)))
            .collect()
    };

    let mut from_locked_amount = HashMap::new();
    for entry in matches.get_many::<String>("locked").into_iter().flatten() {
        let (chain, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("--locked expects CHAIN=AMOUNT, got {}", entry))?;
        from_locked_amount.insert(chain.parse::<ChainId>()?, U256::from_str(value)?);
    }

    Ok(RouteInputParams {
        uuid: uuid::Uuid::new_v4().to_string(),
        send_type,
        addr_from: from,
        addr_to: to,
        amount_in: amount,
        token_id: matches.get_one::<String>("token").cloned().unwrap_or_else(|| "ETH".to_string()),
        to_token_id: matches.get_one::<String>("to-token").cloned(),
        disabled_from_chain_ids: chains("disabled-from")?,
        disabled_to_chain_ids: chains("disabled-to")?,
        from_locked_amount,
        slippage_percentage: 0.5,
        username: matches.get_one::<String>("username").cloned(),
        ..Default::default()
    })
}

/// wei → 사람이 읽는 단위. Decimal 범위를 넘으면 원래 값을 그대로 출력
fn format_units(amount: U256, decimals: u8) -> String {
    let Ok(mut value) = Decimal::from_str(&amount.to_string()) else {
        return amount.to_string();
    };
    if value.set_scale(u32::from(decimals)).is_err() {
        return amount.to_string();
    }
    value.normalize().to_string()
}
