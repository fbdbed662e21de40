use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{
    ARBITRUM_MAINNET, BASE_MAINNET, DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_USER_RESPONSE_TIMEOUT_SECS,
    ETHEREUM_MAINNET, OPTIMISM_MAINNET, PARASWAP_DEFAULT_PARTNER_ID,
};
use crate::pathprocessor::bridge_celer::CelerContracts;
use crate::pathprocessor::bridge_hop::HopContracts;
use crate::types::{ChainId, Network, Token};

/// 네트워크 설정 (RPC 포함)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(flatten)]
    pub network: Network,
    pub rpc_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_user_response_timeout")]
    pub user_response_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            user_response_timeout_secs: DEFAULT_USER_RESPONSE_TIMEOUT_SECS,
        }
    }
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_user_response_timeout() -> u64 {
    DEFAULT_USER_RESPONSE_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParaswapConfig {
    #[serde(default = "default_partner_id")]
    pub partner_id: String,
    #[serde(default)]
    pub prices_url: Option<String>,
    #[serde(default)]
    pub transactions_url: Option<String>,
}

impl Default for ParaswapConfig {
    fn default() -> Self {
        Self { partner_id: default_partner_id(), prices_url: None, transactions_url: None }
    }
}

fn default_partner_id() -> String {
    PARASWAP_DEFAULT_PARTNER_ID.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    /// 없으면 in-memory 저장소 사용
    #[serde(default)]
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HopContractEntry {
    pub chain_id: ChainId,
    pub token: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainContractEntry {
    pub chain_id: ChainId,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContractConfig {
    #[serde(default)]
    pub hop: Vec<HopContractEntry>,
    #[serde(default)]
    pub celer: Vec<ChainContractEntry>,
    #[serde(default)]
    pub ens_registrar: Vec<ChainContractEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub paraswap: ParaswapConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub contracts: ContractConfig,
    /// env(PRIVATE_KEY) 전용, 파일에 저장하지 않음
    #[serde(skip)]
    pub private_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let network = |chain_id: ChainId, name: &str, layer: u8, block_time_secs: u64, rpc_url: &str| NetworkConfig {
            network: Network {
                chain_id,
                chain_name: name.to_string(),
                native_currency_symbol: "ETH".to_string(),
                native_currency_decimals: 18,
                eip1559_enabled: true,
                layer,
                is_test: false,
                block_time_secs,
            },
            rpc_url: rpc_url.to_string(),
        };

        Self {
            router: RouterConfig::default(),
            paraswap: ParaswapConfig::default(),
            storage: StorageConfig::default(),
            networks: vec![
                network(ETHEREUM_MAINNET, "Ethereum", 1, 12, "https://eth.llamarpc.com"),
                network(OPTIMISM_MAINNET, "Optimism", 2, 2, "https://mainnet.optimism.io"),
                network(ARBITRUM_MAINNET, "Arbitrum", 2, 1, "https://arb1.arbitrum.io/rpc"),
                network(BASE_MAINNET, "Base", 2, 2, "https://mainnet.base.org"),
            ],
            tokens: Vec::new(),
            contracts: ContractConfig::default(),
            private_key: None,
        }
    }
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("cannot read config {}: {}", path, e))?;
        let config: Config = toml::from_str(&content)?;
        info!("📋 설정 로드: {} ({} networks, {} tokens)", path, config.networks.len(), config.tokens.len());
        Ok(config)
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// `RPC_URL_<chain_id>`, `PARASWAP_PARTNER_ID`, `REDIS_URL`, `PRIVATE_KEY`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for entry in &mut self.networks {
            if let Some(url) = lookup(&format!("RPC_URL_{}", entry.network.chain_id)) {
                debug!("🔧 RPC override for chain {}", entry.network.chain_id);
                entry.rpc_url = url;
            }
        }
        if let Some(partner_id) = lookup("PARASWAP_PARTNER_ID") {
            self.paraswap.partner_id = partner_id;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.storage.redis_url = Some(url);
        }
        if let Some(key) = lookup("PRIVATE_KEY") {
            self.private_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            return Err(anyhow!("at least one network must be configured"));
        }

        let mut chain_ids = HashSet::new();
        for entry in &self.networks {
            if entry.rpc_url.is_empty() {
                return Err(anyhow!("RPC URL for chain {} cannot be empty", entry.network.chain_id));
            }
            if !chain_ids.insert(entry.network.chain_id) {
                return Err(anyhow!("chain {} configured twice", entry.network.chain_id));
            }
        }

        for token in &self.tokens {
            if !chain_ids.contains(&token.chain_id) {
                return Err(anyhow!("token {} references unknown chain {}", token.symbol, token.chain_id));
            }
        }

        let contract_chains = self
            .contracts
            .hop
            .iter()
            .map(|c| c.chain_id)
            .chain(self.contracts.celer.iter().map(|c| c.chain_id))
            .chain(self.contracts.ens_registrar.iter().map(|c| c.chain_id));
        for chain_id in contract_chains {
            if !chain_ids.contains(&chain_id) {
                return Err(anyhow!("contract configured for unknown chain {}", chain_id));
            }
        }

        if self.router.refresh_interval_secs == 0 {
            return Err(anyhow!("router refresh interval must be greater than 0"));
        }
        if self.router.user_response_timeout_secs == 0 {
            return Err(anyhow!("user response timeout must be greater than 0"));
        }

        if let Some(key) = &self.private_key {
            let raw = key.trim_start_matches("0x");
            if raw.len() != 64 || hex::decode(raw).is_err() {
                return Err(anyhow!("PRIVATE_KEY must be 32 hex-encoded bytes"));
            }
        }

        Ok(())
    }

    pub fn network_list(&self) -> Vec<Network> {
        self.networks.iter().map(|n| n.network.clone()).collect()
    }

    pub fn rpc_urls(&self) -> HashMap<ChainId, String> {
        self.networks.iter().map(|n| (n.network.chain_id, n.rpc_url.clone())).collect()
    }

    pub fn hop_contracts(&self) -> HopContracts {
        let mut contracts: HopContracts = HashMap::new();
        for entry in &self.contracts.hop {
            contracts.entry(entry.chain_id).or_default().insert(entry.token.clone(), entry.address);
        }
        contracts
    }

    pub fn celer_contracts(&self) -> CelerContracts {
        self.contracts.celer.iter().map(|c| (c.chain_id, c.address)).collect()
    }

    pub fn ens_registrars(&self) -> HashMap<ChainId, Address> {
        self.contracts.ens_registrar.iter().map(|c| (c.chain_id, c.address)).collect()
    }
}
