use alloy::primitives::{address, Address};

use crate::types::ChainId;

// Chain ids
pub const ETHEREUM_MAINNET: ChainId = 1;
pub const ETHEREUM_SEPOLIA: ChainId = 11155111;
pub const OPTIMISM_MAINNET: ChainId = 10;
pub const OPTIMISM_SEPOLIA: ChainId = 11155420;
pub const ARBITRUM_MAINNET: ChainId = 42161;
pub const ARBITRUM_SEPOLIA: ChainId = 421614;
pub const BASE_MAINNET: ChainId = 8453;
pub const BASE_SEPOLIA: ChainId = 84532;
pub const BSC_MAINNET: ChainId = 56;

/// Chain ids that charge an L1 data fee through the OP-stack GasPriceOracle.
pub const OP_STACK_CHAINS: [ChainId; 4] = [OPTIMISM_MAINNET, OPTIMISM_SEPOLIA, BASE_MAINNET, BASE_SEPOLIA];

// OP-stack predeploy
pub const GAS_PRICE_ORACLE: Address = address!("420000000000000000000000000000000000000F");

/// Native asset placeholder used by swap aggregators.
pub const NATIVE_TOKEN_PLACEHOLDER: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

// Gas
pub const INCREASE_ESTIMATED_GAS_FACTOR: f64 = 1.1;
pub const DEFAULT_APPROVAL_GAS: u64 = 65_000;
pub const DEFAULT_TRANSFER_GAS: u64 = 21_000;

// Fee history
pub const FEE_HISTORY_BLOCK_COUNT: u64 = 100;
pub const REWARD_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];
pub const INCLUSION_BUFFER_SECS: u64 = 3;

// Route building
pub const MAX_ROUTE_DEPTH: usize = 3;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_USER_RESPONSE_TIMEOUT_SECS: u64 = 300;

// Paraswap
/// 0.7%
pub const PARASWAP_PARTNER_FEE_BPS: u32 = 70;
pub const PARASWAP_DEFAULT_PARTNER_ID: &str = "xcrack.route";
pub const PARASWAP_BUILD_MAX_ATTEMPTS: u32 = 3;
pub const PARASWAP_BASE_RETRY_DELAY_MS: u64 = 1_000;

// Processor names
pub const PROCESSOR_TRANSFER_NAME: &str = "Transfer";
pub const PROCESSOR_ERC721_NAME: &str = "ERC721Transfer";
pub const PROCESSOR_ERC1155_NAME: &str = "ERC1155Transfer";
pub const PROCESSOR_BRIDGE_HOP_NAME: &str = "Hop";
pub const PROCESSOR_BRIDGE_CELER_NAME: &str = "CBridge";
pub const PROCESSOR_SWAP_PARASWAP_NAME: &str = "Paraswap";
pub const PROCESSOR_ENS_REGISTER_NAME: &str = "ENSRegister";

// Token symbols
pub const ETH_SYMBOL: &str = "ETH";
pub const SNT_SYMBOL: &str = "SNT";
pub const STT_SYMBOL: &str = "STT";
