//! Balances, token lookup and market prices consumed by the router.

pub mod price_oracle;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use thiserror::Error;

use crate::blockchain::{self, ChainClientProvider, ChainError};
use crate::types::{ChainId, Network, Token};

pub use price_oracle::{CachedPriceOracle, CryptoCompareFeed, PriceData, PriceFeed, FIAT_CURRENCY};

/// Max age of a price used for route ranking
pub const MAX_PRICE_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("price feed unreachable: {0}")]
    Network(String),

    #[error("invalid price feed response: {0}")]
    InvalidResponse(String),

    #[error("no price for {0}")]
    PriceNotFound(String),

    #[error("invalid collectible token id {0}")]
    InvalidTokenId(String),
}

#[async_trait]
pub trait TokenOracle: Send + Sync {
    /// Native balance for the zero address, ERC20 otherwise.
    async fn balance(&self, chain_id: ChainId, token: &Token, account: Address) -> Result<U256, OracleError>;

    /// ERC1155 balance; the token symbol carries the decimal token id.
    async fn erc1155_balance(&self, chain_id: ChainId, token: &Token, account: Address) -> Result<U256, OracleError>;

    async fn price(&self, symbol: &str, max_age: Duration) -> Result<f64, OracleError>;
}

/// `"<contract>:<tokenId>"` collectible identifier
pub fn parse_collectible_id(id: &str) -> Option<(Address, U256)> {
    let (contract, token_id) = id.split_once(':')?;
    let contract = Address::from_str(contract).ok()?;
    let token_id = U256::from_str_radix(token_id, 10).ok()?;
    Some((contract, token_id))
}

/// 설정에서 읽은 토큰 목록
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: Vec<Token>,
}

impl TokenRegistry {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Native currency of the network always resolves even if not listed.
    pub fn find_token(&self, network: &Network, symbol: &str) -> Option<Token> {
        if let Some(token) = self
            .tokens
            .iter()
            .find(|t| t.chain_id == network.chain_id && t.symbol.eq_ignore_ascii_case(symbol))
        {
            return Some(token.clone());
        }
        if symbol.eq_ignore_ascii_case(&network.native_currency_symbol) {
            return Some(Token {
                address: Address::ZERO,
                name: network.native_currency_symbol.clone(),
                symbol: network.native_currency_symbol.clone(),
                decimals: network.native_currency_decimals,
                chain_id: network.chain_id,
            });
        }
        None
    }

    /// Collectibles become a zero-decimals token whose symbol is the token id.
    pub fn find_collectible(&self, network: &Network, id: &str) -> Option<Token> {
        let (contract, token_id) = parse_collectible_id(id)?;
        Some(Token {
            address: contract,
            name: String::new(),
            symbol: token_id.to_string(),
            decimals: 0,
            chain_id: network.chain_id,
        })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// Balances from chain RPC, prices from a cached market feed.
pub struct ChainTokenOracle<F: PriceFeed = CryptoCompareFeed> {
    provider: Arc<dyn ChainClientProvider>,
    prices: CachedPriceOracle<F>,
}

impl<F: PriceFeed> ChainTokenOracle<F> {
    pub fn new(provider: Arc<dyn ChainClientProvider>, feed: F) -> Self {
        Self { provider, prices: CachedPriceOracle::new(feed) }
    }
}

#[async_trait]
impl<F: PriceFeed> TokenOracle for ChainTokenOracle<F> {
    async fn balance(&self, chain_id: ChainId, token: &Token, account: Address) -> Result<U256, OracleError> {
        let client = self.provider.eth_client(chain_id)?;
        Ok(blockchain::token_balance(client.as_ref(), token.address, account).await?)
    }

    async fn erc1155_balance(&self, chain_id: ChainId, token: &Token, account: Address) -> Result<U256, OracleError> {
        let id = U256::from_str_radix(&token.symbol, 10).map_err(|_| OracleError::InvalidTokenId(token.symbol.clone()))?;
        let client = self.provider.eth_client(chain_id)?;
        Ok(blockchain::erc1155_balance(client.as_ref(), token.address, account, id).await?)
    }

    async fn price(&self, symbol: &str, max_age: Duration) -> Result<f64, OracleError> {
        self.prices.price(symbol, max_age).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{network, token};

    #[test]
    fn test_parse_collectible_id() {
        let (contract, id) = parse_collectible_id("0x1111111111111111111111111111111111111111:42").unwrap();
        assert_eq!(contract, Address::repeat_byte(0x11));
        assert_eq!(id, U256::from(42));
        assert!(parse_collectible_id("0x11:abc").is_none());
        assert!(parse_collectible_id("42").is_none());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TokenRegistry::new(vec![token(10, "USDC", 6)]);
        assert_eq!(registry.find_token(&network(10), "usdc").unwrap().decimals, 6);
        assert!(registry.find_token(&network(1), "USDC").is_none());

        let eth = registry.find_token(&network(1), "ETH").unwrap();
        assert!(eth.is_native());

        let nft = registry
            .find_collectible(&network(1), "0x2222222222222222222222222222222222222222:7")
            .unwrap();
        assert_eq!(nft.symbol, "7");
        assert_eq!(nft.decimals, 0);
    }
}
