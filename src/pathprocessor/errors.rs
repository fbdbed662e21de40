use thiserror::Error;

use crate::blockchain::ChainError;
use crate::fees::FeeError;
use crate::transactions::TransactionError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessorError {
    #[error("no chain set")]
    NoChainSet,

    #[error("no token set")]
    NoTokenSet,

    #[error("to and from tokens must be set")]
    ToAndFromTokensMustBeSet,

    #[error("to token should not be set")]
    ToTokenShouldNotBeSet,

    #[error("from and to chains must be same")]
    FromAndToChainsMustBeSame,

    #[error("from and to chains must be different")]
    FromAndToChainsMustBeDifferent,

    #[error("from and to tokens must be different")]
    FromAndToTokensMustBeDifferent,

    #[error("token not supported by {processor} on chain {chain_id}")]
    TokenNotSupported { processor: &'static str, chain_id: u64 },

    #[error("only {0} token can be used for this operation")]
    OnlyTokenAllowed(&'static str),

    #[error("username and public key are required")]
    MissingEnsDetails,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid collectible id: {0}")]
    InvalidCollectibleId(String),

    #[error("no estimation found")]
    NoEstimationFound,

    #[error("price route not found")]
    PriceRouteNotFound,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("error converting amount: {0}")]
    ConvertingAmount(String),

    #[error("price timeout")]
    PriceTimeout,

    #[error("not enough liquidity")]
    NotEnoughLiquidity,

    #[error("price impact too high")]
    PriceImpactTooHigh,

    #[error("{processor}: {message}")]
    Upstream { processor: &'static str, message: String },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl ProcessorError {
    pub fn upstream(processor: &'static str, err: impl std::fmt::Display) -> Self {
        ProcessorError::Upstream { processor, message: err.to_string() }
    }

    /// Stable error code for event payloads
    pub fn code(&self) -> &'static str {
        match self {
            ProcessorError::NoChainSet => "WPP-001",
            ProcessorError::NoTokenSet => "WPP-002",
            ProcessorError::ToAndFromTokensMustBeSet => "WPP-003",
            ProcessorError::FromAndToChainsMustBeSame => "WPP-004",
            ProcessorError::ToTokenShouldNotBeSet => "WPP-023",
            ProcessorError::FromAndToChainsMustBeDifferent => "WPP-005",
            ProcessorError::FromAndToTokensMustBeDifferent => "WPP-006",
            ProcessorError::TokenNotSupported { .. } => "WPP-007",
            ProcessorError::OnlyTokenAllowed(_) => "WPP-008",
            ProcessorError::MissingEnsDetails => "WPP-009",
            ProcessorError::InvalidPublicKey(_) => "WPP-010",
            ProcessorError::InvalidCollectibleId(_) => "WPP-011",
            ProcessorError::NoEstimationFound => "WPP-012",
            ProcessorError::PriceRouteNotFound => "WPP-013",
            ProcessorError::TransactionNotFound => "WPP-014",
            ProcessorError::ConvertingAmount(_) => "WPP-015",
            ProcessorError::PriceTimeout => "WPP-016",
            ProcessorError::NotEnoughLiquidity => "WPP-017",
            ProcessorError::PriceImpactTooHigh => "WPP-018",
            ProcessorError::Upstream { .. } => "WPP-019",
            ProcessorError::Chain(_) => "WPP-020",
            ProcessorError::Fee(_) => "WPP-021",
            ProcessorError::Transaction(_) => "WPP-022",
        }
    }
}
