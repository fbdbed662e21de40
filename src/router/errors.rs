use alloy::primitives::U256;
use thiserror::Error;

use crate::blockchain::ChainError;
use crate::fees::FeeError;
use crate::oracle::OracleError;
use crate::pathprocessor::ProcessorError;
use crate::types::{ChainId, ErrorResponse};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RouterError {
    #[error("amount in must be greater than zero")]
    ZeroAmountIn,

    #[error("token {0} not found on any enabled chain")]
    TokenNotFound(String),

    #[error("to token must be set for swaps")]
    MissingToToken,

    #[error("locked amounts exceed the requested amount")]
    LockedAmountExceedsTotal,

    #[error("no candidate path for the request")]
    NoCandidates,

    #[error("no route adds up to the requested amount")]
    NoBestRouteFound,

    #[error("not enough native balance on chain {chain_id}: need {required}")]
    NotEnoughNativeBalance { chain_id: ChainId, required: U256 },

    #[error("not enough token balance on chain {chain_id}: need {required}")]
    NotEnoughTokenBalance { chain_id: ChainId, required: U256 },

    #[error("no route input params, call suggested_routes first")]
    NoRouteInputParams,

    #[error("route uuid {0} does not match the current route")]
    RouteUuidMismatch(String),

    #[error("no path with identity {0} in the best route")]
    PathNotFound(String),

    #[error("custom fee params incomplete for {0}")]
    InvalidCustomParams(String),

    #[error("route calculation cancelled")]
    Cancelled,

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Fee(#[from] FeeError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl RouterError {
    pub fn code(&self) -> &'static str {
        match self {
            RouterError::ZeroAmountIn => "WR-001",
            RouterError::TokenNotFound(_) => "WR-002",
            RouterError::MissingToToken => "WR-003",
            RouterError::LockedAmountExceedsTotal => "WR-004",
            RouterError::NoCandidates => "WR-005",
            RouterError::NoBestRouteFound => "WR-006",
            RouterError::NotEnoughNativeBalance { .. } => "WR-007",
            RouterError::NotEnoughTokenBalance { .. } => "WR-008",
            RouterError::NoRouteInputParams => "WR-009",
            RouterError::RouteUuidMismatch(_) => "WR-010",
            RouterError::PathNotFound(_) => "WR-011",
            RouterError::InvalidCustomParams(_) => "WR-012",
            RouterError::Cancelled => "WR-013",
            RouterError::Processor(e) => e.code(),
            RouterError::Fee(_) => "WR-014",
            RouterError::Chain(_) => "WR-015",
            RouterError::Oracle(_) => "WR-016",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.code(), self.to_string())
    }
}
