// xCrack Route Planner Library

pub mod config;
pub mod common;
pub mod constants;
pub mod types;
pub mod events;

pub mod blockchain;
pub mod bridges;
pub mod dex;
pub mod fees;
pub mod oracle;
pub mod pathprocessor;
pub mod transactions;

pub mod router;
pub mod routeexecution;
pub mod storage;

pub mod mocks;

// Re-exports for convenience
pub use config::Config;
pub use router::{Router, RouterError, SuggestedRoutes};
pub use routeexecution::{ExecutionError, ExecutionState, RouteExecutionManager};
pub use transactions::TransactionManager;
pub use types::{RouteInputParams, SendType};
