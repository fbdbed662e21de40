//! DEX aggregator clients

pub mod paraswap;

pub use paraswap::{
    build_transaction_with_retry, BuildTransactionRequest, ParaswapApi, ParaswapError, ParaswapHttpClient,
    ParaswapTransaction, PriceRoute, PriceRouteRequest, RetryPolicy, SwapSide,
};
