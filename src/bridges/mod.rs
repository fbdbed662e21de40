pub mod traits;
pub mod hop;
pub mod celer;

// Re-exports
pub use traits::{
    BridgeError, BridgeResult, CelerApi, CelerEstimate, CelerEstimateRequest, HopApi, HopQuote,
    HopQuoteRequest,
};
pub use hop::HopHttpClient;
pub use celer::CelerHttpClient;
