pub mod builder;
pub mod client;
pub mod types;

pub use builder::{build_swap_request, DYNAMIC_SLIPPAGE};
pub use client::{fetch_quote, fetch_swap_transaction, JupiterClient, RoutingApi, DEFAULT_SWAP_API};
pub use types::{
    DynamicSlippage, DynamicSlippageReport, PlatformFee, RoutePlan, SwapInfo, SwapMode, SwapQuote,
    SwapQuoteRequest, SwapRequest, SwapResponse, SwapTransaction,
};
