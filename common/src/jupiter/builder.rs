use super::types::{DynamicSlippage, SwapQuote, SwapRequest};

pub const DYNAMIC_SLIPPAGE: DynamicSlippage = DynamicSlippage {
    min_bps: 50,
    max_bps: 300,
};

/// Wraps a quote into the `/swap` body with the fixed execution policy.
pub fn build_swap_request(
    user_public_key: &str,
    destination_token_account: &str,
    mut quote: SwapQuote,
) -> SwapRequest {
    // Service quirk, not business logic: the swap endpoint answers 422 when
    // the echoed quote carries a non-zero platform fee amount.
    quote.platform_fee.amount = "0".to_string();

    SwapRequest {
        user_public_key: user_public_key.to_string(),
        wrap_and_unwrap_sol: true,
        use_shared_accounts: true,
        fee_account: None,
        tracking_account: user_public_key.to_string(),
        prioritization_fee_lamports: 0,
        as_legacy_transaction: false,
        use_token_ledger: false,
        destination_token_account: destination_token_account.to_string(),
        dynamic_compute_unit_limit: true,
        skip_user_accounts_rpc_calls: true,
        dynamic_slippage: DYNAMIC_SLIPPAGE,
        quote_response: quote,
    }
}
