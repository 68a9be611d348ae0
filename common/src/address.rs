use std::str::FromStr;

use solana_sdk::{pubkey, pubkey::Pubkey, signature::Signature, signer::Signer};
use tracing::warn;

use crate::config::keypair_from_base58;
use crate::error::{SwapError, SwapResult};

pub const SPL_TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Parses every identifier as a base58 account address.
///
/// Stops at the first bad one; nothing after it is looked at.
pub fn validate_addresses(addresses: &[&str]) -> SwapResult<Vec<Pubkey>> {
    addresses
        .iter()
        .map(|addr| {
            Pubkey::from_str(addr).map_err(|err| {
                warn!(address = %addr, "invalid input address");
                SwapError::Validation(format!("invalid address {addr:?}: {err}"))
            })
        })
        .collect()
}

pub fn parse_amount(raw: &str) -> SwapResult<u64> {
    match raw.parse::<u64>() {
        Ok(0) => Err(SwapError::Validation("amount must be greater than zero".into())),
        Ok(amount) => Ok(amount),
        Err(err) => Err(SwapError::Validation(format!("invalid amount {raw:?}: {err}"))),
    }
}

pub fn parse_signature(raw: &str) -> SwapResult<Signature> {
    Signature::from_str(raw)
        .map_err(|err| SwapError::Validation(format!("invalid signature {raw:?}: {err}")))
}

/// Wallet address given either directly or as the base58 secret key behind it.
pub fn parse_owner(raw: &str) -> SwapResult<Pubkey> {
    match Pubkey::from_str(raw) {
        Ok(owner) => Ok(owner),
        Err(_) => keypair_from_base58(raw).map(|keypair| keypair.pubkey()),
    }
}

/// Token account that holds `mint` for `owner` under the classic token program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), SPL_TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}
