use std::time::Duration;

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

pub type SwapResult<T> = std::result::Result<T, SwapError>;

/// Every way a swap run can end short of a rendered report.
///
/// The first six variants are fatal: nothing reached the chain, or the
/// chain rejected it. The last three are soft: the transaction was
/// submitted and may already have landed, so the message always carries the
/// signature.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("routing service request failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("malformed swap transaction: {0}")]
    Decode(String),
    #[error("unable to sign transaction: {0}")]
    Sign(String),
    #[error("transaction rejected: {0:#}")]
    Submission(anyhow::Error),
    #[error("rpc {context} failed: {source:#}")]
    Rpc {
        context: &'static str,
        source: anyhow::Error,
    },
    #[error(
        "no confirmation for {signature} within {}s; the transaction may still confirm or be dropped, check it by hand: {}",
        timeout.as_secs(),
        explorer_url(signature)
    )]
    ConfirmationTimeout {
        signature: Signature,
        timeout: Duration,
    },
    #[error(
        "transaction {signature} confirmed but its details could not be fetched ({source:#}), see {}",
        explorer_url(signature)
    )]
    RecordFetch {
        signature: Signature,
        source: anyhow::Error,
    },
    #[error(
        "transaction {signature} confirmed but account {account} is not part of it, see {}",
        explorer_url(signature)
    )]
    AccountNotFound {
        signature: Signature,
        account: Pubkey,
    },
}

impl SwapError {
    pub fn fetch(err: impl Into<anyhow::Error>) -> Self {
        Self::Fetch(err.into())
    }

    pub fn rpc(context: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::Rpc {
            context,
            source: err.into(),
        }
    }

    /// Soft errors describe a run whose transaction may already be on-chain.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationTimeout { .. } | Self::RecordFetch { .. } | Self::AccountNotFound { .. }
        )
    }

    /// Signature of the submitted transaction, when one exists.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::ConfirmationTimeout { signature, .. }
            | Self::RecordFetch { signature, .. }
            | Self::AccountNotFound { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Process exit status for this outcome.
    ///
    /// Partial successes exit 0: the swap confirmed, only the report is
    /// missing. A timed-out wait gets its own status so scripts can tell it
    /// apart from a hard failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RecordFetch { .. } | Self::AccountNotFound { .. } => 0,
            Self::ConfirmationTimeout { .. } => 2,
            _ => 1,
        }
    }
}

pub fn explorer_url(signature: &Signature) -> String {
    format!("https://explorer.solana.com/tx/{signature}")
}
