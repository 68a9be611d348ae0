// common/src/lib.rs
pub mod address;
pub mod assembler;
pub mod config;
pub mod engine;
pub mod error;
pub mod jupiter;
pub mod report;
pub mod rpc;

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use tracing::info;

pub use address::{parse_amount, parse_owner, parse_signature, validate_addresses};
pub use assembler::{assemble, SignedTransaction, TransactionSigner};
pub use config::{
    keypair_from_base58, load_config_file, load_env, load_keypair, ConfigError, ConfigLayer,
    SwapConfig,
};
pub use engine::{Execution, ExecutionEngine, Mode, Phase, SimulationOutcome};
pub use error::{explorer_url, SwapError, SwapResult};
pub use jupiter::{JupiterClient, RoutingApi, SwapQuoteRequest};
pub use report::{BalanceDiff, ReportError, TransactionRecord};
pub use rpc::{ChainRpc, SolanaRpc};

/// What the user asked to swap.
#[derive(Clone, Debug)]
pub struct SwapParams {
    pub input_mint: String,
    pub output_mint: String,
    /// smallest units of the input mint
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapReport {
    Simulated(SimulationOutcome),
    Confirmed {
        signature: Signature,
        balances: BalanceDiff,
    },
}

impl SwapReport {
    /// A failed simulation still renders a report but is not a success.
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Simulated(outcome) => outcome.succeeded(),
            Self::Confirmed { .. } => true,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Simulated(outcome) => outcome.render(),
            Self::Confirmed {
                signature,
                balances,
            } => format!("Transaction signature: {signature}\n{}", balances.render()),
        }
    }
}

// ─────────────────── Swap Flow (/quote -> /swap -> sign -> simulate | send) ───────────────────

/// Runs one swap against the configured routing service and RPC endpoint.
pub async fn swap_flow(config: SwapConfig, keypair: &Keypair, params: SwapParams) -> SwapResult<SwapReport> {
    let api = JupiterClient::new(config.swap_api_url.clone(), config.api_key.clone())
        .map_err(SwapError::fetch)?;
    let rpc = SolanaRpc::new(config.rpc_url.clone(), config.wss_url.clone());
    run_swap(&config, &api, &rpc, keypair, &params).await
}

/// The swap pipeline over explicit collaborators.
pub async fn run_swap(
    config: &SwapConfig,
    api: &dyn RoutingApi,
    rpc: &dyn ChainRpc,
    keypair: &Keypair,
    params: &SwapParams,
) -> SwapResult<SwapReport> {
    if params.amount == 0 {
        return Err(SwapError::Validation("amount must be greater than zero".into()));
    }
    let mints = validate_addresses(&[params.input_mint.as_str(), params.output_mint.as_str()])?;
    let user = keypair.pubkey();
    let destination = address::associated_token_address(&user, &mints[1]);

    // 1. quote
    let quote_request = SwapQuoteRequest::new(
        &params.input_mint,
        &params.output_mint,
        params.amount,
        config.slippage_bps,
    );
    let quote = jupiter::fetch_quote(api, &quote_request).await?;

    // 2. swap transaction
    let swap = jupiter::fetch_swap_transaction(api, &user.to_string(), &destination.to_string(), quote)
        .await?;

    // 3. fresh blockhash + signature, then straight to the engine
    let signed = assemble(rpc, keypair, &swap.envelope).await?;
    let mode = if config.simulate {
        Mode::Simulate {
            expected_out_amount: swap.expected_out_amount,
        }
    } else {
        Mode::Submit {
            confirm_timeout: config.confirm_timeout,
        }
    };

    match ExecutionEngine::new(rpc).execute(&signed, mode).await? {
        Execution::Simulated(outcome) => Ok(SwapReport::Simulated(outcome)),
        Execution::Confirmed { signature, record } => {
            let balances = balance_report(&user, signature, &record)?;
            Ok(SwapReport::Confirmed {
                signature,
                balances,
            })
        }
    }
}

// ─────────────────── Inspect Flow (getTransaction -> balance report) ───────────────────

/// Balance report of an already landed transaction for `owner`.
pub async fn inspect_flow(config: SwapConfig, owner: Pubkey, signature: Signature) -> SwapResult<BalanceDiff> {
    let rpc = SolanaRpc::new(config.rpc_url, config.wss_url);
    inspect_transaction(&rpc, &owner, signature).await
}

pub async fn inspect_transaction(
    rpc: &dyn ChainRpc,
    owner: &Pubkey,
    signature: Signature,
) -> SwapResult<BalanceDiff> {
    let record = rpc
        .fetch_transaction(&signature)
        .await
        .map_err(|err| SwapError::rpc("getTransaction", err))?;
    balance_report(owner, signature, &record)
}

fn balance_report(owner: &Pubkey, signature: Signature, record: &TransactionRecord) -> SwapResult<BalanceDiff> {
    let balances = BalanceDiff::from_record(owner, record).map_err(|err| match err {
        ReportError::AccountNotFound(account) => SwapError::AccountNotFound { signature, account },
        ReportError::MissingBalance(_) | ReportError::UnknownAccountIndex(_) => SwapError::RecordFetch {
            signature,
            source: err.into(),
        },
    })?;
    info!(%signature, tokens = balances.tokens.len(), "balance report ready");
    Ok(balances)
}
