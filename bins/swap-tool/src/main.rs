// bins/swap-tool/src/main.rs

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use swap_common::{
    inspect_flow, load_config_file, load_env, load_keypair, parse_amount, parse_owner,
    parse_signature, swap_flow, ConfigLayer, SwapError, SwapParams, SwapResult,
};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "swap-tool", version, about = "Swap tokens through Jupiter and inspect the result")]
struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Config file (default: swap-tool.toml or config/swap-tool.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "RUST_LOG", default_value = "info", help = "Log filter")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quote, build, sign and simulate or send a swap
    Jupiter(JupiterCmd),
    /// Print the balance changes of a landed transaction for one wallet
    Solana(SolanaCmd),
}

#[derive(Args, Debug)]
struct JupiterCmd {
    #[arg(env = "SECRET_KEY", hide_env_values = true, help = "Base58 secret key or keypair file")]
    private_key: String,
    input_mint: String,
    output_mint: String,
    #[arg(help = "Amount in the smallest units of the input mint")]
    amount: String,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Args, Debug)]
struct SolanaCmd {
    #[arg(help = "Wallet address, or its base58 secret key")]
    owner: String,
    signature: String,

    #[command(flatten)]
    overrides: Overrides,
}

/// Flags with environment fallbacks; whatever stays unset comes from the config file.
#[derive(Args, Debug)]
struct Overrides {
    #[arg(long, env = "SWAP_API", value_name = "URL")]
    swap_api: Option<String>,
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "RPC_URL", value_name = "URL")]
    chain_rpc: Option<String>,
    #[arg(long, env = "WSS_URL", value_name = "URL")]
    chain_wss: Option<String>,
    #[arg(long, env = "SIMULATE", value_name = "BOOL")]
    simulate: Option<bool>,
    #[arg(long, env = "SLIPPAGE_BPS", help = "0 lets the routing service choose")]
    slippage_bps: Option<u16>,
    #[arg(long, env = "CONFIRM_TIMEOUT", value_name = "SECS")]
    timeout: Option<u64>,
}

impl From<Overrides> for ConfigLayer {
    fn from(o: Overrides) -> Self {
        ConfigLayer {
            swap_api: o.swap_api,
            api_key: o.api_key,
            chain_rpc: o.chain_rpc,
            chain_wss: o.chain_wss,
            simulate: o.simulate,
            slippage_bps: o.slippage_bps,
            timeout: o.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env first so clap sees its values as environment
    load_env();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let file = load_config_file(cli.config.clone())?;
    let outcome = match cli.command {
        Command::Jupiter(cmd) => run_jupiter(cmd, file).await,
        Command::Solana(cmd) => run_solana(cmd, file).await,
    };

    Ok(match outcome {
        Ok(code) => code,
        Err(err) => report_error(&err),
    })
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run_jupiter(cmd: JupiterCmd, file: ConfigLayer) -> SwapResult<ExitCode> {
    let config = ConfigLayer::from(cmd.overrides).over(file).resolve();
    debug!(
        swap_api = %config.swap_api_url,
        rpc = %config.rpc_url,
        simulate = config.simulate,
        slippage_bps = config.slippage_bps,
        "resolved configuration"
    );
    let keypair = load_keypair(&cmd.private_key)?;
    let params = SwapParams {
        input_mint: cmd.input_mint,
        output_mint: cmd.output_mint,
        amount: parse_amount(&cmd.amount)?,
    };

    let report = swap_flow(config, &keypair, params).await?;
    println!("{}", report.render());
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_solana(cmd: SolanaCmd, file: ConfigLayer) -> SwapResult<ExitCode> {
    let config = ConfigLayer::from(cmd.overrides).over(file).resolve();
    let owner = parse_owner(&cmd.owner)?;
    let signature = parse_signature(&cmd.signature)?;

    let balances = inspect_flow(config, owner, signature).await?;
    println!("Transaction signature: {signature}\n{}", balances.render());
    Ok(ExitCode::SUCCESS)
}

fn report_error(err: &SwapError) -> ExitCode {
    if err.is_soft() {
        eprintln!("warning: {err}");
    } else {
        eprintln!("error: {err}");
    }
    ExitCode::from(err.exit_code())
}
