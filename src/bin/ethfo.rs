//! ethfo: query an Ethereum node pair through the failover client.
//!
//! Endpoints come from `ETHCLIENT_*` environment variables, a TOML file, or
//! flags. After the query the collected request metrics are printed in the
//! Prometheus text format.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use prometheus::{Encoder, TextEncoder};
use tracing_subscriber::EnvFilter;

use eth_failover::types::{Address, SyncingStatus};
use eth_failover::{CallContext, Config, EthClient, FailoverClient, FailoverError, Logger};

/// Query an Ethereum node with automatic failover.
#[derive(Parser)]
#[command(name = "ethfo")]
#[command(version)]
#[command(about = "Query an Ethereum node with automatic failover")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Primary endpoint URL.
    #[arg(long, env = "ETHCLIENT_RPCURL")]
    rpc_url: Option<String>,

    /// Primary endpoint name.
    #[arg(long, env = "ETHCLIENT_RPCNAME")]
    rpc_name: Option<String>,

    /// Failover endpoint URL.
    #[arg(long, env = "ETHCLIENT_FAILOVERRPCURL")]
    failover_rpc_url: Option<String>,

    /// Failover endpoint name.
    #[arg(long, env = "ETHCLIENT_FAILOVERRPCNAME")]
    failover_rpc_name: Option<String>,

    /// Record request metrics; overrides the configuration file when given.
    #[arg(long, env = "ETHCLIENT_ENABLEPROMETHEUS", value_parser = BoolishValueParser::new())]
    enable_prometheus: Option<bool>,

    /// Application label for metrics.
    #[arg(long, default_value = "ethfo")]
    app: String,

    /// Chain label for metrics.
    #[arg(long, default_value = "mainnet")]
    chain: String,

    /// Per-call timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Skip printing metrics after the query.
    #[arg(long)]
    no_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Latest block number.
    BlockNumber,
    /// Chain ID.
    ChainId,
    /// Balance of an account at the latest block.
    Balance {
        /// Account address (0x-prefixed hex).
        address: String,
    },
    /// Suggested gas price in wei.
    GasPrice,
    /// Sync status of the node.
    Sync,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    let logger = Logger::new(tracing::Dispatch::new(subscriber));

    let config = load_config(&args)?;
    let client = FailoverClient::builder(&args.app, &args.chain)
        .config(config)
        .logger(logger)
        .build()
        .await?;

    let ctx = CallContext::background().with_timeout(Duration::from_secs(args.timeout));
    let outcome = run(&client, &ctx, &args.command).await;
    let closed = client.close().await;

    if !args.no_metrics {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        eprint!("{}", String::from_utf8_lossy(&buffer));
    }

    println!("{}", outcome?);
    closed?;
    Ok(())
}

/// File first, then flags/environment. `--enable-prometheus` overrides
/// either source only when given.
fn load_config(args: &Args) -> eth_failover::Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::new(
            required(&args.rpc_url, "ETHCLIENT_RPCURL")?,
            required(&args.rpc_name, "ETHCLIENT_RPCNAME")?,
            required(&args.failover_rpc_url, "ETHCLIENT_FAILOVERRPCURL")?,
            required(&args.failover_rpc_name, "ETHCLIENT_FAILOVERRPCNAME")?,
        )?,
    };
    Ok(match args.enable_prometheus {
        Some(enabled) => config.enable_metrics(enabled),
        None => config,
    })
}

fn required<'a>(value: &'a Option<String>, key: &str) -> eth_failover::Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| FailoverError::MissingConfig(key.to_string()))
}

async fn run(
    client: &FailoverClient,
    ctx: &CallContext,
    command: &Command,
) -> eth_failover::Result<String> {
    Ok(match command {
        Command::BlockNumber => client.block_number(ctx).await?.to_string(),
        Command::ChainId => client.chain_id(ctx).await?.to_string(),
        Command::Balance { address } => {
            let account: Address = address.parse().map_err(|e| FailoverError::InvalidConfig {
                key: "address".to_string(),
                value: format!("{address} ({e})"),
            })?;
            client.balance_at(ctx, account, None).await?.to_string()
        }
        Command::GasPrice => client.suggest_gas_price(ctx).await?.to_string(),
        Command::Sync => match client.sync_progress(ctx).await? {
            SyncingStatus::IsFalse => "synced".to_string(),
            SyncingStatus::IsSyncing(progress) => format!(
                "syncing: {} / {}",
                progress.current_block, progress.highest_block
            ),
        },
    })
}
