//! StreamIndex CLI: replay StreamPayment logs and inspect derived state.
//!
//! # Commands
//! ```
//! streamindex replay     --logs <recording.json> [--config <indexer.json>] [--creator <addr>]
//! streamindex signatures [--json]
//! streamindex project    --rate <units/s> --deposit <units> --start <unix> [--now <unix>]
//! streamindex networks
//! streamindex info
//! ```

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use streamindex_core::entity::{per_minute, Stream};
use streamindex_core::indexer::IndexerConfig;
use streamindex_core::projection;
use streamindex_evm::{Network, STREAM_PAYMENT_EVENTS};

mod cmd_replay;
mod logging;

use logging::{init_tracing, LogConfig};

/// USDC, the contract's payment token.
const TOKEN_DECIMALS: u8 = 6;

#[derive(Parser)]
#[command(
    name = "streamindex",
    about = "Event-sourced indexer for the StreamPayment pay-per-second contract",
    long_about = "
StreamIndex CLI: fold StreamPayment contract logs into creator and stream
aggregates, print the contract's event signatures, and project streamed cost.

ENVIRONMENT VARIABLES:
  RUST_LOG    tracing filter directives (override --log-level)
",
    version
)]
struct Cli {
    /// Global log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit JSON structured logs on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Load a full logging config (JSON) instead of the flags above
    #[arg(long, global = true)]
    log_config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded log file through the indexer
    Replay {
        /// JSON recording: an array of eth_getLogs entries, or {"logs": [...], "blocks": [...]}
        #[arg(long)]
        logs: String,
        /// Indexer config JSON (chain, contract, from_block, dedupe, ...)
        #[arg(long)]
        config: Option<String>,
        /// Known deployment: polygon-amoy | base-sepolia
        #[arg(long)]
        network: Option<String>,
        /// Override the first block to index
        #[arg(long)]
        from_block: Option<u64>,
        /// Disable the duplicate-delivery guard
        #[arg(long)]
        no_dedupe: bool,
        /// Show the dashboard and history for this creator instead of the summary
        #[arg(long)]
        creator: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the contract's event signatures and topic0 hashes
    Signatures {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Project how much a stream has cost at a point in time
    Project {
        /// Rate in token base units per second
        #[arg(long)]
        rate: String,
        /// Deposit in token base units
        #[arg(long)]
        deposit: String,
        /// Stream start (unix seconds)
        #[arg(long)]
        start: u64,
        /// Projection time (unix seconds, default: now)
        #[arg(long)]
        now: Option<u64>,
        /// Token decimals (at most 77, the widest scale a uint256 can hold)
        #[arg(long, default_value_t = TOKEN_DECIMALS, value_parser = clap::value_parser!(u8).range(..=77))]
        decimals: u8,
    },

    /// List known StreamPayment deployments
    Networks,

    /// Show StreamIndex build and default configuration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&log_config(&cli)?);

    match cli.command {
        Commands::Replay { logs, config, network, from_block, no_dedupe, creator, json } => {
            cmd_replay::run(cmd_replay::ReplayArgs {
                logs: &logs,
                config: config.as_deref(),
                network: network.as_deref(),
                from_block,
                no_dedupe,
                creator: creator.as_deref(),
                json,
            })
            .await
        }

        Commands::Signatures { json } => cmd_signatures(json),

        Commands::Project { rate, deposit, start, now, decimals } => {
            cmd_project(&rate, &deposit, start, now, decimals)
        }

        Commands::Networks => cmd_networks(),

        Commands::Info => cmd_info(),
    }
}

fn log_config(cli: &Cli) -> Result<LogConfig> {
    if let Some(path) = &cli.log_config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read log config '{path}'"))?;
        return serde_json::from_str(&text).with_context(|| format!("parse log config '{path}'"));
    }
    Ok(LogConfig {
        level: cli.log_level.clone(),
        json: cli.log_json,
        ..LogConfig::default()
    })
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_signatures(as_json: bool) -> Result<()> {
    if as_json {
        let table: Vec<_> = STREAM_PAYMENT_EVENTS
            .iter()
            .map(|abi| {
                serde_json::json!({
                    "event": abi.name(),
                    "signature": abi.signature(),
                    "topic0": abi.topic0(),
                    "table": abi.kind.table_name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    for abi in &STREAM_PAYMENT_EVENTS {
        println!("{:26} {}", abi.name(), abi.topic0());
        println!("{:26} {}", "", abi.signature());
    }
    Ok(())
}

fn cmd_project(rate: &str, deposit: &str, start: u64, now: Option<u64>, decimals: u8) -> Result<()> {
    let rate: U256 = rate.parse().map_err(|e| anyhow!("invalid rate '{rate}': {e}"))?;
    let deposit: U256 = deposit
        .parse()
        .map_err(|e| anyhow!("invalid deposit '{deposit}': {e}"))?;
    let now = match now {
        Some(now) => now,
        None => u64::try_from(chrono::Utc::now().timestamp()).context("system clock before 1970")?,
    };

    let stream = Stream {
        stream_id: U256::ZERO,
        payer: Address::ZERO,
        receiver: Address::ZERO,
        rate_per_second: rate,
        rate_per_minute: per_minute(rate),
        deposit,
        start_time: U256::from(start),
        is_active: true,
        end_time: None,
        duration: None,
        total_paid: None,
        refunded: None,
        created_at_block: 0,
        created_at_timestamp: start,
        stopped_at_block: None,
        stopped_at_timestamp: None,
    };

    let fmt = |v: U256| projection::format_units(v, decimals, decimals.min(4));
    println!("Rate:        {} /s  ({} /min)", fmt(rate), fmt(projection::cost_per_minute(rate)));
    println!("Deposit:     {}", fmt(deposit));
    println!("Elapsed:     {}s", projection::elapsed_seconds(&stream, now));
    println!("Streamed:    {}", fmt(projection::streamed_amount(&stream, now)));
    println!("Remaining:   {}", fmt(projection::remaining_deposit(&stream, now)));
    match projection::seconds_until_exhausted(&stream, now) {
        Some(0) => println!("Exhausted:   yes"),
        Some(secs) => println!("Exhausted:   in {secs}s"),
        None => println!("Exhausted:   never (zero rate)"),
    }
    Ok(())
}

fn cmd_networks() -> Result<()> {
    for n in Network::ALL {
        println!("{:14} chain_id={:<7} contract={}", n.slug(), n.chain_id(), n.contract());
    }
    Ok(())
}

fn cmd_info() -> Result<()> {
    let defaults = IndexerConfig::default();
    println!("StreamIndex v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Indexed events:              {}", STREAM_PAYMENT_EVENTS.len());
    println!("Default confirmation depth:  {} blocks", defaults.confirmation_depth);
    println!("Default batch size:          {} blocks/call", defaults.batch_size);
    println!("Default checkpoint interval: every {} blocks", defaults.checkpoint_interval);
    println!(
        "Duplicate guard:             {} (window {})",
        if defaults.dedupe_events { "on" } else { "off" },
        defaults.dedupe_window
    );
    println!("Storage backends:            memory, SQLite (feature: sqlite)");
    println!(
        "Networks:                    {}",
        Network::ALL.map(|n| n.slug()).join(", ")
    );
    Ok(())
}
