//! `streamindex replay`: fold a recorded log file into in-memory aggregates.

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

use streamindex_core::indexer::{IndexerConfig, IndexerStats};
use streamindex_core::query;
use streamindex_core::store::ReadStore;
use streamindex_core::types::Page;
use streamindex_evm::{IndexerBuilder, Network, RecordedChain};
use streamindex_storage::InMemoryStore;

pub struct ReplayArgs<'a> {
    pub logs: &'a str,
    pub config: Option<&'a str>,
    pub network: Option<&'a str>,
    pub from_block: Option<u64>,
    pub no_dedupe: bool,
    pub creator: Option<&'a str>,
    pub json: bool,
}

pub async fn run(args: ReplayArgs<'_>) -> Result<()> {
    let text = std::fs::read_to_string(args.logs)
        .with_context(|| format!("read log recording '{}'", args.logs))?;
    let chain = RecordedChain::from_json(&text)?;
    if chain.is_empty() {
        bail!("'{}' contains no logs", args.logs);
    }
    let head = chain.head();

    let config = load_config(args.config)?;
    let to_block = config.to_block.unwrap_or(head);
    let mut builder = IndexerBuilder::from_config(config.clone())
        .confirmation_depth(0)
        .to_block(to_block);

    // An explicit network wins; otherwise fill in the contract from the chain slug.
    match args.network {
        Some(slug) => builder = builder.network(Network::from_str(slug)?),
        None if config.contract == Address::ZERO => {
            let network = Network::from_str(&config.chain)
                .context("no contract configured and the chain is not a known network")?;
            builder = builder.network(network);
        }
        None => {}
    }
    if let Some(from) = args.from_block {
        builder = builder.from_block(from);
    }
    if args.no_dedupe {
        builder = builder.dedupe_events(false);
    }

    let config = builder.build_config();
    if head < config.from_block {
        bail!(
            "recording ends at block {head}, before from_block {}",
            config.from_block
        );
    }
    tracing::info!(
        logs = chain.len(),
        head,
        chain = %config.chain,
        contract = %config.contract,
        "replaying recording"
    );

    let store = Arc::new(InMemoryStore::new());
    let mut index = IndexerBuilder::from_config(config)
        .build(chain, store.clone(), Box::new(store.clone()))
        .context("build index loop")?;
    index.run().await.context("replay failed")?;
    let stats = index.stats().clone();

    match args.creator {
        Some(creator) => {
            let creator = Address::from_str(creator)
                .with_context(|| format!("invalid creator address '{creator}'"))?;
            print_creator(&store, creator, args.json).await
        }
        None => print_summary(&store, &stats, args.json).await,
    }
}

fn load_config(path: Option<&str>) -> Result<IndexerConfig> {
    let Some(path) = path else {
        return Ok(IndexerConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("read config '{path}'"))?;
    serde_json::from_str(&text).with_context(|| format!("parse config '{path}'"))
}

async fn print_summary(store: &InMemoryStore, stats: &IndexerStats, as_json: bool) -> Result<()> {
    let creators = store.creators()?;
    let streams = store.streams()?;
    let anomalies = store.anomalies().await?;

    if as_json {
        let out = json!({
            "stats": stats,
            "creators": creators,
            "streams": streams,
            "anomalies": anomalies,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Replay complete");
    println!("  Processed:       {}", stats.processed);
    println!("  Recorded:        {}", stats.recorded);
    println!("  Unrecognized:    {}", stats.skipped_unrecognized);
    println!("  Duplicates:      {}", stats.duplicates_dropped);
    println!("  Out of order:    {}", stats.out_of_order);
    println!("  Anomalies:       {}", stats.anomalies);
    if let Some(pos) = stats.last_position {
        println!("  Last position:   {pos}");
    }

    println!("\nCreators ({}):", creators.len());
    for c in &creators {
        println!(
            "  {:#x}  streams={} active={} viewers={} earned={}",
            c.address, c.total_stream_count, c.active_stream_count, c.total_viewers_count, c.total_earned
        );
    }

    println!("\nStreams ({}):", streams.len());
    for s in &streams {
        let status = if s.is_active { "active" } else { "stopped" };
        println!(
            "  #{:<6} {:7} {:#x} -> {:#x}  rate={}/s deposit={}",
            s.stream_id, status, s.payer, s.receiver, s.rate_per_second, s.deposit
        );
    }

    if !anomalies.is_empty() {
        println!("\nAnomalies ({}):", anomalies.len());
        for a in &anomalies {
            println!("  block {} log {}: {}", a.meta.block_number, a.meta.log_index, a.anomaly);
        }
    }
    Ok(())
}

async fn print_creator(store: &InMemoryStore, creator: Address, as_json: bool) -> Result<()> {
    let Some(dashboard) = query::creator_dashboard(store, creator).await? else {
        bail!("creator {creator:#x} never appeared in the recording");
    };
    let history = query::stream_history(store, creator, Page::default()).await?;
    let withdrawals = query::withdrawal_history(store, creator, Page::default()).await?;

    if as_json {
        let out = json!({
            "dashboard": dashboard,
            "streamHistory": history,
            "withdrawals": withdrawals,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let c = &dashboard.creator;
    println!("Creator {:#x}", c.address);
    println!("  Total earned:    {}", c.total_earned);
    println!("  Streams:         {} ({} active)", c.total_stream_count, c.active_stream_count);
    println!("  Unique viewers:  {}", c.total_viewers_count);

    println!("\nActive streams:");
    for s in &dashboard.active_streams {
        println!("  #{:<6} from {:#x}  rate={}/s deposit={}", s.stream_id, s.payer, s.rate_per_second, s.deposit);
    }
    println!("\nStopped streams:");
    for s in &history {
        println!(
            "  #{:<6} from {:#x}  paid={} refunded={}",
            s.stream_id,
            s.payer,
            s.total_paid.unwrap_or_default(),
            s.refunded.unwrap_or_default()
        );
    }
    println!("\nWithdrawals:");
    for w in &withdrawals {
        println!("  {}  amount={}  tx={}", w.block_timestamp, w.amount, w.transaction_hash);
    }
    Ok(())
}
