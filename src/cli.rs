use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    aggregator::SummaryRow,
    batch::{BatchConfig, BatchDriver},
    errors::Rejection,
    ingest::{read_orders, write_summary},
    instrument::{read_instruments, tokens},
    orderbook::OrderBook,
    orders::{InstrumentId, Side},
    simulate::{GeneratorConfig, generate, write_orders},
    utils::shutdown_token,
};

/// Batch price-time priority matcher
#[derive(Parser)]
#[command(name = "price_time_matcher")]
#[command(
    version,
    about = "Replays order batches through per-instrument limit order books"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match an order file and write one summary row per instrument
    Match {
        /// Order CSV (timestamp,instrument_id,side,quantity,price)
        #[arg(long, default_value = "trades.csv")]
        input: PathBuf,

        /// Summary CSV to write
        #[arg(long, default_value = "trade_summary.csv")]
        output: PathBuf,

        /// Reference CSV; every listed instrument is reported, others are rejected
        #[arg(long)]
        instruments: Option<PathBuf>,

        /// Match instruments concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Generate a synthetic order file from reference data
    Generate {
        /// Reference CSV (symbol,token,stock_name,lot_size,tick_size,underlying_prev_close)
        #[arg(long, default_value = "market_data.csv")]
        instruments: PathBuf,

        /// Order CSV to write
        #[arg(long, default_value = "trades.csv")]
        output: PathBuf,

        /// Orders per instrument
        #[arg(long, default_value_t = 200)]
        per_instrument: usize,

        /// Log-price volatility
        #[arg(long, default_value_t = 0.005)]
        sigma: f64,

        /// Maximum relative deviation from the previous close
        #[arg(long, default_value_t = 0.05)]
        clamp: f64,

        /// Seed for a reproducible file
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Replay one instrument and display its resting book
    Book {
        #[arg(long, default_value = "trades.csv")]
        input: PathBuf,

        /// Instrument id (token)
        #[arg(long)]
        instrument: InstrumentId,
    },
}

fn print_summary(rows: &[SummaryRow]) {
    println!("{:>14} {:>16} {:>17}", "instrument_id", "trades_executed", "total_traded_qty");
    for row in rows {
        println!(
            "{:>14} {:>16} {:>17}",
            row.instrument_id, row.trades_executed, row.total_traded_qty
        );
    }
}

fn print_rejections(rejections: &[Rejection]) {
    if rejections.is_empty() {
        return;
    }
    println!("{} record(s) rejected:", rejections.len());
    for rejection in rejections {
        println!("  {}", rejection);
    }
}

fn print_order_book(order_book: &OrderBook) {
    println!("------ Order Book ------");
    println!("Bids (highest first):");
    for (price, total_qty) in order_book.depth(Side::Buy) {
        println!("Price: {}, Total Qty: {}", price, total_qty);
    }

    println!("Asks (lowest first):");
    for (price, total_qty) in order_book.depth(Side::Sell) {
        println!("Price: {}, Total Qty: {}", price, total_qty);
    }
    println!("--------------------------");
}

fn handle_match(
    input: PathBuf,
    output: PathBuf,
    instruments: Option<PathBuf>,
    parallel: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let ingested = read_orders(&input).context("reading orders")?;
    let expected_instruments = match instruments {
        Some(path) => Some(tokens(&read_instruments(path).context("reading instruments")?)),
        None => None,
    };

    let driver = BatchDriver::new(BatchConfig {
        expected_instruments,
        parallel,
    })
    .with_cancellation(cancel);
    let report = driver.run_with_rejections(ingested.records, ingested.rejections);

    write_summary(&output, &report.summaries)
        .with_context(|| format!("writing {}", output.display()))?;
    print_summary(&report.summaries);
    print_rejections(&report.rejections);
    println!("Summary written to: {}", output.display());

    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "instruments left out of the summary");
    }
    if !report.aborted.is_empty() {
        warn!(aborted = ?report.aborted, "instruments left out of the summary");
        bail!("batch cancelled, {} instrument(s) not matched", report.aborted.len());
    }
    Ok(())
}

fn handle_generate(
    instruments: PathBuf,
    output: PathBuf,
    cfg: GeneratorConfig,
) -> anyhow::Result<()> {
    let reference = read_instruments(&instruments).context("reading instruments")?;
    let orders = generate(&reference, &cfg, Utc::now(), &mut cfg.rng())?;
    write_orders(&output, &orders).with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {} orders to {}", orders.len(), output.display());
    Ok(())
}

fn handle_book(
    input: PathBuf,
    instrument: InstrumentId,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let ingested = read_orders(&input).context("reading orders")?;
    let driver = BatchDriver::new(BatchConfig::default()).with_cancellation(cancel);
    let replay = match driver.replay(ingested.records, instrument) {
        Ok(replay) => replay,
        Err(rejections) => {
            print_rejections(&ingested.rejections);
            print_rejections(&rejections);
            match rejections.last() {
                Some(cause) => bail!("replay of instrument {} failed: {}", instrument, cause),
                None => bail!("replay of instrument {} cancelled", instrument),
            }
        }
    };

    print_order_book(replay.engine.book());
    print_summary(&[replay.summary]);
    print_rejections(&ingested.rejections);
    print_rejections(&replay.rejections);
    Ok(())
}

impl Commands {
    /// Only the matching commands stop early on ctrl-c; generating keeps the default handler.
    fn watches_ctrl_c(&self) -> bool {
        !matches!(self, Commands::Generate { .. })
    }
}

fn dispatch(command: Commands, cancel: CancellationToken) -> anyhow::Result<()> {
    match command {
        Commands::Match {
            input,
            output,
            instruments,
            parallel,
        } => handle_match(input, output, instruments, parallel, cancel),
        Commands::Generate {
            instruments,
            output,
            per_instrument,
            sigma,
            clamp,
            seed,
        } => {
            let cfg = GeneratorConfig {
                orders_per_instrument: per_instrument,
                sigma,
                price_deviation_clamp: clamp,
                seed,
                ..GeneratorConfig::default()
            };
            handle_generate(instruments, output, cfg)
        }
        Commands::Book { input, instrument } => handle_book(input, instrument, cancel),
    }
}

/// Parses the command line and runs the chosen command on a blocking thread,
/// with ctrl-c wired to the batch's cancellation token for `match` and `book`.
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cancel = if cli.command.watches_ctrl_c() {
        shutdown_token()
    } else {
        CancellationToken::new()
    };
    tokio::task::spawn_blocking(move || dispatch(cli.command, cancel)).await?
}
