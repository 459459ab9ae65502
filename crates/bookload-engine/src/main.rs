//! Bookload - incremental fact and SCD2 dimension loader
//!
//! Runs one batch file against the `RocksDB` table store and prints the run report.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookload_core::RunId;
use bookload_engine::{run_incremental_load, BatchSource, JsonBatchSource, LoadConfig};
use bookload_store::RocksStore;

/// Apply one batch to the fact and dimension tables.
#[derive(Debug, Parser)]
#[command(name = "bookload", version, about)]
struct Args {
    /// Batch document (JSON).
    batch_file: PathBuf,

    /// `RocksDB` data directory (overrides `DATA_DIR`).
    #[arg(long)]
    data_dir: Option<String>,

    /// Run ID to record in the ledger (overrides the batch's own).
    #[arg(long)]
    run_id: Option<String>,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bookload=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    block_on_detached(run(Args::parse()))?
}

/// Drive `future` on a fresh runtime, then shut the runtime down without waiting
/// for blocking tasks still in flight.
fn block_on_detached<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = LoadConfig::from_env();
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    tracing::info!(
        data_dir = %config.data_dir,
        end_convention = config.end_convention.as_str(),
        duplicate_customers = config.duplicate_customers.as_str(),
        aggregate_partitions = config.aggregate_partitions,
        run_timeout_seconds = ?config.run_timeout_seconds,
        "Load configuration loaded"
    );

    let mut batch = JsonBatchSource::new(&args.batch_file).load()?;
    if let Some(run_id) = args.run_id {
        batch.run_id = RunId::new(run_id)?;
        for snapshot in &mut batch.customers {
            snapshot.as_of_batch = batch.run_id.clone();
        }
    }

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = RocksStore::open(&config.data_dir)?;

    let task = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || run_incremental_load(&store, &config, batch))
    };

    // Each table write is one atomic batch, so abandoning the task on timeout
    // cannot leave a table half written.
    let joined = match config.run_timeout() {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(elapsed) => {
                tracing::error!(
                    timeout_seconds = limit.as_secs(),
                    "Run timed out; abandoning load, a table write already in progress may still commit"
                );
                return Err(elapsed.into());
            }
        },
        None => task.await,
    };
    let result = joined??;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(run_id = %result.run_id, "Run finished with table failures");
        Ok(ExitCode::FAILURE)
    }
}
