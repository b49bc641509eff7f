use std::process::ExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use governor::{Quota, RateLimiter};
use log::{error, info};

use ticketscan_lib::cli::{self, Cli};
use ticketscan_lib::commands;
use ticketscan_lib::config::Config;
use ticketscan_lib::filter::AcceptanceFilter;
use ticketscan_lib::rmc_client::RmcClient;
use ticketscan_lib::scan::source::RmcRecordSource;
use ticketscan_lib::scan::types::{ScanReport, WindowExit};
use ticketscan_lib::scan::ScanEngine;
use ticketscan_lib::sink::CsvSink;
use ticketscan_lib::state::StateStore;
use ticketscan_lib::Error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();
    let args = cli::parse_args();

    match run(args).await {
        Ok(report) => {
            // Policy-triggered early exits are normal operation; the next
            // scheduled run resumes from the persisted cursor.
            if let WindowExit::ForbiddenRun = report.exit {
                info!("invocation ended early under rate pressure");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("invocation failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<ScanReport, Error> {
    let mut config = Config::from_env()?;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(state_dir) = args.state_dir {
        config.state_dir = state_dir;
    }

    let store = StateStore::new(&config.state_dir)?;
    let mut cursor = store.load_cursor(config.start_position);
    if let Some(start_id) = args.start_id {
        info!("overriding persisted cursor, starting at {start_id}");
        cursor.position = start_id;
        cursor.pass_count = 0;
        cursor.gap_count = 0;
    }
    let mut seen = store.load_seen();

    let limiter = Arc::new(RateLimiter::direct(Quota::per_second(
        config.requests_per_second,
    )));
    let client = RmcClient::new(&config)?;
    let source = RmcRecordSource::new(client, limiter);
    let sink = CsvSink::new(config.csv_path.clone());
    let filter = AcceptanceFilter::new(config.keywords.clone(), config.locality.clone());
    let policy = config.scan_policy();

    let mut engine = ScanEngine::new(source, sink, filter, policy);
    let report = commands::run_invocation(&mut engine, &store, &mut cursor, &mut seen).await?;

    info!(
        "done: {} probes, {} rows written, next start={}, last_valid={:?}, seen={}",
        report.probes,
        report.rows_written,
        cursor.position,
        cursor.last_valid_position,
        seen.len(),
    );
    Ok(report)
}
