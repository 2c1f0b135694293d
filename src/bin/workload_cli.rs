//! Replays a workload file against the dispatch service, one line at a time,
//! and reports the outcome of every line.

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use trade_dispatch_rs::config::Settings;
use trade_dispatch_rs::context::RandomIdProvider;
use trade_dispatch_rs::submit::NatsSubmitter;
use trade_dispatch_rs::workload::{run_workload, LineOutcome, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1).map(PathBuf::from) else {
        eprintln!("usage: workload_cli <workload-file>");
        std::process::exit(2);
    };

    let settings = Settings::new()?;

    let nats_url = settings.nats_url();
    info!("Connecting to NATS at {}", nats_url);
    let client = async_nats::connect(&nats_url).await?;

    let submitter = NatsSubmitter::new(
        client,
        Arc::new(RandomIdProvider),
        settings.subject(),
        settings.reply_timeout(),
    );
    let retry = RetryPolicy {
        attempts: settings.retry_attempts(),
        backoff: settings.retry_backoff(),
    };

    info!("Replaying workload from {:?}", path);
    let reader = BufReader::new(File::open(&path)?);
    let report = run_workload(reader, &submitter, &retry).await?;

    for failure in report.failures() {
        match &failure.outcome {
            LineOutcome::DecodeFailed(e) => {
                warn!(seq = failure.seq, raw = %failure.raw, error = %e, "line did not decode");
            }
            LineOutcome::TransportFailed { attempts, last } => {
                error!(seq = failure.seq, attempts, error = %last, "line never reached the service");
            }
            LineOutcome::Completed(_) => {}
        }
    }

    info!(
        completed = report.completed(),
        failed = report.failed(),
        duration_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "workload finished"
    );

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}
