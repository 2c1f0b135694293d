use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use trade_dispatch_rs::config::Settings;
use trade_dispatch_rs::dispatch::start_dispatch;
use trade_dispatch_rs::ledger::{EchoLedger, LedgerEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let settings = Settings::new()?;

    let nats_url = settings.nats_url();
    info!("Connecting to NATS at {}", nats_url);

    let client = match async_nats::connect(&nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            error!("Failed to connect to NATS: {}", e);
            std::process::exit(1);
        }
    };

    // The ledger is constructed here and handed down, never a process-wide
    // singleton. EchoLedger is the stand-in until a real engine is attached.
    let ledger: Arc<dyn LedgerEngine> = Arc::new(EchoLedger);

    let handle = start_dispatch(client, ledger, settings).await?;
    info!("Awaiting commands");

    handle.await?;

    Ok(())
}
