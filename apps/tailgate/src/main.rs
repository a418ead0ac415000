use anyhow::{Context, Result};
use clap::Parser;
use tail_transport::WebSocketTransport;
use tracing::info;

use tailgate_core::cli::Cli;
use tailgate_core::config::{load_file_config, ClientConfig};
use tailgate_core::telemetry::logging;
use tailgate_core::{ClientContext, ShutdownCoordinator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.logging.to_config()).context("failed to initialise logging")?;

    let file_config = load_file_config(cli.config.as_deref())?;
    let config = ClientConfig::resolve(file_config, cli.overrides())?;
    let ctx = ClientContext::new(config);

    let config = ctx.config();
    info!(
        session_id = %ctx.session_id(),
        server = %config.server,
        logfile = %config.logfile.display(),
        timeout_ms = config.timeout.as_millis() as u64,
        remove_logfile = config.remove_logfile,
        "starting tailgate"
    );

    let report = ShutdownCoordinator::new(ctx.clone())
        .run(WebSocketTransport::new())
        .await;

    match report.loop_summary {
        Some(summary) => info!(
            attempts = summary.attempts,
            bytes_sent = summary.bytes_sent,
            child_succeeded = report.child.success(),
            "sender finished, exiting"
        ),
        None => info!(
            child_succeeded = report.child.success(),
            "sender did not stop in time, exiting anyway"
        ),
    }
    Ok(())
}
