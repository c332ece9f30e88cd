//! Alert correlator service.
//!
//! Receives Alertmanager webhooks, groups related alerts into incident
//! sessions, and writes an LLM-generated incident report when a session
//! closes.

use alert_correlator::{
    demo, webhook, CorrelatorConfig, CorrelatorMetrics, ServeArgs, SessionMonitor, SessionWindow,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Groups related alerts into incidents and generates incident reports
#[derive(Parser)]
#[command(name = "alert-correlator")]
#[command(about = "Groups related alerts into incidents and generates incident reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log format (json or text)
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server and session monitor
    Serve(ServeArgs),
    /// Send sample alerts to a running correlator
    SendDemo {
        /// Alert endpoint of the correlator
        #[arg(long, default_value = "http://localhost:5000/alert")]
        url: String,

        /// Seconds to wait between alerts
        #[arg(long, default_value = "2")]
        delay: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config().context("Invalid configuration")?;
            serve(config).await
        }
        Commands::SendDemo { url, delay } => {
            let client = reqwest::Client::new();
            let sent = demo::send_demo(&client, &url, Duration::from_secs(delay)).await?;
            info!(sent, url = %url, "Demo alerts sent");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("alert_correlator=debug,tower_http=debug,info")
        } else {
            EnvFilter::new("alert_correlator=info,tower_http=info,warn")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn serve(config: CorrelatorConfig) -> Result<()> {
    info!(
        bind = %config.bind_addr,
        inactivity_gap_secs = config.monitor.policy.inactivity_gap.as_secs(),
        max_session_duration_secs = config.monitor.policy.max_session_duration.as_secs(),
        poll_interval_secs = config.monitor.poll_interval.as_secs(),
        llm_provider = %config.llm.provider,
        llm_model = %config.llm.model,
        "Starting alert correlator"
    );

    let generator = config.llm.build_generator();
    if !generator.is_configured() {
        warn!("OPENAI_API_KEY not set; sessions will close with error reports");
    }

    let metrics = CorrelatorMetrics::new();
    let window = Arc::new(SessionWindow::new(metrics.clone()));
    let monitor = Arc::new(SessionMonitor::new(
        Arc::clone(&window),
        Arc::new(generator),
        metrics.clone(),
        config.monitor.clone(),
    ));

    let shutdown = CancellationToken::new();

    let monitor_handle = tokio::spawn(Arc::clone(&monitor).run(shutdown.clone()));

    let state = webhook::AppState { window, metrics };
    let addr = config.bind_addr.to_string();
    let server_shutdown = shutdown.clone();
    let mut server_handle =
        tokio::spawn(async move { webhook::run_server(state, &addr, server_shutdown).await });

    let mut server_error = None;
    tokio::select! {
        () = async { tokio::signal::ctrl_c().await.ok(); } => {
            info!("Received SIGINT, shutting down");
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => warn!("HTTP server exited"),
                Ok(Err(e)) => server_error = Some(e),
                Err(e) => server_error = Some(anyhow::anyhow!("HTTP server panicked: {e}")),
            }
        }
    }

    shutdown.cancel();
    if !server_handle.is_finished() {
        match server_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "HTTP server failed during shutdown"),
            Err(e) => warn!(error = %e, "HTTP server panicked during shutdown"),
        }
    }
    if let Err(e) = monitor_handle.await {
        warn!(error = %e, "Session monitor panicked");
    }

    info!("Alert correlator shutdown complete");
    match server_error {
        Some(e) => Err(e.context("HTTP server failed")),
        None => Ok(()),
    }
}
