//! Signal gateway - classifies landing page events and forwards conversion signals
//!
//! Replays tracking events (JSONL, one `TrackingEvent` per line) from a file or
//! stdin through the pipeline: bot classification, lead tiering, and
//! Conversions API dispatch on a background worker.
//!
//! Module structure:
//! - `domain/` - Core types (TrackingEvent, BotVerdict, LeadTier, normalization)
//! - `io/` - External interfaces (Conversions API, Egress)
//! - `services/` - Business logic (BotClassifier, scoring, pipeline, worker)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use signal_gateway::domain::TrackingEvent;
use signal_gateway::infra::{Config, Metrics};
use signal_gateway::io::{CapiClient, Egress};
use signal_gateway::services::{
    create_signal_worker, load_rules_from_file, BotClassifier, CompiledRules, SignalPipeline,
};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Signal gateway - bot filtering and conversion signal dispatch
#[derive(Parser, Debug)]
#[command(name = "signal-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// JSONL file of tracking events (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Capacity of the signal dispatch queue
    #[arg(long, default_value_t = 1000)]
    queue_size: usize,
}

/// Log an input line that is not a valid event (cold path)
#[cold]
fn log_invalid_event(line_no: usize, e: &serde_json::Error) {
    warn!(line = %line_no, error = %e, "event_parse_failed");
}

async fn open_input(path: Option<&str>) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(git_hash = %env!("GIT_HASH"), "signal-gateway starting");

    let config = Config::load_from_path(&args.config).with_env_overrides();

    info!(
        config_file = %config.config_file(),
        capi_enabled = %config.capi_enabled(),
        api_version = %config.api_version(),
        test_event_code = ?config.test_event_code(),
        rules_file = ?config.rules_file(),
        budget_step = %config.budget_step(),
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    // A bad rules file must not stop processing; run with built-in lists only
    let rules = match config.rules_file() {
        Some(path) => match load_rules_from_file(path) {
            Ok(rules) => {
                info!(path = %path, count = %rules.len(), "custom_rules_loaded");
                rules
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "custom_rules_load_failed");
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    let custom_rules = CompiledRules::new(&rules);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let client = Arc::new(CapiClient::new(&config));

    // Start signal worker (network I/O off the processing loop)
    let (signal_tx, worker) = create_signal_worker(client, metrics.clone(), args.queue_size);
    let worker_handle = tokio::spawn(worker.run());

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let egress = Egress::new(config.egress_file());
    let pipeline = SignalPipeline::new(BotClassifier::default(), config, metrics.clone(), Some(signal_tx));

    let mut lines = open_input(args.input.as_deref()).await?.lines();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown_rx.changed() => break,
        };
        let Some(line) = line else {
            break;
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let event: TrackingEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                log_invalid_event(line_no, &e);
                continue;
            }
        };

        let processed = pipeline.process(&event, &custom_rules);
        egress.write_event(&processed);
    }

    info!(lines = %line_no, "input_drained");

    // Closing the queue lets the worker finish in-flight signals and exit
    drop(pipeline);
    if let Err(e) = worker_handle.await {
        warn!(error = %e, "signal_worker_join_failed");
    }

    reporter.abort();
    metrics.report().log();

    info!("signal-gateway shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_config_path_from_flag() {
        let args = Args::try_parse_from(["signal-gateway", "--config", "config/prod.toml"]).unwrap();
        assert_eq!(args.config, "config/prod.toml");
        assert_eq!(args.queue_size, 1000);
    }

    #[test]
    fn test_config_path_reads_config_file_env() {
        let command = Args::command();
        let config = command.get_arguments().find(|a| a.get_id() == "config").unwrap();
        assert_eq!(config.get_env().and_then(|v| v.to_str()), Some("CONFIG_FILE"));
    }
}
