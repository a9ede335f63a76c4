//! Signal dispatch worker - sends conversion signals off the hot path
//!
//! The pipeline enqueues signals via an mpsc channel and returns immediately;
//! the worker spawns each Conversions API call as its own task and records the
//! outcome. A slow call only holds up its own task. At most
//! `MAX_IN_FLIGHT` calls run at once; the rest wait in the queue.
//! A failed dispatch is logged and counted, never retried.

use crate::infra::metrics::Metrics;
use crate::io::capi::{CapiClient, SignalResult};
use crate::services::conversion::{LeadEventInput, LEAD_EVENT_NAME};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

/// Queue delay above which a backlog warning is logged
const QUEUE_DELAY_WARN_US: u64 = 50_000;

/// Concurrent dispatch limit
pub const MAX_IN_FLIGHT: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// Fixed "Lead" form completion event
    Lead,
    /// Tier or milestone signal with a value
    Audience { event_name: String, value: f64, content_name: Option<String> },
}

impl SignalKind {
    pub fn event_name(&self) -> &str {
        match self {
            SignalKind::Lead => LEAD_EVENT_NAME,
            SignalKind::Audience { event_name, .. } => event_name,
        }
    }
}

/// A signal to be dispatched by the worker
#[derive(Debug)]
pub struct SignalCmd {
    pub kind: SignalKind,
    pub input: LeadEventInput,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

impl SignalCmd {
    pub fn new(kind: SignalKind, input: LeadEventInput) -> Self {
        Self { kind, input, enqueued_at: Instant::now() }
    }
}

#[cold]
fn log_task_failed(e: &JoinError) {
    warn!(error = %e, "signal_task_failed");
}

/// Worker that dispatches signals asynchronously
pub struct SignalWorker {
    client: Arc<CapiClient>,
    cmd_rx: mpsc::Receiver<SignalCmd>,
    metrics: Arc<Metrics>,
    permits: Arc<Semaphore>,
}

impl SignalWorker {
    pub fn new(client: Arc<CapiClient>, cmd_rx: mpsc::Receiver<SignalCmd>, metrics: Arc<Metrics>) -> Self {
        Self { client, cmd_rx, metrics, permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT)) }
    }

    /// Run the worker until the channel closes, then wait for in-flight dispatches
    pub async fn run(mut self) {
        info!(
            configured = %self.client.is_configured(),
            max_in_flight = %MAX_IN_FLIGHT,
            "signal_worker_started"
        );

        let mut in_flight = JoinSet::new();

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;
            self.metrics.record_queue_delay(queue_delay_us);

            if queue_delay_us > QUEUE_DELAY_WARN_US {
                warn!(
                    session_id = %cmd.input.session_id,
                    queue_delay_us = %queue_delay_us,
                    "signal_queue_delay_high"
                );
            }

            while let Some(res) = in_flight.try_join_next() {
                if let Err(e) = res {
                    log_task_failed(&e);
                }
            }

            // The semaphore is never closed
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let client = self.client.clone();
            let metrics = self.metrics.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                send_signal(&client, &metrics, &cmd, queue_delay_us).await;
            });
        }

        while let Some(res) = in_flight.join_next().await {
            if let Err(e) = res {
                log_task_failed(&e);
            }
        }

        info!("signal_worker_stopped");
    }
}

async fn send_signal(client: &CapiClient, metrics: &Metrics, cmd: &SignalCmd, queue_delay_us: u64) {
    let send_start = Instant::now();
    let result = dispatch(client, cmd).await;
    let latency_ms = send_start.elapsed().as_millis() as u64;

    if result.is_not_configured() {
        metrics.record_signal_skipped();
    } else {
        metrics.record_dispatch(result.success, latency_ms);
    }

    info!(
        session_id = %cmd.input.session_id,
        event_name = %cmd.kind.event_name(),
        success = %result.success,
        queue_delay_us = %queue_delay_us,
        latency_ms = %latency_ms,
        "signal_processed"
    );
}

async fn dispatch(client: &CapiClient, cmd: &SignalCmd) -> SignalResult {
    match &cmd.kind {
        SignalKind::Lead => client.fire_lead_event(&cmd.input).await,
        SignalKind::Audience { event_name, value, content_name } => {
            client
                .fire_audience_signal(event_name, &cmd.input, *value, content_name.as_deref())
                .await
        }
    }
}
/// Create a signal channel and worker
///
/// Returns the sender (for the pipeline) and the worker (to be spawned)
pub fn create_signal_worker(
    client: Arc<CapiClient>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<SignalCmd>, SignalWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = SignalWorker::new(client, cmd_rx, metrics);
    (cmd_tx, worker)
}
