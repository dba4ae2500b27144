//! C8 — audit pipeline. A bounded queue plus a single background sender,
//! built the same way `alerts.rs` fires its webhook: a shared client and
//! a fire-and-forget POST that never blocks the request path.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::decision::Decision;
use crate::metrics::GatewayMetrics;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub project_id: String,
    pub api_key_hash: String,
    pub method: String,
    pub path: String,
    pub endpoint: String,
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub risk_score: f64,
    pub decision: AuditDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status_code: u16,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditDecision {
    Allow,
    Throttle,
    Block,
}

impl From<Decision> for AuditDecision {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => AuditDecision::Allow,
            Decision::Throttle => AuditDecision::Throttle,
            Decision::Block => AuditDecision::Block,
        }
    }
}

#[derive(Clone)]
pub struct AuditPipeline {
    sender: Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl AuditPipeline {
    /// Builds the queue and spawns its sender task. The returned handle
    /// is cheap to clone; every request handler gets its own.
    pub fn start(client: reqwest::Client, config: Arc<GatewayConfig>, metrics: Arc<GatewayMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(config.audit_queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        tokio::spawn(sender_loop(receiver, client, config, metrics));

        Self { sender, dropped }
    }

    /// Non-blocking enqueue. Drops and counts the drop when the queue is full;
    /// never awaits, never performs I/O.
    pub fn emit(&self, event: AuditEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("audit queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("audit sender gone, dropping event");
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn sender_loop(
    mut receiver: Receiver<AuditEvent>,
    client: reqwest::Client,
    config: Arc<GatewayConfig>,
    metrics: Arc<GatewayMetrics>,
) {
    let url = format!("{}/internal/traffic", config.control_api_base_url);
    while let Some(event) = receiver.recv().await {
        metrics.set_audit_queue_depth(receiver.len() as i64);
        let result = client
            .post(&url)
            .header("x-control-secret", &config.control_worker_shared_secret)
            .timeout(Duration::from_millis(config.audit_send_timeout_ms))
            .json(&event)
            .send()
            .await;

        if let Err(err) = result {
            debug!(?err, "audit event delivery failed, discarding");
        }
    }
}
