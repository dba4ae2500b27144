//! C3 — project-config cache. A periodically refreshed snapshot of
//! `api_key_hash -> ProjectConfig`, published atomically so every reader
//! sees one consistent map for the lifetime of its request (spec §3
//! invariant 6, §8 property 7).

use arc_swap::ArcSwap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project_id: String,
    pub upstream_base_url: String,
    pub api_key_hash: String,
}

pub type ConfigSnapshot = HashMap<String, ProjectConfig>;

#[derive(Deserialize)]
struct ControlConfigResponse {
    projects: Vec<ControlProjectEntry>,
}

#[derive(Deserialize)]
struct ControlProjectEntry {
    id: String,
    upstream_url: String,
    api_keys: Vec<String>,
}

pub struct ProjectConfigCache {
    snapshot: ArcSwap<ConfigSnapshot>,
    http_client: reqwest::Client,
    config: Arc<GatewayConfig>,
}

impl ProjectConfigCache {
    pub fn new(http_client: reqwest::Client, config: Arc<GatewayConfig>) -> Arc<Self> {
        Arc::new(Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            http_client,
            config,
        })
    }

    /// O(1) read against the currently live snapshot.
    pub fn lookup(&self, api_key_hash: &str) -> Option<ProjectConfig> {
        self.snapshot.load().get(api_key_hash).cloned()
    }

    pub fn is_initialized(&self) -> bool {
        !self.snapshot.load().is_empty()
    }

    /// Publishes a snapshot directly, bypassing the control-plane fetch.
    /// Used by the refresher and by tests that seed a known project map.
    pub fn publish(&self, snapshot: ConfigSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Begins the background refresher. Non-blocking; intended to be
    /// called once at startup.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            this.refresh_loop().await;
        });
    }

    async fn refresh_loop(self: Arc<Self>) {
        let mut backoff_secs = self.config.config_refresh_backoff_base_secs;
        let mut consecutive_failures: u32 = 0;
        let mut ticker = interval(Duration::from_secs(self.config.config_refresh_interval_secs));

        loop {
            ticker.tick().await;
            match self.fetch_once().await {
                Ok(snapshot) => {
                    let count = snapshot.len();
                    self.publish(snapshot);
                    if consecutive_failures > 0 {
                        info!(count, "Project config cache recovered after failures");
                    } else {
                        info!(count, "Refreshed project config cache");
                    }
                    consecutive_failures = 0;
                    backoff_secs = self.config.config_refresh_backoff_base_secs;
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures == 1 {
                        warn!(?err, "Failed to refresh project config cache");
                    } else if consecutive_failures >= 3 {
                        error!(?err, consecutive_failures, "Project config cache refresh still failing");
                    }
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(self.config.config_refresh_backoff_max_secs);
                }
            }
        }
    }

    async fn fetch_once(&self) -> anyhow::Result<ConfigSnapshot> {
        let url = format!("{}/internal/worker/config", self.config.control_api_base_url);
        let response = self
            .http_client
            .get(&url)
            .header("x-control-secret", &self.config.control_worker_shared_secret)
            .timeout(Duration::from_secs(self.config.config_refresh_timeout_secs))
            .send()
            .await?
            .error_for_status()?
            .json::<ControlConfigResponse>()
            .await?;

        let mut snapshot = HashMap::with_capacity(response.projects.len());
        for project in response.projects {
            let Some(first_hash) = project.api_keys.into_iter().next() else {
                continue;
            };
            snapshot.insert(
                first_hash.clone(),
                ProjectConfig {
                    project_id: project.id,
                    upstream_base_url: project.upstream_url,
                    api_key_hash: first_hash,
                },
            );
        }
        Ok(snapshot)
    }
}
