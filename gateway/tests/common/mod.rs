use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::routing::get;
use axum::Router;
use gateway::app_state::AppState;
use gateway::audit::AuditPipeline;
use gateway::config::GatewayConfig;
use gateway::kv::{InMemoryKvStore, KvStore};
use gateway::metrics::GatewayMetrics;
use gateway::project_cache::{ProjectConfig, ProjectConfigCache};
use gateway::proxy::StreamingProxy;
use gateway::rate_limiter::RateLimiter;
use gateway::risk::RiskScorer;

pub const TEST_IP: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)), 0);

pub fn test_config() -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        env: "test".into(),
        host: "0.0.0.0".into(),
        port: 0,
        redis_url: "redis://localhost".into(),
        control_api_base_url: "http://127.0.0.1:1".into(),
        control_worker_shared_secret: "secret".into(),
        rate_limit_rpm: 60,
        rate_limit_burst: 20,
        rate_limit_window_secs: 60,
        audit_queue_capacity: 1000,
        audit_send_timeout_ms: 300,
        config_refresh_interval_secs: 30,
        config_refresh_timeout_secs: 5,
        config_refresh_backoff_base_secs: 10,
        config_refresh_backoff_max_secs: 120,
        proxy_timeout_secs: 30,
        upstream_pool_max_idle_per_host: 32,
    })
}

/// Builds a router with an in-memory KV store and a project snapshot
/// seeded from `projects` (api_key_hash -> (project_id, upstream_base_url)).
pub fn test_app(config: Arc<GatewayConfig>, projects: &[(&str, &str, &str)]) -> Router {
    test_app_with_kv(config, Arc::new(InMemoryKvStore::new()), projects)
}

/// Same as `test_app`, but with a caller-supplied KV store so tests can
/// exercise the `kv_unavailable` fail-open path with an always-failing double.
pub fn test_app_with_kv(
    config: Arc<GatewayConfig>,
    kv: Arc<dyn KvStore>,
    projects: &[(&str, &str, &str)],
) -> Router {
    let project_cache = ProjectConfigCache::new(reqwest::Client::new(), config.clone());
    let mut snapshot = HashMap::new();
    for (hash, project_id, upstream) in projects {
        snapshot.insert(
            hash.to_string(),
            ProjectConfig {
                project_id: project_id.to_string(),
                upstream_base_url: upstream.to_string(),
                api_key_hash: hash.to_string(),
            },
        );
    }
    project_cache.publish(snapshot);

    let metrics = Arc::new(GatewayMetrics::new().unwrap());
    let state = Arc::new(AppState {
        rate_limiter: RateLimiter::new(
            kv.clone(),
            config.rate_limit_rpm,
            config.rate_limit_burst,
            config.rate_limit_window_secs,
        ),
        risk_scorer: RiskScorer::new(kv),
        proxy: StreamingProxy::new(reqwest::Client::new(), config.proxy_timeout_secs),
        audit: AuditPipeline::start(reqwest::Client::new(), config.clone(), metrics.clone()),
        metrics,
        project_cache,
        config,
    });

    Router::new().fallback(gateway::handler::handle).with_state(state)
}

/// Injects a fake peer address the way `axum::serve`'s connect-info layer
/// would, since `oneshot` bypasses the real TCP accept loop.
pub fn with_connect_info(mut request: axum::http::Request<axum::body::Body>) -> axum::http::Request<axum::body::Body> {
    request.extensions_mut().insert(ConnectInfo(TEST_IP));
    request
}
