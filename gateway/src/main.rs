use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use gateway::app_state::AppState;
use gateway::audit::AuditPipeline;
use gateway::config::GatewayConfig;
use gateway::kv::{KvStore, RedisKvStore};
use gateway::metrics::GatewayMetrics;
use gateway::project_cache::ProjectConfigCache;
use gateway::proxy::StreamingProxy;
use gateway::rate_limiter::RateLimiter;
use gateway::risk::RiskScorer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = Arc::new(GatewayConfig::from_env()?);
    info!(env = %config.env, "Starting gateway");

    let kv: Arc<dyn KvStore> = Arc::new(RedisKvStore::connect(&config.redis_url).await?);

    let proxy_client = reqwest::Client::builder()
        .pool_max_idle_per_host(config.upstream_pool_max_idle_per_host)
        .build()?;
    let control_client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .build()?;

    let project_cache = ProjectConfigCache::new(control_client.clone(), config.clone());
    project_cache.start();

    let rate_limiter = RateLimiter::new(
        kv.clone(),
        config.rate_limit_rpm,
        config.rate_limit_burst,
        config.rate_limit_window_secs,
    );
    let risk_scorer = RiskScorer::new(kv.clone());
    let proxy = StreamingProxy::new(proxy_client, config.proxy_timeout_secs);
    let metrics = Arc::new(GatewayMetrics::new()?);
    let audit = AuditPipeline::start(control_client, config.clone(), metrics.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        project_cache,
        rate_limiter,
        risk_scorer,
        proxy,
        audit,
        metrics,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .fallback(gateway::handler::handle)
        .with_state(state);

    let ip: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((ip, config.port));
    info!(%addr, "Listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    if state.project_cache.is_initialized() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
    } else {
        (StatusCode::OK, Json(serde_json::json!({ "status": "initializing" }))).into_response()
    }
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            warn!(?err, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
