use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub env: String,
    pub host: String,
    pub port: u16,

    pub redis_url: String,

    pub control_api_base_url: String,
    pub control_worker_shared_secret: String,

    pub rate_limit_rpm: u32,
    pub rate_limit_burst: u32,
    pub rate_limit_window_secs: u64,

    pub audit_queue_capacity: usize,
    pub audit_send_timeout_ms: u64,

    pub config_refresh_interval_secs: u64,
    pub config_refresh_timeout_secs: u64,
    pub config_refresh_backoff_base_secs: u64,
    pub config_refresh_backoff_max_secs: u64,

    pub proxy_timeout_secs: u64,
    pub upstream_pool_max_idle_per_host: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let redis_url = env::var("REDIS_URL").context("REDIS_URL must be set")?;
        let control_api_base_url =
            env::var("CONTROL_API_BASE_URL").context("CONTROL_API_BASE_URL must be set")?;
        let control_worker_shared_secret = env::var("CONTROL_WORKER_SHARED_SECRET")
            .context("CONTROL_WORKER_SHARED_SECRET must be set")?;

        let env_name = env::var("ENV").unwrap_or_else(|_| "dev".to_string());
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8080);

        let rate_limit_rpm = env_u32("GATEWAY_RATE_LIMIT_RPM", 60);
        let rate_limit_burst = env_u32("GATEWAY_RATE_LIMIT_BURST", 20);
        let rate_limit_window_secs = env_u64("GATEWAY_RATE_LIMIT_WINDOW_SECONDS", 60).max(1);

        let audit_queue_capacity = env_u64("AUDIT_QUEUE_CAPACITY", 1000) as usize;
        let audit_send_timeout_ms = env_u64("AUDIT_SEND_TIMEOUT_MS", 300);

        let config_refresh_interval_secs = env_u64("CONFIG_REFRESH_INTERVAL_SECONDS", 30).max(1);
        let config_refresh_timeout_secs = env_u64("CONFIG_REFRESH_TIMEOUT_SECONDS", 5).max(1);
        let config_refresh_backoff_base_secs =
            env_u64("CONFIG_REFRESH_BACKOFF_BASE_SECONDS", 10).max(1);
        let config_refresh_backoff_max_secs =
            env_u64("CONFIG_REFRESH_BACKOFF_MAX_SECONDS", 120).max(config_refresh_backoff_base_secs);

        let proxy_timeout_secs = env_u64("PROXY_TIMEOUT_SECONDS", 30).max(1);
        let upstream_pool_max_idle_per_host =
            env_u64("UPSTREAM_POOL_MAX_IDLE_PER_HOST", 32) as usize;

        Ok(Self {
            env: env_name,
            host,
            port,
            redis_url,
            control_api_base_url,
            control_worker_shared_secret,
            rate_limit_rpm,
            rate_limit_burst,
            rate_limit_window_secs,
            audit_queue_capacity,
            audit_send_timeout_ms,
            config_refresh_interval_secs,
            config_refresh_timeout_secs,
            config_refresh_backoff_base_secs,
            config_refresh_backoff_max_secs,
            proxy_timeout_secs,
            upstream_pool_max_idle_per_host,
        })
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name).ok().and_then(|value| value.parse::<u32>().ok()).unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name).ok().and_then(|value| value.parse::<u64>().ok()).unwrap_or(default)
}
