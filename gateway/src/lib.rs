pub mod app_state;
pub mod audit;
pub mod config;
pub mod decision;
pub mod handler;
pub mod identity;
pub mod kv;
pub mod metrics;
pub mod project_cache;
pub mod proxy;
pub mod rate_limiter;
pub mod risk;

pub use crate::app_state::AppState;
pub use crate::config::GatewayConfig;
pub use crate::metrics::GatewayMetrics;
