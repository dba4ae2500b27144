//! Process-wide state, constructed once at startup and handed to every
//! request as an `Arc`. Nothing here is mutated in place after boot
//! except through the types' own internal synchronization.

use std::sync::Arc;

use crate::audit::AuditPipeline;
use crate::config::GatewayConfig;
use crate::metrics::GatewayMetrics;
use crate::project_cache::ProjectConfigCache;
use crate::proxy::StreamingProxy;
use crate::rate_limiter::RateLimiter;
use crate::risk::RiskScorer;

pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub project_cache: Arc<ProjectConfigCache>,
    pub rate_limiter: RateLimiter,
    pub risk_scorer: RiskScorer,
    pub proxy: StreamingProxy,
    pub audit: AuditPipeline,
    pub metrics: Arc<GatewayMetrics>,
}
