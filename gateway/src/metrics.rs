use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    decisions_total: IntCounterVec,
    kv_fallbacks_total: IntCounterVec,
    audit_dropped_total: prometheus::IntCounter,
    audit_queue_depth: IntGauge,
    proxy_latency: Histogram,
    risk_score: Histogram,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Total requests handled, by terminal status code"),
            &["status"],
        )?;
        let decisions_total = IntCounterVec::new(
            Opts::new("gateway_decisions_total", "Decision engine outcomes"),
            &["decision"],
        )?;
        let kv_fallbacks_total = IntCounterVec::new(
            Opts::new("gateway_kv_fallbacks_total", "Requests that fell back to fail-open because the KV store was unavailable"),
            &["component"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(kv_fallbacks_total.clone()))?;

        let audit_dropped_total = prometheus::IntCounter::with_opts(Opts::new(
            "gateway_audit_dropped_total",
            "Audit events dropped because the queue was full",
        ))?;
        let audit_queue_depth = IntGauge::with_opts(Opts::new(
            "gateway_audit_queue_depth",
            "Approximate number of audit events waiting to be sent",
        ))?;
        registry.register(Box::new(audit_dropped_total.clone()))?;
        registry.register(Box::new(audit_queue_depth.clone()))?;

        let proxy_latency = Histogram::with_opts(HistogramOpts::new(
            "gateway_proxy_latency_seconds",
            "End-to-end latency of forwarded requests, from pipeline start to response",
        ))?;
        let risk_score = Histogram::with_opts(
            HistogramOpts::new("gateway_risk_score", "Distribution of computed risk scores")
                .buckets(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
        )?;
        registry.register(Box::new(proxy_latency.clone()))?;
        registry.register(Box::new(risk_score.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            decisions_total,
            kv_fallbacks_total,
            audit_dropped_total,
            audit_queue_depth,
            proxy_latency,
            risk_score,
        })
    }

    pub fn record_request(&self, status_code: u16) {
        self.requests_total.with_label_values(&[&status_code.to_string()]).inc();
    }

    pub fn record_decision(&self, decision: &str) {
        self.decisions_total.with_label_values(&[decision]).inc();
    }

    pub fn record_kv_fallback(&self, component: &str) {
        self.kv_fallbacks_total.with_label_values(&[component]).inc();
    }

    pub fn set_audit_dropped(&self, total: u64) {
        let delta = total as i64 - self.audit_dropped_total.get() as i64;
        if delta > 0 {
            self.audit_dropped_total.inc_by(delta as u64);
        }
    }

    pub fn set_audit_queue_depth(&self, depth: i64) {
        self.audit_queue_depth.set(depth);
    }

    pub fn observe_proxy_latency(&self, secs: f64) {
        self.proxy_latency.observe(secs);
    }

    pub fn observe_risk_score(&self, score: f64) {
        self.risk_score.observe(score);
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"))
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
