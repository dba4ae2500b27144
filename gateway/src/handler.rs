//! C9 — gateway orchestrator. Wires C2 through C7 into the single
//! per-request pipeline and guarantees exactly one audit event per
//! terminal outcome.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::audit::{AuditDecision, AuditEvent};
use crate::decision::{self, Decision};
use crate::identity;
use crate::kv::KvError;
use crate::proxy::normalize_path;
use crate::AppState;

const THROTTLE_DELAY: Duration = Duration::from_millis(300);

pub async fn handle(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let raw_path = request.uri().path().to_string();
    let ip = client_ip(&request, addr);
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let key_hash = match identity::validate(request.headers()) {
        Ok(hash) => hash,
        Err(_) => {
            return reject(
                &state,
                start,
                method,
                raw_path,
                ip,
                user_agent,
                String::new(),
                String::new(),
                0.0,
                Decision::Block,
                "Missing or invalid API key",
                StatusCode::UNAUTHORIZED,
                None,
            );
        }
    };

    let Some(project) = state.project_cache.lookup(&key_hash) else {
        return reject(
            &state,
            start,
            method,
            raw_path,
            ip,
            user_agent,
            String::new(),
            key_hash,
            0.0,
            Decision::Block,
            "Invalid API key",
            StatusCode::UNAUTHORIZED,
            None,
        );
    };

    let endpoint = normalize_path(&raw_path);

    let (rate_result, risk_result) = tokio::join!(
        state.rate_limiter.check(&key_hash, &ip, &endpoint),
        state.risk_scorer.score(&key_hash, &ip, &endpoint)
    );

    let mut fail_open_reason: Option<&'static str> = None;

    let rate_decision = match rate_result {
        Ok(decision) => decision,
        Err(KvError::Unavailable(_)) => {
            fail_open_reason = Some("kv_unavailable");
            state.metrics.record_kv_fallback("rate_limiter");
            crate::rate_limiter::RateDecision { allowed: true, remaining: state.config.rate_limit_rpm as i64 }
        }
    };

    let risk_score = match risk_result {
        Ok(score) => score.risk_score,
        Err(KvError::Unavailable(_)) => {
            fail_open_reason = Some("kv_unavailable");
            state.metrics.record_kv_fallback("risk_scorer");
            0.0
        }
    };
    state.metrics.observe_risk_score(risk_score);

    // `reason` is the decision engine's own pinned string (spec §4.6) and is
    // what the client sees in the HTTP response body; it is never rewritten.
    // `fail_open_reason`, when set, only tags the audit event for
    // observability (spec §4.1) — it must never leak into the client-facing
    // `detail` field, and a BLOCK reached on its own merits (e.g. a real
    // rate-limit breach) must keep its own reason even if an unrelated KV
    // call happened to fail open elsewhere in the same request.
    let (decision, reason) = decision::decide(rate_decision.allowed, rate_decision.remaining, risk_score);

    match decision {
        Decision::Block => reject(
            &state,
            start,
            method,
            raw_path,
            ip,
            user_agent,
            project.project_id,
            key_hash,
            risk_score,
            Decision::Block,
            reason,
            StatusCode::TOO_MANY_REQUESTS,
            fail_open_reason,
        ),
        Decision::Throttle => {
            tokio::time::sleep(THROTTLE_DELAY).await;
            forward_and_emit(
                &state, start, method, raw_path, endpoint, ip, user_agent, project, key_hash, risk_score,
                fail_open_reason, request,
            )
            .await
        }
        Decision::Allow => {
            forward_and_emit(
                &state, start, method, raw_path, endpoint, ip, user_agent, project, key_hash, risk_score,
                fail_open_reason, request,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn forward_and_emit(
    state: &Arc<AppState>,
    start: Instant,
    method: String,
    raw_path: String,
    endpoint: String,
    ip: String,
    user_agent: Option<String>,
    project: crate::project_cache::ProjectConfig,
    key_hash: String,
    risk_score: f64,
    kv_fallback_reason: Option<&'static str>,
    request: Request,
) -> Response {
    match state.proxy.forward(request, &project.upstream_base_url).await {
        Ok(response) => {
            let status = response.status().as_u16();
            emit(
                state, start, method, raw_path, endpoint, ip, user_agent, project.project_id, key_hash, risk_score,
                Decision::Allow, kv_fallback_reason.map(|r| r.to_string()), status,
            );
            response
        }
        Err(_) => {
            emit(
                state, start, method, raw_path, endpoint, ip, user_agent, project.project_id, key_hash, risk_score,
                Decision::Allow, Some("Upstream error".to_string()), 502,
            );
            warn!(project = %project.project_id, "upstream unreachable");
            ApiError::BadGateway { reason: "Upstream error" }.into_response()
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn reject(
    state: &Arc<AppState>,
    start: Instant,
    method: String,
    raw_path: String,
    ip: String,
    user_agent: Option<String>,
    project_id: String,
    key_hash: String,
    risk_score: f64,
    decision: Decision,
    reason: &'static str,
    status: StatusCode,
    kv_fallback_reason: Option<&'static str>,
) -> Response {
    let endpoint = normalize_path(&raw_path);
    let audit_reason = kv_fallback_reason.unwrap_or(reason);
    emit(
        state,
        start,
        method,
        raw_path,
        endpoint,
        ip,
        user_agent,
        project_id,
        key_hash,
        risk_score,
        decision,
        Some(audit_reason.to_string()),
        status.as_u16(),
    );
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            ApiError::TooManyRequests { reason: reason.to_string() }.into_response()
        }
        _ => ApiError::Unauthorized { reason }.into_response(),
    }
}

#[allow(clippy::too_many_arguments)]
fn emit(
    state: &Arc<AppState>,
    start: Instant,
    method: String,
    raw_path: String,
    endpoint: String,
    ip: String,
    user_agent: Option<String>,
    project_id: String,
    api_key_hash: String,
    risk_score: f64,
    decision: Decision,
    reason: Option<String>,
    status_code: u16,
) {
    let elapsed = start.elapsed();
    let latency_ms = elapsed.as_millis() as u64;

    state.metrics.record_request(status_code);
    state.metrics.record_decision(decision_label(decision));
    state.metrics.observe_proxy_latency(elapsed.as_secs_f64());
    state.metrics.set_audit_dropped(state.audit.dropped_count());

    state.audit.emit(AuditEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        project_id,
        api_key_hash,
        method,
        path: raw_path,
        endpoint,
        ip,
        user_agent,
        risk_score,
        decision: AuditDecision::from(decision),
        reason,
        status_code,
        latency_ms,
    });
}

fn decision_label(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "ALLOW",
        Decision::Throttle => "THROTTLE",
        Decision::Block => "BLOCK",
    }
}

fn client_ip(request: &Request, addr: SocketAddr) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}
