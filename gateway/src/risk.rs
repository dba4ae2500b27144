//! C5 — risk scorer. Combines three KV-backed behavioral signals into a
//! single score in `[0, 1]`, all over the same rolling 60s window the
//! rate limiter uses.

use std::sync::Arc;

use crate::kv::KvStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSignals {
    pub velocity: f64,
    pub burst: f64,
    pub endpoint_drift: f64,
    pub fanout: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskScore {
    pub risk_score: f64,
    pub signals: RiskSignals,
    pub primary_reason: &'static str,
}

pub struct RiskScorer {
    kv: Arc<dyn KvStore>,
}

impl RiskScorer {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn score(
        &self,
        key_hash: &str,
        ip: &str,
        endpoint: &str,
    ) -> Result<RiskScore, crate::kv::KvError> {
        let velocity_key = format!("ml:velocity:{key_hash}:{ip}:{endpoint}");
        let count = self.kv.incr(&velocity_key).await?;
        if count == 1 {
            self.kv.expire(&velocity_key, 60).await?;
        }

        let endpoints_key = format!("ml:endpoints:{key_hash}:{ip}");
        self.kv.sadd(&endpoints_key, endpoint).await?;
        self.kv.expire(&endpoints_key, 60).await?;
        let distinct_endpoints = self.kv.scard(&endpoints_key).await?;

        let velocity = (count as f64 / 30.0).min(1.0);
        let burst = if count > 20 { 1.0 } else { count as f64 / 20.0 };
        let endpoint_drift = (distinct_endpoints as f64 / 5.0).min(1.0);
        let fanout = 0.0;

        let signals = RiskSignals { velocity, burst, endpoint_drift, fanout };
        let risk_score = round2(0.4 * velocity + 0.3 * burst + 0.3 * endpoint_drift);
        let primary_reason = primary_reason(&signals);

        Ok(RiskScore { risk_score, signals, primary_reason })
    }
}

fn primary_reason(signals: &RiskSignals) -> &'static str {
    let candidates: [(&str, f64); 4] = [
        ("velocity", signals.velocity),
        ("burst", signals.burst),
        ("endpoint_drift", signals.endpoint_drift),
        ("fanout", signals.fanout),
    ];
    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    fn scorer() -> RiskScorer {
        RiskScorer::new(Arc::new(InMemoryKvStore::new()))
    }

    #[tokio::test]
    async fn first_request_has_minimal_risk() {
        let rs = scorer();
        let score = rs.score("hash", "ip", "/x").await.unwrap();
        assert!(score.risk_score > 0.0);
        assert!(score.risk_score < 0.2);
    }

    #[tokio::test]
    async fn risk_score_is_always_within_unit_interval() {
        let rs = scorer();
        for _ in 0..50 {
            let score = rs.score("hash", "ip", "/x").await.unwrap();
            assert!((0.0..=1.0).contains(&score.risk_score));
        }
    }

    #[tokio::test]
    async fn high_velocity_and_drift_crosses_the_block_threshold() {
        // S5 from spec §8: velocity=25 + drift across 6 endpoints -> risk >= 0.9.
        let rs = scorer();
        for i in 0..24 {
            rs.score("hash", "ip", &format!("/e{}", i % 6)).await.unwrap();
        }
        let score = rs.score("hash", "ip", "/e5").await.unwrap();
        assert!(score.risk_score >= 0.9, "risk_score was {}", score.risk_score);
    }

    #[tokio::test]
    async fn primary_reason_prefers_velocity_on_ties() {
        let signals = RiskSignals { velocity: 0.5, burst: 0.5, endpoint_drift: 0.5, fanout: 0.0 };
        assert_eq!(primary_reason(&signals), "velocity");
    }

    #[tokio::test]
    async fn primary_reason_follows_the_documented_ordering() {
        let signals = RiskSignals { velocity: 0.1, burst: 0.4, endpoint_drift: 0.4, fanout: 0.0 };
        assert_eq!(primary_reason(&signals), "burst");
    }

    #[tokio::test]
    async fn distinct_key_hashes_do_not_share_velocity_counters() {
        let rs = scorer();
        let a = rs.score("hash-a", "ip", "/x").await.unwrap();
        let b = rs.score("hash-b", "ip", "/x").await.unwrap();
        assert_eq!(a.signals.velocity, b.signals.velocity);
    }
}
