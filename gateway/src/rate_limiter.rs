//! C4 — rate limiter. Fixed 60s window keyed by `(key_hash, ip, endpoint)`
//! with a burst allowance on top of the nominal requests-per-minute rate.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::kv::KvStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: i64,
}

pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    rpm: u32,
    burst: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, rpm: u32, burst: u32, window_secs: u64) -> Self {
        Self { kv, rpm, burst, window_secs }
    }

    /// `check(key_hash, ip, endpoint) -> (allowed, remaining)`. A KV failure
    /// is not handled here: callers catch `KvError` themselves and apply
    /// the C1 fail-open rule (allow, `risk_score = 0.0`, tag the event).
    pub async fn check(
        &self,
        key_hash: &str,
        ip: &str,
        endpoint: &str,
    ) -> Result<RateDecision, crate::kv::KvError> {
        let bucket = current_minute_bucket();
        let key = format!("rate_limit:{key_hash}:{ip}:{endpoint}:{bucket}");

        let count = self.kv.incr(&key).await?;
        if count == 1 {
            self.kv.expire(&key, self.window_secs).await?;
        }

        let ceiling = self.rpm as i64 + self.burst as i64;
        if count > ceiling {
            return Ok(RateDecision { allowed: false, remaining: 0 });
        }
        Ok(RateDecision {
            allowed: true,
            remaining: (self.rpm as i64 - count).max(0),
        })
    }
}

fn current_minute_bucket() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKvStore;

    fn limiter(rpm: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryKvStore::new()), rpm, burst, 60)
    }

    #[tokio::test]
    async fn allows_within_rpm_and_reports_remaining() {
        let rl = limiter(60, 20);
        let decision = rl.check("hash", "1.2.3.4", "/x").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 59);
    }

    #[tokio::test]
    async fn allows_through_the_burst_allowance() {
        let rl = limiter(5, 3);
        for _ in 0..8 {
            let decision = rl.check("hash", "ip", "/x").await.unwrap();
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn blocks_once_rpm_plus_burst_is_exceeded() {
        let rl = limiter(5, 3);
        for _ in 0..8 {
            let decision = rl.check("hash", "ip", "/x").await.unwrap();
            assert!(decision.allowed);
        }
        let ninth = rl.check("hash", "ip", "/x").await.unwrap();
        assert!(!ninth.allowed);
        assert_eq!(ninth.remaining, 0);
    }

    #[tokio::test]
    async fn remaining_never_goes_negative_while_allowed() {
        let rl = limiter(3, 0);
        for _ in 0..3 {
            let decision = rl.check("hash", "ip", "/x").await.unwrap();
            assert!(decision.remaining >= 0);
        }
    }

    #[tokio::test]
    async fn distinct_keys_have_independent_windows() {
        let rl = limiter(1, 0);
        let a = rl.check("hash-a", "ip", "/x").await.unwrap();
        let b = rl.check("hash-b", "ip", "/x").await.unwrap();
        assert!(a.allowed);
        assert!(b.allowed);
    }

    #[tokio::test]
    async fn eighty_first_request_blocks_with_default_constants() {
        // S4 from spec §8: RPM=60, BURST=20 -> the 81st request in a window is BLOCK.
        let rl = limiter(60, 20);
        let mut last = RateDecision { allowed: true, remaining: 0 };
        for _ in 0..81 {
            last = rl.check("hash", "ip", "/x").await.unwrap();
        }
        assert!(!last.allowed);
    }
}
