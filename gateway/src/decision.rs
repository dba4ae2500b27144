//! C6 — decision engine. A pure function of three advisory inputs into a
//! closed outcome; the ordering of the table below is itself a contract.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Throttle,
    Block,
}

/// Evaluates the table in spec order: rate limit first, then risk
/// thresholds (highest first), then remaining headroom, else allow.
pub fn decide(rate_limit_allowed: bool, remaining: i64, risk_score: f64) -> (Decision, &'static str) {
    if !rate_limit_allowed {
        return (Decision::Block, "Confirmed abuse: rate limit exceeded");
    }
    if risk_score >= 0.9 {
        return (Decision::Block, "Confirmed abuse: high risk behavior");
    }
    if risk_score >= 0.6 {
        return (Decision::Throttle, "Abnormal usage pattern detected");
    }
    if remaining <= 5 {
        return (Decision::Throttle, "Approaching rate limit");
    }
    (Decision::Allow, "Usage within expected behavior")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_block_takes_priority_over_everything_else() {
        let (decision, reason) = decide(false, 0, 0.0);
        assert_eq!(decision, Decision::Block);
        assert_eq!(reason, "Confirmed abuse: rate limit exceeded");
    }

    #[test]
    fn rate_limit_block_wins_even_with_low_risk_and_headroom() {
        let (decision, _) = decide(false, 59, 0.01);
        assert_eq!(decision, Decision::Block);
    }

    #[test]
    fn high_risk_blocks_before_throttle_thresholds() {
        let (decision, reason) = decide(true, 59, 0.9);
        assert_eq!(decision, Decision::Block);
        assert_eq!(reason, "Confirmed abuse: high risk behavior");
    }

    #[test]
    fn moderate_risk_throttles() {
        let (decision, reason) = decide(true, 59, 0.6);
        assert_eq!(decision, Decision::Throttle);
        assert_eq!(reason, "Abnormal usage pattern detected");
    }

    #[test]
    fn low_headroom_throttles_even_at_zero_risk() {
        let (decision, reason) = decide(true, 5, 0.0);
        assert_eq!(decision, Decision::Throttle);
        assert_eq!(reason, "Approaching rate limit");
    }

    #[test]
    fn risk_throttle_outranks_low_headroom_throttle_reason() {
        let (decision, reason) = decide(true, 0, 0.6);
        assert_eq!(decision, Decision::Throttle);
        assert_eq!(reason, "Abnormal usage pattern detected");
    }

    #[test]
    fn otherwise_allows() {
        let (decision, reason) = decide(true, 59, 0.1);
        assert_eq!(decision, Decision::Allow);
        assert_eq!(reason, "Usage within expected behavior");
    }

    #[test]
    fn boundary_risk_just_under_block_throttles_instead() {
        let (decision, _) = decide(true, 59, 0.899);
        assert_eq!(decision, Decision::Throttle);
    }

    #[test]
    fn boundary_remaining_of_six_allows() {
        let (decision, _) = decide(true, 6, 0.0);
        assert_eq!(decision, Decision::Allow);
    }
}
