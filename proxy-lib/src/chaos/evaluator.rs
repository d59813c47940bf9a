use std::time::Duration;

use super::FaultPolicy;

/// Decision taken for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Simulated packet loss, answered with a synthetic 502.
    Drop,
    /// Simulated throttling, answered with a synthetic 429.
    RateLimited,
    /// Forward the request after sleeping for the given delay.
    Forward(Duration),
}

/// Stateless evaluator of a [`FaultPolicy`].
///
/// The checks happen in a fixed order (loss, rate limit, latency),
/// each one drawing independently from the provided random source.
/// Keeping this order stable makes seeded scenarios reproducible.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct FaultEvaluator;

impl FaultEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, policy: &FaultPolicy, rng: &mut impl rand::RngExt) -> Outcome {
        if policy.is_passthrough() {
            return Outcome::Forward(Duration::ZERO);
        }

        if policy.packet_loss_percent > 0. && rng.random_range(0. ..100.) < policy.packet_loss_percent
        {
            return Outcome::Drop;
        }

        if policy.rate_limit_percent > 0. && rng.random_range(0. ..100.) < policy.rate_limit_percent
        {
            return Outcome::RateLimited;
        }

        Outcome::Forward(compute_delay(policy, rng))
    }
}

fn compute_delay(policy: &FaultPolicy, rng: &mut impl rand::RngExt) -> Duration {
    let jitter = if policy.latency_jitter_ms > 0 {
        let bound = policy.latency_jitter_ms as f64;
        rng.random_range(-bound..=bound)
    } else {
        0.
    };

    let delay_ms = (policy.latency_ms as f64 + jitter).max(0.) * policy.slowdown_multiplier;
    if !delay_ms.is_finite() || delay_ms <= 0. {
        return Duration::ZERO;
    }

    Duration::from_nanos((delay_ms * 1_000_000.).round() as u64)
}
