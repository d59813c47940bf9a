use serde::{Deserialize, Serialize};

use crate::config::ValidationError;

/// Chaos parameters applied to every proxied request.
///
/// Fields are independent of one another. Missing fields
/// in a JSON payload take their default, which means that a
/// new policy always replaces the previous one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPolicy {
    /// Base delay injected before forwarding.
    pub latency_ms: u64,
    /// Symmetric jitter bound around [`Self::latency_ms`].
    pub latency_jitter_ms: u64,
    /// Probability (0..=100) that a request is dropped.
    pub packet_loss_percent: f64,
    /// Probability (0..=100) that a request is rejected as rate limited.
    pub rate_limit_percent: f64,
    /// Scales the computed delay.
    pub slowdown_multiplier: f64,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            latency_jitter_ms: 0,
            packet_loss_percent: 0.,
            rate_limit_percent: 0.,
            slowdown_multiplier: 1.,
        }
    }
}

impl FaultPolicy {
    /// Check all fields against their allowed range.
    ///
    /// Values are never clamped: an out of range value
    /// is reported back to the caller instead.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_percent("packet_loss_percent", self.packet_loss_percent)?;
        validate_percent("rate_limit_percent", self.rate_limit_percent)?;

        if !self.slowdown_multiplier.is_finite() {
            return Err(ValidationError::NotFinite {
                field: "slowdown_multiplier",
            });
        }
        if self.slowdown_multiplier < 0. {
            return Err(ValidationError::OutOfRange {
                field: "slowdown_multiplier",
                value: self.slowdown_multiplier,
                min: 0.,
                max: f64::INFINITY,
            });
        }

        Ok(())
    }

    /// Returns true if this policy would leave all traffic untouched.
    pub fn is_passthrough(&self) -> bool {
        self.packet_loss_percent <= 0.
            && self.rate_limit_percent <= 0.
            && (self.slowdown_multiplier == 0.
                || (self.latency_ms == 0 && self.latency_jitter_ms == 0))
    }
}

fn validate_percent(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    if !(0. ..=100.).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: 0.,
            max: 100.,
        });
    }
    Ok(())
}
