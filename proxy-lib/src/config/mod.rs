//! Live configuration of the proxy.
//!
//! The [`ConfigStore`] is the only place where the active [`FaultPolicy`]
//! and [`TargetConfig`] live. It is created by the composition root and
//! handed out (by cloning the handle) to every service that needs it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use rama::telemetry::tracing;
use serde::Serialize;

use crate::chaos::FaultPolicy;

mod error;
mod target;

pub use self::{
    error::ValidationError,
    target::{DEFAULT_TARGET_URL, TargetConfig, TargetConfigInput},
};


/// Consistent view of the active configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ChaosSnapshot {
    pub policy: FaultPolicy,
    pub target: TargetConfig,
}

/// Shared handle to the active configuration.
///
/// Readers get a full [`ChaosSnapshot`] without locking,
/// writers replace it as a whole, so a reader never
/// sees fields of two different writes mixed together.
#[derive(Clone)]
pub struct ConfigStore {
    snapshot: Arc<ArcSwap<ChaosSnapshot>>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish()
    }
}

impl ConfigStore {
    pub fn new(policy: FaultPolicy, target: TargetConfig) -> Self {
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(ChaosSnapshot { policy, target })),
        }
    }

    /// Current policy and target, as set by the last completed writes.
    pub fn get(&self) -> Arc<ChaosSnapshot> {
        self.snapshot.load_full()
    }

    /// Validate and install a new fault policy.
    ///
    /// Returns the effective policy. On a validation error
    /// the store is left untouched.
    pub fn set_fault_policy(&self, policy: FaultPolicy) -> Result<FaultPolicy, ValidationError> {
        policy.validate()?;

        self.snapshot.rcu(|current| ChaosSnapshot {
            policy: policy.clone(),
            target: current.target.clone(),
        });

        tracing::info!(
            chaos.latency_ms = policy.latency_ms,
            chaos.latency_jitter_ms = policy.latency_jitter_ms,
            chaos.packet_loss_percent = policy.packet_loss_percent,
            chaos.rate_limit_percent = policy.rate_limit_percent,
            chaos.slowdown_multiplier = policy.slowdown_multiplier,
            "fault policy replaced",
        );

        Ok(policy)
    }

    /// Install a new target config, returning the one it replaced.
    pub fn set_target_config(&self, target: TargetConfig) -> TargetConfig {
        let previous = self.snapshot.rcu(|current| ChaosSnapshot {
            policy: current.policy.clone(),
            target: target.clone(),
        });

        tracing::info!(
            forward.url = %target.target_url(),
            load.users = target.user_count(),
            load.spawn_rate = target.spawn_rate(),
            "target config replaced",
        );

        previous.target.clone()
    }
}
