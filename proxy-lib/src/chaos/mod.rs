//! Fault injection model.
//!
//! A [`FaultPolicy`] describes how hostile the proxy should be,
//! the [`FaultEvaluator`] turns that policy into a per-request [`Outcome`].

mod evaluator;
mod policy;

pub use self::{
    evaluator::{FaultEvaluator, Outcome},
    policy::FaultPolicy,
};
