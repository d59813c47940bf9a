//! Library for the chaos proxy containing most of its core code:
//! fault injection, runtime configuration, forwarding, load test
//! supervision and the live telemetry plane.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod chaos;
pub mod config;
pub mod http;
pub mod load;
pub mod telemetry;
pub mod utils;
