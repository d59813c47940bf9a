use serde::{Deserialize, Serialize};

/// Aggregate traffic statistics as reported by the load driver.
///
/// The serialized field names are the ones the driver
/// posts and the index page reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsReport {
    #[serde(rename = "total_rps")]
    pub requests_per_second: f64,
    #[serde(rename = "total_failures")]
    pub failures_per_second: f64,
    #[serde(rename = "avg_response_time")]
    pub avg_response_time_ms: f64,
    #[serde(rename = "user_count")]
    pub active_users: u64,
}
