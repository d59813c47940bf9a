//! Synthetic responses returned instead of a forwarded one.

use rama::http::{
    Response, StatusCode,
    service::web::response::{Html, IntoResponse},
};

pub const PACKET_LOSS_MESSAGE: &str = "Packet Loss Simulated (502 Bad Gateway)";
pub const RATE_LIMIT_MESSAGE: &str = "Rate Limit Exceeded (429 Too Many Requests)";

pub fn packet_loss_response() -> Response {
    (StatusCode::BAD_GATEWAY, Html(PACKET_LOSS_MESSAGE)).into_response()
}

pub fn rate_limited_response() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, Html(RATE_LIMIT_MESSAGE)).into_response()
}

pub fn proxy_error_response(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Proxy Error: {err}")),
    )
        .into_response()
}
