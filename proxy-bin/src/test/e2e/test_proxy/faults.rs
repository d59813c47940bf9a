use std::time::{Duration, Instant};

use chaos_proxy_lib::http::response::{PACKET_LOSS_MESSAGE, RATE_LIMIT_MESSAGE};
use rama::{
    Service,
    error::BoxError,
    http::{
        BodyExtractExt as _, Request, Response, StatusCode, service::client::HttpClientExt as _,
    },
    telemetry::tracing,
};
use serde_json::{Value, json};

use crate::test::e2e::{self, runtime::Runtime};

async fn set_policy(
    runtime: &Runtime,
    client: &impl Service<Request, Output = Response, Error = BoxError>,
    policy: Value,
) {
    let resp = client
        .post(runtime.control_url("/api/chaos"))
        .json(&policy)
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_full_packet_loss() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();
    set_policy(&runtime, &client, json!({ "packet_loss_percent": 100 })).await;

    for _ in 0..5 {
        let resp = client
            .get(runtime.proxy_url("/proxy/"))
            .send()
            .await
            .unwrap();
        assert_eq!(StatusCode::BAD_GATEWAY, resp.status());
        assert_eq!(PACKET_LOSS_MESSAGE, resp.try_into_string().await.unwrap());
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_full_rate_limit() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();
    set_policy(&runtime, &client, json!({ "rate_limit_percent": 100 })).await;

    for _ in 0..5 {
        let resp = client
            .get(runtime.proxy_url("/proxy/"))
            .send()
            .await
            .unwrap();
        assert_eq!(StatusCode::TOO_MANY_REQUESTS, resp.status());
        assert_eq!(RATE_LIMIT_MESSAGE, resp.try_into_string().await.unwrap());
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_injected_latency() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();
    set_policy(
        &runtime,
        &client,
        json!({ "latency_ms": 100, "slowdown_multiplier": 2 }),
    )
    .await;

    let start = Instant::now();
    let resp = client
        .get(runtime.proxy_url("/proxy/"))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    assert!(start.elapsed() >= Duration::from_millis(200));
}
