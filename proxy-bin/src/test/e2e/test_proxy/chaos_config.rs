use rama::{
    http::{BodyExtractExt as _, StatusCode, service::client::HttpClientExt as _},
    telemetry::tracing,
};
use serde_json::{Value, json};

use crate::test::e2e;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_control_ping_and_index() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .get(runtime.control_url("/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!("pong", resp.try_into_string().await.unwrap());

    let resp = client.get(runtime.control_url("/")).send().await.unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    let page = resp.try_into_string().await.unwrap();
    assert!(page.contains("/api/observe"));
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_chaos_state_roundtrip_over_http() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let state: Value = client
        .get(runtime.control_url("/api/chaos"))
        .send()
        .await
        .unwrap()
        .try_into_json()
        .await
        .unwrap();
    assert_eq!(state["policy"]["packet_loss_percent"], 0.0);
    assert_eq!(state["target"]["target_url"], runtime.upstream_url());

    let resp = client
        .post(runtime.control_url("/api/chaos"))
        .json(&json!({
            "latency_ms": 10,
            "latency_jitter_ms": 5,
            "rate_limit_percent": 7.5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    let body: Value = resp.try_into_json().await.unwrap();
    tracing::info!("set chaos response: {body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["chaos_state"]["latency_jitter_ms"], 5);

    let state: Value = client
        .get(runtime.control_url("/api/chaos"))
        .send()
        .await
        .unwrap()
        .try_into_json()
        .await
        .unwrap();
    assert_eq!(state["policy"]["latency_ms"], 10);
    assert_eq!(state["policy"]["rate_limit_percent"], 7.5);
    assert_eq!(state["policy"]["slowdown_multiplier"], 1.0);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_invalid_chaos_state_is_rejected() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .post(runtime.control_url("/api/chaos"))
        .json(&json!({ "packet_loss_percent": 101 }))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    let body: Value = resp.try_into_json().await.unwrap();
    assert_eq!(body["status"], "error");

    let state: Value = client
        .get(runtime.control_url("/api/chaos"))
        .send()
        .await
        .unwrap()
        .try_into_json()
        .await
        .unwrap();
    assert_eq!(state["policy"]["packet_loss_percent"], 0.0);
}
