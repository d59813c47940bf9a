use rama::{
    http::{BodyExtractExt as _, StatusCode, service::client::HttpClientExt as _},
    telemetry::tracing,
};
use serde_json::{Value, json};

use crate::test::e2e;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_stop_without_run() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .post(runtime.control_url("/api/load/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::CONFLICT, resp.status());
    let body: Value = resp.try_into_json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Load test not running");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_start_with_invalid_target() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .post(runtime.control_url("/api/load/start"))
        .json(&json!({ "target_url": "gopher://example.com", "users": 1, "spawn_rate": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    let body: Value = resp.try_into_json().await.unwrap();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_start_with_missing_driver_restores_target() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .post(runtime.control_url("/api/load/start"))
        .json(&json!({ "target_url": "http://127.0.0.1:1/", "users": 3, "spawn_rate": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());
    let body: Value = resp.try_into_json().await.unwrap();
    assert_eq!(body["status"], "error");

    let state: Value = client
        .get(runtime.control_url("/api/load"))
        .send()
        .await
        .unwrap()
        .try_into_json()
        .await
        .unwrap();
    assert_eq!(state["running"], false);
    assert_eq!(state["target"]["target_url"], runtime.upstream_url());
}
