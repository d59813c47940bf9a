use rama::{
    http::{BodyExtractExt as _, HeaderValue, StatusCode, service::client::HttpClientExt as _},
    telemetry::tracing,
};
use serde_json::Value;

use crate::test::e2e;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_forward_to_configured_target() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .post(runtime.proxy_url("/proxy/ignored/path?q=1"))
        .header("x-chaos-test", "e2e")
        .body("ping")
        .send()
        .await
        .unwrap();

    assert_eq!(StatusCode::OK, resp.status());
    assert_eq!(
        resp.headers().get("x-upstream"),
        Some(&HeaderValue::from_static("echo"))
    );

    let echo: Value = resp.try_into_json().await.unwrap();
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["path"], "/echo");
    assert_eq!(echo["host"], runtime.upstream_authority());
    assert_eq!(echo["x-chaos-test"], "e2e");
    assert_eq!(echo["body"], "ping");
}

#[tokio::test]
#[tracing_test::traced_test]
async fn test_forward_any_method() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .put(runtime.proxy_url("/"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    let echo: Value = resp.try_into_json().await.unwrap();
    assert_eq!(echo["method"], "PUT");
    assert_eq!(echo["body"], "payload");

    let resp = client
        .delete(runtime.proxy_url("/proxy/"))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    let echo: Value = resp.try_into_json().await.unwrap();
    assert_eq!(echo["method"], "DELETE");
}
