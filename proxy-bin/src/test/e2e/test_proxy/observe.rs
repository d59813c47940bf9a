use std::time::Duration;

use futures::StreamExt as _;
use rama::{
    http::{
        BodyExtractExt as _, StatusCode, header::CONTENT_TYPE,
        service::client::HttpClientExt as _,
    },
    telemetry::tracing,
};
use serde_json::{Value, json};

use crate::test::e2e;

#[tokio::test]
#[tracing_test::traced_test]
async fn test_stats_reach_observer() {
    let runtime = e2e::runtime::spawn().await;
    let client = runtime.client();

    let resp = client
        .get(runtime.control_url("/api/observe"))
        .send()
        .await
        .unwrap();
    assert_eq!(StatusCode::OK, resp.status());
    assert!(
        resp.headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"))
    );
    let mut events = resp.into_body().into_data_stream();

    let ack: Value = client
        .post(runtime.control_url("/api/stats"))
        .json(&json!({
            "total_rps": 25.5,
            "total_failures": 0.5,
            "avg_response_time": 31.0,
            "user_count": 4,
        }))
        .send()
        .await
        .unwrap()
        .try_into_json()
        .await
        .unwrap();
    assert_eq!(ack["status"], "ok");

    let mut buffer = String::new();
    let frame = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(end) = buffer.find("\n\n") {
                return buffer[..end].to_owned();
            }
            let chunk = events.next().await.unwrap().unwrap();
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    })
    .await
    .unwrap();

    let data = frame.strip_prefix("data: ").unwrap();
    let report: Value = serde_json::from_str(data).unwrap();
    assert_eq!(report["total_rps"], 25.5);
    assert_eq!(report["total_failures"], 0.5);
    assert_eq!(report["avg_response_time"], 31.0);
    assert_eq!(report["user_count"], 4);
}
