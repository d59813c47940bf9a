//! Observer channel served as a `text/event-stream`.
//!
//! Each [`StatsReport`] is sent as a single `data:` event holding its JSON form.

use std::convert::Infallible;

use rama::{
    bytes::Bytes,
    http::{
        Body, HeaderValue, Response,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    telemetry::tracing,
};

use crate::telemetry::{Observer, StatsReport};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Encode a report as one server-sent event frame.
pub fn encode_event(report: &StatsReport) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(report)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Turn an observer subscription into a streaming response.
///
/// The stream ends once the hub drops the observer. When the client
/// goes away the body is dropped, and with it the observer,
/// which unregisters it.
pub fn event_stream_response(observer: Observer) -> Response {
    tracing::debug!(observer.id = %observer.id(), "observer stream opened");

    let stream = futures::stream::unfold(observer, |mut observer| async move {
        loop {
            let report = observer.recv().await?;
            match encode_event(&report) {
                Ok(frame) => return Some((Ok::<_, Infallible>(frame), observer)),
                Err(err) => {
                    tracing::warn!(observer.id = %observer.id(), "skip unencodable report: {err}");
                }
            }
        }
    });

    let mut resp = Response::new(Body::from_stream(stream));
    let headers = resp.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    resp
}
