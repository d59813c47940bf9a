//! Forwarding engine.
//!
//! Every request is relayed to the single configured destination,
//! whatever the path it arrived on.

use std::time::Duration;

use rama::{
    Layer as _, Service,
    error::BoxError,
    http::{
        Request, Response, Uri, Version,
        layer::remove_header::{RemoveRequestHeaderLayer, RemoveResponseHeaderLayer},
    },
    layer::TimeoutLayer,
    telemetry::tracing::{self, Instrument as _},
};

use super::{headers::rewrite_host_header, response::proxy_error_response};

/// Default bound on the wait for the destination to respond.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Wrap an egress web client with the middleware used for forwarding:
/// a bounded wait on the destination and hop-by-hop header removal
/// in both directions.
pub fn forwarding_client<S>(
    client: S,
    timeout: Duration,
) -> impl Service<Request, Output = Response, Error = BoxError>
where
    S: Service<Request, Output = Response, Error: Into<BoxError>>,
{
    (
        TimeoutLayer::new(timeout),
        RemoveResponseHeaderLayer::hop_by_hop(),
        RemoveRequestHeaderLayer::hop_by_hop(),
    )
        .into_layer(client)
}

#[derive(Debug, Clone)]
pub struct ForwardingEngine<S> {
    client: S,
}

impl<S> ForwardingEngine<S>
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    pub fn new(client: S) -> Self {
        Self { client }
    }

    /// Relay the request to `target` and return the response as-is.
    ///
    /// The response body is not buffered. A transport failure results
    /// in a single synthetic 500 response, it is never retried.
    pub async fn forward(&self, req: Request, target: &Uri) -> Response {
        let method = req.method().clone();
        let req = build_outbound_request(req, target);

        match self
            .client
            .serve(req)
            .instrument(tracing::debug_span!(
                "forward request",
                http.request.method = %method,
                url.full = %target,
                otel.kind = "client",
                network.protocol.name = "http",
            ))
            .await
        {
            Ok(resp) => {
                tracing::trace!(
                    http.response.status_code = resp.status().as_u16(),
                    "destination responded"
                );
                resp
            }
            Err(err) => {
                tracing::warn!(url.full = %target, "error forwarding request: {err}");
                proxy_error_response(err)
            }
        }
    }
}

/// Build the outbound request: same method, headers and body,
/// aimed at `target` instead of the proxy.
///
/// The inbound protocol version is not carried over,
/// the egress connection negotiates its own.
pub fn build_outbound_request(req: Request, target: &Uri) -> Request {
    let (mut parts, body) = req.into_parts();
    parts.uri = target.clone();
    parts.version = Version::HTTP_11;
    rewrite_host_header(&mut parts.headers, target);
    Request::from_parts(parts, body)
}
