//! Centralized egress web client creation.
//!
//! Used by the forwarding engine of the proxy server
//! as well as by the load driver.

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    http::{Request, Response, client::EasyHttpWebClient},
    layer::MapErrLayer,
    rt::Executor,
};

/// Create a new web client that can be cloned and shared.
///
/// Plain http and https (boring) destinations are supported,
/// no upstream proxy is used.
pub fn new_web_client(
    exec: Executor,
) -> Result<impl Service<Request, Output = Response, Error = BoxError> + Clone, BoxError> {
    let client = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for egress web client")?
        .build_client();

    Ok(MapErrLayer::new(Into::<BoxError>::into).into_layer(client))
}
