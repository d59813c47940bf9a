//! The chaos proxy server.
//!
//! Every inbound request, whatever its method or path, goes through
//! the fault evaluator and is then either answered with a simulated
//! fault or forwarded to the configured destination.

use std::{convert::Infallible, sync::Arc};

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        HeaderValue, Request, Response,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
    },
    net::address::SocketAddress,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use chaos_proxy_lib::{
    chaos::{FaultEvaluator, Outcome},
    config::ConfigStore,
    http::{
        forward::{ForwardingEngine, forwarding_client},
        response::{packet_loss_response, rate_limited_response},
    },
    utils::env::server_identifier,
};

use crate::ServeArgs;


/// Runs the chaos proxy server until the guard is cancelled.
pub async fn run_proxy_server(
    args: ServeArgs,
    guard: ShutdownGuard,
    config: ConfigStore,
    proxy_addr_tx: tokio::sync::oneshot::Sender<SocketAddress>,
) -> Result<(), BoxError> {
    let exec = Executor::graceful(guard.clone());

    let client = forwarding_client(
        crate::client::new_web_client(exec.clone())?,
        args.forward_timeout,
    );
    let chaos_svc = ChaosProxyService::new(config, ForwardingEngine::new(client));

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(server_identifier())),
    )
        .into_layer(chaos_svc);

    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));

    let tcp_listener = TcpListener::bind(args.bind.clone(), exec)
        .await
        .context("bind chaos proxy http server")?;

    let proxy_addr = tcp_listener
        .local_addr()
        .context("get bound address for chaos proxy http server")?;

    tracing::info!(proxy.address = %proxy_addr, "chaos proxy ready");
    crate::server::write_server_socket_address_as_file(&args.data, "proxy", proxy_addr.into())
        .await?;
    if proxy_addr_tx.send(proxy_addr.into()).is_err() {
        return Err(BoxError::from("failed to send proxy address to control server task")
            .context_field("address", proxy_addr));
    }

    tcp_listener.serve(http_server).await;

    Ok(())
}

/// Applies the active fault policy to a request,
/// forwarding it when no fault was drawn.
#[derive(Debug, Clone)]
pub struct ChaosProxyService<S> {
    config: ConfigStore,
    evaluator: FaultEvaluator,
    engine: Arc<ForwardingEngine<S>>,
}

impl<S> ChaosProxyService<S> {
    pub fn new(config: ConfigStore, engine: ForwardingEngine<S>) -> Self {
        Self {
            config,
            evaluator: FaultEvaluator::new(),
            engine: Arc::new(engine),
        }
    }
}

impl<S> Service<Request> for ChaosProxyService<S>
where
    S: Service<Request, Output = Response, Error = BoxError>,
{
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        // one snapshot per request: the decision and the destination
        // always come from the same configuration
        let snapshot = self.config.get();
        let outcome = self.evaluator.decide(&snapshot.policy, &mut rand::rng());

        let delay = match outcome {
            Outcome::Drop => {
                tracing::debug!(outcome = "drop", uri = %req.uri(), "simulate packet loss");
                return Ok(packet_loss_response());
            }
            Outcome::RateLimited => {
                tracing::debug!(outcome = "rate_limited", uri = %req.uri(), "simulate rate limit");
                return Ok(rate_limited_response());
            }
            Outcome::Forward(delay) => delay,
        };

        if !delay.is_zero() {
            tracing::trace!(outcome = "forward", delay = ?delay, "delay request");
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .engine
            .forward(req, snapshot.target.target_url())
            .await)
    }
}
