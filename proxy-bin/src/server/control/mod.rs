//! Control server: runtime configuration, load run management
//! and the live telemetry plane.

use std::{sync::Arc, time::Duration};

use rama::{
    Layer as _,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        BodyExtractExt as _, HeaderValue, Request, Response, StatusCode,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::{
            Router,
            extract::{Json, State},
            response::{Html, IntoResponse},
        },
    },
    net::address::SocketAddress,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};
use serde::Serialize;
use serde_json::json;

use chaos_proxy_lib::{
    chaos::FaultPolicy,
    config::{ConfigStore, TargetConfig, TargetConfigInput},
    http::observe::event_stream_response,
    load::{DriverLauncher, LoadController, LoadError, ProcessLauncher},
    telemetry::{DEFAULT_OBSERVER_BUFFER, StatsReport, TelemetryHub},
    utils::env::server_identifier,
};

use crate::ServeArgs;


pub async fn run_control_server(
    args: ServeArgs,
    guard: ShutdownGuard,
    config: ConfigStore,
    telemetry: TelemetryHub,
    proxy_addr_rx: tokio::sync::oneshot::Receiver<SocketAddress>,
) -> Result<(), BoxError> {
    let proxy_addr = tokio::time::timeout(Duration::from_secs(8), proxy_addr_rx)
        .await
        .context("wait to recv proxy addr from proxy task")?
        .context("recv proxy addr from proxy task")?;

    let exec = Executor::graceful(guard.clone());

    let tcp_listener = TcpListener::bind(args.control.clone(), exec.clone())
        .await
        .context("bind control http server")?;
    let control_addr = tcp_listener
        .local_addr()
        .context("get bound address for control http server")?;

    let driver_program = match args.driver_program.clone() {
        Some(path) => path,
        None => std::env::current_exe().context("resolve current executable as load driver")?,
    };
    let launcher = ProcessLauncher::new(
        driver_program,
        format!("http://{proxy_addr}/proxy/")
            .parse()
            .context("build proxy uri for load driver")?,
        format!("http://{control_addr}/api/stats")
            .parse()
            .context("build ingest uri for load driver")?,
    );
    let load = Arc::new(LoadController::new(launcher, config.clone()));

    let state = ControlState {
        config,
        telemetry: telemetry.clone(),
        load: load.clone(),
    };

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(server_identifier())),
    )
        .into_layer(new_control_router(state));
    let http_server = HttpServer::auto(exec).service(Arc::new(http_svc));

    tracing::info!(control.address = %control_addr, "control server ready");
    crate::server::write_server_socket_address_as_file(
        &args.data,
        "control",
        control_addr.into(),
    )
    .await?;

    tokio::select! {
        _ = tcp_listener.serve(http_server) => {}
        _ = guard.cancelled() => {}
    }

    // end observer streams so their connections can close,
    // and make sure no driver outlives the proxy
    telemetry.disconnect_all();
    load.shutdown().await;

    Ok(())
}

/// State shared by all control endpoints.
pub struct ControlState<L: DriverLauncher> {
    pub config: ConfigStore,
    pub telemetry: TelemetryHub,
    pub load: Arc<LoadController<L>>,
}

impl<L: DriverLauncher> Clone for ControlState<L> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            telemetry: self.telemetry.clone(),
            load: self.load.clone(),
        }
    }
}

impl<L: DriverLauncher> std::fmt::Debug for ControlState<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlState")
            .field("config", &self.config)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

pub fn new_control_router<L: DriverLauncher>(state: ControlState<L>) -> Router<ControlState<L>> {
    Router::new_with_state(state)
        .with_get("/", Html(CONTROL_SITE_INDEX_HTML))
        .with_get("/ping", "pong")
        .with_get("/api/chaos", get_chaos_state::<L>)
        .with_post("/api/chaos", set_chaos_state::<L>)
        .with_get("/api/load", get_load_state::<L>)
        .with_post("/api/load/start", start_load::<L>)
        .with_post("/api/load/stop", stop_load::<L>)
        .with_post("/api/stats", ingest_stats::<L>)
        .with_get("/api/observe", observe_stats::<L>)
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({
            "status": "error",
            "message": message.to_string(),
        })),
    )
        .into_response()
}

fn success_message(message: &str) -> Response {
    Json(json!({
        "status": "success",
        "message": message,
    }))
    .into_response()
}

async fn get_chaos_state<L: DriverLauncher>(
    State(ControlState { config, .. }): State<ControlState<L>>,
) -> Response {
    let snapshot = config.get();
    Json(snapshot.as_ref().clone()).into_response()
}

async fn set_chaos_state<L: DriverLauncher>(
    State(ControlState { config, .. }): State<ControlState<L>>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let policy: FaultPolicy = match serde_json::from_value(payload) {
        Ok(policy) => policy,
        Err(err) => {
            tracing::debug!("reject malformed fault policy: {err}");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid fault policy: {err}"));
        }
    };

    match config.set_fault_policy(policy) {
        Ok(policy) => Json(json!({
            "status": "success",
            "chaos_state": policy,
        }))
        .into_response(),
        Err(err) => {
            tracing::debug!("reject invalid fault policy: {err}");
            error_response(StatusCode::BAD_REQUEST, err)
        }
    }
}

#[derive(Debug, Serialize)]
struct LoadState {
    running: bool,
    target: TargetConfig,
}

async fn get_load_state<L: DriverLauncher>(
    State(ControlState { config, load, .. }): State<ControlState<L>>,
) -> Response {
    Json(LoadState {
        running: load.is_running().await,
        target: config.get().target.clone(),
    })
    .into_response()
}

async fn start_load<L: DriverLauncher>(
    State(ControlState { load, .. }): State<ControlState<L>>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let target = match serde_json::from_value::<TargetConfigInput>(payload)
        .map_err(|err| format!("invalid target config: {err}"))
        .and_then(|input| TargetConfig::try_from(input).map_err(|err| err.to_string()))
    {
        Ok(target) => target,
        Err(message) => {
            tracing::debug!("reject invalid target config: {message}");
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };

    match load.start(target).await {
        Ok(()) => success_message("Load test started"),
        Err(err @ LoadError::AlreadyRunning) => error_response(StatusCode::CONFLICT, err),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

async fn stop_load<L: DriverLauncher>(
    State(ControlState { load, .. }): State<ControlState<L>>,
) -> Response {
    match load.stop().await {
        Ok(()) => success_message("Load test stopped"),
        Err(err @ LoadError::NotRunning) => error_response(StatusCode::CONFLICT, err),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

async fn ingest_stats<L: DriverLauncher>(
    State(ControlState { telemetry, .. }): State<ControlState<L>>,
    req: Request,
) -> Response {
    // every report is acknowledged, even one that cannot be read or decoded
    match req.try_into_json::<StatsReport>().await {
        Ok(report) => {
            telemetry.ingest(report);
        }
        Err(err) => tracing::debug!("ignore malformed stats report: {err}"),
    }
    Json(json!({ "status": "ok" })).into_response()
}

async fn observe_stats<L: DriverLauncher>(
    State(ControlState { telemetry, .. }): State<ControlState<L>>,
) -> Response {
    event_stream_response(telemetry.subscribe(DEFAULT_OBSERVER_BUFFER))
}

const CONTROL_SITE_INDEX_HTML: &str = r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Chaos Proxy</title>
<style>
body{margin:0;font:15px/1.5 system-ui,-apple-system,Segoe UI,Roboto,Helvetica,Arial;background:#101218;color:#e8eaf2}
main{max-width:760px;margin:0 auto;padding:24px}
h1{margin:0 0 8px;font-size:32px}
section{margin-top:24px;padding:16px;border:1px solid #2a2e3b;border-radius:8px}
label{display:block;margin:6px 0}
input{width:120px;margin-left:8px}
input.wide{width:360px}
button{margin-top:10px;padding:6px 14px;border:0;border-radius:6px;background:#ff5a4f;color:#fff;font-weight:700;cursor:pointer}
dl{display:grid;grid-template-columns:max-content auto;gap:4px 16px}
dd{margin:0;font-variant-numeric:tabular-nums}
pre{white-space:pre-wrap;color:#9aa3b8}
</style>
</head>
<body>
<main>
<h1>Chaos Proxy</h1>
<section>
<h2>Faults</h2>
<label>latency (ms)<input id="latency_ms" type="number" min="0" value="0"></label>
<label>latency jitter (ms)<input id="latency_jitter_ms" type="number" min="0" value="0"></label>
<label>packet loss (%)<input id="packet_loss_percent" type="number" min="0" max="100" step="any" value="0"></label>
<label>rate limit (%)<input id="rate_limit_percent" type="number" min="0" max="100" step="any" value="0"></label>
<label>slowdown multiplier<input id="slowdown_multiplier" type="number" min="0" step="any" value="1"></label>
<button id="apply">apply</button>
</section>
<section>
<h2>Load</h2>
<label>target url<input id="target_url" class="wide" type="url"></label>
<label>users<input id="users" type="number" min="1" value="10"></label>
<label>spawn rate<input id="spawn_rate" type="number" min="1" value="2"></label>
<button id="start">start</button> <button id="stop">stop</button>
</section>
<section>
<h2>Live</h2>
<dl>
<dt>requests/s</dt><dd id="total_rps">-</dd>
<dt>failures/s</dt><dd id="total_failures">-</dd>
<dt>avg response time (ms)</dt><dd id="avg_response_time">-</dd>
<dt>users</dt><dd id="user_count">-</dd>
</dl>
</section>
<pre id="log"></pre>
</main>
<script>
const $ = (id) => document.getElementById(id);
const log = (msg) => { $("log").textContent = msg; };
const post = async (path, body) => {
  const resp = await fetch(path, {method: "POST", headers: {"content-type": "application/json"}, body: JSON.stringify(body || {})});
  log(await resp.text());
};
const num = (id) => Number($(id).value);
fetch("/api/chaos").then((r) => r.json()).then((state) => {
  for (const [k, v] of Object.entries(state.policy)) { if ($(k)) $(k).value = v; }
  $("target_url").value = state.target.target_url;
  $("users").value = state.target.users;
  $("spawn_rate").value = state.target.spawn_rate;
});
$("apply").onclick = () => post("/api/chaos", {
  latency_ms: num("latency_ms"),
  latency_jitter_ms: num("latency_jitter_ms"),
  packet_loss_percent: num("packet_loss_percent"),
  rate_limit_percent: num("rate_limit_percent"),
  slowdown_multiplier: num("slowdown_multiplier"),
});
$("start").onclick = () => post("/api/load/start", {
  target_url: $("target_url").value,
  users: num("users"),
  spawn_rate: num("spawn_rate"),
});
$("stop").onclick = () => post("/api/load/stop");
const events = new EventSource("/api/observe");
events.onmessage = (ev) => {
  const stats = JSON.parse(ev.data);
  for (const k of ["total_rps", "total_failures", "avg_response_time"]) { $(k).textContent = stats[k].toFixed(2); }
  $("user_count").textContent = stats.user_count;
};
</script>
</body>
</html>
"##;
