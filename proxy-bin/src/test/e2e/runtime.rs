use std::{
    convert::Infallible,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, LazyLock, OnceLock},
    time::Duration,
};

use clap::Parser;
use rama::{
    Layer as _, Service,
    error::BoxError,
    http::{
        BodyExtractExt as _, HeaderValue, Request, Response,
        header::HOST,
        server::HttpServer,
        service::web::response::{IntoResponse, Json},
    },
    layer::TimeoutLayer,
    net::address::SocketAddress,
    rt::Executor,
    service::service_fn,
    tcp::server::TcpListener,
};

use crate::Args;

#[derive(Debug, Clone)]
pub(super) struct Runtime {
    _data_dir: PathBuf,

    control_addr: SocketAddress,
    proxy_addr: SocketAddress,
    upstream_addr: SocketAddress,
}

impl Runtime {
    pub fn control_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.control_addr)
    }

    pub fn proxy_url(&self, path: &str) -> String {
        format!("http://{}{path}", self.proxy_addr)
    }

    pub fn upstream_url(&self) -> String {
        format!("http://{}/echo", self.upstream_addr)
    }

    pub fn upstream_authority(&self) -> String {
        self.upstream_addr.to_string()
    }

    pub fn client(&self) -> impl Service<Request, Output = Response, Error = BoxError> {
        TimeoutLayer::new(Duration::from_secs(30))
            .into_layer(crate::client::new_web_client(Executor::default()).unwrap())
    }
}

/// Spawn a fresh app, forwarding to the shared local echo upstream.
///
/// Every test gets its own app as tests mutate the live config.
pub(super) async fn spawn() -> Runtime {
    let upstream_addr = *UPSTREAM;
    let data_dir = spawn_chaos_proxy_app(upstream_addr);

    let (control_addr, proxy_addr) = tokio::try_join!(
        tokio::time::timeout(
            Duration::from_secs(60),
            read_file_or_wait(data_dir.join("control.addr.txt"))
        ),
        tokio::time::timeout(
            Duration::from_secs(60),
            read_file_or_wait(data_dir.join("proxy.addr.txt"))
        ),
    )
    .unwrap();

    let runtime = Runtime {
        _data_dir: data_dir,
        control_addr,
        proxy_addr,
        upstream_addr,
    };

    assert!(runtime.control_addr.ip_addr.is_loopback());
    assert!(runtime.proxy_addr.ip_addr.is_loopback());
    assert_ne!(runtime.control_addr, runtime.proxy_addr);

    runtime
}

async fn read_file_or_wait(path: PathBuf) -> SocketAddress {
    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let s = s.trim();
                if let Ok(addr) = s.parse() {
                    return addr;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}

fn spawn_chaos_proxy_app(upstream_addr: SocketAddress) -> PathBuf {
    let data_dir = crate::test::tmp_dir::try_new("chaos_proxy_app_e2e").unwrap();
    eprintln!("chaos_proxy_app_e2e all data stored under: {data_dir:?}");

    let data_dir_str = data_dir.display().to_string();
    let target = format!("http://{upstream_addr}/echo");
    let missing_driver = data_dir.join("no-such-driver").display().to_string();

    let args = Args::try_parse_from([
        crate::utils::env::project_name(),
        "serve",
        "--bind",
        "127.0.0.1:0",
        "--control",
        "127.0.0.1:0",
        "--data",
        data_dir_str.as_str(),
        "--target",
        target.as_str(),
        "--forward-timeout",
        "5s",
        "--driver-program",
        missing_driver.as_str(),
        "--graceful",
        "0.42",
    ])
    .unwrap();

    let wait_server_ready = Arc::new(OnceLock::new());
    let notify_server_ready = wait_server_ready.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let server_future = crate::run_with_args(std::future::pending::<()>(), args);

        notify_server_ready.set(()).expect("waiter to be nofified");

        rt.block_on(server_future).expect("serve without errors");
    });

    wait_server_ready.wait();

    data_dir
}

static UPSTREAM: LazyLock<SocketAddress> = LazyLock::new(spawn_echo_upstream);

/// Local destination which echoes what it received as json.
fn spawn_echo_upstream() -> SocketAddress {
    let (addr_tx, addr_rx) = std::sync::mpsc::channel::<SocketAddress>();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let exec = Executor::default();
            let listener = TcpListener::bind(SocketAddress::local_ipv4(0), exec.clone())
                .await
                .unwrap();
            addr_tx.send(listener.local_addr().unwrap().into()).unwrap();

            let http_server = HttpServer::auto(exec).service(service_fn(echo));
            listener.serve(http_server).await;
        });
    });

    addr_rx.recv_timeout(Duration::from_secs(30)).unwrap()
}

async fn echo(req: Request) -> Result<Response, Infallible> {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let custom = req
        .headers()
        .get("x-chaos-test")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    let body = req.try_into_string().await.unwrap_or_default();

    let mut resp = Json(serde_json::json!({
        "method": method,
        "path": path,
        "host": host,
        "x-chaos-test": custom,
        "body": body,
    }))
    .into_response();
    resp.headers_mut()
        .insert("x-upstream", HeaderValue::from_static("echo"));
    Ok(resp)
}
