#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{path::PathBuf, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::{self, ShutdownGuard},
    net::{address::SocketAddress, socket::Interface},
    telemetry::tracing::{self, Instrument as _},
};

use clap::{Parser, Subcommand};

use chaos_proxy_lib::{
    chaos::FaultPolicy,
    config::{ConfigStore, DEFAULT_TARGET_URL, TargetConfig},
    telemetry::TelemetryHub,
    utils,
};

pub mod client;
pub mod driver;
pub mod server;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(test)]
pub mod test;

/// CLI arguments for configuring the chaos proxy.
#[derive(Debug, Clone, Parser)]
#[command(name = "chaos-proxy")]
#[command(bin_name = "chaos-proxy")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: CliCommand,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false, global = true)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 1., global = true)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,

    #[cfg(target_family = "unix")]
    /// Set the limit of max open file descriptors for this process and its children.
    #[arg(long, value_name = "N", default_value_t = 262_144, global = true)]
    pub ulimit: utils::os::rlim_t,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    Serve(ServeArgs),
    Drive(driver::DriveCommand),
}

#[derive(Debug, Clone, clap::Args)]
/// run the chaos proxy together with its control server
pub struct ServeArgs {
    /// network interface to bind the chaos proxy to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "127.0.0.1:8081"
    )]
    pub bind: Interface,

    /// network interface to bind the control http server to
    #[arg(long, value_name = "INTERFACE", default_value = "127.0.0.1:8080")]
    pub control: Interface,

    /// directory in which the bound server addresses are written
    #[arg(long, short = 'D', default_value = ".chaos-proxy")]
    pub data: PathBuf,

    /// destination all proxied requests are forwarded to
    #[arg(long, value_name = "URL", default_value = DEFAULT_TARGET_URL)]
    pub target: String,

    /// default amount of simulated users of a load run
    #[arg(long, default_value_t = 10)]
    pub users: u32,

    /// default amount of users spawned per second in a load run
    #[arg(long, default_value_t = 2)]
    pub spawn_rate: u32,

    /// maximum time to wait for the destination to respond
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub forward_timeout: Duration,

    /// program to run as load driver (defaults to the current executable)
    #[arg(long, value_name = "PATH")]
    pub driver_program: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    })?;

    #[cfg(target_family = "unix")]
    utils::os::raise_nofile(args.ulimit).context("set file descriptor limit")?;

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Runs the selected command and blocks until
/// a critical error occurs or the (graceful) shutdown has been initiated.
///
/// This entry point is used by both the (binary) `main` function as well as
/// for the e2e test suite found in the test module.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));

    let (error_tx, error_rx) = tokio::sync::mpsc::channel::<BoxError>(1);
    let graceful = graceful::Shutdown::new(new_shutdown_signal(error_rx, base_shutdown_signal));

    match args.cmd {
        CliCommand::Serve(serve_args) => spawn_servers(&graceful, serve_args, error_tx).await?,
        CliCommand::Drive(drive_args) => {
            graceful.spawn_task_fn(async move |guard| {
                if let Err(err) = driver::exec(guard, drive_args).await {
                    tracing::error!("load driver exited with an error: {err}");
                    let _ = error_tx.send(err).await;
                }
            });
        }
    }

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };

    tracing::info!("gracefully shutdown with a delay of: {delay:?}");
    Ok(())
}

async fn spawn_servers(
    graceful: &graceful::Shutdown,
    args: ServeArgs,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
) -> Result<(), BoxError> {
    tokio::fs::create_dir_all(&args.data)
        .await
        .context("create data directory")
        .with_context_debug_field("path", || args.data.clone())?;

    let target = TargetConfig::try_new(&args.target, args.users, args.spawn_rate)
        .context("validate initial target config")?;
    let config = ConfigStore::new(FaultPolicy::default(), target);
    let telemetry = TelemetryHub::new();

    // the control server hands the proxy address to the load driver
    let (proxy_addr_tx, proxy_addr_rx) = tokio::sync::oneshot::channel();

    graceful.spawn_task_fn({
        let args = args.clone();
        let error_tx = error_tx.clone();
        let config = config.clone();

        |guard| run_control_server(args, guard, error_tx, config, telemetry, proxy_addr_rx)
    });

    graceful.spawn_task_fn(move |guard| {
        run_proxy_server(args, guard, error_tx, config, proxy_addr_tx)
    });

    Ok(())
}

async fn run_control_server(
    args: ServeArgs,
    guard: ShutdownGuard,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
    config: ConfigStore,
    telemetry: TelemetryHub,
    proxy_addr_rx: tokio::sync::oneshot::Receiver<SocketAddress>,
) {
    tracing::info!("spawning control http server...");
    if let Err(err) =
        server::control::run_control_server(args, guard, config, telemetry, proxy_addr_rx)
            .instrument(tracing::debug_span!(
                "control server lifetime",
                server.service.name = format!("{}-control", utils::env::project_name()),
                otel.kind = "server",
                network.protocol.name = "http",
            ))
            .await
    {
        tracing::error!("control server exited with an error: {err}");
        let _ = error_tx.send(err).await;
    }
}

async fn run_proxy_server(
    args: ServeArgs,
    guard: ShutdownGuard,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
    config: ConfigStore,
    proxy_addr_tx: tokio::sync::oneshot::Sender<SocketAddress>,
) {
    tracing::info!("spawning chaos proxy server...");
    if let Err(err) = server::proxy::run_proxy_server(args, guard, config, proxy_addr_tx)
        .instrument(tracing::debug_span!(
            "proxy server lifetime",
            server.service.name = utils::env::project_name(),
            otel.kind = "server",
            network.protocol.name = "http",
        ))
        .await
    {
        tracing::error!("proxy server exited with an error: {err}");
        let _ = error_tx.send(err).await;
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::mpsc::Receiver<BoxError>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        let mut mut_error_rx = error_rx;
        let mut signal = Box::pin(base_shutdown_signal);

        tokio::select! {
            _ = signal.as_mut() => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            err = mut_error_rx.recv() => {
                if let Some(err) = err {
                    tracing::error!("fatal err received: {err}; abort");
                } else {
                    tracing::info!("wait for default signal, no error was received");
                    signal.await;
                    tracing::debug!("default signal triggered: init graceful shutdown");
                }
            }
        }
    }
}
