//! Load driver, run as a child process of the control server.
//!
//! Simulated users are spawned at a fixed rate, each one sending
//! GET requests to the chaos proxy with a random pause in between.
//! Aggregated statistics are posted to the ingestion endpoint
//! of the control server on a fixed interval.

use std::{sync::Arc, time::Duration};

use clap::Args;
use futures::StreamExt as _;
use rama::{
    Service,
    error::BoxError,
    graceful::ShutdownGuard,
    http::{Request, Response, Uri, service::client::HttpClientExt as _},
    rt::Executor,
    telemetry::tracing,
};
use tokio::time::{Instant, MissedTickBehavior};

use chaos_proxy_lib::{load::DriverStats, telemetry::StatsReport};


/// Posting a report is best effort and never waits longer than this.
const REPORT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Args)]
/// generate load against the chaos proxy
pub struct DriveCommand {
    /// uri of the chaos proxy to send requests to
    #[arg(long, value_name = "URI")]
    pub proxy: Uri,

    /// uri to post aggregated stats reports to
    #[arg(long, value_name = "URI")]
    pub ingest: Uri,

    /// amount of simulated users
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub users: u32,

    /// users spawned per second until all users are active
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
    pub spawn_rate: u32,

    /// minimum pause of a user between two requests
    #[arg(long, value_name = "SECONDS", default_value_t = 0.1)]
    pub min_wait: f64,

    /// maximum pause of a user between two requests
    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    pub max_wait: f64,

    /// interval between two stats reports
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub report_interval: Duration,
}

/// Bounds of the random pause between two requests of a user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitRange {
    min: f64,
    max: f64,
}

impl WaitRange {
    pub fn try_new(min: f64, max: f64) -> Result<Self, BoxError> {
        if !min.is_finite() || !max.is_finite() || min < 0. {
            return Err(BoxError::from(format!(
                "invalid wait range: {min}..={max}: bounds have to be finite and positive"
            )));
        }
        if max < min {
            return Err(BoxError::from(format!(
                "invalid wait range: {min}..={max}: max wait is smaller than min wait"
            )));
        }
        // every sample lies within min..=max, so it converts as well
        if let Err(err) = Duration::try_from_secs_f64(max) {
            return Err(BoxError::from(format!(
                "invalid wait range: {min}..={max}: max wait is not a valid duration: {err}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn sample(&self, rng: &mut impl rand::RngExt) -> Duration {
        if self.min == self.max {
            return Duration::from_secs_f64(self.min);
        }
        Duration::from_secs_f64(rng.random_range(self.min..=self.max))
    }
}

pub async fn exec(guard: ShutdownGuard, args: DriveCommand) -> Result<(), BoxError> {
    let wait = WaitRange::try_new(args.min_wait, args.max_wait)?;
    if args.report_interval.is_zero() {
        return Err(BoxError::from("report interval has to be positive"));
    }

    let client = crate::client::new_web_client(Executor::graceful(guard.clone()))?;
    let stats = Arc::new(DriverStats::new());

    tracing::info!(
        load.proxy = %args.proxy,
        load.ingest = %args.ingest,
        load.users = args.users,
        load.spawn_rate = args.spawn_rate,
        "load driver starting",
    );

    guard.spawn_task_fn({
        let client = client.clone();
        let stats = stats.clone();
        let ingest = args.ingest.clone();
        move |guard| report_worker(guard, client, ingest, stats, args.report_interval)
    });

    let spawn_interval = Duration::from_secs_f64(1. / f64::from(args.spawn_rate));
    let mut cancelled = std::pin::pin!(guard.clone_weak().into_cancelled());

    for index in 0..args.users {
        if index > 0 {
            tokio::select! {
                _ = cancelled.as_mut() => {
                    tracing::debug!("stop spawning users: guard shutdown");
                    return Ok(());
                }
                _ = tokio::time::sleep(spawn_interval) => {}
            }
        }

        guard.spawn_task_fn({
            let client = client.clone();
            let stats = stats.clone();
            let proxy = args.proxy.clone();
            move |guard| user_worker(guard, client, proxy, stats, wait)
        });
        tracing::debug!(load.user = index + 1, "user spawned");
    }

    tracing::info!(load.users = args.users, "all users spawned");
    cancelled.await;
    Ok(())
}

async fn user_worker<C>(
    guard: ShutdownGuard,
    client: C,
    proxy: Uri,
    stats: Arc<DriverStats>,
    wait: WaitRange,
) where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    stats.user_started();
    let target = proxy.to_string();

    loop {
        let start = Instant::now();
        let failed = tokio::select! {
            _ = guard.cancelled() => break,
            failed = send_request(&client, &target) => failed,
        };
        stats.record(start.elapsed(), failed);

        let pause = wait.sample(&mut rand::rng());
        tokio::select! {
            _ = guard.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    stats.user_stopped();
}

/// Send a single request and read its body, returns true on failure.
///
/// Transport errors and any status of 400 or above count as failure.
async fn send_request<C>(client: &C, target: &str) -> bool
where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    let resp = match client.get(target).send().await {
        Ok(resp) => resp,
        Err(err) => {
            tracing::trace!("request failed: {err}");
            return true;
        }
    };

    let failed = resp.status().as_u16() >= 400;
    let mut body = resp.into_body().into_data_stream();
    while let Some(chunk) = body.next().await {
        if let Err(err) = chunk {
            tracing::trace!("failed to read response body: {err}");
            return true;
        }
    }
    failed
}

async fn report_worker<C>(
    guard: ShutdownGuard,
    client: C,
    ingest: Uri,
    stats: Arc<DriverStats>,
    interval: Duration,
) where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    let ingest = ingest.to_string();
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit report worker: guard shutdown");
                return;
            }
            _ = ticker.tick() => {}
        }

        let report = stats.take_report();
        post_report(&client, &ingest, &report).await;
    }
}

/// Post a report, any failure is logged and otherwise ignored.
async fn post_report<C>(client: &C, ingest: &str, report: &StatsReport)
where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    match tokio::time::timeout(REPORT_TIMEOUT, client.post(ingest).json(report).send()).await {
        Ok(Ok(resp)) => {
            tracing::trace!(
                http.response.status_code = resp.status().as_u16(),
                "stats report posted"
            );
        }
        Ok(Err(err)) => tracing::debug!("failed to post stats report: {err}"),
        Err(_) => tracing::debug!("posting stats report timed out"),
    }
}
