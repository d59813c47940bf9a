use std::{path::PathBuf, process::Stdio};

use rama::{
    error::{BoxError, ErrorContext as _},
    http::Uri,
    telemetry::tracing,
};
use tokio::process::{Child, Command};

use super::{DriverLauncher, DriverRun};
use crate::config::TargetConfig;

/// Launches the load driver as a child process.
///
/// The child is invoked as `<program> drive --proxy <uri> --ingest <uri>
/// --users <n> --spawn-rate <n>`. It only ever talks to the proxy,
/// so the forwarding destination is not passed along.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    proxy_uri: Uri,
    ingest_uri: Uri,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf, proxy_uri: Uri, ingest_uri: Uri) -> Self {
        Self {
            program,
            proxy_uri,
            ingest_uri,
        }
    }

    fn command(&self, target: &TargetConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("drive")
            .arg("--proxy")
            .arg(self.proxy_uri.to_string())
            .arg("--ingest")
            .arg(self.ingest_uri.to_string())
            .arg("--users")
            .arg(target.user_count().to_string())
            .arg("--spawn-rate")
            .arg(target.spawn_rate().to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl DriverLauncher for ProcessLauncher {
    type Run = DriverProcess;

    fn launch(&self, target: &TargetConfig) -> Result<Self::Run, BoxError> {
        let child = self
            .command(target)
            .spawn()
            .context("spawn load driver process")
            .with_context_debug_field("program", || self.program.clone())?;

        tracing::debug!(pid = ?child.id(), program = ?self.program, "load driver process spawned");
        Ok(DriverProcess { child })
    }
}

/// A running load driver process.
///
/// The process is killed when this handle is dropped.
#[derive(Debug)]
pub struct DriverProcess {
    child: Child,
}

impl DriverRun for DriverProcess {
    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("load driver process exited with status: {status}");
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!("failed to query load driver process status: {err}");
                true
            }
        }
    }

    async fn terminate(mut self) -> Result<(), BoxError> {
        let pid = self.child.id();
        self.child
            .kill()
            .await
            .context("kill load driver process")
            .with_context_debug_field("pid", || pid)?;
        tracing::debug!(?pid, "load driver process killed");
        Ok(())
    }
}
