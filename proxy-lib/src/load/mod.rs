//! Load run management.
//!
//! Only one load driver run can be active at any time. The
//! [`LoadController`] owns that run and is the single authority
//! on whether one is active: starting acquires it, stopping
//! (or dropping the controller) releases it.

use std::fmt;

use rama::{error::BoxError, telemetry::tracing};
use tokio::sync::Mutex;

use crate::config::{ConfigStore, TargetConfig};

mod process;
mod stats;

pub use self::{
    process::{DriverProcess, ProcessLauncher},
    stats::DriverStats,
};


/// Starts a load driver for a given target config.
pub trait DriverLauncher: Send + Sync + 'static {
    type Run: DriverRun;

    fn launch(&self, target: &TargetConfig) -> Result<Self::Run, BoxError>;
}

/// Handle to a single launched load driver.
pub trait DriverRun: Send + 'static {
    /// Returns true if the driver stopped on its own.
    fn has_exited(&mut self) -> bool;

    /// Stop the driver and wait for it to be gone.
    fn terminate(self) -> impl Future<Output = Result<(), BoxError>> + Send;
}

#[derive(Debug)]
pub enum LoadError {
    AlreadyRunning,
    NotRunning,
    Launch(BoxError),
    Terminate(BoxError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::AlreadyRunning => write!(f, "Load test already running"),
            LoadError::NotRunning => write!(f, "Load test not running"),
            LoadError::Launch(err) => write!(f, "failed to launch load driver: {err}"),
            LoadError::Terminate(err) => write!(f, "failed to terminate load driver: {err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::AlreadyRunning | LoadError::NotRunning => None,
            LoadError::Launch(err) | LoadError::Terminate(err) => Some(err.as_ref()),
        }
    }
}

pub struct LoadController<L: DriverLauncher> {
    launcher: L,
    config: ConfigStore,
    active: Mutex<Option<L::Run>>,
}

impl<L: DriverLauncher> fmt::Debug for LoadController<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadController").finish()
    }
}

impl<L: DriverLauncher> LoadController<L> {
    pub fn new(launcher: L, config: ConfigStore) -> Self {
        Self {
            launcher,
            config,
            active: Mutex::new(None),
        }
    }

    /// Start a new run against the given target.
    ///
    /// Fails with [`LoadError::AlreadyRunning`] without any side effect
    /// if a run is active. If the launch itself fails the previously
    /// active target config is put back.
    pub async fn start(&self, target: TargetConfig) -> Result<(), LoadError> {
        let mut active = self.active.lock().await;

        let exited = match active.as_mut() {
            Some(run) if !run.has_exited() => return Err(LoadError::AlreadyRunning),
            Some(_) => true,
            None => false,
        };
        if exited {
            tracing::debug!("previous load driver exited on its own: release run slot");
            *active = None;
        }

        let previous = self.config.set_target_config(target.clone());

        match self.launcher.launch(&target) {
            Ok(run) => {
                tracing::info!(
                    forward.url = %target.target_url(),
                    load.users = target.user_count(),
                    load.spawn_rate = target.spawn_rate(),
                    "load run started",
                );
                *active = Some(run);
                Ok(())
            }
            Err(err) => {
                tracing::error!("failed to launch load driver: {err}");
                let _ = self.config.set_target_config(previous);
                Err(LoadError::Launch(err))
            }
        }
    }

    /// Stop the active run.
    pub async fn stop(&self) -> Result<(), LoadError> {
        let mut active = self.active.lock().await;

        let Some(mut run) = active.take() else {
            return Err(LoadError::NotRunning);
        };
        if run.has_exited() {
            tracing::debug!("load driver already exited on its own");
            return Err(LoadError::NotRunning);
        }

        run.terminate().await.map_err(LoadError::Terminate)?;
        tracing::info!("load run stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        match self.active.lock().await.as_mut() {
            Some(run) => !run.has_exited(),
            None => false,
        }
    }

    /// Terminate the active run, if any.
    pub async fn shutdown(&self) {
        let Some(run) = self.active.lock().await.take() else {
            return;
        };
        match run.terminate().await {
            Ok(()) => tracing::debug!("load run terminated as part of shutdown"),
            Err(err) => tracing::warn!("failed to terminate load run during shutdown: {err}"),
        }
    }
}
