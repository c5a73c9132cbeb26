//! Peer process launching.
//!
//! The Host starts its Peer as a second copy of the same executable, with
//! no arguments. The Host's config file travels in [`CONFIG_ENV`] so the
//! child runs the same election on the same port, loses it, and connects
//! back. Launching is a capability handed to the elector so tests can swap
//! in a recording fake.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::error::LaunchError;

/// Environment variable naming the config file a launched Peer must load.
pub const CONFIG_ENV: &str = "VORTEX_HARNESS_CONFIG";

/// Starts the Peer process on behalf of the Host.
pub trait ProcessLauncher: Send + Sync {
    /// Launch exactly one peer process.
    fn launch_peer(&self) -> Result<(), LaunchError>;

    /// Collect the exit status of a peer that has already exited.
    fn reap(&self) -> Option<ExitStatus> {
        None
    }
}

/// Launches the currently running executable as the Peer.
#[derive(Debug, Default)]
pub struct CurrentExeLauncher {
    config: Option<PathBuf>,
    child: Mutex<Option<Child>>,
}

impl CurrentExeLauncher {
    /// A launcher whose Peer uses its own default config lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher whose Peer loads `config`.
    pub const fn with_config(config: PathBuf) -> Self {
        Self {
            config: Some(config),
            child: Mutex::new(None),
        }
    }

    /// Config file handed to the Peer, if any.
    pub fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }

    /// The command that starts `exe` as the Peer.
    ///
    /// The Peer gets no stdin so it never competes with the Host for
    /// keyboard input.
    pub fn command(&self, exe: &Path) -> Command {
        let mut command = Command::new(exe);
        command.stdin(Stdio::null());
        if let Some(config) = &self.config {
            command.env(CONFIG_ENV, config);
        }
        command
    }

    fn keep(&self, child: Child) {
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
    }
}

impl ProcessLauncher for CurrentExeLauncher {
    fn launch_peer(&self) -> Result<(), LaunchError> {
        let exe = std::env::current_exe().map_err(|source| LaunchError::CurrentExe { source })?;
        let child = self
            .command(&exe)
            .spawn()
            .map_err(|source| LaunchError::Spawn { source })?;
        info!(pid = child.id(), exe = %exe.display(), "Peer process launched");
        self.keep(child);
        Ok(())
    }

    fn reap(&self) -> Option<ExitStatus> {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let child = slot.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                info!(pid = child.id(), %status, "Peer process exited");
                *slot = None;
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(pid = child.id(), error = %e, "Cannot query peer process");
                None
            }
        }
    }
}

/// Launcher that never starts anything (the peer is started by hand).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLaunch;

impl ProcessLauncher for NoLaunch {
    fn launch_peer(&self) -> Result<(), LaunchError> {
        debug!("Peer auto-launch disabled, waiting for a manually started peer");
        Ok(())
    }
}
