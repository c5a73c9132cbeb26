//! Host/Peer role election.
//!
//! Two harness processes cooperate on one IR link. Whichever claims the
//! shared election primitive first becomes the Host; everyone else is a
//! Peer. The claim is non-blocking and held for the lifetime of the
//! process, so a role is never renegotiated.
//!
//! The default primitive is an exclusive advisory lock on a well-known file
//! in the system temp directory. The OS drops the lock when the owning
//! process exits, so a crashed Host never wedges the next session.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::error::{ElectionError, LaunchError};
use crate::launcher::ProcessLauncher;

/// Role of this process on the IR link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkRole {
    /// The election has not run yet.
    Unelected,
    /// Listens for the peer and feeds received frames into the engine.
    Host,
    /// Connects to the host and forwards outbound frames.
    Peer,
}

/// A first-caller-wins election primitive.
pub trait Election: Send + Sync {
    /// Try to claim the Host role without blocking.
    ///
    /// Returns [`LinkRole::Host`] for the first claimer and
    /// [`LinkRole::Peer`] for everyone who loses the race.
    fn try_elect(&self) -> Result<LinkRole, ElectionError>;
}

/// Election backed by an exclusive lock on a named file.
#[derive(Debug)]
pub struct FileLockElection {
    path: PathBuf,
    /// The locked file, kept open for as long as this process is Host.
    held: OnceLock<File>,
}

impl FileLockElection {
    /// Election on `<temp dir>/<name>.lock`.
    pub fn named(name: &str) -> Self {
        Self::at(std::env::temp_dir().join(format!("{name}.lock")))
    }

    /// Election on an explicit lock file path.
    pub const fn at(path: PathBuf) -> Self {
        Self {
            path,
            held: OnceLock::new(),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Election for FileLockElection {
    fn try_elect(&self) -> Result<LinkRole, ElectionError> {
        if self.held.get().is_some() {
            return Ok(LinkRole::Host);
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(|source| ElectionError::Open {
                path: self.path.clone(),
                source,
            })?;

        match file.try_lock() {
            Ok(()) => {
                // A second winner on this handle is impossible; ignore the
                // already-set case.
                let _ = self.held.set(file);
                Ok(LinkRole::Host)
            }
            Err(TryLockError::WouldBlock) => Ok(LinkRole::Peer),
            Err(TryLockError::Error(source)) => Err(ElectionError::Lock {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Runs the election once per process and launches the Peer when Host.
#[derive(Debug)]
pub struct RoleElector<E, L> {
    election: E,
    launcher: L,
    role: OnceLock<LinkRole>,
    launched: AtomicBool,
}

impl<E: Election, L: ProcessLauncher> RoleElector<E, L> {
    /// Create an elector from an election primitive and a launcher.
    pub const fn new(election: E, launcher: L) -> Self {
        Self {
            election,
            launcher,
            role: OnceLock::new(),
            launched: AtomicBool::new(false),
        }
    }

    /// The launcher used for the Peer.
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// The elected role, or [`LinkRole::Unelected`] before [`elect`](Self::elect).
    pub fn role(&self) -> LinkRole {
        self.role.get().copied().unwrap_or(LinkRole::Unelected)
    }

    /// Decide this process's role. Only the first call runs the election.
    ///
    /// A failing election primitive degrades to [`LinkRole::Peer`]: the
    /// process then simply tries to connect to whoever is Host.
    pub fn elect(&self) -> LinkRole {
        *self.role.get_or_init(|| match self.election.try_elect() {
            Ok(role) => {
                info!(?role, "IR link role elected");
                role
            }
            Err(e) => {
                warn!(error = %e, "IR role election failed, falling back to peer");
                LinkRole::Peer
            }
        })
    }

    /// Launch the Peer process. Host only, at most once.
    pub fn launch_peer(&self) -> Result<(), LaunchError> {
        if self.role() != LinkRole::Host {
            return Err(LaunchError::NotHost);
        }
        if self.launched.swap(true, Ordering::AcqRel) {
            return Err(LaunchError::AlreadyLaunched);
        }
        self.launcher.launch_peer()
    }
}
