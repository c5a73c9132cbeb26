//! Error types for the IR link.
//!
//! None of these are fatal to the harness. The caller logs them once and
//! runs the rest of the session with IR relay disabled.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors raised while electing the link role.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The election lock file could not be opened or created.
    #[error("failed to open election lock {}: {source}", path.display())]
    Open {
        /// Path of the lock file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The lock call itself failed (as opposed to being contended).
    #[error("failed to lock election file {}: {source}", path.display())]
    Lock {
        /// Path of the lock file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while launching the peer process.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Only the elected Host launches a peer.
    #[error("only the host launches a peer process")]
    NotHost,

    /// The peer process was already launched by this process.
    #[error("peer process already launched")]
    AlreadyLaunched,

    /// The path of the running executable could not be determined.
    #[error("cannot locate current executable: {source}")]
    CurrentExe {
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Spawning the child process failed.
    #[error("failed to spawn peer process: {source}")]
    Spawn {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while setting up either end of the link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The listening socket could not be bound (usually: port in use).
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        /// The address we tried to bind.
        addr: SocketAddr,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The host name could not be resolved.
    #[error("could not resolve {host}:{port}: {source}")]
    Resolve {
        /// Host name that failed to resolve.
        host: String,
        /// Target port.
        port: u16,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Every resolved address refused or failed the connection.
    #[error("no route to IR host {host}:{port} ({attempts} address(es) tried)")]
    NoRoute {
        /// Host name we tried to reach.
        host: String,
        /// Target port.
        port: u16,
        /// Number of candidate addresses attempted.
        attempts: usize,
    },

    /// A socket option could not be applied after connecting.
    #[error("failed to configure link socket: {source}")]
    Configure {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
