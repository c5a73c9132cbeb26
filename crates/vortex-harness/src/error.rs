//! Error types for the harness binary.
//!
//! [`HarnessError`] wraps every failure that stops the harness. IR link
//! problems are deliberately absent: they only disable the relay.

/// Top-level error for the harness binary.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: vortex_core::config::ConfigError,
    },

    /// The tick thread could not be started.
    #[error("tick thread error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: vortex_core::tick::TickError,
    },

    /// Waiting for Ctrl-C failed.
    #[error("signal handler error: {source}")]
    Signal {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
