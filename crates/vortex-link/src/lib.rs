//! Emulated infrared link between two running Vortex harness instances.
//!
//! Real devices exchange modes over IR. On a PC the same exchange runs over
//! a loopback TCP connection: one process acts as the IR **Host** (listens
//! and feeds received timings into its engine), the other as the **Peer**
//! (connects and forwards its engine's outbound timings).
//!
//! # Modules
//!
//! - [`election`] -- First-claimer-wins role election and the
//!   [`RoleElector`] that runs it once per process.
//! - [`launcher`] -- [`ProcessLauncher`] capability used by the Host to
//!   start its Peer.
//! - [`frame`] -- The 4-byte IR frame wire format and the [`IrSink`]
//!   delivery seam.
//! - [`listener`] -- Host side: single-peer accept plus frame relay.
//! - [`connector`] -- Peer side: non-blocking best-effort frame sender.
//! - [`link`] -- Wires election, listener, and connector together.
//!
//! [`RoleElector`]: election::RoleElector
//! [`ProcessLauncher`]: launcher::ProcessLauncher
//! [`IrSink`]: frame::IrSink

pub mod connector;
pub mod election;
pub mod error;
pub mod frame;
pub mod launcher;
pub mod link;
pub mod listener;

pub use connector::LinkConnector;
pub use election::{Election, FileLockElection, LinkRole, RoleElector};
pub use error::{ElectionError, LaunchError, LinkError};
pub use frame::{IrFrame, IrSink};
pub use launcher::{CurrentExeLauncher, NoLaunch, ProcessLauncher};
pub use link::IrLink;
pub use listener::{LinkListener, LinkStatus, RelayEnd, RelayStats};

/// Well-known loopback port used by both sides of the link.
pub const DEFAULT_PORT: u16 = 33456;
