//! Link establishment.
//!
//! Ties the election to the right end of the socket. Every failure here is
//! non-fatal: the harness logs one line and keeps running with the IR relay
//! disabled. Nothing is retried.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tracing::warn;

use crate::connector::LinkConnector;
use crate::election::{Election, LinkRole, RoleElector};
use crate::frame::IrSink;
use crate::launcher::ProcessLauncher;
use crate::listener::{LinkListener, RelayStats};

/// This process's end of the IR link.
#[derive(Debug)]
pub enum IrLink {
    /// Listening for (or relaying from) the peer.
    Host(LinkListener),
    /// Connected to the host; outbound frames go here.
    Peer(LinkConnector),
    /// No relay this session.
    Disabled,
}

impl IrLink {
    /// Role this end plays, [`LinkRole::Unelected`] when disabled.
    pub const fn role(&self) -> LinkRole {
        match self {
            Self::Host(_) => LinkRole::Host,
            Self::Peer(_) => LinkRole::Peer,
            Self::Disabled => LinkRole::Unelected,
        }
    }

    /// Whether the relay is off for this session.
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Tear down this end. Returns relay stats on the Host.
    pub async fn shutdown(self) -> Option<RelayStats> {
        match self {
            Self::Host(listener) => Some(listener.shutdown().await),
            Self::Peer(mut connector) => {
                connector.close();
                None
            }
            Self::Disabled => None,
        }
    }
}

/// Elect a role and bring up the matching end of the link.
///
/// The Host listens on the loopback interface at `port` and then launches
/// its Peer. The Peer makes a single connection attempt to `host:port`.
pub async fn establish<E, L>(
    elector: &RoleElector<E, L>,
    host: &str,
    port: u16,
    sink: Arc<dyn IrSink>,
) -> IrLink
where
    E: Election,
    L: ProcessLauncher,
{
    match elector.elect() {
        LinkRole::Host => {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            let listener = match LinkListener::start(addr, sink).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!(error = %e, "IR host could not listen, relay disabled");
                    return IrLink::Disabled;
                }
            };
            if let Err(e) = elector.launch_peer() {
                warn!(error = %e, "Peer process not launched, waiting for a manual peer");
            }
            IrLink::Host(listener)
        }
        LinkRole::Peer => {
            let target = host.to_owned();
            let connected =
                tokio::task::spawn_blocking(move || LinkConnector::connect(&target, port)).await;
            match connected {
                Ok(Ok(connector)) => IrLink::Peer(connector),
                Ok(Err(e)) => {
                    warn!(error = %e, "IR peer could not connect, relay disabled");
                    IrLink::Disabled
                }
                Err(e) => {
                    warn!(error = %e, "IR connect task failed, relay disabled");
                    IrLink::Disabled
                }
            }
        }
        LinkRole::Unelected => IrLink::Disabled,
    }
}
