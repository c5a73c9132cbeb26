//! Host side of the IR link.
//!
//! The listener binds a loopback port, accepts exactly one peer, then relays
//! every 4-byte frame it reads into the engine's [`IrSink`]. The relay runs
//! as a single tokio task. It ends when the peer disconnects, a read fails,
//! or [`LinkListener::shutdown`] is called. There is no reconnection: one
//! link per session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::frame::{FRAME_LEN, IrFrame, IrSink};

/// Observable state of the Host end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Bound and waiting for the peer.
    Listening,
    /// A peer is connected and frames are being relayed.
    Connected(SocketAddr),
    /// The relay has ended. Terminal.
    Closed,
}

/// How the relay task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Shut down before any peer connected.
    NeverConnected,
    /// Shut down while a peer was connected.
    Shutdown,
    /// `accept()` itself failed.
    AcceptFailed,
    /// The peer closed the connection (zero or short read).
    PeerClosed,
    /// Reading from the peer failed.
    ReadFailed,
    /// The relay task panicked or was aborted.
    TaskFailed,
}

/// Summary returned when the relay ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Frames decoded and delivered to the sink.
    pub frames: u64,
    /// Why the relay stopped.
    pub end: RelayEnd,
}

/// Handle to the running Host relay.
#[derive(Debug)]
pub struct LinkListener {
    local_addr: SocketAddr,
    status: watch::Receiver<LinkStatus>,
    shutdown: watch::Sender<bool>,
    frames: Arc<AtomicU64>,
    task: JoinHandle<RelayEnd>,
}

impl LinkListener {
    /// Bind `addr` and spawn the relay task.
    ///
    /// Fails with [`LinkError::BindFailed`] when the port is already taken.
    /// Must be called from inside a tokio runtime.
    pub async fn start(addr: SocketAddr, sink: Arc<dyn IrSink>) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| LinkError::BindFailed { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| LinkError::BindFailed { addr, source })?;

        info!(addr = %local_addr, "IR host listening for peer");

        let (status_tx, status) = watch::channel(LinkStatus::Listening);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let frames = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(relay(
            listener,
            sink,
            status_tx,
            shutdown_rx,
            Arc::clone(&frames),
        ));

        Ok(Self {
            local_addr,
            status,
            shutdown,
            frames,
            task,
        })
    }

    /// Address actually bound (useful when binding port 0).
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes ("peer connected" notifications).
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Frames relayed so far.
    pub fn frames_relayed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Stop accepting/reading and wait for the relay to finish.
    pub async fn shutdown(self) -> RelayStats {
        // The relay may already be gone; nothing to signal then.
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// Wait for the relay to end on its own (peer disconnect or read error).
    pub async fn join(self) -> RelayStats {
        let Self {
            shutdown,
            frames,
            task,
            ..
        } = self;
        let end = match task.await {
            Ok(end) => end,
            Err(e) => {
                warn!(error = %e, "IR relay task failed");
                RelayEnd::TaskFailed
            }
        };
        drop(shutdown);
        RelayStats {
            frames: frames.load(Ordering::Relaxed),
            end,
        }
    }
}

/// Resolves once shutdown is requested or the handle is dropped.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn relay(
    listener: TcpListener,
    sink: Arc<dyn IrSink>,
    status: watch::Sender<LinkStatus>,
    mut shutdown: watch::Receiver<bool>,
    frames: Arc<AtomicU64>,
) -> RelayEnd {
    let accepted = tokio::select! {
        accepted = listener.accept() => accepted,
        () = shutdown_requested(&mut shutdown) => {
            info!("IR host shut down before a peer connected");
            status.send_replace(LinkStatus::Closed);
            return RelayEnd::NeverConnected;
        }
    };

    // Single peer only: stop listening as soon as one connection lands.
    drop(listener);

    let (stream, peer) = match accepted {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "IR host accept failed, relay disabled");
            status.send_replace(LinkStatus::Closed);
            return RelayEnd::AcceptFailed;
        }
    };

    info!(%peer, "IR peer connected");
    status.send_replace(LinkStatus::Connected(peer));

    let end = read_frames(stream, sink.as_ref(), &mut shutdown, &frames).await;

    info!(
        %peer,
        frames = frames.load(Ordering::Relaxed),
        end = ?end,
        "IR relay closed"
    );
    status.send_replace(LinkStatus::Closed);
    end
}

async fn read_frames(
    mut stream: TcpStream,
    sink: &dyn IrSink,
    shutdown: &mut watch::Receiver<bool>,
    frames: &AtomicU64,
) -> RelayEnd {
    let mut buf = [0u8; FRAME_LEN];
    loop {
        let read = tokio::select! {
            read = stream.read_exact(&mut buf) => read,
            () = shutdown_requested(shutdown) => return RelayEnd::Shutdown,
        };

        match read {
            Ok(_) => {
                let frame = IrFrame::decode(buf);
                debug!(
                    duration_micros = frame.duration_micros(),
                    is_mark = frame.is_mark(),
                    "IR frame received"
                );
                sink.deliver(frame);
                frames.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return RelayEnd::PeerClosed;
            }
            Err(e) => {
                warn!(error = %e, "IR relay read failed");
                return RelayEnd::ReadFailed;
            }
        }
    }
}
