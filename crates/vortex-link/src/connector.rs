//! Peer side of the IR link.
//!
//! The connector is driven synchronously from the engine's IR output hook,
//! which runs on the tick thread, so it must never block. After connecting,
//! the socket is switched to non-blocking mode and every send is
//! best-effort: a frame that cannot be written right now is dropped.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::frame::{FRAME_LEN, IrFrame};

/// Upper bound for a single connect attempt on loopback.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Non-blocking sender for outbound IR frames.
#[derive(Debug)]
pub struct LinkConnector {
    stream: Option<TcpStream>,
    peer_addr: SocketAddr,
    /// Unwritten tail of a partially sent frame.
    pending: Vec<u8>,
    sent: u64,
    dropped: u64,
}

impl LinkConnector {
    /// Resolve `host:port` and connect to the first address that accepts.
    ///
    /// Each candidate is tried exactly once. This call blocks for the
    /// duration of the attempts; run it off the async executor.
    pub fn connect(host: &str, port: u16) -> Result<Self, LinkError> {
        let candidates = (host, port)
            .to_socket_addrs()
            .map_err(|source| LinkError::Resolve {
                host: host.to_owned(),
                port,
                source,
            })?;

        let mut attempts = 0usize;
        for addr in candidates {
            attempts = attempts.saturating_add(1);
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Self::from_stream(stream, addr),
                Err(e) => debug!(%addr, error = %e, "IR host candidate refused"),
            }
        }

        Err(LinkError::NoRoute {
            host: host.to_owned(),
            port,
            attempts,
        })
    }

    fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> Result<Self, LinkError> {
        stream
            .set_nonblocking(true)
            .map_err(|source| LinkError::Configure { source })?;
        stream
            .set_nodelay(true)
            .map_err(|source| LinkError::Configure { source })?;

        info!(%peer_addr, "Connected to IR host");

        Ok(Self {
            stream: Some(stream),
            peer_addr,
            pending: Vec::with_capacity(FRAME_LEN),
            sent: 0,
            dropped: 0,
        })
    }

    /// Address of the Host we are connected to.
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Frames handed to the socket.
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    /// Frames dropped (would-block, closed link, or write error).
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether the link has been closed after a hard error.
    pub const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Encode and send one IR timing event.
    ///
    /// Returns `true` if the frame was accepted by the socket. Never blocks
    /// and never reports failure beyond the return value.
    pub fn send_frame(&mut self, duration_micros: u32, is_mark: bool) -> bool {
        self.send(IrFrame::new(duration_micros, is_mark))
    }

    /// Send an already built frame. See [`send_frame`](Self::send_frame).
    pub fn send(&mut self, frame: IrFrame) -> bool {
        match self.try_send(frame) {
            Ok(true) => {
                self.sent = self.sent.saturating_add(1);
                true
            }
            Ok(false) => {
                debug!(
                    duration_micros = frame.duration_micros(),
                    "IR frame dropped, socket busy"
                );
                self.dropped = self.dropped.saturating_add(1);
                false
            }
            Err(e) => {
                if let Some(stream) = self.stream.take() {
                    warn!(
                        peer = %self.peer_addr,
                        error = %e,
                        sent = self.sent,
                        "IR host went away, outbound relay disabled"
                    );
                    let _ = stream.shutdown(Shutdown::Both);
                }
                self.pending.clear();
                self.dropped = self.dropped.saturating_add(1);
                false
            }
        }
    }

    /// Close the connection. Later sends are dropped.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!(peer = %self.peer_addr, sent = self.sent, dropped = self.dropped, "IR link closed");
        }
    }

    /// `Ok(false)` means the frame was dropped without breaking framing.
    fn try_send(&mut self, frame: IrFrame) -> io::Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };

        if !self.pending.is_empty() {
            let written = write_available(stream, &self.pending)?;
            self.pending.drain(..written);
            if !self.pending.is_empty() {
                return Ok(false);
            }
        }

        let bytes = frame.encode();
        let written = write_available(stream, &bytes)?;
        if written == 0 {
            return Ok(false);
        }
        if let Some(tail) = bytes.get(written..) {
            self.pending.extend_from_slice(tail);
        }
        Ok(true)
    }
}

/// Write as much of `bytes` as the socket takes without blocking.
fn write_available(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<usize> {
    let mut written = 0usize;
    while let Some(rest) = bytes.get(written..) {
        if rest.is_empty() {
            break;
        }
        match stream.write(rest) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written = written.saturating_add(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn frames_arrive_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut connector = LinkConnector::connect("127.0.0.1", port).unwrap();
        let (mut accepted, _) = listener.accept().unwrap();

        assert!(connector.send_frame(9_000, true));
        assert!(connector.send_frame(4_500, false));
        assert_eq!(connector.sent(), 2);

        let mut buf = [0u8; 8];
        accepted.read_exact(&mut buf).unwrap();
        let (first, second) = buf.split_at(FRAME_LEN);
        assert_eq!(
            IrFrame::decode(first.try_into().unwrap()),
            IrFrame::mark(9_000)
        );
        assert_eq!(
            IrFrame::decode(second.try_into().unwrap()),
            IrFrame::space(4_500)
        );
    }

    #[test]
    fn refused_connection_is_no_route() {
        let port = {
            let probe = TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };

        let err = LinkConnector::connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, LinkError::NoRoute { attempts: 1, .. }));
    }

    #[test]
    fn host_going_away_closes_connector() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut connector = LinkConnector::connect("127.0.0.1", port).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        drop(accepted);
        drop(listener);

        for _ in 0..200 {
            connector.send_frame(560, true);
            if connector.is_closed() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert!(connector.is_closed());
        let dropped = connector.dropped();
        assert!(!connector.send_frame(560, false));
        assert_eq!(connector.dropped(), dropped + 1);
    }

    #[test]
    fn explicit_close_drops_later_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut connector = LinkConnector::connect("127.0.0.1", port).unwrap();
        connector.close();

        assert!(connector.is_closed());
        assert!(!connector.send_frame(1, true));
        assert_eq!(connector.sent(), 0);
        assert_eq!(connector.dropped(), 1);
    }
}
