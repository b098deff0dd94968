//! Thin wrapper over a std UDP socket.
//!
//! Each blocking call is bounded by the poll timeout given at bind time, so a
//! loop built on top of it wakes up at least that often even when no traffic
//! arrives. A timeout is reported as "nothing happened" rather than as an
//! error. The wrapper knows nothing about the protocol.

use crate::error::TransportError;
use log::debug;
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Shortest wait the socket accepts; a zero timeout means "block forever" to
/// the OS and is rejected by std.
const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddrV4,
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn to_v4(addr: SocketAddr) -> Result<SocketAddrV4, TransportError> {
    match addr {
        SocketAddr::V4(v4) => Ok(v4),
        other => Err(TransportError::NonIpv4Source(other)),
    }
}

impl UdpEndpoint {
    /// Binds to `addr` and bounds every later send and receive by
    /// `poll_timeout`.
    pub fn bind(addr: SocketAddrV4, poll_timeout: Duration) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.into(),
            source,
        })?;

        let timeout = Some(poll_timeout.max(MIN_POLL_TIMEOUT));
        socket
            .set_read_timeout(timeout)
            .map_err(TransportError::Configure)?;
        socket
            .set_write_timeout(timeout)
            .map_err(TransportError::Configure)?;

        let local_addr = socket
            .local_addr()
            .map_err(TransportError::Configure)
            .and_then(to_v4)?;
        debug!("UDP socket bound to {}", local_addr);

        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }

    /// Sends one datagram. Returns `Ok(false)` if the socket did not become
    /// writable within the poll timeout; the caller just skips this send.
    pub fn send_to(&self, bytes: &[u8], dest: SocketAddrV4) -> Result<bool, TransportError> {
        match self.socket.send_to(bytes, dest) {
            Ok(sent) if sent < bytes.len() => Err(TransportError::PartialSend {
                dest: dest.into(),
                sent,
                len: bytes.len(),
            }),
            Ok(_) => Ok(true),
            Err(e) if is_timeout(&e) => Ok(false),
            Err(source) => Err(TransportError::Send {
                dest: dest.into(),
                source,
            }),
        }
    }

    /// Waits up to the poll timeout for one datagram.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. Datagrams larger than
    /// `buf` are truncated by the OS; the codec rejects what it cannot parse.
    pub fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> Result<Option<(usize, SocketAddrV4)>, TransportError> {
        match self.socket.recv_from(buf) {
            Ok((len, source)) => Ok(Some((len, to_v4(source)?))),
            Err(e) if is_timeout(&e) => Ok(None),
            // Windows reports ICMP port-unreachable from an earlier send as a
            // reset on the next receive. Nothing was received.
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!("ignoring connection reset on UDP socket: {}", e);
                Ok(None)
            }
            Err(e) => Err(TransportError::Receive(e)),
        }
    }
}
