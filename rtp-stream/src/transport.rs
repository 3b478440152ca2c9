//! Transport collaborator interface
//!
//! A [`Transport`] moves whole RTP datagrams. [`UdpTransport`] sends over
//! a UDP socket; [`ChannelTransport`] connects two streams in memory.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use rtp_io::{RtpSocket, SocketError};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

/// Datagram transport
pub trait Transport: Send + Sync {
    /// Send one datagram
    fn send(&self, buf: &[u8]) -> io::Result<()>;

    /// Receive one datagram, waiting at most `timeout`
    ///
    /// Returns `Ok(None)` on timeout. An error of kind
    /// [`ErrorKind::NotConnected`] means the transport is closed for good.
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;
}

fn socket_error(e: SocketError) -> io::Error {
    match e {
        SocketError::Io(e) => e,
        SocketError::InvalidAddress => io::Error::new(ErrorKind::InvalidInput, e.to_string()),
    }
}

/// UDP transport
///
/// When no remote address is given, the source of the first received
/// datagram becomes the remote.
pub struct UdpTransport {
    socket: RtpSocket,
    remote: RwLock<Option<SocketAddr>>,
    timeout: RwLock<Option<Duration>>,
}

impl UdpTransport {
    /// Wrap a bound socket
    pub fn new(socket: RtpSocket, remote: Option<SocketAddr>) -> Self {
        UdpTransport {
            socket,
            remote: RwLock::new(remote),
            timeout: RwLock::new(None),
        }
    }

    /// Bind a socket on `local` and wrap it
    pub fn bind(local: SocketAddr, remote: Option<SocketAddr>) -> Result<Self, SocketError> {
        Ok(Self::new(RtpSocket::bind(local)?, remote))
    }

    /// Local address
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.socket.local_addr()
    }

    /// Current remote address
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        *self.remote.read()
    }
}

impl Transport for UdpTransport {
    fn send(&self, buf: &[u8]) -> io::Result<()> {
        let remote = self
            .remote_addr()
            .ok_or_else(|| io::Error::new(ErrorKind::AddrNotAvailable, "remote address unknown"))?;
        self.socket.send_to(buf, remote).map_err(socket_error)?;
        Ok(())
    }

    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        if *self.timeout.read() != Some(timeout) {
            self.socket
                .set_read_timeout(Some(timeout))
                .map_err(socket_error)?;
            *self.timeout.write() = Some(timeout);
        }

        match self.socket.recv_from(buf).map_err(socket_error)? {
            Some((len, from)) => {
                if self.remote.read().is_none() {
                    debug!("Learned remote address {}", from);
                    *self.remote.write() = Some(from);
                }
                Ok(Some(len))
            }
            None => Ok(None),
        }
    }
}

/// In-memory transport
///
/// Each end of a [`pair`](ChannelTransport::pair) delivers to the other.
/// Dropping one end closes the other.
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create two connected ends
    pub fn pair() -> (ChannelTransport, ChannelTransport) {
        let (a_tx, b_rx) = channel::unbounded();
        let (b_tx, a_rx) = channel::unbounded();
        (
            ChannelTransport { tx: a_tx, rx: a_rx },
            ChannelTransport { tx: b_tx, rx: b_rx },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&self, buf: &[u8]) -> io::Result<()> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(ErrorKind::NotConnected, "peer closed"))
    }

    fn recv(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        match self.rx.recv_timeout(timeout) {
            Ok(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(Some(len))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(ErrorKind::NotConnected, "peer closed"))
            }
        }
    }
}
