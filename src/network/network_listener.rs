//! # Network Listener Module
//!
//! Datagram side of a capture session. [`DatagramListener`] owns the UDP socket bound on all
//! local interfaces and hands out one datagram at a time, giving up after a bounded wait so
//! the caller can look at its cancellation flag between reads.
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │ Data unit       │───▶│ DatagramListener │───▶│ StreamRecorder  │
//! │ (UDP broadcast) │    │ recv_within(..)  │    │ (receive loop)  │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use novespace_stream::network::network_listener::{DatagramListener, DatagramSource, Received};
//! use novespace_stream::error_handling::types::NetworkError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NetworkError> {
//!     let mut listener = DatagramListener::bind(3131).await?;
//!     match listener.recv_within(Duration::from_millis(200)).await? {
//!         Received::Datagram { payload, from, .. } => println!("{} bytes from {}", payload.len(), from),
//!         Received::Timeout => println!("nothing yet"),
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use log::{debug, error, info, trace};
use tokio::net::UdpSocket;

use crate::error_handling::types::NetworkError;

/// Largest datagram the data unit sends; longer ones are truncated to this size.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Result of one bounded wait on the socket.
#[derive(Debug, PartialEq)]
pub enum Received {
    Datagram {
        payload: Vec<u8>,
        from: SocketAddr,
        /// The sender's datagram was longer than [`MAX_DATAGRAM_SIZE`]
        truncated: bool,
    },
    Timeout,
}

pub type RecvFuture<'a> = Pin<Box<dyn Future<Output = Result<Received, NetworkError>> + Send + 'a>>;

/// Where a receive loop gets its datagrams from.
///
/// [`DatagramListener`] is the only production implementation; the trait is the seam the
/// session worker is written against.
pub trait DatagramSource: Send + fmt::Debug {
    fn local_addr(&self) -> SocketAddr;

    /// Waits at most `wait` for one datagram.
    fn recv_within(&mut self, wait: Duration) -> RecvFuture<'_>;

    /// Releases the underlying socket.
    fn release(self: Box<Self>);
}

/// A UDP socket bound to `0.0.0.0:<port>`, exclusively owned by one session.
#[derive(Debug)]
pub struct DatagramListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buffer: Vec<u8>,
}

/// Errors a receive loop should shrug off rather than end the session for.
fn is_transient_io_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

impl DatagramListener {
    /// Binds a UDP socket on all local interfaces.
    ///
    /// Port `0` asks the OS for a free port; `local_addr` tells which one.
    ///
    /// # Errors
    ///
    /// * `Err(NetworkError::BindError)` if the port is taken or binding is not permitted
    /// * `Err(NetworkError::SockError)` if the bound address cannot be read back
    pub async fn bind(port: u16) -> Result<Self, NetworkError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            error!("[!] Cannot bind UDP socket on {}: {}", addr, e);
            NetworkError::BindError(e)
        })?;
        let local_addr = socket.local_addr().map_err(NetworkError::SockError)?;

        info!("Creation of UDP socket on {} successful", local_addr);

        Ok(Self {
            socket,
            local_addr,
            // one spare byte tells an oversized datagram from one of exactly the maximum size
            buffer: vec![0u8; MAX_DATAGRAM_SIZE + 1],
        })
    }

    /// Releases the socket.
    pub fn close(self) {
        debug!("closing UDP socket {}", self.local_addr);
        drop(self.socket);
    }

    async fn receive(&mut self, wait: Duration) -> Result<Received, NetworkError> {
        match tokio::time::timeout(wait, self.socket.recv_from(&mut self.buffer)).await {
            Err(_) => Ok(Received::Timeout),
            Ok(Ok((n, from))) => {
                trace!("received {} byte(s) from {}", n, from);
                Ok(Received::Datagram {
                    payload: self.buffer[..n.min(MAX_DATAGRAM_SIZE)].to_vec(),
                    from,
                    truncated: n > MAX_DATAGRAM_SIZE,
                })
            }
            Ok(Err(e)) if is_transient_io_error(&e) => {
                debug!("transient receive error on {}: {}", self.local_addr, e);
                Ok(Received::Timeout)
            }
            Ok(Err(e)) => Err(NetworkError::SockError(e)),
        }
    }
}

impl DatagramSource for DatagramListener {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transient socket errors are reported as [`Received::Timeout`]; anything else is a
    /// `NetworkError::SockError` the caller should treat as fatal for the session.
    fn recv_within(&mut self, wait: Duration) -> RecvFuture<'_> {
        Box::pin(self.receive(wait))
    }

    fn release(self: Box<Self>) {
        (*self).close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sender() -> UdpSocket {
        UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap()
    }

    fn loopback(listener: &DatagramListener) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, listener.local_addr().port()))
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = DatagramListener::bind(0).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.local_addr().ip().is_unspecified());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = DatagramListener::bind(0).await.unwrap();
        let second = DatagramListener::bind(first.local_addr().port()).await;
        assert!(matches!(second, Err(NetworkError::BindError(_))));
    }

    #[tokio::test]
    async fn test_recv_within_times_out() {
        let mut listener = DatagramListener::bind(0).await.unwrap();
        let got = listener
            .recv_within(Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(got, Received::Timeout);
    }

    #[tokio::test]
    async fn test_recv_within_returns_datagram() {
        let mut listener = DatagramListener::bind(0).await.unwrap();
        let tx = sender().await;
        tx.send_to(b"36000000,10:00:00.000", loopback(&listener))
            .await
            .unwrap();

        match listener.recv_within(Duration::from_secs(2)).await.unwrap() {
            Received::Datagram {
                payload,
                from,
                truncated,
            } => {
                assert_eq!(payload, b"36000000,10:00:00.000");
                assert!(!truncated);
                assert_eq!(from, tx.local_addr().unwrap());
            }
            Received::Timeout => panic!("datagram not received"),
        }
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_truncated() {
        let mut listener = DatagramListener::bind(0).await.unwrap();
        let tx = sender().await;
        tx.send_to(&[b'x'; MAX_DATAGRAM_SIZE + 200], loopback(&listener))
            .await
            .unwrap();

        match listener.recv_within(Duration::from_secs(2)).await.unwrap() {
            Received::Datagram {
                payload, truncated, ..
            } => {
                assert_eq!(payload.len(), MAX_DATAGRAM_SIZE);
                assert!(truncated);
            }
            Received::Timeout => panic!("datagram not received"),
        }
    }

    #[tokio::test]
    async fn test_datagram_of_maximum_size_is_complete() {
        let mut listener = DatagramListener::bind(0).await.unwrap();
        let tx = sender().await;
        tx.send_to(&[b'y'; MAX_DATAGRAM_SIZE], loopback(&listener))
            .await
            .unwrap();

        match listener.recv_within(Duration::from_secs(2)).await.unwrap() {
            Received::Datagram {
                payload, truncated, ..
            } => {
                assert_eq!(payload.len(), MAX_DATAGRAM_SIZE);
                assert!(!truncated);
            }
            Received::Timeout => panic!("datagram not received"),
        }
    }

    #[tokio::test]
    async fn test_close_frees_port() {
        let listener = DatagramListener::bind(0).await.unwrap();
        let port = listener.local_addr().port();
        listener.close();
        assert!(DatagramListener::bind(port).await.is_ok());
    }
}
