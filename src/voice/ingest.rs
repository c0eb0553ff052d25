//! UDP audio ingest
//!
//! Receives raw PCM datagrams from the capture device. Delivery is best
//! effort: lost or reordered datagrams are not detected.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::Result;

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 65_535;

/// Outcome of a single bounded receive
#[derive(Debug, PartialEq, Eq)]
pub enum Received<'a> {
    /// A datagram arrived
    Data(&'a [u8]),
    /// Nothing arrived within the receive timeout
    Timeout,
}

/// Bound ingest socket
pub struct UdpIngest {
    socket: UdpSocket,
    buf: Vec<u8>,
    timeout: Duration,
}

impl UdpIngest {
    /// Bind the ingest socket
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;

        tracing::debug!(%addr, timeout_ms = timeout.as_millis(), "ingest socket bound");

        Ok(Self {
            socket,
            buf: vec![0; MAX_DATAGRAM],
            timeout,
        })
    }

    /// Address the socket is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the OS cannot report the address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive one datagram or time out
    ///
    /// # Errors
    ///
    /// Returns error on a socket failure other than the timeout
    pub async fn recv(&mut self) -> Result<Received<'_>> {
        let received =
            tokio::time::timeout(self.timeout, self.socket.recv_from(&mut self.buf)).await;

        match received {
            Err(_) => Ok(Received::Timeout),
            Ok(Ok((len, _))) => Ok(Received::Data(&self.buf[..len])),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Discard every datagram currently queued at the socket
    ///
    /// Used after playback so the assistant's own voice, picked up by the
    /// capture microphone, is not transcribed as a new command. Reads until
    /// the socket would block; never waits. Returns the number of bytes
    /// discarded.
    pub fn drain(&mut self) -> usize {
        let mut discarded = 0;

        loop {
            match self.socket.try_recv_from(&mut self.buf) {
                Ok((len, _)) => discarded += len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!(error = %e, "drain stopped on socket error");
                    break;
                }
            }
        }

        if discarded > 0 {
            tracing::debug!(bytes = discarded, "discarded audio queued during playback");
        }
        discarded
    }
}
