//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the
//! byte stream the MQTT session runs over, and a TCP implementation on top
//! of `embassy-net`.
//!
//! A transport is reusable: `open` abandons whatever connection it currently
//! holds and establishes a new one. This is how the node reconnects to the
//! broker without reallocating socket buffers.

use core::net::Ipv4Addr;

use embassy_net::IpAddress;
use embassy_net::tcp::{ConnectError, Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use futures::future::{Either, select};

/// Address of the MQTT broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl BrokerEndpoint {
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }
}

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Drops the current connection without a graceful close, if there is
    /// one, and connects to `endpoint`.
    async fn open(&mut self, endpoint: BrokerEndpoint) -> Result<(), Self::Error>;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read, or `0` if nothing arrived within
    /// the transport's poll window. A peer that closed the connection is an
    /// error, never `Ok(0)`.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TcpTransportError {
    /// The TCP handshake failed.
    Connect(ConnectError),
    /// The TCP handshake did not finish within the connect timeout.
    ConnectTimeout,
    /// Reading or writing the socket failed.
    Io(TcpError),
    /// The broker closed the connection.
    Closed,
}

/// TCP transport implementation using `embassy-net`.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    connect_timeout: Duration,
    poll_timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Wraps a socket. `poll_timeout` bounds every `recv`; `connect_timeout`
    /// bounds the TCP handshake in `open`.
    pub fn new(socket: TcpSocket<'a>, connect_timeout: Duration, poll_timeout: Duration) -> Self {
        Self {
            socket,
            connect_timeout,
            poll_timeout,
        }
    }
}

impl MqttTransport for TcpTransport<'_> {
    type Error = TcpTransportError;

    async fn open(&mut self, endpoint: BrokerEndpoint) -> Result<(), Self::Error> {
        self.socket.abort();

        let remote = (IpAddress::Ipv4(endpoint.addr), endpoint.port);
        let result = match select(
            core::pin::pin!(self.socket.connect(remote)),
            core::pin::pin!(Timer::after(self.connect_timeout)),
        )
        .await
        {
            Either::Left((Ok(()), _)) => Ok(()),
            Either::Left((Err(e), _)) => Err(TcpTransportError::Connect(e)),
            Either::Right(((), _)) => Err(TcpTransportError::ConnectTimeout),
        };

        if result.is_err() {
            self.socket.abort();
        }
        result
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("tcp: tx {} bytes", buf.len());
        self.socket
            .write_all(buf)
            .await
            .map_err(TcpTransportError::Io)?;

        // Flush to ensure data is actually sent to the network
        self.socket.flush().await.map_err(TcpTransportError::Io)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match select(
            core::pin::pin!(self.socket.read(buf)),
            core::pin::pin!(Timer::after(self.poll_timeout)),
        )
        .await
        {
            // If the peer closes the connection, read returns 0.
            Either::Left((Ok(0), _)) => Err(TcpTransportError::Closed),
            Either::Left((Ok(n), _)) => {
                trace!("tcp: rx {} bytes", n);
                Ok(n)
            }
            Either::Left((Err(e), _)) => Err(TcpTransportError::Io(e)),
            Either::Right(((), _)) => Ok(0),
        }
    }
}
