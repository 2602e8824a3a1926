//! Transports on top of which the websocket protocol runs.
//!
//! The protocol engine only needs a non-blocking byte stream. Network stacks plug in by
//! implementing [`Socket`] for the stream, [`Connector`] for the client side and [`Listener`]
//! for the server side; the implementation is picked once, when the connection or server is
//! constructed.

use std::fmt::{Display, Formatter};
use std::io;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use std::vec;

use socket2::Socket as RawSocket;
use url::{ParseError, Url};

pub mod replay;
pub mod tcp;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Byte stream the websocket runs on. Reads and writes are expected to be non-blocking: a read
/// with no data available fails with [`io::ErrorKind::WouldBlock`] and a read of zero bytes
/// means the peer has closed the stream.
pub trait Socket: Read + Write {
    /// Checks if the stream can still be used.
    fn is_open(&self) -> bool;

    /// Closes the stream. Closing an already closed stream is a no-op.
    fn close(&mut self) -> io::Result<()>;
}

impl<S: Socket + ?Sized> Socket for &mut S {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Creates connected client sockets.
pub trait Connector {
    type Socket: Socket;

    /// Connects to the endpoint described by `connection_info`.
    fn connect(&mut self, connection_info: &ConnectionInfo) -> io::Result<Self::Socket>;
}

/// Server side transport that hands out one socket per incoming connection.
pub trait Listener {
    type Socket: Socket;

    /// Checks (without blocking) if there is a connection waiting to be accepted.
    fn poll_incoming(&mut self) -> io::Result<bool>;

    /// Accepts the next waiting connection, if any.
    fn accept(&mut self) -> io::Result<Option<Self::Socket>>;

    /// Stops listening.
    fn close(&mut self) -> io::Result<()>;
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
    net_iface: Option<SocketAddr>,
    connect_timeout: Duration,
    socket_config: Option<fn(&RawSocket) -> io::Result<()>>,
}

impl ToSocketAddrs for ConnectionInfo {
    type Iter = vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> io::Result<Self::Iter> {
        (self.host.as_str(), self.port).to_socket_addrs()
    }
}

impl Display for ConnectionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<&Url> for ConnectionInfo {
    type Error = io::Error;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        Ok(ConnectionInfo::new(
            url.host_str().ok_or_else(|| io::Error::other("host not present"))?,
            url.port_or_known_default()
                .ok_or_else(|| io::Error::other("port not present"))?,
        ))
    }
}

impl TryFrom<Result<Url, ParseError>> for ConnectionInfo {
    type Error = io::Error;

    fn try_from(result: Result<Url, ParseError>) -> Result<Self, Self::Error> {
        match result {
            Ok(url) => ConnectionInfo::try_from(&url),
            Err(err) => Err(io::Error::other(err)),
        }
    }
}

impl From<(&str, u16)> for ConnectionInfo {
    fn from(host_and_port: (&str, u16)) -> Self {
        let (host, port) = host_and_port;
        Self::new(host, port)
    }
}

impl ConnectionInfo {
    /// Create a new connection info from `host` and `port`.
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            host: host.as_ref().to_string(),
            port,
            net_iface: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket_config: None,
        }
    }

    /// Bind the socket to a local address (network interface) before connecting.
    pub fn with_net_iface(self, net_iface: SocketAddr) -> Self {
        Self {
            net_iface: Some(net_iface),
            ..self
        }
    }

    /// Upper bound for establishing the transport connection.
    pub fn with_connect_timeout(self, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..self
        }
    }

    /// Add custom user action used to configure socket.
    pub fn with_socket_config(self, socket_config: fn(&RawSocket) -> io::Result<()>) -> Self {
        Self {
            socket_config: Some(socket_config),
            ..self
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn net_iface(&self) -> Option<SocketAddr> {
        self.net_iface
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub(crate) fn socket_config(&self) -> Option<fn(&RawSocket) -> io::Result<()>> {
        self.socket_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_connection_info_from_url() {
        let url = Url::parse("ws://example.com/chat").unwrap();
        let info = ConnectionInfo::try_from(&url).unwrap();
        assert_eq!("example.com", info.host());
        assert_eq!(80, info.port());
        assert_eq!("example.com:80", info.to_string());
    }

    #[test]
    fn should_use_explicit_port() {
        let info = ConnectionInfo::try_from(Url::parse("ws://10.0.0.7:8080/")).unwrap();
        assert_eq!("10.0.0.7", info.host());
        assert_eq!(8080, info.port());
    }

    #[test]
    fn should_fail_on_invalid_url() {
        assert!(ConnectionInfo::try_from(Url::parse("not a url")).is_err());
    }
}
