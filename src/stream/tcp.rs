//! `std::net` backed transport.

use std::io;
use std::io::ErrorKind::{Interrupted, NotConnected, WouldBlock};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, ToSocketAddrs};

use log::debug;
use socket2::{Domain, Protocol, Socket as RawSocket, Type};

use crate::stream::{ConnectionInfo, Connector, Listener, Socket};

const DEFAULT_BACKLOG_SIZE: i32 = 5;

/// Non-blocking TCP stream.
#[derive(Debug)]
pub struct TcpSocket {
    inner: std::net::TcpStream,
    open: bool,
}

impl TcpSocket {
    /// Wraps an already connected stream and switches it to non-blocking mode.
    pub fn new(stream: std::net::TcpStream) -> io::Result<TcpSocket> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: stream,
            open: true,
        })
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    #[inline]
    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(err) = &result {
            if err.kind() != WouldBlock && err.kind() != Interrupted {
                self.open = false;
            }
        }
        result
    }
}

impl From<TcpSocket> for std::net::TcpStream {
    fn from(socket: TcpSocket) -> Self {
        socket.inner
    }
}

impl Read for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);
        if let Ok(0) = result {
            if !buf.is_empty() {
                self.open = false;
            }
        }
        self.track(result)
    }
}

impl Write for TcpSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.track(result)
    }
}

impl Socket for TcpSocket {
    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        match self.inner.shutdown(Shutdown::Both) {
            Err(err) if err.kind() == NotConnected => Ok(()),
            result => result,
        }
    }
}

/// Connects [`TcpSocket`]s using `socket2`, optionally binding to a local interface first.
#[derive(Debug, Default, Copy, Clone)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Socket = TcpSocket;

    fn connect(&mut self, connection_info: &ConnectionInfo) -> io::Result<Self::Socket> {
        let socket_addr = connection_info
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::other("unable to resolve socket address"))?;

        let socket = RawSocket::new(Domain::for_address(socket_addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.set_keepalive(true)?;

        if let Some(socket_config) = connection_info.socket_config() {
            socket_config(&socket)?;
        }

        if let Some(addr) = connection_info.net_iface() {
            socket.bind(&addr.into())?;
        }

        // connect while still blocking so the timeout applies, the stream is switched to
        // non-blocking mode afterwards
        socket.connect_timeout(&socket_addr.into(), connection_info.connect_timeout())?;
        debug!("connected to {connection_info} ({socket_addr})");
        TcpSocket::new(socket.into())
    }
}

/// Non-blocking TCP listener.
#[derive(Debug)]
pub struct TcpListener {
    inner: std::net::TcpListener,
    pending: Option<std::net::TcpStream>,
    open: bool,
}

impl TcpListener {
    /// Listens on all IPv4 interfaces on `port`.
    pub fn listen(port: u16) -> io::Result<TcpListener> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    /// Listens on `addr`. Use port `0` to let the OS pick one (see [`TcpListener::local_addr`]).
    pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = RawSocket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(DEFAULT_BACKLOG_SIZE)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            inner: socket.into(),
            pending: None,
            open: true,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl Listener for TcpListener {
    type Socket = TcpSocket;

    fn poll_incoming(&mut self) -> io::Result<bool> {
        if !self.open {
            return Err(io::Error::from(NotConnected));
        }
        if self.pending.is_some() {
            return Ok(true);
        }
        match self.inner.accept() {
            Ok((stream, addr)) => {
                debug!("incoming connection from {addr}");
                self.pending = Some(stream);
                Ok(true)
            }
            Err(err) if err.kind() == WouldBlock || err.kind() == Interrupted => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn accept(&mut self) -> io::Result<Option<Self::Socket>> {
        if !self.poll_incoming()? {
            return Ok(None);
        }
        match self.pending.take() {
            Some(stream) => Ok(Some(TcpSocket::new(stream)?)),
            None => Ok(None),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn accept_within(listener: &mut TcpListener, timeout: Duration) -> TcpSocket {
        let started = Instant::now();
        loop {
            if let Some(socket) = listener.accept().unwrap() {
                return socket;
            }
            assert!(started.elapsed() < timeout, "no incoming connection");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn should_connect_and_exchange_bytes() {
        let mut listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!listener.poll_incoming().unwrap());

        let mut client = TcpConnector.connect(&ConnectionInfo::new("127.0.0.1", port)).unwrap();
        let mut server = accept_within(&mut listener, Duration::from_secs(5));

        client.write_all(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let started = Instant::now();
        let read = loop {
            match server.read(&mut buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == WouldBlock => {
                    assert!(started.elapsed() < Duration::from_secs(5));
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(err) => panic!("{err}"),
            }
        };
        assert_eq!(b"hello", &buf[..read]);

        client.close().unwrap();
        assert!(!client.is_open());
        assert!(server.is_open());
    }

    #[test]
    fn should_not_block_on_read_without_data() {
        let mut listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let port = listener.local_addr().unwrap().port();
        let _client = TcpConnector.connect(&ConnectionInfo::new("127.0.0.1", port)).unwrap();
        let mut server = accept_within(&mut listener, Duration::from_secs(5));

        let mut buf = [0u8; 16];
        let err = server.read(&mut buf).unwrap_err();
        assert_eq!(WouldBlock, err.kind());
        assert!(server.is_open());
    }
}
