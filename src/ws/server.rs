use std::net::SocketAddr;

use log::info;

use crate::stream::Listener;
use crate::stream::tcp::TcpListener;
use crate::ws::{Config, Error, Websocket};

/// Accepts websocket clients from a [`Listener`]. Every accepted connection gets its own
/// [`Websocket`] with a copy of the server's [`Config`]; the server keeps no reference to it.
#[derive(Debug)]
pub struct WebsocketServer<L> {
    listener: L,
    config: Config,
}

impl WebsocketServer<TcpListener> {
    /// Listens for TCP connections on `port` on all interfaces.
    pub fn listen(port: u16, config: Config) -> Result<WebsocketServer<TcpListener>, Error> {
        let listener = TcpListener::listen(port)?;
        info!("websocket server listening on port {port}");
        Ok(Self::new(listener, config))
    }

    pub fn bind(addr: SocketAddr, config: Config) -> Result<WebsocketServer<TcpListener>, Error> {
        let listener = TcpListener::bind(addr)?;
        info!("websocket server listening on {}", listener.local_addr()?);
        Ok(Self::new(listener, config))
    }
}

impl<L: Listener> WebsocketServer<L> {
    pub fn new(listener: L, config: Config) -> WebsocketServer<L> {
        Self { listener, config }
    }

    /// Checks (without blocking) if a client is waiting to be accepted.
    pub fn poll(&mut self) -> Result<bool, Error> {
        Ok(self.listener.poll_incoming()?)
    }

    /// Accepts the next waiting client and performs the server handshake, waiting at most the
    /// configured handshake timeout for its request. Returns `None` if nobody is waiting. A failed
    /// handshake only affects that one client: its socket is closed and the error returned.
    pub fn accept(&mut self) -> Result<Option<Websocket<L::Socket>>, Error> {
        match self.listener.accept()? {
            Some(socket) => Websocket::accept(socket, self.config.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Stops accepting clients. Connections already accepted are not affected.
    pub fn close(&mut self) -> Result<(), Error> {
        info!("websocket server closed");
        Ok(self.listener.close()?)
    }

    pub fn get_ref(&self) -> &L {
        &self.listener
    }

    pub fn get_mut(&mut self) -> &mut L {
        &mut self.listener
    }
}
