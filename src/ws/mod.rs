//! Websocket protocol implementation, client and server side.
//!
//! ## Examples
//!
//! Connect to a server and echo back whatever it sends.
//! ```no_run
//! use tinyws::ws::{Config, Websocket, WebsocketEvent};
//!
//! let mut ws = Websocket::connect("ws://127.0.0.1:9001/echo", Config::default()).unwrap();
//! ws.on_message(|ws, message| {
//!     if let Some(text) = message.as_text() {
//!         let _ = ws.send_text(text.to_owned());
//!     }
//! });
//! ws.on_event(|_, event| {
//!     if let WebsocketEvent::Closed(reason) = event {
//!         println!("closed: {reason}");
//!     }
//! });
//! while ws.is_open() {
//!     ws.poll().unwrap();
//! }
//! ```
//!
//! Send a large payload as a sequence of fragments.
//! ```no_run
//! use tinyws::ws::{Config, MessageType, Websocket};
//!
//! let mut ws = Websocket::connect("ws://127.0.0.1:9001/upload", Config::default()).unwrap();
//! ws.start_stream(MessageType::Binary, b"first").unwrap();
//! ws.continue_stream(b"second").unwrap();
//! ws.end_stream(b"last").unwrap();
//! ```

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};

use http::HeaderMap;
use log::{debug, info, warn};
use rand::Rng;
use url::Url;

use crate::buffer;
use crate::stream::tcp::{TcpConnector, TcpSocket};
use crate::stream::{Connector, Socket};
use crate::time::Deadline;
use crate::ws::assembler::Assembler;
use crate::ws::close::MAX_REASON_LENGTH;
use crate::ws::decoder::Decoder;
use crate::ws::frame::{Frame, OpCode};
use crate::ws::handshake::LineReader;
use crate::ws::util::parse_url;

// re-export
pub use crate::ws::assembler::FragmentsPolicy;
pub use crate::ws::close::{CloseCode, CloseReason};
pub use crate::ws::config::Config;
pub use crate::ws::error::Error;
pub use crate::ws::handshake::compute_accept_key;
pub use crate::ws::message::{Message, MessageRole, MessageType};
pub use crate::ws::server::WebsocketServer;

pub mod assembler;
pub mod close;
mod config;
pub mod decoder;
pub mod encoder;
mod error;
pub mod frame;
mod handshake;
pub mod message;
pub mod protocol;
mod server;
mod util;

pub type ReadBuffer = buffer::ReadBuffer<4096>;

/// Which end of the connection we are. Clients mask every frame they send, servers never do.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
}

/// Lifecycle of a connection. A [`Websocket`] only exists once its handshake has succeeded so
/// `Connecting` is never observed on a live instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Connecting,
    Open,
    /// We have sent a close frame and are waiting for the peer's.
    Closing,
    Closed,
}

/// Connection events delivered to the [`Websocket::on_event`] handler.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WebsocketEvent {
    /// Handshake completed. Delivered on the first [`Websocket::poll`].
    Opened,
    /// The peer sent a ping, a pong has already been sent back.
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// The connection is closed, either by a completed close handshake or by an error.
    Closed(CloseReason),
}

type MessageHandler<S> = Box<dyn FnMut(&mut Websocket<S>, Message) + Send>;
type EventHandler<S> = Box<dyn FnMut(&mut Websocket<S>, WebsocketEvent) + Send>;

/// Websocket connection that owns the underlying socket.
///
/// All the work happens in [`Websocket::poll`]: it reads whatever the socket has, decodes frames,
/// answers pings, runs the close handshake and invokes the registered handlers. It never waits for
/// the socket.
pub struct Websocket<S> {
    socket: S,
    role: Role,
    state: State,
    buffer: ReadBuffer,
    decoder: Decoder,
    assembler: Assembler,
    config: Config,
    headers: HeaderMap,
    path: String,
    close_deadline: Option<Deadline>,
    close_sent: bool,
    close_reason: Option<CloseReason>,
    outgoing_stream: Option<OpCode>,
    events: VecDeque<WebsocketEvent>,
    dispatching_events: bool,
    on_message: Option<MessageHandler<S>>,
    on_event: Option<EventHandler<S>>,
}

impl<S> Debug for Websocket<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Websocket")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("path", &self.path)
            .field("close_reason", &self.close_reason)
            .finish_non_exhaustive()
    }
}

impl Websocket<TcpSocket> {
    /// Connects over TCP to a `ws://` url and performs the opening handshake.
    pub fn connect(url: &str, config: Config) -> Result<Websocket<TcpSocket>, Error> {
        Self::connect_with(&mut TcpConnector, url, config)
    }
}

impl<S> Websocket<S> {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    /// Why the connection was closed, once it is.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Response headers (client) or request headers (server) of the opening handshake.
    pub fn handshake_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Requested resource, including the query string.
    pub fn request_path(&self) -> &str {
        &self.path
    }

    pub fn get_ref(&self) -> &S {
        &self.socket
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    /// Handler for data messages (and, under [`FragmentsPolicy::Notify`], fragments).
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Websocket<S>, Message) + Send + 'static,
    {
        self.on_message = Some(Box::new(handler));
    }

    pub fn on_event<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Websocket<S>, WebsocketEvent) + Send + 'static,
    {
        self.on_event = Some(Box::new(handler));
    }

    fn dispatch_message(&mut self, message: Message) {
        match self.on_message.take() {
            Some(mut handler) => {
                handler(self, message);
                if self.on_message.is_none() {
                    self.on_message = Some(handler);
                }
            }
            None => debug!("no message handler, dropping {:?} message", message.kind()),
        }
    }

    fn emit(&mut self, event: WebsocketEvent) {
        self.events.push_back(event);
        self.dispatch_events();
    }

    fn dispatch_events(&mut self) {
        // events emitted from within the handler are picked up by the loop below
        if self.dispatching_events {
            return;
        }
        let Some(mut handler) = self.on_event.take() else {
            self.events.clear();
            return;
        };
        self.dispatching_events = true;
        while let Some(event) = self.events.pop_front() {
            handler(self, event);
        }
        self.dispatching_events = false;
        if self.on_event.is_none() {
            self.on_event = Some(handler);
        }
    }
}

impl<S: Socket> Websocket<S> {
    /// Connects with `connector` and performs the opening handshake.
    pub fn connect_with<C>(connector: &mut C, url: &str, config: Config) -> Result<Websocket<S>, Error>
    where
        C: Connector<Socket = S>,
    {
        let (connection_info, url) = parse_url(url)?;
        let socket = connector.connect(&connection_info)?;
        Self::client_with_key(socket, &url, config, &handshake::generate_key())
    }

    /// Performs the client handshake over an already connected socket.
    pub fn client(socket: S, url: &str, config: Config) -> Result<Websocket<S>, Error> {
        let (_, url) = parse_url(url)?;
        Self::client_with_key(socket, &url, config, &handshake::generate_key())
    }

    pub(crate) fn client_with_key(mut socket: S, url: &Url, config: Config, key: &str) -> Result<Websocket<S>, Error> {
        let mut buffer = ReadBuffer::new();
        match client_handshake(&mut socket, &mut buffer, url, &config, key) {
            Ok(headers) => {
                info!("websocket connected to {url}");
                let path = match url.query() {
                    Some(query) => format!("{}?{}", url.path(), query),
                    None => url.path().to_owned(),
                };
                Ok(Self::open(socket, Role::Client, buffer, config, headers, path))
            }
            Err(err) => {
                warn!("handshake with {url} failed: {err}");
                let _ = socket.close();
                Err(err)
            }
        }
    }

    /// Performs the server handshake on a freshly accepted socket. Invalid requests are answered
    /// with `400 Bad Request` before the socket is closed.
    pub(crate) fn accept(mut socket: S, config: Config) -> Result<Websocket<S>, Error> {
        let mut buffer = ReadBuffer::new();
        let request = LineReader::new(&mut socket, &mut buffer, &config)
            .read_head()
            .map_err(|err| match err {
                Error::Protocol(reason) => Error::HandshakeInvalid(reason.to_owned()),
                err => err,
            })
            .and_then(|head| handshake::parse_request(&head, &config));

        let request = match request {
            Ok(request) => request,
            Err(err) => {
                warn!("rejecting websocket handshake: {err}");
                if let Error::HandshakeInvalid(reason) = &err {
                    let _ = handshake::write_bad_request(&mut socket, reason, &config);
                }
                let _ = socket.close();
                return Err(err);
            }
        };
        if let Err(err) = handshake::write_response(&mut socket, &request, &config) {
            let _ = socket.close();
            return Err(err.into());
        }
        info!("websocket accepted for {}", request.path);
        Ok(Self::open(socket, Role::Server, buffer, config, request.headers, request.path))
    }

    pub(crate) fn open(
        socket: S,
        role: Role,
        buffer: ReadBuffer,
        config: Config,
        headers: HeaderMap,
        path: String,
    ) -> Websocket<S> {
        Self {
            socket,
            role,
            state: State::Open,
            buffer,
            decoder: Decoder::for_role(role).with_max_payload_size(config.max_message_size()),
            assembler: Assembler::new(config.fragments_policy(), config.max_message_size()),
            config,
            headers,
            path,
            close_deadline: None,
            close_sent: false,
            close_reason: None,
            outgoing_stream: None,
            events: VecDeque::from([WebsocketEvent::Opened]),
            dispatching_events: false,
            on_message: None,
            on_event: None,
        }
    }

    /// Performs one bounded unit of non-blocking work: decodes and dispatches at most one frame,
    /// reading from the socket only when no complete frame is buffered. Protocol and transport
    /// errors close the connection (the peer is sent a close frame when the error is a protocol
    /// violation), are reported through [`WebsocketEvent::Closed`] and returned. If the peer does
    /// not answer our close frame in time this returns [`Error::Timeout`]. Polling a closed
    /// connection is a no-op.
    pub fn poll(&mut self) -> Result<(), Error> {
        self.dispatch_events();
        if self.state == State::Closed {
            return Ok(());
        }
        match self.poll_socket() {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    #[inline]
    pub fn send_text(&mut self, text: impl AsRef<str>) -> Result<(), Error> {
        self.send_message(OpCode::Text, text.as_ref().as_bytes())
    }

    #[inline]
    pub fn send_binary(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.send_message(OpCode::Binary, data.as_ref())
    }

    /// Sends a ping, `data` can be at most 125 bytes.
    pub fn ping(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.send_control(Frame::ping(data.as_ref()))
    }

    /// Sends an unsolicited pong, `data` can be at most 125 bytes.
    pub fn pong(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.send_control(Frame::pong(data.as_ref()))
    }

    /// Starts the close handshake. The connection is `Closing` until the peer answers (or the
    /// close timeout passes); keep polling until it is `Closed`. Closing a connection that is
    /// already closing or closed is a no-op.
    pub fn close(&mut self, code: impl Into<CloseCode>, reason: &str) -> Result<(), Error> {
        match self.state {
            State::Open => {}
            State::Connecting | State::Closing | State::Closed => return Ok(()),
        }
        let code = code.into();
        if !code.is_sendable() {
            return Err(Error::Protocol("close code can not be sent"));
        }
        if reason.len() > MAX_REASON_LENGTH {
            return Err(Error::Protocol("close reason too long"));
        }
        self.send_or_fail(Frame::close(&CloseReason::new(code, reason)))?;
        debug!("close frame ({code}) sent, waiting for the peer");
        self.close_sent = true;
        self.state = State::Closing;
        self.close_deadline = Some(Deadline::after(self.config.time_source(), self.config.close_timeout()));
        Ok(())
    }

    /// Sends the first fragment of a message whose total size is not known up front. Until
    /// [`Websocket::end_stream`] is called no other data message can be sent, control frames can.
    pub fn start_stream(&mut self, kind: MessageType, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.ensure_open()?;
        if self.outgoing_stream.is_some() {
            return Err(Error::Protocol("stream already in progress"));
        }
        let op_code = match kind {
            MessageType::Text => OpCode::Text,
            MessageType::Binary => OpCode::Binary,
            _ => return Err(Error::Protocol("only text and binary messages can be streamed")),
        };
        self.send_or_fail(Frame::new(false, op_code, data.as_ref()))?;
        self.outgoing_stream = Some(op_code);
        Ok(())
    }

    pub fn continue_stream(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.ensure_stream()?;
        self.send_or_fail(Frame::new(false, OpCode::Continuation, data.as_ref()))
    }

    /// Sends the final fragment.
    pub fn end_stream(&mut self, data: impl AsRef<[u8]>) -> Result<(), Error> {
        self.ensure_stream()?;
        self.send_or_fail(Frame::new(true, OpCode::Continuation, data.as_ref()))?;
        self.outgoing_stream = None;
        Ok(())
    }

    fn send_message(&mut self, op_code: OpCode, data: &[u8]) -> Result<(), Error> {
        self.ensure_open()?;
        if self.outgoing_stream.is_some() {
            return Err(Error::Protocol("stream in progress, end it first"));
        }
        for frame in Assembler::fragment(op_code.into(), data, self.config.max_frame_size()) {
            self.send_or_fail(frame)?;
        }
        Ok(())
    }

    fn send_control(&mut self, frame: Frame) -> Result<(), Error> {
        self.ensure_open()?;
        frame.validate()?;
        self.send_or_fail(frame)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            State::Open => Ok(()),
            _ => Err(Error::Closed),
        }
    }

    fn ensure_stream(&self) -> Result<(), Error> {
        self.ensure_open()?;
        match self.outgoing_stream {
            Some(_) => Ok(()),
            None => Err(Error::Protocol("no stream in progress")),
        }
    }

    fn send_or_fail(&mut self, frame: Frame) -> Result<(), Error> {
        match self.send_frame(frame) {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    fn send_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let frame = match self.role {
            Role::Client => frame.with_mask(rand::rng().random()),
            Role::Server => frame,
        };
        encoder::send(&mut self.socket, &frame, &self.config)?;
        Ok(())
    }

    fn poll_socket(&mut self) -> Result<(), Error> {
        if let Some(deadline) = self.close_deadline {
            if deadline.expired(self.config.time_source()) {
                return Err(Error::Timeout);
            }
        }
        // frames already buffered (e.g. received together with the handshake response) come first
        if let Some(frame) = self.decoder.decode_next(&mut self.buffer)? {
            return self.on_frame(frame);
        }
        if self.buffer.read_from(&mut self.socket)? > 0 {
            if let Some(frame) = self.decoder.decode_next(&mut self.buffer)? {
                return self.on_frame(frame);
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let Some(message) = self.assembler.push(frame)? else {
            return Ok(());
        };
        match message.kind() {
            MessageType::Ping => {
                if self.state == State::Open {
                    self.send_frame(Frame::pong(message.data()))?;
                }
                self.emit(WebsocketEvent::Ping(message.into_data()));
            }
            MessageType::Pong => self.emit(WebsocketEvent::Pong(message.into_data())),
            MessageType::Close => self.on_close_frame(message.data())?,
            _ => match self.state {
                State::Open => self.dispatch_message(message),
                _ => debug!("dropping {:?} message received while closing", message.kind()),
            },
        }
        Ok(())
    }

    fn on_close_frame(&mut self, payload: &[u8]) -> Result<(), Error> {
        let reason = CloseReason::parse(payload)?;
        if !self.close_sent {
            debug!("peer initiated close ({reason}), echoing");
            self.close_sent = true;
            self.state = State::Closing;
            let code = match reason.code.is_sendable() {
                true => reason.code,
                false => CloseCode::Normal,
            };
            // the peer may already be gone, we are closing anyway
            let _ = self.send_frame(Frame::close(&CloseReason::new(code, "")));
        }
        self.finish(reason);
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Result<(), Error> {
        let code = err.close_code();
        let description = err.to_string();
        if code.is_sendable() && !self.close_sent {
            let _ = self.send_frame(Frame::close(&CloseReason::new(code, truncate(&description))));
            self.close_sent = true;
        }
        warn!("websocket {} closed: {err}", self.path);
        self.finish(CloseReason::new(code, description));
        Err(err)
    }

    fn finish(&mut self, reason: CloseReason) {
        if self.state == State::Closed {
            return;
        }
        self.state = State::Closed;
        self.close_deadline = None;
        self.outgoing_stream = None;
        let _ = self.socket.close();
        info!("websocket {} closed: {reason}", self.path);
        self.close_reason = Some(reason.clone());
        self.emit(WebsocketEvent::Closed(reason));
    }
}

fn client_handshake<S: Socket>(
    socket: &mut S,
    buffer: &mut ReadBuffer,
    url: &Url,
    config: &Config,
    key: &str,
) -> Result<HeaderMap, Error> {
    handshake::write_request(socket, url, key, config)?;
    let head = LineReader::new(socket, buffer, config)
        .read_head()
        .map_err(|err| match err {
            Error::Protocol(reason) => Error::HandshakeRejected(reason.to_owned()),
            err => err,
        })?;
    handshake::validate_response(&head, key, config)
}

/// Cuts `text` to fit a close frame, on a char boundary.
fn truncate(text: &str) -> &str {
    if text.len() <= MAX_REASON_LENGTH {
        return text;
    }
    let mut end = MAX_REASON_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
