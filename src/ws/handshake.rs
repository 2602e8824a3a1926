//! HTTP Upgrade exchange (RFC 6455 section 4).
//!
//! This is the only place that reads line by line and the only one allowed to wait: every read
//! is bounded by the handshake deadline and fails with [`Error::HandshakeTimeout`] once it
//! passes. Whatever the peer sends after the blank line that ends the head stays in the read
//! buffer and is decoded as frames.

use std::io;
use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose;
use http::header::{
    AUTHORIZATION, CONNECTION, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use httparse::Status;
use log::debug;
use percent_encoding::percent_decode_str;
use rand::Rng;
use sha1::{Digest, Sha1};
use url::Url;

use crate::idle::IdleStrategy;
use crate::time::{Deadline, TimeSource};
use crate::ws::config::Config;
use crate::ws::{Error, ReadBuffer, protocol, util};

const MAX_HEAD_LENGTH: usize = 8192;
const MAX_HEADERS: usize = 64;
const KEY_LENGTH: usize = 16;

/// `base64(SHA-1(key + GUID))`, the value the server answers a `Sec-WebSocket-Key` with.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(protocol::WS_GUID.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

pub(crate) fn generate_key() -> String {
    let nonce: [u8; KEY_LENGTH] = rand::rng().random();
    general_purpose::STANDARD.encode(nonce)
}

/// Reads CRLF terminated lines from a non-blocking socket, waiting (as per `idle`) for more bytes
/// until the deadline passes.
pub(crate) struct LineReader<'a, S> {
    socket: &'a mut S,
    buffer: &'a mut ReadBuffer,
    deadline: Deadline,
    time_source: &'a dyn TimeSource,
    idle: IdleStrategy,
}

impl<'a, S: Read> LineReader<'a, S> {
    pub fn new(socket: &'a mut S, buffer: &'a mut ReadBuffer, config: &'a Config) -> LineReader<'a, S> {
        let time_source = config.time_source();
        Self {
            socket,
            buffer,
            deadline: Deadline::after(time_source, config.handshake_timeout()),
            time_source,
            idle: config.idle_strategy(),
        }
    }

    pub fn read_line(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            if let Some(line) = self.buffer.consume_line() {
                return Ok(line.to_vec());
            }
            if self.buffer.available() > MAX_HEAD_LENGTH {
                return Err(Error::Protocol("handshake line too long"));
            }
            if self.deadline.expired(self.time_source) {
                return Err(Error::HandshakeTimeout);
            }
            let read = self.buffer.read_from(self.socket)?;
            self.idle.idle(read);
        }
    }

    /// Reads the status (or request) line and the headers up to and including the blank line.
    /// Returns them CRLF terminated so they can be handed to `httparse`.
    pub fn read_head(&mut self) -> Result<Vec<u8>, Error> {
        let mut head = Vec::with_capacity(512);
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                if head.is_empty() {
                    // tolerate empty lines before the start line
                    continue;
                }
                head.extend_from_slice(b"\r\n");
                return Ok(head);
            }
            head.extend_from_slice(&line);
            head.extend_from_slice(b"\r\n");
            if head.len() > MAX_HEAD_LENGTH {
                return Err(Error::Protocol("handshake head too large"));
            }
        }
    }
}

/// Writes the client's upgrade request for `url`. Extra headers and subprotocols are checked
/// before anything is sent.
pub(crate) fn write_request<W: Write>(stream: &mut W, url: &Url, key: &str, config: &Config) -> Result<(), Error> {
    validate_extra_headers(config)?;
    let mut request = Vec::with_capacity(256);
    write!(request, "GET {} HTTP/1.1\r\n", resource_name(url))?;
    match url.port() {
        Some(port) => write!(request, "{}: {}:{}\r\n", HOST, url.host_str().unwrap_or_default(), port)?,
        None => write!(request, "{}: {}\r\n", HOST, url.host_str().unwrap_or_default())?,
    }
    write!(request, "{}: websocket\r\n", UPGRADE)?;
    write!(request, "{}: Upgrade\r\n", CONNECTION)?;
    write!(request, "{}: {}\r\n", SEC_WEBSOCKET_KEY, key)?;
    write!(request, "{}: {}\r\n", SEC_WEBSOCKET_VERSION, protocol::WS_VERSION)?;
    if !config.protocols().is_empty() {
        write!(request, "{}: {}\r\n", SEC_WEBSOCKET_PROTOCOL, config.protocols().join(", "))?;
    }
    if let Some(credentials) = basic_credentials(url, config) {
        write!(request, "{}: Basic {}\r\n", AUTHORIZATION, credentials)?;
    }
    for (name, value) in config.headers() {
        write!(request, "{}: {}\r\n", name, value)?;
    }
    request.extend_from_slice(b"\r\n");
    util::write_all(stream, &request, config)?;
    Ok(())
}

fn validate_extra_headers(config: &Config) -> Result<(), Error> {
    for (name, value) in config.headers() {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::HandshakeInvalid(format!("invalid header name {name:?}")))?;
        HeaderValue::from_str(value)
            .map_err(|_| Error::HandshakeInvalid(format!("invalid value for header {name}")))?;
    }
    for protocol in config.protocols() {
        match !protocol.is_empty() && HeaderName::from_bytes(protocol.as_bytes()).is_ok() {
            true => {}
            false => return Err(Error::HandshakeInvalid(format!("invalid subprotocol {protocol:?}"))),
        }
    }
    Ok(())
}

/// Validates the server's response head against the `key` the request was sent with. Returns the
/// response headers.
pub(crate) fn validate_response(head: &[u8], key: &str, config: &Config) -> Result<HeaderMap, Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(head) {
        Ok(Status::Complete(_)) => {}
        Ok(Status::Partial) => return Err(Error::HandshakeRejected("incomplete response".to_owned())),
        Err(err) => return Err(Error::HandshakeRejected(err.to_string())),
    }
    let code = response.code.unwrap_or_default();
    if code != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
        return Err(Error::HandshakeRejected(format!(
            "unable to switch protocols, status code {code} {}",
            response.reason.unwrap_or_default()
        )));
    }
    let headers = to_header_map(response.headers).map_err(Error::HandshakeRejected)?;

    if !contains_token(&headers, &UPGRADE, "websocket") {
        return Err(Error::HandshakeRejected("missing or invalid Upgrade header".to_owned()));
    }
    if !contains_token(&headers, &CONNECTION, "upgrade") {
        return Err(Error::HandshakeRejected("missing or invalid Connection header".to_owned()));
    }
    let expected = compute_accept_key(key);
    match headers.get(SEC_WEBSOCKET_ACCEPT) {
        Some(accept) if accept.as_bytes() == expected.as_bytes() => {}
        Some(_) => return Err(Error::HandshakeRejected("Sec-WebSocket-Accept mismatch".to_owned())),
        None => return Err(Error::HandshakeRejected("missing Sec-WebSocket-Accept header".to_owned())),
    }
    if headers.contains_key(SEC_WEBSOCKET_EXTENSIONS) {
        return Err(Error::HandshakeRejected("server selected an extension that was not offered".to_owned()));
    }
    if let Some(selected) = headers.get(SEC_WEBSOCKET_PROTOCOL) {
        let offered = config
            .protocols()
            .iter()
            .any(|protocol| protocol.as_bytes() == selected.as_bytes());
        if !offered {
            return Err(Error::HandshakeRejected("server selected a protocol that was not offered".to_owned()));
        }
    }
    Ok(headers)
}

/// Upgrade request accepted by the server.
#[derive(Debug)]
pub(crate) struct UpgradeRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub key: String,
    pub protocol: Option<String>,
}

/// Parses and validates the client's upgrade request.
pub(crate) fn parse_request(head: &[u8], config: &Config) -> Result<UpgradeRequest, Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(head) {
        Ok(Status::Complete(_)) => {}
        Ok(Status::Partial) => return Err(Error::HandshakeInvalid("incomplete request".to_owned())),
        Err(err) => return Err(Error::HandshakeInvalid(err.to_string())),
    }
    if request.method != Some(Method::GET.as_str()) {
        return Err(Error::HandshakeInvalid("method must be GET".to_owned()));
    }
    if request.version != Some(1) {
        return Err(Error::HandshakeInvalid("HTTP/1.1 required".to_owned()));
    }
    let path = request.path.unwrap_or("/").to_owned();
    let headers = to_header_map(request.headers).map_err(Error::HandshakeInvalid)?;

    if !contains_token(&headers, &UPGRADE, "websocket") {
        return Err(Error::HandshakeInvalid("missing or invalid Upgrade header".to_owned()));
    }
    if !contains_token(&headers, &CONNECTION, "upgrade") {
        return Err(Error::HandshakeInvalid("missing or invalid Connection header".to_owned()));
    }
    match headers.get(SEC_WEBSOCKET_VERSION) {
        Some(version) if version.as_bytes() == protocol::WS_VERSION.as_bytes() => {}
        _ => return Err(Error::HandshakeInvalid("missing or invalid Sec-WebSocket-Version".to_owned())),
    }
    let key = headers
        .get(SEC_WEBSOCKET_KEY)
        .and_then(|key| key.to_str().ok())
        .map(str::trim)
        .filter(|key| {
            general_purpose::STANDARD
                .decode(key)
                .is_ok_and(|nonce| nonce.len() == KEY_LENGTH)
        })
        .ok_or_else(|| Error::HandshakeInvalid("missing or malformed Sec-WebSocket-Key".to_owned()))?
        .to_owned();

    // pick the first offered protocol the server accepts
    let protocol = headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|offered| config.protocols().iter().any(|accepted| accepted == offered))
        .map(str::to_owned);

    Ok(UpgradeRequest {
        path,
        headers,
        key,
        protocol,
    })
}

pub(crate) fn write_response<W: Write>(stream: &mut W, request: &UpgradeRequest, config: &Config) -> io::Result<()> {
    let mut response = Vec::with_capacity(256);
    write!(response, "HTTP/1.1 101 Switching Protocols\r\n")?;
    write!(response, "{}: websocket\r\n", UPGRADE)?;
    write!(response, "{}: Upgrade\r\n", CONNECTION)?;
    write!(response, "{}: {}\r\n", SEC_WEBSOCKET_ACCEPT, compute_accept_key(&request.key))?;
    if let Some(protocol) = &request.protocol {
        write!(response, "{}: {}\r\n", SEC_WEBSOCKET_PROTOCOL, protocol)?;
    }
    response.extend_from_slice(b"\r\n");
    util::write_all(stream, &response, config)
}

pub(crate) fn write_bad_request<W: Write>(stream: &mut W, reason: &str, config: &Config) -> io::Result<()> {
    let mut content_length = itoa::Buffer::new();
    let mut response = Vec::with_capacity(256);
    response.extend_from_slice(b"HTTP/1.1 400 Bad Request\r\n");
    response.extend_from_slice(b"Connection: close\r\n");
    response.extend_from_slice(b"Content-Type: text/plain\r\n");
    write!(response, "{}: {}\r\n", SEC_WEBSOCKET_VERSION, protocol::WS_VERSION)?;
    response.extend_from_slice(b"Content-Length: ");
    response.extend_from_slice(content_length.format(reason.len()).as_bytes());
    response.extend_from_slice(b"\r\n\r\n");
    response.extend_from_slice(reason.as_bytes());
    debug!("rejecting upgrade request: {reason}");
    util::write_all(stream, &response, config)
}

fn resource_name(url: &Url) -> String {
    let path = match url.path() {
        "" => "/",
        path => path,
    };
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    }
}

/// Credentials from the config, else from the url userinfo (which the url keeps percent-encoded).
fn basic_credentials(url: &Url, config: &Config) -> Option<String> {
    let mut credentials = Vec::new();
    match config.basic_auth() {
        Some((user, password)) => {
            credentials.extend_from_slice(user.as_bytes());
            credentials.push(b':');
            credentials.extend_from_slice(password.as_bytes());
        }
        None if !url.username().is_empty() => {
            credentials.extend(percent_decode_str(url.username()));
            credentials.push(b':');
            credentials.extend(percent_decode_str(url.password().unwrap_or_default()));
        }
        None => return None,
    }
    Some(general_purpose::STANDARD.encode(credentials))
}

fn to_header_map(headers: &[httparse::Header<'_>]) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for header in headers {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|err| err.to_string())?;
        let value = HeaderValue::from_bytes(header.value).map_err(|err| err.to_string())?;
        map.append(name, value);
    }
    Ok(map)
}

/// Checks if any `name` header holds `token` in its comma separated list (case-insensitive).
fn contains_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}
