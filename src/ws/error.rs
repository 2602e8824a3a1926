use std::io;
use std::io::ErrorKind::Other;
use thiserror::Error;
use url::ParseError;

use crate::ws::close::CloseCode;

#[derive(Error, Debug)]
pub enum Error {
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("invalid handshake request: {0}")]
    HandshakeInvalid(String),
    #[error("websocket protocol error: {0}")]
    Protocol(&'static str),
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
    #[error("message of {0} bytes exceeds the configured limit")]
    MessageTooBig(usize),
    #[error("the peer did not answer the close frame in time")]
    Timeout,
    #[error("the websocket is closed and can be dropped")]
    Closed,
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    #[error("url parse error: {0}")]
    InvalidUrl(#[from] ParseError),
    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),
}

impl Error {
    /// Close code sent to the peer (and reported to the consumer) when this error terminates an
    /// open connection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Error::Protocol(_) => CloseCode::ProtocolError,
            Error::InvalidPayload(_) => CloseCode::InvalidPayloadData,
            Error::MessageTooBig(_) => CloseCode::MessageTooBig,
            _ => CloseCode::AbnormalClosure,
        }
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::IO(err) => err,
            other => io::Error::new(Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_errors_to_close_codes() {
        assert_eq!(CloseCode::ProtocolError, Error::Protocol("bad rsv").close_code());
        assert_eq!(CloseCode::InvalidPayloadData, Error::InvalidPayload("utf-8").close_code());
        assert_eq!(CloseCode::MessageTooBig, Error::MessageTooBig(10).close_code());
        assert_eq!(CloseCode::AbnormalClosure, Error::Timeout.close_code());
    }

    #[test]
    fn should_unwrap_io_error() {
        let err: io::Error = Error::IO(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert_eq!(io::ErrorKind::BrokenPipe, err.kind());
    }
}
