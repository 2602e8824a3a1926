//! Close frame status codes and payload.

use std::fmt::{Display, Formatter};

use crate::ws::Error;
use crate::ws::protocol::MAX_CONTROL_PAYLOAD_LENGTH;

/// Longest reason text that still fits in a control frame next to the status code.
pub const MAX_REASON_LENGTH: usize = MAX_CONTROL_PAYLOAD_LENGTH - 2;

/// Close status codes (RFC 6455 section 7.4). Codes without a name are passed through as
/// [`CloseCode::Other`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CloseCode {
    Normal,
    GoingAway,
    ProtocolError,
    UnsupportedData,
    /// Never sent on the wire, reported when the peer's close frame carried no code.
    NoStatusReceived,
    /// Never sent on the wire, reported when the connection ended without a close frame.
    AbnormalClosure,
    InvalidPayloadData,
    PolicyViolation,
    MessageTooBig,
    MandatoryExtension,
    InternalServerError,
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1005 => CloseCode::NoStatusReceived,
            1006 => CloseCode::AbnormalClosure,
            1007 => CloseCode::InvalidPayloadData,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalServerError,
            other => CloseCode::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::NoStatusReceived => 1005,
            CloseCode::AbnormalClosure => 1006,
            CloseCode::InvalidPayloadData => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalServerError => 1011,
            CloseCode::Other(code) => code,
        }
    }
}

impl CloseCode {
    /// Checks if the code may appear in a close frame.
    pub fn is_sendable(self) -> bool {
        matches!(u16::from(self), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }
}

impl Display for CloseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CloseReason {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: impl Into<CloseCode>, reason: impl Into<String>) -> CloseReason {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Parses a close frame payload: empty, or a big endian status code optionally followed by
    /// UTF-8 reason text.
    pub fn parse(payload: &[u8]) -> Result<CloseReason, Error> {
        match payload.len() {
            0 => Ok(Self::new(CloseCode::NoStatusReceived, "")),
            1 => Err(Error::Protocol("close frame payload of one byte")),
            _ => {
                let code = CloseCode::from(u16::from_be_bytes([payload[0], payload[1]]));
                if !code.is_sendable() {
                    return Err(Error::Protocol("invalid close code"));
                }
                let reason = std::str::from_utf8(&payload[2..])
                    .map_err(|_| Error::InvalidPayload("close reason is not valid utf-8"))?;
                Ok(Self::new(code, reason))
            }
        }
    }

    /// Encodes as a close frame payload. Codes that can not be sent produce an empty payload.
    pub fn to_payload(&self) -> Vec<u8> {
        if !self.code.is_sendable() {
            return Vec::new();
        }
        let mut payload = Vec::with_capacity(2 + self.reason.len());
        payload.extend_from_slice(&u16::from(self.code).to_be_bytes());
        payload.extend_from_slice(self.reason.as_bytes());
        payload
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.reason.is_empty() {
            true => write!(f, "{}", self.code),
            false => write!(f, "{} ({})", self.code, self.reason),
        }
    }
}
