//! Logical websocket frame.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use crate::ws::Error;
use crate::ws::close::CloseReason;
use crate::ws::protocol::{MAX_CONTROL_PAYLOAD_LENGTH, op};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Result<OpCode, Error> {
        match value {
            op::CONTINUATION_FRAME => Ok(OpCode::Continuation),
            op::TEXT_FRAME => Ok(OpCode::Text),
            op::BINARY_FRAME => Ok(OpCode::Binary),
            op::CONNECTION_CLOSE => Ok(OpCode::Close),
            op::PING => Ok(OpCode::Ping),
            op::PONG => Ok(OpCode::Pong),
            _ => Err(Error::Protocol("unknown op_code")),
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => op::CONTINUATION_FRAME,
            OpCode::Text => op::TEXT_FRAME,
            OpCode::Binary => op::BINARY_FRAME,
            OpCode::Close => op::CONNECTION_CLOSE,
            OpCode::Ping => op::PING,
            OpCode::Pong => op::PONG,
        }
    }

    /// Close, Ping and Pong.
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// One unit of the wire format. The payload is always held unmasked; `mask_key` only says how
/// it is (or was) masked on the wire.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub fin: bool,
    /// The three reserved bits, right aligned.
    pub rsv: u8,
    pub op_code: OpCode,
    pub mask_key: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, op_code: OpCode, payload: impl Into<Vec<u8>>) -> Frame {
        Self {
            fin,
            rsv: 0,
            op_code,
            mask_key: None,
            payload: payload.into(),
        }
    }

    pub fn text(payload: impl Into<Vec<u8>>) -> Frame {
        Self::new(true, OpCode::Text, payload)
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Frame {
        Self::new(true, OpCode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Frame {
        Self::new(true, OpCode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Vec<u8>>) -> Frame {
        Self::new(true, OpCode::Pong, payload)
    }

    pub fn close(reason: &CloseReason) -> Frame {
        Self::new(true, OpCode::Close, reason.to_payload())
    }

    pub fn with_mask(self, mask_key: [u8; 4]) -> Frame {
        Self {
            mask_key: Some(mask_key),
            ..self
        }
    }

    #[inline]
    pub const fn masked(&self) -> bool {
        self.mask_key.is_some()
    }

    #[inline]
    pub fn payload_length(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Checks the invariants every frame on the wire must satisfy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.rsv != 0 {
            return Err(Error::Protocol("non zero RSV value"));
        }
        if self.op_code.is_control() {
            if !self.fin {
                return Err(Error::Protocol("fragmented control frame"));
            }
            if self.payload.len() > MAX_CONTROL_PAYLOAD_LENGTH {
                return Err(Error::Protocol("control frame payload too large"));
            }
        }
        Ok(())
    }
}

/// XORs `payload` with `mask_key`. Applying it twice restores the original bytes.
#[inline]
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    let mut chunks = payload.chunks_exact_mut(4);
    for chunk in &mut chunks {
        for (byte, key) in chunk.iter_mut().zip(mask_key) {
            *byte ^= key;
        }
    }
    for (byte, key) in chunks.into_remainder().iter_mut().zip(mask_key) {
        *byte ^= key;
    }
}
