//! Application level messages.

use crate::ws::frame::OpCode;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum MessageType {
    /// A default message or one built from a frame that carries no message type of its own.
    #[default]
    Empty,
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

impl From<OpCode> for MessageType {
    fn from(op_code: OpCode) -> Self {
        match op_code {
            OpCode::Text => MessageType::Text,
            OpCode::Binary => MessageType::Binary,
            OpCode::Ping => MessageType::Ping,
            OpCode::Pong => MessageType::Pong,
            OpCode::Close => MessageType::Close,
            OpCode::Continuation => MessageType::Empty,
        }
    }
}

/// Where a message sits in a fragmented sequence. Aggregated messages are always `Complete`;
/// with [`crate::ws::FragmentsPolicy::Notify`] each fragment is delivered with its own role.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum MessageRole {
    #[default]
    Complete,
    First,
    Continuation,
    Last,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Message {
    kind: MessageType,
    role: MessageRole,
    data: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageType, role: MessageRole, data: impl Into<Vec<u8>>) -> Message {
        Self {
            kind,
            role,
            data: data.into(),
        }
    }

    pub(crate) fn complete(kind: MessageType, data: Vec<u8>) -> Message {
        Self::new(kind, MessageRole::Complete, data)
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// The data as text, if this is a text message holding valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageType::Text => std::str::from_utf8(&self.data).ok(),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind == MessageType::Text
    }

    pub fn is_binary(&self) -> bool {
        self.kind == MessageType::Binary
    }

    pub fn is_ping(&self) -> bool {
        self.kind == MessageType::Ping
    }

    pub fn is_pong(&self) -> bool {
        self.kind == MessageType::Pong
    }

    pub fn is_close(&self) -> bool {
        self.kind == MessageType::Close
    }

    pub fn is_empty(&self) -> bool {
        self.kind == MessageType::Empty
    }

    pub fn is_complete(&self) -> bool {
        self.role == MessageRole::Complete
    }

    pub fn is_first(&self) -> bool {
        self.role == MessageRole::First
    }

    pub fn is_continuation(&self) -> bool {
        self.role == MessageRole::Continuation
    }

    pub fn is_last(&self) -> bool {
        self.role == MessageRole::Last
    }
}
