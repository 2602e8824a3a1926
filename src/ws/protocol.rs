pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV_MASK: u8 = 0b0111_0000;
pub const OP_CODE_MASK: u8 = 0b0000_1111;
pub const MASK_MASK: u8 = 0b1000_0000;
pub const PAYLOAD_LENGTH_MASK: u8 = 0b0111_1111;

/// Largest payload length that fits in the 7 bit length field.
pub const MAX_INLINE_PAYLOAD_LENGTH: usize = 125;
pub const EXTENDED_PAYLOAD_LENGTH_2: u8 = 126;
pub const EXTENDED_PAYLOAD_LENGTH_8: u8 = 127;

/// Control frames can not carry more than this.
pub const MAX_CONTROL_PAYLOAD_LENGTH: usize = 125;

/// Longest possible frame header: 2 bytes, 8 bytes extended length, 4 bytes mask key.
pub const MAX_HEADER_LENGTH: usize = 14;

/// Appended to the client key before hashing it into `Sec-WebSocket-Accept`.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const WS_VERSION: &str = "13";

pub mod op {
    pub const CONTINUATION_FRAME: u8 = 0x0;
    pub const TEXT_FRAME: u8 = 0x1;
    pub const BINARY_FRAME: u8 = 0x2;
    pub const CONNECTION_CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}
