use log::debug;

use crate::ws::frame::{Frame, OpCode, apply_mask};
use crate::ws::{Error, ReadBuffer, Role, protocol};

/// Progressive frame decoder. Each call to [`Decoder::decode_next`] consumes as much of the
/// buffer as it can and returns `Ok(None)` when the next frame is not complete yet; the partial
/// header state is kept between calls.
#[derive(Debug)]
pub struct Decoder {
    decode_state: DecodeState,
    fin: bool,
    op_code: OpCode,
    payload_length: usize,
    mask_key: Option<[u8; 4]>,
    expect_masked: Option<bool>,
    max_payload_size: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DecodeState {
    ReadingHeader,
    ReadingPayloadLength,
    ReadingExtendedPayloadLength2,
    ReadingExtendedPayloadLength8,
    ReadingMaskKey,
    ReadingPayload,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Decoder that accepts masked and unmasked frames.
    pub fn new() -> Self {
        Self {
            decode_state: DecodeState::ReadingHeader,
            fin: false,
            op_code: OpCode::Continuation,
            payload_length: 0,
            mask_key: None,
            expect_masked: None,
            max_payload_size: usize::MAX,
        }
    }

    /// Decoder for the frames received by `role`: a server only accepts masked frames, a client
    /// only unmasked ones.
    pub fn for_role(role: Role) -> Self {
        Self {
            expect_masked: Some(role == Role::Server),
            ..Self::new()
        }
    }

    /// Frames announcing a larger payload are rejected before any of it is buffered.
    pub fn with_max_payload_size(self, max_payload_size: usize) -> Self {
        Self {
            max_payload_size,
            ..self
        }
    }

    pub fn decode_next(&mut self, buffer: &mut ReadBuffer) -> Result<Option<Frame>, Error> {
        loop {
            let available = buffer.available();
            match self.decode_state {
                DecodeState::ReadingHeader => {
                    if available < 1 {
                        break;
                    }
                    let b = buffer.consume_next(1)[0];
                    if b & protocol::RSV_MASK != 0 {
                        return Err(Error::Protocol("non zero RSV value received"));
                    }
                    self.fin = b & protocol::FIN_MASK != 0;
                    self.op_code = OpCode::from_u8(b & protocol::OP_CODE_MASK)?;
                    if self.op_code.is_control() && !self.fin {
                        return Err(Error::Protocol("fragmented control frame received"));
                    }
                    self.decode_state = DecodeState::ReadingPayloadLength;
                }
                DecodeState::ReadingPayloadLength => {
                    if available < 1 {
                        break;
                    }
                    let b = buffer.consume_next(1)[0];
                    let masked = b & protocol::MASK_MASK != 0;
                    match self.expect_masked {
                        Some(true) if !masked => return Err(Error::Protocol("unmasked client frame received")),
                        Some(false) if masked => return Err(Error::Protocol("masking bit set on the server frame")),
                        _ => {}
                    }
                    self.mask_key = masked.then_some([0u8; 4]);
                    let payload_length = b & protocol::PAYLOAD_LENGTH_MASK;
                    match payload_length {
                        protocol::EXTENDED_PAYLOAD_LENGTH_2 => {
                            self.decode_state = DecodeState::ReadingExtendedPayloadLength2
                        }
                        protocol::EXTENDED_PAYLOAD_LENGTH_8 => {
                            self.decode_state = DecodeState::ReadingExtendedPayloadLength8
                        }
                        len => self.payload_length_decoded(len as u64)?,
                    }
                }
                DecodeState::ReadingExtendedPayloadLength2 => {
                    if available < 2 {
                        break;
                    }
                    let bytes = buffer.consume_next(2);
                    let payload_length = u16::from_be_bytes([bytes[0], bytes[1]]);
                    self.payload_length_decoded(payload_length as u64)?;
                }
                DecodeState::ReadingExtendedPayloadLength8 => {
                    if available < 8 {
                        break;
                    }
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(buffer.consume_next(8));
                    let payload_length = u64::from_be_bytes(bytes);
                    if payload_length >> 63 != 0 {
                        return Err(Error::Protocol("most significant bit of payload length set"));
                    }
                    self.payload_length_decoded(payload_length)?;
                }
                DecodeState::ReadingMaskKey => {
                    if available < 4 {
                        break;
                    }
                    let mut mask_key = [0u8; 4];
                    mask_key.copy_from_slice(buffer.consume_next(4));
                    self.mask_key = Some(mask_key);
                    self.decode_state = DecodeState::ReadingPayload;
                }
                DecodeState::ReadingPayload => {
                    let payload_length = self.payload_length;
                    if available < payload_length {
                        break;
                    }
                    let mut payload = buffer.consume_next(payload_length).to_vec();
                    if let Some(mask_key) = self.mask_key {
                        apply_mask(&mut payload, mask_key);
                    }
                    self.decode_state = DecodeState::ReadingHeader;
                    let frame = Frame {
                        fin: self.fin,
                        rsv: 0,
                        op_code: self.op_code,
                        mask_key: self.mask_key,
                        payload,
                    };
                    debug!("decoded {:?} frame (fin: {}, {} bytes)", frame.op_code, frame.fin, payload_length);
                    return Ok(Some(frame));
                }
            }
        }

        // await for more data
        Ok(None)
    }

    /// Checks if a frame is partially decoded.
    pub fn in_progress(&self) -> bool {
        self.decode_state != DecodeState::ReadingHeader
    }

    fn payload_length_decoded(&mut self, payload_length: u64) -> Result<(), Error> {
        if self.op_code.is_control() && payload_length > protocol::MAX_CONTROL_PAYLOAD_LENGTH as u64 {
            return Err(Error::Protocol("control frame payload too large"));
        }
        let payload_length = usize::try_from(payload_length)
            .ok()
            .filter(|len| *len <= self.max_payload_size)
            .ok_or(Error::MessageTooBig(usize::try_from(payload_length).unwrap_or(usize::MAX)))?;
        self.payload_length = payload_length;
        self.decode_state = match self.mask_key {
            Some(_) => DecodeState::ReadingMaskKey,
            None => DecodeState::ReadingPayload,
        };
        Ok(())
    }
}
