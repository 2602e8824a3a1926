use std::io;
use std::io::Write;

use crate::ws::config::Config;
use crate::ws::frame::{Frame, apply_mask};
use crate::ws::{protocol, util};

/// Appends the wire representation of `frame` to `dst`. The length field always uses the
/// smallest encoding that fits the payload.
pub fn encode_into(frame: &Frame, dst: &mut Vec<u8>) {
    dst.reserve(protocol::MAX_HEADER_LENGTH + frame.payload.len());

    let mut header = 0u8;
    if frame.fin {
        header |= protocol::FIN_MASK;
    }
    header |= (frame.rsv << 4) & protocol::RSV_MASK;
    header |= frame.op_code.as_u8();
    dst.push(header);

    let mask_bit = match frame.mask_key {
        Some(_) => protocol::MASK_MASK,
        None => 0,
    };
    let len = frame.payload.len();
    if len <= protocol::MAX_INLINE_PAYLOAD_LENGTH {
        dst.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        dst.push(mask_bit | protocol::EXTENDED_PAYLOAD_LENGTH_2);
        dst.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        dst.push(mask_bit | protocol::EXTENDED_PAYLOAD_LENGTH_8);
        dst.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let payload_start = match frame.mask_key {
        Some(mask_key) => {
            dst.extend_from_slice(&mask_key);
            dst.len()
        }
        None => dst.len(),
    };
    dst.extend_from_slice(&frame.payload);
    if let Some(mask_key) = frame.mask_key {
        apply_mask(&mut dst[payload_start..], mask_key);
    }
}

pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut dst = Vec::new();
    encode_into(frame, &mut dst);
    dst
}

/// Writes the whole frame and flushes the stream, giving up once the stream stalls for longer
/// than the configured write timeout.
pub(crate) fn send<S: Write>(stream: &mut S, frame: &Frame, config: &Config) -> io::Result<()> {
    util::write_all(stream, &encode(frame), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::frame::OpCode;

    #[test]
    fn should_encode_unmasked_text_frame() {
        // RFC 6455 section 5.7
        assert_eq!(vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f], encode(&Frame::text("Hello")));
    }

    #[test]
    fn should_encode_masked_text_frame() {
        let frame = Frame::text("Hello").with_mask([0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(
            vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58],
            encode(&frame)
        );
        // the frame itself keeps the plain payload
        assert_eq!(b"Hello", &frame.payload[..]);
    }

    #[test]
    fn should_encode_fragment_without_fin() {
        let bytes = encode(&Frame::new(false, OpCode::Text, "Hel"));
        assert_eq!(&[0x01, 0x03][..], &bytes[..2]);
        let bytes = encode(&Frame::new(true, OpCode::Continuation, "lo"));
        assert_eq!(&[0x80, 0x02][..], &bytes[..2]);
    }

    #[test]
    fn should_pick_minimal_length_encoding() {
        let bytes = encode(&Frame::binary(vec![0u8; 125]));
        assert_eq!(125, bytes[1]);
        assert_eq!(2 + 125, bytes.len());

        let bytes = encode(&Frame::binary(vec![0u8; 126]));
        assert_eq!(126, bytes[1]);
        assert_eq!(&[0x00, 0x7e][..], &bytes[2..4]);
        assert_eq!(4 + 126, bytes.len());

        let bytes = encode(&Frame::binary(vec![0u8; 65535]));
        assert_eq!(126, bytes[1]);
        assert_eq!(&[0xff, 0xff][..], &bytes[2..4]);

        let bytes = encode(&Frame::binary(vec![0u8; 65536]));
        assert_eq!(127, bytes[1]);
        assert_eq!(&65536u64.to_be_bytes()[..], &bytes[2..10]);
        assert_eq!(10 + 65536, bytes.len());
    }

    #[test]
    fn should_write_frame_to_stream() {
        let mut out = Vec::new();
        send(&mut out, &Frame::ping("hi"), &Config::default()).unwrap();
        assert_eq!(vec![0x89, 0x02, b'h', b'i'], out);
    }
}
