//! Turns frames into messages and messages into frames.

use crate::ws::Error;
use crate::ws::frame::{Frame, OpCode};
use crate::ws::message::{Message, MessageRole, MessageType};

/// How fragmented data messages are delivered.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum FragmentsPolicy {
    /// Buffer fragments and deliver one complete message.
    #[default]
    Aggregate,
    /// Deliver every fragment as it arrives, tagged with its [`MessageRole`].
    Notify,
}

#[derive(Debug)]
struct Pending {
    kind: MessageType,
    data: Vec<u8>,
}

/// Keeps at most one data message in progress. Control frames pass straight through and never
/// touch the partial message.
#[derive(Debug)]
pub struct Assembler {
    policy: FragmentsPolicy,
    max_message_size: usize,
    pending: Option<Pending>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(FragmentsPolicy::Aggregate, usize::MAX)
    }
}

impl Assembler {
    pub fn new(policy: FragmentsPolicy, max_message_size: usize) -> Assembler {
        Self {
            policy,
            max_message_size,
            pending: None,
        }
    }

    /// Checks if a fragmented message has started but not finished yet.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds the next received frame. Returns the message it completes (or, for control frames
    /// and notified fragments, the message it is) or `None` while a message is being buffered.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>, Error> {
        match frame.op_code {
            OpCode::Close | OpCode::Ping | OpCode::Pong => {
                Ok(Some(Message::complete(frame.op_code.into(), frame.payload)))
            }
            OpCode::Text | OpCode::Binary => {
                if self.pending.is_some() {
                    return Err(Error::Protocol("expected continuation frame"));
                }
                let kind = MessageType::from(frame.op_code);
                self.check_size(0, frame.payload.len())?;
                if frame.fin {
                    return complete(kind, frame.payload).map(Some);
                }
                match self.policy {
                    FragmentsPolicy::Aggregate => {
                        self.pending = Some(Pending {
                            kind,
                            data: frame.payload,
                        });
                        Ok(None)
                    }
                    FragmentsPolicy::Notify => {
                        self.pending = Some(Pending { kind, data: Vec::new() });
                        Ok(Some(Message::new(kind, MessageRole::First, frame.payload)))
                    }
                }
            }
            OpCode::Continuation => {
                let buffered = match &self.pending {
                    Some(pending) => pending.data.len(),
                    None => return Err(Error::Protocol("unexpected continuation frame")),
                };
                self.check_size(buffered, frame.payload.len())?;
                match self.policy {
                    FragmentsPolicy::Aggregate => {
                        if let Some(pending) = self.pending.as_mut() {
                            pending.data.extend_from_slice(&frame.payload);
                        }
                        if !frame.fin {
                            return Ok(None);
                        }
                        match self.pending.take() {
                            Some(pending) => complete(pending.kind, pending.data).map(Some),
                            None => Ok(None),
                        }
                    }
                    FragmentsPolicy::Notify => {
                        let kind = self.pending.as_ref().map(|pending| pending.kind).unwrap_or_default();
                        let role = match frame.fin {
                            true => {
                                self.pending = None;
                                MessageRole::Last
                            }
                            false => MessageRole::Continuation,
                        };
                        Ok(Some(Message::new(kind, role, frame.payload)))
                    }
                }
            }
        }
    }

    /// Splits a data message into frames of at most `max_frame_size` payload bytes. The first
    /// frame carries the message type, the rest are continuations and only the last has `fin`.
    pub fn fragment(kind: MessageType, data: &[u8], max_frame_size: Option<usize>) -> Vec<Frame> {
        let op_code = match kind {
            MessageType::Binary => OpCode::Binary,
            _ => OpCode::Text,
        };
        let max_frame_size = match max_frame_size {
            Some(max) if max > 0 && data.len() > max => max,
            _ => return vec![Frame::new(true, op_code, data)],
        };
        let chunk_count = data.len().div_ceil(max_frame_size);
        data.chunks(max_frame_size)
            .enumerate()
            .map(|(i, chunk)| {
                let op_code = if i == 0 { op_code } else { OpCode::Continuation };
                Frame::new(i + 1 == chunk_count, op_code, chunk)
            })
            .collect()
    }

    fn check_size(&self, buffered: usize, incoming: usize) -> Result<(), Error> {
        let total = buffered.saturating_add(incoming);
        if total > self.max_message_size {
            return Err(Error::MessageTooBig(total));
        }
        Ok(())
    }
}

fn complete(kind: MessageType, data: Vec<u8>) -> Result<Message, Error> {
    if kind == MessageType::Text && std::str::from_utf8(&data).is_err() {
        return Err(Error::InvalidPayload("text message is not valid utf-8"));
    }
    Ok(Message::complete(kind, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(op_code: OpCode, fin: bool, payload: &str) -> Frame {
        Frame::new(fin, op_code, payload)
    }

    #[test]
    fn should_pass_single_frame_message() {
        let mut assembler = Assembler::default();
        let message = assembler.push(Frame::binary(vec![1, 2, 3])).unwrap().unwrap();
        assert_eq!(MessageType::Binary, message.kind());
        assert!(message.is_complete());
        assert_eq!(&[1, 2, 3], message.data());
        assert!(!assembler.in_progress());
    }

    #[test]
    fn should_aggregate_fragments() {
        let mut assembler = Assembler::default();
        assert_eq!(None, assembler.push(fragment(OpCode::Text, false, "Hel")).unwrap());
        assert!(assembler.in_progress());
        assert_eq!(None, assembler.push(fragment(OpCode::Continuation, false, "lo, ")).unwrap());
        let message = assembler
            .push(fragment(OpCode::Continuation, true, "world"))
            .unwrap()
            .unwrap();
        assert_eq!(MessageType::Text, message.kind());
        assert_eq!(Some("Hello, world"), message.as_text());
        assert!(message.is_complete());
        assert!(!assembler.in_progress());
    }

    #[test]
    fn should_surface_control_frames_mid_message() {
        let mut assembler = Assembler::default();
        assert_eq!(None, assembler.push(fragment(OpCode::Binary, false, "ab")).unwrap());

        let ping = assembler.push(Frame::ping("are you there")).unwrap().unwrap();
        assert!(ping.is_ping());
        assert_eq!(b"are you there", ping.data());
        assert!(assembler.in_progress());

        let message = assembler
            .push(fragment(OpCode::Continuation, true, "cd"))
            .unwrap()
            .unwrap();
        assert!(message.is_binary());
        assert_eq!(b"abcd", message.data());
    }

    #[test]
    fn should_reject_unexpected_continuation() {
        let mut assembler = Assembler::default();
        let result = assembler.push(fragment(OpCode::Continuation, true, "x"));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn should_reject_new_message_while_fragmented_one_is_pending() {
        let mut assembler = Assembler::default();
        assembler.push(fragment(OpCode::Text, false, "a")).unwrap();
        let result = assembler.push(Frame::text("b"));
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn should_reject_invalid_utf8_text() {
        let mut assembler = Assembler::default();
        assembler.push(Frame::new(false, OpCode::Text, vec![0xe2, 0x82])).unwrap();
        let result = assembler.push(Frame::new(true, OpCode::Continuation, vec![0x28]));
        assert!(matches!(result, Err(Error::InvalidPayload(_))));

        // split code point across fragments is fine
        let mut assembler = Assembler::default();
        assembler.push(Frame::new(false, OpCode::Text, vec![0xe2, 0x82])).unwrap();
        let message = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![0xac]))
            .unwrap()
            .unwrap();
        assert_eq!(Some("€"), message.as_text());
    }

    #[test]
    fn should_enforce_max_message_size() {
        let mut assembler = Assembler::new(FragmentsPolicy::Aggregate, 5);
        assembler.push(fragment(OpCode::Text, false, "abc")).unwrap();
        let result = assembler.push(fragment(OpCode::Continuation, true, "def"));
        assert!(matches!(result, Err(Error::MessageTooBig(6))));
    }

    #[test]
    fn should_notify_each_fragment() {
        let mut assembler = Assembler::new(FragmentsPolicy::Notify, usize::MAX);
        let first = assembler.push(fragment(OpCode::Text, false, "a")).unwrap().unwrap();
        assert!(first.is_first());
        assert!(first.is_text());
        let pong = assembler.push(Frame::pong("")).unwrap().unwrap();
        assert!(pong.is_pong());
        let middle = assembler
            .push(fragment(OpCode::Continuation, false, "b"))
            .unwrap()
            .unwrap();
        assert!(middle.is_continuation());
        assert!(middle.is_text());
        let last = assembler
            .push(fragment(OpCode::Continuation, true, "c"))
            .unwrap()
            .unwrap();
        assert!(last.is_last());
        assert_eq!(b"c", last.data());
        assert!(!assembler.in_progress());
        assert!(assembler.push(fragment(OpCode::Continuation, true, "d")).is_err());
    }

    #[test]
    fn should_fragment_outgoing_message() {
        let frames = Assembler::fragment(MessageType::Text, b"abcdefg", Some(3));
        assert_eq!(
            vec![
                Frame::new(false, OpCode::Text, "abc"),
                Frame::new(false, OpCode::Continuation, "def"),
                Frame::new(true, OpCode::Continuation, "g"),
            ],
            frames
        );

        let frames = Assembler::fragment(MessageType::Binary, b"abc", Some(3));
        assert_eq!(vec![Frame::binary("abc")], frames);

        let frames = Assembler::fragment(MessageType::Binary, b"", None);
        assert_eq!(vec![Frame::binary("")], frames);
    }

    #[test]
    fn should_reassemble_what_was_fragmented() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut assembler = Assembler::default();
        let mut messages = Vec::new();
        for frame in Assembler::fragment(MessageType::Binary, &data, Some(64)) {
            messages.extend(assembler.push(frame).unwrap());
        }
        assert_eq!(1, messages.len());
        assert_eq!(&data[..], messages[0].data());
    }
}
