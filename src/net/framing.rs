//! # Length-Prefix Framing
//!
//! Splits a byte stream into messages. Every frame starts with a 4-byte
//! big-endian payload length followed by the payload itself:
//!
//! ```text
//! +----------------+---------------------------+
//! | len: u32 (BE)  | payload (len bytes)       |
//! +----------------+---------------------------+
//! ```
//!
//! [`LengthPrefixFraming`] sits between a [`StreamTransport`] and a
//! [`MessageApplication`]: it alternates the transport's receive policy
//! between the header and the payload, and wraps outgoing messages in a
//! header when the application ends them.
//!
//! [`StreamTransport`]: super::transport::StreamTransport

use super::transport::{ReceivePolicy, StreamApplication, StreamLowerLayer};
use crate::error::{TransportError, TransportResult};
use serde::Serialize;

/// Size of the length header in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<u32>();

/// Largest payload accepted in either direction.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize `payload` with bincode and prepend its length header.
///
/// The header slot is reserved first and patched once the payload size is
/// known, so the frame is built in one buffer.
pub fn encode_frame<T: Serialize + ?Sized>(payload: &T) -> TransportResult<Vec<u8>> {
    let mut frame = vec![0u8; HEADER_SIZE];
    bincode::serialize_into(&mut frame, payload)?;
    let len = frame.len() - HEADER_SIZE;
    write_header(&mut frame[..HEADER_SIZE], len)?;
    Ok(frame)
}

/// Payload length announced by a frame header.
pub fn decode_header(header: &[u8]) -> TransportResult<usize> {
    let bytes: [u8; HEADER_SIZE] =
        header
            .try_into()
            .map_err(|_| TransportError::UnexpectedData {
                expected: HEADER_SIZE,
                actual: header.len(),
            })?;
    Ok(u32::from_be_bytes(bytes) as usize)
}

fn write_header(dst: &mut [u8], len: usize) -> TransportResult<()> {
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    dst.copy_from_slice(&(len as u32).to_be_bytes());
    Ok(())
}

/// Operations a message application may invoke on the framing layer.
pub trait MessageLowerLayer {
    /// Start delivering incoming messages.
    fn request_messages(&mut self);

    /// Start a new outgoing message, discarding any unfinished one.
    fn begin_message(&mut self);

    /// Payload of the outgoing message under construction.
    fn message_buffer(&mut self) -> &mut Vec<u8>;

    /// Seal the outgoing message and queue it on the transport.
    fn end_message(&mut self) -> TransportResult<()>;
}

/// Upper layer of [`LengthPrefixFraming`].
pub trait MessageApplication {
    fn start(&mut self, down: &mut dyn MessageLowerLayer) -> TransportResult<()>;

    /// Process one complete message payload and return the bytes used.
    fn consume(&mut self, down: &mut dyn MessageLowerLayer, message: &[u8]) -> TransportResult<usize>;

    fn done_sending(&mut self) -> TransportResult<()>;

    fn abort(&mut self, reason: &TransportError);
}

/// What the framing layer expects from the next delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Header,
    Payload(usize),
}

struct FramingLowerLayer<'a> {
    down: &'a mut dyn StreamLowerLayer,
    message: &'a mut Vec<u8>,
    reading: &'a mut bool,
}

impl MessageLowerLayer for FramingLowerLayer<'_> {
    fn request_messages(&mut self) {
        if !*self.reading {
            *self.reading = true;
            self.down.configure_read(ReceivePolicy::exactly(HEADER_SIZE));
        }
    }

    fn begin_message(&mut self) {
        self.message.clear();
    }

    fn message_buffer(&mut self) -> &mut Vec<u8> {
        self.message
    }

    fn end_message(&mut self) -> TransportResult<()> {
        let mut header = [0u8; HEADER_SIZE];
        write_header(&mut header, self.message.len())?;
        let output = self.down.output_buffer();
        output.extend_from_slice(&header);
        output.append(self.message);
        Ok(())
    }
}

/// Stream application that turns a byte stream into length-prefixed messages.
pub struct LengthPrefixFraming<A> {
    app: A,
    expect: Expect,
    message: Vec<u8>,
    reading: bool,
}

impl<A: MessageApplication> LengthPrefixFraming<A> {
    pub fn new(app: A) -> Self {
        Self {
            app,
            expect: Expect::Header,
            message: Vec::new(),
            reading: false,
        }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    fn deliver(&mut self, down: &mut dyn StreamLowerLayer, payload: &[u8]) -> TransportResult<()> {
        let mut framing = FramingLowerLayer {
            down,
            message: &mut self.message,
            reading: &mut self.reading,
        };
        let consumed = self.app.consume(&mut framing, payload)?;
        if consumed != payload.len() {
            return Err(TransportError::UnexpectedData {
                expected: payload.len(),
                actual: consumed,
            });
        }
        Ok(())
    }
}

impl<A: MessageApplication> StreamApplication for LengthPrefixFraming<A> {
    fn start(&mut self, down: &mut dyn StreamLowerLayer) -> TransportResult<()> {
        let mut framing = FramingLowerLayer {
            down,
            message: &mut self.message,
            reading: &mut self.reading,
        };
        self.app.start(&mut framing)
    }

    fn consume(&mut self, down: &mut dyn StreamLowerLayer, data: &[u8]) -> TransportResult<usize> {
        match self.expect {
            Expect::Header => {
                let len = decode_header(data)?;
                if len > MAX_FRAME_SIZE {
                    return Err(TransportError::FrameTooLarge {
                        len,
                        max: MAX_FRAME_SIZE,
                    });
                }
                if len == 0 {
                    self.deliver(down, &[])?;
                } else {
                    self.expect = Expect::Payload(len);
                    down.configure_read(ReceivePolicy::exactly(len));
                }
            }
            Expect::Payload(_) => {
                self.deliver(down, data)?;
                self.expect = Expect::Header;
                down.configure_read(ReceivePolicy::exactly(HEADER_SIZE));
            }
        }
        Ok(data.len())
    }

    fn done_sending(&mut self) -> TransportResult<()> {
        self.app.done_sending()
    }

    fn abort(&mut self, reason: &TransportError) {
        self.app.abort(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::PING_TEXT;

    /// Minimal stand-in for the transport below the framing layer.
    #[derive(Default)]
    struct Recorder {
        policy: Option<ReceivePolicy>,
        output: Vec<u8>,
    }

    impl StreamLowerLayer for Recorder {
        fn configure_read(&mut self, policy: ReceivePolicy) {
            self.policy = Some(policy);
        }

        fn output_buffer(&mut self) -> &mut Vec<u8> {
            &mut self.output
        }
    }

    /// Echoes every message back with a `!` appended.
    #[derive(Default)]
    struct Shouter {
        received: Vec<Vec<u8>>,
    }

    impl MessageApplication for Shouter {
        fn start(&mut self, down: &mut dyn MessageLowerLayer) -> TransportResult<()> {
            down.request_messages();
            Ok(())
        }

        fn consume(&mut self, down: &mut dyn MessageLowerLayer, message: &[u8]) -> TransportResult<usize> {
            self.received.push(message.to_vec());
            down.begin_message();
            down.message_buffer().extend_from_slice(message);
            down.message_buffer().push(b'!');
            down.end_message()?;
            Ok(message.len())
        }

        fn done_sending(&mut self) -> TransportResult<()> {
            Ok(())
        }

        fn abort(&mut self, _reason: &TransportError) {}
    }

    #[test]
    fn test_encode_frame_prefixes_payload_length() {
        let frame = encode_frame(PING_TEXT).unwrap();
        let len = decode_header(&frame[..HEADER_SIZE]).unwrap();
        assert_eq!(len, frame.len() - HEADER_SIZE);
        let text: String = bincode::deserialize(&frame[HEADER_SIZE..]).unwrap();
        assert_eq!(text, PING_TEXT);
    }

    #[test]
    fn test_header_is_big_endian() {
        let frame = encode_frame(&0u8).unwrap();
        assert_eq!(&frame[..HEADER_SIZE], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_framing_alternates_header_and_payload() {
        let mut down = Recorder::default();
        let mut framing = LengthPrefixFraming::new(Shouter::default());
        framing.start(&mut down).unwrap();
        assert_eq!(down.policy, Some(ReceivePolicy::Exactly(HEADER_SIZE)));

        framing.consume(&mut down, &3u32.to_be_bytes()).unwrap();
        assert_eq!(down.policy, Some(ReceivePolicy::Exactly(3)));

        framing.consume(&mut down, b"hey").unwrap();
        assert_eq!(down.policy, Some(ReceivePolicy::Exactly(HEADER_SIZE)));
        assert_eq!(framing.app().received, vec![b"hey".to_vec()]);

        let mut expected = 4u32.to_be_bytes().to_vec();
        expected.extend_from_slice(b"hey!");
        assert_eq!(down.output, expected);
    }

    #[test]
    fn test_empty_frame_is_delivered_immediately() {
        let mut down = Recorder::default();
        let mut framing = LengthPrefixFraming::new(Shouter::default());
        framing.start(&mut down).unwrap();
        framing.consume(&mut down, &0u32.to_be_bytes()).unwrap();
        assert_eq!(framing.app().received, vec![Vec::<u8>::new()]);
        assert_eq!(down.policy, Some(ReceivePolicy::Exactly(HEADER_SIZE)));
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        let mut down = Recorder::default();
        let mut framing = LengthPrefixFraming::new(Shouter::default());
        framing.start(&mut down).unwrap();
        let header = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        assert!(matches!(
            framing.consume(&mut down, &header),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
