//! Pong-side applications for the transport and framing variants.
//!
//! Both applications run the same per-round state machine:
//!
//! ```text
//! Done --(driver sets Reading)--> Reading --consume--> Writing --done_sending--> Done
//! ```
//!
//! The state lives in a [`StateCell`] shared with the receiver loop, which
//! arms the application by setting `Reading` and polls the multiplexer until
//! the state returns to `Done`.

use super::framing::{MessageApplication, MessageLowerLayer, HEADER_SIZE};
use super::transport::{ReceivePolicy, StreamApplication, StreamLowerLayer};
use super::AppState;
use crate::error::{TransportError, TransportResult};
use std::cell::Cell;
use std::rc::Rc;
use tracing::error;

/// Round state shared between a pong application and the thread driving it.
pub type StateCell = Rc<Cell<AppState>>;

fn expect_state(state: &StateCell, expected: AppState, operation: &'static str) -> TransportResult<()> {
    let current = state.get();
    if current != expected {
        return Err(TransportError::InvalidState {
            operation,
            state: current,
        });
    }
    Ok(())
}

/// Answers every fixed-size ping with a pre-built pong.
pub struct PongStreamApplication {
    state: StateCell,
    in_len: usize,
    out: Vec<u8>,
}

impl PongStreamApplication {
    /// `in_len` is the exact size of one ping; `out` is written verbatim.
    pub fn new(in_len: usize, out: Vec<u8>) -> Self {
        Self {
            state: Rc::new(Cell::new(AppState::Done)),
            in_len,
            out,
        }
    }

    /// Handle to the round state for the driving loop.
    pub fn state_cell(&self) -> StateCell {
        Rc::clone(&self.state)
    }
}

impl StreamApplication for PongStreamApplication {
    fn start(&mut self, down: &mut dyn StreamLowerLayer) -> TransportResult<()> {
        down.configure_read(ReceivePolicy::exactly(self.in_len));
        Ok(())
    }

    fn consume(&mut self, down: &mut dyn StreamLowerLayer, data: &[u8]) -> TransportResult<usize> {
        if data.len() != self.in_len {
            return Err(TransportError::UnexpectedData {
                expected: self.in_len,
                actual: data.len(),
            });
        }
        expect_state(&self.state, AppState::Reading, "consume")?;
        down.output_buffer().extend_from_slice(&self.out);
        self.state.set(AppState::Writing);
        Ok(data.len())
    }

    fn done_sending(&mut self) -> TransportResult<()> {
        expect_state(&self.state, AppState::Writing, "done_sending")?;
        self.state.set(AppState::Done);
        Ok(())
    }

    fn abort(&mut self, reason: &TransportError) {
        error!("pong stream application aborted: {}", reason);
    }
}

/// Answers every ping message with the payload of a pre-built pong frame.
pub struct PongMessageApplication {
    state: StateCell,
    in_len: usize,
    out: Vec<u8>,
}

impl PongMessageApplication {
    /// `in_frame_len` and `out_frame` include the length header; the
    /// framing layer strips it on input and adds it back on output.
    pub fn new(in_frame_len: usize, out_frame: Vec<u8>) -> Self {
        let out = out_frame.get(HEADER_SIZE..).unwrap_or_default().to_vec();
        Self {
            state: Rc::new(Cell::new(AppState::Done)),
            in_len: in_frame_len.saturating_sub(HEADER_SIZE),
            out,
        }
    }

    pub fn state_cell(&self) -> StateCell {
        Rc::clone(&self.state)
    }
}

impl MessageApplication for PongMessageApplication {
    fn start(&mut self, down: &mut dyn MessageLowerLayer) -> TransportResult<()> {
        down.request_messages();
        Ok(())
    }

    fn consume(&mut self, down: &mut dyn MessageLowerLayer, message: &[u8]) -> TransportResult<usize> {
        if message.len() != self.in_len {
            return Err(TransportError::UnexpectedData {
                expected: self.in_len,
                actual: message.len(),
            });
        }
        expect_state(&self.state, AppState::Reading, "consume")?;
        down.begin_message();
        down.message_buffer().extend_from_slice(&self.out);
        down.end_message()?;
        self.state.set(AppState::Writing);
        Ok(message.len())
    }

    fn done_sending(&mut self) -> TransportResult<()> {
        expect_state(&self.state, AppState::Writing, "done_sending")?;
        self.state.set(AppState::Done);
        Ok(())
    }

    fn abort(&mut self, reason: &TransportError) {
        error!("pong message application aborted: {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::framing::{encode_frame, LengthPrefixFraming};
    use crate::net::{make_stream_socket_pair, StreamTransport, PING_TEXT, PONG_TEXT};
    use std::io::{Read, Write};

    struct Sink(Vec<u8>, Option<ReceivePolicy>);

    impl StreamLowerLayer for Sink {
        fn configure_read(&mut self, policy: ReceivePolicy) {
            self.1 = Some(policy);
        }

        fn output_buffer(&mut self) -> &mut Vec<u8> {
            &mut self.0
        }
    }

    #[test]
    fn test_stream_application_rejects_unarmed_consume() {
        let mut app = PongStreamApplication::new(4, b"pong".to_vec());
        let mut sink = Sink(Vec::new(), None);
        app.start(&mut sink).unwrap();
        assert_eq!(sink.1, Some(ReceivePolicy::Exactly(4)));

        match app.consume(&mut sink, b"ping") {
            Err(TransportError::InvalidState { operation, state }) => {
                assert_eq!(operation, "consume");
                assert_eq!(state, AppState::Done);
            }
            other => panic!("expected invalid state, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_application_round() {
        let mut app = PongStreamApplication::new(4, b"pong".to_vec());
        let state = app.state_cell();
        let mut sink = Sink(Vec::new(), None);

        state.set(AppState::Reading);
        app.consume(&mut sink, b"ping").unwrap();
        assert_eq!(state.get(), AppState::Writing);
        assert_eq!(sink.0, b"pong");

        app.done_sending().unwrap();
        assert_eq!(state.get(), AppState::Done);
        assert!(app.done_sending().is_err());
    }

    #[test]
    fn test_stream_application_rejects_wrong_size() {
        let mut app = PongStreamApplication::new(4, b"pong".to_vec());
        app.state_cell().set(AppState::Reading);
        let mut sink = Sink(Vec::new(), None);
        assert!(matches!(
            app.consume(&mut sink, b"pin"),
            Err(TransportError::UnexpectedData {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_message_application_echoes_pong_frame_over_socket() {
        let ping = encode_frame(PING_TEXT).unwrap();
        let pong = encode_frame(PONG_TEXT).unwrap();
        let (mut peer, socket) = make_stream_socket_pair().unwrap();

        let app = PongMessageApplication::new(ping.len(), pong.clone());
        let state = app.state_cell();
        let mut transport = StreamTransport::new(socket, LengthPrefixFraming::new(app)).unwrap();
        transport.start().unwrap();

        state.set(AppState::Reading);
        peer.write_all(&ping).unwrap();
        // Blocking peer write is complete, so one read pass sees the whole frame.
        transport.handle_read_event().unwrap();
        assert_eq!(state.get(), AppState::Done);

        let mut reply = vec![0u8; pong.len()];
        peer.read_exact(&mut reply).unwrap();
        assert_eq!(reply, pong);
    }
}
