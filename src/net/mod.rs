//! # Ping/Pong Transports
//!
//! Everything the fixtures need to move the ping and pong texts across a
//! connected Unix stream socket pair:
//!
//! - `raw`: single-call `send`/`recv` and `std::io` read/write baselines
//! - `framing`: 32-bit length-prefix frames and the framing layer
//! - `transport`: the readiness-driven stream transport and its layer traits
//! - `multiplexer`: a thin `mio::Poll` wrapper with a `poll_once` step
//! - `pong`: the pong-side applications plugged into the transport stack

use serde::{Deserialize, Serialize};
use std::io;
use std::os::unix::net::UnixStream;

pub mod framing;
pub mod multiplexer;
pub mod pong;
pub mod raw;
pub mod transport;

pub use framing::{encode_frame, LengthPrefixFraming, MessageApplication, MessageLowerLayer};
pub use multiplexer::{Multiplexer, SocketHandler};
pub use pong::{PongMessageApplication, PongStreamApplication};
pub use transport::{ReceivePolicy, StreamApplication, StreamLowerLayer, StreamTransport};

/// Text sent by the ping side in every round.
pub const PING_TEXT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

/// Text echoed by the pong side in every round.
pub const PONG_TEXT: &str = "In sapien diam, porttitor sed pretium quis, varius at orci.";

/// Per-round state of a pong application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    /// Waiting for the ping.
    Reading,
    /// Pong queued, waiting for the transport to flush it.
    Writing,
    /// Round finished (also the initial state).
    Done,
}

/// Create a connected pair of blocking stream sockets.
pub fn make_stream_socket_pair() -> io::Result<(UnixStream, UnixStream)> {
    UnixStream::pair()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_socket_pair_is_connected() {
        let (mut ping, mut pong) = make_stream_socket_pair().unwrap();
        ping.write_all(PING_TEXT.as_bytes()).unwrap();
        let mut buf = vec![0u8; PING_TEXT.len()];
        pong.read_exact(&mut buf).unwrap();
        assert_eq!(buf, PING_TEXT.as_bytes());
    }

    #[test]
    fn test_texts_differ_in_length() {
        // The sender sizes its input buffer from the pong frame, so a mix-up
        // between the two texts shows up as a length mismatch.
        assert_ne!(PING_TEXT.len(), PONG_TEXT.len());
    }
}
