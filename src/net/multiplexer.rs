//! Single-threaded readiness loop around `mio::Poll`.
//!
//! The pong side of the stream and framing variants runs one multiplexer on
//! its own thread and steps it with [`Multiplexer::poll_once`] until the pong
//! application reports the round as done.

use crate::error::{TransportError, TransportResult};
use mio::{Events, Poll, Registry, Token};
use std::io;
use std::time::Duration;
use tracing::{debug, trace};

/// Default capacity of the readiness event buffer.
const EVENT_CAPACITY: usize = 64;

/// A socket-owning component that reacts to readiness events.
pub trait SocketHandler {
    /// Register the handler's socket under `token`.
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()>;

    fn deregister(&mut self, registry: &Registry) -> io::Result<()>;

    /// Called once right after registration.
    fn start(&mut self) -> TransportResult<()>;

    /// React to readiness. An error removes the handler from the multiplexer.
    fn handle_event(&mut self, readable: bool, writable: bool) -> TransportResult<()>;
}

/// Owns a `mio::Poll` and the handlers registered with it.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    handlers: Vec<Option<Box<dyn SocketHandler>>>,
}

impl Multiplexer {
    pub fn new() -> TransportResult<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            handlers: Vec::new(),
        })
    }

    /// Register and start `handler`, returning the token it was assigned.
    pub fn add(&mut self, mut handler: Box<dyn SocketHandler>) -> TransportResult<Token> {
        let token = Token(self.handlers.len());
        handler.register(self.poll.registry(), token)?;
        if let Err(e) = handler.start() {
            let _ = handler.deregister(self.poll.registry());
            return Err(e);
        }
        debug!(?token, "socket handler started");
        self.handlers.push(Some(handler));
        Ok(token)
    }

    /// Number of handlers still registered.
    pub fn active_handlers(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    /// Wait for readiness once and dispatch every event.
    ///
    /// Blocks until at least one event arrives when `blocking` is set,
    /// otherwise only collects events that are already pending. Returns
    /// whether any event was dispatched. The first handler error is returned
    /// after that handler has been removed.
    pub fn poll_once(&mut self, blocking: bool) -> TransportResult<bool> {
        let timeout = if blocking { None } else { Some(Duration::ZERO) };
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let mut dispatched = false;
        let mut failure: Option<TransportError> = None;
        for event in self.events.iter() {
            let Token(index) = event.token();
            let Some(slot) = self.handlers.get_mut(index) else {
                continue;
            };
            let Some(handler) = slot.as_mut() else {
                continue;
            };
            dispatched = true;
            let readable = event.is_readable() || event.is_read_closed() || event.is_error();
            trace!(index, readable, writable = event.is_writable(), "readiness event");
            if let Err(e) = handler.handle_event(readable, event.is_writable()) {
                debug!(index, error = %e, "removing failed socket handler");
                let _ = handler.deregister(self.poll.registry());
                *slot = None;
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(dispatched),
        }
    }
}
