//! # Stream Transport
//!
//! Readiness-driven transport over a nonblocking Unix stream socket. The
//! transport owns the socket plus a read buffer sized by the current
//! [`ReceivePolicy`] and an output buffer. Applications sit on top of it and
//! see only the [`StreamLowerLayer`] interface.
//!
//! Read path: fill the read buffer until the policy is satisfied, hand the
//! bytes to [`StreamApplication::consume`], repeat until the socket would
//! block. Write path: flush the output buffer; once it drains, tell the
//! application through [`StreamApplication::done_sending`].

use super::multiplexer::SocketHandler;
use crate::error::{TransportError, TransportResult};
use mio::{Interest, Registry, Token};
use std::io::{self, Read, Write};

/// How many bytes the transport collects before calling `consume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceivePolicy {
    /// Deliver exactly this many bytes per `consume` call. Zero pauses reading.
    Exactly(usize),
}

impl ReceivePolicy {
    pub fn exactly(len: usize) -> Self {
        ReceivePolicy::Exactly(len)
    }

    /// Bytes required before the next delivery.
    pub fn len(&self) -> usize {
        match *self {
            ReceivePolicy::Exactly(len) => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Operations a stream application may invoke on the transport below it.
pub trait StreamLowerLayer {
    /// Change the receive policy; takes effect for the next delivery.
    fn configure_read(&mut self, policy: ReceivePolicy);

    /// Buffer of bytes queued for sending. Appended bytes go out on the next flush.
    fn output_buffer(&mut self) -> &mut Vec<u8>;
}

/// Upper layer of a [`StreamTransport`].
pub trait StreamApplication {
    /// Called once when the transport is added to a multiplexer.
    fn start(&mut self, down: &mut dyn StreamLowerLayer) -> TransportResult<()>;

    /// Process one delivery and return how many bytes were used. Anything
    /// other than `data.len()` is treated as a protocol error.
    fn consume(&mut self, down: &mut dyn StreamLowerLayer, data: &[u8]) -> TransportResult<usize>;

    /// Called after the output buffer has been flushed completely.
    fn done_sending(&mut self) -> TransportResult<()>;

    /// Called once with the error that stops the transport.
    fn abort(&mut self, reason: &TransportError);
}

/// [`StreamLowerLayer`] view over the transport's policy and output buffer.
pub(crate) struct TransportLowerLayer<'a> {
    pub(crate) policy: &'a mut ReceivePolicy,
    pub(crate) output: &'a mut Vec<u8>,
}

impl StreamLowerLayer for TransportLowerLayer<'_> {
    fn configure_read(&mut self, policy: ReceivePolicy) {
        *self.policy = policy;
    }

    fn output_buffer(&mut self) -> &mut Vec<u8> {
        self.output
    }
}

/// Transport that drives a [`StreamApplication`] over a nonblocking socket.
pub struct StreamTransport<A> {
    socket: mio::net::UnixStream,
    app: A,
    policy: ReceivePolicy,
    read_buf: Vec<u8>,
    received: usize,
    write_buf: Vec<u8>,
    written: usize,
}

impl<A: StreamApplication> StreamTransport<A> {
    /// Wrap `socket`, switching it to nonblocking mode.
    pub fn new(socket: std::os::unix::net::UnixStream, app: A) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: mio::net::UnixStream::from_std(socket),
            app,
            policy: ReceivePolicy::exactly(0),
            read_buf: Vec::new(),
            received: 0,
            write_buf: Vec::new(),
            written: 0,
        })
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Current receive policy.
    pub fn policy(&self) -> ReceivePolicy {
        self.policy
    }

    /// Let the application configure the transport.
    pub fn start(&mut self) -> TransportResult<()> {
        let mut down = TransportLowerLayer {
            policy: &mut self.policy,
            output: &mut self.write_buf,
        };
        self.app.start(&mut down)
    }

    /// Read until the socket would block, delivering every completed chunk.
    pub fn handle_read_event(&mut self) -> TransportResult<()> {
        loop {
            let need = self.policy.len();
            if need == 0 {
                break;
            }
            if self.read_buf.len() < need {
                self.read_buf.resize(need, 0);
            }
            match self.socket.read(&mut self.read_buf[self.received..need]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => {
                    self.received += n;
                    if self.received == need {
                        self.received = 0;
                        let mut down = TransportLowerLayer {
                            policy: &mut self.policy,
                            output: &mut self.write_buf,
                        };
                        let consumed = self.app.consume(&mut down, &self.read_buf[..need])?;
                        if consumed != need {
                            return Err(TransportError::UnexpectedData {
                                expected: need,
                                actual: consumed,
                            });
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.flush()
    }

    /// Continue flushing pending output.
    pub fn handle_write_event(&mut self) -> TransportResult<()> {
        self.flush()
    }

    fn flush(&mut self) -> TransportResult<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        while self.written < self.write_buf.len() {
            match self.socket.write(&self.write_buf[self.written..]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => self.written += n,
                // Resumed by the next writable event.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.write_buf.clear();
        self.written = 0;
        self.app.done_sending()
    }

    fn dispatch(&mut self, readable: bool, writable: bool) -> TransportResult<()> {
        if readable {
            self.handle_read_event()?;
        }
        if writable {
            self.handle_write_event()?;
        }
        Ok(())
    }
}

impl<A: StreamApplication> SocketHandler for StreamTransport<A> {
    fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(
            &mut self.socket,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.socket)
    }

    fn start(&mut self) -> TransportResult<()> {
        StreamTransport::start(self)
    }

    fn handle_event(&mut self, readable: bool, writable: bool) -> TransportResult<()> {
        let result = self.dispatch(readable, writable);
        if let Err(ref reason) = result {
            self.app.abort(reason);
        }
        result
    }
}
