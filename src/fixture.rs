//! # Socket Ping/Pong Fixture
//!
//! Sets up a connected socket pair plus two long-lived worker threads and
//! keeps them in lockstep with the benchmark driver through two rendezvous
//! barriers of three participants each:
//!
//! ```text
//!  driver            ping-sender             pong-receiver
//!    |  start  ----------|-----------------------|
//!    |                write ping  ---------->  read ping
//!    |                read pong   <----------  write pong
//!    |  stop   ----------|-----------------------|
//! ```
//!
//! One call to [`SocketFixture::run_iteration`] is exactly one ping/pong
//! exchange, so timing that call measures a full round trip plus the two
//! barrier hand-offs.
//!
//! ## Failure handling
//!
//! A failed exchange is recorded in a shared slot and the failing side shuts
//! its socket down, which makes the peer's pending read fail as well. Both
//! workers keep attending the barriers, so the driver always completes the
//! round and sees the error instead of hanging.

use crate::barrier::Barrier;
use crate::cli::Variant;
use crate::net::{
    encode_frame, make_stream_socket_pair, raw, AppState, LengthPrefixFraming, Multiplexer,
    PongMessageApplication, PongStreamApplication, StreamTransport, PING_TEXT, PONG_TEXT,
};
use crate::utils::spawn_pinned;
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use socket2::SockRef;
use std::io;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Driver, sender and receiver.
pub const PARTICIPANTS: usize = 3;

/// Thread-level knobs for a fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureOptions {
    /// CPU core for the ping-sender thread.
    pub sender_affinity: Option<usize>,
    /// CPU core for the pong-receiver thread.
    pub receiver_affinity: Option<usize>,
    /// `SO_SNDBUF`/`SO_RCVBUF` for both sockets.
    pub socket_buffer_size: Option<usize>,
}

/// State shared by the driver and both workers.
struct Shared {
    fin: AtomicBool,
    failed: AtomicBool,
    failure: Mutex<Option<anyhow::Error>>,
    start: Barrier,
    stop: Barrier,
}

impl Shared {
    fn new() -> Result<Self> {
        Ok(Self {
            fin: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            start: Barrier::new(PARTICIPANTS)?,
            stop: Barrier::new(PARTICIPANTS)?,
        })
    }

    fn record_failure(&self, role: &str, err: anyhow::Error) {
        error!("{} failed: {:#}", role, err);
        self.failed.store(true, Ordering::Release);
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err.context(format!("{} failed", role)));
        }
    }

    /// Worker body: one exchange per round until `fin` is observed.
    fn run_loop<F>(&self, role: &'static str, socket: &UnixStream, mut exchange: F)
    where
        F: FnMut() -> Result<()>,
    {
        let mut rounds: u64 = 0;
        loop {
            self.start.arrive_and_wait();
            if self.fin.load(Ordering::Acquire) {
                debug!(role, rounds, "worker finished");
                return;
            }
            if !self.failed.load(Ordering::Acquire) {
                if let Err(e) = exchange() {
                    self.record_failure(role, e);
                    let _ = socket.shutdown(Shutdown::Both);
                }
            }
            rounds += 1;
            self.stop.arrive_and_wait();
        }
    }
}

/// A ping/pong socket pair with its sender and receiver threads.
pub struct SocketFixture {
    variant: Variant,
    shared: Arc<Shared>,
    sender: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    ping_len: usize,
    pong_len: usize,
}

impl SocketFixture {
    /// Create the socket pair, prepare the frames and start both workers.
    pub fn set_up(variant: Variant, options: &FixtureOptions) -> Result<Self> {
        if variant == Variant::All {
            return Err(anyhow!("'all' must be expanded before creating a fixture"));
        }

        // Each side reads exactly one frame of the other side.
        let ping_out = encode_frame(PING_TEXT)?;
        let pong_out = encode_frame(PONG_TEXT)?;
        let pong_in_len = ping_out.len();
        Self::start_workers(variant, options, ping_out, pong_out, pong_in_len)
    }

    /// Spawn both workers around a fresh socket pair.
    ///
    /// `pong_in_len` is the number of bytes the receiver reads per round.
    /// Neither worker touches the barriers until both have been spawned.
    fn start_workers(
        variant: Variant,
        options: &FixtureOptions,
        ping_out: Vec<u8>,
        pong_out: Vec<u8>,
        pong_in_len: usize,
    ) -> Result<Self> {
        let (ping_sock, pong_sock) =
            make_stream_socket_pair().context("failed to create socket pair")?;
        if let Some(size) = options.socket_buffer_size {
            for sock in [&ping_sock, &pong_sock] {
                let sock = SockRef::from(sock);
                sock.set_send_buffer_size(size)
                    .context("failed to set send buffer size")?;
                sock.set_recv_buffer_size(size)
                    .context("failed to set receive buffer size")?;
            }
        }
        let ping_shutdown = ping_sock.try_clone()?;
        let pong_shutdown = pong_sock.try_clone()?;

        let ping_in = vec![0u8; pong_out.len()];
        let (ping_len, pong_len) = (ping_out.len(), pong_out.len());
        let shared = Arc::new(Shared::new()?);
        let (sender_go, sender_gate) = mpsc::channel();
        let (receiver_go, receiver_gate) = mpsc::channel();

        let sender = {
            let shared = Arc::clone(&shared);
            spawn_gated("ping-sender", options.sender_affinity, sender_gate, move || {
                sender_main(variant, &shared, ping_sock, &ping_shutdown, ping_out, ping_in)
            })
            .context("failed to spawn ping-sender thread")?
        };

        let receiver = {
            let shared = Arc::clone(&shared);
            spawn_gated("pong-receiver", options.receiver_affinity, receiver_gate, move || {
                receiver_main(variant, &shared, pong_sock, &pong_shutdown, pong_in_len, pong_out)
            })
        };
        let receiver = match receiver {
            Ok(handle) => handle,
            Err(e) => {
                drop(sender_go);
                if sender.join().is_err() {
                    error!("ping-sender panicked before start");
                }
                return Err(e).context("failed to spawn pong-receiver thread");
            }
        };

        for (role, go) in [("ping-sender", sender_go), ("pong-receiver", receiver_go)] {
            go.send(())
                .map_err(|_| anyhow!("{} exited before the fixture started", role))?;
        }

        info!("{} fixture ready ({} + {} bytes per round trip)", variant, ping_len, pong_len);
        Ok(Self {
            variant,
            shared,
            sender: Some(sender),
            receiver: Some(receiver),
            ping_len,
            pong_len,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Bytes on the wire for one ping plus one pong.
    pub fn round_trip_bytes(&self) -> usize {
        self.ping_len + self.pong_len
    }

    /// Run exactly one ping/pong exchange.
    ///
    /// The driver is the third participant of both barriers, so a fixture
    /// has exactly one driver at a time:
    ///
    /// ```compile_fail
    /// use pingpong_bench::{FixtureOptions, SocketFixture, Variant};
    /// use std::sync::Arc;
    ///
    /// let fixture = Arc::new(SocketFixture::set_up(Variant::Raw, &FixtureOptions::default()).unwrap());
    /// let other = Arc::clone(&fixture);
    /// let handle = std::thread::spawn(move || other.run_iteration());
    /// fixture.run_iteration().unwrap();
    /// handle.join().unwrap().unwrap();
    /// ```
    pub fn run_iteration(&mut self) -> Result<()> {
        if self.sender.is_none() {
            return Err(anyhow!("fixture has been torn down"));
        }
        self.shared.start.arrive_and_wait();
        self.shared.stop.arrive_and_wait();
        if self.shared.failed.load(Ordering::Acquire) {
            return Err(self
                .shared
                .failure
                .lock()
                .take()
                .unwrap_or_else(|| anyhow!("{} fixture failed in an earlier iteration", self.variant)));
        }
        Ok(())
    }

    /// Stop both workers and close the sockets.
    pub fn tear_down(&mut self) -> Result<()> {
        if self.sender.is_none() && self.receiver.is_none() {
            return Ok(());
        }
        self.shared.fin.store(true, Ordering::Release);
        self.shared.start.arrive_and_wait();
        for (role, handle) in [
            ("ping-sender", self.sender.take()),
            ("pong-receiver", self.receiver.take()),
        ] {
            if let Some(handle) = handle {
                handle
                    .join()
                    .map_err(|_| anyhow!("{} thread panicked", role))?;
            }
        }
        debug!("{} fixture torn down", self.variant);
        Ok(())
    }
}

/// Spawn a worker that runs `body` once its gate receives the go signal.
///
/// If the sending half is dropped instead, the worker returns without ever
/// reaching the barriers.
fn spawn_gated<F>(
    name: &'static str,
    core: Option<usize>,
    gate: Receiver<()>,
    body: F,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    spawn_pinned(name, core, move || {
        if gate.recv().is_err() {
            debug!("{} cancelled before start", name);
            return;
        }
        body()
    })
}

impl Drop for SocketFixture {
    fn drop(&mut self) {
        if let Err(e) = self.tear_down() {
            error!("failed to tear down {} fixture: {:#}", self.variant, e);
        }
    }
}

fn sender_main(
    variant: Variant,
    shared: &Shared,
    mut sock: UnixStream,
    shutdown: &UnixStream,
    ping_out: Vec<u8>,
    mut ping_in: Vec<u8>,
) {
    if variant == Variant::Posix {
        shared.run_loop("ping-sender", shutdown, || {
            raw::posix_write(&sock, &ping_out).context("failed to write ping")?;
            raw::posix_read(&sock, &mut ping_in).context("failed to read pong")?;
            Ok(())
        });
    } else {
        shared.run_loop("ping-sender", shutdown, || {
            raw::stream_write(&mut sock, &ping_out).context("failed to write ping")?;
            raw::stream_read(&mut sock, &mut ping_in).context("failed to read pong")?;
            Ok(())
        });
    }
}

fn receiver_main(
    variant: Variant,
    shared: &Shared,
    mut sock: UnixStream,
    shutdown: &UnixStream,
    pong_in_len: usize,
    pong_out: Vec<u8>,
) {
    let mut pong_in = vec![0u8; pong_in_len];
    match variant {
        Variant::Posix => shared.run_loop("pong-receiver", shutdown, || {
            raw::posix_read(&sock, &mut pong_in).context("failed to read ping")?;
            raw::posix_write(&sock, &pong_out).context("failed to write pong")?;
            Ok(())
        }),
        Variant::Raw => shared.run_loop("pong-receiver", shutdown, || {
            raw::stream_read(&mut sock, &mut pong_in).context("failed to read ping")?;
            raw::stream_write(&mut sock, &pong_out).context("failed to write pong")?;
            Ok(())
        }),
        Variant::Stream | Variant::Lpf => {
            let driver = build_pong_driver(variant, sock, pong_in_len, pong_out);
            match driver {
                Ok((mut mpx, state)) => shared.run_loop("pong-receiver", shutdown, || {
                    state.set(AppState::Reading);
                    while state.get() != AppState::Done {
                        mpx.poll_once(true).context("multiplexer failed")?;
                    }
                    Ok(())
                }),
                Err(e) => {
                    // Keep attending the barriers so the driver sees the error.
                    shared.record_failure("pong-receiver", e);
                    shared.run_loop("pong-receiver", shutdown, || Ok(()));
                }
            }
        }
        Variant::All => {
            shared.record_failure("pong-receiver", anyhow!("'all' is not a runnable variant"));
            shared.run_loop("pong-receiver", shutdown, || Ok(()));
        }
    }
}

/// Build the multiplexer and pong application stack for the polled variants.
fn build_pong_driver(
    variant: Variant,
    sock: UnixStream,
    pong_in_len: usize,
    pong_out: Vec<u8>,
) -> Result<(Multiplexer, crate::net::pong::StateCell)> {
    let mut mpx = Multiplexer::new().context("failed to create multiplexer")?;
    let state = if variant == Variant::Lpf {
        let app = PongMessageApplication::new(pong_in_len, pong_out);
        let state = app.state_cell();
        let transport = StreamTransport::new(sock, LengthPrefixFraming::new(app))?;
        mpx.add(Box::new(transport)).context("failed to start framing transport")?;
        state
    } else {
        let app = PongStreamApplication::new(pong_in_len, pong_out);
        let state = app.state_cell();
        let transport = StreamTransport::new(sock, app)?;
        mpx.add(Box::new(transport)).context("failed to start stream transport")?;
        state
    };
    Ok((mpx, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::RecvTimeoutError;
    use std::thread;
    use std::time::Duration;

    /// A fixture whose receiver expects one byte more than each ping carries.
    fn fixture_expecting_longer_ping(variant: Variant) -> SocketFixture {
        let ping_out = encode_frame(PING_TEXT).unwrap();
        let pong_out = encode_frame(PONG_TEXT).unwrap();
        let pong_in_len = ping_out.len() + 1;
        SocketFixture::start_workers(variant, &FixtureOptions::default(), ping_out, pong_out, pong_in_len)
            .unwrap()
    }

    fn assert_failure_is_reported(variant: Variant, cause: &str) {
        let (done, finished) = mpsc::channel();
        let driver = thread::spawn(move || {
            let mut fixture = fixture_expecting_longer_ping(variant);
            let first = format!("{:#}", fixture.run_iteration().unwrap_err());
            let second = format!("{:#}", fixture.run_iteration().unwrap_err());
            let torn_down = fixture.tear_down();
            done.send(()).unwrap();
            (first, second, torn_down)
        });

        if let Err(RecvTimeoutError::Timeout) = finished.recv_timeout(Duration::from_secs(10)) {
            panic!("{} fixture hung after a failed exchange", variant);
        }
        let (first, second, torn_down) = driver.join().unwrap();
        assert!(first.contains("pong-receiver failed"), "{}", first);
        assert!(first.contains(cause), "{}", first);
        assert!(second.contains("failed in an earlier iteration"), "{}", second);
        torn_down.unwrap();
    }

    #[test]
    fn test_all_is_not_a_fixture() {
        assert!(SocketFixture::set_up(Variant::All, &FixtureOptions::default()).is_err());
    }

    #[test]
    fn test_raw_fixture_round_trips() {
        let mut fixture = SocketFixture::set_up(Variant::Raw, &FixtureOptions::default()).unwrap();
        for _ in 0..100 {
            fixture.run_iteration().unwrap();
        }
        fixture.tear_down().unwrap();
        assert!(fixture.run_iteration().is_err());
    }

    #[test]
    fn test_round_trip_bytes_cover_both_frames() {
        let fixture = SocketFixture::set_up(Variant::Posix, &FixtureOptions::default()).unwrap();
        let expected = encode_frame(PING_TEXT).unwrap().len() + encode_frame(PONG_TEXT).unwrap().len();
        assert_eq!(fixture.round_trip_bytes(), expected);
    }

    #[test]
    fn test_drop_tears_down_workers() {
        let mut fixture = SocketFixture::set_up(Variant::Lpf, &FixtureOptions::default()).unwrap();
        fixture.run_iteration().unwrap();
        drop(fixture);
    }

    #[test]
    fn test_fixture_driven_from_another_thread() {
        let mut fixture = SocketFixture::set_up(Variant::Stream, &FixtureOptions::default()).unwrap();
        fixture.run_iteration().unwrap();
        let driver = thread::spawn(move || {
            for _ in 0..10 {
                fixture.run_iteration()?;
            }
            fixture.tear_down()
        });
        driver.join().unwrap().unwrap();
    }

    #[test]
    fn test_posix_failure_is_reported_without_hanging() {
        assert_failure_is_reported(Variant::Posix, "short recv");
    }

    #[test]
    fn test_lpf_failure_is_reported_without_hanging() {
        assert_failure_is_reported(Variant::Lpf, "unexpected data");
    }

    #[test]
    fn test_first_failure_is_kept() {
        let shared = Shared::new().unwrap();
        shared.record_failure("ping-sender", anyhow!("first"));
        shared.record_failure("pong-receiver", anyhow!("second"));
        assert!(shared.failed.load(Ordering::Acquire));
        let failure = shared.failure.lock().take().unwrap();
        assert_eq!(format!("{:#}", failure), "ping-sender failed: first");
    }

    #[test]
    fn test_cancelled_worker_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let (go, gate) = mpsc::channel();
        let flag = Arc::clone(&ran);
        let handle = spawn_gated("cancelled-worker", None, gate, move || {
            flag.store(true, Ordering::SeqCst)
        })
        .unwrap();
        drop(go);
        handle.join().unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_gated_worker_runs_after_go() {
        let ran = Arc::new(AtomicBool::new(false));
        let (go, gate) = mpsc::channel();
        let flag = Arc::clone(&ran);
        let handle = spawn_gated("gated-worker", None, gate, move || {
            flag.store(true, Ordering::SeqCst)
        })
        .unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));
        go.send(()).unwrap();
        handle.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
