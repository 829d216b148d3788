//! # Rendezvous Barrier
//!
//! A reusable, cyclic synchronization point for a fixed number of threads.
//! The ping/pong fixtures use two of these (`start` and `stop`) to hold the
//! driver, sender and receiver threads in lockstep around every measured
//! exchange.
//!
//! ## Protocol
//!
//! Every call to [`Barrier::arrive_and_wait`] increments the arrival count of
//! the current round under a single lock. Callers that do not complete the
//! round remember the round's generation and sleep until the generation
//! changes. The caller that completes the round resets the count to zero,
//! advances the generation and wakes every waiter with one broadcast. All of
//! this happens while holding the lock, so:
//!
//! - the count never exceeds `capacity`;
//! - a thread that races ahead into the next round increments a fresh count
//!   and waits on the new generation, never on the one being released;
//! - spurious condvar wakeups are absorbed by re-checking the generation.
//!
//! ## Caller obligations
//!
//! Exactly `capacity` threads must take part in every round. A missing
//! participant blocks everyone else forever; there is no timeout or
//! cancellation. The barrier must outlive every thread that uses it, which
//! sharing it through an `Arc` guarantees.

use crate::error::BarrierError;
use parking_lot::{Condvar, Mutex};

/// Mutable state of the barrier, guarded by [`Barrier::state`].
#[derive(Debug, Default)]
struct RoundState {
    /// Participants that arrived in the current round, always `< capacity`
    /// while nobody holds the lock.
    arrived: usize,
    /// Incremented once per completed round.
    generation: u64,
}

/// Cyclic rendezvous point for `capacity` participants.
///
/// ```rust
/// use pingpong_bench::barrier::Barrier;
/// use std::sync::Arc;
/// use std::thread;
///
/// # fn main() -> anyhow::Result<()> {
/// let barrier = Arc::new(Barrier::new(2)?);
/// let peer = {
///     let barrier = Arc::clone(&barrier);
///     thread::spawn(move || {
///         for _ in 0..3 {
///             barrier.arrive_and_wait();
///         }
///     })
/// };
/// for _ in 0..3 {
///     barrier.arrive_and_wait();
/// }
/// peer.join().expect("peer thread panicked");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Barrier {
    capacity: usize,
    state: Mutex<RoundState>,
    released: Condvar,
}

impl Barrier {
    /// Create a barrier for `capacity` participants.
    ///
    /// Fails with [`BarrierError::InvalidCapacity`] when `capacity` is zero,
    /// since such a barrier could never complete a round.
    pub fn new(capacity: usize) -> Result<Self, BarrierError> {
        if capacity == 0 {
            return Err(BarrierError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(RoundState::default()),
            released: Condvar::new(),
        })
    }

    /// Number of participants per round.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Block until `capacity` calls, this one included, have arrived in the
    /// current round.
    ///
    /// The call that completes the round returns immediately and releases all
    /// other participants of the round. The barrier is ready for the next
    /// round as soon as that call has released the lock.
    pub fn arrive_and_wait(&self) {
        let mut state = self.state.lock();
        state.arrived += 1;
        if state.arrived == self.capacity {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return;
        }
        debug_assert!(state.arrived < self.capacity);
        let generation = state.generation;
        while state.generation == generation {
            self.released.wait(&mut state);
        }
    }

    /// Completed rounds so far (wraps on overflow).
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}
