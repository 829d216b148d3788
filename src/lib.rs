//! # Ping/Pong Socket Benchmark Library
//!
//! Measures the round-trip latency of a small ping/pong exchange over a
//! connected `AF_UNIX` stream socket pair, through four socket stacks of
//! increasing abstraction, plus microbenchmarks for binary serialization and
//! the rendezvous barrier that keeps the worker threads in lockstep.
//!
//! ## Variants
//!
//! - **posix**: one `send`/`recv` syscall per message
//! - **raw**: blocking `std::io` `write_all`/`read_exact`
//! - **stream**: pong side driven by a readiness-polled stream transport
//! - **lpf**: the stream transport with length-prefix framing on top
//!
//! ## Architecture Overview
//!
//! - `barrier`: the cyclic rendezvous barrier
//! - `fixture`: socket pair, worker threads and the per-round choreography
//! - `net`: raw I/O helpers, framing, stream transport, multiplexer, pong apps
//! - `serialization`: sample values for the serialization benches
//! - `benchmark`: runner that times fixture iterations
//! - `metrics` / `results`: HDR histogram statistics and JSON output
//! - `cli` / `logging` / `utils`: configuration, tracing setup and helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pingpong_bench::{BenchmarkConfig, BenchmarkRunner, Variant};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = BenchmarkConfig {
//!         iterations: Some(10_000),
//!         duration: None,
//!         warmup_iterations: 100,
//!         percentiles: vec![50.0, 95.0, 99.0],
//!         socket_buffer_size: None,
//!         sender_affinity: None,
//!         receiver_affinity: None,
//!         run_id: pingpong_bench::utils::generate_test_id(),
//!     };
//!
//!     let results = BenchmarkRunner::new(config, Variant::Lpf).run()?;
//!     println!("Average latency: {:?}", results.summary.average_latency_ns);
//!     Ok(())
//! }
//! ```

/// Reusable rendezvous point for a fixed number of threads
pub mod barrier;

/// Test execution lifecycle: setup, warmup, measurement, teardown
pub mod benchmark;

/// Command-line arguments and variant selection
pub mod cli;

pub mod error;

/// Ping/pong fixture that synchronizes a driver with two socket workers
pub mod fixture;

/// Colorized console output and optional log file
pub mod logging;

/// Round-trip latency and throughput measurement using HDR histograms
pub mod metrics;

pub mod net;

/// Result aggregation, streaming and final JSON output
pub mod results;

pub mod serialization;

pub mod utils;

pub use barrier::Barrier;
pub use benchmark::{BenchmarkConfig, BenchmarkRunner};
pub use cli::{Args, Variant};
pub use error::{BarrierError, TransportError};
pub use fixture::{FixtureOptions, SocketFixture};
pub use metrics::{LatencyMetrics, ThroughputMetrics};
pub use results::{BenchmarkResults, ResultsManager};

/// The current version of the benchmark, recorded in every result file
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Measured round trips per variant.
    pub const ITERATIONS: usize = 10_000;

    /// Unmeasured round trips before timing starts.
    pub const WARMUP_ITERATIONS: usize = 1_000;

    pub const OUTPUT_FILE: &str = "pingpong_results.json";

    pub const PERCENTILES: [f64; 4] = [50.0, 95.0, 99.0, 99.9];
}
