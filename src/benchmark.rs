//! # Benchmark Engine Module
//!
//! Drives one [`SocketFixture`] through its lifecycle and turns the timed
//! round trips into [`BenchmarkResults`]:
//!
//! 1. **Setup**: create the socket pair and start both worker threads
//! 2. **Warmup**: run unmeasured round trips so caches and scheduler settle
//! 3. **Measurement**: time every `run_iteration` call, count- or duration-bound
//! 4. **Teardown**: stop the workers and close the sockets
//!
//! A round trip that fails during measurement ends the measured phase early.
//! The error is kept in the results next to the metrics gathered so far, so
//! the caller decides whether a failed variant aborts the whole run.

use crate::{
    cli::{Args, Variant},
    fixture::{FixtureOptions, SocketFixture},
    metrics::MetricsCollector,
    results::{BenchmarkResults, TestConfiguration},
    utils::{
        format_duration, generate_test_id, validate_core_id, validate_iterations,
        validate_percentiles, validate_socket_buffer_size,
    },
};
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-variant banner logged before a run starts.
struct BenchmarkConfigDisplay<'a> {
    config: &'a BenchmarkConfig,
    variant: Variant,
}

impl std::fmt::Display for BenchmarkConfigDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let not_set = || "Not set".to_string();
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting Benchmark for: {}", self.variant)?;
        if let Some(duration) = self.config.duration {
            writeln!(f, "  Test Duration:      {}", format_duration(duration))?;
        } else {
            writeln!(
                f,
                "  Iterations:         {}",
                self.config.iterations.unwrap_or_default()
            )?;
        }
        writeln!(f, "  Warmup Iterations:  {}", self.config.warmup_iterations)?;
        writeln!(
            f,
            "  Socket Buffer:      {}",
            self.config
                .socket_buffer_size
                .map_or_else(|| "System default".to_string(), |s| format!("{} bytes", s))
        )?;
        writeln!(
            f,
            "  Sender Affinity:    {}",
            self.config.sender_affinity.map_or_else(not_set, |c| c.to_string())
        )?;
        writeln!(
            f,
            "  Receiver Affinity:  {}",
            self.config.receiver_affinity.map_or_else(not_set, |c| c.to_string())
        )?;
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Parameters shared by every variant of one run
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkConfig {
    /// Measured round trips; `None` when the run is duration-bound.
    pub iterations: Option<usize>,

    /// Measured time per variant, takes precedence over `iterations`.
    pub duration: Option<Duration>,

    pub warmup_iterations: usize,

    pub percentiles: Vec<f64>,

    pub socket_buffer_size: Option<usize>,

    pub sender_affinity: Option<usize>,

    pub receiver_affinity: Option<usize>,

    /// Shared by every variant of the run, so results can be joined later.
    pub run_id: String,
}

impl BenchmarkConfig {
    /// Validate the CLI arguments and build the run configuration.
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.duration.is_none() {
            validate_iterations(args.iterations)?;
        } else if args.duration == Some(Duration::ZERO) {
            anyhow::bail!("Duration must be greater than zero");
        }
        validate_percentiles(&args.percentiles)?;
        if let Some(size) = args.socket_buffer_size {
            validate_socket_buffer_size(size)?;
        }
        for core in [args.sender_affinity, args.receiver_affinity].into_iter().flatten() {
            validate_core_id(core)?;
        }

        Ok(Self {
            iterations: if args.duration.is_some() {
                None
            } else {
                Some(args.iterations)
            },
            duration: args.duration,
            warmup_iterations: args.warmup_iterations,
            percentiles: args.percentiles.clone(),
            socket_buffer_size: args.socket_buffer_size,
            sender_affinity: args.sender_affinity,
            receiver_affinity: args.receiver_affinity,
            run_id: generate_test_id(),
        })
    }

    pub fn fixture_options(&self) -> FixtureOptions {
        FixtureOptions {
            sender_affinity: self.sender_affinity,
            receiver_affinity: self.receiver_affinity,
            socket_buffer_size: self.socket_buffer_size,
        }
    }

    fn test_configuration(&self, round_trip_bytes: usize) -> TestConfiguration {
        TestConfiguration {
            iterations: self.iterations,
            duration: self.duration,
            warmup_iterations: self.warmup_iterations,
            percentiles: self.percentiles.clone(),
            socket_buffer_size: self.socket_buffer_size,
            sender_affinity: self.sender_affinity,
            receiver_affinity: self.receiver_affinity,
            round_trip_bytes,
        }
    }
}

/// Runs the ping/pong benchmark for a single variant
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
    variant: Variant,
}

impl BenchmarkRunner {
    pub fn new(config: BenchmarkConfig, variant: Variant) -> Self {
        Self { config, variant }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Set up, warm up, measure and tear down one fixture.
    ///
    /// Setup, warmup and teardown failures are returned as errors. A failed
    /// measured round trip is recorded in the returned results instead.
    pub fn run(&self) -> Result<BenchmarkResults> {
        info!(
            "{}",
            BenchmarkConfigDisplay {
                config: &self.config,
                variant: self.variant,
            }
        );
        let started = Instant::now();

        let mut fixture = SocketFixture::set_up(self.variant, &self.config.fixture_options())
            .with_context(|| format!("failed to set up {} fixture", self.variant))?;
        let round_trip_bytes = fixture.round_trip_bytes();

        let mut results = BenchmarkResults::new(
            self.config.run_id.clone(),
            self.variant,
            self.config.test_configuration(round_trip_bytes),
        );

        if self.config.warmup_iterations > 0 {
            info!(
                "Running warmup with {} iterations",
                self.config.warmup_iterations
            );
            self.run_warmup(&mut fixture)?;
        }

        let mut metrics = MetricsCollector::new(self.config.percentiles.clone())?;
        if let Err(e) = self.run_measured(&mut fixture, &mut metrics) {
            warn!("{} round trip failed: {:#}", self.variant, e);
            results.record_error(&e);
        }
        metrics.finish();
        results.add_round_trip_results(metrics.get_metrics());

        fixture
            .tear_down()
            .with_context(|| format!("failed to tear down {} fixture", self.variant))?;

        results.test_duration = started.elapsed();
        info!(
            "Benchmark completed for {} variant in {}",
            self.variant,
            format_duration(results.test_duration)
        );
        Ok(results)
    }

    fn run_warmup(&self, fixture: &mut SocketFixture) -> Result<()> {
        for i in 0..self.config.warmup_iterations {
            fixture
                .run_iteration()
                .with_context(|| format!("warmup iteration {} failed", i))?;
        }
        debug!("Warmup completed");
        Ok(())
    }

    fn run_measured(&self, fixture: &mut SocketFixture, metrics: &mut MetricsCollector) -> Result<()> {
        let bytes = fixture.round_trip_bytes();
        metrics.reset();

        match (self.config.duration, self.config.iterations) {
            (Some(duration), _) => {
                let deadline = Instant::now() + duration;
                let mut i = 0usize;
                while Instant::now() < deadline {
                    Self::timed_round_trip(fixture, metrics, bytes)
                        .with_context(|| format!("iteration {} failed", i))?;
                    i += 1;
                }
            }
            (None, Some(iterations)) => {
                for i in 0..iterations {
                    Self::timed_round_trip(fixture, metrics, bytes)
                        .with_context(|| format!("iteration {} failed", i))?;
                }
            }
            (None, None) => anyhow::bail!("neither iterations nor duration configured"),
        }
        Ok(())
    }

    fn timed_round_trip(fixture: &mut SocketFixture, metrics: &mut MetricsCollector, bytes: usize) -> Result<()> {
        let start = Instant::now();
        fixture.run_iteration()?;
        metrics.record_round_trip(bytes, start.elapsed())
    }
}
