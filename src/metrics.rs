use anyhow::{Context, Result};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Round-trip latency statistics including percentiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub median_ns: f64,
    pub std_dev_ns: f64,
    pub percentiles: Vec<PercentileValue>,
    pub total_samples: usize,
    pub histogram_data: Vec<u64>,
}

impl LatencyMetrics {
    /// Value recorded for `percentile`, if it was requested.
    pub fn percentile(&self, percentile: f64) -> Option<u64> {
        self.percentiles
            .iter()
            .find(|p| (p.percentile - percentile).abs() < f64::EPSILON)
            .map(|p| p.value_ns)
    }
}

/// Percentile value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

/// Round-trip rate and bandwidth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMetrics {
    pub round_trips_per_second: f64,
    pub bytes_per_second: f64,
    pub total_round_trips: usize,
    pub total_bytes: usize,
    pub duration_ns: u64,
}

/// Combined performance metrics for a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub latency: LatencyMetrics,
    pub throughput: ThroughputMetrics,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Latency collector using HDR histogram for accurate measurement
pub struct LatencyCollector {
    histogram: Histogram<u64>,
    sample_count: usize,
}

impl LatencyCollector {
    pub fn new() -> Result<Self> {
        // 3 significant figures, auto-resizing
        let histogram = Histogram::<u64>::new(3).context("failed to create latency histogram")?;

        Ok(Self {
            histogram,
            sample_count: 0,
        })
    }

    /// Record one round-trip latency.
    pub fn record(&mut self, latency: Duration) -> Result<()> {
        let latency_ns = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.histogram
            .record(latency_ns)
            .with_context(|| format!("failed to record latency of {}ns", latency_ns))?;
        self.sample_count += 1;
        Ok(())
    }

    pub fn get_metrics(&self, percentiles: &[f64]) -> LatencyMetrics {
        let percentile_values = percentiles
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ns: self.histogram.value_at_percentile(p),
            })
            .collect();

        LatencyMetrics {
            min_ns: self.histogram.min(),
            max_ns: self.histogram.max(),
            mean_ns: self.histogram.mean(),
            median_ns: self.histogram.value_at_percentile(50.0) as f64,
            std_dev_ns: self.histogram.stdev(),
            percentiles: percentile_values,
            total_samples: self.sample_count,
            histogram_data: self.get_histogram_data(),
        }
    }

    /// Upper bound of each histogram quantile step
    fn get_histogram_data(&self) -> Vec<u64> {
        self.histogram
            .iter_quantiles(1)
            .map(|value| value.value_iterated_to())
            .collect()
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
        self.sample_count = 0;
    }
}

/// Round-trip rate over the measured window.
///
/// The window opens at construction or [`reset`](Self::reset) and closes at
/// [`finish`](Self::finish); until then the rate is taken against the
/// elapsed time so far.
pub struct ThroughputCalculator {
    start_time: Instant,
    elapsed: Option<Duration>,
    round_trip_count: usize,
    byte_count: usize,
}

impl ThroughputCalculator {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            elapsed: None,
            round_trip_count: 0,
            byte_count: 0,
        }
    }

    pub fn record_round_trip(&mut self, bytes: usize) {
        self.round_trip_count += 1;
        self.byte_count += bytes;
    }

    /// Freeze the measured window.
    pub fn finish(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.start_time.elapsed());
        }
    }

    pub fn get_metrics(&self) -> ThroughputMetrics {
        let elapsed = self.elapsed.unwrap_or_else(|| self.start_time.elapsed());
        let duration_secs = elapsed.as_secs_f64();

        let (round_trips_per_second, bytes_per_second) = if duration_secs > 0.0 {
            (
                self.round_trip_count as f64 / duration_secs,
                self.byte_count as f64 / duration_secs,
            )
        } else {
            (0.0, 0.0)
        };

        ThroughputMetrics {
            round_trips_per_second,
            bytes_per_second,
            total_round_trips: self.round_trip_count,
            total_bytes: self.byte_count,
            duration_ns: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    pub fn reset(&mut self) {
        self.start_time = Instant::now();
        self.elapsed = None;
        self.round_trip_count = 0;
        self.byte_count = 0;
    }
}

impl Default for ThroughputCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency and throughput for one variant run
pub struct MetricsCollector {
    pub latency_collector: LatencyCollector,
    pub throughput_calculator: ThroughputCalculator,
    pub percentiles: Vec<f64>,
}

impl MetricsCollector {
    pub fn new(percentiles: Vec<f64>) -> Result<Self> {
        Ok(Self {
            latency_collector: LatencyCollector::new()?,
            throughput_calculator: ThroughputCalculator::new(),
            percentiles,
        })
    }

    /// Record one completed round trip of `bytes` on the wire.
    pub fn record_round_trip(&mut self, bytes: usize, latency: Duration) -> Result<()> {
        self.throughput_calculator.record_round_trip(bytes);
        self.latency_collector.record(latency)
    }

    /// Close the measured window.
    pub fn finish(&mut self) {
        self.throughput_calculator.finish();
    }

    pub fn get_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            latency: self.latency_collector.get_metrics(&self.percentiles),
            throughput: self.throughput_calculator.get_metrics(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Restart both collectors; used after warmup.
    pub fn reset(&mut self) {
        self.latency_collector.reset();
        self.throughput_calculator.reset();
    }
}
