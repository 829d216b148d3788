use crate::cli::Variant;
use crate::metrics::PerformanceMetrics;
use crate::utils::{format_bytes, format_duration_ns, format_round_trip_rate, print_table_row, print_table_separator};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Complete benchmark results for one variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResults {
    pub run_id: String,
    pub variant: Variant,
    pub test_config: TestConfiguration,
    pub round_trip_results: Option<PerformanceMetrics>,
    pub summary: BenchmarkSummary,
    pub errors: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub test_duration: Duration,
    pub system_info: SystemInfo,
}

/// Test configuration used for the benchmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub iterations: Option<usize>,
    pub duration: Option<Duration>,
    pub warmup_iterations: usize,
    pub percentiles: Vec<f64>,
    pub socket_buffer_size: Option<usize>,
    pub sender_affinity: Option<usize>,
    pub receiver_affinity: Option<usize>,
    /// Ping frame plus pong frame, headers included.
    pub round_trip_bytes: usize,
}

/// Summary of benchmark results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub total_round_trips: usize,
    pub total_bytes_transferred: usize,
    pub round_trips_per_second: f64,
    pub average_throughput_mbps: f64,
    pub average_latency_ns: Option<f64>,
    pub min_latency_ns: Option<u64>,
    pub max_latency_ns: Option<u64>,
    pub p95_latency_ns: Option<u64>,
    pub p99_latency_ns: Option<u64>,
    pub error_count: usize,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub memory_gb: Option<f64>,
    pub rust_version: String,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            memory_gb: total_memory_gb(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::collect()
    }
}

/// Physical memory from `/proc/meminfo`; `None` where that file is absent.
fn total_memory_gb() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / (1024.0 * 1024.0))
}

impl BenchmarkResults {
    pub fn new(run_id: impl Into<String>, variant: Variant, test_config: TestConfiguration) -> Self {
        Self {
            run_id: run_id.into(),
            variant,
            test_config,
            round_trip_results: None,
            summary: BenchmarkSummary::default(),
            errors: Vec::new(),
            timestamp: chrono::Utc::now(),
            test_duration: Duration::ZERO,
            system_info: SystemInfo::collect(),
        }
    }

    pub fn add_round_trip_results(&mut self, results: PerformanceMetrics) {
        self.round_trip_results = Some(results);
        self.update_summary();
    }

    /// Note a failed round trip; the run keeps its partial metrics.
    pub fn record_error(&mut self, error: &anyhow::Error) {
        self.errors.push(format!("{:#}", error));
        self.summary.error_count = self.errors.len();
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn update_summary(&mut self) {
        let error_count = self.errors.len();
        let Some(ref results) = self.round_trip_results else {
            self.summary = BenchmarkSummary {
                error_count,
                ..BenchmarkSummary::default()
            };
            return;
        };

        let latency = &results.latency;
        let has_samples = latency.total_samples > 0;
        self.summary = BenchmarkSummary {
            total_round_trips: results.throughput.total_round_trips,
            total_bytes_transferred: results.throughput.total_bytes,
            round_trips_per_second: results.throughput.round_trips_per_second,
            average_throughput_mbps: results.throughput.bytes_per_second / 1_000_000.0,
            average_latency_ns: has_samples.then_some(latency.mean_ns),
            min_latency_ns: has_samples.then_some(latency.min_ns),
            max_latency_ns: has_samples.then_some(latency.max_ns),
            p95_latency_ns: latency.percentile(95.0).filter(|_| has_samples),
            p99_latency_ns: latency.percentile(99.0).filter(|_| has_samples),
            error_count,
        };
    }
}

/// Collects per-variant results and writes them out
pub struct ResultsManager {
    output_file: PathBuf,
    streaming_file: Option<PathBuf>,
    results: Vec<BenchmarkResults>,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Result<Self> {
        Ok(Self {
            output_file: output_file.to_path_buf(),
            streaming_file: None,
            results: Vec::new(),
        })
    }

    /// Stream each result into a JSON array as soon as it is added.
    pub fn enable_streaming<P: AsRef<Path>>(&mut self, streaming_file: P) -> Result<()> {
        let path = streaming_file.as_ref().to_path_buf();
        let mut file = File::create(&path)
            .with_context(|| format!("failed to create streaming file {:?}", path))?;
        writeln!(file, "[")?;

        debug!("Enabled streaming to: {:?}", path);
        self.streaming_file = Some(path);
        Ok(())
    }

    pub fn is_streaming_enabled(&self) -> bool {
        self.streaming_file.is_some()
    }

    pub fn results(&self) -> &[BenchmarkResults] {
        &self.results
    }

    pub fn add_results(&mut self, results: BenchmarkResults) -> Result<()> {
        info!("Adding results for {} variant", results.variant);
        self.stream_results(&results)?;
        self.results.push(results);
        Ok(())
    }

    fn stream_results(&self, results: &BenchmarkResults) -> Result<()> {
        if let Some(ref streaming_file) = self.streaming_file {
            let mut file = OpenOptions::new()
                .append(true)
                .open(streaming_file)
                .with_context(|| format!("failed to open streaming file {:?}", streaming_file))?;

            if !self.results.is_empty() {
                writeln!(file, ",")?;
            }

            let json = serde_json::to_string_pretty(results)?;
            write!(file, "{}", json)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Close the streaming array and write the consolidated results file.
    pub fn finalize(&mut self) -> Result<()> {
        info!("Finalizing benchmark results");

        if let Some(ref streaming_file) = self.streaming_file {
            let mut file = OpenOptions::new().append(true).open(streaming_file)?;
            writeln!(file, "\n]")?;
            file.flush()?;
        }

        let final_results = FinalBenchmarkResults {
            metadata: BenchmarkMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_tests: self.results.len(),
                system_info: SystemInfo::collect(),
            },
            results: self.results.clone(),
            summary: self.calculate_overall_summary(),
        };

        let json = serde_json::to_string_pretty(&final_results)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("failed to write results to {:?}", self.output_file))?;

        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }

    pub fn calculate_overall_summary(&self) -> OverallSummary {
        let mut total_round_trips = 0;
        let mut total_bytes = 0;
        let mut total_errors = 0;
        let mut variants = BTreeMap::new();

        for result in &self.results {
            total_round_trips += result.summary.total_round_trips;
            total_bytes += result.summary.total_bytes_transferred;
            total_errors += result.summary.error_count;

            variants.insert(
                result.variant.cli_name().to_string(),
                VariantSummary {
                    variant: result.variant,
                    round_trips_per_second: result.summary.round_trips_per_second,
                    average_latency_ns: result.summary.average_latency_ns,
                    p95_latency_ns: result.summary.p95_latency_ns,
                    p99_latency_ns: result.summary.p99_latency_ns,
                    total_round_trips: result.summary.total_round_trips,
                },
            );
        }

        OverallSummary {
            total_round_trips,
            total_bytes,
            total_errors,
            variants,
            fastest_variant: self.find_fastest_variant(),
            lowest_latency_variant: self.find_lowest_latency_variant(),
        }
    }

    /// Variant with the highest round-trip rate
    fn find_fastest_variant(&self) -> Option<Variant> {
        self.results
            .iter()
            .filter(|r| r.summary.total_round_trips > 0)
            .max_by(|a, b| {
                a.summary
                    .round_trips_per_second
                    .total_cmp(&b.summary.round_trips_per_second)
            })
            .map(|result| result.variant)
    }

    /// Variant with the lowest mean round-trip latency
    fn find_lowest_latency_variant(&self) -> Option<Variant> {
        self.results
            .iter()
            .filter_map(|r| r.summary.average_latency_ns.map(|mean| (r.variant, mean)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(variant, _)| variant)
    }

    /// Print a plain-text table of every collected result.
    pub fn print_summary(&self) {
        const WIDTHS: [usize; 7] = [22, 10, 10, 10, 10, 14, 6];
        print_table_separator(&WIDTHS);
        print_table_row(
            &["Variant", "Mean", "Min", "P99", "Max", "Rate", "Errors"],
            &WIDTHS,
        );
        print_table_separator(&WIDTHS);
        for result in &self.results {
            let s = &result.summary;
            let or_dash = |v: Option<u64>| v.map(format_duration_ns).unwrap_or_else(|| "-".to_string());
            let mean = s
                .average_latency_ns
                .map(|m| format_duration_ns(m as u64))
                .unwrap_or_else(|| "-".to_string());
            let variant = result.variant.to_string();
            let min = or_dash(s.min_latency_ns);
            let p99 = or_dash(s.p99_latency_ns);
            let max = or_dash(s.max_latency_ns);
            let rate = format_round_trip_rate(s.round_trips_per_second);
            let errors = s.error_count.to_string();
            print_table_row(
                &[
                    variant.as_str(),
                    mean.as_str(),
                    min.as_str(),
                    p99.as_str(),
                    max.as_str(),
                    rate.as_str(),
                    errors.as_str(),
                ],
                &WIDTHS,
            );
        }
        print_table_separator(&WIDTHS);

        let overall = self.calculate_overall_summary();
        println!(
            "{} round trips, {} transferred",
            overall.total_round_trips,
            format_bytes(overall.total_bytes)
        );
        if let Some(variant) = overall.lowest_latency_variant {
            println!("Lowest latency: {}", variant);
        }
    }
}

/// Final benchmark results structure
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalBenchmarkResults {
    pub metadata: BenchmarkMetadata,
    pub results: Vec<BenchmarkResults>,
    pub summary: OverallSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_tests: usize,
    pub system_info: SystemInfo,
}

/// Overall summary across all variants
#[derive(Debug, Serialize, Deserialize)]
pub struct OverallSummary {
    pub total_round_trips: usize,
    pub total_bytes: usize,
    pub total_errors: usize,
    pub variants: BTreeMap<String, VariantSummary>,
    pub fastest_variant: Option<Variant>,
    pub lowest_latency_variant: Option<Variant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant: Variant,
    pub round_trips_per_second: f64,
    pub average_latency_ns: Option<f64>,
    pub p95_latency_ns: Option<u64>,
    pub p99_latency_ns: Option<u64>,
    pub total_round_trips: usize,
}
