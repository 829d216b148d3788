//! # Utility Functions
//!
//! Helpers shared by the runner, the binary and the benches:
//!
//! - **Formatting**: human-readable durations, byte counts and rates
//! - **Validation**: checks for CLI parameters with clear error messages
//! - **Threads**: named worker threads with optional CPU pinning
//! - **Display**: plain-text summary tables
//!
//! ```rust
//! use pingpong_bench::utils::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_rate(1048576.0), "1.00 MB/s");
//! validate_iterations(10_000)?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a benchmark run (UUID v4).
pub fn generate_test_id() -> String {
    Uuid::new_v4().to_string()
}

/// Convert nanoseconds to a human-readable duration string.
///
/// ```rust
/// # use pingpong_bench::utils::format_duration_ns;
/// assert_eq!(format_duration_ns(500), "500ns");
/// assert_eq!(format_duration_ns(1500), "1.50μs");
/// ```
pub fn format_duration_ns(ns: u64) -> String {
    format_duration(Duration::from_nanos(ns))
}

/// Format a duration with the largest unit that keeps it above one.
///
/// Durations of a minute or more switch to a compound `1h 2m 3s` format.
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        if minutes < 60 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}h {}m {}s", minutes / 60, minutes % 60, seconds % 60)
        }
    }
}

pub fn format_bytes(bytes: usize) -> String {
    format_bytes_f64(bytes as f64)
}

/// Binary units (1 KB = 1024 B), two decimals above one kilobyte.
pub fn format_bytes_f64(bytes: f64) -> String {
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_second))
}

/// Round trips per second, e.g. `1.50K rt/s`.
pub fn format_round_trip_rate(round_trips_per_second: f64) -> String {
    if round_trips_per_second < 1000.0 {
        format!("{:.0} rt/s", round_trips_per_second)
    } else if round_trips_per_second < 1_000_000.0 {
        format!("{:.2}K rt/s", round_trips_per_second / 1000.0)
    } else {
        format!("{:.2}M rt/s", round_trips_per_second / 1_000_000.0)
    }
}

/// Iteration counts must be non-zero and fit a histogram comfortably.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        anyhow::bail!("Iteration count cannot be zero");
    }
    if iterations > 1_000_000_000 {
        anyhow::bail!(
            "Iteration count {} is too high (maximum 1,000,000,000)",
            iterations
        );
    }
    Ok(())
}

/// Percentiles must lie in `(0, 100]`.
pub fn validate_percentiles(percentiles: &[f64]) -> Result<()> {
    for &p in percentiles {
        if !(p > 0.0 && p <= 100.0) {
            anyhow::bail!("Percentile {} is out of range (0, 100]", p);
        }
    }
    Ok(())
}

/// Socket buffers between 1 KB and 64 MB.
pub fn validate_socket_buffer_size(buffer_size: usize) -> Result<()> {
    if buffer_size < 1024 {
        anyhow::bail!(
            "Socket buffer size {} is too small (minimum 1024 bytes)",
            buffer_size
        );
    }
    if buffer_size > 64 * 1024 * 1024 {
        anyhow::bail!(
            "Socket buffer size {} is too large (maximum 64MB)",
            buffer_size
        );
    }
    Ok(())
}

/// A pinned core must exist on this machine.
pub fn validate_core_id(core: usize) -> Result<()> {
    let cores = get_cpu_cores();
    if core >= cores {
        anyhow::bail!(
            "CPU core {} does not exist (this machine has {} cores)",
            core,
            cores
        );
    }
    Ok(())
}

/// Number of logical CPU cores available to the process.
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

/// Spawn a named thread, optionally pinned to `core`.
///
/// Pinning is best effort: if the OS rejects the affinity request the thread
/// runs unpinned and a warning is logged.
pub fn spawn_pinned<F>(name: &str, core: Option<usize>, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        if let Some(id) = core {
            if core_affinity::set_for_current(core_affinity::CoreId { id }) {
                debug!("{} pinned to core {}", thread_name, id);
            } else {
                warn!("failed to pin {} to core {}", thread_name, id);
            }
        }
        f()
    })
}

/// Print one table row; missing widths default to 10.
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    print!("|");
    for (i, column) in columns.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(10);
        print!(" {:width$} |", column, width = width);
    }
    println!();
}

pub fn print_table_separator(widths: &[usize]) {
    print!("+");
    for &width in widths {
        print!("{}+", "-".repeat(width + 2));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ns() {
        assert_eq!(format_duration_ns(500), "500ns");
        assert_eq!(format_duration_ns(1500), "1.50μs");
        assert_eq!(format_duration_ns(1_500_000), "1.50ms");
        assert_eq!(format_duration_ns(1_500_000_000), "1.50s");
    }

    #[test]
    fn test_format_long_durations() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1572864), "1.50 MB");
        assert_eq!(format_bytes(1610612736), "1.50 GB");
    }

    #[test]
    fn test_format_round_trip_rate() {
        assert_eq!(format_round_trip_rate(500.0), "500 rt/s");
        assert_eq!(format_round_trip_rate(1500.0), "1.50K rt/s");
        assert_eq!(format_round_trip_rate(1500000.0), "1.50M rt/s");
    }

    #[test]
    fn test_validate_iterations() {
        assert!(validate_iterations(1).is_ok());
        assert!(validate_iterations(0).is_err());
        assert!(validate_iterations(1_000_000_001).is_err());
    }

    #[test]
    fn test_validate_percentiles() {
        assert!(validate_percentiles(&[50.0, 99.9, 100.0]).is_ok());
        assert!(validate_percentiles(&[0.0]).is_err());
        assert!(validate_percentiles(&[100.1]).is_err());
        assert!(validate_percentiles(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_validate_socket_buffer_size() {
        assert!(validate_socket_buffer_size(1024).is_ok());
        assert!(validate_socket_buffer_size(1023).is_err());
        assert!(validate_socket_buffer_size(64 * 1024 * 1024 + 1).is_err());
    }

    #[test]
    fn test_validate_core_id() {
        assert!(validate_core_id(0).is_ok());
        assert!(validate_core_id(get_cpu_cores()).is_err());
    }

    #[test]
    fn test_spawn_pinned_runs_closure() {
        let handle = spawn_pinned("unpinned-test", None, || {
            assert_eq!(thread::current().name(), Some("unpinned-test"));
        })
        .unwrap();
        handle.join().unwrap();
    }
}
