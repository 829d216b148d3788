use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Ping/Pong Socket Benchmark - round-trip latency of AF_UNIX socket stacks
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Variants to benchmark (space-separated: posix, raw, stream, lpf, or all)
    #[clap(short = 'm', long, value_enum, default_values_t = vec![Variant::All], help_heading = "Core Options", num_args = 1..)]
    pub variants: Vec<Variant>,

    /// Number of measured round trips (ignored if duration is specified)
    #[clap(short = 'i', long, default_value_t = crate::defaults::ITERATIONS, help_heading = "Core Options")]
    pub iterations: usize,

    /// Duration to run each variant (takes precedence over iterations)
    #[clap(short = 'd', long, value_parser = parse_duration, help_heading = "Core Options")]
    pub duration: Option<Duration>,

    /// Number of unmeasured round trips before timing starts
    #[clap(short = 'w', long, default_value_t = crate::defaults::WARMUP_ITERATIONS, help_heading = "Core Options")]
    pub warmup_iterations: usize,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE, help_heading = "Output")]
    pub output_file: PathBuf,

    /// JSON output file updated after every completed variant
    #[clap(long, help_heading = "Output")]
    pub streaming_output: Option<PathBuf>,

    /// Percentiles to calculate for latency metrics
    #[clap(long, num_args = 1.., default_values_t = crate::defaults::PERCENTILES.to_vec(), help_heading = "Output")]
    pub percentiles: Vec<f64>,

    /// SO_SNDBUF/SO_RCVBUF for both ends of the socket pair
    #[clap(long, help_heading = "Tuning")]
    pub socket_buffer_size: Option<usize>,

    /// CPU core to pin the ping-sender thread to
    #[clap(long, help_heading = "Tuning")]
    pub sender_affinity: Option<usize>,

    /// CPU core to pin the pong-receiver thread to
    #[clap(long, help_heading = "Tuning")]
    pub receiver_affinity: Option<usize>,

    /// Continue running other variants even if one fails
    #[clap(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = ArgAction::Count, help_heading = "Logging")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[clap(short = 'q', long, conflicts_with = "verbose", help_heading = "Logging")]
    pub quiet: bool,

    /// Also write logs to this file (plain text, no colors)
    #[clap(long, help_heading = "Logging")]
    pub log_file: Option<PathBuf>,
}

/// Socket stacks that can be benchmarked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// One send()/recv() syscall per message
    #[clap(name = "posix")]
    Posix,

    /// Blocking std::io write_all/read_exact
    #[clap(name = "raw")]
    Raw,

    /// Pong side driven by the polled stream transport
    #[clap(name = "stream")]
    Stream,

    /// Stream transport plus length-prefix framing
    #[clap(name = "lpf")]
    Lpf,

    /// All of the above
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Posix => write!(f, "POSIX Socket"),
            Variant::Raw => write!(f, "Raw Socket"),
            Variant::Stream => write!(f, "Stream Transport"),
            Variant::Lpf => write!(f, "Length-Prefix Framing"),
            Variant::All => write!(f, "All Variants"),
        }
    }
}

impl Variant {
    /// Every runnable variant, in benchmark order.
    pub const CONCRETE: [Variant; 4] = [Variant::Posix, Variant::Raw, Variant::Stream, Variant::Lpf];

    /// Expand `All` and drop duplicates, keeping first-seen order.
    pub fn expand_all(variants: Vec<Variant>) -> Vec<Variant> {
        if variants.contains(&Variant::All) {
            return Self::CONCRETE.to_vec();
        }
        let mut expanded = Vec::with_capacity(variants.len());
        for variant in variants {
            if !expanded.contains(&variant) {
                expanded.push(variant);
            }
        }
        expanded
    }

    /// Short name as accepted on the command line.
    pub fn cli_name(&self) -> &'static str {
        match self {
            Variant::Posix => "posix",
            Variant::Raw => "raw",
            Variant::Stream => "stream",
            Variant::Lpf => "lpf",
            Variant::All => "all",
        }
    }
}

/// Parse duration from string (e.g., "10s", "500ms", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", num_str));
    }

    let duration = match unit {
        "ms" => Duration::from_secs_f64(num / 1000.0),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}
