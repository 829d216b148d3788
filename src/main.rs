//! # Ping/Pong Socket Benchmark - Main Entry Point
//!
//! 1. **Parse arguments** and initialize logging
//! 2. **Validate** them into a [`BenchmarkConfig`]
//! 3. **Run** every selected variant in order
//! 4. **Report**: print a summary table and write the JSON results
//!
//! A failing variant stops the run unless `--continue-on-error` is given, in
//! which case the failure is logged and kept in the results file.

use anyhow::Result;
use clap::Parser;
use pingpong_bench::{
    benchmark::{BenchmarkConfig, BenchmarkRunner},
    cli::{Args, Variant},
    logging::init_logging,
    results::ResultsManager,
};
use tracing::{error, info};

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.verbose, args.quiet, args.log_file.as_deref())?;

    info!("Starting Ping/Pong Socket Benchmark v{}", pingpong_bench::VERSION);

    let config = BenchmarkConfig::from_args(&args)?;
    info!("Run id: {}", config.run_id);

    let mut results_manager = ResultsManager::new(&args.output_file)?;
    if let Some(ref streaming_file) = args.streaming_output {
        info!("Streaming results to: {:?}", streaming_file);
        results_manager.enable_streaming(streaming_file)?;
    }

    let variants = Variant::expand_all(args.variants.clone());
    let mut failures = 0usize;
    for variant in variants {
        match run_variant(&config, variant, &mut results_manager) {
            Ok(()) => info!("Benchmark completed successfully for {}", variant),
            Err(e) => {
                error!("Benchmark failed for {}: {:#}", variant, e);
                failures += 1;
                if !args.continue_on_error {
                    results_manager.finalize()?;
                    return Err(e);
                }
            }
        }
    }

    results_manager.finalize()?;
    if !args.quiet {
        results_manager.print_summary();
    }

    if failures > 0 {
        anyhow::bail!("{} variant(s) failed", failures);
    }
    info!("Ping/Pong Socket Benchmark completed successfully");
    Ok(())
}

/// Run one variant and hand its results to the manager.
///
/// Results of a variant whose measured round trips failed are kept, and the
/// failure is reported as an error afterwards.
fn run_variant(
    config: &BenchmarkConfig,
    variant: Variant,
    results_manager: &mut ResultsManager,
) -> Result<()> {
    let runner = BenchmarkRunner::new(config.clone(), variant);
    let results = runner.run()?;
    let first_error = results.errors.first().cloned();
    results_manager.add_results(results)?;

    match first_error {
        Some(e) => anyhow::bail!("{}", e),
        None => Ok(()),
    }
}
