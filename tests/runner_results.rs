use anyhow::Result;
use clap::Parser;
use pingpong_bench::{cli::Args, BenchmarkConfig, BenchmarkRunner, ResultsManager, Variant};
use tempfile::tempdir;

/// Every variant runs end to end and lands in the results file.
#[test]
fn all_variants_write_results_file() -> Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("results.json");
    let args = Args::parse_from([
        "pingpong-bench",
        "-m",
        "all",
        "-i",
        "200",
        "-w",
        "20",
        "-o",
        output.to_str().unwrap(),
    ]);

    let config = BenchmarkConfig::from_args(&args)?;
    let mut manager = ResultsManager::new(&args.output_file)?;
    for variant in Variant::expand_all(args.variants.clone()) {
        let results = BenchmarkRunner::new(config.clone(), variant).run()?;
        assert!(results.is_success(), "{:?}", results.errors);
        assert_eq!(results.summary.total_round_trips, 200);
        assert_eq!(results.run_id, config.run_id);
        manager.add_results(results)?;
    }
    manager.finalize()?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output)?)?;
    assert_eq!(json["metadata"]["total_tests"], 4);
    assert_eq!(json["results"].as_array().unwrap().len(), 4);
    assert_eq!(json["summary"]["total_round_trips"], 800);
    assert!(json["summary"]["lowest_latency_variant"].is_string());
    assert_eq!(json["results"][3]["variant"], "lpf");
    Ok(())
}
