//! LiftForge: A/B test analysis CLI for ad campaigns
//!
//! Parses arguments, runs the analysis pipeline and prints a short summary.

use anyhow::Result;
use clap::Parser;
use liftforge::report::{format_percent, format_scientific};
use liftforge::{pipeline, Args};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Route tracing output to stderr; `--verbose` lowers the default level to debug
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "liftforge=debug" } else { "liftforge=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    // Reject bad flags before touching the input
    let config = args.to_config()?;

    if args.verbose {
        println!("LiftForge - A/B Test Analysis");
        println!("=============================\n");
        println!("  Input file: {}", config.input.display());
        println!("  Output directory: {}", config.output_dir.display());
        println!(
            "  Arms: {} (treatment) vs {} (control)",
            config.arms.treatment, config.arms.control
        );
        println!("  Confidence: {}, alpha: {}\n", config.confidence, config.alpha);
    }

    // Run the full analysis
    let start_time = Instant::now();
    let outcome = pipeline::run(&config)?;
    let elapsed = start_time.elapsed();

    // Summary
    let report = &outcome.report;
    println!("✓ Data prepared: {} users", report.total_size);
    println!(
        "✓ Chi-square: {:.4} (p = {})",
        report.chi_square.statistic,
        format_scientific(report.chi_square.p_value, 4)
    );
    println!(
        "✓ Conversion: {} {} vs {} {}",
        config.arms.treatment,
        format_percent(report.interval.treatment_mean, 2),
        config.arms.control,
        format_percent(report.interval.control_mean, 2)
    );
    println!("✓ {} figures generated", outcome.figures.len());
    if args.verbose {
        for path in &outcome.figures {
            println!("  {}", path.display());
        }
    }

    println!("\n=== Analysis Complete ===");
    println!("Total processing time: {:.2}s", elapsed.as_secs_f64());
    println!("Report saved to: {}", outcome.report_path.display());

    Ok(())
}
