mod args;
mod dataset;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mailprobe::{CancelFlag, DefaultVerifier, RowRange, run_batch};

use args::Cli;
use dataset::{Dataset, output_paths, write_results};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.to_config()?;

    let dataset = Dataset::load(&cli.input)?;
    let candidates = dataset.candidates(&cli.column)?;
    let end_row = cli.end_row.unwrap_or(candidates.len());
    let range = RowRange::new(cli.start_row, end_row);

    let verifier = DefaultVerifier::from_config(config);
    let cancel = CancelFlag::new();
    let report = run_batch(&candidates, range, &verifier, &cancel);

    let (valid_path, invalid_path) =
        output_paths(&cli.input, cli.out_dir.as_deref(), cli.start_row, end_row);
    write_results(&valid_path, &dataset.headers, &report.valid)?;
    write_results(&invalid_path, &dataset.headers, &report.invalid)?;

    if cli.json {
        let summary = serde_json::json!({
            "valid": report.valid,
            "invalid": report.invalid,
            "elapsed_secs": report.elapsed.as_secs_f64(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for r in &report.valid {
            println!("[OK]      {}", r.candidate.address);
        }
        for r in &report.invalid {
            println!("[{}] {}", r.status_label().to_uppercase(), r.candidate.address);
        }
        println!(
            "{} candidates in {:.2}s -> {} valid ({}), {} invalid/unknown ({})",
            report.total(),
            report.elapsed.as_secs_f64(),
            report.valid.len(),
            valid_path.display(),
            report.invalid.len(),
            invalid_path.display(),
        );
    }

    // exit codes: 0 all deliverable, 2 at least one invalid/unknown, 1 fatal
    if !report.invalid.is_empty() {
        std::process::exit(2);
    }
    Ok(())
}
