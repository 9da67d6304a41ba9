// Command-line runner: `foreground_probe <image_path>`.
//
// Progress and scores go to stdout. Diagnostics go to stderr through
// `tracing` (default level `warn`, override with `RUST_LOG`). A usage error or
// an image that cannot be loaded exits with status 255; recoverable
// segmentation trouble is logged and the run still exits 0.

use anyhow::Context;
use foreground_probe::FatalError;
use foreground_probe::pipeline::{PipelineConfig, ScoringPipeline, StdoutReporter};
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const FAILURE_STATUS: u8 = 255;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(image_path: &str) -> anyhow::Result<()> {
    let pipeline = ScoringPipeline::new(PipelineConfig::default());
    let outcome = pipeline
        .run(image_path, &mut StdoutReporter)
        .with_context(|| format!("failed to score `{image_path}`"))?;

    let scores = outcome.scores();
    println!("Foreground Probability Score: {}", scores.foreground_score);
    println!("Background Probability Score: {}", scores.background_score);
    println!("Edge-Weighted Foreground Score: {}", scores.edge_weighted_foreground);
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("Usage: foreground_probe <image_path>");
        return ExitCode::from(FAILURE_STATUS);
    }

    match run(&args[1]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err.downcast_ref::<FatalError>(), Some(FatalError::Load(_))) {
                eprintln!("Could not open or find the image!");
            }
            eprintln!("error: {err:#}");
            ExitCode::from(FAILURE_STATUS)
        }
    }
}
