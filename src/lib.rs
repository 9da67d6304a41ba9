// THEORY:
// This file is the entry point for the `foreground_probe` library crate. The
// public surface is the `ScoringPipeline` and its data structures
// (`PipelineConfig`, `PipelineOutcome`, `Scores`, the error types), which is
// everything the command-line runner needs. The individual stages live in
// `core_modules` and stay public so they can be reused or driven one at a time:
// loading, multi-scale edges, GrabCut segmentation and score aggregation.

pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use core_modules::score_aggregator::Scores;
pub use error::{FatalError, RecoverableIssue};
pub use pipeline::{PipelineConfig, PipelineOutcome, ScoringPipeline};
