// THEORY:
// Errors are split by severity, not by module. A *fatal* error means the run has
// no input worth scoring (the file is missing, unreadable, or decodes to
// nothing) and the caller must stop. A *recoverable* issue means a stage could
// not do its job but the pipeline substituted a safe fallback and carried on;
// those are collected on the outcome so the caller sees them next to the scores
// instead of having to scrape logs.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning a path into pixels. Always fatal.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read image file `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode image file `{path}`")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image file `{path}` decoded to an empty image")]
    EmptyImage { path: PathBuf },
}

/// Failures raised inside a segmentation engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("not enough {region} samples to fit the colour model: {found} < {required}")]
    NotEnoughSamples {
        region: &'static str,
        found: usize,
        required: usize,
    },
    #[error("seed rectangle {width}x{height}+{x}+{y} does not fit a {image_width}x{image_height} image")]
    InvalidRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("segmentation backend failed: {0}")]
    Backend(String),
}

/// Failures while combining the foreground mask with the edge map.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregationError {
    #[error("foreground mask is {mask_width}x{mask_height} but edge map is {edge_width}x{edge_height}")]
    DimensionMismatch {
        mask_width: u32,
        mask_height: u32,
        edge_width: u32,
        edge_height: u32,
    },
}

/// Why the segmenter fell back to an all-background mask.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SegmentationIssue {
    #[error("seed rectangle is too small ({width}x{height})")]
    SeedTooSmall { width: u32, height: u32 },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A degraded-but-completed stage. The run still produces scores.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecoverableIssue {
    #[error("segmentation degraded to all-background: {0}")]
    Segmentation(#[from] SegmentationIssue),
    #[error("ignored blur strength {0}: must be finite and positive")]
    InvalidSigma(f64),
}

/// A run that cannot produce scores at all.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("could not open or find the image")]
    Load(#[from] LoadError),
    #[error("image has no pixels")]
    EmptyImage,
    #[error("could not aggregate scores")]
    Aggregation(#[from] AggregationError),
}
