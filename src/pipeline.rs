// THEORY:
// The `pipeline` module is the top-level API for the whole scoring engine. It
// strings the stages together in a fixed, linear order:
//
//   Load -> ValidateSize -> Grayscale -> EdgeExtract -> Segment -> Aggregate
//
// There is no branching back and no state carried between runs; each stage's
// output is moved or borrowed into the next. Two kinds of trouble can happen
// along the way and they are kept apart on purpose:
//
// - Loading problems are *fatal*: `run` returns `Err(FatalError)` and nothing is
//   scored.
// - Segmentation problems (and unusable blur strengths) are *recoverable*: the
//   stage substitutes a safe fallback, the run completes, and the issue is
//   listed on the `PipelineOutcome` next to the scores.
//
// Progress is announced through the `ProgressReporter` trait so the command
// line can print it while tests and library callers can capture or ignore it.

use crate::core_modules::edge_extractor::{EdgeConfig, EdgeMap, MultiScaleEdgeExtractor};
use crate::core_modules::image_loader::{self, LoadedImage, LoaderConfig};
use crate::core_modules::score_aggregator::{self, ScoreReport, Scores};
use crate::core_modules::segmenter::{ForegroundMask, ForegroundSegmenter, SegmentationEngine, SegmenterConfig};
use crate::error::{AggregationError, FatalError, LoadError, RecoverableIssue};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, info_span, warn};

#[cfg(not(feature = "opencv"))]
pub type DefaultEngine = crate::core_modules::grab_cut::GrabCut;
#[cfg(feature = "opencv")]
pub type DefaultEngine = crate::core_modules::opencv_engine::OpenCvGrabCut;

/// Configuration for the ScoringPipeline. `Default` is the stock
/// tuning: 100 px minimum side, sigmas 1/2/3, Canny 50/150, 3x3 closing, 10%
/// seed inset, 5 GrabCut iterations with 5-component colour models.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub edges: EdgeConfig,
    pub segmenter: SegmenterConfig,
}

/// The step a progress line belongs to. Grayscale conversion runs between
/// `Load` and `EdgeExtract` but prints nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ValidateSize,
    Load,
    EdgeExtract,
    Segment,
    Aggregate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ValidateSize => "validate-size",
            Stage::Load => "load",
            Stage::EdgeExtract => "edge-extract",
            Stage::Segment => "segment",
            Stage::Aggregate => "aggregate",
        };
        f.write_str(name)
    }
}

/// Receives human-readable progress lines.
pub trait ProgressReporter {
    fn stage(&mut self, stage: Stage, message: &str);
}

/// Prints progress lines to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReporter;

impl ProgressReporter for StdoutReporter {
    fn stage(&mut self, _stage: Stage, message: &str) {
        println!("{message}");
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn stage(&mut self, _stage: Stage, _message: &str) {}
}

/// Collects progress, mostly for tests.
impl ProgressReporter for Vec<(Stage, String)> {
    fn stage(&mut self, stage: Stage, message: &str) {
        self.push((stage, message.to_owned()));
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Dimensions as decoded.
    pub original_dimensions: (u32, u32),
    /// Dimensions the stages worked on.
    pub working_dimensions: (u32, u32),
    pub edges: EdgeMap,
    pub report: ScoreReport,
    pub issues: Vec<RecoverableIssue>,
}

impl PipelineOutcome {
    pub fn scores(&self) -> Scores {
        self.report.scores
    }

    /// Whether any stage fell back to a degraded result.
    pub fn is_degraded(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// The main, top-level struct for the scoring engine.
pub struct ScoringPipeline<E = DefaultEngine> {
    config: PipelineConfig,
    segmenter: ForegroundSegmenter<E>,
}

#[cfg(not(feature = "opencv"))]
fn default_engine(config: &SegmenterConfig) -> DefaultEngine {
    crate::core_modules::grab_cut::GrabCut::new(config.components)
}

#[cfg(feature = "opencv")]
fn default_engine(_config: &SegmenterConfig) -> DefaultEngine {
    crate::core_modules::opencv_engine::OpenCvGrabCut
}

impl ScoringPipeline<DefaultEngine> {
    pub fn new(config: PipelineConfig) -> Self {
        let engine = default_engine(&config.segmenter);
        Self::with_engine(config, engine)
    }
}

impl Default for ScoringPipeline<DefaultEngine> {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl<E: SegmentationEngine> ScoringPipeline<E> {
    pub fn with_engine(config: PipelineConfig, engine: E) -> Self {
        let segmenter = ForegroundSegmenter::new(engine, config.segmenter.clone());
        Self { config, segmenter }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stage 1 + 2: decode and size-correct.
    pub fn load(&self, path: &Path) -> Result<LoadedImage, LoadError> {
        image_loader::load(path, &self.config.loader)
    }

    /// Stage 3 + 4: grayscale and multi-scale edges.
    pub fn edge_map(&self, image: &LoadedImage) -> EdgeMap {
        MultiScaleEdgeExtractor::new(&self.config.edges).extract(&image.to_grayscale())
    }

    /// Stage 5: foreground mask (0/255), never failing.
    pub fn segment(&self, image: &RgbImage) -> (ForegroundMask, Option<RecoverableIssue>) {
        let segmentation = self.segmenter.segment(image);
        (segmentation.mask, segmentation.issue.map(RecoverableIssue::from))
    }

    /// Stage 6: scores.
    pub fn aggregate(&self, foreground: &ForegroundMask, edges: &EdgeMap) -> Result<ScoreReport, AggregationError> {
        score_aggregator::aggregate(foreground, edges)
    }

    /// Runs every stage on the image at `path`.
    pub fn run(&self, path: impl AsRef<Path>, reporter: &mut dyn ProgressReporter) -> Result<PipelineOutcome, FatalError> {
        let path = path.as_ref();
        let _span = info_span!("run", path = %path.display()).entered();

        // --- Stage 1: Load ---
        let loaded = self.load(path)?;
        self.run_loaded(loaded, reporter)
    }

    /// Runs every stage after loading on an already-decoded image.
    pub fn run_image(&self, image: RgbImage, reporter: &mut dyn ProgressReporter) -> Result<PipelineOutcome, FatalError> {
        let original_dimensions = image.dimensions();
        if original_dimensions.0 == 0 || original_dimensions.1 == 0 {
            return Err(FatalError::EmptyImage);
        }
        let image = image_loader::ensure_min_size(image, self.config.loader.min_dimension);
        self.run_loaded(
            LoadedImage {
                image,
                original_dimensions,
            },
            reporter,
        )
    }

    fn run_loaded(&self, loaded: LoadedImage, reporter: &mut dyn ProgressReporter) -> Result<PipelineOutcome, FatalError> {
        let mut issues: Vec<RecoverableIssue> = Vec::new();

        // --- Stage 2: ValidateSize ---
        // The resize notice comes first and the load line reports the size
        // the remaining stages work on.
        if loaded.was_resized() {
            reporter.stage(Stage::ValidateSize, "Resizing image to avoid failure with GrabCut...");
        }
        let (width, height) = loaded.dimensions();
        reporter.stage(Stage::Load, &format!("Loaded image with size: {width} x {height}"));
        info!(width, height, original = ?loaded.original_dimensions, "image ready");

        // --- Stage 3 + 4: Grayscale + EdgeExtract ---
        for sigma in self.config.edges.invalid_sigmas() {
            issues.push(RecoverableIssue::InvalidSigma(sigma));
        }
        reporter.stage(Stage::EdgeExtract, "Applying multi-scale Canny edge detection...");
        let edges = self.edge_map(&loaded);

        // --- Stage 5: Segment ---
        reporter.stage(Stage::Segment, "Computing foreground and background probabilities...");
        let (foreground, issue) = self.segment(&loaded.image);
        if let Some(issue) = issue {
            warn!("{issue}");
            issues.push(issue);
        }

        // --- Stage 6: Aggregate ---
        let report = self.aggregate(&foreground, &edges)?;
        reporter.stage(Stage::Aggregate, "Calculating foreground and background scores... done!");
        reporter.stage(Stage::Aggregate, "Calculating edge-weighted foreground score... done!");

        Ok(PipelineOutcome {
            original_dimensions: loaded.original_dimensions,
            working_dimensions: (width, height),
            edges,
            report,
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_stock_tuning() {
        let config = PipelineConfig::default();
        assert_eq!(config.loader.min_dimension, 100);
        assert_eq!(config.edges.sigmas, vec![1.0, 2.0, 3.0]);
        assert_eq!((config.edges.low_threshold, config.edges.high_threshold), (50.0, 150.0));
        assert_eq!(config.edges.closing_radius, 1);
        assert_eq!(config.segmenter.border_divisor, 10);
        assert_eq!(config.segmenter.iterations, 5);
        assert_eq!(config.segmenter.components, 5);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "segmenter": { "iterations": 2 }, "edges": { "sigmas": [1.5] } }"#)
                .expect("valid config json");
        assert_eq!(config.segmenter.iterations, 2);
        assert_eq!(config.segmenter.border_divisor, 10);
        assert_eq!(config.edges.sigmas, vec![1.5]);
        assert_eq!(config.edges.high_threshold, 150.0);
        assert_eq!(config.loader, LoaderConfig::default());
    }

    #[test]
    fn progress_lines_match_the_command_line_tool() {
        let image = RgbImage::from_pixel(30, 40, image::Rgb([10, 10, 10]));
        let mut progress: Vec<(Stage, String)> = Vec::new();
        let outcome = ScoringPipeline::default()
            .run_image(image, &mut progress)
            .expect("in-memory run");

        let lines: Vec<(Stage, &str)> = progress.iter().map(|(stage, line)| (*stage, line.as_str())).collect();
        assert_eq!(
            lines,
            vec![
                (Stage::ValidateSize, "Resizing image to avoid failure with GrabCut..."),
                (Stage::Load, "Loaded image with size: 100 x 100"),
                (Stage::EdgeExtract, "Applying multi-scale Canny edge detection..."),
                (Stage::Segment, "Computing foreground and background probabilities..."),
                (Stage::Aggregate, "Calculating foreground and background scores... done!"),
                (Stage::Aggregate, "Calculating edge-weighted foreground score... done!"),
            ]
        );
        assert_eq!(outcome.original_dimensions, (30, 40));
        assert_eq!(outcome.working_dimensions, (100, 100));
    }

    #[test]
    fn large_images_skip_the_resize_notice() {
        let image = RgbImage::from_pixel(120, 101, image::Rgb([10, 10, 10]));
        let mut progress: Vec<(Stage, String)> = Vec::new();
        ScoringPipeline::default()
            .run_image(image, &mut progress)
            .expect("in-memory run");
        assert_eq!(progress[0], (Stage::Load, "Loaded image with size: 120 x 101".to_owned()));
        assert!(progress.iter().all(|(stage, _)| *stage != Stage::ValidateSize));
    }

    #[test]
    fn empty_in_memory_image_is_fatal() {
        let result = ScoringPipeline::default().run_image(RgbImage::new(0, 7), &mut SilentReporter);
        assert!(matches!(result, Err(FatalError::EmptyImage)));
    }

    #[test]
    fn invalid_sigmas_are_reported_not_fatal() {
        let mut config = PipelineConfig::default();
        config.edges.sigmas = vec![-2.0, 1.0];
        let image = RgbImage::from_pixel(100, 100, image::Rgb([60, 70, 80]));
        let outcome = ScoringPipeline::new(config)
            .run_image(image, &mut SilentReporter)
            .expect("in-memory run");
        assert!(outcome.issues.contains(&RecoverableIssue::InvalidSigma(-2.0)));
    }
}
