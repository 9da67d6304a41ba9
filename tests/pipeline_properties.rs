mod common;

use common::synthetic_image::{disc_on_background, write_png};
use foreground_probe::RecoverableIssue;
use foreground_probe::core_modules::segmenter::{LabelMask, SeedRect, SegmentationEngine};
use foreground_probe::error::{EngineError, SegmentationIssue};
use foreground_probe::pipeline::{PipelineConfig, ScoringPipeline, SilentReporter};
use image::{Rgb, RgbImage};

#[test]
fn disc_image_scores_are_consistent() {
    let path = write_png(&disc_on_background(160, 40.0), "disc");
    let outcome = ScoringPipeline::default()
        .run(&path, &mut SilentReporter)
        .expect("disc image scores");
    let _ = std::fs::remove_file(&path);

    let scores = outcome.scores();
    assert!(outcome.issues.is_empty(), "unexpected issues: {:?}", outcome.issues);
    assert_eq!(scores.background_score, 1.0 - scores.foreground_score);
    assert!((0.0..=1.0).contains(&scores.foreground_score));
    assert!((0.0..=1.0).contains(&scores.background_score));
    assert!((0.0..=1.0).contains(&scores.edge_weighted_foreground));

    // The disc covers about pi * 40^2 / 160^2 of the frame.
    let disc_fraction = std::f64::consts::PI * 40.0 * 40.0 / (160.0 * 160.0);
    assert!(
        (scores.foreground_score - disc_fraction).abs() < 0.1,
        "foreground {} vs disc {}",
        scores.foreground_score,
        disc_fraction
    );
    assert!(outcome.edges.edge_count() > 0);
    assert!(scores.edge_weighted_foreground > 0.0);
}

#[test]
fn large_images_keep_their_resolution() {
    let outcome = ScoringPipeline::default()
        .run_image(disc_on_background(128, 30.0), &mut SilentReporter)
        .expect("in-memory run");
    assert_eq!(outcome.original_dimensions, (128, 128));
    assert_eq!(outcome.working_dimensions, (128, 128));
    assert_eq!(outcome.report.foreground_probability.dimensions(), (128, 128));
}

#[test]
fn undersized_images_are_upsampled_to_exactly_100() {
    for (width, height) in [(40, 40), (99, 300), (300, 12)] {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let outcome = ScoringPipeline::default()
            .run_image(image, &mut SilentReporter)
            .expect("in-memory run");
        assert_eq!(outcome.working_dimensions, (100, 100));
        assert_eq!(outcome.edges.dimensions(), (100, 100));
    }
}

#[test]
fn flat_image_has_no_edges_and_no_foreground() {
    let outcome = ScoringPipeline::default()
        .run_image(RgbImage::from_pixel(120, 120, Rgb([40, 90, 200])), &mut SilentReporter)
        .expect("in-memory run");
    let scores = outcome.scores();
    assert_eq!(outcome.edges.edge_count(), 0);
    assert_eq!(scores.edge_weighted_foreground, 0.0);
    assert_eq!(scores.foreground_score, 0.0);
    assert_eq!(scores.background_score, 1.0);
}

#[test]
fn two_by_two_input_runs_to_completion() {
    let uniform = RgbImage::from_pixel(2, 2, Rgb([12, 200, 99]));
    let outcome = ScoringPipeline::default()
        .run_image(uniform, &mut SilentReporter)
        .expect("2x2 run");
    assert_eq!(outcome.working_dimensions, (100, 100));
    assert_eq!(outcome.scores().foreground_score, 0.0);
    assert_eq!(outcome.scores().background_score, 1.0);

    let mut checker = RgbImage::new(2, 2);
    checker.put_pixel(0, 0, Rgb([255, 255, 255]));
    checker.put_pixel(1, 1, Rgb([255, 255, 255]));
    let scores = ScoringPipeline::default()
        .run_image(checker, &mut SilentReporter)
        .expect("2x2 run")
        .scores();
    assert_eq!(scores.background_score, 1.0 - scores.foreground_score);
    assert!((0.0..=1.0).contains(&scores.edge_weighted_foreground));
}

#[test]
fn degenerate_seed_without_upsampling_degrades_gracefully() {
    let mut config = PipelineConfig::default();
    config.loader.min_dimension = 1;
    config.edges.sigmas = Vec::new();
    let outcome = ScoringPipeline::new(config)
        .run_image(RgbImage::from_pixel(1, 9, Rgb([5, 5, 5])), &mut SilentReporter)
        .expect("degenerate run");
    assert_eq!(outcome.scores().foreground_score, 0.0);
    assert!(matches!(
        outcome.issues.as_slice(),
        [RecoverableIssue::Segmentation(SegmentationIssue::SeedTooSmall { .. })]
    ));
}

struct BrokenEngine;

impl SegmentationEngine for BrokenEngine {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn segment(&self, _image: &RgbImage, _seed: SeedRect, _iterations: u32) -> Result<LabelMask, EngineError> {
        Err(EngineError::Backend("internal assertion".into()))
    }
}

#[test]
fn engine_errors_become_zero_foreground() {
    let pipeline = ScoringPipeline::with_engine(PipelineConfig::default(), BrokenEngine);
    let outcome = pipeline
        .run_image(disc_on_background(120, 30.0), &mut SilentReporter)
        .expect("broken engine still scores");
    assert!(outcome.is_degraded());
    assert_eq!(outcome.scores().foreground_score, 0.0);
    assert_eq!(outcome.scores().background_score, 1.0);
    assert_eq!(outcome.scores().edge_weighted_foreground, 0.0);
    assert!(outcome.edges.edge_count() > 0);
}

#[test]
fn identical_input_gives_identical_scores() {
    let path = write_png(&disc_on_background(110, 25.0), "determinism");
    let pipeline = ScoringPipeline::default();
    let first = pipeline.run(&path, &mut SilentReporter).expect("first run");
    let second = pipeline.run(&path, &mut SilentReporter).expect("second run");
    let _ = std::fs::remove_file(&path);

    let (a, b) = (first.scores(), second.scores());
    assert_eq!(a.foreground_score.to_bits(), b.foreground_score.to_bits());
    assert_eq!(a.background_score.to_bits(), b.background_score.to_bits());
    assert_eq!(a.edge_weighted_foreground.to_bits(), b.edge_weighted_foreground.to_bits());
    assert_eq!(first.report.foreground_probability, second.report.foreground_probability);
}

#[test]
fn missing_file_is_fatal() {
    let err = ScoringPipeline::default()
        .run("/no/such/dir/missing.png", &mut SilentReporter)
        .unwrap_err();
    assert!(matches!(err, foreground_probe::FatalError::Load(_)), "got {err:?}");
}
