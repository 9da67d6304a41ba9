// THEORY:
// The `ForegroundSegmenter` is the fail-safe wrapper around whichever
// energy-minimization engine is plugged in. It owns the three decisions the
// engines do not make for themselves:
//
// 1.  **Seeding**: the hint region is a centred rectangle inset from every side
//     by a fixed fraction of the smaller image dimension. Everything outside it
//     is definite background, everything inside is probably foreground.
// 2.  **Guarding**: engines need a non-degenerate seed, so a rectangle whose
//     width or height is one pixel or less is refused up front.
// 3.  **Degrading**: any refusal or engine failure is logged and turned into an
//     all-background mask. Segmentation trouble never stops the pipeline; it
//     only means "no foreground detected", and the reason travels back to the
//     caller as a `SegmentationIssue`.
//
// The output is the binary foreground indicator in the 0/255 scale. Turning it
// into a probability is the score aggregator's job.

use crate::core_modules::grid::Grid;
use crate::error::{EngineError, SegmentationIssue};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const DEFAULT_BORDER_DIVISOR: u32 = 10;
pub const DEFAULT_ITERATIONS: u32 = 5;
pub const FOREGROUND_VALUE: f64 = 255.0;

/// Per-pixel classification produced by an engine. Discriminants follow the
/// usual GrabCut numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GrabCutLabel {
    Background = 0,
    Foreground = 1,
    ProbableBackground = 2,
    ProbableForeground = 3,
}

impl GrabCutLabel {
    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    /// Hard labels are never revisited by the engine.
    pub fn is_definite(self) -> bool {
        matches!(self, Self::Background | Self::Foreground)
    }
}

impl TryFrom<u8> for GrabCutLabel {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Background),
            1 => Ok(Self::Foreground),
            2 => Ok(Self::ProbableBackground),
            3 => Ok(Self::ProbableForeground),
            other => Err(other),
        }
    }
}

pub type LabelMask = Grid<GrabCutLabel>;

/// The 0/255 foreground indicator, promoted to `f64`.
pub type ForegroundMask = Grid<f64>;

/// Axis-aligned hint rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SeedRect {
    /// Centred rectangle inset by `min(width, height) / border_divisor` on
    /// every side. Sides that would go negative collapse to zero.
    pub fn inset(image_width: u32, image_height: u32, border_divisor: u32) -> Self {
        let border = image_width.min(image_height) / border_divisor.max(1);
        Self {
            x: border,
            y: border,
            width: image_width.saturating_sub(2 * border),
            height: image_height.saturating_sub(2 * border),
        }
    }

    /// Engines refuse seeds that are a line or a point.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 1 || self.height <= 1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }

    pub fn fits(&self, image_width: u32, image_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|right| right <= image_width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= image_height)
    }

    /// Outside is definite background, inside probable foreground.
    pub fn initial_mask(&self, image_width: u32, image_height: u32) -> LabelMask {
        Grid::from_fn(image_width, image_height, |x, y| {
            if self.contains(x, y) {
                GrabCutLabel::ProbableForeground
            } else {
                GrabCutLabel::Background
            }
        })
    }

    pub(crate) fn invalid_for(&self, image_width: u32, image_height: u32) -> EngineError {
        EngineError::InvalidRect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            image_width,
            image_height,
        }
    }
}

/// An iterative foreground/background segmentation backend seeded by a
/// rectangle.
pub trait SegmentationEngine {
    fn name(&self) -> &'static str;

    fn segment(&self, image: &RgbImage, seed: SeedRect, iterations: u32) -> Result<LabelMask, EngineError>;
}

impl<E: SegmentationEngine + ?Sized> SegmentationEngine for &E {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn segment(&self, image: &RgbImage, seed: SeedRect, iterations: u32) -> Result<LabelMask, EngineError> {
        (**self).segment(image, seed, iterations)
    }
}

impl<E: SegmentationEngine + ?Sized> SegmentationEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn segment(&self, image: &RgbImage, seed: SeedRect, iterations: u32) -> Result<LabelMask, EngineError> {
        (**self).segment(image, seed, iterations)
    }
}

/// Tunables for the segmentation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// The seed is inset by `min(width, height) / border_divisor` (10 = 10%).
    pub border_divisor: u32,
    /// Energy-minimization rounds.
    pub iterations: u32,
    /// Gaussian components per colour model.
    pub components: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            border_divisor: DEFAULT_BORDER_DIVISOR,
            iterations: DEFAULT_ITERATIONS,
            components: crate::core_modules::gmm::DEFAULT_COMPONENTS,
        }
    }
}

/// Result of one segmentation pass.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: ForegroundMask,
    /// Set when the mask is the all-background fallback.
    pub issue: Option<SegmentationIssue>,
}

/// OR of the two foreground labels, as 0.0 / 255.0.
pub fn foreground_indicator(labels: &LabelMask) -> ForegroundMask {
    labels.map(|label| if label.is_foreground() { FOREGROUND_VALUE } else { 0.0 })
}

pub struct ForegroundSegmenter<E> {
    engine: E,
    config: SegmenterConfig,
}

impl<E: SegmentationEngine> ForegroundSegmenter<E> {
    pub fn new(engine: E, config: SegmenterConfig) -> Self {
        Self { engine, config }
    }

    pub fn seed_for(&self, image: &RgbImage) -> SeedRect {
        let (width, height) = image.dimensions();
        SeedRect::inset(width, height, self.config.border_divisor)
    }

    /// Never fails: refusals and engine errors become an all-background mask.
    pub fn segment(&self, image: &RgbImage) -> Segmentation {
        let (width, height) = image.dimensions();
        let seed = self.seed_for(image);

        if seed.is_degenerate() {
            error!(seed.width, seed.height, "Bounding box is too small!");
            return Self::fallback(
                width,
                height,
                SegmentationIssue::SeedTooSmall {
                    width: seed.width,
                    height: seed.height,
                },
            );
        }

        debug!(engine = self.engine.name(), ?seed, iterations = self.config.iterations, "segmenting");
        match self.engine.segment(image, seed, self.config.iterations) {
            Ok(labels) if labels.dimensions() == (width, height) => Segmentation {
                mask: foreground_indicator(&labels),
                issue: None,
            },
            Ok(labels) => {
                let (got_width, got_height) = labels.dimensions();
                let err = EngineError::Backend(format!(
                    "engine returned a {got_width}x{got_height} mask for a {width}x{height} image"
                ));
                error!(engine = self.engine.name(), "{err}");
                Self::fallback(width, height, err.into())
            }
            Err(err) => {
                error!(engine = self.engine.name(), "segmentation failed: {err}");
                Self::fallback(width, height, err.into())
            }
        }
    }

    fn fallback(width: u32, height: u32, issue: SegmentationIssue) -> Segmentation {
        Segmentation {
            mask: Grid::filled(width, height, 0.0),
            issue: Some(issue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::cell::Cell;

    /// Labels the seed rectangle foreground and counts calls.
    struct RectEngine {
        calls: Cell<u32>,
    }

    impl SegmentationEngine for RectEngine {
        fn name(&self) -> &'static str {
            "rect"
        }

        fn segment(&self, image: &RgbImage, seed: SeedRect, _iterations: u32) -> Result<LabelMask, EngineError> {
            self.calls.set(self.calls.get() + 1);
            let (w, h) = image.dimensions();
            Ok(Grid::from_fn(w, h, |x, y| {
                if seed.contains(x, y) {
                    GrabCutLabel::ProbableForeground
                } else {
                    GrabCutLabel::ProbableBackground
                }
            }))
        }
    }

    struct FailingEngine;

    impl SegmentationEngine for FailingEngine {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn segment(&self, _image: &RgbImage, _seed: SeedRect, _iterations: u32) -> Result<LabelMask, EngineError> {
            Err(EngineError::Backend("model diverged".into()))
        }
    }

    #[test]
    fn seed_is_inset_by_a_tenth_of_the_short_side() {
        let seed = SeedRect::inset(200, 100, 10);
        assert_eq!(
            seed,
            SeedRect {
                x: 10,
                y: 10,
                width: 180,
                height: 80
            }
        );
        assert!(seed.fits(200, 100));
        assert!(seed.contains(10, 10));
        assert!(!seed.contains(190, 50));
    }

    #[test]
    fn tiny_images_give_degenerate_seeds() {
        assert!(SeedRect::inset(1, 50, 10).is_degenerate());
        assert!(!SeedRect::inset(3, 3, 10).is_degenerate());
        assert!(SeedRect::inset(0, 0, 10).is_degenerate());
    }

    #[test]
    fn labels_round_trip_through_raw_values() {
        for raw in 0u8..4 {
            let label = GrabCutLabel::try_from(raw).expect("valid label");
            assert_eq!(label as u8, raw);
        }
        assert_eq!(GrabCutLabel::try_from(7), Err(7));
    }

    #[test]
    fn indicator_ors_both_foreground_labels() {
        let labels = Grid::from_vec(
            4,
            1,
            vec![
                GrabCutLabel::Background,
                GrabCutLabel::Foreground,
                GrabCutLabel::ProbableBackground,
                GrabCutLabel::ProbableForeground,
            ],
        )
        .expect("4 labels");
        assert_eq!(foreground_indicator(&labels).as_slice(), &[0.0, 255.0, 0.0, 255.0]);
    }

    #[test]
    fn successful_engine_output_is_on_the_255_scale() {
        let engine = RectEngine { calls: Cell::new(0) };
        let segmenter = ForegroundSegmenter::new(&engine, SegmenterConfig::default());
        let image = RgbImage::from_pixel(100, 100, Rgb([9, 9, 9]));

        let result = segmenter.segment(&image);
        assert!(result.issue.is_none());
        assert_eq!(engine.calls.get(), 1);
        assert_eq!(result.mask.get(50, 50), Some(&255.0));
        assert_eq!(result.mask.get(0, 0), Some(&0.0));
    }

    #[test]
    fn degenerate_seed_skips_the_engine() {
        let engine = RectEngine { calls: Cell::new(0) };
        let segmenter = ForegroundSegmenter::new(&engine, SegmenterConfig::default());
        let image = RgbImage::from_pixel(1, 30, Rgb([9, 9, 9]));

        let result = segmenter.segment(&image);
        assert_eq!(engine.calls.get(), 0);
        assert!(matches!(result.issue, Some(SegmentationIssue::SeedTooSmall { width: 1, .. })));
        assert_eq!(result.mask.dimensions(), (1, 30));
        assert!(result.mask.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn engine_failure_degrades_to_background() {
        let segmenter = ForegroundSegmenter::new(FailingEngine, SegmenterConfig::default());
        let image = RgbImage::from_pixel(120, 100, Rgb([200, 10, 10]));

        let result = segmenter.segment(&image);
        assert_eq!(
            result.issue,
            Some(SegmentationIssue::Engine(EngineError::Backend("model diverged".into())))
        );
        assert_eq!(result.mask.dimensions(), (120, 100));
        assert!(result.mask.iter().all(|v| *v == 0.0));
    }
}
