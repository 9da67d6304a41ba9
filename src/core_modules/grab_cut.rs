// THEORY:
// `GrabCut` is the in-crate energy-minimization engine. It alternates between
// two steps until the iteration budget runs out:
//
// 1.  **Colour modelling**: every pixel is assigned to the most likely component
//     of its region's mixture (background or foreground, according to the
//     current labels), then both mixtures are re-learned from those assignments.
// 2.  **Min-cut labelling**: the energy "colour cost + smoothness cost" is
//     encoded as an s/t graph (source = foreground) and cut. Pixels the user
//     never pinned (the probable labels) take the side of the cut they land on;
//     definite labels are held in place with a large terminal weight.
//
// The smoothness term links each pixel to its 8 neighbours with weight
// `gamma * exp(-beta * |colour difference|^2)`, divided by sqrt(2) on the
// diagonals. `beta` adapts to the image's average contrast so the same gamma
// works for flat and busy pictures.

use crate::core_modules::gmm::{Color, GaussianMixture, DEFAULT_COMPONENTS};
use crate::core_modules::graph_cut::FlowGraph;
use crate::core_modules::segmenter::{GrabCutLabel, LabelMask, SeedRect, SegmentationEngine};
use crate::error::EngineError;
use image::RgbImage;
use tracing::{debug, trace};

pub const GAMMA: f64 = 50.0;
/// Weight that pins a definite label to its terminal.
const HARD_CONSTRAINT: f64 = 9.0 * GAMMA;

/// Neighbour weights, one entry per pixel for each of the four "backward"
/// directions. The forward directions are the same links seen from the other
/// end.
struct Smoothness {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

fn color_distance_sq(a: &Color, b: &Color) -> f64 {
    (a - b).norm_squared()
}

impl Smoothness {
    fn beta(colors: &[Color], width: usize, height: usize) -> f64 {
        let mut total = 0.0;
        let mut pairs = 0usize;
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let color = &colors[i];
                if x > 0 {
                    total += color_distance_sq(color, &colors[i - 1]);
                    pairs += 1;
                }
                if y > 0 {
                    total += color_distance_sq(color, &colors[i - width]);
                    pairs += 1;
                    if x > 0 {
                        total += color_distance_sq(color, &colors[i - width - 1]);
                        pairs += 1;
                    }
                    if x + 1 < width {
                        total += color_distance_sq(color, &colors[i - width + 1]);
                        pairs += 1;
                    }
                }
            }
        }
        if total <= f64::EPSILON || pairs == 0 {
            0.0
        } else {
            1.0 / (2.0 * total / pairs as f64)
        }
    }

    fn compute(colors: &[Color], width: usize, height: usize, gamma: f64) -> Self {
        let beta = Self::beta(colors, width, height);
        let diagonal_gamma = gamma / std::f64::consts::SQRT_2;
        let n = width * height;
        let mut weights = Self {
            left: vec![0.0; n],
            up_left: vec![0.0; n],
            up: vec![0.0; n],
            up_right: vec![0.0; n],
        };
        let link = |g: f64, a: &Color, b: &Color| g * (-beta * color_distance_sq(a, b)).exp();

        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let color = &colors[i];
                if x > 0 {
                    weights.left[i] = link(gamma, color, &colors[i - 1]);
                }
                if y > 0 {
                    weights.up[i] = link(gamma, color, &colors[i - width]);
                    if x > 0 {
                        weights.up_left[i] = link(diagonal_gamma, color, &colors[i - width - 1]);
                    }
                    if x + 1 < width {
                        weights.up_right[i] = link(diagonal_gamma, color, &colors[i - width + 1]);
                    }
                }
            }
        }
        debug!(beta, "smoothness weights ready");
        weights
    }
}

/// Native GrabCut: GMM colour models plus Dinic min-cut.
#[derive(Debug, Clone, PartialEq)]
pub struct GrabCut {
    components: usize,
}

impl Default for GrabCut {
    fn default() -> Self {
        Self::new(DEFAULT_COMPONENTS)
    }
}

impl GrabCut {
    pub fn new(components: usize) -> Self {
        Self { components }
    }

    /// Refines `mask` in place for `iterations` rounds. Definite labels are
    /// kept; probable labels are re-decided every round.
    pub fn refine(&self, image: &RgbImage, mask: &mut LabelMask, iterations: u32) -> Result<(), EngineError> {
        let (width, height) = image.dimensions();
        if mask.dimensions() != (width, height) {
            return Err(EngineError::Backend(format!(
                "label mask is {}x{} but image is {width}x{height}",
                mask.width(),
                mask.height()
            )));
        }

        let colors: Vec<Color> = image
            .pixels()
            .map(|p| Color::new(f64::from(p.0[0]), f64::from(p.0[1]), f64::from(p.0[2])))
            .collect();

        // --- 1. Initial colour models from the seed labels ---
        let (background_samples, foreground_samples) = split_samples(&colors, mask);
        let mut background = GaussianMixture::fit(&background_samples, self.components, "background")?;
        let mut foreground = GaussianMixture::fit(&foreground_samples, self.components, "foreground")?;

        let smoothness = Smoothness::compute(&colors, width as usize, height as usize, GAMMA);

        for iteration in 0..iterations {
            // --- 2. Component assignment and re-learning ---
            let (background_samples, foreground_samples) = split_samples(&colors, mask);
            let background_labels: Vec<usize> = background_samples
                .iter()
                .map(|c| background.most_likely_component(c))
                .collect();
            let foreground_labels: Vec<usize> = foreground_samples
                .iter()
                .map(|c| foreground.most_likely_component(c))
                .collect();
            background.learn(&background_samples, &background_labels);
            foreground.learn(&foreground_samples, &foreground_labels);

            // --- 3. Min-cut ---
            let graph = self.solve(&colors, mask, &background, &foreground, &smoothness, width as usize);

            let mut flipped = 0usize;
            for (node, label) in mask.as_mut_slice().iter_mut().enumerate() {
                if label.is_definite() {
                    continue;
                }
                let next = if graph.in_source_segment(node) {
                    GrabCutLabel::ProbableForeground
                } else {
                    GrabCutLabel::ProbableBackground
                };
                if next != *label {
                    flipped += 1;
                    *label = next;
                }
            }
            trace!(iteration, flipped, "grabcut iteration done");
        }
        Ok(())
    }

    fn solve(
        &self,
        colors: &[Color],
        mask: &LabelMask,
        background: &GaussianMixture,
        foreground: &GaussianMixture,
        smoothness: &Smoothness,
        width: usize,
    ) -> FlowGraph {
        let lambda = HARD_CONSTRAINT;
        let mut graph = FlowGraph::new(colors.len());

        for (i, (color, label)) in colors.iter().zip(mask.iter()).enumerate() {
            let (source_weight, sink_weight) = match label {
                GrabCutLabel::ProbableBackground | GrabCutLabel::ProbableForeground => {
                    (background.cost(color), foreground.cost(color))
                }
                GrabCutLabel::Background => (0.0, lambda),
                GrabCutLabel::Foreground => (lambda, 0.0),
            };
            graph.add_terminal_weights(i, source_weight, sink_weight);

            let x = i % width;
            let has_row_above = i >= width;
            if x > 0 {
                graph.add_edge(i, i - 1, smoothness.left[i]);
            }
            if has_row_above {
                graph.add_edge(i, i - width, smoothness.up[i]);
                if x > 0 {
                    graph.add_edge(i, i - width - 1, smoothness.up_left[i]);
                }
                if x + 1 < width {
                    graph.add_edge(i, i - width + 1, smoothness.up_right[i]);
                }
            }
        }

        let flow = graph.max_flow();
        trace!(flow, "max flow");
        graph
    }
}

/// Colours of background-side and foreground-side pixels, in pixel order.
fn split_samples(colors: &[Color], mask: &LabelMask) -> (Vec<Color>, Vec<Color>) {
    let mut background = Vec::new();
    let mut foreground = Vec::new();
    for (color, label) in colors.iter().zip(mask.iter()) {
        if label.is_foreground() {
            foreground.push(*color);
        } else {
            background.push(*color);
        }
    }
    (background, foreground)
}

impl SegmentationEngine for GrabCut {
    fn name(&self) -> &'static str {
        "grabcut"
    }

    fn segment(&self, image: &RgbImage, seed: SeedRect, iterations: u32) -> Result<LabelMask, EngineError> {
        let (width, height) = image.dimensions();
        if !seed.fits(width, height) {
            return Err(seed.invalid_for(width, height));
        }
        let mut mask = seed.initial_mask(width, height);
        self.refine(image, &mut mask, iterations)?;
        Ok(mask)
    }
}
