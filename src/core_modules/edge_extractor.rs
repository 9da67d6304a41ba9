// THEORY:
// The multi-scale edge extractor looks at the grayscale image through several
// blur strengths and keeps every edge that shows up at *any* of them. Fine
// scales catch texture and thin contours, coarse scales catch soft silhouette
// boundaries; the union favours recall over precision.
//
// Algorithm, per blur strength sigma:
// 1.  **Kernel sizing**: `max(3, round(2 * sigma + 1))`, forced odd so the
//     kernel has a centre tap.
// 2.  **Smoothing**: a normalized 1-D Gaussian of that size, applied separably.
// 3.  **Detection**: Canny run directly on that smoothed image, with no second
//     blur. Sobel gradients, L1 magnitude `|gx| + |gy|`, non-maximum
//     suppression along the quantized gradient direction, then 8-connected
//     hysteresis: a local maximum above `high` seeds an edge, local maxima
//     above `low` join it when they touch one.
// 4.  **Accumulation**: pixel-wise maximum into the combined map. Edge maps are
//     strictly 0/255 so this is a logical OR.
// Finally a single morphological closing with a 3x3 square bridges one-pixel
// gaps left between scales. Both the union and the closing are monotone, so an
// image whose per-scale edges are a subset of another's can never end up with
// more combined edges.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::close;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_SIGMAS: [f64; 3] = [1.0, 2.0, 3.0];
pub const DEFAULT_LOW_THRESHOLD: f32 = 50.0;
pub const DEFAULT_HIGH_THRESHOLD: f32 = 150.0;
pub const EDGE_ON: u8 = 255;

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// Tunables for the edge stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Blur strengths, in the order they are applied.
    pub sigmas: Vec<f64>,
    /// Canny low hysteresis threshold (8-bit scale).
    pub low_threshold: f32,
    /// Canny high hysteresis threshold (8-bit scale).
    pub high_threshold: f32,
    /// Radius of the square closing element; 1 means 3x3. 0 disables closing.
    pub closing_radius: u8,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            sigmas: DEFAULT_SIGMAS.to_vec(),
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            closing_radius: 1,
        }
    }
}

impl EdgeConfig {
    /// Sigmas the extractor will skip.
    pub fn invalid_sigmas(&self) -> Vec<f64> {
        self.sigmas.iter().copied().filter(|s| !is_usable_sigma(*s)).collect()
    }
}

fn is_usable_sigma(sigma: f64) -> bool {
    sigma.is_finite() && sigma > 0.0
}

/// A binary (0/255) edge raster.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap(GrayImage);

impl EdgeMap {
    /// An edge map with no edges.
    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Wraps a raster, snapping every non-zero sample to `EDGE_ON`.
    pub fn from_gray(mut image: GrayImage) -> Self {
        for pixel in image.pixels_mut() {
            if pixel.0[0] != 0 {
                pixel.0[0] = EDGE_ON;
            }
        }
        Self(image)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn edge_count(&self) -> usize {
        self.0.pixels().filter(|p| p.0[0] != 0).count()
    }

    /// Whether every edge pixel in `other` is also an edge pixel here.
    pub fn contains(&self, other: &EdgeMap) -> bool {
        self.dimensions() == other.dimensions()
            && self
                .0
                .pixels()
                .zip(other.0.pixels())
                .all(|(mine, theirs)| theirs.0[0] == 0 || mine.0[0] != 0)
    }
}

/// `max(3, round(2 * sigma + 1))`, bumped to the next odd number if even.
pub fn kernel_size_for_sigma(sigma: f64) -> usize {
    let size = ((2.0 * sigma + 1.0).round() as usize).max(3);
    if size % 2 == 0 { size + 1 } else { size }
}

/// Normalized 1-D Gaussian taps, centred.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    let centre = (size as f64 - 1.0) / 2.0;
    let scale = -0.5 / (sigma * sigma);
    let taps: Vec<f64> = (0..size)
        .map(|i| {
            let offset = i as f64 - centre;
            (scale * offset * offset).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| (t / sum) as f32).collect()
}

/// Smooth with the sized Gaussian then run Canny on the result.
pub fn edges_at_scale(gray: &GrayImage, sigma: f64, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let kernel = gaussian_kernel(kernel_size_for_sigma(sigma), sigma);
    let blurred: GrayImage = separable_filter_equal(gray, &kernel);
    canny_presmoothed(&blurred, low_threshold, high_threshold)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Candidate {
    None,
    Weak,
    Strong,
}

/// Canny without the built-in smoothing step. `image` is used as given.
pub fn canny_presmoothed(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (low, high) = if low_threshold > high_threshold {
        (high_threshold, low_threshold)
    } else {
        (low_threshold, high_threshold)
    };
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);
    let (w, h) = (width as usize, height as usize);

    // --- 1. Gradient magnitude (L1) ---
    let magnitude: Vec<f32> = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(dx, dy)| f32::from(dx.0[0]).abs() + f32::from(dy.0[0]).abs())
        .collect();
    // Outside the image counts as zero.
    let magnitude_at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    // --- 2. Non-maximum suppression and double threshold ---
    let mut state = vec![Candidate::None; w * h];
    let mut stack: Vec<usize> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let index = y as usize * w + x as usize;
            let m = magnitude[index];
            if m <= low {
                continue;
            }
            let dx = f32::from(gx.get_pixel(x, y).0[0]);
            let dy = f32::from(gy.get_pixel(x, y).0[0]);
            let (xi, yi) = (i64::from(x), i64::from(y));
            let is_peak = if dy.abs() < TAN_22_5 * dx.abs() {
                m > magnitude_at(xi - 1, yi) && m >= magnitude_at(xi + 1, yi)
            } else if dy.abs() > TAN_67_5 * dx.abs() {
                m > magnitude_at(xi, yi - 1) && m >= magnitude_at(xi, yi + 1)
            } else {
                let s = if (dx < 0.0) != (dy < 0.0) { -1 } else { 1 };
                m > magnitude_at(xi - s, yi - 1) && m > magnitude_at(xi + s, yi + 1)
            };
            if !is_peak {
                continue;
            }
            if m > high {
                state[index] = Candidate::Strong;
                stack.push(index);
            } else {
                state[index] = Candidate::Weak;
            }
        }
    }

    // --- 3. Hysteresis ---
    while let Some(index) = stack.pop() {
        let (x, y) = (index % w, index / w);
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let neighbour = ny * w + nx;
                if state[neighbour] == Candidate::Weak {
                    state[neighbour] = Candidate::Strong;
                    stack.push(neighbour);
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let on = state[y as usize * w + x as usize] == Candidate::Strong;
        Luma([if on { EDGE_ON } else { 0 }])
    })
}

/// Folds `edges` into `accumulator` with a pixel-wise maximum.
pub fn union_edges(accumulator: &mut GrayImage, edges: &GrayImage) {
    for (acc, edge) in accumulator.pixels_mut().zip(edges.pixels()) {
        acc.0[0] = acc.0[0].max(edge.0[0]);
    }
}

/// Morphological closing with a `(2r + 1)` square element.
pub fn close_gaps(edges: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return edges.clone();
    }
    close(edges, Norm::LInf, radius)
}

/// Stateless multi-scale Canny runner.
pub struct MultiScaleEdgeExtractor<'a> {
    config: &'a EdgeConfig,
}

impl<'a> MultiScaleEdgeExtractor<'a> {
    pub fn new(config: &'a EdgeConfig) -> Self {
        Self { config }
    }

    /// Runs every usable scale, unions the results and closes small gaps.
    pub fn extract(&self, gray: &GrayImage) -> EdgeMap {
        let (width, height) = gray.dimensions();
        let mut combined = GrayImage::from_pixel(width, height, Luma([0]));
        if width == 0 || height == 0 {
            return EdgeMap(combined);
        }

        for &sigma in &self.config.sigmas {
            if !is_usable_sigma(sigma) {
                warn!(sigma, "skipping unusable blur strength");
                continue;
            }
            let edges = edges_at_scale(gray, sigma, self.config.low_threshold, self.config.high_threshold);
            debug!(
                sigma,
                kernel = kernel_size_for_sigma(sigma),
                edges = edges.pixels().filter(|p| p.0[0] != 0).count(),
                "edge scale done"
            );
            union_edges(&mut combined, &edges);
        }

        EdgeMap::from_gray(close_gaps(&combined, self.config.closing_radius))
    }
}
