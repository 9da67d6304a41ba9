// THEORY:
// The score aggregator is the last numeric stage. It takes the segmenter's
// 0/255 foreground indicator and the 0/255 edge map, normalizes both to [0, 1]
// and reduces them to three numbers:
//
// - `foreground_score`: mean foreground probability over the whole frame.
// - `background_score`: its complement. Computed as `1.0 - foreground_score`,
//   so the two always sum to exactly 1.0.
// - `edge_weighted_foreground`: foreground probability averaged over edge
//   pixels only, i.e. sum(fg * edge) / sum(edge). Edges are where objects
//   start and stop, so this is a sharper signal than the global mean. With no
//   edges at all it is defined as 0.0.
//
// The normalized probability grid is handed back with the scores so callers
// can inspect or render it.

use crate::core_modules::edge_extractor::EdgeMap;
use crate::core_modules::grid::Grid;
use crate::core_modules::segmenter::ForegroundMask;
use crate::error::AggregationError;
use tracing::debug;

const FULL_SCALE: f64 = 255.0;

/// Foreground probability in [0, 1], one value per pixel.
pub type ProbabilityGrid = Grid<f64>;

/// The three headline numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub foreground_score: f64,
    pub background_score: f64,
    pub edge_weighted_foreground: f64,
}

/// Scores plus the grid they were computed from.
#[derive(Debug, Clone)]
pub struct ScoreReport {
    pub scores: Scores,
    pub foreground_probability: ProbabilityGrid,
}

/// Scales a 0/255 mask to [0, 1].
pub fn normalize(mask: &ForegroundMask) -> ProbabilityGrid {
    mask.map(|v| v / FULL_SCALE)
}

/// Edge map as a [0, 1] weight per pixel, row-major.
pub fn edge_weights(edges: &EdgeMap) -> Vec<f64> {
    edges
        .as_image()
        .pixels()
        .map(|p| f64::from(p.0[0]) / FULL_SCALE)
        .collect()
}

/// Mean of the grid, 0.0 when it is empty.
pub fn mean(grid: &ProbabilityGrid) -> f64 {
    if grid.is_empty() {
        return 0.0;
    }
    grid.iter().sum::<f64>() / grid.len() as f64
}

/// `sum(p * w) / sum(w)`, or 0.0 when there is no weight.
pub fn weighted_mean(probability: &ProbabilityGrid, weights: &[f64]) -> f64 {
    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = probability.iter().zip(weights).map(|(p, w)| p * w).sum();
    weighted / total_weight
}

/// Normalizes both inputs and reduces them to `Scores`.
pub fn aggregate(foreground: &ForegroundMask, edges: &EdgeMap) -> Result<ScoreReport, AggregationError> {
    let (mask_width, mask_height) = foreground.dimensions();
    let (edge_width, edge_height) = edges.dimensions();
    if (mask_width, mask_height) != (edge_width, edge_height) {
        return Err(AggregationError::DimensionMismatch {
            mask_width,
            mask_height,
            edge_width,
            edge_height,
        });
    }

    let foreground_probability = normalize(foreground);
    let weights = edge_weights(edges);

    let foreground_score = mean(&foreground_probability);
    let background_score = 1.0 - foreground_score;
    let edge_weighted_foreground = weighted_mean(&foreground_probability, &weights);

    debug!(foreground_score, background_score, edge_weighted_foreground, "scores aggregated");
    Ok(ScoreReport {
        scores: Scores {
            foreground_score,
            background_score,
            edge_weighted_foreground,
        },
        foreground_probability,
    })
}
