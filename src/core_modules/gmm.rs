// THEORY:
// The `GaussianMixture` is the colour model behind GrabCut's data term. One
// mixture describes "what background looks like", another "what foreground
// looks like"; each is a handful of full-covariance Gaussians in RGB space.
//
// Key principles:
// 1.  **Deterministic initialization**: components are seeded with a k-means
//     pass whose initial centres are chosen by farthest-point sampling starting
//     from the first sample. No randomness, so identical input gives identical
//     models and therefore identical scores.
// 2.  **Regularized covariances**: a degenerate component (all samples the same
//     colour, or colinear colours) gets a small ridge added to its diagonal so
//     its determinant is positive and it can be inverted.
// 3.  **Unweighted component choice**: a pixel is assigned to the component with
//     the highest density ignoring mixture weights, while the likelihood used
//     for the data term is the properly weighted sum.

use crate::error::EngineError;
use nalgebra::{Matrix3, Vector3};

pub type Color = Vector3<f64>;

pub const DEFAULT_COMPONENTS: usize = 5;
const KMEANS_ITERATIONS: usize = 10;
const DETERMINANT_EPSILON: f64 = f64::EPSILON;
const COVARIANCE_RIDGE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: Matrix3<f64>,
    determinant: f64,
}

impl Component {
    fn empty() -> Self {
        Self {
            weight: 0.0,
            mean: Color::zeros(),
            inverse: Matrix3::zeros(),
            determinant: 0.0,
        }
    }

    /// Gaussian density up to the shared `(2 pi)^(3/2)` factor.
    fn density(&self, color: &Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = color - self.mean;
        let mahalanobis = d.dot(&(self.inverse * d));
        (-0.5 * mahalanobis).exp() / self.determinant.sqrt()
    }
}

/// Running sums for one component while re-learning.
#[derive(Debug, Clone)]
struct Accumulator {
    count: usize,
    sum: Color,
    products: Matrix3<f64>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: Color::zeros(),
            products: Matrix3::zeros(),
        }
    }
}

impl Accumulator {
    fn add(&mut self, color: &Color) {
        self.count += 1;
        self.sum += color;
        self.products += color * color.transpose();
    }

    fn finish(&self, total: usize) -> Component {
        if self.count == 0 {
            return Component::empty();
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        let mut covariance = self.products / n - mean * mean.transpose();

        let mut determinant = covariance.determinant();
        if determinant <= DETERMINANT_EPSILON {
            covariance += Matrix3::identity() * COVARIANCE_RIDGE;
            determinant = covariance.determinant();
        }

        // A component that is still singular after the ridge drops out.
        match covariance.try_inverse() {
            Some(inverse) if determinant > 0.0 => Component {
                weight: n / total as f64,
                mean,
                inverse,
                determinant,
            },
            _ => Component::empty(),
        }
    }
}

fn squared_distance(a: &Color, b: &Color) -> f64 {
    (a - b).norm_squared()
}

/// Index of the centre closest to `color`; ties go to the lowest index.
fn nearest_centre(centres: &[Color], color: &Color) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (k, centre) in centres.iter().enumerate() {
        let distance = squared_distance(centre, color);
        if distance < best_distance {
            best = k;
            best_distance = distance;
        }
    }
    best
}

/// Deterministic k-means: farthest-point seeding from the first sample, then
/// Lloyd iterations. Returns one label per sample.
pub fn kmeans_labels(samples: &[Color], k: usize) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return vec![0; samples.len()];
    }

    // --- 1. Farthest-point seeding ---
    let mut centres: Vec<Color> = Vec::with_capacity(k);
    centres.push(samples[0]);
    let mut closest: Vec<f64> = samples.iter().map(|s| squared_distance(s, &samples[0])).collect();
    while centres.len() < k {
        let (far_index, _) = closest
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, d)| if *d > best.1 { (i, *d) } else { best });
        let centre = samples[far_index];
        for (d, sample) in closest.iter_mut().zip(samples) {
            *d = d.min(squared_distance(sample, &centre));
        }
        centres.push(centre);
    }

    // --- 2. Lloyd iterations ---
    let mut labels: Vec<usize> = samples.iter().map(|s| nearest_centre(&centres, s)).collect();
    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![Color::zeros(); k];
        let mut counts = vec![0usize; k];
        for (sample, &label) in samples.iter().zip(&labels) {
            counts[label] += 1;
            sums[label] += sample;
        }
        for (centre, (sum, count)) in centres.iter_mut().zip(sums.iter().zip(&counts)) {
            if *count > 0 {
                *centre = sum / *count as f64;
            }
        }

        let mut changed = false;
        for (label, sample) in labels.iter_mut().zip(samples) {
            let next = nearest_centre(&centres, sample);
            if next != *label {
                *label = next;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    labels
}

/// A mixture of full-covariance RGB Gaussians.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    components: Vec<Component>,
}

impl GaussianMixture {
    /// Seeds the mixture from `samples` with k-means. Needs at least one
    /// sample per component.
    pub fn fit(samples: &[Color], components: usize, region: &'static str) -> Result<Self, EngineError> {
        if components == 0 || samples.len() < components {
            return Err(EngineError::NotEnoughSamples {
                region,
                found: samples.len(),
                required: components.max(1),
            });
        }
        let labels = kmeans_labels(samples, components);
        let mut mixture = Self {
            components: vec![Component::empty(); components],
        };
        mixture.learn(samples, &labels);
        Ok(mixture)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Re-estimates every component from labelled samples. Components that
    /// receive no samples drop out with zero weight.
    pub fn learn(&mut self, samples: &[Color], labels: &[usize]) {
        let mut accumulators = vec![Accumulator::default(); self.components.len()];
        for (sample, &label) in samples.iter().zip(labels) {
            if let Some(acc) = accumulators.get_mut(label) {
                acc.add(sample);
            }
        }
        let total = samples.len().max(1);
        self.components = accumulators.iter().map(|acc| acc.finish(total)).collect();
    }

    /// Weighted mixture likelihood of `color`.
    pub fn likelihood(&self, color: &Color) -> f64 {
        self.components.iter().map(|c| c.weight * c.density(color)).sum()
    }

    /// The component with the highest unweighted density.
    pub fn most_likely_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = 0.0;
        for (k, component) in self.components.iter().enumerate() {
            let density = component.density(color);
            if density > best_density {
                best = k;
                best_density = density;
            }
        }
        best
    }

    /// `-ln(likelihood)`, kept finite for colours the model never saw.
    pub fn cost(&self, color: &Color) -> f64 {
        -self.likelihood(color).max(f64::MIN_POSITIVE).ln()
    }
}
