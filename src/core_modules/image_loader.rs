// THEORY:
// The image loader is the only stage allowed to fail hard. It turns a path into
// an owned RGB raster and applies the one correction the rest of the pipeline
// depends on: GrabCut needs a band of definite background around the seed
// rectangle, so images that are too small in either dimension are stretched to
// a fixed square working size before anything else sees them.
//
// Every decodable input is promoted to 3-channel RGB here, including grayscale
// and alpha formats, so later stages never have to branch on channel count.

use crate::error::LoadError;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageReader, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_MIN_DIMENSION: u32 = 100;

/// Tunables for the loading stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Images narrower or shorter than this are resized to exactly
    /// `min_dimension x min_dimension`.
    pub min_dimension: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            min_dimension: DEFAULT_MIN_DIMENSION,
        }
    }
}

/// A decoded image plus what the loader did to it.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub image: RgbImage,
    /// Dimensions as decoded, before any resize.
    pub original_dimensions: (u32, u32),
}

impl LoadedImage {
    pub fn was_resized(&self) -> bool {
        self.image.dimensions() != self.original_dimensions
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Luma conversion used by the edge stage.
    pub fn to_grayscale(&self) -> GrayImage {
        luma_601(&self.image)
    }
}

/// BT.601 luma, `0.299 R + 0.587 G + 0.114 B` rounded to nearest. The Canny
/// thresholds are tuned for this weighting; BT.709 flattens red and blue.
pub fn luma_601(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
        Luma([((weighted + 500) / 1000) as u8])
    })
}

/// Decodes `path` into RGB. Missing, unreadable and empty images are errors.
pub fn decode_rgb(path: &Path) -> Result<RgbImage, LoadError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let decoded = reader.decode().map_err(|source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(LoadError::EmptyImage {
            path: path.to_path_buf(),
        });
    }

    debug!(color = ?decoded.color(), "decoded {}", path.display());
    Ok(decoded.to_rgb8())
}

/// Resizes to `min_dimension x min_dimension` (bilinear) when either side is
/// below `min_dimension`. Larger images are returned untouched.
pub fn ensure_min_size(image: RgbImage, min_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width >= min_dimension && height >= min_dimension {
        return image;
    }
    info!(width, height, min_dimension, "upsampling undersized image");
    imageops::resize(&image, min_dimension, min_dimension, FilterType::Triangle)
}

/// Decode then size-correct.
pub fn load(path: &Path, config: &LoaderConfig) -> Result<LoadedImage, LoadError> {
    let image = decode_rgb(path)?;
    let original_dimensions = image.dimensions();
    let image = ensure_min_size(image, config.min_dimension);
    Ok(LoadedImage {
        image,
        original_dimensions,
    })
}
