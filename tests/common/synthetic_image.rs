use image::{Rgb, RgbImage};
use std::path::PathBuf;

/// Muted grey-blue background with a bright yellow disc in the centre. The
/// disc sits about 130 luma levels above the background, well past the edge
/// detector's high threshold.
pub fn disc_on_background(size: u32, radius: f64) -> RgbImage {
    let centre = size as f64 / 2.0;
    RgbImage::from_fn(size, size, |x, y| {
        let dx = x as f64 + 0.5 - centre;
        let dy = y as f64 + 0.5 - centre;
        if dx * dx + dy * dy <= radius * radius {
            Rgb([240, 220, 60])
        } else {
            Rgb([70 + (x % 4) as u8, 80 + (y % 4) as u8, 90])
        }
    })
}

/// Writes `image` as a PNG under the temp dir and returns the path.
pub fn write_png(image: &RgbImage, name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("fg_scores_{}_{name}.png", std::process::id()));
    image.save(&path).expect("Error Saving File.");
    path
}
