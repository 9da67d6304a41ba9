// THEORY:
// `OpenCvGrabCut` hands the segmentation to OpenCV's own `grabCut`, the same
// routine desktop vision tools use. It is the drop-in alternative to the native
// engine when a system OpenCV is available (cargo feature `opencv`).
//
// The adapter only moves pixels: RGB image -> BGR `Mat`, call `grab_cut` with
// rectangle initialization, then read the 0..=3 label `Mat` back into a
// `LabelMask`. OpenCV exceptions arrive as `opencv::Error` and are reported as
// `EngineError::Backend`, which the segmenter turns into an all-background
// fallback.

use crate::core_modules::grid::Grid;
use crate::core_modules::segmenter::{GrabCutLabel, LabelMask, SeedRect, SegmentationEngine};
use crate::error::EngineError;
use image::RgbImage;
use opencv::{
    core::{self, Mat, Rect, Scalar, Vec3b},
    imgproc,
    prelude::*,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvGrabCut;

impl OpenCvGrabCut {
    fn to_bgr_mat(image: &RgbImage) -> opencv::Result<Mat> {
        let (width, height) = image.dimensions();
        let mut mat = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )?;
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            *mat.at_2d_mut::<Vec3b>(y as i32, x as i32)? = core::VecN([b, g, r]);
        }
        Ok(mat)
    }

    fn run(image: &RgbImage, seed: SeedRect, iterations: u32) -> opencv::Result<Mat> {
        let (width, height) = image.dimensions();
        let bgr = Self::to_bgr_mat(image)?;
        let mut mask = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            core::CV_8UC1,
            Scalar::all(f64::from(imgproc::GC_BGD)),
        )?;
        let mut background_model = Mat::default();
        let mut foreground_model = Mat::default();
        let rect = Rect::new(seed.x as i32, seed.y as i32, seed.width as i32, seed.height as i32);

        imgproc::grab_cut(
            &bgr,
            &mut mask,
            rect,
            &mut background_model,
            &mut foreground_model,
            iterations as i32,
            imgproc::GC_INIT_WITH_RECT,
        )?;
        Ok(mask)
    }

    fn read_labels(mask: &Mat, width: u32, height: u32) -> Result<LabelMask, EngineError> {
        let mut labels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let raw = *mask.at_2d::<u8>(y, x).map_err(backend)?;
                let label = GrabCutLabel::try_from(raw)
                    .map_err(|raw| EngineError::Backend(format!("unexpected grabcut label {raw}")))?;
                labels.push(label);
            }
        }
        Grid::from_vec(width, height, labels)
            .ok_or_else(|| EngineError::Backend("label buffer has the wrong length".into()))
    }
}

fn backend(err: opencv::Error) -> EngineError {
    EngineError::Backend(err.to_string())
}

impl SegmentationEngine for OpenCvGrabCut {
    fn name(&self) -> &'static str {
        "opencv-grabcut"
    }

    fn segment(&self, image: &RgbImage, seed: SeedRect, iterations: u32) -> Result<LabelMask, EngineError> {
        let (width, height) = image.dimensions();
        if !seed.fits(width, height) {
            return Err(seed.invalid_for(width, height));
        }
        let mask = Self::run(image, seed, iterations).map_err(backend)?;
        Self::read_labels(&mask, width, height)
    }
}
