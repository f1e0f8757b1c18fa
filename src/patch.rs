//! Image patches: normalized patterns and O(1) rectangle statistics.

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use nalgebra::DMatrix;

use crate::geometry::BoundingBox;
use crate::{Error, Result};

/// Zero-mean, fixed-size patch used by the fine classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    /// `size x size` pixel values with the patch mean subtracted.
    pub pixels: DMatrix<f32>,
    /// Variance of the resized patch before mean subtraction.
    pub variance: f64,
}

impl Pattern {
    /// Crop `bbox` from `frame`, resize it to `size x size` and subtract its mean.
    pub fn extract(frame: &GrayImage, bbox: &BoundingBox, size: u32) -> Result<Self> {
        if bbox.is_empty() || !bbox.is_inside(frame.width(), frame.height()) {
            return Err(Error::InvalidBox(format!(
                "cannot extract {:?} from a {}x{} frame",
                bbox,
                frame.width(),
                frame.height()
            )));
        }

        let crop = imageops::crop_imm(
            frame,
            bbox.x as u32,
            bbox.y as u32,
            bbox.width as u32,
            bbox.height as u32,
        )
        .to_image();
        let resized = imageops::resize(&crop, size, size, FilterType::Triangle);

        let n = (size * size) as f64;
        let (sum, sq_sum) = resized.pixels().fold((0.0, 0.0), |(s, sq), p| {
            let v = p[0] as f64;
            (s + v, sq + v * v)
        });
        let mean = sum / n;
        let variance = (sq_sum / n - mean * mean).max(0.0);

        let side = size as usize;
        let pixels = DMatrix::from_fn(side, side, |row, col| {
            (resized.get_pixel(col as u32, row as u32)[0] as f64 - mean) as f32
        });

        Ok(Self { pixels, variance })
    }

    pub fn size(&self) -> usize {
        self.pixels.nrows()
    }
}

/// Summed-area tables of pixel values and squared pixel values.
///
/// Both tables are one pixel larger than the frame in each dimension with a
/// zero first row and column.
pub struct IntegralImage {
    sum: ImageBuffer<Luma<u64>, Vec<u64>>,
    sq_sum: ImageBuffer<Luma<u64>, Vec<u64>>,
}

impl IntegralImage {
    pub fn new(frame: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(frame),
            sq_sum: integral_squared_image::<_, u64>(frame),
        }
    }

    /// Frame dimensions covered by the tables.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.sum.width() - 1, self.sum.height() - 1)
    }

    fn rect_sum(table: &ImageBuffer<Luma<u64>, Vec<u64>>, bbox: &BoundingBox) -> f64 {
        let (x1, y1) = (bbox.x as u32, bbox.y as u32);
        let (x2, y2) = (bbox.right() as u32, bbox.bottom() as u32);
        let br = table.get_pixel(x2, y2)[0];
        let tl = table.get_pixel(x1, y1)[0];
        let tr = table.get_pixel(x2, y1)[0];
        let bl = table.get_pixel(x1, y2)[0];
        ((br + tl) as i128 - (tr + bl) as i128) as f64
    }

    fn contains(&self, bbox: &BoundingBox) -> bool {
        let (w, h) = self.frame_size();
        !bbox.is_empty() && bbox.is_inside(w, h)
    }

    /// Mean pixel value inside `bbox`, 0 for empty or out-of-frame boxes.
    pub fn mean(&self, bbox: &BoundingBox) -> f64 {
        if !self.contains(bbox) {
            return 0.0;
        }
        Self::rect_sum(&self.sum, bbox) / bbox.area() as f64
    }

    /// Pixel variance inside `bbox`, 0 for empty or out-of-frame boxes.
    pub fn variance(&self, bbox: &BoundingBox) -> f64 {
        if !self.contains(bbox) {
            return 0.0;
        }
        let area = bbox.area() as f64;
        let mean = Self::rect_sum(&self.sum, bbox) / area;
        let sq_mean = Self::rect_sum(&self.sq_sum, bbox) / area;
        (sq_mean - mean * mean).max(0.0)
    }
}
