// THEORY:
// The `BrightnessSampler` reduces one camera frame to one number per cell: the
// fraction of that cell's pixels that register as illuminated. It is the only
// place that touches pixel data; everything after it works on ratios.
//
// Key architectural principles:
// 1.  **Fixed Preprocessing Chain**: intensity -> 5x5 Gaussian smoothing ->
//     5x5 dilation -> global threshold. Smoothing removes sensor noise, and
//     dilation grows a lit LED that covers only a pixel or two so it survives
//     the smoothing and still crosses the threshold.
// 2.  **Ratios, Not Booleans**: The per-cell output is a ratio in `[0, 1]`. The
//     lit/unlit decision for a single frame is a threshold on that ratio, but
//     the raw ratio is what the temporal cache keeps.
// 3.  **Stateless**: The same frame and regions always give the same result.
//     All state over time lives in the temporal cache.
// 4.  **Total Over Regions**: Regions are clipped to the frame. A region with
//     no pixels left yields a ratio of `0.0` and is never lit.

use crate::core_modules::grid_geometry::CellRegion;
use image::{GrayImage, Luma, RgbImage};

const KERNEL_RADIUS: i64 = 2;
/// 5-tap binomial kernel, the fixed 5x5 Gaussian applied separably. Sums to 16.
const GAUSSIAN_TAPS: [u32; 5] = [1, 4, 6, 4, 1];
const MASK_ON: u8 = 255;

/// Per-frame result of sampling every cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSampling {
    /// Indices of cells whose ratio reached the lit threshold, ascending.
    pub bright_cells: Vec<usize>,
    /// Bright-pixel ratio of every cell, indexed like the regions.
    pub ratios: Vec<f64>,
    /// The binarized frame (255 = bright), kept for overlays.
    pub mask: GrayImage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessSampler {
    bright_threshold: u8,
    bright_pixel_ratio: f64,
}

impl BrightnessSampler {
    pub fn new(bright_threshold: u8, bright_pixel_ratio: f64) -> Self {
        Self {
            bright_threshold,
            bright_pixel_ratio,
        }
    }

    pub fn bright_pixel_ratio(&self) -> f64 {
        self.bright_pixel_ratio
    }

    /// Samples every region of `frame`.
    pub fn sample(&self, frame: &RgbImage, regions: &[CellRegion]) -> FrameSampling {
        let mask = self.bright_mask(frame);

        let mut ratios = Vec::with_capacity(regions.len());
        let mut bright_cells = Vec::new();
        for region in regions {
            match bright_ratio(&mask, region) {
                Some(ratio) => {
                    if ratio >= self.bright_pixel_ratio {
                        bright_cells.push(region.index);
                    }
                    ratios.push(ratio);
                }
                None => ratios.push(0.0),
            }
        }

        FrameSampling {
            bright_cells,
            ratios,
            mask,
        }
    }

    /// Runs the preprocessing chain and returns the binary bright/dark mask.
    pub fn bright_mask(&self, frame: &RgbImage) -> GrayImage {
        let (width, height) = frame.dimensions();
        let intensity = to_intensity(frame);
        let smoothed = gaussian_blur(&intensity, width as usize, height as usize);
        let dilated = dilate(&smoothed, width as usize, height as usize);
        let threshold = self.bright_threshold;
        GrayImage::from_fn(width, height, |x, y| {
            let value = dilated[y as usize * width as usize + x as usize];
            Luma([if value > threshold { MASK_ON } else { 0 }])
        })
    }
}

/// Fraction of bright mask pixels inside `region`, or `None` when the clipped region is empty.
pub fn bright_ratio(mask: &GrayImage, region: &CellRegion) -> Option<f64> {
    let (width, height) = mask.dimensions();
    let x1 = region.x1.clamp(0, width as i64) as u32;
    let x2 = region.x2.clamp(0, width as i64) as u32;
    let y1 = region.y1.clamp(0, height as i64) as u32;
    let y2 = region.y2.clamp(0, height as i64) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let total = (x2 - x1) as u64 * (y2 - y1) as u64;
    let mut bright = 0u64;
    for y in y1..y2 {
        for x in x1..x2 {
            if mask.get_pixel(x, y)[0] != 0 {
                bright += 1;
            }
        }
    }
    Some(bright as f64 / total as f64)
}

/// Rec. 601 luma, rounded.
fn to_intensity(frame: &RgbImage) -> Vec<u8> {
    frame
        .as_raw()
        .chunks_exact(3)
        .map(|px| ((299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32 + 500) / 1000) as u8)
        .collect()
}

/// Mirrors an out-of-range index back into `0..len` without repeating the edge pixel.
fn reflect_101(index: i64, len: usize) -> usize {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let period = 2 * len - 2;
    let i = index.rem_euclid(period);
    if i >= len { (period - i) as usize } else { i as usize }
}

fn gaussian_blur(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut horizontal = vec![0u32; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = GAUSSIAN_TAPS
                .iter()
                .enumerate()
                .map(|(k, tap)| tap * row[reflect_101(x as i64 + k as i64 - KERNEL_RADIUS, width)] as u32)
                .sum();
        }
    }

    let mut out = vec![0u8; plane.len()];
    for y in 0..height {
        for x in 0..width {
            let sum: u32 = GAUSSIAN_TAPS
                .iter()
                .enumerate()
                .map(|(k, tap)| tap * horizontal[reflect_101(y as i64 + k as i64 - KERNEL_RADIUS, height) * width + x])
                .sum();
            out[y * width + x] = ((sum + 128) >> 8) as u8;
        }
    }
    out
}

/// 5x5 rectangular max filter. Pixels outside the frame do not contribute.
fn dilate(plane: &[u8], width: usize, height: usize) -> Vec<u8> {
    let window = |center: usize, len: usize| {
        let start = center.saturating_sub(KERNEL_RADIUS as usize);
        let end = (center + KERNEL_RADIUS as usize + 1).min(len);
        start..end
    };

    let mut horizontal = vec![0u8; plane.len()];
    for y in 0..height {
        for x in 0..width {
            horizontal[y * width + x] = window(x, width).map(|xx| plane[y * width + xx]).max().unwrap_or(0);
        }
    }

    let mut out = vec![0u8; plane.len()];
    for y in 0..height {
        for x in 0..width {
            out[y * width + x] = window(y, height).map(|yy| horizontal[yy * width + x]).max().unwrap_or(0);
        }
    }
    out
}
