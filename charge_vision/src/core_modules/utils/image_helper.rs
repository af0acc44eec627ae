pub mod image_helper {
    use crate::core_modules::grid_geometry::CellRegion;
    use image::{ImageEncoder, Rgb, RgbImage};
    use std::path::Path;

    const GRID_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
    const LIT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
    const LIT_ALPHA: f32 = 0.3;

    /// Decodes any supported image file into an RGB frame.
    pub fn load_frame(path: &Path) -> Result<RgbImage, image::ImageError> {
        Ok(image::open(path)?.to_rgb8())
    }

    pub fn save(path: &Path, frame: &RgbImage) -> Result<(), image::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(frame.as_raw(), frame.width(), frame.height(), image::ExtendedColorType::Rgb8)?;

        Ok(())
    }

    /// Draws cell outlines and tints every lit cell.
    pub fn draw_overlay(frame: &RgbImage, regions: &[CellRegion], bright_cells: &[usize]) -> RgbImage {
        let mut out = frame.clone();
        let (width, height) = out.dimensions();
        let clip_x = |v: i64| v.clamp(0, width as i64) as u32;
        let clip_y = |v: i64| v.clamp(0, height as i64) as u32;

        for region in regions {
            let (x1, x2) = (clip_x(region.x1), clip_x(region.x2));
            let (y1, y2) = (clip_y(region.y1), clip_y(region.y2));
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            if bright_cells.contains(&region.index) {
                for y in y1..y2 {
                    for x in x1..x2 {
                        let px = out.get_pixel_mut(x, y);
                        for c in 0..3 {
                            px[c] = (LIT_COLOR[c] as f32 * LIT_ALPHA + px[c] as f32 * (1.0 - LIT_ALPHA)) as u8;
                        }
                    }
                }
            }

            for x in x1..x2 {
                out.put_pixel(x, y1, GRID_COLOR);
                out.put_pixel(x, y2 - 1, GRID_COLOR);
            }
            for y in y1..y2 {
                out.put_pixel(x1, y, GRID_COLOR);
                out.put_pixel(x2 - 1, y, GRID_COLOR);
            }
        }
        out
    }
}
