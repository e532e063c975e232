use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};

use super::glyphs::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::{OverlayStyle, Surface};
use crate::frame::Frame;

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const PREVIEW_JPEG_QUALITY: u8 = 85;
/// Pixels beyond each surface edge that coordinates are clamped to.
const CLAMP_MARGIN: f64 = 4096.0;

/// In-memory RGB display surface.
///
/// When a preview path is set, `present` writes the canvas there as a JPEG so
/// an external viewer can follow the live overlay.
pub struct Canvas {
    image: RgbImage,
    blank: bool,
    preview_path: Option<PathBuf>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, BACKGROUND),
            blank: true,
            preview_path: None,
        }
    }

    pub fn with_preview_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preview_path = Some(path.into());
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Round a horizontal coordinate to a pixel column near the surface.
    fn column(&self, x: f64) -> i64 {
        clamp_to_pixel(x, self.image.width())
    }

    fn row(&self, y: f64) -> i64 {
        clamp_to_pixel(y, self.image.height())
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && x < self.image.width() as i64 && y < self.image.height() as i64 {
            self.image.put_pixel(x as u32, y as u32, color);
            self.blank = false;
        }
    }

    fn fill(&mut self, left: i64, top: i64, right: i64, bottom: i64, color: Rgb<u8>) {
        let max_x = self.image.width() as i64 - 1;
        let max_y = self.image.height() as i64 - 1;
        for y in top.max(0)..=bottom.min(max_y) {
            for x in left.max(0)..=right.min(max_x) {
                self.put(x, y, color);
            }
        }
    }
}

impl Surface for Canvas {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = BACKGROUND;
        }
        self.blank = true;
    }

    fn draw_frame(&mut self, frame: &Frame) {
        let (width, height) = self.image.dimensions();
        if frame.width() == width && frame.height() == height {
            self.image.copy_from_slice(frame.image());
        } else {
            self.image = image::imageops::resize(frame.image(), width, height, FilterType::Triangle);
        }
        self.blank = false;
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, style: &OverlayStyle) {
        let color = Rgb(style.color);
        let left = self.column(x);
        let top = self.row(y);
        let right = self.column(x + width);
        let bottom = self.row(y + height);
        // Line width is centered on the rectangle edge.
        let lw = style.line_width.clamp(1, CLAMP_MARGIN as u32) as i64;
        let inner = lw / 2;
        let outer = lw - inner - 1;
        self.fill(left - inner, top - inner, right + outer, top + outer, color);
        self.fill(left - inner, bottom - inner, right + outer, bottom + outer, color);
        self.fill(left - inner, top - inner, left + outer, bottom + outer, color);
        self.fill(right - inner, top - inner, right + outer, bottom + outer, color);
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &OverlayStyle) {
        let color = Rgb(style.color);
        let scale = style.text_scale.clamp(1, CLAMP_MARGIN as u32) as i64;
        let top = self.row(y) - (GLYPH_HEIGHT as i64 + 1) * scale;
        let mut pen_x = self.column(x);
        let max_x = self.image.width() as i64;
        for ch in text.chars() {
            if pen_x >= max_x {
                break;
            }
            let rows = glyph(ch);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let px = pen_x + col as i64 * scale;
                        let py = top + row as i64 * scale;
                        self.fill(px, py, px + scale - 1, py + scale - 1, color);
                    }
                }
            }
            pen_x += GLYPH_ADVANCE as i64 * scale;
        }
    }

    fn present(&mut self) -> Result<()> {
        let Some(path) = self.preview_path.clone() else {
            return Ok(());
        };
        write_jpeg_atomically(&self.image, &path)
    }

    fn is_blank(&self) -> bool {
        self.blank
    }
}

/// Round `v` to a pixel index within `CLAMP_MARGIN` of `[0, extent]`.
/// NaN maps to 0.
fn clamp_to_pixel(v: f64, extent: u32) -> i64 {
    if v.is_nan() {
        return 0;
    }
    v.round()
        .clamp(-CLAMP_MARGIN, extent as f64 + CLAMP_MARGIN) as i64
}

fn write_jpeg_atomically(image: &RgbImage, path: &Path) -> Result<()> {
    let tmp = path.with_extension("jpg.tmp");
    {
        let file = File::create(&tmp)
            .with_context(|| format!("create preview file {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, PREVIEW_JPEG_QUALITY)
            .encode_image(image)
            .context("encode preview jpeg")?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("move preview into place at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

    fn style() -> OverlayStyle {
        OverlayStyle {
            color: YELLOW.0,
            line_width: 2,
            text_scale: 1,
        }
    }

    #[test]
    fn starts_and_clears_blank() {
        let mut canvas = Canvas::new(20, 20);
        assert!(canvas.is_blank());
        canvas.stroke_rect(2.0, 2.0, 5.0, 5.0, &style());
        assert!(!canvas.is_blank());
        canvas.clear();
        assert!(canvas.is_blank());
        assert!(canvas.image().pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn rectangle_outline_leaves_interior_untouched() {
        let mut canvas = Canvas::new(100, 100);
        canvas.stroke_rect(10.0, 10.0, 50.0, 50.0, &style());
        assert_eq!(*canvas.image().get_pixel(10, 10), YELLOW);
        assert_eq!(*canvas.image().get_pixel(60, 60), YELLOW);
        assert_eq!(*canvas.image().get_pixel(35, 10), YELLOW);
        assert_eq!(*canvas.image().get_pixel(35, 35), BACKGROUND);
    }

    #[test]
    fn rectangle_is_clipped_to_surface() {
        let mut canvas = Canvas::new(10, 10);
        canvas.stroke_rect(-5.0, -5.0, 100.0, 100.0, &style());
        assert_eq!(canvas.size(), (10, 10));
    }

    #[test]
    fn text_sits_above_anchor() {
        let mut canvas = Canvas::new(60, 30);
        canvas.fill_text("H", 10.0, 20.0, &style());
        // Left stem of 'H' spans the seven rows above the anchor gap.
        assert_eq!(*canvas.image().get_pixel(10, 12), YELLOW);
        assert_eq!(*canvas.image().get_pixel(10, 18), YELLOW);
        assert_eq!(*canvas.image().get_pixel(10, 20), BACKGROUND);
    }

    #[test]
    fn extreme_coordinates_are_clamped() {
        let mut canvas = Canvas::new(64, 48);
        let wide = OverlayStyle {
            line_width: u32::MAX,
            text_scale: u32::MAX,
            ..style()
        };
        for v in [-1e300, 1e300, f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -5e3, 7e3] {
            canvas.stroke_rect(v, v, 10.0, 10.0, &style());
            canvas.stroke_rect(0.0, 0.0, v, v, &style());
            canvas.fill_text("happy", v, v, &style());
            canvas.fill_text("x", v, 20.0, &wide);
        }
        canvas.stroke_rect(-1e300, -1e300, 2e300, 2e300, &wide);
        assert_eq!(canvas.size(), (64, 48));
    }

    #[test]
    fn box_partly_outside_surface_draws_visible_edges() {
        let mut canvas = Canvas::new(40, 40);
        canvas.stroke_rect(-1e9, 10.0, 1e9 + 20.0, 10.0, &style());
        assert_eq!(*canvas.image().get_pixel(5, 10), YELLOW);
        assert_eq!(*canvas.image().get_pixel(20, 15), YELLOW);
        assert_eq!(*canvas.image().get_pixel(25, 15), BACKGROUND);
    }

    #[test]
    fn draw_frame_scales_to_surface() {
        let mut canvas = Canvas::new(8, 8);
        let frame = Frame::from_rgb(4, 4, vec![200; 4 * 4 * 3]).unwrap();
        canvas.draw_frame(&frame);
        assert!(!canvas.is_blank());
        assert_eq!(canvas.image().dimensions(), (8, 8));
    }

    #[test]
    fn present_writes_preview_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut canvas = Canvas::new(16, 16).with_preview_path(&path);
        canvas.stroke_rect(1.0, 1.0, 10.0, 10.0, &style());
        canvas.present().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
