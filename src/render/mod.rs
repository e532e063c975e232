//! Overlay rendering.
//!
//! The renderer paints a captured frame and its annotations onto a display
//! `Surface`. Annotations are drawn in sequence order; where they overlap the
//! last one drawn wins.

mod canvas;
pub mod glyphs;

use anyhow::Result;

use crate::annotation::Annotation;
use crate::frame::Frame;

pub use canvas::Canvas;

/// Stroke and text styling for overlays.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    pub line_width: u32,
    /// Pixel size of one glyph cell; 5 gives labels roughly 40 px tall.
    pub text_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [255, 255, 0],
            line_width: 2,
            text_scale: 5,
        }
    }
}

/// A display the renderer can draw on.
///
/// Coordinates are in surface pixels with the origin at the top-left corner.
pub trait Surface: Send {
    fn size(&self) -> (u32, u32);

    /// Erase everything drawn so far.
    fn clear(&mut self);

    /// Paint `frame` over the whole surface.
    fn draw_frame(&mut self, frame: &Frame);

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, style: &OverlayStyle);

    /// Draw `text` with its baseline-left point at (`x`, `y`).
    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: &OverlayStyle);

    /// Make the current contents visible.
    fn present(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_blank(&self) -> bool;
}

pub struct Renderer {
    surface: Box<dyn Surface>,
    style: OverlayStyle,
    frames_rendered: u64,
}

impl Renderer {
    pub fn new(surface: Box<dyn Surface>) -> Self {
        Self::with_style(surface, OverlayStyle::default())
    }

    pub fn with_style(surface: Box<dyn Surface>, style: OverlayStyle) -> Self {
        Self {
            surface,
            style,
            frames_rendered: 0,
        }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Clear, redraw `frame`, then outline and label each annotation.
    pub fn render(&mut self, frame: &Frame, annotations: &[Annotation]) {
        self.surface.clear();
        self.surface.draw_frame(frame);
        for annotation in annotations {
            self.surface.stroke_rect(
                annotation.x,
                annotation.y,
                annotation.width,
                annotation.height,
                &self.style,
            );
            self.surface
                .fill_text(&annotation.label, annotation.x, annotation.y, &self.style);
        }
        self.frames_rendered += 1;
        if let Err(err) = self.surface.present() {
            log::warn!("present rendered frame failed: {:#}", err);
        }
    }

    /// Blank the display.
    pub fn clear(&mut self) {
        self.surface.clear();
        if let Err(err) = self.surface.present() {
            log::warn!("present cleared surface failed: {:#}", err);
        }
    }
}
