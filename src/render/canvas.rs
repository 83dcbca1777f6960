use super::{Affine, HexColor, ImageFilter};
use crate::errors::RenderError;
use image::RgbaImage;

/// Paint used by the text operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPaint {
    pub font_px: f32,
    pub fill: HexColor,
    pub stroke: HexColor,
    pub line_width: f32,
}

impl Default for TextPaint {
    fn default() -> Self {
        TextPaint {
            font_px: 10.0,
            fill: HexColor::BLACK,
            stroke: HexColor::BLACK,
            line_width: 1.0,
        }
    }
}

/// The slice of a 2D canvas context the meme renderer draws through.
///
/// `save`/`restore` cover the filter, transform and paint. Text is centered
/// horizontally on `x`, and `y` is the vertical middle of the em box.
pub trait Canvas {
    /// Clears the surface and resizes it. Also resets the graphics state.
    fn reset(&mut self, width: u32, height: u32);
    fn set_filter(&mut self, filter: ImageFilter);
    /// Draws `image` unscaled at the origin through the current filter.
    fn draw_image(&mut self, image: &RgbaImage);
    fn save(&mut self);
    fn restore(&mut self);
    /// Post-multiplies the current transform by `matrix`.
    fn transform(&mut self, matrix: Affine);
    fn set_paint(&mut self, paint: TextPaint);
    fn stroke_text(&mut self, text: &str, x: f32, y: f32) -> Result<(), RenderError>;
    fn fill_text(&mut self, text: &str, x: f32, y: f32) -> Result<(), RenderError>;
}
