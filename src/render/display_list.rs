use super::{Affine, Canvas, ImageFilter, TextPaint};
use crate::errors::RenderError;
use image::RgbaImage;

/// One recorded canvas call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Reset { width: u32, height: u32 },
    SetFilter(ImageFilter),
    DrawImage { width: u32, height: u32 },
    Save,
    Restore,
    Transform(Affine),
    SetPaint(TextPaint),
    StrokeText { text: String, x: f32, y: f32 },
    FillText { text: String, x: f32, y: f32 },
}

/// A canvas that records calls instead of rasterizing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    pub ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(text, x, y)` of every filled caption, in drawing order.
    pub fn text_anchors(&self) -> Vec<(&str, f32, f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::FillText { text, x, y } => Some((text.as_str(), *x, *y)),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for DisplayList {
    fn reset(&mut self, width: u32, height: u32) {
        self.ops.clear();
        self.ops.push(DrawOp::Reset { width, height });
    }

    fn set_filter(&mut self, filter: ImageFilter) {
        self.ops.push(DrawOp::SetFilter(filter));
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        let (width, height) = image.dimensions();
        self.ops.push(DrawOp::DrawImage { width, height });
    }

    fn save(&mut self) {
        self.ops.push(DrawOp::Save);
    }

    fn restore(&mut self) {
        self.ops.push(DrawOp::Restore);
    }

    fn transform(&mut self, matrix: Affine) {
        self.ops.push(DrawOp::Transform(matrix));
    }

    fn set_paint(&mut self, paint: TextPaint) {
        self.ops.push(DrawOp::SetPaint(paint));
    }

    fn stroke_text(&mut self, text: &str, x: f32, y: f32) -> Result<(), RenderError> {
        self.ops.push(DrawOp::StrokeText { text: text.to_string(), x, y });
        Ok(())
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) -> Result<(), RenderError> {
        self.ops.push(DrawOp::FillText { text: text.to_string(), x, y });
        Ok(())
    }
}
