//! Software canvas backed by an `RgbaImage`.
//!
//! Text is rasterized into a coverage mask in untransformed space, then
//! composited through the inverse of the current transform with
//! nearest-neighbour sampling. Strokes are an opaque outline reaching half the
//! line width past the glyph edge, so drawing stroke then fill gives the usual
//! outlined caption.

use super::{Affine, Canvas, HexColor, ImageFilter, TextPaint};
use crate::errors::RenderError;
use ab_glyph::{Font, FontArc, GlyphId, OutlinedGlyph, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage, imageops};

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    filter: ImageFilter,
    transform: Affine,
    paint: TextPaint,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            filter: ImageFilter::None,
            transform: Affine::IDENTITY,
            paint: TextPaint::default(),
        }
    }
}

pub struct RasterCanvas {
    surface: RgbaImage,
    font: Option<FontArc>,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
}

impl RasterCanvas {
    pub fn new(font: Option<FontArc>) -> Self {
        RasterCanvas {
            surface: RgbaImage::new(0, 0),
            font,
            state: GraphicsState::default(),
            saved: Vec::new(),
        }
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn into_image(self) -> RgbaImage {
        self.surface
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, stroke: bool) -> Result<(), RenderError> {
        let font = self.font.as_ref().ok_or(RenderError::FontUnavailable)?;
        let paint = self.state.paint;
        let radius = if stroke { (paint.line_width / 2.0).max(0.0) } else { 0.0 };
        let pad = radius.ceil() as i32 + 2;
        let Some(mask) = text_mask(font, paint.font_px, text, x, y, pad) else {
            return Ok(());
        };
        let (mask, color) = if stroke {
            (mask.outline(radius), paint.stroke)
        } else {
            (mask, paint.fill)
        };
        composite(&mut self.surface, &mask, self.state.transform, color);
        Ok(())
    }
}

impl Canvas for RasterCanvas {
    fn reset(&mut self, width: u32, height: u32) {
        self.surface = RgbaImage::new(width, height);
        self.state = GraphicsState::default();
        self.saved.clear();
    }

    fn set_filter(&mut self, filter: ImageFilter) {
        self.state.filter = filter;
    }

    fn draw_image(&mut self, image: &RgbaImage) {
        let filtered = self.state.filter.apply(image);
        imageops::overlay(&mut self.surface, &filtered, 0, 0);
    }

    fn save(&mut self) {
        self.saved.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn transform(&mut self, matrix: Affine) {
        self.state.transform = self.state.transform.multiply(matrix);
    }

    fn set_paint(&mut self, paint: TextPaint) {
        self.state.paint = paint;
    }

    fn stroke_text(&mut self, text: &str, x: f32, y: f32) -> Result<(), RenderError> {
        self.draw_text(text, x, y, true)
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) -> Result<(), RenderError> {
        self.draw_text(text, x, y, false)
    }
}

/// Coverage values in `[0, 1]` for the pixel rectangle starting at `(left, top)`.
#[derive(Debug, Clone, PartialEq)]
struct Mask {
    left: i32,
    top: i32,
    width: u32,
    height: u32,
    coverage: Vec<f32>,
}

impl Mask {
    fn blank(left: i32, top: i32, width: u32, height: u32) -> Self {
        Mask {
            left,
            top,
            width,
            height,
            coverage: vec![0.0; width as usize * height as usize],
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let (lx, ly) = (x - self.left, y - self.top);
        if lx < 0 || ly < 0 || lx >= self.width as i32 || ly >= self.height as i32 {
            return None;
        }
        Some(ly as usize * self.width as usize + lx as usize)
    }

    fn get(&self, x: i32, y: i32) -> f32 {
        self.index(x, y).map_or(0.0, |i| self.coverage[i])
    }

    fn accumulate(&mut self, x: i32, y: i32, value: f32) {
        if let Some(i) = self.index(x, y) {
            self.coverage[i] = (self.coverage[i] + value).min(1.0);
        }
    }

    /// Nearest sample at a point in mask space.
    fn sample(&self, x: f32, y: f32) -> f32 {
        self.get(x.floor() as i32, y.floor() as i32)
    }

    /// Coverage of an outline extending `radius` pixels past the shape.
    ///
    /// A neighbour `d` pixels away with coverage `c` puts the shape's edge
    /// roughly `d + 0.5 - c` from this pixel's centre. Everything within
    /// `radius` of that edge is fully covered, with a one pixel ramp after it.
    fn outline(&self, radius: f32) -> Mask {
        if radius <= 0.0 {
            return self.clone();
        }
        let limit = radius + 1.0;
        let reach = limit.ceil() as i32;
        let offsets: Vec<(i32, i32, f32)> = (-reach..=reach)
            .flat_map(|dy| (-reach..=reach).map(move |dx| (dx, dy, ((dx * dx + dy * dy) as f32).sqrt())))
            .filter(|&(_, _, distance)| distance < limit)
            .collect();

        let mut out = Mask::blank(self.left, self.top, self.width, self.height);
        for y in self.top..self.top + self.height as i32 {
            for x in self.left..self.left + self.width as i32 {
                let value = offsets
                    .iter()
                    .filter_map(|&(dx, dy, distance)| {
                        let coverage = self.get(x + dx, y + dy);
                        (coverage > 0.0).then(|| (radius + coverage - distance).clamp(0.0, 1.0))
                    })
                    .fold(0.0f32, f32::max);
                if let Some(i) = out.index(x, y) {
                    out.coverage[i] = value.max(self.coverage[i]);
                }
            }
        }
        out
    }
}

/// Lays `text` out centered on `x` with the em box's middle on `y`.
fn text_mask(font: &FontArc, font_px: f32, text: &str, x: f32, y: f32, pad: i32) -> Option<Mask> {
    let scaled = font.as_scaled(PxScale::from(font_px));
    let mut caret = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    let mut placed = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        placed.push((id, caret));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let origin_x = x - caret / 2.0;
    let baseline = y + (scaled.ascent() + scaled.descent()) / 2.0;
    let outlines: Vec<OutlinedGlyph> = placed
        .into_iter()
        .filter_map(|(id, offset)| {
            let glyph = id.with_scale_and_position(scaled.scale(), point(origin_x + offset, baseline));
            font.outline_glyph(glyph)
        })
        .collect();
    if outlines.is_empty() {
        return None;
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for outline in &outlines {
        let bounds = outline.px_bounds();
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    let left = min_x.floor() as i32 - pad;
    let top = min_y.floor() as i32 - pad;
    let width = (max_x.ceil() as i32 + pad - left).max(0) as u32;
    let height = (max_y.ceil() as i32 + pad - top).max(0) as u32;

    let mut mask = Mask::blank(left, top, width, height);
    for outline in &outlines {
        let bounds = outline.px_bounds();
        let (gx, gy) = (bounds.min.x as i32, bounds.min.y as i32);
        outline.draw(|px, py, coverage| mask.accumulate(gx + px as i32, gy + py as i32, coverage));
    }
    Some(mask)
}

/// Paints `color` through `mask` after mapping the mask by `transform`.
/// A singular transform draws nothing.
fn composite(surface: &mut RgbaImage, mask: &Mask, transform: Affine, color: HexColor) {
    let Some(inverse) = transform.invert() else {
        return;
    };
    let (x0, y0) = (mask.left as f32, mask.top as f32);
    let (x1, y1) = (x0 + mask.width as f32, y0 + mask.height as f32);
    let corners = [(x0, y0), (x1, y0), (x0, y1), (x1, y1)].map(|(x, y)| transform.apply(x, y));
    let min_x = corners.iter().map(|c| c.0).fold(f32::MAX, f32::min).floor().max(0.0);
    let min_y = corners.iter().map(|c| c.1).fold(f32::MAX, f32::min).floor().max(0.0);
    let max_x = corners.iter().map(|c| c.0).fold(f32::MIN, f32::max).ceil().min(surface.width() as f32);
    let max_y = corners.iter().map(|c| c.1).fold(f32::MIN, f32::max).ceil().min(surface.height() as f32);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    for dy in min_y as u32..max_y as u32 {
        for dx in min_x as u32..max_x as u32 {
            let (ux, uy) = inverse.apply(dx as f32 + 0.5, dy as f32 + 0.5);
            let coverage = mask.sample(ux, uy);
            if coverage > 0.0 {
                blend(surface.get_pixel_mut(dx, dy), color, coverage);
            }
        }
    }
}

/// Source-over on straight (non-premultiplied) alpha.
fn blend(dst: &mut Rgba<u8>, color: HexColor, coverage: f32) {
    let [sr, sg, sb, sa] = color.channels();
    let src_a = sa as f32 / 255.0 * coverage;
    let dst_a = dst.0[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for (channel, src) in dst.0.iter_mut().take(3).zip([sr, sg, sb]) {
        let value = (src as f32 * src_a + *channel as f32 * dst_a * (1.0 - src_a)) / out_a;
        *channel = value.round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}
