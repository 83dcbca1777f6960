//! Meme compositing: a base image plus the top and bottom captions.
//!
//! [`compose`] is a pure function of the edit state and the decoded image; it
//! talks to any [`Canvas`]. [`RasterCanvas`] produces pixels and
//! [`DisplayList`] records the calls for inspection.

pub mod canvas;
pub mod color;
pub mod display_list;
pub mod effects;
pub mod raster;

pub use canvas::{Canvas, TextPaint};
pub use color::{ColorParseError, HexColor};
pub use display_list::{DisplayList, DrawOp};
pub use effects::{Affine, EffectParseError, ImageFilter, TextEffect};
pub use raster::RasterCanvas;

use crate::editor::{EditState, Layer};
use crate::errors::RenderError;
use ab_glyph::FontArc;
use image::{ImageFormat, RgbaImage};
use std::{io::Cursor, path::Path};

/// Stroke width is the font size divided by this.
pub const STROKE_RATIO: f32 = 20.0;

/// Vertical anchor of a caption. The bottom position is measured from the
/// bottom edge.
pub fn anchor_y(layer: Layer, height: u32, position: f32) -> f32 {
    let height = height as f32;
    match layer {
        Layer::Top => height * position,
        Layer::Bottom => height * (1.0 - position),
    }
}

/// Draws `image` and both captions onto `canvas`, sized to the image.
pub fn compose<C: Canvas>(canvas: &mut C, state: &EditState, image: &RgbaImage) -> Result<(), RenderError> {
    let (width, height) = image.dimensions();
    canvas.reset(width, height);
    canvas.set_filter(state.image_filter);
    canvas.draw_image(image);
    canvas.set_filter(ImageFilter::None);

    for layer in [Layer::Top, Layer::Bottom] {
        let caption = state.layer(layer);
        if caption.text.is_empty() {
            continue;
        }
        let x = width as f32 / 2.0;
        let y = anchor_y(layer, height, caption.position);
        let font_px = caption.size as f32;

        canvas.save();
        canvas.set_paint(TextPaint {
            font_px,
            fill: caption.color,
            stroke: caption.stroke,
            line_width: font_px / STROKE_RATIO,
        });
        if let Some(matrix) = caption.effect.affine_at(x, y) {
            canvas.transform(matrix);
        }
        let drawn = canvas
            .stroke_text(caption.text, x, y)
            .and_then(|()| canvas.fill_text(caption.text, x, y));
        canvas.restore();
        drawn?;
    }
    Ok(())
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|e| RenderError::ImageLoad(e.to_string()))
}

/// Decodes `bytes` before touching the canvas, so a bad image leaves the
/// previous frame in place.
pub fn compose_bytes<C: Canvas>(canvas: &mut C, state: &EditState, bytes: &[u8]) -> Result<(), RenderError> {
    let image = decode_image(bytes)?;
    compose(canvas, state, &image)
}

pub fn render_image(state: &EditState, image: &RgbaImage, font: Option<FontArc>) -> Result<RgbaImage, RenderError> {
    let mut canvas = RasterCanvas::new(font);
    compose(&mut canvas, state, image)?;
    Ok(canvas.into_image())
}

/// Full pipeline used by the render endpoint: decode, composite, encode PNG.
pub fn render_png(state: &EditState, bytes: &[u8], font: Option<FontArc>) -> Result<Vec<u8>, RenderError> {
    let image = decode_image(bytes)?;
    encode_png(&render_image(state, &image, font)?)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Bold face compiled into the binary, used when no font file is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansCondensed-Bold.ttf");

pub fn bundled_font() -> Result<FontArc, RenderError> {
    FontArc::try_from_slice(BUNDLED_FONT).map_err(|e| RenderError::InvalidFont(format!("bundled font: {e}")))
}

pub fn load_font(path: &Path) -> Result<FontArc, RenderError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RenderError::InvalidFont(format!("{}: {}", path.display(), e)))?;
    FontArc::try_from_vec(bytes).map_err(|e| RenderError::InvalidFont(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditPatch;
    use ab_glyph::Font;
    use assert_matches::assert_matches;
    use image::Rgba;

    fn captioned() -> EditState {
        EditState::default().merge(&EditPatch {
            top_text: Some("TOP".into()),
            bottom_text: Some("BOTTOM".into()),
            top_text_position: Some(0.1),
            bottom_text_position: Some(0.1),
            ..EditPatch::default()
        })
    }

    #[test]
    fn anchors_on_800_by_600() {
        let mut canvas = DisplayList::new();
        let image = RgbaImage::new(800, 600);
        compose(&mut canvas, &captioned(), &image).unwrap();

        let anchors = canvas.text_anchors();
        assert_eq!(anchors.len(), 2);
        let (text, x, y) = anchors[0];
        assert_eq!(text, "TOP");
        assert!((x - 400.0).abs() < 1e-3 && (y - 60.0).abs() < 1e-3);
        let (text, x, y) = anchors[1];
        assert_eq!(text, "BOTTOM");
        assert!((x - 400.0).abs() < 1e-3 && (y - 540.0).abs() < 1e-3);
    }

    #[test]
    fn filter_is_reset_before_text_and_layers_are_isolated() {
        let state = captioned().merge(&EditPatch {
            image_filter: Some(ImageFilter::Sepia(1.0)),
            top_text_effect: Some(TextEffect::Rotate(15.0)),
            ..EditPatch::default()
        });
        let mut canvas = DisplayList::new();
        compose(&mut canvas, &state, &RgbaImage::new(100, 50)).unwrap();

        assert_eq!(canvas.ops[0], DrawOp::Reset { width: 100, height: 50 });
        assert_eq!(canvas.ops[1], DrawOp::SetFilter(ImageFilter::Sepia(1.0)));
        assert_eq!(canvas.ops[2], DrawOp::DrawImage { width: 100, height: 50 });
        assert_eq!(canvas.ops[3], DrawOp::SetFilter(ImageFilter::None));

        let transforms = canvas.ops.iter().filter(|op| matches!(op, DrawOp::Transform(_))).count();
        assert_eq!(transforms, 1);
        let saves = canvas.ops.iter().filter(|op| **op == DrawOp::Save).count();
        let restores = canvas.ops.iter().filter(|op| **op == DrawOp::Restore).count();
        assert_eq!((saves, restores), (2, 2));

        let stroke_then_fill: Vec<_> = canvas
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::StrokeText { .. } | DrawOp::FillText { .. }))
            .collect();
        assert_matches!(stroke_then_fill[0], DrawOp::StrokeText { .. });
        assert_matches!(stroke_then_fill[1], DrawOp::FillText { .. });
    }

    #[test]
    fn paint_uses_size_over_twenty_for_stroke() {
        let mut canvas = DisplayList::new();
        compose(&mut canvas, &captioned(), &RgbaImage::new(10, 10)).unwrap();
        let paint = canvas.ops.iter().find_map(|op| match op {
            DrawOp::SetPaint(paint) => Some(*paint),
            _ => None,
        });
        let paint = paint.unwrap();
        assert_eq!(paint.font_px, 48.0);
        assert!((paint.line_width - 2.4).abs() < 1e-6);
        assert_eq!(paint.fill, HexColor::WHITE);
        assert_eq!(paint.stroke, HexColor::BLACK);
    }

    #[test]
    fn empty_captions_are_skipped() {
        let mut canvas = DisplayList::new();
        compose(&mut canvas, &EditState::default(), &RgbaImage::new(10, 10)).unwrap();
        assert_eq!(canvas.ops.len(), 4);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut image = RgbaImage::new(16, 16);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgba([(x * 16) as u8, (y * 16) as u8, 90, 255]);
        }
        let state = EditState {
            image_filter: ImageFilter::Blur(1.5),
            ..EditState::default()
        };
        let first = render_image(&state, &image, None).unwrap();
        let second = render_image(&state, &image, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.dimensions(), (16, 16));
    }

    fn captions_at(effect: TextEffect) -> EditState {
        EditState::default().merge(&EditPatch {
            top_text: Some("ROTATE ME".into()),
            bottom_text: Some("SKEW".into()),
            top_text_position: Some(0.3),
            bottom_text_position: Some(0.3),
            top_text_effect: Some(effect),
            ..EditPatch::default()
        })
    }

    #[test]
    fn captioned_rendering_is_deterministic() {
        let font = bundled_font().unwrap();
        let base = RgbaImage::from_pixel(240, 180, Rgba([40, 90, 160, 255]));
        let state = captions_at(TextEffect::None);
        let first = render_image(&state, &base, Some(font.clone())).unwrap();
        let second = render_image(&state, &base, Some(font)).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, base);
        assert!(first.pixels().any(|p| p.0 == [0, 0, 0, 255]));
        assert!(first.pixels().any(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn text_effects_move_the_glyphs() {
        let font = bundled_font().unwrap();
        let base = RgbaImage::from_pixel(240, 240, Rgba([40, 90, 160, 255]));
        let plain = render_image(&captions_at(TextEffect::None), &base, Some(font.clone())).unwrap();
        for effect in [TextEffect::Rotate(15.0), TextEffect::Skew(20.0)] {
            let once = render_image(&captions_at(effect), &base, Some(font.clone())).unwrap();
            let again = render_image(&captions_at(effect), &base, Some(font.clone())).unwrap();
            assert_eq!(once, again, "{effect:?} is deterministic");
            assert_ne!(once, plain, "{effect:?} changes the top caption");
            // Only the top layer carries the effect.
            let bottom_rows = |image: &RgbaImage| image.rows().skip(140).flatten().copied().collect::<Vec<_>>();
            assert_eq!(bottom_rows(&once), bottom_rows(&plain));
        }
    }

    #[test]
    fn bundled_font_has_caption_glyphs() {
        let font = bundled_font().unwrap();
        assert!("AZaz09!?".chars().all(|ch| font.glyph_id(ch).0 != 0));
    }

    #[test]
    fn filter_applies_to_the_image() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let state = EditState {
            image_filter: ImageFilter::Invert(1.0),
            ..EditState::default()
        };
        let out = render_image(&state, &image, None).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 255, 255, 255]));
    }

    #[test]
    fn bad_image_leaves_surface_untouched() {
        let mut canvas = RasterCanvas::new(None);
        let base = RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255]));
        compose(&mut canvas, &EditState::default(), &base).unwrap();

        let result = compose_bytes(&mut canvas, &EditState::default(), b"definitely not an image");
        assert_matches!(result, Err(RenderError::ImageLoad(_)));
        assert_eq!(canvas.surface(), &base);
    }

    #[test]
    fn captions_without_a_font_fail_cleanly() {
        let result = render_image(&captioned(), &RgbaImage::new(8, 8), None);
        assert_matches!(result, Err(RenderError::FontUnavailable));
    }

    #[test]
    fn png_round_trips_through_decoder() {
        let image = RgbaImage::from_pixel(5, 4, Rgba([9, 8, 7, 255]));
        let png = encode_png(&image).unwrap();
        assert_eq!(decode_image(&png).unwrap(), image);
    }
}
