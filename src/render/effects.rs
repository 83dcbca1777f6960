//! Text transform effects and image filters, with their string encodings.
//!
//! Both types round-trip through the strings stored on a meme record
//! (`topTextEffect`, `imageFilter`, ...), so they serialize as strings.

use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectParseError {
    #[error("Unknown text effect '{0}'")]
    UnknownEffect(String),
    #[error("Unknown image filter '{0}'")]
    UnknownFilter(String),
    #[error("Invalid numeric argument in '{0}'")]
    BadArgument(String),
}

/// 2D affine matrix in canvas order: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Affine { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Affine { e: tx, f: ty, ..Affine::IDENTITY }
    }

    pub fn rotate(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Affine::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    pub fn skew_x(radians: f32) -> Self {
        Affine::new(1.0, 0.0, radians.tan(), 1.0, 0.0, 0.0)
    }

    /// `self * rhs`: applies `rhs` first, then `self`.
    pub fn multiply(self, rhs: Affine) -> Affine {
        Affine {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            e: self.a * rhs.e + self.c * rhs.f + self.e,
            f: self.b * rhs.e + self.d * rhs.f + self.f,
        }
    }

    /// Conjugates the matrix so it acts around `(x, y)` instead of the origin.
    pub fn about(self, x: f32, y: f32) -> Affine {
        Affine::translate(x, y)
            .multiply(self)
            .multiply(Affine::translate(-x, -y))
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Returns `None` for singular or non-finite matrices.
    pub fn invert(&self) -> Option<Affine> {
        if !self.is_finite() {
            return None;
        }
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        Some(Affine {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

/// Transform applied to one caption layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextEffect {
    #[default]
    None,
    /// Raw coefficients, applied in canvas coordinates.
    Matrix(Affine),
    /// Rotation in degrees around the caption anchor.
    Rotate(f32),
    /// Horizontal skew in degrees around the caption anchor.
    Skew(f32),
}

impl TextEffect {
    /// Matrix to apply before drawing a caption anchored at `(x, y)`.
    pub fn affine_at(&self, x: f32, y: f32) -> Option<Affine> {
        match *self {
            TextEffect::None => None,
            TextEffect::Matrix(m) => Some(m),
            TextEffect::Rotate(deg) => Some(Affine::rotate(deg.to_radians()).about(x, y)),
            TextEffect::Skew(deg) => Some(Affine::skew_x(deg.to_radians()).about(x, y)),
        }
    }
}

impl FromStr for TextEffect {
    type Err = EffectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
            return Ok(TextEffect::None);
        }
        if let Some(arg) = function_arg(raw, "rotate") {
            return parse_degrees(arg, s).map(TextEffect::Rotate);
        }
        if let Some(arg) = function_arg(raw, "skew") {
            return parse_degrees(arg, s).map(TextEffect::Skew);
        }
        let coefficients = function_arg(raw, "matrix").unwrap_or(raw);
        let numbers = coefficients
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| EffectParseError::UnknownEffect(s.to_string()))?;
        match numbers.as_slice() {
            &[a, b, c, d, e, f] => {
                let matrix = Affine::new(a, b, c, d, e, f);
                if matrix.is_finite() {
                    Ok(TextEffect::Matrix(matrix))
                } else {
                    Err(EffectParseError::BadArgument(s.to_string()))
                }
            }
            _ => Err(EffectParseError::UnknownEffect(s.to_string())),
        }
    }
}

impl fmt::Display for TextEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEffect::None => f.write_str("none"),
            TextEffect::Matrix(m) => write!(f, "{} {} {} {} {} {}", m.a, m.b, m.c, m.d, m.e, m.f),
            TextEffect::Rotate(deg) => write!(f, "rotate({deg}deg)"),
            TextEffect::Skew(deg) => write!(f, "skew({deg}deg)"),
        }
    }
}

impl TryFrom<String> for TextEffect {
    type Error = EffectParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TextEffect> for String {
    fn from(effect: TextEffect) -> Self {
        effect.to_string()
    }
}

/// Whole-image filter with CSS `filter` semantics. Amounts are fractions
/// (`grayscale(100%)` is `Grayscale(1.0)`), blur is a radius in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageFilter {
    #[default]
    None,
    Grayscale(f32),
    Sepia(f32),
    Invert(f32),
    Blur(f32),
    Brightness(f32),
    Contrast(f32),
}

impl ImageFilter {
    /// Returns a filtered copy of `image`. Color filters leave alpha untouched.
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match *self {
            ImageFilter::None => image.clone(),
            ImageFilter::Blur(radius) if radius <= 0.0 => image.clone(),
            ImageFilter::Blur(radius) => imageops::blur(image, radius),
            ImageFilter::Grayscale(amount) => {
                let s = 1.0 - amount;
                map_rgb(image, [
                    [0.2126 + 0.7874 * s, 0.7152 - 0.7152 * s, 0.0722 - 0.0722 * s],
                    [0.2126 - 0.2126 * s, 0.7152 + 0.2848 * s, 0.0722 - 0.0722 * s],
                    [0.2126 - 0.2126 * s, 0.7152 - 0.7152 * s, 0.0722 + 0.9278 * s],
                ])
            }
            ImageFilter::Sepia(amount) => {
                let s = 1.0 - amount;
                map_rgb(image, [
                    [0.393 + 0.607 * s, 0.769 - 0.769 * s, 0.189 - 0.189 * s],
                    [0.349 - 0.349 * s, 0.686 + 0.314 * s, 0.168 - 0.168 * s],
                    [0.272 - 0.272 * s, 0.534 - 0.534 * s, 0.131 + 0.869 * s],
                ])
            }
            ImageFilter::Invert(amount) => {
                map_channels(image, |c| amount * (1.0 - c) + (1.0 - amount) * c)
            }
            ImageFilter::Brightness(factor) => map_channels(image, |c| c * factor),
            ImageFilter::Contrast(factor) => map_channels(image, |c| (c - 0.5) * factor + 0.5),
        }
    }
}

fn map_channels(image: &RgbaImage, f: impl Fn(f32) -> f32) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = to_byte(f(*channel as f32 / 255.0));
        }
    }
    out
}

fn map_rgb(image: &RgbaImage, matrix: [[f32; 3]; 3]) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b, _] = pixel.0.map(|c| c as f32 / 255.0);
        for (channel, row) in pixel.0.iter_mut().zip(matrix) {
            *channel = to_byte(row[0] * r + row[1] * g + row[2] * b);
        }
    }
    out
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl FromStr for ImageFilter {
    type Err = EffectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
            return Ok(ImageFilter::None);
        }
        let (name, arg) = raw
            .split_once('(')
            .and_then(|(name, rest)| rest.strip_suffix(')').map(|arg| (name.trim(), arg.trim())))
            .ok_or_else(|| EffectParseError::UnknownFilter(s.to_string()))?;
        let name = name.to_ascii_lowercase();
        if name == "blur" {
            let radius = match arg {
                "" => 0.0,
                _ => parse_number(arg.strip_suffix("px").unwrap_or(arg), s)?,
            };
            return Ok(ImageFilter::Blur(radius.max(0.0)));
        }
        let amount = match arg {
            "" => 1.0,
            _ => match arg.strip_suffix('%') {
                Some(percent) => parse_number(percent, s)? / 100.0,
                None => parse_number(arg, s)?,
            },
        };
        let unit = amount.clamp(0.0, 1.0);
        match name.as_str() {
            "grayscale" => Ok(ImageFilter::Grayscale(unit)),
            "sepia" => Ok(ImageFilter::Sepia(unit)),
            "invert" => Ok(ImageFilter::Invert(unit)),
            "brightness" => Ok(ImageFilter::Brightness(amount.max(0.0))),
            "contrast" => Ok(ImageFilter::Contrast(amount.max(0.0))),
            _ => Err(EffectParseError::UnknownFilter(s.to_string())),
        }
    }
}

impl fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ImageFilter::None => f.write_str("none"),
            ImageFilter::Grayscale(a) => write!(f, "grayscale({}%)", a * 100.0),
            ImageFilter::Sepia(a) => write!(f, "sepia({}%)", a * 100.0),
            ImageFilter::Invert(a) => write!(f, "invert({}%)", a * 100.0),
            ImageFilter::Blur(px) => write!(f, "blur({px}px)"),
            ImageFilter::Brightness(a) => write!(f, "brightness({}%)", a * 100.0),
            ImageFilter::Contrast(a) => write!(f, "contrast({}%)", a * 100.0),
        }
    }
}

impl TryFrom<String> for ImageFilter {
    type Error = EffectParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageFilter> for String {
    fn from(filter: ImageFilter) -> Self {
        filter.to_string()
    }
}

fn function_arg<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    let prefix = raw.get(..name.len())?;
    if !prefix.eq_ignore_ascii_case(name) {
        return None;
    }
    raw[name.len()..]
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

fn parse_degrees(arg: &str, original: &str) -> Result<f32, EffectParseError> {
    parse_number(arg.strip_suffix("deg").unwrap_or(arg), original)
}

fn parse_number(value: &str, original: &str) -> Result<f32, EffectParseError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EffectParseError::BadArgument(original.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    #[test]
    fn parses_space_separated_matrix() {
        let effect: TextEffect = "1 0 0 1 10 -5".parse().unwrap();
        assert_eq!(effect, TextEffect::Matrix(Affine::new(1.0, 0.0, 0.0, 1.0, 10.0, -5.0)));
        assert_eq!(effect.to_string(), "1 0 0 1 10 -5");
    }

    #[test]
    fn parses_matrix_function_and_presets() {
        assert_eq!(
            "matrix(2, 0, 0, 2, 0, 0)".parse::<TextEffect>().unwrap(),
            TextEffect::Matrix(Affine::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0))
        );
        assert_eq!("rotate(-15deg)".parse::<TextEffect>().unwrap(), TextEffect::Rotate(-15.0));
        assert_eq!("skew(10deg)".parse::<TextEffect>().unwrap(), TextEffect::Skew(10.0));
        assert_eq!("none".parse::<TextEffect>().unwrap(), TextEffect::None);
        assert_eq!("".parse::<TextEffect>().unwrap(), TextEffect::None);
    }

    #[test]
    fn rejects_garbage_effects() {
        assert!("wobble".parse::<TextEffect>().is_err());
        assert!("1 2 3".parse::<TextEffect>().is_err());
        assert!("rotate(abc)".parse::<TextEffect>().is_err());
        assert!("1 0 0 1 NaN 0".parse::<TextEffect>().is_err());
    }

    #[test]
    fn rotate_preset_pivots_about_anchor() {
        let matrix = TextEffect::Rotate(180.0).affine_at(400.0, 60.0).unwrap();
        assert!(close(matrix.apply(400.0, 60.0), (400.0, 60.0)));
        assert!(close(matrix.apply(410.0, 60.0), (390.0, 60.0)));
    }

    #[test]
    fn inverse_round_trips_points() {
        let m = Affine::rotate(0.3).multiply(Affine::translate(12.0, -7.0));
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(33.0, 44.0);
        assert!(close(inv.apply(x, y), (33.0, 44.0)));
        assert!(Affine::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0).invert().is_none());
    }

    #[test]
    fn parses_css_filters() {
        assert_eq!("grayscale(100%)".parse::<ImageFilter>().unwrap(), ImageFilter::Grayscale(1.0));
        assert_eq!("sepia(50%)".parse::<ImageFilter>().unwrap(), ImageFilter::Sepia(0.5));
        assert_eq!("blur(2px)".parse::<ImageFilter>().unwrap(), ImageFilter::Blur(2.0));
        assert_eq!("brightness(150%)".parse::<ImageFilter>().unwrap(), ImageFilter::Brightness(1.5));
        assert_eq!("contrast(2)".parse::<ImageFilter>().unwrap(), ImageFilter::Contrast(2.0));
        assert_eq!("none".parse::<ImageFilter>().unwrap(), ImageFilter::None);
        assert!("vignette(10%)".parse::<ImageFilter>().is_err());
        assert!("grayscale".parse::<ImageFilter>().is_err());
    }

    #[test]
    fn filter_strings_round_trip() {
        for raw in ["grayscale(100%)", "invert(100%)", "blur(2px)", "contrast(200%)"] {
            let filter: ImageFilter = raw.parse().unwrap();
            assert_eq!(filter.to_string(), raw);
        }
    }

    #[test]
    fn invert_and_grayscale_pixels() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 200]));

        let inverted = ImageFilter::Invert(1.0).apply(&image);
        assert_eq!(inverted.get_pixel(0, 0), &Rgba([0, 255, 255, 200]));

        let gray = ImageFilter::Grayscale(1.0).apply(&image);
        let [r, g, b, a] = gray.get_pixel(1, 1).0;
        assert_eq!((r, a), (54, 200));
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn no_filter_is_identity() {
        let image = RgbaImage::from_pixel(3, 1, Rgba([10, 20, 30, 255]));
        assert_eq!(ImageFilter::None.apply(&image), image);
        assert_eq!(ImageFilter::Blur(0.0).apply(&image), image);
    }
}
