use crate::render::{HexColor, ImageFilter, TextEffect};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MIN_FONT_SIZE: u32 = 12;
pub const MAX_FONT_SIZE: u32 = 120;
pub const DEFAULT_FONT_SIZE: u32 = 48;
pub const DEFAULT_TEXT_POSITION: f32 = 0.1;

/// Which caption a style field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Top,
    Bottom,
}

/// Borrowed view of one caption's text and style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayer<'a> {
    pub text: &'a str,
    pub size: u32,
    pub color: HexColor,
    pub stroke: HexColor,
    pub position: f32,
    pub effect: TextEffect,
}

/// Every editable attribute of a meme except its image and draft flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct EditState {
    #[validate(length(max = 100, message = "title must be at most 100 characters"))]
    pub title: String,
    #[validate(length(max = 100, message = "topText must be at most 100 characters"))]
    pub top_text: String,
    #[validate(length(max = 100, message = "bottomText must be at most 100 characters"))]
    pub bottom_text: String,
    pub top_text_size: u32,
    pub bottom_text_size: u32,
    pub top_text_color: HexColor,
    pub bottom_text_color: HexColor,
    pub top_text_stroke: HexColor,
    pub bottom_text_stroke: HexColor,
    pub top_text_position: f32,
    pub bottom_text_position: f32,
    pub top_text_effect: TextEffect,
    pub bottom_text_effect: TextEffect,
    pub image_filter: ImageFilter,
}

impl Default for EditState {
    fn default() -> Self {
        EditState {
            title: String::new(),
            top_text: String::new(),
            bottom_text: String::new(),
            top_text_size: DEFAULT_FONT_SIZE,
            bottom_text_size: DEFAULT_FONT_SIZE,
            top_text_color: HexColor::WHITE,
            bottom_text_color: HexColor::WHITE,
            top_text_stroke: HexColor::BLACK,
            bottom_text_stroke: HexColor::BLACK,
            top_text_position: DEFAULT_TEXT_POSITION,
            bottom_text_position: DEFAULT_TEXT_POSITION,
            top_text_effect: TextEffect::None,
            bottom_text_effect: TextEffect::None,
            image_filter: ImageFilter::None,
        }
    }
}

/// A partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_text_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_text_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_text_color: Option<HexColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_text_color: Option<HexColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_text_stroke: Option<HexColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_text_stroke: Option<HexColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_text_position: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_text_position: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_text_effect: Option<TextEffect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_text_effect: Option<TextEffect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_filter: Option<ImageFilter>,
}

impl EditState {
    pub fn layer(&self, layer: Layer) -> TextLayer<'_> {
        match layer {
            Layer::Top => TextLayer {
                text: &self.top_text,
                size: self.top_text_size,
                color: self.top_text_color,
                stroke: self.top_text_stroke,
                position: self.top_text_position,
                effect: self.top_text_effect,
            },
            Layer::Bottom => TextLayer {
                text: &self.bottom_text,
                size: self.bottom_text_size,
                color: self.bottom_text_color,
                stroke: self.bottom_text_stroke,
                position: self.bottom_text_position,
                effect: self.bottom_text_effect,
            },
        }
    }

    /// Merges `patch` into a copy of `self` and normalizes the result.
    pub fn merge(&self, patch: &EditPatch) -> EditState {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(text) = &patch.top_text {
            next.top_text = text.clone();
        }
        if let Some(text) = &patch.bottom_text {
            next.bottom_text = text.clone();
        }
        if let Some(size) = patch.top_text_size {
            next.top_text_size = clamp_font_size(size);
        }
        if let Some(size) = patch.bottom_text_size {
            next.bottom_text_size = clamp_font_size(size);
        }
        next.top_text_color = patch.top_text_color.unwrap_or(next.top_text_color);
        next.bottom_text_color = patch.bottom_text_color.unwrap_or(next.bottom_text_color);
        next.top_text_stroke = patch.top_text_stroke.unwrap_or(next.top_text_stroke);
        next.bottom_text_stroke = patch.bottom_text_stroke.unwrap_or(next.bottom_text_stroke);
        next.top_text_position = patch.top_text_position.unwrap_or(next.top_text_position);
        next.bottom_text_position = patch.bottom_text_position.unwrap_or(next.bottom_text_position);
        next.top_text_effect = patch.top_text_effect.unwrap_or(next.top_text_effect);
        next.bottom_text_effect = patch.bottom_text_effect.unwrap_or(next.bottom_text_effect);
        next.image_filter = patch.image_filter.unwrap_or(next.image_filter);
        next.normalized()
    }

    /// Trims text and pulls numeric fields back inside their bounds.
    pub fn normalized(mut self) -> EditState {
        self.title = self.title.trim().to_string();
        self.top_text = self.top_text.trim().to_string();
        self.bottom_text = self.bottom_text.trim().to_string();
        self.top_text_size = self.top_text_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.bottom_text_size = self.bottom_text_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.top_text_position = clamp_position(self.top_text_position);
        self.bottom_text_position = clamp_position(self.bottom_text_position);
        self
    }

    /// Form fields in the order the create-meme endpoint reads them.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("title", self.title.clone()),
            ("topText", self.top_text.clone()),
            ("bottomText", self.bottom_text.clone()),
            ("topTextSize", self.top_text_size.to_string()),
            ("bottomTextSize", self.bottom_text_size.to_string()),
            ("topTextColor", self.top_text_color.to_string()),
            ("bottomTextColor", self.bottom_text_color.to_string()),
            ("topTextStroke", self.top_text_stroke.to_string()),
            ("bottomTextStroke", self.bottom_text_stroke.to_string()),
            ("topTextPosition", self.top_text_position.to_string()),
            ("bottomTextPosition", self.bottom_text_position.to_string()),
            ("topTextEffect", self.top_text_effect.to_string()),
            ("bottomTextEffect", self.bottom_text_effect.to_string()),
            ("imageFilter", self.image_filter.to_string()),
        ]
    }
}

fn clamp_font_size(size: i64) -> u32 {
    size.clamp(MIN_FONT_SIZE as i64, MAX_FONT_SIZE as i64) as u32
}

fn clamp_position(position: f32) -> f32 {
    if position.is_nan() {
        DEFAULT_TEXT_POSITION
    } else {
        position.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_patched_fields() {
        let base = EditState::default();
        let patch = EditPatch {
            top_text: Some("  one does not simply  ".into()),
            bottom_text_color: Some(HexColor::rgb(0, 255, 0)),
            ..EditPatch::default()
        };
        let next = base.merge(&patch);
        assert_eq!(next.top_text, "one does not simply");
        assert_eq!(next.bottom_text_color, HexColor::rgb(0, 255, 0));
        assert_eq!(next.top_text_color, base.top_text_color);
        assert_eq!(next.bottom_text_size, DEFAULT_FONT_SIZE);
    }

    #[test]
    fn merge_clamps_out_of_range_numbers() {
        let patch = EditPatch {
            top_text_size: Some(500),
            bottom_text_size: Some(-3),
            top_text_position: Some(4.2),
            bottom_text_position: Some(f32::NAN),
            ..EditPatch::default()
        };
        let next = EditState::default().merge(&patch);
        assert_eq!(next.top_text_size, MAX_FONT_SIZE);
        assert_eq!(next.bottom_text_size, MIN_FONT_SIZE);
        assert_eq!(next.top_text_position, 1.0);
        assert_eq!(next.bottom_text_position, DEFAULT_TEXT_POSITION);
    }

    #[test]
    fn validation_caps_caption_length() {
        let state = EditState {
            top_text: "x".repeat(101),
            ..EditState::default()
        };
        assert!(state.validate().is_err());
        let state = EditState {
            top_text: "x".repeat(100),
            ..EditState::default()
        };
        assert!(state.validate().is_ok());
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let state: EditState = serde_json::from_value(serde_json::json!({
            "topText": "hi",
            "topTextEffect": "rotate(15deg)",
            "imageFilter": "sepia(100%)",
        }))
        .unwrap();
        assert_eq!(state.top_text, "hi");
        assert_eq!(state.top_text_effect, TextEffect::Rotate(15.0));
        assert_eq!(state.image_filter, ImageFilter::Sepia(1.0));
        assert_eq!(state.bottom_text_stroke, HexColor::BLACK);
    }
}
