use super::ClientError;
use crate::{
    editor::{EditHistory, EditPatch, EditState, Layer},
    render::{self, HexColor, ImageFilter, TextEffect},
};
use ab_glyph::FontArc;
use image::RgbaImage;
use validator::Validate;

/// A stock image from the built-in gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub url: &'static str,
}

pub const TEMPLATES: &[Template] = &[
    Template { name: "Drake Hotline Bling", url: "https://i.imgflip.com/30b1gx.jpg" },
    Template { name: "Two Buttons", url: "https://i.imgflip.com/1g8my4.jpg" },
    Template { name: "Distracted Boyfriend", url: "https://i.imgflip.com/1ur9b0.jpg" },
    Template { name: "Change My Mind", url: "https://i.imgflip.com/24y43o.jpg" },
    Template { name: "Expanding Brain", url: "https://i.imgflip.com/1jwhww.jpg" },
];

/// A caption look applied to both layers at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub name: &'static str,
    pub color: HexColor,
    pub stroke: HexColor,
    pub size: u32,
}

pub const TEXT_STYLES: &[TextStyle] = &[
    TextStyle {
        name: "Classic",
        color: HexColor::rgb(0xff, 0xff, 0xff),
        stroke: HexColor::rgb(0x00, 0x00, 0x00),
        size: 48,
    },
    TextStyle {
        name: "Dark",
        color: HexColor::rgb(0x00, 0x00, 0x00),
        stroke: HexColor::rgb(0xff, 0xff, 0xff),
        size: 48,
    },
    TextStyle {
        name: "Neon",
        color: HexColor::rgb(0x00, 0xff, 0x00),
        stroke: HexColor::rgb(0x00, 0x00, 0x00),
        size: 48,
    },
    TextStyle {
        name: "Vintage",
        color: HexColor::rgb(0xff, 0xd7, 0x00),
        stroke: HexColor::rgb(0x8b, 0x45, 0x13),
        size: 48,
    },
    TextStyle {
        name: "Minimal",
        color: HexColor::rgb(0xff, 0xff, 0xff),
        stroke: HexColor::rgb(0x66, 0x66, 0x66),
        size: 36,
    },
];

pub const EFFECT_PRESETS: &[(&str, TextEffect)] = &[
    ("None", TextEffect::None),
    ("Upside down", TextEffect::Rotate(180.0)),
    ("Tilt left", TextEffect::Rotate(-15.0)),
    ("Tilt right", TextEffect::Rotate(15.0)),
    ("Skew", TextEffect::Skew(10.0)),
];

pub const FILTER_PRESETS: &[(&str, ImageFilter)] = &[
    ("None", ImageFilter::None),
    ("Grayscale", ImageFilter::Grayscale(1.0)),
    ("Sepia", ImageFilter::Sepia(1.0)),
    ("Invert", ImageFilter::Invert(1.0)),
    ("Blur", ImageFilter::Blur(2.0)),
    ("Bright", ImageFilter::Brightness(1.5)),
    ("High contrast", ImageFilter::Contrast(2.0)),
];

/// The base image of a meme being composed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ImageChoice {
    #[default]
    None,
    /// A local file, sent as the `image` part of the form.
    Upload { file_name: String, bytes: Vec<u8> },
    /// A remote image, sent as `imageUrl`.
    Url(String),
}

/// A meme ready to post, already checked against the publish rules.
#[derive(Debug, Clone, PartialEq)]
pub struct MemeSubmission {
    pub design: EditState,
    pub image: ImageChoice,
    pub is_draft: bool,
}

impl MemeSubmission {
    /// Text fields of the create form, named as the server expects them.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = self.design.form_fields();
        fields.push(("isDraft", self.is_draft.to_string()));
        if let ImageChoice::Url(url) = &self.image {
            fields.push(("imageUrl", url.clone()));
        }
        fields
    }
}

/// Builds a meme locally: edits with undo/redo, an image choice, and a
/// draft flag.
#[derive(Debug, Clone)]
pub struct Composer {
    history: EditHistory,
    image: ImageChoice,
    is_draft: bool,
}

impl Default for Composer {
    fn default() -> Self {
        Composer::new()
    }
}

impl Composer {
    pub fn new() -> Self {
        Composer {
            history: EditHistory::new(EditState::default()),
            image: ImageChoice::None,
            is_draft: false,
        }
    }

    pub fn state(&self) -> &EditState {
        self.history.current()
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn image(&self) -> &ImageChoice {
        &self.image
    }

    pub fn is_draft(&self) -> bool {
        self.is_draft
    }

    pub fn set_draft(&mut self, is_draft: bool) {
        self.is_draft = is_draft;
    }

    pub fn apply(&mut self, patch: &EditPatch) -> &EditState {
        self.history.apply(patch)
    }

    pub fn undo(&mut self) -> &EditState {
        self.history.undo();
        self.history.current()
    }

    pub fn redo(&mut self) -> &EditState {
        self.history.redo();
        self.history.current()
    }

    /// Sets one caption's text as a single undoable step.
    pub fn set_text(&mut self, layer: Layer, text: impl Into<String>) -> &EditState {
        let text = Some(text.into());
        let patch = match layer {
            Layer::Top => EditPatch { top_text: text, ..EditPatch::default() },
            Layer::Bottom => EditPatch { bottom_text: text, ..EditPatch::default() },
        };
        self.history.apply(&patch)
    }

    pub fn apply_style(&mut self, style: &TextStyle) -> &EditState {
        let size = Some(i64::from(style.size));
        self.history.apply(&EditPatch {
            top_text_size: size,
            bottom_text_size: size,
            top_text_color: Some(style.color),
            bottom_text_color: Some(style.color),
            top_text_stroke: Some(style.stroke),
            bottom_text_stroke: Some(style.stroke),
            ..EditPatch::default()
        })
    }

    pub fn choose_upload(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.image = ImageChoice::Upload { file_name: file_name.into(), bytes };
    }

    pub fn choose_template(&mut self, template: &Template) {
        self.image = ImageChoice::Url(template.url.to_string());
    }

    pub fn choose_url(&mut self, url: impl Into<String>) {
        self.image = ImageChoice::Url(url.into());
    }

    /// Renders the current state locally. Remote images must be fetched by
    /// the caller and passed as `fetched`.
    pub fn preview(&self, fetched: Option<&[u8]>, font: Option<FontArc>) -> Result<RgbaImage, ClientError> {
        let bytes = match (&self.image, fetched) {
            (ImageChoice::Upload { bytes, .. }, _) => bytes.as_slice(),
            (ImageChoice::Url(_), Some(bytes)) => bytes,
            (ImageChoice::Url(url), None) => {
                return Err(ClientError::Invalid(format!("Image at {url} has not been fetched")));
            }
            (ImageChoice::None, _) => return Err(ClientError::Invalid("Choose an image first".into())),
        };
        let base = render::decode_image(bytes)?;
        Ok(render::render_image(self.state(), &base, font)?)
    }

    /// Checks the publish rules. Drafts may lack a title and an image.
    pub fn submission(&self) -> Result<MemeSubmission, ClientError> {
        let design = self.state().clone();
        design
            .validate()
            .map_err(|e| ClientError::Invalid(e.to_string()))?;
        if !self.is_draft {
            if design.title.trim().is_empty() {
                return Err(ClientError::Invalid("Title is required".into()));
            }
            if self.image == ImageChoice::None {
                return Err(ClientError::Invalid("Either an image file or imageUrl must be provided".into()));
            }
        }
        Ok(MemeSubmission { design, image: self.image.clone(), is_draft: self.is_draft })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn publishing_needs_title_and_image() {
        let mut composer = Composer::new();
        assert_matches!(composer.submission(), Err(ClientError::Invalid(msg)) if msg == "Title is required");

        composer.apply(&EditPatch { title: Some("Monday".into()), ..EditPatch::default() });
        assert_matches!(composer.submission(), Err(ClientError::Invalid(msg)) if msg.contains("image"));

        composer.choose_template(&TEMPLATES[0]);
        let submission = composer.submission().unwrap();
        assert_eq!(submission.image, ImageChoice::Url("https://i.imgflip.com/30b1gx.jpg".into()));
    }

    #[test]
    fn drafts_skip_publish_rules() {
        let mut composer = Composer::new();
        composer.set_draft(true);
        let submission = composer.submission().unwrap();
        assert!(submission.is_draft);
        assert!(submission.form_fields().contains(&("isDraft", "true".to_string())));
    }

    #[test]
    fn style_is_one_undo_step() {
        let mut composer = Composer::new();
        composer.set_text(Layer::Top, "top");
        composer.apply_style(&TEXT_STYLES[4]);
        assert_eq!(composer.state().top_text_size, 36);
        assert_eq!(composer.state().bottom_text_stroke, HexColor::rgb(0x66, 0x66, 0x66));

        let state = composer.undo();
        assert_eq!(state.top_text_size, 48);
        assert_eq!(state.top_text, "top");
        assert_eq!(composer.redo().top_text_size, 36);
    }

    #[test]
    fn form_fields_use_wire_names() {
        let mut composer = Composer::new();
        composer.apply(&EditPatch {
            title: Some("t".into()),
            top_text_effect: Some(EFFECT_PRESETS[1].1),
            image_filter: Some(FILTER_PRESETS[1].1),
            ..EditPatch::default()
        });
        composer.choose_url("https://example.com/a.png");
        let fields = composer.submission().unwrap().form_fields();
        let get = |name: &str| fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v.clone());
        assert_eq!(get("topTextColor").as_deref(), Some("#ffffff"));
        assert_eq!(get("imageUrl").as_deref(), Some("https://example.com/a.png"));
        assert_eq!(get("isDraft").as_deref(), Some("false"));
        assert!(get("topTextEffect").is_some_and(|e| e.starts_with("rotate(")));
    }

    #[test]
    fn uploads_preview_at_natural_size() {
        let mut composer = Composer::new();
        composer.choose_upload("cat.png", png(32, 24));
        let preview = composer.preview(None, None).unwrap();
        assert_eq!(preview.dimensions(), (32, 24));
    }

    #[test]
    fn remote_image_must_be_fetched_for_preview() {
        let mut composer = Composer::new();
        composer.choose_template(&TEMPLATES[2]);
        assert_matches!(composer.preview(None, None), Err(ClientError::Invalid(_)));
        assert_eq!(composer.preview(Some(&png(8, 8)), None).unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn broken_upload_is_a_render_error() {
        let mut composer = Composer::new();
        composer.choose_upload("broken.png", b"definitely not an image".to_vec());
        assert_matches!(composer.preview(None, None), Err(ClientError::Render(_)));
    }
}
