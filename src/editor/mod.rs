pub mod history;
pub mod state;

pub use history::{EditHistory, MAX_HISTORY};
pub use state::{
    DEFAULT_FONT_SIZE, DEFAULT_TEXT_POSITION, EditPatch, EditState, Layer, MAX_FONT_SIZE,
    MIN_FONT_SIZE, TextLayer,
};
