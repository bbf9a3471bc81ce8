//! Primitive drawing commands handed to the 2D back end.

use layout::Rect;
use platform::{FontId, ImageHandle};
use style::values::Color;

/// A batched run of positioned characters sharing one font and clip.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub font_id: FontId,
    /// UTF-8; no space glyphs, word gaps appear as position jumps.
    pub text: String,
    /// Document-space x of each character, px.
    pub x_positions: Vec<i32>,
    /// Common top y of every character in the run, px.
    pub line_y: i32,
    /// One colour per palette entry.
    pub palette: Vec<Color>,
    /// `(characters, bytes)` consumed by each palette entry, in order.
    pub run_counts: Vec<(u32, u32)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    SetClip { rect: Rect },
    Rectangle { bounds: Rect, fill: Color, border_color: Color, border_width: f32 },
    Image { bounds: Rect, image: ImageHandle, tint: Color },
    Text(TextRun),
    End,
}
