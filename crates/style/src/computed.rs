//! Computed style carried by nodes and read by layout.

use bitflags::bitflags;
use platform::FontId;

use crate::values::Color;
use crate::{Alignment, Axis, DimensionMode, Justification, WhiteSpace, WrapMode};

bitflags! {
    /// Text decoration and emphasis bits. Font weight/slant are part of the
    /// matched font, not of these flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StyleFlags: u16 {
        const UNDERLINE    = 1 << 0;
        const STRIKETHROUGH = 1 << 1;
    }
}

bitflags! {
    /// Which edges of a box clip its subtree.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EdgeFlags: u8 {
        const LEFT   = 1 << 0;
        const RIGHT  = 1 << 1;
        const TOP    = 1 << 2;
        const BOTTOM = 1 << 3;
        const ALL    = Self::LEFT.bits() | Self::RIGHT.bits()
                     | Self::TOP.bits() | Self::BOTTOM.bits();
    }
}

/// Which of a box's rectangles the clip rectangle is built from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipBoxSelector {
    /// The margin (outer) box.
    Outer,
    /// The padding box.
    #[default]
    Padding,
    /// The content box.
    Content,
}

/// Style of a run of text: everything that must match for two characters to
/// be measured together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub font_id: FontId,
    pub color: Color,
    pub tint: Color,
    pub flags: StyleFlags,
}

impl Default for TextStyle {
    fn default() -> Self {
        TextStyle {
            font_id: FontId(0),
            color: Color::BLACK,
            tint: Color::WHITE,
            flags: StyleFlags::empty(),
        }
    }
}

impl TextStyle {
    /// True if runs in the two styles can share one measurement call.
    /// Colours don't affect advances, only the font does.
    pub fn measurement_compatible(&self, other: &TextStyle) -> bool {
        self.font_id == other.font_id
    }

    /// True if runs in the two styles can share one draw fragment.
    pub fn fragment_compatible(&self, other: &TextStyle) -> bool {
        self == other
    }
}

/// Computed style of a node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeStyle {
    pub text: TextStyle,
    pub justification: Justification,
    pub white_space: WhiteSpace,
    pub wrap: WrapMode,
    /// Extra space between lines, whole pixels.
    pub leading: i32,
    pub hanging_indent: i32,
    /// Background fill, painted as a pane layer when non-transparent.
    pub background: Color,
}

/// Per-axis declared geometry, stored on nodes and imposed on boxes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxisStyle {
    pub mode: DimensionMode,
    /// Pixels for `Absolute`, a fraction in [0, 1] for `Fractional`,
    /// ignored otherwise.
    pub dim: f32,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub pad_lower: f32,
    pub pad_upper: f32,
    pub margin_lower: f32,
    pub margin_upper: f32,
}

/// Declared box geometry of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxStyle {
    pub axes: [AxisStyle; 2],
    /// Major axis along which children are stacked.
    pub axis: Axis,
    pub arrangement: Alignment,
    pub alignment: Alignment,
    pub grow: f32,
    pub shrink: f32,
    pub clip_box: ClipBoxSelector,
    pub clip_edges: EdgeFlags,
    pub depth_interval: u16,
}

impl Default for BoxStyle {
    fn default() -> Self {
        BoxStyle {
            axes: [AxisStyle::default(); 2],
            axis: Axis::Vertical,
            arrangement: Alignment::Start,
            alignment: Alignment::Start,
            grow: 0.0,
            shrink: 0.0,
            clip_box: ClipBoxSelector::default(),
            clip_edges: EdgeFlags::empty(),
            depth_interval: 1,
        }
    }
}

impl BoxStyle {
    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisStyle {
        &mut self.axes[axis.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Color;

    #[test]
    fn measurement_compatibility_ignores_colour() {
        let a = TextStyle::default();
        let mut b = a;
        b.color = Color::rgb(200, 0, 0);
        assert!(a.measurement_compatible(&b));
        assert!(!a.fragment_compatible(&b));
    }
}
