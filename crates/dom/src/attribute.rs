//! Typed attribute set API.
//!
//! Attributes drive the declared geometry and computed style of a node. The
//! markup operators `=`, `+=`, `-=`, `*=`, `/=` and `:=` map onto
//! [`AttributeOp`]; folds apply the operator to the current value before
//! storing. Every mutation goes through [`set_attribute`], which raises the
//! right dirty flags so the next update reconfigures the node's box.

use style::values::{AttributeValue, Color};
use style::{Axis, DimensionMode};
use thiserror::Error;

use crate::flags::NodeFlags;
use crate::node::{NodeArena, NodeId};

#[derive(Debug, Error, PartialEq)]
pub enum AttributeError {
    #[error("no such attribute: {0:?}")]
    NoSuchAttribute(String),
    #[error("type mismatch for {attribute}: expected {expected}")]
    TypeMismatch { attribute: &'static str, expected: &'static str },
    #[error("value out of bounds for {attribute}: {value}")]
    OutOfBounds { attribute: &'static str, value: f32 },
    #[error("operator not valid for {attribute}")]
    InvalidOperator { attribute: &'static str },
}

/// Assignment operators of the markup language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeOp {
    /// `=` — replace.
    Set,
    /// `:=` — replace, marking the value as authored rather than cascaded.
    Init,
    /// `+=`, `-=`, `*=`, `/=` — numeric folds.
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeName {
    Width,
    Height,
    MinWidth,
    MinHeight,
    MaxWidth,
    MaxHeight,
    PaddingLeft,
    PaddingRight,
    PaddingTop,
    PaddingBottom,
    MarginLeft,
    MarginRight,
    MarginTop,
    MarginBottom,
    Grow,
    Shrink,
    Arrangement,
    Alignment,
    Justify,
    WhiteSpace,
    Wrap,
    Leading,
    Indent,
    Color,
    Background,
    Tint,
    Class,
    Clip,
    DepthInterval,
}

impl AttributeName {
    pub fn parse(name: &str) -> Result<AttributeName, AttributeError> {
        use AttributeName::*;
        Ok(match name {
            "width" => Width,
            "height" => Height,
            "min-width" => MinWidth,
            "min-height" => MinHeight,
            "max-width" => MaxWidth,
            "max-height" => MaxHeight,
            "padding-left" => PaddingLeft,
            "padding-right" => PaddingRight,
            "padding-top" => PaddingTop,
            "padding-bottom" => PaddingBottom,
            "margin-left" => MarginLeft,
            "margin-right" => MarginRight,
            "margin-top" => MarginTop,
            "margin-bottom" => MarginBottom,
            "grow" => Grow,
            "shrink" => Shrink,
            "arrange" => Arrangement,
            "align" => Alignment,
            "justify" => Justify,
            "white-space" => WhiteSpace,
            "wrap" => Wrap,
            "leading" => Leading,
            "indent" => Indent,
            "color" => Color,
            "background" => Background,
            "tint" => Tint,
            "class" => Class,
            "clip" => Clip,
            "depth-interval" => DepthInterval,
            other => return Err(AttributeError::NoSuchAttribute(other.to_string())),
        })
    }

    fn text(self) -> &'static str {
        use AttributeName::*;
        match self {
            Width => "width",
            Height => "height",
            MinWidth => "min-width",
            MinHeight => "min-height",
            MaxWidth => "max-width",
            MaxHeight => "max-height",
            PaddingLeft => "padding-left",
            PaddingRight => "padding-right",
            PaddingTop => "padding-top",
            PaddingBottom => "padding-bottom",
            MarginLeft => "margin-left",
            MarginRight => "margin-right",
            MarginTop => "margin-top",
            MarginBottom => "margin-bottom",
            Grow => "grow",
            Shrink => "shrink",
            Arrangement => "arrange",
            Alignment => "align",
            Justify => "justify",
            WhiteSpace => "white-space",
            Wrap => "wrap",
            Leading => "leading",
            Indent => "indent",
            Color => "color",
            Background => "background",
            Tint => "tint",
            Class => "class",
            Clip => "clip",
            DepthInterval => "depth-interval",
        }
    }
}

/// Applies a numeric fold. `Set`/`Init` replace; the rest combine.
fn fold(op: AttributeOp, current: f32, operand: f32) -> f32 {
    match op {
        AttributeOp::Set | AttributeOp::Init => operand,
        AttributeOp::Add => current + operand,
        AttributeOp::Subtract => current - operand,
        AttributeOp::Multiply => current * operand,
        AttributeOp::Divide => {
            if operand == 0.0 { current } else { current / operand }
        }
    }
}

fn numeric(
    name: AttributeName,
    value: &AttributeValue,
) -> Result<f32, AttributeError> {
    match value {
        AttributeValue::Integer(n) => Ok(*n as f32),
        AttributeValue::Float(f) => Ok(*f),
        _ => Err(AttributeError::TypeMismatch { attribute: name.text(), expected: "number" }),
    }
}

fn non_negative(name: AttributeName, v: f32) -> Result<f32, AttributeError> {
    if v < 0.0 {
        return Err(AttributeError::OutOfBounds { attribute: name.text(), value: v });
    }
    Ok(v)
}

fn color_value(name: AttributeName, value: &AttributeValue) -> Result<Color, AttributeError> {
    match value {
        AttributeValue::Color(c) => Ok(*c),
        _ => Err(AttributeError::TypeMismatch { attribute: name.text(), expected: "colour" }),
    }
}

fn replace_only(name: AttributeName, op: AttributeOp) -> Result<(), AttributeError> {
    match op {
        AttributeOp::Set | AttributeOp::Init => Ok(()),
        _ => Err(AttributeError::InvalidOperator { attribute: name.text() }),
    }
}

/// Sets or folds one attribute on a node.
pub fn set_attribute(
    arena: &mut NodeArena,
    id: NodeId,
    name: AttributeName,
    op: AttributeOp,
    value: &AttributeValue,
) -> Result<(), AttributeError> {
    use AttributeName::*;

    // Size attributes accept keywords (auto/shrink/grow), percentages
    // (fractional) and plain numbers (absolute).
    let set_dim = |arena: &mut NodeArena, axis: Axis| -> Result<(), AttributeError> {
        let node = arena.get_mut(id);
        let ax = node.box_style.axis_mut(axis);
        match value {
            AttributeValue::Keyword(k) => {
                replace_only(name, op)?;
                ax.mode = match k.as_str() {
                    "auto" => DimensionMode::Auto,
                    "shrink" => DimensionMode::Shrink,
                    "grow" => DimensionMode::Grow,
                    _ => {
                        return Err(AttributeError::TypeMismatch {
                            attribute: name.text(),
                            expected: "auto | shrink | grow | length | percentage",
                        });
                    }
                };
                ax.dim = 0.0;
            }
            AttributeValue::Percentage(p) => {
                replace_only(name, op)?;
                if !(0.0..=100.0).contains(p) {
                    return Err(AttributeError::OutOfBounds { attribute: name.text(), value: *p });
                }
                ax.mode = DimensionMode::Fractional;
                ax.dim = p / 100.0;
            }
            _ => {
                let operand = numeric(name, value)?;
                let current = if ax.mode == DimensionMode::Absolute { ax.dim } else { 0.0 };
                let folded = non_negative(name, fold(op, current, operand))?;
                ax.mode = DimensionMode::Absolute;
                ax.dim = folded;
            }
        }
        Ok(())
    };

    let set_bound =
        |arena: &mut NodeArena, axis: Axis, is_min: bool| -> Result<(), AttributeError> {
            let operand = numeric(name, value)?;
            let node = arena.get_mut(id);
            let ax = node.box_style.axis_mut(axis);
            let slot = if is_min { &mut ax.min } else { &mut ax.max };
            let folded = non_negative(name, fold(op, slot.unwrap_or(0.0), operand))?;
            *slot = Some(folded);
            Ok(())
        };

    let set_edge = |arena: &mut NodeArena,
                    axis: Axis,
                    lower: bool,
                    margin: bool|
     -> Result<(), AttributeError> {
        let operand = numeric(name, value)?;
        let node = arena.get_mut(id);
        let ax = node.box_style.axis_mut(axis);
        let slot = match (margin, lower) {
            (false, true) => &mut ax.pad_lower,
            (false, false) => &mut ax.pad_upper,
            (true, true) => &mut ax.margin_lower,
            (true, false) => &mut ax.margin_upper,
        };
        let folded = fold(op, *slot, operand);
        // Padding cannot be negative; margins can.
        *slot = if margin { folded } else { non_negative(name, folded)? };
        Ok(())
    };

    match name {
        Width => set_dim(arena, Axis::Horizontal)?,
        Height => set_dim(arena, Axis::Vertical)?,
        MinWidth => set_bound(arena, Axis::Horizontal, true)?,
        MinHeight => set_bound(arena, Axis::Vertical, true)?,
        MaxWidth => set_bound(arena, Axis::Horizontal, false)?,
        MaxHeight => set_bound(arena, Axis::Vertical, false)?,
        PaddingLeft => set_edge(arena, Axis::Horizontal, true, false)?,
        PaddingRight => set_edge(arena, Axis::Horizontal, false, false)?,
        PaddingTop => set_edge(arena, Axis::Vertical, true, false)?,
        PaddingBottom => set_edge(arena, Axis::Vertical, false, false)?,
        MarginLeft => set_edge(arena, Axis::Horizontal, true, true)?,
        MarginRight => set_edge(arena, Axis::Horizontal, false, true)?,
        MarginTop => set_edge(arena, Axis::Vertical, true, true)?,
        MarginBottom => set_edge(arena, Axis::Vertical, false, true)?,
        Grow | Shrink => {
            let operand = numeric(name, value)?;
            let node = arena.get_mut(id);
            let slot = if name == Grow { &mut node.box_style.grow } else { &mut node.box_style.shrink };
            *slot = non_negative(name, fold(op, *slot, operand))?;
        }
        Arrangement | Alignment => {
            replace_only(name, op)?;
            let AttributeValue::Keyword(k) = value else {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.text(),
                    expected: "start | middle | end",
                });
            };
            let a = match k.as_str() {
                "start" => style::Alignment::Start,
                "middle" | "center" => style::Alignment::Middle,
                "end" => style::Alignment::End,
                _ => {
                    return Err(AttributeError::TypeMismatch {
                        attribute: name.text(),
                        expected: "start | middle | end",
                    });
                }
            };
            let node = arena.get_mut(id);
            if name == Arrangement {
                node.box_style.arrangement = a;
            } else {
                node.box_style.alignment = a;
            }
        }
        Justify => {
            replace_only(name, op)?;
            let AttributeValue::Keyword(k) = value else {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.text(),
                    expected: "flush | left | right | center",
                });
            };
            let j = match k.as_str() {
                "flush" => style::Justification::Flush,
                "left" => style::Justification::Left,
                "right" => style::Justification::Right,
                "center" => style::Justification::Center,
                _ => {
                    return Err(AttributeError::TypeMismatch {
                        attribute: name.text(),
                        expected: "flush | left | right | center",
                    });
                }
            };
            arena.get_mut(id).style.justification = j;
        }
        WhiteSpace => {
            replace_only(name, op)?;
            let AttributeValue::Keyword(k) = value else {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.text(),
                    expected: "normal | preserve",
                });
            };
            arena.get_mut(id).style.white_space = match k.as_str() {
                "normal" => style::WhiteSpace::Normal,
                "preserve" => style::WhiteSpace::Preserve,
                _ => {
                    return Err(AttributeError::TypeMismatch {
                        attribute: name.text(),
                        expected: "normal | preserve",
                    });
                }
            };
        }
        Wrap => {
            replace_only(name, op)?;
            let AttributeValue::Keyword(k) = value else {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.text(),
                    expected: "word-wrap | character-wrap",
                });
            };
            arena.get_mut(id).style.wrap = match k.as_str() {
                "word-wrap" => style::WrapMode::WordWrap,
                "character-wrap" => style::WrapMode::CharacterWrap,
                _ => {
                    return Err(AttributeError::TypeMismatch {
                        attribute: name.text(),
                        expected: "word-wrap | character-wrap",
                    });
                }
            };
        }
        Leading | Indent => {
            let operand = numeric(name, value)?;
            let node = arena.get_mut(id);
            let slot = if name == Leading {
                &mut node.style.leading
            } else {
                &mut node.style.hanging_indent
            };
            let folded = non_negative(name, fold(op, *slot as f32, operand))?;
            *slot = folded as i32;
        }
        Color => {
            replace_only(name, op)?;
            arena.get_mut(id).style.text.color = color_value(name, value)?;
        }
        Background => {
            replace_only(name, op)?;
            arena.get_mut(id).style.background = color_value(name, value)?;
        }
        Tint => {
            replace_only(name, op)?;
            arena.get_mut(id).style.text.tint = color_value(name, value)?;
        }
        Class => {
            let (AttributeValue::String(s) | AttributeValue::Keyword(s)) = value else {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.text(),
                    expected: "string",
                });
            };
            let node = arena.get_mut(id);
            match op {
                AttributeOp::Set | AttributeOp::Init => {
                    node.classes.clear();
                    node.classes.extend(s.split_whitespace().map(Box::from));
                }
                AttributeOp::Add => {
                    if !node.classes.iter().any(|c| **c == **s) {
                        node.classes.push(Box::from(s.as_str()));
                    }
                }
                AttributeOp::Subtract => node.classes.retain(|c| **c != **s),
                _ => return Err(AttributeError::InvalidOperator { attribute: name.text() }),
            }
        }
        Clip => {
            replace_only(name, op)?;
            let AttributeValue::Keyword(k) = value else {
                return Err(AttributeError::TypeMismatch {
                    attribute: name.text(),
                    expected: "none | all | horizontal | vertical",
                });
            };
            let edges = match k.as_str() {
                "none" => style::EdgeFlags::empty(),
                "all" => style::EdgeFlags::ALL,
                "horizontal" => style::EdgeFlags::LEFT | style::EdgeFlags::RIGHT,
                "vertical" => style::EdgeFlags::TOP | style::EdgeFlags::BOTTOM,
                _ => {
                    return Err(AttributeError::TypeMismatch {
                        attribute: name.text(),
                        expected: "none | all | horizontal | vertical",
                    });
                }
            };
            arena.get_mut(id).box_style.clip_edges = edges;
        }
        DepthInterval => {
            let operand = numeric(name, value)?;
            let folded = non_negative(name, fold(
                op,
                arena.get(id).box_style.depth_interval as f32,
                operand,
            ))?;
            if folded > u16::MAX as f32 {
                return Err(AttributeError::OutOfBounds { attribute: name.text(), value: folded });
            }
            arena.get_mut(id).box_style.depth_interval = folded as u16;
        }
    }

    let flags = match name {
        Color | Background | Tint | Justify | WhiteSpace | Wrap | Leading | Indent => {
            NodeFlags::STYLE_DIRTY | NodeFlags::BOX_STYLE_DIRTY
        }
        Class => NodeFlags::STYLE_DIRTY,
        _ => NodeFlags::BOX_STYLE_DIRTY,
    };
    arena.get_mut(id).flags |= flags;
    if matches!(name, WhiteSpace | Wrap | Justify) {
        arena.mark_structure_changed(id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeArena, NodeType};
    use style::DimensionMode;

    fn setup() -> (NodeArena, NodeId) {
        let mut arena = NodeArena::new();
        let id = arena.create(NodeType::Basic);
        (arena, id)
    }

    #[test]
    fn width_accepts_lengths_keywords_and_percentages() {
        let (mut arena, id) = setup();
        set_attribute(&mut arena, id, AttributeName::Width, AttributeOp::Set,
            &AttributeValue::Integer(120)).unwrap();
        let ax = arena.get(id).box_style.axes[0];
        assert_eq!(ax.mode, DimensionMode::Absolute);
        assert_eq!(ax.dim, 120.0);

        set_attribute(&mut arena, id, AttributeName::Width, AttributeOp::Set,
            &AttributeValue::Percentage(50.0)).unwrap();
        let ax = arena.get(id).box_style.axes[0];
        assert_eq!(ax.mode, DimensionMode::Fractional);
        assert_eq!(ax.dim, 0.5);

        set_attribute(&mut arena, id, AttributeName::Width, AttributeOp::Set,
            &AttributeValue::Keyword("shrink".into())).unwrap();
        assert_eq!(arena.get(id).box_style.axes[0].mode, DimensionMode::Shrink);
    }

    #[test]
    fn folds_apply_operators() {
        let (mut arena, id) = setup();
        set_attribute(&mut arena, id, AttributeName::PaddingLeft, AttributeOp::Set,
            &AttributeValue::Integer(10)).unwrap();
        set_attribute(&mut arena, id, AttributeName::PaddingLeft, AttributeOp::Add,
            &AttributeValue::Integer(5)).unwrap();
        set_attribute(&mut arena, id, AttributeName::PaddingLeft, AttributeOp::Multiply,
            &AttributeValue::Integer(2)).unwrap();
        assert_eq!(arena.get(id).box_style.axes[0].pad_lower, 30.0);
    }

    #[test]
    fn errors_are_reported() {
        let (mut arena, id) = setup();
        assert!(matches!(
            AttributeName::parse("no-such"),
            Err(AttributeError::NoSuchAttribute(_))
        ));
        assert_eq!(
            set_attribute(&mut arena, id, AttributeName::Color, AttributeOp::Set,
                &AttributeValue::Integer(1)),
            Err(AttributeError::TypeMismatch { attribute: "color", expected: "colour" })
        );
        assert_eq!(
            set_attribute(&mut arena, id, AttributeName::PaddingLeft, AttributeOp::Set,
                &AttributeValue::Integer(-4)),
            Err(AttributeError::OutOfBounds { attribute: "padding-left", value: -4.0 })
        );
        assert_eq!(
            set_attribute(&mut arena, id, AttributeName::Justify, AttributeOp::Multiply,
                &AttributeValue::Keyword("flush".into())),
            Err(AttributeError::InvalidOperator { attribute: "justify" })
        );
    }

    #[test]
    fn dirty_flags_raised() {
        let (mut arena, id) = setup();
        arena.get_mut(id).flags = NodeFlags::empty();
        set_attribute(&mut arena, id, AttributeName::Width, AttributeOp::Set,
            &AttributeValue::Integer(10)).unwrap();
        assert!(arena.get(id).flags.contains(NodeFlags::BOX_STYLE_DIRTY));
        assert!(!arena.get(id).flags.contains(NodeFlags::STYLE_DIRTY));
    }
}
