//! Box flag words.
//!
//! `LayoutFlags` packs every per-axis bit as an adjacent pair (horizontal on
//! the even bit, vertical on the odd bit) so that a horizontal constant can
//! be turned into either axis with one shift. All validity-bit mutation
//! during layout funnels through `clear_flags` in `box_tree`, which applies
//! the parent/child consistency rules in one place.

use bitflags::bitflags;
use style::Axis;

use crate::box_tree::SizeSlot;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LayoutFlags: u32 {
        const IDEAL_VALID_H       = 1 << 0;
        const IDEAL_VALID_V       = 1 << 1;
        const PREFERRED_VALID_H   = 1 << 2;
        const PREFERRED_VALID_V   = 1 << 3;
        const INTRINSIC_VALID_H   = 1 << 4;
        const INTRINSIC_VALID_V   = 1 << 5;
        const EXTRINSIC_VALID_H   = 1 << 6;
        const EXTRINSIC_VALID_V   = 1 << 7;

        const DEPENDS_ON_PARENT_H   = 1 << 8;
        const DEPENDS_ON_PARENT_V   = 1 << 9;
        const DEPENDS_ON_ANCESTOR_H = 1 << 10;
        const DEPENDS_ON_ANCESTOR_V = 1 << 11;
        const DEPENDS_ON_CHILDREN_H = 1 << 12;
        const DEPENDS_ON_CHILDREN_V = 1 << 13;
        const IN_DEPENDENCE_CHAIN_H = 1 << 14;
        const IN_DEPENDENCE_CHAIN_V = 1 << 15;
        const HAS_DEPENDENT_CHILD_H = 1 << 16;
        const HAS_DEPENDENT_CHILD_V = 1 << 17;
        const CYCLE_H               = 1 << 18;
        const CYCLE_V               = 1 << 19;
        /// Children's extrinsic sizes have NOT been invalidated since this
        /// box's corresponding size last changed (i.e. they are in sync).
        const CHILD_SIZES_IN_SYNC_H = 1 << 20;
        const CHILD_SIZES_IN_SYNC_V = 1 << 21;

        /// Every box in this subtree has valid extrinsic sizes.
        const TREE_VALID         = 1 << 22;
        /// Flex distribution over the children is up to date.
        const FLEX_VALID         = 1 << 23;
        const HAS_FLEXIBLE_CHILD = 1 << 24;
        /// Paragraph breakpoints match the current extrinsic width.
        const TEXT_VALID         = 1 << 25;
        /// Line/text boxes match the current line list.
        const INLINE_BOXES_VALID = 1 << 26;
        /// Dependency analysis bits are up to date.
        const LAYOUT_INFO_VALID  = 1 << 27;
        /// The box has been positioned at least once.
        const BOUNDS_DEFINED     = 1 << 28;
        /// The positions of the immediate children are up to date.
        const CHILD_BOUNDS_VALID = 1 << 29;
        /// CHILD_BOUNDS_VALID holds for the entire subtree.
        const TREE_BOUNDS_VALID  = 1 << 30;
        /// Clip rectangles and depths are valid for the entire subtree.
        const TREE_CLIP_VALID    = 1 << 31;
    }
}

impl LayoutFlags {
    /// All per-axis validity bits for one axis (not the ideal, which is
    /// authoritative input rather than derived state).
    pub fn all_valid(axis: Axis) -> LayoutFlags {
        axis_flag(
            LayoutFlags::PREFERRED_VALID_H
                | LayoutFlags::INTRINSIC_VALID_H
                | LayoutFlags::EXTRINSIC_VALID_H,
            axis,
        )
    }

    pub const BOUNDS_VALID_MASK: LayoutFlags = LayoutFlags::CHILD_BOUNDS_VALID
        .union(LayoutFlags::TREE_BOUNDS_VALID)
        .union(LayoutFlags::TREE_CLIP_VALID);
}

/// Shifts a horizontal-variant constant to the requested axis.
#[inline]
pub fn axis_flag(base_h: LayoutFlags, axis: Axis) -> LayoutFlags {
    LayoutFlags::from_bits_retain(base_h.bits() << axis.index() as u32)
}

/// Expands a horizontal-variant constant to cover both axes.
#[inline]
pub fn axis_mask(base_h: LayoutFlags) -> LayoutFlags {
    LayoutFlags::from_bits_retain(base_h.bits() | (base_h.bits() << 1))
}

/// Validity bit for one size slot on one axis. Slots occupy bit pairs in
/// declaration order, so the bit index is `2·slot + axis`.
#[inline]
pub fn slot_flag(slot: SizeSlot, axis: Axis) -> LayoutFlags {
    LayoutFlags::from_bits_retain(1 << (2 * slot as u32 + axis.index() as u32))
}

bitflags! {
    /// Structural bits that are not validity state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BoxFlags: u16 {
        const IS_TEXT_BOX             = 1 << 0;
        const IS_LINE_BOX             = 1 << 1;
        /// Mouse events within the box generate messages for the owner node.
        const HIT_TEST                = 1 << 2;
        /// Hit testing uses the outer (margin) rectangle, not the padding
        /// rectangle.
        const HIT_OUTER               = 1 << 3;
        /// The box can anchor a mouse selection.
        const SELECTION_ANCHOR        = 1 << 4;
        const CLIP_LEFT               = 1 << 5;
        const CLIP_RIGHT              = 1 << 6;
        const CLIP_TOP                = 1 << 7;
        const CLIP_BOTTOM             = 1 << 8;
        /// The container's paragraph elements have not changed since the
        /// last inline box update.
        const SAME_PARAGRAPH          = 1 << 9;
        /// The text layer may match the current elements; confirmed lazily.
        const TEXT_LAYER_MAY_BE_VALID = 1 << 10;
        /// The text layer was confirmed valid this layout.
        const TEXT_LAYER_KNOWN_VALID  = 1 << 11;
        /// The box is the primary box of an inline container node.
        const IS_INLINE_CONTAINER     = 1 << 12;

        const CLIP_ALL = Self::CLIP_LEFT.bits() | Self::CLIP_RIGHT.bits()
                       | Self::CLIP_TOP.bits() | Self::CLIP_BOTTOM.bits();
        const TEXT_LAYER_VALID_MASK = Self::TEXT_LAYER_MAY_BE_VALID.bits()
                                    | Self::TEXT_LAYER_KNOWN_VALID.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_shift_maps_h_to_v() {
        assert_eq!(
            axis_flag(LayoutFlags::EXTRINSIC_VALID_H, Axis::Vertical),
            LayoutFlags::EXTRINSIC_VALID_V
        );
        assert_eq!(
            axis_mask(LayoutFlags::CYCLE_H),
            LayoutFlags::CYCLE_H | LayoutFlags::CYCLE_V
        );
    }

    #[test]
    fn slot_flags_match_declared_bits() {
        assert_eq!(slot_flag(SizeSlot::Ideal, Axis::Horizontal), LayoutFlags::IDEAL_VALID_H);
        assert_eq!(slot_flag(SizeSlot::Extrinsic, Axis::Vertical), LayoutFlags::EXTRINSIC_VALID_V);
    }
}
