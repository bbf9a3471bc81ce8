use bitflags::bitflags;

bitflags! {
    /// Per-node state bits. Layout and the document driver communicate
    /// through these; they are cheap to test in bulk during tree walks.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u32 {
        /// The extrinsic width of the node's primary box changed this update.
        const WIDTH_CHANGED            = 1 << 0;
        /// The extrinsic height of the node's primary box changed this update.
        const HEIGHT_CHANGED           = 1 << 1;
        /// The primary box moved; layers pinned to it must be repositioned.
        const UPDATE_BOX_LAYERS        = 1 << 2;
        /// Text or inline children changed; the paragraph element array must
        /// be rebuilt before the next layout.
        const RECONSTRUCT_PARAGRAPH    = 1 << 3;
        /// Paragraph element advances are stale and must be re-measured.
        const REMEASURE_ELEMENTS       = 1 << 4;
        /// This inline child generated at least one paragraph element.
        const HAS_PARAGRAPH_ELEMENTS   = 1 << 5;
        /// Declared geometry changed; the primary box must be reconfigured.
        const BOX_STYLE_DIRTY          = 1 << 6;
        /// Computed style changed; text layers and measurement may be stale.
        const STYLE_DIRTY              = 1 << 7;

        /// Membership bit for the document's hit chain.
        const IN_HIT_CHAIN             = 1 << 8;

        /// Interaction state consulted by selector matching.
        const HOVERED                  = 1 << 9;
        const ACTIVE                   = 1 << 10;
        const HIGHLIGHTED              = 1 << 11;

        /// Mouse events inside the node's box produce interaction messages.
        const HIT_TEST                 = 1 << 12;
        /// The node's boxes may anchor a mouse selection.
        const SELECTION_ANCHOR         = 1 << 13;
    }
}
