//! Back-end seam between the engine and the host platform.
//!
//! All text metrics cross this boundary in 26.6 fixed point (signed integer
//! units of 1/64 pixel), matching what font rasterizers report natively.
//! The engine wraps these raw units in its own fixed-point type; this crate
//! stays dependency-free so it can sit at the bottom of the workspace.

use std::time::Instant;

/// Handle to a matched font. `FontId::INVALID` is never returned by a
/// successful `match_font`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub u16);

impl FontId {
    pub const INVALID: FontId = FontId(u16::MAX);
}

/// Style bits passed to `match_font`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FontFlags {
    pub bold: bool,
    pub italic: bool,
}

/// Vertical and spacing metrics for a matched font, in 1/64 px units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontMetrics {
    pub height: i32,
    pub em_width: i32,
    pub space_width: i32,
    pub space_stretch: i32,
    pub space_shrink: i32,
    pub paragraph_indent_width: i32,
}

/// Handle to an image being fetched or decoded by the back end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

/// Opaque timer sample used for layout budgets.
#[derive(Clone, Copy, Debug)]
pub struct TimerSample(pub Instant);

/// Everything the engine asks of the host. One implementation per platform;
/// tests use [`HeadlessBackend`].
pub trait Backend {
    fn match_font(&mut self, face: &str, size: u32, flags: FontFlags) -> FontId;
    fn font_metrics(&self, font: FontId) -> FontMetrics;

    /// Measures a UTF-8 run. Pushes one advance (1/64 px) per character onto
    /// `advances` and returns the total width in the same units.
    fn measure_text(&self, font: FontId, text: &str, advances: &mut Vec<i32>) -> i32;

    /// Natural pixel size of a network image, or `None` while it is still
    /// loading or has failed. The engine lays out around zero size when
    /// `None`.
    fn query_network_image(&self, image: ImageHandle) -> Option<(u32, u32)>;

    fn query_timer(&self) -> TimerSample;
    fn check_timeout(&self, start: TimerSample, timeout_us: u64) -> bool;

    fn copy_to_clipboard(&mut self, bytes: &[u8]);
}

/// Deterministic back end for tests and headless layout runs.
///
/// Every non-space glyph is `advance_64` units wide and fonts are monoline,
/// so expected geometry can be written down literally in tests. Glyphs the
/// back end "cannot match" still measure: text rendering never fails.
pub struct HeadlessBackend {
    pub advance_64: i32,
    pub height_64: i32,
    pub space_width_64: i32,
    pub space_stretch_64: i32,
    pub space_shrink_64: i32,
    pub clipboard: Vec<u8>,
    pub images: Vec<Option<(u32, u32)>>,
    fonts: Vec<(String, u32, FontFlags)>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            advance_64: 8 * 64,
            height_64: 16 * 64,
            space_width_64: 8 * 64,
            space_stretch_64: 4 * 64,
            space_shrink_64: 2 * 64,
            clipboard: Vec::new(),
            images: Vec::new(),
            fonts: Vec::new(),
        }
    }

    pub fn with_advance(advance_px: i32) -> Self {
        let mut b = Self::new();
        b.advance_64 = advance_px * 64;
        b
    }

    pub fn add_image(&mut self, size: Option<(u32, u32)>) -> ImageHandle {
        self.images.push(size);
        ImageHandle((self.images.len() - 1) as u32)
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HeadlessBackend {
    fn match_font(&mut self, face: &str, size: u32, flags: FontFlags) -> FontId {
        let key = (face.to_string(), size, flags);
        if let Some(i) = self.fonts.iter().position(|f| *f == key) {
            return FontId(i as u16);
        }
        self.fonts.push(key);
        FontId((self.fonts.len() - 1) as u16)
    }

    fn font_metrics(&self, _font: FontId) -> FontMetrics {
        FontMetrics {
            height: self.height_64,
            em_width: self.advance_64,
            space_width: self.space_width_64,
            space_stretch: self.space_stretch_64,
            space_shrink: self.space_shrink_64,
            paragraph_indent_width: 2 * self.advance_64,
        }
    }

    fn measure_text(&self, _font: FontId, text: &str, advances: &mut Vec<i32>) -> i32 {
        let mut total = 0;
        for ch in text.chars() {
            let adv = if ch == ' ' { self.space_width_64 } else { self.advance_64 };
            advances.push(adv);
            total += adv;
        }
        total
    }

    fn query_network_image(&self, image: ImageHandle) -> Option<(u32, u32)> {
        self.images.get(image.0 as usize).copied().flatten()
    }

    fn query_timer(&self) -> TimerSample {
        TimerSample(Instant::now())
    }

    fn check_timeout(&self, start: TimerSample, timeout_us: u64) -> bool {
        start.0.elapsed().as_micros() as u64 >= timeout_us
    }

    fn copy_to_clipboard(&mut self, bytes: &[u8]) {
        self.clipboard.clear();
        self.clipboard.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_measure_counts_every_char() {
        let b = HeadlessBackend::with_advance(10);
        let mut advances = Vec::new();
        let total = b.measure_text(FontId(0), "ab c", &mut advances);
        assert_eq!(advances.len(), 4);
        assert_eq!(total, 10 * 64 + 10 * 64 + 8 * 64 + 10 * 64);
    }

    #[test]
    fn match_font_reuses_handles() {
        let mut b = HeadlessBackend::new();
        let a = b.match_font("body", 16, FontFlags::default());
        let c = b.match_font("body", 16, FontFlags::default());
        let d = b.match_font("body", 18, FontFlags::default());
        assert_eq!(a, c);
        assert_ne!(a, d);
    }
}
