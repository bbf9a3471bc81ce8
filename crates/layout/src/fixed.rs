//! Fixed-point arithmetic for text metrics.
//!
//! All advance and width arithmetic inside the line breaker uses 26.6 fixed
//! point (6 fractional bits), the same scale the back end reports advances
//! in. Pixels enter and leave through the explicit conversions here; nothing
//! else in the crate multiplies by 64.

/// Number of fractional bits.
pub const TEXT_METRIC_PRECISION: u32 = 6;

const ONE: i32 = 1 << TEXT_METRIC_PRECISION;

/// A length in 1/64 px units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextFixed(pub i32);

impl TextFixed {
    pub const ZERO: TextFixed = TextFixed(0);

    #[inline]
    pub fn from_px(px: i32) -> TextFixed {
        TextFixed(px << TEXT_METRIC_PRECISION)
    }

    #[inline]
    pub fn from_f32(px: f32) -> TextFixed {
        TextFixed((px * ONE as f32).round() as i32)
    }

    /// Rounds to the nearest whole pixel.
    #[inline]
    pub fn round_px(self) -> i32 {
        (self.0 + ONE / 2) >> TEXT_METRIC_PRECISION
    }

    /// Rounds up to the next whole pixel.
    #[inline]
    pub fn ceil_px(self) -> i32 {
        (self.0 + ONE - 1) >> TEXT_METRIC_PRECISION
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / ONE as f32
    }

    /// Fixed × fixed → fixed.
    #[inline]
    pub fn mul(self, other: TextFixed) -> TextFixed {
        TextFixed(((self.0 as i64 * other.0 as i64) >> TEXT_METRIC_PRECISION) as i32)
    }
}

impl std::ops::Add for TextFixed {
    type Output = TextFixed;
    fn add(self, rhs: TextFixed) -> TextFixed {
        TextFixed(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for TextFixed {
    fn add_assign(&mut self, rhs: TextFixed) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for TextFixed {
    type Output = TextFixed;
    fn sub(self, rhs: TextFixed) -> TextFixed {
        TextFixed(self.0 - rhs.0)
    }
}

impl std::ops::Neg for TextFixed {
    type Output = TextFixed;
    fn neg(self) -> TextFixed {
        TextFixed(-self.0)
    }
}

/// Applies an adjustment ratio to one piece of glue: the ratio scales the
/// stretch (positive ratios) or shrink (negative ratios) of the glue.
pub fn adjust_glue(
    ratio: TextFixed,
    width: TextFixed,
    stretch: TextFixed,
    shrink: TextFixed,
) -> TextFixed {
    let m = if ratio.0 < 0 { shrink } else { stretch };
    width + m.mul(ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_round_trips() {
        assert_eq!(TextFixed::from_px(5).0, 320);
        assert_eq!(TextFixed::from_px(5).round_px(), 5);
        assert_eq!(TextFixed(321).ceil_px(), 6);
        assert_eq!(TextFixed(320).ceil_px(), 5);
        assert_eq!(TextFixed(-64).round_px(), -1);
    }

    #[test]
    fn glue_adjustment_uses_the_right_component() {
        let w = TextFixed::from_px(8);
        let stretch = TextFixed::from_px(4);
        let shrink = TextFixed::from_px(2);
        // Ratio +0.5 stretches by half the stretch.
        let half = TextFixed(ONE / 2);
        assert_eq!(adjust_glue(half, w, stretch, shrink), TextFixed::from_px(10));
        // Ratio -1 shrinks by the whole shrink.
        let minus_one = TextFixed(-ONE);
        assert_eq!(adjust_glue(minus_one, w, stretch, shrink), TextFixed::from_px(6));
    }
}
