use crate::color::Rgba8;

/// Layer or brush opacity as 8-bit fixed point, where 255 is fully opaque.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Opacity(pub u8);
impl Opacity {
    pub const TRANSPARENT: Self = Self(0);
    pub const OPAQUE: Self = Self(255);
    /// Convert from a normalized value, clamping into `[0, 1]`. NaN maps to transparent.
    #[must_use]
    pub fn from_f32(value: f32) -> Self {
        if value.is_nan() {
            return Self::TRANSPARENT;
        }
        let scaled = (value.clamp(0.0, 1.0) * 255.0).round();
        Self(az::saturating_cast(scaled))
    }
    #[must_use]
    pub fn as_f32(self) -> f32 {
        f32::from(self.0) / 255.0
    }
}
impl Default for Opacity {
    fn default() -> Self {
        Self::OPAQUE
    }
}

/// How a patch's pixels combine with the layer beneath them.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[repr(u8)]
pub enum PatchMode {
    /// Composite over the existing pixel, weighted by the source alpha.
    #[default]
    Blend,
    /// Overwrite the existing pixel. With a transparent source, this erases.
    Replace,
}

/// `a * b / 255`, rounded to nearest.
#[must_use]
pub fn mul_255(a: u8, b: u8) -> u8 {
    let product = u32::from(a) * u32::from(b) + 128;
    // (p + (p >> 8)) >> 8 is the exact rounded division by 255 for 16 bit products.
    let rounded = (product + (product >> 8)) >> 8;
    // Max is 255*255/255
    u8::try_from(rounded).unwrap_or(u8::MAX)
}

/// Composite `above` onto `below` with the given opacity, straight alpha.
///
/// The effective weight is `a = opacity * above.a`. Over an opaque pixel every color channel becomes
/// exactly `below * (1 - a) + above * a`, rounded to nearest. Over translucent pixels the colors are
/// weighted by coverage, so compositing onto transparency keeps the source color.
#[must_use]
pub fn over(below: Rgba8, above: Rgba8, opacity: Opacity) -> Rgba8 {
    let a = mul_255(opacity.0, above.a);
    if a == 0 {
        return below;
    }
    if a == 255 {
        return above;
    }
    let below_weight = u32::from(mul_255(below.a, 255 - a));
    let a = u32::from(a);
    // Nonzero, since a is.
    let out_a = a + below_weight;
    let channel = |below: u8, above: u8| {
        let mixed = (u32::from(above) * a + u32::from(below) * below_weight + out_a / 2) / out_a;
        // Weighted mean of two u8s.
        u8::try_from(mixed).unwrap_or(u8::MAX)
    };
    Rgba8::new(
        channel(below.r, above.r),
        channel(below.g, above.g),
        channel(below.b, above.b),
        u8::try_from(out_a).unwrap_or(u8::MAX),
    )
}

/// Apply a single patch pixel according to `mode`.
#[must_use]
pub fn apply(mode: PatchMode, below: Rgba8, color: Rgba8) -> Rgba8 {
    match mode {
        PatchMode::Blend => over(below, color, Opacity::OPAQUE),
        PatchMode::Replace => color,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn mul() {
        assert_eq!(mul_255(255, 255), 255);
        assert_eq!(mul_255(255, 0), 0);
        assert_eq!(mul_255(128, 255), 128);
        assert_eq!(mul_255(128, 128), 64);
    }
    #[test]
    fn opacity_conversion() {
        assert_eq!(Opacity::from_f32(1.0), Opacity::OPAQUE);
        assert_eq!(Opacity::from_f32(2.0), Opacity::OPAQUE);
        assert_eq!(Opacity::from_f32(-1.0), Opacity::TRANSPARENT);
        assert_eq!(Opacity::from_f32(0.5), Opacity(128));
        assert_eq!(Opacity::from_f32(f32::NAN), Opacity::TRANSPARENT);
    }
    #[test]
    fn over_formula() {
        let below = Rgba8::opaque(200, 0, 100);
        let above = Rgba8::opaque(100, 255, 100);
        // Full and zero opacity are exact.
        assert_eq!(over(below, above, Opacity::OPAQUE), above);
        assert_eq!(over(below, above, Opacity::TRANSPARENT), below);
        // 200 * (1 - 128/255) + 100 * 128/255 = 149.8
        let mid = over(below, above, Opacity(128));
        assert_eq!(mid, Rgba8::opaque(150, 128, 100));
    }
    #[test]
    fn over_transparent_source() {
        let below = Rgba8::opaque(1, 2, 3);
        assert_eq!(over(below, Rgba8::TRANSPARENT, Opacity::OPAQUE), below);
    }
    #[test]
    fn over_transparent_destination() {
        // Color survives, only coverage is scaled.
        let above = Rgba8::opaque(200, 100, 50);
        assert_eq!(
            over(Rgba8::TRANSPARENT, above, Opacity(128)),
            Rgba8::new(200, 100, 50, 128)
        );
    }
    #[test]
    fn replace_erases() {
        let below = Rgba8::opaque(1, 2, 3);
        assert_eq!(
            apply(PatchMode::Replace, below, Rgba8::TRANSPARENT),
            Rgba8::TRANSPARENT
        );
        assert_eq!(apply(PatchMode::Blend, below, Rgba8::TRANSPARENT), below);
    }
}
