/// An 8-bit-per-channel, straight (non-premultiplied) alpha color.
///
/// Everything that touches the shared canvas is integer math, so all participants agree bit-for-bit.
#[repr(C)]
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable, Debug,
)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}
impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
    #[must_use]
    pub const fn as_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
    #[must_use]
    pub const fn from_array([r, g, b, a]: [u8; 4]) -> Self {
        Self::new(r, g, b, a)
    }
    /// Color distance used by flood fill: the largest absolute difference of any channel,
    /// alpha included.
    #[must_use]
    pub fn distance(self, other: Self) -> u8 {
        self.as_array()
            .into_iter()
            .zip(other.as_array())
            .map(|(a, b)| a.abs_diff(b))
            .max()
            .unwrap_or(0)
    }
}
impl From<[u8; 4]> for Rgba8 {
    fn from(value: [u8; 4]) -> Self {
        Self::from_array(value)
    }
}
impl From<Rgba8> for [u8; 4] {
    fn from(value: Rgba8) -> Self {
        value.as_array()
    }
}

#[cfg(test)]
mod test {
    use super::Rgba8;
    #[test]
    fn distance() {
        let a = Rgba8::new(10, 20, 30, 255);
        assert_eq!(a.distance(a), 0);
        assert_eq!(a.distance(Rgba8::new(15, 20, 30, 255)), 5);
        // Largest channel wins, alpha counts too.
        assert_eq!(a.distance(Rgba8::new(12, 18, 30, 200)), 55);
        assert_eq!(Rgba8::BLACK.distance(Rgba8::WHITE), 255);
    }
    #[test]
    fn layout() {
        // Raster bytes are cast directly for export.
        let px = [Rgba8::new(1, 2, 3, 4), Rgba8::new(5, 6, 7, 8)];
        let bytes: &[u8] = bytemuck::cast_slice(&px);
        assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
