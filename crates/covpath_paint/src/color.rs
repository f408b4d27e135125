//! Color types and utilities

/// RGBA color with f32 components (0.0 to 1.0), not premultiplied
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Convert to u8 array [r, g, b, a], clamping out-of-range components
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            unit_to_u8(self.r),
            unit_to_u8(self.g),
            unit_to_u8(self.b),
            unit_to_u8(self.a),
        ]
    }

    /// Premultiply and pack into a little-endian `0xAABBGGRR` word.
    ///
    /// This is the per-instance color format consumed by the cover shader.
    pub fn to_packed_premul(&self) -> PackedColor {
        let a = self.a.clamp(0.0, 1.0);
        let premul = Color::new(self.r * a, self.g * a, self.b * a, a);
        PackedColor(u32::from_le_bytes(premul.to_rgba8()))
    }
}

fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// A premultiplied RGBA8 color packed into one word (R in the low byte)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PackedColor(pub u32);

impl PackedColor {
    pub const TRANSPARENT: PackedColor = PackedColor(0);

    pub fn to_rgba8(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_premul() {
        let packed = Color::new(1.0, 0.0, 0.0, 0.5).to_packed_premul();
        let [r, g, b, a] = packed.to_rgba8();
        assert_eq!(r, 128);
        assert_eq!(g, 0);
        assert_eq!(b, 0);
        assert_eq!(a, 128);
    }

    #[test]
    fn test_opaque_pack_keeps_channels() {
        assert_eq!(Color::WHITE.to_packed_premul(), PackedColor(0xFFFF_FFFF));
        assert_eq!(Color::TRANSPARENT.to_packed_premul(), PackedColor::TRANSPARENT);
    }
}
