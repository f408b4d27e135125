//! 3x3 view transforms

use crate::geometry::{Point, Rect};

/// A 3x3 view matrix
///
/// ```text
/// | scale_x  skew_x   trans_x |
/// | skew_y   scale_y  trans_y |
/// | persp_0  persp_1  persp_2 |
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub scale_x: f32,
    pub skew_x: f32,
    pub trans_x: f32,
    pub skew_y: f32,
    pub scale_y: f32,
    pub trans_y: f32,
    pub persp_0: f32,
    pub persp_1: f32,
    pub persp_2: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform::affine(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    /// Affine transform from `[a, b, c, d, tx, ty]` style components
    pub const fn affine(
        scale_x: f32,
        skew_y: f32,
        skew_x: f32,
        scale_y: f32,
        trans_x: f32,
        trans_y: f32,
    ) -> Self {
        Self {
            scale_x,
            skew_x,
            trans_x,
            skew_y,
            scale_y,
            trans_y,
            persp_0: 0.0,
            persp_1: 0.0,
            persp_2: 1.0,
        }
    }

    pub fn translation(x: f32, y: f32) -> Self {
        Self::affine(1.0, 0.0, 0.0, 1.0, x, y)
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::affine(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotation(angle: f32) -> Self {
        let c = angle.cos();
        let s = angle.sin();
        Self::affine(c, s, -s, c, 0.0, 0.0)
    }

    pub fn with_perspective(mut self, persp_0: f32, persp_1: f32, persp_2: f32) -> Self {
        self.persp_0 = persp_0;
        self.persp_1 = persp_1;
        self.persp_2 = persp_2;
        self
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn has_perspective(&self) -> bool {
        self.persp_0 != 0.0 || self.persp_1 != 0.0 || self.persp_2 != 1.0
    }

    pub fn map_point(&self, p: Point) -> Point {
        let x = self.scale_x * p.x + self.skew_x * p.y + self.trans_x;
        let y = self.skew_y * p.x + self.scale_y * p.y + self.trans_y;
        if self.has_perspective() {
            let w = self.persp_0 * p.x + self.persp_1 * p.y + self.persp_2;
            let w = if w != 0.0 { 1.0 / w } else { 0.0 };
            Point::new(x * w, y * w)
        } else {
            Point::new(x, y)
        }
    }

    /// Bounds of the four mapped corners of `rect`
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            Point::new(rect.left, rect.top),
            Point::new(rect.right, rect.top),
            Point::new(rect.right, rect.bottom),
            Point::new(rect.left, rect.bottom),
        ];
        Rect::from_points(corners.map(|p| self.map_point(p))).unwrap_or(Rect::EMPTY)
    }

    /// Concatenate this transform with another (self * other).
    /// The resulting transform first applies `other`, then `self`.
    pub fn then(&self, other: &Transform) -> Transform {
        let a = self.rows();
        let b = other.rows();
        let mut out = [[0.0f32; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Transform {
            scale_x: out[0][0],
            skew_x: out[0][1],
            trans_x: out[0][2],
            skew_y: out[1][0],
            scale_y: out[1][1],
            trans_y: out[1][2],
            persp_0: out[2][0],
            persp_1: out[2][1],
            persp_2: out[2][2],
        }
    }

    /// The upper-left 2x2 in `[scale_x, skew_y, skew_x, scale_y]` order
    pub fn linear_components(&self) -> [f32; 4] {
        [self.scale_x, self.skew_y, self.skew_x, self.scale_y]
    }

    pub fn translate_components(&self) -> [f32; 2] {
        [self.trans_x, self.trans_y]
    }

    fn rows(&self) -> [[f32; 3]; 3] {
        [
            [self.scale_x, self.skew_x, self.trans_x],
            [self.skew_y, self.scale_y, self.trans_y],
            [self.persp_0, self.persp_1, self.persp_2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_then_applies_other_first() {
        let t = Transform::translation(10.0, 0.0).then(&Transform::scale(2.0, 2.0));
        assert_eq!(t.map_point(Point::new(1.0, 1.0)), Point::new(12.0, 2.0));
    }

    #[test]
    fn test_map_rect_rotated() {
        let t = Transform::rotation(std::f32::consts::FRAC_PI_2);
        let r = t.map_rect(&Rect::new(0.0, 0.0, 10.0, 20.0));
        assert!((r.left + 20.0).abs() < 1e-4);
        assert!((r.right - 0.0).abs() < 1e-4);
        assert!((r.bottom - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_perspective_flag() {
        assert!(!Transform::scale(3.0, 4.0).has_perspective());
        assert!(Transform::IDENTITY
            .with_perspective(0.001, 0.0, 1.0)
            .has_perspective());
    }
}
