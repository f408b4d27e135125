//! GPU instance layouts
//!
//! Defines the per-instance data consumed by the cover and coverage passes.
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod` for safe
//! GPU buffer copies.

use covpath_paint::{PackedColor, Rect, Transform};

/// One path draw in the cover pass.
///
/// The vertex shader expands each instance into an octagon bounded by both
/// the axis-aligned device bounds and the 45° bounds, then samples coverage
/// from the atlas at `device position + atlas_offset`.
///
/// Notes:
/// - `dev_bounds45` is the bounding box of the path's points mapped to
///   `(x - y, x + y)`.
/// - The view matrix is only needed to evaluate local coordinates for paint.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PathInstance {
    /// (left, top, right, bottom) in device pixels
    pub dev_bounds: [f32; 4],
    /// (left, top, right, bottom) in the 45° frame
    pub dev_bounds45: [f32; 4],
    /// Upper-left 2x2 of the view matrix: (scale_x, skew_y, skew_x, scale_y)
    pub view_matrix: [f32; 4],
    pub view_translate: [f32; 2],
    /// Device to atlas translation
    pub atlas_offset: [i16; 2],
    /// Premultiplied RGBA8, R in the low byte
    pub color: u32,
}

impl PathInstance {
    pub fn new(
        dev_bounds: &Rect,
        dev_bounds45: &Rect,
        view_matrix: &Transform,
        atlas_offset: (i16, i16),
        color: PackedColor,
    ) -> Self {
        Self {
            dev_bounds: dev_bounds.to_array(),
            dev_bounds45: dev_bounds45.to_array(),
            view_matrix: view_matrix.linear_components(),
            view_translate: view_matrix.translate_components(),
            atlas_offset: [atlas_offset.0, atlas_offset.1],
            color: color.0,
        }
    }
}

/// A coverage-counting triangle: three indices into the point buffer
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TriangleInstance {
    pub indices: [u32; 3],
    pub atlas_offset: [i16; 2],
}

/// A quadratic segment: start, control and end point indices
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadInstance {
    pub indices: [u32; 3],
    pub atlas_offset: [i16; 2],
}

/// A cubic segment: start, two controls and end point indices
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CubicInstance {
    pub indices: [u32; 4],
    pub atlas_offset: [i16; 2],
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_instance_sizes() {
        assert_eq!(size_of::<PathInstance>(), 64);
        assert_eq!(size_of::<TriangleInstance>(), 16);
        assert_eq!(size_of::<QuadInstance>(), 16);
        assert_eq!(size_of::<CubicInstance>(), 20);
    }

    #[test]
    fn test_path_instance_fields() {
        let m = Transform::affine(2.0, 0.5, -0.5, 3.0, 10.0, 20.0);
        let instance = PathInstance::new(
            &Rect::new(0.0, 1.0, 2.0, 3.0),
            &Rect::new(-3.0, 1.0, 1.0, 5.0),
            &m,
            (-7, 12),
            PackedColor(0xFF00_00FF),
        );
        assert_eq!(instance.view_matrix, [2.0, 0.5, -0.5, 3.0]);
        assert_eq!(instance.view_translate, [10.0, 20.0]);
        assert_eq!(instance.atlas_offset, [-7, 12]);
        assert_eq!(instance.color, 0xFF00_00FF);

        let bytes: &[u8] = bytemuck::bytes_of(&instance);
        assert_eq!(bytes.len(), 64);
    }
}
