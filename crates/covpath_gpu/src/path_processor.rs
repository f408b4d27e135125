//! Cover pass geometry processor and its static buffers
//!
//! Every path instance is drawn as an octagon: the intersection of its
//! axis-aligned device bounds and its 45° bounds. The eight vertices carry
//! edge normals that pick which bound each corner snaps to; the shader does
//! the rest from the instance data.

use covpath_paint::{FillRule, ISize};

use crate::error::Result;
use crate::gpu::{
    BufferKind, GpuBackend, OnFlushResourceProvider, RenderTarget, StaticBufferKey, SurfaceOrigin,
};

/// Per-vertex edge normals, two `vec2` per octagon corner
pub const OCTO_EDGE_NORMALS: [f32; 32] = [
    -1.0, 0.0, -1.0, 1.0, //
    -1.0, 0.0, -1.0, -1.0, //
    0.0, -1.0, -1.0, -1.0, //
    0.0, -1.0, 1.0, -1.0, //
    1.0, 0.0, 1.0, -1.0, //
    1.0, 0.0, 1.0, 1.0, //
    0.0, 1.0, 1.0, 1.0, //
    0.0, 1.0, -1.0, 1.0, //
];

pub const OCTO_INDICES: [u16; 18] = [
    0, 4, 2, //
    0, 6, 4, //
    0, 2, 1, //
    2, 4, 3, //
    4, 6, 5, //
    6, 0, 7, //
];

pub const OCTO_INDEX_COUNT: u32 = OCTO_INDICES.len() as u32;

pub const OCTO_INDEX_BUFFER_KEY: StaticBufferKey = StaticBufferKey("covpath.octo_indices");
pub const OCTO_VERTEX_BUFFER_KEY: StaticBufferKey = StaticBufferKey("covpath.octo_edge_normals");

pub fn find_or_make_index_buffer<B, P>(provider: &mut P) -> Result<B::Buffer>
where
    B: GpuBackend,
    P: OnFlushResourceProvider<B> + ?Sized,
{
    provider.find_or_make_static_buffer(
        OCTO_INDEX_BUFFER_KEY,
        BufferKind::Index,
        bytemuck::cast_slice(&OCTO_INDICES[..]),
    )
}

pub fn find_or_make_vertex_buffer<B, P>(provider: &mut P) -> Result<B::Buffer>
where
    B: GpuBackend,
    P: OnFlushResourceProvider<B> + ?Sized,
{
    provider.find_or_make_static_buffer(
        OCTO_VERTEX_BUFFER_KEY,
        BufferKind::Vertex,
        bytemuck::cast_slice(&OCTO_EDGE_NORMALS[..]),
    )
}

/// Geometry processor for one atlas batch of the cover pass
#[derive(Debug)]
pub struct PathProcessor<'a, B: GpuBackend> {
    pub atlas: &'a RenderTarget<B>,
    pub fill_rule: FillRule,
}

impl<'a, B: GpuBackend> PathProcessor<'a, B> {
    pub fn new(atlas: &'a RenderTarget<B>, fill_rule: FillRule) -> Self {
        Self { atlas, fill_rule }
    }

    pub fn atlas_size(&self) -> ISize {
        ISize::new(self.atlas.width, self.atlas.height)
    }

    /// Whether atlas reads have to flip Y
    pub fn atlas_flipped(&self) -> bool {
        self.atlas.origin == SurfaceOrigin::BottomLeft
    }
}
