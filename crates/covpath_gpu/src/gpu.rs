//! Backend contracts
//!
//! The renderer never talks to a graphics API directly. Buffer and texture
//! handles come from a [`GpuBackend`], allocations go through an
//! [`OnFlushResourceProvider`] during `pre_flush`, and draws are submitted to
//! an [`OpFlushState`] when ops execute. Handles are reference-like and are
//! released by dropping them.

use std::fmt::Debug;

use covpath_paint::Rect;

use crate::caps::DeviceCaps;
use crate::error::Result;
use crate::path_processor::PathProcessor;
use crate::processor::{AppliedClip, Pipeline};

/// Handle types of a graphics backend
pub trait GpuBackend: Clone + Debug + 'static {
    type Buffer: Clone + Debug;
    type Texture: Clone + Debug;
}

/// What a buffer is bound as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Index,
    Vertex,
    /// Per-instance vertex attributes
    Instance,
    /// Shader-readable storage (coverage point data)
    Storage,
}

/// Cache key for buffers whose contents never change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StaticBufferKey(pub &'static str);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceOrigin {
    TopLeft,
    BottomLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelConfig {
    /// Single channel half float, used for coverage counts
    AlphaHalf,
}

/// Description of a render target to allocate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: i32,
    pub height: i32,
    pub config: PixelConfig,
    pub origin: SurfaceOrigin,
}

/// An allocated render target
#[derive(Clone, Debug)]
pub struct RenderTarget<B: GpuBackend> {
    pub texture: B::Texture,
    pub width: i32,
    pub height: i32,
    pub origin: SurfaceOrigin,
}

/// Allocation services available while a flush is being prepared
pub trait OnFlushResourceProvider<B: GpuBackend> {
    fn caps(&self) -> &DeviceCaps;

    /// Return the buffer cached under `key`, creating it from `data` on first use
    fn find_or_make_static_buffer(
        &mut self,
        key: StaticBufferKey,
        kind: BufferKind,
        data: &[u8],
    ) -> Result<B::Buffer>;

    /// Allocate an uninitialized buffer of `size` bytes
    fn make_buffer(&mut self, kind: BufferKind, size: usize) -> Result<B::Buffer>;

    /// Copy `data` to the start of `buffer`
    fn write_buffer(&mut self, buffer: &B::Buffer, data: &[u8]) -> Result<()>;

    fn make_render_target(&mut self, desc: &SurfaceDesc) -> Result<RenderTarget<B>>;
}

/// An instanced draw of the octagon cover geometry
#[derive(Debug)]
pub struct Mesh<'a, B: GpuBackend> {
    pub index_buffer: &'a B::Buffer,
    pub index_count: u32,
    pub vertex_buffer: &'a B::Buffer,
    pub instance_buffer: &'a B::Buffer,
    pub base_instance: u32,
    pub instance_count: u32,
}

/// Command submission available while ops execute
pub trait OpFlushState<B: GpuBackend> {
    fn caps(&self) -> &DeviceCaps;

    /// Take the clip state that applies to the op being executed
    fn detach_applied_clip(&mut self) -> AppliedClip;

    fn draw(
        &mut self,
        pipeline: &Pipeline,
        processor: &PathProcessor<'_, B>,
        mesh: &Mesh<'_, B>,
        bounds: &Rect,
    );
}
