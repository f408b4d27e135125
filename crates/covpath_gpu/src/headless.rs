//! Headless backend for testing.
//!
//! Implements the backend contracts without a GPU, useful for:
//! - Unit and integration tests of the flush pipeline
//! - Checking allocation behavior and instance data on CI
//! - Injecting allocation failures

use bytemuck::Pod;
use covpath_paint::{FillRule, ISize, Rect};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::caps::DeviceCaps;
use crate::error::{CoverageError, Result};
use crate::gpu::{
    BufferKind, GpuBackend, Mesh, OnFlushResourceProvider, OpFlushState, RenderTarget,
    StaticBufferKey, SurfaceDesc,
};
use crate::path_processor::PathProcessor;
use crate::processor::{AppliedClip, Pipeline};

/// Backend whose handles are plain ids
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessBackend;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessBuffer {
    pub id: u32,
    pub kind: BufferKind,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeadlessTexture {
    pub id: u32,
    pub size: ISize,
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
}

/// Counters of everything a provider allocated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub static_buffers_made: usize,
    pub buffers_made: usize,
    pub render_targets_made: usize,
    pub buffer_writes: usize,
    pub bytes_written: usize,
}

impl AllocationStats {
    /// Buffers and render targets created, static buffers included
    pub fn total_allocations(&self) -> usize {
        self.static_buffers_made + self.buffers_made + self.render_targets_made
    }
}

/// Resource provider that keeps buffer contents in memory
#[derive(Debug)]
pub struct HeadlessResourceProvider {
    caps: DeviceCaps,
    next_id: u32,
    contents: FxHashMap<u32, Vec<u8>>,
    static_buffers: FxHashMap<StaticBufferKey, HeadlessBuffer>,
    render_targets: Vec<SurfaceDesc>,
    failing_kinds: SmallVec<[BufferKind; 2]>,
    fail_render_targets: bool,
    fail_writes: bool,
    stats: AllocationStats,
}

impl HeadlessResourceProvider {
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            caps,
            next_id: 1,
            contents: FxHashMap::default(),
            static_buffers: FxHashMap::default(),
            render_targets: Vec::new(),
            failing_kinds: SmallVec::new(),
            fail_render_targets: false,
            fail_writes: false,
            stats: AllocationStats::default(),
        }
    }

    /// Make every later allocation of `kind` fail
    pub fn fail_buffer_kind(&mut self, kind: BufferKind) {
        if !self.failing_kinds.contains(&kind) {
            self.failing_kinds.push(kind);
        }
    }

    pub fn fail_render_targets(&mut self, fail: bool) {
        self.fail_render_targets = fail;
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn stats(&self) -> AllocationStats {
        self.stats
    }

    /// Descriptions of every render target made, in order
    pub fn render_targets(&self) -> &[SurfaceDesc] {
        &self.render_targets
    }

    pub fn buffer_contents(&self, buffer: &HeadlessBuffer) -> Option<&[u8]> {
        self.contents.get(&buffer.id).map(Vec::as_slice)
    }

    /// Decode a buffer as a sequence of `T`, ignoring any trailing partial
    /// element
    pub fn read_instances<T: Pod>(&self, buffer: &HeadlessBuffer) -> Vec<T> {
        self.buffer_contents(buffer)
            .map(|bytes| {
                bytes
                    .chunks_exact(std::mem::size_of::<T>())
                    .map(bytemuck::pod_read_unaligned)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn alloc_buffer(&mut self, kind: BufferKind, size: usize) -> Result<HeadlessBuffer> {
        if self.failing_kinds.contains(&kind) {
            return Err(CoverageError::BufferAllocation { kind, size });
        }
        let buffer = HeadlessBuffer {
            id: self.next_id(),
            kind,
            size,
        };
        self.contents.insert(buffer.id, vec![0; size]);
        Ok(buffer)
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl OnFlushResourceProvider<HeadlessBackend> for HeadlessResourceProvider {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn find_or_make_static_buffer(
        &mut self,
        key: StaticBufferKey,
        kind: BufferKind,
        data: &[u8],
    ) -> Result<HeadlessBuffer> {
        if let Some(buffer) = self.static_buffers.get(&key) {
            return Ok(buffer.clone());
        }
        let buffer = self.alloc_buffer(kind, data.len())?;
        self.contents.insert(buffer.id, data.to_vec());
        self.static_buffers.insert(key, buffer.clone());
        self.stats.static_buffers_made += 1;
        tracing::trace!(key = key.0, size = data.len(), "static buffer created");
        Ok(buffer)
    }

    fn make_buffer(&mut self, kind: BufferKind, size: usize) -> Result<HeadlessBuffer> {
        let buffer = self.alloc_buffer(kind, size)?;
        self.stats.buffers_made += 1;
        Ok(buffer)
    }

    fn write_buffer(&mut self, buffer: &HeadlessBuffer, data: &[u8]) -> Result<()> {
        let upload_error = CoverageError::BufferUpload {
            kind: buffer.kind,
            size: data.len(),
        };
        if self.fail_writes || data.len() > buffer.size {
            return Err(upload_error);
        }
        let Some(contents) = self.contents.get_mut(&buffer.id) else {
            return Err(upload_error);
        };
        contents[..data.len()].copy_from_slice(data);
        self.stats.buffer_writes += 1;
        self.stats.bytes_written += data.len();
        Ok(())
    }

    fn make_render_target(&mut self, desc: &SurfaceDesc) -> Result<RenderTarget<HeadlessBackend>> {
        if self.fail_render_targets {
            return Err(CoverageError::RenderTargetAllocation {
                width: desc.width,
                height: desc.height,
            });
        }
        self.render_targets.push(*desc);
        self.stats.render_targets_made += 1;
        Ok(RenderTarget {
            texture: HeadlessTexture {
                id: self.next_id(),
                size: ISize::new(desc.width, desc.height),
            },
            width: desc.width,
            height: desc.height,
            origin: desc.origin,
        })
    }
}

/// A draw submitted to a [`RecordingFlushState`]
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedDraw {
    pub atlas: HeadlessTexture,
    pub fill_rule: FillRule,
    pub instance_buffer: HeadlessBuffer,
    pub base_instance: u32,
    pub instance_count: u32,
    pub index_count: u32,
    pub bounds: Rect,
    pub scissor: Option<covpath_paint::IRect>,
}

/// Flush state that records draw submissions instead of issuing them
#[derive(Debug)]
pub struct RecordingFlushState {
    caps: DeviceCaps,
    applied_clip: AppliedClip,
    draws: Vec<RecordedDraw>,
}

impl RecordingFlushState {
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            caps,
            applied_clip: AppliedClip::default(),
            draws: Vec::new(),
        }
    }

    /// Clip state handed to the next op that executes
    pub fn set_applied_clip(&mut self, clip: AppliedClip) {
        self.applied_clip = clip;
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn total_instances(&self) -> u32 {
        self.draws.iter().map(|draw| draw.instance_count).sum()
    }
}

impl OpFlushState<HeadlessBackend> for RecordingFlushState {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn detach_applied_clip(&mut self) -> AppliedClip {
        std::mem::take(&mut self.applied_clip)
    }

    fn draw(
        &mut self,
        pipeline: &Pipeline,
        processor: &PathProcessor<'_, HeadlessBackend>,
        mesh: &Mesh<'_, HeadlessBackend>,
        bounds: &Rect,
    ) {
        self.draws.push(RecordedDraw {
            atlas: processor.atlas.texture.clone(),
            fill_rule: processor.fill_rule,
            instance_buffer: mesh.instance_buffer.clone(),
            base_instance: mesh.base_instance,
            instance_count: mesh.instance_count,
            index_count: mesh.index_count,
            bounds: *bounds,
            scissor: pipeline.applied_clip.scissor,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_buffers_are_cached() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::default());
        let key = StaticBufferKey("test");
        let a = provider
            .find_or_make_static_buffer(key, BufferKind::Index, &[1, 2, 3, 4])
            .unwrap();
        let b = provider
            .find_or_make_static_buffer(key, BufferKind::Index, &[9, 9, 9, 9])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.buffer_contents(&a), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(provider.stats().static_buffers_made, 1);
    }

    #[test]
    fn test_write_past_end_fails() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::default());
        let buffer = provider.make_buffer(BufferKind::Vertex, 4).unwrap();
        assert_eq!(
            provider.write_buffer(&buffer, &[0; 8]),
            Err(CoverageError::BufferUpload {
                kind: BufferKind::Vertex,
                size: 8
            })
        );
        provider.write_buffer(&buffer, &[7, 7]).unwrap();
        assert_eq!(provider.buffer_contents(&buffer), Some(&[7u8, 7, 0, 0][..]));
    }

    #[test]
    fn test_failure_injection() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::default());
        provider.fail_buffer_kind(BufferKind::Instance);
        assert!(provider.make_buffer(BufferKind::Instance, 64).is_err());
        assert!(provider.make_buffer(BufferKind::Vertex, 64).is_ok());

        provider.fail_render_targets(true);
        let desc = SurfaceDesc {
            width: 16,
            height: 16,
            config: crate::gpu::PixelConfig::AlphaHalf,
            origin: crate::gpu::SurfaceOrigin::TopLeft,
        };
        assert!(provider.make_render_target(&desc).is_err());
        assert_eq!(provider.stats().render_targets_made, 0);
    }

    #[test]
    fn test_read_instances() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::default());
        let buffer = provider.make_buffer(BufferKind::Instance, 10).unwrap();
        provider
            .write_buffer(&buffer, bytemuck::cast_slice(&[3u32, 5u32]))
            .unwrap();
        assert_eq!(provider.read_instances::<u32>(&buffer), vec![3, 5]);
    }
}
