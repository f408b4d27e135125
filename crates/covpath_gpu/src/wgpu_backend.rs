//! wgpu resource provider
//!
//! Buffers are created with `COPY_DST` and filled through the queue; static
//! buffers are created initialized and cached for the provider's lifetime.
//! Atlases are `R16Float` textures that can be rendered to and sampled.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::caps::{DeviceCaps, FormatSupport, MapBufferSupport, ShaderCaps};
use crate::error::{CoverageError, Result};
use crate::gpu::{
    BufferKind, GpuBackend, OnFlushResourceProvider, PixelConfig, RenderTarget, StaticBufferKey,
    SurfaceDesc,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct WgpuBackend;

impl GpuBackend for WgpuBackend {
    type Buffer = Arc<wgpu::Buffer>;
    type Texture = Arc<wgpu::Texture>;
}

/// Capabilities of a wgpu device with the given limits.
///
/// Coverage instances are expanded by vertex pulling, so the geometry stage
/// requirement holds on every wgpu backend.
pub fn caps_for_limits(limits: &wgpu::Limits) -> DeviceCaps {
    let max_size = i32::try_from(limits.max_texture_dimension_2d).unwrap_or(i32::MAX);
    DeviceCaps {
        shader: ShaderCaps {
            geometry_shader_support: true,
            integer_support: true,
            flat_interpolation_support: true,
        },
        instance_attrib_support: true,
        map_buffer_support: MapBufferSupport::SubData,
        alpha_half: FormatSupport {
            texturable: true,
            renderable: true,
        },
        blacklist_coverage_counting: false,
        max_render_target_size: max_size,
        max_texture_size: max_size,
        advanced_blend_support: false,
    }
}

fn usage_for(kind: BufferKind) -> wgpu::BufferUsages {
    let usage = match kind {
        BufferKind::Index => wgpu::BufferUsages::INDEX,
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
        BufferKind::Instance => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE,
        BufferKind::Storage => wgpu::BufferUsages::STORAGE,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

fn align_to_copy(size: usize) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    (size.max(1).div_ceil(align) * align) as u64
}

/// Resource provider backed by a wgpu device and queue
pub struct WgpuResourceProvider {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    caps: DeviceCaps,
    static_buffers: FxHashMap<StaticBufferKey, Arc<wgpu::Buffer>>,
}

impl WgpuResourceProvider {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let caps = caps_for_limits(&device.limits());
        Self {
            device,
            queue,
            caps,
            static_buffers: FxHashMap::default(),
        }
    }

    pub fn with_caps(mut self, caps: DeviceCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    fn check_buffer_size(&self, kind: BufferKind, size: usize) -> Result<u64> {
        let aligned = align_to_copy(size);
        if aligned > self.device.limits().max_buffer_size {
            return Err(CoverageError::BufferAllocation { kind, size });
        }
        Ok(aligned)
    }
}

impl OnFlushResourceProvider<WgpuBackend> for WgpuResourceProvider {
    fn caps(&self) -> &DeviceCaps {
        &self.caps
    }

    fn find_or_make_static_buffer(
        &mut self,
        key: StaticBufferKey,
        kind: BufferKind,
        data: &[u8],
    ) -> Result<Arc<wgpu::Buffer>> {
        if let Some(buffer) = self.static_buffers.get(&key) {
            return Ok(buffer.clone());
        }
        self.check_buffer_size(kind, data.len())?;
        let buffer = Arc::new(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(key.0),
            contents: data,
            usage: usage_for(kind),
        }));
        self.static_buffers.insert(key, buffer.clone());
        Ok(buffer)
    }

    fn make_buffer(&mut self, kind: BufferKind, size: usize) -> Result<Arc<wgpu::Buffer>> {
        let aligned = self.check_buffer_size(kind, size)?;
        Ok(Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("coverage_buffer"),
            size: aligned,
            usage: usage_for(kind),
            mapped_at_creation: false,
        })))
    }

    fn write_buffer(&mut self, buffer: &Arc<wgpu::Buffer>, data: &[u8]) -> Result<()> {
        let aligned = align_to_copy(data.len());
        if aligned > buffer.size() {
            return Err(CoverageError::BufferUpload {
                kind: BufferKind::Storage,
                size: data.len(),
            });
        }
        if data.len() as u64 == aligned {
            self.queue.write_buffer(buffer, 0, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(aligned as usize, 0);
            self.queue.write_buffer(buffer, 0, &padded);
        }
        Ok(())
    }

    fn make_render_target(&mut self, desc: &SurfaceDesc) -> Result<RenderTarget<WgpuBackend>> {
        let max = self.device.limits().max_texture_dimension_2d;
        let (Ok(width), Ok(height)) = (u32::try_from(desc.width), u32::try_from(desc.height)) else {
            return Err(CoverageError::RenderTargetAllocation {
                width: desc.width,
                height: desc.height,
            });
        };
        if width == 0 || height == 0 || width > max || height > max {
            return Err(CoverageError::RenderTargetAllocation {
                width: desc.width,
                height: desc.height,
            });
        }

        let format = match desc.config {
            PixelConfig::AlphaHalf => wgpu::TextureFormat::R16Float,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("coverage_atlas"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        tracing::trace!(width, height, "coverage atlas texture created");

        Ok(RenderTarget {
            texture: Arc::new(texture),
            width: desc.width,
            height: desc.height,
            origin: desc.origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_follow_limits() {
        let limits = wgpu::Limits {
            max_texture_dimension_2d: 2048,
            ..wgpu::Limits::downlevel_defaults()
        };
        let caps = caps_for_limits(&limits);
        assert_eq!(caps.max_atlas_size(), 2048);
        assert!(caps.map_buffer_support.is_writable());
    }

    #[test]
    fn test_copy_alignment() {
        assert_eq!(align_to_copy(0), 4);
        assert_eq!(align_to_copy(4), 4);
        assert_eq!(align_to_copy(5), 8);
    }
}
