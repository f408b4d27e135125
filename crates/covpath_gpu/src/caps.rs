//! Device capability queries

/// How the device lets the CPU write into GPU buffers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapBufferSupport {
    /// Buffers cannot be written from the CPU
    #[default]
    None,
    /// Buffers can be mapped into CPU memory
    Map,
    /// Buffers can only be updated with sub-data uploads
    SubData,
}

impl MapBufferSupport {
    pub fn is_writable(self) -> bool {
        !matches!(self, MapBufferSupport::None)
    }
}

/// Shader language features the coverage pipeline relies on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderCaps {
    pub geometry_shader_support: bool,
    pub integer_support: bool,
    pub flat_interpolation_support: bool,
}

/// Whether a pixel format can be sampled from and rendered to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatSupport {
    pub texturable: bool,
    pub renderable: bool,
}

/// Capabilities of the device the renderer runs on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    pub shader: ShaderCaps,
    pub instance_attrib_support: bool,
    pub map_buffer_support: MapBufferSupport,
    /// Support for the half-float single channel coverage format
    pub alpha_half: FormatSupport,
    /// Set on drivers known to mis-render coverage counting
    pub blacklist_coverage_counting: bool,
    pub max_render_target_size: i32,
    pub max_texture_size: i32,
    /// Advanced blend equations without a destination texture copy
    pub advanced_blend_support: bool,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            shader: ShaderCaps::default(),
            instance_attrib_support: false,
            map_buffer_support: MapBufferSupport::None,
            alpha_half: FormatSupport::default(),
            blacklist_coverage_counting: false,
            max_render_target_size: 4096,
            max_texture_size: 4096,
            advanced_blend_support: false,
        }
    }
}

impl DeviceCaps {
    /// A device with every feature the renderer needs
    pub fn full_support(max_size: i32) -> Self {
        Self {
            shader: ShaderCaps {
                geometry_shader_support: true,
                integer_support: true,
                flat_interpolation_support: true,
            },
            instance_attrib_support: true,
            map_buffer_support: MapBufferSupport::Map,
            alpha_half: FormatSupport {
                texturable: true,
                renderable: true,
            },
            blacklist_coverage_counting: false,
            max_render_target_size: max_size,
            max_texture_size: max_size,
            advanced_blend_support: true,
        }
    }

    /// Largest square atlas side that can be both rendered and sampled
    pub fn max_atlas_size(&self) -> i32 {
        self.max_render_target_size.min(self.max_texture_size)
    }
}
