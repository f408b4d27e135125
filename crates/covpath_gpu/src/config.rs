//! Renderer configuration
//!
//! Defaults can be adjusted at startup through environment variables:
//! - `COVPATH_DRAW_CACHABLE_PATHS=1`
//! - `COVPATH_ATLAS_MIN_SIZE=2048`
//! - `COVPATH_CROP_THRESHOLD=32768`

use covpath_paint::DEFAULT_CROP_TOLERANCE;

fn parse_usize(value: Option<String>) -> Option<usize> {
    value.and_then(|v| v.trim().parse::<usize>().ok())
}

fn parse_f32(value: Option<String>) -> Option<f32> {
    value
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn parse_bool(value: Option<String>) -> Option<bool> {
    value.and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

/// Configuration for the coverage-counting path renderer
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Also draw paths that a higher-level cache could keep (non-volatile paths)
    pub draw_cachable_paths: bool,
    /// Device-space extent above which paths are cropped before rasterizing.
    ///
    /// Coverage math runs in fp32 and degrades on paths wider than about 2^16
    /// pixels.
    pub crop_threshold: f32,
    /// Pixel area above which the renderer only volunteers as a fallback
    pub backup_area_threshold: i64,
    /// Verb count above which cacheable paths are left to other renderers
    pub complex_path_verbs: usize,
    /// Smallest atlas side ever allocated
    pub atlas_min_size: i32,
    /// Empty texels kept to the right and below every atlas entry
    pub atlas_padding: i32,
    /// Curve flattening tolerance used when cropping, in pixels
    pub crop_tolerance: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            draw_cachable_paths: false,
            crop_threshold: 65536.0,
            backup_area_threshold: 256 * 256,
            complex_path_verbs: 50,
            atlas_min_size: 1024,
            atlas_padding: 1,
            crop_tolerance: DEFAULT_CROP_TOLERANCE,
        }
    }
}

impl RendererConfig {
    /// Defaults with the `COVPATH_*` environment overrides applied
    pub fn from_env() -> Self {
        let config = Self::default().with_overrides(|name| std::env::var(name).ok());
        log_renderer_config(&config);
        config
    }

    /// Apply overrides from a variable lookup; unparsable values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_bool(lookup("COVPATH_DRAW_CACHABLE_PATHS")) {
            self.draw_cachable_paths = v;
        }
        if let Some(v) = parse_usize(lookup("COVPATH_ATLAS_MIN_SIZE")) {
            self.atlas_min_size = i32::try_from(v).unwrap_or(i32::MAX).max(1);
        }
        if let Some(v) = parse_f32(lookup("COVPATH_CROP_THRESHOLD")) {
            self.crop_threshold = v;
        }
        self
    }

    pub fn with_draw_cachable_paths(mut self, enabled: bool) -> Self {
        self.draw_cachable_paths = enabled;
        self
    }

    pub fn with_crop_threshold(mut self, threshold: f32) -> Self {
        self.crop_threshold = threshold;
        self
    }

    pub fn with_atlas_min_size(mut self, size: i32) -> Self {
        self.atlas_min_size = size.max(1);
        self
    }

    pub fn with_crop_tolerance(mut self, tolerance: f32) -> Self {
        self.crop_tolerance = tolerance;
        self
    }
}

fn log_renderer_config(config: &RendererConfig) {
    tracing::info!(
        "covpath config: draw_cachable_paths={}, crop_threshold={}, atlas_min_size={}, backup_area={}, complex_path_verbs={}",
        config.draw_cachable_paths,
        config.crop_threshold,
        config.atlas_min_size,
        config.backup_area_threshold,
        config.complex_path_verbs
    );
}
