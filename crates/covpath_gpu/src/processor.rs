//! Paint processing state carried by draw ops

use covpath_paint::{Color, IRect, PackedColor};
use smallvec::SmallVec;

use crate::caps::DeviceCaps;
use crate::clip::ClipProcessor;

/// Opaque id of a fragment processor (shader stage) in a processor set
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProcessorKey(pub u32);

/// How the cover pass blends with the destination
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    SrcOver,
    Src,
    Plus,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    Difference,
}

impl BlendMode {
    /// Modes that need advanced blend equations or a destination copy
    pub fn is_advanced(self) -> bool {
        matches!(
            self,
            BlendMode::Multiply
                | BlendMode::Overlay
                | BlendMode::Darken
                | BlendMode::Lighten
                | BlendMode::Difference
        )
    }
}

/// sRGB handling of the destination
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SrgbFlags {
    pub disable_srgb_write: bool,
    pub allow_srgb_inputs: bool,
}

/// Whether executing a draw needs a copy of the destination to sample from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequiresDstTexture(pub bool);

/// Result of analysing a processor set against a draw color and clip
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorAnalysis {
    pub requires_dst_texture: bool,
    pub has_clip_coverage: bool,
    pub input_color_ignored: bool,
}

/// Fragment processors plus blend state shared by every draw in an op
#[derive(Clone, Debug, Default)]
pub struct ProcessorSet {
    fragment: SmallVec<[ProcessorKey; 2]>,
    blend: BlendMode,
    analysis: Option<ProcessorAnalysis>,
}

impl PartialEq for ProcessorSet {
    fn eq(&self, other: &Self) -> bool {
        self.fragment == other.fragment && self.blend == other.blend
    }
}

impl Eq for ProcessorSet {}

impl ProcessorSet {
    pub fn new(blend: BlendMode) -> Self {
        Self {
            fragment: SmallVec::new(),
            blend,
            analysis: None,
        }
    }

    pub fn with_processor(mut self, key: ProcessorKey) -> Self {
        self.fragment.push(key);
        self
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn processors(&self) -> &[ProcessorKey] {
        &self.fragment
    }

    pub fn is_finalized(&self) -> bool {
        self.analysis.is_some()
    }

    pub fn analysis(&self) -> Option<&ProcessorAnalysis> {
        self.analysis.as_ref()
    }

    /// Analyse the set for `color` under `clip`. Runs once per set.
    ///
    /// A `Src` set driven by fragment stages ignores its input color, which is then
    /// replaced with opaque white so the instance data stays canonical.
    pub fn finalize(
        &mut self,
        color: &mut PackedColor,
        caps: &DeviceCaps,
        clip: Option<&AppliedClip>,
    ) -> ProcessorAnalysis {
        debug_assert!(self.analysis.is_none(), "processor set finalized twice");

        let input_color_ignored = self.blend == BlendMode::Src && !self.fragment.is_empty();
        if input_color_ignored {
            *color = Color::WHITE.to_packed_premul();
        }

        let analysis = ProcessorAnalysis {
            requires_dst_texture: self.blend.is_advanced() && !caps.advanced_blend_support,
            has_clip_coverage: clip.is_some_and(|c| !c.clip_processors.is_empty()),
            input_color_ignored,
        };
        self.analysis = Some(analysis);
        analysis
    }
}

/// Paint of a draw: color, processors and destination flags
#[derive(Clone, Debug, Default)]
pub struct Paint {
    pub color: Color,
    pub processors: ProcessorSet,
    pub srgb_flags: SrgbFlags,
}

impl Paint {
    pub fn solid(color: Color) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }
}

/// Clip state applied to an op at execute time
#[derive(Clone, Debug, Default)]
pub struct AppliedClip {
    pub scissor: Option<IRect>,
    pub clip_processors: SmallVec<[ClipProcessor; 2]>,
}

/// Everything a draw submission needs besides geometry
#[derive(Clone, Debug)]
pub struct Pipeline {
    pub processors: ProcessorSet,
    pub applied_clip: AppliedClip,
    pub srgb_flags: SrgbFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_analysis() {
        let mut a = ProcessorSet::new(BlendMode::SrcOver);
        let b = ProcessorSet::new(BlendMode::SrcOver);
        let mut color = PackedColor(0x8000_0080);
        a.finalize(&mut color, &DeviceCaps::default(), None);
        assert_eq!(a, b);
        assert_ne!(a, ProcessorSet::new(BlendMode::Multiply));
    }

    #[test]
    fn test_dst_texture_for_advanced_blend() {
        let mut color = PackedColor(0xFFFF_FFFF);
        let mut set = ProcessorSet::new(BlendMode::Darken);
        let analysis = set.finalize(&mut color, &DeviceCaps::default(), None);
        assert!(analysis.requires_dst_texture);

        let mut set = ProcessorSet::new(BlendMode::Darken);
        let analysis = set.finalize(&mut color, &DeviceCaps::full_support(4096), None);
        assert!(!analysis.requires_dst_texture);
    }

    #[test]
    fn test_src_with_shader_ignores_color() {
        let mut color = PackedColor(0x4000_0040);
        let mut set = ProcessorSet::new(BlendMode::Src).with_processor(ProcessorKey(7));
        let analysis = set.finalize(&mut color, &DeviceCaps::default(), None);
        assert!(analysis.input_color_ignored);
        assert_eq!(color, PackedColor(0xFFFF_FFFF));
    }
}
