//! Draw ops: batches of path fills sharing one paint

use covpath_paint::{crop_path, FillRule, IRect, PackedColor, Path, Rect, Transform};
use smallvec::{smallvec, SmallVec};

use crate::atlas::{AtlasId, AtlasStack};
use crate::caps::DeviceCaps;
use crate::config::RendererConfig;
use crate::coverage::CoverageOpsBuilder;
use crate::gpu::{GpuBackend, Mesh, OpFlushState};
use crate::path_processor::{PathProcessor, OCTO_INDEX_COUNT};
use crate::pending::OpListId;
use crate::primitives::PathInstance;
use crate::processor::{AppliedClip, Paint, Pipeline, ProcessorSet, RequiresDstTexture, SrgbFlags};
use crate::renderer::PerFlushResources;

/// How a shape is painted
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Style {
    #[default]
    Fill,
    Stroke {
        width: f32,
    },
    Hairline,
}

impl Style {
    pub fn is_simple_fill(&self) -> bool {
        matches!(self, Style::Fill)
    }
}

/// A path plus its style
#[derive(Clone, Debug)]
pub struct Shape {
    pub path: Path,
    pub style: Style,
    /// A higher-level cache can key this shape, so it may be cached instead
    pub has_unstyled_key: bool,
}

impl Shape {
    /// A filled path; non-volatile paths are cacheable
    pub fn fill(path: Path) -> Self {
        let has_unstyled_key = !path.is_volatile();
        Self {
            path,
            style: Style::Fill,
            has_unstyled_key,
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }
}

/// Everything needed to record one path draw
#[derive(Clone, Debug)]
pub struct DrawPathArgs {
    pub shape: Shape,
    pub view_matrix: Transform,
    /// Conservative device-space bounds of the clip
    pub clip_ibounds: IRect,
    pub paint: Paint,
}

/// One path fill inside a draw op
#[derive(Clone, Debug)]
pub struct SingleDraw {
    /// The path, or its device-space crop when it was too large
    pub path: Path,
    /// Identity when `path` is already in device space
    pub view_matrix: Transform,
    pub clip_ibounds: IRect,
    pub color: PackedColor,
}

/// A contiguous range of an op's instances that sample one atlas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasBatch {
    pub atlas: AtlasId,
    /// Exclusive end in the shared instance buffer
    pub end_instance: u32,
}

/// Outcome of trying to merge two ops
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineResult {
    Merged,
    NotCombined,
}

/// One or more path fills drawn with the same paint and fill rule
#[derive(Debug)]
pub struct DrawPathsOp {
    draws: SmallVec<[SingleDraw; 1]>,
    processors: ProcessorSet,
    srgb_flags: SrgbFlags,
    fill_rule: FillRule,
    bounds: Rect,
    owner: Option<OpListId>,
    base_instance: Option<u32>,
    atlas_batches: SmallVec<[AtlasBatch; 1]>,
    #[cfg(debug_assertions)]
    num_skipped_instances: u32,
}

impl DrawPathsOp {
    /// Build an op for a single draw.
    ///
    /// Paths whose device bounds exceed the crop threshold are mapped to
    /// device space and cropped to the clip here, so later stages only see
    /// coordinates fp32 can resolve.
    pub fn new(args: DrawPathArgs, config: &RendererConfig) -> Self {
        let DrawPathArgs {
            shape,
            view_matrix,
            clip_ibounds,
            paint,
        } = args;
        let fill_rule = shape.path.fill_rule();
        let dev_bounds = view_matrix.map_rect(&shape.path.bounds());

        let (path, view_matrix, bounds) =
            if dev_bounds.width().max(dev_bounds.height()) > config.crop_threshold {
                let dev_path = shape.path.transformed(&view_matrix);
                tracing::trace!(
                    "cropping {}x{} path to {:?}",
                    dev_bounds.width(),
                    dev_bounds.height(),
                    clip_ibounds
                );
                let cropped = crop_path(&dev_path, &clip_ibounds, config.crop_tolerance);
                let bounds = cropped.bounds();
                (cropped, Transform::IDENTITY, bounds)
            } else {
                (shape.path, view_matrix, dev_bounds)
            };

        Self {
            draws: smallvec![SingleDraw {
                path,
                view_matrix,
                clip_ibounds,
                color: paint.color.to_packed_premul(),
            }],
            processors: paint.processors,
            srgb_flags: paint.srgb_flags,
            fill_rule,
            bounds,
            owner: None,
            base_instance: None,
            atlas_batches: SmallVec::new(),
            #[cfg(debug_assertions)]
            num_skipped_instances: 0,
        }
    }

    pub fn draws(&self) -> &[SingleDraw] {
        &self.draws
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    pub fn processors(&self) -> &ProcessorSet {
        &self.processors
    }

    pub fn owner(&self) -> Option<OpListId> {
        self.owner
    }

    pub fn base_instance(&self) -> Option<u32> {
        self.base_instance
    }

    pub fn atlas_batches(&self) -> &[AtlasBatch] {
        &self.atlas_batches
    }

    /// Instances written for this op in the current flush
    pub fn instance_count(&self) -> u32 {
        match (self.base_instance, self.atlas_batches.last()) {
            (Some(base), Some(last)) => last.end_instance - base,
            _ => 0,
        }
    }

    /// Analyse the paint. Runs once, before the op is combined or executed.
    pub fn finalize(&mut self, caps: &DeviceCaps, clip: Option<&AppliedClip>) -> RequiresDstTexture {
        assert_eq!(self.draws.len(), 1, "draw op finalized after combining");
        let analysis = self
            .processors
            .finalize(&mut self.draws[0].color, caps, clip);
        RequiresDstTexture(analysis.requires_dst_texture)
    }

    /// Bind the op to the render target it was recorded into
    pub fn recorded(&mut self, owner: OpListId) {
        assert!(self.owner.is_none(), "draw op recorded twice");
        self.owner = Some(owner);
    }

    /// Whether `other` can be merged into this op
    pub fn is_compatible(&self, other: &DrawPathsOp) -> bool {
        self.fill_rule == other.fill_rule
            && self.srgb_flags == other.srgb_flags
            && self.processors == other.processors
    }

    /// Move every draw of `other` into this op
    pub fn absorb(&mut self, other: DrawPathsOp) {
        debug_assert!(self.is_compatible(&other));
        debug_assert_eq!(self.owner, other.owner, "combining ops of different targets");
        debug_assert!(self.base_instance.is_none() && other.base_instance.is_none());
        self.bounds = self.bounds.union(&other.bounds);
        self.draws.extend(other.draws);
    }

    /// Parse and place every draw, appending a [`PathInstance`] for each
    /// draw that found room in an atlas.
    pub fn setup_resources<B: GpuBackend>(
        &mut self,
        builder: &mut CoverageOpsBuilder,
        atlases: &mut AtlasStack<B>,
        instances: &mut Vec<PathInstance>,
    ) {
        debug_assert!(self.base_instance.is_none(), "resources set up twice");
        self.base_instance = Some(instances.len() as u32);
        self.atlas_batches.clear();

        let mut current_atlas: Option<AtlasId> = None;
        for draw in &self.draws {
            let (dev_bounds, dev_bounds45) = builder.parse_path(&draw.view_matrix, &draw.path);
            let path_ibounds = dev_bounds.round_out();
            let Some(placement) =
                atlases.place_parsed_path(builder, &draw.clip_ibounds, &path_ibounds)
            else {
                #[cfg(debug_assertions)]
                {
                    self.num_skipped_instances += 1;
                }
                continue;
            };

            if current_atlas != Some(placement.atlas) {
                if let Some(atlas) = current_atlas {
                    self.atlas_batches.push(AtlasBatch {
                        atlas,
                        end_instance: instances.len() as u32,
                    });
                }
                current_atlas = Some(placement.atlas);
            }

            instances.push(PathInstance::new(
                &dev_bounds,
                &dev_bounds45,
                &draw.view_matrix,
                placement.offset,
                draw.color,
            ));
        }

        if let Some(atlas) = current_atlas {
            self.atlas_batches.push(AtlasBatch {
                atlas,
                end_instance: instances.len() as u32,
            });
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.instance_count() + self.num_skipped_instances,
            self.draws.len() as u32
        );
    }

    /// Issue one instanced draw per atlas batch
    pub(crate) fn execute<B, S>(&self, flush_state: &mut S, resources: &PerFlushResources<B>)
    where
        B: GpuBackend,
        S: OpFlushState<B> + ?Sized,
    {
        let Some(mut base_instance) = self.base_instance else {
            debug_assert!(false, "draw op executed before its resources were set up");
            return;
        };

        let pipeline = Pipeline {
            processors: self.processors.clone(),
            applied_clip: flush_state.detach_applied_clip(),
            srgb_flags: self.srgb_flags,
        };

        for batch in &self.atlas_batches {
            let Some(atlas) = resources.atlases.get(batch.atlas).and_then(|a| a.texture()) else {
                // The atlas render target failed to allocate.
                base_instance = batch.end_instance;
                continue;
            };

            let processor = PathProcessor::new(atlas, self.fill_rule);
            let mesh = Mesh {
                index_buffer: &resources.index_buffer,
                index_count: OCTO_INDEX_COUNT,
                vertex_buffer: &resources.vertex_buffer,
                instance_buffer: &resources.instance_buffer,
                base_instance,
                instance_count: batch.end_instance - base_instance,
            };
            flush_state.draw(&pipeline, &processor, &mesh, &self.bounds);
            base_instance = batch.end_instance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use covpath_paint::{Color, PathBuilder};

    fn args(path: Path, view_matrix: Transform, clip: IRect) -> DrawPathArgs {
        DrawPathArgs {
            shape: Shape::fill(path),
            view_matrix,
            clip_ibounds: clip,
            paint: Paint::solid(Color::RED),
        }
    }

    #[test]
    fn test_small_path_kept_as_is() {
        let path = Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let id = path.id();
        let op = DrawPathsOp::new(
            args(path, Transform::scale(2.0, 2.0), IRect::from_wh(100, 100)),
            &RendererConfig::default(),
        );
        let draw = &op.draws()[0];
        assert_eq!(draw.path.id(), id);
        assert_eq!(draw.view_matrix, Transform::scale(2.0, 2.0));
        assert_eq!(op.bounds(), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(draw.color, Color::RED.to_packed_premul());
    }

    #[test]
    fn test_huge_path_cropped_to_clip() {
        let path = PathBuilder::new()
            .move_to(-100_000.0, 10.0)
            .line_to(100_000.0, 10.0)
            .line_to(100_000.0, 50.0)
            .line_to(-100_000.0, 50.0)
            .close()
            .build();
        let clip = IRect::new(0, 0, 200, 100);
        let op = DrawPathsOp::new(
            args(path, Transform::IDENTITY, clip),
            &RendererConfig::default(),
        );
        let draw = &op.draws()[0];
        assert!(draw.view_matrix.is_identity());
        assert_eq!(draw.path.bounds(), Rect::new(0.0, 10.0, 200.0, 50.0));
        assert_eq!(op.bounds(), Rect::new(0.0, 10.0, 200.0, 50.0));
    }

    #[test]
    fn test_crop_threshold_is_exclusive() {
        let config = RendererConfig::default().with_crop_threshold(100.0);
        let exact = Path::rect(Rect::new(0.0, 0.0, 100.0, 10.0));
        let id = exact.id();
        let op = DrawPathsOp::new(
            args(exact, Transform::translation(5.0, 0.0), IRect::from_wh(50, 50)),
            &config,
        );
        assert_eq!(op.draws()[0].path.id(), id);

        let over = Path::rect(Rect::new(0.0, 0.0, 101.0, 10.0));
        let op = DrawPathsOp::new(
            args(over, Transform::translation(5.0, 0.0), IRect::from_wh(50, 50)),
            &config,
        );
        assert!(op.draws()[0].view_matrix.is_identity());
        assert_eq!(op.draws()[0].path.bounds(), Rect::new(5.0, 0.0, 50.0, 10.0));
    }

    #[test]
    fn test_setup_skips_unplaceable_draws() {
        let config = RendererConfig::default();
        let clip = IRect::from_wh(100, 100);
        let mut op = DrawPathsOp::new(
            args(Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0)), Transform::IDENTITY, clip),
            &config,
        );
        let other = DrawPathsOp::new(
            args(
                Path::rect(Rect::new(500.0, 500.0, 510.0, 510.0)),
                Transform::IDENTITY,
                clip,
            ),
            &config,
        );
        op.absorb(other);

        let mut builder = CoverageOpsBuilder::new(2, 4, 8, 10);
        let mut atlases = AtlasStack::<HeadlessBackend>::new(1024, 4096, 1);
        let mut instances = vec![PathInstance::default(); 3];
        op.setup_resources(&mut builder, &mut atlases, &mut instances);

        assert_eq!(op.base_instance(), Some(3));
        assert_eq!(op.instance_count(), 1);
        assert_eq!(instances.len(), 4);
        assert_eq!(op.atlas_batches().len(), 1);
        assert_eq!(instances[3].atlas_offset, [0, 0]);
    }

    #[test]
    fn test_compatibility() {
        let config = RendererConfig::default();
        let clip = IRect::from_wh(100, 100);
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let a = DrawPathsOp::new(args(Path::rect(rect), Transform::IDENTITY, clip), &config);
        let b = DrawPathsOp::new(args(Path::rect(rect), Transform::IDENTITY, clip), &config);
        let even_odd = DrawPathsOp::new(
            args(
                Path::rect(rect).with_fill_rule(FillRule::EvenOdd),
                Transform::IDENTITY,
                clip,
            ),
            &config,
        );
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&even_odd));
    }
}
