//! Coverage-counting path renderer
//!
//! Records path draws and clip paths per render target, then at flush time
//! packs all of them into coverage atlases, uploads the shared instance data
//! and lets each draw op cover its paths with instanced octagons.
//!
//! The renderer moves between two phases:
//!
//! ```text
//! Idle --pre_flush--> Flushing --post_flush--> Idle
//! ```
//!
//! Recording (drawing, combining, clip processors) only happens while idle.
//! Per-flush buffers exist only between `pre_flush` and `post_flush`, and only
//! when every allocation succeeded.

use covpath_paint::{IRect, Path, Transform};
use rustc_hash::FxHashSet;

use crate::atlas::{AtlasPass, AtlasStack};
use crate::caps::DeviceCaps;
use crate::clip::{AtlasTransform, ClipAtlasBinding, ClipPath, ClipProcessor};
use crate::config::RendererConfig;
use crate::coverage::CoverageOpsBuilder;
use crate::draw_op::{CombineResult, DrawPathArgs, DrawPathsOp, Shape};
use crate::error::Result;
use crate::gpu::{BufferKind, GpuBackend, OnFlushResourceProvider, OpFlushState};
use crate::path_processor::{find_or_make_index_buffer, find_or_make_vertex_buffer};
use crate::pending::{DrawOpKey, OpListId, PendingPathsRegistry};
use crate::primitives::PathInstance;
use crate::processor::{AppliedClip, RequiresDstTexture};

/// Anti-aliasing mode a draw is requested with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AaType {
    None,
    #[default]
    Coverage,
    Msaa,
    MixedSamples,
}

/// Inputs to the admission check
#[derive(Clone, Copy, Debug)]
pub struct CanDrawPathArgs<'a> {
    pub shape: &'a Shape,
    pub view_matrix: &'a Transform,
    pub aa_type: AaType,
    pub clip_conservative_bounds: IRect,
}

/// Admission verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanDrawPath {
    No,
    /// Only when no better renderer accepts the path
    AsBackup,
    Yes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushPhase {
    Idle,
    Flushing,
}

/// Buffers and atlases valid between a successful `pre_flush` and `post_flush`
#[derive(Debug)]
pub(crate) struct PerFlushResources<B: GpuBackend> {
    pub(crate) index_buffer: B::Buffer,
    pub(crate) vertex_buffer: B::Buffer,
    pub(crate) instance_buffer: B::Buffer,
    pub(crate) atlases: AtlasStack<B>,
}

/// Worst-case sizes of one flush
#[derive(Clone, Copy, Debug, Default)]
struct FlushTotals {
    max_total_paths: usize,
    max_path_points: usize,
    num_points: usize,
    num_verbs: usize,
    num_draws: usize,
}

impl FlushTotals {
    fn add_path(&mut self, path: &Path) {
        let points = path.count_points();
        self.max_total_paths += 1;
        self.max_path_points = self.max_path_points.max(points);
        self.num_points += points;
        self.num_verbs += path.count_verbs();
    }
}

/// Renders simple path fills by counting coverage in an atlas
pub struct CoverageCountingPathRenderer<B: GpuBackend> {
    config: RendererConfig,
    max_atlas_size: i32,
    registry: PendingPathsRegistry,
    phase: FlushPhase,
    per_flush: Option<PerFlushResources<B>>,
    #[cfg(debug_assertions)]
    pending_draw_ops: usize,
}

impl<B: GpuBackend> CoverageCountingPathRenderer<B> {
    /// Whether the device has everything coverage counting needs
    pub fn is_supported(caps: &DeviceCaps) -> bool {
        let shader = &caps.shader;
        shader.geometry_shader_support
            && shader.integer_support
            && shader.flat_interpolation_support
            && caps.instance_attrib_support
            && caps.map_buffer_support.is_writable()
            && caps.alpha_half.texturable
            && caps.alpha_half.renderable
            && !caps.blacklist_coverage_counting
    }

    pub fn create_if_supported(caps: &DeviceCaps, config: RendererConfig) -> Option<Self> {
        if !Self::is_supported(caps) {
            tracing::debug!("coverage counting unsupported on this device");
            return None;
        }
        Some(Self {
            config,
            max_atlas_size: caps.max_atlas_size(),
            registry: PendingPathsRegistry::new(),
            phase: FlushPhase::Idle,
            per_flush: None,
            #[cfg(debug_assertions)]
            pending_draw_ops: 0,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn phase(&self) -> FlushPhase {
        self.phase
    }

    pub fn pending_paths(&self) -> &PendingPathsRegistry {
        &self.registry
    }

    pub fn op(&self, key: DrawOpKey) -> Option<&DrawPathsOp> {
        self.registry.op(key)
    }

    /// Whether the current flush prepared its buffers successfully
    pub fn has_per_flush_resources(&self) -> bool {
        self.per_flush.is_some()
    }

    /// Atlases of the current flush
    pub fn atlas_count(&self) -> usize {
        self.per_flush.as_ref().map_or(0, |res| res.atlases.len())
    }

    /// Ops created and not yet flushed, combined away or released
    #[cfg(debug_assertions)]
    pub fn pending_draw_op_count(&self) -> usize {
        self.pending_draw_ops
    }

    pub fn can_draw_path(&self, args: &CanDrawPathArgs<'_>) -> CanDrawPath {
        let shape = args.shape;
        if shape.has_unstyled_key && !self.config.draw_cachable_paths {
            return CanDrawPath::No;
        }
        if !shape.style.is_simple_fill()
            || shape.path.fill_rule().is_inverse()
            || args.view_matrix.has_perspective()
            || args.aa_type != AaType::Coverage
        {
            return CanDrawPath::No;
        }
        if shape.path.conic_count() > 0 {
            return CanDrawPath::No;
        }

        let dev_ibounds = args.view_matrix.map_rect(&shape.path.bounds()).round_out();
        let Some(clipped) = dev_ibounds.intersect(&args.clip_conservative_bounds) else {
            // Clipped away entirely; flushing drops it before any real work.
            return CanDrawPath::Yes;
        };
        if clipped.area() > self.config.backup_area_threshold {
            return CanDrawPath::AsBackup;
        }
        if shape.has_unstyled_key && shape.path.count_verbs() > self.config.complex_path_verbs {
            return CanDrawPath::AsBackup;
        }
        CanDrawPath::Yes
    }

    /// Create a draw op. The op list then finalizes, records and combines it.
    pub fn draw_path(&mut self, args: DrawPathArgs) -> DrawOpKey {
        assert_eq!(self.phase, FlushPhase::Idle, "draw_path during a flush");
        let op = DrawPathsOp::new(args, &self.config);
        #[cfg(debug_assertions)]
        {
            self.pending_draw_ops += 1;
        }
        self.registry.insert_op(op)
    }

    pub fn finalize_op(
        &mut self,
        key: DrawOpKey,
        caps: &DeviceCaps,
        clip: Option<&AppliedClip>,
    ) -> Option<RequiresDstTexture> {
        assert_eq!(self.phase, FlushPhase::Idle, "finalizing ops during a flush");
        self.registry.op_mut(key).map(|op| op.finalize(caps, clip))
    }

    /// Bind an op to the render target whose op list recorded it
    pub fn op_recorded(&mut self, key: DrawOpKey, op_list: OpListId) -> bool {
        assert_eq!(self.phase, FlushPhase::Idle, "recording ops during a flush");
        let Some(op) = self.registry.op_mut(key) else {
            return false;
        };
        op.recorded(op_list);
        self.registry.link(op_list, key);
        true
    }

    /// Merge `from` into `into` when they share fill rule, sRGB flags and
    /// paint. A merged `from` key is no longer valid.
    pub fn combine_ops(&mut self, into: DrawOpKey, from: DrawOpKey) -> CombineResult {
        assert_eq!(self.phase, FlushPhase::Idle, "combining ops during a flush");
        if into == from {
            return CombineResult::NotCombined;
        }
        let (Some(a), Some(b)) = (self.registry.op(into), self.registry.op(from)) else {
            return CombineResult::NotCombined;
        };
        assert!(a.owner().is_some(), "combining into an unrecorded op");
        assert_eq!(a.owner(), b.owner(), "combining ops of different targets");
        if !a.is_compatible(b) {
            return CombineResult::NotCombined;
        }

        let Some(absorbed) = self.registry.remove_op(from) else {
            return CombineResult::NotCombined;
        };
        #[cfg(debug_assertions)]
        {
            self.pending_draw_ops -= 1;
        }
        match self.registry.op_mut(into) {
            Some(op) => {
                op.absorb(absorbed);
                CombineResult::Merged
            }
            None => CombineResult::NotCombined,
        }
    }

    /// Submit the draws of one op. Does nothing when the flush has no
    /// resources.
    pub fn execute_op<S>(&self, key: DrawOpKey, flush_state: &mut S)
    where
        S: OpFlushState<B> + ?Sized,
    {
        debug_assert_eq!(self.phase, FlushPhase::Flushing, "execute_op outside a flush");
        let Some(resources) = self.per_flush.as_ref() else {
            return;
        };
        if let Some(op) = self.registry.op(key) {
            op.execute(flush_state, resources);
        }
    }

    /// Drop an op that will never be flushed
    pub fn release_op(&mut self, key: DrawOpKey) -> bool {
        let released = self.registry.remove_op(key).is_some();
        #[cfg(debug_assertions)]
        {
            self.pending_draw_ops -= usize::from(released);
        }
        released
    }

    pub fn can_make_clip_processor(&self, device_path: &Path) -> bool {
        if !self.config.draw_cachable_paths && !device_path.is_volatile() {
            return false;
        }
        device_path.conic_count() == 0
    }

    /// Register `device_path` as a clip on `op_list`, sampled over
    /// `access_rect`. Repeated calls for the same path widen its access rect.
    pub fn make_clip_processor(
        &mut self,
        op_list: OpListId,
        device_path: &Path,
        access_rect: IRect,
        rt_width: i32,
        rt_height: i32,
    ) -> ClipProcessor {
        assert_eq!(self.phase, FlushPhase::Idle, "making clip processors during a flush");
        debug_assert!(self.can_make_clip_processor(device_path));

        let config = &self.config;
        let clip = self
            .registry
            .lookup_or_create(op_list)
            .clip_paths
            .entry(device_path.id())
            .and_modify(|clip| clip.add_access(access_rect))
            .or_insert_with(|| {
                ClipPath::init(device_path, access_rect, rt_width, rt_height, config)
            });

        ClipProcessor {
            op_list,
            path_id: device_path.id(),
            must_check_bounds: !clip.path_dev_ibounds().contains(&access_rect),
            fill_rule: device_path.fill_rule(),
        }
    }

    /// The atlas texture and sampling transform of a clip processor's mask
    pub fn resolve_clip_atlas(&mut self, processor: &ClipProcessor) -> Option<ClipAtlasBinding<B>> {
        let resources = self.per_flush.as_ref()?;
        let clip = self
            .registry
            .get_mut(processor.op_list)?
            .clip_paths
            .get_mut(&processor.path_id)?;
        if clip.atlas_transform_state() == AtlasTransform::Unresolved {
            clip.resolve_atlas_transform(&resources.atlases);
        }
        let texture = clip
            .atlas_id()
            .and_then(|id| resources.atlases.get(id))
            .and_then(|atlas| atlas.texture())?
            .clone();
        let (scale, translate) = clip.atlas_transform();
        Some(ClipAtlasBinding {
            texture,
            scale,
            translate,
        })
    }

    /// Pack every path pending on `op_list_ids` into atlases.
    ///
    /// Returns the atlas passes the caller must render before any op of these
    /// targets executes. Allocation failures are logged and leave the flush
    /// without resources, so no path draws.
    pub fn pre_flush<P>(&mut self, provider: &mut P, op_list_ids: &[OpListId]) -> Vec<AtlasPass<B>>
    where
        P: OnFlushResourceProvider<B> + ?Sized,
    {
        assert_eq!(self.phase, FlushPhase::Idle, "pre_flush while already flushing");
        self.phase = FlushPhase::Flushing;
        debug_assert!(self.per_flush.is_none());

        if self.registry.is_empty() {
            return Vec::new();
        }
        let mut seen = FxHashSet::default();
        let op_list_ids: Vec<OpListId> = op_list_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let totals = self.count_totals(&op_list_ids);
        if totals.max_total_paths == 0 {
            return Vec::new();
        }

        match self.prepare_flush(provider, &op_list_ids, &totals) {
            Ok((resources, passes)) => {
                self.per_flush = Some(resources);
                passes
            }
            Err(err) => {
                tracing::debug!("coverage counting flush skipped: {}", err);
                Vec::new()
            }
        }
    }

    /// Release per-flush resources and forget the flushed targets
    pub fn post_flush(&mut self, op_list_ids: &[OpListId]) {
        assert_eq!(self.phase, FlushPhase::Flushing, "post_flush without pre_flush");
        self.per_flush = None;
        for id in op_list_ids {
            let _freed = self.registry.erase(*id);
            #[cfg(debug_assertions)]
            {
                self.pending_draw_ops -= _freed;
            }
        }
        self.phase = FlushPhase::Idle;
    }

    fn count_totals(&self, op_list_ids: &[OpListId]) -> FlushTotals {
        let mut totals = FlushTotals::default();
        for id in op_list_ids {
            let Some(pending) = self.registry.get(*id) else {
                continue;
            };
            for op in pending.draw_ops().iter().filter_map(|key| self.registry.op(*key)) {
                for draw in op.draws() {
                    totals.add_path(&draw.path);
                    totals.num_draws += 1;
                }
            }
            for clip in pending.clip_paths.values() {
                totals.add_path(clip.device_path());
            }
        }
        totals
    }

    fn prepare_flush<P>(
        &mut self,
        provider: &mut P,
        op_list_ids: &[OpListId],
        totals: &FlushTotals,
    ) -> Result<(PerFlushResources<B>, Vec<AtlasPass<B>>)>
    where
        P: OnFlushResourceProvider<B> + ?Sized,
    {
        let index_buffer = find_or_make_index_buffer::<B, P>(provider)?;
        let vertex_buffer = find_or_make_vertex_buffer::<B, P>(provider)?;
        let instance_buffer = provider.make_buffer(
            BufferKind::Instance,
            totals.max_total_paths * std::mem::size_of::<PathInstance>(),
        )?;

        let mut builder = CoverageOpsBuilder::new(
            totals.max_total_paths,
            totals.max_path_points,
            totals.num_points,
            totals.num_verbs,
        );
        let mut atlases = AtlasStack::new(
            self.config.atlas_min_size,
            self.max_atlas_size,
            self.config.atlas_padding,
        );
        let mut instances: Vec<PathInstance> = Vec::with_capacity(totals.num_draws);

        for id in op_list_ids {
            let Some(pending) = self.registry.get(*id) else {
                continue;
            };
            let keys = pending.draw_ops().to_vec();
            for key in keys {
                if let Some(op) = self.registry.op_mut(key) {
                    op.setup_resources(&mut builder, &mut atlases, &mut instances);
                }
            }
            if let Some(pending) = self.registry.get_mut(*id) {
                for clip in pending.clip_paths.values_mut() {
                    clip.place_in_atlas(&mut builder, &mut atlases);
                }
            }
        }

        if !instances.is_empty() {
            provider.write_buffer(&instance_buffer, bytemuck::cast_slice(&instances))?;
        }
        if let Some(current) = atlases.current() {
            builder.emit_op(current.draw_bounds());
        }
        let ops = builder.finalize::<B, P>(provider)?;
        let passes = atlases.finalize_all(provider, ops);

        tracing::trace!(
            paths = totals.max_total_paths,
            instances = instances.len(),
            atlases = atlases.len(),
            passes = passes.len(),
            "coverage counting flush prepared"
        );

        Ok((
            PerFlushResources {
                index_buffer,
                vertex_buffer,
                instance_buffer,
                atlases,
            },
            passes,
        ))
    }
}
