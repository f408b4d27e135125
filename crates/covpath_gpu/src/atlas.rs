//! Per-flush coverage atlases
//!
//! Each flush packs the clipped device bounds of every path into one or more
//! atlas textures. An atlas starts as a power-of-two square and doubles one
//! side at a time (height first) up to the device limit; once it cannot grow,
//! the stack seals its geometry and opens a new atlas.

use covpath_paint::{IRect, ISize};
use guillotiere::{size2, AtlasAllocator};

use crate::coverage::{CoverageOp, CoverageOpsBuilder, ScissorMode};
use crate::error::CoverageError;
use crate::gpu::{
    GpuBackend, OnFlushResourceProvider, PixelConfig, RenderTarget, SurfaceDesc, SurfaceOrigin,
};

/// Index of an atlas within one flush
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(u32);

impl AtlasId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a parsed path landed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasPlacement {
    pub atlas: AtlasId,
    /// Add to device coordinates to get atlas coordinates
    pub offset: (i16, i16),
}

/// Render work for one finalized atlas
#[derive(Clone, Debug)]
pub struct AtlasPass<B: GpuBackend> {
    pub render_target: RenderTarget<B>,
    /// Region to clear to zero coverage before rasterizing
    pub clear_rect: IRect,
    pub coverage_op: CoverageOp<B>,
}

/// A growing packing region backed by one render target
pub struct Atlas<B: GpuBackend> {
    allocator: AtlasAllocator,
    max_size: i32,
    padding: i32,
    draw_bounds: ISize,
    texture: Option<RenderTarget<B>>,
}

impl<B: GpuBackend> std::fmt::Debug for Atlas<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atlas")
            .field("size", &self.size())
            .field("draw_bounds", &self.draw_bounds)
            .field("texture", &self.texture)
            .finish()
    }
}

impl<B: GpuBackend> Atlas<B> {
    /// Create an atlas able to hold at least a `min_width`x`min_height` rect
    pub fn new(min_width: i32, min_height: i32, min_size: i32, max_size: i32) -> Self {
        Self::with_padding(min_width, min_height, min_size, max_size, 1)
    }

    pub fn with_padding(
        min_width: i32,
        min_height: i32,
        min_size: i32,
        max_size: i32,
        padding: i32,
    ) -> Self {
        debug_assert!(min_width <= max_size && min_height <= max_size);
        let initial = next_pow2(min_width.max(min_height).max(1))
            .max(min_size)
            .min(max_size)
            .max(1);
        Self {
            allocator: AtlasAllocator::new(size2(initial, initial)),
            max_size,
            padding,
            draw_bounds: ISize::default(),
            texture: None,
        }
    }

    pub fn size(&self) -> ISize {
        let size = self.allocator.size();
        ISize::new(size.width, size.height)
    }

    /// Tight extent of every placed rect, padding excluded
    pub fn draw_bounds(&self) -> ISize {
        self.draw_bounds
    }

    /// The render target, once the atlas is finalized
    pub fn texture(&self) -> Option<&RenderTarget<B>> {
        self.texture.as_ref()
    }

    /// Reserve a `width`x`height` rect, growing as needed.
    ///
    /// Returns the top-left corner, or `None` once the atlas is full.
    pub fn add_rect(&mut self, width: i32, height: i32) -> Option<(i32, i32)> {
        let padded = size2(width + self.padding, height + self.padding);
        if padded.width > self.max_size || padded.height > self.max_size {
            return None;
        }
        loop {
            if let Some(allocation) = self.allocator.allocate(padded) {
                let min = allocation.rectangle.min;
                self.draw_bounds.width = self.draw_bounds.width.max(min.x + width);
                self.draw_bounds.height = self.draw_bounds.height.max(min.y + height);
                return Some((min.x, min.y));
            }
            if !self.grow() {
                return None;
            }
        }
    }

    fn grow(&mut self) -> bool {
        let size = self.allocator.size();
        let (mut width, mut height) = (size.width, size.height);
        if width >= self.max_size && height >= self.max_size {
            return false;
        }
        if (height <= width && height < self.max_size) || width >= self.max_size {
            height = (height * 2).min(self.max_size);
        } else {
            width = (width * 2).min(self.max_size);
        }
        self.allocator.grow(size2(width, height));
        true
    }

    /// Allocate the render target and pair it with the atlas's coverage op.
    ///
    /// On allocation failure the atlas stays without a texture and every path
    /// placed in it is skipped when ops execute.
    pub fn finalize<P>(&mut self, provider: &mut P, op: CoverageOp<B>) -> Option<AtlasPass<B>>
    where
        P: OnFlushResourceProvider<B> + ?Sized,
    {
        debug_assert!(self.texture.is_none(), "atlas finalized twice");
        let size = self.size();
        let desc = SurfaceDesc {
            width: size.width,
            height: size.height,
            config: PixelConfig::AlphaHalf,
            origin: SurfaceOrigin::TopLeft,
        };
        match provider.make_render_target(&desc) {
            Ok(render_target) => {
                self.texture = Some(render_target.clone());
                Some(AtlasPass {
                    render_target,
                    clear_rect: IRect::from_size(self.draw_bounds),
                    coverage_op: op,
                })
            }
            Err(err) => {
                tracing::debug!("failed to allocate coverage atlas: {}", err);
                None
            }
        }
    }
}

/// Every atlas of one flush, in creation order
pub struct AtlasStack<B: GpuBackend> {
    atlases: Vec<Atlas<B>>,
    min_size: i32,
    max_size: i32,
    padding: i32,
}

impl<B: GpuBackend> std::fmt::Debug for AtlasStack<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasStack")
            .field("atlases", &self.atlases)
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl<B: GpuBackend> AtlasStack<B> {
    pub fn new(min_size: i32, max_size: i32, padding: i32) -> Self {
        Self {
            atlases: Vec::new(),
            min_size,
            max_size,
            padding,
        }
    }

    pub fn len(&self) -> usize {
        self.atlases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atlases.is_empty()
    }

    pub fn get(&self, id: AtlasId) -> Option<&Atlas<B>> {
        self.atlases.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Atlas<B>> {
        self.atlases.iter()
    }

    /// The atlas currently being filled
    pub fn current(&self) -> Option<&Atlas<B>> {
        self.atlases.last()
    }

    /// Place the builder's parsed path, then save or discard it.
    ///
    /// The path is rasterized into `clip_ibounds ∩ path_ibounds`, scissored
    /// unless the clip contains the whole path. When the current atlas is
    /// full its geometry is emitted and a new atlas is started.
    pub fn place_parsed_path(
        &mut self,
        builder: &mut CoverageOpsBuilder,
        clip_ibounds: &IRect,
        path_ibounds: &IRect,
    ) -> Option<AtlasPlacement> {
        let (scissor_mode, clipped) = if clip_ibounds.contains(path_ibounds) {
            (ScissorMode::NonScissored, *path_ibounds)
        } else if let Some(clipped) = clip_ibounds.intersect(path_ibounds) {
            (ScissorMode::Scissored, clipped)
        } else {
            builder.discard_parsed_path();
            return None;
        };

        let (width, height) = (clipped.width(), clipped.height());
        if width + self.padding > self.max_size || height + self.padding > self.max_size {
            let err = CoverageError::AtlasTooLarge {
                width,
                height,
                max_size: self.max_size,
            };
            tracing::debug!("skipping path: {}", err);
            builder.discard_parsed_path();
            return None;
        }

        // Atlas locations lie in [0, max_size], so this bounds every offset.
        let offset_fits = |origin: i32| {
            i16::try_from(-origin).is_ok() && i16::try_from(self.max_size - origin).is_ok()
        };
        if !offset_fits(clipped.left) || !offset_fits(clipped.top) {
            tracing::debug!("skipping path: atlas offset out of range for {:?}", clipped);
            builder.discard_parsed_path();
            return None;
        }

        let placed = self
            .atlases
            .last_mut()
            .and_then(|atlas| atlas.add_rect(width, height));
        let location = match placed {
            Some(location) => location,
            None => {
                if let Some(full) = self.atlases.last() {
                    builder.emit_op(full.draw_bounds());
                }
                let mut atlas = Atlas::with_padding(
                    width + self.padding,
                    height + self.padding,
                    self.min_size,
                    self.max_size,
                    self.padding,
                );
                let Some(location) = atlas.add_rect(width, height) else {
                    builder.discard_parsed_path();
                    return None;
                };
                self.atlases.push(atlas);
                location
            }
        };

        let dx = (location.0 - clipped.left) as i16;
        let dy = (location.1 - clipped.top) as i16;

        builder.save_parsed_path(scissor_mode, &clipped, (dx, dy));
        Some(AtlasPlacement {
            atlas: AtlasId((self.atlases.len() - 1) as u32),
            offset: (dx, dy),
        })
    }

    /// Allocate a render target for every atlas, pairing atlases with their
    /// coverage ops in order. Atlases whose target fails are left untextured.
    pub fn finalize_all<P>(&mut self, provider: &mut P, ops: Vec<CoverageOp<B>>) -> Vec<AtlasPass<B>>
    where
        P: OnFlushResourceProvider<B> + ?Sized,
    {
        debug_assert_eq!(ops.len(), self.atlases.len(), "one coverage op per atlas");
        self.atlases
            .iter_mut()
            .zip(ops)
            .filter_map(|(atlas, op)| atlas.finalize(provider, op))
            .collect()
    }
}

fn next_pow2(v: i32) -> i32 {
    (v.max(1) as u32).next_power_of_two().min(1 << 30) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::DeviceCaps;
    use crate::headless::{HeadlessBackend, HeadlessResourceProvider};
    use covpath_paint::{Path, Rect};

    type TestAtlas = Atlas<HeadlessBackend>;
    type TestStack = AtlasStack<HeadlessBackend>;

    fn parse_rect(builder: &mut CoverageOpsBuilder, rect: Rect) -> IRect {
        builder.parse_device_space_path(&Path::rect(rect)).0.round_out()
    }

    #[test]
    fn test_initial_size() {
        assert_eq!(TestAtlas::new(10, 10, 1024, 4096).size(), ISize::new(1024, 1024));
        assert_eq!(TestAtlas::new(1500, 20, 1024, 4096).size(), ISize::new(2048, 2048));
        assert_eq!(TestAtlas::new(2000, 20, 1024, 2048).size(), ISize::new(2048, 2048));
        assert_eq!(TestAtlas::new(10, 10, 1024, 512).size(), ISize::new(512, 512));
    }

    #[test]
    fn test_grows_height_then_width() {
        let mut atlas = TestAtlas::new(64, 64, 64, 256);
        assert_eq!(atlas.add_rect(63, 63), Some((0, 0)));
        assert!(atlas.add_rect(63, 63).is_some());
        assert_eq!(atlas.size(), ISize::new(64, 128));
        assert!(atlas.add_rect(63, 63).is_some());
        assert_eq!(atlas.size(), ISize::new(128, 128));
    }

    #[test]
    fn test_full_atlas_reports_none() {
        let mut atlas = TestAtlas::new(100, 100, 128, 128);
        assert!(atlas.add_rect(100, 100).is_some());
        assert!(atlas.add_rect(100, 100).is_none());
        assert_eq!(atlas.draw_bounds(), ISize::new(100, 100));
    }

    #[test]
    fn test_oversized_rect_never_placed() {
        let mut atlas = TestAtlas::new(16, 16, 16, 128);
        assert!(atlas.add_rect(128, 4).is_none());
        assert!(atlas.add_rect(200, 200).is_none());

        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        let mut stack = TestStack::new(16, 128, 1);
        let bounds = parse_rect(&mut builder, Rect::new(0.0, 0.0, 500.0, 20.0));
        let placed = stack.place_parsed_path(&mut builder, &IRect::from_wh(1000, 1000), &bounds);
        assert!(placed.is_none());
        assert!(stack.is_empty());
        assert!(!builder.has_parsed_path());
        assert_eq!(builder.emitted_op_count(), 0);
    }

    #[test]
    fn test_placement_modes_and_offset() {
        let mut builder = CoverageOpsBuilder::new(3, 4, 12, 15);
        let mut stack = TestStack::new(256, 1024, 1);
        let clip = IRect::new(0, 0, 100, 100);

        let bounds = parse_rect(&mut builder, Rect::new(10.0, 20.0, 30.0, 40.0));
        let inside = stack.place_parsed_path(&mut builder, &clip, &bounds).unwrap();
        assert_eq!(inside.offset, (-10, -20));

        let bounds = parse_rect(&mut builder, Rect::new(90.0, 90.0, 120.0, 120.0));
        let partial = stack.place_parsed_path(&mut builder, &clip, &bounds).unwrap();
        assert_eq!(partial.atlas, inside.atlas);

        let bounds = parse_rect(&mut builder, Rect::new(200.0, 200.0, 220.0, 220.0));
        assert!(stack.place_parsed_path(&mut builder, &clip, &bounds).is_none());
        assert_eq!(builder.saved_path_count(), 2);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_offset_out_of_range_takes_no_space() {
        let mut builder = CoverageOpsBuilder::new(3, 4, 12, 15);
        let mut stack = TestStack::new(64, 128, 1);
        let clip = IRect::from_wh(100_000, 100_000);

        let bounds = parse_rect(&mut builder, Rect::new(0.0, 0.0, 100.0, 100.0));
        stack.place_parsed_path(&mut builder, &clip, &bounds).unwrap();
        let used = stack.current().unwrap().draw_bounds();

        // Would not fit the current atlas, and its offset cannot be encoded
        let bounds = parse_rect(&mut builder, Rect::new(40_000.0, 0.0, 40_100.0, 100.0));
        assert!(stack.place_parsed_path(&mut builder, &clip, &bounds).is_none());
        assert!(!builder.has_parsed_path());
        assert_eq!(stack.len(), 1);
        assert_eq!(builder.emitted_op_count(), 0);
        assert_eq!(stack.current().unwrap().draw_bounds(), used);
    }

    #[test]
    fn test_debug_lists_atlases() {
        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        let mut stack = TestStack::new(64, 128, 1);
        let bounds = parse_rect(&mut builder, Rect::new(0.0, 0.0, 10.0, 10.0));
        stack
            .place_parsed_path(&mut builder, &IRect::from_wh(100, 100), &bounds)
            .unwrap();
        let text = format!("{:?}", stack);
        assert!(text.starts_with("AtlasStack"));
        assert!(text.contains("Atlas { size"));
    }

    #[test]
    fn test_overflow_starts_new_atlas() {
        let mut builder = CoverageOpsBuilder::new(2, 4, 8, 10);
        let mut stack = TestStack::new(64, 128, 1);
        let clip = IRect::from_wh(1000, 1000);

        let bounds = parse_rect(&mut builder, Rect::new(0.0, 0.0, 100.0, 100.0));
        let first = stack.place_parsed_path(&mut builder, &clip, &bounds).unwrap();
        let bounds = parse_rect(&mut builder, Rect::new(0.0, 0.0, 100.0, 100.0));
        let second = stack.place_parsed_path(&mut builder, &clip, &bounds).unwrap();

        assert_ne!(first.atlas, second.atlas);
        assert_eq!(stack.len(), 2);
        assert_eq!(builder.emitted_op_count(), 1);
    }

    #[test]
    fn test_finalize_clears_draw_bounds() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::full_support(4096));
        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        let mut stack = TestStack::new(1024, 4096, 1);

        let bounds = parse_rect(&mut builder, Rect::new(5.0, 5.0, 55.0, 25.0));
        stack
            .place_parsed_path(&mut builder, &IRect::from_wh(100, 100), &bounds)
            .unwrap();
        builder.emit_op(stack.current().unwrap().draw_bounds());
        let ops = builder.finalize(&mut provider).unwrap();
        let passes = stack.finalize_all(&mut provider, ops);

        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].clear_rect, IRect::from_wh(50, 20));
        assert_eq!(passes[0].render_target.width, 1024);
        assert!(stack.current().unwrap().texture().is_some());
    }

    #[test]
    fn test_failed_render_target_leaves_atlas_untextured() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::full_support(4096));
        provider.fail_render_targets(true);
        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        let mut stack = TestStack::new(1024, 4096, 1);

        let bounds = parse_rect(&mut builder, Rect::new(0.0, 0.0, 10.0, 10.0));
        stack
            .place_parsed_path(&mut builder, &IRect::from_wh(100, 100), &bounds)
            .unwrap();
        builder.emit_op(stack.current().unwrap().draw_bounds());
        let ops = builder.finalize(&mut provider).unwrap();

        assert!(stack.finalize_all(&mut provider, ops).is_empty());
        assert!(stack.current().unwrap().texture().is_none());
    }
}
