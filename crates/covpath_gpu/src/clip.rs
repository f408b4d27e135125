//! Device-space clip paths rendered through the coverage atlas

use covpath_paint::{crop_path, FillRule, IRect, Path, PathId};

use crate::atlas::{AtlasId, AtlasPlacement, AtlasStack};
use crate::config::RendererConfig;
use crate::coverage::CoverageOpsBuilder;
use crate::gpu::{GpuBackend, RenderTarget, SurfaceOrigin};
use crate::pending::OpListId;

/// Placement of a clip path in the current flush
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipPlacement {
    #[default]
    Unplaced,
    /// Placement was attempted; `None` when the path found no room
    Placed(Option<AtlasPlacement>),
}

/// Device to atlas texture coordinate mapping
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum AtlasTransform {
    #[default]
    Unresolved,
    Resolved { scale: [f32; 2], translate: [f32; 2] },
}

/// A clip path shared by every clip stage that references it on one target
#[derive(Clone, Debug)]
pub struct ClipPath {
    device_path: Path,
    access_rect: IRect,
    path_dev_ibounds: IRect,
    placement: ClipPlacement,
    atlas_transform: AtlasTransform,
}

impl ClipPath {
    /// Set up a clip path sampled over `access_rect`.
    ///
    /// Oversized paths are cropped to the render target; the device bounds
    /// stay those of the uncropped path.
    pub fn init(
        device_path: &Path,
        access_rect: IRect,
        rt_width: i32,
        rt_height: i32,
        config: &RendererConfig,
    ) -> Self {
        let dev_bounds = device_path.bounds();
        let path_dev_ibounds = dev_bounds.round_out();
        let device_path = if dev_bounds.width().max(dev_bounds.height()) > config.crop_threshold {
            crop_path(
                device_path,
                &IRect::from_wh(rt_width, rt_height),
                config.crop_tolerance,
            )
        } else {
            device_path.clone()
        };

        Self {
            device_path,
            access_rect,
            path_dev_ibounds,
            placement: ClipPlacement::Unplaced,
            atlas_transform: AtlasTransform::Unresolved,
        }
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    pub fn access_rect(&self) -> IRect {
        self.access_rect
    }

    pub fn path_dev_ibounds(&self) -> IRect {
        self.path_dev_ibounds
    }

    pub fn placement(&self) -> ClipPlacement {
        self.placement
    }

    pub fn atlas_id(&self) -> Option<AtlasId> {
        match self.placement {
            ClipPlacement::Placed(Some(placement)) => Some(placement.atlas),
            _ => None,
        }
    }

    /// Widen the region sampled from the mask
    pub fn add_access(&mut self, rect: IRect) {
        self.access_rect = self.access_rect.union(&rect);
    }

    pub fn place_in_atlas<B: GpuBackend>(
        &mut self,
        builder: &mut CoverageOpsBuilder,
        atlases: &mut AtlasStack<B>,
    ) {
        debug_assert_eq!(
            self.placement,
            ClipPlacement::Unplaced,
            "clip path placed twice in one flush"
        );
        builder.parse_device_space_path(&self.device_path);
        let placement =
            atlases.place_parsed_path(builder, &self.access_rect, &self.path_dev_ibounds);
        self.placement = ClipPlacement::Placed(placement);
    }

    /// Compute the sampling transform once the atlas has its texture.
    ///
    /// Paths that were not placed, or whose atlas has no texture, resolve to
    /// an all-zero transform.
    pub fn resolve_atlas_transform<B: GpuBackend>(&mut self, atlases: &AtlasStack<B>) {
        let texture = match self.placement {
            ClipPlacement::Placed(Some(placement)) => atlases
                .get(placement.atlas)
                .and_then(|atlas| atlas.texture())
                .map(|texture| (placement, texture)),
            _ => None,
        };
        self.atlas_transform = match texture {
            Some((placement, texture)) => sampling_transform(placement.offset, texture),
            None => AtlasTransform::Resolved {
                scale: [0.0, 0.0],
                translate: [0.0, 0.0],
            },
        };
    }

    pub fn atlas_transform_state(&self) -> AtlasTransform {
        self.atlas_transform
    }

    /// `(scale, translate)` mapping device coordinates to atlas texture
    /// coordinates
    pub fn atlas_transform(&self) -> ([f32; 2], [f32; 2]) {
        match self.atlas_transform {
            AtlasTransform::Resolved { scale, translate } => (scale, translate),
            AtlasTransform::Unresolved => {
                debug_assert!(false, "atlas transform read before it was resolved");
                ([0.0, 0.0], [0.0, 0.0])
            }
        }
    }
}

fn sampling_transform<B: GpuBackend>(
    offset: (i16, i16),
    texture: &RenderTarget<B>,
) -> AtlasTransform {
    let mut scale = [1.0 / texture.width as f32, 1.0 / texture.height as f32];
    let mut translate = [offset.0 as f32 * scale[0], offset.1 as f32 * scale[1]];
    if texture.origin == SurfaceOrigin::BottomLeft {
        scale[1] = -scale[1];
        translate[1] = 1.0 - translate[1];
    }
    AtlasTransform::Resolved { scale, translate }
}

/// Clip stage handed to the op list; resolves to a [`ClipPath`] at flush time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipProcessor {
    pub op_list: OpListId,
    pub path_id: PathId,
    /// Set when fragments outside the path's device bounds can be sampled
    pub must_check_bounds: bool,
    pub fill_rule: FillRule,
}

/// What a clip stage needs to sample its mask
#[derive(Clone, Debug)]
pub struct ClipAtlasBinding<B: GpuBackend> {
    pub texture: RenderTarget<B>,
    pub scale: [f32; 2],
    pub translate: [f32; 2],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::DeviceCaps;
    use crate::headless::{HeadlessBackend, HeadlessResourceProvider};
    use covpath_paint::{ISize, PathBuilder, Rect};

    fn clip(rect: Rect, access: IRect) -> ClipPath {
        ClipPath::init(&Path::rect(rect), access, 800, 600, &RendererConfig::default())
    }

    #[test]
    fn test_access_widens_monotonically() {
        let mut clip = clip(Rect::new(0.0, 0.0, 50.0, 50.0), IRect::new(10, 10, 20, 20));
        clip.add_access(IRect::new(0, 15, 12, 40));
        assert_eq!(clip.access_rect(), IRect::new(0, 10, 20, 40));
        clip.add_access(IRect::new(12, 12, 14, 14));
        assert_eq!(clip.access_rect(), IRect::new(0, 10, 20, 40));
        clip.add_access(IRect::EMPTY);
        assert_eq!(clip.access_rect(), IRect::new(0, 10, 20, 40));
    }

    #[test]
    fn test_huge_clip_cropped_to_target() {
        let path = PathBuilder::new()
            .move_to(-1.0e6, -1.0e6)
            .line_to(1.0e6, -1.0e6)
            .line_to(0.0, 1.0e6)
            .close()
            .build();
        let clip = ClipPath::init(
            &path,
            IRect::from_wh(800, 600),
            800,
            600,
            &RendererConfig::default(),
        );
        assert_eq!(clip.path_dev_ibounds(), IRect::new(-1_000_000, -1_000_000, 1_000_000, 1_000_000));
        let cropped = clip.device_path().bounds();
        assert!(cropped.left >= 0.0 && cropped.right <= 800.0);
        assert!(cropped.top >= 0.0 && cropped.bottom <= 600.0);
    }

    #[test]
    fn test_resolve_transform() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::full_support(4096));
        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        let mut atlases = AtlasStack::<HeadlessBackend>::new(1024, 4096, 1);
        let mut clip = clip(Rect::new(100.0, 200.0, 150.0, 260.0), IRect::from_wh(800, 600));

        clip.place_in_atlas(&mut builder, &mut atlases);
        let placement = match clip.placement() {
            ClipPlacement::Placed(Some(placement)) => placement,
            other => panic!("unexpected placement {:?}", other),
        };
        assert_eq!(placement.offset, (-100, -200));

        builder.emit_op(atlases.current().unwrap().draw_bounds());
        let ops = builder.finalize(&mut provider).unwrap();
        atlases.finalize_all(&mut provider, ops);

        clip.resolve_atlas_transform(&atlases);
        let (scale, translate) = clip.atlas_transform();
        assert_eq!(scale, [1.0 / 1024.0, 1.0 / 1024.0]);
        assert_eq!(translate, [-100.0 / 1024.0, -200.0 / 1024.0]);
    }

    #[test]
    fn test_bottom_left_origin_flips_y() {
        let texture = RenderTarget::<HeadlessBackend> {
            texture: crate::headless::HeadlessTexture {
                id: 1,
                size: ISize::new(256, 128),
            },
            width: 256,
            height: 128,
            origin: SurfaceOrigin::BottomLeft,
        };
        let transform = sampling_transform((32, 64), &texture);
        assert_eq!(
            transform,
            AtlasTransform::Resolved {
                scale: [1.0 / 256.0, -1.0 / 128.0],
                translate: [0.125, 0.5],
            }
        );
    }

    #[test]
    fn test_unplaced_resolves_to_zero() {
        let atlases = AtlasStack::<HeadlessBackend>::new(1024, 4096, 1);
        let mut clip = clip(Rect::new(0.0, 0.0, 10.0, 10.0), IRect::from_wh(10, 10));
        assert_eq!(clip.atlas_transform_state(), AtlasTransform::Unresolved);
        clip.resolve_atlas_transform(&atlases);
        assert_eq!(clip.atlas_transform(), ([0.0, 0.0], [0.0, 0.0]));
    }
}
