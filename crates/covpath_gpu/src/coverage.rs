//! Coverage-count geometry
//!
//! Paths are parsed into one shared point buffer. Saving a parsed path emits
//! its coverage-counting primitives: a triangle fan per contour anchored at
//! the contour's first point, plus one instance per curved segment that adds
//! the area between the curve and its chord. Summing the signed coverage of
//! all primitives yields the winding number at every pixel of the atlas.
//!
//! Primitives accumulate across paths and are sealed into one [`CoverageOp`]
//! per atlas by [`CoverageOpsBuilder::emit_op`].

use std::ops::Range;

use covpath_paint::{IRect, ISize, Path, PathCommand, Point, Rect, Transform};
use smallvec::SmallVec;

use crate::error::Result;
use crate::gpu::{BufferKind, GpuBackend, OnFlushResourceProvider};
use crate::primitives::{CubicInstance, QuadInstance, TriangleInstance};

/// Whether a saved path needs a scissor rect while rasterizing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScissorMode {
    NonScissored,
    Scissored,
}

/// A run of primitives rasterized with the same scissor state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageBatch {
    /// Scissor in atlas space, `None` for unscissored paths
    pub scissor: Option<IRect>,
    pub triangles: Range<u32>,
    pub quads: Range<u32>,
    pub cubics: Range<u32>,
}

/// Shared buffers of one flush's coverage geometry
#[derive(Clone, Debug)]
pub struct CoverageBuffers<B: GpuBackend> {
    /// Device-space points as `[f32; 2]`
    pub points: B::Buffer,
    pub triangles: B::Buffer,
    pub quads: B::Buffer,
    pub cubics: B::Buffer,
}

/// The coverage-count rasterization of one atlas
#[derive(Clone, Debug)]
pub struct CoverageOp<B: GpuBackend> {
    pub buffers: CoverageBuffers<B>,
    pub batches: Vec<CoverageBatch>,
    /// Extent of the atlas actually written
    pub draw_bounds: ISize,
}

impl<B: GpuBackend> CoverageOp<B> {
    /// Total (triangles, quads, cubics) rasterized by this op
    pub fn primitive_counts(&self) -> (u32, u32, u32) {
        self.batches.iter().fold((0, 0, 0), |(t, q, c), batch| {
            (
                t + batch.triangles.len() as u32,
                q + batch.quads.len() as u32,
                c + batch.cubics.len() as u32,
            )
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum Segment {
    Line { to: u32 },
    Quad { ctrl: u32, to: u32 },
    Cubic { ctrl1: u32, ctrl2: u32, to: u32 },
}

#[derive(Debug)]
struct Contour {
    start: u32,
    segments: SmallVec<[Segment; 8]>,
}

impl Contour {
    fn new(start: u32) -> Self {
        Self {
            start,
            segments: SmallVec::new(),
        }
    }
}

#[derive(Debug)]
struct ParsedPath {
    first_point: usize,
    contours: SmallVec<[Contour; 2]>,
}

#[derive(Debug)]
struct SealedOp {
    batches: Vec<CoverageBatch>,
    draw_bounds: ISize,
}

fn push_point(points: &mut Vec<[f32; 2]>, p: Point) -> u32 {
    points.push(p.to_array());
    (points.len() - 1) as u32
}

/// Accumulates the coverage geometry of every path placed during a flush
#[derive(Debug)]
pub struct CoverageOpsBuilder {
    max_total_paths: usize,
    max_path_points: usize,
    num_points: usize,
    num_verbs: usize,
    points: Vec<[f32; 2]>,
    triangles: Vec<TriangleInstance>,
    quads: Vec<QuadInstance>,
    cubics: Vec<CubicInstance>,
    parsed: Option<ParsedPath>,
    batches: Vec<CoverageBatch>,
    sealed: Vec<SealedOp>,
    saved_paths: usize,
}

impl CoverageOpsBuilder {
    /// Create a builder for a flush with the given worst-case totals
    pub fn new(
        max_total_paths: usize,
        max_path_points: usize,
        num_points: usize,
        num_verbs: usize,
    ) -> Self {
        Self {
            max_total_paths,
            max_path_points,
            num_points,
            num_verbs,
            points: Vec::with_capacity(num_points),
            triangles: Vec::new(),
            quads: Vec::new(),
            cubics: Vec::new(),
            parsed: None,
            batches: Vec::new(),
            sealed: Vec::new(),
            saved_paths: 0,
        }
    }

    /// Map `path` through `transform` into the point buffer.
    ///
    /// Returns the device bounds and the 45° bounds of the mapped points. The
    /// parsed path must be saved or discarded before the next parse.
    pub fn parse_path(&mut self, transform: &Transform, path: &Path) -> (Rect, Rect) {
        debug_assert!(
            self.parsed.is_none(),
            "previous path was neither saved nor discarded"
        );
        self.points.reserve(self.max_path_points);

        let first_point = self.points.len();
        let mut contours: SmallVec<[Contour; 2]> = SmallVec::new();
        let mut contour: Option<Contour> = None;
        let mut start = Point::ZERO;
        let mut last = Point::ZERO;

        for cmd in path.commands() {
            match *cmd {
                PathCommand::MoveTo(p) => {
                    contours.extend(contour.take());
                    let p = transform.map_point(p);
                    contour = Some(Contour::new(push_point(&mut self.points, p)));
                    start = p;
                    last = p;
                }
                PathCommand::LineTo(p) => {
                    let c = contour
                        .get_or_insert_with(|| Contour::new(push_point(&mut self.points, last)));
                    let p = transform.map_point(p);
                    let to = push_point(&mut self.points, p);
                    c.segments.push(Segment::Line { to });
                    last = p;
                }
                // Conics are refused at admission; the control point still
                // gives a hull-bounded approximation.
                PathCommand::QuadTo { control, end } | PathCommand::ConicTo { control, end, .. } => {
                    let c = contour
                        .get_or_insert_with(|| Contour::new(push_point(&mut self.points, last)));
                    let ctrl = push_point(&mut self.points, transform.map_point(control));
                    let end = transform.map_point(end);
                    let to = push_point(&mut self.points, end);
                    c.segments.push(Segment::Quad { ctrl, to });
                    last = end;
                }
                PathCommand::CubicTo {
                    control1,
                    control2,
                    end,
                } => {
                    let c = contour
                        .get_or_insert_with(|| Contour::new(push_point(&mut self.points, last)));
                    let ctrl1 = push_point(&mut self.points, transform.map_point(control1));
                    let ctrl2 = push_point(&mut self.points, transform.map_point(control2));
                    let end = transform.map_point(end);
                    let to = push_point(&mut self.points, end);
                    c.segments.push(Segment::Cubic { ctrl1, ctrl2, to });
                    last = end;
                }
                PathCommand::Close => {
                    contours.extend(contour.take());
                    last = start;
                }
            }
        }
        contours.extend(contour.take());

        let new_points = &self.points[first_point..];
        let dev_bounds = Rect::from_points(new_points.iter().map(|p| Point::new(p[0], p[1])))
            .unwrap_or(Rect::EMPTY);
        let dev_bounds45 =
            Rect::from_points(new_points.iter().map(|p| Point::new(p[0] - p[1], p[0] + p[1])))
                .unwrap_or(Rect::EMPTY);

        self.parsed = Some(ParsedPath {
            first_point,
            contours,
        });
        (dev_bounds, dev_bounds45)
    }

    /// Parse a path that is already in device space
    pub fn parse_device_space_path(&mut self, path: &Path) -> (Rect, Rect) {
        self.parse_path(&Transform::IDENTITY, path)
    }

    /// Drop the parsed path and its points
    pub fn discard_parsed_path(&mut self) {
        if let Some(parsed) = self.parsed.take() {
            self.points.truncate(parsed.first_point);
        }
    }

    /// Emit the coverage primitives of the parsed path.
    ///
    /// `clipped_bounds` is the device-space region the path is rasterized
    /// into; `atlas_offset` moves it to its atlas location.
    pub fn save_parsed_path(
        &mut self,
        mode: ScissorMode,
        clipped_bounds: &IRect,
        atlas_offset: (i16, i16),
    ) {
        let Some(parsed) = self.parsed.take() else {
            debug_assert!(false, "save_parsed_path without a parsed path");
            return;
        };
        let offset = [atlas_offset.0, atlas_offset.1];
        let triangles_start = self.triangles.len() as u32;
        let quads_start = self.quads.len() as u32;
        let cubics_start = self.cubics.len() as u32;

        for contour in &parsed.contours {
            let anchor = contour.start;
            let mut prev = anchor;
            for segment in &contour.segments {
                let to = match *segment {
                    Segment::Line { to } => to,
                    Segment::Quad { ctrl, to } => {
                        self.quads.push(QuadInstance {
                            indices: [prev, ctrl, to],
                            atlas_offset: offset,
                        });
                        to
                    }
                    Segment::Cubic { ctrl1, ctrl2, to } => {
                        self.cubics.push(CubicInstance {
                            indices: [prev, ctrl1, ctrl2, to],
                            atlas_offset: offset,
                        });
                        to
                    }
                };
                if prev != anchor {
                    self.triangles.push(TriangleInstance {
                        indices: [anchor, prev, to],
                        atlas_offset: offset,
                    });
                }
                prev = to;
            }
        }

        let scissor = match mode {
            ScissorMode::NonScissored => None,
            ScissorMode::Scissored => {
                Some(clipped_bounds.offset(atlas_offset.0 as i32, atlas_offset.1 as i32))
            }
        };
        self.push_batch(CoverageBatch {
            scissor,
            triangles: triangles_start..self.triangles.len() as u32,
            quads: quads_start..self.quads.len() as u32,
            cubics: cubics_start..self.cubics.len() as u32,
        });
        self.saved_paths += 1;
    }

    fn push_batch(&mut self, batch: CoverageBatch) {
        if batch.scissor.is_none() {
            if let Some(last) = self.batches.last_mut() {
                if last.scissor.is_none() {
                    last.triangles.end = batch.triangles.end;
                    last.quads.end = batch.quads.end;
                    last.cubics.end = batch.cubics.end;
                    return;
                }
            }
        }
        self.batches.push(batch);
    }

    /// Seal everything saved since the previous emit into one op
    pub fn emit_op(&mut self, atlas_draw_bounds: ISize) {
        self.sealed.push(SealedOp {
            batches: std::mem::take(&mut self.batches),
            draw_bounds: atlas_draw_bounds,
        });
    }

    pub fn has_parsed_path(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn saved_path_count(&self) -> usize {
        self.saved_paths
    }

    pub fn emitted_op_count(&self) -> usize {
        self.sealed.len()
    }

    pub fn max_total_paths(&self) -> usize {
        self.max_total_paths
    }

    /// Upload the accumulated geometry and produce one op per emit.
    ///
    /// Buffers are sized for the worst case given at construction. Nothing is
    /// allocated when no op was emitted.
    pub fn finalize<B, P>(self, provider: &mut P) -> Result<Vec<CoverageOp<B>>>
    where
        B: GpuBackend,
        P: OnFlushResourceProvider<B> + ?Sized,
    {
        debug_assert!(self.parsed.is_none(), "finalize with a pending parsed path");
        debug_assert!(self.batches.is_empty(), "geometry saved after the last emit_op");

        if self.sealed.is_empty() {
            return Ok(Vec::new());
        }

        let buffers = CoverageBuffers {
            points: upload::<B, P, _>(provider, BufferKind::Storage, &self.points, self.num_points)?,
            triangles: upload::<B, P, _>(provider, BufferKind::Instance, &self.triangles, self.num_points)?,
            quads: upload::<B, P, _>(provider, BufferKind::Instance, &self.quads, self.num_verbs)?,
            cubics: upload::<B, P, _>(provider, BufferKind::Instance, &self.cubics, self.num_verbs)?,
        };

        tracing::trace!(
            ops = self.sealed.len(),
            paths = self.saved_paths,
            points = self.points.len(),
            triangles = self.triangles.len(),
            quads = self.quads.len(),
            cubics = self.cubics.len(),
            "coverage geometry uploaded"
        );

        Ok(self
            .sealed
            .into_iter()
            .map(|sealed| CoverageOp {
                buffers: buffers.clone(),
                batches: sealed.batches,
                draw_bounds: sealed.draw_bounds,
            })
            .collect())
    }
}

fn upload<B, P, T>(provider: &mut P, kind: BufferKind, data: &[T], capacity: usize) -> Result<B::Buffer>
where
    B: GpuBackend,
    P: OnFlushResourceProvider<B> + ?Sized,
    T: bytemuck::Pod,
{
    let size = capacity.max(data.len()).max(1) * std::mem::size_of::<T>();
    let buffer = provider.make_buffer(kind, size)?;
    if !data.is_empty() {
        provider.write_buffer(&buffer, bytemuck::cast_slice(data))?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::DeviceCaps;
    use crate::headless::{HeadlessBackend, HeadlessResourceProvider};
    use covpath_paint::PathBuilder;

    fn square() -> Path {
        Path::rect(Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    #[test]
    fn test_parse_bounds() {
        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        let (bounds, bounds45) =
            builder.parse_path(&Transform::translation(5.0, 0.0), &square());
        assert_eq!(bounds, Rect::new(5.0, 0.0, 15.0, 10.0));
        // x - y spans [5 - 10, 15 - 0], x + y spans [5, 25]
        assert_eq!(bounds45, Rect::new(-5.0, 5.0, 15.0, 25.0));
        assert_eq!(builder.point_count(), 4);
    }

    #[test]
    fn test_square_fan() {
        let mut builder = CoverageOpsBuilder::new(1, 4, 4, 5);
        builder.parse_device_space_path(&square());
        builder.save_parsed_path(ScissorMode::NonScissored, &IRect::from_wh(10, 10), (0, 0));
        assert_eq!(builder.triangles.len(), 2);
        assert_eq!(builder.triangles[0].indices, [0, 1, 2]);
        assert_eq!(builder.triangles[1].indices, [0, 2, 3]);
        assert!(builder.quads.is_empty() && builder.cubics.is_empty());
    }

    #[test]
    fn test_curves_emit_instances() {
        let path = PathBuilder::new()
            .move_to(0.0, 0.0)
            .quad_to(5.0, -5.0, 10.0, 0.0)
            .cubic_to(12.0, 3.0, 12.0, 7.0, 10.0, 10.0)
            .line_to(0.0, 10.0)
            .close()
            .build();
        let mut builder = CoverageOpsBuilder::new(1, 7, 7, 5);
        builder.parse_device_space_path(&path);
        builder.save_parsed_path(ScissorMode::NonScissored, &IRect::new(0, -5, 12, 10), (3, 8));

        assert_eq!(builder.quads.len(), 1);
        assert_eq!(builder.quads[0].indices, [0, 1, 2]);
        assert_eq!(builder.cubics.len(), 1);
        assert_eq!(builder.cubics[0].indices, [2, 3, 4, 5]);
        assert_eq!(builder.cubics[0].atlas_offset, [3, 8]);
        // Fan over the on-curve points 0, 2, 5, 6
        assert_eq!(builder.triangles.len(), 2);
    }

    #[test]
    fn test_discard_restores_points() {
        let mut builder = CoverageOpsBuilder::new(2, 4, 8, 10);
        builder.parse_device_space_path(&square());
        builder.save_parsed_path(ScissorMode::NonScissored, &IRect::from_wh(10, 10), (0, 0));
        builder.parse_device_space_path(&square());
        assert_eq!(builder.point_count(), 8);
        builder.discard_parsed_path();
        assert_eq!(builder.point_count(), 4);
        assert!(!builder.has_parsed_path());
        assert_eq!(builder.saved_path_count(), 1);
    }

    #[test]
    fn test_batches_group_by_scissor() {
        let mut builder = CoverageOpsBuilder::new(3, 4, 12, 15);
        for _ in 0..2 {
            builder.parse_device_space_path(&square());
            builder.save_parsed_path(ScissorMode::NonScissored, &IRect::from_wh(10, 10), (0, 0));
        }
        builder.parse_device_space_path(&square());
        builder.save_parsed_path(ScissorMode::Scissored, &IRect::new(2, 2, 8, 8), (100, 50));

        assert_eq!(builder.batches.len(), 2);
        assert_eq!(builder.batches[0].triangles, 0..4);
        assert_eq!(builder.batches[1].scissor, Some(IRect::new(102, 52, 108, 58)));
        assert_eq!(builder.batches[1].triangles, 4..6);
    }

    #[test]
    fn test_finalize_one_op_per_emit() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::full_support(4096));
        let mut builder = CoverageOpsBuilder::new(2, 4, 8, 10);
        builder.parse_device_space_path(&square());
        builder.save_parsed_path(ScissorMode::NonScissored, &IRect::from_wh(10, 10), (0, 0));
        builder.emit_op(ISize::new(11, 11));
        builder.parse_device_space_path(&square());
        builder.save_parsed_path(ScissorMode::NonScissored, &IRect::from_wh(10, 10), (0, 0));
        builder.emit_op(ISize::new(10, 10));

        let ops: Vec<CoverageOp<HeadlessBackend>> = builder.finalize(&mut provider).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].primitive_counts(), (2, 0, 0));
        assert_eq!(ops[1].draw_bounds, ISize::new(10, 10));
        assert_eq!(provider.stats().buffers_made, 4);
    }

    #[test]
    fn test_finalize_without_ops_allocates_nothing() {
        let mut provider = HeadlessResourceProvider::new(DeviceCaps::full_support(4096));
        let builder = CoverageOpsBuilder::new(0, 0, 0, 0);
        let ops: Vec<CoverageOp<HeadlessBackend>> = builder.finalize(&mut provider).unwrap();
        assert!(ops.is_empty());
        assert_eq!(provider.stats().buffers_made, 0);
    }
}
