//! Cropping paths to integer rectangles
//!
//! Coverage math downstream runs in fp32 and loses precision on paths that
//! span more than ~2^16 pixels, so oversized paths are flattened and clipped
//! against the rect they will be drawn into. Each closed contour is clipped
//! independently against the (convex) crop box, which keeps the winding number
//! of every point inside the box unchanged for both fill rules.

use lyon::math::point;
use lyon::path::iterator::PathIterator;
use lyon::path::PathEvent;

use crate::geometry::{IRect, Point};
use crate::path::{Path, PathBuilder, PathCommand};

/// Flattening tolerance used when callers have no opinion, in device pixels
pub const DEFAULT_CROP_TOLERANCE: f32 = 0.25;

/// Convert a path to lyon path events, closing every subpath
fn path_to_lyon_events(path: &Path) -> Vec<PathEvent> {
    let mut events = Vec::new();
    let mut first_point: Option<Point> = None;
    let mut current_point = Point::ZERO;

    let begin_if_needed = |events: &mut Vec<PathEvent>,
                               first_point: &mut Option<Point>,
                               current_point: Point| {
        if first_point.is_none() {
            events.push(PathEvent::Begin {
                at: point(current_point.x, current_point.y),
            });
            *first_point = Some(current_point);
        }
    };

    for cmd in path.commands() {
        match *cmd {
            PathCommand::MoveTo(p) => {
                if let Some(first) = first_point {
                    events.push(PathEvent::End {
                        last: point(current_point.x, current_point.y),
                        first: point(first.x, first.y),
                        close: true,
                    });
                }
                events.push(PathEvent::Begin {
                    at: point(p.x, p.y),
                });
                first_point = Some(p);
                current_point = p;
            }
            PathCommand::LineTo(p) => {
                begin_if_needed(&mut events, &mut first_point, current_point);
                events.push(PathEvent::Line {
                    from: point(current_point.x, current_point.y),
                    to: point(p.x, p.y),
                });
                current_point = p;
            }
            // Conics are approximated by the quadratic sharing their control
            // point; only crop input can carry them.
            PathCommand::QuadTo { control, end } | PathCommand::ConicTo { control, end, .. } => {
                begin_if_needed(&mut events, &mut first_point, current_point);
                events.push(PathEvent::Quadratic {
                    from: point(current_point.x, current_point.y),
                    ctrl: point(control.x, control.y),
                    to: point(end.x, end.y),
                });
                current_point = end;
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => {
                begin_if_needed(&mut events, &mut first_point, current_point);
                events.push(PathEvent::Cubic {
                    from: point(current_point.x, current_point.y),
                    ctrl1: point(control1.x, control1.y),
                    ctrl2: point(control2.x, control2.y),
                    to: point(end.x, end.y),
                });
                current_point = end;
            }
            PathCommand::Close => {
                if let Some(first) = first_point.take() {
                    events.push(PathEvent::End {
                        last: point(current_point.x, current_point.y),
                        first: point(first.x, first.y),
                        close: true,
                    });
                    current_point = first;
                }
            }
        }
    }

    if let Some(first) = first_point {
        events.push(PathEvent::End {
            last: point(current_point.x, current_point.y),
            first: point(first.x, first.y),
            close: true,
        });
    }

    events
}

/// Flatten a path into closed polygons
fn flatten_contours(path: &Path, tolerance: f32) -> Vec<Vec<Point>> {
    let mut contours = Vec::new();
    let mut current: Vec<Point> = Vec::new();

    for event in path_to_lyon_events(path).into_iter().flattened(tolerance) {
        match event {
            PathEvent::Begin { at } => {
                current.clear();
                current.push(Point::new(at.x, at.y));
            }
            PathEvent::Line { to, .. } => current.push(Point::new(to.x, to.y)),
            PathEvent::Quadratic { to, .. } | PathEvent::Cubic { to, .. } => {
                current.push(Point::new(to.x, to.y));
            }
            PathEvent::End { .. } => contours.push(std::mem::take(&mut current)),
        }
    }

    contours
}

#[derive(Clone, Copy)]
enum Edge {
    Left(f32),
    Top(f32),
    Right(f32),
    Bottom(f32),
}

impl Edge {
    fn inside(self, p: Point) -> bool {
        match self {
            Edge::Left(x) => p.x >= x,
            Edge::Top(y) => p.y >= y,
            Edge::Right(x) => p.x <= x,
            Edge::Bottom(y) => p.y <= y,
        }
    }

    /// Crossing of segment `a -> b` with this edge; the clipped coordinate is exact
    fn intersect(self, a: Point, b: Point) -> Point {
        match self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point::new(x, a.y + t * (b.y - a.y))
            }
            Edge::Top(y) | Edge::Bottom(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

/// Sutherland–Hodgman against one edge of the crop box
fn clip_polygon(input: &[Point], edge: Edge) -> Vec<Point> {
    let mut output = Vec::with_capacity(input.len() + 2);
    let Some(&last) = input.last() else {
        return output;
    };

    let mut prev = last;
    for &cur in input {
        match (edge.inside(prev), edge.inside(cur)) {
            (true, true) => output.push(cur),
            (false, true) => {
                output.push(edge.intersect(prev, cur));
                output.push(cur);
            }
            (true, false) => output.push(edge.intersect(prev, cur)),
            (false, false) => {}
        }
        prev = cur;
    }

    output
}

/// Intersect `path` with `cropbox`, returning a polygonal path.
///
/// The result keeps the fill rule and volatility of the input. Paths carrying
/// non-finite coordinates, and paths that miss the box, crop to an empty path.
/// Cropping an already-cropped path to the same box returns the same geometry.
pub fn crop_path(path: &Path, cropbox: &IRect, tolerance: f32) -> Path {
    let mut builder = PathBuilder::new()
        .fill_rule(path.fill_rule())
        .volatile(path.is_volatile());

    if cropbox.is_empty() {
        return builder.build();
    }
    if !path.points().all(|p| p.is_finite()) {
        tracing::debug!("path crop hit non-finite coordinates; dropping path");
        return builder.build();
    }

    let bounds = cropbox.to_rect();
    let edges = [
        Edge::Left(bounds.left),
        Edge::Top(bounds.top),
        Edge::Right(bounds.right),
        Edge::Bottom(bounds.bottom),
    ];

    for contour in flatten_contours(path, tolerance) {
        let mut polygon = contour;
        for edge in edges {
            polygon = clip_polygon(&polygon, edge);
            if polygon.is_empty() {
                break;
            }
        }

        for p in polygon.iter_mut() {
            p.x = p.x.clamp(bounds.left, bounds.right);
            p.y = p.y.clamp(bounds.top, bounds.bottom);
        }
        polygon.dedup();
        while polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }
        if polygon.len() < 3 {
            continue;
        }

        builder = builder.move_to(polygon[0].x, polygon[0].y);
        for p in &polygon[1..] {
            builder = builder.line_to(p.x, p.y);
        }
        builder = builder.close();
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::path::FillRule;

    #[test]
    fn test_crop_inside_is_unchanged() {
        let path = Path::rect(Rect::new(10.0, 10.0, 20.0, 20.0));
        let cropped = crop_path(&path, &IRect::new(0, 0, 100, 100), DEFAULT_CROP_TOLERANCE);
        assert_eq!(cropped.commands(), path.commands());
    }

    #[test]
    fn test_crop_clamps_to_box() {
        let path = Path::rect(Rect::new(-1.0e6, -1.0e6, 1.0e6, 50.0)).with_fill_rule(FillRule::EvenOdd);
        let cropbox = IRect::new(0, 0, 100, 100);
        let cropped = crop_path(&path, &cropbox, DEFAULT_CROP_TOLERANCE);

        assert_eq!(cropped.fill_rule(), FillRule::EvenOdd);
        assert_eq!(cropped.bounds(), Rect::new(0.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn test_crop_is_idempotent() {
        let path = PathBuilder::new()
            .move_to(-500.0, 30.0)
            .cubic_to(40.0, -300.0, 90.0, 400.0, 300.0, 60.0)
            .line_to(50.0, 250.0)
            .close()
            .build();
        let cropbox = IRect::new(0, 0, 128, 128);
        let once = crop_path(&path, &cropbox, DEFAULT_CROP_TOLERANCE);
        let twice = crop_path(&once, &cropbox, DEFAULT_CROP_TOLERANCE);

        assert!(!once.is_empty());
        assert_eq!(once.commands(), twice.commands());
    }

    #[test]
    fn test_crop_outside_is_empty() {
        let path = Path::rect(Rect::new(200.0, 200.0, 300.0, 300.0));
        let cropped = crop_path(&path, &IRect::new(0, 0, 100, 100), DEFAULT_CROP_TOLERANCE);
        assert!(cropped.is_empty());
    }

    #[test]
    fn test_crop_non_finite_resets() {
        let path = PathBuilder::new()
            .move_to(0.0, 0.0)
            .line_to(f32::NAN, 10.0)
            .line_to(10.0, 10.0)
            .close()
            .build();
        let cropped = crop_path(&path, &IRect::new(0, 0, 100, 100), DEFAULT_CROP_TOLERANCE);
        assert!(cropped.is_empty());
    }
}
