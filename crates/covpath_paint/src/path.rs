//! Path building and representation

use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

use crate::geometry::{Point, Rect};
use crate::transform::Transform;

static NEXT_PATH_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a path's contents
///
/// A fresh id is handed out whenever a path is built or its geometry changes;
/// clones share the id of the path they were cloned from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(u32);

impl PathId {
    fn next() -> Self {
        PathId(NEXT_PATH_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Winding convention that decides which points are inside the path
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillRule {
    #[default]
    Winding,
    EvenOdd,
    InverseWinding,
    InverseEvenOdd,
}

impl FillRule {
    pub fn is_inverse(self) -> bool {
        matches!(self, FillRule::InverseWinding | FillRule::InverseEvenOdd)
    }

    pub fn is_even_odd(self) -> bool {
        matches!(self, FillRule::EvenOdd | FillRule::InverseEvenOdd)
    }
}

/// Path command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo {
        control: Point,
        end: Point,
    },
    /// Rational quadratic with the given weight
    ConicTo {
        control: Point,
        end: Point,
        weight: f32,
    },
    CubicTo {
        control1: Point,
        control2: Point,
        end: Point,
    },
    Close,
}

impl PathCommand {
    /// Number of points this command stores
    pub fn point_count(&self) -> usize {
        match self {
            PathCommand::MoveTo(_) | PathCommand::LineTo(_) => 1,
            PathCommand::QuadTo { .. } | PathCommand::ConicTo { .. } => 2,
            PathCommand::CubicTo { .. } => 3,
            PathCommand::Close => 0,
        }
    }

    fn points(&self) -> SmallVec<[Point; 3]> {
        match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => SmallVec::from_slice(&[p]),
            PathCommand::QuadTo { control, end } | PathCommand::ConicTo { control, end, .. } => {
                SmallVec::from_slice(&[control, end])
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => SmallVec::from_slice(&[control1, control2, end]),
            PathCommand::Close => SmallVec::new(),
        }
    }

    fn map_points(self, f: impl Fn(Point) -> Point) -> Self {
        match self {
            PathCommand::MoveTo(p) => PathCommand::MoveTo(f(p)),
            PathCommand::LineTo(p) => PathCommand::LineTo(f(p)),
            PathCommand::QuadTo { control, end } => PathCommand::QuadTo {
                control: f(control),
                end: f(end),
            },
            PathCommand::ConicTo {
                control,
                end,
                weight,
            } => PathCommand::ConicTo {
                control: f(control),
                end: f(end),
                weight,
            },
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => PathCommand::CubicTo {
                control1: f(control1),
                control2: f(control2),
                end: f(end),
            },
            PathCommand::Close => PathCommand::Close,
        }
    }
}

/// A 2D path composed of commands
#[derive(Clone, Debug)]
pub struct Path {
    commands: SmallVec<[PathCommand; 16]>,
    fill_rule: FillRule,
    volatile: bool,
    id: PathId,
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

impl Path {
    pub fn new() -> Self {
        Self {
            commands: SmallVec::new(),
            fill_rule: FillRule::default(),
            volatile: false,
            id: PathId::next(),
        }
    }

    /// Closed rectangle path
    pub fn rect(rect: Rect) -> Self {
        PathBuilder::new()
            .move_to(rect.left, rect.top)
            .line_to(rect.right, rect.top)
            .line_to(rect.right, rect.bottom)
            .line_to(rect.left, rect.bottom)
            .close()
            .build()
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    pub fn set_fill_rule(&mut self, fill_rule: FillRule) {
        self.fill_rule = fill_rule;
    }

    pub fn with_fill_rule(mut self, fill_rule: FillRule) -> Self {
        self.fill_rule = fill_rule;
        self
    }

    /// Volatile paths live for a single frame and are never cached
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub fn with_volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    /// Number of verbs, `Close` included
    pub fn count_verbs(&self) -> usize {
        self.commands.len()
    }

    pub fn count_points(&self) -> usize {
        self.commands.iter().map(PathCommand::point_count).sum()
    }

    pub fn conic_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, PathCommand::ConicTo { .. }))
            .count()
    }

    /// Every stored point, control points included, in command order
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.commands.iter().flat_map(|cmd| cmd.points())
    }

    /// Control-point bounds; empty paths report `Rect::EMPTY`
    pub fn bounds(&self) -> Rect {
        Rect::from_points(self.points()).unwrap_or(Rect::EMPTY)
    }

    /// Map every point through `transform` in place. The path gets a new id.
    pub fn transform(&mut self, transform: &Transform) {
        if transform.is_identity() {
            return;
        }
        for cmd in self.commands.iter_mut() {
            *cmd = cmd.map_points(|p| transform.map_point(p));
        }
        self.id = PathId::next();
    }

    pub fn transformed(&self, transform: &Transform) -> Path {
        let mut path = self.clone();
        path.transform(transform);
        path
    }

    /// Drop all geometry, keeping the fill rule. The path gets a new id.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.id = PathId::next();
    }
}

/// Builder for constructing paths
pub struct PathBuilder {
    path: Path,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self { path: Path::new() }
    }

    pub fn move_to(mut self, x: f32, y: f32) -> Self {
        self.path.commands.push(PathCommand::MoveTo(Point::new(x, y)));
        self
    }

    pub fn line_to(mut self, x: f32, y: f32) -> Self {
        self.path.commands.push(PathCommand::LineTo(Point::new(x, y)));
        self
    }

    pub fn quad_to(mut self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        self.path.commands.push(PathCommand::QuadTo {
            control: Point::new(cx, cy),
            end: Point::new(x, y),
        });
        self
    }

    pub fn conic_to(mut self, cx: f32, cy: f32, x: f32, y: f32, weight: f32) -> Self {
        self.path.commands.push(PathCommand::ConicTo {
            control: Point::new(cx, cy),
            end: Point::new(x, y),
            weight,
        });
        self
    }

    pub fn cubic_to(mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) -> Self {
        self.path.commands.push(PathCommand::CubicTo {
            control1: Point::new(c1x, c1y),
            control2: Point::new(c2x, c2y),
            end: Point::new(x, y),
        });
        self
    }

    pub fn close(mut self) -> Self {
        self.path.commands.push(PathCommand::Close);
        self
    }

    pub fn fill_rule(mut self, fill_rule: FillRule) -> Self {
        self.path.fill_rule = fill_rule;
        self
    }

    pub fn volatile(mut self, volatile: bool) -> Self {
        self.path.volatile = volatile;
        self
    }

    pub fn build(self) -> Path {
        self.path
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let path = PathBuilder::new()
            .move_to(0.0, 0.0)
            .line_to(10.0, 0.0)
            .quad_to(10.0, 10.0, 0.0, 10.0)
            .cubic_to(-5.0, 8.0, -5.0, 2.0, 0.0, 0.0)
            .close()
            .build();
        assert_eq!(path.count_verbs(), 5);
        assert_eq!(path.count_points(), 7);
        assert_eq!(path.conic_count(), 0);
        assert_eq!(path.bounds(), Rect::new(-5.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_ids() {
        let a = Path::rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        let b = a.clone();
        assert_eq!(a.id(), b.id());

        let c = a.transformed(&Transform::translation(1.0, 0.0));
        assert_ne!(a.id(), c.id());
        assert_eq!(c.bounds(), Rect::new(1.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn test_conic_detection() {
        let path = PathBuilder::new()
            .move_to(0.0, 0.0)
            .conic_to(1.0, 0.0, 1.0, 1.0, std::f32::consts::FRAC_1_SQRT_2)
            .build();
        assert_eq!(path.conic_count(), 1);
    }
}
