//! Covpath paint types
//!
//! The CPU-side vocabulary shared by the coverage-counting renderer.
//!
//! # Features
//!
//! - Points, float and integer rectangles
//! - 3x3 view transforms with perspective detection
//! - Fill paths with winding rules and content identity
//! - Cropping of oversized paths to an integer rectangle
//! - Colors packed into premultiplied per-instance words

pub mod color;
pub mod crop;
pub mod geometry;
pub mod path;
pub mod transform;

pub use color::{Color, PackedColor};
pub use crop::{crop_path, DEFAULT_CROP_TOLERANCE};
pub use geometry::{IRect, ISize, Point, Rect};
pub use path::{FillRule, Path, PathBuilder, PathCommand, PathId};
pub use transform::Transform;
