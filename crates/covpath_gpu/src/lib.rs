//! Covpath GPU Renderer
//!
//! Coverage-counted path rendering: fills are rasterized into shared
//! coverage-count atlases at flush time and resolved per draw with an
//! instanced octagon cover pass.
//!
//! # Flow
//!
//! - Recording: [`CoverageCountingPathRenderer::draw_path`] creates draw ops,
//!   the op list finalizes, records and combines them.
//! - [`CoverageCountingPathRenderer::pre_flush`] packs every pending path into
//!   atlases and returns one [`AtlasPass`] per atlas for the caller to render.
//! - Ops execute against the shared per-flush buffers.
//! - [`CoverageCountingPathRenderer::post_flush`] releases per-flush state.
//!
//! Backends plug in through the traits in [`gpu`]. A CPU-side headless
//! backend ships in [`headless`]; a wgpu resource provider is available with
//! the `wgpu` feature.

pub mod atlas;
pub mod caps;
pub mod clip;
pub mod config;
pub mod coverage;
pub mod draw_op;
pub mod error;
pub mod gpu;
pub mod headless;
pub mod path_processor;
pub mod pending;
pub mod primitives;
pub mod processor;
pub mod renderer;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use atlas::{Atlas, AtlasId, AtlasPass, AtlasPlacement, AtlasStack};
pub use caps::DeviceCaps;
pub use clip::{ClipAtlasBinding, ClipPath, ClipProcessor};
pub use config::RendererConfig;
pub use coverage::{CoverageOp, CoverageOpsBuilder, ScissorMode};
pub use draw_op::{CombineResult, DrawPathArgs, DrawPathsOp, Shape, SingleDraw, Style};
pub use error::{CoverageError, Result};
pub use gpu::{BufferKind, GpuBackend, OnFlushResourceProvider, OpFlushState, RenderTarget};
pub use pending::{DrawOpKey, OpListId, PendingPathsRegistry};
pub use primitives::PathInstance;
pub use processor::{AppliedClip, BlendMode, Paint, ProcessorSet, RequiresDstTexture};
pub use renderer::{AaType, CanDrawPath, CanDrawPathArgs, CoverageCountingPathRenderer, FlushPhase};
