//! # sdfgen-core
//!
//! GPU-free half of the SDF generator: outline parsing, flattening, and
//! the reference CPU rasterizer.
//!
//! ## Architecture
//!
//! ```text
//!  "M0,0 L64,64 L0,64 Z"
//!       │
//!       ▼
//!  path::parse_path()           ◀─── command stream → Vec<PathCommand>
//!       │
//!       ▼
//!  Outline::from_commands()     ◀─── flatten + sort segments by max_x
//!       │
//!       ▼
//!  cpu::generate(params, &outline) ──► SdfField (one byte per texel)
//!       │
//!       ▼
//!  SurfaceSink::write_rgba()    ◀─── optional: channel write into an image
//! ```
//!
//! ## Crate modules
//!
//! - [`path`]: command parsing, Bezier evaluation, flattening
//! - [`outline`]: line segments and the `max_x`-sorted outline
//! - [`params`]: view box, SDF parameters, generator configuration
//! - [`field`]: output grid and the exponential distance encoding
//! - [`cpu`]: brute-force nearest-segment rasterizer
//! - [`surface`]: channel-masked surface writes
//! - [`error`]: input error taxonomy

pub mod cpu;
pub mod error;
pub mod field;
pub mod outline;
pub mod params;
pub mod path;
pub mod surface;

// Re-exports for convenience
pub use error::{PathError, SdfError, SurfaceError};
pub use field::{encode_distance, SdfField};
pub use outline::{LineSegment, Outline};
pub use params::{GeneratorConfig, ResolvedParams, SdfParams, ViewBox};
pub use path::{
    flatten, for_each_command, parse_path, PathBuilder, PathCommand, PathSegment, Point,
    DEFAULT_CURVE_SUBDIVISIONS,
};
pub use surface::{ChannelMask, RgbaImage, SurfaceSink};
