//! # sdfgen-render
//!
//! GPU-accelerated SDF generation with a CPU fallback, built on `wgpu`.
//!
//! ## Architecture
//!
//! ```text
//!  SdfGenerator::generate(params, outline)
//!       │
//!       ├── GpuRasterizer (self-tested once)
//!       │       │
//!       │       ▼
//!       │   accumulate pass         ◀─── one instanced triangle per segment
//!       │       │                        (Rgba16Float, max/add blending)
//!       │       ▼
//!       │   resolve pass            ◀─── sign select, channel mask, offset
//!       │       │
//!       │       ▼
//!       │   readback / GpuSurface
//!       │
//!       └── on any GPU error ──► CpuBackend (sdfgen-core::cpu)
//! ```
//!
//! ## Crate modules
//!
//! - [`context`]: headless device/queue and context-loss tracking
//! - [`session`]: scoped program, texture and framebuffer acquisition
//! - [`vertex`]: vertex, instance and uniform layouts
//! - [`pipelines`]: WGSL programs (accumulate, resolve, copy)
//! - [`gpu`]: the GPU rasterizer and its self-test gate
//! - [`surface`]: caller-owned RGBA8 destination textures
//! - [`readback`]: texture → host copies
//! - [`backend`]: the backend trait and the CPU backend
//! - [`generator`]: GPU-first dispatch with CPU fallback

pub mod backend;
pub mod context;
pub mod error;
pub mod generator;
pub mod gpu;
pub mod pipelines;
pub mod readback;
pub mod session;
pub mod surface;
pub mod vertex;

// Re-exports for convenience
pub use backend::{BackendKind, CpuBackend, SdfBackend};
pub use context::{ContextId, GpuContext};
pub use error::GpuError;
pub use generator::{GenerationReport, OutlineSource, Placement, SdfGenerator};
pub use gpu::{GpuRasterizer, SelfTest};
pub use session::{Capability, GpuSession};
pub use surface::{GpuSurface, SurfaceWriter};
