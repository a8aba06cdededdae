//! GPU-side errors.
//!
//! Every variant is recoverable from the caller's point of view: the
//! generator reacts to any of them by retrying on the CPU.

use thiserror::Error;

use crate::session::Capability;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,
    #[error("Failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("Required capability {0:?} is not available")]
    MissingCapability(Capability),
    #[error("Graphics context was lost")]
    ContextLost,
    #[error("GPU generation is not supported on this device")]
    Unsupported,
    #[error("GPU self-test produced unexpected output")]
    SelfTestMismatch,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Out of GPU memory: {0}")]
    OutOfMemory(String),
    #[error("Buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("Texture {width}x{height} exceeds the device limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("Texture unit {unit} exceeds the device limit of {max}")]
    TextureUnits { unit: u32, max: u32 },
    #[error("Resource belongs to a different graphics context")]
    ContextMismatch,
    #[error("No framebuffer bound for program '{0}'")]
    NoFramebuffer(String),
    #[error("Program '{program}' has no vertex buffer slot {slot}")]
    UnknownAttribute { program: String, slot: u32 },
    #[error("Program '{program}' drawn without data for vertex buffer slot {slot}")]
    MissingAttribute { program: String, slot: u32 },
    #[error("Program '{0}' needs a texture input")]
    MissingTexture(String),
    #[error("Uniform is {found} bytes, program '{program}' expects {expected}")]
    UniformSize {
        program: String,
        expected: u64,
        found: u64,
    },
}
