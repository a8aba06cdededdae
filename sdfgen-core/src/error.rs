//! Input errors.
//!
//! Everything in here is the caller's fault: a malformed outline, a
//! degenerate view box, a destination rectangle that does not fit. These
//! fail the call synchronously and are never retried on another backend.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Unknown path command '{command}' at offset {offset}")]
    UnknownCommand { command: char, offset: usize },
    #[error("Unexpected text before first command at offset {offset}")]
    MissingCommand { offset: usize },
    #[error("Command '{command}' expects {expected} arguments, found {found}")]
    ArgumentCount {
        command: char,
        expected: usize,
        found: usize,
    },
    #[error("Invalid number {token:?} in command '{command}'")]
    InvalidNumber { command: char, token: String },
    #[error("Command '{command}' has no current point (path must start with M)")]
    NoCurrentPoint { command: char },
    #[error("Curve subdivisions must be at least 2, got {0}")]
    InvalidSubdivisions(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Channel index {0} out of range (expected 0..4)")]
    InvalidChannel(u8),
    #[error("Region {width}x{height} at ({x}, {y}) exceeds surface {surface_width}x{surface_height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        surface_width: u32,
        surface_height: u32,
    },
    #[error("Pixel data has {found} bytes, expected {expected}")]
    DataLength { expected: usize, found: usize },
    #[error("Surface belongs to a different graphics context")]
    ContextMismatch,
    #[error("Surface write failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdfError {
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),
    #[error("SDF dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("View box [{min_x}, {min_y}, {max_x}, {max_y}] must have positive finite extents")]
    InvalidViewBox {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
    #[error("Max distance must be positive and finite, got {0}")]
    InvalidMaxDistance(f64),
    #[error("Exponent must be positive and finite, got {0}")]
    InvalidExponent(f64),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for SdfError {
    fn from(e: serde_json::Error) -> Self {
        SdfError::Config(e.to_string())
    }
}
