//! Accumulation pass: one full-viewport triangle per outline segment.
//!
//! Blending performs the per-texel reduction over all segments:
//!
//! | channel | value                          | blend |
//! |---------|--------------------------------|-------|
//! | r       | outside code of this segment   | max   |
//! | g       | negated inside code            | max   |
//! | a       | ray crossing (-1, 0, +1)       | add   |
//!
//! The target is cleared to [`CLEAR`] so the first segment always wins
//! both max reductions.

use std::mem::size_of;

use wgpu::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, Color, ColorTargetState,
    ColorWrites, TextureFormat, TextureUsages,
};

use crate::session::{ProgramSource, TextureSpec};
use crate::vertex::{SdfUniforms, SegmentInstance, ViewportVertex};

pub const NAME: &str = "sdf_accumulate";

/// Cache key of the intermediate target.
pub const TARGET: &str = "sdf_accumulation";

pub const FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Lowest outside code, lowest negated inside code, zero winding.
pub const CLEAR: Color = Color {
    r: 0.0,
    g: -255.0,
    b: 0.0,
    a: 0.0,
};

const BLEND: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Max,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
};

pub fn source() -> ProgramSource {
    ProgramSource {
        label: "sdf_accumulate_shader",
        wgsl: include_str!("../shaders/accumulate.wgsl"),
        vertex_buffers: vec![ViewportVertex::layout(), SegmentInstance::layout()],
        uniform_size: size_of::<SdfUniforms>() as u64,
        texture_input: false,
        target: ColorTargetState {
            format: FORMAT,
            blend: Some(BLEND),
            write_mask: ColorWrites::ALL,
        },
    }
}

pub fn target_spec(width: u32, height: u32) -> TextureSpec {
    TextureSpec::new(
        width,
        height,
        FORMAT,
        TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
    )
}
