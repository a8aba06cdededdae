//! Copy pass: draws uploaded RGBA pixels into a destination rectangle
//! through a channel write mask. Used to place CPU-generated fields on a
//! GPU surface.

use std::mem::size_of;

use sdfgen_core::ChannelMask;
use wgpu::{ColorTargetState, TextureFormat, TextureUsages};

use super::color_writes;
use crate::session::{ProgramSource, TextureSpec};
use crate::vertex::{PlacementUniforms, ViewportVertex};

/// Cache key of the staging texture.
pub const UPLOAD: &str = "sdf_upload";

pub fn program_name(mask: ChannelMask) -> String {
    format!("sdf_copy_{}", mask.bits())
}

pub fn source(mask: ChannelMask) -> ProgramSource {
    ProgramSource {
        label: "sdf_copy_shader",
        wgsl: include_str!("../shaders/copy.wgsl"),
        vertex_buffers: vec![ViewportVertex::layout()],
        uniform_size: size_of::<PlacementUniforms>() as u64,
        texture_input: true,
        target: ColorTargetState {
            format: TextureFormat::Rgba8Unorm,
            blend: None,
            write_mask: color_writes(mask),
        },
    }
}

pub fn upload_spec(width: u32, height: u32) -> TextureSpec {
    TextureSpec::new(
        width,
        height,
        TextureFormat::Rgba8Unorm,
        TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
    )
}
