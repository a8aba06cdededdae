//! Resolve pass: picks the inside or outside code per texel and writes
//! it into one channel of the destination.
//!
//! Draws a full-viewport triangle restricted by viewport and scissor to
//! the destination rectangle; the color write mask keeps every other
//! channel intact.

use std::mem::size_of;

use sdfgen_core::ChannelMask;
use wgpu::{ColorTargetState, TextureFormat};

use super::color_writes;
use crate::session::ProgramSource;
use crate::vertex::{PlacementUniforms, ViewportVertex};

/// One program per write mask, since the mask is pipeline state.
pub fn program_name(mask: ChannelMask) -> String {
    format!("sdf_resolve_{}", mask.bits())
}

pub fn source(mask: ChannelMask) -> ProgramSource {
    ProgramSource {
        label: "sdf_resolve_shader",
        wgsl: include_str!("../shaders/resolve.wgsl"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::ColorWrites;

    #[test]
    fn test_program_name_per_mask() {
        assert_eq!(program_name(ChannelMask::R), "sdf_resolve_1");
        assert_ne!(program_name(ChannelMask::G), program_name(ChannelMask::B));
    }

    #[test]
    fn test_source_masks_writes() {
        let src = source(ChannelMask::A);
        assert_eq!(src.target.write_mask, ColorWrites::ALPHA);
        assert!(src.texture_input);
        assert_eq!(src.uniform_size, 16);
    }
}
