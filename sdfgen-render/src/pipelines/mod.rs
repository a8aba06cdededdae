//! Program sources for the SDF passes.
//!
//! Each module describes one program (WGSL plus vertex layouts, uniform
//! size and color target) for [`crate::session::GpuSession::with_program`]
//! to compile and cache.

pub mod accumulate;
pub mod copy;
pub mod resolve;

use sdfgen_core::ChannelMask;
use wgpu::ColorWrites;

pub(crate) fn color_writes(mask: ChannelMask) -> ColorWrites {
    ColorWrites::from_bits_truncate(mask.bits() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_writes_match_mask_bits() {
        assert_eq!(color_writes(ChannelMask::R), ColorWrites::RED);
        assert_eq!(color_writes(ChannelMask::G), ColorWrites::GREEN);
        assert_eq!(color_writes(ChannelMask::B), ColorWrites::BLUE);
        assert_eq!(color_writes(ChannelMask::A), ColorWrites::ALPHA);
        assert_eq!(color_writes(ChannelMask::ALL), ColorWrites::ALL);
    }
}
