//! Destination surfaces.
//!
//! A [`SurfaceSink`] accepts rectangular writes of 4-channel 8-bit pixels
//! through a [`ChannelMask`]. Channels outside the mask and pixels outside
//! the rectangle are left untouched, which lets several SDFs share one
//! RGBA texture (one per channel, or tiled at offsets).

use crate::error::SurfaceError;

/// Per-channel write mask. Bit layout matches `wgpu::ColorWrites`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelMask(u8);

impl ChannelMask {
    pub const R: Self = Self(1);
    pub const G: Self = Self(2);
    pub const B: Self = Self(4);
    pub const A: Self = Self(8);
    pub const ALL: Self = Self(15);

    /// Mask selecting only channel `index` (0 = red … 3 = alpha).
    pub fn single(index: u8) -> Result<Self, SurfaceError> {
        if index < 4 {
            Ok(Self(1 << index))
        } else {
            Err(SurfaceError::InvalidChannel(index))
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, index: usize) -> bool {
        index < 4 && self.0 & (1 << index) != 0
    }
}

/// Anything that can take a masked RGBA region write.
pub trait SurfaceSink {
    /// `(width, height)` in pixels.
    fn size(&self) -> (u32, u32);

    /// Write `width × height` RGBA8 pixels (`rgba`, row-major, tightly
    /// packed) at `(x, y)`, touching only the channels in `mask`.
    fn write_rgba(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        rgba: &[u8],
        mask: ChannelMask,
    ) -> Result<(), SurfaceError>;
}

/// Validate a write region against a surface size and the pixel buffer.
pub fn check_region(
    surface: (u32, u32),
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    data_len: usize,
) -> Result<(), SurfaceError> {
    let fits_x = x.checked_add(width).is_some_and(|r| r <= surface.0);
    let fits_y = y.checked_add(height).is_some_and(|b| b <= surface.1);
    if !fits_x || !fits_y {
        return Err(SurfaceError::OutOfBounds {
            x,
            y,
            width,
            height,
            surface_width: surface.0,
            surface_height: surface.1,
        });
    }
    let expected = width as usize * height as usize * 4;
    if data_len != expected {
        return Err(SurfaceError::DataLength {
            expected,
            found: data_len,
        });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// RgbaImage
// ─────────────────────────────────────────────────────────────────────

/// CPU-resident RGBA8 image, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbaImage {
    /// Transparent black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0; 4])
    }

    pub fn filled(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let data = pixel.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = pixel_offset(x, y, self.width);
        let mut px = [0u8; 4];
        px.copy_from_slice(self.data.get(i..i + 4)?);
        Some(px)
    }

    /// Extract one channel as a row-major byte grid.
    pub fn channel(&self, index: usize) -> Vec<u8> {
        self.data.iter().skip(index).step_by(4).copied().collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Byte offset of pixel `(x, y)` in tightly packed RGBA8 rows.
fn pixel_offset(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

impl SurfaceSink for RgbaImage {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn write_rgba(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        rgba: &[u8],
        mask: ChannelMask,
    ) -> Result<(), SurfaceError> {
        check_region(self.size(), x, y, width, height, rgba.len())?;

        for row in 0..height {
            for col in 0..width {
                let src = pixel_offset(col, row, width);
                let dst = pixel_offset(x + col, y + row, self.width);
                for c in 0..4 {
                    if mask.contains(c) {
                        self.data[dst + c] = rgba[src + c];
                    }
                }
            }
        }
        Ok(())
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_offset_exceeds_u32() {
        assert_eq!(pixel_offset(3, 1, 4), 28);
        let far = pixel_offset(69_999, 69_999, 70_000) as u64;
        assert_eq!(far, (69_999u64 * 70_000 + 69_999) * 4);
        assert!(far > u64::from(u32::MAX));
    }

    #[test]
    fn test_channel_mask_bits() {
        assert_eq!(ChannelMask::single(0).unwrap(), ChannelMask::R);
        assert_eq!(ChannelMask::single(3).unwrap().bits(), 8);
        assert_eq!(ChannelMask::single(4), Err(SurfaceError::InvalidChannel(4)));
        assert!(ChannelMask::ALL.contains(2));
        assert!(!ChannelMask::G.contains(0));
        assert!(!ChannelMask::ALL.contains(4));
    }

    #[test]
    fn test_masked_write_preserves_other_channels() {
        let mut img = RgbaImage::filled(4, 4, [1, 2, 3, 4]);
        let src = [200u8, 201, 202, 203].repeat(4);
        img.write_rgba(1, 2, 2, 2, &src, ChannelMask::B).unwrap();

        assert_eq!(img.pixel(1, 2), Some([1, 2, 202, 4]));
        assert_eq!(img.pixel(2, 3), Some([1, 2, 202, 4]));
        // Outside the rectangle.
        assert_eq!(img.pixel(0, 2), Some([1, 2, 3, 4]));
        assert_eq!(img.pixel(3, 3), Some([1, 2, 3, 4]));
        assert_eq!(img.pixel(1, 1), Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_channel_extract() {
        let mut img = RgbaImage::new(2, 1);
        img.write_rgba(0, 0, 2, 1, &[9, 0, 0, 0, 7, 0, 0, 0], ChannelMask::R)
            .unwrap();
        assert_eq!(img.channel(0), vec![9, 7]);
        assert_eq!(img.channel(1), vec![0, 0]);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut img = RgbaImage::new(4, 4);
        let err = img
            .write_rgba(3, 0, 2, 1, &[0; 8], ChannelMask::ALL)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::OutOfBounds { x: 3, .. }));
        // Overflowing offsets must not wrap around.
        assert!(img
            .write_rgba(u32::MAX, 0, 2, 1, &[0; 8], ChannelMask::ALL)
            .is_err());
    }

    #[test]
    fn test_data_length_checked() {
        let mut img = RgbaImage::new(4, 4);
        let err = img.write_rgba(0, 0, 2, 2, &[0; 12], ChannelMask::R).unwrap_err();
        assert_eq!(
            err,
            SurfaceError::DataLength {
                expected: 16,
                found: 12
            }
        );
    }
}
