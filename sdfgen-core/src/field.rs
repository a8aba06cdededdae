//! Output grid and the byte encoding of signed distances.
//!
//! Encoding (shared by both backends, bit for bit):
//!
//! ```text
//! base  = clamp(1 - |d| / max_distance, 0, 1)
//! alpha = base ^ exponent / 2          (outside, d >= 0)
//! alpha = 1 - base ^ exponent / 2      (inside,  d <  0)
//! byte  = clamp(floor(alpha * 255 + 0.5), 0, 255)
//! ```
//!
//! The outline itself sits at 128; the exponent spends more of the
//! 8-bit range close to the outline.

use crate::error::SurfaceError;
use crate::surface::ChannelMask;

/// Encode a signed distance (negative = inside) as an SDF byte.
#[inline]
pub fn encode_distance(signed_distance: f64, max_distance: f64, exponent: f64) -> u8 {
    let base = (1.0 - signed_distance.abs() / max_distance).clamp(0.0, 1.0);
    let mut alpha = base.powf(exponent) / 2.0;
    if signed_distance < 0.0 {
        alpha = 1.0 - alpha;
    }
    (alpha * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8
}

/// Row-major single-channel SDF texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdfField {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl SdfField {
    /// A zeroed field (every texel "far outside").
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            let index = y as usize * self.width as usize + x as usize;
            self.data.get(index).copied()
        } else {
            None
        }
    }

    /// Expand into 4-channel pixels with the field in `channel` and zeros
    /// elsewhere; pair with [`ChannelMask::single`] so the zeros are never
    /// written.
    pub fn to_rgba(&self, channel: u8) -> Result<Vec<u8>, SurfaceError> {
        ChannelMask::single(channel)?;
        let mut rgba = vec![0u8; self.data.len() * 4];
        for (px, &value) in rgba.chunks_exact_mut(4).zip(&self.data) {
            px[channel as usize] = value;
        }
        Ok(rgba)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_indexes_without_u32_overflow() {
        // Dimensions whose texel count exceeds u32; only the first texel
        // is backed by data.
        let field = SdfField {
            width: 70_000,
            height: 70_000,
            data: vec![7],
        };
        assert_eq!(field.get(0, 0), Some(7));
        assert_eq!(field.get(69_999, 69_999), None);
        assert_eq!(field.get(70_000, 0), None);
    }

    #[test]
    fn test_edge_encodes_mid_gray() {
        assert_eq!(encode_distance(0.0, 10.0, 1.0), 128);
        assert_eq!(encode_distance(-0.0, 10.0, 1.0), 128);
        assert_eq!(encode_distance(0.0, 10.0, 3.0), 128);
    }

    #[test]
    fn test_far_distances_saturate() {
        assert_eq!(encode_distance(10.0, 10.0, 1.0), 0);
        assert_eq!(encode_distance(50.0, 10.0, 1.0), 0);
        assert_eq!(encode_distance(-50.0, 10.0, 1.0), 255);
        assert_eq!(encode_distance(f64::INFINITY, 10.0, 2.5), 0);
        assert_eq!(encode_distance(-50.0, 10.0, 2.5), 255);
    }

    #[test]
    fn test_remap_is_symmetric_around_edge() {
        for d in [0.5, 1.0, 2.0, 7.25] {
            let outside = encode_distance(d, 8.0, 1.0) as i32;
            let inside = encode_distance(-d, 8.0, 1.0) as i32;
            assert!((outside + inside - 255).abs() <= 1, "d = {d}");
            assert!(outside < 128 && inside > 128);
        }
    }

    #[test]
    fn test_exponent_sharpens_near_edge() {
        // Higher exponent → values fall off faster away from the edge.
        assert!(encode_distance(2.0, 8.0, 2.0) < encode_distance(2.0, 8.0, 1.0));
        assert!(encode_distance(-2.0, 8.0, 2.0) > encode_distance(-2.0, 8.0, 1.0));
    }

    #[test]
    fn test_field_get() {
        let mut field = SdfField::new(3, 2);
        field.data[4] = 9;
        assert_eq!(field.get(1, 1), Some(9));
        assert_eq!(field.get(3, 0), None);
        assert_eq!(field.get(0, 2), None);
    }

    #[test]
    fn test_to_rgba_places_channel() {
        let field = SdfField {
            width: 2,
            height: 1,
            data: vec![10, 20],
        };
        assert_eq!(field.to_rgba(2).unwrap(), vec![0, 0, 10, 0, 0, 0, 20, 0]);
        assert_eq!(
            field.to_rgba(4).unwrap_err(),
            SurfaceError::InvalidChannel(4)
        );
    }
}
