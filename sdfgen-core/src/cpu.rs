//! Reference CPU rasterizer.
//!
//! For every texel center the nearest segment is found by a brute-force
//! scan that walks the `max_x`-sorted outline backwards and stops as soon
//! as no remaining segment can beat the best distance so far. The sign
//! comes from the nonzero winding number of a ray cast towards +x.

use crate::error::SdfError;
use crate::field::{encode_distance, SdfField};
use crate::outline::Outline;
use crate::params::{ResolvedParams, SdfParams};

/// Rasterize `outline` into a field described by `params`.
///
/// An empty outline has no nearest segment and encodes as 0 everywhere.
pub fn generate(params: &ResolvedParams, outline: &Outline) -> SdfField {
    let (width, height) = (params.width(), params.height());
    let view_box = params.view_box();
    let mut field = SdfField::new(width, height);
    if outline.is_empty() {
        return field;
    }
    log::trace!("CPU rasterizing {} segments into {width}x{height}", outline.len());

    let mut i = 0;
    for row in 0..height {
        for col in 0..width {
            let (x, y) = view_box.texel_center(col, row, width, height);
            let mut distance = nearest_distance(outline, x, y);
            if is_inside(outline, x, y) {
                distance = -distance;
            }
            field.data[i] = encode_distance(distance, params.max_distance(), params.exponent());
            i += 1;
        }
    }
    field
}

/// Validate `params`, parse `path` and rasterize it.
pub fn generate_path(params: &SdfParams, path: &str) -> Result<SdfField, SdfError> {
    let resolved = params.resolve()?;
    let outline = Outline::parse(path)?;
    Ok(generate(&resolved, &outline))
}

/// Unsigned distance from `(x, y)` to the nearest segment
/// (`f64::INFINITY` for an empty outline).
pub fn nearest_distance(outline: &Outline, x: f64, y: f64) -> f64 {
    let mut best_sq = f64::INFINITY;
    let mut best = f64::INFINITY;
    for seg in outline.segments().iter().rev() {
        // Sorted by max_x: everything before this is even further left.
        if seg.max_x + best <= x {
            break;
        }
        if x + best > seg.min_x && y - best < seg.max_y && y + best > seg.min_y {
            let d_sq = seg.distance_sq(x, y);
            if d_sq < best_sq {
                best_sq = d_sq;
                best = d_sq.sqrt();
            }
        }
    }
    best
}

/// Signed winding number of the outline around `(x, y)`.
pub fn winding(outline: &Outline, x: f64, y: f64) -> i32 {
    let mut total = 0;
    for seg in outline.segments().iter().rev() {
        if seg.max_x <= x {
            break;
        }
        total += seg.ray_crossing(x, y);
    }
    total
}

/// Nonzero fill rule.
pub fn is_inside(outline: &Outline, x: f64, y: f64) -> bool {
    winding(outline, x, y) != 0
}

// ===================================================================
// Tests
// ===================================================================
