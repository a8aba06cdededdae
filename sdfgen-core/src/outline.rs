//! Flattened outlines: straight line segments sorted by `max_x`.
//!
//! Both rasterizer backends rely on the ascending `max_x` order to cut
//! their scans short: walking the list backwards, once a segment's
//! `max_x` falls behind the query point nothing earlier can matter.

use std::str::FromStr;

use crate::error::PathError;
use crate::params::ViewBox;
use crate::path::{self, PathCommand, Point, DEFAULT_CURVE_SUBDIVISIONS};

/// A straight edge of the outline with its precomputed bounds.
///
/// Build through [`LineSegment::new`] so the bounds match the endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl LineSegment {
    pub fn new(start: Point, end: Point) -> Self {
        Self::from_coords(start.x, start.y, end.x, end.y)
    }

    pub fn from_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Squared distance from `(x, y)` to the closest point of the segment.
    #[inline]
    pub fn distance_sq(&self, x: f64, y: f64) -> f64 {
        let ldx = self.x2 - self.x1;
        let ldy = self.y2 - self.y1;
        let length_sq = ldx * ldx + ldy * ldy;
        let t = if length_sq != 0.0 {
            (((x - self.x1) * ldx + (y - self.y1) * ldy) / length_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let dx = x - (self.x1 + t * ldx);
        let dy = y - (self.y1 + t * ldy);
        dx * dx + dy * dy
    }

    /// Winding contribution of this segment to a ray cast from `(x, y)`
    /// towards +x: `+1` for an upward (y-increasing) crossing, `-1` for a
    /// downward one, `0` if it does not cross.
    #[inline]
    pub fn ray_crossing(&self, x: f64, y: f64) -> i32 {
        let straddles = (self.y1 > y) != (self.y2 > y);
        if straddles && x < (self.x2 - self.x1) * (y - self.y1) / (self.y2 - self.y1) + self.x1 {
            if self.y1 < self.y2 {
                1
            } else {
                -1
            }
        } else {
            0
        }
    }
}

/// An outline ready for rasterization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outline {
    segments: Vec<LineSegment>,
}

impl Outline {
    /// Wrap pre-flattened segments, sorting them by `max_x`.
    pub fn from_segments(mut segments: Vec<LineSegment>) -> Self {
        segments.sort_by(|a, b| a.max_x.total_cmp(&b.max_x));
        Self { segments }
    }

    pub fn from_commands(commands: &[PathCommand], subdivisions: usize) -> Result<Self, PathError> {
        path::flatten(commands, subdivisions)
    }

    /// Parse and flatten a path string with the default curve subdivisions.
    pub fn parse(path_str: &str) -> Result<Self, PathError> {
        Self::parse_with(path_str, DEFAULT_CURVE_SUBDIVISIONS)
    }

    pub fn parse_with(path_str: &str, subdivisions: usize) -> Result<Self, PathError> {
        let commands = path::parse_path(path_str)?;
        path::flatten(&commands, subdivisions)
    }

    /// Segments in ascending `max_x` order.
    pub fn segments(&self) -> &[LineSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Tight bounds of all segments, or `None` for an empty or
    /// zero-area outline.
    pub fn bounds(&self) -> Option<ViewBox> {
        let first = self.segments.first()?;
        let mut vb = ViewBox::new(first.min_x, first.min_y, first.max_x, first.max_y);
        for s in &self.segments[1..] {
            vb.min_x = vb.min_x.min(s.min_x);
            vb.min_y = vb.min_y.min(s.min_y);
            vb.max_x = vb.max_x.max(s.max_x);
            vb.max_y = vb.max_y.max(s.max_y);
        }
        (vb.width() > 0.0 && vb.height() > 0.0).then_some(vb)
    }
}

impl FromStr for Outline {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_bounds() {
        let s = LineSegment::from_coords(10.0, -2.0, 3.0, 7.0);
        assert_eq!((s.min_x, s.min_y, s.max_x, s.max_y), (3.0, -2.0, 10.0, 7.0));
    }

    #[test]
    fn test_distance_sq_projection_and_endpoints() {
        let s = LineSegment::from_coords(0.0, 0.0, 10.0, 0.0);
        assert_eq!(s.distance_sq(5.0, 3.0), 9.0);
        assert_eq!(s.distance_sq(-3.0, 4.0), 25.0);
        assert_eq!(s.distance_sq(13.0, 4.0), 25.0);
        assert_eq!(s.distance_sq(7.0, 0.0), 0.0);
    }

    #[test]
    fn test_distance_sq_degenerate_segment() {
        let s = LineSegment::from_coords(1.0, 1.0, 1.0, 1.0);
        assert_eq!(s.distance_sq(4.0, 5.0), 25.0);
    }

    #[test]
    fn test_ray_crossing_direction() {
        let up = LineSegment::from_coords(5.0, 0.0, 5.0, 10.0);
        let down = LineSegment::from_coords(5.0, 10.0, 5.0, 0.0);
        assert_eq!(up.ray_crossing(0.0, 5.0), 1);
        assert_eq!(down.ray_crossing(0.0, 5.0), -1);
        // Ray starts right of the segment.
        assert_eq!(up.ray_crossing(6.0, 5.0), 0);
        // Horizontal segments never cross.
        let flat = LineSegment::from_coords(0.0, 5.0, 10.0, 5.0);
        assert_eq!(flat.ray_crossing(-1.0, 5.0), 0);
    }

    #[test]
    fn test_ray_crossing_half_open_at_vertices() {
        // Two segments meeting at y = 5 must count the vertex once.
        let a = LineSegment::from_coords(5.0, 0.0, 5.0, 5.0);
        let b = LineSegment::from_coords(5.0, 5.0, 5.0, 10.0);
        assert_eq!(a.ray_crossing(0.0, 5.0) + b.ray_crossing(0.0, 5.0), 1);
    }

    #[test]
    fn test_from_segments_sorts() {
        let outline = Outline::from_segments(vec![
            LineSegment::from_coords(0.0, 0.0, 9.0, 0.0),
            LineSegment::from_coords(0.0, 0.0, 1.0, 0.0),
            LineSegment::from_coords(5.0, 0.0, 4.0, 0.0),
        ]);
        let max: Vec<f64> = outline.segments().iter().map(|s| s.max_x).collect();
        assert_eq!(max, vec![1.0, 5.0, 9.0]);
    }

    #[test]
    fn test_parse_and_from_str() {
        let a = Outline::parse("M0,0 L64,64 L0,64 Z").unwrap();
        let b: Outline = "M0,0 L64,64 L0,64 Z".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_bounds() {
        let outline = Outline::parse("M2,0 Q4,0,4,2 Q4,4,2,4 Q0,4,0,2 Q0,0,2,0").unwrap();
        let vb = outline.bounds().unwrap();
        assert_eq!((vb.min_x, vb.min_y, vb.max_x, vb.max_y), (0.0, 0.0, 4.0, 4.0));
        assert!(Outline::default().bounds().is_none());
        assert!(Outline::parse("M0,0 L5,0").unwrap().bounds().is_none());
    }
}
