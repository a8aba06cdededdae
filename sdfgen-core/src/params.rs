//! Generation parameters and generator configuration.
//!
//! [`SdfParams`] is what callers fill in; [`SdfParams::resolve`]
//! validates it once and fills in defaults, producing the
//! [`ResolvedParams`] that every backend consumes. Backends never see
//! unvalidated input.

use serde::{Deserialize, Serialize};

use crate::error::SdfError;
use crate::path::DEFAULT_CURVE_SUBDIVISIONS;

/// Outline-space rectangle aligned with the texture edges.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ViewBox {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Outline-space coordinates of the center of texel `(col, row)` in a
    /// `width × height` grid.
    #[inline]
    pub fn texel_center(&self, col: u32, row: u32, width: u32, height: u32) -> (f64, f64) {
        (
            self.min_x + self.width() * (col as f64 + 0.5) / width as f64,
            self.min_y + self.height() * (row as f64 + 0.5) / height as f64,
        )
    }

    fn validate(&self) -> Result<(), SdfError> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.width() <= 0.0 || self.height() <= 0.0 {
            return Err(SdfError::InvalidViewBox {
                min_x: self.min_x,
                min_y: self.min_y,
                max_x: self.max_x,
                max_y: self.max_y,
            });
        }
        Ok(())
    }
}

impl From<[f64; 4]> for ViewBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Caller-facing parameters of one generation call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SdfParams {
    pub width: u32,
    pub height: u32,
    pub view_box: ViewBox,
    /// Largest encoded distance in outline units. `None` means half the
    /// larger view box dimension.
    #[serde(default)]
    pub max_distance: Option<f64>,
    /// Exponent of the distance remap; higher values spend more of the
    /// byte range near the outline.
    #[serde(default = "default_exponent")]
    pub exponent: f64,
}

fn default_exponent() -> f64 {
    1.0
}

impl SdfParams {
    pub fn new(width: u32, height: u32, view_box: impl Into<ViewBox>) -> Self {
        Self {
            width,
            height,
            view_box: view_box.into(),
            max_distance: None,
            exponent: default_exponent(),
        }
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = Some(max_distance);
        self
    }

    pub fn with_exponent(mut self, exponent: f64) -> Self {
        self.exponent = exponent;
        self
    }

    /// Load parameters from JSON, e.g.
    /// `{"width":64,"height":64,"view_box":{"min_x":0,…},"exponent":2}`.
    pub fn from_json(json: &str) -> Result<Self, SdfError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate and apply defaults.
    pub fn resolve(&self) -> Result<ResolvedParams, SdfError> {
        if self.width == 0 || self.height == 0 {
            return Err(SdfError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        self.view_box.validate()?;

        let max_distance = self
            .max_distance
            .unwrap_or_else(|| self.view_box.width().max(self.view_box.height()) / 2.0);
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return Err(SdfError::InvalidMaxDistance(max_distance));
        }
        if !(self.exponent.is_finite() && self.exponent > 0.0) {
            return Err(SdfError::InvalidExponent(self.exponent));
        }

        Ok(ResolvedParams {
            width: self.width,
            height: self.height,
            view_box: self.view_box,
            max_distance,
            exponent: self.exponent,
        })
    }
}

/// Validated parameters with every default filled in.
///
/// Only obtainable through [`SdfParams::resolve`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedParams {
    width: u32,
    height: u32,
    view_box: ViewBox,
    max_distance: f64,
    exponent: f64,
}

impl ResolvedParams {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view_box(&self) -> ViewBox {
        self.view_box
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Generator-wide settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Attempt the GPU backend before falling back to the CPU.
    pub prefer_gpu: bool,
    /// Evaluated points per Bezier curve when parsing path strings.
    pub curve_subdivisions: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            prefer_gpu: true,
            curve_subdivisions: DEFAULT_CURVE_SUBDIVISIONS,
        }
    }
}

impl GeneratorConfig {
    pub fn cpu_only() -> Self {
        Self {
            prefer_gpu: false,
            ..Self::default()
        }
    }

    pub fn with_curve_subdivisions(mut self, subdivisions: usize) -> Self {
        self.curve_subdivisions = subdivisions;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, SdfError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_distance_is_half_larger_extent() {
        let p = SdfParams::new(8, 8, [0.0, 0.0, 64.0, 32.0]).resolve().unwrap();
        assert_eq!(p.max_distance(), 32.0);
        assert_eq!(p.exponent(), 1.0);
        assert_eq!(p.texel_count(), 64);
    }

    #[test]
    fn test_explicit_values_kept() {
        let p = SdfParams::new(4, 2, [-2.0, -2.0, 6.0, 6.0])
            .with_max_distance(4.0)
            .with_exponent(3.0)
            .resolve()
            .unwrap();
        assert_eq!((p.width(), p.height()), (4, 2));
        assert_eq!(p.max_distance(), 4.0);
        assert_eq!(p.exponent(), 3.0);
        assert_eq!(p.view_box(), ViewBox::new(-2.0, -2.0, 6.0, 6.0));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = SdfParams::new(0, 4, [0.0, 0.0, 1.0, 1.0]).resolve().unwrap_err();
        assert_eq!(err, SdfError::InvalidDimensions { width: 0, height: 4 });
    }

    #[test]
    fn test_degenerate_view_box_rejected() {
        for vb in [
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, -1.0],
            [0.0, f64::NAN, 1.0, 1.0],
            [0.0, 0.0, f64::INFINITY, 1.0],
        ] {
            let err = SdfParams::new(4, 4, vb).resolve().unwrap_err();
            assert!(matches!(err, SdfError::InvalidViewBox { .. }), "{vb:?}");
        }
    }

    #[test]
    fn test_bad_distance_and_exponent_rejected() {
        let base = SdfParams::new(4, 4, [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(
            base.with_max_distance(0.0).resolve().unwrap_err(),
            SdfError::InvalidMaxDistance(0.0)
        );
        assert_eq!(
            base.with_exponent(-1.0).resolve().unwrap_err(),
            SdfError::InvalidExponent(-1.0)
        );
    }

    #[test]
    fn test_texel_center_mapping() {
        let vb = ViewBox::new(0.0, 0.0, 64.0, 64.0);
        assert_eq!(vb.texel_center(0, 0, 4, 4), (8.0, 8.0));
        assert_eq!(vb.texel_center(3, 1, 4, 4), (56.0, 24.0));
    }

    #[test]
    fn test_params_from_json_defaults() {
        let p = SdfParams::from_json(
            r#"{"width":5,"height":5,"view_box":{"min_x":-2,"min_y":-2,"max_x":6,"max_y":6}}"#,
        )
        .unwrap();
        assert_eq!(p.max_distance, None);
        assert_eq!(p.exponent, 1.0);
        assert_eq!(p.resolve().unwrap().max_distance(), 4.0);
    }

    #[test]
    fn test_params_from_json_invalid() {
        assert!(matches!(
            SdfParams::from_json("{\"width\":5}").unwrap_err(),
            SdfError::Config(_)
        ));
    }

    #[test]
    fn test_generator_config() {
        let cfg = GeneratorConfig::from_json(r#"{"prefer_gpu":false}"#).unwrap();
        assert!(!cfg.prefer_gpu);
        assert_eq!(cfg.curve_subdivisions, DEFAULT_CURVE_SUBDIVISIONS);
        assert_eq!(cfg, GeneratorConfig::cpu_only());
        assert_eq!(
            GeneratorConfig::default().with_curve_subdivisions(8).curve_subdivisions,
            8
        );
    }
}
