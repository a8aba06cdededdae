//! GPU vertex, instance and uniform data types.
//!
//! All types derive `bytemuck::Pod` + `Zeroable` for zero-copy upload
//! to GPU buffers.

use bytemuck::{Pod, Zeroable};
use sdfgen_core::{LineSegment, ResolvedParams};
use wgpu::{BufferAddress, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode};

// ───────────────────────────────────────────────────────────────────
// Vertex (full-viewport triangle)
// ───────────────────────────────────────────────────────────────────

/// A corner of the oversized triangle that covers the whole viewport.
///
/// The vertex shader maps `uv` to clip space as `uv * 2 - 1`, so the
/// triangle spans (-1,-1) → (3,-1) → (-1,3).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ViewportVertex {
    pub uv: [f32; 2],
}

impl ViewportVertex {
    pub const TRIANGLE: [ViewportVertex; 3] = [
        ViewportVertex { uv: [0.0, 0.0] },
        ViewportVertex { uv: [2.0, 0.0] },
        ViewportVertex { uv: [0.0, 2.0] },
    ];

    pub fn layout() -> VertexBufferLayout<'static> {
        static ATTRS: &[VertexAttribute] = &[
            // location(0) = uv
            VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: VertexFormat::Float32x2,
            },
        ];
        VertexBufferLayout {
            array_stride: std::mem::size_of::<ViewportVertex>() as BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: ATTRS,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Instance data
// ───────────────────────────────────────────────────────────────────

/// One outline segment; the accumulation pass draws one instance each.
///
/// 16 bytes per instance.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SegmentInstance {
    pub start: [f32; 2],
    pub end: [f32; 2],
}

impl SegmentInstance {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            start: [x1, y1],
            end: [x2, y2],
        }
    }

    pub fn from_segment(seg: &LineSegment) -> Self {
        Self::new(seg.x1 as f32, seg.y1 as f32, seg.x2 as f32, seg.y2 as f32)
    }

    pub fn layout() -> VertexBufferLayout<'static> {
        static ATTRS: &[VertexAttribute] = &[
            // location(1) = start
            VertexAttribute {
                offset: 0,
                shader_location: 1,
                format: VertexFormat::Float32x2,
            },
            // location(2) = end
            VertexAttribute {
                offset: 8,
                shader_location: 2,
                format: VertexFormat::Float32x2,
            },
        ];
        VertexBufferLayout {
            array_stride: std::mem::size_of::<SegmentInstance>() as BufferAddress,
            step_mode: VertexStepMode::Instance,
            attributes: ATTRS,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Uniforms
// ───────────────────────────────────────────────────────────────────

/// Accumulation pass parameters. 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SdfUniforms {
    /// `[min_x, min_y, max_x, max_y]` in outline units.
    pub view_box: [f32; 4],
    /// SDF size in texels.
    pub size: [f32; 2],
    pub max_distance: f32,
    pub exponent: f32,
}

impl SdfUniforms {
    pub fn from_params(params: &ResolvedParams) -> Self {
        let vb = params.view_box();
        Self {
            view_box: [vb.min_x as f32, vb.min_y as f32, vb.max_x as f32, vb.max_y as f32],
            size: [params.width() as f32, params.height() as f32],
            max_distance: params.max_distance() as f32,
            exponent: params.exponent() as f32,
        }
    }
}

/// Resolve/copy pass parameters: where in the destination the SDF
/// starts. 16 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PlacementUniforms {
    pub origin: [f32; 2],
    pub _pad: [f32; 2],
}

impl PlacementUniforms {
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            origin: [x as f32, y as f32],
            _pad: [0.0; 2],
        }
    }
}

// ===================================================================
// Tests
// ===================================================================
