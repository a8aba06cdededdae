//! Texture → host copies.
//!
//! `copy_texture_to_buffer` needs rows padded to
//! [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`]; the padding is stripped again
//! after mapping.

use std::sync::mpsc;

use wgpu::{
    BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Maintain, MapMode, Origin3d,
    TexelCopyBufferInfo, TexelCopyBufferLayout, TexelCopyTextureInfo, TextureAspect,
};

use crate::context::GpuContext;
use crate::error::GpuError;
use crate::session::TextureHandle;

/// Row pitch of a `width`-pixel row padded for buffer copies.
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Read a 4-byte-per-pixel texture back as tightly packed rows.
///
/// Blocks until the GPU has finished all submitted work.
pub fn read_rgba(context: &GpuContext, texture: &TextureHandle) -> Result<Vec<u8>, GpuError> {
    if texture.context() != context.id() {
        return Err(GpuError::ContextMismatch);
    }
    let (width, height) = texture.size();
    let row_bytes = (width * 4) as usize;
    let padded = padded_bytes_per_row(width, 4);

    let buffer = context.device.create_buffer(&BufferDescriptor {
        label: Some("sdfgen_readback"),
        size: padded as u64 * height as u64,
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device
        .create_command_encoder(&CommandEncoderDescriptor {
            label: Some("sdfgen_readback_encoder"),
        });
    encoder.copy_texture_to_buffer(
        TexelCopyTextureInfo {
            texture: texture.texture(),
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        TexelCopyBufferInfo {
            buffer: &buffer,
            layout: TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(MapMode::Read, move |result| {
        // The receiver only disappears if this function already returned.
        let _ = tx.send(result);
    });
    let _ = context.device.poll(Maintain::Wait);

    // After a blocking poll the callback has run unless the device died.
    match rx.try_recv() {
        Ok(result) => result?,
        Err(_) => return Err(GpuError::ContextLost),
    }

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in mapped.chunks(padded as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(pixels)
}
