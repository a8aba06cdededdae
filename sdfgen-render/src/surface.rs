//! GPU-resident destination surfaces.
//!
//! A [`GpuSurface`] is an `Rgba8Unorm` texture owned by the caller. SDFs
//! land in it either straight from the resolve pass or, after a CPU
//! fallback, through [`SurfaceWriter`], which stages the pixels and
//! draws them with the copy program under the same channel mask.

use sdfgen_core::surface::check_region;
use sdfgen_core::{ChannelMask, SurfaceError, SurfaceSink};
use wgpu::{TextureFormat, TextureUsages};

use crate::context::{ContextId, GpuContext};
use crate::error::GpuError;
use crate::pipelines::copy;
use crate::readback;
use crate::session::{DrawCall, GpuSession, TextureHandle, TextureSpec, Viewport};
use crate::vertex::{PlacementUniforms, ViewportVertex};

/// Caller-owned RGBA8 render target.
#[derive(Clone, Debug)]
pub struct GpuSurface {
    texture: TextureHandle,
}

impl GpuSurface {
    pub const FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

    /// Create a zero-initialized surface on `context`.
    pub fn new(context: &GpuContext, width: u32, height: u32) -> Result<Self, GpuError> {
        let texture = TextureHandle::create(context, "sdf_surface", Self::spec(width, height))?;
        Ok(Self { texture })
    }

    /// Texture spec every destination surface uses.
    pub fn spec(width: u32, height: u32) -> TextureSpec {
        TextureSpec::new(
            width,
            height,
            Self::FORMAT,
            TextureUsages::RENDER_ATTACHMENT
                | TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_SRC
                | TextureUsages::COPY_DST,
        )
    }

    pub fn width(&self) -> u32 {
        self.texture.size().0
    }

    pub fn height(&self) -> u32 {
        self.texture.size().1
    }

    pub fn size(&self) -> (u32, u32) {
        self.texture.size()
    }

    pub fn context(&self) -> ContextId {
        self.texture.context()
    }

    pub fn texture(&self) -> &TextureHandle {
        &self.texture
    }

    /// Overwrite the whole surface with `rgba`.
    pub fn upload_rgba(&self, context: &GpuContext, rgba: &[u8]) -> Result<(), SurfaceError> {
        let (width, height) = self.size();
        check_region(self.size(), 0, 0, width, height, rgba.len())?;
        self.texture
            .write_rgba(context, rgba)
            .map_err(|e| SurfaceError::Backend(e.to_string()))
    }

    /// Read the whole surface back as RGBA8 rows.
    pub fn read_rgba(&self, context: &GpuContext) -> Result<Vec<u8>, GpuError> {
        readback::read_rgba(context, &self.texture)
    }
}

/// [`SurfaceSink`] over a [`GpuSurface`], drawing through the session.
pub struct SurfaceWriter<'a> {
    session: &'a mut GpuSession,
    surface: &'a GpuSurface,
}

impl<'a> SurfaceWriter<'a> {
    pub fn new(session: &'a mut GpuSession, surface: &'a GpuSurface) -> Self {
        Self { session, surface }
    }

    fn copy_region(
        &mut self,
        viewport: Viewport,
        rgba: &[u8],
        mask: ChannelMask,
    ) -> Result<(), GpuError> {
        let surface = self.surface;
        self.session.scoped(|session| {
            let spec = copy::upload_spec(viewport.width, viewport.height);
            session.with_texture(copy::UPLOAD, spec, |scope| {
                let staged = scope.texture().clone();
                staged.write_rgba(scope.context(), rgba)?;
                scope.with_texture_framebuffer(surface.texture(), |fb| {
                    fb.with_program(&copy::program_name(mask), &copy::source(mask), |program| {
                        program.set_uniform(&PlacementUniforms::new(viewport.x, viewport.y))?;
                        program.set_attribute(0, &ViewportVertex::TRIANGLE)?;
                        program.draw(
                            DrawCall::new(0..3, 0..1)
                                .with_texture(&staged)
                                .with_viewport(viewport),
                        )
                    })
                })
            })
        })
    }
}

impl SurfaceSink for SurfaceWriter<'_> {
    fn size(&self) -> (u32, u32) {
        self.surface.size()
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
        if self.surface.context() != self.session.context_id() {
            return Err(SurfaceError::ContextMismatch);
        }
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.copy_region(Viewport::new(x, y, width, height), rgba, mask)
            .map_err(|e| SurfaceError::Backend(e.to_string()))
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn headless_session() -> Option<GpuSession> {
        pollster::block_on(GpuContext::new_headless())
            .ok()
            .map(GpuSession::new)
    }

    #[test]
    fn test_surface_upload_and_read() {
        let Some(session) = headless_session() else { return };
        let ctx = session.context();
        let surface = GpuSurface::new(ctx, 3, 2).unwrap();
        assert_eq!(surface.read_rgba(ctx).unwrap(), vec![0u8; 24]);

        let pixels: Vec<u8> = (0..24).collect();
        surface.upload_rgba(ctx, &pixels).unwrap();
        assert_eq!(surface.read_rgba(ctx).unwrap(), pixels);
        assert!(matches!(
            surface.upload_rgba(ctx, &pixels[..8]),
            Err(SurfaceError::DataLength { .. })
        ));
    }

    #[test]
    fn test_writer_masked_region() {
        let Some(mut session) = headless_session() else { return };
        let surface = GpuSurface::new(session.context(), 4, 4).unwrap();
        surface
            .upload_rgba(session.context(), &[10u8, 20, 30, 40].repeat(16))
            .unwrap();

        let src = [200u8, 201, 202, 203].repeat(4);
        SurfaceWriter::new(&mut session, &surface)
            .write_rgba(1, 2, 2, 2, &src, ChannelMask::G)
            .unwrap();

        let pixels = surface.read_rgba(session.context()).unwrap();
        let px = |x: usize, y: usize| &pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(px(1, 2), &[10, 201, 30, 40]);
        assert_eq!(px(2, 3), &[10, 201, 30, 40]);
        assert_eq!(px(0, 2), &[10, 20, 30, 40]);
        assert_eq!(px(3, 3), &[10, 20, 30, 40]);
        assert_eq!(px(1, 1), &[10, 20, 30, 40]);
    }

    #[test]
    fn test_writer_rejects_bad_region() {
        let Some(mut session) = headless_session() else { return };
        let surface = GpuSurface::new(session.context(), 4, 4).unwrap();
        let err = SurfaceWriter::new(&mut session, &surface)
            .write_rgba(3, 3, 2, 2, &[0; 16], ChannelMask::R)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::OutOfBounds { .. }));
    }

    #[test]
    fn test_writer_after_context_loss() {
        let Some(mut session) = headless_session() else { return };
        let surface = GpuSurface::new(session.context(), 2, 2).unwrap();
        session.lose_context();
        let err = SurfaceWriter::new(&mut session, &surface)
            .write_rgba(0, 0, 1, 1, &[1, 2, 3, 4], ChannelMask::R)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::Backend(_)));
    }
}
