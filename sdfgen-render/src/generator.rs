//! GPU-first SDF generation with transparent CPU fallback.
//!
//! [`SdfGenerator`] validates input once, then tries the GPU rasterizer
//! (gated by its self-test) and retries on the CPU with the same
//! arguments if anything GPU-side fails. Input errors are returned to
//! the caller; GPU errors never are.

use std::borrow::Cow;

use sdfgen_core::surface::check_region;
use sdfgen_core::{
    ChannelMask, GeneratorConfig, LineSegment, Outline, SdfError, SdfField, SdfParams,
    SurfaceError, SurfaceSink,
};

use crate::backend::{BackendKind, CpuBackend, SdfBackend};
use crate::context::GpuContext;
use crate::gpu::GpuRasterizer;
use crate::session::GpuSession;
use crate::surface::{GpuSurface, SurfaceWriter};

/// Outline input accepted by the generator.
#[derive(Clone, Copy, Debug)]
pub enum OutlineSource<'a> {
    /// Path command string, flattened with the configured subdivisions.
    Path(&'a str),
    /// Already flattened and sorted.
    Outline(&'a Outline),
    /// Pre-flattened segments in any order.
    Segments(&'a [LineSegment]),
}

impl<'a> OutlineSource<'a> {
    fn to_outline(self, subdivisions: usize) -> Result<Cow<'a, Outline>, SdfError> {
        Ok(match self {
            OutlineSource::Path(path) => Cow::Owned(Outline::parse_with(path, subdivisions)?),
            OutlineSource::Outline(outline) => Cow::Borrowed(outline),
            OutlineSource::Segments(segments) => {
                Cow::Owned(Outline::from_segments(segments.to_vec()))
            }
        })
    }
}

impl<'a> From<&'a str> for OutlineSource<'a> {
    fn from(path: &'a str) -> Self {
        OutlineSource::Path(path)
    }
}

impl<'a> From<&'a String> for OutlineSource<'a> {
    fn from(path: &'a String) -> Self {
        OutlineSource::Path(path)
    }
}

impl<'a> From<&'a Outline> for OutlineSource<'a> {
    fn from(outline: &'a Outline) -> Self {
        OutlineSource::Outline(outline)
    }
}

impl<'a> From<&'a [LineSegment]> for OutlineSource<'a> {
    fn from(segments: &'a [LineSegment]) -> Self {
        OutlineSource::Segments(segments)
    }
}

impl<'a> From<&'a Vec<LineSegment>> for OutlineSource<'a> {
    fn from(segments: &'a Vec<LineSegment>) -> Self {
        OutlineSource::Segments(segments)
    }
}

/// Destination offset and channel (0 = red … 3 = alpha).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub channel: u8,
}

impl Placement {
    pub fn at(x: u32, y: u32) -> Self {
        Self { x, y, channel: 0 }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Validate the channel and that a `width × height` field fits on a
    /// destination of `surface` size.
    fn check(&self, surface: (u32, u32), width: u32, height: u32) -> Result<ChannelMask, SurfaceError> {
        let mask = ChannelMask::single(self.channel)?;
        let len = width as usize * height as usize * 4;
        check_region(surface, self.x, self.y, width, height, len)?;
        Ok(mask)
    }
}

/// Which backend produced the most recent result, and why the GPU was
/// skipped if it was.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationReport {
    pub backend: BackendKind,
    pub fallback_reason: Option<String>,
}

/// Dispatcher over the GPU and CPU backends.
pub struct SdfGenerator {
    config: GeneratorConfig,
    gpu: Option<GpuRasterizer>,
    cpu: CpuBackend,
    last_report: Option<GenerationReport>,
}

impl SdfGenerator {
    pub fn new(config: GeneratorConfig, session: Option<GpuSession>) -> Self {
        Self::from_backends(config, session.map(GpuRasterizer::new))
    }

    /// Use a preconfigured rasterizer (e.g. with a custom self-test).
    pub fn with_rasterizer(config: GeneratorConfig, gpu: GpuRasterizer) -> Self {
        Self::from_backends(config, Some(gpu))
    }

    pub fn cpu_only() -> Self {
        Self::from_backends(GeneratorConfig::cpu_only(), None)
    }

    /// Open a headless GPU context if the config asks for one, degrading
    /// to CPU-only when none is available.
    pub fn headless(config: GeneratorConfig) -> Self {
        if !config.prefer_gpu {
            return Self::new(config, None);
        }
        match pollster::block_on(GpuContext::new_headless()) {
            Ok(context) => Self::new(config, Some(GpuSession::new(context))),
            Err(e) => {
                log::warn!("No headless GPU context ({e}); generating on the CPU");
                Self::new(config, None)
            }
        }
    }

    fn from_backends(config: GeneratorConfig, gpu: Option<GpuRasterizer>) -> Self {
        Self {
            config,
            gpu,
            cpu: CpuBackend,
            last_report: None,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&GpuSession> {
        self.gpu.as_ref().map(GpuRasterizer::session)
    }

    pub fn session_mut(&mut self) -> Option<&mut GpuSession> {
        self.gpu.as_mut().map(GpuRasterizer::session_mut)
    }

    pub fn last_report(&self) -> Option<&GenerationReport> {
        self.last_report.as_ref()
    }

    /// Whether calls will run on the GPU. Runs the self-test on first use.
    pub fn is_gpu_supported(&mut self) -> bool {
        match self.gpu.as_mut() {
            Some(gpu) if self.config.prefer_gpu => gpu.is_supported(),
            _ => false,
        }
    }

    fn report(&mut self, backend: BackendKind, fallback_reason: Option<String>) {
        log::debug!("Generated on {backend}");
        self.last_report = Some(GenerationReport {
            backend,
            fallback_reason,
        });
    }

    /// Generate a field.
    pub fn generate<'a>(
        &mut self,
        params: &SdfParams,
        outline: impl Into<OutlineSource<'a>>,
    ) -> Result<SdfField, SdfError> {
        let resolved = params.resolve()?;
        let outline = outline.into().to_outline(self.config.curve_subdivisions)?;

        let mut fallback_reason = None;
        if let Some(gpu) = self.gpu.as_mut().filter(|_| self.config.prefer_gpu) {
            match SdfBackend::generate(gpu, &resolved, &outline) {
                Ok(field) => {
                    self.report(BackendKind::Gpu, None);
                    return Ok(field);
                }
                Err(e) => {
                    log::warn!("GPU generation failed, falling back to CPU: {e}");
                    fallback_reason = Some(e.to_string());
                }
            }
        }

        let field = match self.cpu.generate(&resolved, &outline) {
            Ok(field) => field,
            Err(never) => match never {},
        };
        self.report(BackendKind::Cpu, fallback_reason);
        Ok(field)
    }

    /// Generate a field into one channel of a GPU surface.
    ///
    /// On the CPU path the field is written through the same masked draw
    /// the GPU path uses, so the rest of the surface is untouched either
    /// way.
    pub fn generate_into_surface<'a>(
        &mut self,
        params: &SdfParams,
        outline: impl Into<OutlineSource<'a>>,
        surface: &GpuSurface,
        placement: Placement,
    ) -> Result<(), SdfError> {
        let resolved = params.resolve()?;
        let (width, height) = (resolved.width(), resolved.height());
        let mask = placement.check(surface.size(), width, height)?;
        let outline = outline.into().to_outline(self.config.curve_subdivisions)?;

        let Some(gpu) = self.gpu.as_mut() else {
            return Err(SurfaceError::ContextMismatch.into());
        };
        if surface.context() != gpu.session().context_id() {
            return Err(SurfaceError::ContextMismatch.into());
        }

        let mut fallback_reason = None;
        if self.config.prefer_gpu {
            let Placement { x, y, .. } = placement;
            match gpu.generate_into_surface(&resolved, &outline, surface, x, y, mask) {
                Ok(()) => {
                    self.report(BackendKind::Gpu, None);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("GPU surface generation failed, falling back to CPU: {e}");
                    fallback_reason = Some(e.to_string());
                }
            }
        }

        let field = match self.cpu.generate(&resolved, &outline) {
            Ok(field) => field,
            Err(never) => match never {},
        };
        let rgba = field.to_rgba(placement.channel)?;
        SurfaceWriter::new(gpu.session_mut(), surface).write_rgba(
            placement.x,
            placement.y,
            width,
            height,
            &rgba,
            mask,
        )?;
        self.report(BackendKind::Cpu, fallback_reason);
        Ok(())
    }

    /// Generate a field into one channel of any [`SurfaceSink`].
    pub fn generate_into_image<'a>(
        &mut self,
        params: &SdfParams,
        outline: impl Into<OutlineSource<'a>>,
        image: &mut impl SurfaceSink,
        placement: Placement,
    ) -> Result<(), SdfError> {
        let resolved = params.resolve()?;
        let (width, height) = (resolved.width(), resolved.height());
        let mask = placement.check(image.size(), width, height)?;

        let field = self.generate(params, outline)?;
        let rgba = field.to_rgba(placement.channel)?;
        image.write_rgba(placement.x, placement.y, width, height, &rgba, mask)?;
        Ok(())
    }
}

// ===================================================================
// Tests
// ===================================================================
