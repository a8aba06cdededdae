//! GPU rasterizer and its capability gate.
//!
//! Two passes per field:
//!
//! 1. **Accumulate** into an `Rgba16Float` target the size of the SDF:
//!    one instanced full-viewport triangle per segment, reduced by blend
//!    (see [`crate::pipelines::accumulate`]).
//! 2. **Resolve** into an `Rgba8Unorm` destination at an offset and
//!    through a channel mask (see [`crate::pipelines::resolve`]).
//!
//! Plain [`GpuRasterizer::generate`] resolves into a cached output
//! texture and reads channel 0 back; [`GpuRasterizer::generate_into_surface`]
//! never leaves the GPU.
//!
//! Before first use a fixed self-test shape is rendered and compared
//! byte for byte with known-good output. Any mismatch or failure
//! disables the GPU path for the rasterizer's lifetime.

use sdfgen_core::{ChannelMask, Outline, ResolvedParams, SdfField, SdfParams};
use wgpu::{TextureFormat, TextureUsages};

use crate::error::GpuError;
use crate::pipelines::{accumulate, resolve};
use crate::readback;
use crate::session::{
    Capability, DrawCall, GpuSession, TextureHandle, TextureSpec, Viewport,
};
use crate::surface::GpuSurface;
use crate::vertex::{PlacementUniforms, SdfUniforms, SegmentInstance, ViewportVertex};

/// Cache key of the texture plain generation resolves into.
const OUTPUT: &str = "sdf_output";

/// Known shape and its expected field, rendered once to gate GPU use.
#[derive(Clone, Debug, PartialEq)]
pub struct SelfTest {
    pub path: String,
    pub params: SdfParams,
    pub expected: Vec<u8>,
}

impl SelfTest {
    /// A 4×4 parallelogram whose field exercises both rounding
    /// directions, the winding sign and the distance pruning.
    pub fn reference() -> Self {
        Self {
            path: "M8,8L16,8L24,24L16,24Z".to_owned(),
            params: SdfParams::new(4, 4, [0.0, 0.0, 32.0, 32.0]).with_max_distance(24.0),
            expected: vec![
                97, 106, 97, 61, 99, 137, 118, 80, 80, 118, 137, 99, 61, 97, 106, 97,
            ],
        }
    }
}

/// Where a field lands on a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Destination {
    x: u32,
    y: u32,
    mask: ChannelMask,
}

/// SDF generation on the GPU.
pub struct GpuRasterizer {
    session: GpuSession,
    self_test: SelfTest,
    supported: Option<bool>,
}

impl GpuRasterizer {
    pub fn new(session: GpuSession) -> Self {
        Self::with_self_test(session, SelfTest::reference())
    }

    /// Gate GPU use on a custom self-test.
    pub fn with_self_test(session: GpuSession, self_test: SelfTest) -> Self {
        Self {
            session,
            self_test,
            supported: None,
        }
    }

    pub fn session(&self) -> &GpuSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GpuSession {
        &mut self.session
    }

    /// Run the self-test once and remember the verdict.
    pub fn is_supported(&mut self) -> bool {
        if let Some(supported) = self.supported {
            return supported;
        }
        let supported = match self.run_self_test() {
            Ok(()) => {
                log::info!("GPU self-test passed on context {}", self.session.context_id());
                true
            }
            Err(e) => {
                log::warn!("GPU self-test failed, disabling GPU generation: {e}");
                false
            }
        };
        self.supported = Some(supported);
        supported
    }

    fn run_self_test(&mut self) -> Result<(), GpuError> {
        let params = self
            .self_test
            .params
            .resolve()
            .map_err(|e| GpuError::Validation(e.to_string()))?;
        let outline =
            Outline::parse(&self.self_test.path).map_err(|e| GpuError::Validation(e.to_string()))?;
        let field = self.render_field(&params, &outline)?;
        if field.data != self.self_test.expected {
            log::debug!(
                "Self-test output {:?} != expected {:?}",
                field.data,
                self.self_test.expected
            );
            return Err(GpuError::SelfTestMismatch);
        }
        Ok(())
    }

    /// Generate a field and read it back.
    pub fn generate(
        &mut self,
        params: &ResolvedParams,
        outline: &Outline,
    ) -> Result<SdfField, GpuError> {
        if !self.is_supported() {
            return Err(GpuError::Unsupported);
        }
        self.render_field(params, outline)
    }

    /// Generate a field straight into the `mask` channel of `surface` at
    /// `(x, y)`.
    ///
    /// The caller validates the region; other channels and pixels of the
    /// surface are left untouched.
    pub fn generate_into_surface(
        &mut self,
        params: &ResolvedParams,
        outline: &Outline,
        surface: &GpuSurface,
        x: u32,
        y: u32,
        mask: ChannelMask,
    ) -> Result<(), GpuError> {
        if !self.is_supported() {
            return Err(GpuError::Unsupported);
        }
        if surface.context() != self.session.context_id() {
            return Err(GpuError::ContextMismatch);
        }
        let placement = Destination { x, y, mask };
        self.session
            .scoped(|session| render(session, params, outline, surface.texture(), placement))
    }

    fn render_field(
        &mut self,
        params: &ResolvedParams,
        outline: &Outline,
    ) -> Result<SdfField, GpuError> {
        let (width, height) = (params.width(), params.height());
        let spec = TextureSpec::new(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::COPY_SRC,
        );
        let placement = Destination {
            x: 0,
            y: 0,
            mask: ChannelMask::R,
        };
        let rgba = self.session.scoped(|session| {
            session.with_texture(OUTPUT, spec, |scope| {
                let output = scope.texture().clone();
                render(scope, params, outline, &output, placement)?;
                readback::read_rgba(scope.context(), &output)
            })
        })?;
        Ok(SdfField {
            width,
            height,
            data: rgba.iter().step_by(4).copied().collect(),
        })
    }
}

/// Both passes into `dest`. Runs inside the caller's error scope.
fn render(
    session: &mut GpuSession,
    params: &ResolvedParams,
    outline: &Outline,
    dest: &TextureHandle,
    placement: Destination,
) -> Result<(), GpuError> {
    let (width, height) = (params.width(), params.height());
    session.check_texture_size(width, height)?;
    session.require_extension(Capability::FloatRenderTarget)?;
    session.require_extension(Capability::FloatBlend)?;
    session.require_extension(Capability::ByteRenderTarget)?;

    let uniforms = SdfUniforms::from_params(params);
    let instances: Vec<SegmentInstance> = outline
        .segments()
        .iter()
        .map(SegmentInstance::from_segment)
        .collect();
    let instance_count = instances.len() as u32;
    log::trace!("Accumulating {instance_count} segments into {width}x{height}");

    session.with_texture(accumulate::TARGET, accumulate::target_spec(width, height), |scope| {
        let accumulation = scope.texture().clone();

        scope.with_texture_framebuffer(&accumulation, |fb| {
            fb.with_program(accumulate::NAME, &accumulate::source(), |program| {
                program.set_uniform(&uniforms)?;
                program.set_attribute(0, &ViewportVertex::TRIANGLE)?;
                program.set_attribute(1, &instances)?;
                program.draw(DrawCall::new(0..3, 0..instance_count).with_clear(accumulate::CLEAR))
            })
        })?;

        scope.with_texture_framebuffer(dest, |fb| {
            let mask = placement.mask;
            fb.with_program(&resolve::program_name(mask), &resolve::source(mask), |program| {
                program.set_uniform(&PlacementUniforms::new(placement.x, placement.y))?;
                program.set_attribute(0, &ViewportVertex::TRIANGLE)?;
                program.draw(
                    DrawCall::new(0..3, 0..1)
                        .with_texture(&accumulation)
                        .with_viewport(Viewport::new(placement.x, placement.y, width, height)),
                )
            })
        })
    })
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GpuContext;
    use sdfgen_core::cpu;

    fn headless_rasterizer() -> Option<GpuRasterizer> {
        pollster::block_on(GpuContext::new_headless())
            .ok()
            .map(|ctx| GpuRasterizer::new(GpuSession::new(ctx)))
    }

    #[test]
    fn test_reference_self_test_matches_cpu() {
        let test = SelfTest::reference();
        let field = cpu::generate_path(&test.params, &test.path).unwrap();
        assert_eq!(field.data, test.expected);
    }

    #[test]
    fn test_self_test_is_memoized() {
        let Some(mut gpu) = headless_rasterizer() else { return };
        let first = gpu.is_supported();
        let programs = gpu.session().program_count();
        assert_eq!(gpu.is_supported(), first);
        assert_eq!(gpu.session().program_count(), programs);
    }

    #[test]
    fn test_failing_self_test_disables_gpu() {
        let Ok(ctx) = pollster::block_on(GpuContext::new_headless()) else { return };
        let mut broken = SelfTest::reference();
        broken.expected[0] ^= 1;
        let mut gpu = GpuRasterizer::with_self_test(GpuSession::new(ctx), broken);

        let params = SdfParams::new(4, 4, [0.0, 0.0, 4.0, 4.0]).resolve().unwrap();
        let outline = Outline::parse("M0,0 L4,0 L4,4 Z").unwrap();
        assert!(!gpu.is_supported());
        assert!(matches!(
            gpu.generate(&params, &outline),
            Err(GpuError::Unsupported)
        ));
    }

    #[test]
    fn test_gpu_matches_cpu_fixtures() {
        let Some(mut gpu) = headless_rasterizer() else { return };
        if !gpu.is_supported() {
            return;
        }
        let cases = [
            (
                "M0,0 L64,64 L0,64 Z",
                SdfParams::new(4, 4, [0.0, 0.0, 64.0, 64.0]).with_max_distance(64.0),
            ),
            (
                "M2,0 Q4,0,4,2 Q4,4,2,4 Q0,4,0,2 Q0,0,2,0",
                SdfParams::new(5, 5, [-2.0, -2.0, 6.0, 6.0]).with_max_distance(4.0),
            ),
        ];
        for (path, params) in cases {
            let resolved = params.resolve().unwrap();
            let outline = Outline::parse(path).unwrap();
            let expected = cpu::generate(&resolved, &outline);
            assert_eq!(gpu.generate(&resolved, &outline).unwrap(), expected, "{path}");
        }
    }

    #[test]
    fn test_empty_outline_resolves_to_zero() {
        let Some(mut gpu) = headless_rasterizer() else { return };
        if !gpu.is_supported() {
            return;
        }
        let params = SdfParams::new(3, 3, [0.0, 0.0, 3.0, 3.0]).resolve().unwrap();
        let field = gpu.generate(&params, &Outline::default()).unwrap();
        assert_eq!(field.data, vec![0u8; 9]);
    }

    #[test]
    fn test_generate_after_context_loss_fails() {
        let Some(mut gpu) = headless_rasterizer() else { return };
        if !gpu.is_supported() {
            return;
        }
        let params = SdfParams::new(4, 4, [0.0, 0.0, 4.0, 4.0]).resolve().unwrap();
        let outline = Outline::parse("M0,0 L4,0 L4,4 Z").unwrap();
        gpu.session_mut().lose_context();
        assert!(matches!(
            gpu.generate(&params, &outline),
            Err(GpuError::ContextLost)
        ));
        assert_eq!(gpu.session().program_count(), 0);
    }

    #[test]
    fn test_oversized_texture_rejected() {
        let Some(mut gpu) = headless_rasterizer() else { return };
        if !gpu.is_supported() {
            return;
        }
        let max = gpu.session().context().limits().max_texture_dimension_2d;
        let params = SdfParams::new(max + 1, 1, [0.0, 0.0, 1.0, 1.0]).resolve().unwrap();
        let outline = Outline::parse("M0,0 L1,0 L1,1 Z").unwrap();
        assert!(matches!(
            gpu.generate(&params, &outline),
            Err(GpuError::TextureTooLarge { .. })
        ));
    }
}
