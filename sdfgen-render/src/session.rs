//! GPU session manager.
//!
//! A [`GpuSession`] owns one [`GpuContext`] plus everything lazily built
//! on it: compiled programs, named textures, resolved capabilities and
//! the framebuffer stack. All of it is keyed by the context and thrown
//! away in one go when the context is lost or replaced.
//!
//! Resources are acquired through closures:
//!
//! ```text
//!  session.scoped(|s| {                       ◀─── error scopes + loss check
//!      s.with_texture("accum", spec, |t| {    ◀─── texture unit N, restored on exit
//!          let accum = t.texture().clone();
//!          t.with_texture_framebuffer(&accum, |fb| {   ◀─── render target pushed/popped
//!              fb.with_program("sdf_accumulate", &source, |p| {
//!                  p.set_uniform(&uniforms)?;
//!                  p.set_attribute(1, &instances)?;
//!                  p.draw(DrawCall::new(0..3, 0..n))
//!              })
//!          })
//!      })
//!  })
//! ```
//!
//! The scope guards ([`TextureScope`], [`FramebufferScope`]) dereference
//! to the session and restore the previous state in `Drop`, so every
//! exit path (including `?`) unwinds correctly.

use std::collections::hash_map::Entry;
use std::hash::Hasher;
use std::ops::{Deref, DerefMut, Range};
use std::sync::Arc;

use bytemuck::Pod;
use rustc_hash::{FxHashMap, FxHasher};
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBindingType,
    BufferDescriptor, BufferUsages, Color, ColorTargetState, CommandEncoderDescriptor, Device,
    ErrorFilter, Extent3d, FragmentState, FrontFace, LoadOp, MultisampleState, Operations,
    PipelineCompilationOptions, PipelineLayoutDescriptor, PolygonMode, PrimitiveState,
    PrimitiveTopology, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, ShaderModuleDescriptor, ShaderStages, StoreOp, Texture,
    TextureDescriptor, TextureDimension, TextureFormat, TextureFormatFeatureFlags,
    TextureSampleType, TextureUsages, TextureView, TextureViewDescriptor, TextureViewDimension,
    VertexBufferLayout, VertexState,
};

use crate::context::{ContextId, GpuContext};
use crate::error::GpuError;

/// Smallest vertex buffer ever allocated; avoids empty buffer slices.
const MIN_ATTRIBUTE_BYTES: u64 = 256;

// ───────────────────────────────────────────────────────────────────
// Capabilities
// ───────────────────────────────────────────────────────────────────

/// Optional device features the SDF pipeline depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `Rgba16Float` as a render target that can also be sampled.
    FloatRenderTarget,
    /// Blending into `Rgba16Float` targets.
    FloatBlend,
    /// `Rgba8Unorm` as a render target that can be copied out.
    ByteRenderTarget,
}

impl Capability {
    fn probe(self, context: &GpuContext) -> bool {
        match self {
            Capability::FloatRenderTarget => context.supports_format(
                TextureFormat::Rgba16Float,
                TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
                TextureFormatFeatureFlags::empty(),
            ),
            Capability::FloatBlend => context.supports_format(
                TextureFormat::Rgba16Float,
                TextureUsages::RENDER_ATTACHMENT,
                TextureFormatFeatureFlags::BLENDABLE,
            ),
            Capability::ByteRenderTarget => context.supports_format(
                TextureFormat::Rgba8Unorm,
                TextureUsages::RENDER_ATTACHMENT
                    | TextureUsages::TEXTURE_BINDING
                    | TextureUsages::COPY_SRC
                    | TextureUsages::COPY_DST,
                TextureFormatFeatureFlags::empty(),
            ),
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Textures
// ───────────────────────────────────────────────────────────────────

/// Size, format and usage of a 2D texture. A cached texture is
/// re-created whenever the requested spec differs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

impl TextureSpec {
    pub fn new(width: u32, height: u32, format: TextureFormat, usage: TextureUsages) -> Self {
        Self {
            width,
            height,
            format,
            usage,
        }
    }

    fn extent(&self) -> Extent3d {
        Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

/// Shared handle to a texture created on a specific context.
#[derive(Clone, Debug)]
pub struct TextureHandle {
    texture: Arc<Texture>,
    spec: TextureSpec,
    context: ContextId,
}

impl TextureHandle {
    /// Create a texture on `context`, enforcing the device's size limit.
    pub fn create(context: &GpuContext, label: &str, spec: TextureSpec) -> Result<Self, GpuError> {
        let max = context.limits().max_texture_dimension_2d;
        if spec.width > max || spec.height > max {
            return Err(GpuError::TextureTooLarge {
                width: spec.width,
                height: spec.height,
                max,
            });
        }
        let texture = context.device.create_texture(&TextureDescriptor {
            label: Some(label),
            size: spec.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: spec.format,
            usage: spec.usage,
            view_formats: &[],
        });
        Ok(Self {
            texture: Arc::new(texture),
            spec,
            context: context.id(),
        })
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn spec(&self) -> TextureSpec {
        self.spec
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn size(&self) -> (u32, u32) {
        (self.spec.width, self.spec.height)
    }

    pub fn view(&self) -> TextureView {
        self.texture.create_view(&TextureViewDescriptor::default())
    }

    /// Replace the whole texture with tightly packed 4-byte pixels.
    pub fn write_rgba(&self, context: &GpuContext, rgba: &[u8]) -> Result<(), GpuError> {
        if context.id() != self.context {
            return Err(GpuError::ContextMismatch);
        }
        context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.spec.width * 4),
                rows_per_image: Some(self.spec.height),
            },
            self.spec.extent(),
        );
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────────
// Programs
// ───────────────────────────────────────────────────────────────────

/// Everything needed to compile a program.
///
/// Binding convention: group 0, binding 0 is a uniform buffer of
/// `uniform_size` bytes; binding 1, when `texture_input` is set, is an
/// unfiltered 2D float texture read with `textureLoad`.
pub struct ProgramSource {
    pub label: &'static str,
    pub wgsl: &'static str,
    /// One layout per vertex buffer slot, in slot order.
    pub vertex_buffers: Vec<VertexBufferLayout<'static>>,
    pub uniform_size: u64,
    pub texture_input: bool,
    pub target: ColorTargetState,
}

struct AttributeBuffer {
    buffer: Buffer,
    capacity: u64,
    fingerprint: u64,
    /// Host copy of the last upload; a matching fingerprint alone never
    /// skips an upload.
    contents: Vec<u8>,
}

impl AttributeBuffer {
    fn allocate(device: &Device, program: &str, slot: u32, len: u64) -> Self {
        let capacity = len.next_power_of_two().max(MIN_ATTRIBUTE_BYTES);
        log::debug!("Allocating {capacity} byte vertex buffer for '{program}' slot {slot}");
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(program),
            size: capacity,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            capacity,
            fingerprint: 0,
            contents: Vec::new(),
        }
    }
}

/// A compiled render pipeline with its uniform buffer and per-slot
/// vertex buffers.
pub struct Program {
    pipeline: RenderPipeline,
    bind_group_layout: BindGroupLayout,
    uniform_buffer: Buffer,
    uniform_size: u64,
    texture_input: bool,
    slot_count: u32,
    attributes: FxHashMap<u32, AttributeBuffer>,
}

impl Program {
    fn compile(device: &Device, name: &str, source: &ProgramSource) -> Self {
        // ── Shader ──────────────────────────────────────────────
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some(source.label),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
        });

        // ── Bind group layout ───────────────────────────────────
        let mut entries = vec![BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStages::VERTEX_FRAGMENT,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        if source.texture_input {
            entries.push(BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &entries,
        });

        // ── Pipeline ────────────────────────────────────────────
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                buffers: &source.vertex_buffers,
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: PipelineCompilationOptions::default(),
                targets: &[Some(source.target.clone())],
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // ── Uniform buffer ──────────────────────────────────────
        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some(name),
            size: source.uniform_size,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
            uniform_size: source.uniform_size,
            texture_input: source.texture_input,
            slot_count: source.vertex_buffers.len() as u32,
            attributes: FxHashMap::default(),
        }
    }
}

fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// Whether `bytes` (hashing to `hash`) equals the previous upload.
fn same_upload(stored: &[u8], stored_hash: u64, bytes: &[u8], hash: u64) -> bool {
    stored_hash == hash && stored == bytes
}

/// Pixel rectangle of the current framebuffer. Used both as viewport
/// and scissor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One draw into the current framebuffer.
#[derive(Clone, Debug)]
pub struct DrawCall<'a> {
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
    pub texture: Option<&'a TextureHandle>,
    pub viewport: Option<Viewport>,
    /// Clear the framebuffer first; `None` keeps its contents.
    pub clear: Option<Color>,
}

impl<'a> DrawCall<'a> {
    pub fn new(vertices: Range<u32>, instances: Range<u32>) -> Self {
        Self {
            vertices,
            instances,
            texture: None,
            viewport: None,
            clear: None,
        }
    }

    pub fn with_texture(mut self, texture: &'a TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_clear(mut self, color: Color) -> Self {
        self.clear = Some(color);
        self
    }
}

/// Program-scoped setters handed to [`GpuSession::with_program`] bodies.
pub struct ProgramScope<'a> {
    name: &'a str,
    context: &'a GpuContext,
    program: &'a mut Program,
    target: Option<&'a TextureView>,
}

impl ProgramScope<'_> {
    /// Upload the program's uniform block.
    pub fn set_uniform<T: Pod>(&mut self, value: &T) -> Result<(), GpuError> {
        let found = std::mem::size_of::<T>() as u64;
        if found != self.program.uniform_size {
            return Err(GpuError::UniformSize {
                program: self.name.to_owned(),
                expected: self.program.uniform_size,
                found,
            });
        }
        self.context
            .queue
            .write_buffer(&self.program.uniform_buffer, 0, bytemuck::bytes_of(value));
        Ok(())
    }

    /// Upload vertex data for `slot`, reusing the slot's buffer. Returns
    /// `false` when the data matches the previous upload and nothing was
    /// sent.
    pub fn set_attribute<T: Pod>(&mut self, slot: u32, data: &[T]) -> Result<bool, GpuError> {
        if slot >= self.program.slot_count {
            return Err(GpuError::UnknownAttribute {
                program: self.name.to_owned(),
                slot,
            });
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len() as u64;
        let hash = fingerprint(bytes);

        let device = &self.context.device;
        let attr = match self.program.attributes.entry(slot) {
            Entry::Occupied(e)
                if same_upload(&e.get().contents, e.get().fingerprint, bytes, hash) =>
            {
                log::trace!("'{}' slot {slot} unchanged", self.name);
                return Ok(false);
            }
            Entry::Occupied(e) if e.get().capacity >= len => e.into_mut(),
            Entry::Occupied(mut e) => {
                e.insert(AttributeBuffer::allocate(device, self.name, slot, len));
                e.into_mut()
            }
            Entry::Vacant(e) => e.insert(AttributeBuffer::allocate(device, self.name, slot, len)),
        };

        if !bytes.is_empty() {
            let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
            if bytes.len() % align == 0 {
                self.context.queue.write_buffer(&attr.buffer, 0, bytes);
            } else {
                let mut padded = bytes.to_vec();
                padded.resize(bytes.len().next_multiple_of(align), 0);
                self.context.queue.write_buffer(&attr.buffer, 0, &padded);
            }
        }
        attr.fingerprint = hash;
        attr.contents.clear();
        attr.contents.extend_from_slice(bytes);
        Ok(true)
    }

    /// Record and submit one render pass into the current framebuffer.
    pub fn draw(&mut self, call: DrawCall<'_>) -> Result<(), GpuError> {
        let target = self
            .target
            .ok_or_else(|| GpuError::NoFramebuffer(self.name.to_owned()))?;
        let device = &self.context.device;

        let input_view;
        let mut entries = vec![BindGroupEntry {
            binding: 0,
            resource: self.program.uniform_buffer.as_entire_binding(),
        }];
        if self.program.texture_input {
            let texture = call
                .texture
                .ok_or_else(|| GpuError::MissingTexture(self.name.to_owned()))?;
            if texture.context() != self.context.id() {
                return Err(GpuError::ContextMismatch);
            }
            input_view = texture.view();
            entries.push(BindGroupEntry {
                binding: 1,
                resource: BindingResource::TextureView(&input_view),
            });
        }
        if let Some(slot) =
            (0..self.program.slot_count).find(|s| !self.program.attributes.contains_key(s))
        {
            return Err(GpuError::MissingAttribute {
                program: self.name.to_owned(),
                slot,
            });
        }

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(self.name),
            layout: &self.program.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("sdfgen_draw_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(self.name),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: Operations {
                        load: call.clear.map_or(LoadOp::Load, LoadOp::Clear),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            for slot in 0..self.program.slot_count {
                if let Some(attr) = self.program.attributes.get(&slot) {
                    pass.set_vertex_buffer(slot, attr.buffer.slice(..));
                }
            }
            if let Some(vp) = call.viewport {
                pass.set_viewport(
                    vp.x as f32,
                    vp.y as f32,
                    vp.width as f32,
                    vp.height as f32,
                    0.0,
                    1.0,
                );
                pass.set_scissor_rect(vp.x, vp.y, vp.width, vp.height);
            }
            if !call.vertices.is_empty() && !call.instances.is_empty() {
                pass.draw(call.vertices, call.instances);
            }
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────────
// Scope guards
// ───────────────────────────────────────────────────────────────────

/// Active texture binding. Restores the previous texture unit on drop.
pub struct TextureScope<'a> {
    session: &'a mut GpuSession,
    texture: TextureHandle,
    unit: u32,
    previous_unit: u32,
}

impl TextureScope<'_> {
    pub fn texture(&self) -> &TextureHandle {
        &self.texture
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }
}

impl Deref for TextureScope<'_> {
    type Target = GpuSession;

    fn deref(&self) -> &GpuSession {
        self.session
    }
}

impl DerefMut for TextureScope<'_> {
    fn deref_mut(&mut self) -> &mut GpuSession {
        self.session
    }
}

impl Drop for TextureScope<'_> {
    fn drop(&mut self) {
        log::trace!("Texture unit {} released", self.unit);
        self.session.texture_unit = self.previous_unit;
    }
}

/// Active render target. Pops the framebuffer stack on drop.
pub struct FramebufferScope<'a> {
    session: &'a mut GpuSession,
}

impl Deref for FramebufferScope<'_> {
    type Target = GpuSession;

    fn deref(&self) -> &GpuSession {
        self.session
    }
}

impl DerefMut for FramebufferScope<'_> {
    fn deref_mut(&mut self) -> &mut GpuSession {
        self.session
    }
}

impl Drop for FramebufferScope<'_> {
    fn drop(&mut self) {
        self.session.framebuffers.pop();
        log::trace!("Framebuffer popped (depth {})", self.session.framebuffers.len());
    }
}

// ───────────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────────

/// Per-context GPU state with scoped acquisition helpers.
pub struct GpuSession {
    context: GpuContext,
    programs: FxHashMap<String, Program>,
    textures: FxHashMap<String, TextureHandle>,
    capabilities: FxHashMap<Capability, bool>,
    framebuffers: Vec<TextureView>,
    texture_unit: u32,
    generation: u64,
    loss_handled: bool,
    /// Textures created inside the running `scoped` batch, dropped from
    /// the cache if the batch's error scopes report a failure.
    unconfirmed_textures: Option<Vec<String>>,
}

impl GpuSession {
    pub fn new(context: GpuContext) -> Self {
        Self {
            context,
            programs: FxHashMap::default(),
            textures: FxHashMap::default(),
            capabilities: FxHashMap::default(),
            framebuffers: Vec::new(),
            texture_unit: 0,
            generation: 0,
            loss_handled: false,
            unconfirmed_textures: None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// Bumped every time the caches are invalidated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_unit(&self) -> u32 {
        self.texture_unit
    }

    pub fn framebuffer_depth(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_lost(&self) -> bool {
        self.context.is_lost()
    }

    // ───────────────────── Acquisition ────────────────────────────

    /// Run `body` with the program `name`, compiling `source` on first use.
    pub fn with_program<R>(
        &mut self,
        name: &str,
        source: &ProgramSource,
        body: impl FnOnce(&mut ProgramScope<'_>) -> Result<R, GpuError>,
    ) -> Result<R, GpuError> {
        self.check_context()?;
        let context = &self.context;
        let program = self.programs.entry(name.to_owned()).or_insert_with(|| {
            log::debug!("Compiling program '{name}' on context {}", context.id());
            Program::compile(&context.device, name, source)
        });
        let mut scope = ProgramScope {
            name,
            context,
            program,
            target: self.framebuffers.last(),
        };
        body(&mut scope)
    }

    /// Run `body` with the texture `name` bound to a fresh texture unit.
    pub fn with_texture<R>(
        &mut self,
        name: &str,
        spec: TextureSpec,
        body: impl FnOnce(&mut TextureScope<'_>) -> Result<R, GpuError>,
    ) -> Result<R, GpuError> {
        self.check_context()?;
        let texture = self.cached_texture(name, spec)?;

        let unit = self.texture_unit + 1;
        let max = self.context.limits().max_sampled_textures_per_shader_stage;
        if unit > max {
            return Err(GpuError::TextureUnits { unit, max });
        }
        log::trace!("Texture unit {unit} -> '{name}'");
        let previous_unit = std::mem::replace(&mut self.texture_unit, unit);

        let mut scope = TextureScope {
            session: self,
            texture,
            unit,
            previous_unit,
        };
        body(&mut scope)
    }

    /// Run `body` with `texture` as the current render target.
    pub fn with_texture_framebuffer<R>(
        &mut self,
        texture: &TextureHandle,
        body: impl FnOnce(&mut FramebufferScope<'_>) -> Result<R, GpuError>,
    ) -> Result<R, GpuError> {
        self.check_context()?;
        if texture.context() != self.context.id() {
            return Err(GpuError::ContextMismatch);
        }
        self.framebuffers.push(texture.view());
        log::trace!("Framebuffer pushed (depth {})", self.framebuffers.len());

        let mut scope = FramebufferScope { session: self };
        body(&mut scope)
    }

    fn cached_texture(&mut self, name: &str, spec: TextureSpec) -> Result<TextureHandle, GpuError> {
        if let Some(existing) = self.textures.get(name) {
            if existing.spec == spec {
                return Ok(existing.clone());
            }
        }
        let texture = TextureHandle::create(&self.context, name, spec)?;
        log::debug!(
            "Allocated texture '{name}' {}x{} {:?}",
            spec.width,
            spec.height,
            spec.format
        );
        self.textures.insert(name.to_owned(), texture.clone());
        if let Some(unconfirmed) = self.unconfirmed_textures.as_mut() {
            unconfirmed.push(name.to_owned());
        }
        Ok(texture)
    }

    // ───────────────────── Capabilities ───────────────────────────

    /// Whether `capability` is available, probing the adapter once.
    pub fn get_extension(&mut self, capability: Capability) -> bool {
        let context = &self.context;
        *self.capabilities.entry(capability).or_insert_with(|| {
            let available = capability.probe(context);
            log::debug!("Capability {capability:?}: {available}");
            available
        })
    }

    pub fn require_extension(&mut self, capability: Capability) -> Result<(), GpuError> {
        if self.get_extension(capability) {
            Ok(())
        } else {
            Err(GpuError::MissingCapability(capability))
        }
    }

    /// Fail with [`GpuError::TextureTooLarge`] if the device cannot hold
    /// a `width × height` texture.
    pub fn check_texture_size(&self, width: u32, height: u32) -> Result<(), GpuError> {
        let max = self.context.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }
        Ok(())
    }

    // ───────────────────── Context loss ───────────────────────────

    /// Fail with [`GpuError::ContextLost`] (evicting every cache) if the
    /// context has been lost.
    pub fn check_context(&mut self) -> Result<(), GpuError> {
        if self.context.is_lost() {
            self.handle_context_loss();
            return Err(GpuError::ContextLost);
        }
        Ok(())
    }

    /// Evict everything built on the lost context. Idempotent.
    pub fn handle_context_loss(&mut self) {
        if self.loss_handled {
            return;
        }
        log::warn!(
            "GPU context {} lost; evicting {} programs and {} textures",
            self.context.id(),
            self.programs.len(),
            self.textures.len()
        );
        self.evict_all();
        self.loss_handled = true;
    }

    /// Force a context loss.
    pub fn lose_context(&mut self) {
        self.context.lose_context();
    }

    /// Continue on a replacement context.
    pub fn restore(&mut self, context: GpuContext) {
        log::info!(
            "Restoring GPU session: context {} replaces {}",
            context.id(),
            self.context.id()
        );
        self.evict_all();
        self.context = context;
        self.loss_handled = false;
    }

    fn evict_all(&mut self) {
        self.programs.clear();
        self.textures.clear();
        self.capabilities.clear();
        self.framebuffers.clear();
        self.texture_unit = 0;
        self.generation += 1;
    }

    /// Run a batch of GPU work inside validation and out-of-memory error
    /// scopes, then check for context loss.
    pub fn scoped<R>(
        &mut self,
        batch: impl FnOnce(&mut Self) -> Result<R, GpuError>,
    ) -> Result<R, GpuError> {
        self.check_context()?;
        self.context.device.push_error_scope(ErrorFilter::OutOfMemory);
        self.context.device.push_error_scope(ErrorFilter::Validation);
        log::trace!("Error scopes pushed");
        let outer = self.unconfirmed_textures.replace(Vec::new());

        let result = batch(self);

        let validation = pollster::block_on(self.context.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.context.device.pop_error_scope());
        log::trace!("Error scopes popped");

        let created = std::mem::replace(&mut self.unconfirmed_textures, outer).unwrap_or_default();
        if validation.is_some() || out_of_memory.is_some() {
            for name in &created {
                log::debug!("Discarding texture '{name}' created in a failed batch");
                self.textures.remove(name);
            }
        } else if let Some(outer) = self.unconfirmed_textures.as_mut() {
            outer.extend(created);
        }

        self.check_context()?;
        if let Some(err) = out_of_memory {
            return Err(GpuError::OutOfMemory(err.to_string()));
        }
        if let Some(err) = validation {
            return Err(GpuError::Validation(err.to_string()));
        }
        result
    }
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::accumulate;
    use crate::vertex::{SdfUniforms, SegmentInstance, ViewportVertex};

    fn headless_session() -> Option<GpuSession> {
        pollster::block_on(GpuContext::new_headless())
            .ok()
            .map(GpuSession::new)
    }

    fn accum_spec(width: u32, height: u32) -> TextureSpec {
        TextureSpec::new(
            width,
            height,
            TextureFormat::Rgba16Float,
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
        )
    }

    #[test]
    fn test_draw_call_builder() {
        let call = DrawCall::new(0..3, 0..7)
            .with_viewport(Viewport::new(1, 2, 3, 4))
            .with_clear(Color::BLACK);
        assert_eq!(call.instances, 0..7);
        assert_eq!(call.viewport, Some(Viewport::new(1, 2, 3, 4)));
        assert!(call.texture.is_none());
        assert_eq!(call.clear, Some(Color::BLACK));
    }

    #[test]
    fn test_fingerprint_distinguishes_data() {
        assert_eq!(fingerprint(&[1, 2, 3]), fingerprint(&[1, 2, 3]));
        assert_ne!(fingerprint(&[1, 2, 3]), fingerprint(&[1, 2, 4]));
    }

    #[test]
    fn test_equal_fingerprints_still_compare_bytes() {
        let stored = [1u8, 2, 3, 4];
        let hash = fingerprint(&stored);
        assert!(same_upload(&stored, hash, &[1, 2, 3, 4], hash));
        // A colliding hash with different bytes must not count as unchanged.
        assert!(!same_upload(&stored, hash, &[4, 3, 2, 1], hash));
        assert!(!same_upload(&stored, hash, &[1, 2, 3], hash));
        assert!(!same_upload(&stored, hash, &stored, hash ^ 1));
    }

    #[test]
    fn test_program_compiled_once() {
        let Some(mut session) = headless_session() else { return };
        for _ in 0..3 {
            session
                .with_program(accumulate::NAME, &accumulate::source(), |_| Ok(()))
                .unwrap();
        }
        assert_eq!(session.program_count(), 1);
    }

    #[test]
    fn test_attribute_uploaded_only_on_change() {
        let Some(mut session) = headless_session() else { return };
        session
            .with_program(accumulate::NAME, &accumulate::source(), |p| {
                let a = [SegmentInstance::new(0.0, 0.0, 1.0, 1.0)];
                let b = [SegmentInstance::new(0.0, 0.0, 2.0, 1.0)];
                assert!(p.set_attribute(1, &a)?);
                assert!(!p.set_attribute(1, &a)?);
                assert!(p.set_attribute(1, &b)?);
                assert!(matches!(
                    p.set_attribute(5, &a),
                    Err(GpuError::UnknownAttribute { slot: 5, .. })
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_uniform_size_checked() {
        let Some(mut session) = headless_session() else { return };
        let err = session
            .with_program(accumulate::NAME, &accumulate::source(), |p| p.set_uniform(&[0u32; 2]))
            .unwrap_err();
        assert!(matches!(err, GpuError::UniformSize { expected: 32, found: 8, .. }));
    }

    #[test]
    fn test_draw_requires_framebuffer() {
        let Some(mut session) = headless_session() else { return };
        let err = session
            .with_program(accumulate::NAME, &accumulate::source(), |p| {
                p.draw(DrawCall::new(0..3, 0..1))
            })
            .unwrap_err();
        assert!(matches!(err, GpuError::NoFramebuffer(_)));
    }

    #[test]
    fn test_texture_units_nest_and_restore() {
        let Some(mut session) = headless_session() else { return };
        session
            .with_texture("a", accum_spec(4, 4), |a| {
                assert_eq!(a.unit(), 1);
                a.with_texture("b", accum_spec(2, 2), |b| {
                    assert_eq!(b.unit(), 2);
                    assert_eq!(b.texture_unit(), 2);
                    Ok(())
                })?;
                assert_eq!(a.texture_unit(), 1);
                Ok(())
            })
            .unwrap();
        assert_eq!(session.texture_unit(), 0);
        assert_eq!(session.texture_count(), 2);
    }

    #[test]
    fn test_texture_recreated_on_spec_change() {
        let Some(mut session) = headless_session() else { return };
        let first = session
            .with_texture("a", accum_spec(4, 4), |t| Ok(t.texture().clone()))
            .unwrap();
        let same = session
            .with_texture("a", accum_spec(4, 4), |t| Ok(t.texture().clone()))
            .unwrap();
        let resized = session
            .with_texture("a", accum_spec(8, 4), |t| Ok(t.texture().clone()))
            .unwrap();
        assert!(Arc::ptr_eq(&first.texture, &same.texture));
        assert!(!Arc::ptr_eq(&first.texture, &resized.texture));
        assert_eq!(resized.size(), (8, 4));
        assert_eq!(session.texture_count(), 1);
    }

    #[test]
    fn test_framebuffer_popped_on_error() {
        let Some(mut session) = headless_session() else { return };
        let result: Result<(), GpuError> = session.with_texture("fb", accum_spec(4, 4), |t| {
            let texture = t.texture().clone();
            t.with_texture_framebuffer(&texture, |fb| {
                assert_eq!(fb.framebuffer_depth(), 1);
                Err(GpuError::Unsupported)
            })
        });
        assert!(matches!(result, Err(GpuError::Unsupported)));
        assert_eq!(session.framebuffer_depth(), 0);
        assert_eq!(session.texture_unit(), 0);
    }

    #[test]
    fn test_accumulate_draw_succeeds_in_scope() {
        let Some(mut session) = headless_session() else { return };
        let params = sdfgen_core::SdfParams::new(4, 4, [0.0, 0.0, 4.0, 4.0])
            .resolve()
            .unwrap();
        let result = session.scoped(|s| {
            s.with_texture("accum", accum_spec(4, 4), |t| {
                let accum = t.texture().clone();
                t.with_texture_framebuffer(&accum, |fb| {
                    fb.with_program(accumulate::NAME, &accumulate::source(), |p| {
                        p.set_uniform(&SdfUniforms::from_params(&params))?;
                        p.set_attribute(0, &ViewportVertex::TRIANGLE)?;
                        p.set_attribute(1, &[SegmentInstance::new(0.0, 0.0, 4.0, 4.0)])?;
                        p.draw(DrawCall::new(0..3, 0..1).with_clear(accumulate::CLEAR))
                    })
                })
            })
        });
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn test_scoped_reports_validation_errors() {
        let Some(mut session) = headless_session() else { return };
        // Zero-sized textures are rejected by validation.
        let result = session.scoped(|s| s.with_texture("empty", accum_spec(0, 4), |_| Ok(())));
        assert!(matches!(result, Err(GpuError::Validation(_))), "{result:?}");
    }

    #[test]
    fn test_failed_batch_does_not_cache_texture() {
        let Some(mut session) = headless_session() else { return };
        let result = session.scoped(|s| {
            s.with_texture("kept", accum_spec(2, 2), |_| Ok(()))?;
            s.with_texture("broken", accum_spec(0, 4), |_| Ok(()))
        });
        assert!(result.is_err());
        assert_eq!(session.texture_count(), 0);

        let result = session.scoped(|s| s.with_texture("kept", accum_spec(2, 2), |_| Ok(())));
        assert!(result.is_ok(), "{result:?}");
        assert_eq!(session.texture_count(), 1);
    }

    #[test]
    fn test_capabilities_cached() {
        let Some(mut session) = headless_session() else { return };
        let first = session.get_extension(Capability::FloatBlend);
        assert_eq!(session.get_extension(Capability::FloatBlend), first);
        assert_eq!(session.require_extension(Capability::FloatBlend).is_ok(), first);
    }

    #[test]
    fn test_texture_size_limit() {
        let Some(session) = headless_session() else { return };
        let max = session.context().limits().max_texture_dimension_2d;
        assert!(session.check_texture_size(max, 1).is_ok());
        assert!(matches!(
            session.check_texture_size(max + 1, 1),
            Err(GpuError::TextureTooLarge { .. })
        ));
    }

    #[test]
    fn test_context_loss_evicts_caches() {
        let Some(mut session) = headless_session() else { return };
        session
            .with_program(accumulate::NAME, &accumulate::source(), |_| Ok(()))
            .unwrap();
        session.with_texture("a", accum_spec(4, 4), |_| Ok(())).unwrap();
        let generation = session.generation();

        session.lose_context();
        assert!(matches!(session.check_context(), Err(GpuError::ContextLost)));
        assert_eq!(session.program_count(), 0);
        assert_eq!(session.texture_count(), 0);
        assert_eq!(session.generation(), generation + 1);

        // Further calls keep failing without touching the device.
        let err = session
            .with_program(accumulate::NAME, &accumulate::source(), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, GpuError::ContextLost));
        assert_eq!(session.program_count(), 0);
    }

    #[test]
    fn test_restore_after_loss() {
        let Some(mut session) = headless_session() else { return };
        let old_id = session.context_id();
        session.lose_context();
        let _ = session.check_context();

        let Ok(replacement) = pollster::block_on(GpuContext::new_headless()) else { return };
        session.restore(replacement);
        assert_ne!(session.context_id(), old_id);
        assert!(!session.is_lost());
        session
            .with_program(accumulate::NAME, &accumulate::source(), |_| Ok(()))
            .unwrap();
        assert_eq!(session.program_count(), 1);
    }

    #[test]
    fn test_foreign_texture_rejected() {
        let Some(mut a) = headless_session() else { return };
        let Some(b) = headless_session() else { return };
        let foreign = TextureHandle::create(b.context(), "foreign", accum_spec(2, 2)).unwrap();
        let err = a.with_texture_framebuffer(&foreign, |_| Ok(())).unwrap_err();
        assert!(matches!(err, GpuError::ContextMismatch));
    }
}
