use std::borrow::Cow;
use std::collections::HashMap;

use image::imageops::flip_vertical_in_place;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::backend::{
    BackendError, BufferHandle, DecodedFrame, ProgramHandle, RenderBackend, ShaderHandle,
    ShaderStage, SurfaceSize, TextureHandle, UniformLocation, UniformValue, UploadOptions,
};
use crate::sizing::{SurfaceGeometry, Viewport};

use super::context::GpuContext;
use super::translate::{translate_fragment, translate_vertex, DeclaredUniforms};
use super::uniforms::{FrameParams, UniformSlot};
use super::validate::check_translated;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
const QUAD_STRIDE: wgpu::BufferAddress = 2 * std::mem::size_of::<f32>() as wgpu::BufferAddress;

struct ShaderObject {
    stage: ShaderStage,
    module: Option<wgpu::ShaderModule>,
    uniforms: DeclaredUniforms,
    attributes: Vec<String>,
}

#[derive(Default)]
struct ProgramObject {
    pipeline: Option<wgpu::RenderPipeline>,
    uniforms: DeclaredUniforms,
    attributes: Vec<String>,
    vertex_buffer: Option<BufferHandle>,
}

struct BufferObject {
    buffer: wgpu::Buffer,
    vertex_count: u32,
}

#[derive(Default)]
struct TextureObject {
    storage: Option<TextureStorage>,
}

struct TextureStorage {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

/// [`RenderBackend`] on top of wgpu, rendering into a window swapchain.
///
/// The render surface is a rectangle centred inside the swapchain; pixels
/// outside it are cleared to black.
pub struct WgpuBackend {
    context: GpuContext,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    placeholder_bind_group: wgpu::BindGroup,
    next_handle: u32,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    buffers: HashMap<u32, BufferObject>,
    textures: HashMap<u32, TextureObject>,
    current_program: Option<ProgramHandle>,
    bound_texture: Option<TextureHandle>,
    params: FrameParams,
    surface_size: Option<SurfaceSize>,
    viewport: Viewport,
}

impl WgpuBackend {
    /// Creates a backend presenting into `target`.
    pub fn new<T>(target: T, initial_size: SurfaceSize) -> Result<Self, BackendError>
    where
        T: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        let context = GpuContext::new(target, initial_size)
            .map_err(|err| BackendError::ContextUnavailable(format!("{err:#}")))?;
        let device = &context.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("media texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("preview pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let params = FrameParams::default();
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("frame uniforms"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("media sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // Unbound samplers read opaque black.
        let placeholder = device.create_texture_with_data(
            &context.queue,
            &texture_descriptor("placeholder media texture", 1, 1),
            TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let placeholder_bind_group =
            create_texture_bind_group(device, &texture_layout, &placeholder, &sampler);

        let viewport = Viewport::full(context.size());
        Ok(Self {
            context,
            texture_layout,
            pipeline_layout,
            uniform_buffer,
            uniform_bind_group,
            sampler,
            placeholder_bind_group,
            next_handle: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            current_program: None,
            bound_texture: None,
            params,
            surface_size: None,
            viewport,
        })
    }

    /// Reconfigures the swapchain after the window changed size.
    pub fn resize_swapchain(&mut self, size: SurfaceSize) {
        self.context.resize(size);
        self.update_viewport();
    }

    /// Where the render surface sits inside the window.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn allocate(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn update_viewport(&mut self) {
        let swapchain = self.context.size();
        self.viewport = match self.surface_size {
            Some(size) => SurfaceGeometry {
                width: size.width,
                height: size.height,
            }
            .letterbox(swapchain),
            None => Viewport::full(swapchain),
        };
        self.params.set_viewport(&self.viewport);
    }

    fn create_module(
        &self,
        label: &str,
        source: String,
        stage: wgpu::naga::ShaderStage,
    ) -> Result<wgpu::ShaderModule, String> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Glsl {
                shader: Cow::Owned(source),
                stage,
                defines: &[],
            },
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(format!("ERROR: {err}\n")),
            None => Ok(module),
        }
    }

    fn upload(
        &mut self,
        texture: TextureHandle,
        frame: &DecodedFrame,
        options: UploadOptions,
    ) -> Result<(), BackendError> {
        let (width, height) = frame.dimensions();
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || frame.data.len() != expected {
            return Err(BackendError::UnknownHandle(format!(
                "frame data for {texture} does not match {width}x{height} RGBA"
            )));
        }

        let needs_storage = self
            .textures
            .get(&texture.raw())
            .ok_or_else(|| BackendError::UnknownHandle(texture.to_string()))?
            .storage
            .as_ref()
            .map_or(true, |storage| storage.size != (width, height));
        if needs_storage {
            let storage = self.create_storage(width, height)?;
            if let Some(object) = self.textures.get_mut(&texture.raw()) {
                object.storage = Some(storage);
            }
        }
        let Some(storage) = self
            .textures
            .get(&texture.raw())
            .and_then(|object| object.storage.as_ref())
        else {
            return Err(BackendError::UnknownHandle(texture.to_string()));
        };

        let flipped;
        let data: &[u8] = if options.flip_y {
            let mut image = image::RgbaImage::from_raw(width, height, frame.data.clone())
                .ok_or_else(|| BackendError::UnknownHandle(texture.to_string()))?;
            flip_vertical_in_place(&mut image);
            flipped = image.into_raw();
            &flipped
        } else {
            &frame.data
        };

        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_storage(&self, width: u32, height: u32) -> Result<TextureStorage, BackendError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&texture_descriptor("media texture", width, height));
        let bind_group =
            create_texture_bind_group(device, &self.texture_layout, &texture, &self.sampler);
        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = out_of_memory.or(validation) {
            return Err(BackendError::OutOfMemory {
                resource: "texture",
                reason: err.to_string(),
            });
        }
        tracing::debug!(width, height, "allocated media texture");
        Ok(TextureStorage {
            texture,
            bind_group,
            size: (width, height),
        })
    }

    fn acquire_frame(&self) -> Result<wgpu::SurfaceTexture, BackendError> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure();
                Err(BackendError::SurfaceUnavailable("surface lost; reconfigured".into()))
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(BackendError::OutOfMemory {
                resource: "surface frame",
                reason: "out of memory acquiring the next frame".into(),
            }),
            Err(other) => Err(BackendError::SurfaceUnavailable(other.to_string())),
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn create_shader(&mut self, stage: ShaderStage) -> Result<ShaderHandle, BackendError> {
        let raw = self.allocate();
        self.shaders.insert(
            raw,
            ShaderObject {
                stage,
                module: None,
                uniforms: DeclaredUniforms::default(),
                attributes: Vec::new(),
            },
        );
        Ok(ShaderHandle::from_raw(raw))
    }

    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> Result<(), String> {
        let stage = self
            .shaders
            .get(&shader.raw())
            .map(|object| object.stage)
            .ok_or_else(|| format!("ERROR: unknown {shader}\n"))?;
        let (translated, naga_stage) = match stage {
            ShaderStage::Vertex => (translate_vertex(source), wgpu::naga::ShaderStage::Vertex),
            ShaderStage::Fragment => (
                translate_fragment(source),
                wgpu::naga::ShaderStage::Fragment,
            ),
        };
        check_translated(&translated)?;

        let label = format!("{stage} {shader}");
        let module = self.create_module(&label, translated.source, naga_stage)?;
        if let Some(object) = self.shaders.get_mut(&shader.raw()) {
            object.module = Some(module);
            object.uniforms = translated.uniforms;
            object.attributes = translated.attributes;
        }
        Ok(())
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.raw());
    }

    fn create_program(&mut self) -> Result<ProgramHandle, BackendError> {
        let raw = self.allocate();
        self.programs.insert(raw, ProgramObject::default());
        Ok(ProgramHandle::from_raw(raw))
    }

    fn link_program(
        &mut self,
        program: ProgramHandle,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<(), String> {
        let (Some(vertex_object), Some(fragment_object)) = (
            self.shaders.get(&vertex.raw()),
            self.shaders.get(&fragment.raw()),
        ) else {
            return Err("ERROR: link failed: unknown shader object\n".into());
        };
        let (Some(vertex_module), Some(fragment_module)) =
            (vertex_object.module.as_ref(), fragment_object.module.as_ref())
        else {
            return Err("ERROR: link failed: shader was not compiled\n".into());
        };

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("preview pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some("main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: QUAD_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.context.surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(format!("ERROR: link failed: {err}\n"));
        }

        let uniforms = fragment_object.uniforms;
        let attributes = vertex_object.attributes.clone();
        let object = self
            .programs
            .get_mut(&program.raw())
            .ok_or_else(|| format!("ERROR: unknown {program}\n"))?;
        object.pipeline = Some(pipeline);
        object.uniforms = uniforms;
        object.attributes = attributes;
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.raw());
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let object = self.programs.get(&program.raw())?;
        object
            .attributes
            .iter()
            .position(|attribute| attribute == name)
            .map(|index| index as u32)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let object = self.programs.get(&program.raw())?;
        object.uniforms.slot(name).map(UniformSlot::location)
    }

    fn create_buffer(&mut self, vertices: &[f32]) -> Result<BufferHandle, BackendError> {
        let buffer = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad vertices"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let raw = self.allocate();
        self.buffers.insert(
            raw,
            BufferObject {
                buffer,
                vertex_count: (vertices.len() / 2) as u32,
            },
        );
        Ok(BufferHandle::from_raw(raw))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(object) = self.buffers.remove(&buffer.raw()) {
            object.buffer.destroy();
        }
    }

    fn bind_vertex_attribute(
        &mut self,
        program: ProgramHandle,
        buffer: BufferHandle,
        location: u32,
        components: u32,
    ) {
        if location != 0 || components != 2 {
            tracing::warn!(
                location,
                components,
                "only a vec2 attribute at location 0 is supported"
            );
            return;
        }
        if let Some(object) = self.programs.get_mut(&program.raw()) {
            object.vertex_buffer = Some(buffer);
        }
    }

    fn create_texture(&mut self) -> Result<TextureHandle, BackendError> {
        let raw = self.allocate();
        self.textures.insert(raw, TextureObject::default());
        Ok(TextureHandle::from_raw(raw))
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        frame: &DecodedFrame,
        options: UploadOptions,
    ) -> Result<(), BackendError> {
        self.upload(texture, frame, options)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        if let Some(object) = self.textures.remove(&texture.raw()) {
            if let Some(storage) = object.storage {
                storage.texture.destroy();
            }
        }
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.surface_size = Some(size);
        self.update_viewport();
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current_program = Some(program);
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        match UniformSlot::from_location(location) {
            Some(slot) => self.params.set(slot, value),
            None => tracing::warn!(?location, "unknown uniform location"),
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if unit == 0 {
            self.bound_texture = texture;
        } else {
            tracing::warn!(unit, "only texture unit 0 is supported");
        }
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), BackendError> {
        let program = self
            .current_program
            .ok_or_else(|| BackendError::UnknownHandle("no program in use".into()))?;
        let object = self
            .programs
            .get(&program.raw())
            .ok_or_else(|| BackendError::UnknownHandle(program.to_string()))?;
        let pipeline = object
            .pipeline
            .as_ref()
            .ok_or_else(|| BackendError::UnknownHandle(format!("{program} is not linked")))?;
        let buffer = object
            .vertex_buffer
            .and_then(|buffer| self.buffers.get(&buffer.raw()))
            .ok_or_else(|| BackendError::UnknownHandle(format!("{program} has no geometry")))?;
        let end = first.saturating_add(count).min(buffer.vertex_count);

        let frame = self.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let texture_bind_group = self
            .bound_texture
            .and_then(|texture| self.textures.get(&texture.raw()))
            .and_then(|object| object.storage.as_ref())
            .map_or(&self.placeholder_bind_group, |storage| &storage.bind_group);

        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.params));

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("preview frame"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("preview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let viewport = self.viewport;
            render_pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            render_pass.set_bind_group(1, texture_bind_group, &[]);
            render_pass.set_vertex_buffer(0, buffer.buffer.slice(..));
            render_pass.draw(first..end, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn texture_descriptor(label: &str, width: u32, height: u32) -> wgpu::TextureDescriptor<'_> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    texture: &wgpu::Texture,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("media texture bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
