use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::{Result, ViewError};
use crate::geometry::TriangleMesh;
use crate::renderer::backend::{GraphicsBackend, MeshHandle, OutputTarget};
use crate::renderer::camera::{Camera, CameraUniform};
use crate::renderer::host::ElementId;
use crate::renderer::scene::{Background, MAX_DIRECTIONAL_LIGHTS, SceneObject, SceneState};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Clear colour of the composited view when no camera passthrough is available.
const PASSTHROUGH_CLEAR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.06,
    b: 0.08,
    a: 1.0,
};

#[repr(C)]
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub direction: [f32; 4],
    /// rgb colour, w intensity
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniform {
    pub camera: CameraUniform,
    pub sky: [f32; 4],
    pub ground: [f32; 4],
    pub hemisphere: [f32; 4],
    pub lights: [LightUniform; MAX_DIRECTIONAL_LIGHTS],
    pub light_count: [u32; 4],
}

impl FrameUniform {
    pub fn new(scene: &SceneState, camera: &Camera) -> Self {
        let hemi = &scene.lights.hemisphere;
        let up = hemi.position.try_normalize().unwrap_or(glam::Vec3::Y);

        let mut lights = [LightUniform::default(); MAX_DIRECTIONAL_LIGHTS];
        let count = scene.lights.directional.len().min(MAX_DIRECTIONAL_LIGHTS);
        for (slot, light) in lights.iter_mut().zip(&scene.lights.directional) {
            let dir = light.position.try_normalize().unwrap_or(glam::Vec3::Z);
            *slot = LightUniform {
                direction: dir.extend(0.0).to_array(),
                color: [light.color[0], light.color[1], light.color[2], light.intensity],
            };
        }

        Self {
            camera: CameraUniform::from_camera(camera),
            sky: [hemi.sky[0], hemi.sky[1], hemi.sky[2], 1.0],
            ground: [hemi.ground[0], hemi.ground[1], hemi.ground[2], 1.0],
            hemisphere: up.extend(hemi.intensity).to_array(),
            lights,
            light_count: [count as u32, 0, 0, 0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub material: [f32; 4],
}

impl ObjectUniform {
    pub fn new(object: &SceneObject) -> Self {
        let c = object.material.color;
        Self {
            model: object.transform.matrix().to_cols_array_2d(),
            color: [c[0], c[1], c[2], 1.0],
            material: [object.material.metalness, object.material.roughness, 0.0, 0.0],
        }
    }
}

fn clear_color(background: Background) -> wgpu::Color {
    match background {
        Background::Opaque([r, g, b]) => wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        },
        Background::Transparent => wgpu::Color::TRANSPARENT,
    }
}

fn position_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 12,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

fn normal_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 12,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_color_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Surface Color Texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_scene_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[position_layout(), normal_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Per-element colour and depth targets, shown by egui as an image.
struct OffscreenTarget {
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    size: (u32, u32),
    texture_id: egui::TextureId,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
}

struct GpuMesh {
    owner: ElementId,
    vertex_buffer: wgpu::Buffer,
    normal_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    object_buffer: wgpu::Buffer,
    object_bind_group: wgpu::BindGroup,
}

/// The swapchain image for the current window frame.
struct SwapFrame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    composited: bool,
}

pub struct GpuBackend {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,

    offscreen_pipeline: wgpu::RenderPipeline,
    composited_pipeline: wgpu::RenderPipeline,
    frame_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,

    swap_depth: wgpu::TextureView,
    swap_frame: Option<SwapFrame>,

    targets: HashMap<ElementId, OffscreenTarget>,
    meshes: HashMap<MeshHandle, GpuMesh>,
    next_mesh: u64,

    egui_renderer: egui_wgpu::Renderer,
}

impl GpuBackend {
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| ViewError::DrawFailure(format!("cannot create window surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| ViewError::DrawFailure("no compatible graphics adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| ViewError::DrawFailure(format!("cannot open graphics device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .ok_or_else(|| ViewError::DrawFailure("window surface has no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders.wgsl").into()),
        });

        let frame_layout = uniform_layout(&device, "Frame Bind Group Layout");
        let object_layout = uniform_layout(&device, "Object Bind Group Layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let offscreen_pipeline = create_scene_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            OFFSCREEN_FORMAT,
            "Offscreen Scene Pipeline",
        );
        let composited_pipeline = create_scene_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            config.format,
            "Composited Scene Pipeline",
        );

        let swap_depth = create_depth_texture(&device, config.width, config.height);
        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1, false);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            offscreen_pipeline,
            composited_pipeline,
            frame_layout,
            object_layout,
            swap_depth,
            swap_frame: None,
            targets: HashMap::new(),
            meshes: HashMap::new(),
            next_mesh: 0,
            egui_renderer,
        })
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.swap_depth = create_depth_texture(&self.device, self.config.width, self.config.height);
        }
    }

    pub fn set_vsync(&mut self, enabled: bool) {
        self.config.present_mode = if enabled {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        self.surface.configure(&self.device, &self.config);
    }

    /// egui image id for a surface's drawing target.
    pub fn texture_id(&self, element: ElementId) -> Option<egui::TextureId> {
        self.targets.get(&element).map(|t| t.texture_id)
    }

    /// Whether anything was composited into the swapchain this frame.
    pub fn has_composited_frame(&self) -> bool {
        self.swap_frame.as_ref().is_some_and(|f| f.composited)
    }

    fn acquire_frame(&mut self) -> Result<bool> {
        if self.swap_frame.is_some() {
            return Ok(true);
        }
        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.resize(self.size);
                return Ok(false);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(ViewError::DrawFailure("out of GPU memory".into()));
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("swapchain acquire timed out");
                return Ok(false);
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.swap_frame = Some(SwapFrame {
            output,
            view,
            composited: false,
        });
        Ok(true)
    }

    /// Paints the page chrome over whatever the frame holds and presents it.
    pub fn present_ui(
        &mut self,
        paint_jobs: &[egui::ClippedPrimitive],
        textures_delta: egui::TexturesDelta,
        pixels_per_point: f32,
        clear: [f32; 3],
    ) -> Result<()> {
        for (id, delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, delta);
        }

        if !self.acquire_frame()? {
            return Ok(());
        }
        let Some(frame) = self.swap_frame.take() else {
            return Ok(());
        };

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("UI Encoder"),
            });

        let ui_commands = self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            paint_jobs,
            &screen_descriptor,
        );

        let load = if frame.composited {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: clear[0] as f64,
                g: clear[1] as f64,
                b: clear[2] as f64,
                a: 1.0,
            })
        };

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer
                .render(&mut render_pass, paint_jobs, &screen_descriptor);
        }

        for id in &textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(
            ui_commands
                .into_iter()
                .chain(std::iter::once(encoder.finish())),
        );
        frame.output.present();
        Ok(())
    }

    fn write_objects(&self, scene: &SceneState) {
        for object in scene.objects() {
            if let Some(mesh) = self.meshes.get(&object.mesh) {
                self.queue.write_buffer(
                    &mesh.object_buffer,
                    0,
                    bytemuck::cast_slice(&[ObjectUniform::new(object)]),
                );
            }
        }
    }

    fn record_objects(
        meshes: &HashMap<MeshHandle, GpuMesh>,
        scene: &SceneState,
        pass: &mut wgpu::RenderPass<'_>,
    ) {
        for object in scene.objects() {
            let Some(mesh) = meshes.get(&object.mesh) else {
                warn!("scene object {} has no uploaded mesh", object.name);
                continue;
            };
            pass.set_bind_group(1, &mesh.object_bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, mesh.normal_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    fn encode_offscreen(&self, target: &OffscreenTarget, scene: &SceneState) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Surface Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Surface Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color(scene.background)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.offscreen_pipeline);
            pass.set_bind_group(0, &target.frame_bind_group, &[]);
            Self::record_objects(&self.meshes, scene, &mut pass);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn encode_composited(&self, frame: &SwapFrame, target: &OffscreenTarget, scene: &SceneState) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composited Encoder"),
            });
        let (color_load, depth_load) = if frame.composited {
            (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
        } else {
            (wgpu::LoadOp::Clear(PASSTHROUGH_CLEAR), wgpu::LoadOp::Clear(1.0))
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Composited Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.swap_depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.composited_pipeline);
            pass.set_bind_group(0, &target.frame_bind_group, &[]);
            Self::record_objects(&self.meshes, scene, &mut pass);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GraphicsBackend for GpuBackend {
    fn create_target(&mut self, element: ElementId, width: u32, height: u32) -> Result<()> {
        let size = (width.max(1), height.max(1));
        let color_view = create_color_texture(&self.device, size.0, size.1);
        let depth_view = create_depth_texture(&self.device, size.0, size.1);
        let texture_id = self.egui_renderer.register_native_texture(
            &self.device,
            &color_view,
            wgpu::FilterMode::Linear,
        );

        let frame_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &self.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        self.targets.insert(
            element,
            OffscreenTarget {
                color_view,
                depth_view,
                size,
                texture_id,
                frame_buffer,
                frame_bind_group,
            },
        );
        debug!("created GPU target for {element:?} at {}x{}", size.0, size.1);
        Ok(())
    }

    fn resize_target(&mut self, element: ElementId, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        let Some(target) = self.targets.get_mut(&element) else {
            return;
        };
        if target.size == size {
            return;
        }
        target.size = size;
        target.color_view = create_color_texture(&self.device, size.0, size.1);
        target.depth_view = create_depth_texture(&self.device, size.0, size.1);
        self.egui_renderer.update_egui_texture_from_wgpu_texture(
            &self.device,
            &target.color_view,
            wgpu::FilterMode::Linear,
            target.texture_id,
        );
    }

    fn upload_mesh(&mut self, element: ElementId, mesh: &TriangleMesh) -> Result<MeshHandle> {
        if !self.targets.contains_key(&element) {
            return Err(ViewError::DrawFailure(format!("no target for {element:?}")));
        }
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let normal_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Normal Buffer"),
                contents: bytemuck::cast_slice(&mesh.normals),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let object_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Object Uniform Buffer"),
            size: std::mem::size_of::<ObjectUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let object_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Object Bind Group"),
            layout: &self.object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: object_buffer.as_entire_binding(),
            }],
        });

        self.next_mesh += 1;
        let handle = MeshHandle(self.next_mesh);
        self.meshes.insert(
            handle,
            GpuMesh {
                owner: element,
                vertex_buffer,
                normal_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
                object_buffer,
                object_bind_group,
            },
        );
        Ok(handle)
    }

    fn release_mesh(&mut self, handle: MeshHandle) {
        if let Some(mesh) = self.meshes.remove(&handle) {
            mesh.vertex_buffer.destroy();
            mesh.normal_buffer.destroy();
            mesh.index_buffer.destroy();
            mesh.object_buffer.destroy();
        }
    }

    fn draw(
        &mut self,
        element: ElementId,
        output: OutputTarget,
        scene: &SceneState,
        camera: &Camera,
    ) -> Result<()> {
        if !self.targets.contains_key(&element) {
            return Err(ViewError::DrawFailure(format!("no target for {element:?}")));
        }
        if output == OutputTarget::Composited && !self.acquire_frame()? {
            return Ok(());
        }
        let Some(target) = self.targets.get(&element) else {
            return Err(ViewError::DrawFailure(format!("no target for {element:?}")));
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.queue.write_buffer(
            &target.frame_buffer,
            0,
            bytemuck::cast_slice(&[FrameUniform::new(scene, camera)]),
        );
        self.write_objects(scene);

        match output {
            OutputTarget::Surface => self.encode_offscreen(target, scene),
            OutputTarget::Composited => {
                if let Some(frame) = &self.swap_frame {
                    self.encode_composited(frame, target, scene);
                }
                if let Some(frame) = &mut self.swap_frame {
                    frame.composited = true;
                }
            }
        }

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(ViewError::DrawFailure(err.to_string())),
            None => Ok(()),
        }
    }

    fn release_target(&mut self, element: ElementId) {
        let owned: Vec<MeshHandle> = self
            .meshes
            .iter()
            .filter(|(_, mesh)| mesh.owner == element)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in owned {
            self.release_mesh(handle);
        }
        if let Some(target) = self.targets.remove(&element) {
            self.egui_renderer.free_texture(&target.texture_id);
            target.frame_buffer.destroy();
            debug!("released GPU target for {element:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scene::{LightSet, Material, Transform};
    use glam::Vec3;

    #[test]
    fn uniform_layouts_match_the_shader() {
        assert_eq!(std::mem::size_of::<FrameUniform>(), 240);
        assert_eq!(std::mem::size_of::<ObjectUniform>(), 96);
    }

    #[test]
    fn frame_uniform_packs_lights() {
        let scene = SceneState::new(Background::Transparent, LightSet::implant());
        let uniform = FrameUniform::new(&scene, &Camera::default());
        assert_eq!(uniform.light_count[0], 3);
        assert_eq!(uniform.lights[0].direction, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(uniform.lights[0].color[3], 1.5);
        assert_eq!(uniform.hemisphere, [0.0, 1.0, 0.0, 1.0]);

        let anatomy = SceneState::new(Background::Transparent, LightSet::anatomy());
        assert_eq!(FrameUniform::new(&anatomy, &Camera::default()).light_count[0], 1);
    }

    #[test]
    fn object_uniform_carries_material_and_transform() {
        let object = SceneObject {
            name: "bone".into(),
            mesh: MeshHandle(1),
            material: Material::anatomy(),
            transform: Transform {
                translation: Vec3::new(1.0, 2.0, 3.0),
                scale: 0.75,
            },
        };
        let uniform = ObjectUniform::new(&object);
        assert_eq!(uniform.material[..2], [0.8, 0.3]);
        assert_eq!(uniform.model[0][0], 0.75);
        assert_eq!(uniform.model[3][..3], [1.0, 2.0, 3.0]);
    }
}
