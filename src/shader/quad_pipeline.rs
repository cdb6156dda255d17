//! The textured quad: pipeline state, vertex buffers and the draw call.

use super::{GpuContext, ShaderLibrary};
use crate::bridge::FrameTexture;
use crate::geometry::{self, QuadOrientation, QUAD_POSITIONS, QUAD_VERTEX_COUNT};
use std::borrow::Cow;
use wgpu::util::DeviceExt;

/// Render pipeline drawing one triangle strip over the whole target.
pub struct QuadPipeline {
    render_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    position_buffer: wgpu::Buffer,
    tex_coord_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    /// Bound when there is no camera texture
    placeholder: wgpu::TextureView,
    orientation: QuadOrientation,
}

impl QuadPipeline {
    /// Creates the pipeline for a target of `target_format`.
    pub fn new(
        gpu: &GpuContext,
        library: &ShaderLibrary,
        target_format: wgpu::TextureFormat,
        orientation: QuadOrientation,
    ) -> Self {
        let device = &gpu.device;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(library.vertex_wgsl.as_str())),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(library.fragment_wgsl.as_str())),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Texture Bind Group Layout"),
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
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(library.vertex_entry.as_str()),
                buffers: &[geometry::position_layout(), geometry::tex_coord_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(library.fragment_entry.as_str()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
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
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let position_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Position Buffer"),
            contents: bytemuck::cast_slice(&QUAD_POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let tex_coord_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Tex Coord Buffer"),
            contents: bytemuck::cast_slice(&orientation.tex_coords()),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Quad Texture Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let placeholder = device.create_texture_with_data(
            &gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some("Placeholder Texture"),
                size: wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Bgra8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0, 0, 0, 255],
        );
        let placeholder = placeholder.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            render_pipeline,
            bind_group_layout,
            position_buffer,
            tex_coord_buffer,
            sampler,
            placeholder,
            orientation,
        }
    }

    /// Rewrites the texture coordinates for a new orientation.
    pub fn set_orientation(&mut self, gpu: &GpuContext, orientation: QuadOrientation) {
        if orientation == self.orientation {
            return;
        }
        gpu.queue
            .write_buffer(&self.tex_coord_buffer, 0, bytemuck::cast_slice(&orientation.tex_coords()));
        self.orientation = orientation;
    }

    /// Draws the quad into `target`, sampling `texture` or the placeholder,
    /// and submits the commands.
    pub fn draw(
        &self,
        gpu: &GpuContext,
        target: &wgpu::TextureView,
        texture: Option<&FrameTexture<'_>>,
        clear: wgpu::Color,
    ) {
        let view = texture.map_or(&self.placeholder, |t| t.view());
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Quad Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Quad Render Encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Quad Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_vertex_buffer(0, self.position_buffer.slice(..));
            render_pass.set_vertex_buffer(1, self.tex_coord_buffer.slice(..));
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}
