//! Vulkan sprite batch renderer
//!
//! One shared quad, one pipeline, a per-slot screen-size uniform at set 0,
//! and one descriptor set per texture at set 1. Draws are queued between
//! frames and recorded in FIFO order by [`SpriteBatchRenderer::render`].

use ash::vk;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::batch::{SpriteBatch, SpriteTarget};
use super::push::{QuadVertex, ScreenSizeUniform, SpritePushConstants, QUAD_INDICES, QUAD_VERTICES};
use super::queue::DrawCommand;
use super::registry::TextureHandle;
use crate::core::{RendererConfig, MAX_FRAMES_IN_FLIGHT};
use crate::foundation::math::{Color, Rect, Vec2};
use crate::render::backends::vulkan::descriptors::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter,
};
use crate::render::backends::vulkan::resources::{FileImageDecoder, ImageDecoder};
use crate::render::backends::vulkan::{
    GpuBuffer, GpuImage, GraphicsDevice, GraphicsPipeline, MemoryClass, PipelineDescription, PipelineLayout,
    ShaderModule, VulkanError, VulkanResult,
};
use crate::render::frame::{wait_for_visible_extent, FrameScheduler, VulkanFrameBackend};
use crate::render::window::{SurfaceProvider, WindowSurface};

/// A sampled texture and the descriptor set bound to it for its whole life
pub struct Texture {
    descriptor_set: vk::DescriptorSet,
    image: GpuImage,
}

impl Texture {
    /// Set-1 descriptor set for this texture
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Backing image
    pub fn image(&self) -> &GpuImage {
        &self.image
    }
}

/// Records sprite draws into the frame's command buffer
struct FrameSpriteTarget<'a> {
    device: &'a GraphicsDevice,
    command_buffer: vk::CommandBuffer,
    extent: vk::Extent2D,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    frame_set: vk::DescriptorSet,
    screen_uniform: &'a mut GpuBuffer,
}

impl SpriteTarget for FrameSpriteTarget<'_> {
    type Texture = Texture;

    fn update_screen_size(&mut self) -> VulkanResult<()> {
        self.screen_uniform.write_pod(&ScreenSizeUniform {
            size: [self.extent.width as f32, self.extent.height as f32],
        })
    }

    fn bind_shared(&mut self) {
        let device = self.device.handle();
        let cmd = self.command_buffer;
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer, 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.frame_set],
                &[],
            );
        }
    }

    fn draw_sprite(&mut self, texture: &Texture, push: &SpritePushConstants) {
        let device = self.device.handle();
        let cmd = self.command_buffer;
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                1,
                &[texture.descriptor_set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(push),
            );
            device.cmd_draw_indexed(cmd, QUAD_INDICES.len() as u32, 1, 0, 0, 0);
        }
    }
}

/// Queues sprite draws and renders them once per frame.
///
/// Fields drop in declaration order: textures and buffers first, then the
/// pipeline layout, pipeline, and descriptor pool, then the swapchain, and
/// the device last once every other holder has released it.
pub struct SpriteBatchRenderer {
    batch: SpriteBatch<Texture>,
    screen_uniforms: Vec<GpuBuffer>,
    frame_sets: Vec<vk::DescriptorSet>,
    quad_vertices: GpuBuffer,
    quad_indices: GpuBuffer,
    pipeline_layout: PipelineLayout,
    pipeline: GraphicsPipeline,
    texture_layout: DescriptorSetLayout,
    frame_layout: DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    scheduler: FrameScheduler<VulkanFrameBackend>,
    decoder: Box<dyn ImageDecoder>,
    placeholder: PathBuf,
    device: Arc<GraphicsDevice>,
}

impl SpriteBatchRenderer {
    /// Create the device, swapchain, pipeline, and shared sprite resources
    pub fn new<W>(window: &mut W, config: &RendererConfig) -> VulkanResult<Self>
    where
        W: SurfaceProvider + WindowSurface,
    {
        config.validate().map_err(VulkanError::InitializationFailed)?;

        let device = Arc::new(GraphicsDevice::new(&*window, config)?);
        let extent = wait_for_visible_extent(window);
        let backend = VulkanFrameBackend::new(Arc::clone(&device), extent, config.clear_color)?;

        let frame_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            .build(Arc::clone(&device))?;
        let texture_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .build(Arc::clone(&device))?;
        let mut descriptor_pool = DescriptorPoolBuilder::from_quotas(&config.descriptor_quotas).build(Arc::clone(&device))?;

        let uniform_size = std::mem::size_of::<ScreenSizeUniform>() as vk::DeviceSize;
        let mut screen_uniforms = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut frame_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let uniform = GpuBuffer::new(
                Arc::clone(&device),
                &format!("Screen Size UBO {}", slot),
                uniform_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryClass::HostVisible,
            )?;
            let set = DescriptorWriter::new(&frame_layout)
                .write_buffer(
                    0,
                    vk::DescriptorBufferInfo {
                        buffer: uniform.handle(),
                        offset: 0,
                        range: uniform_size,
                    },
                )
                .build(&mut descriptor_pool)?;
            screen_uniforms.push(uniform);
            frame_sets.push(set);
        }

        let quad_vertices = GpuBuffer::with_data(
            Arc::clone(&device),
            "Quad Vertices",
            &QUAD_VERTICES,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryClass::DeviceLocal,
        )?;
        let quad_indices = GpuBuffer::with_data(
            Arc::clone(&device),
            "Quad Indices",
            &QUAD_INDICES,
            vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryClass::DeviceLocal,
        )?;

        let pipeline_layout = PipelineLayout::new(
            Arc::clone(&device),
            &[frame_layout.handle(), texture_layout.handle()],
            &[SpritePushConstants::range()],
        )?;

        let vertex_shader = ShaderModule::from_file(Arc::clone(&device), &config.shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(Arc::clone(&device), &config.shaders.fragment_shader_path)?;
        let vertex_bindings = [QuadVertex::binding_description()];
        let vertex_attributes = QuadVertex::attribute_descriptions();
        let pipeline = GraphicsPipeline::new(
            Arc::clone(&device),
            &PipelineDescription {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_bindings: &vertex_bindings,
                vertex_attributes: &vertex_attributes,
                layout: &pipeline_layout,
                color_format: backend.color_format(),
                depth_format: backend.depth_format(),
            },
        )?;

        log::info!("Sprite renderer ready at {}x{}", extent.width, extent.height);

        Ok(Self {
            batch: SpriteBatch::new(),
            screen_uniforms,
            frame_sets,
            quad_vertices,
            quad_indices,
            pipeline_layout,
            pipeline,
            texture_layout,
            frame_layout,
            descriptor_pool,
            scheduler: FrameScheduler::new(backend),
            decoder: Box::new(FileImageDecoder),
            placeholder: config.placeholder_texture.clone(),
            device,
        })
    }

    /// Replace the decoder used by [`create_texture`](Self::create_texture)
    pub fn set_image_decoder(&mut self, decoder: Box<dyn ImageDecoder>) {
        self.decoder = decoder;
    }

    /// Load an image file as a texture.
    ///
    /// Undecodable files become the placeholder texture; the returned handle
    /// is still fresh. Fails only on GPU errors or descriptor pool exhaustion.
    pub fn create_texture(&mut self, path: impl AsRef<Path>) -> VulkanResult<TextureHandle> {
        let image = GpuImage::from_file(
            Arc::clone(&self.device),
            self.decoder.as_ref(),
            path.as_ref(),
            &self.placeholder,
        )?;
        let sampler = image.sampler().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "texture image has no sampler".to_string(),
        })?;

        let descriptor_set = DescriptorWriter::new(&self.texture_layout)
            .write_image(
                0,
                vk::DescriptorImageInfo {
                    sampler,
                    image_view: image.view(),
                    image_layout: image.layout(),
                },
            )
            .build(&mut self.descriptor_pool)?;

        let extent = image.extent();
        let handle = self.batch.add_texture(Texture { descriptor_set, image }, extent.width, extent.height);
        log::debug!("Texture {:?} registered as handle {}", path.as_ref(), handle.raw());
        Ok(handle)
    }

    /// Queue a sprite draw. A zero-area `src` draws the whole texture.
    pub fn draw_texture(&mut self, texture: TextureHandle, src: Rect, dst: Rect, rotation: f32, color: Color) {
        self.batch.queue(DrawCommand {
            texture,
            src,
            dst,
            rotation,
            color,
        });
    }

    /// Queue an unrotated sprite draw
    pub fn draw_texture_unrotated(&mut self, texture: TextureHandle, src: Rect, dst: Rect, color: Color) {
        self.draw_texture(texture, src, dst, 0.0, color);
    }

    /// Queue the whole texture at `position` scaled to `size`
    pub fn draw_texture_at(&mut self, texture: TextureHandle, position: Vec2, size: Vec2, color: Color) {
        self.draw_texture(texture, Rect::ZERO, Rect::from_position_size(position, size), 0.0, color);
    }

    /// Record and present everything queued since the last call.
    ///
    /// Returns the number of draw calls issued, 0 when the frame was skipped
    /// for swapchain recreation. The queue is empty afterwards in every case.
    /// On error the interrupted frame is discarded and the first error is
    /// returned; the next call starts a fresh frame.
    pub fn render(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<usize> {
        let result = self.render_frame(window);
        // flush already cleared it unless an error cut the frame short
        self.batch.discard_pending();
        if result.is_err() {
            if let Err(err) = self.scheduler.abort_frame(window) {
                log::error!("Failed to discard interrupted frame: {}", err);
            }
        }
        result
    }

    fn render_frame(&mut self, window: &mut dyn WindowSurface) -> VulkanResult<usize> {
        let Some(frame) = self.scheduler.begin_frame(window)? else {
            return Ok(0);
        };
        self.scheduler.begin_render_pass()?;

        let cmd = frame.command_buffer;
        self.device.begin_label(cmd, "Draw Textures");
        let mut target = FrameSpriteTarget {
            device: &self.device,
            command_buffer: cmd,
            extent: frame.extent,
            pipeline: self.pipeline.handle(),
            pipeline_layout: self.pipeline_layout.handle(),
            vertex_buffer: self.quad_vertices.handle(),
            index_buffer: self.quad_indices.handle(),
            frame_set: self.frame_sets[frame.slot],
            screen_uniform: &mut self.screen_uniforms[frame.slot],
        };
        let drawn = self.batch.flush(Some(&mut target))?;
        self.device.end_label(cmd);

        self.scheduler.end_render_pass()?;
        self.scheduler.end_frame(window)?;
        Ok(drawn)
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// Pixel size of a live texture
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.batch.texture_size(texture)
    }

    /// Draws queued for the next frame
    pub fn pending_draws(&self) -> usize {
        self.batch.pending()
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.scheduler.extent()
    }

    /// The underlying device
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }
}

impl Drop for SpriteBatchRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for GPU idle during renderer teardown: {}", e);
        }
        self.batch.clear_textures();
    }
}
