//! Shader modules and the graphics pipeline
//!
//! Pipelines target dynamic rendering, so they are created against attachment
//! formats rather than a render pass object.

use ash::vk;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Reinterpret SPIR-V bytes as 32-bit words
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(format!("SPIR-V length {} is not a non-zero multiple of 4", bytes.len()));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != 0x0723_0203 {
        return Err(format!("bad SPIR-V magic number {:#010x}", words[0]));
    }
    Ok(words)
}

/// SPIR-V shader module wrapper with automatic resource management
pub struct ShaderModule {
    device: Arc<GraphicsDevice>,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Arc<GraphicsDevice>, path: &Path, bytes: &[u8]) -> VulkanResult<Self> {
        log::debug!("[SHADER] Creating shader module from {} bytes", bytes.len());

        let words = spirv_words(bytes).map_err(|reason| VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            reason,
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe {
            device.handle().create_shader_module(&create_info, None).map_err(|e| {
                log::error!("[SHADER] vkCreateShaderModule failed for {:?}: {:?}", path, e);
                VulkanError::ShaderLoad {
                    path: path.to_path_buf(),
                    reason: format!("{:?}", e),
                }
            })?
        };

        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Arc<GraphicsDevice>, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        log::debug!("[SHADER] Loading shader from: {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            log::error!("[SHADER] Failed to read shader file {:?}: {}", path, e);
            VulkanError::ShaderLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        Self::from_bytes(device, path, &bytes)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Arc<GraphicsDevice>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a layout over `set_layouts` (set index = slice index)
    pub fn new(
        device: Arc<GraphicsDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create pipeline layout: {:?}", e)))?
        };

        Ok(Self { device, layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Inputs to [`GraphicsPipeline::new`]
pub struct PipelineDescription<'a> {
    /// Vertex stage
    pub vertex_shader: &'a ShaderModule,
    /// Fragment stage
    pub fragment_shader: &'a ShaderModule,
    /// Vertex buffer bindings
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    /// Vertex attributes
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    /// Layout the pipeline is created against
    pub layout: &'a PipelineLayout,
    /// Color attachment format
    pub color_format: vk::Format,
    /// Depth attachment format
    pub depth_format: vk::Format,
}

/// Graphics pipeline wrapper with RAII cleanup.
///
/// Triangle lists, no culling, `LESS_OR_EQUAL` depth, straight alpha blending,
/// dynamic viewport and scissor.
pub struct GraphicsPipeline {
    device: Arc<GraphicsDevice>,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Create graphics pipeline
    pub fn new(device: Arc<GraphicsDevice>, desc: &PipelineDescription<'_>) -> VulkanResult<Self> {
        let shader_stages = [
            desc.vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            desc.fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(desc.vertex_bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the values are set per pass
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();
        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let color_formats = [desc.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout.handle());

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, e)| VulkanError::InitializationFailed(format!("Failed to create graphics pipeline: {:?}", e)))?
        };

        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| VulkanError::InitializationFailed("No pipeline returned".to_string()))?;
        device.set_object_name(pipeline, "Sprite Pipeline");

        Ok(Self { device, pipeline })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        log::debug!("[PIPELINE] Dropping GraphicsPipeline {:?}", self.pipeline);
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_spirv_rejects_bad_length() {
        assert!(spirv_words(&[]).is_err());
        assert!(spirv_words(&[0x03, 0x02, 0x23]).is_err());
    }

    #[test]
    fn test_spirv_rejects_bad_magic() {
        let err = spirv_words(&[0, 0, 0, 0]).unwrap_err();
        assert!(err.contains("magic"));
    }
}
