//! GPU-side sprite data: push constants, screen uniform, quad vertices

use ash::vk;

use crate::foundation::math::Rect;

/// Per-draw push constant block, laid out to match the sprite shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpritePushConstants {
    /// Source rect in UV space (x, y, width, height)
    pub src_rect: [f32; 4],
    /// Destination rect in pixels (x, y, width, height)
    pub dst_rect: [f32; 4],
    /// Rotation in radians
    pub rotation: f32,
    /// Pads `color` to its 16-byte std430 offset
    pub _padding: [f32; 3],
    /// Tint (RGBA)
    pub color: [f32; 4],
}

unsafe impl bytemuck::Pod for SpritePushConstants {}
unsafe impl bytemuck::Zeroable for SpritePushConstants {}

impl SpritePushConstants {
    /// Size of the block in bytes
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Push constant range used by the sprite pipeline layout
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: Self::SIZE,
        }
    }
}

/// Map a source rect in texture pixels to UV space.
///
/// A rect without a positive width and height selects the whole texture.
pub fn normalized_source(src: &Rect, texture_width: u32, texture_height: u32) -> [f32; 4] {
    if !src.has_positive_size() {
        return [0.0, 0.0, 1.0, 1.0];
    }
    let width = texture_width.max(1) as f32;
    let height = texture_height.max(1) as f32;
    [src.x / width, src.y / height, src.width / width, src.height / height]
}

/// Set-0 uniform: the render target size in pixels
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSizeUniform {
    /// Width and height
    pub size: [f32; 2],
}

unsafe impl bytemuck::Pod for ScreenSizeUniform {}
unsafe impl bytemuck::Zeroable for ScreenSizeUniform {}

/// Unit quad vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadVertex {
    /// Position in quad space, -1..1
    pub position: [f32; 3],
    /// Texture coordinate, 0..1
    pub tex_coord: [f32; 2],
}

unsafe impl bytemuck::Pod for QuadVertex {}
unsafe impl bytemuck::Zeroable for QuadVertex {}

impl QuadVertex {
    const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, 0.0],
            tex_coord: [u, v],
        }
    }

    /// Vertex buffer binding at binding 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position at location 0, texture coordinate at location 1
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::size_of::<[f32; 3]>() as u32,
            },
        ]
    }
}

/// Shared quad, counter-clockwise from the top-left corner in texture space
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex::new(-1.0, -1.0, 0.0, 0.0),
    QuadVertex::new(1.0, -1.0, 1.0, 0.0),
    QuadVertex::new(1.0, 1.0, 1.0, 1.0),
    QuadVertex::new(-1.0, 1.0, 0.0, 1.0),
];

/// Two triangles over [`QUAD_VERTICES`]
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_constant_layout() {
        assert_eq!(SpritePushConstants::SIZE, 64);
        assert_eq!(std::mem::offset_of!(SpritePushConstants, dst_rect), 16);
        assert_eq!(std::mem::offset_of!(SpritePushConstants, rotation), 32);
        assert_eq!(std::mem::offset_of!(SpritePushConstants, color), 48);
    }

    #[test]
    fn test_zero_area_source_is_whole_texture() {
        assert_eq!(normalized_source(&Rect::ZERO, 64, 64), [0.0, 0.0, 1.0, 1.0]);
        let degenerate = Rect::new(10.0, 10.0, 0.0, 25.0);
        assert_eq!(normalized_source(&degenerate, 128, 32), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_negative_or_nan_source_is_whole_texture() {
        let flipped = Rect::new(0.0, 0.0, -32.0, 32.0);
        assert_eq!(normalized_source(&flipped, 64, 64), [0.0, 0.0, 1.0, 1.0]);
        let upside_down = Rect::new(8.0, 8.0, 16.0, -16.0);
        assert_eq!(normalized_source(&upside_down, 64, 64), [0.0, 0.0, 1.0, 1.0]);
        let nan = Rect::new(0.0, 0.0, f32::NAN, 16.0);
        assert_eq!(normalized_source(&nan, 64, 64), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_source_divided_by_texture_size() {
        let uv = normalized_source(&Rect::new(16.0, 8.0, 32.0, 16.0), 64, 32);
        assert_relative_eq!(uv[0], 0.25);
        assert_relative_eq!(uv[1], 0.25);
        assert_relative_eq!(uv[2], 0.5);
        assert_relative_eq!(uv[3], 0.5);
    }

    #[test]
    fn test_quad_vertex_layout() {
        assert_eq!(QuadVertex::binding_description().stride, 20);
        assert_eq!(QuadVertex::attribute_descriptions()[1].offset, 12);
        assert_eq!(bytemuck::cast_slice::<u32, u8>(&QUAD_INDICES).len(), 24);
    }
}
