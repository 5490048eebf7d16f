//! Batched descriptor writes
//!
//! Writes are validated against the layout as they are queued and submitted
//! in a single `vkUpdateDescriptorSets` call.

use ash::vk;

use super::layout::{DescriptorSetLayout, LayoutBindings};
use super::pool::DescriptorPool;
use crate::render::backends::vulkan::VulkanResult;

#[derive(Debug, Clone, Copy)]
enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// One queued write
#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: u32,
    ty: vk::DescriptorType,
    info: WriteInfo,
}

fn is_buffer_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

fn is_image_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
    )
}

/// Validated list of writes for one layout
#[derive(Debug, Default)]
pub struct WriteBatch {
    writes: Vec<PendingWrite>,
}

impl WriteBatch {
    fn push(&mut self, bindings: &LayoutBindings, binding: u32, info: WriteInfo) {
        let spec = bindings
            .get(binding)
            .unwrap_or_else(|| panic!("descriptor binding {} is not declared in the layout", binding));
        assert_eq!(
            spec.count, 1,
            "descriptor binding {} holds {} descriptors; only single-descriptor bindings can be written",
            binding, spec.count
        );
        match info {
            WriteInfo::Buffer(_) => assert!(
                is_buffer_type(spec.ty),
                "buffer written to binding {} of type {:?}",
                binding,
                spec.ty
            ),
            WriteInfo::Image(_) => assert!(
                is_image_type(spec.ty),
                "image written to binding {} of type {:?}",
                binding,
                spec.ty
            ),
        }
        self.writes.push(PendingWrite {
            binding,
            ty: spec.ty,
            info,
        });
    }

    /// Queue a buffer write after validating it against `bindings`.
    ///
    /// # Panics
    /// If the binding is undeclared, is an array, or is not a buffer type.
    pub fn push_buffer(&mut self, bindings: &LayoutBindings, binding: u32, info: vk::DescriptorBufferInfo) {
        self.push(bindings, binding, WriteInfo::Buffer(info));
    }

    /// Queue an image write after validating it against `bindings`.
    ///
    /// # Panics
    /// If the binding is undeclared, is an array, or is not an image type.
    pub fn push_image(&mut self, bindings: &LayoutBindings, binding: u32, info: vk::DescriptorImageInfo) {
        self.push(bindings, binding, WriteInfo::Image(info));
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Vulkan write structs targeting `set`. They borrow from `self`.
    fn to_vk(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet> {
        self.writes
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.ty);
                match &write.info {
                    WriteInfo::Buffer(info) => builder.buffer_info(std::slice::from_ref(info)).build(),
                    WriteInfo::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect()
    }
}

/// Descriptor writer bound to one layout
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    batch: WriteBatch,
}

impl<'a> DescriptorWriter<'a> {
    /// Start a batch of writes for sets of `layout`
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            batch: WriteBatch::default(),
        }
    }

    /// Queue a buffer write
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.batch.push_buffer(self.layout.bindings(), binding, info);
        self
    }

    /// Queue an image write
    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.batch.push_image(self.layout.bindings(), binding, info);
        self
    }

    /// Allocate a set from `pool` and apply the queued writes to it
    pub fn build(self, pool: &mut DescriptorPool) -> VulkanResult<vk::DescriptorSet> {
        let set = pool.allocate(self.layout)?;
        self.overwrite(set);
        Ok(set)
    }

    /// Apply the queued writes to an existing set
    pub fn overwrite(self, set: vk::DescriptorSet) {
        let writes = self.batch.to_vk(set);
        unsafe {
            self.layout.device().handle().update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::layout::BindingSpec;
    use super::*;

    fn sprite_bindings() -> LayoutBindings {
        let mut bindings = LayoutBindings::default();
        bindings.insert(
            0,
            BindingSpec {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                stages: vk::ShaderStageFlags::VERTEX,
                count: 1,
            },
        );
        bindings.insert(
            1,
            BindingSpec {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                stages: vk::ShaderStageFlags::FRAGMENT,
                count: 1,
            },
        );
        bindings.insert(
            2,
            BindingSpec {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                stages: vk::ShaderStageFlags::FRAGMENT,
                count: 4,
            },
        );
        bindings
    }

    #[test]
    fn test_valid_writes_batched() {
        let bindings = sprite_bindings();
        let mut batch = WriteBatch::default();
        batch.push_buffer(&bindings, 0, vk::DescriptorBufferInfo::default());
        batch.push_image(&bindings, 1, vk::DescriptorImageInfo::default());

        let writes = batch.to_vk(vk::DescriptorSet::null());
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(writes[0].descriptor_count, 1);
        assert_eq!(writes[1].dst_binding, 1);
        assert_eq!(writes[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }

    #[test]
    #[should_panic(expected = "not declared")]
    fn test_undeclared_binding_panics() {
        let mut batch = WriteBatch::default();
        batch.push_image(&sprite_bindings(), 7, vk::DescriptorImageInfo::default());
    }

    #[test]
    #[should_panic(expected = "single-descriptor")]
    fn test_array_binding_panics() {
        let mut batch = WriteBatch::default();
        batch.push_image(&sprite_bindings(), 2, vk::DescriptorImageInfo::default());
    }

    #[test]
    #[should_panic(expected = "buffer written")]
    fn test_type_mismatch_panics() {
        let mut batch = WriteBatch::default();
        batch.push_buffer(&sprite_bindings(), 1, vk::DescriptorBufferInfo::default());
    }
}
