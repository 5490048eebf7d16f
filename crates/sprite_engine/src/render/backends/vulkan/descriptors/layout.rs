//! Descriptor set layouts

use ash::vk;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// Declared shape of one binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSpec {
    /// Descriptor type expected at this slot
    pub ty: vk::DescriptorType,
    /// Shader stages that read it
    pub stages: vk::ShaderStageFlags,
    /// Number of descriptors in the slot
    pub count: u32,
}

/// Binding index to binding spec, in index order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutBindings {
    bindings: BTreeMap<u32, BindingSpec>,
}

impl LayoutBindings {
    /// Register a binding.
    ///
    /// # Panics
    /// If `binding` is already registered.
    pub fn insert(&mut self, binding: u32, spec: BindingSpec) {
        assert!(
            !self.bindings.contains_key(&binding),
            "descriptor binding {} registered twice",
            binding
        );
        self.bindings.insert(binding, spec);
    }

    /// Spec for `binding`, if declared
    pub fn get(&self, binding: u32) -> Option<&BindingSpec> {
        self.bindings.get(&binding)
    }

    /// Number of declared bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no bindings are declared
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Total descriptors of each type one set of this layout consumes
    pub fn descriptor_counts(&self) -> BTreeMap<vk::DescriptorType, u32> {
        let mut counts = BTreeMap::new();
        for spec in self.bindings.values() {
            *counts.entry(spec.ty).or_insert(0) += spec.count;
        }
        counts
    }

    fn to_vk(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings
            .iter()
            .map(|(&binding, spec)| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(spec.ty)
                    .descriptor_count(spec.count)
                    .stage_flags(spec.stages)
                    .build()
            })
            .collect()
    }
}

/// Descriptor set layout builder
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: LayoutBindings,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a binding slot.
    ///
    /// # Panics
    /// If `binding` was already declared.
    pub fn add_binding(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        self.bindings.insert(binding, BindingSpec { ty, stages, count });
        self
    }

    /// Create the layout
    pub fn build(self, device: Arc<GraphicsDevice>) -> VulkanResult<DescriptorSetLayout> {
        let vk_bindings = self.bindings.to_vk();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    device: Arc<GraphicsDevice>,
    layout: vk::DescriptorSetLayout,
    bindings: LayoutBindings,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub(super) fn bindings(&self) -> &LayoutBindings {
        &self.bindings
    }

    pub(super) fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ty: vk::DescriptorType, count: u32) -> BindingSpec {
        BindingSpec {
            ty,
            stages: vk::ShaderStageFlags::FRAGMENT,
            count,
        }
    }

    #[test]
    fn test_bindings_in_index_order() {
        let mut bindings = LayoutBindings::default();
        bindings.insert(2, spec(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1));
        bindings.insert(0, spec(vk::DescriptorType::UNIFORM_BUFFER, 1));

        let vk_bindings = bindings.to_vk();
        assert_eq!(vk_bindings.len(), 2);
        assert_eq!(vk_bindings[0].binding, 0);
        assert_eq!(vk_bindings[1].binding, 2);
        assert_eq!(bindings.get(2).unwrap().ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(bindings.get(1).is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_binding_panics() {
        let _ = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            .add_binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1);
    }

    #[test]
    fn test_descriptor_counts() {
        let mut bindings = LayoutBindings::default();
        bindings.insert(0, spec(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1));
        bindings.insert(1, spec(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2));
        bindings.insert(3, spec(vk::DescriptorType::UNIFORM_BUFFER, 1));

        let counts = bindings.descriptor_counts();
        assert_eq!(counts[&vk::DescriptorType::COMBINED_IMAGE_SAMPLER], 3);
        assert_eq!(counts[&vk::DescriptorType::UNIFORM_BUFFER], 1);
    }
}
