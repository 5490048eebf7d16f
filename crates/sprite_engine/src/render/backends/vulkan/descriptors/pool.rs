//! Descriptor pools with fixed quotas
//!
//! Quotas are tracked on the CPU side so exhaustion is reported as
//! [`VulkanError::OutOfPoolMemory`] before the driver sees the request. The
//! pool never grows.

use ash::vk;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::layout::{DescriptorSetLayout, LayoutBindings};
use crate::core::DescriptorQuotas;
use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// Remaining capacity of a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBudget {
    sets: u32,
    descriptors: BTreeMap<vk::DescriptorType, u32>,
}

impl PoolBudget {
    /// Budget for `max_sets` sets drawing from `sizes`
    pub fn new(max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> Self {
        let mut descriptors = BTreeMap::new();
        for size in sizes {
            *descriptors.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
        Self {
            sets: max_sets,
            descriptors,
        }
    }

    /// Sets that can still be allocated
    pub fn sets_remaining(&self) -> u32 {
        self.sets
    }

    /// Descriptors of `ty` still available
    pub fn descriptors_remaining(&self, ty: vk::DescriptorType) -> u32 {
        self.descriptors.get(&ty).copied().unwrap_or(0)
    }

    /// Check that one set of `bindings` fits
    pub fn check(&self, bindings: &LayoutBindings) -> VulkanResult<()> {
        if self.sets == 0 {
            return Err(VulkanError::OutOfPoolMemory);
        }
        let fits = bindings
            .descriptor_counts()
            .iter()
            .all(|(ty, &needed)| self.descriptors_remaining(*ty) >= needed);
        if fits {
            Ok(())
        } else {
            Err(VulkanError::OutOfPoolMemory)
        }
    }

    /// Consume capacity for one set of `bindings`
    pub fn commit(&mut self, bindings: &LayoutBindings) -> VulkanResult<()> {
        self.check(bindings)?;
        self.sets -= 1;
        for (ty, needed) in bindings.descriptor_counts() {
            if let Some(remaining) = self.descriptors.get_mut(&ty) {
                *remaining -= needed;
            }
        }
        Ok(())
    }
}

/// Descriptor pool builder
pub struct DescriptorPoolBuilder {
    max_sets: u32,
    sizes: Vec<vk::DescriptorPoolSize>,
}

impl DescriptorPoolBuilder {
    /// Start with room for `max_sets` sets and no descriptors
    pub fn new(max_sets: u32) -> Self {
        Self {
            max_sets,
            sizes: Vec::new(),
        }
    }

    /// Builder preloaded from configured quotas
    pub fn from_quotas(quotas: &DescriptorQuotas) -> Self {
        Self::new(quotas.max_sets)
            .add_pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, quotas.combined_image_samplers)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, quotas.uniform_buffers)
    }

    /// Reserve `count` descriptors of `ty`
    pub fn add_pool_size(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        if count > 0 {
            self.sizes.push(vk::DescriptorPoolSize { ty, descriptor_count: count });
        }
        self
    }

    /// Create the pool. Sets are never freed individually, so no flags.
    pub fn build(self, device: Arc<GraphicsDevice>) -> VulkanResult<DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(self.max_sets)
            .pool_sizes(&self.sizes);

        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create descriptor pool: {:?}", e)))?
        };

        Ok(DescriptorPool {
            device,
            pool,
            budget: PoolBudget::new(self.max_sets, &self.sizes),
        })
    }
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    device: Arc<GraphicsDevice>,
    pool: vk::DescriptorPool,
    budget: PoolBudget,
}

impl DescriptorPool {
    /// Pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Remaining capacity
    pub fn budget(&self) -> &PoolBudget {
        &self.budget
    }

    /// Allocate one set of `layout`. Fails with `OutOfPoolMemory` when a quota is exhausted.
    pub(super) fn allocate(&mut self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        self.budget.check(layout.bindings())?;

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) }.map_err(|e| match e {
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => VulkanError::OutOfPoolMemory,
            other => VulkanError::Api(other),
        })?;

        self.budget.commit(layout.bindings())?;
        log::debug!(
            "Allocated descriptor set ({} sets left in pool)",
            self.budget.sets_remaining()
        );
        sets.first()
            .copied()
            .ok_or(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::layout::BindingSpec;
    use super::*;

    fn sampler_bindings() -> LayoutBindings {
        let mut bindings = LayoutBindings::default();
        bindings.insert(
            0,
            BindingSpec {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                stages: vk::ShaderStageFlags::FRAGMENT,
                count: 1,
            },
        );
        bindings
    }

    #[test]
    fn test_budget_counts_down() {
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 3,
        }];
        let mut budget = PoolBudget::new(5, &sizes);
        let bindings = sampler_bindings();

        budget.commit(&bindings).unwrap();
        budget.commit(&bindings).unwrap();
        assert_eq!(budget.sets_remaining(), 3);
        assert_eq!(budget.descriptors_remaining(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 1);
    }

    #[test]
    fn test_exhausted_descriptor_quota() {
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        }];
        let mut budget = PoolBudget::new(10, &sizes);
        let bindings = sampler_bindings();

        budget.commit(&bindings).unwrap();
        assert!(matches!(budget.commit(&bindings), Err(VulkanError::OutOfPoolMemory)));
        // a failed commit leaves the budget untouched
        assert_eq!(budget.sets_remaining(), 9);
    }

    #[test]
    fn test_exhausted_set_quota() {
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 10,
        }];
        let mut budget = PoolBudget::new(1, &sizes);
        let bindings = sampler_bindings();

        budget.commit(&bindings).unwrap();
        assert!(matches!(budget.check(&bindings), Err(VulkanError::OutOfPoolMemory)));
    }

    #[test]
    fn test_missing_type_does_not_fit() {
        let budget = PoolBudget::new(4, &[]);
        assert!(budget.check(&sampler_bindings()).is_err());
        assert!(budget.check(&LayoutBindings::default()).is_ok());
    }

    #[test]
    fn test_quota_builder() {
        let builder = DescriptorPoolBuilder::from_quotas(&DescriptorQuotas::default());
        assert_eq!(builder.max_sets, 200);
        assert_eq!(builder.sizes.len(), 2);
    }
}
