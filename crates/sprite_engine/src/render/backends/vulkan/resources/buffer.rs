//! GPU buffers backed by allocator memory
//!
//! Two memory classes: device-local buffers are never mapped and are filled
//! through a staging copy; host-visible buffers are persistently mapped by
//! the allocator and written directly.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// Where a buffer's memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    /// Fastest for the GPU, not CPU-accessible
    DeviceLocal,
    /// CPU-writable, persistently mapped
    HostVisible,
}

impl MemoryClass {
    fn location(self) -> MemoryLocation {
        match self {
            Self::DeviceLocal => MemoryLocation::GpuOnly,
            Self::HostVisible => MemoryLocation::CpuToGpu,
        }
    }
}

/// Who mapped the buffer's memory, and therefore who must unmap it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingOwner {
    /// Not mapped
    Unmapped,
    /// Mapped at allocation time by the allocator; released when the allocation is freed
    Allocator,
}

/// Round `[offset, offset + size)` out to `atom` boundaries, clamped to `total`
pub fn aligned_flush_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    total: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom.max(1);
    let start = offset / atom * atom;
    let end = (offset + size).div_ceil(atom) * atom;
    (start, end.min(total.div_ceil(atom) * atom) - start)
}

/// Buffer plus its allocation
pub struct GpuBuffer {
    device: Arc<GraphicsDevice>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    class: MemoryClass,
    mapping: MappingOwner,
}

impl GpuBuffer {
    /// Create an uninitialised buffer.
    ///
    /// Device-local buffers get `TRANSFER_DST` added so [`copy_to`](Self::copy_to)
    /// can stage into them.
    pub fn new(
        device: Arc<GraphicsDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        class: MemoryClass,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("buffer '{}' has zero size", name),
            });
        }

        let usage = match class {
            MemoryClass::DeviceLocal => usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryClass::HostVisible => usage,
        };

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let vk_device = device.handle();
        let buffer = unsafe { vk_device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { vk_device.get_buffer_memory_requirements(buffer) };

        let allocation = match device.allocate(name, requirements, class.location(), true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { vk_device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { vk_device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) } {
            unsafe { vk_device.destroy_buffer(buffer, None) };
            device.free(allocation);
            return Err(VulkanError::Api(e));
        }

        let mapping = if allocation.mapped_ptr().is_some() {
            MappingOwner::Allocator
        } else {
            MappingOwner::Unmapped
        };
        device.set_object_name(buffer, name);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            class,
            mapping,
        })
    }

    /// Create a buffer and fill it with `data`
    pub fn with_data<T: bytemuck::Pod>(
        device: Arc<GraphicsDevice>,
        name: &str,
        data: &[T],
        usage: vk::BufferUsageFlags,
        class: MemoryClass,
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(device, name, bytes.len() as vk::DeviceSize, usage, class)?;
        buffer.copy_to(bytes)?;
        Ok(buffer)
    }

    /// Write `data` at the start of the buffer.
    ///
    /// Mapped buffers are written in place. Unmapped buffers go through a
    /// host-visible staging buffer and a single-time copy, so this path is for
    /// setup only.
    pub fn copy_to(&mut self, data: &[u8]) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes exceeds buffer size {}", data.len(), self.size),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        match self.mapping {
            MappingOwner::Allocator => {
                let mapped = self
                    .allocation
                    .as_mut()
                    .and_then(|allocation| allocation.mapped_slice_mut())
                    .ok_or_else(|| VulkanError::InvalidOperation {
                        reason: "mapped buffer lost its mapping".to_string(),
                    })?;
                mapped[..data.len()].copy_from_slice(data);
                self.flush(0, data.len() as vk::DeviceSize)
            }
            MappingOwner::Unmapped => {
                let mut staging = Self::new(
                    Arc::clone(&self.device),
                    "staging",
                    data.len() as vk::DeviceSize,
                    vk::BufferUsageFlags::TRANSFER_SRC,
                    MemoryClass::HostVisible,
                )?;
                staging.copy_to(data)?;
                staging.copy_to_buffer(self, data.len() as vk::DeviceSize)
            }
        }
    }

    /// Write one plain-old-data value at the start of the buffer
    pub fn write_pod<T: bytemuck::Pod>(&mut self, value: &T) -> VulkanResult<()> {
        self.copy_to(bytemuck::bytes_of(value))
    }

    /// Make host writes in `[offset, offset + size)` visible to the device.
    ///
    /// Coherent memory needs nothing; non-coherent ranges are widened to the
    /// device's atom size before flushing.
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> VulkanResult<()> {
        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(());
        };
        if self.mapping == MappingOwner::Unmapped
            || allocation
                .memory_properties()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }

        let (start, len) = aligned_flush_range(
            allocation.offset() + offset,
            size,
            self.device.non_coherent_atom_size(),
            allocation.offset() + allocation.size(),
        );
        let range = vk::MappedMemoryRange::builder()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(len);

        unsafe {
            self.device
                .handle()
                .flush_mapped_memory_ranges(&[range.build()])
                .map_err(VulkanError::Api)
        }
    }

    /// Device-side copy of the first `size` bytes into `dst`. Setup only.
    pub fn copy_to_buffer(&self, dst: &GpuBuffer, size: vk::DeviceSize) -> VulkanResult<()> {
        if size > self.size || size > dst.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("copy of {} bytes exceeds source {} or destination {}", size, self.size, dst.size),
            });
        }
        self.device.copy_buffer(self.buffer, dst.buffer, size)
    }

    /// Buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes as requested at creation
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Memory class the buffer was created with
    pub fn memory_class(&self) -> MemoryClass {
        self.class
    }

    /// Current mapping ownership
    pub fn mapping(&self) -> MappingOwner {
        self.mapping
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        // Allocator-owned mappings are released by the free below
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.free(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_class_locations() {
        assert_eq!(MemoryClass::DeviceLocal.location(), MemoryLocation::GpuOnly);
        assert_eq!(MemoryClass::HostVisible.location(), MemoryLocation::CpuToGpu);
    }

    #[test]
    fn test_flush_range_alignment() {
        assert_eq!(aligned_flush_range(0, 8, 64, 256), (0, 64));
        assert_eq!(aligned_flush_range(70, 10, 64, 256), (64, 64));
        assert_eq!(aligned_flush_range(60, 10, 64, 256), (0, 128));
    }

    #[test]
    fn test_flush_range_clamped_to_allocation() {
        // 100-byte allocation rounds up to 128 with a 64-byte atom
        assert_eq!(aligned_flush_range(90, 10, 64, 100), (64, 64));
        assert_eq!(aligned_flush_range(0, 100, 1, 100), (0, 100));
    }
}
