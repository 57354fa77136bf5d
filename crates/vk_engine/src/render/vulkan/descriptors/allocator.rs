//! Fixed-capacity descriptor allocator
//!
//! One pool, sized once. Exhausting it is a programming error: callers size
//! it for the long-lived sets they know about up front.

use ash::vk;

use super::{pool_sizes, PoolSizeRatio};
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Single-pool descriptor allocator that resets but never grows
#[derive(Debug, Default)]
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

impl DescriptorAllocator {
    /// Create the pool for `max_sets` sets sized by `ratios`
    pub fn init_pool<D: GpuDevice + ?Sized>(
        device: &D,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> VulkanResult<Self> {
        let pool = device.create_descriptor_pool(max_sets, &pool_sizes(ratios, max_sets))?;
        log::debug!("Created fixed descriptor pool for {max_sets} sets");
        Ok(Self { pool })
    }

    /// Allocate one set; an exhausted pool is reported, not recovered
    pub fn allocate<D: GpuDevice + ?Sized>(
        &self,
        device: &D,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        device
            .allocate_descriptor_set(self.pool, layout, None)
            .map_err(VulkanError::Api)
    }

    /// Return every set to the pool; previously issued sets become invalid
    pub fn clear_descriptors<D: GpuDevice + ?Sized>(&self, device: &D) -> VulkanResult<()> {
        device.reset_descriptor_pool(self.pool)
    }

    /// Destroy the pool and every set allocated from it
    pub fn destroy_pool<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        if self.pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(self.pool);
            self.pool = vk::DescriptorPool::null();
        }
    }

    /// Raw pool handle, for handing to a deletion queue
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }
}
