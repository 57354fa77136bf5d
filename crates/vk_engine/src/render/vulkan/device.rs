//! The device operations the renderer core depends on
//!
//! Descriptor allocators, the frame ring and the deletion queues never talk
//! to `ash::Device` directly. They go through [`GpuDevice`], which
//! [`VulkanContext`](crate::render::vulkan::VulkanContext) implements over the
//! real device and a recording mock implements in tests.

use ash::vk;

use crate::render::vulkan::deletion_queue::DeferredRelease;
use crate::render::vulkan::VulkanResult;

/// Device operations consumed by the descriptor and frame-lifecycle core
pub trait GpuDevice {
    /// Create a descriptor set layout from fully specified bindings
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout>;

    /// Create a descriptor pool holding at most `max_sets` sets
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<vk::DescriptorPool>;

    /// Return every set of `pool` to it, keeping the pool alive
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VulkanResult<()>;

    /// Destroy `pool` and implicitly free every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate a single set from `pool`.
    ///
    /// The raw result is returned on failure so callers can tell pool
    /// exhaustion apart from fatal errors. `variable_count` is chained as the
    /// variable descriptor count of the layout's last binding.
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> Result<vk::DescriptorSet, vk::Result>;

    /// Apply a batch of descriptor writes in one call
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]);

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;

    /// Block until `fence` signals; a timeout is reported as
    /// [`VulkanError::FenceTimeout`](crate::render::vulkan::VulkanError::FenceTimeout)
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()>;

    /// Return `fence` to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;

    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;

    /// Create a command pool whose buffers can be reset individually
    fn create_command_pool(&self, queue_family: u32) -> VulkanResult<vk::CommandPool>;

    /// Allocate one primary command buffer from `pool`
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer>;

    /// Block until every queue of the device has finished its work
    fn wait_idle(&self) -> VulkanResult<()>;

    /// Destroy a resource whose release was deferred
    fn release(&self, resource: DeferredRelease);
}
