//! Recording mock of [`GpuDevice`] for unit tests
//!
//! Tracks descriptor pools with their capacity, every allocation, batched
//! descriptor writes, fence state and the order of deferred releases, so
//! tests can check allocator growth, leak freedom and frame sequencing
//! without a GPU.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use ash::vk::{self, Handle};

use crate::render::vulkan::deletion_queue::DeferredRelease;
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A release observed by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    /// Resource kind as reported by [`DeferredRelease::kind`]
    pub kind: &'static str,
    /// Raw handle of the primary object
    pub raw: u64,
}

impl Released {
    /// Release record of `kind` for handle `raw`
    pub fn new(kind: &'static str, raw: u64) -> Self {
        Self { kind, raw }
    }
}

/// One descriptor write as it reached the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Target set
    pub set: vk::DescriptorSet,
    /// Binding index
    pub binding: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Buffer, offset and range of a buffer write
    pub buffer: Option<(vk::Buffer, vk::DeviceSize, vk::DeviceSize)>,
    /// View, sampler and layout of an image write
    pub image: Option<(vk::ImageView, vk::Sampler, vk::ImageLayout)>,
}

/// One layout binding as it reached the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedBinding {
    /// Binding index
    pub binding: u32,
    /// Descriptor type
    pub descriptor_type: vk::DescriptorType,
    /// Array size
    pub descriptor_count: u32,
    /// Stages that see the binding
    pub stage_flags: vk::ShaderStageFlags,
}

#[derive(Debug)]
struct MockPool {
    max_sets: u32,
    allocated: u32,
    sizes: Vec<(vk::DescriptorType, u32)>,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    layouts: HashMap<u64, Vec<RecordedBinding>>,
    pools: HashMap<u64, MockPool>,
    created_pools: Vec<(vk::DescriptorPool, u32)>,
    destroyed_pools: Vec<vk::DescriptorPool>,
    pool_resets: usize,
    set_owner: HashMap<u64, vk::DescriptorPool>,
    forced_failures: VecDeque<vk::Result>,
    commits: Vec<Vec<RecordedWrite>>,
    fences: HashMap<u64, bool>,
    fence_waits: usize,
    idle_waits: Vec<usize>,
    failed_idle_waits: VecDeque<vk::Result>,
    released: Vec<Released>,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// In-memory stand-in for a Vulkan device
#[derive(Debug, Default)]
pub struct MockDevice {
    state: RefCell<MockState>,
}

impl MockDevice {
    /// Mock with no objects
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings a layout was created with
    pub fn layout_bindings(&self, layout: vk::DescriptorSetLayout) -> Vec<RecordedBinding> {
        self.state.borrow().layouts.get(&layout.as_raw()).cloned().unwrap_or_default()
    }

    /// `max_sets` of every pool ever created, in creation order
    pub fn created_pool_sizes(&self) -> Vec<u32> {
        self.state.borrow().created_pools.iter().map(|(_, sets)| *sets).collect()
    }

    /// Handles of every pool ever created, in creation order
    pub fn created_pools(&self) -> Vec<vk::DescriptorPool> {
        self.state.borrow().created_pools.iter().map(|(pool, _)| *pool).collect()
    }

    /// Pools created and not yet destroyed
    pub fn live_pools(&self) -> usize {
        self.state.borrow().pools.len()
    }

    /// Pools destroyed so far, in order
    pub fn destroyed_pools(&self) -> Vec<vk::DescriptorPool> {
        self.state.borrow().destroyed_pools.clone()
    }

    /// Number of pool resets performed
    pub fn pool_resets(&self) -> usize {
        self.state.borrow().pool_resets
    }

    /// Sets currently allocated from `pool`
    pub fn allocated_from(&self, pool: vk::DescriptorPool) -> u32 {
        self.state.borrow().pools.get(&pool.as_raw()).map_or(0, |p| p.allocated)
    }

    /// Descriptor counts `pool` was created with
    pub fn pool_sizes(&self, pool: vk::DescriptorPool) -> Vec<(vk::DescriptorType, u32)> {
        self.state
            .borrow()
            .pools
            .get(&pool.as_raw())
            .map(|p| p.sizes.clone())
            .unwrap_or_default()
    }

    /// Pool a set was allocated from
    pub fn owner_of(&self, set: vk::DescriptorSet) -> Option<vk::DescriptorPool> {
        self.state.borrow().set_owner.get(&set.as_raw()).copied()
    }

    /// Make the next allocation fail with `result` regardless of capacity
    pub fn fail_next_allocation(&self, result: vk::Result) {
        self.state.borrow_mut().forced_failures.push_back(result);
    }

    /// Every batched descriptor update, in order
    pub fn commits(&self) -> Vec<Vec<RecordedWrite>> {
        self.state.borrow().commits.clone()
    }

    /// Simulate the GPU finishing the work guarded by `fence`
    pub fn signal_fence(&self, fence: vk::Fence) {
        self.state.borrow_mut().fences.insert(fence.as_raw(), true);
    }

    /// Current state of `fence`
    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence.as_raw()).copied().unwrap_or(false)
    }

    /// Number of fence waits performed
    pub fn fence_waits(&self) -> usize {
        self.state.borrow().fence_waits
    }

    /// Make the next idle wait fail with `result`
    pub fn fail_next_idle_wait(&self, result: vk::Result) {
        self.state.borrow_mut().failed_idle_waits.push_back(result);
    }

    /// For every successful idle wait, how many releases had happened before it
    pub fn idle_waits(&self) -> Vec<usize> {
        self.state.borrow().idle_waits.clone()
    }

    /// Every release observed, in order
    pub fn released(&self) -> Vec<Released> {
        self.state.borrow().released.clone()
    }
}

impl GpuDevice for MockDevice {
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        _flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let mut state = self.state.borrow_mut();
        let layout = vk::DescriptorSetLayout::from_raw(state.handle());
        let recorded = bindings
            .iter()
            .map(|b| RecordedBinding {
                binding: b.binding,
                descriptor_type: b.descriptor_type,
                descriptor_count: b.descriptor_count,
                stage_flags: b.stage_flags,
            })
            .collect();
        state.layouts.insert(layout.as_raw(), recorded);
        Ok(layout)
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<vk::DescriptorPool> {
        let mut state = self.state.borrow_mut();
        let pool = vk::DescriptorPool::from_raw(state.handle());
        state.pools.insert(
            pool.as_raw(),
            MockPool {
                max_sets,
                allocated: 0,
                sizes: pool_sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect(),
            },
        );
        state.created_pools.push((pool, max_sets));
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        state.pool_resets += 1;
        let entry = state
            .pools
            .get_mut(&pool.as_raw())
            .ok_or(VulkanError::Api(vk::Result::ERROR_UNKNOWN))?;
        entry.allocated = 0;
        state.set_owner.retain(|_, owner| *owner != pool);
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.borrow_mut();
        state.pools.remove(&pool.as_raw());
        state.destroyed_pools.push(pool);
        state.set_owner.retain(|_, owner| *owner != pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
        _variable_count: Option<u32>,
    ) -> Result<vk::DescriptorSet, vk::Result> {
        let mut state = self.state.borrow_mut();
        if let Some(forced) = state.forced_failures.pop_front() {
            return Err(forced);
        }

        let entry = state.pools.get_mut(&pool.as_raw()).ok_or(vk::Result::ERROR_UNKNOWN)?;
        if entry.allocated >= entry.max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        entry.allocated += 1;

        let set = vk::DescriptorSet::from_raw(state.handle());
        state.set_owner.insert(set.as_raw(), pool);
        Ok(set)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let recorded = writes
            .iter()
            .map(|write| {
                // The pointers are valid for the duration of this call.
                let buffer = (!write.p_buffer_info.is_null()).then(|| {
                    let info = unsafe { *write.p_buffer_info };
                    (info.buffer, info.offset, info.range)
                });
                let image = (!write.p_image_info.is_null()).then(|| {
                    let info = unsafe { *write.p_image_info };
                    (info.image_view, info.sampler, info.image_layout)
                });
                RecordedWrite {
                    set: write.dst_set,
                    binding: write.dst_binding,
                    descriptor_type: write.descriptor_type,
                    buffer,
                    image,
                }
            })
            .collect();
        self.state.borrow_mut().commits.push(recorded);
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let fence = vk::Fence::from_raw(state.handle());
        state.fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        state.fence_waits += 1;
        match state.fences.get(&fence.as_raw()) {
            Some(true) => Ok(()),
            Some(false) => Err(VulkanError::FenceTimeout { timeout_ns }),
            None => Err(VulkanError::Api(vk::Result::ERROR_UNKNOWN)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        self.state.borrow_mut().fences.insert(fence.as_raw(), false);
        Ok(())
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let mut state = self.state.borrow_mut();
        Ok(vk::Semaphore::from_raw(state.handle()))
    }

    fn create_command_pool(&self, _queue_family: u32) -> VulkanResult<vk::CommandPool> {
        let mut state = self.state.borrow_mut();
        Ok(vk::CommandPool::from_raw(state.handle()))
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let mut state = self.state.borrow_mut();
        Ok(vk::CommandBuffer::from_raw(state.handle()))
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(result) = state.failed_idle_waits.pop_front() {
            return Err(VulkanError::Api(result));
        }
        let released = state.released.len();
        state.idle_waits.push(released);
        Ok(())
    }

    fn release(&self, resource: DeferredRelease) {
        let kind = resource.kind();
        let raw = match &resource {
            DeferredRelease::Buffer(buffer) => buffer.buffer.as_raw(),
            DeferredRelease::Image(image) => image.image.as_raw(),
            DeferredRelease::ImageView(view) => view.as_raw(),
            DeferredRelease::Sampler(sampler) => sampler.as_raw(),
            DeferredRelease::DescriptorPool(pool) => pool.as_raw(),
            DeferredRelease::DescriptorSetLayout(layout) => layout.as_raw(),
            DeferredRelease::Pipeline(pipeline) => pipeline.as_raw(),
            DeferredRelease::PipelineLayout(layout) => layout.as_raw(),
            DeferredRelease::ShaderModule(module) => module.as_raw(),
            DeferredRelease::CommandPool(pool) => pool.as_raw(),
            DeferredRelease::Fence(fence) => fence.as_raw(),
            DeferredRelease::Semaphore(semaphore) => semaphore.as_raw(),
        };

        let mut state = self.state.borrow_mut();
        match resource {
            DeferredRelease::DescriptorPool(pool) => {
                state.pools.remove(&pool.as_raw());
                state.destroyed_pools.push(pool);
            }
            DeferredRelease::Fence(fence) => {
                state.fences.remove(&fence.as_raw());
            }
            _ => {}
        }
        state.released.push(Released::new(kind, raw));
    }
}
