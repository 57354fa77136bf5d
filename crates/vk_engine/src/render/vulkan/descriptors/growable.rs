//! Growable pool-of-pools descriptor allocator
//!
//! Pools live in exactly one of two lists. `ready` holds pools believed to
//! have spare capacity, used as a stack. `full` holds pools that have failed
//! an allocation with `OUT_OF_POOL_MEMORY` or `FRAGMENTED_POOL`. When `ready`
//! runs dry a new pool is created at the current `sets_per_pool`, which then
//! grows by half, up to [`MAX_SETS_PER_POOL`].
//!
//! Sets are never freed individually. [`clear_pools`](GrowableDescriptorAllocator::clear_pools)
//! resets everything at once and returns every pool to `ready`.

use ash::vk;

use super::{pool_sizes, PoolSizeRatio};
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::error::is_pool_exhausted;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Upper bound for the size of newly created pools
pub const MAX_SETS_PER_POOL: u32 = 4092;

/// Retries after an exhausted pool; a fresh pool failing too is fatal
const MAX_ALLOCATION_RETRIES: usize = 1;

fn grown(sets: u32) -> u32 {
    ((sets as f32 * 1.5) as u32).min(MAX_SETS_PER_POOL)
}

/// Descriptor allocator that creates larger pools on demand
#[derive(Debug)]
pub struct GrowableDescriptorAllocator {
    ratios: Vec<PoolSizeRatio>,
    ready_pools: Vec<vk::DescriptorPool>,
    full_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
}

impl GrowableDescriptorAllocator {
    /// Create the first pool with `initial_sets` sets and set the growth
    /// target to one and a half times that
    pub fn init<D: GpuDevice + ?Sized>(
        device: &D,
        initial_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> VulkanResult<Self> {
        if initial_sets == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "growable descriptor allocator needs at least one initial set".to_string(),
            });
        }

        let ratios = ratios.to_vec();
        let pool = device.create_descriptor_pool(initial_sets, &pool_sizes(&ratios, initial_sets))?;

        Ok(Self {
            ratios,
            ready_pools: vec![pool],
            full_pools: Vec::new(),
            sets_per_pool: grown(initial_sets),
        })
    }

    /// Allocate one set, moving to a fresh pool once if the current one is
    /// exhausted.
    ///
    /// `variable_count` is passed through as the variable descriptor count of
    /// the layout's last binding.
    pub fn allocate<D: GpuDevice + ?Sized>(
        &mut self,
        device: &D,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> VulkanResult<vk::DescriptorSet> {
        let mut pool = self.get_pool(device)?;
        let mut retries = 0;

        loop {
            match device.allocate_descriptor_set(pool, layout, variable_count) {
                Ok(set) => {
                    self.ready_pools.push(pool);
                    return Ok(set);
                }
                Err(result) if is_pool_exhausted(result) => {
                    self.full_pools.push(pool);
                    if retries == MAX_ALLOCATION_RETRIES {
                        return Err(VulkanError::DescriptorPoolExhausted(result));
                    }
                    retries += 1;

                    log::debug!("Descriptor pool exhausted ({result:?}); retrying with a fresh pool");
                    pool = self.get_pool(device)?;
                }
                Err(result) => {
                    self.ready_pools.push(pool);
                    return Err(VulkanError::Api(result));
                }
            }
        }
    }

    /// Reset every pool and return all of them to the ready list
    pub fn clear_pools<D: GpuDevice + ?Sized>(&mut self, device: &D) -> VulkanResult<()> {
        for &pool in &self.ready_pools {
            device.reset_descriptor_pool(pool)?;
        }
        while let Some(pool) = self.full_pools.pop() {
            device.reset_descriptor_pool(pool)?;
            self.ready_pools.push(pool);
        }
        Ok(())
    }

    /// Destroy every pool. The growth target is kept; the allocator must be
    /// re-initialised before further use.
    pub fn destroy_pools<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        for pool in self.ready_pools.drain(..).chain(self.full_pools.drain(..)) {
            device.destroy_descriptor_pool(pool);
        }
    }

    /// Size the next newly created pool will have
    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    /// Pools believed to have spare capacity
    pub fn ready_len(&self) -> usize {
        self.ready_pools.len()
    }

    /// Pools that have failed an allocation since the last clear
    pub fn full_len(&self) -> usize {
        self.full_pools.len()
    }

    fn get_pool<D: GpuDevice + ?Sized>(&mut self, device: &D) -> VulkanResult<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }

        let sets = self.sets_per_pool;
        let pool = device.create_descriptor_pool(sets, &pool_sizes(&self.ratios, sets))?;
        self.sets_per_pool = grown(sets);
        log::debug!(
            "Created descriptor pool for {sets} sets; next pool will hold {}",
            self.sets_per_pool
        );
        Ok(pool)
    }
}

impl Drop for GrowableDescriptorAllocator {
    fn drop(&mut self) {
        let remaining = self.ready_pools.len() + self.full_pools.len();
        if remaining > 0 {
            log::warn!("Growable descriptor allocator dropped with {remaining} live pool(s)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::descriptors::DescriptorKind;
    use crate::render::vulkan::testing::MockDevice;

    fn storage_image_ratio() -> Vec<PoolSizeRatio> {
        vec![PoolSizeRatio::new(DescriptorKind::StorageImage, 1.0)]
    }

    fn layout() -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::null()
    }

    #[test]
    fn test_init_creates_single_pool_and_growth_target() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 10, &storage_image_ratio()).unwrap();

        assert_eq!(device.created_pool_sizes(), vec![10]);
        assert_eq!(allocator.sets_per_pool(), 15);
        assert_eq!(allocator.ready_len(), 1);
        assert_eq!(allocator.full_len(), 0);

        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_sixteen_allocations_create_exactly_one_extra_pool() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 10, &storage_image_ratio()).unwrap();

        let sets: Vec<_> = (0..16)
            .map(|_| allocator.allocate(&device, layout(), None).unwrap())
            .collect();

        assert_eq!(device.created_pool_sizes(), vec![10, 15]);
        let second_pool = device.created_pools()[1];
        assert_eq!(device.owner_of(sets[15]), Some(second_pool));
        assert_eq!(device.allocated_from(second_pool), 6);
        assert_eq!(allocator.full_len(), 1);
        assert_eq!(allocator.ready_len(), 1);
        assert_eq!(allocator.sets_per_pool(), 22);

        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_no_speculative_pool_creation_within_capacity() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 10, &storage_image_ratio()).unwrap();

        for _ in 0..10 {
            allocator.allocate(&device, layout(), None).unwrap();
        }

        assert_eq!(device.created_pool_sizes().len(), 1);
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_pool_sizes_follow_ratios_when_growing() {
        let device = MockDevice::new();
        let ratios = vec![
            PoolSizeRatio::new(DescriptorKind::UniformBuffer, 3.0),
            PoolSizeRatio::new(DescriptorKind::CombinedImageSampler, 4.0),
        ];
        let mut allocator = GrowableDescriptorAllocator::init(&device, 2, &ratios).unwrap();

        for _ in 0..3 {
            allocator.allocate(&device, layout(), None).unwrap();
        }

        let grown_pool = device.created_pools()[1];
        assert_eq!(
            device.pool_sizes(grown_pool),
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 9),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 12),
            ]
        );
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_sets_per_pool_is_monotonic_and_capped() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 2000, &storage_image_ratio()).unwrap();
        assert_eq!(allocator.sets_per_pool(), 3000);

        let mut previous = allocator.sets_per_pool();
        for _ in 0..4 {
            // Exhaust whatever pool is on top so the next call has to grow.
            device.fail_next_allocation(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
            allocator.allocate(&device, layout(), None).unwrap();

            let current = allocator.sets_per_pool();
            assert!(current >= previous);
            assert!(current <= MAX_SETS_PER_POOL);
            previous = current;
        }

        assert_eq!(allocator.sets_per_pool(), MAX_SETS_PER_POOL);
        assert!(device.created_pool_sizes().iter().all(|&sets| sets <= MAX_SETS_PER_POOL));
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_initial_growth_target_is_capped() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 4000, &storage_image_ratio()).unwrap();

        assert_eq!(allocator.sets_per_pool(), MAX_SETS_PER_POOL);
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_fragmented_pool_is_retried() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 10, &storage_image_ratio()).unwrap();

        device.fail_next_allocation(vk::Result::ERROR_FRAGMENTED_POOL);
        let set = allocator.allocate(&device, layout(), None).unwrap();

        assert_eq!(device.owner_of(set), Some(device.created_pools()[1]));
        assert_eq!(allocator.full_len(), 1);
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_second_exhaustion_is_fatal() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 10, &storage_image_ratio()).unwrap();

        device.fail_next_allocation(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        device.fail_next_allocation(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        let err = allocator.allocate(&device, layout(), None).unwrap_err();

        assert!(matches!(
            err,
            VulkanError::DescriptorPoolExhausted(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
        ));
        // One retry only: the first pool plus a single fresh one.
        assert_eq!(device.created_pool_sizes().len(), 2);
        assert_eq!(allocator.full_len() + allocator.ready_len(), 2);
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 10, &storage_image_ratio()).unwrap();

        device.fail_next_allocation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = allocator.allocate(&device, layout(), None).unwrap_err();

        assert!(matches!(err, VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)));
        assert_eq!(device.created_pool_sizes().len(), 1);
        assert_eq!(allocator.ready_len(), 1);
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_clear_pools_moves_full_to_ready() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 2, &storage_image_ratio()).unwrap();
        for _ in 0..6 {
            allocator.allocate(&device, layout(), None).unwrap();
        }
        let before = allocator.ready_len() + allocator.full_len();
        let growth_target = allocator.sets_per_pool();
        assert!(allocator.full_len() > 0);

        allocator.clear_pools(&device).unwrap();

        assert_eq!(allocator.full_len(), 0);
        assert_eq!(allocator.ready_len(), before);
        assert_eq!(allocator.sets_per_pool(), growth_target);
        assert_eq!(device.pool_resets(), before);
        for pool in device.created_pools() {
            assert_eq!(device.allocated_from(pool), 0);
        }
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_cleared_pools_are_reused_before_creating_more() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 2, &storage_image_ratio()).unwrap();
        for _ in 0..5 {
            allocator.allocate(&device, layout(), None).unwrap();
        }
        let created = device.created_pool_sizes().len();

        allocator.clear_pools(&device).unwrap();
        for _ in 0..5 {
            allocator.allocate(&device, layout(), None).unwrap();
        }

        assert_eq!(device.created_pool_sizes().len(), created);
        allocator.destroy_pools(&device);
    }

    #[test]
    fn test_destroy_pools_leaks_nothing() {
        let device = MockDevice::new();
        let mut allocator =
            GrowableDescriptorAllocator::init(&device, 2, &storage_image_ratio()).unwrap();
        for _ in 0..7 {
            allocator.allocate(&device, layout(), None).unwrap();
        }
        let growth_target = allocator.sets_per_pool();

        allocator.destroy_pools(&device);

        assert_eq!(allocator.ready_len(), 0);
        assert_eq!(allocator.full_len(), 0);
        assert_eq!(device.live_pools(), 0);
        assert_eq!(device.destroyed_pools().len(), device.created_pools().len());
        assert_eq!(allocator.sets_per_pool(), growth_target);
    }

    #[test]
    fn test_zero_initial_sets_is_rejected() {
        let device = MockDevice::new();
        let result = GrowableDescriptorAllocator::init(&device, 0, &storage_image_ratio());

        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(device.live_pools(), 0);
    }
}
