//! Frames in flight
//!
//! A fixed ring of [`FrameSlot`]s, selected by `frame_number % N`. Each slot
//! owns its command buffer, synchronization objects, a deletion queue and a
//! growable descriptor allocator. A slot moves through
//! `Idle -> Recording -> Submitted`; the return to `Idle` is only observed
//! when the slot is selected again and its fence wait succeeds.
//!
//! The render fence is reset only once the frame is certain to be submitted
//! (after a successful swapchain acquire). A frame abandoned earlier keeps its
//! fence signaled, so the next wait on it cannot hang.

use ash::vk;

use crate::render::vulkan::deletion_queue::{DeferredRelease, DeletionQueue};
use crate::render::vulkan::descriptors::{GrowableDescriptorAllocator, PoolSizeRatio};
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Lifecycle of one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Free, or submitted work not yet observed complete
    Idle,
    /// Commands are being recorded on the CPU
    Recording,
    /// Handed to the GPU; the render fence signals completion
    Submitted,
}

/// Parameters for building a [`FrameRing`]
#[derive(Debug, Clone)]
pub struct FrameSettings {
    /// Number of slots
    pub frames_in_flight: usize,
    /// Bound on the render-fence wait, in nanoseconds
    pub fence_timeout_ns: u64,
    /// Queue family the command pools are created for
    pub queue_family: u32,
    /// Initial set count of each slot's descriptor allocator
    pub descriptor_sets: u32,
    /// Pool ratios of each slot's descriptor allocator
    pub descriptor_ratios: Vec<PoolSizeRatio>,
}

/// Per-frame GPU resources
#[derive(Debug)]
pub struct FrameSlot {
    /// Pool the main command buffer comes from
    pub command_pool: vk::CommandPool,
    /// Command buffer re-recorded every time the slot is used
    pub main_command_buffer: vk::CommandBuffer,
    /// Signaled when the acquired swapchain image is ready
    pub swapchain_semaphore: vk::Semaphore,
    /// Signaled when rendering finishes; presentation waits on it
    pub render_semaphore: vk::Semaphore,
    /// Signaled when the slot's submitted work completes
    pub render_fence: vk::Fence,
    /// Resources to release once this slot's work is known complete
    pub deletion_queue: DeletionQueue,
    /// Descriptor sets valid for one use of the slot
    pub descriptors: GrowableDescriptorAllocator,
    state: FrameState,
}

impl FrameSlot {
    fn new<D: GpuDevice + ?Sized>(device: &D, settings: &FrameSettings) -> VulkanResult<Self> {
        let command_pool = device.create_command_pool(settings.queue_family)?;
        let main_command_buffer = device.allocate_command_buffer(command_pool)?;

        // Signaled so the very first wait returns immediately.
        let render_fence = device.create_fence(true)?;
        let swapchain_semaphore = device.create_semaphore()?;
        let render_semaphore = device.create_semaphore()?;

        let descriptors = GrowableDescriptorAllocator::init(
            device,
            settings.descriptor_sets,
            &settings.descriptor_ratios,
        )?;

        Ok(Self {
            command_pool,
            main_command_buffer,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
            deletion_queue: DeletionQueue::new("frame deletion queue"),
            descriptors,
            state: FrameState::Idle,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> FrameState {
        self.state
    }
}

/// Round-robin ring of frame slots
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<FrameSlot>,
    frame_number: u64,
    fence_timeout_ns: u64,
}

impl FrameRing {
    /// Create every slot
    pub fn new<D: GpuDevice + ?Sized>(device: &D, settings: &FrameSettings) -> VulkanResult<Self> {
        if settings.frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "at least one frame in flight is required".to_string(),
            });
        }

        let slots = (0..settings.frames_in_flight)
            .map(|_| FrameSlot::new(device, settings))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created {} frame slot(s)", slots.len());
        Ok(Self {
            slots,
            frame_number: 0,
            fence_timeout_ns: settings.fence_timeout_ns,
        })
    }

    /// Frames submitted so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring has no slots (never true for a constructed ring)
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot the next frame uses
    pub fn current_index(&self) -> usize {
        (self.frame_number % self.slots.len() as u64) as usize
    }

    /// Slot the next frame uses
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current_index()]
    }

    /// Mutable access to the slot the next frame uses
    pub fn current_mut(&mut self) -> &mut FrameSlot {
        let index = self.current_index();
        &mut self.slots[index]
    }

    /// Move the current slot to `Recording`.
    ///
    /// Waits for the slot's previous submission, then releases everything
    /// deferred during that use and resets its descriptor pools. A fence that
    /// does not signal within the timeout is returned as
    /// [`VulkanError::FenceTimeout`] and leaves the slot untouched.
    pub fn begin_frame<D: GpuDevice + ?Sized>(&mut self, device: &D) -> VulkanResult<&mut FrameSlot> {
        let timeout_ns = self.fence_timeout_ns;
        let slot = self.current_mut();
        if slot.state == FrameState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: "frame slot is already recording".to_string(),
            });
        }

        device.wait_for_fence(slot.render_fence, timeout_ns)?;

        slot.deletion_queue.flush(device);
        slot.descriptors.clear_pools(device)?;
        slot.state = FrameState::Recording;
        Ok(slot)
    }

    /// Unsignal the current slot's fence ahead of submission
    pub fn arm_fence<D: GpuDevice + ?Sized>(&mut self, device: &D) -> VulkanResult<()> {
        let slot = self.current_mut();
        if slot.state != FrameState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: "only a recording frame can arm its fence".to_string(),
            });
        }
        device.reset_fence(slot.render_fence)
    }

    /// Abandon the current frame without submitting; the slot is reused next
    pub fn cancel_recording(&mut self) {
        let slot = self.current_mut();
        if slot.state == FrameState::Recording {
            slot.state = FrameState::Idle;
        }
    }

    /// Record that the current slot's work was submitted and advance the ring
    pub fn mark_submitted(&mut self) -> VulkanResult<()> {
        let slot = self.current_mut();
        if slot.state != FrameState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: "only a recording frame can be submitted".to_string(),
            });
        }
        slot.state = FrameState::Submitted;
        self.frame_number += 1;
        Ok(())
    }

    /// Release every slot's resources; the device must be idle
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        for slot in &mut self.slots {
            device.release(DeferredRelease::CommandPool(slot.command_pool));
            device.release(DeferredRelease::Fence(slot.render_fence));
            device.release(DeferredRelease::Semaphore(slot.render_semaphore));
            device.release(DeferredRelease::Semaphore(slot.swapchain_semaphore));

            slot.deletion_queue.flush(device);
            slot.descriptors.destroy_pools(device);
        }
        self.slots.clear();
    }
}

/// Release the frame ring and then the process-wide queue, once the device
/// is idle.
///
/// If the idle wait fails nothing is released; the caller leaks the
/// resources rather than destroying ones the GPU may still read.
pub fn shutdown<D: GpuDevice + ?Sized>(
    device: &D,
    frames: &mut FrameRing,
    main_queue: &mut DeletionQueue,
) -> VulkanResult<()> {
    device.wait_idle()?;
    frames.destroy(device);
    main_queue.flush(device);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::descriptors::DescriptorKind;
    use crate::render::vulkan::testing::{MockDevice, Released};
    use ash::vk::Handle;

    fn settings(frames_in_flight: usize) -> FrameSettings {
        FrameSettings {
            frames_in_flight,
            fence_timeout_ns: 1_000_000_000,
            queue_family: 0,
            descriptor_sets: 4,
            descriptor_ratios: vec![PoolSizeRatio::new(DescriptorKind::UniformBuffer, 1.0)],
        }
    }

    /// Record and submit one frame, then let the GPU finish it
    fn run_frame(ring: &mut FrameRing, device: &MockDevice) -> vk::Fence {
        let fence = ring.begin_frame(device).unwrap().render_fence;
        ring.arm_fence(device).unwrap();
        ring.mark_submitted().unwrap();
        fence
    }

    #[test]
    fn test_new_creates_independent_slots() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();

        assert_eq!(ring.len(), 2);
        assert_eq!(device.live_pools(), 2);
        assert_ne!(ring.slots[0].render_fence, ring.slots[1].render_fence);
        assert!(device.is_fence_signaled(ring.slots[0].render_fence));
        assert!(ring.slots.iter().all(|s| s.state() == FrameState::Idle));

        ring.destroy(&device);
    }

    #[test]
    fn test_zero_frames_in_flight_is_rejected() {
        let device = MockDevice::new();
        assert!(FrameRing::new(&device, &settings(0)).is_err());
    }

    #[test]
    fn test_slots_are_selected_round_robin() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();

        let mut order = Vec::new();
        for _ in 0..4 {
            order.push(ring.current_index());
            let fence = run_frame(&mut ring, &device);
            device.signal_fence(fence);
        }

        assert_eq!(order, vec![0, 1, 0, 1]);
        assert_eq!(ring.frame_number(), 4);
        ring.destroy(&device);
    }

    #[test]
    fn test_begin_frame_flushes_previous_use_of_slot() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();

        let slot = ring.begin_frame(&device).unwrap();
        slot.deletion_queue
            .push(DeferredRelease::Sampler(vk::Sampler::from_raw(900)));
        let fence_0 = slot.render_fence;
        ring.arm_fence(&device).unwrap();
        ring.mark_submitted().unwrap();

        // Slot 1 records while slot 0 is still in flight.
        let fence_1 = run_frame(&mut ring, &device);
        assert!(device.released().is_empty());

        device.signal_fence(fence_0);
        ring.begin_frame(&device).unwrap();
        assert_eq!(device.released(), vec![Released::new("sampler", 900)]);

        device.signal_fence(fence_1);
        ring.cancel_recording();
        ring.destroy(&device);
    }

    #[test]
    fn test_begin_frame_resets_descriptor_pools() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(1)).unwrap();

        let slot = ring.begin_frame(&device).unwrap();
        slot.descriptors
            .allocate(&device, vk::DescriptorSetLayout::null(), None)
            .unwrap();
        let fence = slot.render_fence;
        let resets_before = device.pool_resets();
        ring.arm_fence(&device).unwrap();
        ring.mark_submitted().unwrap();

        device.signal_fence(fence);
        ring.begin_frame(&device).unwrap();

        assert!(device.pool_resets() > resets_before);
        assert!(device.created_pools().iter().all(|&p| device.allocated_from(p) == 0));
        ring.cancel_recording();
        ring.destroy(&device);
    }

    #[test]
    fn test_unsignaled_fence_times_out_as_error() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(1)).unwrap();
        run_frame(&mut ring, &device);

        let slot_fence = ring.current().render_fence;
        ring.current_mut()
            .deletion_queue
            .push(DeferredRelease::Sampler(vk::Sampler::from_raw(5)));
        let waits_before = device.fence_waits();

        let err = ring.begin_frame(&device).unwrap_err();

        assert_eq!(device.fence_waits(), waits_before + 1);

        assert!(matches!(err, VulkanError::FenceTimeout { timeout_ns: 1_000_000_000 }));
        assert_eq!(ring.current().state(), FrameState::Submitted);
        assert!(device.released().is_empty());

        device.signal_fence(slot_fence);
        ring.destroy(&device);
    }

    #[test]
    fn test_fence_stays_signaled_until_armed() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(1)).unwrap();

        let fence = ring.begin_frame(&device).unwrap().render_fence;
        assert!(device.is_fence_signaled(fence));

        ring.arm_fence(&device).unwrap();
        assert!(!device.is_fence_signaled(fence));

        ring.mark_submitted().unwrap();
        device.signal_fence(fence);
        ring.destroy(&device);
    }

    #[test]
    fn test_cancelled_frame_can_begin_again() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();

        ring.begin_frame(&device).unwrap();
        ring.cancel_recording();

        assert_eq!(ring.current_index(), 0);
        assert_eq!(ring.current().state(), FrameState::Idle);
        assert!(ring.begin_frame(&device).is_ok());
        ring.cancel_recording();
        ring.destroy(&device);
    }

    #[test]
    fn test_state_machine_rejects_out_of_order_calls() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(1)).unwrap();

        assert!(ring.mark_submitted().is_err());
        assert!(ring.arm_fence(&device).is_err());

        ring.begin_frame(&device).unwrap();
        assert!(ring.begin_frame(&device).is_err());

        ring.cancel_recording();
        ring.destroy(&device);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();
        ring.current_mut()
            .deletion_queue
            .push(DeferredRelease::ImageView(vk::ImageView::from_raw(77)));

        ring.destroy(&device);

        let released = device.released();
        assert_eq!(released.iter().filter(|r| r.kind == "command pool").count(), 2);
        assert_eq!(released.iter().filter(|r| r.kind == "fence").count(), 2);
        assert_eq!(released.iter().filter(|r| r.kind == "semaphore").count(), 4);
        assert!(released.contains(&Released::new("image view", 77)));
        assert_eq!(device.live_pools(), 0);
        assert!(ring.is_empty());
    }

    fn main_queue_with(raws: &[u64]) -> DeletionQueue {
        let mut queue = DeletionQueue::new("main");
        for &raw in raws {
            queue.push(DeferredRelease::Pipeline(vk::Pipeline::from_raw(raw)));
        }
        queue
    }

    #[test]
    fn test_shutdown_waits_for_idle_before_any_release() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();
        let mut main_queue = main_queue_with(&[900, 901]);

        shutdown(&device, &mut ring, &mut main_queue).unwrap();

        assert_eq!(device.idle_waits(), vec![0]);
        assert!(!device.released().is_empty());
    }

    #[test]
    fn test_shutdown_releases_frame_slots_before_main_queue() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();
        ring.current_mut()
            .deletion_queue
            .push(DeferredRelease::ImageView(vk::ImageView::from_raw(500)));
        let mut main_queue = main_queue_with(&[900, 901]);

        shutdown(&device, &mut ring, &mut main_queue).unwrap();

        let released = device.released();
        let first_main = released
            .iter()
            .position(|r| r.kind == "pipeline")
            .unwrap();
        let last_frame = released
            .iter()
            .rposition(|r| r.kind != "pipeline")
            .unwrap();
        assert!(last_frame < first_main);
        assert!(released[..first_main].contains(&Released::new("image view", 500)));
        assert_eq!(device.live_pools(), 0);
    }

    #[test]
    fn test_shutdown_flushes_main_queue_exactly_once() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(1)).unwrap();
        let mut main_queue = main_queue_with(&[900, 901, 902]);

        shutdown(&device, &mut ring, &mut main_queue).unwrap();

        let pipelines: Vec<u64> = device
            .released()
            .iter()
            .filter(|r| r.kind == "pipeline")
            .map(|r| r.raw)
            .collect();
        assert_eq!(pipelines, vec![902, 901, 900]);
        assert!(main_queue.is_empty());
    }

    #[test]
    fn test_failed_idle_wait_releases_nothing() {
        let device = MockDevice::new();
        let mut ring = FrameRing::new(&device, &settings(2)).unwrap();
        let mut main_queue = main_queue_with(&[900]);
        device.fail_next_idle_wait(vk::Result::ERROR_DEVICE_LOST);

        let err = shutdown(&device, &mut ring, &mut main_queue).unwrap_err();

        assert!(matches!(err, VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
        assert!(device.released().is_empty());
        assert!(device.idle_waits().is_empty());
        assert_eq!(ring.len(), 2);
        assert_eq!(main_queue.len(), 1);
        assert_eq!(device.live_pools(), 2);
    }
}
