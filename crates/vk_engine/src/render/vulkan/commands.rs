//! Command recording and blocking one-off submissions

use ash::{vk, Device};

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::deletion_queue::{DeferredRelease, DeletionQueue};
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::sync::submit_commands;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Reset `cmd` and begin recording it for a single submission
pub fn begin_one_time(device: &Device, cmd: vk::CommandBuffer) -> VulkanResult<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(VulkanError::Api)?;
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(VulkanError::Api)
    }
}

/// Finish recording `cmd`
pub fn end_recording(device: &Device, cmd: vk::CommandBuffer) -> VulkanResult<()> {
    unsafe { device.end_command_buffer(cmd) }.map_err(VulkanError::Api)
}

/// Blocking submission path for uploads and other setup work
///
/// Owns its own command pool, command buffer and fence, so it never touches
/// the frame ring. Each call waits for the GPU before returning.
#[derive(Debug)]
pub struct ImmediateSubmit {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    timeout_ns: u64,
}

impl ImmediateSubmit {
    /// Create the pool, buffer and fence for `queue_family`
    pub fn new<D: GpuDevice + ?Sized>(
        device: &D,
        queue_family: u32,
        timeout_ns: u64,
    ) -> VulkanResult<Self> {
        let command_pool = device.create_command_pool(queue_family)?;
        let command_buffer = device.allocate_command_buffer(command_pool)?;
        let fence = device.create_fence(true)?;

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
            timeout_ns,
        })
    }

    /// Record commands with `record`, submit them and wait for completion
    pub fn submit<F>(&self, context: &VulkanContext, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let device = context.raw();
        context.reset_fence(self.fence)?;

        begin_one_time(device, self.command_buffer)?;
        record(device, self.command_buffer);
        end_recording(device, self.command_buffer)?;

        submit_commands(
            device,
            context.graphics_queue(),
            self.command_buffer,
            None,
            None,
            self.fence,
        )?;
        context.wait_for_fence(self.fence, self.timeout_ns)
    }

    /// Register the pool and fence on `queue`
    ///
    /// The handles stay usable until the queue is flushed.
    pub fn release_into(&self, queue: &mut DeletionQueue) {
        queue.push(DeferredRelease::CommandPool(self.command_pool));
        queue.push(DeferredRelease::Fence(self.fence));
    }
}
