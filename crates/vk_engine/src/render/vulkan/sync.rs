//! Queue submission with synchronization2
//!
//! Helpers for the semaphore and command-buffer submit infos every
//! submission in the renderer is built from.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Wait on or signal `semaphore` at `stage`
pub fn semaphore_submit_info(
    stage: vk::PipelineStageFlags2,
    semaphore: vk::Semaphore,
) -> vk::SemaphoreSubmitInfo {
    vk::SemaphoreSubmitInfo::builder()
        .semaphore(semaphore)
        .stage_mask(stage)
        .device_index(0)
        .value(1)
        .build()
}

/// Submit info for a single command buffer
pub fn command_buffer_submit_info(cmd: vk::CommandBuffer) -> vk::CommandBufferSubmitInfo {
    vk::CommandBufferSubmitInfo::builder()
        .command_buffer(cmd)
        .device_mask(0)
        .build()
}

/// Submit one command buffer; `fence` signals when it completes
pub fn submit_commands(
    device: &Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: Option<vk::SemaphoreSubmitInfo>,
    signal: Option<vk::SemaphoreSubmitInfo>,
    fence: vk::Fence,
) -> VulkanResult<()> {
    let command_buffers = [command_buffer_submit_info(cmd)];
    let waits: Vec<_> = wait.into_iter().collect();
    let signals: Vec<_> = signal.into_iter().collect();

    let submit = vk::SubmitInfo2::builder()
        .command_buffer_infos(&command_buffers)
        .wait_semaphore_infos(&waits)
        .signal_semaphore_infos(&signals)
        .build();

    unsafe { device.queue_submit2(queue, &[submit], fence) }.map_err(VulkanError::Api)
}
