//! Vulkan rendering backend
//!
//! Descriptor allocation, frames in flight and deferred destruction sit on
//! the [`GpuDevice`] seam so they can be exercised without a GPU. The rest is
//! thin glue over `ash`: instance and device setup, swapchain, images,
//! buffers, shaders and pipelines.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod deletion_queue;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod frame;
pub mod images;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod window;

#[cfg(test)]
pub mod testing;

pub use buffer::AllocatedBuffer;
pub use commands::ImmediateSubmit;
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanInstance};
pub use deletion_queue::{DeferredRelease, DeletionQueue};
pub use descriptors::{
    DescriptorAllocator, DescriptorKind, DescriptorLayoutBuilder, DescriptorWriter,
    GrowableDescriptorAllocator, PoolSizeRatio,
};
pub use device::GpuDevice;
pub use error::{abort_on_fatal, VulkanError, VulkanResult};
pub use frame::{FrameRing, FrameSettings, FrameSlot, FrameState};
pub use images::AllocatedImage;
pub use pipeline::{ComputeEffect, ComputePushConstants, GraphicsPipelineBuilder};
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
pub use window::{Window, WindowError, WindowSignal};
