//! Deferred destruction of GPU resources
//!
//! Resources still referenced by submitted command buffers cannot be
//! destroyed immediately. They are pushed onto a [`DeletionQueue`] and
//! released once the owner knows the GPU is done with them: a frame slot
//! after its fence signals, the engine after a full device-idle wait.
//!
//! Releases are typed rather than captured closures, so the queue owns exactly
//! the handles it will destroy and nothing else.

use ash::vk;

use crate::render::vulkan::buffer::AllocatedBuffer;
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::images::AllocatedImage;

/// A resource whose destruction has been deferred
#[derive(Debug)]
pub enum DeferredRelease {
    /// Buffer together with its backing memory
    Buffer(AllocatedBuffer),
    /// Image together with its view and backing memory
    Image(AllocatedImage),
    /// Standalone image view
    ImageView(vk::ImageView),
    /// Sampler
    Sampler(vk::Sampler),
    /// Descriptor pool (frees every set allocated from it)
    DescriptorPool(vk::DescriptorPool),
    /// Descriptor set layout
    DescriptorSetLayout(vk::DescriptorSetLayout),
    /// Compute or graphics pipeline
    Pipeline(vk::Pipeline),
    /// Pipeline layout
    PipelineLayout(vk::PipelineLayout),
    /// Shader module
    ShaderModule(vk::ShaderModule),
    /// Command pool (frees every command buffer allocated from it)
    CommandPool(vk::CommandPool),
    /// Fence
    Fence(vk::Fence),
    /// Semaphore
    Semaphore(vk::Semaphore),
}

impl DeferredRelease {
    /// Short name of the resource kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Image(_) => "image",
            Self::ImageView(_) => "image view",
            Self::Sampler(_) => "sampler",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::DescriptorSetLayout(_) => "descriptor set layout",
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
            Self::ShaderModule(_) => "shader module",
            Self::CommandPool(_) => "command pool",
            Self::Fence(_) => "fence",
            Self::Semaphore(_) => "semaphore",
        }
    }
}

/// LIFO list of deferred releases
///
/// Append-only while in use; [`flush`](Self::flush) releases everything in
/// reverse registration order, exactly once, and leaves the queue empty.
#[derive(Debug)]
pub struct DeletionQueue {
    name: &'static str,
    pending: Vec<DeferredRelease>,
}

impl DeletionQueue {
    /// Create an empty queue; `name` only appears in log output
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: Vec::new(),
        }
    }

    /// Register a resource to be released on the next flush
    pub fn push(&mut self, resource: DeferredRelease) {
        self.pending.push(resource);
    }

    /// Release everything, last registered first
    pub fn flush<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        if self.pending.is_empty() {
            return;
        }

        log::trace!("Flushing {} deferred release(s) from {}", self.pending.len(), self.name);
        while let Some(resource) = self.pending.pop() {
            device.release(resource);
        }
    }

    /// Number of pending releases
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "{} dropped with {} unreleased resource(s); they leak",
                self.name,
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::testing::{MockDevice, Released};
    use ash::vk::Handle;

    #[test]
    fn test_flush_releases_in_reverse_order() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new("test queue");

        queue.push(DeferredRelease::Sampler(vk::Sampler::from_raw(1)));
        queue.push(DeferredRelease::ImageView(vk::ImageView::from_raw(2)));
        queue.push(DeferredRelease::Pipeline(vk::Pipeline::from_raw(3)));
        assert_eq!(queue.len(), 3);

        queue.flush(&device);

        assert!(queue.is_empty());
        assert_eq!(
            device.released(),
            vec![
                Released::new("pipeline", 3),
                Released::new("image view", 2),
                Released::new("sampler", 1),
            ]
        );
    }

    #[test]
    fn test_flush_runs_each_release_once() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new("test queue");

        queue.push(DeferredRelease::Fence(vk::Fence::from_raw(7)));
        queue.flush(&device);
        queue.flush(&device);

        assert_eq!(device.released(), vec![Released::new("fence", 7)]);
    }

    #[test]
    fn test_queue_is_reusable_after_flush() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new("test queue");

        queue.push(DeferredRelease::Semaphore(vk::Semaphore::from_raw(1)));
        queue.flush(&device);
        queue.push(DeferredRelease::Semaphore(vk::Semaphore::from_raw(2)));
        queue.flush(&device);

        assert_eq!(
            device.released(),
            vec![Released::new("semaphore", 1), Released::new("semaphore", 2)]
        );
    }
}
