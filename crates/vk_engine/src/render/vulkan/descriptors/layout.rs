//! Descriptor set layout builder

use ash::vk;

use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::VulkanResult;

/// Accumulates bindings and turns them into a descriptor set layout
///
/// Stage flags are supplied once at [`build`](Self::build) and applied to
/// every binding, matching how the renderer's layouts are shared by all the
/// stages of one pipeline.
#[derive(Debug, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-descriptor binding
    pub fn add_binding(&mut self, binding: u32, kind: vk::DescriptorType) -> &mut Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(kind)
                .descriptor_count(1)
                .build(),
        );
        self
    }

    /// Drop every binding added so far
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Number of bindings added so far
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no binding has been added
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Create the layout, OR-ing `stages` into every binding's stage mask
    pub fn build<D: GpuDevice + ?Sized>(
        &self,
        device: &D,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|binding| {
                let mut binding = *binding;
                binding.stage_flags |= stages;
                binding
            })
            .collect();

        device.create_descriptor_set_layout(&bindings, flags)
    }
}
