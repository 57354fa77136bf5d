//! Batched descriptor updates
//!
//! Writes are queued without a target set and applied to one set in a single
//! device call. The queue survives a commit: reusing a writer for another set
//! without calling [`DescriptorWriter::clear`] re-applies every earlier write.

use ash::vk;

use crate::render::vulkan::device::GpuDevice;

#[derive(Debug, Clone, Copy)]
enum WriteSource {
    Image(usize),
    Buffer(usize),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    binding: u32,
    kind: vk::DescriptorType,
    source: WriteSource,
}

/// Queue of descriptor writes committed together
#[derive(Debug, Default)]
pub struct DescriptorWriter {
    image_infos: Vec<vk::DescriptorImageInfo>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an image or sampler write
    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        kind: vk::DescriptorType,
    ) -> &mut Self {
        self.image_infos.push(vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: layout,
        });
        self.writes.push(PendingWrite {
            binding,
            kind,
            source: WriteSource::Image(self.image_infos.len() - 1),
        });
        self
    }

    /// Queue a buffer write covering `size` bytes from `offset`
    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        kind: vk::DescriptorType,
    ) -> &mut Self {
        self.buffer_infos.push(vk::DescriptorBufferInfo {
            buffer,
            offset,
            range: size,
        });
        self.writes.push(PendingWrite {
            binding,
            kind,
            source: WriteSource::Buffer(self.buffer_infos.len() - 1),
        });
        self
    }

    /// Discard every queued write
    pub fn clear(&mut self) {
        self.image_infos.clear();
        self.buffer_infos.clear();
        self.writes.clear();
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write to `set` in one batched update
    pub fn update_set<D: GpuDevice + ?Sized>(&self, device: &D, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(pending.binding)
                    .descriptor_type(pending.kind);
                match pending.source {
                    WriteSource::Image(index) => write
                        .image_info(std::slice::from_ref(&self.image_infos[index]))
                        .build(),
                    WriteSource::Buffer(index) => write
                        .buffer_info(std::slice::from_ref(&self.buffer_infos[index]))
                        .build(),
                }
            })
            .collect();

        device.update_descriptor_sets(&writes);
    }
}
