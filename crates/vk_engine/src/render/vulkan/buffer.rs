//! Buffer allocation for uniforms, staging and mesh data
//!
//! Memory is allocated explicitly per buffer. Buffers created with
//! `SHADER_DEVICE_ADDRESS` usage get their memory allocated with the
//! device-address flag so shaders can fetch through a raw pointer.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// A buffer and the memory bound to it
///
/// Plain data: destruction goes through [`AllocatedBuffer::destroy`] or a
/// deletion queue, never through `Drop`.
#[derive(Debug)]
pub struct AllocatedBuffer {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Size requested at creation
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = match allocate_memory(
            device,
            memory_properties,
            requirements,
            properties,
            usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS),
        ) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        if let Err(err) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(err));
        }

        Ok(Self { buffer, memory, size })
    }

    /// Copy `data` to the start of a host-visible buffer
    pub fn write<T: Pod>(&self, device: &Device, data: &[T]) -> VulkanResult<()> {
        self.write_at(device, 0, data)
    }

    /// Copy `data` into a host-visible buffer starting at `offset` bytes
    pub fn write_at<T: Pod>(
        &self,
        device: &Device,
        offset: vk::DeviceSize,
        data: &[T],
    ) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len() as vk::DeviceSize;
        if offset + len > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write of {len} bytes at offset {offset} exceeds buffer of {} bytes",
                    self.size
                ),
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        unsafe {
            let mapped = device
                .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// GPU virtual address of the buffer; requires `SHADER_DEVICE_ADDRESS` usage
    pub fn device_address(&self, device: &Device) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(self.buffer);
        unsafe { device.get_buffer_device_address(&info) }
    }

    /// Destroy the buffer and free its memory
    pub fn destroy(self, device: &Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Allocate memory satisfying `requirements` with the requested properties
pub(crate) fn allocate_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    device_address: bool,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index =
        find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

    let mut flags_info =
        vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
    let mut alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    if device_address {
        alloc_info = alloc_info.push_next(&mut flags_info);
    }

    unsafe { device.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
}

/// Find the first memory type allowed by `type_filter` that has every
/// requested property
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}
