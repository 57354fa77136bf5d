//! Images, layout transitions and blits
//!
//! Barriers use synchronization2. Transitions are deliberately coarse
//! (all commands, all memory), which is fine for the handful of images a
//! frame touches.

use ash::{vk, Device};

use crate::render::vulkan::buffer::allocate_memory;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// An image, its default view and the memory bound to it
#[derive(Debug)]
pub struct AllocatedImage {
    /// Image handle
    pub image: vk::Image,
    /// View covering the whole image
    pub view: vk::ImageView,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Size in texels
    pub extent: vk::Extent3D,
    /// Texel format
    pub format: vk::Format,
}

impl AllocatedImage {
    /// Create a device-local 2D image with a matching view
    pub fn new(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&image_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match allocate_memory(
            device,
            memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
        ) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err);
            }
        };

        let view = unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .and_then(|()| {
                    let view_info = vk::ImageViewCreateInfo::builder()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(format)
                        .subresource_range(subresource_range(aspect));
                    device.create_image_view(&view_info, None)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(err) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(VulkanError::Api(err));
            }
        };

        Ok(Self {
            image,
            view,
            memory,
            extent,
            format,
        })
    }

    /// Width and height of the image
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    /// Destroy the view, the image and its memory
    pub fn destroy(self, device: &Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Aspect a barrier into `new_layout` must cover
pub fn aspect_mask_for(new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Range covering every mip level and array layer for `aspect`
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

/// Record a barrier moving `image` from `current` to `new` layout
pub fn transition_image(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    current: vk::ImageLayout,
    new: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(current)
        .new_layout(new)
        .image(image)
        .subresource_range(subresource_range(aspect_mask_for(new)))
        .build();

    let barriers = [barrier];
    let dependency = vk::DependencyInfo::builder().image_memory_barriers(&barriers);

    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
}

/// Record a linear-filtered blit of the full `source` onto the full
/// `destination`; layouts must be TRANSFER_SRC and TRANSFER_DST respectively
pub fn copy_image_to_image(
    device: &Device,
    cmd: vk::CommandBuffer,
    source: vk::Image,
    destination: vk::Image,
    src_size: vk::Extent2D,
    dst_size: vk::Extent2D,
) {
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };

    let region = vk::ImageBlit2::builder()
        .src_offsets([vk::Offset3D::default(), far_corner(src_size)])
        .dst_offsets([vk::Offset3D::default(), far_corner(dst_size)])
        .src_subresource(layers)
        .dst_subresource(layers)
        .build();

    let regions = [region];
    let blit = vk::BlitImageInfo2::builder()
        .src_image(source)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(destination)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .filter(vk::Filter::LINEAR)
        .regions(&regions);

    unsafe { device.cmd_blit_image2(cmd, &blit) };
}

fn far_corner(size: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: size.width as i32,
        y: size.height as i32,
        z: 1,
    }
}
