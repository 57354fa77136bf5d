//! Swapchain creation, acquisition and presentation
//!
//! An out-of-date swapchain is reported as an outcome rather than an error.
//! The frame loop flags a resize and rebuilds the swapchain at the top of its
//! next iteration. A suboptimal acquire still hands out its image (the
//! semaphore will signal, so the frame must go through); the following
//! present then reports the swapchain as out of date.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::images::subresource_range;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Format the renderer asks for first
pub const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Result of asking for the next swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image at this index will be ready once the semaphore signals
    Image(u32),
    /// The swapchain must be rebuilt before rendering again
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Queued for display
    Presented,
    /// Out of date or suboptimal; the swapchain must be rebuilt
    OutOfDate,
}

/// Map the raw result of `vkAcquireNextImageKHR`
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((index, _suboptimal)) => Ok(AcquireOutcome::Image(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(err) => Err(VulkanError::Api(err)),
    }
}

/// Map the raw result of `vkQueuePresentKHR`
pub fn classify_present(result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(err) => Err(VulkanError::Api(err)),
    }
}

/// Preferred format with sRGB-nonlinear colour space, else the first offered
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == PREFERRED_FORMAT && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first().copied())
}

/// The surface's fixed extent, or the window size clamped to the allowed range
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window_extent
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window_extent
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One image more than the minimum, within the maximum if there is one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Swapchain, its images and their views
pub struct Swapchain {
    loader: SwapchainLoader,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a FIFO swapchain whose images can be blitted into
    pub fn new(context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        let physical_device = context.physical_device.device;
        let surface = context.surface;
        let surface_loader = &context.surface_loader;

        let caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .map_err(VulkanError::Api)?;
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface) }
            .map_err(VulkanError::Api)?;
        let format = choose_surface_format(&formats).ok_or_else(|| {
            VulkanError::InitializationFailed("Surface reports no formats".to_string())
        })?;
        let extent = choose_extent(&caps, window_extent);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(choose_image_count(&caps))
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let loader = context.device.swapchain_loader.clone();
        let handle = unsafe { loader.create_swapchain(&create_info, None) }.map_err(VulkanError::Api)?;

        let images = unsafe { loader.get_swapchain_images(handle) }.map_err(VulkanError::Api)?;
        let device = context.raw();
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR));
            match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => image_views.push(view),
                Err(err) => {
                    unsafe {
                        for view in image_views {
                            device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(handle, None);
                    }
                    return Err(VulkanError::Api(err));
                }
            }
        }

        log::info!(
            "Created swapchain: {} image(s), {:?}, {}x{}",
            images.len(),
            format.format,
            extent.width,
            extent.height
        );
        Ok(Self {
            loader,
            handle,
            images,
            image_views,
            extent,
        })
    }

    /// Ask for the next image, signaling `semaphore` when it is ready
    pub fn acquire_next_image(
        &self,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout_ns, semaphore, vk::Fence::null())
        };
        classify_acquire(result)
    }

    /// Queue image `index` for display once `wait` signals
    pub fn present(
        &self,
        queue: vk::Queue,
        index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let swapchains = [self.handle];
        let indices = [index];
        let waits = [wait];
        let info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&indices)
            .wait_semaphores(&waits);

        classify_present(unsafe { self.loader.queue_present(queue, &info) })
    }

    /// Swapchain image at `index`
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// Image size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Destroy the views and the swapchain; the device must be idle
    pub fn destroy(self, device: &Device) {
        unsafe {
            for view in self.image_views {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}
