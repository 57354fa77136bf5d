//! Vulkan context management
//!
//! Instance, surface, physical device selection and the logical device.
//! [`VulkanContext`] is also the production implementation of
//! [`GpuDevice`].

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use crate::render::vulkan::deletion_queue::DeferredRelease;
use crate::render::vulkan::device::GpuDevice;
use crate::render::vulkan::window::Window;
use crate::render::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.3 instance with the extensions the window needs
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vk_engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let extension_names = window
            .required_instance_extensions()?
            .into_iter()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;

        let mut extensions: Vec<*const c_char> = extension_names.iter().map(|e| e.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        log::debug!("Created Vulkan 1.3 instance (validation: {enable_validation})");
        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(VulkanError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Validation layer messages go to the log
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {message_type:?} - {message}");
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[Vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

/// The selected GPU and what the renderer needs to know about it
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types, used for every allocation
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family used for graphics, compute, transfer and present
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    /// Pick a Vulkan 1.3 GPU with a graphics queue that can present to
    /// `surface`, preferring discrete GPUs
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let mut candidates = Vec::new();
        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(info) => candidates.push(info),
                Err(err) => log::debug!("Skipping GPU: {err}"),
            }
        }

        let selected = candidates
            .into_iter()
            .max_by_key(|info| info.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;

        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(selected.properties.device_name.as_ptr()).to_string_lossy()
        });
        Ok(selected)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            return Err(VulkanError::InitializationFailed(
                "Device does not support Vulkan 1.3".to_string(),
            ));
        }

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut features12)
            .push_next(&mut features13);
        unsafe { instance.get_physical_device_features2(device, &mut features) };
        let features_supported = features12.buffer_device_address == vk::TRUE
            && features12.descriptor_indexing == vk::TRUE
            && features13.dynamic_rendering == vk::TRUE
            && features13.synchronization2 == vk::TRUE;
        if !features_supported {
            return Err(VulkanError::InitializationFailed(
                "Required Vulkan 1.2/1.3 features not supported".to_string(),
            ));
        }

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let mut graphics_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE) {
                continue;
            }
            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }
            .map_err(VulkanError::Api)?;
            if present_support {
                graphics_family = Some(index);
                break;
            }
        }
        let graphics_family = graphics_family.ok_or_else(|| {
            VulkanError::InitializationFailed("No graphics queue family can present".to_string())
        })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(VulkanError::Api)?;
        let has_swapchain = extensions.iter().any(|available| {
            (unsafe { CStr::from_ptr(available.extension_name.as_ptr()) }) == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Swapchain extension not supported".to_string(),
            ));
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Queue used for every submission and presentation
    pub graphics_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the device with the 1.2/1.3 features the renderer relies on
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device.graphics_family)
            .queue_priorities(&priorities)
            .build()];

        let extensions = [SwapchainLoader::name().as_ptr()];

        let mut features12 = vk::PhysicalDeviceVulkan12Features::builder()
            .buffer_device_address(true)
            .descriptor_indexing(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .push_next(&mut features12)
            .push_next(&mut features13);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None) }
            .map_err(VulkanError::Api)?;
        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Owns the core Vulkan objects for the lifetime of the engine
pub struct VulkanContext {
    /// Vulkan surface for the window
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader
    pub surface_loader: Surface,
    /// Selected physical device
    pub physical_device: PhysicalDeviceInfo,
    /// Logical device; declared before `instance` so it drops first
    pub device: LogicalDevice,
    /// Vulkan instance and debug messenger
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create instance, surface and device for `window`
    pub fn new(window: &mut Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, enable_validation)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_vulkan_surface(instance.instance.handle())?;

        let physical_device =
            match PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader) {
                Ok(info) => info,
                Err(err) => {
                    unsafe { surface_loader.destroy_surface(surface, None) };
                    return Err(err);
                }
            };

        let device = match LogicalDevice::new(&instance.instance, &physical_device) {
            Ok(device) => device,
            Err(err) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(err);
            }
        };

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// The raw logical device
    pub fn raw(&self) -> &Device {
        &self.device.device
    }

    /// Queue used for submission and presentation
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Family of [`graphics_queue`](Self::graphics_queue)
    pub fn graphics_queue_family(&self) -> u32 {
        self.physical_device.graphics_family
    }

    /// Memory types of the selected GPU
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::Api)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl GpuDevice for VulkanContext {
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(bindings)
            .flags(flags);
        unsafe { self.raw().create_descriptor_set_layout(&info, None) }.map_err(VulkanError::Api)
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        unsafe { self.raw().create_descriptor_pool(&info, None) }.map_err(VulkanError::Api)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VulkanResult<()> {
        unsafe {
            self.raw()
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
        .map_err(VulkanError::Api)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.raw().destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
    ) -> Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let counts = [variable_count.unwrap_or(0)];
        let mut variable_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder().descriptor_counts(&counts);

        let mut info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        if variable_count.is_some() {
            info = info.push_next(&mut variable_info);
        }

        let sets = unsafe { self.raw().allocate_descriptor_sets(&info) }?;
        sets.into_iter().next().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        unsafe { self.raw().update_descriptor_sets(writes, &[]) };
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.raw().create_fence(&info, None) }.map_err(VulkanError::Api)
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()> {
        match unsafe { self.raw().wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::FenceTimeout { timeout_ns }),
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.raw().reset_fences(&[fence]) }.map_err(VulkanError::Api)
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.raw().create_semaphore(&info, None) }.map_err(VulkanError::Api)
    }

    fn create_command_pool(&self, queue_family: u32) -> VulkanResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        unsafe { self.raw().create_command_pool(&info, None) }.map_err(VulkanError::Api)
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.raw().allocate_command_buffers(&info) }.map_err(VulkanError::Api)?;
        buffers
            .into_iter()
            .next()
            .ok_or(VulkanError::Api(vk::Result::ERROR_UNKNOWN))
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        VulkanContext::wait_idle(self)
    }

    fn release(&self, resource: DeferredRelease) {
        let device = self.raw();
        log::trace!("Releasing {}", resource.kind());
        unsafe {
            match resource {
                DeferredRelease::Buffer(buffer) => buffer.destroy(device),
                DeferredRelease::Image(image) => image.destroy(device),
                DeferredRelease::ImageView(view) => device.destroy_image_view(view, None),
                DeferredRelease::Sampler(sampler) => device.destroy_sampler(sampler, None),
                DeferredRelease::DescriptorPool(pool) => device.destroy_descriptor_pool(pool, None),
                DeferredRelease::DescriptorSetLayout(layout) => {
                    device.destroy_descriptor_set_layout(layout, None);
                }
                DeferredRelease::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
                DeferredRelease::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
                DeferredRelease::ShaderModule(module) => device.destroy_shader_module(module, None),
                DeferredRelease::CommandPool(pool) => device.destroy_command_pool(pool, None),
                DeferredRelease::Fence(fence) => device.destroy_fence(fence, None),
                DeferredRelease::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
            }
        }
    }
}
