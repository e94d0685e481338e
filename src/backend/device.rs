// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Snapshot every physical device's capabilities for the selector
// - Logical device + one queue per distinct family
// - Graphics command pool shared by frame and single-use command buffers

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

use super::device_selector::{
    self, DeviceRequirements, PhysicalDeviceCandidate, QueueFamilyAssignment, QueueFamilyInfo,
    DEPTH_FORMAT_CANDIDATES,
};
use super::error::{BackendError, BackendResult, VkResultExt};
use super::image::find_memory_type_index;
use super::instance::{fixed_str, VulkanInstance};
use super::swapchain::SwapchainSupport;

/// Resolved queue family index per role. Graphics and present always exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: Option<u32>,
    pub compute: Option<u32>,
}

impl QueueFamilies {
    fn unique(&self) -> Vec<u32> {
        QueueFamilyAssignment {
            graphics: Some(self.graphics),
            present: Some(self.present),
            compute: self.compute,
            transfer: self.transfer,
        }
        .unique_families()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceQueues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub transfer: Option<vk::Queue>,
    pub compute: Option<vk::Queue>,
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub swapchain_loader: SwapchainLoader,

    pub queue_families: QueueFamilies,
    pub queues: DeviceQueues,
    pub command_pool: vk::CommandPool,

    // Captured while scoring the winning device
    pub depth_format: vk::Format,
    pub swapchain_support: SwapchainSupport,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Pick the best GPU for `surface` and create the logical device on it.
    ///
    /// # Arguments
    /// * `instance` - Live instance; must outlive the returned device
    /// * `surface` - Window surface the device must be able to present to
    /// * `requirements` - Required/optional capabilities and their weights
    pub fn create(
        instance: &VulkanInstance,
        surface: vk::SurfaceKHR,
        requirements: &DeviceRequirements,
    ) -> BackendResult<Arc<Self>> {
        let candidates = query_candidates(instance, surface)?;
        let selection = device_selector::select_device(&candidates, requirements)?;
        let candidate = &candidates[selection.index];

        let queues = selection.score.queues;
        let (Some(graphics), Some(present)) = (queues.graphics, queues.present) else {
            log::error!("GPU '{}' has no graphics or present queue", candidate.name);
            return Err(BackendError::NoSuitableDevice);
        };
        let Some(depth_format) = selection.score.depth_format else {
            log::error!("GPU '{}' has no usable depth format", candidate.name);
            return Err(BackendError::NoSuitableDevice);
        };
        let queue_families = QueueFamilies {
            graphics,
            present,
            transfer: queues.transfer,
            compute: queues.compute,
        };

        log_device_info(candidate);
        log::info!("Queue families: {:?}", queue_families);
        log::info!("Depth format: {:?}", depth_format);

        let device = Self::create_logical_device(instance, candidate, &queue_families, requirements)?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) }
            .vk("vkCreateCommandPool")
        {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let device_queues = unsafe {
            DeviceQueues {
                graphics: device.get_device_queue(queue_families.graphics, 0),
                present: device.get_device_queue(queue_families.present, 0),
                transfer: queue_families
                    .transfer
                    .map(|family| device.get_device_queue(family, 0)),
                compute: queue_families
                    .compute
                    .map(|family| device.get_device_queue(family, 0)),
            }
        };

        let swapchain_loader = SwapchainLoader::new(&instance.instance, &device);

        Ok(Arc::new(Self {
            device,
            physical_device: candidate.handle,
            swapchain_loader,
            queue_families,
            queues: device_queues,
            command_pool,
            depth_format,
            swapchain_support: candidate.swapchain_support.clone(),
            properties: candidate.properties,
            features: candidate.features,
            memory_properties: candidate.memory_properties,
        }))
    }

    fn create_logical_device(
        instance: &VulkanInstance,
        candidate: &PhysicalDeviceCandidate,
        queue_families: &QueueFamilies,
        requirements: &DeviceRequirements,
    ) -> BackendResult<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extension_names = requirements
            .device_extensions
            .iter()
            .map(|name| {
                CString::new(name.as_str())
                    .map_err(|_| BackendError::MissingExtension(name.clone()))
            })
            .collect::<BackendResult<Vec<CString>>>()?;
        let extension_ptrs: Vec<_> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: candidate.features.sampler_anisotropy,
            ..Default::default()
        };

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        unsafe {
            instance
                .instance
                .create_device(candidate.handle, &create_info, None)
        }
        .vk("vkCreateDevice")
    }

    /// Memory type index for an allocation, see `find_memory_type_index`.
    pub fn find_memory_index(
        &self,
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> BackendResult<u32> {
        find_memory_type_index(&self.memory_properties, type_filter, flags)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> BackendResult<()> {
        unsafe { self.device.device_wait_idle() }.vk("vkDeviceWaitIdle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
    }
}

/// Snapshot every physical device for scoring.
fn query_candidates(
    instance: &VulkanInstance,
    surface: vk::SurfaceKHR,
) -> BackendResult<Vec<PhysicalDeviceCandidate>> {
    let devices = unsafe { instance.instance.enumerate_physical_devices() }
        .vk("vkEnumeratePhysicalDevices")?;

    if devices.is_empty() {
        log::error!("No Vulkan-capable GPU found");
        return Err(BackendError::NoSuitableDevice);
    }

    devices
        .into_iter()
        .map(|handle| query_candidate(instance, &instance.surface_loader, surface, handle))
        .collect()
}

fn query_candidate(
    instance: &VulkanInstance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
    handle: vk::PhysicalDevice,
) -> BackendResult<PhysicalDeviceCandidate> {
    let vk_instance = &instance.instance;
    let (properties, features, memory_properties, family_properties) = unsafe {
        (
            vk_instance.get_physical_device_properties(handle),
            vk_instance.get_physical_device_features(handle),
            vk_instance.get_physical_device_memory_properties(handle),
            vk_instance.get_physical_device_queue_family_properties(handle),
        )
    };
    let name = fixed_str(&properties.device_name);

    let mut queue_families = Vec::with_capacity(family_properties.len());
    for (index, family) in family_properties.iter().enumerate() {
        let present_support = unsafe {
            surface_loader.get_physical_device_surface_support(handle, index as u32, surface)
        }
        .vk("vkGetPhysicalDeviceSurfaceSupportKHR")?;

        queue_families.push(QueueFamilyInfo {
            flags: family.queue_flags,
            queue_count: family.queue_count,
            present_support,
        });
    }

    let extensions = unsafe { vk_instance.enumerate_device_extension_properties(handle) }
        .vk("vkEnumerateDeviceExtensionProperties")?
        .iter()
        .map(|ext| fixed_str(&ext.extension_name))
        .collect();

    let depth_format_support = DEPTH_FORMAT_CANDIDATES
        .iter()
        .map(|&format| {
            let props =
                unsafe { vk_instance.get_physical_device_format_properties(handle, format) };
            (format, props)
        })
        .collect();

    // A device that cannot be queried for this surface is treated as having
    // no support, which the selector skips
    let swapchain_support = SwapchainSupport::query(surface_loader, handle, surface)
        .unwrap_or_else(|e| {
            log::warn!("Could not query surface support for '{}': {}", name, e);
            SwapchainSupport::default()
        });

    Ok(PhysicalDeviceCandidate {
        handle,
        name,
        device_type: properties.device_type,
        properties,
        features,
        memory_properties,
        queue_families,
        extensions,
        depth_format_support,
        swapchain_support,
    })
}

fn log_device_info(candidate: &PhysicalDeviceCandidate) {
    let props = &candidate.properties;

    log::info!("Selected GPU: {}", candidate.name);
    log::info!("GPU type: {:?}", candidate.device_type);
    log::info!(
        "Driver version: {}.{}.{}",
        vk::api_version_major(props.driver_version),
        vk::api_version_minor(props.driver_version),
        vk::api_version_patch(props.driver_version)
    );
    log::info!(
        "API Version: {}.{}.{}",
        vk::api_version_major(props.api_version),
        vk::api_version_minor(props.api_version),
        vk::api_version_patch(props.api_version)
    );

    let memory = &candidate.memory_properties;
    for heap in &memory.memory_heaps[..memory.memory_heap_count as usize] {
        let gib = heap.size as f64 / (1024.0 * 1024.0 * 1024.0);
        if heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL) {
            log::info!("Local GPU memory: {:.2} GiB", gib);
        } else {
            log::info!("Shared system memory: {:.2} GiB", gib);
        }
    }
}
