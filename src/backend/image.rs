// Images with dedicated memory
//
// Used for the depth attachment that sits next to every swapchain.

use ash::vk;

use super::command_buffer::CommandBuffer;
use super::device::VulkanDevice;
use super::error::{BackendError, BackendResult, VkResultExt};

/// Parameters for `Image::new`.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
    /// Create a view with this aspect alongside the image.
    pub view_aspect: Option<vk::ImageAspectFlags>,
}

impl ImageDesc {
    pub fn depth_attachment(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            view_aspect: Some(vk::ImageAspectFlags::DEPTH),
        }
    }
}

#[derive(Debug)]
pub struct Image {
    pub handle: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: Option<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Image {
    pub fn new(device: &VulkanDevice, desc: &ImageDesc) -> BackendResult<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.device.create_image(&image_info, None) }
            .vk("vkCreateImage")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(handle) };
        let memory_type_index =
            match device.find_memory_index(requirements.memory_type_bits, desc.memory_flags) {
                Ok(index) => index,
                Err(e) => {
                    unsafe { device.device.destroy_image(handle, None) };
                    return Err(e);
                }
            };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.device.allocate_memory(&alloc_info, None) }
            .vk("vkAllocateMemory")
        {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_image(handle, None) };
                return Err(e);
            }
        };

        let mut image = Self {
            handle,
            memory,
            view: None,
            format: desc.format,
            extent: desc.extent,
        };

        if let Err(e) = unsafe { device.device.bind_image_memory(handle, memory, 0) }
            .vk("vkBindImageMemory")
        {
            image.destroy(&device.device);
            return Err(e);
        }

        if let Some(aspect) = desc.view_aspect {
            if let Err(e) = image.create_view(&device.device, aspect) {
                image.destroy(&device.device);
                return Err(e);
            }
        }

        Ok(image)
    }

    /// Create (or replace) the view for this image.
    pub fn create_view(
        &mut self,
        device: &ash::Device,
        aspect: vk::ImageAspectFlags,
    ) -> BackendResult<vk::ImageView> {
        if let Some(old) = self.view.take() {
            log::warn!("Image already has a view; replacing it");
            unsafe { device.destroy_image_view(old, None) };
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&view_info, None) }
            .vk("vkCreateImageView")?;
        self.view = Some(view);
        Ok(view)
    }

    /// Move the image to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` with a one-off
    /// submission on the graphics queue.
    pub fn transition_to_depth_attachment(&self, device: &VulkanDevice) -> BackendResult<()> {
        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil_component(self.format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }

        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.handle)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();

        let command_buffer = CommandBuffer::begin_single_use(&device.device, device.command_pool)?;
        unsafe {
            device.device.cmd_pipeline_barrier(
                command_buffer.handle(),
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        command_buffer.end_single_use(&device.device, device.command_pool, device.queues.graphics)
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            if let Some(view) = self.view.take() {
                device.destroy_image_view(view, None);
            }
            if self.memory != vk::DeviceMemory::null() {
                device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
            if self.handle != vk::Image::null() {
                device.destroy_image(self.handle, None);
                self.handle = vk::Image::null();
            }
        }
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Find the first memory type allowed by `type_filter` that has all of `flags`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: vk::MemoryPropertyFlags,
) -> BackendResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let allowed = type_filter & (1 << i) != 0;
            allowed
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(flags)
        })
        .ok_or(BackendError::NoMemoryType { type_filter, flags })
}
