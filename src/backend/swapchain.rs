// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen, plus
// the depth image and framebuffers that are sized with it. Recreation builds
// a complete new chain before the old one is released.

use ash::extensions::khr::Surface;
use ash::vk;
use std::sync::Arc;

use super::device::VulkanDevice;
use super::error::{BackendError, BackendResult, VkResultExt};
use super::frame::{ImageIndex, PerImage};
use super::framebuffer::Framebuffer;
use super::image::{Image, ImageDesc};
use super::render_pass::RenderPass;

/// Surface capabilities as reported for one physical device.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> BackendResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .vk("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .vk("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }
}

/// Requested shape of the swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainCreationInfo {
    pub width: u32,
    pub height: u32,
    pub max_frames_in_flight: usize,
    /// Used when available; FIFO otherwise.
    pub preferred_present_mode: vk::PresentModeKHR,
}

/// Parameters derived from surface support and the creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainParams {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainParams {
    /// `keep_format` keeps an existing colour format when the surface still
    /// offers it, so the render pass stays compatible across recreation.
    pub fn choose(
        support: &SwapchainSupport,
        info: &SwapchainCreationInfo,
        keep_format: Option<vk::Format>,
    ) -> BackendResult<Self> {
        let kept = keep_format.and_then(|format| {
            support
                .formats
                .iter()
                .copied()
                .find(|candidate| candidate.format == format)
        });
        let surface_format = match kept {
            Some(format) => format,
            None => choose_surface_format(&support.formats)
                .ok_or_else(|| BackendError::Surface("surface reports no formats".to_string()))?,
        };

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(
                &support.present_modes,
                info.preferred_present_mode,
            ),
            extent: choose_extent(&support.capabilities, info.width, info.height),
            min_image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// BGRA8 unorm with sRGB non-linear colour space, else the first format offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().copied().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if preferred.is_some() {
        return preferred;
    }

    let fallback = formats.first().copied();
    if let Some(format) = fallback {
        log::warn!(
            "Preferred surface format unavailable, using {:?} / {:?}",
            format.format,
            format.color_space
        );
    }
    fallback
}

/// MAILBOX: No vsync, no tearing, triple buffered
/// FIFO: Vsync enabled, guaranteed available
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        if preferred != vk::PresentModeKHR::FIFO {
            log::info!("Present mode {:?} unavailable, falling back to FIFO", preferred);
        }
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, unless it reports the "any size" sentinel,
/// in which case the requested size is clamped to the supported range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum when the surface has one.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}

/// Result of asking for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired {
        image_index: ImageIndex,
        suboptimal: bool,
    },
    /// The swapchain was out of date and has been rebuilt; skip this frame.
    Recreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal; rebuilt and usable on the next acquire.
    Recreated,
}

/// One complete swapchain with its views, depth image and framebuffers.
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    images: PerImage<vk::Image>,
    views: PerImage<vk::ImageView>,
    framebuffers: PerImage<Framebuffer>,
    depth: Option<Image>,
    params: SwapchainParams,
}

impl Swapchain {
    fn new(
        device: &VulkanDevice,
        surface: vk::SurfaceKHR,
        params: SwapchainParams,
        old_swapchain: vk::SwapchainKHR,
    ) -> BackendResult<Self> {
        log::info!(
            "Creating swapchain: {}x{}",
            params.extent.width,
            params.extent.height
        );

        let queue_family_indices = [
            device.queue_families.graphics,
            device.queue_families.present,
        ];
        let shared = queue_family_indices[0] != queue_family_indices[1];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(params.min_image_count)
            .image_format(params.surface_format.format)
            .image_color_space(params.surface_format.color_space)
            .image_extent(params.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(params.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(params.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if shared {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .vk("vkCreateSwapchainKHR")?;

        let mut swapchain = Self {
            handle,
            images: PerImage::from_vec(Vec::new()),
            views: PerImage::from_vec(Vec::new()),
            framebuffers: PerImage::from_vec(Vec::new()),
            depth: None,
            params,
        };

        if let Err(e) = swapchain.create_attachments(device) {
            swapchain.destroy(device);
            return Err(e);
        }

        log::info!(
            "Created swapchain with {} images ({:?}, {:?})",
            swapchain.images.len(),
            params.surface_format.format,
            params.present_mode
        );

        Ok(swapchain)
    }

    fn create_attachments(&mut self, device: &VulkanDevice) -> BackendResult<()> {
        let images = unsafe { device.swapchain_loader.get_swapchain_images(self.handle) }
            .vk("vkGetSwapchainImagesKHR")?;
        self.images = PerImage::from_vec(images);

        let mut views = Vec::with_capacity(self.images.len());
        for &image in self.images.iter() {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.params.surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { device.device.create_image_view(&create_info, None) } {
                Ok(view) => views.push(view),
                Err(result) => {
                    // Keep what was created so destroy() releases it
                    self.views = PerImage::from_vec(views);
                    return Err(BackendError::Vulkan {
                        call: "vkCreateImageView",
                        result,
                    });
                }
            }
        }
        self.views = PerImage::from_vec(views);

        let depth = Image::new(
            device,
            &ImageDesc::depth_attachment(self.params.extent, device.depth_format),
        )?;
        let transitioned = depth.transition_to_depth_attachment(device);
        self.depth = Some(depth);
        transitioned
    }

    /// Build one framebuffer per image against `render_pass`, replacing any
    /// existing ones.
    fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: &RenderPass,
    ) -> BackendResult<()> {
        self.destroy_framebuffers(device);

        let depth_view = self
            .depth
            .as_ref()
            .and_then(|depth| depth.view)
            .ok_or_else(|| BackendError::Surface("swapchain has no depth view".to_string()))?;

        let mut framebuffers = Vec::with_capacity(self.views.len());
        for &view in self.views.iter() {
            match Framebuffer::new(
                device,
                render_pass.handle(),
                self.params.extent,
                &[view, depth_view],
            ) {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(e) => {
                    self.framebuffers = PerImage::from_vec(framebuffers);
                    return Err(e);
                }
            }
        }
        self.framebuffers = PerImage::from_vec(framebuffers);
        Ok(())
    }

    fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for mut framebuffer in self.framebuffers.drain() {
            framebuffer.destroy(device);
        }
    }

    fn destroy(&mut self, device: &VulkanDevice) {
        self.destroy_framebuffers(&device.device);
        if let Some(mut depth) = self.depth.take() {
            depth.destroy(&device.device);
        }
        unsafe {
            for view in self.views.drain() {
                device.device.destroy_image_view(view, None);
            }
            if self.handle != vk::SwapchainKHR::null() {
                device.swapchain_loader.destroy_swapchain(self.handle, None);
                self.handle = vk::SwapchainKHR::null();
            }
        }
        // Images belong to the swapchain and go with it
        self.images = PerImage::from_vec(Vec::new());
    }
}

/// Marks a swapchain rebuild as running so a second request is refused.
#[derive(Debug, Default)]
pub struct RecreationGuard {
    active: bool,
}

impl RecreationGuard {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Raise the flag. Returns `false` with a warning if it is already raised.
    pub fn enter(&mut self) -> bool {
        if self.active {
            log::warn!("Swapchain recreation already in progress; ignoring request");
            return false;
        }
        self.active = true;
        true
    }

    pub fn exit(&mut self) {
        self.active = false;
    }
}

/// Owns the current swapchain for one surface and rebuilds it on demand.
pub struct SwapchainManager {
    current: Swapchain,
    info: SwapchainCreationInfo,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    guard: RecreationGuard,
    device: Arc<VulkanDevice>,
}

impl SwapchainManager {
    /// Create the first swapchain. Framebuffers are added once the render
    /// pass exists, via `create_framebuffers`.
    pub fn new(
        device: Arc<VulkanDevice>,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        info: SwapchainCreationInfo,
    ) -> BackendResult<Self> {
        let support =
            SwapchainSupport::query(surface_loader, device.physical_device, surface)?;
        let params = SwapchainParams::choose(&support, &info, None)?;
        let current = Swapchain::new(&device, surface, params, vk::SwapchainKHR::null())?;

        Ok(Self {
            current,
            info,
            surface,
            surface_loader: surface_loader.clone(),
            guard: RecreationGuard::default(),
            device,
        })
    }

    pub fn create_framebuffers(&mut self, render_pass: &RenderPass) -> BackendResult<()> {
        self.current
            .create_framebuffers(&self.device.device, render_pass)
    }

    pub fn is_recreating(&self) -> bool {
        self.guard.is_active()
    }

    pub fn image_count(&self) -> usize {
        self.current.images.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.current.params.extent
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.current.params.surface_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.current.params.present_mode
    }

    pub fn framebuffer(&self, image: ImageIndex) -> Option<vk::Framebuffer> {
        self.current.framebuffers.get(image).map(Framebuffer::handle)
    }

    /// Tear down and rebuild the swapchain, its depth image and framebuffers
    /// for a new size, with freshly queried surface capabilities.
    ///
    /// Returns `Ok(false)` without doing anything if a rebuild is already running.
    pub fn recreate(
        &mut self,
        width: u32,
        height: u32,
        render_pass: &RenderPass,
    ) -> BackendResult<bool> {
        if !self.guard.enter() {
            return Ok(false);
        }

        let result = self.rebuild(width, height, render_pass);
        self.guard.exit();

        result.map(|()| true)
    }

    fn rebuild(&mut self, width: u32, height: u32, render_pass: &RenderPass) -> BackendResult<()> {
        self.device.wait_idle()?;

        let support = SwapchainSupport::query(
            &self.surface_loader,
            self.device.physical_device,
            self.surface,
        )?;
        let info = SwapchainCreationInfo {
            width,
            height,
            ..self.info
        };
        let params = SwapchainParams::choose(&support, &info, Some(render_pass.colour_format()))?;
        if params.surface_format.format != render_pass.colour_format() {
            log::warn!(
                "Surface no longer offers {:?}; framebuffers may not match the render pass",
                render_pass.colour_format()
            );
        }

        let mut next = Swapchain::new(&self.device, self.surface, params, self.current.handle)?;
        if let Err(e) = next.create_framebuffers(&self.device.device, render_pass) {
            next.destroy(&self.device);
            return Err(e);
        }

        let mut old = std::mem::replace(&mut self.current, next);
        old.destroy(&self.device);

        self.info = info;

        log::debug!(
            "Swapchain recreated at {}x{}",
            params.extent.width,
            params.extent.height
        );
        Ok(())
    }

    /// Acquire the next image, rebuilding the swapchain if it is out of date.
    pub fn acquire_next_image(
        &mut self,
        render_pass: &RenderPass,
        timeout_ns: u64,
        image_available: vk::Semaphore,
    ) -> BackendResult<AcquireOutcome> {
        let result = unsafe {
            self.device.swapchain_loader.acquire_next_image(
                self.current.handle,
                timeout_ns,
                image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index: ImageIndex::new(index),
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire; recreating");
                self.recreate(self.info.width, self.info.height, render_pass)?;
                Ok(AcquireOutcome::Recreated)
            }
            Err(result) => Err(BackendError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    /// Present `image_index` once `render_complete` is signaled.
    pub fn present(
        &mut self,
        render_pass: &RenderPass,
        queue: vk::Queue,
        render_complete: vk::Semaphore,
        image_index: ImageIndex,
    ) -> BackendResult<PresentOutcome> {
        let wait_semaphores = [render_complete];
        let swapchains = [self.current.handle];
        let image_indices = [image_index.get()];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.device.swapchain_loader.queue_present(queue, &present_info) };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain suboptimal or out of date on present; recreating");
                self.recreate(self.info.width, self.info.height, render_pass)?;
                Ok(PresentOutcome::Recreated)
            }
            Err(result) => Err(BackendError::Vulkan {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        self.current.destroy(&self.device);
    }
}
