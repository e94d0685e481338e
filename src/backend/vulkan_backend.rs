// Vulkan backend - owns every GPU object and runs the frame loop
//
// FRAME FLOW:
// 1. Apply a pending resize (recreate, skip the frame)
// 2. Wait for this ring slot's fence
// 3. Acquire a swapchain image
// 4. Wait for whichever slot last rendered to that image
// 5. Record: viewport/scissor, begin render pass (draw calls go here)
// 6. End pass, submit with the slot's semaphores and fence
// 7. Present and advance the ring
//
// The ordering and recovery decisions live in `frame_loop.rs`; this file
// owns the GPU objects and implements `FrameOps` on them.
//
// Initialization failures are returned as errors. Once running, every
// per-frame failure is logged and reported as a skipped frame.

use ash::vk;
use glam::Vec4;
use std::sync::Arc;

use super::command_buffer::CommandBuffer;
use super::device::VulkanDevice;
use super::device_selector::DeviceRequirements;
use super::error::{BackendError, BackendResult, VkResultExt};
use super::frame::{FrameSlot, ImageIndex, PerFrame, PerImage, ResizeTracker};
use super::frame_loop::{FrameLoop, FrameOps};
use super::instance::VulkanInstance;
use super::render_pass::{RenderPass, RenderPassGeometry};
use super::swapchain::{AcquireOutcome, PresentOutcome, SwapchainCreationInfo, SwapchainManager};
use super::sync::FrameSync;
use crate::platform::SurfaceProvider;
use crate::renderer::RendererBackend;

/// Everything the backend needs that is decided outside of it.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub app_name: String,
    pub enable_validation: bool,
    pub max_frames_in_flight: usize,
    pub present_mode: vk::PresentModeKHR,
    pub clear_colour: Vec4,
    pub device_requirements: DeviceRequirements,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            app_name: "Lumen".to_string(),
            enable_validation: cfg!(debug_assertions),
            max_frames_in_flight: 2,
            present_mode: vk::PresentModeKHR::MAILBOX,
            clear_colour: Vec4::new(0.1, 0.2, 0.8, 1.0),
            device_requirements: DeviceRequirements::default(),
        }
    }
}

/// Handles for recording draw calls into the open frame.
#[derive(Clone, Copy)]
pub struct FrameCommands<'a> {
    pub device: &'a ash::Device,
    pub command_buffer: vk::CommandBuffer,
    pub extent: vk::Extent2D,
    pub image_index: ImageIndex,
}

/// Live GPU state. Only exists between `initialize` and `shutdown`.
struct BackendContext {
    frame_loop: FrameLoop,
    resources: FrameResources,
}

/// Every GPU object, in creation order from the bottom up.
struct FrameResources {
    frames: PerFrame<FrameSync>,
    command_buffers: PerImage<CommandBuffer>,
    render_pass: RenderPass,
    swapchain: SwapchainManager,
    device: Arc<VulkanDevice>,
    surface: vk::SurfaceKHR,
    instance: VulkanInstance,
}

impl BackendContext {
    fn create(
        config: &BackendConfig,
        surface_provider: &dyn SurfaceProvider,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        let extensions = surface_provider.required_extensions()?;
        let instance =
            VulkanInstance::new(&config.app_name, config.enable_validation, &extensions)?;
        let surface = surface_provider.create_surface(&instance.entry, &instance.instance)?;

        let device =
            match VulkanDevice::create(&instance, surface, &config.device_requirements) {
                Ok(device) => device,
                Err(e) => {
                    unsafe { instance.surface_loader.destroy_surface(surface, None) };
                    return Err(e);
                }
            };

        let mut swapchain = SwapchainManager::new(
            device.clone(),
            &instance.surface_loader,
            surface,
            SwapchainCreationInfo {
                width,
                height,
                max_frames_in_flight: config.max_frames_in_flight,
                preferred_present_mode: config.present_mode,
            },
        )?;

        let extent = swapchain.extent();
        let render_pass = RenderPass::new(
            &device.device,
            swapchain.surface_format().format,
            device.depth_format,
            RenderPassGeometry::new(extent.width, extent.height, config.clear_colour),
        )?;
        swapchain.create_framebuffers(&render_pass)?;

        let command_buffers = allocate_command_buffers(&device, swapchain.image_count())?;

        let frame_loop = FrameLoop::new(config.max_frames_in_flight, swapchain.image_count());
        let frames = frame_loop
            .ring()
            .allocate(|_| FrameSync::new(&device.device))?;

        log::info!(
            "Vulkan backend ready: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            frame_loop.ring().frames_in_flight()
        );

        Ok(Self {
            frame_loop,
            resources: FrameResources {
                frames,
                command_buffers,
                render_pass,
                swapchain,
                device,
                surface,
                instance,
            },
        })
    }

    /// Release everything in reverse creation order.
    fn destroy(self) {
        let FrameResources {
            mut frames,
            mut command_buffers,
            mut render_pass,
            swapchain,
            device,
            surface,
            instance,
        } = self.resources;

        if let Err(e) = device.wait_idle() {
            log::error!("Device did not go idle before shutdown: {}", e);
        }

        for sync in frames.iter_mut() {
            sync.destroy(&device.device);
        }
        for command_buffer in command_buffers.iter_mut() {
            command_buffer.free(&device.device, device.command_pool);
        }

        // Framebuffers, depth image and swapchain; framebuffers go before the render pass
        drop(swapchain);
        render_pass.destroy(&device.device);

        if Arc::strong_count(&device) > 1 {
            log::warn!("Vulkan device still shared at shutdown; it will outlive the surface");
        }
        drop(device);

        unsafe { instance.surface_loader.destroy_surface(surface, None) };
        drop(instance);
    }

    fn begin_frame(&mut self, resize: &mut ResizeTracker) -> BackendResult<bool> {
        self.frame_loop.begin_frame(&mut self.resources, resize)
    }

    fn end_frame(&mut self, resize: &mut ResizeTracker) -> BackendResult<bool> {
        self.frame_loop.end_frame(&mut self.resources, resize)
    }
}

impl FrameResources {
    /// Resize everything that depends on the swapchain's image count or extent.
    /// The device is idle when this runs.
    fn after_recreate(&mut self) -> BackendResult<()> {
        let device = &self.device;
        for command_buffer in self.command_buffers.iter_mut() {
            command_buffer.free(&device.device, device.command_pool);
        }
        self.command_buffers = allocate_command_buffers(device, self.swapchain.image_count())?;
        self.render_pass.set_extent(self.swapchain.extent());
        Ok(())
    }
}

fn command_buffer_for(
    command_buffers: &mut PerImage<CommandBuffer>,
    image: ImageIndex,
) -> BackendResult<&mut CommandBuffer> {
    command_buffers
        .get_mut(image)
        .ok_or(BackendError::NotInitialized)
}

impl FrameOps for FrameResources {
    fn wait_idle(&mut self) -> BackendResult<()> {
        self.device.wait_idle()
    }

    fn is_recreating(&self) -> bool {
        self.swapchain.is_recreating()
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn recreate(&mut self, width: u32, height: u32) -> BackendResult<bool> {
        if !self.swapchain.recreate(width, height, &self.render_pass)? {
            return Ok(false);
        }
        self.after_recreate()?;
        Ok(true)
    }

    fn wait_for_slot(&mut self, slot: FrameSlot) -> BackendResult<()> {
        self.frames[slot].in_flight.wait(&self.device.device, u64::MAX)
    }

    fn acquire(&mut self, slot: FrameSlot) -> BackendResult<AcquireOutcome> {
        let outcome = self.swapchain.acquire_next_image(
            &self.render_pass,
            u64::MAX,
            self.frames[slot].image_available,
        )?;
        if outcome == AcquireOutcome::Recreated {
            self.after_recreate()?;
        }
        Ok(outcome)
    }

    fn begin_recording(&mut self, image: ImageIndex) -> BackendResult<()> {
        let framebuffer = self.swapchain.framebuffer(image).ok_or_else(|| {
            BackendError::Surface(format!("no framebuffer for image {}", image.get()))
        })?;
        let extent = self.swapchain.extent();
        let device = &self.device.device;
        let command_buffer = command_buffer_for(&mut self.command_buffers, image)?;

        command_buffer.reset(device)?;
        command_buffer.begin(device, false, false, false)?;

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            device.cmd_set_viewport(command_buffer.handle(), 0, &[viewport]);
            device.cmd_set_scissor(command_buffer.handle(), 0, &[scissor]);
        }

        self.render_pass.begin(device, command_buffer, framebuffer)
    }

    fn end_recording(&mut self, image: ImageIndex) -> BackendResult<()> {
        let device = &self.device.device;
        let command_buffer = command_buffer_for(&mut self.command_buffers, image)?;

        self.render_pass.end(device, command_buffer)?;
        command_buffer.end(device)
    }

    fn reset_fence(&mut self, slot: FrameSlot) -> BackendResult<()> {
        self.frames[slot].in_flight.reset(&self.device.device)
    }

    fn submit(&mut self, slot: FrameSlot, image: ImageIndex) -> BackendResult<()> {
        let device = &self.device;
        let sync = &self.frames[slot];
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_complete];
        let fence = sync.in_flight.handle();

        let command_buffer = command_buffer_for(&mut self.command_buffers, image)?;
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.queues.graphics, &[submit_info.build()], fence)
        }
        .vk("vkQueueSubmit")?;

        // The fence is now pending, so the submit itself must not be reported as failed
        if let Err(e) = command_buffer.mark_submitted() {
            log::warn!("Command buffer state out of step after submit: {}", e);
        }
        Ok(())
    }

    fn replace_fence(&mut self, slot: FrameSlot) -> BackendResult<()> {
        self.frames[slot].replace_fence(&self.device.device)
    }

    fn discard_acquire(&mut self, slot: FrameSlot) -> BackendResult<()> {
        // An empty batch that only waits consumes the pending signal
        let wait_semaphores = [self.frames[slot].image_available];
        let wait_stages = [vk::PipelineStageFlags::BOTTOM_OF_PIPE];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);

        unsafe {
            self.device.device.queue_submit(
                self.device.queues.graphics,
                &[submit_info.build()],
                vk::Fence::null(),
            )
        }
        .vk("vkQueueSubmit")
    }

    fn present(&mut self, slot: FrameSlot, image: ImageIndex) -> BackendResult<PresentOutcome> {
        let outcome = self.swapchain.present(
            &self.render_pass,
            self.device.queues.present,
            self.frames[slot].render_complete,
            image,
        )?;
        if outcome == PresentOutcome::Recreated {
            self.after_recreate()?;
        }
        Ok(outcome)
    }
}

fn allocate_command_buffers(
    device: &VulkanDevice,
    image_count: usize,
) -> BackendResult<PerImage<CommandBuffer>> {
    let buffers = (0..image_count)
        .map(|_| CommandBuffer::allocate(&device.device, device.command_pool, true))
        .collect::<BackendResult<Vec<_>>>()?;
    Ok(PerImage::from_vec(buffers))
}

/// Vulkan implementation of `RendererBackend`.
pub struct VulkanBackend {
    config: BackendConfig,
    context: Option<BackendContext>,
    resize: ResizeTracker,
}

impl VulkanBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            context: None,
            resize: ResizeTracker::default(),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn device(&self) -> Option<&Arc<VulkanDevice>> {
        self.context.as_ref().map(|ctx| &ctx.resources.device)
    }

    pub fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.context
            .as_ref()
            .map(|ctx| ctx.resources.swapchain.extent())
    }

    /// Draw-call handles for the open frame, if there is one.
    pub fn frame_commands(&self) -> Option<FrameCommands<'_>> {
        let ctx = self.context.as_ref()?;
        let image_index = ctx.frame_loop.current_image()?;
        let resources = &ctx.resources;
        let command_buffer = resources.command_buffers.get(image_index)?;

        Some(FrameCommands {
            device: &resources.device.device,
            command_buffer: command_buffer.handle(),
            extent: resources.swapchain.extent(),
            image_index,
        })
    }
}

impl RendererBackend for VulkanBackend {
    fn initialize(
        &mut self,
        surface: &dyn SurfaceProvider,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if self.context.is_some() {
            log::warn!("Vulkan backend already initialized");
            return Ok(());
        }

        log::info!("Initializing Vulkan backend ({}x{})", width, height);
        self.context = Some(BackendContext::create(&self.config, surface, width, height)?);
        self.resize = ResizeTracker::new(width, height);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(context) = self.context.take() {
            log::info!("Shutting down Vulkan backend...");
            context.destroy();
        }
    }

    fn on_resized(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("Window minimised; pausing frames");
        }
        self.resize.notify(width, height);
    }

    fn begin_frame(&mut self, _delta_time: f32) -> bool {
        let Some(context) = self.context.as_mut() else {
            log::warn!("begin_frame: {}", BackendError::NotInitialized);
            return false;
        };

        match context.begin_frame(&mut self.resize) {
            Ok(ready) => ready,
            Err(e) => {
                log::error!("begin_frame failed: {}", e);
                false
            }
        }
    }

    fn end_frame(&mut self, _delta_time: f32) -> bool {
        let Some(context) = self.context.as_mut() else {
            log::warn!("end_frame: {}", BackendError::NotInitialized);
            return false;
        };

        match context.end_frame(&mut self.resize) {
            Ok(presented) => presented,
            Err(e) => {
                log::error!("end_frame failed: {}", e);
                false
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
