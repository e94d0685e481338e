// Framebuffer - binds one swapchain image (plus depth) to a render pass

use ash::vk;

use super::error::{BackendResult, VkResultExt};

#[derive(Debug)]
pub struct Framebuffer {
    handle: vk::Framebuffer,
}

impl Framebuffer {
    pub fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        attachments: &[vk::ImageView],
    ) -> BackendResult<Self> {
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .vk("vkCreateFramebuffer")?;

        Ok(Self { handle })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Framebuffer::null() {
            unsafe { device.destroy_framebuffer(self.handle, None) };
        }
        self.handle = vk::Framebuffer::null();
    }
}
