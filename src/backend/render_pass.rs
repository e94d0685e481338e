// Render pass
//
// One subpass, two attachments: the swapchain colour image (cleared, stored,
// left ready for presentation) and the depth image (cleared, discarded).

use ash::vk;
use glam::Vec4;

use super::command_buffer::CommandBuffer;
use super::error::{BackendResult, VkResultExt};

/// Clear values and render area for a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassGeometry {
    /// x, y, width, height in pixels
    pub render_area: Vec4,
    pub clear_colour: Vec4,
    pub depth: f32,
    pub stencil: u32,
}

impl RenderPassGeometry {
    pub fn new(width: u32, height: u32, clear_colour: Vec4) -> Self {
        Self {
            render_area: Vec4::new(0.0, 0.0, width as f32, height as f32),
            clear_colour,
            depth: 1.0,
            stencil: 0,
        }
    }

    pub fn render_rect(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: self.render_area.x as i32,
                y: self.render_area.y as i32,
            },
            extent: vk::Extent2D {
                width: self.render_area.z as u32,
                height: self.render_area.w as u32,
            },
        }
    }

    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_colour.to_array(),
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.depth,
                    stencil: self.stencil,
                },
            },
        ]
    }
}

/// Colour attachment at index 0, depth at index 1.
pub fn attachment_descriptions(
    colour_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    let colour = vk::AttachmentDescription::builder()
        .format(colour_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let depth = vk::AttachmentDescription::builder()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();

    [colour, depth]
}

/// Holds colour attachment access until the image-acquire semaphore wait
/// (at colour-attachment-output) has completed.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .build()
}

#[derive(Debug)]
pub struct RenderPass {
    handle: vk::RenderPass,
    colour_format: vk::Format,
    depth_format: vk::Format,
    pub geometry: RenderPassGeometry,
}

impl RenderPass {
    pub fn new(
        device: &ash::Device,
        colour_format: vk::Format,
        depth_format: vk::Format,
        geometry: RenderPassGeometry,
    ) -> BackendResult<Self> {
        let attachments = attachment_descriptions(colour_format, depth_format);

        let colour_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&colour_refs)
            .depth_stencil_attachment(&depth_ref)
            .build();

        let subpasses = [subpass];
        let dependencies = [external_dependency()];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe { device.create_render_pass(&render_pass_info, None) }
            .vk("vkCreateRenderPass")?;

        log::debug!(
            "Created render pass (colour {:?}, depth {:?})",
            colour_format,
            depth_format
        );

        Ok(Self {
            handle,
            colour_format,
            depth_format,
            geometry,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn colour_format(&self) -> vk::Format {
        self.colour_format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn set_extent(&mut self, extent: vk::Extent2D) {
        self.geometry.render_area.z = extent.width as f32;
        self.geometry.render_area.w = extent.height as f32;
    }

    pub fn begin(
        &self,
        device: &ash::Device,
        command_buffer: &mut CommandBuffer,
        framebuffer: vk::Framebuffer,
    ) -> BackendResult<()> {
        command_buffer.enter_render_pass()?;

        let clear_values = self.geometry.clear_values();
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.handle)
            .framebuffer(framebuffer)
            .render_area(self.geometry.render_rect())
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer.handle(),
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        Ok(())
    }

    pub fn end(&self, device: &ash::Device, command_buffer: &mut CommandBuffer) -> BackendResult<()> {
        command_buffer.leave_render_pass()?;
        unsafe { device.cmd_end_render_pass(command_buffer.handle()) };
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::RenderPass::null() {
            unsafe { device.destroy_render_pass(self.handle, None) };
            self.handle = vk::RenderPass::null();
        }
    }
}
