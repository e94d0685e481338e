// Command buffers
//
// Each buffer carries the state of its recording lifecycle. Every operation
// checks the current state before touching the driver, so a misordered
// begin/end shows up as an error instead of a validation-layer crash.

use ash::vk;

use super::error::{BackendError, BackendResult, VkResultExt};

/// Lifecycle of a single command buffer.
///
/// ```text
/// NotAllocated -> Ready -> Recording <-> InRenderPass
///                   ^          |
///                   |          v
///                   +-- Submitted <- RecordingEnded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    NotAllocated,
    Ready,
    Recording,
    InRenderPass,
    RecordingEnded,
    Submitted,
}

impl CommandBufferState {
    pub fn begin(self) -> BackendResult<Self> {
        self.require("begin", &[Self::Ready])?;
        Ok(Self::Recording)
    }

    pub fn begin_render_pass(self) -> BackendResult<Self> {
        self.require("begin a render pass on", &[Self::Recording])?;
        Ok(Self::InRenderPass)
    }

    pub fn end_render_pass(self) -> BackendResult<Self> {
        self.require("end a render pass on", &[Self::InRenderPass])?;
        Ok(Self::Recording)
    }

    pub fn end(self) -> BackendResult<Self> {
        self.require("end", &[Self::Recording])?;
        Ok(Self::RecordingEnded)
    }

    pub fn submit(self) -> BackendResult<Self> {
        self.require("submit", &[Self::RecordingEnded])?;
        Ok(Self::Submitted)
    }

    /// Any allocated buffer outside a render pass may be reset.
    pub fn reset(self) -> BackendResult<Self> {
        self.require(
            "reset",
            &[
                Self::Ready,
                Self::Recording,
                Self::RecordingEnded,
                Self::Submitted,
            ],
        )?;
        Ok(Self::Ready)
    }

    fn require(self, op: &'static str, allowed: &[Self]) -> BackendResult<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(BackendError::InvalidCommandBufferState { op, state: self })
        }
    }
}

#[derive(Debug)]
pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    pub fn allocate(
        device: &ash::Device,
        pool: vk::CommandPool,
        primary: bool,
    ) -> BackendResult<Self> {
        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .vk("vkAllocateCommandBuffers")?;
        let handle = buffers
            .into_iter()
            .next()
            .ok_or(BackendError::Vulkan {
                call: "vkAllocateCommandBuffers",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            })?;

        Ok(Self {
            handle,
            state: CommandBufferState::Ready,
        })
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn free(&mut self, device: &ash::Device, pool: vk::CommandPool) {
        if self.state == CommandBufferState::NotAllocated {
            log::warn!("Freeing a command buffer that was never allocated");
            return;
        }
        unsafe { device.free_command_buffers(pool, &[self.handle]) };
        self.handle = vk::CommandBuffer::null();
        self.state = CommandBufferState::NotAllocated;
    }

    pub fn begin(
        &mut self,
        device: &ash::Device,
        single_use: bool,
        render_pass_continue: bool,
        simultaneous_use: bool,
    ) -> BackendResult<()> {
        let next = self.state.begin()?;

        let mut flags = vk::CommandBufferUsageFlags::empty();
        if single_use {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if render_pass_continue {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }
        if simultaneous_use {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);

        unsafe { device.begin_command_buffer(self.handle, &begin_info) }
            .vk("vkBeginCommandBuffer")?;
        self.state = next;
        Ok(())
    }

    pub fn end(&mut self, device: &ash::Device) -> BackendResult<()> {
        let next = self.state.end()?;
        unsafe { device.end_command_buffer(self.handle) }.vk("vkEndCommandBuffer")?;
        self.state = next;
        Ok(())
    }

    /// Record that the buffer was handed to a queue.
    pub fn mark_submitted(&mut self) -> BackendResult<()> {
        self.state = self.state.submit()?;
        Ok(())
    }

    pub fn reset(&mut self, device: &ash::Device) -> BackendResult<()> {
        let next = self.state.reset()?;
        unsafe {
            device.reset_command_buffer(self.handle, vk::CommandBufferResetFlags::empty())
        }
        .vk("vkResetCommandBuffer")?;
        self.state = next;
        Ok(())
    }

    pub(crate) fn enter_render_pass(&mut self) -> BackendResult<()> {
        self.state = self.state.begin_render_pass()?;
        Ok(())
    }

    pub(crate) fn leave_render_pass(&mut self) -> BackendResult<()> {
        self.state = self.state.end_render_pass()?;
        Ok(())
    }

    /// Allocate a primary buffer and begin it for one-time submission.
    pub fn begin_single_use(device: &ash::Device, pool: vk::CommandPool) -> BackendResult<Self> {
        let mut buffer = Self::allocate(device, pool, true)?;
        if let Err(e) = buffer.begin(device, true, false, false) {
            buffer.free(device, pool);
            return Err(e);
        }
        Ok(buffer)
    }

    /// End, submit and wait for a single-use buffer, then free it.
    ///
    /// Blocks until `queue` is idle; meant for setup and transfer work only.
    pub fn end_single_use(
        mut self,
        device: &ash::Device,
        pool: vk::CommandPool,
        queue: vk::Queue,
    ) -> BackendResult<()> {
        let result = self.submit_and_wait(device, queue);
        self.free(device, pool);
        result
    }

    fn submit_and_wait(&mut self, device: &ash::Device, queue: vk::Queue) -> BackendResult<()> {
        self.end(device)?;

        let command_buffers = [self.handle];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe { device.queue_submit(queue, &[submit_info.build()], vk::Fence::null()) }
            .vk("vkQueueSubmit")?;
        self.mark_submitted()?;

        unsafe { device.queue_wait_idle(queue) }.vk("vkQueueWaitIdle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandBufferState::*;

    #[test]
    fn full_frame_lifecycle() {
        let state = Ready
            .begin()
            .and_then(CommandBufferState::begin_render_pass)
            .and_then(CommandBufferState::end_render_pass)
            .and_then(CommandBufferState::end)
            .and_then(CommandBufferState::submit)
            .and_then(CommandBufferState::reset)
            .unwrap();

        assert_eq!(state, Ready);
    }

    #[test]
    fn render_pass_can_be_entered_repeatedly() {
        let mut state = Ready.begin().unwrap();
        for _ in 0..3 {
            state = state.begin_render_pass().unwrap();
            assert_eq!(state, InRenderPass);
            state = state.end_render_pass().unwrap();
        }
        assert_eq!(state, Recording);
    }

    #[test]
    fn begin_requires_ready() {
        for state in [NotAllocated, Recording, InRenderPass, RecordingEnded, Submitted] {
            let err = state.begin().unwrap_err();
            assert!(matches!(
                err,
                BackendError::InvalidCommandBufferState { op: "begin", state: s } if s == state
            ));
        }
    }

    #[test]
    fn end_inside_render_pass_is_rejected() {
        let state = Ready.begin().unwrap().begin_render_pass().unwrap();
        assert!(state.end().is_err());
    }

    #[test]
    fn submit_requires_ended_recording() {
        assert!(Recording.submit().is_err());
        assert!(Ready.submit().is_err());
        assert_eq!(RecordingEnded.submit().unwrap(), Submitted);
    }

    #[test]
    fn reset_rejects_unallocated_and_open_pass() {
        assert!(NotAllocated.reset().is_err());
        assert!(InRenderPass.reset().is_err());
        assert_eq!(Submitted.reset().unwrap(), Ready);
        assert_eq!(Recording.reset().unwrap(), Ready);
    }
}
