// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU ordering between queues.
// A fence caches its signaled state so redundant waits and resets never
// reach the driver.

use ash::prelude::VkResult;
use ash::vk;

use super::error::{BackendError, BackendResult, VkResultExt};

/// The two fence calls the frame loop issues. Implemented by `ash::Device`.
pub trait FenceOps {
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
}

impl FenceOps for ash::Device {
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.reset_fences(&[fence]) }
    }
}

/// Binary fence with a cached signaled state.
///
/// The cache is only ever changed after the driver confirms the transition:
/// `true` after a successful wait, `false` after a successful reset.
#[derive(Debug)]
pub struct Fence {
    handle: vk::Fence,
    signaled: bool,
}

impl Fence {
    pub fn new(device: &ash::Device, create_signaled: bool) -> BackendResult<Self> {
        let flags = if create_signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);

        let handle = unsafe { device.create_fence(&fence_info, None) }.vk("vkCreateFence")?;

        Ok(Self::from_raw(handle, create_signaled))
    }

    pub(crate) fn from_raw(handle: vk::Fence, signaled: bool) -> Self {
        Self { handle, signaled }
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled
    }

    /// Wait until the fence is signaled or `timeout_ns` elapses.
    ///
    /// Returns immediately if the cache already says signaled. A timeout is
    /// reported as `BackendError::FenceTimeout` and leaves the cache untouched.
    pub fn wait(&mut self, ops: &impl FenceOps, timeout_ns: u64) -> BackendResult<()> {
        if self.signaled {
            return Ok(());
        }

        match ops.wait_for_fence(self.handle, timeout_ns) {
            Ok(()) => {
                self.signaled = true;
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Fence wait timed out after {} ns", timeout_ns);
                Err(BackendError::FenceTimeout)
            }
            Err(result) => {
                log::error!("Fence wait failed: {}", result);
                Err(BackendError::Vulkan {
                    call: "vkWaitForFences",
                    result,
                })
            }
        }
    }

    /// Return the fence to the unsignaled state. A no-op when already unsignaled.
    pub fn reset(&mut self, ops: &impl FenceOps) -> BackendResult<()> {
        if !self.signaled {
            return Ok(());
        }

        ops.reset_fence(self.handle).vk("vkResetFences")?;
        self.signaled = false;
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Fence::null() {
            unsafe { device.destroy_fence(self.handle, None) };
            self.handle = vk::Fence::null();
        }
        self.signaled = false;
    }
}

pub fn create_semaphore(device: &ash::Device) -> BackendResult<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    unsafe { device.create_semaphore(&semaphore_info, None) }.vk("vkCreateSemaphore")
}

/// Frame synchronization - one per frame in flight
#[derive(Debug)]
pub struct FrameSync {
    /// Signaled by the presentation engine when the acquired image is ready.
    pub image_available: vk::Semaphore,
    /// Signaled by the graphics queue when this slot's commands complete.
    pub render_complete: vk::Semaphore,
    /// Signaled when the GPU has finished this slot's submission.
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> BackendResult<Self> {
        Ok(Self {
            image_available: create_semaphore(device)?,
            render_complete: create_semaphore(device)?,
            // Start signaled so the first wait on each slot does not block forever
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Swap in a fresh signaled fence. Used when the fence was reset but its
    /// submission never reached the queue, so nothing would ever signal it.
    pub fn replace_fence(&mut self, device: &ash::Device) -> BackendResult<()> {
        let fence = Fence::new(device, true)?;
        self.in_flight.destroy(device);
        self.in_flight = fence;
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_complete, None);
        }
        self.image_available = vk::Semaphore::null();
        self.render_complete = vk::Semaphore::null();
        self.in_flight.destroy(device);
    }
}
