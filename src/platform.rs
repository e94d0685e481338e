// Platform interface
//
// The backend only needs two things from the windowing layer: the instance
// extensions a surface requires and a surface for the live window. Sizes
// arrive through `on_resized`.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;
use std::time::Instant;

use crate::backend::error::{BackendError, BackendResult, VkResultExt};

/// Window-side collaborator of the Vulkan backend.
pub trait SurfaceProvider {
    /// Instance extensions needed to create a surface for this window.
    fn required_extensions(&self) -> BackendResult<Vec<&'static CStr>>;

    /// Create a surface bound to this window.
    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> BackendResult<vk::SurfaceKHR>;
}

impl SurfaceProvider for winit::window::Window {
    fn required_extensions(&self) -> BackendResult<Vec<&'static CStr>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display_handle())
            .vk("vkEnumerateInstanceExtensionProperties")?;
        // ash-window hands out pointers to static extension name constants
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> BackendResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                entry,
                instance,
                self.raw_display_handle(),
                self.raw_window_handle(),
                None,
            )
        }
        .map_err(|result| BackendError::Surface(format!("vkCreateSurfaceKHR failed: {}", result)))
    }
}

/// Monotonic frame clock: seconds between successive ticks.
#[derive(Debug)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Seconds since the previous tick (or since creation).
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        delta
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
