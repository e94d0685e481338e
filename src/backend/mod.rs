// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash; selection, swapchain parameter choice and
// frame bookkeeping are plain data so they can be tested without a GPU.

pub mod command_buffer;
pub mod device;
pub mod device_selector;
pub mod error;
pub mod frame;
pub mod frame_loop;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod vulkan_backend;

pub use device::VulkanDevice;
pub use device_selector::{DeviceRequirements, Requirement};
pub use error::{BackendError, BackendResult};
pub use swapchain::{Swapchain, SwapchainManager};
pub use vulkan_backend::{BackendConfig, FrameCommands, VulkanBackend};
