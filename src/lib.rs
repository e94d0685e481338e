// Lumen - Vulkan render backend
//
// backend:  device selection, swapchain lifecycle, frame loop
// renderer: frontend that drives any `RendererBackend` once per frame
// platform: the narrow window-side interface the backend consumes
// config:   config.toml loading

pub mod backend;
pub mod config;
pub mod platform;
pub mod renderer;

pub use backend::{BackendConfig, BackendError, BackendResult, VulkanBackend};
pub use renderer::{RenderPacket, Renderer, RendererBackend};
