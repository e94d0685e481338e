// Backend errors
//
// Every fallible Vulkan call is labelled with the entry point that failed, so
// a fatal initialization error names the exact call in the log.

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

use super::command_buffer::CommandBufferState;

/// Error kinds produced by the Vulkan backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A Vulkan entry point returned a non-success code.
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },

    /// The Vulkan loader could not be found or opened.
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("required validation layer {0} is not available")]
    MissingLayer(String),

    #[error("required extension {0} is not available")]
    MissingExtension(String),

    /// Every enumerated GPU failed at least one required capability.
    #[error("no physical device satisfies the required capabilities")]
    NoSuitableDevice,

    #[error("surface error: {0}")]
    Surface(String),

    #[error("no memory type matches filter {type_filter:#x} with {flags:?}")]
    NoMemoryType {
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    },

    /// A command buffer operation was issued from a state that does not allow it.
    #[error("cannot {op} a command buffer in state {state:?}")]
    InvalidCommandBufferState {
        op: &'static str,
        state: CommandBufferState,
    },

    #[error("timed out waiting on a fence")]
    FenceTimeout,

    #[error("backend is not initialized")]
    NotInitialized,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Attaches the name of the failing Vulkan call to a raw `VkResult`.
pub(crate) trait VkResultExt<T> {
    fn vk(self, call: &'static str) -> BackendResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn vk(self, call: &'static str) -> BackendResult<T> {
        self.map_err(|result| BackendError::Vulkan { call, result })
    }
}
