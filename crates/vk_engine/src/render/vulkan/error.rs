//! Vulkan error types and the fatal-error policy
//!
//! Most graphics API failures indicate programmer or driver-state errors that
//! cannot be recovered from. Two families are recoverable and are classified
//! here: descriptor pool exhaustion (retried once with a fresh pool) and an
//! out-of-date swapchain (deferred to the next loop iteration as a resize).

use ash::vk;
use thiserror::Error;

use crate::render::vulkan::window::WindowError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// A frame fence did not signal within the configured timeout
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout {
        /// Timeout that elapsed, in nanoseconds
        timeout_ns: u64,
    },

    /// A descriptor allocation failed even after retrying with a fresh pool
    #[error("Descriptor pool exhausted: {0:?}")]
    DescriptorPoolExhausted(vk::Result),

    /// The swapchain no longer matches the surface and must be recreated
    #[error("Swapchain out of date")]
    SwapchainOutOfDate,

    /// A compiled shader binary could not be turned into a shader module
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Path of the shader binary
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl VulkanError {
    /// Whether the error asks for a swapchain rebuild rather than an abort
    pub fn is_out_of_date(&self) -> bool {
        matches!(
            self,
            Self::SwapchainOutOfDate
                | Self::Api(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR)
        )
    }

    /// The raw result code behind this error, if there is one
    pub fn result_code(&self) -> Option<vk::Result> {
        match self {
            Self::Api(code) | Self::DescriptorPoolExhausted(code) => Some(*code),
            Self::FenceTimeout { .. } => Some(vk::Result::TIMEOUT),
            Self::SwapchainOutOfDate => Some(vk::Result::ERROR_OUT_OF_DATE_KHR),
            _ => None,
        }
    }
}

/// The two allocation failures a fresh descriptor pool can recover from
pub fn is_pool_exhausted(result: vk::Result) -> bool {
    result == vk::Result::ERROR_OUT_OF_POOL_MEMORY || result == vk::Result::ERROR_FRAGMENTED_POOL
}

/// Log a fatal error and terminate the process without unwinding.
///
/// There is no graceful shutdown from a fatal GPU error: resources may still
/// be referenced by in-flight work, so nothing is destroyed.
pub fn abort_on_fatal(error: &VulkanError) -> ! {
    match error.result_code() {
        Some(code) => log::error!("Detected Vulkan error: {code:?} ({error})"),
        None => log::error!("Detected Vulkan error: {error}"),
    }
    log::logger().flush();
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_classification() {
        assert!(is_pool_exhausted(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        assert!(is_pool_exhausted(vk::Result::ERROR_FRAGMENTED_POOL));
        assert!(!is_pool_exhausted(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert!(!is_pool_exhausted(vk::Result::SUCCESS));
    }

    #[test]
    fn test_out_of_date_classification() {
        assert!(VulkanError::SwapchainOutOfDate.is_out_of_date());
        assert!(VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR).is_out_of_date());
        assert!(!VulkanError::FenceTimeout { timeout_ns: 1 }.is_out_of_date());
        assert!(!VulkanError::Api(vk::Result::ERROR_DEVICE_LOST).is_out_of_date());
    }

    #[test]
    fn test_result_code_of_fence_timeout() {
        let err = VulkanError::FenceTimeout { timeout_ns: 1_000 };
        assert_eq!(err.result_code(), Some(vk::Result::TIMEOUT));
        assert_eq!(VulkanError::NoSuitableMemoryType.result_code(), None);
    }
}
