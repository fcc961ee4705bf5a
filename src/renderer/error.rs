use std::time::Duration;
use ash::vk;
use thiserror::Error;

/// Unrecoverable conditions surfaced to the render loop.
///
/// Out-of-date and suboptimal surfaces never show up here; they are absorbed
/// by the frame orchestrator and reported as `DrawResult::Recreate`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("No compatible surface format found")]
    NoSurfaceFormat,

    #[error("No compatible present mode found")]
    NoPresentMode,

    #[error("Out of memory during {op}: {result}")]
    OutOfMemory { op: &'static str, result: vk::Result },

    #[error("Device lost during {op}")]
    DeviceLost { op: &'static str },

    #[error("Timed out after {timeout:?} waiting on frame slot {slot}, treating device as lost")]
    FenceTimeout { slot: usize, timeout: Duration },

    #[error("Command recording failed for frame slot {slot}: {result}")]
    Recording { slot: usize, result: vk::Result },

    #[error("Contract violation: {0}")]
    ContractViolation(&'static str),

    #[error("Invalid render config: {0}")]
    InvalidConfig(&'static str),

    #[error("Renderer has already been shut down")]
    ShutDown,

    #[error("Device error during {op}: {result}")]
    Device { op: &'static str, result: vk::Result },
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    /// Classifies a raw Vulkan error code reported by `op`.
    pub fn from_vk(op: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::OutOfMemory { op, result },
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost { op },
            _ => Self::Device { op, result },
        }
    }

    /// True when the device itself is gone and only a full device re-creation can help.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::DeviceLost { .. } | Self::FenceTimeout { .. })
    }
}

/// Shorthand for `map_err(|e| RenderError::from_vk(op, e))`.
pub(crate) trait VkResultExt<T> {
    fn during(self, op: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn during(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::from_vk(op, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_exhaustion_is_classified() {
        let err = RenderError::from_vk("create fence", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(matches!(err, RenderError::OutOfMemory { op: "create fence", .. }));
        assert!(!err.is_device_lost());
    }

    #[test]
    fn device_loss_is_distinct_from_stale_surface() {
        let lost = RenderError::from_vk("queue submit", vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(lost, RenderError::DeviceLost { op: "queue submit" });
        assert!(lost.is_device_lost());

        let timeout = RenderError::FenceTimeout { slot: 1, timeout: Duration::from_secs(5) };
        assert!(timeout.is_device_lost());
    }

    #[test]
    fn other_codes_stay_generic() {
        let err = Err::<(), _>(vk::Result::ERROR_INITIALIZATION_FAILED).during("create swapchain");
        assert_eq!(
            err,
            Err(RenderError::Device {
                op: "create swapchain",
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            })
        );
    }
}
