use std::time::Duration;
use ash::vk;
use crate::renderer::error::{RenderError, RenderResult};

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// What the orchestrator does when it has to rebuild the swapchain while the surface
/// reports a zero extent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizedPolicy {
    /// Keep the old swapchain, skip rendering and retry on the next `draw_frame`
    Defer,
    /// Block the calling thread, polling the surface extent until it is non-zero again.
    ///
    /// No window events are processed while blocked. Only use this when the surface extent
    /// is updated outside the calling thread's event loop, otherwise restoring the window
    /// can never be observed and the call hangs. Winit reports `inner_size` through the
    /// event loop on most platforms, so the demo app uses [`MinimizedPolicy::Defer`].
    Block { poll_interval: Duration },
}

/// Contains configuration options for the renderer like vsync and frame pacing
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub vsync: bool,
    pub frames_in_flight: usize,
    /// Diagnostic bound on fence waits and image acquisition. Expiry is treated as device loss.
    pub fence_timeout: Duration,
    pub minimized: MinimizedPolicy,
    pub preferred_format: vk::SurfaceFormatKHR,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            fence_timeout: Duration::from_secs(5),
            minimized: MinimizedPolicy::Defer,
            preferred_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig("frames_in_flight must be at least 1"));
        }
        if self.fence_timeout.is_zero() {
            return Err(RenderError::InvalidConfig("fence_timeout must be non-zero"));
        }
        if let MinimizedPolicy::Block { poll_interval } = self.minimized {
            if poll_interval.is_zero() {
                return Err(RenderError::InvalidConfig("minimized poll interval must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}
