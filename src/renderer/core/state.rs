use ash::vk;
use winit::dpi::PhysicalSize;

/// Drawable size of the presentation surface in device pixels
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceExtent {
    pub width: u32,
    pub height: u32,
}

impl SurfaceExtent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero dimension means the window is minimized. Rendering is suspended, not an error.
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<vk::Extent2D> for SurfaceExtent {
    fn from(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }
}

impl From<SurfaceExtent> for vk::Extent2D {
    fn from(extent: SurfaceExtent) -> Self {
        vk::Extent2D {
            width: extent.width,
            height: extent.height,
        }
    }
}

impl From<PhysicalSize<u32>> for SurfaceExtent {
    fn from(size: PhysicalSize<u32>) -> Self {
        Self::new(size.width, size.height)
    }
}

/// Contains often-mutated flags and other state information
#[derive(Debug, Default)]
pub struct RenderState {
    resize_requested: bool,
    pending_extent: Option<SurfaceExtent>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raised by the windowing layer. The next recreate re-queries the surface.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
        self.pending_extent = None;
    }

    /// Explicit resize carrying the extent the windowing layer observed
    pub fn request_extent(&mut self, extent: SurfaceExtent) {
        self.resize_requested = true;
        self.pending_extent = Some(extent);
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    pub fn pending_extent(&self) -> Option<SurfaceExtent> {
        self.pending_extent
    }

    /// Called once a recreate has succeeded
    pub fn clear(&mut self) {
        self.resize_requested = false;
        self.pending_extent = None;
    }
}
