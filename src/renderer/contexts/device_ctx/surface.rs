use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use crate::renderer::backend::PresentationSurface;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::core::state::SurfaceExtent;

/// Presentation surface of the renderer, encapsulating the window and its Vulkan surface.
///
/// Must be dropped after every swapchain built on it and before the instance.
pub struct SurfaceBinding {
    pub window: Arc<Window>,
    pub handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl SurfaceBinding {
    pub fn new(
        window: Arc<Window>,
        ins: &RenderInstance,
    ) -> Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                ins.entry(),
                &ins.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };

        Ok(Self {
            window,
            handle,
            surface_loader: ins.surface_loader.clone(),
        })
    }
}

impl PresentationSurface for SurfaceBinding {
    fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    fn extent(&self) -> SurfaceExtent {
        self.window.inner_size().into()
    }
}

impl Drop for SurfaceBinding {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
    }
}
