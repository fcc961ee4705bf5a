pub mod backend;
pub mod config;
pub mod contexts;
pub mod core;
pub mod error;
pub mod internals;
pub mod resources;
pub mod shader_data;

use std::sync::Arc;
use color_eyre::Result;
use winit::dpi::PhysicalSize;
use winit::window::Window;
use crate::renderer::backend::vulkan::AshDevice;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::surface::SurfaceBinding;
use crate::renderer::contexts::frame_ctx::recorder::FrameData;
use crate::renderer::contexts::frame_ctx::{DrawResult, FrameOrchestrator};
use crate::renderer::contexts::pipeline_ctx::GraphicsPipeline;
use crate::renderer::resources::mesh::Mesh;

const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

/// Vulkan renderer drawing the demo quad through the frame orchestrator.
///
/// Fields are dropped in declaration order: the orchestrator waits for the device to go
/// idle and releases the swapchain and surface, then the pipeline and mesh go, and the
/// device and instance go last.
pub struct Renderer {
    frames: FrameOrchestrator<AshDevice, SurfaceBinding>,
    pipeline: GraphicsPipeline,
    mesh: Mesh,
    dev: RenderDevice,
    ins: RenderInstance,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: RenderConfig,
    ) -> Result<Self> {
        let ins = RenderInstance::new(&window)?;
        let surface = SurfaceBinding::new(window, &ins)?;
        let dev = RenderDevice::new(&ins, &surface)?;

        let frames = FrameOrchestrator::new(AshDevice::new(&ins, &dev), surface, config)?;
        let pipeline = GraphicsPipeline::new(dev.logical.clone(), frames.render_pass())?;
        let mesh = Mesh::new_quad(&dev)?;

        Ok(Self {
            frames,
            pipeline,
            mesh,
            dev,
            ins,
        })
    }

    /// Explicit resize with the size the window reported
    pub fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        self.frames.resize(size.into())?;
        Ok(())
    }

    /// Rebuild the swapchain after the next present
    pub fn request_resize(&mut self) {
        self.frames.request_resize();
    }

    pub fn draw(&mut self) -> Result<DrawResult> {
        let frame = FrameData {
            clear_color: CLEAR_COLOR,
            draws: vec![self.mesh.draw_call(&self.pipeline)],
        };
        Ok(self.frames.draw_frame(&frame)?)
    }

    pub fn generation(&self) -> u64 {
        self.frames.generation()
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.frames.shutdown()?;
        let props = unsafe {
            self.ins.instance.get_physical_device_properties(self.dev.physical)
        };
        log::info!(
            "Renderer shut down on {:?}",
            props.device_name_as_c_str().unwrap_or(c"<unknown>"),
        );
        Ok(())
    }
}
