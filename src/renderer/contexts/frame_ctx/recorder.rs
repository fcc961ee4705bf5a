use ash::vk;
use crate::renderer::backend::GpuDevice;
use crate::renderer::contexts::frame_ctx::frame::WaitedSlot;
use crate::renderer::core::state::SurfaceExtent;
use crate::renderer::error::{RenderError, RenderResult, VkResultExt};

/// Work for one frame, supplied by the render loop
#[derive(Debug, Clone)]
pub struct FrameData {
    pub clear_color: [f32; 4],
    pub draws: Vec<DrawCall>,
}

impl Default for FrameData {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            draws: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: Option<(vk::Buffer, vk::IndexType)>,
    /// Index count when `index_buffer` is set, vertex count otherwise
    pub count: u32,
}

/// Framebuffer the recorded render pass writes to
#[derive(Debug, Clone, Copy)]
pub struct RecordTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: SurfaceExtent,
}

/// One reusable primary command buffer per frame slot, re-recorded from scratch every frame
#[derive(Debug, Default)]
pub struct CommandRecorder {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecorder {
    pub fn create<D: GpuDevice + ?Sized>(
        device: &D,
        frames_in_flight: usize,
    ) -> RenderResult<Self> {
        let pool = device.create_command_pool().during("create command pool")?;
        let count = u32::try_from(frames_in_flight)
            .map_err(|_| RenderError::InvalidConfig("frames_in_flight does not fit in u32"));
        let buffers = count.and_then(|count| {
            device
                .allocate_command_buffers(pool, count)
                .during("allocate command buffers")
        });
        match buffers {
            Ok(buffers) => Ok(Self { pool, buffers }),
            Err(e) => {
                device.destroy_command_pool(pool);
                Err(e)
            }
        }
    }

    /// Frees the pool and with it every command buffer. Only valid once the device is idle.
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        self.buffers.clear();
        if self.pool != vk::CommandPool::null() {
            device.destroy_command_pool(self.pool);
            self.pool = vk::CommandPool::null();
        }
    }

    pub fn buffer(&self, slot: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(slot).copied()
    }

    /// Re-records the slot's command buffer with one render pass over `target`.
    ///
    /// Taking a [`WaitedSlot`] means the GPU is done with the buffer being overwritten.
    pub fn record<D: GpuDevice + ?Sized>(
        &self,
        device: &D,
        waited: &WaitedSlot,
        target: &RecordTarget,
        frame: &FrameData,
    ) -> RenderResult<vk::CommandBuffer> {
        let slot = waited.slot();
        let cmd = self
            .buffer(slot)
            .ok_or(RenderError::ContractViolation("no command buffer for frame slot"))?;
        let recording = |result| RenderError::Recording { slot, result };

        device.reset_command_buffer(cmd).map_err(recording)?;
        device.begin_command_buffer(cmd).map_err(recording)?;

        device.cmd_begin_render_pass(
            cmd,
            target.render_pass,
            target.framebuffer,
            target.extent,
            frame.clear_color,
        );
        // Viewport and scissor are dynamic so pipelines survive swapchain recreation
        device.cmd_set_viewport_and_scissor(cmd, target.extent);

        let mut bound_pipeline = vk::Pipeline::null();
        for draw in &frame.draws {
            if draw.pipeline != bound_pipeline {
                device.cmd_bind_pipeline(cmd, draw.pipeline);
                bound_pipeline = draw.pipeline;
            }
            if let Some(set) = draw.descriptor_set {
                device.cmd_bind_descriptor_set(cmd, draw.layout, set);
            }
            device.cmd_bind_vertex_buffer(cmd, draw.vertex_buffer);
            match draw.index_buffer {
                Some((buffer, index_type)) => {
                    device.cmd_bind_index_buffer(cmd, buffer, index_type);
                    device.cmd_draw_indexed(cmd, draw.count);
                }
                None => device.cmd_draw(cmd, draw.count),
            }
        }

        device.cmd_end_render_pass(cmd);
        device.end_command_buffer(cmd).map_err(recording)?;

        Ok(cmd)
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if self.pool != vk::CommandPool::null() {
            log::error!("Command recorder dropped without being destroyed");
        }
    }
}
