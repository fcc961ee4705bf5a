//! Device seam consumed by the frame core.
//!
//! Everything the swapchain, sync set, recorder and orchestrator need from the graphics
//! device goes through [`GpuDevice`]. Handles are plain `ash::vk` handles so the Vulkan
//! implementation is a thin forwarding layer, while tests can inject a device that
//! fabricates handles and scripts results.

pub mod vulkan;

#[cfg(test)]
pub mod mock;

use ash::prelude::VkResult;
use ash::vk;
use crate::renderer::core::state::SurfaceExtent;

/// Surface properties queried once per swapchain generation
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Everything needed to build a swapchain object
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// One graphics-queue submission of a recorded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmission {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Graphics device, graphics queue and presentation queue as seen by the frame core.
///
/// Creation methods return raw error codes; the caller classifies them into
/// [`RenderError`](crate::renderer::error::RenderError). Destruction methods must only be
/// called once the device no longer references the handle.
pub trait GpuDevice {
    // Surface and swapchain
    fn surface_support(&self, surface: vk::SurfaceKHR) -> VkResult<SurfaceSupport>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: SurfaceExtent,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Synchronization
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Blocks until `fence` is signaled. Returns `Err(vk::Result::TIMEOUT)` on expiry.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn wait_idle(&self) -> VkResult<()>;

    // Command recording
    fn create_command_pool(&self) -> VkResult<vk::CommandPool>;
    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: SurfaceExtent,
        clear_color: [f32; 4],
    );
    fn cmd_set_viewport_and_scissor(&self, cmd: vk::CommandBuffer, extent: SurfaceExtent);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, index_type: vk::IndexType);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32);
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);

    // Queues
    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<(u32, bool)>;
    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()>;
    /// Returns whether the swapchain is suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;
}

/// Presentation surface binding: the native surface handle plus the current drawable size
pub trait PresentationSurface {
    fn handle(&self) -> vk::SurfaceKHR;
    fn extent(&self) -> SurfaceExtent;
}
