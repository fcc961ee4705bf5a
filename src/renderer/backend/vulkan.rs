use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use crate::renderer::backend::{FrameSubmission, GpuDevice, SurfaceSupport, SwapchainDesc};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::core::state::SurfaceExtent;

/// [`GpuDevice`] implemented on top of an `ash` logical device and its queues
pub struct AshDevice {
    logical: Arc<ash::Device>,
    physical: vk::PhysicalDevice,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    graphics_queue: Arc<Queue>,
    present_queue: Arc<Queue>,
}

impl AshDevice {
    pub fn new(
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(
            &ins.instance,
            &dev.logical,
        );

        Self {
            logical: dev.logical.clone(),
            physical: dev.physical,
            surface_loader: ins.surface_loader.clone(),
            swapchain_loader,
            graphics_queue: dev.graphics_queue.clone(),
            present_queue: dev.present_queue.clone(),
        }
    }
}

impl GpuDevice for AshDevice {
    fn surface_support(&self, surface: vk::SurfaceKHR) -> VkResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self.surface_loader
                    .get_physical_device_surface_capabilities(self.physical, surface)?,
                formats: self.surface_loader
                    .get_physical_device_surface_formats(self.physical, surface)?,
                present_modes: self.surface_loader
                    .get_physical_device_surface_present_modes(self.physical, surface)?,
            })
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let queue_family_indices = [
            self.graphics_queue.family.index,
            self.present_queue.family.index,
        ];
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .image_array_layers(1);

        // Images are shared when graphics and present live on different families
        let swapchain_info = if self.graphics_queue.family == self.present_queue.family {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        };

        unsafe {
            self.swapchain_loader.create_swapchain(&swapchain_info, None)
        }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(swapchain, None);
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe {
            self.swapchain_loader.get_swapchain_images(swapchain)
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image(image);
        unsafe {
            self.logical.create_image_view(&view_info, None)
        }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe {
            self.logical.destroy_image_view(view, None);
        }
    }

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass> {
        let attachments = [vk::AttachmentDescription::default()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];
        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)];
        // Layout transition must wait for the acquire semaphore, which is waited on at this stage
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        unsafe {
            self.logical.create_render_pass(&render_pass_info, None)
        }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe {
            self.logical.destroy_render_pass(render_pass, None);
        }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: SurfaceExtent,
    ) -> VkResult<vk::Framebuffer> {
        let attachments = [view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        unsafe {
            self.logical.create_framebuffer(&framebuffer_info, None)
        }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe {
            self.logical.destroy_framebuffer(framebuffer, None);
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        unsafe {
            self.logical.create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe {
            self.logical.destroy_fence(fence, None);
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe {
            self.logical.wait_for_fences(&[fence], true, timeout_ns)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe {
            self.logical.reset_fences(&[fence])
        }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.logical.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe {
            self.logical.destroy_semaphore(semaphore, None);
        }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe {
            self.logical.device_wait_idle()
        }
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.graphics_queue.family.index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe {
            self.logical.create_command_pool(&pool_info, None)
        }
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .command_buffer_count(count)
            .level(vk::CommandBufferLevel::PRIMARY);
        unsafe {
            self.logical.allocate_command_buffers(&command_buffer_info)
        }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        // Frees every command buffer allocated from the pool
        unsafe {
            self.logical.destroy_command_pool(pool, None);
        }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.logical.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.logical.begin_command_buffer(cmd, &begin_info)
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.logical.end_command_buffer(cmd)
        }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: SurfaceExtent,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: extent.into(),
            })
            .clear_values(&clear_values);
        unsafe {
            self.logical.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_set_viewport_and_scissor(&self, cmd: vk::CommandBuffer, extent: SurfaceExtent) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: extent.into(),
        };
        unsafe {
            self.logical.cmd_set_viewport(cmd, 0, &[viewport]);
            self.logical.cmd_set_scissor(cmd, 0, &[scissor]);
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.logical.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.logical.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.logical.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]);
        }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.logical.cmd_bind_index_buffer(cmd, buffer, 0, index_type);
        }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        unsafe {
            self.logical.cmd_draw(cmd, vertex_count, 1, 0, 0);
        }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        unsafe {
            self.logical.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.logical.cmd_end_render_pass(cmd);
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        let wait_semaphores = [submission.wait_semaphore];
        let wait_stages = [submission.wait_stage];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.signal_semaphore];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.logical.queue_submit(
                self.graphics_queue.handle,
                &[submit_info],
                submission.fence,
            )
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe {
            self.swapchain_loader.queue_present(self.present_queue.handle, &present_info)
        }
    }
}
