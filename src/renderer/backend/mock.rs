//! In-memory [`GpuDevice`] used by the unit tests.
//!
//! Handles are fabricated from a counter, every created handle is tracked until destroyed,
//! and every call that matters for frame ordering is appended to an event log.
//! Clones share state, so a test can keep a handle on the device after moving it into
//! the orchestrator.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use crate::renderer::backend::{FrameSubmission, GpuDevice, PresentationSurface, SurfaceSupport, SwapchainDesc};
use crate::renderer::core::state::SurfaceExtent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CreateSwapchain { swapchain: vk::SwapchainKHR, extent: SurfaceExtent, present_mode: vk::PresentModeKHR },
    DestroySwapchain(vk::SwapchainKHR),
    DestroyImageView(vk::ImageView),
    DestroyFramebuffer(vk::Framebuffer),
    DestroyRenderPass(vk::RenderPass),
    DestroyCommandPool(vk::CommandPool),
    DestroyFence(vk::Fence),
    DestroySemaphore(vk::Semaphore),
    WaitFence { fence: vk::Fence, signaled: bool },
    ResetFence(vk::Fence),
    WaitIdle,
    Acquire { swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore },
    Submit(FrameSubmission),
    Present { swapchain: vk::SwapchainKHR, image_index: u32, wait_semaphore: vk::Semaphore },
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { framebuffer: vk::Framebuffer, extent: SurfaceExtent },
    SetViewportAndScissor(SurfaceExtent),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet(vk::DescriptorSet),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    Draw(u32),
    DrawIndexed(u32),
    EndRenderPass,
}

struct MockState {
    next_handle: u64,
    live: HashSet<u64>,
    fences: HashMap<vk::Fence, bool>,
    auto_complete: bool,
    support: SurfaceSupport,
    images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_image: HashMap<vk::SwapchainKHR, u32>,
    acquire_results: VecDeque<VkResult<(u32, bool)>>,
    present_results: VecDeque<VkResult<bool>>,
    submit_error: Option<vk::Result>,
    begin_error: Option<vk::Result>,
    fail_image_view_at: Option<usize>,
    image_views_created: usize,
    events: Vec<Event>,
}

#[derive(Clone)]
pub struct MockDevice {
    state: Rc<RefCell<MockState>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Device that completes submitted work immediately
    pub fn new() -> Self {
        let state = MockState {
            next_handle: 0x1000,
            live: HashSet::new(),
            fences: HashMap::new(),
            auto_complete: true,
            support: default_support(),
            images: HashMap::new(),
            next_image: HashMap::new(),
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            submit_error: None,
            begin_error: None,
            fail_image_view_at: None,
            image_views_created: 0,
            events: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Device whose submitted fences stay unsignaled until `complete_all` or `wait_idle`
    pub fn manual() -> Self {
        let device = Self::new();
        device.state.borrow_mut().auto_complete = false;
        device
    }

    pub fn set_support(&self, support: SurfaceSupport) {
        self.state.borrow_mut().support = support;
    }

    pub fn push_acquire_result(&self, result: VkResult<(u32, bool)>) {
        self.state.borrow_mut().acquire_results.push_back(result);
    }

    pub fn push_present_result(&self, result: VkResult<bool>) {
        self.state.borrow_mut().present_results.push_back(result);
    }

    pub fn fail_submit(&self, error: Option<vk::Result>) {
        self.state.borrow_mut().submit_error = error;
    }

    pub fn fail_begin(&self, error: Option<vk::Result>) {
        self.state.borrow_mut().begin_error = error;
    }

    /// Makes the `n`-th image view creation (counting from zero) fail
    pub fn fail_image_view_at(&self, n: usize) {
        let mut state = self.state.borrow_mut();
        state.fail_image_view_at = Some(state.image_views_created + n);
    }

    /// Signals every fence, as if the GPU drained its queues
    pub fn complete_all(&self) {
        for signaled in self.state.borrow_mut().fences.values_mut() {
            *signaled = true;
        }
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence).copied().unwrap_or(false)
    }

    pub fn live_handle_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.state.borrow().events.iter().filter(|e| pred(*e)).count()
    }

    /// Index of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.state.borrow().events.iter().position(pred)
    }

    fn mint<H: Handle>(&self) -> H {
        let mut state = self.state.borrow_mut();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.live.insert(raw);
        H::from_raw(raw)
    }

    fn retire<H: Handle>(&self, handle: H, what: &str) {
        let raw = handle.as_raw();
        assert!(
            self.state.borrow_mut().live.remove(&raw),
            "{} {:#x} destroyed twice or never created",
            what,
            raw,
        );
    }

    fn log(&self, event: Event) {
        self.state.borrow_mut().events.push(event);
    }
}

fn default_support() -> SurfaceSupport {
    SurfaceSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

impl GpuDevice for MockDevice {
    fn surface_support(&self, _surface: vk::SurfaceKHR) -> VkResult<SurfaceSupport> {
        Ok(self.state.borrow().support.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let swapchain: vk::SwapchainKHR = self.mint();
        let images = (0..desc.min_image_count)
            .map(|_| {
                let mut state = self.state.borrow_mut();
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect();
        self.state.borrow_mut().images.insert(swapchain, images);
        self.log(Event::CreateSwapchain {
            swapchain,
            extent: desc.extent.into(),
            present_mode: desc.present_mode,
        });
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.retire(swapchain, "swapchain");
        self.state.borrow_mut().images.remove(&swapchain);
        self.log(Event::DestroySwapchain(swapchain));
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .borrow()
            .images
            .get(&swapchain)
            .cloned()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        {
            let mut state = self.state.borrow_mut();
            let n = state.image_views_created;
            state.image_views_created += 1;
            if state.fail_image_view_at == Some(n) {
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
        }
        Ok(self.mint())
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.retire(view, "image view");
        self.log(Event::DestroyImageView(view));
    }

    fn create_render_pass(&self, _format: vk::Format) -> VkResult<vk::RenderPass> {
        Ok(self.mint())
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.retire(render_pass, "render pass");
        self.log(Event::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: SurfaceExtent,
    ) -> VkResult<vk::Framebuffer> {
        Ok(self.mint())
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.retire(framebuffer, "framebuffer");
        self.log(Event::DestroyFramebuffer(framebuffer));
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence: vk::Fence = self.mint();
        self.state.borrow_mut().fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.retire(fence, "fence");
        self.state.borrow_mut().fences.remove(&fence);
        self.log(Event::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        let signaled = self.fence_signaled(fence);
        self.log(Event::WaitFence { fence, signaled });
        if signaled {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.state.borrow_mut().fences.insert(fence, false);
        self.log(Event::ResetFence(fence));
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(self.mint())
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.retire(semaphore, "semaphore");
        self.log(Event::DestroySemaphore(semaphore));
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.complete_all();
        self.log(Event::WaitIdle);
        Ok(())
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        Ok(self.mint())
    }

    fn allocate_command_buffers(&self, _pool: vk::CommandPool, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.retire(pool, "command pool");
        self.log(Event::DestroyCommandPool(pool));
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.log(Event::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        if let Some(error) = self.state.borrow().begin_error {
            return Err(error);
        }
        self.log(Event::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.log(Event::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: SurfaceExtent,
        _clear_color: [f32; 4],
    ) {
        self.log(Event::BeginRenderPass { framebuffer, extent });
    }

    fn cmd_set_viewport_and_scissor(&self, _cmd: vk::CommandBuffer, extent: SurfaceExtent) {
        self.log(Event::SetViewportAndScissor(extent));
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.log(Event::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.log(Event::BindDescriptorSet(set));
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.log(Event::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer, _index_type: vk::IndexType) {
        self.log(Event::BindIndexBuffer(buffer));
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32) {
        self.log(Event::Draw(vertex_count));
    }

    fn cmd_draw_indexed(&self, _cmd: vk::CommandBuffer, index_count: u32) {
        self.log(Event::DrawIndexed(index_count));
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.log(Event::EndRenderPass);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> VkResult<(u32, bool)> {
        self.log(Event::Acquire { swapchain, semaphore });
        let mut state = self.state.borrow_mut();
        if let Some(result) = state.acquire_results.pop_front() {
            return result;
        }
        let count = state
            .images
            .get(&swapchain)
            .map(|images| images.len() as u32)
            .ok_or(vk::Result::ERROR_OUT_OF_DATE_KHR)?;
        let next = state.next_image.entry(swapchain).or_insert(0);
        let index = *next % count;
        *next += 1;
        Ok((index, false))
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> VkResult<()> {
        if let Some(error) = self.state.borrow().submit_error {
            return Err(error);
        }
        self.log(Event::Submit(*submission));
        let mut state = self.state.borrow_mut();
        let signaled = state.auto_complete;
        state.fences.insert(submission.fence, signaled);
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        self.log(Event::Present { swapchain, image_index, wait_semaphore });
        self.state.borrow_mut().present_results.pop_front().unwrap_or(Ok(false))
    }
}

/// Window stand-in whose drawable size the test controls
pub struct MockSurface {
    extent: Cell<SurfaceExtent>,
    polls: Cell<u32>,
    restore: Cell<Option<(u32, SurfaceExtent)>>,
}

impl MockSurface {
    pub fn new(extent: SurfaceExtent) -> Self {
        Self {
            extent: Cell::new(extent),
            polls: Cell::new(0),
            restore: Cell::new(None),
        }
    }

    pub fn set_extent(&self, extent: SurfaceExtent) {
        self.extent.set(extent);
    }

    /// Switches the reported extent to `extent` once `polls` more queries have been made
    pub fn restore_after(&self, polls: u32, extent: SurfaceExtent) {
        self.restore.set(Some((self.polls.get() + polls, extent)));
    }

    pub fn polls(&self) -> u32 {
        self.polls.get()
    }
}

impl PresentationSurface for MockSurface {
    fn handle(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0xface)
    }

    fn extent(&self) -> SurfaceExtent {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        if let Some((at, extent)) = self.restore.get() {
            if polls >= at {
                self.extent.set(extent);
                self.restore.set(None);
            }
        }
        self.extent.get()
    }
}
