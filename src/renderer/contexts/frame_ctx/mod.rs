pub mod frame;
pub mod recorder;

use std::thread;
use ash::vk;
use crate::renderer::backend::{FrameSubmission, GpuDevice, PresentationSurface};
use crate::renderer::config::{MinimizedPolicy, RenderConfig};
use crate::renderer::contexts::frame_ctx::frame::{FrameCounter, FrameSyncSet};
use crate::renderer::contexts::frame_ctx::recorder::{CommandRecorder, FrameData, RecordTarget};
use crate::renderer::core::state::{RenderState, SurfaceExtent};
use crate::renderer::error::{RenderError, RenderResult, VkResultExt};
use crate::renderer::internals::swapchain::{self, SwapchainResources};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Waiting,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Recreating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawResult {
    /// The frame was submitted and presented
    Success,
    /// The swapchain was rebuilt, or had to be and could not be yet. Nothing was presented
    /// or the presented image came from the old swapchain.
    Recreate,
}

/// Drives the per-frame protocol and owns every resource that depends on the swapchain.
///
/// Responsibilities:
/// - Bound the number of frames in flight with one fence per slot
/// - Acquire, record, submit and present in that order
/// - Funnel every swapchain rebuild (stale surface, resize, minimize) through `recreate`
pub struct FrameOrchestrator<D: GpuDevice, S: PresentationSurface> {
    device: D,
    surface: S,
    config: RenderConfig,
    state: RenderState,

    surface_format: vk::SurfaceFormatKHR,
    render_pass: vk::RenderPass,
    swapchain: SwapchainResources,
    sync: FrameSyncSet,
    recorder: CommandRecorder,

    counter: FrameCounter,
    phase: FramePhase,
    next_generation: u64,
    // Set when a rebuild was deferred because the surface had no area
    recreate_pending: bool,
    shut_down: bool,
}

impl<D: GpuDevice, S: PresentationSurface> FrameOrchestrator<D, S> {
    pub fn new(
        device: D,
        surface: S,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        config.validate()?;

        let support = device
            .surface_support(surface.handle())
            .during("query surface support")?;
        let surface_format = swapchain::select_surface_format(&support, &config)?;
        let frames_in_flight = config.frames_in_flight;

        // Dropping a partially built orchestrator runs `shutdown`, which skips null handles
        let mut orchestrator = Self {
            device,
            surface,
            config,
            state: RenderState::new(),
            surface_format,
            render_pass: vk::RenderPass::null(),
            swapchain: SwapchainResources::default(),
            sync: FrameSyncSet::default(),
            recorder: CommandRecorder::default(),
            counter: FrameCounter::new(frames_in_flight),
            phase: FramePhase::Idle,
            next_generation: 1,
            recreate_pending: false,
            shut_down: false,
        };

        orchestrator.render_pass = orchestrator
            .device
            .create_render_pass(surface_format.format)
            .during("create render pass")?;
        orchestrator.sync = FrameSyncSet::create(&orchestrator.device, frames_in_flight)?;
        orchestrator.recorder = CommandRecorder::create(&orchestrator.device, frames_in_flight)?;
        orchestrator.recreate()?;
        orchestrator.set_phase(FramePhase::Idle);

        Ok(orchestrator)
    }

    /// Runs one attempt of the frame protocol on the current slot.
    ///
    /// Out-of-date and suboptimal surfaces are handled here and reported as
    /// [`DrawResult::Recreate`]. Any error is fatal.
    pub fn draw_frame(&mut self, frame: &FrameData) -> RenderResult<DrawResult> {
        if self.shut_down {
            return Err(RenderError::ShutDown);
        }

        if self.recreate_pending || !self.swapchain.is_live() {
            let rebuilt = self.recreate();
            self.set_phase(FramePhase::Idle);
            if !rebuilt? {
                // Still minimized, nothing to draw into
                return Ok(DrawResult::Recreate);
            }
        }

        let slot = self.counter.current();
        let result = self.draw_slot(slot, frame);
        self.counter.advance();
        self.set_phase(FramePhase::Idle);
        result
    }

    fn draw_slot(&mut self, slot: usize, frame: &FrameData) -> RenderResult<DrawResult> {
        self.set_phase(FramePhase::Waiting);
        let waited = self.sync.wait(&self.device, slot, self.config.fence_timeout)?;

        self.set_phase(FramePhase::Acquiring);
        let acquired = self.device.acquire_next_image(
            self.swapchain.handle(),
            waited.sync().image_acquired,
            self.config.fence_timeout_ns(),
        );
        let (image_index, acquire_suboptimal) = match acquired {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                // The fence was not reset, so the slot stays usable for the next attempt
                log::debug!("Swapchain out of date on acquire (slot {})", slot);
                self.recreate()?;
                return Ok(DrawResult::Recreate);
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                return Err(RenderError::FenceTimeout {
                    slot,
                    timeout: self.config.fence_timeout,
                });
            }
            Err(e) => return Err(RenderError::from_vk("acquire next image", e)),
        };

        self.set_phase(FramePhase::Recording);
        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .ok_or(RenderError::ContractViolation("acquired image index out of range"))?;
        let target = RecordTarget {
            render_pass: self.render_pass,
            framebuffer,
            extent: self.swapchain.extent(),
        };
        // A recording error leaves the acquired image unpresented, so it is fatal
        let command_buffer = self.recorder.record(&self.device, &waited, &target, frame)?;

        self.set_phase(FramePhase::Submitting);
        // Reset right before the submission that signals it again, so an early return
        // never leaves the slot fence unsignaled
        let ready = waited.reset(&self.device)?;
        let sync = *ready.sync();
        self.device
            .queue_submit(&FrameSubmission {
                command_buffer,
                wait_semaphore: sync.image_acquired,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: sync.render_finished,
                fence: sync.in_flight,
            })
            .during("submit frame")?;

        self.set_phase(FramePhase::Presenting);
        let presented = self.device.queue_present(
            self.swapchain.handle(),
            image_index,
            sync.render_finished,
        );
        let stale = match presented {
            Ok(suboptimal) => suboptimal || acquire_suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => return Err(RenderError::from_vk("present", e)),
        };

        if stale || self.state.resize_requested() {
            log::debug!(
                "Rebuilding swapchain after present (stale: {}, resize requested: {})",
                stale,
                self.state.resize_requested(),
            );
            self.recreate()?;
            return Ok(DrawResult::Recreate);
        }

        Ok(DrawResult::Success)
    }

    /// Rebuilds the swapchain for an extent observed by the windowing layer.
    ///
    /// Does nothing if the live swapchain already has the extent this request resolves to
    /// and no rebuild is pending.
    pub fn resize(&mut self, extent: SurfaceExtent) -> RenderResult<()> {
        if self.shut_down {
            return Err(RenderError::ShutDown);
        }
        if self.swapchain.is_live() && !self.recreate_pending && !self.state.resize_requested() {
            // The live extent is clamped to the surface limits, so compare against the same
            let resolved = swapchain::resolve_extent(&self.device, self.surface.handle(), extent)?;
            if resolved == self.swapchain.extent() {
                return Ok(());
            }
        }

        self.state.request_extent(extent);
        let result = self.recreate();
        self.set_phase(FramePhase::Idle);
        result.map(|_| ())
    }

    /// Marks the swapchain for a rebuild after the next present
    pub fn request_resize(&mut self) {
        self.state.request_resize();
    }

    /// The only place the swapchain is rebuilt. Returns false when the rebuild was deferred
    /// because the surface has no area.
    fn recreate(&mut self) -> RenderResult<bool> {
        self.set_phase(FramePhase::Recreating);

        let Some(requested) = self.target_extent() else {
            return Ok(self.defer_recreate());
        };
        let extent = swapchain::resolve_extent(&self.device, self.surface.handle(), requested)?;
        if extent.is_minimized() {
            return Ok(self.defer_recreate());
        }

        // Every slot's submission references the old framebuffers
        self.device.wait_idle().during("wait for device idle")?;
        self.swapchain.destroy(&self.device);

        self.swapchain = SwapchainResources::create(
            &self.device,
            self.surface.handle(),
            self.render_pass,
            self.surface_format,
            extent,
            &self.config,
            self.next_generation,
        )?;
        self.next_generation += 1;

        self.state.clear();
        self.recreate_pending = false;
        Ok(true)
    }

    fn target_extent(&self) -> Option<SurfaceExtent> {
        let extent = self
            .state
            .pending_extent()
            .unwrap_or_else(|| self.surface.extent());
        if !extent.is_minimized() {
            return Some(extent);
        }

        match self.config.minimized {
            MinimizedPolicy::Defer => None,
            MinimizedPolicy::Block { poll_interval } => {
                log::debug!("Surface minimized, blocking until it has an area again");
                loop {
                    thread::sleep(poll_interval);
                    let extent = self.surface.extent();
                    if !extent.is_minimized() {
                        return Some(extent);
                    }
                }
            }
        }
    }

    fn defer_recreate(&mut self) -> bool {
        if !self.recreate_pending {
            log::debug!("Surface minimized, deferring swapchain rebuild");
        }
        // Re-query the surface next time instead of reusing a zero request
        self.state.clear();
        self.recreate_pending = true;
        false
    }

    /// Waits for the device to go idle and destroys everything this orchestrator created.
    ///
    /// Safe to call more than once. Every later `draw_frame` or `resize` fails with
    /// [`RenderError::ShutDown`].
    pub fn shutdown(&mut self) -> RenderResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        // Destruction goes ahead even if the device is lost
        let idle = self.device.wait_idle().during("wait for device idle on shutdown");
        self.swapchain.destroy(&self.device);
        if self.render_pass != vk::RenderPass::null() {
            self.device.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
        self.recorder.destroy(&self.device);
        self.sync.destroy(&self.device);
        self.set_phase(FramePhase::Idle);

        log::info!("Frame orchestrator shut down");
        idle
    }

    fn set_phase(&mut self, phase: FramePhase) {
        if self.phase != phase {
            log::trace!("Frame phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn swapchain(&self) -> &SwapchainResources {
        &self.swapchain
    }

    pub fn sync(&self) -> &FrameSyncSet {
        &self.sync
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn current_slot(&self) -> usize {
        self.counter.current()
    }

    /// Generation of the live swapchain, 0 before the first one was built
    pub fn generation(&self) -> u64 {
        self.swapchain.generation()
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }
}

impl<D: GpuDevice, S: PresentationSurface> Drop for FrameOrchestrator<D, S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Failed to shut down frame orchestrator cleanly: {}", e);
        }
    }
}
