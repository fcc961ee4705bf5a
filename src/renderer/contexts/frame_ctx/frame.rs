use std::time::Duration;
use ash::vk;
use crate::renderer::backend::GpuDevice;
use crate::renderer::error::{RenderError, RenderResult, VkResultExt};

/// Synchronization primitives owned by one frame slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync {
    // Signaled when the GPU has finished executing the slot's last submission.
    pub in_flight: vk::Fence,

    // Signaled when the acquired swapchain image is ready to be rendered to.
    pub image_acquired: vk::Semaphore,

    // Signaled when rendering is done and the image may be presented.
    pub render_finished: vk::Semaphore,
}

/// One [`FrameSync`] per frame in flight.
///
/// Fences are created signaled so the first wait on every slot returns immediately.
#[derive(Debug, Default)]
pub struct FrameSyncSet {
    slots: Vec<FrameSync>,
}

impl FrameSyncSet {
    pub fn create<D: GpuDevice + ?Sized>(
        device: &D,
        frames_in_flight: usize,
    ) -> RenderResult<Self> {
        let mut set = Self {
            slots: Vec::with_capacity(frames_in_flight),
        };
        for _ in 0..frames_in_flight {
            match Self::create_slot(device) {
                Ok(sync) => set.slots.push(sync),
                Err(e) => {
                    set.destroy(device);
                    return Err(e);
                }
            }
        }
        log::info!("Created sync objects for {} frames in flight", frames_in_flight);
        Ok(set)
    }

    fn create_slot<D: GpuDevice + ?Sized>(device: &D) -> RenderResult<FrameSync> {
        let in_flight = device.create_fence(true).during("create in-flight fence")?;
        let image_acquired = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_fence(in_flight);
                return Err(RenderError::from_vk("create image-acquired semaphore", e));
            }
        };
        let render_finished = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_acquired);
                device.destroy_fence(in_flight);
                return Err(RenderError::from_vk("create render-finished semaphore", e));
            }
        };
        Ok(FrameSync {
            in_flight,
            image_acquired,
            render_finished,
        })
    }

    /// Only valid once the device is idle. Safe to call more than once.
    pub fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        for sync in self.slots.drain(..) {
            device.destroy_semaphore(sync.render_finished);
            device.destroy_semaphore(sync.image_acquired);
            device.destroy_fence(sync.in_flight);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, slot: usize) -> Option<&FrameSync> {
        self.slots.get(slot)
    }

    /// Blocks until the GPU has retired the last submission made from `slot`.
    ///
    /// Expiry of `timeout` is reported as [`RenderError::FenceTimeout`].
    pub fn wait<D: GpuDevice + ?Sized>(
        &self,
        device: &D,
        slot: usize,
        timeout: Duration,
    ) -> RenderResult<WaitedSlot> {
        let sync = *self
            .slots
            .get(slot)
            .ok_or(RenderError::ContractViolation("frame slot out of range"))?;
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

        match device.wait_for_fence(sync.in_flight, timeout_ns) {
            Ok(()) => Ok(WaitedSlot { slot, sync }),
            Err(vk::Result::TIMEOUT) => Err(RenderError::FenceTimeout { slot, timeout }),
            Err(e) => Err(RenderError::from_vk("wait for in-flight fence", e)),
        }
    }
}

impl Drop for FrameSyncSet {
    fn drop(&mut self) {
        if !self.slots.is_empty() {
            log::error!("Frame sync set dropped without being destroyed, leaking {} slots", self.slots.len());
        }
    }
}

/// A slot whose previous submission is known to have completed. Commands may be
/// recorded against it.
#[must_use]
#[derive(Debug)]
pub struct WaitedSlot {
    slot: usize,
    sync: FrameSync,
}

impl WaitedSlot {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    /// Unsignals the slot fence so the next submission can signal it again
    pub fn reset<D: GpuDevice + ?Sized>(self, device: &D) -> RenderResult<ReadySlot> {
        device.reset_fence(self.sync.in_flight).during("reset in-flight fence")?;
        Ok(ReadySlot {
            slot: self.slot,
            sync: self.sync,
        })
    }
}

/// A slot that was waited on and reset. Its fence must be handed to the next submission.
#[must_use]
#[derive(Debug)]
pub struct ReadySlot {
    slot: usize,
    sync: FrameSync,
}

impl ReadySlot {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }
}

/// Index of the current frame slot, wrapping at the number of frames in flight
#[derive(Debug, Clone, Copy)]
pub struct FrameCounter {
    current: usize,
    len: usize,
}

impl FrameCounter {
    pub fn new(len: usize) -> Self {
        Self {
            current: 0,
            len: len.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.len;
    }
}
