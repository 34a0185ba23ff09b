/// FrameScheduler - multi-buffered frame synchronization and the per-tick loop body
///
/// One tick = one frame: wait on the slot fence, acquire an image, reset the
/// fence, record, submit, present, advance to the next slot.

use std::time::Duration;

use crate::command_recorder::{CommandRecorder, FrameInputs};
use crate::context::GraphicsContext;
use crate::error::{Error, InitResource, Result};
use crate::filter::Filter;
use crate::graphics_device::{
    AcquireCode, Device, Fence, GraphicsDevice, PresentOutcome, Queue, Semaphore, SubmitDesc,
};
use crate::swapchain::SwapchainState;
use crate::{engine_debug, engine_error, engine_trace, engine_warn};

const SOURCE: &str = "vkfilter::FrameScheduler";

// ===== FRAME SLOTS =====

/// Synchronization objects of one in-flight frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSlot {
    /// Signaled when the acquired image is ready to be rendered into
    pub image_available: Semaphore,
    /// Signaled when rendering finished, waited by present
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completed (created signaled)
    pub in_flight: Fence,
}

/// Round-robin ring of frame slots
#[derive(Debug, Default)]
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameSlots {
    /// Create `count` slots; on failure everything already created is destroyed
    pub fn create(gd: &mut dyn GraphicsDevice, device: Device, count: usize) -> Result<Self> {
        let mut slots = FrameSlots::default();
        for _ in 0..count {
            match Self::create_slot(gd, device) {
                Ok(slot) => slots.slots.push(slot),
                Err((err, partial)) => {
                    slots.slots.push(partial);
                    slots.destroy(gd, device);
                    return Err(err.during_init(InitResource::SyncObject));
                }
            }
        }
        engine_debug!(SOURCE, "{} frame slots created", count);
        Ok(slots)
    }

    fn create_slot(
        gd: &mut dyn GraphicsDevice,
        device: Device,
    ) -> std::result::Result<FrameSlot, (Error, FrameSlot)> {
        let mut slot = FrameSlot::default();
        slot.image_available = gd.create_semaphore(device).map_err(move |e| (e, slot))?;
        slot.render_finished = gd.create_semaphore(device).map_err(move |e| (e, slot))?;
        slot.in_flight = gd.create_fence(device, true).map_err(move |e| (e, slot))?;
        Ok(slot)
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        if !self.slots.is_empty() {
            self.current = (self.current + 1) % self.slots.len();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }

    /// Wait until no slot has work in flight
    pub fn wait_all(&self, gd: &mut dyn GraphicsDevice, device: Device, timeout: Duration) -> Result<()> {
        for slot in &self.slots {
            if !gd.wait_for_fence(device, slot.in_flight, timeout)? {
                return Err(Error::BackendError(format!(
                    "frame fence not signaled within {:?}",
                    timeout
                )));
            }
        }
        Ok(())
    }

    pub fn destroy(&mut self, gd: &mut dyn GraphicsDevice, device: Device) {
        for slot in self.slots.drain(..) {
            if !slot.in_flight.is_null() {
                gd.destroy_fence(device, slot.in_flight);
            }
            if !slot.render_finished.is_null() {
                gd.destroy_semaphore(device, slot.render_finished);
            }
            if !slot.image_available.is_null() {
                gd.destroy_semaphore(device, slot.image_available);
            }
        }
        self.current = 0;
    }
}

// ===== SCHEDULER =====

/// Why a tick ended without submitting anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FenceTimeout,
    AcquireTimeout,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame submitted and presented; `stale` when present reported a mismatched swapchain
    Presented { image_index: u32, stale: bool },
    Skipped(SkipReason),
}

/// Frame slots plus the fence that last used each swapchain image
#[derive(Debug)]
pub struct FrameScheduler {
    slots: FrameSlots,
    image_fences: Vec<Fence>,
    fence_timeout: Duration,
}

impl FrameScheduler {
    pub fn create(
        gd: &mut dyn GraphicsDevice,
        device: Device,
        slot_count: usize,
        image_count: usize,
        fence_timeout: Duration,
    ) -> Result<Self> {
        let slots = FrameSlots::create(gd, device, slot_count)?;
        Ok(Self {
            slots,
            image_fences: vec![Fence::NULL; image_count],
            fence_timeout,
        })
    }

    pub fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Forget which slot used which image (after the swapchain was recreated)
    pub fn reset_image_tracking(&mut self, image_count: usize) {
        self.image_fences = vec![Fence::NULL; image_count];
    }

    /// Run one frame
    ///
    /// `AcquireStaleSwapchain` is returned when the swapchain is out of date;
    /// the caller is expected to resize. Any failure after the image was
    /// acquired consumes the slot semaphores and re-signals the slot fence so
    /// the slot stays usable.
    pub fn tick(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        ctx: &GraphicsContext,
        swapchain: &SwapchainState,
        recorder: &mut CommandRecorder,
        filter: Option<&mut dyn Filter>,
        inputs: &FrameInputs,
    ) -> Result<TickOutcome> {
        if self.slots.is_empty() {
            return Err(Error::BackendError("no frame slots".to_string()));
        }
        let slot = *self.slots.current();

        if !gd.wait_for_fence(ctx.device, slot.in_flight, self.fence_timeout)? {
            engine_warn!(SOURCE, "Slot {} fence not signaled within {:?}", self.slots.current_index(), self.fence_timeout);
            return Ok(TickOutcome::Skipped(SkipReason::FenceTimeout));
        }

        let acquired = gd.acquire_next_image(
            ctx.device,
            swapchain.swapchain,
            slot.image_available,
            self.fence_timeout,
        );
        if !acquired.succeeded {
            return match acquired.code {
                AcquireCode::OutOfDate => Err(Error::AcquireStaleSwapchain),
                AcquireCode::Timeout | AcquireCode::NotReady => {
                    Ok(TickOutcome::Skipped(SkipReason::AcquireTimeout))
                }
                code => Err(Error::BackendError(format!("image acquire failed: {:?}", code))),
            };
        }
        let image_index = acquired.index;

        if let Err(err) = gd.reset_fence(ctx.device, slot.in_flight) {
            // The fence is still signaled, only the acquire signal needs consuming
            consume_semaphore(gd, ctx.queue, slot.image_available, Fence::NULL);
            self.slots.advance();
            return Err(err);
        }

        if let Err(err) = self.record_and_submit(gd, ctx, swapchain, recorder, filter, inputs, &slot, image_index) {
            consume_semaphore(gd, ctx.queue, slot.image_available, slot.in_flight);
            self.slots.advance();
            return Err(err);
        }

        let presented = gd.queue_present(ctx.queue, swapchain.swapchain, image_index, slot.render_finished);
        self.slots.advance();

        let presented = match presented {
            Ok(outcome) => outcome,
            Err(err) => {
                // A rejected present leaves the render signal pending
                consume_semaphore(gd, ctx.queue, slot.render_finished, Fence::NULL);
                return Err(err);
            }
        };
        let stale = match presented {
            PresentOutcome::Presented => acquired.code == AcquireCode::Suboptimal,
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => true,
        };
        engine_trace!(SOURCE, "Presented image {}", image_index);
        Ok(TickOutcome::Presented { image_index, stale })
    }

    #[allow(clippy::too_many_arguments)]
    fn record_and_submit(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        ctx: &GraphicsContext,
        swapchain: &SwapchainState,
        recorder: &mut CommandRecorder,
        filter: Option<&mut dyn Filter>,
        inputs: &FrameInputs,
        slot: &FrameSlot,
        image_index: u32,
    ) -> Result<()> {
        let index = image_index as usize;
        let framebuffer = *swapchain.framebuffers.get(index).ok_or_else(|| {
            Error::BackendError(format!("acquired image {} has no framebuffer", image_index))
        })?;
        if index >= self.image_fences.len() {
            self.image_fences.resize(index + 1, Fence::NULL);
        }

        // The image may still be in use by a submission from another slot
        let previous = self.image_fences[index];
        if !previous.is_null() && previous != slot.in_flight
            && !gd.wait_for_fence(ctx.device, previous, self.fence_timeout)?
        {
            return Err(Error::BackendError(format!(
                "image {} still in use after {:?}",
                image_index, self.fence_timeout
            )));
        }

        let command_buffer = recorder.record(
            gd,
            image_index,
            swapchain.render_pass,
            framebuffer,
            swapchain.extent,
            filter,
            inputs,
        )?;

        gd.queue_submit(
            ctx.queue,
            &SubmitDesc {
                command_buffer: Some(command_buffer),
                wait: slot.image_available,
                signal: Some(slot.render_finished),
                fence: slot.in_flight,
            },
        )?;
        self.image_fences[index] = slot.in_flight;
        Ok(())
    }

    pub fn wait_all(&self, gd: &mut dyn GraphicsDevice, device: Device) -> Result<()> {
        self.slots.wait_all(gd, device, self.fence_timeout)
    }

    pub fn destroy(&mut self, gd: &mut dyn GraphicsDevice, device: Device) {
        self.slots.destroy(gd, device);
        self.image_fences.clear();
        engine_debug!(SOURCE, "Frame slots destroyed");
    }
}

/// Wait on `wait` with an empty submission, signaling `fence` (may be null) on completion
fn consume_semaphore(gd: &mut dyn GraphicsDevice, queue: Queue, wait: Semaphore, fence: Fence) {
    let submit = SubmitDesc {
        command_buffer: None,
        wait,
        signal: None,
        fence,
    };
    if let Err(err) = gd.queue_submit(queue, &submit) {
        engine_error!(SOURCE, "Could not recover frame slot: {}", err);
    }
}

#[cfg(test)]
#[path = "frame_scheduler_tests.rs"]
mod tests;
