/// Input texture - the image sampled by the filter, and the producer handle feeding it
///
/// In engine-driven mode the caller pushes pixels or a solid color through the
/// engine. In external mode the caller gets an `InputSurface`: frames submitted
/// there are kept until the next tick (latest wins) and uploaded before recording.

use std::sync::Arc;

use glam::Mat4;
use parking_lot::Mutex;

use crate::context::GraphicsContext;
use crate::error::{Error, InitResource, Result};
use crate::graphics_device::{Extent2D, GraphicsDevice, ImageView, TextureAllocation};
use crate::pattern;
use crate::worker::FrameNotifier;
use crate::{engine_debug, engine_trace};

const SOURCE: &str = "vkfilter::InputTexture";

/// Who supplies input frames and therefore what drives the render tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// A producer writes into an `InputSurface`; ticks follow frame availability
    External,
    /// The caller pushes pixels through the engine; ticks run on a fixed interval
    EngineDriven,
}

fn check_len(extent: Extent2D, pixels: &[u8]) -> Result<()> {
    if pixels.len() != extent.rgba_len() {
        return Err(Error::InvalidArgument(format!(
            "expected {} RGBA bytes for {}x{}, got {}",
            extent.rgba_len(),
            extent.width,
            extent.height,
            pixels.len()
        )));
    }
    Ok(())
}

// ===== GPU TEXTURE =====

/// RGBA8 image + memory + view
#[derive(Debug, Default)]
pub struct InputTexture {
    allocation: TextureAllocation,
}

impl InputTexture {
    /// Create the texture and clear it to opaque black
    pub fn create(gd: &mut dyn GraphicsDevice, ctx: &GraphicsContext, extent: Extent2D) -> Result<Self> {
        let extent = extent
            .validated()
            .map_err(|e| e.during_init(InitResource::InputTexture))?;
        let allocation = gd
            .create_texture(ctx.device, extent)
            .map_err(|e| e.during_init(InitResource::InputTexture))?;

        let mut texture = Self { allocation };
        if let Err(err) = texture.fill(gd, ctx, [0, 0, 0, 255]) {
            texture.destroy(gd, ctx);
            return Err(err.during_init(InitResource::InputTexture));
        }
        engine_debug!(SOURCE, "Input texture created ({}x{})", extent.width, extent.height);
        Ok(texture)
    }

    pub fn view(&self) -> ImageView {
        self.allocation.view
    }

    pub fn extent(&self) -> Extent2D {
        self.allocation.extent
    }

    pub fn is_null(&self) -> bool {
        self.allocation.is_null()
    }

    /// Upload exactly `width * height * 4` RGBA bytes
    pub fn upload(&mut self, gd: &mut dyn GraphicsDevice, ctx: &GraphicsContext, pixels: &[u8]) -> Result<()> {
        if self.is_null() {
            return Err(Error::InvalidArgument("input texture was destroyed".to_string()));
        }
        check_len(self.extent(), pixels)?;
        gd.upload_texture(ctx.device, ctx.queue, ctx.command_pool, &self.allocation, pixels)?;
        engine_trace!(SOURCE, "Uploaded {} bytes", pixels.len());
        Ok(())
    }

    pub fn fill(&mut self, gd: &mut dyn GraphicsDevice, ctx: &GraphicsContext, rgba: [u8; 4]) -> Result<()> {
        let pixels = pattern::solid(self.extent(), rgba);
        self.upload(gd, ctx, &pixels)
    }

    pub fn destroy(&mut self, gd: &mut dyn GraphicsDevice, ctx: &GraphicsContext) {
        if !self.is_null() {
            gd.destroy_texture(ctx.device, &self.allocation);
            self.allocation = TextureAllocation::default();
            engine_debug!(SOURCE, "Input texture destroyed");
        }
    }
}

// ===== PRODUCER HANDLE =====

#[derive(Debug)]
struct PendingFrame {
    pixels: Option<Vec<u8>>,
    transform: Mat4,
}

/// Write target handed to an external frame producer
#[derive(Debug, Clone)]
pub struct InputSurface {
    extent: Extent2D,
    pending: Arc<Mutex<PendingFrame>>,
    notifier: Option<FrameNotifier>,
}

impl InputSurface {
    pub(crate) fn new(extent: Extent2D, notifier: Option<FrameNotifier>) -> Self {
        Self {
            extent,
            pending: Arc::new(Mutex::new(PendingFrame {
                pixels: None,
                transform: Mat4::IDENTITY,
            })),
            notifier,
        }
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Store a new frame, replacing any frame not yet rendered, and signal availability
    pub fn submit_frame(&self, pixels: Vec<u8>) -> Result<()> {
        check_len(self.extent, &pixels)?;
        self.pending.lock().pixels = Some(pixels);
        self.frame_available();
        Ok(())
    }

    /// Transform applied to the texture from the next frame on
    pub fn set_transform(&self, transform: Mat4) {
        self.pending.lock().transform = transform;
    }

    /// Signal that the current content should be rendered again
    pub fn frame_available(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.lock().pixels.is_some()
    }

    pub(crate) fn take_frame(&self) -> Option<Vec<u8>> {
        self.pending.lock().pixels.take()
    }

    pub(crate) fn transform(&self) -> Mat4 {
        self.pending.lock().transform
    }
}

#[cfg(test)]
#[path = "input_texture_tests.rs"]
mod tests;
