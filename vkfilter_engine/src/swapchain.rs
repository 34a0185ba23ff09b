/// SwapchainManager - swapchain, image views, framebuffers and the render pass
///
/// A `SwapchainState` is either fully constructed or fully torn down: every
/// failing step destroys what the state already owns before returning.

use crate::config::EngineConfig;
use crate::context::GraphicsContext;
use crate::error::{Error, InitResource, Result};
use crate::frame_scheduler::FrameSlots;
use crate::graphics_device::{
    ColorFormat, Device, Extent2D, Framebuffer, GraphicsDevice, Image, ImageView, PresentMode,
    RenderPass, Swapchain, SwapchainDesc, SurfaceCapabilities,
};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "vkfilter::Swapchain";

// ===== SELECTION RULES =====

/// Preferred format when the surface supports it, else the first reported one
pub fn choose_format(caps: &SurfaceCapabilities, preferred: ColorFormat) -> Result<ColorFormat> {
    if caps.formats.contains(&preferred) {
        return Ok(preferred);
    }
    caps.formats
        .first()
        .copied()
        .ok_or_else(|| Error::init(InitResource::Swapchain, "surface reports no formats"))
}

/// Preferred present mode when supported, else FIFO (always available)
pub fn choose_present_mode(caps: &SurfaceCapabilities, preferred: PresentMode) -> PresentMode {
    if caps.present_modes.contains(&preferred) {
        preferred
    } else {
        PresentMode::Fifo
    }
}

/// One more than the minimum, capped by the maximum (0 = unbounded)
pub fn choose_image_count(caps: &SurfaceCapabilities) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// Surface extent when the surface defines one, else the request clamped to the limits
pub fn choose_extent(caps: &SurfaceCapabilities, requested: Extent2D) -> Extent2D {
    match caps.current_extent {
        Some(extent) => extent,
        None => requested.clamp(caps.min_extent, caps.max_extent),
    }
}

// ===== STATE =====

/// What changed during a resize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResizeOutcome {
    /// The command buffer array must be reallocated
    pub image_count_changed: bool,
    /// The surface format changed: the filter must be rebuilt against the new render pass
    pub render_pass_recreated: bool,
}

/// Swapchain, its images, one view + framebuffer per image, and the render pass
#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainState {
    pub render_pass: RenderPass,
    pub swapchain: Swapchain,
    pub format: ColorFormat,
    pub present_mode: PresentMode,
    pub extent: Extent2D,
    pub images: Vec<Image>,
    pub views: Vec<ImageView>,
    pub framebuffers: Vec<Framebuffer>,
}

impl SwapchainState {
    fn empty(format: ColorFormat) -> Self {
        Self {
            render_pass: RenderPass::NULL,
            swapchain: Swapchain::NULL,
            format,
            present_mode: PresentMode::Fifo,
            extent: Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        }
    }

    /// Build the render pass, then the swapchain sized to `size`, then one framebuffer per image
    pub fn create(
        gd: &mut dyn GraphicsDevice,
        ctx: &GraphicsContext,
        size: Extent2D,
        config: &EngineConfig,
    ) -> Result<Self> {
        let size = size.validated()?;
        let caps = gd
            .surface_capabilities(ctx.physical_device, ctx.surface)
            .map_err(|e| e.during_init(InitResource::Swapchain))?;
        let format = choose_format(&caps, config.preferred_format)?;

        let mut state = SwapchainState::empty(format);
        match state.build(gd, ctx, &caps, size, config) {
            Ok(()) => {
                engine_info!(
                    SOURCE,
                    "Swapchain created: {}x{}, {} images, {:?}, {:?}",
                    state.extent.width,
                    state.extent.height,
                    state.images.len(),
                    state.format,
                    state.present_mode
                );
                Ok(state)
            }
            Err(err) => {
                state.destroy(gd, ctx.device);
                Err(err)
            }
        }
    }

    /// Recreate the swapchain at `new_size`
    ///
    /// Waits for every frame slot fence first. The render pass is kept unless
    /// the surface format changed. A zero size is rejected without touching
    /// the state; a failure after teardown leaves the state fully destroyed.
    ///
    /// `release_dependents` runs before the render pass is destroyed so that
    /// pipelines built against it go first.
    pub fn resize(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        ctx: &GraphicsContext,
        slots: &FrameSlots,
        new_size: Extent2D,
        config: &EngineConfig,
        release_dependents: &mut dyn FnMut(&mut dyn GraphicsDevice),
    ) -> Result<ResizeOutcome> {
        let new_size = new_size.validated()?;
        slots.wait_all(gd, ctx.device, config.fence_timeout)?;
        let caps = gd.surface_capabilities(ctx.physical_device, ctx.surface)?;
        let format = choose_format(&caps, config.preferred_format)?;

        let old_count = self.images.len();
        self.destroy_chain(gd, ctx.device);

        let mut outcome = ResizeOutcome::default();
        let rebuilt = match self.replace_render_pass_if_needed(gd, ctx.device, format, release_dependents, &mut outcome) {
            Ok(()) => self.build_chain(gd, ctx, &caps, new_size, config),
            Err(err) => Err(err),
        };

        if let Err(err) = rebuilt {
            engine_warn!(SOURCE, "Swapchain recreation failed: {}", err);
            if !self.render_pass.is_null() {
                release_dependents(gd);
            }
            self.destroy(gd, ctx.device);
            return Err(err);
        }

        outcome.image_count_changed = self.images.len() != old_count;
        engine_info!(
            SOURCE,
            "Swapchain resized to {}x{} ({} images{}{})",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            if outcome.image_count_changed { ", image count changed" } else { "" },
            if outcome.render_pass_recreated { ", render pass recreated" } else { "" }
        );
        Ok(outcome)
    }

    fn build(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        ctx: &GraphicsContext,
        caps: &SurfaceCapabilities,
        size: Extent2D,
        config: &EngineConfig,
    ) -> Result<()> {
        self.render_pass = gd
            .create_render_pass(ctx.device, self.format)
            .map_err(|e| e.during_init(InitResource::RenderPass))?;
        engine_debug!(SOURCE, "Render pass created ({:?})", self.format);
        self.build_chain(gd, ctx, caps, size, config)
    }

    fn replace_render_pass_if_needed(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        device: Device,
        format: ColorFormat,
        release_dependents: &mut dyn FnMut(&mut dyn GraphicsDevice),
        outcome: &mut ResizeOutcome,
    ) -> Result<()> {
        if format == self.format && !self.render_pass.is_null() {
            return Ok(());
        }
        engine_info!(SOURCE, "Surface format {:?} -> {:?}, recreating render pass", self.format, format);
        if !self.render_pass.is_null() {
            release_dependents(gd);
            gd.destroy_render_pass(device, self.render_pass);
            self.render_pass = RenderPass::NULL;
        }
        self.format = format;
        self.render_pass = gd
            .create_render_pass(device, format)
            .map_err(|e| e.during_init(InitResource::RenderPass))?;
        outcome.render_pass_recreated = true;
        Ok(())
    }

    fn build_chain(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        ctx: &GraphicsContext,
        caps: &SurfaceCapabilities,
        size: Extent2D,
        config: &EngineConfig,
    ) -> Result<()> {
        self.extent = choose_extent(caps, size);
        self.present_mode = choose_present_mode(caps, config.present_mode);

        let desc = SwapchainDesc {
            surface: ctx.surface,
            format: self.format,
            extent: self.extent,
            image_count: choose_image_count(caps),
            present_mode: self.present_mode,
            old_swapchain: Swapchain::NULL,
        };
        self.swapchain = gd
            .create_swapchain(ctx.device, &desc)
            .map_err(|e| e.during_init(InitResource::Swapchain))?;
        self.images = gd
            .swapchain_images(ctx.device, self.swapchain)
            .map_err(|e| e.during_init(InitResource::Swapchain))?;

        for &image in &self.images {
            let view = gd
                .create_image_view(ctx.device, image, self.format)
                .map_err(|e| e.during_init(InitResource::ImageView))?;
            self.views.push(view);
        }
        for &view in &self.views {
            let framebuffer = gd
                .create_framebuffer(ctx.device, self.render_pass, view, self.extent)
                .map_err(|e| e.during_init(InitResource::Framebuffer))?;
            self.framebuffers.push(framebuffer);
        }
        engine_debug!(SOURCE, "{} framebuffers created", self.framebuffers.len());
        Ok(())
    }

    /// Framebuffers, image views, then the swapchain (render pass kept)
    fn destroy_chain(&mut self, gd: &mut dyn GraphicsDevice, device: Device) {
        for framebuffer in self.framebuffers.drain(..) {
            gd.destroy_framebuffer(device, framebuffer);
        }
        for view in self.views.drain(..) {
            gd.destroy_image_view(device, view);
        }
        self.images.clear();
        if !self.swapchain.is_null() {
            gd.destroy_swapchain(device, self.swapchain);
            self.swapchain = Swapchain::NULL;
            engine_debug!(SOURCE, "Swapchain destroyed");
        }
    }

    /// Release framebuffers, swapchain and render pass, in that order
    pub fn destroy(&mut self, gd: &mut dyn GraphicsDevice, device: Device) {
        self.destroy_chain(gd, device);
        if !self.render_pass.is_null() {
            gd.destroy_render_pass(device, self.render_pass);
            self.render_pass = RenderPass::NULL;
            engine_debug!(SOURCE, "Render pass destroyed");
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// True once construction completed and before teardown
    pub fn is_complete(&self) -> bool {
        !self.render_pass.is_null()
            && !self.swapchain.is_null()
            && !self.images.is_empty()
            && self.framebuffers.len() == self.images.len()
    }
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
