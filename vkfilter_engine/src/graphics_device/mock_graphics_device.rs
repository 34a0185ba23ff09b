/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Every call is recorded by name. Handles are tracked per kind so tests can
/// assert on leaks, use-after-destroy, frames in flight and teardown order.
/// The device state is shared between clones: keep one clone in the test and
/// hand the other to the engine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, Result};
use crate::graphics_device::{
    AcquireCode, AcquireResult, AdapterSelection, ColorFormat, CommandBuffer, CommandPool,
    DescriptorPool, DescriptorSet, DescriptorSetLayout, Device, DeviceMemory, Extent2D, Fence,
    Framebuffer, GraphicsDevice, GraphicsPipelineDesc, Image, ImageView, Instance,
    OutputSurface, PhysicalDevice, Pipeline, PipelineLayout, PresentMode, PresentOutcome,
    PushConstantRange, Queue, RenderPass, Sampler, Semaphore, ShaderModule, ShaderStages,
    SubmitDesc, Surface, SurfaceCapabilities, Swapchain, SwapchainDesc, TextureAllocation,
};

// ============================================================================
// Recorded data
// ============================================================================

/// A presented frame and the texel its draw sampled (None: cleared, no draw)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedFrame {
    pub image_index: u32,
    pub sampled: Option<[u8; 4]>,
}

#[derive(Default)]
pub struct MockState {
    next_id: u64,
    live: FxHashMap<u64, &'static str>,
    destroyed: FxHashMap<u64, &'static str>,
    children: FxHashMap<u64, Vec<u64>>,

    calls: Vec<String>,
    violations: Vec<String>,
    call_counts: FxHashMap<&'static str, u32>,
    failures: FxHashMap<&'static str, u32>,

    // surface behaviour
    formats: Vec<ColorFormat>,
    present_modes: Vec<PresentMode>,
    min_image_count: u32,
    max_image_count: u32,
    current_extent: Option<Extent2D>,
    out_of_date_acquires: u32,
    out_of_date_presents: u32,

    // swapchain content
    swapchain_images: FxHashMap<u64, Vec<Image>>,
    next_image: FxHashMap<u64, u32>,
    view_image: FxHashMap<u64, u64>,
    framebuffer_view: FxHashMap<u64, u64>,
    framebuffer_extent: FxHashMap<u64, Extent2D>,
    image_content: FxHashMap<u64, Option<[u8; 4]>>,

    // synchronization
    signaled: FxHashSet<u64>,
    signaled_semaphores: FxHashSet<u64>,
    pending: FxHashSet<u64>,
    max_in_flight: usize,
    buffer_fence: FxHashMap<u64, u64>,

    // pipeline -> render pass it was built against
    pipeline_render_pass: FxHashMap<u64, u64>,

    // recording
    recording: FxHashSet<u64>,
    buffer_framebuffer: FxHashMap<u64, u64>,
    buffer_set: FxHashMap<u64, u64>,
    buffer_sample: FxHashMap<u64, Option<[u8; 4]>>,
    draws: Vec<u32>,
    push_constants: Vec<Vec<u8>>,
    descriptor_updates: u32,

    // textures
    set_view: FxHashMap<u64, u64>,
    texture_views: FxHashMap<u64, (u64, Extent2D)>,
    uploads: FxHashMap<u64, Vec<u8>>,
    presented: Vec<PresentedFrame>,
}

impl MockState {
    fn new() -> Self {
        Self {
            next_id: 1,
            formats: vec![ColorFormat::B8G8R8A8_UNORM, ColorFormat::R8G8B8A8_UNORM],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        }
    }

    /// Record a fallible step and apply any injected failure
    fn step(&mut self, name: &'static str) -> Result<()> {
        self.calls.push(name.to_string());
        let count = self.call_counts.entry(name).or_insert(0);
        *count += 1;
        let count = *count;
        if self.failures.get(name) == Some(&count) {
            return Err(Error::BackendError(format!("injected failure in {}", name)));
        }
        Ok(())
    }

    /// Record an infallible call
    fn note(&mut self, name: &'static str) {
        self.calls.push(name.to_string());
        *self.call_counts.entry(name).or_insert(0) += 1;
    }

    fn create(&mut self, kind: &'static str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, kind);
        id
    }

    fn create_child(&mut self, parent: u64, kind: &'static str) -> u64 {
        let id = self.create(kind);
        self.children.entry(parent).or_default().push(id);
        id
    }

    fn check(&mut self, call: &str, id: u64, kind: &'static str) {
        if id == 0 {
            self.violations.push(format!("{}: null {}", call, kind));
        } else if let Some(dead) = self.destroyed.get(&id) {
            self.violations.push(format!("{}: {} #{} used after destroy", call, dead, id));
        } else {
            match self.live.get(&id) {
                Some(found) if *found == kind => {}
                Some(found) => self
                    .violations
                    .push(format!("{}: expected {} but #{} is a {}", call, kind, id, found)),
                None => self.violations.push(format!("{}: unknown {} #{}", call, kind, id)),
            }
        }
    }

    fn destroy(&mut self, call: &str, id: u64, kind: &'static str) {
        if id == 0 {
            return;
        }
        if self.destroyed.contains_key(&id) {
            self.violations.push(format!("{}: {} #{} destroyed twice", call, kind, id));
            return;
        }
        match self.live.remove(&id) {
            Some(found) if found == kind => {
                self.destroyed.insert(id, kind);
                self.destroy_children(id);
            }
            Some(found) => {
                self.live.insert(id, found);
                self.violations.push(format!("{}: #{} is a {}, not a {}", call, id, found, kind));
            }
            None => self.violations.push(format!("{}: unknown {} #{}", call, kind, id)),
        }
    }

    fn destroy_children(&mut self, parent: u64) {
        if let Some(children) = self.children.remove(&parent) {
            for child in children {
                if let Some(kind) = self.live.remove(&child) {
                    self.destroyed.insert(child, kind);
                    self.destroy_children(child);
                }
            }
        }
    }

    /// A binary semaphore must be waited on before it is signaled again
    fn signal_semaphore(&mut self, call: &str, semaphore: u64) {
        if !self.signaled_semaphores.insert(semaphore) {
            self.violations
                .push(format!("{}: semaphore #{} is already signaled", call, semaphore));
        }
    }

    /// GPU objects referenced by pending work must not be destroyed
    fn check_idle(&mut self, call: &str) {
        if !self.pending.is_empty() {
            self.violations.push(format!(
                "{}: destroyed while {} submission(s) still pending",
                call,
                self.pending.len()
            ));
        }
    }

    /// Fence completion: the submission it guards has finished on the "GPU"
    fn complete(&mut self, fence: u64) {
        self.pending.remove(&fence);
        self.signaled.insert(fence);
        self.buffer_fence.retain(|_, f| *f != fence);
    }

    fn sample_for(&self, command_buffer: u64) -> Option<[u8; 4]> {
        let set = self.buffer_set.get(&command_buffer)?;
        let view = self.set_view.get(set)?;
        let (image, extent) = self.texture_views.get(view)?;
        let pixels = self.uploads.get(image)?;
        let x = extent.width as usize / 2;
        let y = extent.height as usize / 2;
        let offset = (y * extent.width as usize + x) * 4;
        let texel = pixels.get(offset..offset + 4)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }
}

// ============================================================================
// MockGraphicsDevice
// ============================================================================

#[derive(Clone)]
pub struct MockGraphicsDevice {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockGraphicsDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Boxed clone sharing this device's state
    pub fn boxed(&self) -> Box<dyn GraphicsDevice> {
        Box::new(self.clone())
    }

    // ===== FAILURE INJECTION =====

    /// Make the `nth` (1-based) call of `step` fail
    pub fn fail_on(&self, step: &'static str, nth: u32) {
        let mut state = self.state.lock();
        let already = state.call_counts.get(step).copied().unwrap_or(0);
        state.failures.insert(step, already + nth);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// The next `count` acquires report an out-of-date swapchain
    pub fn out_of_date_acquires(&self, count: u32) {
        self.state.lock().out_of_date_acquires = count;
    }

    /// The next `count` presents report an out-of-date swapchain
    pub fn out_of_date_presents(&self, count: u32) {
        self.state.lock().out_of_date_presents = count;
    }

    pub fn set_surface_formats(&self, formats: Vec<ColorFormat>) {
        self.state.lock().formats = formats;
    }

    pub fn set_present_modes(&self, modes: Vec<PresentMode>) {
        self.state.lock().present_modes = modes;
    }

    pub fn set_image_count_range(&self, min: u32, max: u32) {
        let mut state = self.state.lock();
        state.min_image_count = min;
        state.max_image_count = max;
    }

    pub fn set_current_extent(&self, extent: Option<Extent2D>) {
        self.state.lock().current_extent = extent;
    }

    // ===== INSPECTION =====

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, step: &str) -> u32 {
        self.state.lock().call_counts.get(step).copied().unwrap_or(0)
    }

    /// Index of the first recorded `call`
    pub fn first_call(&self, call: &str) -> Option<usize> {
        self.state.lock().calls.iter().position(|c| c == call)
    }

    /// Index of the last recorded `call`
    pub fn last_call(&self, call: &str) -> Option<usize> {
        self.state.lock().calls.iter().rposition(|c| c == call)
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().violations.clone()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Live handle kinds, sorted (for readable leak assertions)
    pub fn live_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.state.lock().live.values().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn live_of_kind(&self, kind: &str) -> usize {
        self.state.lock().live.values().filter(|k| **k == kind).count()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Extents of the live framebuffers
    pub fn framebuffer_extents(&self) -> Vec<Extent2D> {
        let state = self.state.lock();
        state
            .framebuffer_extent
            .iter()
            .filter(|(id, _)| state.live.contains_key(*id))
            .map(|(_, extent)| *extent)
            .collect()
    }

    pub fn draws(&self) -> Vec<u32> {
        self.state.lock().draws.clone()
    }

    pub fn push_constants(&self) -> Vec<Vec<u8>> {
        self.state.lock().push_constants.clone()
    }

    pub fn descriptor_updates(&self) -> u32 {
        self.state.lock().descriptor_updates
    }

    pub fn presented(&self) -> Vec<PresentedFrame> {
        self.state.lock().presented.clone()
    }

    /// Pixels last uploaded to the texture behind `view`
    pub fn uploaded(&self, view: ImageView) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let (image, _) = state.texture_views.get(&view.0)?;
        state.uploads.get(image).cloned()
    }
}

// ============================================================================
// GraphicsDevice implementation
// ============================================================================

impl GraphicsDevice for MockGraphicsDevice {
    // ===== INSTANCE / SURFACE / DEVICE =====

    fn create_instance(&mut self, _app_name: &str, _enable_validation: bool) -> Result<Instance> {
        let mut s = self.state.lock();
        s.step("create_instance")?;
        Ok(Instance(s.create("instance")))
    }

    fn destroy_instance(&mut self, instance: Instance) {
        let mut s = self.state.lock();
        s.note("destroy_instance");
        s.destroy("destroy_instance", instance.0, "instance");
    }

    fn create_surface(&mut self, instance: Instance, _target: &OutputSurface) -> Result<Surface> {
        let mut s = self.state.lock();
        s.step("create_surface")?;
        s.check("create_surface", instance.0, "instance");
        Ok(Surface(s.create("surface")))
    }

    fn destroy_surface(&mut self, instance: Instance, surface: Surface) {
        let mut s = self.state.lock();
        s.note("destroy_surface");
        s.check("destroy_surface", instance.0, "instance");
        s.destroy("destroy_surface", surface.0, "surface");
    }

    fn select_physical_device(
        &mut self,
        instance: Instance,
        surface: Surface,
    ) -> Result<AdapterSelection> {
        let mut s = self.state.lock();
        s.step("select_physical_device")?;
        s.check("select_physical_device", instance.0, "instance");
        s.check("select_physical_device", surface.0, "surface");
        let physical_device = PhysicalDevice(s.create_child(instance.0, "physical_device"));
        Ok(AdapterSelection {
            physical_device,
            queue_family: 0,
        })
    }

    fn create_device(
        &mut self,
        physical_device: PhysicalDevice,
        _queue_family: u32,
    ) -> Result<(Device, Queue)> {
        let mut s = self.state.lock();
        s.step("create_device")?;
        s.check("create_device", physical_device.0, "physical_device");
        let device = s.create("device");
        let queue = s.create_child(device, "queue");
        Ok((Device(device), Queue(queue)))
    }

    fn destroy_device(&mut self, device: Device) {
        let mut s = self.state.lock();
        s.note("destroy_device");
        s.check_idle("destroy_device");
        s.destroy("destroy_device", device.0, "device");
    }

    fn device_wait_idle(&mut self, device: Device) -> Result<()> {
        let mut s = self.state.lock();
        s.step("device_wait_idle")?;
        s.check("device_wait_idle", device.0, "device");
        let pending: Vec<u64> = s.pending.iter().copied().collect();
        for fence in pending {
            s.complete(fence);
        }
        Ok(())
    }

    fn surface_capabilities(
        &mut self,
        physical_device: PhysicalDevice,
        surface: Surface,
    ) -> Result<SurfaceCapabilities> {
        let mut s = self.state.lock();
        s.step("surface_capabilities")?;
        s.check("surface_capabilities", physical_device.0, "physical_device");
        s.check("surface_capabilities", surface.0, "surface");
        Ok(SurfaceCapabilities {
            min_image_count: s.min_image_count,
            max_image_count: s.max_image_count,
            current_extent: s.current_extent,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(4096, 4096),
            formats: s.formats.clone(),
            present_modes: s.present_modes.clone(),
        })
    }

    // ===== COMMAND POOL / BUFFERS =====

    fn create_command_pool(&mut self, device: Device, _queue_family: u32) -> Result<CommandPool> {
        let mut s = self.state.lock();
        s.step("create_command_pool")?;
        s.check("create_command_pool", device.0, "device");
        Ok(CommandPool(s.create("command_pool")))
    }

    fn destroy_command_pool(&mut self, device: Device, pool: CommandPool) {
        let mut s = self.state.lock();
        s.note("destroy_command_pool");
        s.check("destroy_command_pool", device.0, "device");
        s.destroy("destroy_command_pool", pool.0, "command_pool");
    }

    fn allocate_command_buffers(
        &mut self,
        device: Device,
        pool: CommandPool,
        count: u32,
    ) -> Result<Vec<CommandBuffer>> {
        let mut s = self.state.lock();
        s.step("allocate_command_buffers")?;
        s.check("allocate_command_buffers", device.0, "device");
        s.check("allocate_command_buffers", pool.0, "command_pool");
        Ok((0..count)
            .map(|_| CommandBuffer(s.create_child(pool.0, "command_buffer")))
            .collect())
    }

    fn free_command_buffers(&mut self, device: Device, pool: CommandPool, buffers: &[CommandBuffer]) {
        let mut s = self.state.lock();
        s.note("free_command_buffers");
        s.check("free_command_buffers", device.0, "device");
        s.check("free_command_buffers", pool.0, "command_pool");
        for buffer in buffers {
            if s.buffer_fence.contains_key(&buffer.0) {
                s.violations.push(format!("free_command_buffers: #{} still executing", buffer.0));
            }
            s.destroy("free_command_buffers", buffer.0, "command_buffer");
        }
    }

    // ===== RENDER PASS / SWAPCHAIN =====

    fn create_render_pass(&mut self, device: Device, _format: ColorFormat) -> Result<RenderPass> {
        let mut s = self.state.lock();
        s.step("create_render_pass")?;
        s.check("create_render_pass", device.0, "device");
        Ok(RenderPass(s.create("render_pass")))
    }

    fn destroy_render_pass(&mut self, device: Device, render_pass: RenderPass) {
        let mut s = self.state.lock();
        s.note("destroy_render_pass");
        s.check("destroy_render_pass", device.0, "device");
        let mut dependents: Vec<u64> = s
            .pipeline_render_pass
            .iter()
            .filter(|(pipeline, rp)| **rp == render_pass.0 && s.live.contains_key(pipeline))
            .map(|(pipeline, _)| *pipeline)
            .collect();
        dependents.sort_unstable();
        for pipeline in dependents {
            s.violations.push(format!(
                "destroy_render_pass: render pass #{} still used by pipeline #{}",
                render_pass.0, pipeline
            ));
        }
        s.destroy("destroy_render_pass", render_pass.0, "render_pass");
    }

    fn create_swapchain(&mut self, device: Device, desc: &SwapchainDesc) -> Result<Swapchain> {
        let mut s = self.state.lock();
        s.step("create_swapchain")?;
        s.check("create_swapchain", device.0, "device");
        s.check("create_swapchain", desc.surface.0, "surface");
        let swapchain = s.create("swapchain");
        let images = (0..desc.image_count)
            .map(|_| Image(s.create_child(swapchain, "swapchain_image")))
            .collect();
        s.swapchain_images.insert(swapchain, images);
        s.next_image.insert(swapchain, 0);
        Ok(Swapchain(swapchain))
    }

    fn swapchain_images(&mut self, device: Device, swapchain: Swapchain) -> Result<Vec<Image>> {
        let mut s = self.state.lock();
        s.step("swapchain_images")?;
        s.check("swapchain_images", device.0, "device");
        s.check("swapchain_images", swapchain.0, "swapchain");
        Ok(s.swapchain_images.get(&swapchain.0).cloned().unwrap_or_default())
    }

    fn destroy_swapchain(&mut self, device: Device, swapchain: Swapchain) {
        let mut s = self.state.lock();
        s.note("destroy_swapchain");
        s.check("destroy_swapchain", device.0, "device");
        s.check_idle("destroy_swapchain");
        s.destroy("destroy_swapchain", swapchain.0, "swapchain");
    }

    fn create_image_view(
        &mut self,
        device: Device,
        image: Image,
        _format: ColorFormat,
    ) -> Result<ImageView> {
        let mut s = self.state.lock();
        s.step("create_image_view")?;
        s.check("create_image_view", device.0, "device");
        s.check("create_image_view", image.0, "swapchain_image");
        let view = s.create("image_view");
        s.view_image.insert(view, image.0);
        Ok(ImageView(view))
    }

    fn destroy_image_view(&mut self, device: Device, view: ImageView) {
        let mut s = self.state.lock();
        s.note("destroy_image_view");
        s.check("destroy_image_view", device.0, "device");
        s.destroy("destroy_image_view", view.0, "image_view");
    }

    fn create_framebuffer(
        &mut self,
        device: Device,
        render_pass: RenderPass,
        view: ImageView,
        extent: Extent2D,
    ) -> Result<Framebuffer> {
        let mut s = self.state.lock();
        s.step("create_framebuffer")?;
        s.check("create_framebuffer", device.0, "device");
        s.check("create_framebuffer", render_pass.0, "render_pass");
        s.check("create_framebuffer", view.0, "image_view");
        let framebuffer = s.create("framebuffer");
        s.framebuffer_view.insert(framebuffer, view.0);
        s.framebuffer_extent.insert(framebuffer, extent);
        Ok(Framebuffer(framebuffer))
    }

    fn destroy_framebuffer(&mut self, device: Device, framebuffer: Framebuffer) {
        let mut s = self.state.lock();
        s.note("destroy_framebuffer");
        s.check("destroy_framebuffer", device.0, "device");
        s.check_idle("destroy_framebuffer");
        s.destroy("destroy_framebuffer", framebuffer.0, "framebuffer");
    }

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&mut self, device: Device) -> Result<Semaphore> {
        let mut s = self.state.lock();
        s.step("create_semaphore")?;
        s.check("create_semaphore", device.0, "device");
        Ok(Semaphore(s.create("semaphore")))
    }

    fn destroy_semaphore(&mut self, device: Device, semaphore: Semaphore) {
        let mut s = self.state.lock();
        s.note("destroy_semaphore");
        s.check("destroy_semaphore", device.0, "device");
        s.signaled_semaphores.remove(&semaphore.0);
        s.destroy("destroy_semaphore", semaphore.0, "semaphore");
    }

    fn create_fence(&mut self, device: Device, signaled: bool) -> Result<Fence> {
        let mut s = self.state.lock();
        s.step("create_fence")?;
        s.check("create_fence", device.0, "device");
        let fence = s.create("fence");
        if signaled {
            s.signaled.insert(fence);
        }
        Ok(Fence(fence))
    }

    fn destroy_fence(&mut self, device: Device, fence: Fence) {
        let mut s = self.state.lock();
        s.note("destroy_fence");
        s.check("destroy_fence", device.0, "device");
        if s.pending.contains(&fence.0) {
            s.violations.push(format!("destroy_fence: fence #{} still pending", fence.0));
        }
        s.destroy("destroy_fence", fence.0, "fence");
    }

    fn wait_for_fence(&mut self, device: Device, fence: Fence, _timeout: Duration) -> Result<bool> {
        let mut s = self.state.lock();
        s.step("wait_for_fence")?;
        s.check("wait_for_fence", device.0, "device");
        s.check("wait_for_fence", fence.0, "fence");
        if s.pending.contains(&fence.0) {
            s.complete(fence.0);
            Ok(true)
        } else if s.signaled.contains(&fence.0) {
            Ok(true)
        } else {
            s.violations
                .push(format!("wait_for_fence: fence #{} can never signal", fence.0));
            Ok(false)
        }
    }

    fn reset_fence(&mut self, device: Device, fence: Fence) -> Result<()> {
        let mut s = self.state.lock();
        s.step("reset_fence")?;
        s.check("reset_fence", device.0, "device");
        s.check("reset_fence", fence.0, "fence");
        if s.pending.contains(&fence.0) {
            s.violations.push(format!("reset_fence: fence #{} still pending", fence.0));
        }
        s.signaled.remove(&fence.0);
        Ok(())
    }

    // ===== FRAME LOOP =====

    fn acquire_next_image(
        &mut self,
        device: Device,
        swapchain: Swapchain,
        signal: Semaphore,
        _timeout: Duration,
    ) -> AcquireResult {
        let mut s = self.state.lock();
        if s.step("acquire_next_image").is_err() {
            return AcquireResult::failed(AcquireCode::Failed);
        }
        s.check("acquire_next_image", device.0, "device");
        s.check("acquire_next_image", swapchain.0, "swapchain");
        s.check("acquire_next_image", signal.0, "semaphore");
        if s.out_of_date_acquires > 0 {
            s.out_of_date_acquires -= 1;
            return AcquireResult::failed(AcquireCode::OutOfDate);
        }
        let count = s.swapchain_images.get(&swapchain.0).map_or(0, |i| i.len() as u32);
        if count == 0 {
            return AcquireResult::failed(AcquireCode::Failed);
        }
        let next = s.next_image.entry(swapchain.0).or_insert(0);
        let index = *next % count;
        *next = (index + 1) % count;
        s.signal_semaphore("acquire_next_image", signal.0);
        AcquireResult::acquired(index, AcquireCode::Success)
    }

    fn queue_submit(&mut self, queue: Queue, submit: &SubmitDesc) -> Result<()> {
        let mut s = self.state.lock();
        s.step("queue_submit")?;
        s.check("queue_submit", queue.0, "queue");
        s.check("queue_submit", submit.wait.0, "semaphore");
        // A null fence is allowed: nothing is signaled on completion
        let fenced = !submit.fence.is_null();
        if fenced {
            s.check("queue_submit", submit.fence.0, "fence");
        }
        if let Some(signal) = submit.signal {
            s.check("queue_submit", signal.0, "semaphore");
        }
        if fenced && (s.signaled.contains(&submit.fence.0) || s.pending.contains(&submit.fence.0)) {
            s.violations
                .push(format!("queue_submit: fence #{} was not reset", submit.fence.0));
        }
        s.signaled_semaphores.remove(&submit.wait.0);
        if let Some(signal) = submit.signal {
            s.signal_semaphore("queue_submit", signal.0);
        }
        if let Some(buffer) = submit.command_buffer {
            s.check("queue_submit", buffer.0, "command_buffer");
            if s.recording.contains(&buffer.0) {
                s.violations
                    .push(format!("queue_submit: command buffer #{} still recording", buffer.0));
            }
            if fenced {
                s.buffer_fence.insert(buffer.0, submit.fence.0);
            }
            if let Some(framebuffer) = s.buffer_framebuffer.get(&buffer.0).copied() {
                let sample = s.buffer_sample.get(&buffer.0).copied().flatten();
                let image = s
                    .framebuffer_view
                    .get(&framebuffer)
                    .and_then(|view| s.view_image.get(view))
                    .copied();
                if let Some(image) = image {
                    s.image_content.insert(image, sample);
                }
            }
        }
        if fenced {
            s.pending.insert(submit.fence.0);
            s.max_in_flight = s.max_in_flight.max(s.pending.len());
        }
        Ok(())
    }

    fn queue_present(
        &mut self,
        queue: Queue,
        swapchain: Swapchain,
        image_index: u32,
        wait: Semaphore,
    ) -> Result<PresentOutcome> {
        let mut s = self.state.lock();
        s.step("queue_present")?;
        s.check("queue_present", queue.0, "queue");
        s.check("queue_present", swapchain.0, "swapchain");
        s.check("queue_present", wait.0, "semaphore");
        s.signaled_semaphores.remove(&wait.0);
        if s.out_of_date_presents > 0 {
            s.out_of_date_presents -= 1;
            return Ok(PresentOutcome::OutOfDate);
        }
        let image = s
            .swapchain_images
            .get(&swapchain.0)
            .and_then(|images| images.get(image_index as usize))
            .copied();
        let sampled = image.and_then(|i| s.image_content.get(&i.0).copied().flatten());
        s.presented.push(PresentedFrame { image_index, sampled });
        Ok(PresentOutcome::Presented)
    }

    // ===== RECORDING =====

    fn reset_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()> {
        let mut s = self.state.lock();
        s.step("reset_command_buffer")?;
        s.check("reset_command_buffer", command_buffer.0, "command_buffer");
        if s.buffer_fence.contains_key(&command_buffer.0) {
            s.violations.push(format!(
                "reset_command_buffer: #{} reset while still executing",
                command_buffer.0
            ));
        }
        s.recording.remove(&command_buffer.0);
        s.buffer_framebuffer.remove(&command_buffer.0);
        s.buffer_set.remove(&command_buffer.0);
        s.buffer_sample.remove(&command_buffer.0);
        Ok(())
    }

    fn begin_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()> {
        let mut s = self.state.lock();
        s.step("begin_command_buffer")?;
        s.check("begin_command_buffer", command_buffer.0, "command_buffer");
        s.recording.insert(command_buffer.0);
        Ok(())
    }

    fn end_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()> {
        let mut s = self.state.lock();
        s.step("end_command_buffer")?;
        s.check("end_command_buffer", command_buffer.0, "command_buffer");
        if !s.recording.remove(&command_buffer.0) {
            s.violations
                .push(format!("end_command_buffer: #{} was not recording", command_buffer.0));
        }
        Ok(())
    }

    fn cmd_begin_render_pass(
        &mut self,
        command_buffer: CommandBuffer,
        render_pass: RenderPass,
        framebuffer: Framebuffer,
        _extent: Extent2D,
        _clear_color: [f32; 4],
    ) {
        let mut s = self.state.lock();
        s.note("cmd_begin_render_pass");
        s.check("cmd_begin_render_pass", command_buffer.0, "command_buffer");
        s.check("cmd_begin_render_pass", render_pass.0, "render_pass");
        s.check("cmd_begin_render_pass", framebuffer.0, "framebuffer");
        s.buffer_framebuffer.insert(command_buffer.0, framebuffer.0);
        s.buffer_sample.insert(command_buffer.0, None);
    }

    fn cmd_end_render_pass(&mut self, command_buffer: CommandBuffer) {
        let mut s = self.state.lock();
        s.note("cmd_end_render_pass");
        s.check("cmd_end_render_pass", command_buffer.0, "command_buffer");
    }

    fn cmd_set_viewport_scissor(&mut self, command_buffer: CommandBuffer, _extent: Extent2D) {
        let mut s = self.state.lock();
        s.note("cmd_set_viewport_scissor");
        s.check("cmd_set_viewport_scissor", command_buffer.0, "command_buffer");
    }

    fn cmd_bind_pipeline(&mut self, command_buffer: CommandBuffer, pipeline: Pipeline) {
        let mut s = self.state.lock();
        s.note("cmd_bind_pipeline");
        s.check("cmd_bind_pipeline", command_buffer.0, "command_buffer");
        s.check("cmd_bind_pipeline", pipeline.0, "pipeline");
    }

    fn cmd_bind_descriptor_set(
        &mut self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        set: DescriptorSet,
    ) {
        let mut s = self.state.lock();
        s.note("cmd_bind_descriptor_set");
        s.check("cmd_bind_descriptor_set", command_buffer.0, "command_buffer");
        s.check("cmd_bind_descriptor_set", layout.0, "pipeline_layout");
        s.check("cmd_bind_descriptor_set", set.0, "descriptor_set");
        s.buffer_set.insert(command_buffer.0, set.0);
    }

    fn cmd_push_constants(
        &mut self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        _stages: ShaderStages,
        data: &[u8],
    ) {
        let mut s = self.state.lock();
        s.note("cmd_push_constants");
        s.check("cmd_push_constants", command_buffer.0, "command_buffer");
        s.check("cmd_push_constants", layout.0, "pipeline_layout");
        s.push_constants.push(data.to_vec());
    }

    fn cmd_draw(&mut self, command_buffer: CommandBuffer, vertex_count: u32) {
        let mut s = self.state.lock();
        s.note("cmd_draw");
        s.check("cmd_draw", command_buffer.0, "command_buffer");
        if !s.recording.contains(&command_buffer.0) {
            s.violations
                .push(format!("cmd_draw: command buffer #{} not recording", command_buffer.0));
        }
        s.draws.push(vertex_count);
        let sample = s.sample_for(command_buffer.0);
        s.buffer_sample.insert(command_buffer.0, sample);
    }

    // ===== FILTER OBJECTS =====

    fn create_shader_module(&mut self, device: Device, _code: &[u32]) -> Result<ShaderModule> {
        let mut s = self.state.lock();
        s.step("create_shader_module")?;
        s.check("create_shader_module", device.0, "device");
        Ok(ShaderModule(s.create("shader_module")))
    }

    fn destroy_shader_module(&mut self, device: Device, module: ShaderModule) {
        let mut s = self.state.lock();
        s.note("destroy_shader_module");
        s.check("destroy_shader_module", device.0, "device");
        s.destroy("destroy_shader_module", module.0, "shader_module");
    }

    fn create_descriptor_set_layout(&mut self, device: Device) -> Result<DescriptorSetLayout> {
        let mut s = self.state.lock();
        s.step("create_descriptor_set_layout")?;
        s.check("create_descriptor_set_layout", device.0, "device");
        Ok(DescriptorSetLayout(s.create("descriptor_set_layout")))
    }

    fn destroy_descriptor_set_layout(&mut self, device: Device, layout: DescriptorSetLayout) {
        let mut s = self.state.lock();
        s.note("destroy_descriptor_set_layout");
        s.check("destroy_descriptor_set_layout", device.0, "device");
        s.destroy("destroy_descriptor_set_layout", layout.0, "descriptor_set_layout");
    }

    fn create_pipeline_layout(
        &mut self,
        device: Device,
        set_layout: DescriptorSetLayout,
        _push_constants: Option<PushConstantRange>,
    ) -> Result<PipelineLayout> {
        let mut s = self.state.lock();
        s.step("create_pipeline_layout")?;
        s.check("create_pipeline_layout", device.0, "device");
        s.check("create_pipeline_layout", set_layout.0, "descriptor_set_layout");
        Ok(PipelineLayout(s.create("pipeline_layout")))
    }

    fn destroy_pipeline_layout(&mut self, device: Device, layout: PipelineLayout) {
        let mut s = self.state.lock();
        s.note("destroy_pipeline_layout");
        s.check("destroy_pipeline_layout", device.0, "device");
        s.destroy("destroy_pipeline_layout", layout.0, "pipeline_layout");
    }

    fn create_graphics_pipeline(
        &mut self,
        device: Device,
        desc: &GraphicsPipelineDesc,
    ) -> Result<Pipeline> {
        let mut s = self.state.lock();
        s.step("create_graphics_pipeline")?;
        s.check("create_graphics_pipeline", device.0, "device");
        s.check("create_graphics_pipeline", desc.render_pass.0, "render_pass");
        s.check("create_graphics_pipeline", desc.layout.0, "pipeline_layout");
        s.check("create_graphics_pipeline", desc.vertex_shader.0, "shader_module");
        s.check("create_graphics_pipeline", desc.fragment_shader.0, "shader_module");
        let pipeline = s.create("pipeline");
        s.pipeline_render_pass.insert(pipeline, desc.render_pass.0);
        Ok(Pipeline(pipeline))
    }

    fn destroy_pipeline(&mut self, device: Device, pipeline: Pipeline) {
        let mut s = self.state.lock();
        s.note("destroy_pipeline");
        s.check("destroy_pipeline", device.0, "device");
        s.check_idle("destroy_pipeline");
        s.destroy("destroy_pipeline", pipeline.0, "pipeline");
        s.pipeline_render_pass.remove(&pipeline.0);
    }

    fn create_descriptor_pool(&mut self, device: Device, _max_sets: u32) -> Result<DescriptorPool> {
        let mut s = self.state.lock();
        s.step("create_descriptor_pool")?;
        s.check("create_descriptor_pool", device.0, "device");
        Ok(DescriptorPool(s.create("descriptor_pool")))
    }

    fn destroy_descriptor_pool(&mut self, device: Device, pool: DescriptorPool) {
        let mut s = self.state.lock();
        s.note("destroy_descriptor_pool");
        s.check("destroy_descriptor_pool", device.0, "device");
        s.destroy("destroy_descriptor_pool", pool.0, "descriptor_pool");
    }

    fn allocate_descriptor_set(
        &mut self,
        device: Device,
        pool: DescriptorPool,
        layout: DescriptorSetLayout,
    ) -> Result<DescriptorSet> {
        let mut s = self.state.lock();
        s.step("allocate_descriptor_set")?;
        s.check("allocate_descriptor_set", device.0, "device");
        s.check("allocate_descriptor_set", pool.0, "descriptor_pool");
        s.check("allocate_descriptor_set", layout.0, "descriptor_set_layout");
        Ok(DescriptorSet(s.create_child(pool.0, "descriptor_set")))
    }

    fn update_descriptor_set(
        &mut self,
        device: Device,
        set: DescriptorSet,
        view: ImageView,
        sampler: Sampler,
    ) {
        let mut s = self.state.lock();
        s.note("update_descriptor_set");
        s.check("update_descriptor_set", device.0, "device");
        s.check("update_descriptor_set", set.0, "descriptor_set");
        s.check("update_descriptor_set", view.0, "image_view");
        s.check("update_descriptor_set", sampler.0, "sampler");
        s.descriptor_updates += 1;
        s.set_view.insert(set.0, view.0);
    }

    fn create_sampler(&mut self, device: Device) -> Result<Sampler> {
        let mut s = self.state.lock();
        s.step("create_sampler")?;
        s.check("create_sampler", device.0, "device");
        Ok(Sampler(s.create("sampler")))
    }

    fn destroy_sampler(&mut self, device: Device, sampler: Sampler) {
        let mut s = self.state.lock();
        s.note("destroy_sampler");
        s.check("destroy_sampler", device.0, "device");
        s.destroy("destroy_sampler", sampler.0, "sampler");
    }

    // ===== INPUT TEXTURE =====

    fn create_texture(&mut self, device: Device, extent: Extent2D) -> Result<TextureAllocation> {
        let mut s = self.state.lock();
        s.step("create_texture")?;
        s.check("create_texture", device.0, "device");
        let image = s.create("texture_image");
        let memory = s.create("device_memory");
        let view = s.create("image_view");
        s.texture_views.insert(view, (image, extent));
        Ok(TextureAllocation {
            image: Image(image),
            memory: DeviceMemory(memory),
            view: ImageView(view),
            extent,
        })
    }

    fn upload_texture(
        &mut self,
        device: Device,
        queue: Queue,
        pool: CommandPool,
        texture: &TextureAllocation,
        pixels: &[u8],
    ) -> Result<()> {
        let mut s = self.state.lock();
        s.step("upload_texture")?;
        s.check("upload_texture", device.0, "device");
        s.check("upload_texture", queue.0, "queue");
        s.check("upload_texture", pool.0, "command_pool");
        s.check("upload_texture", texture.image.0, "texture_image");
        if pixels.len() != texture.extent.rgba_len() {
            s.violations.push(format!(
                "upload_texture: {} bytes for a {}x{} texture",
                pixels.len(),
                texture.extent.width,
                texture.extent.height
            ));
        }
        s.uploads.insert(texture.image.0, pixels.to_vec());
        Ok(())
    }

    fn destroy_texture(&mut self, device: Device, texture: &TextureAllocation) {
        let mut s = self.state.lock();
        s.note("destroy_texture");
        s.check("destroy_texture", device.0, "device");
        s.destroy("destroy_texture", texture.view.0, "image_view");
        s.destroy("destroy_texture", texture.image.0, "texture_image");
        s.destroy("destroy_texture", texture.memory.0, "device_memory");
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
