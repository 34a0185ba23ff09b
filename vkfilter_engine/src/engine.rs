/// Engine - the handle owning one rendering session
///
/// The engine aggregates the graphics context, swapchain, frame scheduler,
/// command recorder, filter and input texture, and drives them through the
/// lifecycle `Uninitialized -> Initializing -> Ready -> Rendering -> Stopping -> Released`.
///
/// Frames are rendered on a dedicated worker leased from a `RenderService`.
/// Lifecycle calls (start, resize, stop, release) come from the host thread and
/// serialize with the render loop through the engine core lock: a tick holds it
/// for acquire + record + submit + present, so a resize never tears down objects
/// in use by a tick.
///
/// # Example
///
/// ```no_run
/// use vkfilter_engine::vkfilter::{Engine, EngineConfig, Extent2D, InputMode, RenderService};
/// # fn demo(device: Box<dyn vkfilter_engine::vkfilter::GraphicsDevice>,
/// #         filter: Box<dyn vkfilter_engine::vkfilter::Filter>,
/// #         surface: vkfilter_engine::vkfilter::OutputSurface) -> vkfilter_engine::vkfilter::Result<()> {
/// let engine = Engine::new(device, filter, EngineConfig::default(), RenderService::global());
/// engine.start(Extent2D::new(640, 480), Extent2D::new(1280, 720), surface, InputMode::EngineDriven)?;
/// engine.update_input_color(255, 0, 0, 255)?;
/// engine.resize(1920, 1080)?;
/// engine.stop()?;
/// # Ok(())
/// # }
/// ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use glam::Mat4;
use parking_lot::Mutex;

use crate::command_recorder::{CommandRecorder, FrameInputs};
use crate::config::EngineConfig;
use crate::context::GraphicsContext;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::frame_scheduler::{FrameScheduler, TickOutcome};
use crate::graphics_device::{ColorFormat, Extent2D, GraphicsDevice, OutputSurface};
use crate::input_texture::{InputMode, InputSurface, InputTexture};
use crate::service::{RenderService, ServiceLease};
use crate::swapchain::{ResizeOutcome, SwapchainState};
use crate::worker::{FrameNotifier, RenderWorker, TickCadence};
use crate::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};

const SOURCE: &str = "vkfilter::Engine";

/// Capacity of the event channel; events are dropped while it is full
const EVENT_CAPACITY: usize = 256;

// ===== PUBLIC TYPES =====

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Rendering,
    Stopping,
    Released,
    /// Initialization failed; the engine tears down and returns to `Uninitialized`
    Failed,
}

/// Frame counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub frames_submitted: u64,
    pub frames_presented: u64,
    pub ticks_skipped: u64,
    pub stale_acquires: u64,
    pub resizes: u64,
}

/// Notifications published on `Engine::events()`
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    /// The swapchain no longer matches the surface; the host should resize
    SwapchainStale,
    FrameRendered { image_index: u32 },
    TickFailed(String),
}

/// Snapshot of the presentation objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub extent: Extent2D,
    pub format: ColorFormat,
    pub image_count: usize,
    pub command_buffer_count: usize,
    pub frames_in_flight: usize,
}

// ===== SHARED STATE =====

/// State readable without taking the core lock
struct Shared {
    state: Mutex<EngineState>,
    stats: Mutex<EngineStats>,
    events: Sender<EngineEvent>,
}

impl Shared {
    fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
        engine_info!(SOURCE, "State -> {:?}", state);
        self.publish(EngineEvent::StateChanged(state));
    }

    fn publish(&self, event: EngineEvent) {
        if self.events.try_send(event).is_err() {
            engine_trace!(SOURCE, "Event channel full, event dropped");
        }
    }
}

// ===== SESSION =====

/// Everything built by `start`, torn down by `stop`
#[derive(Default)]
struct Session {
    ctx: GraphicsContext,
    swapchain: Option<SwapchainState>,
    recorder: Option<CommandRecorder>,
    scheduler: Option<FrameScheduler>,
    input: InputTexture,
    input_surface: Option<InputSurface>,
    started_at: Option<Instant>,
}

/// Device, filter and session; guarded by the core lock
struct EngineCore {
    gd: Box<dyn GraphicsDevice>,
    filter: Box<dyn Filter>,
    config: EngineConfig,
    session: Option<Session>,
    override_transform: Option<Mat4>,
    shared: Arc<Shared>,
}

impl EngineCore {
    /// Build the session in order: context, swapchain, command buffers, frame slots, filter, input texture
    fn initialize(
        &mut self,
        target: OutputSurface,
        input_size: Extent2D,
        output_size: Extent2D,
        notifier: Option<FrameNotifier>,
    ) -> Result<Option<InputSurface>> {
        let mut session = Session::default();
        match self.build_session(&mut session, &target, input_size, output_size) {
            Ok(()) => {
                let surface = notifier.map(|n| InputSurface::new(input_size, Some(n)));
                session.input_surface = surface.clone();
                session.started_at = Some(Instant::now());
                self.session = Some(session);
                Ok(surface)
            }
            Err(err) => {
                engine_error!(SOURCE, "Initialization failed: {}", err);
                Self::teardown(self.gd.as_mut(), self.filter.as_mut(), &mut session);
                Err(err)
            }
        }
    }

    fn build_session(
        &mut self,
        session: &mut Session,
        target: &OutputSurface,
        input_size: Extent2D,
        output_size: Extent2D,
    ) -> Result<()> {
        let EngineCore { gd, filter, config, .. } = self;
        let gd = gd.as_mut();

        session.ctx = GraphicsContext::create(gd, target, config)?;
        let device = session.ctx.device;

        let swapchain = SwapchainState::create(gd, &session.ctx, output_size, config)?;
        let image_count = swapchain.image_count();
        let render_pass = swapchain.render_pass;
        session.swapchain = Some(swapchain);

        session.recorder = Some(CommandRecorder::allocate(
            gd,
            device,
            session.ctx.command_pool,
            image_count,
        )?);
        session.scheduler = Some(FrameScheduler::create(
            gd,
            device,
            config.slot_count(),
            image_count,
            config.fence_timeout,
        )?);

        filter.init(gd, device, render_pass)?;
        session.input = InputTexture::create(gd, &session.ctx, input_size)?;
        Ok(())
    }

    /// Destroy in order: filter, input texture, command buffers, frame slots, swapchain, context
    ///
    /// Works on partially built sessions; every step skips what does not exist.
    fn teardown(gd: &mut dyn GraphicsDevice, filter: &mut dyn Filter, session: &mut Session) {
        let device = session.ctx.device;
        if device.is_null() {
            session.ctx.destroy(gd);
            return;
        }
        if let Err(err) = gd.device_wait_idle(device) {
            engine_warn!(SOURCE, "Wait idle before teardown failed: {}", err);
        }

        filter.release(gd);
        session.input.destroy(gd, &session.ctx);
        if let Some(mut recorder) = session.recorder.take() {
            recorder.free(gd, device);
        }
        if let Some(mut scheduler) = session.scheduler.take() {
            scheduler.destroy(gd, device);
        }
        if let Some(mut swapchain) = session.swapchain.take() {
            swapchain.destroy(gd, device);
        }
        session.ctx.destroy(gd);
        session.input_surface = None;
        engine_debug!(SOURCE, "Session torn down");
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            Self::teardown(self.gd.as_mut(), self.filter.as_mut(), &mut session);
        }
    }

    /// Render one frame; per-tick failures are counted, logged and returned
    fn tick(&mut self) -> Result<TickOutcome> {
        let state = self.shared.state();
        if state != EngineState::Rendering {
            return Err(Error::InvalidState { operation: "render", state });
        }
        let EngineCore { gd, filter, config, session, override_transform, shared } = self;
        let gd = gd.as_mut();
        let session = session
            .as_mut()
            .ok_or(Error::InvalidState { operation: "render", state })?;

        let mut transform = Mat4::IDENTITY;
        if let Some(surface) = &session.input_surface {
            if let Some(pixels) = surface.take_frame() {
                if let Err(err) = session.input.upload(gd, &session.ctx, &pixels) {
                    engine_warn!(SOURCE, "Dropped producer frame: {}", err);
                }
            }
            transform = surface.transform();
        }

        let inputs = FrameInputs {
            texture_view: session.input.view(),
            transform: override_transform.unwrap_or(transform),
            elapsed_seconds: session.started_at.map_or(0.0, |t| t.elapsed().as_secs_f32()),
            clear_color: config.clear_color,
        };

        let result = match (session.swapchain.as_ref(), session.recorder.as_mut(), session.scheduler.as_mut()) {
            (Some(swapchain), Some(recorder), Some(scheduler)) => {
                let filter: Option<&mut dyn Filter> = if filter.is_initialized() { Some(&mut **filter) } else { None };
                scheduler.tick(gd, &session.ctx, swapchain, recorder, filter, &inputs)
            }
            _ => Err(Error::BackendError("no swapchain, resize required".to_string())),
        };

        let mut stats = shared.stats.lock();
        match &result {
            Ok(TickOutcome::Presented { image_index, stale }) => {
                stats.frames_submitted += 1;
                stats.frames_presented += 1;
                shared.publish(EngineEvent::FrameRendered { image_index: *image_index });
                if *stale {
                    stats.stale_acquires += 1;
                    shared.publish(EngineEvent::SwapchainStale);
                }
            }
            Ok(TickOutcome::Skipped(reason)) => {
                stats.ticks_skipped += 1;
                engine_debug!(SOURCE, "Tick skipped: {:?}", reason);
            }
            Err(Error::AcquireStaleSwapchain) => {
                stats.ticks_skipped += 1;
                stats.stale_acquires += 1;
                engine_warn!(SOURCE, "Swapchain out of date, tick skipped");
                shared.publish(EngineEvent::SwapchainStale);
            }
            Err(err) => {
                stats.ticks_skipped += 1;
                engine_error!(SOURCE, "Tick failed: {}", err);
                shared.publish(EngineEvent::TickFailed(err.to_string()));
            }
        }
        result
    }

    /// Recreate the presentation objects at `size`
    fn resize(&mut self, size: Extent2D) -> Result<()> {
        let state = self.shared.state();
        let EngineCore { gd, filter, config, session, .. } = self;
        let gd = gd.as_mut();
        let session = session
            .as_mut()
            .ok_or(Error::InvalidState { operation: "resize", state })?;
        let device = session.ctx.device;

        gd.device_wait_idle(device)?;

        let scheduler = session
            .scheduler
            .as_mut()
            .ok_or(Error::InvalidState { operation: "resize", state })?;
        let resized = match session.swapchain.as_mut() {
            Some(swapchain) => Some(swapchain.resize(gd, &session.ctx, scheduler.slots(), size, config, &mut |gd| {
                filter.release(gd)
            })),
            None => None,
        };
        let outcome = match resized {
            Some(Ok(outcome)) => outcome,
            Some(Err(err)) => {
                // Early failures leave the old chain alive; destroy is a no-op otherwise
                if let Some(mut stale) = session.swapchain.take() {
                    filter.release(gd);
                    stale.destroy(gd, device);
                }
                return Err(err);
            }
            None => {
                session.swapchain = Some(SwapchainState::create(gd, &session.ctx, size, config)?);
                ResizeOutcome {
                    image_count_changed: true,
                    render_pass_recreated: true,
                }
            }
        };

        let Some(swapchain) = session.swapchain.as_ref() else {
            return Err(Error::BackendError("swapchain missing after resize".to_string()));
        };
        if outcome.render_pass_recreated || !filter.is_initialized() {
            filter.init(gd, device, swapchain.render_pass)?;
        }
        if outcome.image_count_changed {
            if let Some(recorder) = session.recorder.as_mut() {
                recorder.reallocate(gd, device, swapchain.image_count())?;
            }
        }
        scheduler.reset_image_tracking(swapchain.image_count());
        Ok(())
    }

    fn frame_info(&self) -> Option<FrameInfo> {
        let session = self.session.as_ref()?;
        let swapchain = session.swapchain.as_ref()?;
        Some(FrameInfo {
            extent: swapchain.extent,
            format: swapchain.format,
            image_count: swapchain.image_count(),
            command_buffer_count: session.recorder.as_ref().map_or(0, |r| r.len()),
            frames_in_flight: session.scheduler.as_ref().map_or(0, |s| s.slots().len()),
        })
    }

    fn input_mut(&mut self, operation: &'static str) -> Result<(&mut dyn GraphicsDevice, &GraphicsContext, &mut InputTexture)> {
        let state = self.shared.state();
        let EngineCore { gd, session, .. } = self;
        match session.as_mut() {
            Some(session) if !session.input.is_null() => {
                Ok((gd.as_mut(), &session.ctx, &mut session.input))
            }
            _ => Err(Error::InvalidState { operation, state }),
        }
    }
}

// ===== ENGINE HANDLE =====

struct Control {
    worker: Option<RenderWorker>,
    lease: Option<ServiceLease>,
}

/// Clears the resize flag when the resize ends
struct ResizeGuard<'a>(&'a AtomicBool);

impl Drop for ResizeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Engine {
    core: Arc<Mutex<EngineCore>>,
    shared: Arc<Shared>,
    service: RenderService,
    control: Mutex<Control>,
    resizing: AtomicBool,
    stop_timeout: Duration,
    self_drive_interval: Duration,
    auto_render: bool,
    events: Receiver<EngineEvent>,
}

impl Engine {
    /// Create an engine rendering through `device` with `filter`
    ///
    /// Nothing is created on the device until `start`.
    pub fn new(
        device: Box<dyn GraphicsDevice>,
        filter: Box<dyn Filter>,
        config: EngineConfig,
        service: &RenderService,
    ) -> Self {
        let (sender, events) = bounded(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState::Uninitialized),
            stats: Mutex::new(EngineStats::default()),
            events: sender,
        });
        Self {
            stop_timeout: config.stop_timeout,
            self_drive_interval: config.self_drive_interval,
            auto_render: config.auto_render,
            core: Arc::new(Mutex::new(EngineCore {
                gd: device,
                filter,
                override_transform: config.override_transform,
                config,
                session: None,
                shared: Arc::clone(&shared),
            })),
            shared,
            service: service.clone(),
            control: Mutex::new(Control {
                worker: None,
                lease: None,
            }),
            resizing: AtomicBool::new(false),
            events,
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn stats(&self) -> EngineStats {
        *self.shared.stats.lock()
    }

    /// Receiver of lifecycle and frame events
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events.clone()
    }

    /// Presentation objects of the running session
    pub fn frame_info(&self) -> Option<FrameInfo> {
        self.core.lock().frame_info()
    }

    /// Start a session
    ///
    /// Builds everything on the render worker and blocks until done. In
    /// `External` mode the returned `InputSurface` is the producer's write
    /// target and ticks follow its frame-available signals; in `EngineDriven`
    /// mode ticks run every `self_drive_interval`.
    ///
    /// On failure every partially created object is destroyed, a `Failed`
    /// state is published and the engine rests in `Uninitialized`.
    pub fn start(
        &self,
        input_size: Extent2D,
        output_size: Extent2D,
        target: OutputSurface,
        mode: InputMode,
    ) -> Result<Option<InputSurface>> {
        {
            let mut state = self.shared.state.lock();
            if *state != EngineState::Uninitialized {
                engine_warn!(SOURCE, "start ignored, engine is {:?}", *state);
                return Err(Error::AlreadyInState(*state));
            }
            input_size.validated()?;
            output_size.validated()?;
            *state = EngineState::Initializing;
        }
        engine_info!(SOURCE, "State -> {:?}", EngineState::Initializing);
        self.shared.publish(EngineEvent::StateChanged(EngineState::Initializing));

        match self.spawn_and_initialize(input_size, output_size, target, mode) {
            Ok((surface, worker, lease)) => {
                let mut control = self.control.lock();
                control.worker = Some(worker);
                control.lease = Some(lease);
                drop(control);

                self.shared.set_state(EngineState::Ready);
                if self.auto_render {
                    self.shared.set_state(EngineState::Rendering);
                }
                Ok(surface)
            }
            Err(err) => {
                self.shared.set_state(EngineState::Failed);
                self.shared.set_state(EngineState::Uninitialized);
                Err(err)
            }
        }
    }

    fn spawn_and_initialize(
        &self,
        input_size: Extent2D,
        output_size: Extent2D,
        target: OutputSurface,
        mode: InputMode,
    ) -> Result<(Option<InputSurface>, RenderWorker, ServiceLease)> {
        let lease = self.service.acquire()?;
        let cadence = match mode {
            InputMode::External => TickCadence::OnSignal,
            InputMode::EngineDriven => TickCadence::Interval(self.self_drive_interval),
        };

        let core = Arc::clone(&self.core);
        let shared = Arc::clone(&self.shared);
        let mut worker = lease.spawn_worker("vkfilter-render", cadence, move || {
            if shared.state() == EngineState::Rendering {
                let _ = core.lock().tick();
            }
        })?;

        let notifier = match mode {
            InputMode::External => Some(worker.notifier()),
            InputMode::EngineDriven => None,
        };
        let core = Arc::clone(&self.core);
        let initialized = worker
            .call(move || core.lock().initialize(target, input_size, output_size, notifier))
            .and_then(|result| result);

        match initialized {
            Ok(surface) => Ok((surface, worker, lease)),
            Err(err) => {
                worker.stop(self.stop_timeout);
                Err(err)
            }
        }
    }

    /// Begin pulling frames (Ready -> Rendering)
    pub fn begin_rendering(&self) -> Result<()> {
        self.switch_rendering(EngineState::Ready, EngineState::Rendering, "begin rendering")
    }

    /// Stop pulling frames, keeping every resource (Rendering -> Ready)
    pub fn pause_rendering(&self) -> Result<()> {
        self.switch_rendering(EngineState::Rendering, EngineState::Ready, "pause rendering")
    }

    fn switch_rendering(&self, from: EngineState, to: EngineState, operation: &'static str) -> Result<()> {
        let current = self.state();
        if current == to {
            return Err(Error::AlreadyInState(current));
        }
        if current != from {
            return Err(Error::InvalidState { operation, state: current });
        }
        self.shared.set_state(to);
        Ok(())
    }

    /// Recreate the swapchain for a new output size
    ///
    /// Zero or negative sizes are rejected with `InvalidArgument` and change
    /// nothing. Rendering is paused for the duration and resumed afterwards.
    pub fn resize(&self, width: i32, height: i32) -> Result<()> {
        let size = Extent2D::from_signed(width, height)?;
        if self.resizing.swap(true, Ordering::AcqRel) {
            return Err(Error::Busy("resize already in progress".to_string()));
        }
        let _guard = ResizeGuard(&self.resizing);

        let mut core = self.core.lock();
        let state = self.state();
        if !matches!(state, EngineState::Ready | EngineState::Rendering) {
            return Err(Error::InvalidState { operation: "resize", state });
        }

        let was_rendering = state == EngineState::Rendering;
        if was_rendering {
            self.shared.set_state(EngineState::Ready);
        }
        let result = core.resize(size);
        if was_rendering {
            self.shared.set_state(EngineState::Rendering);
        }
        drop(core);

        match &result {
            Ok(()) => {
                self.shared.stats.lock().resizes += 1;
                engine_info!(SOURCE, "Resized to {}x{}", size.width, size.height);
            }
            Err(err) => engine_error!(SOURCE, "Resize to {}x{} failed: {}", size.width, size.height, err),
        }
        result
    }

    /// Replace the input texture content with `width * height * 4` RGBA bytes
    pub fn update_input_texture(&self, pixels: &[u8]) -> Result<()> {
        let mut core = self.core.lock();
        let (gd, ctx, input) = core.input_mut("update input texture")?;
        input.upload(gd, ctx, pixels)
    }

    /// Fill the input texture with one color
    pub fn update_input_color(&self, r: u8, g: u8, b: u8, a: u8) -> Result<()> {
        let mut core = self.core.lock();
        let (gd, ctx, input) = core.input_mut("update input color")?;
        input.fill(gd, ctx, [r, g, b, a])
    }

    /// Use `transform` instead of the producer transform (None restores it)
    pub fn set_override_transform(&self, transform: Option<Mat4>) {
        self.core.lock().override_transform = transform;
    }

    /// Render one frame on the worker now and return its outcome
    pub fn render_now(&self) -> Result<TickOutcome> {
        let core = Arc::clone(&self.core);
        let control = self.control.lock();
        let worker = control.worker.as_ref().ok_or(Error::InvalidState {
            operation: "render",
            state: self.state(),
        })?;
        worker.call(move || core.lock().tick())?
    }

    /// Stop rendering and destroy every resource
    ///
    /// The worker gets `stop_timeout` to finish its tick. If it is stuck the
    /// timeout is logged and teardown proceeds anyway.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                EngineState::Uninitialized | EngineState::Released | EngineState::Stopping => {
                    engine_warn!(SOURCE, "stop ignored, engine is {:?}", *state);
                    return Err(Error::AlreadyInState(*state));
                }
                EngineState::Initializing | EngineState::Failed => {
                    return Err(Error::Busy(format!("engine is {:?}", *state)));
                }
                EngineState::Ready | EngineState::Rendering => *state = EngineState::Stopping,
            }
        }
        engine_info!(SOURCE, "State -> {:?}", EngineState::Stopping);
        self.shared.publish(EngineEvent::StateChanged(EngineState::Stopping));

        let (worker, lease) = {
            let mut control = self.control.lock();
            (control.worker.take(), control.lease.take())
        };
        if let Some(mut worker) = worker {
            if !worker.stop(self.stop_timeout) {
                engine_warn!(SOURCE, "Render worker did not stop within {:?}", self.stop_timeout);
            }
        }

        match self.core.try_lock_for(self.stop_timeout) {
            Some(mut core) => core.release_session(),
            None => engine_error!(
                SOURCE,
                "Render worker still holds the engine after {:?}, GPU resources leaked",
                self.stop_timeout
            ),
        }
        drop(lease);

        self.shared.set_state(EngineState::Released);
        Ok(())
    }

    /// Stop if needed and settle in `Released`; a second call is a no-op
    pub fn release(&self) {
        match self.state() {
            EngineState::Released => {}
            EngineState::Ready | EngineState::Rendering => {
                let _ = self.stop();
            }
            EngineState::Uninitialized => self.shared.set_state(EngineState::Released),
            other => engine_warn!(SOURCE, "release ignored, engine is {:?}", other),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
