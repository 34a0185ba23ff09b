//! vkfilter demo - animated test patterns through a rotating texture filter
//!
//! Opens a window, starts the engine in engine-driven mode with the Vulkan
//! backend and pushes a new pattern frame into the input texture ~30 times
//! per second. Shader bytecode is read from `shaders/*.spv` (see build notes
//! in `shaders/README.md`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use vkfilter_engine::vkfilter::log::LogSeverity;
use vkfilter_engine::vkfilter::pattern::PatternAnimator;
use vkfilter_engine::vkfilter::{
    affine_rotation, Engine, EngineConfig, EngineEvent, Extent2D, FileShaderSource, FilterVariant,
    InputMode, OutputSurface, RenderService, Result, ShaderFilter,
};
use vkfilter_engine::{engine_error, engine_info, engine_warn};
use vkfilter_engine_vulkan::VulkanDevice;

const SOURCE: &str = "vkfilter::demo";

const INPUT_SIZE: Extent2D = Extent2D::new(640, 480);
const WINDOW_SIZE: Extent2D = Extent2D::new(1280, 720);
const PATTERN_INTERVAL: Duration = Duration::from_millis(33);
const ROTATION_DEGREES: f32 = 30.0;

/// Running session: window and the engine presenting into it
struct Session {
    window: Window,
    engine: Engine,
    patterns: PatternAnimator,
    next_pattern: Instant,
}

impl Session {
    fn start(event_loop: &ActiveEventLoop, service: &RenderService) -> Result<Self> {
        let attributes = Window::default_attributes()
            .with_title("vkfilter demo")
            .with_inner_size(winit::dpi::PhysicalSize::new(WINDOW_SIZE.width, WINDOW_SIZE.height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| vkfilter_engine::vkfilter::Error::BackendError(format!("window creation failed: {}", e)))?;

        let device = VulkanDevice::from_window(&window)?;
        let shaders = Arc::new(FileShaderSource::new("shaders"));
        let filter = ShaderFilter::new(FilterVariant::affine(affine_rotation(ROTATION_DEGREES)), shaders);
        let config = EngineConfig::default().with_app_name("vkfilter demo");
        let engine = Engine::new(Box::new(device), Box::new(filter), config, service);

        let size = window.inner_size();
        let output = Extent2D::new(size.width.max(1), size.height.max(1));
        engine.start(INPUT_SIZE, output, OutputSurface::from_window(&window)?, InputMode::EngineDriven)?;

        Ok(Self {
            window,
            engine,
            patterns: PatternAnimator::new(INPUT_SIZE),
            next_pattern: Instant::now(),
        })
    }

    /// Push the next pattern frame if it is due
    fn animate(&mut self) {
        let now = Instant::now();
        if now < self.next_pattern {
            return;
        }
        let frame = self.patterns.next_frame();
        if let Err(e) = self.engine.update_input_texture(&frame) {
            engine_warn!(SOURCE, "Pattern upload failed: {}", e);
        }
        self.next_pattern = now + PATTERN_INTERVAL;
    }

    fn drain_events(&self) {
        for event in self.engine.events().try_iter() {
            match event {
                EngineEvent::SwapchainStale => {
                    let size = self.window.inner_size();
                    self.resize(size.width, size.height);
                }
                EngineEvent::TickFailed(reason) => engine_warn!(SOURCE, "Frame failed: {}", reason),
                EngineEvent::StateChanged(state) => engine_info!(SOURCE, "Engine is now {:?}", state),
                EngineEvent::FrameRendered { .. } => {}
            }
        }
    }

    fn resize(&self, width: u32, height: u32) {
        // Minimized windows report 0x0; keep the old swapchain until restored
        if width == 0 || height == 0 {
            return;
        }
        let (width, height) = (width.min(i32::MAX as u32) as i32, height.min(i32::MAX as u32) as i32);
        if let Err(e) = self.engine.resize(width, height) {
            engine_warn!(SOURCE, "Resize to {}x{} failed: {}", width, height, e);
        }
    }

    fn stop(&self) {
        if let Err(e) = self.engine.stop() {
            engine_warn!(SOURCE, "Stop: {}", e);
        }
        let stats = self.engine.stats();
        engine_info!(SOURCE, "Session ended: {:?}", stats);
    }
}

struct App {
    service: RenderService,
    session: Option<Session>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }
        match Session::start(event_loop, &self.service) {
            Ok(session) => {
                engine_info!(SOURCE, "Initialization complete, rendering");
                self.session = Some(session);
            }
            Err(e) => {
                engine_error!(SOURCE, "Failed to start the engine: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(session) = &self.session else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                engine_info!(SOURCE, "Close requested, shutting down");
                session.stop();
                self.session = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => session.resize(size.width, size.height),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(session) = &mut self.session {
            session.drain_events();
            session.animate();
            event_loop.set_control_flow(ControlFlow::WaitUntil(session.next_pattern));
        }
    }
}

fn main() {
    Engine::set_min_severity(if cfg!(debug_assertions) {
        LogSeverity::Debug
    } else {
        LogSeverity::Info
    });
    engine_info!(SOURCE, "Starting vkfilter demo");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            engine_error!(SOURCE, "Cannot create the event loop: {}", e);
            return;
        }
    };

    let mut app = App {
        service: RenderService::new("vkfilter-demo"),
        session: None,
    };
    if let Err(e) = event_loop.run_app(&mut app) {
        engine_error!(SOURCE, "Event loop error: {}", e);
    }

    app.service.quit();
    if !app.service.join(Duration::from_secs(2)) {
        engine_warn!(SOURCE, "Render workers did not exit in time");
    }
}
