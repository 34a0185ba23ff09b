/// GraphicsContext - instance, surface, device, queue and command pool
///
/// Created once per session and destroyed last, after every object that
/// depends on the device.

use crate::config::EngineConfig;
use crate::error::{InitResource, Result};
use crate::graphics_device::{
    CommandPool, Device, GraphicsDevice, Instance, OutputSurface, PhysicalDevice, Queue, Surface,
};
use crate::{engine_debug, engine_info, engine_warn};

const SOURCE: &str = "vkfilter::GraphicsContext";

/// Root owner of all device-derived handles
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphicsContext {
    pub instance: Instance,
    pub surface: Surface,
    pub physical_device: PhysicalDevice,
    pub queue_family: u32,
    pub device: Device,
    pub queue: Queue,
    pub command_pool: CommandPool,
}

impl GraphicsContext {
    /// Create the context
    ///
    /// Any failing step releases what was already built and returns an
    /// `InitFailed` error naming the step. No partial context is returned.
    pub fn create(
        gd: &mut dyn GraphicsDevice,
        target: &OutputSurface,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut ctx = GraphicsContext::default();
        match ctx.build(gd, target, config) {
            Ok(()) => {
                engine_info!(
                    SOURCE,
                    "Context ready (queue family {}, validation {})",
                    ctx.queue_family,
                    config.enable_validation
                );
                Ok(ctx)
            }
            Err(err) => {
                engine_warn!(SOURCE, "Context creation failed: {}", err);
                ctx.destroy(gd);
                Err(err)
            }
        }
    }

    fn build(
        &mut self,
        gd: &mut dyn GraphicsDevice,
        target: &OutputSurface,
        config: &EngineConfig,
    ) -> Result<()> {
        self.instance = gd
            .create_instance(&config.app_name, config.enable_validation)
            .map_err(|e| e.during_init(InitResource::Instance))?;
        engine_debug!(SOURCE, "Instance created");

        self.surface = gd
            .create_surface(self.instance, target)
            .map_err(|e| e.during_init(InitResource::Surface))?;
        engine_debug!(SOURCE, "Surface created");

        let adapter = gd
            .select_physical_device(self.instance, self.surface)
            .map_err(|e| e.during_init(InitResource::PhysicalDevice))?;
        self.physical_device = adapter.physical_device;
        self.queue_family = adapter.queue_family;

        let (device, queue) = gd
            .create_device(self.physical_device, self.queue_family)
            .map_err(|e| e.during_init(InitResource::Device))?;
        self.device = device;
        self.queue = queue;
        engine_debug!(SOURCE, "Logical device created");

        self.command_pool = gd
            .create_command_pool(self.device, self.queue_family)
            .map_err(|e| e.during_init(InitResource::CommandPool))?;
        engine_debug!(SOURCE, "Command pool created");

        Ok(())
    }

    /// Release the command pool, device, surface and instance
    ///
    /// Null handles are skipped, so this is safe on a partially built or
    /// already destroyed context.
    pub fn destroy(&mut self, gd: &mut dyn GraphicsDevice) {
        if !self.command_pool.is_null() {
            gd.destroy_command_pool(self.device, self.command_pool);
            self.command_pool = CommandPool::NULL;
            engine_debug!(SOURCE, "Command pool destroyed");
        }
        if !self.device.is_null() {
            gd.destroy_device(self.device);
            self.device = Device::NULL;
            self.queue = Queue::NULL;
            engine_debug!(SOURCE, "Logical device destroyed");
        }
        self.physical_device = PhysicalDevice::NULL;
        if !self.surface.is_null() {
            gd.destroy_surface(self.instance, self.surface);
            self.surface = Surface::NULL;
            engine_debug!(SOURCE, "Surface destroyed");
        }
        if !self.instance.is_null() {
            gd.destroy_instance(self.instance);
            self.instance = Instance::NULL;
            engine_debug!(SOURCE, "Instance destroyed");
        }
    }

    pub fn is_null(&self) -> bool {
        self.instance.is_null() && self.device.is_null()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
