/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait

use std::ffi::{CStr, CString};
use std::time::Duration;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, RawDisplayHandle};
use rustc_hash::FxHashMap;
use vkfilter_engine::vkfilter::{
    AcquireCode, AcquireResult, AdapterSelection, ColorFormat, CommandBuffer, CommandPool,
    DescriptorPool, DescriptorSet, DescriptorSetLayout, Device, Error, Extent2D, Fence,
    Framebuffer, GraphicsDevice, GraphicsPipelineDesc, Image, ImageView, InitResource, Instance,
    OutputSurface, PhysicalDevice, Pipeline, PipelineLayout, PresentOutcome, PushConstantRange,
    Queue, RenderPass, Result, Sampler, Semaphore, ShaderModule, ShaderStages, SubmitDesc,
    Surface, SurfaceCapabilities, Swapchain, SwapchainDesc, TextureAllocation,
};
use vkfilter_engine::{engine_bail, engine_debug, engine_err, engine_error, engine_info, engine_warn};

use crate::vulkan_format::{
    acquire_code, color_format_from_vk, color_format_to_vk, extent_from_vk, extent_to_vk,
    present_mode_from_vk, present_mode_to_vk, shader_stages_to_vk, timeout_ns,
};
use crate::{vulkan_pipeline, vulkan_texture};

pub(crate) const SOURCE: &str = "vkfilter::vulkan";

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level objects
struct InstanceState {
    entry: ash::Entry,
    instance: ash::Instance,
    surface_loader: ash::khr::surface::Instance,
    #[cfg(feature = "vulkan-validation")]
    debug: Option<crate::debug::DebugMessenger>,
}

/// Device-level objects
pub(crate) struct DeviceState {
    pub(crate) device: ash::Device,
    physical_device: vk::PhysicalDevice,
    swapchain_loader: ash::khr::swapchain::Device,
    /// Dropped right before the device itself
    allocator: Option<Allocator>,
    /// Input texture allocations, keyed by raw image handle
    pub(crate) textures: FxHashMap<u64, Allocation>,
}

impl DeviceState {
    pub(crate) fn allocator(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| engine_err!(SOURCE, "GPU allocator already released"))
    }

    pub(crate) fn free_allocation(&mut self, allocation: Allocation) {
        match self.allocator.as_mut() {
            Some(allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    engine_warn!(SOURCE, "Failed to free GPU allocation: {:?}", e);
                }
            }
            None => engine_warn!(SOURCE, "GPU allocation outlived the allocator"),
        }
    }
}

/// Vulkan backend
///
/// Holds at most one instance and one logical device at a time, matching the
/// engine's single-session model. Every engine handle is the raw Vulkan handle
/// value, so no lookup table is needed for most objects.
pub struct VulkanDevice {
    /// Instance extensions required to present on the host display
    required_extensions: Vec<&'static CStr>,
    instance: Option<InstanceState>,
    device: Option<DeviceState>,
}

impl VulkanDevice {
    /// Create a backend able to present on `display`
    pub fn new(display: RawDisplayHandle) -> Result<Self> {
        let extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| engine_err!(SOURCE, "Unsupported display for Vulkan presentation: {:?}", e))?;

        // SAFETY: ash_window returns pointers to static extension name constants
        let required_extensions = extensions
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect();

        Ok(Self {
            required_extensions,
            instance: None,
            device: None,
        })
    }

    /// Create a backend for the display `window` lives on
    pub fn from_window<W: HasDisplayHandle>(window: &W) -> Result<Self> {
        let display = window
            .display_handle()
            .map_err(|e| Error::InvalidArgument(format!("display handle unavailable: {}", e)))?;
        Self::new(display.as_raw())
    }

    fn instance_state(&self, instance: Instance) -> Result<&InstanceState> {
        match &self.instance {
            Some(state) if state.instance.handle().as_raw() == instance.raw() => Ok(state),
            Some(_) => Err(engine_err!(SOURCE, "Unknown instance handle {:#x}", instance.raw())),
            None => Err(engine_err!(SOURCE, "No Vulkan instance")),
        }
    }

    fn device_state(&self, device: Device) -> Result<&DeviceState> {
        match &self.device {
            Some(state) if state.device.handle().as_raw() == device.raw() => Ok(state),
            Some(_) => Err(engine_err!(SOURCE, "Unknown device handle {:#x}", device.raw())),
            None => Err(engine_err!(SOURCE, "No Vulkan device")),
        }
    }

    fn device_state_mut(&mut self, device: Device) -> Result<&mut DeviceState> {
        match &mut self.device {
            Some(state) if state.device.handle().as_raw() == device.raw() => Ok(state),
            Some(_) => Err(engine_err!(SOURCE, "Unknown device handle {:#x}", device.raw())),
            None => Err(engine_err!(SOURCE, "No Vulkan device")),
        }
    }

    /// Device for calls that cannot fail (destroy, record)
    fn active_device(&self, operation: &str) -> Option<&ash::Device> {
        match &self.device {
            Some(state) => Some(&state.device),
            None => {
                engine_warn!(SOURCE, "{} ignored, no Vulkan device", operation);
                None
            }
        }
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        // SAFETY: plain query on a loaded entry
        let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
            Ok(layers) => layers,
            Err(_) => return false,
        };
        layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER))
    }

    /// Graphics+present queue family of `physical_device`, if it can drive a swapchain
    fn graphics_present_family(
        state: &InstanceState,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Option<u32> {
        // SAFETY: physical_device comes from enumerate_physical_devices on this instance
        unsafe {
            let has_swapchain = state
                .instance
                .enumerate_device_extension_properties(physical_device)
                .map(|extensions| {
                    extensions
                        .iter()
                        .any(|ext| {
                            ext.extension_name_as_c_str()
                                .is_ok_and(|name| name == ash::khr::swapchain::NAME)
                        })
                })
                .unwrap_or(false);
            if !has_swapchain {
                return None;
            }

            let families = state
                .instance
                .get_physical_device_queue_family_properties(physical_device);
            families.iter().enumerate().find_map(|(index, family)| {
                let index = index as u32;
                let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                let present = state
                    .surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .unwrap_or(false);
                (graphics && present).then_some(index)
            })
        }
    }
}

impl GraphicsDevice for VulkanDevice {
    // ===== INSTANCE / SURFACE / DEVICE =====

    fn create_instance(&mut self, app_name: &str, enable_validation: bool) -> Result<Instance> {
        if self.instance.is_some() {
            engine_bail!(SOURCE, "Vulkan instance already created");
        }

        // SAFETY: loading the system Vulkan library
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| engine_err!(SOURCE, "Failed to load Vulkan library: {:?}", e))?;

        let app_name = CString::new(app_name)
            .map_err(|_| Error::InvalidArgument("application name contains a NUL byte".to_string()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vkfilter")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut validation = enable_validation && cfg!(feature = "vulkan-validation");
        if enable_validation && !validation {
            engine_warn!(SOURCE, "Validation requested but the vulkan-validation feature is disabled");
        }
        if validation && !Self::validation_layer_available(&entry) {
            engine_warn!(SOURCE, "Validation layer not installed, continuing without it");
            validation = false;
        }

        let mut extension_names: Vec<*const std::os::raw::c_char> =
            self.required_extensions.iter().map(|name| name.as_ptr()).collect();
        let mut layer_names = Vec::new();
        if validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            layer_names.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&extension_names);

        // SAFETY: create_info and everything it points to outlive the call
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create Vulkan instance: {:?}", e))?;

        #[cfg(feature = "vulkan-validation")]
        let debug = if validation {
            match crate::debug::DebugMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    engine_warn!(SOURCE, "Debug messenger unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let handle = Instance(instance.handle().as_raw());
        engine_info!(SOURCE, "Vulkan instance created (validation: {})", validation);

        self.instance = Some(InstanceState {
            entry,
            instance,
            surface_loader,
            #[cfg(feature = "vulkan-validation")]
            debug,
        });
        Ok(handle)
    }

    fn destroy_instance(&mut self, instance: Instance) {
        if self.instance_state(instance).is_err() {
            return;
        }
        if self.device.is_some() {
            engine_warn!(SOURCE, "Destroying the instance while a device is alive");
        }
        if let Some(state) = self.instance.take() {
            #[cfg(feature = "vulkan-validation")]
            if let Some(debug) = state.debug {
                debug.destroy();
            }
            // SAFETY: every child object has been destroyed by the engine
            unsafe { state.instance.destroy_instance(None) };
            engine_debug!(SOURCE, "Vulkan instance destroyed");
        }
    }

    fn create_surface(&mut self, instance: Instance, target: &OutputSurface) -> Result<Surface> {
        let state = self.instance_state(instance)?;
        // SAFETY: the host keeps the window alive for the whole session
        let surface = unsafe {
            ash_window::create_surface(&state.entry, &state.instance, target.display, target.window, None)
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to create surface: {:?}", e))?;
        Ok(Surface(surface.as_raw()))
    }

    fn destroy_surface(&mut self, instance: Instance, surface: Surface) {
        if let Ok(state) = self.instance_state(instance) {
            // SAFETY: the swapchain built on it is already gone
            unsafe {
                state
                    .surface_loader
                    .destroy_surface(vk::SurfaceKHR::from_raw(surface.raw()), None)
            };
        }
    }

    fn select_physical_device(&mut self, instance: Instance, surface: Surface) -> Result<AdapterSelection> {
        let state = self.instance_state(instance)?;
        let surface = vk::SurfaceKHR::from_raw(surface.raw());

        // SAFETY: plain queries on a live instance
        let physical_devices = unsafe { state.instance.enumerate_physical_devices() }
            .map_err(|e| engine_err!(SOURCE, "Failed to enumerate physical devices: {:?}", e))?;

        let mut best: Option<(u32, vk::PhysicalDevice, u32)> = None;
        for &physical_device in &physical_devices {
            let Some(family) = Self::graphics_present_family(state, physical_device, surface) else {
                continue;
            };
            // SAFETY: see above
            let properties = unsafe { state.instance.get_physical_device_properties(physical_device) };
            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
                _ => 0,
            };
            if best.map_or(true, |(best_score, _, _)| score > best_score) {
                best = Some((score, physical_device, family));
            }
        }

        let Some((_, physical_device, queue_family)) = best else {
            if physical_devices.is_empty() {
                engine_bail!(SOURCE, "No Vulkan-capable GPU found");
            }
            engine_error!(SOURCE, "No GPU with a queue family supporting graphics and present");
            return Err(Error::init(
                InitResource::QueueFamily,
                "no queue family supports both graphics and present",
            ));
        };

        // SAFETY: see above
        let properties = unsafe { state.instance.get_physical_device_properties(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        engine_info!(SOURCE, "Selected GPU '{}' (queue family {})", name, queue_family);

        Ok(AdapterSelection {
            physical_device: PhysicalDevice(physical_device.as_raw()),
            queue_family,
        })
    }

    fn create_device(&mut self, physical_device: PhysicalDevice, queue_family: u32) -> Result<(Device, Queue)> {
        if self.device.is_some() {
            engine_bail!(SOURCE, "Vulkan device already created");
        }
        let state = self
            .instance
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan instance"))?;
        let physical_device = vk::PhysicalDevice::from_raw(physical_device.raw());

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];
        let extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions);

        // SAFETY: physical_device belongs to this instance
        let device = unsafe { state.instance.create_device(physical_device, &create_info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create logical device: {:?}", e))?;
        // SAFETY: one queue was requested from queue_family
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: state.instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                // SAFETY: nothing was created on the device yet
                unsafe { device.destroy_device(None) };
                engine_bail!(SOURCE, "Failed to create GPU allocator: {:?}", e);
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&state.instance, &device);
        let handles = (Device(device.handle().as_raw()), Queue(queue.as_raw()));
        engine_debug!(SOURCE, "Logical device created");

        self.device = Some(DeviceState {
            device,
            physical_device,
            swapchain_loader,
            allocator: Some(allocator),
            textures: FxHashMap::default(),
        });
        Ok(handles)
    }

    fn destroy_device(&mut self, device: Device) {
        if self.device_state(device).is_err() {
            return;
        }
        let Some(mut state) = self.device.take() else {
            return;
        };

        let leftovers: Vec<(u64, Allocation)> = state.textures.drain().collect();
        if !leftovers.is_empty() {
            engine_warn!(SOURCE, "{} texture(s) still alive at device destruction", leftovers.len());
        }
        for (image, allocation) in leftovers {
            // SAFETY: the device is idle, the engine waited before teardown
            unsafe { state.device.destroy_image(vk::Image::from_raw(image), None) };
            state.free_allocation(allocation);
        }

        // Allocator memory blocks must go before the device
        drop(state.allocator.take());
        // SAFETY: every child object is destroyed
        unsafe { state.device.destroy_device(None) };
        engine_debug!(SOURCE, "Logical device destroyed");
    }

    fn device_wait_idle(&mut self, device: Device) -> Result<()> {
        let state = self.device_state(device)?;
        // SAFETY: the engine serializes queue access
        unsafe { state.device.device_wait_idle() }
            .map_err(|e| engine_err!(SOURCE, "Failed to wait for device idle: {:?}", e))
    }

    fn surface_capabilities(&mut self, physical_device: PhysicalDevice, surface: Surface) -> Result<SurfaceCapabilities> {
        let state = self
            .instance
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan instance"))?;
        let physical_device = vk::PhysicalDevice::from_raw(physical_device.raw());
        let surface = vk::SurfaceKHR::from_raw(surface.raw());

        // SAFETY: both handles belong to this instance
        let (caps, formats, modes) = unsafe {
            let caps = state
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to query surface capabilities: {:?}", e))?;
            let formats = state
                .surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to query surface formats: {:?}", e))?;
            let modes = state
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to query present modes: {:?}", e))?;
            (caps, formats, modes)
        };

        let formats = if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
            // Any format is accepted
            vec![ColorFormat::B8G8R8A8_UNORM]
        } else {
            formats
                .iter()
                .filter(|f| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
                .filter_map(|f| color_format_from_vk(f.format))
                .collect()
        };

        Ok(SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            current_extent: extent_from_vk(caps.current_extent),
            min_extent: Extent2D::new(caps.min_image_extent.width, caps.min_image_extent.height),
            max_extent: Extent2D::new(caps.max_image_extent.width, caps.max_image_extent.height),
            formats,
            present_modes: modes.into_iter().filter_map(present_mode_from_vk).collect(),
        })
    }

    // ===== COMMAND POOL / BUFFERS =====

    fn create_command_pool(&mut self, device: Device, queue_family: u32) -> Result<CommandPool> {
        let state = self.device_state(device)?;
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        // SAFETY: live device
        let pool = unsafe { state.device.create_command_pool(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create command pool: {:?}", e))?;
        Ok(CommandPool(pool.as_raw()))
    }

    fn destroy_command_pool(&mut self, _device: Device, pool: CommandPool) {
        if let Some(device) = self.active_device("destroy_command_pool") {
            // SAFETY: buffers from the pool are no longer executing
            unsafe { device.destroy_command_pool(vk::CommandPool::from_raw(pool.raw()), None) };
        }
    }

    fn allocate_command_buffers(&mut self, device: Device, pool: CommandPool, count: u32) -> Result<Vec<CommandBuffer>> {
        let state = self.device_state(device)?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk::CommandPool::from_raw(pool.raw()))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        // SAFETY: pool belongs to this device
        let buffers = unsafe { state.device.allocate_command_buffers(&info) }
            .map_err(|e| engine_err!(SOURCE, "Failed to allocate {} command buffer(s): {:?}", count, e))?;
        Ok(buffers.into_iter().map(|b| CommandBuffer(b.as_raw())).collect())
    }

    fn free_command_buffers(&mut self, _device: Device, pool: CommandPool, buffers: &[CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        if let Some(device) = self.active_device("free_command_buffers") {
            let buffers: Vec<vk::CommandBuffer> =
                buffers.iter().map(|b| vk::CommandBuffer::from_raw(b.raw())).collect();
            // SAFETY: none of the buffers is pending
            unsafe { device.free_command_buffers(vk::CommandPool::from_raw(pool.raw()), &buffers) };
        }
    }

    // ===== RENDER PASS / SWAPCHAIN =====

    fn create_render_pass(&mut self, device: Device, format: ColorFormat) -> Result<RenderPass> {
        let state = self.device_state(device)?;
        let render_pass = vulkan_pipeline::create_render_pass(&state.device, color_format_to_vk(format))?;
        Ok(RenderPass(render_pass.as_raw()))
    }

    fn destroy_render_pass(&mut self, _device: Device, render_pass: RenderPass) {
        if let Some(device) = self.active_device("destroy_render_pass") {
            // SAFETY: no framebuffer or pipeline uses it anymore
            unsafe { device.destroy_render_pass(vk::RenderPass::from_raw(render_pass.raw()), None) };
        }
    }

    fn create_swapchain(&mut self, device: Device, desc: &SwapchainDesc) -> Result<Swapchain> {
        let state = self.device_state(device)?;
        let instance = self
            .instance
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan instance"))?;
        let surface = vk::SurfaceKHR::from_raw(desc.surface.raw());

        // SAFETY: surface and physical device belong to this instance
        let caps = unsafe {
            instance
                .surface_loader
                .get_physical_device_surface_capabilities(state.physical_device, surface)
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to query surface capabilities: {:?}", e))?;

        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|mode| caps.supported_composite_alpha.contains(*mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(desc.image_count)
            .image_format(color_format_to_vk(desc.format))
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(extent_to_vk(desc.extent))
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode_to_vk(desc.present_mode))
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::from_raw(desc.old_swapchain.raw()));

        // SAFETY: info only borrows locals
        let swapchain = unsafe { state.swapchain_loader.create_swapchain(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create swapchain: {:?}", e))?;
        engine_debug!(
            SOURCE,
            "Swapchain created ({}x{}, {:?}, {:?})",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.present_mode
        );
        Ok(Swapchain(swapchain.as_raw()))
    }

    fn swapchain_images(&mut self, device: Device, swapchain: Swapchain) -> Result<Vec<Image>> {
        let state = self.device_state(device)?;
        // SAFETY: swapchain belongs to this device
        let images = unsafe {
            state
                .swapchain_loader
                .get_swapchain_images(vk::SwapchainKHR::from_raw(swapchain.raw()))
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to get swapchain images: {:?}", e))?;
        Ok(images.into_iter().map(|i| Image(i.as_raw())).collect())
    }

    fn destroy_swapchain(&mut self, _device: Device, swapchain: Swapchain) {
        if let Some(state) = &self.device {
            // SAFETY: views and framebuffers on its images are gone
            unsafe {
                state
                    .swapchain_loader
                    .destroy_swapchain(vk::SwapchainKHR::from_raw(swapchain.raw()), None)
            };
        }
    }

    fn create_image_view(&mut self, device: Device, image: Image, format: ColorFormat) -> Result<ImageView> {
        let state = self.device_state(device)?;
        let view = vulkan_texture::create_view(
            &state.device,
            vk::Image::from_raw(image.raw()),
            color_format_to_vk(format),
        )?;
        Ok(ImageView(view.as_raw()))
    }

    fn destroy_image_view(&mut self, _device: Device, view: ImageView) {
        if let Some(device) = self.active_device("destroy_image_view") {
            // SAFETY: no framebuffer or descriptor references it anymore
            unsafe { device.destroy_image_view(vk::ImageView::from_raw(view.raw()), None) };
        }
    }

    fn create_framebuffer(
        &mut self,
        device: Device,
        render_pass: RenderPass,
        view: ImageView,
        extent: Extent2D,
    ) -> Result<Framebuffer> {
        let state = self.device_state(device)?;
        let attachments = [vk::ImageView::from_raw(view.raw())];
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(vk::RenderPass::from_raw(render_pass.raw()))
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        // SAFETY: info only borrows locals
        let framebuffer = unsafe { state.device.create_framebuffer(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create framebuffer: {:?}", e))?;
        Ok(Framebuffer(framebuffer.as_raw()))
    }

    fn destroy_framebuffer(&mut self, _device: Device, framebuffer: Framebuffer) {
        if let Some(device) = self.active_device("destroy_framebuffer") {
            // SAFETY: no pending command buffer references it
            unsafe { device.destroy_framebuffer(vk::Framebuffer::from_raw(framebuffer.raw()), None) };
        }
    }

    // ===== SYNCHRONIZATION =====

    fn create_semaphore(&mut self, device: Device) -> Result<Semaphore> {
        let state = self.device_state(device)?;
        // SAFETY: live device
        let semaphore = unsafe { state.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create semaphore: {:?}", e))?;
        Ok(Semaphore(semaphore.as_raw()))
    }

    fn destroy_semaphore(&mut self, _device: Device, semaphore: Semaphore) {
        if let Some(device) = self.active_device("destroy_semaphore") {
            // SAFETY: no pending submission waits on it
            unsafe { device.destroy_semaphore(vk::Semaphore::from_raw(semaphore.raw()), None) };
        }
    }

    fn create_fence(&mut self, device: Device, signaled: bool) -> Result<Fence> {
        let state = self.device_state(device)?;
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        // SAFETY: live device
        let fence = unsafe { state.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create fence: {:?}", e))?;
        Ok(Fence(fence.as_raw()))
    }

    fn destroy_fence(&mut self, _device: Device, fence: Fence) {
        if let Some(device) = self.active_device("destroy_fence") {
            // SAFETY: the fence is not attached to a pending submission
            unsafe { device.destroy_fence(vk::Fence::from_raw(fence.raw()), None) };
        }
    }

    fn wait_for_fence(&mut self, device: Device, fence: Fence, timeout: Duration) -> Result<bool> {
        let state = self.device_state(device)?;
        let fences = [vk::Fence::from_raw(fence.raw())];
        // SAFETY: fence belongs to this device
        match unsafe { state.device.wait_for_fences(&fences, true, timeout_ns(timeout)) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(engine_err!(SOURCE, "Failed to wait for fence: {:?}", e)),
        }
    }

    fn reset_fence(&mut self, device: Device, fence: Fence) -> Result<()> {
        let state = self.device_state(device)?;
        let fences = [vk::Fence::from_raw(fence.raw())];
        // SAFETY: fence is signaled, not pending
        unsafe { state.device.reset_fences(&fences) }
            .map_err(|e| engine_err!(SOURCE, "Failed to reset fence: {:?}", e))
    }

    // ===== FRAME LOOP =====

    fn acquire_next_image(
        &mut self,
        _device: Device,
        swapchain: Swapchain,
        signal: Semaphore,
        timeout: Duration,
    ) -> AcquireResult {
        let Some(state) = &self.device else {
            return AcquireResult::failed(AcquireCode::Failed);
        };
        // SAFETY: swapchain and semaphore belong to this device
        let result = unsafe {
            state.swapchain_loader.acquire_next_image(
                vk::SwapchainKHR::from_raw(swapchain.raw()),
                timeout_ns(timeout),
                vk::Semaphore::from_raw(signal.raw()),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => AcquireResult::acquired(index, AcquireCode::Success),
            Ok((index, true)) => AcquireResult::acquired(index, AcquireCode::Suboptimal),
            Err(e) => AcquireResult::failed(acquire_code(e)),
        }
    }

    fn queue_submit(&mut self, queue: Queue, submit: &SubmitDesc) -> Result<()> {
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan device"))?;

        let wait_semaphores = [vk::Semaphore::from_raw(submit.wait.raw())];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers: Vec<vk::CommandBuffer> = submit
            .command_buffer
            .iter()
            .map(|b| vk::CommandBuffer::from_raw(b.raw()))
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = submit
            .signal
            .iter()
            .map(|s| vk::Semaphore::from_raw(s.raw()))
            .collect();

        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the engine serializes queue access, the fence is unsignaled or null
        unsafe {
            state.device.queue_submit(
                vk::Queue::from_raw(queue.raw()),
                &[info],
                vk::Fence::from_raw(submit.fence.raw()),
            )
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to submit commands to GPU queue: {:?}", e))
    }

    fn queue_present(
        &mut self,
        queue: Queue,
        swapchain: Swapchain,
        image_index: u32,
        wait: Semaphore,
    ) -> Result<PresentOutcome> {
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan device"))?;

        let wait_semaphores = [vk::Semaphore::from_raw(wait.raw())];
        let swapchains = [vk::SwapchainKHR::from_raw(swapchain.raw())];
        let image_indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: image_index was acquired from this swapchain
        match unsafe { state.swapchain_loader.queue_present(vk::Queue::from_raw(queue.raw()), &info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            // The wait still executes for these, so they are not reported as errors
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR) => {
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(engine_err!(SOURCE, "Failed to present swapchain image: {:?}", e)),
        }
    }

    // ===== RECORDING =====

    fn reset_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()> {
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan device"))?;
        // SAFETY: the buffer's last submission has completed
        unsafe {
            state.device.reset_command_buffer(
                vk::CommandBuffer::from_raw(command_buffer.raw()),
                vk::CommandBufferResetFlags::empty(),
            )
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to reset command buffer: {:?}", e))
    }

    fn begin_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()> {
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan device"))?;
        let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: the buffer was reset
        unsafe {
            state
                .device
                .begin_command_buffer(vk::CommandBuffer::from_raw(command_buffer.raw()), &info)
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to begin command buffer: {:?}", e))
    }

    fn end_command_buffer(&mut self, command_buffer: CommandBuffer) -> Result<()> {
        let state = self
            .device
            .as_ref()
            .ok_or_else(|| engine_err!(SOURCE, "No Vulkan device"))?;
        // SAFETY: the buffer is recording
        unsafe {
            state
                .device
                .end_command_buffer(vk::CommandBuffer::from_raw(command_buffer.raw()))
        }
        .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer: {:?}", e))
    }

    fn cmd_begin_render_pass(
        &mut self,
        command_buffer: CommandBuffer,
        render_pass: RenderPass,
        framebuffer: Framebuffer,
        extent: Extent2D,
        clear_color: [f32; 4],
    ) {
        let Some(device) = self.active_device("cmd_begin_render_pass") else {
            return;
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(vk::RenderPass::from_raw(render_pass.raw()))
            .framebuffer(vk::Framebuffer::from_raw(framebuffer.raw()))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: extent_to_vk(extent),
            })
            .clear_values(&clear_values);
        // SAFETY: the buffer is recording
        unsafe {
            device.cmd_begin_render_pass(
                vk::CommandBuffer::from_raw(command_buffer.raw()),
                &info,
                vk::SubpassContents::INLINE,
            )
        };
    }

    fn cmd_end_render_pass(&mut self, command_buffer: CommandBuffer) {
        if let Some(device) = self.active_device("cmd_end_render_pass") {
            // SAFETY: a render pass is active on the buffer
            unsafe { device.cmd_end_render_pass(vk::CommandBuffer::from_raw(command_buffer.raw())) };
        }
    }

    fn cmd_set_viewport_scissor(&mut self, command_buffer: CommandBuffer, extent: Extent2D) {
        let Some(device) = self.active_device("cmd_set_viewport_scissor") else {
            return;
        };
        let buffer = vk::CommandBuffer::from_raw(command_buffer.raw());
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: extent_to_vk(extent),
        }];
        // SAFETY: the buffer is recording
        unsafe {
            device.cmd_set_viewport(buffer, 0, &viewports);
            device.cmd_set_scissor(buffer, 0, &scissors);
        }
    }

    fn cmd_bind_pipeline(&mut self, command_buffer: CommandBuffer, pipeline: Pipeline) {
        if let Some(device) = self.active_device("cmd_bind_pipeline") {
            // SAFETY: the buffer is recording
            unsafe {
                device.cmd_bind_pipeline(
                    vk::CommandBuffer::from_raw(command_buffer.raw()),
                    vk::PipelineBindPoint::GRAPHICS,
                    vk::Pipeline::from_raw(pipeline.raw()),
                )
            };
        }
    }

    fn cmd_bind_descriptor_set(&mut self, command_buffer: CommandBuffer, layout: PipelineLayout, set: DescriptorSet) {
        if let Some(device) = self.active_device("cmd_bind_descriptor_set") {
            // SAFETY: the buffer is recording
            unsafe {
                device.cmd_bind_descriptor_sets(
                    vk::CommandBuffer::from_raw(command_buffer.raw()),
                    vk::PipelineBindPoint::GRAPHICS,
                    vk::PipelineLayout::from_raw(layout.raw()),
                    0,
                    &[vk::DescriptorSet::from_raw(set.raw())],
                    &[],
                )
            };
        }
    }

    fn cmd_push_constants(
        &mut self,
        command_buffer: CommandBuffer,
        layout: PipelineLayout,
        stages: ShaderStages,
        data: &[u8],
    ) {
        if let Some(device) = self.active_device("cmd_push_constants") {
            // SAFETY: the buffer is recording, data fits the layout's range
            unsafe {
                device.cmd_push_constants(
                    vk::CommandBuffer::from_raw(command_buffer.raw()),
                    vk::PipelineLayout::from_raw(layout.raw()),
                    shader_stages_to_vk(stages),
                    0,
                    data,
                )
            };
        }
    }

    fn cmd_draw(&mut self, command_buffer: CommandBuffer, vertex_count: u32) {
        if let Some(device) = self.active_device("cmd_draw") {
            // SAFETY: the buffer is recording inside a render pass
            unsafe { device.cmd_draw(vk::CommandBuffer::from_raw(command_buffer.raw()), vertex_count, 1, 0, 0) };
        }
    }

    // ===== FILTER OBJECTS =====

    fn create_shader_module(&mut self, device: Device, code: &[u32]) -> Result<ShaderModule> {
        let state = self.device_state(device)?;
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        // SAFETY: code is validated SPIR-V
        let module = unsafe { state.device.create_shader_module(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create shader module: {:?}", e))?;
        Ok(ShaderModule(module.as_raw()))
    }

    fn destroy_shader_module(&mut self, _device: Device, module: ShaderModule) {
        if let Some(device) = self.active_device("destroy_shader_module") {
            // SAFETY: pipelines keep their own copy of the code
            unsafe { device.destroy_shader_module(vk::ShaderModule::from_raw(module.raw()), None) };
        }
    }

    fn create_descriptor_set_layout(&mut self, device: Device) -> Result<DescriptorSetLayout> {
        let state = self.device_state(device)?;
        let layout = vulkan_pipeline::create_descriptor_set_layout(&state.device)?;
        Ok(DescriptorSetLayout(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&mut self, _device: Device, layout: DescriptorSetLayout) {
        if let Some(device) = self.active_device("destroy_descriptor_set_layout") {
            // SAFETY: no pipeline layout is created from it anymore
            unsafe {
                device.destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.raw()), None)
            };
        }
    }

    fn create_pipeline_layout(
        &mut self,
        device: Device,
        set_layout: DescriptorSetLayout,
        push_constants: Option<PushConstantRange>,
    ) -> Result<PipelineLayout> {
        let state = self.device_state(device)?;
        let layout = vulkan_pipeline::create_pipeline_layout(
            &state.device,
            vk::DescriptorSetLayout::from_raw(set_layout.raw()),
            push_constants,
        )?;
        Ok(PipelineLayout(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&mut self, _device: Device, layout: PipelineLayout) {
        if let Some(device) = self.active_device("destroy_pipeline_layout") {
            // SAFETY: its pipeline is destroyed
            unsafe { device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.raw()), None) };
        }
    }

    fn create_graphics_pipeline(&mut self, device: Device, desc: &GraphicsPipelineDesc) -> Result<Pipeline> {
        let state = self.device_state(device)?;
        let pipeline = vulkan_pipeline::create_graphics_pipeline(&state.device, desc)?;
        Ok(Pipeline(pipeline.as_raw()))
    }

    fn destroy_pipeline(&mut self, _device: Device, pipeline: Pipeline) {
        if let Some(device) = self.active_device("destroy_pipeline") {
            // SAFETY: no pending command buffer binds it
            unsafe { device.destroy_pipeline(vk::Pipeline::from_raw(pipeline.raw()), None) };
        }
    }

    fn create_descriptor_pool(&mut self, device: Device, max_sets: u32) -> Result<DescriptorPool> {
        let state = self.device_state(device)?;
        let sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: max_sets,
        }];
        let info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&sizes)
            .max_sets(max_sets);
        // SAFETY: live device
        let pool = unsafe { state.device.create_descriptor_pool(&info, None) }
            .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor pool: {:?}", e))?;
        Ok(DescriptorPool(pool.as_raw()))
    }

    fn destroy_descriptor_pool(&mut self, _device: Device, pool: DescriptorPool) {
        if let Some(device) = self.active_device("destroy_descriptor_pool") {
            // SAFETY: sets from the pool are no longer bound by pending work
            unsafe { device.destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.raw()), None) };
        }
    }

    fn allocate_descriptor_set(
        &mut self,
        device: Device,
        pool: DescriptorPool,
        layout: DescriptorSetLayout,
    ) -> Result<DescriptorSet> {
        let state = self.device_state(device)?;
        let layouts = [vk::DescriptorSetLayout::from_raw(layout.raw())];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk::DescriptorPool::from_raw(pool.raw()))
            .set_layouts(&layouts);
        // SAFETY: pool and layout belong to this device
        let sets = unsafe { state.device.allocate_descriptor_sets(&info) }
            .map_err(|e| engine_err!(SOURCE, "Failed to allocate descriptor set: {:?}", e))?;
        sets.first()
            .map(|set| DescriptorSet(set.as_raw()))
            .ok_or_else(|| engine_err!(SOURCE, "Descriptor set allocation returned nothing"))
    }

    fn update_descriptor_set(&mut self, _device: Device, set: DescriptorSet, view: ImageView, sampler: Sampler) {
        let Some(device) = self.active_device("update_descriptor_set") else {
            return;
        };
        let image_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(sampler.raw()),
            image_view: vk::ImageView::from_raw(view.raw()),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let writes = [vk::WriteDescriptorSet::default()
            .dst_set(vk::DescriptorSet::from_raw(set.raw()))
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)];
        // SAFETY: the set is not bound by pending work
        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }

    fn create_sampler(&mut self, device: Device) -> Result<Sampler> {
        let state = self.device_state(device)?;
        let sampler = vulkan_texture::create_sampler(&state.device)?;
        Ok(Sampler(sampler.as_raw()))
    }

    fn destroy_sampler(&mut self, _device: Device, sampler: Sampler) {
        if let Some(device) = self.active_device("destroy_sampler") {
            // SAFETY: no descriptor in use references it
            unsafe { device.destroy_sampler(vk::Sampler::from_raw(sampler.raw()), None) };
        }
    }

    // ===== INPUT TEXTURE =====

    fn create_texture(&mut self, device: Device, extent: Extent2D) -> Result<TextureAllocation> {
        let extent = extent.validated()?;
        let state = self.device_state_mut(device)?;
        vulkan_texture::create_texture(state, extent)
    }

    fn upload_texture(
        &mut self,
        device: Device,
        queue: Queue,
        pool: CommandPool,
        texture: &TextureAllocation,
        pixels: &[u8],
    ) -> Result<()> {
        if pixels.len() != texture.extent.rgba_len() {
            return Err(Error::InvalidArgument(format!(
                "expected {} bytes for a {}x{} RGBA texture, got {}",
                texture.extent.rgba_len(),
                texture.extent.width,
                texture.extent.height,
                pixels.len()
            )));
        }
        let state = self.device_state_mut(device)?;
        vulkan_texture::upload_texture(
            state,
            vk::Queue::from_raw(queue.raw()),
            vk::CommandPool::from_raw(pool.raw()),
            texture,
            pixels,
        )
    }

    fn destroy_texture(&mut self, device: Device, texture: &TextureAllocation) {
        match self.device_state_mut(device) {
            Ok(state) => vulkan_texture::destroy_texture(state, texture),
            Err(_) => engine_warn!(SOURCE, "destroy_texture ignored, no Vulkan device"),
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        // The engine tears everything down on release; this only covers hosts
        // that drop the backend mid-session.
        if let Some(state) = &self.device {
            let device = Device(state.device.handle().as_raw());
            // SAFETY: best effort before destruction
            unsafe { state.device.device_wait_idle() }.ok();
            self.destroy_device(device);
        }
        if let Some(state) = &self.instance {
            let instance = Instance(state.instance.handle().as_raw());
            self.destroy_instance(instance);
        }
    }
}
