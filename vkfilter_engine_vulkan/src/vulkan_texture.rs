/// Input texture: RGBA8 sampled image, its memory, and staging uploads

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use vkfilter_engine::vkfilter::{DeviceMemory, Extent2D, Image, ImageView, Result, TextureAllocation};
use vkfilter_engine::{engine_err, engine_trace, engine_warn};

use crate::vulkan_device::{DeviceState, SOURCE};

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub(crate) fn create_view(device: &ash::Device, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(color_range());
    // SAFETY: image belongs to this device
    unsafe { device.create_image_view(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create image view: {:?}", e))
}

/// Linear filtering, clamped to edge
pub(crate) fn create_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .anisotropy_enable(false)
        .max_lod(0.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK);
    // SAFETY: live device
    unsafe { device.create_sampler(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create sampler: {:?}", e))
}

pub(crate) fn create_texture(state: &mut DeviceState, extent: Extent2D) -> Result<TextureAllocation> {
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    // SAFETY: info only borrows locals
    let image = unsafe { state.device.create_image(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create input texture image: {:?}", e))?;
    // SAFETY: image was just created on this device
    let requirements = unsafe { state.device.get_image_memory_requirements(image) };

    let allocation = state.allocator().and_then(|allocator| {
        allocator
            .allocate(&AllocationCreateDesc {
                name: "input_texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_err!(SOURCE, "Out of GPU memory for input texture ({:.2} MB): {:?}", size_mb, e)
            })
    });
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            // SAFETY: nothing references the image yet
            unsafe { state.device.destroy_image(image, None) };
            return Err(e);
        }
    };

    // SAFETY: the allocation satisfies the image requirements
    let memory = unsafe { allocation.memory() };
    let bound = unsafe { state.device.bind_image_memory(image, memory, allocation.offset()) }
        .map_err(|e| engine_err!(SOURCE, "Failed to bind input texture memory: {:?}", e))
        .and_then(|()| create_view(&state.device, image, TEXTURE_FORMAT));

    let view = match bound {
        Ok(view) => view,
        Err(e) => {
            // SAFETY: see above
            unsafe { state.device.destroy_image(image, None) };
            state.free_allocation(allocation);
            return Err(e);
        }
    };

    state.textures.insert(image.as_raw(), allocation);
    engine_trace!(SOURCE, "Input texture image {}x{} allocated", extent.width, extent.height);

    Ok(TextureAllocation {
        image: Image(image.as_raw()),
        memory: DeviceMemory(memory.as_raw()),
        view: ImageView(view.as_raw()),
        extent,
    })
}

pub(crate) fn destroy_texture(state: &mut DeviceState, texture: &TextureAllocation) {
    if texture.is_null() {
        return;
    }
    // SAFETY: the engine waited for the GPU before releasing the texture
    unsafe {
        state.device.destroy_image_view(vk::ImageView::from_raw(texture.view.raw()), None);
        state.device.destroy_image(vk::Image::from_raw(texture.image.raw()), None);
    }
    match state.textures.remove(&texture.image.raw()) {
        Some(allocation) => state.free_allocation(allocation),
        None => engine_warn!(SOURCE, "No allocation recorded for input texture {:#x}", texture.image.raw()),
    }
}

/// Host-visible buffer holding a copy of `pixels`
fn create_staging_buffer(state: &mut DeviceState, pixels: &[u8]) -> Result<(vk::Buffer, Allocation)> {
    let info = vk::BufferCreateInfo::default()
        .size(pixels.len() as vk::DeviceSize)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    // SAFETY: info only borrows locals
    let buffer = unsafe { state.device.create_buffer(&info, None) }
        .map_err(|e| engine_err!(SOURCE, "Failed to create staging buffer: {:?}", e))?;
    // SAFETY: buffer was just created on this device
    let requirements = unsafe { state.device.get_buffer_memory_requirements(buffer) };

    let allocation = state.allocator().and_then(|allocator| {
        allocator
            .allocate(&AllocationCreateDesc {
                name: "input_texture_staging",
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| engine_err!(SOURCE, "Out of GPU memory for staging buffer: {:?}", e))
    });
    let mut allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            // SAFETY: nothing references the buffer yet
            unsafe { state.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    let filled = match allocation.mapped_slice_mut() {
        Some(mapped) if mapped.len() >= pixels.len() => {
            mapped[..pixels.len()].copy_from_slice(pixels);
            // SAFETY: the allocation satisfies the buffer requirements
            unsafe { state.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
                .map_err(|e| engine_err!(SOURCE, "Failed to bind staging buffer memory: {:?}", e))
        }
        _ => Err(engine_err!(SOURCE, "Staging buffer memory is not host mapped")),
    };
    if let Err(e) = filled {
        // SAFETY: see above
        unsafe { state.device.destroy_buffer(buffer, None) };
        state.free_allocation(allocation);
        return Err(e);
    }
    Ok((buffer, allocation))
}

fn record_copy(device: &ash::Device, command_buffer: vk::CommandBuffer, staging: vk::Buffer, image: vk::Image, extent: Extent2D) -> Result<()> {
    let begin = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    // Previous contents are fully overwritten, so the old layout is irrelevant;
    // the source stage still orders the copy after in-flight sampling.
    let to_transfer = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range())
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

    let to_sampled = vk::ImageMemoryBarrier::default()
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range())
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ);

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    // SAFETY: command_buffer is freshly allocated, every handle is alive
    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin)
            .map_err(|e| engine_err!(SOURCE, "Failed to begin upload command buffer: {:?}", e))?;
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            command_buffer,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_sampled],
        );
        device
            .end_command_buffer(command_buffer)
            .map_err(|e| engine_err!(SOURCE, "Failed to end upload command buffer: {:?}", e))
    }
}

/// Record, submit and wait for a one-shot copy of `staging` into `image`
fn submit_copy(
    device: &ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    staging: vk::Buffer,
    image: vk::Image,
    extent: Extent2D,
) -> Result<()> {
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    // SAFETY: the pool belongs to this device, access is serialized by the engine
    let buffers = unsafe { device.allocate_command_buffers(&info) }
        .map_err(|e| engine_err!(SOURCE, "Failed to allocate upload command buffer: {:?}", e))?;
    let Some(&command_buffer) = buffers.first() else {
        return Err(engine_err!(SOURCE, "Upload command buffer allocation returned nothing"));
    };

    // SAFETY: live device
    let fence = match unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) } {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { device.free_command_buffers(pool, &buffers) };
            return Err(engine_err!(SOURCE, "Failed to create upload fence: {:?}", e));
        }
    };

    let result = record_copy(device, command_buffer, staging, image, extent).and_then(|()| {
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        // SAFETY: recorded buffer, unsignaled fence
        unsafe {
            device
                .queue_submit(queue, &[submit], fence)
                .map_err(|e| engine_err!(SOURCE, "Failed to submit texture upload: {:?}", e))?;
            device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| engine_err!(SOURCE, "Failed to wait for texture upload: {:?}", e))
        }
    });

    if result.is_err() {
        // A failed wait may leave the copy pending
        // SAFETY: live device
        unsafe { device.device_wait_idle() }.ok();
    }
    // SAFETY: the upload has completed
    unsafe {
        device.destroy_fence(fence, None);
        device.free_command_buffers(pool, &buffers);
    }
    result
}

/// Copy `pixels` into the texture and leave it in shader-read layout
pub(crate) fn upload_texture(
    state: &mut DeviceState,
    queue: vk::Queue,
    pool: vk::CommandPool,
    texture: &TextureAllocation,
    pixels: &[u8],
) -> Result<()> {
    let (staging, allocation) = create_staging_buffer(state, pixels)?;
    let result = submit_copy(
        &state.device,
        queue,
        pool,
        staging,
        vk::Image::from_raw(texture.image.raw()),
        texture.extent,
    );
    // SAFETY: the copy finished or the device is idle
    unsafe { state.device.destroy_buffer(staging, None) };
    state.free_allocation(allocation);
    result
}
