// One-shot staged uploads
//
// Blocking staging-buffer to device-local copy, used to seed static
// vertex/index/uniform data at startup. Each call stalls the submitting
// thread until the GPU finishes; per-frame streaming would need a
// different, pipelined path.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::sync::DEFAULT_FENCE_TIMEOUT;
use super::{Buffer, Device};

/// Copy `data` into a new device-local buffer with the given usage.
///
/// The staging buffer, one-shot command buffer, and transfer fence are all
/// destroyed before this returns, signaled or not.
pub fn upload_to_device(
    device: &Arc<Device>,
    data: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<Buffer> {
    anyhow::ensure!(!data.is_empty(), "upload payload is empty");
    let size = data.len() as vk::DeviceSize;

    // Host-visible staging buffer, persistently mapped
    let mut staging = Buffer::new(
        device.clone(),
        "staging",
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    staging.write(data)?;

    let buffer = Buffer::new(
        device.clone(),
        name,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
    )?;

    // One-shot command buffer from the shared pool
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(device.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = unsafe { device.handle.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate upload command buffer")?[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    let region = vk::BufferCopy::builder().size(size).build();

    unsafe {
        device.handle.begin_command_buffer(command_buffer, &begin_info)?;
        device
            .handle
            .cmd_copy_buffer(command_buffer, staging.handle, buffer.handle, &[region]);
        device.handle.end_command_buffer(command_buffer)?;
    }

    // Fence starts unsignaled; the submit signals it on completion
    let fence_info = vk::FenceCreateInfo::builder();
    let fence = unsafe { device.handle.create_fence(&fence_info, None) }
        .context("Failed to create upload fence")?;

    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

    let wait_result = unsafe {
        device
            .handle
            .queue_submit(device.graphics_queue, &[submit_info.build()], fence)?;
        device
            .handle
            .wait_for_fences(&[fence], true, DEFAULT_FENCE_TIMEOUT)
    };

    // Transient resources are torn down synchronously, signaled or not
    unsafe {
        device.handle.destroy_fence(fence, None);
        device
            .handle
            .free_command_buffers(device.command_pool, &command_buffers);
    }
    drop(staging);

    wait_result.context("Timed out waiting for upload fence")?;

    log::debug!("Uploaded {} bytes to {}", data.len(), name);

    Ok(buffer)
}
