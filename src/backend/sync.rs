// Frame synchronization
//
// Fixed round-robin pool of frame slots. Each slot carries the semaphores
// ordering GPU queue operations (acquire -> render -> present), the fence
// gating CPU reuse of the slot, and the slot's command buffer. A slot's
// command buffer must not be re-recorded until its fence reads signaled.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::Device;

/// Frames the CPU may prepare ahead of the GPU (double buffering)
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound for any fence wait, in nanoseconds. Hitting it means the
/// GPU hung; waits are never retried.
pub const DEFAULT_FENCE_TIMEOUT: u64 = 100_000_000_000;

/// Per-frame synchronization and command resources
pub struct FrameSlot {
    /// Signaled when the acquired image is ready for color output
    pub present_complete: vk::Semaphore,
    /// Signaled when the slot's submission finishes; presentation waits on it
    pub render_complete: vk::Semaphore,
    pub fence: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

pub struct FrameSync {
    device: Arc<Device>,
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FrameSync {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);

        let command_buffers = unsafe { device.handle.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate frame command buffers")?;

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Fences start signaled so the first wait on a slot does not block
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| -> Result<FrameSlot> {
                unsafe {
                    Ok(FrameSlot {
                        present_complete: device.handle.create_semaphore(&semaphore_info, None)?,
                        render_complete: device.handle.create_semaphore(&semaphore_info, None)?,
                        fence: device.handle.create_fence(&fence_info, None)?,
                        command_buffer,
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            device,
            slots,
            current: 0,
        })
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    pub fn frame_index(&self) -> usize {
        self.current
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Block until the GPU is done with the current slot. Must complete
    /// before the slot's command buffer is touched again.
    pub fn wait_current(&self) -> Result<()> {
        let fence = self.slots[self.current].fence;
        unsafe {
            self.device
                .handle
                .wait_for_fences(&[fence], true, DEFAULT_FENCE_TIMEOUT)
        }
        .context("Timed out waiting for frame fence")?;
        Ok(())
    }

    /// Re-arm the current slot's fence; the next queue submission using the
    /// slot signals it again.
    pub fn reset_current(&self) -> Result<()> {
        let fence = self.slots[self.current].fence;
        unsafe { self.device.handle.reset_fences(&[fence]) }
            .context("Failed to reset frame fence")?;
        Ok(())
    }

    /// Step to the next slot, wrapping at the pool size.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            for slot in &self.slots {
                self.device.handle.destroy_semaphore(slot.present_complete, None);
                self.device.handle.destroy_semaphore(slot.render_complete, None);
                self.device.handle.destroy_fence(slot.fence, None);
            }

            let command_buffers: Vec<vk::CommandBuffer> =
                self.slots.iter().map(|slot| slot.command_buffer).collect();
            self.device
                .handle
                .free_command_buffers(self.device.command_pool, &command_buffers);
        }
    }
}
