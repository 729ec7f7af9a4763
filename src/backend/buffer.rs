// GPU buffer with scoped ownership
//
// The buffer handle and its allocation live and die together: dropping the
// wrapper returns the memory to the allocator and destroys the buffer, on
// every exit path including bootstrap failures.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::Device;

pub struct Buffer {
    device: Arc<Device>,
    pub handle: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
}

impl Buffer {
    pub fn new(
        device: Arc<Device>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.handle.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { device.handle.get_buffer_memory_requirements(handle) };

        let allocation = device
            .allocator()
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .context("Failed to allocate buffer memory")?;

        unsafe {
            device
                .handle
                .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
        }
        .context("Failed to bind buffer memory")?;

        Ok(Self {
            device,
            handle,
            allocation: Some(allocation),
            size,
        })
    }

    /// Host mapping of the allocation; present only for CPU-visible
    /// memory locations
    pub fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation.as_ref().and_then(|alloc| alloc.mapped_ptr())
    }

    /// Copy bytes into a host-mapped buffer.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        anyhow::ensure!(
            data.len() as vk::DeviceSize <= self.size,
            "write of {} bytes exceeds buffer size {}",
            data.len(),
            self.size
        );

        let ptr = self
            .mapped_ptr()
            .context("Buffer memory is not host mapped")?;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr().cast::<u8>(), data.len());
        }

        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().lock().free(allocation) {
                log::warn!("Failed to free buffer memory: {}", e);
            }
        }

        unsafe {
            self.device.handle.destroy_buffer(self.handle, None);
        }
    }
}
