// Logical device - queues, command pool, memory allocator
//
// Built from a resolved queue-family set and a negotiated extension list.
// The device, its queues, and the command pool are created once and are
// read-only for every consumer afterwards.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::os::raw::c_char;
use std::sync::Arc;

use super::physical_device::PhysicalDeviceInfo;
use super::queue::QueueFamilyIndices;
use super::Instance;

/// Policy for device extensions that the adapter does not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtensionPolicy {
    /// Log the missing extension and continue with device creation
    #[default]
    Warn,
    /// Treat the missing extension as a bootstrap failure
    Fail,
}

/// Everything the device factory needs to know up front.
pub struct DeviceRequest {
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<String>,
    pub queue_types: vk::QueueFlags,
    pub with_swapchain: bool,
    pub extension_policy: ExtensionPolicy,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            features: vk::PhysicalDeviceFeatures::default(),
            extensions: Vec::new(),
            queue_types: vk::QueueFlags::GRAPHICS,
            with_swapchain: true,
            extension_policy: ExtensionPolicy::default(),
        }
    }
}

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub handle: ash::Device,
    pub physical: PhysicalDeviceInfo,
    pub instance: Arc<Instance>,

    // Queue handles; compute/transfer may alias graphics
    pub graphics_queue: vk::Queue,
    pub compute_queue: vk::Queue,
    pub transfer_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,

    /// Shared pool on the graphics family; buffers from it may be reset
    /// individually
    pub command_pool: vk::CommandPool,

    allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl Device {
    pub fn create(
        instance: &Arc<Instance>,
        physical: PhysicalDeviceInfo,
        request: &DeviceRequest,
    ) -> Result<Arc<Self>> {
        // No extended feature chain; the plain feature pointer is used
        Self::create_with_features2::<vk::PhysicalDeviceVulkan13Features>(
            instance, physical, request, None,
        )
    }

    /// Create the device, optionally threading an extended-feature struct.
    ///
    /// When `next_chain` is given it is attached through a
    /// `PhysicalDeviceFeatures2` and the plain feature pointer stays unset;
    /// the two forms are mutually exclusive.
    pub fn create_with_features2<T: vk::ExtendsPhysicalDeviceFeatures2>(
        instance: &Arc<Instance>,
        physical: PhysicalDeviceInfo,
        request: &DeviceRequest,
        next_chain: Option<&mut T>,
    ) -> Result<Arc<Self>> {
        let indices = QueueFamilyIndices::resolve(request.queue_types, &physical.queue_families);
        log::info!(
            "Queue families: graphics={} compute={} transfer={}",
            indices.graphics,
            indices.compute,
            indices.transfer
        );

        // One queue per distinct requested family, priority 0.0
        let priorities = [0.0f32];
        let mut queue_infos: Vec<vk::DeviceQueueCreateInfo> = Vec::new();
        for family in [indices.graphics, indices.compute, indices.transfer] {
            if queue_infos.iter().any(|info| info.queue_family_index == family) {
                continue;
            }
            queue_infos.push(
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build(),
            );
        }

        let mut extensions: Vec<CString> = request
            .extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .context("Invalid device extension name")?;
        if request.with_swapchain {
            extensions.push(khr::Swapchain::name().to_owned());
        }

        for name in unsupported_extensions(&extensions, &physical.supported_extensions) {
            match request.extension_policy {
                ExtensionPolicy::Warn => {
                    log::warn!("Device extension {} is not supported, enabling anyway", name);
                }
                ExtensionPolicy::Fail => {
                    anyhow::bail!("Device extension {} is not supported", name);
                }
            }
        }

        let extension_ptrs: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs);

        let mut features2;
        match next_chain {
            Some(chain) => {
                features2 = vk::PhysicalDeviceFeatures2::builder()
                    .features(request.features)
                    .push_next(chain);
                create_info = create_info.push_next(&mut features2);
            }
            None => {
                create_info = create_info.enabled_features(&request.features);
            }
        }

        let handle = unsafe {
            instance.handle.create_device(physical.handle, &create_info, None)
        }
        .context("Failed to create logical device")?;

        let graphics_queue = unsafe { handle.get_device_queue(indices.graphics, 0) };
        let compute_queue = unsafe { handle.get_device_queue(indices.compute, 0) };
        let transfer_queue = unsafe { handle.get_device_queue(indices.transfer, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(indices.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { handle.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle.clone(),
            device: handle.clone(),
            physical_device: physical.handle,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        Ok(Arc::new(Self {
            handle,
            physical,
            instance: instance.clone(),
            graphics_queue,
            compute_queue,
            transfer_queue,
            queue_families: indices,
            command_pool,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        }))
    }

    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Wait for all queues to drain (e.g., before teardown or resize)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.handle.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying logical device...");

        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.handle.destroy_command_pool(self.command_pool, None);
            ManuallyDrop::drop(&mut self.allocator);
            self.handle.destroy_device(None);
        }
    }
}

fn unsupported_extensions(requested: &[CString], supported: &HashSet<String>) -> Vec<String> {
    requested
        .iter()
        .map(|ext| ext.to_string_lossy().into_owned())
        .filter(|name| !supported.contains(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extensions_filters_the_supported_set() {
        let requested = vec![
            CString::new("VK_KHR_swapchain").unwrap(),
            CString::new("VK_EXT_mesh_shader").unwrap(),
        ];
        let supported: HashSet<String> = ["VK_KHR_swapchain"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            unsupported_extensions(&requested, &supported),
            vec!["VK_EXT_mesh_shader".to_string()]
        );
    }

    #[test]
    fn all_supported_means_no_warnings() {
        let requested = vec![CString::new("VK_KHR_swapchain").unwrap()];
        let supported: HashSet<String> = ["VK_KHR_swapchain"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert!(unsupported_extensions(&requested, &supported).is_empty());
    }

    #[test]
    fn extension_policy_defaults_to_warn() {
        assert_eq!(ExtensionPolicy::default(), ExtensionPolicy::Warn);
    }
}
