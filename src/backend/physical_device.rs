// Physical device (adapter) selection and capability queries
//
// Everything downstream (queue resolution, device creation, swapchain
// format checks) reads from the snapshot taken here; nothing re-queries
// the adapter after selection.

use anyhow::Result;
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

use super::Instance;

/// Capability snapshot of one adapter. Immutable once queried.
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub supported_extensions: HashSet<String>,
}

impl PhysicalDeviceInfo {
    /// Query all capability tables for one adapter.
    ///
    /// Panics if the adapter reports zero queue families; that is a driver
    /// invariant, not a recoverable condition. Extension enumeration is
    /// best-effort: an empty set is valid output.
    pub fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let features = unsafe { instance.get_physical_device_features(handle) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(handle) };

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(handle) };
        assert!(
            !queue_families.is_empty(),
            "adapter reports zero queue families"
        );

        let supported_extensions = unsafe {
            instance.enumerate_device_extension_properties(handle)
        }
        .map(|extensions| {
            extensions
                .iter()
                .map(|ext| {
                    unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                        .to_string_lossy()
                        .into_owned()
                })
                .collect()
        })
        .unwrap_or_default();

        Self {
            handle,
            properties,
            features,
            memory_properties,
            queue_families,
            supported_extensions,
        }
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.supported_extensions.contains(name)
    }
}

/// Pick the best adapter, preferring discrete over integrated GPUs.
pub fn select_physical_device(instance: &Instance) -> Result<PhysicalDeviceInfo> {
    let devices = unsafe { instance.handle.enumerate_physical_devices() }?;

    if devices.is_empty() {
        anyhow::bail!("No Vulkan-capable GPU found");
    }

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        let props = unsafe { instance.handle.get_physical_device_properties(device) };

        let score = match props.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            _ => 1,
        };

        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }
    }

    let device = best_device.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))?;
    let info = PhysicalDeviceInfo::query(&instance.handle, device);

    log::info!("Selected GPU: {}", info.name());
    log::info!(
        "API Version: {}.{}.{}",
        vk::api_version_major(info.properties.api_version),
        vk::api_version_minor(info.properties.api_version),
        vk::api_version_patch(info.properties.api_version)
    );

    Ok(info)
}

// Depth formats ordered by precision; the stencil list is restricted to
// formats that carry a stencil aspect.
const DEPTH_FORMATS: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

const DEPTH_STENCIL_FORMATS: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
];

pub fn depth_format_candidates(requires_stencil: bool) -> &'static [vk::Format] {
    if requires_stencil {
        &DEPTH_STENCIL_FORMATS
    } else {
        &DEPTH_FORMATS
    }
}

/// First depth format the adapter supports for optimal-tiling attachments.
pub fn supported_depth_format(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    requires_stencil: bool,
) -> Option<vk::Format> {
    depth_format_candidates(requires_stencil)
        .iter()
        .copied()
        .find(|&format| {
            let props =
                unsafe { instance.get_physical_device_format_properties(device, format) };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_candidates_prefer_highest_precision() {
        assert_eq!(
            depth_format_candidates(false)[0],
            vk::Format::D32_SFLOAT_S8_UINT
        );
        assert_eq!(
            depth_format_candidates(true)[0],
            vk::Format::D32_SFLOAT_S8_UINT
        );
    }

    #[test]
    fn stencil_candidates_all_carry_stencil() {
        let stencil_only = depth_format_candidates(true);
        assert!(!stencil_only.contains(&vk::Format::D32_SFLOAT));
        assert!(!stencil_only.contains(&vk::Format::D16_UNORM));
    }

    #[test]
    fn stencil_candidates_are_a_subset_of_depth_candidates() {
        let all = depth_format_candidates(false);
        for format in depth_format_candidates(true) {
            assert!(all.contains(format));
        }
    }
}
