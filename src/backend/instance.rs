// Vulkan instance - library loading, layers, debug plumbing
//
// Responsibilities:
// - Load the Vulkan library
// - Instance creation with validation layers
// - Debug messenger routing validation output into `log`

use anyhow::{Context, Result};
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr;
use ash::{vk, Entry};
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with automatic cleanup
pub struct Instance {
    pub handle: ash::Instance,
    entry: Entry,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    /// Instance-level extensions reported by the loader
    pub supported_extensions: HashSet<String>,
}

impl Instance {
    /// Create the Vulkan instance.
    ///
    /// Requested extensions that the loader does not support are logged and
    /// skipped; the bootstrap proceeds without them.
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        requested_extensions: &[String],
    ) -> Result<Arc<Self>> {
        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Query extensions supported by the loader
        let supported_extensions: HashSet<String> = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?
            .iter()
            .map(|ext| {
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        // Step 3: Build the extension list
        let mut extensions: Vec<CString> = vec![khr::Surface::name().to_owned()];

        #[cfg(target_os = "windows")]
        {
            extensions.push(khr::Win32Surface::name().to_owned());
        }

        // Both Xlib and Wayland surfaces may be available; request whichever
        // the loader reports
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            for ext in [khr::XlibSurface::name(), khr::WaylandSurface::name()] {
                if supported_extensions.contains(&ext.to_string_lossy().into_owned()) {
                    extensions.push(ext.to_owned());
                }
            }
        }

        for name in requested_extensions {
            if supported_extensions.contains(name) {
                extensions.push(CString::new(name.as_str())
                    .context("Invalid instance extension name")?);
            } else {
                log::warn!("Requested instance extension {} is not supported, skipping", name);
            }
        }

        // Step 4: Validation layer, only if actually present
        let mut validation = enable_validation;
        if validation {
            let layers = entry
                .enumerate_instance_layer_properties()
                .context("Failed to enumerate instance layers")?;
            let present = layers.iter().any(|layer| {
                (unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }) == VALIDATION_LAYER
            });
            if !present {
                log::warn!("Validation layer {:?} not present, validation is disabled", VALIDATION_LAYER);
                validation = false;
            }
        }
        let layer_names = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };
        if validation {
            extensions.push(DebugUtils::name().to_owned());
        }

        // Step 5: Create the instance
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("vk-backend")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extension_ptrs: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_names);

        let handle = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        // Step 6: Setup debug messenger if validation enabled
        let debug_utils = if validation {
            Some(Self::setup_debug_messenger(&entry, &handle)?)
        } else {
            None
        };

        Ok(Arc::new(Self {
            handle,
            entry,
            debug_utils,
            supported_extensions,
        }))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn supports_extension(&self, name: &str) -> bool {
        self.supported_extensions.contains(name)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
        }?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.handle.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
