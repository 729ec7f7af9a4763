// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

use crate::backend::device::ExtensionPolicy;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Renderer".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// FIFO presentation when true; mailbox/immediate otherwise
    pub vsync: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self { vsync: true }
    }
}

/// Device and queue settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Request a dedicated compute queue family
    pub compute_queue: bool,
    /// Request a dedicated transfer queue family
    pub transfer_queue: bool,
    /// Restrict the depth-format search to stencil-capable formats
    pub requires_stencil: bool,
    pub instance_extensions: Vec<String>,
    pub extensions: Vec<String>,
    /// "warn" keeps going when a requested device extension is missing,
    /// "fail" aborts the bootstrap
    pub unsupported_extension_policy: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            compute_queue: false,
            transfer_queue: false,
            requires_stencil: false,
            instance_extensions: Vec::new(),
            extensions: Vec::new(),
            unsupported_extension_policy: "warn".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}

impl DeviceConfig {
    /// Requested queue capabilities as Vulkan flags
    pub fn queue_types(&self) -> vk::QueueFlags {
        let mut flags = vk::QueueFlags::GRAPHICS;
        if self.compute_queue {
            flags |= vk::QueueFlags::COMPUTE;
        }
        if self.transfer_queue {
            flags |= vk::QueueFlags::TRANSFER;
        }
        flags
    }

    /// Get the unsupported-extension policy as an enum
    pub fn extension_policy(&self) -> ExtensionPolicy {
        match self.unsupported_extension_policy.to_lowercase().as_str() {
            "warn" => ExtensionPolicy::Warn,
            "fail" => ExtensionPolicy::Fail,
            _ => {
                log::warn!(
                    "Unknown extension policy '{}', defaulting to warn",
                    self.unsupported_extension_policy
                );
                ExtensionPolicy::Warn
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(config.graphics.vsync);
        assert!(!config.device.compute_queue);
        assert!(config.debug.validation_layers);
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 1920
            height = 1080

            [graphics]
            vsync = false

            [device]
            compute_queue = true
            extensions = ["VK_EXT_mesh_shader"]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1920);
        assert!(!config.graphics.vsync);
        assert!(config.device.compute_queue);
        assert_eq!(config.device.extensions, vec!["VK_EXT_mesh_shader"]);
        // Untouched sections keep their defaults
        assert_eq!(config.window.title, "Vulkan Renderer");
        assert!(!config.window.fullscreen);
    }

    #[test]
    fn queue_types_follow_requested_capabilities() {
        let mut device = DeviceConfig::default();
        assert_eq!(device.queue_types(), vk::QueueFlags::GRAPHICS);

        device.compute_queue = true;
        device.transfer_queue = true;
        assert_eq!(
            device.queue_types(),
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
        );
    }

    #[test]
    fn extension_policy_parses_known_values() {
        let mut device = DeviceConfig::default();
        assert_eq!(device.extension_policy(), ExtensionPolicy::Warn);

        device.unsupported_extension_policy = "fail".to_string();
        assert_eq!(device.extension_policy(), ExtensionPolicy::Fail);

        device.unsupported_extension_policy = "FAIL".to_string();
        assert_eq!(device.extension_policy(), ExtensionPolicy::Fail);
    }

    #[test]
    fn unknown_extension_policy_defaults_to_warn() {
        let device = DeviceConfig {
            unsupported_extension_policy: "explode".to_string(),
            ..Default::default()
        };

        assert_eq!(device.extension_policy(), ExtensionPolicy::Warn);
    }
}
