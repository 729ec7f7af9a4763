// vk-backend - Vulkan device and resource bootstrap for a real-time renderer
//
// Owns the hard part of bringing a renderer up: adapter and queue-family
// selection, logical-device and command-pool creation, swapchain creation
// and safe recreation on resize, double-buffered frame synchronization,
// and blocking staged uploads into device-local memory. Rendering commands
// and scene representation are the host's business.
//
// Lifecycle surface consumed by the host:
// - `Renderer::init` runs the whole bootstrap and returns the context
// - dropping the `Renderer` is the shutdown path
// - `config_name` reports the fixed backend identifier

pub mod backend;
pub mod config;
pub mod context;

pub use backend::buffer::Buffer;
pub use backend::device::{Device, DeviceRequest, ExtensionPolicy};
pub use backend::instance::Instance;
pub use backend::physical_device::PhysicalDeviceInfo;
pub use backend::queue::QueueFamilyIndices;
pub use backend::swapchain::Swapchain;
pub use backend::sync::{FrameSlot, FrameSync, MAX_FRAMES_IN_FLIGHT};
pub use backend::upload::upload_to_device;
pub use config::Config;
pub use context::{Mesh, Renderer, Vertex};

/// Fixed backend identifier reported to the host application
pub fn config_name() -> &'static str {
    context::CONFIG_NAME
}
