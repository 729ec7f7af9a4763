// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics
// Bootstrap order: instance -> physical_device -> queue -> device ->
// swapchain -> sync; upload is invoked on demand

pub mod buffer;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod queue;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use buffer::Buffer;
pub use device::Device;
pub use instance::Instance;
pub use swapchain::Swapchain;
