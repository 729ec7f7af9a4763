// Renderer context - owns every GPU handle for the backend
//
// The whole bootstrap runs inside `init` and either returns a fully working
// context or an error with nothing left behind; the scoped wrappers clean
// up after themselves on early-failure paths. Teardown is the strict
// reverse of creation, driven by field order.

use anyhow::{Context as _, Result};
use ash::vk;
use glam::Vec3;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

use crate::backend::device::{Device, DeviceRequest};
use crate::backend::physical_device::{select_physical_device, supported_depth_format};
use crate::backend::sync::FrameSync;
use crate::backend::upload::upload_to_device;
use crate::backend::{Buffer, Instance, Swapchain};
use crate::config::Config;

/// Fixed identifier reported to the host application
pub const CONFIG_NAME: &str = "vulkan";

/// Interleaved position + color, matching the default vertex layout
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
}

/// Device-local geometry seeded through the staged-upload path
pub struct Mesh {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

/// All backend state. Field order is teardown order: frame sync, mesh
/// buffers, swapchain and surface, device, instance.
pub struct Renderer {
    config: Config,
    frames: FrameSync,
    mesh: Option<Mesh>,
    swapchain: Swapchain,
    depth_format: vk::Format,
    device: Arc<Device>,
    instance: Arc<Instance>,
}

impl Renderer {
    /// Run the full bootstrap: instance, adapter, queues, device, surface,
    /// swapchain, frame synchronization.
    pub fn init<W>(config: Config, window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        log::info!("Initializing {} backend", CONFIG_NAME);

        // Validation only in debug builds, and only when configured
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;

        let instance = Instance::new(
            &config.window.title,
            enable_validation,
            &config.device.instance_extensions,
        )?;

        let physical = select_physical_device(&instance)?;

        let depth_format = supported_depth_format(
            &instance.handle,
            physical.handle,
            config.device.requires_stencil,
        )
        .context("No supported depth format")?;
        log::info!("Depth format: {:?}", depth_format);

        let request = DeviceRequest {
            features: vk::PhysicalDeviceFeatures::default(),
            extensions: config.device.extensions.clone(),
            queue_types: config.device.queue_types(),
            with_swapchain: true,
            extension_policy: config.device.extension_policy(),
        };
        let device = Device::create(&instance, physical, &request)?;

        let mut swapchain = Swapchain::init_surface(device.clone(), window)?;
        let extent = swapchain.create(
            config.window.width,
            config.window.height,
            config.graphics.vsync,
        )?;
        log::info!("Swapchain extent: {}x{}", extent.width, extent.height);

        let frames = FrameSync::new(device.clone())?;

        log::info!("{} backend initialized", CONFIG_NAME);

        Ok(Self {
            config,
            frames,
            mesh: None,
            swapchain,
            depth_format,
            device,
            instance,
        })
    }

    /// Seed device-local vertex and index buffers from host memory. Blocks
    /// until both transfers complete.
    pub fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<()> {
        let vertex_buffer = upload_to_device(
            &self.device,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "vertices",
        )?;
        let index_buffer = upload_to_device(
            &self.device,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            "indices",
        )?;

        self.mesh = Some(Mesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        });

        Ok(())
    }

    /// Rebuild the swapchain for a new framebuffer size. The caller must
    /// not submit frames concurrently with this.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<vk::Extent2D> {
        self.device.wait_idle()?;
        self.swapchain
            .create(width, height, self.config.graphics.vsync)
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn frames(&self) -> &FrameSync {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut FrameSync {
        &mut self.frames
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down {} backend", CONFIG_NAME);

        // The GPU must be idle before any handle goes away; the fields then
        // drop in declaration order
        let _ = self.device.wait_idle();
    }
}
