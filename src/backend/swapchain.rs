// Swapchain - Window presentation
//
// Two-phase setup: `init_surface` binds the native surface and locks in the
// color format and presenting queue family; `create` builds the swapchain
// and may be called again on every resize. Recreation hands the previous
// swapchain to the new one and only tears the old generation down after the
// new handle exists, so an in-flight present never references freed views.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use std::sync::Arc;

use super::{Device, Instance};

/// Preferred color formats, in order; falls back to whatever the surface
/// reports first
const PREFERRED_SURFACE_FORMATS: [vk::Format; 3] = [
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::A2B10G10R10_UNORM_PACK32,
];

pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: khr::Surface,
    swapchain_loader: khr::Swapchain,
    surface: vk::SurfaceKHR,
    handle: vk::SwapchainKHR,

    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    /// Incremented on every recreation
    pub generation: u64,
    /// Queue family that supports both graphics and presentation
    pub present_family: u32,
}

impl Swapchain {
    /// Bind a native surface and pick the color format and presenting
    /// queue family. Called exactly once; `create` does the rest.
    pub fn init_surface<W>(device: Arc<Device>, window: &W) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let instance = &device.instance;
        let surface_loader = khr::Surface::new(instance.entry(), &instance.handle);
        let swapchain_loader = khr::Swapchain::new(&instance.handle, &device.handle);

        let surface = create_surface(instance, display_handle, window_handle)?;

        // First family that can do both graphics and presentation; scanning
        // in family order, first match wins
        let mut present_family = None;
        for (index, family) in device.physical.queue_families.iter().enumerate() {
            let supports_present = unsafe {
                surface_loader.get_physical_device_surface_support(
                    device.physical.handle,
                    index as u32,
                    surface,
                )
            }?;

            if supports_present && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                present_family = Some(index as u32);
                break;
            }
        }
        let present_family =
            present_family.context("No queue family supports both graphics and presentation")?;

        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device.physical.handle, surface)
        }?;
        let surface_format =
            choose_surface_format(&formats).context("Surface reports no formats")?;

        log::info!(
            "Surface format: {:?} / {:?}",
            surface_format.format,
            surface_format.color_space
        );

        Ok(Self {
            device,
            surface_loader,
            swapchain_loader,
            surface,
            handle: vk::SwapchainKHR::null(),
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent: vk::Extent2D::default(),
            image_count: 0,
            images: Vec::new(),
            image_views: Vec::new(),
            generation: 0,
            present_family,
        })
    }

    /// Build (or rebuild) the swapchain.
    ///
    /// Safe to call repeatedly; the live swapchain is handed to the new one
    /// as `old_swapchain` and destroyed afterwards. Returns the extent that
    /// was actually used: when the surface dictates its own size the
    /// caller's width/height are overridden.
    pub fn create(&mut self, width: u32, height: u32, vsync: bool) -> Result<vk::Extent2D> {
        let old_swapchain = self.handle;

        let caps = unsafe {
            self.surface_loader.get_physical_device_surface_capabilities(
                self.device.physical.handle,
                self.surface,
            )
        }?;
        let present_modes = unsafe {
            self.surface_loader.get_physical_device_surface_present_modes(
                self.device.physical.handle,
                self.surface,
            )
        }?;

        let extent = resolve_extent(&caps, width, height);
        let present_mode = choose_present_mode(&present_modes, vsync);
        let image_count = choose_image_count(&caps);
        let pre_transform = choose_pre_transform(&caps);
        let composite_alpha = choose_composite_alpha(&caps);

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            image_count,
            present_mode
        );

        // Add transfer usage when the surface supports it (screenshots, blits)
        let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        if caps.supported_usage_flags.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if caps.supported_usage_flags.contains(vk::ImageUsageFlags::TRANSFER_DST) {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.format)
            .image_color_space(self.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // The previous generation is torn down only now that the new
        // swapchain exists; the GPU may still be presenting from it until
        // this point
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                for view in self.image_views.drain(..) {
                    self.device.handle.destroy_image_view(view, None);
                }
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }

        self.handle = handle;
        self.extent = extent;
        self.generation += 1;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(handle) }?;
        self.image_count = self.images.len() as u32;

        self.image_views = self
            .images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe {
                    self.device
                        .handle
                        .create_image_view(&view_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!("Created swapchain generation {}", self.generation);

        Ok(extent)
    }

    /// Acquire the next presentable image.
    ///
    /// `Ok(None)` means the swapchain is out of date and must be recreated;
    /// that is an expected resize trigger, not a failure.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> Result<Option<(u32, bool)>> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Some((index, suboptimal))),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Present a rendered image. Returns true when the swapchain should be
    /// recreated (suboptimal or out of date).
    pub fn queue_present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle.destroy_image_view(view, None);
            }
            if self.handle != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.handle, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

fn create_surface(
    instance: &Instance,
    display_handle: RawDisplayHandle,
    window_handle: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    match (display_handle, window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0)
                as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            let loader = khr::Win32Surface::new(instance.entry(), &instance.handle);
            unsafe { loader.create_win32_surface(&create_info, None) }
                .context("Failed to create Win32 surface")
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .map(|d| d.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy as _)
                .window(window.window);
            let loader = khr::XlibSurface::new(instance.entry(), &instance.handle);
            unsafe { loader.create_xlib_surface(&create_info, None) }
                .context("Failed to create Xlib surface")
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr() as _)
                .surface(window.surface.as_ptr() as _);
            let loader = khr::WaylandSurface::new(instance.entry(), &instance.handle);
            unsafe { loader.create_wayland_surface(&create_info, None) }
                .context("Failed to create Wayland surface")
        }
        _ => anyhow::bail!("Unsupported window handle type"),
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    for preferred in PREFERRED_SURFACE_FORMATS {
        if let Some(found) = formats.iter().find(|f| f.format == preferred) {
            return Some(*found);
        }
    }
    formats.first().copied()
}

fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    vsync: bool,
) -> vk::PresentModeKHR {
    // FIFO is the only mode Vulkan guarantees; it is also the vsync mode
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else if available.contains(&vk::PresentModeKHR::IMMEDIATE) {
        vk::PresentModeKHR::IMMEDIATE
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn resolve_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    // All-bits-set width means the surface leaves the size to us;
    // anything else is the surface dictating its own size
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired_width,
            height: desired_height,
        }
    } else {
        caps.current_extent
    }
}

fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    // max_image_count == 0 means no upper limit
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

fn choose_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    let priority = [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ];

    priority
        .into_iter()
        .find(|&mode| caps.supported_composite_alpha.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(f: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: f,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn surface_format_prefers_rgba8() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::R8G8B8A8_UNORM),
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn surface_format_takes_packed_10bit_when_8bit_missing() {
        let formats = [
            format(vk::Format::R5G6B5_UNORM_PACK16),
            format(vk::Format::A2B10G10R10_UNORM_PACK32),
        ];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::A2B10G10R10_UNORM_PACK32);
    }

    #[test]
    fn surface_format_falls_back_to_first_reported() {
        let formats = [format(vk::Format::R5G6B5_UNORM_PACK16)];

        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R5G6B5_UNORM_PACK16);
    }

    #[test]
    fn surface_format_is_none_for_empty_list() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn vsync_forces_fifo() {
        let available = [
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ];

        assert_eq!(
            choose_present_mode(&available, true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn no_vsync_prefers_mailbox() {
        let available = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];

        assert_eq!(
            choose_present_mode(&available, false),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn no_vsync_takes_immediate_without_mailbox() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(
            choose_present_mode(&available, false),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn no_vsync_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO];

        assert_eq!(
            choose_present_mode(&available, false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn undefined_extent_uses_caller_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            ..Default::default()
        };

        let extent = resolve_extent(&caps, 1280, 720);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn fixed_extent_overrides_caller_size() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = resolve_extent(&caps, 1280, 720);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn image_count_is_min_plus_one() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };

        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_clamps_to_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };

        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_unclamped_when_no_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..Default::default()
        };

        assert_eq!(choose_image_count(&caps), 5);
    }

    #[test]
    fn pre_transform_prefers_identity() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY
                | vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };

        assert_eq!(
            choose_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );
    }

    #[test]
    fn pre_transform_falls_back_to_current() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };

        assert_eq!(
            choose_pre_transform(&caps),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn composite_alpha_follows_priority_order() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
                | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            ..Default::default()
        };

        assert_eq!(
            choose_composite_alpha(&caps),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
    }

    #[test]
    fn composite_alpha_prefers_opaque() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE
                | vk::CompositeAlphaFlagsKHR::INHERIT,
            ..Default::default()
        };

        assert_eq!(
            choose_composite_alpha(&caps),
            vk::CompositeAlphaFlagsKHR::OPAQUE
        );
    }
}
