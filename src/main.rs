// =============================================================================
// HOST APPLICATION HARNESS
// =============================================================================
//
// Thin winit front-end for the vk-backend library. Creates the window,
// boots the backend, seeds a static triangle mesh through the staged-upload
// path, and keeps the swapchain in step with window resizes. Frame
// recording and drawing live with the host renderer, not here.

use anyhow::Result;
use glam::Vec3;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

use vk_backend::{config_name, Config, Renderer, Vertex};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging();
    log::info!("Starting {} renderer backend", config_name());
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    /// Set when the window has zero size; resizes are deferred until it
    /// becomes visible again
    is_minimized: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            is_minimized: false,
        }
    }

    fn init_backend(&mut self, window: &Window) -> Result<()> {
        let mut renderer = Renderer::init(self.config.clone(), window)?;

        // Static geometry for the host renderer, copied to device-local
        // memory before the first frame
        let (vertices, indices) = triangle_mesh();
        renderer.upload_mesh(&vertices, &indices)?;

        self.renderer = Some(renderer);
        Ok(())
    }
}

/// One triangle, interleaved position and color
fn triangle_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        Vertex {
            position: Vec3::new(1.0, 1.0, 0.0),
            color: Vec3::new(1.0, 0.0, 0.0),
        },
        Vertex {
            position: Vec3::new(-1.0, 1.0, 0.0),
            color: Vec3::new(0.0, 1.0, 0.0),
        },
        Vertex {
            position: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::new(0.0, 0.0, 1.0),
        },
    ];
    let indices = vec![0, 1, 2];

    (vertices, indices)
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_backend(&window) {
            log::error!("Failed to initialize backend: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                    return;
                }
                if self.is_minimized {
                    log::debug!("Window restored");
                }
                self.is_minimized = false;

                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.recreate_swapchain(size.width, size.height) {
                        log::error!("Failed to recreate swapchain: {:?}", e);
                        event_loop.exit();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{Key, NamedKey};

                if event.state.is_pressed() && event.logical_key == Key::Named(NamedKey::Escape) {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }
}
