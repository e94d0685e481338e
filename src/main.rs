// =============================================================================
// LUMEN DEMO - Clears the window every frame through the Vulkan backend
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input, resize)                       │
// │    └── Renderer (frame metrics, draw_frame)                     │
// │          └── VulkanBackend (device, swapchain, frame loop)      │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

use lumen::config::Config;
use lumen::platform::FrameClock;
use lumen::{RenderPacket, Renderer, VulkanBackend};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Lumen");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging with optional file output for validation errors
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    // RUST_LOG wins over the configured level
    Builder::from_env(Env::default().default_filter_or(config.debug.log_level.as_str())).init();

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            let _ = writeln!(file, "=== Lumen Log ===");
            let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
            let _ = writeln!(file);
        }
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Renderer<VulkanBackend>,
    clock: FrameClock,
    is_fullscreen: bool,
    last_title_update: f64,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let renderer = Renderer::new(VulkanBackend::new(config.backend_config()));
        Self {
            config,
            window: None,
            renderer,
            clock: FrameClock::new(),
            is_fullscreen,
            last_title_update: 0.0,
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;
            if self.is_fullscreen {
                // Enter fullscreen (use current monitor)
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
            // The Resized event that follows drives swapchain recreation
        }
    }

    /// Show FPS in the title once per second
    fn update_title(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let metrics = self.renderer.metrics();
        if metrics.total_time - self.last_title_update < 1.0 {
            return;
        }
        self.last_title_update = metrics.total_time;

        if let Some(ref window) = self.window {
            let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
            let frame_ms = if metrics.fps > 0.0 { 1000.0 / metrics.fps } else { 0.0 };
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms) [{}]",
                self.config.window.title, metrics.fps, frame_ms, mode
            ));
        }
    }

    fn shutdown(&mut self) {
        self.renderer.shutdown();
    }
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
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        if let Err(e) = self
            .renderer
            .initialize(window.as_ref(), size.width, size.height)
        {
            log::error!("Failed to initialize Vulkan: {}", e);
            event_loop.exit();
            return;
        }

        self.clock = FrameClock::new();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.renderer.on_resized(size.width, size.height);
            }

            WindowEvent::RedrawRequested => {
                let packet = RenderPacket {
                    delta_time: self.clock.tick(),
                };
                self.renderer.draw_frame(&packet);
                self.update_title();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown();
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws for maximum FPS.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // The backend must be gone before the window it presents to
        self.shutdown();
        log::info!("Cleanup complete");
    }
}
