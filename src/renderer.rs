// Renderer frontend
//
// Owns a backend and drives it once per frame. Timing metrics are updated
// before the backend is asked for a frame, so a skipped frame (resize,
// minimised window, out-of-date swapchain) still keeps the clock continuous.

use crate::backend::error::BackendResult;
use crate::platform::SurfaceProvider;

/// Per-frame input from the application.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderPacket {
    /// Seconds since the previous frame.
    pub delta_time: f32,
}

/// Backend contract seen by the frontend.
pub trait RendererBackend {
    fn initialize(
        &mut self,
        surface: &dyn SurfaceProvider,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    fn shutdown(&mut self);

    fn on_resized(&mut self, width: u32, height: u32);

    /// Open a frame. `false` means nothing should be drawn this tick.
    fn begin_frame(&mut self, delta_time: f32) -> bool;

    /// Close, submit and present the frame opened by `begin_frame`.
    fn end_frame(&mut self, delta_time: f32) -> bool;
}

/// Frame counters and a once-per-second FPS estimate.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameMetrics {
    /// Frames requested, including skipped ones.
    pub frame_number: u64,
    pub frames_drawn: u64,
    pub total_time: f64,
    pub fps: f32,
    window_time: f32,
    window_frames: u32,
}

impl FrameMetrics {
    pub fn update(&mut self, delta_time: f32) {
        self.frame_number += 1;
        self.total_time += f64::from(delta_time);
        self.window_time += delta_time;
        self.window_frames += 1;

        if self.window_time >= 1.0 {
            self.fps = self.window_frames as f32 / self.window_time;
            self.window_time = 0.0;
            self.window_frames = 0;
        }
    }
}

pub struct Renderer<B: RendererBackend> {
    backend: B,
    metrics: FrameMetrics,
}

impl<B: RendererBackend> Renderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            metrics: FrameMetrics::default(),
        }
    }

    pub fn initialize(
        &mut self,
        surface: &dyn SurfaceProvider,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        self.backend.initialize(surface, width, height)
    }

    pub fn shutdown(&mut self) {
        self.backend.shutdown();
    }

    pub fn on_resized(&mut self, width: u32, height: u32) {
        self.backend.on_resized(width, height);
    }

    pub fn metrics(&self) -> &FrameMetrics {
        &self.metrics
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Draw one frame with no draw calls.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> bool {
        self.draw_frame_with(packet, |_| {})
    }

    /// Draw one frame, calling `record` while the render pass is open.
    ///
    /// Returns `false` when the frame was skipped or could not be presented.
    pub fn draw_frame_with(&mut self, packet: &RenderPacket, record: impl FnOnce(&mut B)) -> bool {
        self.metrics.update(packet.delta_time);

        if !self.backend.begin_frame(packet.delta_time) {
            return false;
        }

        record(&mut self.backend);

        if !self.backend.end_frame(packet.delta_time) {
            log::error!("end_frame failed; frame {} dropped", self.metrics.frame_number);
            return false;
        }

        self.metrics.frames_drawn += 1;
        true
    }
}
