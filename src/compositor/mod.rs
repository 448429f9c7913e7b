//! Video compositor
//!
//! Renders the screen full-frame with an optional camera overlay into a single
//! output video track. The render task ticks at display cadence and re-reads the
//! overlay settings every frame, so updates land on the next rendered frame.

pub mod canvas;
pub mod overlay;

pub use canvas::{Canvas, ClipPath};
pub use overlay::{
    overlay_rect, OverlayPosition, OverlaySettings, OverlaySettingsPatch, OverlayShape,
    OverlaySize, Rect,
};

use crate::capture::source::{CaptureSource, MediaTrack, VideoFrame};
use crate::config::RecorderConfig;
use crate::utils::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Overlay input and how to draw it
struct OverlayState {
    settings: OverlaySettings,
    track: Option<MediaTrack>,
}

struct CompositorShared {
    primary: MediaTrack,
    overlay: Mutex<OverlayState>,
    canvas: Mutex<Canvas>,
    output: MediaTrack,
    margin: u32,
    running: AtomicBool,
    stop: Notify,
    frames: AtomicU64,
}

impl CompositorShared {
    /// Draw one frame. Returns `false` once the compositor has been cleaned up.
    fn render_frame(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }

        let (settings, overlay_track) = {
            let overlay = self.overlay.lock();
            (overlay.settings, overlay.track.clone())
        };

        let frame = {
            let mut canvas = self.canvas.lock();
            // Without a fresh screen frame the previous contents are repeated
            if let Some(screen) = self.primary.latest_frame() {
                canvas.draw_fill(&screen);
            }

            if let Some(camera) = overlay_track.as_ref().and_then(MediaTrack::latest_frame) {
                let rect = overlay_rect(
                    canvas.width(),
                    canvas.height(),
                    camera.width(),
                    camera.height(),
                    &settings,
                    self.margin,
                );
                canvas.draw_scaled(&camera, rect, ClipPath::for_shape(settings.shape, &rect));
            }
            canvas.to_frame()
        };

        self.output.push_frame(frame);
        self.frames.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Composites the screen and an optional camera into one live video track
pub struct Compositor {
    shared: Arc<CompositorShared>,
    task: Option<JoinHandle<()>>,
}

impl Compositor {
    /// Build a compositor and start its render task.
    ///
    /// Waits (bounded by `readyTimeoutMs`) for the first frame of each input so the
    /// canvas geometry is known. The canvas takes the screen's native size, falling
    /// back to `defaultCanvas` when the screen reports none.
    pub async fn new(
        primary: &CaptureSource,
        overlay: Option<&CaptureSource>,
        settings: OverlaySettings,
        config: &RecorderConfig,
    ) -> RecordingResult<Self> {
        let primary_track = primary.video_track().cloned().ok_or_else(|| {
            RecordingError::CompositorInitFailed(format!(
                "{} source '{}' has no video track",
                primary.kind(),
                primary.label()
            ))
        })?;

        let first_frame = match tokio::time::timeout(config.ready_timeout(), primary_track.first_frame()).await {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                return Err(RecordingError::CompositorInitFailed(
                    "screen track ended before producing a frame".to_string(),
                ))
            }
            Err(_) => {
                tracing::warn!(
                    "Screen produced no frame within {:?}, using reported dimensions",
                    config.ready_timeout()
                );
                None
            }
        };

        let overlay_track = match overlay.and_then(CaptureSource::video_track) {
            Some(track) => {
                Self::wait_for_overlay(track, config.ready_timeout()).await;
                Some(track.clone())
            }
            None => None,
        };

        let reported = primary_track.settings();
        let (width, height) = match (reported.width, reported.height, first_frame.as_ref()) {
            (Some(w), Some(h), _) if w > 0 && h > 0 => (w, h),
            (_, _, Some(frame)) => (frame.width(), frame.height()),
            _ => (config.default_canvas.width, config.default_canvas.height),
        };

        tracing::info!(
            "Compositor canvas {}x{} (overlay: {})",
            width,
            height,
            overlay_track.is_some()
        );

        let shared = Arc::new(CompositorShared {
            primary: primary_track,
            overlay: Mutex::new(OverlayState {
                settings,
                track: overlay_track,
            }),
            canvas: Mutex::new(Canvas::new(width, height)),
            output: MediaTrack::video("Composited Output", width, height),
            margin: config.overlay_margin,
            running: AtomicBool::new(true),
            stop: Notify::new(),
            frames: AtomicU64::new(0),
        });

        // Output is never empty, even before the first tick
        shared.render_frame();

        let task = tokio::spawn(Self::render_loop(shared.clone(), config.render_interval()));

        Ok(Self {
            shared,
            task: Some(task),
        })
    }

    async fn wait_for_overlay(track: &MediaTrack, timeout: Duration) {
        match tokio::time::timeout(timeout, track.first_frame()).await {
            Ok(Some(frame)) => {
                tracing::debug!("Overlay ready at {}x{}", frame.width(), frame.height())
            }
            Ok(None) => tracing::warn!("Overlay track ended before producing a frame"),
            Err(_) => tracing::warn!("Overlay not ready yet, it will appear once frames arrive"),
        }
    }

    async fn render_loop(shared: Arc<CompositorShared>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shared.stop.notified() => break,
            }
            if !shared.render_frame() {
                break;
            }
        }
        tracing::debug!(
            "Render loop stopped after {} frames",
            shared.frames.load(Ordering::Relaxed)
        );
    }

    /// Render one frame immediately
    pub fn render_frame(&self) -> bool {
        self.shared.render_frame()
    }

    /// Merge new overlay settings; the next frame uses them
    pub fn update_settings(&self, patch: &OverlaySettingsPatch) {
        self.shared.overlay.lock().settings.apply(patch);
    }

    pub fn settings(&self) -> OverlaySettings {
        self.shared.overlay.lock().settings
    }

    /// Swap the overlay input without restarting the render task
    pub fn set_overlay(&self, track: Option<MediaTrack>) {
        let mut overlay = self.shared.overlay.lock();
        tracing::info!(
            "Compositor overlay {}",
            if track.is_some() { "attached" } else { "removed" }
        );
        overlay.track = track;
    }

    pub fn has_overlay(&self) -> bool {
        self.shared.overlay.lock().track.is_some()
    }

    /// The composited video track
    pub fn output_track(&self) -> &MediaTrack {
        &self.shared.output
    }

    /// Canvas dimensions, fixed at construction
    pub fn dimensions(&self) -> (u32, u32) {
        let canvas = self.shared.canvas.lock();
        (canvas.width(), canvas.height())
    }

    /// Most recently rendered frame
    pub fn current_frame(&self) -> Option<VideoFrame> {
        self.shared.output.latest_frame()
    }

    pub fn rendered_frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stop the render task and end the output track. Idempotent.
    pub fn cleanup(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stop.notify_one();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.overlay.lock().track = None;
        self.shared.output.stop();
        tracing::debug!("Compositor cleaned up");
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::SourceKind;

    const SCREEN: [u8; 4] = [0, 0, 255, 255];
    const CAMERA: [u8; 4] = [255, 0, 0, 255];

    fn screen(width: u32, height: u32) -> CaptureSource {
        let track = MediaTrack::video("screen", width, height);
        track.push_frame(VideoFrame::solid(width, height, SCREEN));
        CaptureSource::new(SourceKind::Screen, "screen", vec![track])
    }

    fn camera() -> CaptureSource {
        let track = MediaTrack::video("camera", 40, 30);
        track.push_frame(VideoFrame::solid(40, 30, CAMERA));
        CaptureSource::new(SourceKind::Camera, "camera", vec![track])
    }

    fn rectangle_at(position: OverlayPosition) -> OverlaySettings {
        OverlaySettings {
            position,
            size: OverlaySize::Large,
            shape: OverlayShape::Rectangle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_canvas_takes_screen_dimensions() {
        let screen = screen(320, 180);
        let compositor = Compositor::new(&screen, None, OverlaySettings::default(), &RecorderConfig::default())
            .await
            .unwrap();

        assert_eq!(compositor.dimensions(), (320, 180));
        let frame = compositor.current_frame().unwrap();
        assert_eq!(frame.pixel(0, 0), Some(SCREEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_without_video_track() {
        let audio_only = CaptureSource::new(
            SourceKind::Screen,
            "tab audio",
            vec![MediaTrack::audio("tab audio", 48_000, 2)],
        );

        let result = Compositor::new(&audio_only, None, OverlaySettings::default(), &RecorderConfig::default()).await;
        assert!(matches!(result, Err(RecordingError::CompositorInitFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_default_canvas() {
        let track = MediaTrack::video("screen", 0, 0);
        let screen = CaptureSource::new(SourceKind::Screen, "screen", vec![track]);
        let config = RecorderConfig {
            ready_timeout_ms: 50,
            ..RecorderConfig::default()
        };

        let compositor = Compositor::new(&screen, None, OverlaySettings::default(), &config)
            .await
            .unwrap();
        assert_eq!(compositor.dimensions(), (1920, 1080));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_moves_on_next_frame() {
        let screen = screen(200, 100);
        let camera = camera();
        let compositor = Compositor::new(
            &screen,
            Some(&camera),
            rectangle_at(OverlayPosition::BottomRight),
            &RecorderConfig::default(),
        )
        .await
        .unwrap();

        let frame = compositor.current_frame().unwrap();
        assert_eq!(frame.pixel(200 - 17, 100 - 17), Some(CAMERA));
        assert_eq!(frame.pixel(16, 16), Some(SCREEN));

        compositor.update_settings(&OverlaySettingsPatch::position(OverlayPosition::TopLeft));
        assert!(compositor.render_frame());

        let frame = compositor.current_frame().unwrap();
        assert_eq!(frame.pixel(16, 16), Some(CAMERA));
        assert_eq!(frame.pixel(200 - 17, 100 - 17), Some(SCREEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_can_be_removed_and_added() {
        let screen = screen(200, 100);
        let camera = camera();
        let compositor = Compositor::new(
            &screen,
            None,
            rectangle_at(OverlayPosition::TopLeft),
            &RecorderConfig::default(),
        )
        .await
        .unwrap();
        assert!(!compositor.has_overlay());

        compositor.set_overlay(camera.video_track().cloned());
        compositor.render_frame();
        assert_eq!(compositor.current_frame().unwrap().pixel(16, 16), Some(CAMERA));

        compositor.set_overlay(None);
        compositor.render_frame();
        assert_eq!(compositor.current_frame().unwrap().pixel(16, 16), Some(SCREEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_loop_ticks_until_cleanup() {
        let screen = screen(32, 18);
        let mut compositor = Compositor::new(&screen, None, OverlaySettings::default(), &RecorderConfig::default())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let rendered = compositor.rendered_frames();
        assert!(rendered >= 25, "only {rendered} frames rendered");

        compositor.cleanup();
        compositor.cleanup();
        assert!(!compositor.is_running());
        assert!(!compositor.output_track().is_live());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(compositor.rendered_frames(), rendered);
        assert!(!compositor.render_frame());
    }
}
