//! Recording coordinator
//!
//! Drives one capture session at a time through
//! `Idle -> Acquiring -> Recording/Paused -> Finalizing -> Idle`, with `Error -> Idle`
//! on fatal failures. All resources of a session live in a [`RecordingSession`]
//! and are released by its single teardown routine.

use super::chunks::Artifact;
use super::encoder::{EncodableStream, EncoderEvent, EncoderFactory};
use super::session::RecordingSession;
use super::state::{
    AudioRoutingPatch, AudioRoutingSettings, CaptureWarning, RecordingEvent, RecordingState,
    SessionPhase,
};
use crate::capture::source::{MediaTrack, SourceKind, TrackState, VideoFrame};
use crate::capture::traits::CaptureBackend;
use crate::compositor::{Compositor, OverlaySettings, OverlaySettingsPatch};
use crate::config::RecorderConfig;
use crate::mixer::AudioMixer;
use crate::utils::error::{RecordingError, RecordingResult};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

/// Receives the finished artifact and its duration in whole seconds
pub type CompletionCallback = Arc<dyn Fn(Artifact, u64) + Send + Sync>;

struct Inner {
    phase: SessionPhase,
    session: Option<RecordingSession>,
    /// Session currently being acquired
    pending: Option<Uuid>,
    warnings: Vec<CaptureWarning>,
}

impl Inner {
    fn snapshot(&self) -> RecordingState {
        let session = self.session.as_ref();
        RecordingState {
            is_recording: self.phase.is_live(),
            is_paused: self.phase == SessionPhase::Paused,
            duration_seconds: session.map(|s| s.displayed_seconds).unwrap_or(0),
            started_at: session.and_then(|s| s.started_at),
        }
    }

    fn current(&mut self, id: Uuid) -> Option<&mut RecordingSession> {
        self.session.as_mut().filter(|s| s.id == id)
    }
}

struct Shared {
    config: RecorderConfig,
    inner: Mutex<Inner>,
    overlay: RwLock<OverlaySettings>,
    state_tx: watch::Sender<RecordingState>,
    event_tx: broadcast::Sender<RecordingEvent>,
    on_complete: RwLock<Option<CompletionCallback>>,
}

impl Shared {
    fn emit(&self, event: RecordingEvent) {
        let _ = self.event_tx.send(event);
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.snapshot());
    }

    fn set_phase(&self, inner: &mut Inner, phase: SessionPhase) {
        if inner.phase != phase {
            tracing::debug!("Session phase {:?} -> {:?}", inner.phase, phase);
            inner.phase = phase;
        }
        self.publish(inner);
    }

    fn warn(&self, warning: CaptureWarning) {
        tracing::warn!("{} disabled: {}", warning.source, warning.message);
        self.inner.lock().warnings.push(warning.clone());
        self.emit(RecordingEvent::Warning(warning));
    }

    /// Fails with `SessionTornDown` once the start identified by `id` was abandoned
    fn ensure_current(&self, id: Uuid) -> RecordingResult<()> {
        if self.inner.lock().pending == Some(id) {
            Ok(())
        } else {
            Err(RecordingError::SessionTornDown)
        }
    }

    /// Make a fully built session the active one and start its background tasks
    fn install(self: &Arc<Self>, session: RecordingSession, driver: DriverInputs) -> RecordingResult<()> {
        let id = session.id;
        let mut inner = self.inner.lock();
        if inner.pending != Some(id) {
            drop(inner);
            drop(session);
            return Err(RecordingError::SessionTornDown);
        }
        inner.pending = None;
        let session = inner.session.insert(session);
        // Spawned under the lock so the first event already sees the installed session
        session.add_task(tokio::spawn(self.clone().drive(id, driver.events, driver.screen)));
        session.add_task(tokio::spawn(self.clone().run_clock(id, driver.started)));
        self.set_phase(&mut inner, SessionPhase::Recording);
        drop(inner);

        tracing::info!("Recording started");
        self.emit(RecordingEvent::Started);
        Ok(())
    }

    /// Roll back a failed start and report the error
    fn fail_start(&self, id: Uuid, mut session: RecordingSession, error: RecordingError) -> RecordingError {
        session.teardown();

        let mut inner = self.inner.lock();
        if inner.pending != Some(id) {
            // A teardown already settled the phase
            return error;
        }
        inner.pending = None;
        self.set_phase(&mut inner, SessionPhase::Error);
        self.set_phase(&mut inner, SessionPhase::Idle);
        drop(inner);

        match error {
            RecordingError::UserCancelled | RecordingError::SessionTornDown => {
                tracing::info!("Recording not started: {}", error);
            }
            _ => {
                tracing::error!("Failed to start recording: {}", error);
                self.emit(RecordingEvent::Error(error.to_string()));
            }
        }
        error
    }

    /// Ask the encoder of session `id` to deliver its last chunk
    fn request_stop(&self, id: Uuid) -> RecordingResult<()> {
        let mut inner = self.inner.lock();
        if !inner.phase.is_live() {
            return match inner.phase {
                SessionPhase::Finalizing => Ok(()),
                _ => Err(RecordingError::NotRecording),
            };
        }
        let Some(session) = inner.current(id) else {
            return Err(RecordingError::NotRecording);
        };
        if let Some(encoder) = session.encoder.as_mut() {
            encoder.stop();
        }
        self.set_phase(&mut inner, SessionPhase::Finalizing);
        drop(inner);

        tracing::info!("Stopping recording");
        self.emit(RecordingEvent::Finalizing);
        Ok(())
    }

    fn push_chunk(&self, id: Uuid, chunk: Vec<u8>) {
        if let Some(session) = self.inner.lock().current(id) {
            session.chunks.push(chunk);
        }
    }

    /// Encoder delivered its last chunk: assemble, release, hand over
    fn finalize(&self, id: Uuid) {
        let mut session = {
            let mut inner = self.inner.lock();
            if inner.current(id).is_none() {
                return;
            }
            let Some(session) = inner.session.take() else {
                return;
            };
            self.set_phase(&mut inner, SessionPhase::Idle);
            session
        };

        let duration_seconds = session.elapsed_seconds();
        let mime_type = session
            .encoder
            .as_ref()
            .map(|e| e.mime_type().to_string())
            .unwrap_or_else(|| self.config.mime_type.clone());
        let artifact = session.chunks.assemble(&mime_type);
        let chunk_count = session.chunks.len();
        session.teardown();

        tracing::info!(
            "Recording stopped. Duration: {}s, {} bytes in {} chunks",
            duration_seconds,
            artifact.size(),
            chunk_count
        );
        self.emit(RecordingEvent::Stopped { duration_seconds });

        let callback = self.on_complete.read().clone();
        match callback {
            Some(callback) => callback(artifact, duration_seconds),
            None => tracing::warn!("No completion handler registered, artifact dropped"),
        }
    }

    /// Fatal failure while live: tear everything down and tell the caller what was lost
    fn fail(&self, id: Uuid, error: RecordingError) {
        let mut session = {
            let mut inner = self.inner.lock();
            if inner.current(id).is_none() {
                return;
            }
            let Some(session) = inner.session.take() else {
                return;
            };
            self.set_phase(&mut inner, SessionPhase::Error);
            session
        };

        let discarded_chunks = session.chunks.len();
        let discarded_bytes = session.chunks.total_bytes();
        session.teardown();

        {
            let mut inner = self.inner.lock();
            if inner.phase == SessionPhase::Error && inner.session.is_none() {
                self.set_phase(&mut inner, SessionPhase::Idle);
            }
        }

        tracing::error!(
            "Recording failed: {} ({} chunks, {} bytes discarded)",
            error,
            discarded_chunks,
            discarded_bytes
        );
        self.emit(RecordingEvent::Error(format!(
            "{error}; {discarded_chunks} recorded chunk(s) ({discarded_bytes} bytes) were discarded"
        )));
    }

    /// One displayed-duration tick. Returns `false` once session `id` is gone.
    fn tick(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        let recording = inner.phase == SessionPhase::Recording;
        let Some(session) = inner.current(id) else {
            return false;
        };
        if !recording {
            return true;
        }
        session.displayed_seconds += 1;
        let seconds = session.displayed_seconds;
        self.publish(&inner);
        drop(inner);

        self.emit(RecordingEvent::Progress(seconds));
        true
    }

    /// Routes encoder events and watches for the screen share ending externally
    async fn drive(
        self: Arc<Self>,
        id: Uuid,
        mut events: mpsc::UnboundedReceiver<EncoderEvent>,
        screen: MediaTrack,
    ) {
        let ended = screen.ended();
        tokio::pin!(ended);
        let mut watching = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(EncoderEvent::Chunk(chunk)) => self.push_chunk(id, chunk),
                    Some(EncoderEvent::Stopped) => {
                        self.finalize(id);
                        return;
                    }
                    Some(EncoderEvent::Error(message)) => {
                        self.fail(id, RecordingError::EncoderFailure(message));
                        return;
                    }
                    None => {
                        self.fail(
                            id,
                            RecordingError::EncoderFailure("encoder event channel closed".to_string()),
                        );
                        return;
                    }
                },
                state = &mut ended, if watching => {
                    watching = false;
                    if state == TrackState::Ended {
                        tracing::info!("Screen share ended externally");
                        let _ = self.request_stop(id);
                    }
                }
            }
        }
    }

    async fn run_clock(self: Arc<Self>, id: Uuid, started: Instant) {
        let second = Duration::from_secs(1);
        let mut ticker = tokio::time::interval_at(started + second, second);
        loop {
            ticker.tick().await;
            if !self.tick(id) {
                break;
            }
        }
    }
}

/// What the session driver needs once the encoder is running
struct DriverInputs {
    events: mpsc::UnboundedReceiver<EncoderEvent>,
    screen: MediaTrack,
    started: Instant,
}

/// Resets the phase if a start future is dropped mid-acquisition
struct PendingStart<'a> {
    shared: &'a Shared,
    id: Uuid,
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if inner.pending == Some(self.id) {
            inner.pending = None;
            self.shared.set_phase(&mut inner, SessionPhase::Idle);
        }
    }
}

/// Orchestrates capture sources, compositor, mixer and encoder for one session at a time
pub struct RecordingCoordinator {
    backend: Arc<dyn CaptureBackend>,
    encoders: Arc<dyn EncoderFactory>,
    audio: RwLock<AudioRoutingSettings>,
    camera_enabled: RwLock<bool>,
    camera_device: RwLock<Option<String>>,
    shared: Arc<Shared>,
}

impl RecordingCoordinator {
    /// Create a new recording coordinator
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        encoders: Arc<dyn EncoderFactory>,
        config: RecorderConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (state_tx, _) = watch::channel(RecordingState::default());
        Self {
            backend,
            encoders,
            audio: RwLock::new(AudioRoutingSettings::default()),
            camera_enabled: RwLock::new(false),
            camera_device: RwLock::new(None),
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    phase: SessionPhase::Idle,
                    session: None,
                    pending: None,
                    warnings: Vec::new(),
                }),
                overlay: RwLock::new(OverlaySettings::default()),
                state_tx,
                event_tx,
                on_complete: RwLock::new(None),
            }),
        }
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Observe the recording state; updated on every transition and once per second
    pub fn watch_state(&self) -> watch::Receiver<RecordingState> {
        self.shared.state_tx.subscribe()
    }

    pub fn state(&self) -> RecordingState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.inner.lock().phase
    }

    /// Non-fatal warnings of the current or last session
    pub fn warnings(&self) -> Vec<CaptureWarning> {
        self.shared.inner.lock().warnings.clone()
    }

    /// Register the consumer of finished recordings
    pub fn on_recording_complete(&self, callback: impl Fn(Artifact, u64) + Send + Sync + 'static) {
        *self.shared.on_complete.write() = Some(Arc::new(callback));
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.shared.config
    }

    pub fn audio_settings(&self) -> AudioRoutingSettings {
        self.audio.read().clone()
    }

    pub fn camera_settings(&self) -> OverlaySettings {
        *self.shared.overlay.read()
    }

    pub fn camera_enabled(&self) -> bool {
        *self.camera_enabled.read()
    }

    /// Camera used by the next acquisition; `None` picks the default device
    pub fn set_camera_device(&self, device_id: Option<String>) {
        *self.camera_device.write() = device_id;
    }

    /// Latest composited frame, for live preview
    pub fn preview_frame(&self) -> Option<VideoFrame> {
        let inner = self.shared.inner.lock();
        inner
            .session
            .as_ref()
            .and_then(|s| s.compositor.as_ref())
            .and_then(Compositor::current_frame)
    }

    /// Start recording
    ///
    /// Resolves once the encoder is running. On failure every source acquired so far
    /// has already been released.
    pub async fn start(&self) -> RecordingResult<()> {
        self.shared.config.validate()?;

        let id = {
            let mut inner = self.shared.inner.lock();
            if inner.phase != SessionPhase::Idle {
                return Err(RecordingError::AlreadyRecording);
            }
            let id = Uuid::new_v4();
            inner.pending = Some(id);
            inner.warnings.clear();
            self.shared.set_phase(&mut inner, SessionPhase::Acquiring);
            id
        };
        tracing::info!("Starting recording session {}", id);

        let _pending = PendingStart {
            shared: &self.shared,
            id,
        };
        let mut session = RecordingSession::new(id);
        let built = self.build(&mut session).await;
        match built {
            Ok(driver) => self.shared.install(session, driver),
            Err(error) => Err(self.shared.fail_start(id, session, error)),
        }
    }

    /// Acquire sources and assemble the pipeline, strictly in order
    async fn build(&self, session: &mut RecordingSession) -> RecordingResult<DriverInputs> {
        let id = session.id;
        let config = &self.shared.config;
        let audio = self.audio_settings();
        let camera_enabled = self.camera_enabled();
        let camera_device = self.camera_device.read().clone();

        let screen = self.backend.acquire_screen(audio.system_audio_enabled).await?;
        let screen_has_audio = screen.has_audio();
        session.screen = Some(screen);
        self.shared.ensure_current(id)?;

        if audio.system_audio_enabled && !screen_has_audio {
            self.shared.warn(CaptureWarning::new(
                SourceKind::SystemAudio,
                "SYSTEM_AUDIO_UNAVAILABLE",
                "the selected screen did not share audio",
            ));
        }

        if audio.microphone_enabled {
            let microphone = self
                .backend
                .acquire_microphone(audio.microphone_device_id.as_deref())
                .await;
            match microphone {
                Ok(source) => session.microphone = Some(source),
                Err(e) if e.is_recoverable() => {
                    self.shared.warn(CaptureWarning::from_error(SourceKind::Microphone, &e))
                }
                Err(e) => return Err(e),
            }
            self.shared.ensure_current(id)?;
        }

        if camera_enabled {
            match self.backend.acquire_camera(camera_device.as_deref()).await {
                Ok(source) => session.camera = Some(source),
                Err(e) if e.is_recoverable() => {
                    self.shared.warn(CaptureWarning::from_error(SourceKind::Camera, &e))
                }
                Err(e) => return Err(e),
            }
            self.shared.ensure_current(id)?;
        }

        let inputs: Vec<MediaTrack> = [&session.screen, &session.microphone]
            .into_iter()
            .flatten()
            .flat_map(|source| source.audio_tracks().cloned())
            .collect();
        session.mixer = Some(AudioMixer::new(&inputs, config)?);

        let screen = session.screen.as_ref().ok_or(RecordingError::SessionTornDown)?;
        let screen_track = screen.video_track().cloned();
        let overlay = self.camera_settings();
        let compositor =
            Compositor::new(screen, session.camera.as_ref(), overlay, config).await?;
        session.compositor = Some(compositor);
        self.shared.ensure_current(id)?;

        let screen_track = screen_track.ok_or_else(|| {
            RecordingError::CompositorInitFailed("screen has no video track".to_string())
        })?;
        let (video, audio_out) = match (&session.compositor, &session.mixer) {
            (Some(compositor), Some(mixer)) => {
                (compositor.output_track().clone(), mixer.output_track().clone())
            }
            _ => return Err(RecordingError::SessionTornDown),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stream = EncodableStream {
            video,
            audio: audio_out,
        };
        let mut encoder = self
            .encoders
            .create(stream, config, events_tx)
            .map_err(into_encoder_failure)?;
        encoder
            .start(config.chunk_interval())
            .map_err(into_encoder_failure)?;
        session.encoder = Some(encoder);

        let started = Instant::now();
        session.started = Some(started);
        session.started_at = Some(Utc::now());
        Ok(DriverInputs {
            events: events_rx,
            screen: screen_track,
            started,
        })
    }

    /// Stop recording. The artifact is delivered once the encoder flushes.
    pub fn stop(&self) -> RecordingResult<()> {
        let id = self.live_session_id()?;
        self.shared.request_stop(id)
    }

    /// Pause recording. No-op when already paused.
    pub fn pause(&self) -> RecordingResult<()> {
        self.switch_pause(true)
    }

    /// Resume recording. No-op when already recording.
    pub fn resume(&self) -> RecordingResult<()> {
        self.switch_pause(false)
    }

    fn switch_pause(&self, pause: bool) -> RecordingResult<()> {
        let (from, to, event) = if pause {
            (SessionPhase::Recording, SessionPhase::Paused, RecordingEvent::Paused)
        } else {
            (SessionPhase::Paused, SessionPhase::Recording, RecordingEvent::Resumed)
        };

        let mut inner = self.shared.inner.lock();
        if inner.phase == to {
            return Ok(());
        }
        if inner.phase != from {
            return Err(RecordingError::NotRecording);
        }
        if let Some(encoder) = inner.session.as_mut().and_then(|s| s.encoder.as_mut()) {
            if pause {
                encoder.pause();
            } else {
                encoder.resume();
            }
        }
        self.shared.set_phase(&mut inner, to);
        drop(inner);

        tracing::info!("{} recording", if pause { "Paused" } else { "Resumed" });
        self.shared.emit(event);
        Ok(())
    }

    /// Turn the camera overlay on or off. While recording this acquires or releases the
    /// camera without interrupting output. Returns whether the camera is now enabled.
    pub async fn toggle_camera(&self) -> RecordingResult<bool> {
        let detached = {
            let mut inner = self.shared.inner.lock();
            if !inner.phase.is_live() {
                drop(inner);
                let mut enabled = self.camera_enabled.write();
                *enabled = !*enabled;
                return Ok(*enabled);
            }
            match inner.session.as_mut() {
                Some(session) if session.camera.is_some() => {
                    if let Some(compositor) = &session.compositor {
                        compositor.set_overlay(None);
                    }
                    session.camera.take()
                }
                Some(_) => None,
                None => return Err(RecordingError::NotRecording),
            }
        };

        if let Some(mut camera) = detached {
            camera.release();
            *self.camera_enabled.write() = false;
            tracing::info!("Camera disabled");
            return Ok(false);
        }

        let id = self.live_session_id()?;
        let device = self.camera_device.read().clone();
        let camera = match self.backend.acquire_camera(device.as_deref()).await {
            Ok(camera) => camera,
            Err(e) if e.is_recoverable() => {
                self.shared.warn(CaptureWarning::from_error(SourceKind::Camera, &e));
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let mut camera = Some(camera);
        let installed = {
            let mut inner = self.shared.inner.lock();
            let live = inner.phase.is_live();
            match inner.current(id) {
                Some(session) if live && session.camera.is_none() => {
                    if let (Some(compositor), Some(source)) = (&session.compositor, &camera) {
                        compositor.set_overlay(source.video_track().cloned());
                    }
                    session.camera = camera.take();
                    Some(true)
                }
                // Another toggle attached a camera first
                Some(_) => Some(false),
                None => None,
            }
        };
        if let Some(mut unused) = camera.take() {
            unused.release();
        }

        match installed {
            Some(true) => {
                *self.camera_enabled.write() = true;
                tracing::info!("Camera enabled");
                Ok(true)
            }
            Some(false) => Ok(self.camera_enabled()),
            None => Err(RecordingError::SessionTornDown),
        }
    }

    /// Merge overlay settings; applied to the next rendered frame
    pub fn update_camera_settings(&self, patch: &OverlaySettingsPatch) {
        self.shared.overlay.write().apply(patch);
        let inner = self.shared.inner.lock();
        if let Some(compositor) = inner.session.as_ref().and_then(|s| s.compositor.as_ref()) {
            compositor.update_settings(patch);
        }
    }

    /// Change audio routing. Only allowed while idle.
    pub fn update_audio_settings(&self, patch: &AudioRoutingPatch) -> RecordingResult<()> {
        if self.phase() != SessionPhase::Idle {
            return Err(RecordingError::SettingsLocked);
        }
        self.audio.write().apply(patch);
        Ok(())
    }

    /// Discard whatever session exists, from any state, releasing everything
    pub fn shutdown(&self) {
        let session = {
            let mut inner = self.shared.inner.lock();
            if inner.phase == SessionPhase::Idle && inner.session.is_none() {
                return;
            }
            inner.pending = None;
            let session = inner.session.take();
            self.shared.set_phase(&mut inner, SessionPhase::Idle);
            session
        };
        if let Some(mut session) = session {
            session.teardown();
        }
        tracing::info!("Recording coordinator shut down");
    }

    fn live_session_id(&self) -> RecordingResult<Uuid> {
        let inner = self.shared.inner.lock();
        match inner.session.as_ref() {
            Some(session) if inner.phase.is_live() => Ok(session.id),
            _ => Err(RecordingError::NotRecording),
        }
    }
}

impl Drop for RecordingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn into_encoder_failure(error: RecordingError) -> RecordingError {
    match error {
        RecordingError::EncoderFailure(_) => error,
        other => RecordingError::EncoderFailure(other.to_string()),
    }
}
