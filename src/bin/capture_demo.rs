//! Records a short session from the synthetic backend and writes the artifact
//! plus a poster frame.
//!
//! Usage: `capture-demo [OUTPUT_DIR] [SECONDS]`

use anyhow::{Context, Result};
use open_screenstudio_capture::capture::{Resolution, SyntheticBackend, SyntheticConfig};
use open_screenstudio_capture::compositor::{OverlayPosition, OverlaySettingsPatch};
use open_screenstudio_capture::recorder::StreamEncoderFactory;
use open_screenstudio_capture::{init_tracing, RecorderConfig, RecordingCoordinator};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let output_dir = PathBuf::from(args.next().unwrap_or_else(|| "capture-demo".to_string()));
    let seconds: u64 = match args.next() {
        Some(value) => value.parse().context("duration must be a whole number of seconds")?,
        None => 3,
    };
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let backend = Arc::new(SyntheticBackend::new(SyntheticConfig {
        screen_size: Resolution {
            width: 160,
            height: 90,
        },
        camera_size: Resolution {
            width: 48,
            height: 36,
        },
        ..SyntheticConfig::default()
    }));
    let recorder = RecordingCoordinator::new(
        backend.clone(),
        Arc::new(StreamEncoderFactory),
        RecorderConfig::default(),
    );

    let (done_tx, done_rx) = oneshot::channel();
    let done_tx = Mutex::new(Some(done_tx));
    recorder.on_recording_complete(move |artifact, duration| {
        if let Some(tx) = done_tx.lock().take() {
            let _ = tx.send((artifact, duration));
        }
    });

    recorder.toggle_camera().await?;
    recorder.start().await?;

    let frame_interval = recorder.config().frame_interval();
    let pump = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frame_interval);
        let mut tick = 0;
        loop {
            ticker.tick().await;
            backend.pump(tick, frame_interval);
            tick += 1;
        }
    });

    let half = Duration::from_millis(seconds * 500);
    tokio::time::sleep(half).await;
    recorder.update_camera_settings(&OverlaySettingsPatch::position(OverlayPosition::TopLeft));
    tokio::time::sleep(half).await;

    let poster = recorder.preview_frame();
    recorder.stop()?;
    let (artifact, duration) = done_rx
        .await
        .context("recording finished without an artifact")?;
    pump.abort();

    let info = artifact.probe()?;
    let artifact_path = output_dir.join("recording.oslv");
    artifact.write_to(&artifact_path)?;
    if let Some(frame) = poster {
        frame.write_png(&output_dir.join("poster.png"))?;
    }

    tracing::info!(
        "Wrote {} ({} bytes, {}s)",
        artifact_path.display(),
        artifact.size(),
        duration
    );
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
