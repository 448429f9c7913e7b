//! Microphone capture using cpal
//!
//! The input stream lives on its own thread (cpal streams are not `Send` on
//! every platform) and is dropped as soon as the track stops being live.
//! cpal exposes no echo cancellation or noise suppression, so raw input is used.

use crate::capture::source::{CaptureSource, MediaTrack, SourceKind};
use crate::capture::traits::AudioDeviceInfo;
use crate::utils::error::{RecordingError, RecordingResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, SampleFormat};
use std::time::Duration;
use tokio::sync::oneshot;

/// How often the stream thread checks whether its track was released
const LIVENESS_POLL: Duration = Duration::from_millis(50);

/// Get list of available audio input devices (microphones)
pub fn get_audio_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            Some(AudioDeviceInfo {
                id: name.clone(),
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                is_input: true,
            })
        })
        .collect()
}

/// Resolve a device by id (its name), falling back to the default input
fn find_input_device(device_id: Option<&str>) -> Option<Device> {
    let host = cpal::default_host();
    if let Some(id) = device_id {
        let found = host
            .input_devices()
            .ok()
            .and_then(|mut devices| devices.find(|d| d.name().ok().as_deref() == Some(id)));
        if found.is_some() {
            return found;
        }
        tracing::warn!("Microphone '{}' not found, falling back to default input", id);
    }
    host.default_input_device()
}

fn map_build_error(error: BuildStreamError) -> RecordingError {
    match error {
        BuildStreamError::DeviceNotAvailable => {
            RecordingError::DeviceNotFound("microphone is not available".to_string())
        }
        other => RecordingError::DeviceInUse(format!("failed to open microphone: {other}")),
    }
}

/// Open a microphone and feed its samples into a new audio track
pub async fn open_microphone(device_id: Option<String>) -> RecordingResult<CaptureSource> {
    let (ready_tx, ready_rx) = oneshot::channel::<RecordingResult<MediaTrack>>();

    std::thread::spawn(move || {
        let device = match find_input_device(device_id.as_deref()) {
            Some(device) => device,
            None => {
                let _ = ready_tx.send(Err(RecordingError::DeviceNotFound(
                    "no microphone available".to_string(),
                )));
                return;
            }
        };
        let name = device.name().unwrap_or_else(|_| "Microphone".to_string());

        let supported = match device.default_input_config() {
            Ok(config) => config,
            Err(e) => {
                let _ = ready_tx.send(Err(RecordingError::DeviceNotFound(format!(
                    "microphone has no input config: {e}"
                ))));
                return;
            }
        };

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let sample_format = supported.sample_format();
        let track = MediaTrack::audio(name.clone(), sample_rate, channels);
        let config: cpal::StreamConfig = supported.into();

        let err_fn = |err: cpal::StreamError| {
            tracing::error!("Microphone stream error: {}", err);
        };

        let sink = track.clone();
        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| sink.push_samples(data),
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    sink.push_samples(&converted);
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as f32 - 32768.0) / 32768.0)
                        .collect();
                    sink.push_samples(&converted);
                },
                err_fn,
                None,
            ),
            other => {
                let _ = ready_tx.send(Err(RecordingError::DeviceInUse(format!(
                    "unsupported microphone sample format {other:?}"
                ))));
                return;
            }
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready_tx.send(Err(map_build_error(e)));
                return;
            }
        };

        if let Err(e) = stream.play() {
            let _ = ready_tx.send(Err(RecordingError::DeviceInUse(format!(
                "failed to start microphone: {e}"
            ))));
            return;
        }

        tracing::info!(
            "Microphone opened: {} ({}Hz, {}ch, {:?})",
            name,
            sample_rate,
            channels,
            sample_format
        );

        if ready_tx.send(Ok(track.clone())).is_err() {
            // The requester went away before the device opened
            return;
        }

        while track.is_live() {
            std::thread::sleep(LIVENESS_POLL);
        }
        drop(stream);
        tracing::info!("Microphone stream closed: {}", name);
    });

    let track = ready_rx.await.map_err(|_| {
        RecordingError::DeviceInUse("microphone thread exited before opening".to_string())
    })??;
    let label = track.label().to_string();
    Ok(CaptureSource::new(SourceKind::Microphone, label, vec![track]))
}
