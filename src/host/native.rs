//! System microphone via CPAL.
//!
//! `cpal::Stream` may not cross threads, so each capture lives on its own
//! worker thread and the [`MicStream`] handed to the coordinator only talks to
//! it through channels.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::capabilities::{MicStream, Microphone};
use crate::error::MediaError;
use crate::log_debug;
use crate::pending::{pending, Pending};
use crate::playback::AudioBlob;

const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Names of the input devices the default host exposes.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("no input devices available")?;
    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

fn open_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match preferred {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{name}' not found"))
        }
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

fn push_downmixed<T: Copy>(buf: &mut Vec<f32>, data: &[T], channels: usize, convert: impl Fn(T) -> f32) {
    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().map(|sample| convert(*sample)).sum();
        buf.push(sum / frame.len() as f32);
    }
}

fn build_stream(
    device: &cpal::Device,
    samples: Arc<Mutex<Vec<f32>>>,
) -> Result<(cpal::Stream, u32)> {
    let default_config = device.default_input_config()?;
    let format = default_config.sample_format();
    let config: StreamConfig = default_config.into();
    let sample_rate = config.sample_rate.0;
    let channels = usize::from(config.channels.max(1));
    log_debug(&format!(
        "native mic: format={format:?} sample_rate={sample_rate}Hz channels={channels}"
    ));
    let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| {
                if let Ok(mut buf) = samples.lock() {
                    push_downmixed(&mut buf, data, channels, |s| s);
                }
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                if let Ok(mut buf) = samples.lock() {
                    push_downmixed(&mut buf, data, channels, |s| s as f32 / 32_768.0);
                }
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _| {
                if let Ok(mut buf) = samples.lock() {
                    push_downmixed(&mut buf, data, channels, |s| {
                        (s as f32 - 32_768.0) / 32_768.0
                    });
                }
            },
            err_fn,
            None,
        )?,
        other => return Err(anyhow!("unsupported sample format: {other:?}")),
    };
    stream.play()?;
    Ok((stream, sample_rate))
}

/// 16-bit little-endian mono PCM.
fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

struct NativeMicStream {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    samples: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
}

impl MicStream for NativeMicStream {
    fn stop(self: Box<Self>) -> Result<AudioBlob, MediaError> {
        let _ = self.stop_tx.send(());
        if self.done_rx.recv_timeout(STOP_TIMEOUT).is_err() {
            log_debug("native mic: capture thread did not confirm stop");
        }
        let samples = self
            .samples
            .lock()
            .map_err(|_| MediaError::DeviceUnavailable("audio buffer lock poisoned".into()))?;
        if samples.is_empty() {
            return Err(MediaError::DeviceUnavailable(
                "no samples captured; check microphone permissions".into(),
            ));
        }
        Ok(AudioBlob {
            bytes: encode_pcm16(&samples),
            mime: format!("audio/l16;rate={};channels=1", self.sample_rate),
        })
    }

    fn release(self: Box<Self>) {
        let _ = self.stop_tx.send(());
    }
}

/// Microphone backed by the system's default (or a named) input device.
pub struct NativeMicrophone {
    preferred_device: Option<String>,
}

impl NativeMicrophone {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }
}

impl Microphone for NativeMicrophone {
    fn acquire(&self) -> Pending<Result<Box<dyn MicStream>, MediaError>> {
        let (resolver, pending) = pending();
        let preferred = self.preferred_device.clone();
        let spawned = thread::Builder::new()
            .name("voxfeed-mic".into())
            .spawn(move || {
                let samples = Arc::new(Mutex::new(Vec::new()));
                let opened = open_device(preferred.as_deref())
                    .and_then(|device| build_stream(&device, samples.clone()));
                let (stream, sample_rate) = match opened {
                    Ok(opened) => opened,
                    Err(err) => {
                        let _ = resolver.resolve(Err(MediaError::DeviceUnavailable(format!("{err:#}"))));
                        return;
                    }
                };
                if resolver.is_cancelled() {
                    log_debug("native mic: acquisition cancelled before it finished");
                    drop(stream);
                    return;
                }
                let (stop_tx, stop_rx) = bounded::<()>(1);
                let (done_tx, done_rx) = bounded::<()>(1);
                let handle: Box<dyn MicStream> = Box::new(NativeMicStream {
                    stop_tx,
                    done_rx,
                    samples,
                    sample_rate,
                });
                if let Err(Ok(late)) = resolver.resolve(Ok(handle)) {
                    late.release();
                }
                // Either an explicit stop or every sender dropping ends capture.
                let _ = stop_rx.recv();
                if let Err(err) = stream.pause() {
                    log_debug(&format!("native mic: pause failed: {err}"));
                }
                drop(stream);
                let _ = done_tx.send(());
            });
        if let Err(err) = spawned {
            log_debug(&format!("native mic: failed to spawn capture thread: {err}"));
        }
        pending
    }
}
