//! Live microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::frame::{AudioFormat, AudioFrame};
use crate::audio::source::{AudioSource, SourceEvent};
use crate::error::{Result, VoxError};
use crate::sys::with_suppressed_stderr;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List input devices, dropping output-only patterns and marking preferred
/// ones with "\[recommended\]".
///
/// # Errors
/// Returns `VoxError::Device` if enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| VoxError::Device {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Best default input device: PipeWire, then PulseAudio, then the host
/// default.
fn best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| VoxError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

fn find_device(name: &str) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| VoxError::Device {
            message: format!("Failed to enumerate devices: {}", e),
        })?;

        for dev in devices {
            if let Ok(dev_name) = dev.name()
                && dev_name == name
            {
                return Ok(dev);
            }
        }

        Err(VoxError::AudioDeviceNotFound {
            device: name.to_string(),
        })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched by the thread that owns the
/// `LiveCaptureSource`, and only to pause and drop it.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Live microphone source.
///
/// Opens the device at exactly the session's rate and channel count. One
/// hardware callback becomes one frame.
pub struct LiveCaptureSource {
    device: cpal::Device,
    device_name: String,
    format: AudioFormat,
    stream: Option<SendableStream>,
}

impl LiveCaptureSource {
    /// Look up the capture device. `None` picks the best default.
    pub fn new(device_name: Option<&str>, format: AudioFormat) -> Result<Self> {
        let device = match device_name {
            Some(name) => find_device(name)?,
            None => best_default_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        log::info!("Using input device '{}' at {}", device_name, format);

        Ok(Self {
            device,
            device_name,
            format,
            stream: None,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build the input stream: f32 first, then i16.
    fn build_stream(&self, tx: &Sender<SourceEvent>) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: self.format.channels,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let sequence = Arc::new(AtomicU64::new(0));

        let data_tx = tx.clone();
        let seq = Arc::clone(&sequence);
        let format = self.format;
        let f32_result = self.device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let n = seq.fetch_add(1, Ordering::Relaxed);
                let _ = data_tx.send(SourceEvent::Frame(AudioFrame::from_f32(
                    n,
                    format,
                    data.to_vec(),
                )));
            },
            error_callback(tx.clone()),
            None,
        );
        let f32_error = match f32_result {
            Ok(stream) => return Ok(stream),
            Err(e) => e,
        };

        let data_tx = tx.clone();
        let seq = Arc::clone(&sequence);
        self.device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let n = seq.fetch_add(1, Ordering::Relaxed);
                    let _ = data_tx.send(SourceEvent::Frame(AudioFrame::from_i16(
                        n,
                        format,
                        data.to_vec(),
                    )));
                },
                error_callback(tx.clone()),
                None,
            )
            .map_err(|e| {
                VoxError::configuration(format!(
                    "Device '{}' cannot capture {} (f32: {}; i16: {})",
                    self.device_name, self.format, f32_error, e
                ))
            })
    }
}

fn error_callback(tx: Sender<SourceEvent>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        log::error!("Audio stream error: {}", err);
        let _ = tx.send(SourceEvent::Failed(VoxError::Device {
            message: err.to_string(),
        }));
    }
}

impl AudioSource for LiveCaptureSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn subscribe(&mut self) -> Result<Receiver<SourceEvent>> {
        if self.stream.is_some() {
            return Err(VoxError::Device {
                message: "capture already has a subscriber".to_string(),
            });
        }

        let (tx, rx) = unbounded();
        let stream = self.build_stream(&tx)?;
        stream.play().map_err(|e| VoxError::Device {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        Ok(rx)
    }

    fn unsubscribe(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let paused = stream.0.pause();
            // Dropping the stream releases the device and the senders.
            drop(stream);
            paused.map_err(|e| VoxError::Device {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

impl Drop for LiveCaptureSource {
    fn drop(&mut self) {
        let _ = self.unsubscribe();
    }
}
