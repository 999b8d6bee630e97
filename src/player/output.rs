//! Audio output: the shared mixer and the cpal-backed device sink.
//!
//! The mixer is the single point of contact between the control side and
//! the device render thread. Both take the same lock; the render callback
//! holds it only long enough to pull one buffer of samples.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use super::error::DeviceError;
use super::session::Session;

/// Handle to the mixer shared with the device render thread.
pub type SharedMixer = Arc<Mutex<Mixer>>;

/// Holds the session being played and renders it on demand.
#[derive(Default)]
pub struct Mixer {
    session: Option<Session>,
}

impl Mixer {
    pub fn shared() -> SharedMixer {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Fill `out` with interleaved stereo samples.
    ///
    /// Runs on the device render thread with the mixer lock held. Without
    /// a playing session the buffer is zeroed.
    pub fn fill(&mut self, out: &mut [f32]) {
        match self.session.as_mut() {
            Some(session) if session.is_playing() => session.render(out),
            _ => out.fill(0.0),
        }
    }

    /// Replace the current session.
    ///
    /// The old session is dropped before the new one is installed, so the
    /// outgoing source is closed before its successor starts rendering.
    pub(crate) fn install(&mut self, session: Session) {
        drop(self.session.take());
        self.session = Some(session);
    }

    /// Drop the current session, if any. Returns whether one was present.
    pub(crate) fn close_session(&mut self) -> bool {
        self.session.take().is_some()
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }
}

/// Where rendered audio goes.
///
/// [`init`](OutputDevice::init) prepares the sink for a stream's sample
/// rate before [`play`](OutputDevice::play) starts pulling from the
/// mixer. `init` is cheap to call again when the rate is unchanged.
pub trait OutputDevice {
    fn init(&mut self, sample_rate: u32, buffer_hint: u32) -> Result<(), DeviceError>;
    fn play(&mut self, mixer: &SharedMixer) -> Result<(), DeviceError>;
}

/// System audio output through cpal.
///
/// The device is resolved once and cached; the stream is rebuilt only
/// when the sample rate changes. Holds the cpal `Stream`, so it must
/// stay on the thread that created it.
#[derive(Default)]
pub struct CpalOutput {
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
    sample_rate: u32,
    buffer_hint: u32,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_device(&mut self) -> Result<(), DeviceError> {
        if self.device.is_some() {
            return Ok(());
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DeviceError::InitFailure("No output device found".to_string()))?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", name);
        self.device = Some(device);
        Ok(())
    }

    fn build_stream(&self, mixer: &SharedMixer) -> Result<cpal::Stream, DeviceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| DeviceError::InitFailure("Output not initialized".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| DeviceError::InitFailure(format!("No default output config: {e}")))?;
        let sample_format = supported.sample_format();

        let mut config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: if self.buffer_hint > 0 {
                cpal::BufferSize::Fixed(self.buffer_hint)
            } else {
                cpal::BufferSize::Default
            },
        };

        let build = |config: &cpal::StreamConfig| match sample_format {
            cpal::SampleFormat::F32 => self.build_stream_for::<f32>(device, config, mixer),
            cpal::SampleFormat::I16 => self.build_stream_for::<i16>(device, config, mixer),
            format => Err(DeviceError::InitFailure(format!(
                "Unsupported sample format: {format:?}"
            ))),
        };

        match build(&config) {
            Ok(stream) => Ok(stream),
            Err(e) if self.buffer_hint > 0 => {
                tracing::warn!(
                    "Buffer size {} rejected ({}), retrying with device default",
                    self.buffer_hint,
                    e
                );
                config.buffer_size = cpal::BufferSize::Default;
                build(&config)
            }
            Err(e) => Err(e),
        }
    }

    fn build_stream_for<T>(
        &self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: &SharedMixer,
    ) -> Result<cpal::Stream, DeviceError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mixer = Arc::clone(mixer);
        let mut scratch: Vec<f32> = Vec::new();
        let err_fn = |err| tracing::error!("Audio stream error: {}", err);

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    mixer.lock().fill(&mut scratch);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = T::from_sample(*sample);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::InitFailure(format!("Failed to build stream: {e}")))
    }
}

impl OutputDevice for CpalOutput {
    fn init(&mut self, sample_rate: u32, buffer_hint: u32) -> Result<(), DeviceError> {
        if self.stream.is_some() && self.sample_rate == sample_rate {
            return Ok(());
        }
        // Rate changed; the old stream is torn down before a new device
        // lookup so a stale callback never outlives its config.
        self.stream = None;
        self.ensure_device()?;
        self.sample_rate = sample_rate;
        self.buffer_hint = buffer_hint;
        Ok(())
    }

    fn play(&mut self, mixer: &SharedMixer) -> Result<(), DeviceError> {
        if self.stream.is_none() {
            let stream = self.build_stream(mixer)?;
            self.stream = Some(stream);
            tracing::debug!("Output stream started at {} Hz", self.sample_rate);
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| DeviceError::InitFailure(format!("Failed to start stream: {e}")))?;
        }
        Ok(())
    }
}
