//! Test utilities and fixtures for tonearm tests.
//!
//! Provides WAV fixture generation, a no-op output sink, and event
//! draining helpers to reduce boilerplate in tests.

use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;

use crate::player::{DeviceError, OutputDevice, PlayerEvent, SharedMixer};

/// Writes a 440 Hz sine WAV file and returns its path.
///
/// The signal peaks at half scale, so gain math stays easy to assert
/// against. `frames` counts sample frames, independent of `channels`.
pub fn write_wav(dir: &Path, name: &str, frames: u32, sample_rate: u32, channels: u16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("Failed to create WAV fixture");
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
        let value = (sample * f32::from(i16::MAX)) as i16;
        for _ in 0..channels {
            writer
                .write_sample(value)
                .expect("Failed to write WAV sample");
        }
    }
    writer.finalize().expect("Failed to finalize WAV fixture");
    path
}

/// Output sink that swallows everything, for tests that exercise
/// transport logic without real audio hardware.
pub struct NullOutput {
    fail_init: bool,
}

impl NullOutput {
    pub fn new() -> Self {
        Self { fail_init: false }
    }

    /// A sink whose init always fails, as if no device were present.
    pub fn failing() -> Self {
        Self { fail_init: true }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDevice for NullOutput {
    fn init(&mut self, _sample_rate: u32, _buffer_hint: u32) -> Result<(), DeviceError> {
        if self.fail_init {
            return Err(DeviceError::InitFailure(
                "No output device found".to_string(),
            ));
        }
        Ok(())
    }

    fn play(&mut self, _mixer: &SharedMixer) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Collects all pending events without blocking.
pub fn drain_events(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    rx.try_iter().collect()
}

/// Route tracing output to the test harness, honoring `RUST_LOG`.
/// Safe to call from every test; only the first call installs.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_wav_produces_decodable_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = write_wav(dir.path(), "fixture.wav", 4_000, 8_000, 2);

        let (stream, format) = crate::player::decode(&path).expect("decode fixture");
        assert_eq!(format.sample_rate, 8_000);
        assert_eq!(format.channels, 2);
        assert_eq!(stream.length(), 4_000);
    }

    #[test]
    fn test_failing_output_refuses_init() {
        let mut output = NullOutput::failing();
        assert!(output.init(44_100, 0).is_err());
        assert!(NullOutput::new().init(44_100, 0).is_ok());
    }
}
