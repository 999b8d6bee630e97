//! A single loaded track: the decoded source plus its transport state.
//!
//! The mixer owns at most one `Session` at a time. The device callback
//! renders from it under the mixer lock; control calls mutate it under
//! the same lock.

use super::decoder::{AudioSource, StreamFormat};
use super::error::SeekError;
use super::state::{Progress, format_clock};

pub(crate) struct Session {
    source: Box<dyn AudioSource>,
    format: StreamFormat,
    playing: bool,
    gain: f32,
    /// Set when the source failed mid-render; output stays silent after
    ended: bool,
    /// Staging buffer in the source's channel layout
    scratch: Vec<f32>,
}

impl Session {
    pub(crate) fn new(source: Box<dyn AudioSource>, format: StreamFormat, gain: f32) -> Self {
        Self {
            source,
            format,
            playing: true,
            gain,
            ended: false,
            scratch: Vec::new(),
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub(crate) fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub(crate) fn position(&self) -> u64 {
        self.source.position()
    }

    pub(crate) fn length(&self) -> u64 {
        self.source.length()
    }

    pub(crate) fn seek_to_frame(&mut self, frame: u64) -> Result<(), SeekError> {
        self.source.seek(frame)?;
        self.ended = false;
        Ok(())
    }

    /// Transport snapshot for progress reporting.
    pub(crate) fn progress(&self) -> Progress {
        let length = self.source.length();
        let position = self.source.position().min(length);
        let rate = u64::from(self.format.sample_rate.max(1));
        let fraction = if length == 0 {
            0.0
        } else {
            position as f32 / length as f32
        };
        Progress {
            fraction,
            elapsed: format_clock(position / rate),
            total: format_clock(length / rate),
        }
    }

    /// Render gain-scaled stereo frames into `out`.
    ///
    /// `out` is interleaved stereo; mono sources are duplicated to both
    /// channels and extra channels beyond the first two are dropped. At
    /// end of track the source rewinds and keeps playing, at most once
    /// per call so an empty source cannot spin the callback.
    pub(crate) fn render(&mut self, out: &mut [f32]) {
        if self.ended {
            out.fill(0.0);
            return;
        }

        let channels = usize::from(self.format.channels.max(1));
        let out_frames = out.len() / 2;
        self.scratch.resize(out_frames * channels, 0.0);

        let mut filled = 0usize;
        let mut looped = false;
        while filled < out_frames {
            let want = (out_frames - filled) * channels;
            let frames = match self.source.read(&mut self.scratch[..want]) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!("Decode failed mid-playback: {}", e);
                    self.ended = true;
                    break;
                }
            };
            if frames == 0 {
                if looped {
                    break;
                }
                looped = true;
                if let Err(e) = self.source.seek(0) {
                    tracing::warn!("Rewind at end of track failed: {}", e);
                    self.ended = true;
                    break;
                }
                continue;
            }
            self.mix_into(out, filled, frames, channels);
            filled += frames;
        }

        out[filled * 2..].fill(0.0);
    }

    fn mix_into(&self, out: &mut [f32], at_frame: usize, frames: usize, channels: usize) {
        for i in 0..frames {
            let frame = &self.scratch[i * channels..(i + 1) * channels];
            let (left, right) = match channels {
                1 => (frame[0], frame[0]),
                _ => (frame[0], frame[1]),
            };
            out[(at_frame + i) * 2] = left * self.gain;
            out[(at_frame + i) * 2 + 1] = right * self.gain;
        }
    }
}
