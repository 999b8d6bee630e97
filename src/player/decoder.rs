//! Decoder gateway built on symphonia.
//!
//! Supported formats:
//! - MP3
//! - WAV/PCM
//!
//! [`decode`] dispatches on the file extension, then hands back a
//! sample-accurate [`AudioSource`] plus the stream's [`StreamFormat`].
//! Everything format-specific stays behind that trait.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::error::{DecodeError, SeekError};

/// File extensions the gateway will open.
const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// Decoded stream parameters the output sink needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

/// A decoded, seekable audio stream.
///
/// Produced by [`decode`]. All offsets are in sample frames (one sample
/// per channel). Dropping the stream closes it; there is no separate
/// close call to misuse after the fact.
pub trait AudioSource: Send {
    /// Fill `out` with interleaved samples in this stream's channel layout.
    ///
    /// `out.len()` must be a multiple of the channel count. Returns the
    /// number of whole frames written; `Ok(0)` signals end of stream.
    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError>;

    /// Current offset in frames, `0 <= position <= length`.
    fn position(&self) -> u64;

    /// Total stream length in frames.
    fn length(&self) -> u64;

    /// Reposition to an absolute frame offset.
    ///
    /// Targets at or past the end are clamped to the last frame.
    fn seek(&mut self, frame: u64) -> Result<(), SeekError>;
}

/// Open a file and produce a decoded stream plus its format.
///
/// Dispatch happens on the extension alone; unrecognized formats are
/// rejected without touching the file.
pub fn decode(path: &Path) -> Result<(Box<dyn AudioSource>, StreamFormat), DecodeError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        let what = if ext.is_empty() {
            format!("{} (no file extension)", path.display())
        } else {
            ext
        };
        return Err(DecodeError::UnsupportedFormat(what));
    }

    let stream = SymphoniaStream::open(path)?;
    let format = stream.format;
    Ok((Box::new(stream), format))
}

/// Symphonia-backed [`AudioSource`].
struct SymphoniaStream {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: StreamFormat,
    /// Total length in frames
    length: u64,
    time_base: Option<TimeBase>,
    /// Reported position in frames
    position: u64,
    /// Most recently decoded packet, interleaved
    sample_buf: Option<SampleBuffer<f32>>,
    /// Samples already consumed from `sample_buf`
    cursor: usize,
    /// Frames to drop after a coarse seek landing before the target
    discard: u64,
}

impl SymphoniaStream {
    fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)
            .map_err(|e| DecodeError::Io(format!("{}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension() {
            hint.with_extension(&ext.to_string_lossy());
        }

        let format_opts = FormatOptions::default();
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| match e {
                SymphoniaError::IoError(e) => DecodeError::Io(e.to_string()),
                e => DecodeError::CorruptStream(e.to_string()),
            })?;

        let reader = probed.format;

        // First decodable audio track
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                DecodeError::CorruptStream(format!("No audio track in {}", path.display()))
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::CorruptStream("Unknown sample rate".to_string()))?;
        let channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

        // Positions and clamped seeks are defined against the total frame
        // count, so a stream that cannot report one is not playable here.
        let length = codec_params
            .n_frames
            .ok_or_else(|| DecodeError::CorruptStream("Unknown stream length".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::CorruptStream(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            format: StreamFormat {
                sample_rate,
                channels,
            },
            length,
            time_base: codec_params.time_base,
            position: 0,
            sample_buf: None,
            cursor: 0,
            discard: 0,
        })
    }

    /// Samples still buffered from the last decoded packet.
    fn buffered(&self) -> usize {
        self.sample_buf
            .as_ref()
            .map_or(0, |b| b.samples().len().saturating_sub(self.cursor))
    }

    /// Decode packets until one from our track lands in `sample_buf`.
    ///
    /// Returns `Ok(false)` at end of stream.
    fn refill(&mut self) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false); // End of stream
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e)) => return Err(DecodeError::Io(e.to_string())),
                Err(e) => return Err(DecodeError::CorruptStream(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e)) => return Err(DecodeError::Io(e.to_string())),
                Err(e) => return Err(DecodeError::CorruptStream(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let needed = decoded.frames() * spec.channels.count();
            if self
                .sample_buf
                .as_ref()
                .is_none_or(|b| b.capacity() < needed)
            {
                self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
            }
            self.cursor = 0;
            return Ok(true);
        }
    }

    /// Convert a track timestamp to a frame offset.
    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let time = tb.calc_time(ts);
                let rate = f64::from(self.format.sample_rate);
                (time.seconds as f64 * rate + time.frac * rate).round() as u64
            }
            // Without a time base, timestamps are already frame offsets
            None => ts,
        }
    }
}

impl AudioSource for SymphoniaStream {
    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let channels = usize::from(self.format.channels.max(1));
        let mut written = 0usize;

        while written < out.len() {
            let available = self.buffered();
            if available == 0 {
                if !self.refill()? {
                    break;
                }
                continue;
            }

            // Drop frames between the coarse seek landing and the target
            if self.discard > 0 {
                let drop_frames = self.discard.min((available / channels) as u64) as usize;
                if drop_frames == 0 {
                    self.cursor += available;
                    continue;
                }
                self.cursor += drop_frames * channels;
                self.discard -= drop_frames as u64;
                continue;
            }

            let take = available.min(out.len() - written);
            let take = take - (take % channels);
            if take == 0 {
                break;
            }
            if let Some(buf) = self.sample_buf.as_ref() {
                out[written..written + take]
                    .copy_from_slice(&buf.samples()[self.cursor..self.cursor + take]);
            }
            self.cursor += take;
            written += take;
        }

        let frames = written / channels;
        self.position = (self.position + frames as u64).min(self.length);
        Ok(frames)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn seek(&mut self, frame: u64) -> Result<(), SeekError> {
        let target = frame.min(self.length.saturating_sub(1));
        let seconds = target as f64 / f64::from(self.format.sample_rate);
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(map_seek_error)?;

        // The reader resumes from a packet boundary at or before the
        // target; schedule the difference for discard so audio picks up at
        // exactly the requested frame.
        self.decoder.reset();
        if let Some(buf) = &self.sample_buf {
            self.cursor = buf.samples().len();
        }
        let landed = self.ts_to_frames(seeked.actual_ts);
        self.discard = target.saturating_sub(landed);
        self.position = target;
        Ok(())
    }
}

fn map_seek_error(e: SymphoniaError) -> SeekError {
    match e {
        SymphoniaError::SeekError(SeekErrorKind::OutOfRange) => SeekError::OutOfRange,
        SymphoniaError::IoError(e) => SeekError::Io(e.to_string()),
        e => SeekError::Io(e.to_string()),
    }
}

/// Fixed-length constant-signal source for exercising playback plumbing
/// without the real decoder.
#[cfg(test)]
pub(crate) struct StubSource {
    value: f32,
    channels: u16,
    length: u64,
    position: u64,
    fail_seek: bool,
    drops: Option<std::sync::Arc<std::sync::atomic::AtomicUsize>>,
}

#[cfg(test)]
impl StubSource {
    pub(crate) fn new(length: u64, channels: u16) -> Self {
        Self {
            value: 1.0,
            channels,
            length,
            position: 0,
            fail_seek: false,
            drops: None,
        }
    }

    pub(crate) fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }

    pub(crate) fn failing_seek(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    pub(crate) fn counting_drops(
        mut self,
        counter: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    ) -> Self {
        self.drops = Some(counter);
        self
    }
}

#[cfg(test)]
impl AudioSource for StubSource {
    fn read(&mut self, out: &mut [f32]) -> Result<usize, DecodeError> {
        let channels = usize::from(self.channels.max(1));
        let frames = (out.len() / channels).min((self.length - self.position) as usize);
        out[..frames * channels].fill(self.value);
        self.position += frames as u64;
        Ok(frames)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn seek(&mut self, frame: u64) -> Result<(), SeekError> {
        if self.fail_seek {
            return Err(SeekError::Io("seek disabled".to_string()));
        }
        self.position = frame.min(self.length.saturating_sub(1));
        Ok(())
    }
}

#[cfg(test)]
impl Drop for StubSource {
    fn drop(&mut self) {
        if let Some(counter) = &self.drops {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }
}
