//! Playback error taxonomy.
//!
//! All variants carry `String` payloads rather than source errors so they
//! stay `Clone` and can travel through the event channel to subscribers.

/// Failure to produce a decoded stream from a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The file extension is not one of the supported formats.
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The file could not be read.
    #[error("I/O failure reading audio: {0}")]
    Io(String),

    /// The file opened but its contents could not be decoded.
    #[error("Corrupt audio stream: {0}")]
    CorruptStream(String),
}

/// Failure to reposition within a decoded stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    /// The requested offset lies outside the stream.
    #[error("Seek target out of range")]
    OutOfRange,

    /// The underlying reader failed while repositioning.
    #[error("I/O failure while seeking: {0}")]
    Io(String),
}

/// Failure to bring up the audio output device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Audio output initialization failed: {0}")]
    InitFailure(String),
}

/// Any failure a player command can report.
///
/// Commands return this and the same value is emitted as
/// [`PlayerEvent::Error`](super::PlayerEvent::Error) for subscribers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Seek(#[from] SeekError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The progress reporting worker could not be started.
    #[error("Playback worker unavailable: {0}")]
    Task(String),
}
