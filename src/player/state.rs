//! Playback state, event, and snapshot types.

use super::error::PlayerError;

/// Current transport state.
///
/// `Paused` and `Playing` both imply a loaded session; `Idle` means no
/// track is loaded and transport commands other than load are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Paused,
    Playing,
}

/// State change notifications emitted by the player.
///
/// The presentation layer subscribes to these instead of polling; every
/// transition the player makes on behalf of a command (or the progress
/// reporter) shows up here.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A new track was loaded (`Some`) or the current one was cleared (`None`).
    TrackChanged { title: Option<String> },
    /// Periodic position report while a track is playing.
    PositionChanged {
        /// Fractional progress in `[0, 1]`
        fraction: f32,
        /// Elapsed time as `MM:SS`
        elapsed: String,
        /// Total duration as `MM:SS`
        total: String,
    },
    /// Play/pause flipped.
    PlayStateChanged { playing: bool },
    /// A recoverable failure (decode, seek, device) was reported.
    Error(PlayerError),
}

/// Position report derived from the active stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Fractional progress in `[0, 1]`
    pub fraction: f32,
    /// Elapsed time as `MM:SS`
    pub elapsed: String,
    /// Total duration as `MM:SS`
    pub total: String,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            fraction: 0.0,
            elapsed: format_clock(0),
            total: format_clock(0),
        }
    }
}

/// Point-in-time view of the player, for hosts that poll instead of
/// subscribing to [`PlayerEvent`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    /// Current transport state
    pub status: PlaybackStatus,
    /// Display title of the loaded track (if any)
    pub title: Option<String>,
    /// Position within the loaded track
    pub progress: Progress,
    /// Volume level (0.0 - 1.0)
    pub volume: f32,
}

/// Format a second count as zero-padded `MM:SS`.
///
/// Minutes wrap modulo 60, so an hour-long track reads `00:00` again at
/// the top of the hour; display strings stay fixed-width either way.
pub fn format_clock(total_secs: u64) -> String {
    let mins = (total_secs / 60) % 60;
    let secs = total_secs % 60;
    format!("{mins:02}:{secs:02}")
}
