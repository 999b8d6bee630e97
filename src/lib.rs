//! Playback core for a desktop audio player.
//!
//! Decodes MP3 and WAV files, plays them through the system output, and
//! reports transport state over an event channel. The [`Player`] facade
//! is the main entry point:
//!
//! ```no_run
//! use tonearm::Player;
//!
//! let mut player = Player::new();
//! let track = player.add_file("song.mp3");
//! player.load_and_play(&track)?;
//! # Ok::<(), tonearm::PlayerError>(())
//! ```
//!
//! Playback state flows back through [`Player::events`]: track changes,
//! play/pause flips, once-a-second position reports, and surfaced
//! errors.

pub mod config;
pub mod metadata;
pub mod player;

#[cfg(test)]
pub mod test_utils;

pub use player::{PlaybackStatus, Player, PlayerError, PlayerEvent, PlayerSnapshot, TrackRef};
