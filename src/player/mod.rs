//! Audio playback engine: decoding, transport control, and periodic
//! position reporting.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Player (control thread)                      │
//! │      Load/seek/volume commands, playlist, event emission        │
//! └───────────────┬─────────────────────────────────┬───────────────┘
//!                 │ shared mixer lock               │ spawn/cancel
//!                 ▼                                 ▼
//! ┌───────────────────────────────┐ ┌───────────────────────────────┐
//! │  Device render thread (cpal)  │ │       Progress thread         │
//! │  Pulls samples via the mixer  │ │  Snapshots position each      │
//! │  callback, converts to the    │ │  second, emits it on the      │
//! │  device sample format         │ │  event channel                │
//! └───────────────────────────────┘ └───────────────────────────────┘
//! ```
//!
//! All three threads meet at the [`SharedMixer`]: the render callback
//! pulls samples from it, the progress worker snapshots it, and control
//! calls mutate the session inside it. Each takes the lock briefly and
//! never holds it while doing I/O.

mod decoder;
mod error;
mod output;
mod playlist;
mod progress;
mod session;
mod state;

pub use decoder::{AudioSource, StreamFormat, decode};
pub use error::{DecodeError, DeviceError, PlayerError, SeekError};
pub use output::{CpalOutput, Mixer, OutputDevice, SharedMixer};
pub use playlist::{Playlist, TrackRef};
pub use state::{PlaybackStatus, PlayerEvent, PlayerSnapshot, Progress, format_clock};

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::{Config, DEFAULT_VOLUME};
use progress::{PROGRESS_INTERVAL, ProgressTask};
use session::Session;

/// Capacity of the event channel; events past it are dropped, never
/// blocked on.
const EVENT_BUFFER: usize = 64;

/// The playback engine.
///
/// Owns the playlist, the output sink, and the event channel. Holds the
/// device stream through the sink, so it stays on the thread that
/// created it; the audio itself renders on the device's own thread.
pub struct Player {
    mixer: SharedMixer,
    output: Box<dyn OutputDevice>,
    playlist: Playlist,
    progress: Option<ProgressTask>,
    event_tx: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
    volume: f32,
    /// Fixed device buffer size in frames, 0 for rate-derived default
    buffer_size: u32,
    current_title: Option<String>,
}

impl Player {
    /// Create a player on the system audio output.
    ///
    /// No device is touched until the first track loads.
    pub fn new() -> Self {
        Self::with_output(Box::new(CpalOutput::new()))
    }

    /// Create a player with saved settings applied.
    pub fn from_config(config: &Config) -> Self {
        let mut player = Self::new();
        player.volume = config.audio.volume.clamp(0.0, 1.0);
        player.buffer_size = config.audio.buffer_size;
        player
    }

    /// Create a player on a custom output sink.
    pub fn with_output(output: Box<dyn OutputDevice>) -> Self {
        let (event_tx, event_rx) = bounded(EVENT_BUFFER);
        Self {
            mixer: Mixer::shared(),
            output,
            playlist: Playlist::new(),
            progress: None,
            event_tx,
            event_rx,
            volume: DEFAULT_VOLUME,
            buffer_size: 0,
            current_title: None,
        }
    }

    /// Decode `track` and start playing it, replacing the current track.
    ///
    /// Decoding and device setup happen before the current session is
    /// touched, so a failed load leaves whatever was playing untouched.
    pub fn load_and_play(&mut self, track: &TrackRef) -> Result<(), PlayerError> {
        tracing::info!("Loading track: {}", track.path().display());
        let title = resolve_title(track);

        let (source, format) = match decode(track.path()) {
            Ok(decoded) => decoded,
            Err(e) => return Err(self.surface(e.into())),
        };

        let buffer_hint = if self.buffer_size > 0 {
            self.buffer_size
        } else {
            // ~100 ms of audio per device buffer
            format.sample_rate / 10
        };
        if let Err(e) = self.output.init(format.sample_rate, buffer_hint) {
            return Err(self.surface(e.into()));
        }

        // Point of no return for the old track: stop its reporting, then
        // swap sessions in one lock acquisition.
        self.cancel_progress();
        self.mixer
            .lock()
            .install(Session::new(source, format, self.volume));

        if let Err(e) = self.output.play(&self.mixer) {
            self.mixer.lock().close_session();
            self.current_title = None;
            self.emit(PlayerEvent::PlayStateChanged { playing: false });
            self.emit(PlayerEvent::TrackChanged { title: None });
            return Err(self.surface(e.into()));
        }

        self.current_title = Some(title.clone());
        self.emit(PlayerEvent::TrackChanged { title: Some(title) });
        self.emit(PlayerEvent::PlayStateChanged { playing: true });

        self.spawn_progress()?;
        Ok(())
    }

    /// Flip between playing and paused. Without a loaded track this does
    /// nothing.
    pub fn toggle_play(&mut self) {
        let playing = {
            let mut mixer = self.mixer.lock();
            match mixer.session_mut() {
                None => return,
                Some(session) => {
                    let playing = !session.is_playing();
                    session.set_playing(playing);
                    playing
                }
            }
        };
        tracing::debug!("Playback {}", if playing { "resumed" } else { "paused" });
        self.emit(PlayerEvent::PlayStateChanged { playing });
    }

    /// Unload the current track and go idle. Safe to call when already
    /// idle.
    pub fn stop(&mut self) {
        self.cancel_progress();
        let had_session = self.mixer.lock().close_session();
        if had_session {
            tracing::info!("Playback stopped");
            self.current_title = None;
            self.emit(PlayerEvent::PlayStateChanged { playing: false });
            self.emit(PlayerEvent::TrackChanged { title: None });
        }
    }

    /// Seek to a position expressed as a fraction of the track length.
    ///
    /// The fraction is clamped to `0.0..=1.0`; without a loaded track
    /// this is a no-op.
    pub fn seek_fraction(&mut self, fraction: f32) -> Result<(), PlayerError> {
        let result = {
            let mut mixer = self.mixer.lock();
            match mixer.session_mut() {
                None => return Ok(()),
                Some(session) => {
                    let target = seek_target_frame(fraction, session.length());
                    session.seek_to_frame(target)
                }
            }
        };
        result.map_err(|e| self.surface(e.into()))
    }

    /// Seek forward or backward by `delta` seconds, clamped to the track
    /// bounds. Without a loaded track this is a no-op.
    pub fn seek_relative_secs(&mut self, delta: f32) -> Result<(), PlayerError> {
        let result = {
            let mut mixer = self.mixer.lock();
            match mixer.session_mut() {
                None => return Ok(()),
                Some(session) => {
                    let rate = f64::from(session.sample_rate());
                    let delta_frames = (f64::from(delta) * rate).round() as i64;
                    let max = session.length().saturating_sub(1) as i64;
                    let target = (session.position() as i64)
                        .saturating_add(delta_frames)
                        .clamp(0, max);
                    session.seek_to_frame(target as u64)
                }
            }
        };
        result.map_err(|e| self.surface(e.into()))
    }

    /// Set volume (0.0 - 1.0). Applies to the current track immediately
    /// and to every track loaded after.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        if let Some(session) = self.mixer.lock().session_mut() {
            session.set_gain(volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Advance to the next playlist entry, wrapping at the end.
    pub fn next(&mut self) -> Result<(), PlayerError> {
        let Some(track) = self.playlist.advance().cloned() else {
            return Ok(());
        };
        self.load_and_play(&track)
    }

    /// Step back to the previous playlist entry, wrapping at the start.
    pub fn prev(&mut self) -> Result<(), PlayerError> {
        let Some(track) = self.playlist.retreat().cloned() else {
            return Ok(());
        };
        self.load_and_play(&track)
    }

    /// Jump to a playlist entry by index. Out-of-range indices are
    /// ignored.
    pub fn select(&mut self, index: usize) -> Result<(), PlayerError> {
        let Some(track) = self.playlist.select(index).cloned() else {
            return Ok(());
        };
        self.load_and_play(&track)
    }

    /// Append a file to the playlist without starting playback.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> TrackRef {
        let track = TrackRef::new(path);
        self.playlist.append(track.clone());
        track
    }

    /// Stop playback and empty the playlist.
    pub fn clear_playlist(&mut self) {
        self.stop();
        self.playlist.clear();
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Snapshot of the current transport state.
    pub fn state(&self) -> PlayerSnapshot {
        let mixer = self.mixer.lock();
        match mixer.session() {
            None => PlayerSnapshot {
                status: PlaybackStatus::Idle,
                title: None,
                progress: Progress::default(),
                volume: self.volume,
            },
            Some(session) => PlayerSnapshot {
                status: if session.is_playing() {
                    PlaybackStatus::Playing
                } else {
                    PlaybackStatus::Paused
                },
                title: self.current_title.clone(),
                progress: session.progress(),
                volume: self.volume,
            },
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state().status
    }

    /// Handle to the event stream.
    ///
    /// Events go to a single subscriber; a second receiver splits the
    /// stream rather than duplicating it.
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.event_rx.clone()
    }

    /// Take the next pending event without blocking.
    pub fn poll_event(&self) -> Option<PlayerEvent> {
        self.event_rx.try_recv().ok()
    }

    fn emit(&self, event: PlayerEvent) {
        if self.event_tx.try_send(event).is_err() {
            tracing::debug!("Event dropped, subscriber not keeping up");
        }
    }

    fn surface(&mut self, err: PlayerError) -> PlayerError {
        tracing::error!("Playback error: {}", err);
        self.emit(PlayerEvent::Error(err.clone()));
        err
    }

    fn spawn_progress(&mut self) -> Result<(), PlayerError> {
        self.cancel_progress();
        let task = ProgressTask::spawn(
            Arc::clone(&self.mixer),
            self.event_tx.clone(),
            PROGRESS_INTERVAL,
        )
        .map_err(|e| PlayerError::Task(e.to_string()))?;
        self.progress = Some(task);
        Ok(())
    }

    fn cancel_progress(&mut self) {
        if let Some(task) = self.progress.take() {
            task.cancel();
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.cancel_progress();
        self.mixer.lock().close_session();
    }
}

/// Map a position fraction onto a frame offset in `0..length`.
fn seek_target_frame(fraction: f32, length: u64) -> u64 {
    if length == 0 {
        return 0;
    }
    let fraction = f64::from(fraction.clamp(0.0, 1.0));
    let frame = (fraction * length as f64).round() as u64;
    frame.min(length - 1)
}

/// Best human-readable title for a track: its tag title when readable,
/// otherwise the file stem.
fn resolve_title(track: &TrackRef) -> String {
    match crate::metadata::read_tags(track.path()) {
        Ok(tags) => tags.title.unwrap_or_else(|| track.display_title()),
        Err(e) => {
            tracing::debug!("No readable tags for {}: {}", track.path().display(), e);
            track.display_title()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{NullOutput, drain_events, init_test_logging, write_wav};

    fn test_player() -> Player {
        init_test_logging();
        Player::with_output(Box::new(NullOutput::new()))
    }

    /// Pending events with periodic position reports filtered out, so
    /// sequences stay deterministic under slow test runners.
    fn transport_events(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        drain_events(rx)
            .into_iter()
            .filter(|e| !matches!(e, PlayerEvent::PositionChanged { .. }))
            .collect()
    }

    #[test]
    fn test_load_emits_track_then_playstate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let rx = player.events();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");

        assert_eq!(player.status(), PlaybackStatus::Playing);
        assert_eq!(
            transport_events(&rx),
            vec![
                PlayerEvent::TrackChanged {
                    title: Some("song".to_string())
                },
                PlayerEvent::PlayStateChanged { playing: true },
            ]
        );
    }

    #[test]
    fn test_toggle_cycles_pause_and_resume() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");
        let rx = player.events();
        let _ = drain_events(&rx);

        player.toggle_play();
        assert_eq!(player.status(), PlaybackStatus::Paused);
        assert_eq!(
            transport_events(&rx),
            vec![PlayerEvent::PlayStateChanged { playing: false }]
        );

        player.toggle_play();
        assert_eq!(player.status(), PlaybackStatus::Playing);
        assert_eq!(
            transport_events(&rx),
            vec![PlayerEvent::PlayStateChanged { playing: true }]
        );
    }

    #[test]
    fn test_toggle_without_track_is_noop() {
        let mut player = test_player();
        let rx = player.events();

        player.toggle_play();
        assert_eq!(player.status(), PlaybackStatus::Idle);
        assert!(drain_events(&rx).is_empty());
    }

    #[test]
    fn test_stop_unloads_and_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");
        let rx = player.events();
        let _ = drain_events(&rx);

        player.stop();
        assert_eq!(player.status(), PlaybackStatus::Idle);
        assert_eq!(player.state().title, None);
        assert_eq!(
            transport_events(&rx),
            vec![
                PlayerEvent::PlayStateChanged { playing: false },
                PlayerEvent::TrackChanged { title: None },
            ]
        );

        // Stopping again changes nothing and stays quiet
        player.stop();
        assert!(drain_events(&rx).is_empty());
    }

    #[test]
    fn test_seek_fraction_moves_position() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Two seconds of audio
        let path = write_wav(dir.path(), "song.wav", 16_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");

        player.seek_fraction(0.5).expect("seek");
        let progress = player.state().progress;
        assert!((progress.fraction - 0.5).abs() < 0.01);
        assert_eq!(progress.elapsed, "00:01");
        assert_eq!(progress.total, "00:02");
    }

    #[test]
    fn test_seek_fraction_clamps_out_of_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 16_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");

        player.seek_fraction(1.5).expect("seek");
        assert!(player.state().progress.fraction > 0.99);

        player.seek_fraction(-0.3).expect("seek");
        assert!(player.state().progress.fraction < 0.01);
    }

    #[test]
    fn test_seek_without_track_is_noop() {
        let mut player = test_player();
        let rx = player.events();

        player.seek_fraction(0.5).expect("seek");
        player.seek_relative_secs(-5.0).expect("seek");
        assert!(drain_events(&rx).is_empty());
    }

    #[test]
    fn test_seek_relative_clamps_at_track_bounds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 16_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");

        // Rewinding past the start lands on the start
        player.seek_relative_secs(-5.0).expect("seek");
        assert_eq!(player.state().progress.elapsed, "00:00");

        // Skipping past the end lands on the last frame
        player.seek_relative_secs(60.0).expect("seek");
        assert!(player.state().progress.fraction > 0.99);
    }

    #[test]
    fn test_volume_persists_across_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        player.set_volume(0.3);
        assert_eq!(player.state().volume, 0.3);

        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");

        // The fixture peaks at 0.5, so rendered output peaks near 0.15
        let mut out = vec![0.0f32; 256];
        player.mixer.lock().fill(&mut out);
        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.05 && peak <= 0.16, "peak {peak}");
    }

    #[test]
    fn test_volume_clamped_to_unit_range() {
        let mut player = test_player();
        player.set_volume(1.7);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-0.2);
        assert_eq!(player.volume(), 0.0);
    }

    #[test]
    fn test_load_replaces_current_track() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = write_wav(dir.path(), "first.wav", 8_000, 8_000, 1);
        let second = write_wav(dir.path(), "second.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let first = player.add_file(first);
        let second = player.add_file(second);
        player.load_and_play(&first).expect("load");
        let rx = player.events();
        let _ = drain_events(&rx);

        player.load_and_play(&second).expect("load");
        assert_eq!(player.state().title, Some("second".to_string()));
        assert_eq!(
            transport_events(&rx),
            vec![
                PlayerEvent::TrackChanged {
                    title: Some("second".to_string())
                },
                PlayerEvent::PlayStateChanged { playing: true },
            ]
        );
    }

    #[test]
    fn test_unplayable_file_keeps_current_track() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");
        let rx = player.events();
        let _ = drain_events(&rx);

        let err = player
            .load_and_play(&TrackRef::new("/nope/notes.txt"))
            .unwrap_err();
        assert!(matches!(
            err,
            PlayerError::Decode(DecodeError::UnsupportedFormat(_))
        ));

        // Still playing the original track
        assert_eq!(player.status(), PlaybackStatus::Playing);
        assert_eq!(player.state().title, Some("song".to_string()));
        assert_eq!(
            transport_events(&rx),
            vec![PlayerEvent::Error(err)]
        );
    }

    #[test]
    fn test_missing_file_reports_io_error() {
        let mut player = test_player();
        let err = player
            .load_and_play(&TrackRef::new("/nope/gone.wav"))
            .unwrap_err();
        assert!(matches!(err, PlayerError::Decode(DecodeError::Io(_))));
        assert_eq!(player.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn test_device_failure_surfaces_and_stays_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = Player::with_output(Box::new(NullOutput::failing()));
        let rx = player.events();
        let track = player.add_file(path);

        let err = player.load_and_play(&track).unwrap_err();
        assert!(matches!(err, PlayerError::Device(_)));
        assert_eq!(player.status(), PlaybackStatus::Idle);
        assert_eq!(transport_events(&rx), vec![PlayerEvent::Error(err)]);
    }

    #[test]
    fn test_next_and_prev_wrap_playlist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = write_wav(dir.path(), "first.wav", 8_000, 8_000, 1);
        let second = write_wav(dir.path(), "second.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let first = player.add_file(first);
        player.add_file(second);
        player.load_and_play(&first).expect("load");

        player.next().expect("next");
        assert_eq!(player.state().title, Some("second".to_string()));

        // Wraps back to the first entry
        player.next().expect("next");
        assert_eq!(player.state().title, Some("first".to_string()));

        // And backwards over the same boundary
        player.prev().expect("prev");
        assert_eq!(player.state().title, Some("second".to_string()));
    }

    #[test]
    fn test_next_on_empty_playlist_is_noop() {
        let mut player = test_player();
        let rx = player.events();

        player.next().expect("next");
        player.prev().expect("prev");
        assert_eq!(player.status(), PlaybackStatus::Idle);
        assert!(drain_events(&rx).is_empty());
    }

    #[test]
    fn test_select_out_of_range_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        player.add_file(path);
        player.select(5).expect("select");

        assert_eq!(player.status(), PlaybackStatus::Idle);
        assert_eq!(player.playlist().current_index(), Some(0));
    }

    #[test]
    fn test_clear_playlist_stops_playback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_wav(dir.path(), "song.wav", 8_000, 8_000, 1);

        let mut player = test_player();
        let track = player.add_file(path);
        player.load_and_play(&track).expect("load");

        player.clear_playlist();
        assert_eq!(player.status(), PlaybackStatus::Idle);
        assert!(player.playlist().is_empty());
    }

    #[test]
    fn test_idle_snapshot_has_defaults() {
        let player = test_player();
        let state = player.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert_eq!(state.title, None);
        assert_eq!(state.progress.elapsed, "00:00");
        assert_eq!(state.volume, DEFAULT_VOLUME);
    }

    #[test]
    fn test_seek_target_frame_endpoints() {
        assert_eq!(seek_target_frame(0.0, 1_000), 0);
        assert_eq!(seek_target_frame(1.0, 1_000), 999);
        assert_eq!(seek_target_frame(0.5, 1_000), 500);
        assert_eq!(seek_target_frame(0.5, 0), 0);
    }
}
