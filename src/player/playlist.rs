//! Playlist store with a wraparound cursor.

use std::path::{Path, PathBuf};

/// Handle to a playable file in the playlist.
///
/// Immutable once added; cloning is cheap enough to hand copies to the
/// presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    path: PathBuf,
}

impl TrackRef {
    /// Create a track reference from a file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display title derived from the file name (stem without extension).
    ///
    /// Used as the fallback when the file carries no title tag.
    pub fn display_title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Ordered track sequence plus a current-index cursor.
///
/// Insertion order is playback order. The cursor is either `None` (nothing
/// selected) or a valid index into the sequence; `advance`/`retreat` wrap
/// around at both ends.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<TrackRef>,
    current: Option<usize>,
}

impl Playlist {
    /// Create an empty playlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the playlist is empty.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// All tracks in playback order.
    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    /// Append a track to the end.
    ///
    /// The first append also points the cursor at index 0 so the playlist
    /// is immediately playable.
    pub fn append(&mut self, track: TrackRef) {
        self.tracks.push(track);
        if self.current.is_none() {
            self.current = Some(0);
        }
    }

    /// Remove all tracks and reset the cursor.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = None;
    }

    /// Current cursor position, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Track at the cursor, if any.
    pub fn current(&self) -> Option<&TrackRef> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    /// Advance the cursor, wrapping past the last track to the first.
    ///
    /// Returns the new current track, or `None` on an empty playlist
    /// (cursor untouched).
    pub fn advance(&mut self) -> Option<&TrackRef> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let next = match self.current {
            Some(i) => (i + 1) % len,
            None => 0,
        };
        self.current = Some(next);
        self.current()
    }

    /// Retreat the cursor, wrapping past the first track to the last.
    ///
    /// Returns the new current track, or `None` on an empty playlist.
    pub fn retreat(&mut self) -> Option<&TrackRef> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let prev = match self.current {
            Some(i) => (i + len - 1) % len,
            None => len - 1,
        };
        self.current = Some(prev);
        self.current()
    }

    /// Point the cursor at a specific index.
    ///
    /// Returns the track at that index, or `None` (cursor untouched) if the
    /// index is out of range.
    pub fn select(&mut self, index: usize) -> Option<&TrackRef> {
        if index < self.tracks.len() {
            self.current = Some(index);
            self.current()
        } else {
            None
        }
    }
}
