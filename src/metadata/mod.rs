//! Audio file metadata reading.
//!
//! Uses the lofty crate for format-independent tag access. Fields a file
//! does not carry stay `None`; display fallbacks are the caller's
//! business.

use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;
use std::time::Duration;

/// Tags read from an audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration: Duration,
}

pub fn read_tags(path: &Path) -> Result<TrackTags> {
    // Probe the file to determine format and read tags
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file metadata")?;

    // Get the primary tag, or fall back to the first available tag
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let title = tag.and_then(|t| t.title().map(|s| s.to_string()));
    let artist = tag.and_then(|t| t.artist().map(|s| s.to_string()));
    let album = tag.and_then(|t| t.album().map(|s| s.to_string()));

    let duration = tagged_file.properties().duration();

    Ok(TrackTags {
        title,
        artist,
        album,
        duration,
    })
}
