//! Track and track-request records

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What backs a track, and which source/resolver handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// A file on the local filesystem
    LocalFile,
    /// A remote media URL (resolved through the metadata probe)
    Remote,
}

/// An immutable playable item
///
/// Equality is structural; queue de-duplication keys off `uri` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier: a file path or a URL
    pub uri: String,
    /// Human-readable title
    pub title: String,
    /// Source routing key
    pub kind: TrackKind,
    /// Duration reported by the resolver, when known
    pub duration_hint: Option<Duration>,
}

impl Track {
    /// A track backed by a local file
    pub fn local(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
            kind: TrackKind::LocalFile,
            duration_hint: None,
        }
    }

    /// A track backed by a remote URL
    pub fn remote(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
            kind: TrackKind::Remote,
            duration_hint: None,
        }
    }

    /// Attach a duration hint
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_hint = Some(duration);
        self
    }
}

/// A raw user input waiting to be resolved into tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRequest {
    /// The string the user typed: a path, a URL, anything
    pub raw: String,
    /// Optional routing hint bypassing resolver sniffing
    pub kind_hint: Option<TrackKind>,
}

impl TrackRequest {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            kind_hint: None,
        }
    }

    pub fn with_hint(raw: impl Into<String>, hint: TrackKind) -> Self {
        Self {
            raw: raw.into(),
            kind_hint: Some(hint),
        }
    }
}
