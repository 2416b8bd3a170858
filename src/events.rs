//! Player state, repeat mode, and the public event stream
//!
//! Events are emitted synchronously from the player loop step and re-broadcast
//! to any number of front-end subscribers; a lagging subscriber misses events
//! rather than stalling playback.

use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// No session and nothing queued
    Idle,
    /// A session is streaming
    Playing,
    /// A session exists with its pause gate reset
    Paused,
    /// Explicitly stopped; only an enqueue leaves this state
    Stopped,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerState::Idle => "idle",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Queue re-entry policy applied when a session completes naturally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    None,
    One,
    All,
}

impl RepeatMode {
    /// Stable index for atomic storage
    pub(crate) fn index(self) -> u8 {
        match self {
            RepeatMode::None => 0,
            RepeatMode::One => 1,
            RepeatMode::All => 2,
        }
    }

    pub(crate) fn from_index(index: u8) -> RepeatMode {
        match index {
            1 => RepeatMode::One,
            2 => RepeatMode::All,
            _ => RepeatMode::None,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepeatMode::None => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        };
        f.write_str(s)
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    /// Accepts `off|one|track|all`; `track` is a synonym for `one`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::None),
            "one" | "track" => Ok(RepeatMode::One),
            "all" => Ok(RepeatMode::All),
            other => Err(format!("unknown repeat mode: {other}")),
        }
    }
}

/// Why a playback session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// The stream drained to end-of-stream and the sink flushed
    Completed,
    /// The session's cancel token tripped (skip, stop, play-now, dispose)
    Cancelled,
    /// All attempts exhausted or a fatal sink error
    Failed,
}

/// Terminal report of one playback session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEndResult {
    pub reason: PlaybackEndReason,
    /// Free-form context, e.g. "maximum attempts reached"
    pub details: Option<String>,
    /// Underlying cause; present only for `Failed` with a known error
    pub error: Option<String>,
}

impl PlaybackEndResult {
    pub fn completed() -> Self {
        Self {
            reason: PlaybackEndReason::Completed,
            details: None,
            error: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            reason: PlaybackEndReason::Cancelled,
            details: None,
            error: None,
        }
    }

    pub fn failed(details: impl Into<String>, error: Option<String>) -> Self {
        Self {
            reason: PlaybackEndReason::Failed,
            details: Some(details.into()),
            error,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.reason == PlaybackEndReason::Completed
    }
}

/// Events published by the player loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Transport state changed
    StateChanged {
        state: PlayerState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new track started, or `None` when playback drained to idle
    TrackChanged {
        track: Option<Track>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session reached a terminal state
    SessionEnded {
        track: Track,
        result: PlaybackEndResult,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The player loop died on an unhandled error
    LoopFaulted {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_mode_parsing() {
        assert_eq!("off".parse::<RepeatMode>().unwrap(), RepeatMode::None);
        assert_eq!("one".parse::<RepeatMode>().unwrap(), RepeatMode::One);
        assert_eq!("track".parse::<RepeatMode>().unwrap(), RepeatMode::One);
        assert_eq!("ALL".parse::<RepeatMode>().unwrap(), RepeatMode::All);
        assert!("sometimes".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn repeat_mode_index_round_trips() {
        for mode in [RepeatMode::None, RepeatMode::One, RepeatMode::All] {
            assert_eq!(RepeatMode::from_index(mode.index()), mode);
        }
    }

    #[test]
    fn failed_result_carries_error() {
        let r = PlaybackEndResult::failed("maximum attempts reached", Some("boom".into()));
        assert_eq!(r.reason, PlaybackEndReason::Failed);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(!r.is_completed());
    }
}
