//! # phono
//!
//! Queue-driven audio player. User inputs (local files, remote media URLs)
//! resolve into tracks, an external transcoder decodes each track to raw PCM
//! (48 kHz stereo s16le), and a back-pressuring sink process plays the bytes.
//!
//! **Architecture:** a single-consumer command loop owns the queue and the
//! current playback session; transport calls and session terminations all
//! arrive as commands on one bounded channel, so every state transition is
//! serialised without locks. See the `playback` module for the loop and the
//! `resolver`/`source`/`sink` modules for the pluggable edges.

pub mod config;
pub mod error;
pub mod events;
pub mod pcm;
pub mod playback;
pub mod resolver;
pub mod sink;
pub mod source;
pub(crate) mod state;
pub mod track;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use events::{PlaybackEndReason, PlaybackEndResult, PlayerEvent, PlayerState, RepeatMode};
pub use playback::{CurrentSessionInfo, NoopHooks, Player, PlayerHooks};
pub use track::{Track, TrackKind, TrackRequest};
