//! Playback subsystem: pause gate, queue, session pipeline, player loop,
//! and the public facade

pub mod gate;
pub mod queue;
pub mod session;
pub(crate) mod engine;
pub mod player;

pub use gate::PauseGate;
pub use player::{NoopHooks, Player, PlayerHooks};
pub use queue::TrackQueue;
pub use session::{BufferPool, CurrentSessionInfo, PlaybackSession};
