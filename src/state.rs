//! Shared player state
//!
//! State visible to both the player loop and the facade. The loop is the only
//! writer of `state`, `queue`, and `current`; the facade reads snapshots and
//! writes the `repeat`/`shuffle` knobs, which the loop samples at dequeue and
//! repeat-policy points (the race is benign: the next track uses the
//! latest-observed value).

use crate::events::{PlayerEvent, PlayerState, RepeatMode};
use crate::playback::queue::TrackQueue;
use crate::playback::session::{CurrentSessionInfo, PlaybackSession};
use crate::track::Track;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub(crate) struct SharedState {
    state: Mutex<PlayerState>,
    repeat: AtomicU8,
    shuffle: AtomicBool,
    pub(crate) queue: Mutex<TrackQueue>,
    current: Mutex<Option<Arc<PlaybackSession>>>,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Mutex::new(PlayerState::Idle),
            repeat: AtomicU8::new(RepeatMode::None.index()),
            shuffle: AtomicBool::new(false),
            queue: Mutex::new(TrackQueue::new()),
            current: Mutex::new(None),
            event_tx,
        }
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock().unwrap()
    }

    /// Store a new transport state; returns whether it actually changed
    pub fn set_state(&self, state: PlayerState) -> bool {
        let mut guard = self.state.lock().unwrap();
        if *guard == state {
            false
        } else {
            *guard = state;
            true
        }
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        RepeatMode::from_index(self.repeat.load(Ordering::Relaxed))
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.repeat.store(mode.index(), Ordering::Relaxed);
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle.load(Ordering::Relaxed)
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        self.shuffle.store(shuffle, Ordering::Relaxed);
    }

    pub fn set_current(&self, session: Option<Arc<PlaybackSession>>) {
        *self.current.lock().unwrap() = session;
    }

    pub fn current_session_info(&self) -> Option<CurrentSessionInfo> {
        let state = self.state();
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| session.info(state))
    }

    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.queue.lock().unwrap().snapshot()
    }

    /// Broadcast an event; no receivers is fine
    pub fn broadcast_event(&self, event: PlayerEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
