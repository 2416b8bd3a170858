//! Player facade
//!
//! The thin public surface over the player loop: transport calls lower to
//! command sends, read-only properties project the shared state, and
//! front-ends extend behaviour through [`PlayerHooks`] or by subscribing to
//! the broadcast event stream.

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::events::{PlaybackEndResult, PlayerEvent, PlayerState, RepeatMode};
use crate::playback::engine::{PlayerCommand, PlayerEngine};
use crate::playback::session::CurrentSessionInfo;
use crate::sink::AudioSink;
use crate::source::AudioSource;
use crate::state::SharedState;
use crate::track::Track;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Extension points for front-ends.
///
/// Hooks are invoked synchronously from the player loop step, before the
/// matching event is re-broadcast; keep them fast. The `on_before_*` hooks
/// may transform their payload or veto the action by returning an empty
/// sequence / `None`.
pub trait PlayerHooks: Send + Sync {
    fn on_started(&self) {}
    fn on_state_changed(&self, _state: PlayerState) {}
    fn on_track_changed(&self, _track: Option<&Track>) {}
    fn on_session_ended(&self, _track: &Track, _result: &PlaybackEndResult) {}
    fn on_before_enqueue(&self, tracks: Vec<Track>) -> Vec<Track> {
        tracks
    }
    fn on_after_enqueue(&self, _tracks: &[Track]) {}
    fn on_before_play_now(&self, track: Track) -> Option<Track> {
        Some(track)
    }
    fn on_after_play_now(&self, _track: &Track) {}
    fn on_loop_faulted(&self, _error: &Error) {}
}

/// Hooks implementation that does nothing
pub struct NoopHooks;

impl PlayerHooks for NoopHooks {}

/// The public player handle
pub struct Player {
    shared: Arc<SharedState>,
    cmd_tx: tokio::sync::mpsc::Sender<PlayerCommand>,
    lifetime: CancellationToken,
    hooks: Arc<dyn PlayerHooks>,
    sink: Arc<dyn AudioSink>,
    engine: Mutex<Option<PlayerEngine>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Player {
    pub fn new(
        config: PlayerConfig,
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self::with_hooks(config, source, sink, Arc::new(NoopHooks))
    }

    pub fn with_hooks(
        config: PlayerConfig,
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
        hooks: Arc<dyn PlayerHooks>,
    ) -> Self {
        let shared = Arc::new(SharedState::new());
        let lifetime = CancellationToken::new();
        let (engine, cmd_tx) = PlayerEngine::new(
            &config,
            Arc::clone(&shared),
            Arc::clone(&hooks),
            source,
            Arc::clone(&sink),
            lifetime.clone(),
        );
        Self {
            shared,
            cmd_tx,
            lifetime,
            hooks,
            sink,
            engine: Mutex::new(Some(engine)),
            loop_handle: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Spawn the player loop. Idempotent: the second call is a no-op.
    pub fn start(&self) {
        let Some(engine) = self.engine.lock().unwrap().take() else {
            return;
        };
        self.hooks.on_started();

        let hooks = Arc::clone(&self.hooks);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            // Lifetime cancellation is a clean exit; anything else is a
            // loop fault surfaced to the hooks.
            if let Err(e) = engine.run().await {
                error!("player loop faulted: {e}");
                hooks.on_loop_faulted(&e);
                shared.broadcast_event(PlayerEvent::LoopFaulted {
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
        });
        *self.loop_handle.lock().unwrap() = Some(handle);
    }

    /// Append tracks to the queue
    pub async fn enqueue(&self, tracks: Vec<Track>) -> Result<()> {
        let tracks = self.hooks.on_before_enqueue(tracks);
        if tracks.is_empty() {
            return Ok(());
        }
        self.send(PlayerCommand::Enqueue(tracks.clone())).await?;
        self.hooks.on_after_enqueue(&tracks);
        Ok(())
    }

    /// Pre-empt the current session and play this track immediately
    pub async fn play_now(&self, track: Track) -> Result<()> {
        let Some(track) = self.hooks.on_before_play_now(track) else {
            return Ok(());
        };
        self.send(PlayerCommand::PlayNow(track.clone())).await?;
        self.hooks.on_after_play_now(&track);
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(PlayerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(PlayerCommand::Resume).await
    }

    pub async fn skip(&self) -> Result<()> {
        self.send(PlayerCommand::Skip).await
    }

    /// Cancel the current session and clear the queue. Channel errors are
    /// swallowed: stopping a dead loop is a no-op.
    pub async fn stop(&self) {
        if let Err(e) = self.send(PlayerCommand::Stop).await {
            warn!("stop ignored: {e}");
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.send(PlayerCommand::Clear).await
    }

    pub fn state(&self) -> PlayerState {
        self.shared.state()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.shared.repeat_mode()
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.shared.set_repeat_mode(mode);
    }

    pub fn shuffle(&self) -> bool {
        self.shared.shuffle()
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        self.shared.set_shuffle(shuffle);
    }

    /// Snapshot of the live session, absent when nothing is playing
    pub fn current_session(&self) -> Option<CurrentSessionInfo> {
        self.shared.current_session_info()
    }

    /// Read-only copy of the pending queue
    pub fn queue_snapshot(&self) -> Vec<Track> {
        self.shared.queue_snapshot()
    }

    /// Subscribe to the player event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.subscribe_events()
    }

    /// Soft-stop, cancel the loop lifetime, await loop termination, and shut
    /// the sink down. Safe to call more than once.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop().await;
        self.lifetime.cancel();

        let handle = self.loop_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("player loop join error: {e}");
            }
        }

        if let Err(e) = self.sink.shutdown().await {
            warn!("sink shutdown failed: {e}");
        }
    }

    async fn send(&self, cmd: PlayerCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::Channel("player loop is not running".into()))
    }
}
