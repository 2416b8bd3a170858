//! Player loop
//!
//! The single-consumer command loop owning the queue, the current session,
//! and all state transitions. Every input arrives as a [`PlayerCommand`] on
//! one bounded channel (user transport calls and session terminations
//! alike), so effects are serialised without locks: a session reports its
//! end by enqueueing `SessionEnded` rather than touching the loop's state
//! from its own task.
//!
//! Failure isolation: errors from a command handler are logged and the loop
//! keeps running. A fault from the loop body itself (in practice a panicking
//! front-end hook, which runs on this task) tears the loop down and is
//! surfaced through `on_loop_faulted`.

use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::events::{PlaybackEndResult, PlayerEvent, PlayerState, RepeatMode};
use crate::playback::player::PlayerHooks;
use crate::playback::session::{BufferPool, PlaybackSession, SessionEnv};
use crate::sink::AudioSink;
use crate::source::AudioSource;
use crate::state::SharedState;
use crate::track::Track;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Inputs to the player loop. `SessionEnded` is internal: only session
/// continuations enqueue it.
#[derive(Debug)]
pub(crate) enum PlayerCommand {
    Enqueue(Vec<Track>),
    PlayNow(Track),
    Pause,
    Resume,
    Skip,
    Stop,
    Clear,
    SessionEnded {
        track: Track,
        result: PlaybackEndResult,
    },
}

struct SessionSlot {
    session: Arc<PlaybackSession>,
    handle: JoinHandle<()>,
}

/// Render a caught panic payload for the loop-fault error
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) struct PlayerEngine {
    shared: Arc<SharedState>,
    hooks: Arc<dyn PlayerHooks>,
    env: SessionEnv,
    cmd_tx: mpsc::Sender<PlayerCommand>,
    cmd_rx: mpsc::Receiver<PlayerCommand>,
    lifetime: CancellationToken,
    session: Option<SessionSlot>,
    /// A `Stop` is in flight: its cancelled session has not reported back yet
    stopping: bool,
    /// Track to start as soon as the pre-empted session reports back
    pending_play_now: Option<Track>,
}

impl PlayerEngine {
    pub fn new(
        config: &PlayerConfig,
        shared: Arc<SharedState>,
        hooks: Arc<dyn PlayerHooks>,
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
        lifetime: CancellationToken,
    ) -> (Self, mpsc::Sender<PlayerCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.queue_capacity);
        let env = SessionEnv {
            source,
            sink,
            pool: Arc::new(BufferPool::new(config.transfer_buffer_size)),
            profile: crate::pcm::PcmProfile::default(),
            max_attempts: config.max_attempts,
            retry_base: config.retry_base(),
            progress_bytes: config.progress_log_bytes,
            progress_interval: config.progress_log_interval(),
        };
        let engine = Self {
            shared,
            hooks,
            env,
            cmd_tx: cmd_tx.clone(),
            cmd_rx,
            lifetime,
            session: None,
            stopping: false,
            pending_play_now: None,
        };
        (engine, cmd_tx)
    }

    /// Run until the lifetime cancels, every command sender is gone, or the
    /// loop body faults. A fault is returned as `Err` after teardown so the
    /// owner can surface it.
    pub async fn run(mut self) -> Result<()> {
        debug!("player loop started");
        loop {
            tokio::select! {
                _ = self.lifetime.cancelled() => {
                    debug!("player loop lifetime cancelled");
                    break;
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None => {
                            debug!("command channel closed, player loop exiting");
                            break;
                        }
                        Some(cmd) => {
                            // Handler errors never take the loop down; an
                            // Internal fault does.
                            if let Err(e) = self.handle(cmd).await {
                                if matches!(e, Error::Internal(_)) {
                                    error!("player loop fault: {e}");
                                    self.teardown().await;
                                    return Err(e);
                                }
                                error!("command handler error: {e}");
                            }
                            if let Err(e) = self.autostart_if_ready() {
                                error!("player loop fault: {e}");
                                self.teardown().await;
                                return Err(e);
                            }
                        }
                    }
                }
            }
        }
        self.teardown().await;
        Ok(())
    }

    async fn handle(&mut self, cmd: PlayerCommand) -> Result<()> {
        match cmd {
            PlayerCommand::Enqueue(tracks) => {
                self.handle_enqueue(tracks);
                Ok(())
            }
            PlayerCommand::PlayNow(track) => self.handle_play_now(track),
            PlayerCommand::Pause => self.handle_pause(),
            PlayerCommand::Resume => self.handle_resume(),
            PlayerCommand::Skip => {
                self.handle_skip();
                Ok(())
            }
            PlayerCommand::Stop => self.handle_stop(),
            PlayerCommand::Clear => {
                self.handle_clear();
                Ok(())
            }
            PlayerCommand::SessionEnded { track, result } => {
                self.handle_session_ended(track, result).await
            }
        }
    }

    fn handle_enqueue(&mut self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            return;
        }
        debug!("enqueueing {} track(s)", tracks.len());
        self.shared.queue.lock().unwrap().enqueue_back(tracks);
        // New material overrides an in-flight or completed stop.
        self.stopping = false;
        if self.shared.state() == PlayerState::Stopped {
            // Leave Stopped quietly; the autostart step publishes Playing.
            self.shared.set_state(PlayerState::Idle);
        }
    }

    fn handle_play_now(&mut self, track: Track) -> Result<()> {
        debug!("play-now: {}", track.uri);
        self.shared.queue.lock().unwrap().remove_all_by_uri(&track.uri);
        self.stopping = false;
        if self.shared.state() == PlayerState::Stopped {
            self.shared.set_state(PlayerState::Idle);
        }
        match &self.session {
            Some(slot) => {
                // The successor starts only once the cancelled session has
                // reported back and been disposed.
                self.pending_play_now = Some(track);
                slot.session.cancel();
                Ok(())
            }
            None => self.start_track(track),
        }
    }

    fn handle_pause(&mut self) -> Result<()> {
        let Some(slot) = &self.session else {
            return Ok(());
        };
        if self.shared.state() == PlayerState::Playing {
            slot.session.pause();
            self.set_state_emit(PlayerState::Paused)?;
        }
        Ok(())
    }

    fn handle_resume(&mut self) -> Result<()> {
        let Some(slot) = &self.session else {
            return Ok(());
        };
        if self.shared.state() == PlayerState::Paused {
            slot.session.resume();
            self.set_state_emit(PlayerState::Playing)?;
        }
        Ok(())
    }

    fn handle_skip(&mut self) {
        if let Some(slot) = &self.session {
            debug!("skipping {}", slot.session.track().uri);
            slot.session.cancel();
        }
    }

    fn handle_stop(&mut self) -> Result<()> {
        info!("stop requested");
        self.shared.queue.lock().unwrap().clear();
        match &self.session {
            Some(slot) => {
                self.stopping = true;
                self.pending_play_now = None;
                slot.session.cancel();
                Ok(())
            }
            None => self.set_state_emit(PlayerState::Stopped),
        }
    }

    fn handle_clear(&mut self) {
        // Clears pending entries only; the live session keeps playing.
        self.shared.queue.lock().unwrap().clear();
    }

    async fn handle_session_ended(&mut self, track: Track, result: PlaybackEndResult) -> Result<()> {
        let Some(slot) = self.session.take() else {
            warn!("session-ended for {} with no live session", track.uri);
            return Ok(());
        };

        // Dispose before any successor can start: open the gate, then make
        // sure the session task has fully unwound.
        slot.session.dispose();
        if let Err(e) = slot.handle.await {
            warn!("session task join error: {e}");
        }
        self.shared.set_current(None);

        debug!("session ended: {} ({:?})", track.uri, result.reason);
        self.guard_hooks("on_session_ended", || {
            self.hooks.on_session_ended(&track, &result)
        })?;
        self.shared.broadcast_event(PlayerEvent::SessionEnded {
            track: track.clone(),
            result: result.clone(),
            timestamp: chrono::Utc::now(),
        });

        if self.stopping {
            self.stopping = false;
            self.set_state_emit(PlayerState::Stopped)?;
        } else if let Some(next) = self.pending_play_now.take() {
            self.start_track(next)?;
        } else if result.is_completed() {
            // Re-enqueue is keyed off natural completion only; skipped and
            // failed tracks never come back.
            match self.shared.repeat_mode() {
                RepeatMode::One => self.shared.queue.lock().unwrap().enqueue_front(track),
                RepeatMode::All => {
                    self.shared.queue.lock().unwrap().enqueue_back([track]);
                }
                RepeatMode::None => {}
            }
        }
        Ok(())
    }

    /// After every command: start the next queued track, or settle to idle
    fn autostart_if_ready(&mut self) -> Result<()> {
        if self.session.is_some() || self.stopping {
            return Ok(());
        }
        if self.shared.state() == PlayerState::Stopped {
            return Ok(());
        }

        let next = {
            let shuffle = self.shared.shuffle();
            self.shared.queue.lock().unwrap().dequeue_next(shuffle)
        };
        match next {
            Some(track) => self.start_track(track),
            None => {
                if self.shared.state() != PlayerState::Idle {
                    self.emit_track_changed(None)?;
                    self.set_state_emit(PlayerState::Idle)?;
                }
                Ok(())
            }
        }
    }

    fn start_track(&mut self, track: Track) -> Result<()> {
        info!("starting {}", track.uri);
        let session = Arc::new(PlaybackSession::new(track.clone(), &self.lifetime));
        self.shared.set_current(Some(Arc::clone(&session)));
        if let Err(e) = self
            .set_state_emit(PlayerState::Playing)
            .and_then(|_| self.emit_track_changed(Some(track.clone())))
        {
            // The loop is about to die; leave no stale session snapshot.
            self.shared.set_current(None);
            return Err(e);
        }

        let runner = Arc::clone(&session);
        let env = self.env.clone();
        let tx = self.cmd_tx.clone();
        let handle = tokio::spawn(async move {
            let result = runner.run(&env).await;
            if tx
                .send(PlayerCommand::SessionEnded { track, result })
                .await
                .is_err()
            {
                debug!("player loop gone before session termination was delivered");
            }
        });

        self.session = Some(SessionSlot { session, handle });
        Ok(())
    }

    fn set_state_emit(&self, state: PlayerState) -> Result<()> {
        if self.shared.set_state(state) {
            self.guard_hooks("on_state_changed", || self.hooks.on_state_changed(state))?;
            self.shared.broadcast_event(PlayerEvent::StateChanged {
                state,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    fn emit_track_changed(&self, track: Option<Track>) -> Result<()> {
        self.guard_hooks("on_track_changed", || {
            self.hooks.on_track_changed(track.as_ref())
        })?;
        self.shared.broadcast_event(PlayerEvent::TrackChanged {
            track,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }

    /// Run a front-end hook on the loop task, converting a panic into the
    /// loop-fault error.
    fn guard_hooks<R>(&self, name: &str, hook: impl FnOnce() -> R) -> Result<R> {
        std::panic::catch_unwind(AssertUnwindSafe(hook))
            .map_err(|payload| Error::Internal(format!("{name} hook panicked: {}", panic_message(payload))))
    }

    /// Cancel and reap the live session on loop exit
    async fn teardown(&mut self) {
        if let Some(slot) = self.session.take() {
            slot.session.cancel();
            slot.session.dispose();
            let mut handle = slot.handle;
            // Keep draining the channel while we wait so the session task's
            // terminal send cannot block against a full channel.
            loop {
                tokio::select! {
                    joined = &mut handle => {
                        if let Err(e) = joined {
                            warn!("session task join error during teardown: {e}");
                        }
                        break;
                    }
                    cmd = self.cmd_rx.recv() => {
                        if cmd.is_none() {
                            // Every sender is gone, so the session task has
                            // already sent (or dropped) its terminal command.
                            if let Err(e) = (&mut handle).await {
                                warn!("session task join error during teardown: {e}");
                            }
                            break;
                        }
                    }
                }
            }
        }
        self.shared.set_current(None);
        self.cmd_rx.close();
        debug!("player loop terminated");
    }
}
