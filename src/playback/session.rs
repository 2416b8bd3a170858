//! Playback session
//!
//! One session manages a single track's playback attempts: it opens a PCM
//! reader from the source, pumps bytes through the pause gate into the sink,
//! and retries transient failures with linear backoff. The owning loop
//! observes termination through the `SessionEnded` command the session task
//! enqueues after `run` returns.

use crate::error::{Error, Result};
use crate::events::{PlaybackEndResult, PlayerState};
use crate::pcm::{format_elapsed, PcmProfile};
use crate::playback::gate::PauseGate;
use crate::sink::AudioSink;
use crate::source::{AudioReader, AudioSource};
use crate::track::Track;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared pool of transfer buffers for session copy loops.
///
/// Rented buffers return to the pool on drop, so steady-state playback does
/// no per-read allocation.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Take a buffer from the pool, allocating when empty
    pub fn rent(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size]);
        PooledBuffer {
            pool: Arc::clone(self),
            buf: Some(buf),
        }
    }

    fn hand_back(&self, buf: Vec<u8>) {
        self.free.lock().unwrap().push(buf);
    }
}

/// A transfer buffer on loan from a [`BufferPool`]
pub struct PooledBuffer {
    pool: Arc<BufferPool>,
    buf: Option<Vec<u8>>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.hand_back(buf);
        }
    }
}

/// Snapshot of the live session, projected for status displays
#[derive(Debug, Clone)]
pub struct CurrentSessionInfo {
    pub track: Track,
    pub state: PlayerState,
    /// Monotonic session construction time; set exactly once
    pub started_at: Instant,
    /// Wall-clock counterpart of `started_at`, for display
    pub started_at_utc: chrono::DateTime<chrono::Utc>,
}

impl CurrentSessionInfo {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Everything a session needs to stream one track
#[derive(Clone)]
pub(crate) struct SessionEnv {
    pub source: Arc<dyn AudioSource>,
    pub sink: Arc<dyn AudioSink>,
    pub pool: Arc<BufferPool>,
    pub profile: PcmProfile,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub progress_bytes: u64,
    pub progress_interval: Duration,
}

impl SessionEnv {
    /// Byte step between progress reports: the 1 MiB boundary or the
    /// interval boundary, whichever arrives first. 0 disables reporting.
    fn progress_step(&self) -> u64 {
        let interval_bytes = self.profile.bytes_for(self.progress_interval);
        match (self.progress_bytes, interval_bytes) {
            (0, b) => b,
            (a, 0) => a,
            (a, b) => a.min(b),
        }
    }
}

/// One track's playback attempt(s), cancellation, and retries
pub struct PlaybackSession {
    id: Uuid,
    track: Track,
    gate: Arc<PauseGate>,
    cancel: CancellationToken,
    started_at: Instant,
    started_at_utc: chrono::DateTime<chrono::Utc>,
    bytes_streamed: AtomicU64,
}

impl PlaybackSession {
    /// Create a session with its lifetime linked under `parent`.
    /// The gate starts signalled: new sessions play immediately.
    pub fn new(track: Track, parent: &CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            track,
            gate: Arc::new(PauseGate::new(true)),
            cancel: parent.child_token(),
            started_at: Instant::now(),
            started_at_utc: chrono::Utc::now(),
            bytes_streamed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn bytes_streamed(&self) -> u64 {
        self.bytes_streamed.load(Ordering::Acquire)
    }

    /// Stall the copy loop before its next read
    pub fn pause(&self) {
        self.gate.reset();
    }

    /// Release the copy loop
    pub fn resume(&self) {
        self.gate.set();
    }

    /// Trip the session's cancel token
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Release any parked waiter. The owner cancels the session's lifetime
    /// before awaiting its task; disposal only needs to open the gate.
    pub fn dispose(&self) {
        self.gate.set();
    }

    pub fn info(&self, state: PlayerState) -> CurrentSessionInfo {
        CurrentSessionInfo {
            track: self.track.clone(),
            state,
            started_at: self.started_at,
            started_at_utc: self.started_at_utc,
        }
    }

    /// Stream the track to the sink, retrying transient failures.
    ///
    /// Never returns an error: every exit path maps to a terminal
    /// [`PlaybackEndResult`].
    pub(crate) async fn run(&self, env: &SessionEnv) -> PlaybackEndResult {
        let mut last_error: Option<String> = None;

        for attempt in 1..=env.max_attempts {
            if self.cancel.is_cancelled() {
                return PlaybackEndResult::cancelled();
            }

            match self.attempt(env, attempt).await {
                Ok(()) => {
                    info!(
                        "completed {} ({} bytes, {})",
                        self.track.uri,
                        self.bytes_streamed(),
                        format_elapsed(env.profile.duration_for_bytes(self.bytes_streamed()))
                    );
                    return PlaybackEndResult::completed();
                }
                Err(Error::Cancelled) => {
                    debug!("session for {} cancelled", self.track.uri);
                    return PlaybackEndResult::cancelled();
                }
                Err(Error::Sink(message)) => {
                    // Sink failures are fatal for the session: replaying the
                    // track cannot bring the output back.
                    warn!("sink failure for {}, not retrying: {message}", self.track.uri);
                    return PlaybackEndResult::failed("sink failure", Some(message));
                }
                Err(e) => {
                    warn!(
                        "attempt {attempt}/{} failed for {}: {e}",
                        env.max_attempts, self.track.uri
                    );
                    last_error = Some(e.to_string());
                    if attempt < env.max_attempts {
                        let backoff = env.retry_base * attempt;
                        tokio::select! {
                            _ = self.cancel.cancelled() => return PlaybackEndResult::cancelled(),
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }

        PlaybackEndResult::failed("maximum attempts reached", last_error)
    }

    async fn attempt(&self, env: &SessionEnv, attempt: u32) -> Result<()> {
        // A retry replays the track from the top.
        self.bytes_streamed.store(0, Ordering::Release);
        debug!(
            "session {}: attempt {attempt}: opening reader for {}",
            self.id, self.track.uri
        );

        let mut reader = env.source.open_reader(&self.track, &self.cancel).await?;
        let copied = self.copy(reader.as_mut(), env).await;
        if let Err(e) = reader.close().await {
            warn!("reader close failed for {}: {e}", self.track.uri);
        }
        copied?;

        env.sink.complete(&self.cancel).await?;
        Ok(())
    }

    async fn copy(&self, reader: &mut dyn AudioReader, env: &SessionEnv) -> Result<()> {
        let mut buf = env.pool.rent();
        let step = env.progress_step();
        let mut next_report = step;

        loop {
            // The gate is checked before each read so a pause strands no
            // partial frame: in-flight writes finish, the next read waits.
            self.gate.wait(&self.cancel).await?;

            let n = reader.read(&mut buf, &self.cancel).await?;
            if n == 0 {
                break;
            }

            env.sink.write(&buf[..n], &self.cancel).await?;

            let total = self.bytes_streamed.fetch_add(n as u64, Ordering::AcqRel) + n as u64;
            if step > 0 && total >= next_report {
                debug!(
                    "{}: {} KiB streamed ({})",
                    self.track.title,
                    total / 1024,
                    format_elapsed(env.profile.duration_for_bytes(total))
                );
                while next_report <= total {
                    next_report += step;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlaybackEndReason;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Source that fails the first `failures` opens, then streams `size` bytes
    struct ScriptedSource {
        failures: AtomicUsize,
        size: usize,
        opens: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(failures: usize, size: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                size,
                opens: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AudioSource for ScriptedSource {
        async fn open_reader(
            &self,
            _track: &Track,
            _cancel: &CancellationToken,
        ) -> Result<Box<dyn AudioReader>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Source("scripted open failure".into()));
            }
            Ok(Box::new(CountingReader { left: self.size }))
        }
    }

    struct CountingReader {
        left: usize,
    }

    #[async_trait]
    impl AudioReader for CountingReader {
        async fn read(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = self.left.min(buf.len());
            self.left -= n;
            Ok(n)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        written: AtomicU64,
        completes: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for CountingSink {
        async fn write(&self, buf: &[u8], _cancel: &CancellationToken) -> Result<()> {
            self.written.fetch_add(buf.len() as u64, Ordering::SeqCst);
            Ok(())
        }

        async fn complete(&self, _cancel: &CancellationToken) -> Result<()> {
            self.completes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Sink whose writes always fail
    struct BrokenSink;

    #[async_trait]
    impl AudioSink for BrokenSink {
        async fn write(&self, _buf: &[u8], _cancel: &CancellationToken) -> Result<()> {
            Err(Error::Sink("scripted sink failure".into()))
        }

        async fn complete(&self, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    fn env(source: Arc<ScriptedSource>, sink: Arc<dyn AudioSink>) -> SessionEnv {
        SessionEnv {
            source,
            sink,
            pool: Arc::new(BufferPool::new(8 * 1024)),
            profile: PcmProfile::default(),
            max_attempts: 3,
            retry_base: Duration::from_millis(10),
            progress_bytes: 1024 * 1024,
            progress_interval: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn clean_stream_completes() {
        let source = Arc::new(ScriptedSource::new(0, 100_000));
        let sink = Arc::new(CountingSink::default());
        let session = PlaybackSession::new(Track::local("/a", "a"), &CancellationToken::new());

        let result = session.run(&env(Arc::clone(&source), Arc::clone(&sink) as Arc<dyn AudioSink>)).await;
        assert_eq!(result.reason, PlaybackEndReason::Completed);
        assert_eq!(sink.written.load(Ordering::SeqCst), 100_000);
        assert_eq!(sink.completes.load(Ordering::SeqCst), 1);
        assert_eq!(session.bytes_streamed(), 100_000);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let source = Arc::new(ScriptedSource::new(2, 50_000));
        let sink = Arc::new(CountingSink::default());
        let session = PlaybackSession::new(Track::local("/a", "a"), &CancellationToken::new());

        let result = session.run(&env(Arc::clone(&source), Arc::clone(&sink) as Arc<dyn AudioSink>)).await;
        assert_eq!(result.reason, PlaybackEndReason::Completed);
        assert_eq!(source.opens.load(Ordering::SeqCst), 3);
        assert_eq!(sink.written.load(Ordering::SeqCst), 50_000);
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_with_last_error() {
        let source = Arc::new(ScriptedSource::new(10, 0));
        let sink = Arc::new(CountingSink::default());
        let session = PlaybackSession::new(Track::local("/a", "a"), &CancellationToken::new());

        let result = session.run(&env(Arc::clone(&source), Arc::clone(&sink) as Arc<dyn AudioSink>)).await;
        assert_eq!(result.reason, PlaybackEndReason::Failed);
        assert_eq!(result.details.as_deref(), Some("maximum attempts reached"));
        assert!(result.error.unwrap().contains("scripted open failure"));
        assert_eq!(source.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn sink_failure_is_fatal_without_retry() {
        let source = Arc::new(ScriptedSource::new(0, 100_000));
        let sink = Arc::new(BrokenSink);
        let session = PlaybackSession::new(Track::local("/a", "a"), &CancellationToken::new());

        let result = session.run(&env(Arc::clone(&source), sink)).await;
        assert_eq!(result.reason, PlaybackEndReason::Failed);
        assert_eq!(result.details.as_deref(), Some("sink failure"));
        assert_eq!(result.error.as_deref(), Some("scripted sink failure"));
        // A dead sink must not burn the retry budget.
        assert_eq!(source.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_before_start_is_cancelled() {
        let source = Arc::new(ScriptedSource::new(0, 10));
        let sink = Arc::new(CountingSink::default());
        let parent = CancellationToken::new();
        let session = PlaybackSession::new(Track::local("/a", "a"), &parent);

        session.cancel();
        let result = session.run(&env(source, sink)).await;
        assert_eq!(result.reason, PlaybackEndReason::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_while_paused_releases_promptly() {
        let source = Arc::new(ScriptedSource::new(0, 1_000_000));
        let sink = Arc::new(CountingSink::default());
        let session = Arc::new(PlaybackSession::new(
            Track::local("/a", "a"),
            &CancellationToken::new(),
        ));
        let env = env(source, sink);

        session.pause();
        let runner = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run(&env).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("cancel must release the paused session")
            .unwrap();
        assert_eq!(result.reason, PlaybackEndReason::Cancelled);
    }

    #[test]
    fn pool_reuses_buffers() {
        let pool = Arc::new(BufferPool::new(1024));
        {
            let mut a = pool.rent();
            a[0] = 7;
        }
        let b = pool.rent();
        assert_eq!(b.len(), 1024);
        assert_eq!(pool.free.lock().unwrap().len(), 0);
        drop(b);
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
