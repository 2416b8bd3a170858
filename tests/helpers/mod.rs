//! Shared test fixtures: an in-memory scripted audio source and a counting
//! sink, plus event-stream assertion helpers.

use async_trait::async_trait;
use phono::error::{Error, Result};
use phono::sink::AudioSink;
use phono::source::{AudioReader, AudioSource};
use phono::{PlaybackEndReason, PlayerEvent, PlayerState, Track};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Per-uri playback script
struct TrackPlan {
    size: usize,
    fail_opens: usize,
}

/// In-memory audio source serving byte fixtures, optionally failing the
/// first N opens of a track to exercise the retry path.
#[derive(Default)]
pub struct FixtureSource {
    plans: Mutex<HashMap<String, TrackPlan>>,
    opens: Mutex<Vec<(String, Instant)>>,
}

impl FixtureSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_track(&self, uri: &str, size: usize) {
        self.add_flaky_track(uri, size, 0);
    }

    pub fn add_flaky_track(&self, uri: &str, size: usize, fail_opens: usize) {
        self.plans
            .lock()
            .unwrap()
            .insert(uri.to_string(), TrackPlan { size, fail_opens });
    }

    /// Instants at which this uri's reader was opened (including failures)
    pub fn open_times(&self, uri: &str) -> Vec<Instant> {
        self.opens
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == uri)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl AudioSource for FixtureSource {
    async fn open_reader(
        &self,
        track: &Track,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioReader>> {
        self.opens
            .lock()
            .unwrap()
            .push((track.uri.clone(), Instant::now()));

        let mut plans = self.plans.lock().unwrap();
        let plan = plans
            .get_mut(&track.uri)
            .ok_or_else(|| Error::Source(format!("no fixture for {}", track.uri)))?;
        if plan.fail_opens > 0 {
            plan.fail_opens -= 1;
            return Err(Error::Source(format!("scripted open failure for {}", track.uri)));
        }
        Ok(Box::new(FixtureReader {
            remaining: plan.size,
        }))
    }
}

struct FixtureReader {
    remaining: usize,
}

#[async_trait]
impl AudioReader for FixtureReader {
    async fn read(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = self.remaining.min(buf.len());
        self.remaining -= n;
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that counts bytes, optionally sleeping per write to simulate a slow
/// consumer (back-pressure), or failing every write to simulate a dead one.
#[derive(Default)]
pub struct CollectSink {
    written: AtomicU64,
    completes: AtomicUsize,
    write_delay: Option<Duration>,
    fail_writes: bool,
}

impl CollectSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_writes: true,
            ..Default::default()
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::SeqCst)
    }

    pub fn completed_tracks(&self) -> usize {
        self.completes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for CollectSink {
    async fn write(&self, buf: &[u8], cancel: &CancellationToken) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Sink("scripted sink write failure".into()));
        }
        if let Some(delay) = self.write_delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
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

/// Receive the next player event, failing the test after 5 seconds
pub async fn recv_event(rx: &mut broadcast::Receiver<PlayerEvent>) -> PlayerEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for player event")
        .expect("event channel closed or lagged")
}

/// Receive events until one matches, failing the test after 5 seconds
pub async fn recv_until(
    rx: &mut broadcast::Receiver<PlayerEvent>,
    mut pred: impl FnMut(&PlayerEvent) -> bool,
) -> PlayerEvent {
    loop {
        let event = recv_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

pub fn is_state(event: &PlayerEvent, state: PlayerState) -> bool {
    matches!(event, PlayerEvent::StateChanged { state: s, .. } if *s == state)
}

pub fn is_track(event: &PlayerEvent, uri: Option<&str>) -> bool {
    match event {
        PlayerEvent::TrackChanged { track, .. } => track.as_ref().map(|t| t.uri.as_str()) == uri,
        _ => false,
    }
}

pub fn is_session_ended(event: &PlayerEvent, uri: &str, reason: PlaybackEndReason) -> bool {
    matches!(
        event,
        PlayerEvent::SessionEnded { track, result, .. }
            if track.uri == uri && result.reason == reason
    )
}
