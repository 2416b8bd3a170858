//! Source routing by track kind

use crate::error::{Error, Result};
use crate::source::{AudioReader, AudioSource};
use crate::track::{Track, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Selects an inner audio source per track kind, with an optional fallback
pub struct RoutingAudioSource {
    routes: Vec<(TrackKind, Arc<dyn AudioSource>)>,
    fallback: Option<Arc<dyn AudioSource>>,
}

impl RoutingAudioSource {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            fallback: None,
        }
    }

    /// Register the source handling a track kind. Later registrations of the
    /// same kind win.
    pub fn route(mut self, kind: TrackKind, source: Arc<dyn AudioSource>) -> Self {
        self.routes.retain(|(k, _)| *k != kind);
        self.routes.push((kind, source));
        self
    }

    pub fn with_fallback(mut self, source: Arc<dyn AudioSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    fn source_for(&self, kind: TrackKind) -> Result<&Arc<dyn AudioSource>> {
        self.routes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s)
            .or(self.fallback.as_ref())
            .ok_or_else(|| Error::UnsupportedKind(format!("{kind:?}")))
    }

    /// Every distinct inner source, deduplicated by identity
    fn distinct_sources(&self) -> Vec<Arc<dyn AudioSource>> {
        let mut distinct: Vec<Arc<dyn AudioSource>> = Vec::new();
        let all = self
            .routes
            .iter()
            .map(|(_, s)| s)
            .chain(self.fallback.as_ref());
        for source in all {
            if !distinct.iter().any(|seen| Arc::ptr_eq(seen, source)) {
                distinct.push(Arc::clone(source));
            }
        }
        distinct
    }
}

impl Default for RoutingAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioSource for RoutingAudioSource {
    async fn open_reader(
        &self,
        track: &Track,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioReader>> {
        let source = self.source_for(track.kind)?;
        source.open_reader(track, cancel).await
    }

    /// Shut each distinct inner source down exactly once; individual
    /// failures are collected into one aggregate error.
    async fn shutdown(&self) -> Result<()> {
        let mut failures = Vec::new();
        for source in self.distinct_sources() {
            if let Err(e) = source.shutdown().await {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            debug!("source shutdown collected {} failure(s)", failures.len());
            Err(Error::Shutdown(failures))
        }
    }
}
