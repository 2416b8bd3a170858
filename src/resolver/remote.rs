//! Remote URL resolver
//!
//! Resolves http(s) URLs by asking the metadata probe (yt-dlp) for title and
//! duration. Only metadata is fetched here; the direct media URL is probed
//! again at playback time because it expires. Results go through the request
//! cache when one is configured.

use crate::error::{Error, Result};
use crate::resolver::{RequestCache, TrackResolver};
use crate::track::{Track, TrackKind, TrackRequest};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Build a track from one line of the probe's `-j` output
fn track_from_probe_json(raw: &str, json: &serde_json::Value) -> Track {
    let title = json
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or(raw)
        .to_string();
    let uri = json
        .get("webpage_url")
        .and_then(|v| v.as_str())
        .unwrap_or(raw)
        .to_string();
    let mut track = Track {
        uri,
        title,
        kind: TrackKind::Remote,
        duration_hint: None,
    };
    if let Some(secs) = json.get("duration").and_then(|v| v.as_f64()) {
        if secs.is_finite() && secs > 0.0 {
            track = track.with_duration(Duration::from_secs_f64(secs));
        }
    }
    track
}

/// Resolver for remote media URLs
pub struct RemoteUrlResolver {
    bin: String,
    cache: Option<Arc<RequestCache>>,
    cache_ttl: Duration,
}

impl RemoteUrlResolver {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            cache: None,
            cache_ttl: Duration::ZERO,
        }
    }

    /// Cache probe results under the raw URL for `ttl`
    pub fn with_cache(mut self, cache: Arc<RequestCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    async fn probe(&self, raw: &str, cancel: &CancellationToken) -> Result<Vec<Track>> {
        let child = Command::new(&self.bin)
            .args(["-j", "--no-playlist", raw])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Process(format!("cannot spawn {}: {e}", self.bin)))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            output = child.wait_with_output() => {
                output.map_err(|e| Error::Process(format!("probe wait failed: {e}")))?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Resolve(format!(
                "{raw}: metadata probe failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut tracks = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let json: serde_json::Value = serde_json::from_str(line)
                .map_err(|e| Error::Resolve(format!("{raw}: bad probe output: {e}")))?;
            tracks.push(track_from_probe_json(raw, &json));
        }
        debug!("{raw}: probe yielded {} track(s)", tracks.len());
        Ok(tracks)
    }
}

#[async_trait]
impl TrackResolver for RemoteUrlResolver {
    fn can_resolve(&self, request: &TrackRequest) -> bool {
        match request.kind_hint {
            Some(TrackKind::Remote) => true,
            Some(TrackKind::LocalFile) => false,
            None => request.raw.starts_with("http://") || request.raw.starts_with("https://"),
        }
    }

    async fn resolve(
        &self,
        request: &TrackRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Track>> {
        if let Some(cache) = &self.cache {
            if let Some(tracks) = cache.try_get(&request.raw).await {
                return Ok(tracks);
            }
        }

        let tracks = self.probe(&request.raw, cancel).await?;

        if let Some(cache) = &self.cache {
            cache
                .set(request.raw.clone(), tracks.clone(), self.cache_ttl)
                .await;
        }
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_urls_not_paths() {
        let resolver = RemoteUrlResolver::new("yt-dlp");
        assert!(resolver.can_resolve(&TrackRequest::new("https://x/y")));
        assert!(resolver.can_resolve(&TrackRequest::new("http://x/y")));
        assert!(!resolver.can_resolve(&TrackRequest::new("/tmp/a.mp3")));
        assert!(resolver.can_resolve(&TrackRequest::with_hint("magnet:x", TrackKind::Remote)));
    }

    #[test]
    fn probe_json_maps_to_track() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"title":"Some Song","webpage_url":"https://x/y?v=1","duration":213.4}"#,
        )
        .unwrap();
        let track = track_from_probe_json("https://x/y", &json);
        assert_eq!(track.title, "Some Song");
        assert_eq!(track.uri, "https://x/y?v=1");
        assert_eq!(track.kind, TrackKind::Remote);
        assert_eq!(track.duration_hint, Some(Duration::from_secs_f64(213.4)));
    }

    #[test]
    fn sparse_probe_json_falls_back_to_raw() {
        let json: serde_json::Value = serde_json::from_str(r#"{}"#).unwrap();
        let track = track_from_probe_json("https://x/y", &json);
        assert_eq!(track.title, "https://x/y");
        assert_eq!(track.uri, "https://x/y");
        assert!(track.duration_hint.is_none());
    }
}
