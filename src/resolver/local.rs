//! Local filesystem resolver
//!
//! Resolves paths to single-file tracks, and directories to every audio file
//! under them in path order. Runs last in the routing order so URLs never
//! reach it.

use crate::error::{Error, Result};
use crate::resolver::TrackResolver;
use crate::track::{Track, TrackKind, TrackRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "flac", "m4a", "mka", "mp3", "ogg", "opus", "wav", "webm", "wma",
];

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn title_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Resolver for local files and directories
#[derive(Default)]
pub struct LocalFileResolver;

impl LocalFileResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TrackResolver for LocalFileResolver {
    fn can_resolve(&self, request: &TrackRequest) -> bool {
        match request.kind_hint {
            Some(TrackKind::LocalFile) => true,
            Some(TrackKind::Remote) => false,
            None => {
                !request.raw.is_empty()
                    && !request.raw.starts_with("http://")
                    && !request.raw.starts_with("https://")
            }
        }
    }

    async fn resolve(
        &self,
        request: &TrackRequest,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Track>> {
        let raw = request.raw.clone();
        let path = PathBuf::from(&raw);

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::Resolve(format!("{raw}: {e}")))?;

        if meta.is_file() {
            return Ok(vec![Track::local(raw.clone(), title_for(&path))]);
        }

        // Directory: collect audio files in a stable order. The walk is
        // synchronous filesystem work, so it runs off the async threads.
        let tracks = tokio::task::spawn_blocking(move || {
            let mut files: Vec<PathBuf> = WalkDir::new(&path)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| is_audio_file(p))
                .collect();
            files.sort();
            files
                .into_iter()
                .map(|p| {
                    let title = title_for(&p);
                    Track::local(p.to_string_lossy().into_owned(), title)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| Error::Resolve(format!("{raw}: directory scan failed: {e}")))?;

        debug!("{raw}: resolved {} local track(s)", tracks.len());
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sniffs_paths_not_urls() {
        let resolver = LocalFileResolver::new();
        assert!(resolver.can_resolve(&TrackRequest::new("/tmp/a.mp3")));
        assert!(resolver.can_resolve(&TrackRequest::new("relative/b.flac")));
        assert!(!resolver.can_resolve(&TrackRequest::new("https://x/y")));
        assert!(!resolver.can_resolve(&TrackRequest::new("")));
        assert!(resolver.can_resolve(&TrackRequest::with_hint(
            "https://weird",
            TrackKind::LocalFile
        )));
    }

    #[tokio::test]
    async fn file_resolves_to_one_track_with_same_uri() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("song.mp3");
        fs::write(&file, b"not really audio").unwrap();

        let resolver = LocalFileResolver::new();
        let raw = file.to_string_lossy().into_owned();
        let tracks = resolver
            .resolve(&TrackRequest::new(raw.clone()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].uri, raw);
        assert_eq!(tracks[0].title, "song");
        assert_eq!(tracks[0].kind, TrackKind::LocalFile);
    }

    #[tokio::test]
    async fn directory_resolves_audio_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.mp3"), b"x").unwrap();
        fs::write(dir.path().join("a.flac"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let resolver = LocalFileResolver::new();
        let tracks = resolver
            .resolve(
                &TrackRequest::new(dir.path().to_string_lossy().into_owned()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["a", "b"]);
    }

    #[tokio::test]
    async fn missing_path_is_a_resolve_error() {
        let resolver = LocalFileResolver::new();
        let err = resolver
            .resolve(
                &TrackRequest::new("/definitely/not/here.mp3"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolve(_)));
    }
}
