//! Transcoder-backed audio sources
//!
//! `FfmpegSource` turns any input ffmpeg can read into the fixed PCM profile
//! on a piped stdout. `RemoteMediaSource` first asks the metadata probe
//! (yt-dlp) for a direct media URL, then runs the same transcoder on it.
//! Media URLs expire, so the probe runs per open, not per resolve.

use crate::error::{Error, Result};
use crate::pcm::PcmProfile;
use crate::source::{AudioReader, AudioSource};
use crate::track::Track;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Drain a child's stderr into the log so decoder noise is visible
fn spawn_stderr_drain(tag: &'static str, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("{tag}: {line}");
        }
    })
}

fn spawn_transcoder(bin: &str, input: &str, profile: PcmProfile, grace: Duration) -> Result<FfmpegReader> {
    let mut child = Command::new(bin)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostdin",
            "-i",
            input,
            "-vn",
            "-f",
            "s16le",
            "-ac",
            &profile.channels.to_string(),
            "-ar",
            &profile.sample_rate.to_string(),
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Process(format!("cannot spawn {bin}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Process("transcoder stdout not captured".into()))?;
    let stderr_task = child.stderr.take().map(|s| spawn_stderr_drain("ffmpeg", s));

    Ok(FfmpegReader {
        child,
        stdout,
        stderr_task,
        grace,
        input: input.to_string(),
        eos: false,
    })
}

/// PCM byte stream read from a transcoder subprocess
pub struct FfmpegReader {
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<()>>,
    grace: Duration,
    input: String,
    eos: bool,
}

#[async_trait]
impl AudioReader for FfmpegReader {
    async fn read(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        if self.eos {
            return Ok(0);
        }
        let n = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            read = self.stdout.read(buf) => {
                read.map_err(|e| Error::Source(format!("{}: read failed: {e}", self.input)))?
            }
        };
        if n == 0 {
            self.eos = true;
            // Distinguish a drained stream from a transcoder that died
            // before producing anything useful.
            let status = timeout(self.grace, self.child.wait())
                .await
                .map_err(|_| Error::Source(format!("{}: transcoder hung at end of stream", self.input)))?
                .map_err(|e| Error::Process(format!("transcoder wait failed: {e}")))?;
            if !status.success() {
                return Err(Error::Source(format!(
                    "{}: transcoder exited with {status}",
                    self.input
                )));
            }
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        if self.eos {
            // Process already reaped by the end-of-stream check.
        } else {
            // Still mid-stream: this is a cancellation or teardown path,
            // kill the transcoder rather than waiting for it to drain.
            match timeout(self.grace, async {
                self.child.start_kill().ok();
                self.child.wait().await
            })
            .await
            {
                Ok(Err(e)) => warn!("transcoder wait failed for {}: {e}", self.input),
                Err(_) => warn!("transcoder for {} ignored kill within grace", self.input),
                Ok(Ok(_)) => {}
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        Ok(())
    }
}

/// Audio source decoding local files (or any direct input) through ffmpeg
pub struct FfmpegSource {
    bin: String,
    profile: PcmProfile,
    grace: Duration,
}

impl FfmpegSource {
    pub fn new(bin: impl Into<String>, grace: Duration) -> Self {
        Self {
            bin: bin.into(),
            profile: PcmProfile::default(),
            grace,
        }
    }
}

#[async_trait]
impl AudioSource for FfmpegSource {
    async fn open_reader(
        &self,
        track: &Track,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioReader>> {
        let reader = spawn_transcoder(&self.bin, &track.uri, self.profile, self.grace)?;
        Ok(Box::new(reader))
    }
}

/// Audio source for remote tracks: probe for a direct media URL, then decode
pub struct RemoteMediaSource {
    probe_bin: String,
    ffmpeg_bin: String,
    profile: PcmProfile,
    grace: Duration,
}

impl RemoteMediaSource {
    pub fn new(
        probe_bin: impl Into<String>,
        ffmpeg_bin: impl Into<String>,
        grace: Duration,
    ) -> Self {
        Self {
            probe_bin: probe_bin.into(),
            ffmpeg_bin: ffmpeg_bin.into(),
            profile: PcmProfile::default(),
            grace,
        }
    }

    /// Ask the probe for a direct audio URL for this page
    async fn direct_url(&self, uri: &str, cancel: &CancellationToken) -> Result<String> {
        let child = Command::new(&self.probe_bin)
            .args(["-g", "-f", "bestaudio/best", "--no-playlist", uri])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Process(format!("cannot spawn {}: {e}", self.probe_bin)))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            output = child.wait_with_output() => {
                output.map_err(|e| Error::Process(format!("probe wait failed: {e}")))?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Source(format!(
                "{uri}: media probe failed: {}",
                stderr.trim()
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::Source(format!("{uri}: media probe returned no URL")))
    }
}

#[async_trait]
impl AudioSource for RemoteMediaSource {
    async fn open_reader(
        &self,
        track: &Track,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioReader>> {
        let url = self.direct_url(&track.uri, cancel).await?;
        debug!("{}: probed direct media url", track.uri);
        let reader = spawn_transcoder(&self.ffmpeg_bin, &url, self.profile, self.grace)?;
        Ok(Box::new(reader))
    }
}
