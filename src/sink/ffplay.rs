//! PCM sink wrapping an ffplay subprocess
//!
//! The player process is spawned lazily on the first write and kept across
//! tracks; its stdin is the back-pressure surface (a full pipe suspends the
//! writer). Closing stdin is the signal for the process to exit, with the
//! usual bounded grace before a force-kill.

use crate::error::{Error, Result};
use crate::pcm::PcmProfile;
use crate::sink::AudioSink;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct SinkProcess {
    child: Child,
    stdin: ChildStdin,
    stderr_task: Option<JoinHandle<()>>,
}

/// Audio sink feeding raw PCM to an ffplay subprocess over stdin
pub struct FfplaySink {
    bin: String,
    volume: u8,
    profile: PcmProfile,
    grace: Duration,
    process: Mutex<Option<SinkProcess>>,
}

impl FfplaySink {
    pub fn new(bin: impl Into<String>, volume: u8, grace: Duration) -> Self {
        Self {
            bin: bin.into(),
            volume,
            profile: PcmProfile::default(),
            grace,
            process: Mutex::new(None),
        }
    }

    fn spawn_process(&self) -> Result<SinkProcess> {
        info!("starting audio sink process ({})", self.bin);
        let mut child = Command::new(&self.bin)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-nodisp",
                "-autoexit",
                "-volume",
                &self.volume.to_string(),
                "-f",
                "s16le",
                "-ac",
                &self.profile.channels.to_string(),
                "-ar",
                &self.profile.sample_rate.to_string(),
                "-i",
                "pipe:0",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Process(format!("cannot spawn {}: {e}", self.bin)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Process("sink stdin not captured".into()))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("ffplay: {line}");
                }
            })
        });

        Ok(SinkProcess {
            child,
            stdin,
            stderr_task,
        })
    }

    /// Close stdin, give the child its grace period, then force-kill
    async fn reap(&self, mut process: SinkProcess) {
        drop(process.stdin);
        match timeout(self.grace, process.child.wait()).await {
            Ok(Ok(status)) => debug!("sink process exited with {status}"),
            Ok(Err(e)) => warn!("sink process wait failed: {e}"),
            Err(_) => {
                warn!("sink process ignored stdin close, killing");
                process.child.start_kill().ok();
                if let Err(e) = process.child.wait().await {
                    warn!("sink process wait after kill failed: {e}");
                }
            }
        }
        if let Some(task) = process.stderr_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl AudioSink for FfplaySink {
    async fn write(&self, buf: &[u8], cancel: &CancellationToken) -> Result<()> {
        let mut guard = self.process.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn_process()?);
        }
        let process = guard.as_mut().unwrap();

        let written = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            written = process.stdin.write_all(buf) => written,
        };
        if let Err(e) = written {
            // A dead player cannot come back through this handle; drop it so
            // the next write respawns.
            let dead = guard.take().unwrap();
            drop(guard);
            self.reap(dead).await;
            return Err(Error::Sink(format!("write failed: {e}")));
        }
        Ok(())
    }

    async fn complete(&self, cancel: &CancellationToken) -> Result<()> {
        let mut guard = self.process.lock().await;
        let Some(process) = guard.as_mut() else {
            return Ok(());
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            flushed = process.stdin.flush() => {
                flushed.map_err(|e| Error::Sink(format!("flush failed: {e}")))
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let process = self.process.lock().await.take();
        if let Some(process) = process {
            self.reap(process).await;
        }
        Ok(())
    }
}
