//! Audio source abstraction
//!
//! A source turns a track into an async byte reader producing raw PCM in the
//! fixed interchange profile. Readers typically wrap a transcoder subprocess;
//! closing a reader must terminate that subprocess within the configured
//! grace period, force-killing it afterwards.

use crate::error::Result;
use crate::track::Track;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod ffmpeg;
pub mod routing;

pub use ffmpeg::{FfmpegSource, RemoteMediaSource};
pub use routing::RoutingAudioSource;

/// An open PCM byte stream for one track
#[async_trait]
pub trait AudioReader: Send {
    /// Read into `buf`. Returns 0 at end-of-stream. Cancellation yields the
    /// `Cancelled` sentinel and must unblock promptly.
    async fn read(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize>;

    /// Release the stream and any backing subprocess
    async fn close(&mut self) -> Result<()>;
}

/// Produces PCM readers for tracks
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Open a byte reader for this track. Failures are transient from the
    /// session's point of view and count against its retry budget.
    async fn open_reader(
        &self,
        track: &Track,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn AudioReader>>;

    /// Release any resources held across tracks
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
