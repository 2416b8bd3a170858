//! Audio sink abstraction
//!
//! A sink consumes raw PCM slices. Suspension of `write` is the back-pressure
//! mechanism: a slow consumer stalls the session copy loop through the write
//! await, with no intermediate buffering beyond the pooled transfer buffer.

use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub mod ffplay;

pub use ffplay::FfplaySink;

/// Back-pressuring PCM consumer
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Consume a PCM slice. The call suspends until the sink has taken the
    /// bytes; cancellation yields the `Cancelled` sentinel promptly.
    async fn write(&self, buf: &[u8], cancel: &CancellationToken) -> Result<()>;

    /// Per-track flush hook called once a track's stream has drained.
    /// May be a no-op.
    async fn complete(&self, cancel: &CancellationToken) -> Result<()>;

    /// Flush, close, and release any backing subprocess (bounded grace,
    /// then force-kill).
    async fn shutdown(&self) -> Result<()>;
}
