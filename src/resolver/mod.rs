//! Track resolution pipeline
//!
//! Resolvers turn raw user input (paths, URLs) into playable tracks before
//! anything reaches the player loop. The routing resolver dispatches to the
//! first capable inner resolver. Order is policy: remote resolvers go first
//! so URLs are never misread as paths.

use crate::error::{Error, Result};
use crate::track::{Track, TrackRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod cache;
pub mod local;
pub mod remote;

pub use cache::RequestCache;
pub use local::LocalFileResolver;
pub use remote::RemoteUrlResolver;

/// Turns a user request into zero or more tracks
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Cheap, non-I/O sniff: could this resolver handle the request?
    fn can_resolve(&self, request: &TrackRequest) -> bool;

    /// Resolve the request. May legitimately yield no tracks.
    async fn resolve(
        &self,
        request: &TrackRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Track>>;
}

/// Dispatches to the first inner resolver whose `can_resolve` accepts
pub struct RoutingResolver {
    resolvers: Vec<Arc<dyn TrackResolver>>,
}

impl RoutingResolver {
    pub fn new(resolvers: Vec<Arc<dyn TrackResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl TrackResolver for RoutingResolver {
    fn can_resolve(&self, request: &TrackRequest) -> bool {
        self.resolvers.iter().any(|r| r.can_resolve(request))
    }

    /// Yields exclusively from the first capable resolver; later resolvers
    /// are never consulted even when the winner returns nothing.
    async fn resolve(
        &self,
        request: &TrackRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Track>> {
        for resolver in &self.resolvers {
            if resolver.can_resolve(request) {
                return resolver.resolve(request, cancel).await;
            }
        }
        Err(Error::NoResolver(request.raw.clone()))
    }
}

/// First emission of a resolve, or `None` when the resolver yields nothing
pub async fn resolve_single(
    resolver: &dyn TrackResolver,
    request: &TrackRequest,
    cancel: &CancellationToken,
) -> Result<Option<Track>> {
    let mut tracks = resolver.resolve(request, cancel).await?;
    if tracks.is_empty() {
        Ok(None)
    } else {
        Ok(Some(tracks.swap_remove(0)))
    }
}
