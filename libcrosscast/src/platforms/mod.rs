//! Platform dispatch abstraction
//!
//! All platform traffic goes through one seam: [`PlatformApi`]. The
//! production implementation ([`hosted::HostedApi`]) talks to the hosted
//! cross-posting proxy; [`mock::MockApi`] scripts outcomes for tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Platform, PlatformPost, PostContent};

pub mod hosted;

// Mock dispatcher is available for all builds so integration tests can use it
pub mod mock;

/// Abstract "create a post on this platform" operation
///
/// Implementations receive content already optimized for the target
/// platform and a resolved bearer token; they never consult the
/// rate limiter or retry on their own, that is the posting client's job.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Create a post, returning the platform-assigned id and URL
    ///
    /// # Errors
    ///
    /// Returns a `PlatformError` variant matching the failure class:
    /// `Authentication` for rejected tokens, `Validation` for content the
    /// platform refuses, `RateLimit`/`Network` for transient conditions,
    /// and `Posting` for everything else.
    async fn post_status(
        &self,
        platform: Platform,
        content: &PostContent,
        token: &str,
    ) -> Result<PlatformPost>;
}
