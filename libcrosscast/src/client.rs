//! Posting client: dispatch with rate limiting and bounded retry
//!
//! One execution path per platform: resolve the token, wait for the rate
//! limiter, then attempt the dispatch up to `max_retries` times with
//! exponential backoff. Permanent failures short-circuit the loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::auth::AuthManager;
use crate::config::RetrySection;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::optimizer::ContentOptimizer;
use crate::platforms::PlatformApi;
use crate::rate_limiter::{Operation, RateLimiter};
use crate::types::{Platform, PlatformPost, PlatformResult, PostContent};

/// Error-message substrings that never deserve a retry
///
/// The list is a default, not a contract; deployments can replace it via
/// `[retry] non_retryable` in config.
pub const DEFAULT_NON_RETRYABLE: [&str; 7] = [
    "invalid credentials",
    "unauthorized",
    "forbidden",
    "not found",
    "duplicate",
    "invalid media",
    "content too long",
];

/// Retry behavior for a single platform dispatch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub non_retryable: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            non_retryable: DEFAULT_NON_RETRYABLE
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(retry: &RetrySection) -> Self {
        Self {
            max_retries: retry.max_retries.max(1),
            base_delay: Duration::from_secs(retry.base_delay),
            max_delay: Duration::from_secs(retry.max_delay),
            non_retryable: retry
                .non_retryable
                .clone()
                .unwrap_or_else(|| DEFAULT_NON_RETRYABLE.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Delay before the attempt after `attempt` failures, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Permanent errors are surfaced immediately, never retried
    pub fn is_permanent(&self, error: &CrosscastError) -> bool {
        match error {
            CrosscastError::Platform(e) => {
                if matches!(
                    e,
                    PlatformError::Authentication(_) | PlatformError::Validation(_)
                ) {
                    return true;
                }
                let message = e.to_string().to_lowercase();
                self.non_retryable
                    .iter()
                    .any(|s| message.contains(&s.to_lowercase()))
            }
            // Anything outside the platform taxonomy is a caller bug, not
            // a transient condition
            _ => true,
        }
    }
}

/// Client orchestrating dispatch across platforms
pub struct PostingClient {
    api: Arc<dyn PlatformApi>,
    auth: Arc<dyn AuthManager>,
    optimizer: Arc<dyn ContentOptimizer>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl PostingClient {
    pub fn new(
        api: Arc<dyn PlatformApi>,
        auth: Arc<dyn AuthManager>,
        optimizer: Arc<dyn ContentOptimizer>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            auth,
            optimizer,
            rate_limiter,
            retry,
        }
    }

    /// Post already-optimized content to one platform with retry
    ///
    /// # Errors
    ///
    /// Returns immediately on permanent errors (missing token, rejected
    /// credentials, content the platform refuses). Transient errors are
    /// retried with exponential backoff; exhaustion returns an error
    /// wrapping the last failure, keeping its transient class.
    pub async fn post_to_platform(
        &self,
        platform: Platform,
        content: &PostContent,
    ) -> Result<PlatformPost> {
        let token = self
            .auth
            .get_access_token(platform)
            .await?
            .ok_or_else(|| {
                PlatformError::Authentication(format!("Not authenticated with {}", platform))
            })?;

        self.rate_limiter
            .wait_for_reset(platform, Operation::Post)
            .await;

        let max_attempts = self.retry.max_retries.max(1);
        for attempt in 1..=max_attempts {
            self.rate_limiter.record_request(platform, Operation::Post);

            match self.api.post_status(platform, content, &token).await {
                Ok(post) => {
                    if attempt > 1 {
                        info!(platform = %platform, attempt, "posted after retry");
                    }
                    return Ok(post);
                }
                Err(e) => {
                    if self.retry.is_permanent(&e) {
                        warn!(platform = %platform, error = %e, "permanent error, not retrying");
                        return Err(e);
                    }
                    if attempt == max_attempts {
                        warn!(
                            platform = %platform,
                            attempts = max_attempts,
                            error = %e,
                            "exhausted retries"
                        );
                        let message = format!(
                            "Failed to post to {} after {} attempts: {}",
                            platform, max_attempts, e
                        );
                        // Only transient errors reach exhaustion; keep the
                        // class so callers can still tell retryable from not
                        let wrapped = match &e {
                            CrosscastError::Platform(PlatformError::RateLimit(_)) => {
                                PlatformError::RateLimit(message)
                            }
                            _ => PlatformError::Network(message),
                        };
                        return Err(wrapped.into());
                    }
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        platform = %platform,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient error, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }

        // The loop always returns; kept for the type checker
        Err(PlatformError::Posting(format!("Failed to post to {}", platform)).into())
    }

    /// Optimize and post to every target platform concurrently
    pub async fn post_to_all(
        &self,
        content: &PostContent,
        platforms: &[Platform],
    ) -> Vec<PlatformResult> {
        let variants = self.optimizer.optimize_for_platforms(content, platforms);

        let futures: Vec<_> = platforms
            .iter()
            .map(|&platform| {
                let variant = variants.get(&platform).cloned().unwrap_or_else(|| content.clone());
                async move {
                    match self.post_to_platform(platform, &variant).await {
                        Ok(post) => {
                            info!(platform = %platform, post_id = %post.id, "posted");
                            PlatformResult {
                                platform,
                                success: true,
                                post: Some(post),
                                error: None,
                            }
                        }
                        Err(e) => {
                            warn!(platform = %platform, error = %e, "post failed");
                            PlatformResult {
                                platform,
                                success: false,
                                post: None,
                                error: Some(e.to_string()),
                            }
                        }
                    }
                }
            })
            .collect();

        join_all(futures).await
    }
}
