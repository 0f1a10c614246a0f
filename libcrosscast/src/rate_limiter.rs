//! Rate limiting for platform requests
//!
//! Tracks request timestamps per platform and operation inside a trailing
//! sliding window. State lives in memory only and resets on restart; the
//! platforms enforce the real quotas, this limiter just keeps the client
//! from tripping them.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::debug;

use crate::config::RateLimitOverride;
use crate::error::{CrosscastError, Result};
use crate::types::Platform;

/// Kind of request being counted against a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Post,
    MediaUpload,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Post => "posts",
            Operation::MediaUpload => "media",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = CrosscastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "posts" | "post" => Ok(Operation::Post),
            "media" | "media_upload" => Ok(Operation::MediaUpload),
            other => Err(CrosscastError::InvalidInput(format!(
                "Unknown rate limit operation: {}",
                other
            ))),
        }
    }
}

/// A window definition: at most `max_requests` inside `window`
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Answer to a limit check
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub allowed: bool,
    /// Requests left in the current window; never underflows
    pub remaining: u32,
    /// When the oldest counted request falls out of the window
    pub reset_at: DateTime<Utc>,
    /// How long to wait before the next request is allowed
    pub retry_after: Option<Duration>,
}

/// Sliding-window rate limiter shared by all posting tasks
///
/// One counter per (platform, operation) key; concurrent posts targeting
/// the same platform observe the same window.
pub struct RateLimiter {
    limits: HashMap<(Platform, Operation), RateLimit>,
    windows: Mutex<HashMap<(Platform, Operation), VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    /// Create a limiter with an explicit limit table
    pub fn new(limits: HashMap<(Platform, Operation), RateLimit>) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter with the built-in per-platform table
    pub fn with_defaults() -> Self {
        Self::new(default_limits())
    }

    /// Built-in table with config overrides applied on top
    pub fn from_config(
        overrides: &HashMap<String, HashMap<String, RateLimitOverride>>,
    ) -> Result<Self> {
        let mut limits = default_limits();
        for (platform_key, ops) in overrides {
            let platform: Platform = platform_key.parse()?;
            for (op_key, entry) in ops {
                let op: Operation = op_key.parse()?;
                limits.insert(
                    (platform, op),
                    RateLimit::new(entry.max, Duration::from_secs(entry.window)),
                );
            }
        }
        Ok(Self::new(limits))
    }

    /// Check whether a request is currently allowed, without recording it
    pub fn check_limit(&self, platform: Platform, op: Operation) -> RateLimitStatus {
        self.check_limit_at(platform, op, Utc::now())
    }

    /// Check against an explicit clock; `now` drives window pruning
    pub fn check_limit_at(
        &self,
        platform: Platform,
        op: Operation,
        now: DateTime<Utc>,
    ) -> RateLimitStatus {
        let limit = match self.limits.get(&(platform, op)) {
            Some(l) => *l,
            // No limit configured for this key, always allow
            None => {
                return RateLimitStatus {
                    allowed: true,
                    remaining: u32::MAX,
                    reset_at: now,
                    retry_after: None,
                }
            }
        };

        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let window = windows.entry((platform, op)).or_default();
        prune(window, limit.window, now);

        let count = window.len() as u32;
        let remaining = limit.max_requests.saturating_sub(count);
        let allowed = count < limit.max_requests;

        // After pruning, the oldest entry is younger than the window, so
        // oldest + window is always in the future when the key is saturated
        let reset_at = window
            .front()
            .map(|oldest| {
                *oldest
                    + chrono::Duration::from_std(limit.window)
                        .unwrap_or_else(|_| chrono::Duration::zero())
            })
            .unwrap_or(now);

        let retry_after = if allowed {
            None
        } else {
            Some((reset_at - now).to_std().unwrap_or(Duration::ZERO))
        };

        RateLimitStatus {
            allowed,
            remaining,
            reset_at,
            retry_after,
        }
    }

    /// Record a request against the window
    pub fn record_request(&self, platform: Platform, op: Operation) {
        self.record_request_at(platform, op, Utc::now());
    }

    pub fn record_request_at(&self, platform: Platform, op: Operation, now: DateTime<Utc>) {
        let Some(limit) = self.limits.get(&(platform, op)) else {
            return;
        };
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let window = windows.entry((platform, op)).or_default();
        prune(window, limit.window, now);
        window.push_back(now);
    }

    /// Suspend until a request would be allowed
    ///
    /// Returns immediately when the window has room. Loops after sleeping
    /// because another task may have consumed the freed slot.
    pub async fn wait_for_reset(&self, platform: Platform, op: Operation) {
        loop {
            let status = self.check_limit(platform, op);
            if status.allowed {
                return;
            }
            let delay = status
                .retry_after
                .unwrap_or(Duration::from_millis(100))
                .max(Duration::from_millis(10));
            debug!(
                platform = %platform,
                operation = %op,
                delay_ms = delay.as_millis() as u64,
                "rate limited, waiting for window to open"
            );
            sleep(delay).await;
        }
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, length: Duration, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::from_std(length).unwrap_or_else(|_| chrono::Duration::zero());
    while window.front().is_some_and(|t| *t <= cutoff) {
        window.pop_front();
    }
}

/// Built-in per-platform limit table
///
/// Figures follow the published platform quotas; config can override any
/// entry (`[rate_limits.<platform>]`).
fn default_limits() -> HashMap<(Platform, Operation), RateLimit> {
    let mut limits = HashMap::new();
    limits.insert(
        (Platform::Twitter, Operation::Post),
        RateLimit::new(300, Duration::from_secs(15 * 60)),
    );
    limits.insert(
        (Platform::Twitter, Operation::MediaUpload),
        RateLimit::new(415, Duration::from_secs(15 * 60)),
    );
    limits.insert(
        (Platform::Linkedin, Operation::Post),
        RateLimit::new(150, Duration::from_secs(24 * 3600)),
    );
    limits.insert(
        (Platform::Facebook, Operation::Post),
        RateLimit::new(200, Duration::from_secs(3600)),
    );
    limits.insert(
        (Platform::Instagram, Operation::Post),
        RateLimit::new(100, Duration::from_secs(3600)),
    );
    limits.insert(
        (Platform::Mastodon, Operation::Post),
        RateLimit::new(300, Duration::from_secs(5 * 60)),
    );
    limits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limiter(max: u32, window_ms: u64) -> RateLimiter {
        let mut limits = HashMap::new();
        limits.insert(
            (Platform::Twitter, Operation::Post),
            RateLimit::new(max, Duration::from_millis(window_ms)),
        );
        RateLimiter::new(limits)
    }

    #[test]
    fn test_allows_first_request() {
        let limiter = RateLimiter::with_defaults();
        let status = limiter.check_limit(Platform::Twitter, Operation::Post);
        assert!(status.allowed);
        assert_eq!(status.remaining, 300);
        assert!(status.retry_after.is_none());
    }

    #[test]
    fn test_check_does_not_consume() {
        let limiter = small_limiter(2, 60_000);
        let now = Utc::now();

        for _ in 0..5 {
            let status = limiter.check_limit_at(Platform::Twitter, Operation::Post, now);
            assert!(status.allowed);
            assert_eq!(status.remaining, 2);
        }
    }

    #[test]
    fn test_blocks_at_limit_and_reopens_after_window() {
        // Twitter posts: 300 per 15 minutes
        let limiter = RateLimiter::with_defaults();
        let base = Utc::now();

        for i in 0..300 {
            let t = base + chrono::Duration::seconds(i);
            limiter.record_request_at(Platform::Twitter, Operation::Post, t);
        }

        let check_at = base + chrono::Duration::seconds(300);
        let status = limiter.check_limit_at(Platform::Twitter, Operation::Post, check_at);
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
        assert!(status.retry_after.unwrap() > Duration::ZERO);
        assert!(status.reset_at > check_at);

        // The first recorded request leaves the window 15 minutes after it
        // was made; everything is allowed again once all 300 have aged out
        let after_window = base + chrono::Duration::seconds(15 * 60 + 300);
        let status = limiter.check_limit_at(Platform::Twitter, Operation::Post, after_window);
        assert!(status.allowed);
    }

    #[test]
    fn test_remaining_never_negative() {
        let limiter = small_limiter(3, 60_000);
        let now = Utc::now();

        for _ in 0..10 {
            limiter.record_request_at(Platform::Twitter, Operation::Post, now);
        }

        let status = limiter.check_limit_at(Platform::Twitter, Operation::Post, now);
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_platforms_are_independent() {
        let limiter = RateLimiter::with_defaults();
        let now = Utc::now();

        for _ in 0..300 {
            limiter.record_request_at(Platform::Twitter, Operation::Post, now);
        }

        assert!(
            !limiter
                .check_limit_at(Platform::Twitter, Operation::Post, now)
                .allowed
        );
        assert!(
            limiter
                .check_limit_at(Platform::Mastodon, Operation::Post, now)
                .allowed
        );
    }

    #[test]
    fn test_operations_are_independent() {
        let limiter = RateLimiter::with_defaults();
        let now = Utc::now();

        for _ in 0..300 {
            limiter.record_request_at(Platform::Twitter, Operation::Post, now);
        }

        assert!(
            limiter
                .check_limit_at(Platform::Twitter, Operation::MediaUpload, now)
                .allowed
        );
    }

    #[test]
    fn test_unconfigured_key_always_allowed() {
        let limiter = small_limiter(1, 60_000);
        let status = limiter.check_limit(Platform::Facebook, Operation::MediaUpload);
        assert!(status.allowed);
        assert!(status.retry_after.is_none());
    }

    #[test]
    fn test_window_slides() {
        let limiter = small_limiter(2, 1_000);
        let base = Utc::now();

        limiter.record_request_at(Platform::Twitter, Operation::Post, base);
        limiter.record_request_at(
            Platform::Twitter,
            Operation::Post,
            base + chrono::Duration::milliseconds(100),
        );

        let blocked =
            limiter.check_limit_at(Platform::Twitter, Operation::Post, base + chrono::Duration::milliseconds(200));
        assert!(!blocked.allowed);

        // The first request ages out, freeing one slot
        let open = limiter.check_limit_at(
            Platform::Twitter,
            Operation::Post,
            base + chrono::Duration::milliseconds(1_100),
        );
        assert!(open.allowed);
        assert_eq!(open.remaining, 1);
    }

    #[test]
    fn test_from_config_overrides_defaults() {
        let mut ops = HashMap::new();
        ops.insert(
            "posts".to_string(),
            RateLimitOverride {
                max: 10,
                window: 60,
            },
        );
        let mut overrides = HashMap::new();
        overrides.insert("twitter".to_string(), ops);

        let limiter = RateLimiter::from_config(&overrides).unwrap();
        let status = limiter.check_limit(Platform::Twitter, Operation::Post);
        assert_eq!(status.remaining, 10);

        // Untouched entries keep their defaults
        let status = limiter.check_limit(Platform::Mastodon, Operation::Post);
        assert_eq!(status.remaining, 300);
    }

    #[test]
    fn test_from_config_rejects_unknown_platform() {
        let mut overrides = HashMap::new();
        overrides.insert("friendster".to_string(), HashMap::new());
        assert!(RateLimiter::from_config(&overrides).is_err());
    }

    #[tokio::test]
    async fn test_wait_for_reset_returns_immediately_when_open() {
        let limiter = RateLimiter::with_defaults();
        let start = std::time::Instant::now();
        limiter.wait_for_reset(Platform::Twitter, Operation::Post).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_wait_for_reset_waits_out_the_window() {
        let limiter = small_limiter(1, 150);
        limiter.record_request(Platform::Twitter, Operation::Post);

        let start = std::time::Instant::now();
        limiter.wait_for_reset(Platform::Twitter, Operation::Post).await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
