//! Mock dispatcher for testing
//!
//! A scriptable [`PlatformApi`] that can simulate successes, scripted
//! failures, and flaky sequences without network access. Lives outside
//! `#[cfg(test)]` so integration tests can drive the full service stack
//! against it.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::types::{Platform, PlatformPost, PostContent};

use super::PlatformApi;

/// Configurable mock dispatcher
#[derive(Clone)]
pub struct MockApi {
    /// Error returned while failures remain
    error: Option<PlatformError>,
    /// How many calls fail before succeeding; `usize::MAX` never succeeds
    fail_first: usize,
    /// Simulated latency per call
    delay: Duration,
    calls: Arc<Mutex<usize>>,
    posted: Arc<Mutex<Vec<(Platform, PostContent)>>>,
}

impl MockApi {
    /// A dispatcher where every call succeeds
    pub fn success() -> Self {
        Self {
            error: None,
            fail_first: 0,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A dispatcher where every call fails with `error`
    pub fn failing(error: PlatformError) -> Self {
        Self {
            error: Some(error),
            fail_first: usize::MAX,
            ..Self::success()
        }
    }

    /// Fails `times` calls with `error`, then succeeds
    pub fn flaky(times: usize, error: PlatformError) -> Self {
        Self {
            error: Some(error),
            fail_first: times,
            ..Self::success()
        }
    }

    /// Succeeds after `delay` per call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::success()
        }
    }

    /// Number of dispatch calls made so far
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    /// Content that reached a (simulated) platform
    pub fn posted(&self) -> Vec<(Platform, PostContent)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformApi for MockApi {
    async fn post_status(
        &self,
        platform: Platform,
        content: &PostContent,
        _token: &str,
    ) -> Result<PlatformPost> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        if call <= self.fail_first {
            let error = self
                .error
                .clone()
                .unwrap_or_else(|| PlatformError::Posting("Mock posting failed".to_string()));
            return Err(error.into());
        }

        self.posted
            .lock()
            .unwrap()
            .push((platform, content.clone()));

        Ok(PlatformPost {
            id: format!("mock-{}-{}", platform, uuid::Uuid::new_v4()),
            url: Some(format!("https://{}.example/posts/{}", platform, call)),
        })
    }
}
