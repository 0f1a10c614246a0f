//! Service layer for Crosscast
//!
//! A single façade (`CrosscastService`) wiring together the posting client,
//! the scheduler, and the event bus, so every consumer (daemon, embedding
//! application, tests) gets the same behavior from one entry point.
//!
//! # Example
//!
//! ```no_run
//! use libcrosscast::service::{CrosscastService, PostRequest, ScheduleRequest, ScheduleTime};
//! use libcrosscast::types::{Platform, PostContent, PostOptions};
//!
//! # async fn example() -> libcrosscast::Result<()> {
//! let service = CrosscastService::new().await?;
//!
//! // Post right now
//! let response = service
//!     .post(PostRequest {
//!         content: PostContent::text("hello fediverse"),
//!         platforms: vec![Platform::Mastodon],
//!         options: PostOptions::default(),
//!     })
//!     .await?;
//! println!("posted {} platform(s)", response.results.len());
//!
//! // Or queue for later
//! let scheduled = service
//!     .schedule(ScheduleRequest {
//!         content: PostContent::text("later"),
//!         platforms: vec![],
//!         when: ScheduleTime::Expr("tomorrow".to_string()),
//!         options: PostOptions::default(),
//!     })
//!     .await?;
//! println!("queued as {}", scheduled.id);
//! # Ok(())
//! # }
//! ```

pub mod events;

pub use events::{Event, EventBus, EventReceiver};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::auth::{AuthManager, TokenStore};
use crate::client::{PostingClient, RetryPolicy};
use crate::config::Config;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::optimizer::DefaultOptimizer;
use crate::platforms::hosted::HostedApi;
use crate::platforms::PlatformApi;
use crate::rate_limiter::RateLimiter;
use crate::schedule::parse_schedule;
use crate::scheduler::{ExecutionCallback, ExecutionRequest, PostScheduler, SchedulerConfig};
use crate::store::PostStore;
use crate::types::{Platform, PlatformResult, PostContent, PostOptions, ScheduleStatus, ScheduledPost};

/// Request to post immediately
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub content: PostContent,
    /// Targets; empty means the configured defaults
    pub platforms: Vec<Platform>,
    pub options: PostOptions,
}

/// Response from an immediate posting operation
#[derive(Debug, Clone)]
pub struct PostResponse {
    pub post_id: String,
    pub results: Vec<PlatformResult>,
    pub overall_success: bool,
}

/// When a scheduled post should go out
#[derive(Debug, Clone)]
pub enum ScheduleTime {
    /// Absolute UTC time
    At(DateTime<Utc>),
    /// Human-readable expression ("2h", "tomorrow", "random:1h-3h")
    Expr(String),
}

/// Request to queue a post for later
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub content: PostContent,
    /// Targets; empty means the configured defaults
    pub platforms: Vec<Platform>,
    pub when: ScheduleTime,
    pub options: PostOptions,
}

/// Main service facade
///
/// Owns the shared client, scheduler, and event bus. Cloning is not
/// needed: hand out `&CrosscastService` or wrap it in an `Arc`.
pub struct CrosscastService {
    config: Arc<Config>,
    client: Arc<PostingClient>,
    scheduler: PostScheduler,
    event_bus: EventBus,
}

impl CrosscastService {
    /// Create a service from the default config location
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service from an explicit config
    ///
    /// Builds the hosted API client and the token store the config points
    /// at. Use [`CrosscastService::with_components`] to inject fakes.
    pub async fn from_config(config: Config) -> Result<Self> {
        let api = Arc::new(HostedApi::new(
            config.api.base_url.clone(),
            std::time::Duration::from_secs(config.api.timeout),
        )?);
        let auth = Arc::new(TokenStore::from_dir(config.auth.expand_token_dir()));
        Self::with_components(config, api, auth).await
    }

    /// Create a service with injected collaborators
    pub async fn with_components(
        config: Config,
        api: Arc<dyn PlatformApi>,
        auth: Arc<dyn AuthManager>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let event_bus = EventBus::new(100);

        let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limits)?);
        let client = Arc::new(PostingClient::new(
            api,
            auth,
            Arc::new(DefaultOptimizer),
            rate_limiter,
            RetryPolicy::from_config(&config.retry),
        ));

        // The scheduler drives this callback on timers and sweeps; at least
        // one platform succeeding counts as success, matching the immediate
        // posting path. An all-platform failure is reported transient so
        // the scheduler's own backoff gets a chance.
        let exec_client = Arc::clone(&client);
        let executor: ExecutionCallback = Arc::new(move |request: ExecutionRequest| {
            let client = Arc::clone(&exec_client);
            Box::pin(async move {
                let results = client
                    .post_to_all(&request.content, &request.platforms)
                    .await;
                if results.iter().any(|r| r.success) {
                    Ok(results)
                } else {
                    let summary: Vec<String> = results
                        .iter()
                        .map(|r| format!("{}: {}", r.platform, r.error.as_deref().unwrap_or("unknown")))
                        .collect();
                    Err(PlatformError::Network(format!(
                        "All platforms failed ({})",
                        summary.join("; ")
                    ))
                    .into())
                }
            })
        });

        let store = PostStore::new(config.storage.expand_dir())?;
        let scheduler = PostScheduler::new(
            store,
            executor,
            SchedulerConfig::from_config(&config.scheduler),
            event_bus.clone(),
        )
        .await?;

        Ok(Self {
            config,
            client,
            scheduler,
            event_bus,
        })
    }

    /// Post to the requested platforms now
    ///
    /// Individual platform failures are captured in the response, not
    /// thrown; the call errors only on invalid input.
    pub async fn post(&self, request: PostRequest) -> Result<PostResponse> {
        if request.content.text.is_empty() && request.content.media.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "Content cannot be empty".to_string(),
            ));
        }

        let platforms = self.resolve_platforms(request.platforms)?;
        let post_id = uuid::Uuid::new_v4().to_string();

        self.event_bus.emit(Event::PostingStarted {
            post_id: post_id.clone(),
            platforms: platforms.clone(),
        });

        let results = self.client.post_to_all(&request.content, &platforms).await;
        let overall_success = results.iter().any(|r| r.success);

        if overall_success {
            self.event_bus.emit(Event::PostingCompleted {
                post_id: post_id.clone(),
                results: results.clone(),
            });
        } else {
            self.event_bus.emit(Event::PostingFailed {
                post_id: post_id.clone(),
                error: "All platforms failed".to_string(),
            });
        }

        Ok(PostResponse {
            post_id,
            results,
            overall_success,
        })
    }

    /// Queue a post for future delivery
    ///
    /// Schedule expressions are resolved here; `random:` windows anchor on
    /// the latest already-queued post so consecutive posts spread out.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<ScheduledPost> {
        let platforms = self.resolve_platforms(request.platforms)?;

        let at = match request.when {
            ScheduleTime::At(at) => at,
            ScheduleTime::Expr(expr) => {
                let last_scheduled = self
                    .scheduler
                    .list_posts()
                    .await
                    .into_iter()
                    .filter(|p| p.status == ScheduleStatus::Scheduled)
                    .map(|p| p.scheduled_at)
                    .max();
                parse_schedule(&expr, last_scheduled)?
            }
        };

        self.scheduler
            .schedule_post(request.content, platforms, at, request.options)
            .await
    }

    /// Access the scheduler for queue management operations
    pub fn scheduler(&self) -> &PostScheduler {
        &self.scheduler
    }

    /// Access the posting client directly
    pub fn client(&self) -> &PostingClient {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Run the scheduler sweep loop until shutdown
    pub async fn run_scheduler(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("starting scheduler");
        self.scheduler.run(shutdown).await;
    }

    fn resolve_platforms(&self, requested: Vec<Platform>) -> Result<Vec<Platform>> {
        if !requested.is_empty() {
            return Ok(requested);
        }
        let defaults: Result<Vec<Platform>> = self
            .config
            .defaults
            .platforms
            .iter()
            .map(|s| s.parse())
            .collect();
        let defaults = defaults?;
        if defaults.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "No platforms requested and no defaults configured".to_string(),
            ));
        }
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedulerSection, StorageConfig};
    use crate::platforms::mock::MockApi;
    use tempfile::TempDir;

    async fn test_service(dir: &TempDir, api: MockApi) -> CrosscastService {
        let config = Config {
            storage: StorageConfig {
                dir: dir.path().to_string_lossy().to_string(),
            },
            scheduler: SchedulerSection {
                check_interval: 1,
                retry_base_delay: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        let auth = TokenStore::new();
        for platform in Platform::ALL {
            auth.insert(platform, "test-token").await;
        }

        CrosscastService::with_components(config, Arc::new(api), Arc::new(auth))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_immediately() {
        let dir = TempDir::new().unwrap();
        let api = MockApi::success();
        let service = test_service(&dir, api.clone()).await;

        let response = service
            .post(PostRequest {
                content: PostContent::text("hello"),
                platforms: vec![Platform::Twitter, Platform::Mastodon],
                options: PostOptions::default(),
            })
            .await
            .unwrap();

        assert!(response.overall_success);
        assert_eq!(response.results.len(), 2);
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test]
    async fn test_post_rejects_empty_content() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir, MockApi::success()).await;

        let result = service
            .post(PostRequest {
                content: PostContent::text(""),
                platforms: vec![Platform::Twitter],
                options: PostOptions::default(),
            })
            .await;

        assert!(matches!(result, Err(CrosscastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_post_falls_back_to_default_platforms() {
        let dir = TempDir::new().unwrap();
        let api = MockApi::success();
        let service = test_service(&dir, api.clone()).await;

        let response = service
            .post(PostRequest {
                content: PostContent::text("defaults"),
                platforms: vec![],
                options: PostOptions::default(),
            })
            .await
            .unwrap();

        // Default config targets twitter and mastodon
        assert_eq!(response.results.len(), 2);
        let platforms: Vec<Platform> = api.posted().iter().map(|(p, _)| *p).collect();
        assert!(platforms.contains(&Platform::Twitter));
        assert!(platforms.contains(&Platform::Mastodon));
    }

    #[tokio::test]
    async fn test_post_emits_events() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir, MockApi::success()).await;
        let mut events = service.subscribe();

        service
            .post(PostRequest {
                content: PostContent::text("observable"),
                platforms: vec![Platform::Twitter],
                options: PostOptions::default(),
            })
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PostingStarted { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PostingCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_post_all_platforms_failing_is_captured() {
        let dir = TempDir::new().unwrap();
        let api = MockApi::failing(PlatformError::Posting("forbidden".to_string()));
        let service = test_service(&dir, api).await;

        let response = service
            .post(PostRequest {
                content: PostContent::text("doomed"),
                platforms: vec![Platform::Twitter],
                options: PostOptions::default(),
            })
            .await
            .unwrap();

        assert!(!response.overall_success);
        assert!(!response.results[0].success);
    }

    #[tokio::test]
    async fn test_schedule_with_absolute_time() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir, MockApi::success()).await;

        let at = Utc::now() + chrono::Duration::hours(2);
        let scheduled = service
            .schedule(ScheduleRequest {
                content: PostContent::text("later"),
                platforms: vec![Platform::Mastodon],
                when: ScheduleTime::At(at),
                options: PostOptions::default(),
            })
            .await
            .unwrap();

        assert_eq!(scheduled.scheduled_at, at);
        assert_eq!(scheduled.status, ScheduleStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_schedule_with_expression() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir, MockApi::success()).await;

        let scheduled = service
            .schedule(ScheduleRequest {
                content: PostContent::text("in an hour"),
                platforms: vec![Platform::Twitter],
                when: ScheduleTime::Expr("1h".to_string()),
                options: PostOptions::default(),
            })
            .await
            .unwrap();

        let minutes = (scheduled.scheduled_at - Utc::now()).num_minutes();
        assert!((59..=61).contains(&minutes), "expected ~60m, got {}", minutes);
    }

    #[tokio::test]
    async fn test_schedule_past_time_rejected() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir, MockApi::success()).await;

        let result = service
            .schedule(ScheduleRequest {
                content: PostContent::text("too late"),
                platforms: vec![Platform::Twitter],
                when: ScheduleTime::At(Utc::now() - chrono::Duration::minutes(5)),
                options: PostOptions::default(),
            })
            .await;

        assert!(matches!(result, Err(CrosscastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_schedule_bad_expression_rejected() {
        let dir = TempDir::new().unwrap();
        let service = test_service(&dir, MockApi::success()).await;

        let result = service
            .schedule(ScheduleRequest {
                content: PostContent::text("when?"),
                platforms: vec![Platform::Twitter],
                when: ScheduleTime::Expr("whenever".to_string()),
                options: PostOptions::default(),
            })
            .await;

        assert!(matches!(result, Err(CrosscastError::InvalidInput(_))));
    }
}
