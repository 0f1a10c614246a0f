//! Scheduled-post lifecycle management
//!
//! The scheduler owns the collection of [`ScheduledPost`] records, persists
//! it write-through after every mutation, and drives execution two ways:
//! per-post timers for items due within a look-ahead horizon, and a
//! periodic sweep that is the actual source of truth. A timer that never
//! fires costs one sweep interval of latency, nothing more.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerSection;
use crate::error::{CrosscastError, Result};
use crate::service::events::{Event, EventBus};
use crate::store::PostStore;
use crate::types::{
    Platform, PlatformResult, PostContent, PostOptions, ScheduleStatus, ScheduledPost,
};

/// Future produced by the execution callback
pub type ExecutionFuture = Pin<Box<dyn Future<Output = Result<Vec<PlatformResult>>> + Send>>;

/// Injected posting operation
///
/// The scheduler never talks to platforms itself; the service wires in a
/// callback that runs the posting client.
pub type ExecutionCallback = Arc<dyn Fn(ExecutionRequest) -> ExecutionFuture + Send + Sync>;

/// Snapshot of a record handed to the execution callback
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub post_id: String,
    pub content: PostContent,
    pub platforms: Vec<Platform>,
    pub options: PostOptions,
    pub attempt: u32,
}

/// Mutable fields of a scheduled post
///
/// Everything else on the record is scheduler-owned and cannot be touched
/// from outside.
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub content: Option<PostContent>,
    pub platforms: Option<Vec<Platform>>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub options: Option<PostOptions>,
}

/// Scheduler tuning knobs
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sweep period
    pub check_interval: StdDuration,
    /// Posts due within this window get a dedicated timer
    pub timer_horizon: StdDuration,
    /// Attempt cap unless overridden per post
    pub default_max_attempts: u32,
    /// First retry delay after a failed execution
    pub retry_base_delay: StdDuration,
    /// Ceiling on the exponential retry delay
    pub retry_max_delay: StdDuration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: StdDuration::from_secs(60),
            timer_horizon: StdDuration::from_secs(24 * 3600),
            default_max_attempts: 3,
            retry_base_delay: StdDuration::from_secs(60),
            retry_max_delay: StdDuration::from_secs(3600),
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(section: &SchedulerSection) -> Self {
        Self {
            check_interval: StdDuration::from_secs(section.check_interval.max(1)),
            timer_horizon: StdDuration::from_secs(section.timer_horizon),
            default_max_attempts: section.max_attempts.max(1),
            retry_base_delay: StdDuration::from_secs(section.retry_base_delay),
            retry_max_delay: StdDuration::from_secs(section.retry_max_delay),
        }
    }
}

struct SchedulerInner {
    store: PostStore,
    posts: RwLock<HashMap<String, ScheduledPost>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    executor: ExecutionCallback,
    config: SchedulerConfig,
    events: EventBus,
}

/// Scheduler for future posts
///
/// Cheap to clone; all clones share the same record set, store, and timer
/// table.
#[derive(Clone)]
pub struct PostScheduler {
    inner: Arc<SchedulerInner>,
}

impl PostScheduler {
    /// Load persisted records and build a scheduler around them
    ///
    /// Records left `Executing` by a crash are returned to `Scheduled` so
    /// the sweep picks them up again (their consumed attempt stands).
    /// Timers are armed for anything already due within the horizon.
    pub async fn new(
        store: PostStore,
        executor: ExecutionCallback,
        config: SchedulerConfig,
        events: EventBus,
    ) -> Result<Self> {
        let mut posts = store.load().await?;

        let now = Utc::now();
        let mut recovered = 0;
        for post in posts.values_mut() {
            if post.status == ScheduleStatus::Executing {
                post.status = ScheduleStatus::Scheduled;
                post.updated_at = now;
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(count = recovered, "recovered interrupted executions");
            store.save(&posts).await?;
        }

        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                store,
                posts: RwLock::new(posts),
                timers: Mutex::new(HashMap::new()),
                executor,
                config,
                events,
            }),
        };

        // Re-arm timers for near-due work lost with the previous process
        let near: Vec<(String, DateTime<Utc>)> = {
            let posts = scheduler.inner.posts.read().await;
            posts
                .values()
                .filter(|p| p.status == ScheduleStatus::Scheduled)
                .map(|p| (p.id.clone(), p.scheduled_at))
                .collect()
        };
        for (id, at) in near {
            scheduler.arm_timer_if_near(&id, at).await;
        }

        Ok(scheduler)
    }

    /// Queue a post for future delivery
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `platforms` is empty or `at` is not strictly in
    /// the future. No record is created on error.
    pub async fn schedule_post(
        &self,
        content: PostContent,
        platforms: Vec<Platform>,
        at: DateTime<Utc>,
        options: PostOptions,
    ) -> Result<ScheduledPost> {
        if platforms.is_empty() {
            return Err(CrosscastError::InvalidInput(
                "At least one platform is required".to_string(),
            ));
        }
        if at <= Utc::now() {
            return Err(CrosscastError::InvalidInput(
                "Scheduled time must be in the future".to_string(),
            ));
        }

        let post = ScheduledPost::new(
            content,
            platforms,
            at,
            options,
            self.inner.config.default_max_attempts,
        );

        {
            let mut posts = self.inner.posts.write().await;
            posts.insert(post.id.clone(), post.clone());
            self.inner.store.save(&posts).await?;
        }

        self.arm_timer_if_near(&post.id, at).await;

        info!(post_id = %post.id, scheduled_at = %at, "scheduled post");
        self.inner.events.emit(Event::ScheduleCreated {
            post_id: post.id.clone(),
            scheduled_at: at,
        });

        Ok(post)
    }

    /// Fetch one record by id
    pub async fn get_post(&self, id: &str) -> Option<ScheduledPost> {
        self.inner.posts.read().await.get(id).cloned()
    }

    /// All records, ordered by due time then id
    pub async fn list_posts(&self) -> Vec<ScheduledPost> {
        let posts = self.inner.posts.read().await;
        let mut all: Vec<ScheduledPost> = posts.values().cloned().collect();
        all.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        all
    }

    /// One sweep pass: execute everything due, in deterministic order
    ///
    /// Returns how many records were picked up. Records already
    /// `Executing` are skipped, so overlapping sweeps cannot double-run
    /// a post.
    pub async fn check_scheduled_posts(&self) -> Result<usize> {
        let now = Utc::now();
        let mut due: Vec<(DateTime<Utc>, String)> = {
            let posts = self.inner.posts.read().await;
            posts
                .values()
                .filter(|p| p.is_due(now))
                .map(|p| (p.scheduled_at, p.id.clone()))
                .collect()
        };
        due.sort();

        if due.is_empty() {
            return Ok(0);
        }
        debug!(count = due.len(), "sweep found due posts");

        let mut executed = 0;
        for (_, id) in due {
            match self.execute_scheduled_post(&id).await {
                Ok(ran) => {
                    if ran {
                        executed += 1;
                    }
                }
                Err(e) => error!(post_id = %id, error = %e, "sweep execution errored"),
            }
        }
        Ok(executed)
    }

    /// Execute one record now
    ///
    /// Returns `Ok(false)` without side effects when the record is not in
    /// `Scheduled` state anymore (cancelled in the meantime, or another
    /// task is already executing it).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; storage errors from persisting the
    /// transition.
    pub async fn execute_scheduled_post(&self, id: &str) -> Result<bool> {
        let now = Utc::now();

        // Claim the record before any await on the executor, so a
        // concurrent sweep or timer sees Executing and backs off
        let request = {
            let mut posts = self.inner.posts.write().await;
            let post = posts
                .get_mut(id)
                .ok_or_else(|| CrosscastError::NotFound(format!("No scheduled post {}", id)))?;

            if post.status != ScheduleStatus::Scheduled {
                debug!(post_id = %id, status = %post.status, "skipping execution, not scheduled");
                return Ok(false);
            }

            post.begin_attempt(now);
            let request = ExecutionRequest {
                post_id: post.id.clone(),
                content: post.content.clone(),
                platforms: post.platforms.clone(),
                options: post.options.clone(),
                attempt: post.attempts,
            };
            self.inner.store.save(&posts).await?;
            request
        };

        info!(post_id = %id, attempt = request.attempt, "executing scheduled post");
        self.inner.events.emit(Event::ExecutionStarted {
            post_id: request.post_id.clone(),
            platforms: request.platforms.clone(),
            attempt: request.attempt,
        });

        let outcome = (self.inner.executor)(request).await;

        match outcome {
            Ok(results) => {
                let now = Utc::now();
                let mut posts = self.inner.posts.write().await;
                if let Some(post) = posts.get_mut(id) {
                    post.complete(results.clone(), now);
                    self.inner.store.save(&posts).await?;
                }
                info!(post_id = %id, "scheduled post completed");
                self.inner.events.emit(Event::ExecutionCompleted {
                    post_id: id.to_string(),
                    results,
                });
            }
            Err(e) => self.handle_execution_error(id, e).await?,
        }

        Ok(true)
    }

    /// Decide between terminal failure and a backed-off retry
    async fn handle_execution_error(&self, id: &str, error: CrosscastError) -> Result<()> {
        let now = Utc::now();
        let mut posts = self.inner.posts.write().await;
        let Some(post) = posts.get_mut(id) else {
            warn!(post_id = %id, "record vanished during execution");
            return Ok(());
        };

        let attempts = post.attempts;
        let exhausted = attempts >= post.max_attempts;

        if exhausted || !error.is_transient() {
            warn!(
                post_id = %id,
                attempts,
                error = %error,
                "scheduled post failed terminally"
            );
            post.fail(error.to_string(), now);
            self.inner.store.save(&posts).await?;
            drop(posts);
            self.inner.events.emit(Event::ExecutionFailed {
                post_id: id.to_string(),
                error: error.to_string(),
                attempts,
            });
            return Ok(());
        }

        let delay = retry_delay(
            attempts,
            self.inner.config.retry_base_delay,
            self.inner.config.retry_max_delay,
        );
        let next = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        warn!(
            post_id = %id,
            attempt = attempts,
            next_attempt_at = %next,
            error = %error,
            "scheduled post failed, retrying with backoff"
        );
        post.reschedule(next, now);
        self.inner.store.save(&posts).await?;
        drop(posts);

        self.inner.events.emit(Event::RetryScheduled {
            post_id: id.to_string(),
            attempt: attempts,
            next_attempt_at: next,
        });
        self.arm_timer_if_near(id, next).await;
        Ok(())
    }

    /// Cancel a queued post
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids; `InvalidState` unless the record is
    /// still `Scheduled`. An execution already underway runs to
    /// completion.
    pub async fn cancel_scheduled_post(&self, id: &str) -> Result<ScheduledPost> {
        let now = Utc::now();
        let cancelled = {
            let mut posts = self.inner.posts.write().await;
            let post = posts
                .get_mut(id)
                .ok_or_else(|| CrosscastError::NotFound(format!("No scheduled post {}", id)))?;

            if post.status != ScheduleStatus::Scheduled {
                return Err(CrosscastError::InvalidState(format!(
                    "Cannot cancel a {} post",
                    post.status
                )));
            }

            post.cancel(now);
            let cancelled = post.clone();
            self.inner.store.save(&posts).await?;
            cancelled
        };

        self.clear_timer(id).await;
        info!(post_id = %id, "cancelled scheduled post");
        self.inner.events.emit(Event::ScheduleCancelled {
            post_id: id.to_string(),
        });

        Ok(cancelled)
    }

    /// Modify a queued post
    ///
    /// Only content, platforms, scheduled time, and options are mutable,
    /// and only while the record is `Scheduled`. A new time re-validates
    /// the future constraint and re-arms timers the same way creation
    /// does.
    pub async fn update_scheduled_post(
        &self,
        id: &str,
        updates: ScheduleUpdate,
    ) -> Result<ScheduledPost> {
        let now = Utc::now();

        if let Some(platforms) = &updates.platforms {
            if platforms.is_empty() {
                return Err(CrosscastError::InvalidInput(
                    "At least one platform is required".to_string(),
                ));
            }
        }
        if let Some(at) = updates.scheduled_at {
            if at <= now {
                return Err(CrosscastError::InvalidInput(
                    "Scheduled time must be in the future".to_string(),
                ));
            }
        }

        let (updated, time_changed) = {
            let mut posts = self.inner.posts.write().await;
            let post = posts
                .get_mut(id)
                .ok_or_else(|| CrosscastError::NotFound(format!("No scheduled post {}", id)))?;

            if post.status != ScheduleStatus::Scheduled {
                return Err(CrosscastError::InvalidState(format!(
                    "Cannot update a {} post",
                    post.status
                )));
            }

            if let Some(content) = updates.content {
                post.content = content;
            }
            if let Some(platforms) = updates.platforms {
                post.platforms = platforms;
            }
            if let Some(options) = updates.options {
                post.max_attempts = options
                    .max_attempts
                    .unwrap_or(self.inner.config.default_max_attempts)
                    .max(1);
                post.options = options;
            }
            let time_changed = match updates.scheduled_at {
                Some(at) if at != post.scheduled_at => {
                    post.scheduled_at = at;
                    true
                }
                _ => false,
            };
            post.updated_at = now;

            let updated = post.clone();
            self.inner.store.save(&posts).await?;
            (updated, time_changed)
        };

        if time_changed {
            self.clear_timer(id).await;
            self.arm_timer_if_near(id, updated.scheduled_at).await;
        }

        info!(post_id = %id, "updated scheduled post");
        self.inner.events.emit(Event::ScheduleUpdated {
            post_id: id.to_string(),
            scheduled_at: updated.scheduled_at,
        });

        Ok(updated)
    }

    /// Purge terminal records older than the cutoff
    ///
    /// Returns how many records were removed. Calling again with the same
    /// cutoff removes nothing.
    pub async fn cleanup_old_posts(&self, older_than_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days as i64);

        let mut posts = self.inner.posts.write().await;
        let before = posts.len();
        posts.retain(|_, p| match p.terminal_at() {
            Some(t) => t >= cutoff,
            None => true,
        });
        let removed = before - posts.len();

        if removed > 0 {
            self.inner.store.save(&posts).await?;
            info!(removed, "cleaned up old scheduled posts");
        }
        Ok(removed)
    }

    /// Sweep loop with cooperative shutdown
    ///
    /// Runs until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.inner.config.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.inner.config.check_interval.as_secs(),
            "scheduler sweep loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_scheduled_posts().await {
                        error!(error = %e, "sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler sweep loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Arm a one-shot timer when the due time is inside the horizon
    ///
    /// The timer only shortcuts sweep latency; the execute path re-checks
    /// state, so a stale or duplicate fire is harmless.
    fn arm_timer_if_near<'a>(
        &'a self,
        id: &'a str,
        at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let now = Utc::now();
            let horizon = match chrono::Duration::from_std(self.inner.config.timer_horizon) {
                Ok(h) => h,
                Err(_) => return,
            };
            if at - now > horizon {
                debug!(post_id = %id, scheduled_at = %at, "beyond timer horizon, sweep will pick it up");
                return;
            }

            let delay = (at - now).to_std().unwrap_or(StdDuration::ZERO);
            let scheduler = self.clone();
            let post_id = id.to_string();
            let handle = tokio::spawn(async move {
                sleep(delay).await;
                if let Err(e) = scheduler.execute_scheduled_post(&post_id).await {
                    warn!(post_id = %post_id, error = %e, "timer-driven execution errored");
                }
            });

            let mut timers = self.inner.timers.lock().await;
            timers.retain(|_, h| !h.is_finished());
            if let Some(old) = timers.insert(id.to_string(), handle) {
                old.abort();
            }
        })
    }

    async fn clear_timer(&self, id: &str) {
        if let Some(handle) = self.inner.timers.lock().await.remove(id) {
            handle.abort();
        }
    }
}

/// Exponential backoff for scheduler-level retries, capped at the ceiling
fn retry_delay(attempts: u32, base: StdDuration, max: StdDuration) -> StdDuration {
    let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}
