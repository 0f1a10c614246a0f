//! Core types for Crosscast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CrosscastError, Result};

/// Platforms reachable through the hosted posting API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Linkedin,
    Facebook,
    Instagram,
    Mastodon,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Twitter,
        Platform::Linkedin,
        Platform::Facebook,
        Platform::Instagram,
        Platform::Mastodon,
    ];

    /// Lowercase identifier used in config keys, token files, and API paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Mastodon => "mastodon",
        }
    }

    /// Maximum characters per post, or `None` if the platform has no hard limit
    pub fn character_limit(&self) -> Option<usize> {
        match self {
            Platform::Twitter => Some(280),
            Platform::Linkedin => Some(3000),
            Platform::Facebook => Some(63_206),
            Platform::Instagram => Some(2200),
            Platform::Mastodon => Some(500),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = CrosscastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "twitter" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::Linkedin),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "mastodon" => Ok(Platform::Mastodon),
            other => Err(CrosscastError::InvalidInput(format!(
                "Unsupported platform: {}",
                other
            ))),
        }
    }
}

/// Media kind carried by a [`MediaRef`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Gif,
}

/// Reference to an already-hosted media asset
///
/// The scheduler and client never fetch or transform media; references
/// are passed through to the hosted API as part of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// Post payload as supplied by the caller
///
/// Opaque to the scheduler; the optimizer and the API layer are the only
/// components that look inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
}

impl PostContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: Vec::new(),
            hashtags: Vec::new(),
        }
    }
}

/// Per-post overrides, passed through to execution untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostOptions {
    /// Override the scheduler-wide attempt cap for this post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Post created on a platform, as reported by the hosted API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformPost {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Outcome of posting to a single platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<PlatformPost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lifecycle status of a scheduled post
///
/// Transitions are one-directional except `Executing -> Scheduled` on a
/// retryable failure. `Completed`, `Failed`, and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleStatus::Completed | ScheduleStatus::Failed | ScheduleStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleStatus::Scheduled => write!(f, "scheduled"),
            ScheduleStatus::Executing => write!(f, "executing"),
            ScheduleStatus::Completed => write!(f, "completed"),
            ScheduleStatus::Failed => write!(f, "failed"),
            ScheduleStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A post queued for future delivery
///
/// The scheduler owns the collection of these, keyed by `id`. The
/// persisted JSON document is the source of truth across restarts;
/// armed timers are derived state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub content: PostContent,
    pub platforms: Vec<Platform>,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub options: PostOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<PlatformResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScheduledPost {
    pub fn new(
        content: PostContent,
        platforms: Vec<Platform>,
        scheduled_at: DateTime<Utc>,
        options: PostOptions,
        default_max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        let max_attempts = options.max_attempts.unwrap_or(default_max_attempts).max(1);
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            platforms,
            scheduled_at,
            status: ScheduleStatus::Scheduled,
            attempts: 0,
            max_attempts,
            options,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            last_attempt_at: None,
            result: None,
            error: None,
        }
    }

    /// Due for execution: still scheduled and the due time has passed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Scheduled && self.scheduled_at <= now
    }

    /// Timestamp at which the record entered its terminal state, if any
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ScheduleStatus::Completed => self.completed_at,
            ScheduleStatus::Failed => self.failed_at,
            ScheduleStatus::Cancelled => self.cancelled_at,
            _ => None,
        }
    }

    pub(crate) fn begin_attempt(&mut self, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Executing;
        self.attempts += 1;
        self.last_attempt_at = Some(now);
        self.updated_at = now;
    }

    pub(crate) fn complete(&mut self, results: Vec<PlatformResult>, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(results);
        self.error = None;
        self.updated_at = now;
    }

    pub(crate) fn fail(&mut self, error: String, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Failed;
        self.failed_at = Some(now);
        self.error = Some(error);
        self.result = None;
        self.updated_at = now;
    }

    pub(crate) fn reschedule(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Scheduled;
        self.scheduled_at = at;
        self.updated_at = now;
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = ScheduleStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
    }
}
