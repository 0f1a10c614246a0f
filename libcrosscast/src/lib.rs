//! Crosscast - cross-posting to social platforms through one hosted API
//!
//! This library provides the posting client, rate limiter, and scheduling
//! engine behind the Crosscast tools: queue a post once, deliver it to
//! every configured platform at the right time, with retry and backoff
//! handled for you.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod optimizer;
pub mod platforms;
pub mod rate_limiter;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{CrosscastError, Result};
pub use scheduler::{PostScheduler, ScheduleUpdate, SchedulerConfig};
pub use store::PostStore;
pub use types::{Platform, PostContent, PostOptions, ScheduleStatus, ScheduledPost};
