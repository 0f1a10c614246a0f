//! Scheduler integration tests
//!
//! Drive the full service stack (scheduler -> posting client -> mock
//! dispatcher) the way the daemon does, with real persistence underneath.

use std::sync::Arc;
use std::time::Duration;

use libcrosscast::auth::TokenStore;
use libcrosscast::config::{Config, RetrySection, SchedulerSection, StorageConfig};
use libcrosscast::error::PlatformError;
use libcrosscast::platforms::mock::MockApi;
use libcrosscast::service::{CrosscastService, Event, ScheduleRequest, ScheduleTime};
use libcrosscast::types::{Platform, PostContent, PostOptions};
use libcrosscast::ScheduleStatus;

use chrono::Utc;
use tempfile::TempDir;
use tokio::time::sleep;

fn test_config(dir: &TempDir) -> Config {
    Config {
        storage: StorageConfig {
            dir: dir.path().to_string_lossy().to_string(),
        },
        scheduler: SchedulerSection {
            // Sweeps stay out of the way unless a test runs them by hand
            check_interval: 3600,
            retry_base_delay: 1,
            ..Default::default()
        },
        retry: RetrySection {
            base_delay: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn service_with(dir: &TempDir, api: MockApi) -> CrosscastService {
    let auth = TokenStore::new();
    for platform in Platform::ALL {
        auth.insert(platform, "integration-token").await;
    }
    CrosscastService::with_components(test_config(dir), Arc::new(api), Arc::new(auth))
        .await
        .unwrap()
}

fn in_ms(ms: i64) -> ScheduleTime {
    ScheduleTime::At(Utc::now() + chrono::Duration::milliseconds(ms))
}

#[tokio::test]
async fn test_timer_delivers_scheduled_post() {
    let dir = TempDir::new().unwrap();
    let api = MockApi::success();
    let service = service_with(&dir, api.clone()).await;

    let scheduled = service
        .schedule(ScheduleRequest {
            content: PostContent::text("on time"),
            platforms: vec![Platform::Twitter, Platform::Mastodon],
            when: in_ms(50),
            options: PostOptions::default(),
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    let record = service.scheduler().get_post(&scheduled.id).await.unwrap();
    assert_eq!(record.status, ScheduleStatus::Completed);
    assert_eq!(record.attempts, 1);

    let results = record.result.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(api.call_count(), 2);
}

#[tokio::test]
async fn test_cancel_before_due_prevents_delivery() {
    let dir = TempDir::new().unwrap();
    let api = MockApi::success();
    let service = service_with(&dir, api.clone()).await;

    let scheduled = service
        .schedule(ScheduleRequest {
            content: PostContent::text("changed my mind"),
            platforms: vec![Platform::Twitter],
            when: in_ms(100),
            options: PostOptions::default(),
        })
        .await
        .unwrap();

    service
        .scheduler()
        .cancel_scheduled_post(&scheduled.id)
        .await
        .unwrap();

    // Well past the original due time; neither the timer nor a sweep may run it
    sleep(Duration::from_millis(250)).await;
    service.scheduler().check_scheduled_posts().await.unwrap();

    let record = service.scheduler().get_post(&scheduled.id).await.unwrap();
    assert_eq!(record.status, ScheduleStatus::Cancelled);
    assert_eq!(record.attempts, 0);
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_all_platforms_failing_marks_record_failed() {
    let dir = TempDir::new().unwrap();
    let api = MockApi::failing(PlatformError::Posting("forbidden".to_string()));
    let service = service_with(&dir, api.clone()).await;

    let scheduled = service
        .schedule(ScheduleRequest {
            content: PostContent::text("nowhere to go"),
            platforms: vec![Platform::Twitter],
            when: in_ms(30),
            options: PostOptions {
                max_attempts: Some(1),
            },
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(250)).await;

    let record = service.scheduler().get_post(&scheduled.id).await.unwrap();
    assert_eq!(record.status, ScheduleStatus::Failed);
    assert_eq!(record.attempts, 1);
    assert!(record.error.as_ref().unwrap().contains("forbidden"));
    assert!(record.result.is_none());
    // "forbidden" is permanent at the client level: one dispatch, no retries
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn test_partial_success_still_completes() {
    let dir = TempDir::new().unwrap();
    // First dispatch fails permanently, the second succeeds; which platform
    // draws the failure is racy but the aggregate is stable
    let api = MockApi::flaky(1, PlatformError::Posting("duplicate".to_string()));
    let service = service_with(&dir, api).await;

    let scheduled = service
        .schedule(ScheduleRequest {
            content: PostContent::text("half works"),
            platforms: vec![Platform::Twitter, Platform::Mastodon],
            when: in_ms(30),
            options: PostOptions::default(),
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(250)).await;

    let record = service.scheduler().get_post(&scheduled.id).await.unwrap();
    assert_eq!(record.status, ScheduleStatus::Completed);

    let results = record.result.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|r| r.success).count(), 1);
    assert_eq!(results.iter().filter(|r| !r.success).count(), 1);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();

    let scheduled = {
        let service = service_with(&dir, MockApi::success()).await;
        service
            .schedule(ScheduleRequest {
                content: PostContent::text("persistent"),
                platforms: vec![Platform::Linkedin],
                when: ScheduleTime::At(Utc::now() + chrono::Duration::hours(6)),
                options: PostOptions::default(),
            })
            .await
            .unwrap()
        // Service dropped here; only the JSON document remains
    };

    let service = service_with(&dir, MockApi::success()).await;
    let record = service.scheduler().get_post(&scheduled.id).await.unwrap();

    assert_eq!(record.id, scheduled.id);
    assert_eq!(record.status, ScheduleStatus::Scheduled);
    assert_eq!(record.scheduled_at, scheduled.scheduled_at);
    assert_eq!(record.content.text, "persistent");
    assert_eq!(record.platforms, vec![Platform::Linkedin]);
}

#[tokio::test]
async fn test_schedule_lifecycle_events() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, MockApi::success()).await;
    let mut events = service.subscribe();

    let scheduled = service
        .schedule(ScheduleRequest {
            content: PostContent::text("watched"),
            platforms: vec![Platform::Twitter],
            when: in_ms(40),
            options: PostOptions::default(),
        })
        .await
        .unwrap();

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap();
        seen.push(event);
    }

    assert!(matches!(
        &seen[0],
        Event::ScheduleCreated { post_id, .. } if *post_id == scheduled.id
    ));
    assert!(matches!(
        &seen[1],
        Event::ExecutionStarted { attempt: 1, .. }
    ));
    assert!(matches!(&seen[2], Event::ExecutionCompleted { .. }));
}

#[tokio::test]
async fn test_sweep_picks_up_posts_missed_by_timers() {
    let dir = TempDir::new().unwrap();

    // Write a due record with a dead process's service, then restart and
    // sweep: the new process has no timers for it beyond load-time arming,
    // so this also covers the recovery path
    let scheduled = {
        let service = service_with(&dir, MockApi::success()).await;
        service
            .schedule(ScheduleRequest {
                content: PostContent::text("missed"),
                platforms: vec![Platform::Twitter],
                when: in_ms(80),
                options: PostOptions::default(),
            })
            .await
            .unwrap()
    };

    sleep(Duration::from_millis(150)).await;

    let api = MockApi::success();
    let service = service_with(&dir, api.clone()).await;
    // Give the load-time timer (armed for an already-due record) or the
    // manual sweep a chance to run it exactly once
    service.scheduler().check_scheduled_posts().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let record = service.scheduler().get_post(&scheduled.id).await.unwrap();
    assert_eq!(record.status, ScheduleStatus::Completed);
    assert_eq!(record.attempts, 1);
    assert_eq!(api.call_count(), 1);
}

#[tokio::test]
async fn test_cleanup_runs_once() {
    let dir = TempDir::new().unwrap();
    let service = service_with(&dir, MockApi::success()).await;

    let scheduled = service
        .schedule(ScheduleRequest {
            content: PostContent::text("ephemeral"),
            platforms: vec![Platform::Twitter],
            when: in_ms(30),
            options: PostOptions::default(),
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(200)).await;
    assert_eq!(
        service.scheduler().get_post(&scheduled.id).await.unwrap().status,
        ScheduleStatus::Completed
    );

    let removed = service.scheduler().cleanup_old_posts(0).await.unwrap();
    assert_eq!(removed, 1);
    let removed_again = service.scheduler().cleanup_old_posts(0).await.unwrap();
    assert_eq!(removed_again, 0);
    assert!(service.scheduler().get_post(&scheduled.id).await.is_none());
}
