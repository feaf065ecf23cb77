//! Restart behaviour with the SQLite state store
//!
//! Usage counters and sync task records must survive a process restart,
//! simulated here by dropping one `GovernorContext` and building another on
//! the same database file.

#![allow(dead_code)]

#[path = "support.rs"]
mod support;

use std::time::Duration;

use pacegate_core::StateStore;
use pacegate_domain::constants::sync_task_key;
use pacegate_domain::{RequestSpec, SyncOptions, SyncStatus};
use pacegate_infra::{GovernorContext, SqliteStateStore};
use serde_json::json;
use support::{fast_config, running_context, wait_for_terminal, TestStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn usage_counters_survive_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/athlete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .mount(&server)
        .await;

    let store = TestStore::new();
    let config = fast_config(&server.uri(), &store.path);

    {
        let context = running_context(&config).await;
        for _ in 0..3 {
            context
                .governor()
                .enqueue(RequestSpec::get("strava", "/athlete"), "athlete-1", false)
                .await
                .unwrap();
        }
        context.shutdown().await.unwrap();
    }

    let restarted = GovernorContext::from_config(&config).await.unwrap();
    let stats = restarted.governor().get_usage_stats();
    assert_eq!(stats.short_term.used, 3);
    assert_eq!(stats.long_term.used, 3);
    assert_eq!(stats.short_term.remaining, 97);
}

#[tokio::test]
async fn exhausted_short_window_holds_dispatch_after_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/athlete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .mount(&server)
        .await;

    let store = TestStore::new();
    let mut config = fast_config(&server.uri(), &store.path);
    config.limits.short_term_limit = 2;

    {
        let context = running_context(&config).await;
        for _ in 0..2 {
            context
                .governor()
                .enqueue(RequestSpec::get("strava", "/athlete"), "athlete-1", false)
                .await
                .unwrap();
        }
        context.shutdown().await.unwrap();
    }

    let restarted = running_context(&config).await;
    let pending =
        restarted.governor().submit(RequestSpec::get("strava", "/athlete"), "athlete-1", false);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(restarted.governor().get_usage_stats().queue_depth, 1);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 2);

    restarted.shutdown().await.unwrap();
    drop(pending);
}

#[tokio::test]
async fn sync_task_record_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/athlete/activities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = TestStore::new();
    let config = fast_config(&server.uri(), &store.path);

    let task_id = {
        let context = running_context(&config).await;
        let handle = context
            .governor()
            .start_background_sync("athlete-1", "token-1", SyncOptions::default())
            .await
            .unwrap();
        let task = wait_for_terminal(&context, &handle.task_id).await;
        assert_eq!(task.status, SyncStatus::Completed);
        context.shutdown().await.unwrap();
        handle.task_id
    };

    let restarted = GovernorContext::from_config(&config).await.unwrap();
    let task = restarted.governor().get_sync_task_status(&task_id).await.unwrap();
    assert_eq!(task.status, SyncStatus::Completed);
    assert_eq!(task.progress_percent, 100.0);

    // stored under its own key, independent of the governor
    let raw = SqliteStateStore::open(&store.path, 1).unwrap();
    assert!(raw.get(&sync_task_key(&task_id)).await.unwrap().is_some());
}
