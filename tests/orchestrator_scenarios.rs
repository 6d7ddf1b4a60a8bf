//! Black-box scenarios driving the orchestrator against the in-memory
//! fake client.

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use common::{entity, test_config, FakeClient};
use dialog_migrator::model::ConversationStatus;
use dialog_migrator::orchestrator::Orchestrator;

fn progress_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
    dir.path().join("progress.json")
}

#[tokio::test]
async fn s1_happy_path_two_conversations() {
    let client = Arc::new(
        FakeClient::new(vec![entity("A", 3), entity("B", 2)])
            .with_history("A", [10, 11, 12])
            .with_history("B", [20, 21]),
    );
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::new(
        client.clone(),
        test_config(),
        progress_path(&dir),
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.stats.total_dialogs, 2);
    assert_eq!(report.stats.completed_dialogs, 2);
    assert_eq!(report.stats.migrated_messages, 5);
    assert_eq!(report.stats.failed_messages, 0);
    assert_eq!(report.stats.flood_wait_count, 0);
    assert_eq!(client.forward_call_count("A"), 1);
    assert_eq!(client.forward_call_count("B"), 1);
}

#[tokio::test]
async fn s2_resume_after_floodwait_retry_succeeds() {
    let client = Arc::new(
        FakeClient::new(vec![entity("A", 5)])
            .with_history("A", [1, 2, 3, 4, 5])
            .flood_wait_on_forward_call("A", 1, 1),
    );
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.flood_wait_threshold_seconds = 300;
    let mut orchestrator = Orchestrator::new(client.clone(), cfg, progress_path(&dir), Arc::new(AtomicBool::new(false))).unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.stats.completed_dialogs, 1);
    assert_eq!(report.stats.migrated_messages, 5);
    assert_eq!(report.stats.flood_wait_count, 1);
    assert_eq!(client.forward_call_count("A"), 2);

    let reloaded = dialog_migrator::progress_store::load(&progress_path(&dir), "a", "b").unwrap();
    assert_eq!(reloaded.dialogs["A"].status, ConversationStatus::Completed);
}

#[tokio::test]
async fn s3_above_threshold_abort_leaves_resume_point() {
    let ids: Vec<i64> = (1..=250).collect();
    let client = Arc::new(
        FakeClient::new(vec![entity("A", 250)])
            .with_history("A", ids)
            .flood_wait_on_forward_call("A", 3, 3600),
    );
    let dir = tempfile::tempdir().unwrap();
    let path = progress_path(&dir);
    let mut cfg = test_config();
    cfg.flood_wait_threshold_seconds = 300;
    let mut orchestrator = Orchestrator::new(client.clone(), cfg, path.clone(), Arc::new(AtomicBool::new(false))).unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.stats.migrated_messages, 200);

    let reloaded = dialog_migrator::progress_store::load(&path, "a", "b").unwrap();
    let entry = &reloaded.dialogs["A"];
    assert_eq!(entry.status, ConversationStatus::PartiallyMigrated);
    assert_eq!(entry.last_message_id, Some(200));
    assert_eq!(entry.migrated_count, 200);
}

#[tokio::test]
async fn s6_daily_quota_stops_after_limit() {
    let client = Arc::new(
        FakeClient::new(vec![entity("A", 1), entity("B", 1), entity("C", 1)])
            .with_history("A", [1])
            .with_history("B", [1])
            .with_history("C", [1]),
    );
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.daily_group_limit = 2;
    let mut orchestrator = Orchestrator::new(client.clone(), cfg, progress_path(&dir), Arc::new(AtomicBool::new(false))).unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.stats.completed_dialogs, 2);
    assert_eq!(client.created_channels.lock().unwrap().len(), 2);
    assert_eq!(client.sent_messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn s4_whitelist_and_blacklist_filter_before_migration() {
    let client = Arc::new(
        FakeClient::new(vec![entity("1", 1), entity("2", 1), entity("3", 1)])
            .with_history("1", [100])
            .with_history("2", [200])
            .with_history("3", [300]),
    );
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.filter.include_ids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
    cfg.filter.exclude_ids = vec!["2".to_string()];
    let mut orchestrator = Orchestrator::new(client.clone(), cfg, progress_path(&dir), Arc::new(AtomicBool::new(false))).unwrap();

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.stats.total_dialogs, 2);
    assert_eq!(client.forward_call_count("2"), 0);
}
