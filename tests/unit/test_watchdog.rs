use std::sync::Arc;

use chrono::Utc;

use longhaul::api::ModelClient;
use longhaul::callbacks::{LogSink, StatusSink};
use longhaul::config::{Config, WatchdogConfig};
use longhaul::executor::TaskExecutor;
use longhaul::state::{Phase, TaskState, TaskStatus, WorkPlan};
use longhaul::store::{CheckpointStore, MemoryCheckpointStore};
use longhaul::testing::ScriptedModelClient;
use longhaul::tools::ToolRegistry;
use longhaul::watchdog::Watchdog;

fn watchdog_config() -> WatchdogConfig {
    WatchdogConfig {
        poll_interval_secs: 1,
        min_backoff_secs: 60,
        max_auto_resumes: 10,
    }
}

fn harness(
    client: Arc<ScriptedModelClient>,
    store: Arc<dyn CheckpointStore>,
    config: WatchdogConfig,
) -> Watchdog {
    let model: Arc<dyn ModelClient> = client;
    let callbacks: Arc<dyn StatusSink> = Arc::new(LogSink);
    let executor = Arc::new(TaskExecutor::new(
        Config::default(),
        model,
        Arc::new(ToolRegistry::new()),
        Arc::clone(&store),
        callbacks,
    ));
    Watchdog::new(store, executor, config)
}

/// A paused work-phase task with one item left, stale enough to resume.
fn stale_paused_task(task_id: &str) -> TaskState {
    let mut state = TaskState::new(task_id, "Finish the job", "deepseek");
    state.status = TaskStatus::Paused;
    state.phase = Phase::Work;
    state.plan = Some(WorkPlan {
        title: "Job".to_string(),
        items: vec!["last-item".to_string()],
        notes: None,
    });
    state.updated_at = Utc::now() - chrono::Duration::seconds(120);
    state
}

#[tokio::test]
async fn test_one_stall_one_resume_counts_exactly_once() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    store.put(&stale_paused_task("stalled")).await.expect("seed");

    let client = Arc::new(
        ScriptedModelClient::new()
            .text("last item done")
            .text("review passed"),
    );
    let watchdog = harness(client, Arc::clone(&store), watchdog_config());

    let resumed = watchdog.tick().await.expect("tick");
    assert_eq!(resumed, vec!["stalled".to_string()]);

    let state = store.get("stalled").await.expect("get").expect("present");
    assert_eq!(state.status, TaskStatus::Complete);
    // One stall, one resume: the counter reads 1, not 2.
    assert_eq!(state.auto_resume_count, 1);
}

#[tokio::test]
async fn test_fresh_pause_waits_for_backoff() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let mut state = stale_paused_task("fresh");
    state.updated_at = Utc::now();
    store.put(&state).await.expect("seed");

    let client = Arc::new(ScriptedModelClient::new());
    let watchdog = harness(client.clone(), Arc::clone(&store), watchdog_config());

    let resumed = watchdog.tick().await.expect("tick");
    assert!(resumed.is_empty());
    assert_eq!(client.call_count().await, 0);

    let state = store.get("fresh").await.expect("get").expect("present");
    assert_eq!(state.status, TaskStatus::Paused);
    assert_eq!(state.auto_resume_count, 0);
}

#[tokio::test]
async fn test_running_task_is_never_reinvoked() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let mut state = stale_paused_task("busy");
    state.status = TaskStatus::Running;
    store.put(&state).await.expect("seed");

    let client = Arc::new(ScriptedModelClient::new());
    let watchdog = harness(client.clone(), Arc::clone(&store), watchdog_config());

    let resumed = watchdog.tick().await.expect("tick");
    assert!(resumed.is_empty());
    assert_eq!(client.call_count().await, 0);
}

#[tokio::test]
async fn test_resume_limit_fails_task_instead_of_looping_forever() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let mut state = stale_paused_task("worn-out");
    state.auto_resume_count = 3;
    store.put(&state).await.expect("seed");

    let client = Arc::new(ScriptedModelClient::new());
    let config = WatchdogConfig {
        max_auto_resumes: 3,
        ..watchdog_config()
    };
    let watchdog = harness(client.clone(), Arc::clone(&store), config);

    let resumed = watchdog.tick().await.expect("tick");
    assert!(resumed.is_empty());
    assert_eq!(client.call_count().await, 0);

    let state = store.get("worn-out").await.expect("get").expect("present");
    assert_eq!(state.status, TaskStatus::Failed);
    let error = state.error.expect("error recorded");
    assert!(error.contains("Auto-resume limit"));
    // The counter is not incremented past the cap.
    assert_eq!(state.auto_resume_count, 3);
}

#[tokio::test]
async fn test_terminal_tasks_are_ignored() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let mut complete = stale_paused_task("done");
    complete.status = TaskStatus::Complete;
    let mut failed = stale_paused_task("broken");
    failed.status = TaskStatus::Failed;
    store.put(&complete).await.expect("seed");
    store.put(&failed).await.expect("seed");

    let client = Arc::new(ScriptedModelClient::new());
    let watchdog = harness(client.clone(), Arc::clone(&store), watchdog_config());

    let resumed = watchdog.tick().await.expect("tick");
    assert!(resumed.is_empty());
    assert_eq!(client.call_count().await, 0);
}
