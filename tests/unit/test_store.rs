use std::sync::Arc;

use tempfile::TempDir;

use longhaul::api::types::{Message, ToolCall, ToolFunction};
use longhaul::state::{Phase, TaskState, TaskStatus, WorkPlan};
use longhaul::store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};

/// A state exercising every field the resume path depends on.
fn rich_state() -> TaskState {
    let mut state = TaskState::new("rich-task", "Ship the feature", "deepseek");
    state.phase = Phase::Work;
    state.status = TaskStatus::Paused;
    state.conversation = vec![
        Message::system("system prompt"),
        Message::user("do the work"),
        Message::assistant_tool_calls(
            None,
            vec![ToolCall {
                id: "call_1".to_string(),
                call_type: "function".to_string(),
                function: ToolFunction {
                    name: "file_write".to_string(),
                    arguments: r#"{"path":"a.rs","content":"fn a() {}"}"#.to_string(),
                },
            }],
        ),
        Message::tool(r#"{"ok":true}"#, "call_1"),
        Message::assistant("first item done"),
    ];
    state.plan = Some(WorkPlan {
        title: "Feature".to_string(),
        items: vec!["first".to_string(), "second".to_string()],
        notes: Some("watch the tests".to_string()),
    });
    state.completed_items.insert("first".to_string());
    state.tokens_used = 4242;
    state.cost_estimate = 0.0123;
    state.auto_resume_count = 2;
    state.error = Some("transient stall".to_string());
    state
}

#[tokio::test]
async fn test_checkpoint_roundtrip_preserves_every_field() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileCheckpointStore::new(dir.path().to_path_buf()).expect("store");

    let original = rich_state();
    store.put(&original).await.expect("put");
    let restored = store
        .get("rich-task")
        .await
        .expect("get")
        .expect("present");

    assert_eq!(restored.task_id, original.task_id);
    assert_eq!(restored.prompt, original.prompt);
    assert_eq!(restored.model, original.model);
    assert_eq!(restored.phase, original.phase);
    assert_eq!(restored.status, original.status);
    assert_eq!(restored.plan, original.plan);
    assert_eq!(restored.completed_items, original.completed_items);
    assert_eq!(restored.tokens_used, original.tokens_used);
    assert_eq!(restored.cost_estimate, original.cost_estimate);
    assert_eq!(restored.auto_resume_count, original.auto_resume_count);
    assert_eq!(restored.started_at, original.started_at);
    assert_eq!(restored.updated_at, original.updated_at);
    assert_eq!(restored.error, original.error);

    // Conversation order is reconstructed exactly.
    assert_eq!(restored.conversation, original.conversation);
    let roles: Vec<&str> = restored.conversation.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
}

#[tokio::test]
async fn test_put_is_whole_record_replacement() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileCheckpointStore::new(dir.path().to_path_buf()).expect("store");

    let mut state = rich_state();
    store.put(&state).await.expect("first put");

    state.completed_items.clear();
    state.error = None;
    state.status = TaskStatus::Running;
    store.put(&state).await.expect("second put");

    let restored = store.get("rich-task").await.expect("get").expect("present");
    assert!(restored.completed_items.is_empty());
    assert!(restored.error.is_none());
    assert_eq!(restored.status, TaskStatus::Running);
}

#[tokio::test]
async fn test_list_returns_tasks_in_submission_order() {
    let dir = TempDir::new().expect("tempdir");
    let store = FileCheckpointStore::new(dir.path().to_path_buf()).expect("store");

    let mut first = TaskState::new("first-task", "p", "m");
    first.started_at = chrono::Utc::now() - chrono::Duration::seconds(30);
    let second = TaskState::new("second-task", "p", "m");
    store.put(&second).await.expect("put");
    store.put(&first).await.expect("put");

    let listed = store.list().await.expect("list");
    let ids: Vec<&str> = listed.iter().map(|s| s.task_id.as_str()).collect();
    assert_eq!(ids, vec!["first-task", "second-task"]);
}

#[tokio::test]
async fn test_stores_are_interchangeable_behind_the_trait() {
    let dir = TempDir::new().expect("tempdir");
    let stores: Vec<Arc<dyn CheckpointStore>> = vec![
        Arc::new(FileCheckpointStore::new(dir.path().to_path_buf()).expect("store")),
        Arc::new(MemoryCheckpointStore::new()),
    ];

    for store in stores {
        let state = rich_state();
        store.put(&state).await.expect("put");
        let restored = store.get("rich-task").await.expect("get").expect("present");
        assert_eq!(restored.auto_resume_count, 2);
        assert_eq!(store.list().await.expect("list").len(), 1);
    }
}
