use palaver_store::{MemoryStore, MessageRole, MessageStore, StoredMessage, ThreadDirectory};

#[tokio::test]
async fn replay_returns_messages_in_sequence_order() {
    let store = MemoryStore::new();

    store
        .append(StoredMessage::user("t1", 0, "first"))
        .await
        .unwrap();
    store
        .append(StoredMessage::assistant("t1", 1, "second"))
        .await
        .unwrap();
    store
        .append(StoredMessage::user("t1", 2, "third"))
        .await
        .unwrap();

    let log = store.replay("t1").await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(
        log.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        vec!["first", "second", "third"]
    );
    for pair in log.windows(2) {
        assert!(pair[0].sequence_index < pair[1].sequence_index);
    }
}

#[tokio::test]
async fn replay_of_unknown_thread_is_empty() {
    let store = MemoryStore::new();
    assert!(store.replay("never-created").await.unwrap().is_empty());
}

#[tokio::test]
async fn retried_append_does_not_duplicate() {
    let store = MemoryStore::new();

    let msg = StoredMessage::user("t1", 0, "hello");
    store.append(msg.clone()).await.unwrap();
    store.append(msg).await.unwrap();

    let log = store.replay("t1").await.unwrap();
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn tool_messages_round_trip_with_name_and_call_id() {
    let store = MemoryStore::new();

    store
        .append(StoredMessage::tool(
            "t1",
            0,
            "calculator",
            "call_1",
            r#"{"result":4}"#,
        ))
        .await
        .unwrap();

    let log = store.replay("t1").await.unwrap();
    assert_eq!(log[0].role, MessageRole::Tool);
    assert_eq!(log[0].tool_name.as_deref(), Some("calculator"));
    assert_eq!(log[0].tool_call_id.as_deref(), Some("call_1"));
}

#[tokio::test]
async fn list_threads_is_newest_first() {
    let store = MemoryStore::new();

    store.upsert_title("a", "Oldest").await.unwrap();
    store.upsert_title("b", "Middle").await.unwrap();
    store.upsert_title("c", "Newest").await.unwrap();

    let threads = store.list_threads(None).await.unwrap();
    assert_eq!(
        threads.iter().map(|t| t.thread_id.as_str()).collect::<Vec<_>>(),
        vec!["c", "b", "a"]
    );
}

#[tokio::test]
async fn upsert_preserves_creation_order() {
    let store = MemoryStore::new();

    store.upsert_title("a", "First").await.unwrap();
    store.upsert_title("b", "Second").await.unwrap();
    // Re-titling "a" must not move it to the top.
    store.upsert_title("a", "First Renamed").await.unwrap();

    let threads = store.list_threads(None).await.unwrap();
    assert_eq!(threads[0].thread_id, "b");
    assert_eq!(threads[1].title, "First Renamed");
}

#[tokio::test]
async fn search_filter_is_case_insensitive() {
    let store = MemoryStore::new();

    store.upsert_title("t1", "Rust questions").await.unwrap();
    store.upsert_title("t2", "Dinner plans").await.unwrap();
    store.rename("t2", "Foo").await.unwrap();

    let hits = store.list_threads(Some("foo")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].thread_id, "t2");

    let hits = store.list_threads(Some("RUST")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].thread_id, "t1");

    // Empty filter behaves like no filter.
    assert_eq!(store.list_threads(Some("")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn rename_unknown_thread_is_a_noop() {
    let store = MemoryStore::new();
    store.rename("ghost", "Anything").await.unwrap();
    assert!(store.list_threads(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_directory_entry_and_history_together() {
    let store = MemoryStore::new();

    store.upsert_title("t1", "Doomed").await.unwrap();
    store
        .append(StoredMessage::user("t1", 0, "hello"))
        .await
        .unwrap();
    store
        .append(StoredMessage::assistant("t1", 1, "hi"))
        .await
        .unwrap();

    store.delete_thread("t1").await.unwrap();

    assert!(store.list_threads(None).await.unwrap().is_empty());
    assert!(store.replay("t1").await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_of_unknown_thread_is_idempotent() {
    let store = MemoryStore::new();
    store.delete_thread("never-created").await.unwrap();
    store.delete_thread("never-created").await.unwrap();
}
