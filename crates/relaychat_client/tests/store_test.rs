//! Conversation store tests for both implementations.

use relaychat_client::{ConversationStore, InMemoryStore, JsonFileStore};
use relaychat_core::{ConversationSummary, Message, Part, Role};
use relaychat_error::StoreErrorKind;

fn transcript() -> Vec<Message> {
    vec![
        Message::new(Role::User, vec![Part::text("hi"), Part::image("/uploads/1-a.png")]),
        Message::assistant("hello"),
        Message::new(Role::User, vec![Part::text("again")]),
        Message::error("Failed to send message: timeout"),
    ]
}

async fn exercise_index(store: &dyn ConversationStore) {
    store
        .add(ConversationSummary::new("first", "First chat"))
        .await
        .expect("add");
    store
        .add(ConversationSummary::new("second", "Second chat"))
        .await
        .expect("add");

    let ids: Vec<_> = store
        .list()
        .await
        .expect("list")
        .into_iter()
        .map(|s| s.conversation_id)
        .collect();
    assert_eq!(ids, vec!["second", "first"]);

    // Re-adding moves the entry to the top without duplicating it.
    store
        .add(ConversationSummary::new("first", "First chat"))
        .await
        .expect("re-add");
    let index = store.list().await.expect("list");
    assert_eq!(index.len(), 2);
    assert_eq!(index[0].conversation_id, "first");

    store.rename("second", "Renamed").await.expect("rename");
    store.set_starred("second", true).await.expect("star");
    let second = store
        .list()
        .await
        .expect("list")
        .into_iter()
        .find(|s| s.conversation_id == "second")
        .expect("second");
    assert_eq!(second.alias, "Renamed");
    assert!(second.starred);
    assert!(second.starred_at.is_some());

    store.set_starred("second", false).await.expect("unstar");
    let second = store.list().await.expect("list").remove(1);
    assert!(!second.starred);
    assert!(second.starred_at.is_none());

    let err = store.rename("missing", "x").await.unwrap_err();
    assert!(matches!(err.kind, StoreErrorKind::NotFound(_)));
}

async fn exercise_messages(store: &dyn ConversationStore) {
    assert!(store.load_messages("chat").await.expect("load").is_empty());

    let messages = transcript();
    store.add(ConversationSummary::new("chat", "Chat")).await.expect("add");
    store.save_messages("chat", &messages).await.expect("save");
    assert_eq!(store.load_messages("chat").await.expect("load"), messages);

    store.truncate_messages("chat", 2).await.expect("truncate");
    assert_eq!(store.load_messages("chat").await.expect("load"), messages[..2].to_vec());

    store.delete("chat").await.expect("delete");
    store.delete("chat").await.expect("delete again");
    assert!(store.load_messages("chat").await.expect("load").is_empty());
    assert!(store.list().await.expect("list").is_empty());
}

async fn exercise_delete_all(store: &dyn ConversationStore) {
    for id in ["a", "b"] {
        store.add(ConversationSummary::new(id, id)).await.expect("add");
        store.save_messages(id, &transcript()).await.expect("save");
    }
    store.delete_all().await.expect("delete all");
    assert!(store.list().await.expect("list").is_empty());
    assert!(store.load_messages("a").await.expect("load").is_empty());
}

#[tokio::test]
async fn test_in_memory_index() {
    exercise_index(&InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_in_memory_messages() {
    exercise_messages(&InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_in_memory_delete_all() {
    exercise_delete_all(&InMemoryStore::new()).await;
}

#[tokio::test]
async fn test_json_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    exercise_index(&JsonFileStore::new(dir.path())).await;
    assert!(dir.path().join("conversations.json").exists());
}

#[tokio::test]
async fn test_json_messages() {
    let dir = tempfile::tempdir().expect("tempdir");
    exercise_messages(&JsonFileStore::new(dir.path())).await;
}

#[tokio::test]
async fn test_json_delete_all() {
    let dir = tempfile::tempdir().expect("tempdir");
    exercise_delete_all(&JsonFileStore::new(dir.path())).await;
    assert!(!dir.path().join("chat_a.json").exists());
}

#[tokio::test]
async fn test_json_store_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let messages = transcript();
    {
        let store = JsonFileStore::new(dir.path());
        store
            .add(ConversationSummary::new("kept", "Kept"))
            .await
            .expect("add");
        store.save_messages("kept", &messages).await.expect("save");
    }

    let reopened = JsonFileStore::new(dir.path());
    assert_eq!(reopened.list().await.expect("list")[0].alias, "Kept");
    assert_eq!(reopened.load_messages("kept").await.expect("load"), messages);
    assert!(dir.path().join("chat_kept.json").exists());
    assert!(!dir.path().join("chat_kept.json.tmp").exists());
}

#[tokio::test]
async fn test_json_rejects_path_like_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::new(dir.path());
    let err = store
        .save_messages("../escape", &transcript())
        .await
        .unwrap_err();
    assert!(matches!(err.kind, StoreErrorKind::Io(_)));
}

#[tokio::test]
async fn test_json_corrupt_index_is_a_serialization_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("conversations.json"), "not json").expect("write");
    let err = JsonFileStore::new(dir.path()).list().await.unwrap_err();
    assert!(matches!(err.kind, StoreErrorKind::Serialization(_)));
}
