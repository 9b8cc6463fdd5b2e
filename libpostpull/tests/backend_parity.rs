//! The file and document backends must end up in the same logical state
//! when driven through the same sequence of passes.

use libpostpull::fetcher::mock::MockSource;
use libpostpull::fetcher::PostFetcher;
use libpostpull::service::{PassSummary, Poller, UserProcessor};
use libpostpull::storage::document::{DocumentCollection, DocumentStorage};
use libpostpull::storage::file::FileStorage;
use libpostpull::storage::memory::MemoryCollection;
use libpostpull::{Post, Storage, TrackedUser};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const USERS: [&str; 3] = ["@alice", "@bob", "@carol"];

fn post(id: &str) -> Post {
    Post(json!({ "id": id, "text": format!("post {}", id) }))
}

/// Same script for every backend: two passes, bob quiet on the first
fn scripted_source() -> MockSource {
    let source = MockSource::new();
    source
        .push_batch("@alice", vec![post("12"), post("11")])
        .push_batch("@carol", vec![post("30")])
        // second pass
        .push_batch("@alice", vec![post("14"), post("13")])
        .push_batch("@bob", vec![post("21"), post("20")])
        .push_batch("@carol", vec![]);
    source
}

async fn drive(storage: Arc<dyn Storage>) -> Vec<PassSummary> {
    let source = scripted_source();
    let processor = UserProcessor::new(
        PostFetcher::new(Box::new(source.clone()), 100),
        storage.clone(),
    );
    let poller = Poller::new(storage, processor, Duration::from_secs(1));

    vec![
        poller.run_pass().await.unwrap(),
        poller.run_pass().await.unwrap(),
    ]
}

/// Comparable view of the roster: last_refresh timestamps differ between runs
fn cursors(users: &[TrackedUser]) -> Vec<(String, Option<String>, bool)> {
    users
        .iter()
        .map(|u| (u.user_name.clone(), u.since_id.clone(), u.last_refresh.is_some()))
        .collect()
}

#[tokio::test]
async fn test_file_and_document_backends_agree() {
    let dir = TempDir::new().unwrap();
    let roster_path = dir.path().join("x_users.json");
    let file_storage = Arc::new(FileStorage::new(&roster_path, dir.path().join("output")).unwrap());
    file_storage
        .save_users(&USERS.map(TrackedUser::new))
        .await
        .unwrap();

    let channels = MemoryCollection::new();
    for name in USERS {
        channels.upsert(&TrackedUser::new(name)).await.unwrap();
    }
    let doc_storage = Arc::new(DocumentStorage::in_memory(channels, MemoryCollection::new()));

    let file_summaries = drive(file_storage.clone()).await;
    let doc_summaries = drive(doc_storage.clone()).await;
    assert_eq!(file_summaries, doc_summaries);

    let file_users = file_storage.load_users().await.unwrap();
    let doc_users = doc_storage.load_users().await.unwrap();
    assert_eq!(cursors(&file_users), cursors(&doc_users));
    assert_eq!(
        cursors(&file_users),
        vec![
            ("@alice".to_string(), Some("14".to_string()), true),
            ("@bob".to_string(), Some("21".to_string()), true),
            ("@carol".to_string(), Some("30".to_string()), true),
        ]
    );

    for name in USERS {
        let from_file = file_storage.get_feed(name).await.unwrap();
        let from_doc = doc_storage.get_feed(name).await.unwrap();
        assert_eq!(from_file, from_doc, "feeds differ for {}", name);
    }

    let alice = doc_storage.get_feed("@alice").await.unwrap().unwrap();
    let ids: Vec<_> = alice.post_list.iter().filter_map(Post::id).collect();
    assert_eq!(ids, vec!["12", "11", "14", "13"]);
}
