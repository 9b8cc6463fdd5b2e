//! Scripted post source for testing
//!
//! Lets integration tests drive the fetcher and processor without network
//! access. Each handle gets a queue of scripted timeline responses; once the
//! queue is drained the source answers with an empty page. Every timeline
//! request is recorded so tests can check cursors and retries.
//!
//! All state lives behind `Arc<Mutex<..>>`, so a clone kept by the test
//! observes calls made through the boxed copy handed to the fetcher.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::FetchError;
use crate::fetcher::{FetchResult, PostSource, TimelineRequest};
use crate::types::Post;

const USER_ID_PREFIX: &str = "uid-";

/// Mock API source for testing
#[derive(Clone, Default)]
pub struct MockSource {
    responses: Arc<Mutex<HashMap<String, VecDeque<FetchResult<Vec<Post>>>>>>,
    lookup_failures: Arc<Mutex<HashMap<String, VecDeque<FetchError>>>>,
    unknown_handles: Arc<Mutex<HashSet<String>>>,
    lookup_calls: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<TimelineRequest>>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful page for `handle` (with or without leading `@`)
    pub fn push_batch(&self, handle: &str, posts: Vec<Post>) -> &Self {
        self.push_response(handle, Ok(posts))
    }

    /// Queue an arbitrary timeline outcome for `handle`
    pub fn push_response(&self, handle: &str, response: FetchResult<Vec<Post>>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(normalize(handle))
            .or_default()
            .push_back(response);
        self
    }

    /// Make the next user lookup for `handle` fail with `error`
    pub fn push_lookup_failure(&self, handle: &str, error: FetchError) -> &Self {
        self.lookup_failures
            .lock()
            .unwrap()
            .entry(normalize(handle))
            .or_default()
            .push_back(error);
        self
    }

    /// Make every lookup for `handle` report an unknown user
    pub fn mark_unknown(&self, handle: &str) -> &Self {
        self.unknown_handles.lock().unwrap().insert(normalize(handle));
        self
    }

    /// Handles looked up so far, in call order
    pub fn lookup_calls(&self) -> Vec<String> {
        self.lookup_calls.lock().unwrap().clone()
    }

    /// Timeline requests made so far, in call order
    pub fn requests(&self) -> Vec<TimelineRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// User id the mock hands out for `handle`
    pub fn user_id_for(handle: &str) -> String {
        format!("{}{}", USER_ID_PREFIX, normalize(handle))
    }
}

fn normalize(handle: &str) -> String {
    handle.trim_start_matches('@').to_lowercase()
}

#[async_trait]
impl PostSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve_user_id(&self, handle: &str) -> FetchResult<String> {
        let key = normalize(handle);
        self.lookup_calls.lock().unwrap().push(key.clone());

        if let Some(error) = self
            .lookup_failures
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        if self.unknown_handles.lock().unwrap().contains(&key) {
            return Err(FetchError::NotFound(handle.to_string()));
        }

        Ok(Self::user_id_for(&key))
    }

    async fn user_posts(&self, request: &TimelineRequest) -> FetchResult<Vec<Post>> {
        self.requests.lock().unwrap().push(request.clone());

        let key = request
            .user_id
            .strip_prefix(USER_ID_PREFIX)
            .unwrap_or(&request.user_id)
            .to_string();

        self.responses
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
