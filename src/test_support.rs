//! Scripted stand-ins for the completion, search and cooldown seams.

use crate::client::CompletionService;
use crate::error::SimulationError;
use crate::models::{ChatRequest, Completion};
use crate::retry::Cooldown;
use crate::search::{CandidateDocument, DocumentSearch, SearchKind};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Replays a fixed list of completion results and records every request.
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<Completion, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<Completion, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, SimulationError> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(completion)) => Ok(completion),
            Some(Err(message)) => Err(SimulationError::Request(message)),
            None => Err(SimulationError::Request("script exhausted".to_string())),
        }
    }
}

/// Records every requested wait without sleeping.
#[derive(Default)]
pub struct RecordingCooldown {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingCooldown {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cooldown for RecordingCooldown {
    async fn wait(&self, delay: Duration) {
        self.waits.lock().unwrap().push(delay);
    }
}

/// Returns canned documents per index and counts searches and releases.
#[derive(Default)]
pub struct StaticSearch {
    pub products: Vec<CandidateDocument>,
    pub guides: Vec<CandidateDocument>,
    queries: Mutex<Vec<(SearchKind, String, usize)>>,
    releases: AtomicUsize,
}

impl StaticSearch {
    pub fn new(products: Vec<CandidateDocument>, guides: Vec<CandidateDocument>) -> Self {
        Self {
            products,
            guides,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<(SearchKind, String, usize)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSearch for StaticSearch {
    async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateDocument>, SimulationError> {
        self.queries.lock().unwrap().push((kind, query.to_string(), k));
        let docs = match kind {
            SearchKind::Products => &self.products,
            SearchKind::BuyingGuides => &self.guides,
        };
        Ok(docs.iter().take(k).cloned().collect())
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
