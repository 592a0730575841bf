//! Scriptable in-memory doubles.

use crate::errors::ProviderError;
use crate::render::{PollResponse, RenderApi};
use crate::retrieval::{
    EmbeddingProvider, ExampleRecord, ExampleStore, MetadataFilter, VectorMatch, VectorStore,
};
use crate::stage::{ModelReply, ModelRunner, StageConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

/// A model runner with per-stage scripted replies.
///
/// Unscripted invocations echo their inputs, so topology-level tests run
/// end to end without scripting every stage.
#[derive(Debug, Default)]
pub struct MockModelRunner {
    replies: Mutex<HashMap<String, VecDeque<Result<ModelReply, ProviderError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    last_inputs: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MockModelRunner {
    /// Creates a runner with no scripted replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for a stage.
    pub fn push_reply(&self, stage_id: &str, reply: ModelReply) {
        self.replies
            .lock()
            .entry(stage_id.to_string())
            .or_default()
            .push_back(Ok(reply));
    }

    /// Queues a provider failure for a stage.
    pub fn push_failure(&self, stage_id: &str, error: ProviderError) {
        self.replies
            .lock()
            .entry(stage_id.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Number of invocations a stage received.
    #[must_use]
    pub fn call_count(&self, stage_id: &str) -> usize {
        self.calls.lock().get(stage_id).copied().unwrap_or(0)
    }

    /// The input slice the stage last received.
    #[must_use]
    pub fn last_inputs(&self, stage_id: &str) -> Option<HashMap<String, Value>> {
        self.last_inputs.lock().get(stage_id).cloned()
    }
}

#[async_trait]
impl ModelRunner for MockModelRunner {
    async fn invoke(
        &self,
        config: &StageConfig,
        inputs: &HashMap<String, Value>,
    ) -> Result<ModelReply, ProviderError> {
        *self.calls.lock().entry(config.id.clone()).or_insert(0) += 1;
        self.last_inputs
            .lock()
            .insert(config.id.clone(), inputs.clone());

        if let Some(scripted) = self
            .replies
            .lock()
            .get_mut(&config.id)
            .and_then(VecDeque::pop_front)
        {
            return scripted;
        }
        Ok(ModelReply::Output(json!({
            "stage": config.id,
            "inputs": inputs,
        })))
    }
}

/// An embedder that counts calls and returns a fixed small vector.
#[derive(Debug, Default)]
pub struct CountingEmbedder {
    calls: Mutex<usize>,
}

impl CountingEmbedder {
    /// Creates a fresh embedder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of embed calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::terminal("embedding", "cannot embed empty text"));
        }
        *self.calls.lock() += 1;
        Ok(vec![0.1; 8])
    }
}

/// A vector store with scripted query results.
///
/// Upserts are recorded; queries return the scripted matches filtered by
/// the metadata predicates and truncated to `top_k`.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    vectors: Mutex<HashMap<String, HashMap<String, Value>>>,
    scripted: Mutex<Vec<VectorMatch>>,
}

impl InMemoryVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scripted query result set.
    pub fn script_matches(&self, matches: Vec<VectorMatch>) {
        *self.scripted.lock() = matches;
    }

    /// True if an upsert was recorded for the id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.vectors.lock().contains_key(id)
    }
}

fn filter_accepts(filter: &MetadataFilter, metadata: &HashMap<String, Value>) -> bool {
    for (field, expected) in &filter.equals {
        if metadata.get(field).and_then(Value::as_str) != Some(expected.as_str()) {
            return false;
        }
    }
    if !filter.any_tag.is_empty() {
        let tags: Vec<&str> = metadata
            .get("tags")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !filter.any_tag.iter().any(|tag| tags.contains(&tag.as_str())) {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        id: &str,
        _vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), ProviderError> {
        self.vectors.lock().insert(id.to_string(), metadata);
        Ok(())
    }

    async fn query(
        &self,
        _vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, ProviderError> {
        let mut matches: Vec<VectorMatch> = self
            .scripted
            .lock()
            .iter()
            .filter(|m| filter_accepts(filter, &m.metadata))
            .cloned()
            .collect();
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// A relational example store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryExampleStore {
    records: Mutex<HashMap<String, ExampleRecord>>,
}

impl InMemoryExampleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record directly, bypassing the trait.
    pub fn seed(&self, record: ExampleRecord) {
        self.records.lock().insert(record.id.clone(), record);
    }
}

#[async_trait]
impl ExampleStore for InMemoryExampleStore {
    async fn insert(&self, record: &ExampleRecord) -> Result<(), ProviderError> {
        self.records.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ExampleRecord>, ProviderError> {
        let records = self.records.lock();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }
}

/// A render API with scripted submit and poll results.
///
/// An exhausted poll script fails terminally, so a test that polls more
/// than it scripted fails loudly instead of spinning.
#[derive(Debug, Default)]
pub struct MockRenderApi {
    submits: Mutex<VecDeque<Result<String, ProviderError>>>,
    polls: Mutex<VecDeque<Result<PollResponse, ProviderError>>>,
    submit_calls: Mutex<usize>,
    get_calls: Mutex<usize>,
    last_prompt: Mutex<Option<String>>,
}

impl MockRenderApi {
    /// Creates an API with empty scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a submit result.
    pub fn push_submit(&self, result: Result<String, ProviderError>) {
        self.submits.lock().push_back(result);
    }

    /// Queues a poll result.
    pub fn push_poll(&self, result: Result<PollResponse, ProviderError>) {
        self.polls.lock().push_back(result);
    }

    /// Number of submit calls made.
    #[must_use]
    pub fn submit_calls(&self) -> usize {
        *self.submit_calls.lock()
    }

    /// Number of status fetches made.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        *self.get_calls.lock()
    }

    /// The prompt most recently submitted.
    #[must_use]
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl RenderApi for MockRenderApi {
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        *self.submit_calls.lock() += 1;
        *self.last_prompt.lock() = Some(prompt.to_string());
        self.submits
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::terminal("render", "no scripted submit result")))
    }

    async fn get(&self, _operation_id: &str) -> Result<PollResponse, ProviderError> {
        *self.get_calls.lock() += 1;
        self.polls
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::terminal("render", "no scripted poll result")))
    }

    async fn download(&self, result_ref: &str) -> Result<Vec<u8>, ProviderError> {
        Ok(result_ref.as_bytes().to_vec())
    }
}
