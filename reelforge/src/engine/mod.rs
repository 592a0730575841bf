//! The engine facade: the exposed boundary of the system.
//!
//! One `Engine` owns the session store, confirmation registry, retrieval
//! service, render job tracker, and pipeline topology. Boundary operations
//! mirror the exposed surface: run a pipeline, resume a suspended run, poll
//! a render job, create and search examples.

mod topology;

pub use topology::{
    ad_video_pipeline, PROMPT_APPROVED_KEY, RAW_DESCRIPTION_KEY, RENDER_OPERATION_KEY,
};

use crate::config::EngineConfig;
use crate::confirm::{ConfirmationDescriptor, ConfirmationRegistry};
use crate::errors::{EngineError, ErrorEnvelope};
use crate::metrics::MetricsRegistry;
use crate::pipeline::{PipelineExecutor, PipelineNode, RunOutcome};
use crate::render::{JobTracker, PollResponse, RenderApi};
use crate::retrieval::{
    EmbeddingProvider, ExampleCatalog, ExampleStore, MetadataFilter, RankedExample,
    RetrievalPreferences, RetrievalService, VectorStore,
};
use crate::session::SessionStore;
use crate::stage::ModelRunner;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What the run (and resume) boundary returns: exactly one of a terminal
/// result, a pending confirmation, or an error envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunEnvelope {
    /// The pipeline ran to the end of its tree.
    Completed {
        /// The session that produced the result.
        session_id: String,
        /// Final blackboard contents.
        result: HashMap<String, Value>,
    },
    /// The run is waiting on an operator decision; resume with a payload
    /// matching the descriptor's expected shape.
    AwaitingConfirmation {
        /// The suspended session.
        session_id: String,
        /// What is being asked.
        confirmation: ConfirmationDescriptor,
    },
    /// The run failed (or the request was rejected outright).
    Failed {
        /// The failing session, when one was created.
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Structured failure detail.
        error: ErrorEnvelope,
    },
}

/// Builder for [`Engine`].
///
/// Every provider seam must be supplied; the pipeline topology defaults to
/// [`ad_video_pipeline`] when not overridden.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    model_runner: Option<Arc<dyn ModelRunner>>,
    render_api: Option<Arc<dyn RenderApi>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    example_store: Option<Arc<dyn ExampleStore>>,
    pipeline: Option<PipelineFactory>,
}

type PipelineFactory = Box<
    dyn FnOnce(Arc<RetrievalService>, Arc<JobTracker>, Arc<MetricsRegistry>) -> PipelineNode
        + Send,
>;

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    /// Creates a builder with a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the model runner.
    #[must_use]
    pub fn with_model_runner(mut self, runner: Arc<dyn ModelRunner>) -> Self {
        self.model_runner = Some(runner);
        self
    }

    /// Sets the render API client.
    #[must_use]
    pub fn with_render_api(mut self, api: Arc<dyn RenderApi>) -> Self {
        self.render_api = Some(api);
        self
    }

    /// Sets the embedding provider.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Sets the vector store.
    #[must_use]
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Sets the relational example store.
    #[must_use]
    pub fn with_example_store(mut self, store: Arc<dyn ExampleStore>) -> Self {
        self.example_store = Some(store);
        self
    }

    /// Overrides the default topology with a custom pipeline.
    #[must_use]
    pub fn with_pipeline<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<RetrievalService>, Arc<JobTracker>, Arc<MetricsRegistry>) -> PipelineNode
            + Send
            + 'static,
    {
        self.pipeline = Some(Box::new(factory));
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] when a provider seam is
    /// missing.
    pub fn build(self) -> Result<Engine, EngineError> {
        let model_runner = self
            .model_runner
            .ok_or_else(|| EngineError::configuration("engine requires a model runner"))?;
        let render_api = self
            .render_api
            .ok_or_else(|| EngineError::configuration("engine requires a render API client"))?;
        let embedder = self
            .embedder
            .ok_or_else(|| EngineError::configuration("engine requires an embedding provider"))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| EngineError::configuration("engine requires a vector store"))?;
        let example_store = self
            .example_store
            .ok_or_else(|| EngineError::configuration("engine requires an example store"))?;

        let metrics = Arc::new(MetricsRegistry::new());
        let confirmations = Arc::new(ConfirmationRegistry::new());
        let retrieval = Arc::new(RetrievalService::new(
            Arc::clone(&embedder),
            Arc::clone(&vector_store),
            Arc::clone(&example_store),
            Arc::clone(&metrics),
        ));
        let catalog = ExampleCatalog::new(embedder, vector_store, example_store);
        let tracker = Arc::new(JobTracker::new(
            render_api,
            self.config.retry.clone(),
            Arc::clone(&metrics),
        ));

        let pipeline = match self.pipeline {
            Some(factory) => factory(
                Arc::clone(&retrieval),
                Arc::clone(&tracker),
                Arc::clone(&metrics),
            ),
            None => ad_video_pipeline(
                model_runner,
                Arc::clone(&retrieval),
                Arc::clone(&tracker),
                self.config.retry.clone(),
                Arc::clone(&metrics),
                self.config.loop_max_iterations,
            ),
        };

        Ok(Engine {
            executor: PipelineExecutor::new(Arc::clone(&confirmations), Arc::clone(&metrics)),
            sessions: SessionStore::new(),
            confirmations,
            metrics,
            retrieval,
            catalog,
            tracker,
            pipeline,
            config: self.config,
        })
    }
}

/// The assembled system.
pub struct Engine {
    executor: PipelineExecutor,
    sessions: SessionStore,
    confirmations: Arc<ConfirmationRegistry>,
    metrics: Arc<MetricsRegistry>,
    retrieval: Arc<RetrievalService>,
    catalog: ExampleCatalog,
    tracker: Arc<JobTracker>,
    pipeline: PipelineNode,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("live_sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Runs the pipeline for a raw business description.
    ///
    /// Always returns an envelope: a blank description is rejected as a
    /// failed envelope before any session is created.
    pub async fn run_pipeline(&self, user_id: &str, raw_description: &str) -> RunEnvelope {
        if raw_description.trim().is_empty() {
            return RunEnvelope::Failed {
                session_id: None,
                error: ErrorEnvelope::from(EngineError::validation(
                    "raw_description must not be empty",
                )),
            };
        }

        let session = self.sessions.create(user_id);
        session.blackboard().set(
            RAW_DESCRIPTION_KEY,
            Value::String(raw_description.to_string()),
        );
        self.drive(session.id().to_string()).await
    }

    /// Resumes a suspended run with a confirmation payload.
    ///
    /// A payload that fails shape validation leaves the session suspended
    /// and resumable; only run failures tear the session down.
    pub async fn resume(&self, session_id: &str, payload: Value) -> RunEnvelope {
        let Some(session) = self.sessions.get(session_id) else {
            return RunEnvelope::Failed {
                session_id: Some(session_id.to_string()),
                error: ErrorEnvelope::from(EngineError::SessionNotFound(session_id.to_string())),
            };
        };

        let Some(descriptor) = self.confirmations.pending_for_session(session.id()) else {
            return RunEnvelope::Failed {
                session_id: Some(session_id.to_string()),
                error: ErrorEnvelope::from(EngineError::Confirmation(format!(
                    "session '{session_id}' has no pending confirmation"
                ))),
            };
        };

        if let Err(err) = self
            .confirmations
            .resolve(session.id(), descriptor.request_id, payload)
        {
            // The request stays pending; the caller may retry with a
            // corrected payload.
            return RunEnvelope::Failed {
                session_id: Some(session_id.to_string()),
                error: ErrorEnvelope::from(&err),
            };
        }

        self.drive(session_id.to_string()).await
    }

    async fn drive(&self, session_id: String) -> RunEnvelope {
        let Some(session) = self.sessions.get(&session_id) else {
            return RunEnvelope::Failed {
                session_id: Some(session_id.clone()),
                error: ErrorEnvelope::from(EngineError::SessionNotFound(session_id)),
            };
        };

        match self.executor.run(&self.pipeline, &session).await {
            Ok(RunOutcome::Completed { result }) => {
                self.confirmations.clear_session(&session_id);
                self.sessions.remove(&session_id);
                RunEnvelope::Completed {
                    session_id,
                    result,
                }
            }
            Ok(RunOutcome::Suspended(confirmation)) => RunEnvelope::AwaitingConfirmation {
                session_id,
                confirmation,
            },
            Err(err) => {
                self.confirmations.clear_session(&session_id);
                self.sessions.remove(&session_id);
                RunEnvelope::Failed {
                    session_id: Some(session_id),
                    error: ErrorEnvelope::from(&err),
                }
            }
        }
    }

    /// Polls a render job once.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub async fn poll(&self, operation_id: &str) -> Result<PollResponse, EngineError> {
        self.tracker.poll(operation_id).await
    }

    /// Polls a render job until terminal or the configured wait ceiling.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures.
    pub async fn wait_for_render(&self, operation_id: &str) -> Result<PollResponse, EngineError> {
        self.tracker
            .blocking_wait(
                operation_id,
                self.config.poll_interval(),
                self.config.max_wait(),
            )
            .await
    }

    /// Downloads a finished render artifact.
    ///
    /// # Errors
    ///
    /// Propagates download failures.
    pub async fn download(&self, result_ref: &str) -> Result<Vec<u8>, EngineError> {
        self.tracker.download(result_ref).await
    }

    /// Creates an example in both stores, returning its id.
    ///
    /// # Errors
    ///
    /// Rejects invalid input; propagates provider failures.
    pub async fn create_example(
        &self,
        title: &str,
        content: Value,
        category: &str,
        tags: Vec<String>,
    ) -> Result<String, EngineError> {
        self.catalog.create_example(title, content, category, tags).await
    }

    /// Searches the example catalog.
    ///
    /// # Errors
    ///
    /// Rejects empty queries; propagates provider failures.
    pub async fn search_examples(
        &self,
        query: &str,
        filter: &MetadataFilter,
        prefs: &RetrievalPreferences,
    ) -> Result<Vec<RankedExample>, EngineError> {
        self.retrieval.search(query, filter, prefs).await
    }

    /// Current counter values.
    #[must_use]
    pub fn metrics_snapshot(&self) -> HashMap<String, u64> {
        self.metrics.snapshot()
    }

    /// Number of live (non-terminal) sessions.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }
}
