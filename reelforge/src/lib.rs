//! # Reelforge
//!
//! A pipeline orchestration engine for ad-video generation.
//!
//! Reelforge turns a raw business description into a submitted render job
//! through a tree of composable stages:
//!
//! - **Combinators**: Sequential, Parallel, and bounded Loop nodes over
//!   model- and tool-backed stages
//! - **Blackboard sessions**: per-run shared state with snapshot isolation
//!   inside parallel branches
//! - **Human-in-the-loop confirmation**: suspend/resume with idempotent
//!   re-ask and consume-once resolutions
//! - **Render job tracking**: submit, idempotent polling, and bounded
//!   blocking waits against an external render API
//! - **Hybrid retrieval**: vector search plus relational hydration and
//!   preference-based re-ranking of reference examples
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reelforge::prelude::*;
//!
//! let engine = Engine::builder()
//!     .with_model_runner(runner)
//!     .with_render_api(render)
//!     .with_embedder(embedder)
//!     .with_vector_store(vectors)
//!     .with_example_store(examples)
//!     .build()?;
//!
//! let envelope = engine.run_pipeline("user_001", "a taco truck in Austin").await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod blackboard;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod render;
pub mod retrieval;
pub mod retry;
pub mod session;
pub mod stage;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::blackboard::{Blackboard, Snapshot};
    pub use crate::config::EngineConfig;
    pub use crate::confirm::{ConfirmationDescriptor, ConfirmationRegistry};
    pub use crate::engine::{ad_video_pipeline, Engine, EngineBuilder, RunEnvelope};
    pub use crate::errors::{EngineError, ErrorEnvelope, ProviderError, ProviderErrorKind};
    pub use crate::pipeline::{PipelineExecutor, PipelineNode, RunOutcome};
    pub use crate::render::{HttpRenderApi, JobStatus, JobTracker, PollResponse, RenderApi};
    pub use crate::retrieval::{
        EmbeddingProvider, ExampleCatalog, ExampleRecord, ExampleStore, HttpEmbeddingProvider,
        MetadataFilter, RankedExample, RetrievalPreferences, RetrievalService, VectorStore,
    };
    pub use crate::retry::{BackoffStrategy, JitterStrategy, RetryConfig};
    pub use crate::session::{Session, SessionStatus, SessionStore};
    pub use crate::stage::{
        ModelReply, ModelRunner, ModelStage, Stage, StageConfig, StageContext, StageKind,
        StageOutput,
    };
}
