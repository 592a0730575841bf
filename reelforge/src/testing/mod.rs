//! Test doubles for the engine's external collaborators.
//!
//! Every provider seam (model runner, embedder, vector store, example
//! store, render API) has a scriptable in-memory double here, used by the
//! crate's own tests and available to downstream integration tests.

mod mocks;

pub use mocks::{
    CountingEmbedder, InMemoryExampleStore, InMemoryVectorStore, MockModelRunner, MockRenderApi,
};
