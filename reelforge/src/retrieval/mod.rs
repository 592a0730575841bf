//! Hybrid example retrieval.
//!
//! Retrieval combines three externally-owned collaborators: an embedding
//! provider, a vector store for approximate neighbors, and a relational
//! example store holding the canonical records. The service embeds a query,
//! over-fetches neighbors, applies a similarity floor, hydrates survivors
//! from the relational store, and re-ranks with preference bonuses.

mod catalog;
mod http;
mod service;
mod stage;

pub use catalog::ExampleCatalog;
pub use http::HttpEmbeddingProvider;
pub use service::{
    RetrievalService, CATEGORY_BONUS, REGION_BONUS, SIMILARITY_FLOOR, TONE_TAG_BONUS,
};
pub use stage::{ExampleLookupStage, PREFERENCES_KEY};

use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Produces an embedding vector for a piece of text.
///
/// Implementations must reject empty text without making a network call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds the text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Metadata predicates applied inside the vector store query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Field equality predicates.
    #[serde(default)]
    pub equals: HashMap<String, String>,
    /// At least one of these tags must be present.
    #[serde(default)]
    pub any_tag: Vec<String>,
}

impl MetadataFilter {
    /// True when the filter constrains nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.any_tag.is_empty()
    }
}

/// One approximate neighbor returned by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Record id, shared with the relational store.
    pub id: String,
    /// Raw similarity score as reported by the store.
    pub score: f64,
    /// Metadata stored alongside the vector.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Seam to the vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces a vector keyed by id.
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), ProviderError>;

    /// Returns up to `top_k` nearest neighbors honoring the filter.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, ProviderError>;
}

/// A canonical example record held in the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    /// Stable id, shared with the vector store.
    pub id: String,
    /// Display title.
    pub title: String,
    /// The example content itself (script, storyboard, prompt).
    pub content: Value,
    /// Ad category, e.g. "fitness" or "food".
    pub category: String,
    /// Tone and region tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Seam to the relational example store.
#[async_trait]
pub trait ExampleStore: Send + Sync {
    /// Persists a record together with its tag links.
    async fn insert(&self, record: &ExampleRecord) -> Result<(), ProviderError>;

    /// Fetches the records for the given ids; unknown ids are simply
    /// absent from the result.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ExampleRecord>, ProviderError>;
}

/// Caller preferences that shape re-ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPreferences {
    /// Preferred ad category; exact matches earn a bonus.
    #[serde(default)]
    pub category: Option<String>,
    /// Desired tone tags; each overlap earns a bonus.
    #[serde(default)]
    pub tones: Vec<String>,
    /// Target region tag; a match earns a bonus.
    #[serde(default)]
    pub region: Option<String>,
    /// How many examples to return.
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,
}

fn default_max_examples() -> usize {
    5
}

impl Default for RetrievalPreferences {
    fn default() -> Self {
        Self {
            category: None,
            tones: Vec::new(),
            region: None,
            max_examples: default_max_examples(),
        }
    }
}

impl RetrievalPreferences {
    /// Preferences with only a result count set.
    #[must_use]
    pub fn top_k(max_examples: usize) -> Self {
        Self {
            max_examples,
            ..Self::default()
        }
    }
}

/// A hydrated, re-ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedExample {
    /// The hydrated record.
    pub example: ExampleRecord,
    /// Normalized raw similarity from the vector store.
    pub similarity: f64,
    /// Similarity plus preference bonuses; the sort key.
    pub score: f64,
}
