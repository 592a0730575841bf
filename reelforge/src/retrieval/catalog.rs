//! Example ingestion: relational record plus vector index entry.

use crate::errors::EngineError;
use crate::retrieval::{EmbeddingProvider, ExampleRecord, ExampleStore, VectorStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Writes new examples to both stores under one shared id.
pub struct ExampleCatalog {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    examples: Arc<dyn ExampleStore>,
}

impl std::fmt::Debug for ExampleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExampleCatalog").finish_non_exhaustive()
    }
}

impl ExampleCatalog {
    /// Creates a catalog over its collaborators.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        examples: Arc<dyn ExampleStore>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            examples,
        }
    }

    /// Persists a new example and indexes its content vector, returning
    /// the generated example id.
    ///
    /// # Errors
    ///
    /// Rejects blank titles and empty content before touching any store;
    /// otherwise propagates provider failures.
    pub async fn create_example(
        &self,
        title: &str,
        content: Value,
        category: &str,
        tags: Vec<String>,
    ) -> Result<String, EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("example title must not be empty"));
        }
        if category.trim().is_empty() {
            return Err(EngineError::validation("example category must not be empty"));
        }
        let embed_text = match &content {
            Value::String(text) if text.trim().is_empty() => {
                return Err(EngineError::validation("example content must not be empty"));
            }
            Value::Null => {
                return Err(EngineError::validation("example content must not be empty"));
            }
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other)
                .map_err(|err| EngineError::validation(err.to_string()))?,
        };

        let record = ExampleRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content,
            category: category.to_string(),
            tags,
        };

        self.examples.insert(&record).await?;

        let vector = self.embedder.embed(&embed_text).await?;
        let mut metadata: HashMap<String, Value> = HashMap::new();
        metadata.insert("title".to_string(), Value::String(record.title.clone()));
        metadata.insert("category".to_string(), Value::String(record.category.clone()));
        metadata.insert(
            "tags".to_string(),
            Value::Array(record.tags.iter().cloned().map(Value::String).collect()),
        );
        self.vectors.upsert(&record.id, vector, metadata).await?;

        tracing::info!(example_id = %record.id, category = %record.category, "example created");
        Ok(record.id)
    }
}
