//! Stage that pulls reference examples into the pipeline.

use crate::errors::EngineError;
use crate::retrieval::{MetadataFilter, RetrievalPreferences, RetrievalService};
use crate::stage::{Stage, StageConfig, StageContext, StageOutput, StageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Blackboard key holding optional caller retrieval preferences.
pub const PREFERENCES_KEY: &str = "retrieval_preferences";

/// Looks up examples similar to the query text on the blackboard and
/// records the ranked list for downstream creative stages.
pub struct ExampleLookupStage {
    config: StageConfig,
    service: Arc<RetrievalService>,
    query_key: String,
}

impl std::fmt::Debug for ExampleLookupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExampleLookupStage")
            .field("id", &self.config.id)
            .field("query_key", &self.query_key)
            .finish()
    }
}

impl ExampleLookupStage {
    /// Creates a lookup stage reading the query from `query_key`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        output_key: impl Into<String>,
        query_key: impl Into<String>,
        service: Arc<RetrievalService>,
    ) -> Self {
        let query_key = query_key.into();
        Self {
            config: StageConfig::tool(id, output_key).with_input(query_key.clone()),
            service,
            query_key,
        }
    }
}

#[async_trait]
impl Stage for ExampleLookupStage {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let query = match ctx.get(&self.query_key) {
            Some(Value::String(text)) => text.clone(),
            Some(other) => serde_json::to_string(other)
                .map_err(|err| EngineError::validation(err.to_string()))?,
            None => {
                return Err(EngineError::validation(format!(
                    "stage '{}': missing required input key '{}'",
                    self.config.id, self.query_key
                )))
            }
        };

        let prefs = match ctx.get(PREFERENCES_KEY) {
            Some(value) => serde_json::from_value::<RetrievalPreferences>(value.clone())
                .map_err(|err| {
                    EngineError::validation(format!("malformed retrieval preferences: {err}"))
                })?,
            None => RetrievalPreferences::default(),
        };

        // The category preference narrows the vector query itself; the
        // remaining preferences only shape re-ranking.
        let mut filter = MetadataFilter::default();
        if let Some(category) = &prefs.category {
            filter
                .equals
                .insert("category".to_string(), category.clone());
        }

        let ranked = self.service.search(&query, &filter, &prefs).await?;
        let payload = serde_json::to_value(&ranked)
            .map_err(|err| EngineError::validation(err.to_string()))?;
        Ok(StageOutput::Completed(payload))
    }
}
