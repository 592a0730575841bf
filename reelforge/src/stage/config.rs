//! Stage descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// A stage backed by a language-model call.
    Model,
    /// A stage invoking a tool or external API.
    Tool,
    /// A combinator node (sequential, parallel, loop).
    Composite,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Tool => write!(f, "tool"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// Declarative description of a stage: identity, output key, and input
/// schema. Instruction text is carried as opaque configuration, never
/// interpreted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage id within a pipeline.
    pub id: String,
    /// What kind of work the stage performs.
    pub kind: StageKind,
    /// Blackboard key the stage's output is merged under.
    pub output_key: String,
    /// Blackboard keys the stage requires as input. Missing keys at
    /// execution time are a validation error.
    pub input_keys: Vec<String>,
    /// Opaque per-stage configuration (instructions, output schema, model
    /// options). Passed through to the runner untouched.
    #[serde(default)]
    pub instructions: Value,
}

impl StageConfig {
    /// Creates a new stage config.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: StageKind, output_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            output_key: output_key.into(),
            input_keys: Vec::new(),
            instructions: Value::Null,
        }
    }

    /// Creates a model-stage config.
    #[must_use]
    pub fn model(id: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self::new(id, StageKind::Model, output_key)
    }

    /// Creates a tool-stage config.
    #[must_use]
    pub fn tool(id: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self::new(id, StageKind::Tool, output_key)
    }

    /// Declares a required input key.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>) -> Self {
        self.input_keys.push(key.into());
        self
    }

    /// Attaches opaque instruction configuration.
    #[must_use]
    pub fn with_instructions(mut self, instructions: Value) -> Self {
        self.instructions = instructions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_inputs() {
        let config = StageConfig::model("creative_prompt", "creative_brief")
            .with_input("selected_concept")
            .with_input("retrieved_examples")
            .with_instructions(json!({"style": "cinematic"}));

        assert_eq!(config.kind, StageKind::Model);
        assert_eq!(config.input_keys.len(), 2);
        assert_eq!(config.instructions["style"], "cinematic");
    }

    #[test]
    fn kind_display() {
        assert_eq!(StageKind::Model.to_string(), "model");
        assert_eq!(StageKind::Tool.to_string(), "tool");
        assert_eq!(StageKind::Composite.to_string(), "composite");
    }
}
