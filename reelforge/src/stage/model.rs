//! Model-backed stages.
//!
//! `ModelStage` wires the engine's execution contract around a
//! [`ModelRunner`]: validate declared inputs, supply a consumed
//! confirmation payload when one is available, invoke the runner with
//! bounded retries on transient failures, and translate a suspend signal
//! into a confirmation request.

use crate::confirm::ConfirmationLookup;
use crate::errors::ProviderError;
use crate::metrics::{self, MetricsRegistry};
use crate::retry::{with_retry, RetryConfig};
use crate::stage::{Stage, StageConfig, StageContext, StageOutput, StageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Blackboard-slice key under which a consumed confirmation payload is
/// handed to the runner.
pub const CONFIRMATION_INPUT_KEY: &str = "confirmation";

/// What a model runner can come back with.
#[derive(Debug, Clone)]
pub enum ModelReply {
    /// Structured output to merge under the stage's output key.
    Output(Value),
    /// The model (or its tool) needs an operator decision first.
    NeedsConfirmation {
        /// Operator-facing prompt.
        hint: String,
        /// Required payload shape for the resolution.
        expected_shape: Value,
        /// Enumerated choices, if any.
        options: Vec<String>,
    },
}

/// Seam to the language-model backend.
///
/// Implementations receive the opaque stage configuration and the declared
/// blackboard slice, and return structured output or a suspend signal.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Invokes the model for one stage.
    async fn invoke(
        &self,
        config: &StageConfig,
        inputs: &HashMap<String, Value>,
    ) -> Result<ModelReply, ProviderError>;
}

/// A stage that delegates its work to a [`ModelRunner`].
pub struct ModelStage {
    config: StageConfig,
    runner: Arc<dyn ModelRunner>,
    retry: RetryConfig,
    metrics: Arc<MetricsRegistry>,
}

impl ModelStage {
    /// Creates a new model stage.
    #[must_use]
    pub fn new(
        config: StageConfig,
        runner: Arc<dyn ModelRunner>,
        retry: RetryConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            runner,
            retry,
            metrics,
        }
    }
}

impl fmt::Debug for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelStage")
            .field("id", &self.config.id)
            .field("output_key", &self.config.output_key)
            .finish()
    }
}

#[async_trait]
impl Stage for ModelStage {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let mut inputs = ctx.input_slice(&self.config)?;

        // A pending confirmation re-emits its descriptor without touching
        // the runner, so an unresolved re-invocation has no side effects.
        match ctx.check_confirmation(&self.config.id)? {
            ConfirmationLookup::Pending(descriptor) => {
                tracing::debug!(stage = %self.config.id, "re-emitting pending confirmation");
                return Ok(StageOutput::Suspended(descriptor));
            }
            ConfirmationLookup::Resolved(payload) => {
                inputs.insert(CONFIRMATION_INPUT_KEY.to_string(), payload);
            }
            ConfirmationLookup::None => {}
        }

        self.metrics.increment(metrics::MODEL_REQUESTS_TOTAL);
        let reply = with_retry(&self.retry, &self.config.id, || {
            self.runner.invoke(&self.config, &inputs)
        })
        .await
        .map_err(|err| {
            self.metrics.increment(metrics::MODEL_ERRORS_TOTAL);
            err
        })?;

        match reply {
            ModelReply::Output(value) => Ok(StageOutput::Completed(value)),
            ModelReply::NeedsConfirmation {
                hint,
                expected_shape,
                options,
            } => {
                let descriptor =
                    ctx.request_confirmation(&self.config.id, hint, expected_shape, options);
                Ok(StageOutput::Suspended(descriptor))
            }
        }
    }
}
