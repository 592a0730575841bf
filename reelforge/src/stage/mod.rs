//! Stages: the atomic units of pipeline work.
//!
//! A stage is one model call or one tool call with a declared output key
//! and declared input keys. Stages read an immutable blackboard view and
//! return either a completed output (merged under their key) or a suspend
//! descriptor when an operator decision is needed.

mod config;
mod context;
mod model;

pub use config::{StageConfig, StageKind};
pub use context::StageContext;
pub use model::{ModelReply, ModelRunner, ModelStage, CONFIRMATION_INPUT_KEY};

use crate::confirm::ConfirmationDescriptor;
use crate::errors::EngineError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// The result of one stage invocation.
#[derive(Debug, Clone)]
pub enum StageOutput {
    /// The stage finished; the value is merged into the blackboard under
    /// the stage's declared output key.
    Completed(Value),
    /// The stage needs an operator decision; the run suspends.
    Suspended(ConfirmationDescriptor),
}

/// Convenience alias for stage execution results.
pub type StageResult = Result<StageOutput, EngineError>;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stage descriptor (id, kind, output key, input schema).
    fn config(&self) -> &StageConfig;

    /// Executes the stage against an immutable blackboard view.
    async fn execute(&self, ctx: &StageContext) -> StageResult;
}

/// A simple function-based stage, mostly useful in tests and benches.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    config: StageConfig,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(config: StageConfig, func: F) -> Self {
        Self { config, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("id", &self.config.id).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> StageResult + Send + Sync,
{
    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        (self.func)(ctx)
    }
}
