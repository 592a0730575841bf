//! Stage that hands a finished prompt to the render API.

use crate::errors::EngineError;
use crate::render::JobTracker;
use crate::stage::{Stage, StageConfig, StageContext, StageOutput, StageResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Submits the rendered prompt as an external render job and records the
/// operation id on the blackboard. The stage does not wait for the job;
/// callers poll through the engine boundary.
pub struct RenderSubmitStage {
    config: StageConfig,
    tracker: Arc<JobTracker>,
    prompt_key: String,
}

impl std::fmt::Debug for RenderSubmitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSubmitStage")
            .field("id", &self.config.id)
            .field("prompt_key", &self.prompt_key)
            .finish()
    }
}

impl RenderSubmitStage {
    /// Creates a submit stage reading the prompt from `prompt_key`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        output_key: impl Into<String>,
        prompt_key: impl Into<String>,
        tracker: Arc<JobTracker>,
    ) -> Self {
        let prompt_key = prompt_key.into();
        Self {
            config: StageConfig::tool(id, output_key).with_input(prompt_key.clone()),
            tracker,
            prompt_key,
        }
    }
}

#[async_trait]
impl Stage for RenderSubmitStage {
    fn config(&self) -> &StageConfig {
        &self.config
    }

    async fn execute(&self, ctx: &StageContext) -> StageResult {
        let prompt_value = ctx.get(&self.prompt_key).ok_or_else(|| {
            EngineError::validation(format!(
                "stage '{}': missing required input key '{}'",
                self.config.id, self.prompt_key
            ))
        })?;
        // Structured prompts are serialized verbatim for the render API.
        let prompt = match prompt_value {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other)
                .map_err(|err| EngineError::validation(err.to_string()))?,
        };

        let operation_id = self.tracker.submit(&prompt).await?;
        Ok(StageOutput::Completed(json!({
            "operation_id": operation_id,
            "status": "submitted",
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::ConfirmationRegistry;
    use crate::metrics::MetricsRegistry;
    use crate::retry::RetryConfig;
    use crate::session::Session;
    use crate::testing::MockRenderApi;
    use pretty_assertions::assert_eq;

    fn ctx_with_prompt(value: Value) -> StageContext {
        let session = Arc::new(Session::new("user-1"));
        session.blackboard().set("render_prompt", value);
        let view = session.blackboard().snapshot();
        StageContext::new(session, Arc::new(ConfirmationRegistry::new()), view)
    }

    fn stage_with(api: Arc<MockRenderApi>) -> RenderSubmitStage {
        let tracker = Arc::new(JobTracker::new(
            api,
            RetryConfig::new().with_base_delay_ms(1),
            Arc::new(MetricsRegistry::new()),
        ));
        RenderSubmitStage::new("render_submit", "render_operation", "render_prompt", tracker)
    }

    #[tokio::test]
    async fn string_prompt_is_submitted_verbatim() {
        let api = Arc::new(MockRenderApi::new());
        api.push_submit(Ok("op-1".to_string()));
        let stage = stage_with(Arc::clone(&api));

        let result = stage
            .execute(&ctx_with_prompt(json!("a sweeping drone shot")))
            .await
            .expect("execute");
        match result {
            StageOutput::Completed(value) => {
                assert_eq!(value["operation_id"], "op-1");
                assert_eq!(value["status"], "submitted");
            }
            StageOutput::Suspended(_) => panic!("unexpected suspension"),
        }
        assert_eq!(api.last_prompt().as_deref(), Some("a sweeping drone shot"));
    }

    #[tokio::test]
    async fn structured_prompt_is_serialized() {
        let api = Arc::new(MockRenderApi::new());
        api.push_submit(Ok("op-2".to_string()));
        let stage = stage_with(Arc::clone(&api));

        stage
            .execute(&ctx_with_prompt(json!({"scene": "rooftop", "duration_s": 8})))
            .await
            .expect("execute");
        let prompt = api.last_prompt().expect("prompt captured");
        assert!(prompt.contains("rooftop"));
    }

    #[tokio::test]
    async fn missing_prompt_key_is_a_validation_error() {
        let api = Arc::new(MockRenderApi::new());
        let stage = stage_with(api);
        let session = Arc::new(Session::new("user-1"));
        let view = session.blackboard().snapshot();
        let ctx = StageContext::new(session, Arc::new(ConfirmationRegistry::new()), view);

        let err = stage.execute(&ctx).await.expect_err("should fail");
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
