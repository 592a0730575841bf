//! Per-invocation stage context.

use crate::blackboard::Snapshot;
use crate::confirm::{ConfirmationDescriptor, ConfirmationLookup, ConfirmationRegistry};
use crate::errors::EngineError;
use crate::session::Session;
use crate::stage::StageConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a stage may touch during one invocation: an immutable view of
/// the blackboard, the owning session's identity, and the confirmation
/// registry.
#[derive(Debug, Clone)]
pub struct StageContext {
    session: Arc<Session>,
    confirmations: Arc<ConfirmationRegistry>,
    view: Snapshot,
}

impl StageContext {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        confirmations: Arc<ConfirmationRegistry>,
        view: Snapshot,
    ) -> Self {
        Self {
            session,
            confirmations,
            view,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// Returns the owning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }

    /// Reads a blackboard value from the invocation's view.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.view.get(key)
    }

    /// Returns the full blackboard view.
    #[must_use]
    pub const fn view(&self) -> &Snapshot {
        &self.view
    }

    /// Builds the input slice a stage declared, validating that every
    /// required key is present.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when a declared input is missing.
    pub fn input_slice(&self, config: &StageConfig) -> Result<HashMap<String, Value>, EngineError> {
        let mut slice = HashMap::with_capacity(config.input_keys.len());
        for key in &config.input_keys {
            let Some(value) = self.view.get(key) else {
                return Err(EngineError::validation(format!(
                    "stage '{}' missing required input '{key}'",
                    config.id
                )));
            };
            slice.insert(key.clone(), value.clone());
        }
        Ok(slice)
    }

    /// Checks whether this stage has a pending or resolved confirmation.
    ///
    /// A resolved payload is consumed by this call and will not be returned
    /// again.
    pub fn check_confirmation(&self, stage_id: &str) -> Result<ConfirmationLookup, EngineError> {
        self.confirmations.check(self.session.id(), stage_id)
    }

    /// Suspends this stage pending an operator decision, returning the
    /// descriptor to surface to the caller. Calling again while unresolved
    /// returns the identical descriptor.
    pub fn request_confirmation(
        &self,
        stage_id: &str,
        hint: impl Into<String>,
        expected_shape: Value,
        options: Vec<String>,
    ) -> ConfirmationDescriptor {
        self.confirmations
            .suspend(self.session.id(), stage_id, hint, expected_shape, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use serde_json::json;

    fn context_with(board: &Blackboard) -> StageContext {
        StageContext::new(
            Arc::new(Session::new("user_001")),
            Arc::new(ConfirmationRegistry::new()),
            board.snapshot(),
        )
    }

    #[test]
    fn input_slice_collects_declared_keys() {
        let board = Blackboard::new();
        board.set("raw_description", json!("a tea stall in Lahore"));
        board.set("unrelated", json!(1));

        let ctx = context_with(&board);
        let config = StageConfig::model("requirements", "business_requirements")
            .with_input("raw_description");

        let slice = ctx.input_slice(&config).expect("slice");
        assert_eq!(slice.len(), 1);
        assert_eq!(slice["raw_description"], json!("a tea stall in Lahore"));
    }

    #[test]
    fn missing_input_is_a_validation_error() {
        let board = Blackboard::new();
        let ctx = context_with(&board);
        let config = StageConfig::model("requirements", "business_requirements")
            .with_input("raw_description");

        let err = ctx.input_slice(&config).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
