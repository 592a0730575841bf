//! Human-in-the-loop confirmation protocol.
//!
//! A stage that needs an operator decision suspends its run: the registry
//! records a pending request and the caller receives a descriptor it can
//! answer later via an external resume call. The protocol guarantees:
//!
//! - re-invoking an unresolved stage re-emits an *identical* descriptor
//!   (idempotent re-ask, no duplicate side effects);
//! - a resolution payload is validated against the expected shape before
//!   acceptance, never silently coerced;
//! - a resolution is consumable exactly once — re-reading a consumed
//!   payload is an error, never a replay.

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// What the caller sees when a run suspends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationDescriptor {
    /// Stable id of the underlying request; passed back on resolution.
    pub request_id: Uuid,
    /// The stage waiting on the decision.
    pub stage_id: String,
    /// Operator-facing prompt.
    pub hint: String,
    /// Shape the resolution payload must match (an object whose keys are
    /// the required payload keys).
    pub expected_shape: Value,
    /// Optional enumerated choices, e.g. candidate concept names.
    pub options: Vec<String>,
}

/// Internal state of a confirmation request.
#[derive(Debug, Clone)]
enum ConfirmationState {
    Pending,
    Resolved(Value),
    Consumed,
}

#[derive(Debug, Clone)]
struct ConfirmationRequest {
    descriptor: ConfirmationDescriptor,
    state: ConfirmationState,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

/// Result of a stage asking the registry about its own confirmation.
#[derive(Debug, Clone)]
pub enum ConfirmationLookup {
    /// No request exists for this stage; proceed normally.
    None,
    /// A request is pending; re-emit this identical descriptor.
    Pending(ConfirmationDescriptor),
    /// A resolution is available; it has now been consumed.
    Resolved(Value),
}

/// Registry of confirmation requests, keyed by (session, stage).
///
/// One run suspends on at most one request at a time, so per-session lookup
/// is unambiguous.
#[derive(Debug, Default)]
pub struct ConfirmationRegistry {
    requests: RwLock<HashMap<(String, String), ConfirmationRequest>>,
}

impl ConfirmationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a suspension for a stage, or returns the already-pending
    /// descriptor unchanged.
    pub fn suspend(
        &self,
        session_id: &str,
        stage_id: &str,
        hint: impl Into<String>,
        expected_shape: Value,
        options: Vec<String>,
    ) -> ConfirmationDescriptor {
        let key = (session_id.to_string(), stage_id.to_string());
        let mut requests = self.requests.write();

        if let Some(existing) = requests.get(&key) {
            if matches!(existing.state, ConfirmationState::Pending) {
                return existing.descriptor.clone();
            }
        }

        let descriptor = ConfirmationDescriptor {
            request_id: Uuid::new_v4(),
            stage_id: stage_id.to_string(),
            hint: hint.into(),
            expected_shape,
            options,
        };
        tracing::info!(
            session_id,
            stage_id,
            request_id = %descriptor.request_id,
            "run suspended awaiting confirmation"
        );
        requests.insert(
            key,
            ConfirmationRequest {
                descriptor: descriptor.clone(),
                state: ConfirmationState::Pending,
                created_at: Utc::now(),
            },
        );
        descriptor
    }

    /// Looks up (and consumes, if resolved) the request for a stage.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Confirmation`] when the resolution was already
    /// consumed and no new one has been supplied.
    pub fn check(&self, session_id: &str, stage_id: &str) -> Result<ConfirmationLookup, EngineError> {
        let key = (session_id.to_string(), stage_id.to_string());
        let mut requests = self.requests.write();

        let Some(request) = requests.get_mut(&key) else {
            return Ok(ConfirmationLookup::None);
        };

        match request.state.clone() {
            ConfirmationState::Pending => Ok(ConfirmationLookup::Pending(request.descriptor.clone())),
            ConfirmationState::Resolved(payload) => {
                request.state = ConfirmationState::Consumed;
                Ok(ConfirmationLookup::Resolved(payload))
            }
            ConfirmationState::Consumed => Err(EngineError::Confirmation(format!(
                "resolution for stage '{stage_id}' was already consumed"
            ))),
        }
    }

    /// Resolves a pending request with an operator-supplied payload.
    ///
    /// # Errors
    ///
    /// Fails when nothing is pending, the request id does not match, the
    /// request was already resolved, or the payload does not match the
    /// expected shape.
    pub fn resolve(
        &self,
        session_id: &str,
        request_id: Uuid,
        payload: Value,
    ) -> Result<(), EngineError> {
        let mut requests = self.requests.write();

        let entry = requests
            .iter_mut()
            .find(|((sid, _), request)| sid == session_id && request.descriptor.request_id == request_id);

        let Some((_, request)) = entry else {
            return Err(EngineError::Confirmation(format!(
                "no confirmation request {request_id} for session '{session_id}'"
            )));
        };

        if !matches!(request.state, ConfirmationState::Pending) {
            return Err(EngineError::Confirmation(format!(
                "confirmation request {request_id} was already resolved"
            )));
        }

        validate_payload_shape(&request.descriptor.expected_shape, &payload)?;

        tracing::info!(session_id, request_id = %request_id, "confirmation resolved");
        request.state = ConfirmationState::Resolved(payload);
        Ok(())
    }

    /// Returns the pending descriptor for a session, if any.
    #[must_use]
    pub fn pending_for_session(&self, session_id: &str) -> Option<ConfirmationDescriptor> {
        self.requests
            .read()
            .iter()
            .find(|((sid, _), request)| {
                sid == session_id && matches!(request.state, ConfirmationState::Pending)
            })
            .map(|(_, request)| request.descriptor.clone())
    }

    /// Drops every request belonging to a session.
    pub fn clear_session(&self, session_id: &str) {
        self.requests.write().retain(|(sid, _), _| sid != session_id);
    }

    /// Number of pending requests across all sessions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests
            .read()
            .values()
            .filter(|r| matches!(r.state, ConfirmationState::Pending))
            .count()
    }
}

/// Validates a resolution payload against the expected shape.
///
/// The expected shape is an object whose keys name the required payload
/// keys; the payload must be an object with exactly that key set. A
/// non-object expected shape accepts any payload.
fn validate_payload_shape(expected: &Value, payload: &Value) -> Result<(), EngineError> {
    let Value::Object(expected_map) = expected else {
        return Ok(());
    };

    let Value::Object(payload_map) = payload else {
        return Err(EngineError::validation(
            "confirmation payload must be a JSON object",
        ));
    };

    for key in expected_map.keys() {
        if !payload_map.contains_key(key) {
            return Err(EngineError::validation(format!(
                "confirmation payload missing required key '{key}'"
            )));
        }
    }
    for key in payload_map.keys() {
        if !expected_map.contains_key(key) {
            return Err(EngineError::validation(format!(
                "confirmation payload has unexpected key '{key}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn expected_shape() -> Value {
        json!({"concept_name": null})
    }

    #[test]
    fn unresolved_reask_yields_identical_descriptor() {
        let registry = ConfirmationRegistry::new();
        let first = registry.suspend(
            "s_1",
            "concept_selector",
            "pick one concept",
            expected_shape(),
            vec!["Neon Nights".to_string(), "Fresh Start".to_string()],
        );
        let second = registry.suspend(
            "s_1",
            "concept_selector",
            "pick one concept",
            expected_shape(),
            vec!["Neon Nights".to_string(), "Fresh Start".to_string()],
        );
        assert_eq!(first, second);
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn resolution_is_consumed_exactly_once() {
        let registry = ConfirmationRegistry::new();
        let desc = registry.suspend("s_1", "selector", "pick", expected_shape(), vec![]);

        registry
            .resolve("s_1", desc.request_id, json!({"concept_name": "Neon Nights"}))
            .expect("resolve");

        let first = registry.check("s_1", "selector").expect("check");
        assert!(matches!(first, ConfirmationLookup::Resolved(_)));

        let second = registry.check("s_1", "selector");
        assert!(second.is_err());
    }

    #[test]
    fn double_resolution_is_rejected() {
        let registry = ConfirmationRegistry::new();
        let desc = registry.suspend("s_1", "selector", "pick", expected_shape(), vec![]);

        registry
            .resolve("s_1", desc.request_id, json!({"concept_name": "A"}))
            .expect("first resolve");
        let again = registry.resolve("s_1", desc.request_id, json!({"concept_name": "B"}));
        assert!(again.is_err());
    }

    #[test]
    fn shape_mismatch_is_a_validation_error() {
        let registry = ConfirmationRegistry::new();
        let desc = registry.suspend("s_1", "selector", "pick", expected_shape(), vec![]);

        let missing = registry.resolve("s_1", desc.request_id, json!({}));
        assert!(matches!(missing, Err(EngineError::Validation(_))));

        let extra = registry.resolve(
            "s_1",
            desc.request_id,
            json!({"concept_name": "A", "mood": "dark"}),
        );
        assert!(matches!(extra, Err(EngineError::Validation(_))));

        // Still pending, so a correct payload is accepted afterwards.
        let ok = registry.resolve("s_1", desc.request_id, json!({"concept_name": "A"}));
        assert!(ok.is_ok());
    }

    #[test]
    fn unknown_request_id_is_rejected() {
        let registry = ConfirmationRegistry::new();
        registry.suspend("s_1", "selector", "pick", expected_shape(), vec![]);
        let result = registry.resolve("s_1", Uuid::new_v4(), json!({"concept_name": "A"}));
        assert!(result.is_err());
    }

    #[test]
    fn pending_lookup_by_session() {
        let registry = ConfirmationRegistry::new();
        assert!(registry.pending_for_session("s_1").is_none());

        let desc = registry.suspend("s_1", "selector", "pick", expected_shape(), vec![]);
        let found = registry.pending_for_session("s_1").expect("pending");
        assert_eq!(found.request_id, desc.request_id);

        registry.clear_session("s_1");
        assert!(registry.pending_for_session("s_1").is_none());
    }
}
