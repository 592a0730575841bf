//! Error types for the reelforge engine.
//!
//! The taxonomy separates boundary validation failures, external provider
//! failures (transient vs terminal), fatal pipeline configuration mistakes,
//! and render-job failures. Confirmation suspension is *not* an error; it is
//! a normal stage output (see [`crate::stage::StageOutput::Suspended`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether a provider failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Network, timeout, or rate-limit failure; retried with bounded backoff.
    Transient,
    /// Auth, malformed-request, or provider-side rejection; never retried.
    Terminal,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// A failure reported by an external collaborator (model runner, embedding
/// provider, vector store, relational store, or render API).
#[derive(Debug, Clone, Error)]
#[error("{provider} provider error ({kind}): {message}")]
pub struct ProviderError {
    /// Which provider failed.
    pub provider: String,
    /// Transient or terminal.
    pub kind: ProviderErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ProviderError {
    /// Creates a transient (retryable) provider error.
    #[must_use]
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a terminal (non-retryable) provider error.
    #[must_use]
    pub fn terminal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderErrorKind::Terminal,
            message: message.into(),
        }
    }

    /// Returns true if the error is safe to retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == ProviderErrorKind::Transient
    }

    /// Classifies a reqwest failure: timeouts, connection failures, 429s,
    /// and 5xx responses are transient; everything else is terminal.
    #[must_use]
    pub fn from_reqwest(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .is_some_and(|status| status.as_u16() == 429 || status.is_server_error());
        Self {
            provider: provider.into(),
            kind: if transient {
                ProviderErrorKind::Transient
            } else {
                ProviderErrorKind::Terminal
            },
            message: err.to_string(),
        }
    }
}

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed boundary input, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// An external provider failed unrecoverably (or exhausted retries).
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// A fatal pipeline configuration mistake, e.g. colliding parallel
    /// output keys. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The render job reached a failed terminal state.
    #[error("render job failed: {0}")]
    JobFailure(String),

    /// Misuse of the confirmation protocol (double resolution, re-reading a
    /// consumed payload, resolving with nothing pending).
    #[error("confirmation error: {0}")]
    Confirmation(String),

    /// The referenced session does not exist (or was already torn down).
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl EngineError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable machine-readable kind string, used in the boundary envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Provider(_) => "provider_error",
            Self::Configuration(_) => "configuration_error",
            Self::JobFailure(_) => "job_failure",
            Self::Confirmation(_) => "confirmation_error",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }
}

/// The single error shape surfaced at the exposed boundary.
///
/// The run endpoint returns exactly one of terminal result, confirmation
/// descriptor, or this envelope; never a silent partial result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Machine-readable error kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&EngineError> for ErrorEnvelope {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for ErrorEnvelope {
    fn from(err: EngineError) -> Self {
        Self::from(&err)
    }
}
