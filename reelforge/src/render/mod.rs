//! Long-running external render jobs.
//!
//! A render stage submits a prompt to the external render API and records
//! the returned operation id on the blackboard; the caller polls the
//! operation to completion through the engine boundary. Jobs are tracked by
//! a stable opaque id; polling a job after its terminal state is served
//! from cache and never re-contacts the external API.

mod http;
mod poller;
mod stage;

pub use http::HttpRenderApi;
pub use poller::JobTracker;
pub use stage::RenderSubmitStage;

use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of an external render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, not yet started remotely.
    Pending,
    /// In progress remotely.
    Running,
    /// Finished with a downloadable result.
    Completed,
    /// Finished without a result.
    Failed,
}

impl JobStatus {
    /// Returns true for states the job can never leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A point-in-time view of a render job, as returned by `poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    /// The opaque operation id.
    pub operation_id: String,
    /// Current status.
    pub status: JobStatus,
    /// Provider-specific progress detail, when in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    /// Reference to the finished artifact (a downloadable URI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    /// Failure detail for failed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollResponse {
    /// A running (in-flight) response.
    #[must_use]
    pub fn running(operation_id: impl Into<String>, progress: Option<Value>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: JobStatus::Running,
            progress,
            result_ref: None,
            error: None,
        }
    }

    /// A completed response with a result reference.
    #[must_use]
    pub fn completed(operation_id: impl Into<String>, result_ref: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: JobStatus::Completed,
            progress: None,
            result_ref: Some(result_ref.into()),
            error: None,
        }
    }

    /// A failed response with an error message.
    #[must_use]
    pub fn failed(operation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: JobStatus::Failed,
            progress: None,
            result_ref: None,
            error: Some(error.into()),
        }
    }
}

/// Seam to the external render API.
#[async_trait]
pub trait RenderApi: Send + Sync {
    /// Starts a render job, returning its opaque operation id.
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Fetches the current status of an operation.
    async fn get(&self, operation_id: &str) -> Result<PollResponse, ProviderError>;

    /// Downloads a finished artifact.
    async fn download(&self, result_ref: &str) -> Result<Vec<u8>, ProviderError>;
}
