//! Job tracking and polling.

use crate::errors::EngineError;
use crate::metrics::{self, MetricsRegistry};
use crate::render::{JobStatus, PollResponse, RenderApi};
use crate::retry::{with_retry, RetryConfig};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tracks render jobs by operation id, caching terminal results so
/// repeated polls of a finished job never re-contact the external API.
pub struct JobTracker {
    api: Arc<dyn RenderApi>,
    jobs: DashMap<String, PollResponse>,
    retry: RetryConfig,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("tracked_jobs", &self.jobs.len())
            .finish()
    }
}

impl JobTracker {
    /// Creates a new tracker around a render API.
    #[must_use]
    pub fn new(api: Arc<dyn RenderApi>, retry: RetryConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            api,
            jobs: DashMap::new(),
            retry,
            metrics,
        }
    }

    /// Submits a render job.
    ///
    /// Transient submit errors retry with bounded backoff; once exhausted
    /// (or on a terminal error) the failure is reported immediately — a
    /// failed submission is never retried in the background.
    ///
    /// # Errors
    ///
    /// Returns the provider error when submission ultimately fails.
    pub async fn submit(&self, prompt: &str) -> Result<String, EngineError> {
        let operation_id = with_retry(&self.retry, "render.submit", || {
            self.metrics.increment(metrics::RENDER_SUBMITS_TOTAL);
            self.api.submit(prompt)
        })
        .await?;

        tracing::info!(operation_id = %operation_id, "render job submitted");
        self.jobs.insert(
            operation_id.clone(),
            PollResponse {
                operation_id: operation_id.clone(),
                status: JobStatus::Pending,
                progress: None,
                result_ref: None,
                error: None,
            },
        );
        Ok(operation_id)
    }

    /// Polls a job. Safe to call repeatedly; a job already in a terminal
    /// state is answered from cache without contacting the external API.
    ///
    /// Persistent poll failures surface as a `failed` status rather than an
    /// error, so a pipeline waiting on the job sees a structured outcome.
    ///
    /// # Errors
    ///
    /// Currently infallible at this layer; the signature leaves room for
    /// storage-backed trackers.
    pub async fn poll(&self, operation_id: &str) -> Result<PollResponse, EngineError> {
        if let Some(cached) = self.jobs.get(operation_id) {
            if cached.status.is_terminal() {
                return Ok(cached.clone());
            }
        }

        let fetched = with_retry(&self.retry, "render.poll", || {
            self.metrics.increment(metrics::RENDER_POLLS_TOTAL);
            self.api.get(operation_id)
        })
        .await;

        match fetched {
            Ok(response) => {
                // Only statuses the API actually reported are cached; a
                // terminal one makes every later poll idempotent.
                self.jobs.insert(operation_id.to_string(), response.clone());
                Ok(response)
            }
            Err(err) => {
                tracing::warn!(operation_id, error = %err, "render poll failed");
                Ok(PollResponse::failed(operation_id, err.to_string()))
            }
        }
    }

    /// Polls on a fixed cadence until the job reaches a terminal state or
    /// `max_wait` elapses. A timeout returns the last in-flight status
    /// instead of erroring.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::poll`].
    pub async fn blocking_wait(
        &self,
        operation_id: &str,
        interval: Duration,
        max_wait: Duration,
    ) -> Result<PollResponse, EngineError> {
        let start = tokio::time::Instant::now();
        loop {
            let response = self.poll(operation_id).await?;
            if response.status.is_terminal() {
                return Ok(response);
            }
            if start.elapsed() >= max_wait {
                tracing::debug!(operation_id, "blocking wait timed out, job still running");
                return Ok(response);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Downloads the artifact of a completed job.
    ///
    /// # Errors
    ///
    /// Fails when the download itself fails.
    pub async fn download(&self, result_ref: &str) -> Result<Vec<u8>, EngineError> {
        let bytes = with_retry(&self.retry, "render.download", || {
            self.api.download(result_ref)
        })
        .await?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::testing::MockRenderApi;
    use pretty_assertions::assert_eq;

    fn tracker_with(api: Arc<MockRenderApi>) -> JobTracker {
        JobTracker::new(
            api,
            RetryConfig::new().with_base_delay_ms(1),
            Arc::new(MetricsRegistry::new()),
        )
    }

    #[tokio::test]
    async fn terminal_polls_are_served_from_cache() {
        let api = Arc::new(MockRenderApi::new());
        api.push_poll(Ok(PollResponse::running("op-1", None)));
        api.push_poll(Ok(PollResponse::completed("op-1", "https://cdn/v.mp4")));
        let tracker = tracker_with(Arc::clone(&api));

        assert_eq!(tracker.poll("op-1").await.expect("poll").status, JobStatus::Running);
        let done = tracker.poll("op-1").await.expect("poll");
        assert_eq!(done.status, JobStatus::Completed);

        // Every further poll answers from cache without recontacting.
        for _ in 0..3 {
            let again = tracker.poll("op-1").await.expect("poll");
            assert_eq!(again, done);
        }
        assert_eq!(api.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_wait_returns_still_running_on_timeout() {
        let api = Arc::new(MockRenderApi::new());
        for _ in 0..8 {
            api.push_poll(Ok(PollResponse::running("op-1", None)));
        }
        let tracker = tracker_with(Arc::clone(&api));

        let result = tracker
            .blocking_wait("op-1", Duration::from_secs(10), Duration::from_secs(25))
            .await
            .expect("wait");
        assert_eq!(result.status, JobStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_wait_stops_at_terminal_state() {
        let api = Arc::new(MockRenderApi::new());
        api.push_poll(Ok(PollResponse::running("op-1", None)));
        api.push_poll(Ok(PollResponse::running("op-1", None)));
        api.push_poll(Ok(PollResponse::completed("op-1", "https://cdn/v.mp4")));
        let tracker = tracker_with(Arc::clone(&api));

        let result = tracker
            .blocking_wait("op-1", Duration::from_secs(10), Duration::from_secs(600))
            .await
            .expect("wait");
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(api.get_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_retry_then_succeed() {
        let api = Arc::new(MockRenderApi::new());
        api.push_poll(Err(ProviderError::transient("render", "rate limited")));
        api.push_poll(Ok(PollResponse::running("op-1", None)));
        let tracker = tracker_with(Arc::clone(&api));

        let result = tracker.poll("op-1").await.expect("poll");
        assert_eq!(result.status, JobStatus::Running);
        assert_eq!(api.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_poll_failure_surfaces_as_failed_status() {
        let api = Arc::new(MockRenderApi::new());
        for _ in 0..3 {
            api.push_poll(Err(ProviderError::transient("render", "network down")));
        }
        let tracker = tracker_with(Arc::clone(&api));

        let result = tracker.poll("op-1").await.expect("poll");
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn submit_failure_is_terminal_and_immediate() {
        let api = Arc::new(MockRenderApi::new());
        api.push_submit(Err(ProviderError::terminal("render", "invalid api key")));
        let tracker = tracker_with(Arc::clone(&api));

        let result = tracker.submit("a prompt").await;
        assert!(result.is_err());
        assert_eq!(api.submit_calls(), 1);
    }

    #[tokio::test]
    async fn submit_registers_pending_job() {
        let api = Arc::new(MockRenderApi::new());
        api.push_submit(Ok("op-9".to_string()));
        api.push_poll(Ok(PollResponse::running("op-9", None)));
        let tracker = tracker_with(Arc::clone(&api));

        let operation_id = tracker.submit("a prompt").await.expect("submit");
        assert_eq!(operation_id, "op-9");
        let status = tracker.poll(&operation_id).await.expect("poll");
        assert_eq!(status.status, JobStatus::Running);
    }
}
