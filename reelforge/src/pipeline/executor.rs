//! Pipeline execution against a session.

use crate::blackboard::{Blackboard, Snapshot};
use crate::confirm::{ConfirmationDescriptor, ConfirmationRegistry};
use crate::errors::EngineError;
use crate::metrics::{self, MetricsRegistry};
use crate::pipeline::PipelineNode;
use crate::session::{Session, SessionStatus};
use crate::stage::{StageContext, StageOutput};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// How a (sub)tree finished: either fully, with the writes it produced, or
/// suspended on a confirmation, with the writes produced so far.
enum NodeFlow {
    Completed(HashMap<String, Value>),
    Suspended {
        descriptor: ConfirmationDescriptor,
        writes: HashMap<String, Value>,
    },
}

/// The result of running (or resuming) a pipeline for a session.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run reached the end of the tree; the session blackboard holds
    /// the final structured state.
    Completed {
        /// Final blackboard contents.
        result: HashMap<String, Value>,
    },
    /// The run is waiting on an operator decision.
    Suspended(ConfirmationDescriptor),
}

/// Walks a pipeline tree for one session.
///
/// Completed nodes are recorded on the session, so resuming after a
/// confirmation re-enters the tree without re-running prior stages.
#[derive(Debug)]
pub struct PipelineExecutor {
    confirmations: Arc<ConfirmationRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl PipelineExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(confirmations: Arc<ConfirmationRegistry>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            confirmations,
            metrics,
        }
    }

    /// Runs the pipeline for a session until it completes, suspends, or
    /// fails. Also drives the session status machine.
    ///
    /// # Errors
    ///
    /// Propagates the first stage failure; the session is left in the
    /// `Failed` state.
    pub async fn run(
        &self,
        root: &PipelineNode,
        session: &Arc<Session>,
    ) -> Result<RunOutcome, EngineError> {
        if session.status().is_terminal() {
            return Err(EngineError::validation(format!(
                "session '{}' already reached terminal state {}",
                session.id(),
                session.status()
            )));
        }

        session.set_status(SessionStatus::Running);
        tracing::info!(session_id = %session.id(), "pipeline run started");

        match self.run_node(root, session, session.blackboard()).await {
            Ok(NodeFlow::Completed(_)) => {
                session.set_status(SessionStatus::Completed);
                tracing::info!(session_id = %session.id(), "pipeline run completed");
                Ok(RunOutcome::Completed {
                    result: session.blackboard().to_dict(),
                })
            }
            Ok(NodeFlow::Suspended { descriptor, .. }) => {
                session.set_status(SessionStatus::AwaitingConfirmation);
                Ok(RunOutcome::Suspended(descriptor))
            }
            Err(err) => {
                session.set_status(SessionStatus::Failed);
                tracing::warn!(session_id = %session.id(), error = %err, "pipeline run failed");
                Err(err)
            }
        }
    }

    fn run_node<'a>(
        &'a self,
        node: &'a PipelineNode,
        session: &'a Arc<Session>,
        board: &'a Blackboard,
    ) -> BoxFuture<'a, Result<NodeFlow, EngineError>> {
        async move {
            match node {
                PipelineNode::Stage(stage) => self.run_stage(stage.as_ref(), session, board).await,
                PipelineNode::Sequential { id, children } => {
                    if session.is_node_completed(id) {
                        return Ok(NodeFlow::Completed(HashMap::new()));
                    }
                    let mut writes = HashMap::new();
                    for child in children {
                        match self.run_node(child, session, board).await? {
                            NodeFlow::Completed(w) => writes.extend(w),
                            NodeFlow::Suspended {
                                descriptor,
                                writes: w,
                            } => {
                                writes.extend(w);
                                return Ok(NodeFlow::Suspended { descriptor, writes });
                            }
                        }
                    }
                    session.mark_node_completed(id);
                    Ok(NodeFlow::Completed(writes))
                }
                PipelineNode::Parallel { id, children } => {
                    self.run_parallel(id, children, session, board).await
                }
                PipelineNode::Loop {
                    id,
                    body,
                    exit_signal,
                    max_iterations,
                } => {
                    self.run_loop(id, body, exit_signal, *max_iterations, session, board)
                        .await
                }
            }
        }
        .boxed()
    }

    async fn run_stage(
        &self,
        stage: &dyn crate::stage::Stage,
        session: &Arc<Session>,
        board: &Blackboard,
    ) -> Result<NodeFlow, EngineError> {
        let config = stage.config();
        if session.is_node_completed(&config.id) {
            return Ok(NodeFlow::Completed(HashMap::new()));
        }

        self.metrics.increment(metrics::STAGES_TOTAL);
        let ctx = StageContext::new(
            Arc::clone(session),
            Arc::clone(&self.confirmations),
            board.snapshot(),
        );

        tracing::debug!(stage = %config.id, kind = %config.kind, "stage started");
        match stage.execute(&ctx).await {
            Ok(StageOutput::Completed(value)) => {
                board.set(config.output_key.clone(), value.clone());
                session.mark_node_completed(&config.id);
                tracing::debug!(stage = %config.id, "stage completed");
                let mut writes = HashMap::new();
                writes.insert(config.output_key.clone(), value);
                Ok(NodeFlow::Completed(writes))
            }
            Ok(StageOutput::Suspended(descriptor)) => Ok(NodeFlow::Suspended {
                descriptor,
                writes: HashMap::new(),
            }),
            Err(err) => {
                self.metrics.increment(metrics::STAGE_ERRORS_TOTAL);
                tracing::warn!(stage = %config.id, error = %err, "stage failed");
                Err(err)
            }
        }
    }

    async fn run_parallel(
        &self,
        id: &str,
        children: &[PipelineNode],
        session: &Arc<Session>,
        board: &Blackboard,
    ) -> Result<NodeFlow, EngineError> {
        if session.is_node_completed(id) {
            return Ok(NodeFlow::Completed(HashMap::new()));
        }

        // Sibling subtrees must declare disjoint output keys. Checked on
        // declarations rather than observed writes: a suspended branch
        // contributes its writes only on a later resume, after the other
        // siblings already merged.
        let mut declared: HashMap<&str, usize> = HashMap::new();
        let mut keys: Vec<Vec<String>> = Vec::with_capacity(children.len());
        for child in children {
            keys.push(child.output_keys());
        }
        for (branch, branch_keys) in keys.iter().enumerate() {
            for key in branch_keys {
                match declared.get(key.as_str()) {
                    Some(owner) if *owner != branch => {
                        return Err(EngineError::configuration(format!(
                            "parallel node '{id}': sibling branches both write output key '{key}'"
                        )));
                    }
                    _ => {
                        declared.insert(key, branch);
                    }
                }
            }
        }

        // Every sibling reads the same pre-branch snapshot; writes stay on
        // a branch-local board until the barrier.
        let snapshot = board.snapshot();
        let branches = children
            .iter()
            .map(|child| self.run_branch(child, session, snapshot.clone()));

        // No early cancellation: side effects may already be irreversible,
        // so every branch settles before any failure is reported.
        let settled = join_all(branches).await;

        let mut flows = Vec::with_capacity(settled.len());
        for result in settled {
            flows.push(result?);
        }

        let mut merged: HashMap<String, Value> = HashMap::new();
        let mut suspended: Option<ConfirmationDescriptor> = None;
        for flow in flows {
            let (writes, descriptor) = match flow {
                NodeFlow::Completed(writes) => (writes, None),
                NodeFlow::Suspended { descriptor, writes } => (writes, Some(descriptor)),
            };
            merged.extend(writes);
            if suspended.is_none() {
                suspended = descriptor;
            }
        }

        board.merge(merged.clone());

        if let Some(descriptor) = suspended {
            return Ok(NodeFlow::Suspended {
                descriptor,
                writes: merged,
            });
        }
        session.mark_node_completed(id);
        Ok(NodeFlow::Completed(merged))
    }

    async fn run_branch(
        &self,
        child: &PipelineNode,
        session: &Arc<Session>,
        snapshot: Snapshot,
    ) -> Result<NodeFlow, EngineError> {
        let branch = Blackboard::from_snapshot(&snapshot);
        self.run_node(child, session, &branch).await
    }

    async fn run_loop(
        &self,
        id: &str,
        body: &[PipelineNode],
        exit_signal: &str,
        max_iterations: u32,
        session: &Arc<Session>,
        board: &Blackboard,
    ) -> Result<NodeFlow, EngineError> {
        if session.is_node_completed(id) {
            return Ok(NodeFlow::Completed(HashMap::new()));
        }

        let mut writes = HashMap::new();
        let mut pass = session.loop_progress(id).completed_passes;
        let mut exit_fired = false;

        while pass < max_iterations {
            // A genuinely new pass re-arms the exit key and forgets body
            // completions so refinement re-runs. A resumed pass keeps both.
            if session.loop_progress(id).started_pass != Some(pass) {
                session.begin_loop_pass(id, pass);
                let mut body_ids = Vec::new();
                for child in body {
                    body_ids.extend(child.descendant_ids());
                }
                session.clear_completed(&body_ids);
                board.remove(exit_signal);
            }

            for child in body {
                match self.run_node(child, session, board).await? {
                    NodeFlow::Completed(w) => writes.extend(w),
                    NodeFlow::Suspended {
                        descriptor,
                        writes: w,
                    } => {
                        writes.extend(w);
                        return Ok(NodeFlow::Suspended { descriptor, writes });
                    }
                }
            }

            session.complete_loop_pass(id, pass);
            exit_fired = board.get(exit_signal).and_then(|v| v.as_bool()) == Some(true);
            if exit_fired {
                break;
            }
            pass += 1;
        }

        // Reaching the ceiling without an exit signal accepts the last
        // pass's output as-is.
        tracing::debug!(
            loop_id = %id,
            passes = session.loop_progress(id).completed_passes,
            exit_fired,
            "loop finished"
        );
        session.mark_node_completed(id);
        Ok(NodeFlow::Completed(writes))
    }
}
