//! Pipeline composition and execution.
//!
//! Pipelines are trees of [`PipelineNode`]s: leaf stages composed with
//! Sequential, Parallel, and bounded Loop combinators. The executor walks
//! the tree against a session, threading outputs through the session
//! blackboard and honoring suspension for confirmations.

mod executor;

pub use executor::{PipelineExecutor, RunOutcome};

use crate::stage::Stage;
use std::fmt;
use std::sync::Arc;

/// A node in the pipeline graph.
pub enum PipelineNode {
    /// A leaf stage.
    Stage(Arc<dyn Stage>),
    /// Children run strictly left to right; each sees all prior writes;
    /// the first failure aborts the remainder.
    Sequential {
        /// Node id, used for resume bookkeeping.
        id: String,
        /// Ordered children.
        children: Vec<PipelineNode>,
    },
    /// Children run concurrently against the same pre-branch snapshot;
    /// writes merge only after every branch settles. Sibling output-key
    /// collisions are a fatal configuration error.
    Parallel {
        /// Node id.
        id: String,
        /// Concurrent children.
        children: Vec<PipelineNode>,
    },
    /// Body re-runs until the exit key holds `true` after a pass, or the
    /// pass ceiling is reached — whichever comes first.
    Loop {
        /// Node id.
        id: String,
        /// Body children, run sequentially within a pass.
        body: Vec<PipelineNode>,
        /// Blackboard key that ends the loop when it holds `true`.
        exit_signal: String,
        /// Hard ceiling on passes, honored even absent an exit signal.
        max_iterations: u32,
    },
}

impl PipelineNode {
    /// Wraps a stage as a leaf node.
    #[must_use]
    pub fn stage(stage: Arc<dyn Stage>) -> Self {
        Self::Stage(stage)
    }

    /// Builds a sequential node.
    #[must_use]
    pub fn sequential(id: impl Into<String>, children: Vec<Self>) -> Self {
        Self::Sequential {
            id: id.into(),
            children,
        }
    }

    /// Builds a parallel node.
    #[must_use]
    pub fn parallel(id: impl Into<String>, children: Vec<Self>) -> Self {
        Self::Parallel {
            id: id.into(),
            children,
        }
    }

    /// Builds a bounded loop node.
    #[must_use]
    pub fn looped(
        id: impl Into<String>,
        body: Vec<Self>,
        exit_signal: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        Self::Loop {
            id: id.into(),
            body,
            exit_signal: exit_signal.into(),
            max_iterations,
        }
    }

    /// Returns the node id (stage id for leaves).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Stage(stage) => &stage.config().id,
            Self::Sequential { id, .. } | Self::Parallel { id, .. } | Self::Loop { id, .. } => id,
        }
    }

    /// Collects this node's id and every descendant id.
    #[must_use]
    pub fn descendant_ids(&self) -> Vec<String> {
        let mut ids = vec![self.id().to_string()];
        match self {
            Self::Stage(_) => {}
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => {
                for child in children {
                    ids.extend(child.descendant_ids());
                }
            }
            Self::Loop { body, .. } => {
                for child in body {
                    ids.extend(child.descendant_ids());
                }
            }
        }
        ids
    }

    /// Collects the output keys declared by leaf stages in the subtree.
    #[must_use]
    pub fn output_keys(&self) -> Vec<String> {
        match self {
            Self::Stage(stage) => vec![stage.config().output_key.clone()],
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => {
                children.iter().flat_map(Self::output_keys).collect()
            }
            Self::Loop { body, .. } => body.iter().flat_map(Self::output_keys).collect(),
        }
    }

    /// Counts leaf stages in the subtree.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        match self {
            Self::Stage(_) => 1,
            Self::Sequential { children, .. } | Self::Parallel { children, .. } => {
                children.iter().map(Self::stage_count).sum()
            }
            Self::Loop { body, .. } => body.iter().map(Self::stage_count).sum(),
        }
    }
}

impl fmt::Debug for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => f.debug_tuple("Stage").field(&stage.config().id).finish(),
            Self::Sequential { id, children } => f
                .debug_struct("Sequential")
                .field("id", id)
                .field("children", &children.len())
                .finish(),
            Self::Parallel { id, children } => f
                .debug_struct("Parallel")
                .field("id", id)
                .field("children", &children.len())
                .finish(),
            Self::Loop {
                id,
                body,
                exit_signal,
                max_iterations,
            } => f
                .debug_struct("Loop")
                .field("id", id)
                .field("body", &body.len())
                .field("exit_signal", exit_signal)
                .field("max_iterations", max_iterations)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{FnStage, StageConfig, StageOutput};
    use serde_json::json;

    fn leaf(id: &str) -> PipelineNode {
        PipelineNode::stage(Arc::new(FnStage::new(
            StageConfig::tool(id, id),
            |_ctx| Ok(StageOutput::Completed(json!(null))),
        )))
    }

    #[test]
    fn descendant_ids_cover_the_tree() {
        let node = PipelineNode::sequential(
            "root",
            vec![
                leaf("a"),
                PipelineNode::parallel("par", vec![leaf("b"), leaf("c")]),
                PipelineNode::looped("lp", vec![leaf("d")], "done", 2),
            ],
        );

        let ids = node.descendant_ids();
        for expected in ["root", "a", "par", "b", "c", "lp", "d"] {
            assert!(ids.contains(&expected.to_string()), "missing {expected}");
        }
        assert_eq!(node.stage_count(), 4);
        assert_eq!(node.output_keys(), ["a", "b", "c", "d"]);
    }
}
