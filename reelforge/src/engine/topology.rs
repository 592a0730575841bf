//! The default ad-video pipeline topology.

use crate::metrics::MetricsRegistry;
use crate::pipeline::PipelineNode;
use crate::render::{JobTracker, RenderSubmitStage};
use crate::retrieval::{ExampleLookupStage, RetrievalService};
use crate::retry::RetryConfig;
use crate::stage::{ModelRunner, ModelStage, StageConfig};
use serde_json::json;
use std::sync::Arc;

/// Blackboard key the run request seeds.
pub const RAW_DESCRIPTION_KEY: &str = "raw_description";

/// Blackboard key holding the final render operation handle.
pub const RENDER_OPERATION_KEY: &str = "render_operation";

/// Blackboard key the reviewer sets to `true` to end the refinement loop.
pub const PROMPT_APPROVED_KEY: &str = "prompt_approved";

/// Builds the out-of-the-box ad-video pipeline.
///
/// Shape: requirements analysis, then parallel domain research and concept
/// generation, then concept selection (confirmation-capable), example
/// retrieval, creative brief, prompt writing, a bounded refine/review loop,
/// and finally render submission.
#[must_use]
pub fn ad_video_pipeline(
    runner: Arc<dyn ModelRunner>,
    retrieval: Arc<RetrievalService>,
    tracker: Arc<JobTracker>,
    retry: RetryConfig,
    metrics: Arc<MetricsRegistry>,
    loop_max_iterations: u32,
) -> PipelineNode {
    let model = |config: StageConfig| {
        PipelineNode::stage(Arc::new(ModelStage::new(
            config,
            Arc::clone(&runner),
            retry.clone(),
            Arc::clone(&metrics),
        )))
    };

    let requirements = model(
        StageConfig::model("requirements_analyst", "business_requirements")
            .with_input(RAW_DESCRIPTION_KEY)
            .with_instructions(json!({
                "task": "extract structured business requirements from the raw description"
            })),
    );

    let research = PipelineNode::parallel(
        "concept_research",
        vec![
            model(
                StageConfig::model("domain_researcher", "domain_research")
                    .with_input("business_requirements"),
            ),
            model(
                StageConfig::model("concept_generator", "ad_concepts")
                    .with_input("business_requirements"),
            ),
        ],
    );

    // May suspend: the selector asks the operator to pick a concept when
    // the model cannot choose on its own.
    let selector = model(
        StageConfig::model("concept_selector", "selected_concept")
            .with_input("ad_concepts")
            .with_input("domain_research"),
    );

    let lookup = PipelineNode::stage(Arc::new(ExampleLookupStage::new(
        "example_lookup",
        "retrieved_examples",
        RAW_DESCRIPTION_KEY,
        retrieval,
    )));

    let brief = model(
        StageConfig::model("creative_brief_writer", "creative_brief")
            .with_input("selected_concept")
            .with_input("retrieved_examples"),
    );

    let writer = model(
        StageConfig::model("prompt_writer", "render_prompt").with_input("creative_brief"),
    );

    // Each pass refines the prompt and then reviews the refined version;
    // the reviewer's verdict is the loop's exit signal.
    let refine_loop = PipelineNode::looped(
        "prompt_review_loop",
        vec![
            model(
                StageConfig::model("prompt_refiner", "render_prompt")
                    .with_input("render_prompt")
                    .with_input("creative_brief"),
            ),
            model(
                StageConfig::model("prompt_reviewer", PROMPT_APPROVED_KEY)
                    .with_input("render_prompt"),
            ),
        ],
        PROMPT_APPROVED_KEY,
        loop_max_iterations,
    );

    let submit = PipelineNode::stage(Arc::new(RenderSubmitStage::new(
        "render_submit",
        RENDER_OPERATION_KEY,
        "render_prompt",
        tracker,
    )));

    PipelineNode::sequential(
        "ad_video_pipeline",
        vec![
            requirements,
            research,
            selector,
            lookup,
            brief,
            writer,
            refine_loop,
            submit,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingEmbedder, InMemoryExampleStore, InMemoryVectorStore, MockModelRunner, MockRenderApi};

    #[test]
    fn topology_covers_the_expected_stages() {
        let metrics = Arc::new(MetricsRegistry::new());
        let retrieval = Arc::new(RetrievalService::new(
            Arc::new(CountingEmbedder::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryExampleStore::new()),
            Arc::clone(&metrics),
        ));
        let tracker = Arc::new(JobTracker::new(
            Arc::new(MockRenderApi::new()),
            RetryConfig::new(),
            Arc::clone(&metrics),
        ));

        let root = ad_video_pipeline(
            Arc::new(MockModelRunner::new()),
            retrieval,
            tracker,
            RetryConfig::new(),
            metrics,
            3,
        );

        assert_eq!(root.stage_count(), 10);
        let ids = root.descendant_ids();
        for expected in [
            "requirements_analyst",
            "concept_research",
            "concept_selector",
            "example_lookup",
            "creative_brief_writer",
            "prompt_writer",
            "prompt_review_loop",
            "prompt_refiner",
            "prompt_reviewer",
            "render_submit",
        ] {
            assert!(ids.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
