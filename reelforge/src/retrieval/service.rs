//! Search orchestration: embed, query, floor, hydrate, re-rank.

use crate::errors::EngineError;
use crate::metrics::{self, MetricsRegistry};
use crate::retrieval::{
    EmbeddingProvider, ExampleStore, MetadataFilter, RankedExample, RetrievalPreferences,
    VectorStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Candidates below this normalized similarity are discarded.
pub const SIMILARITY_FLOOR: f64 = 0.9;

/// Bonus for an exact category match.
pub const CATEGORY_BONUS: f64 = 0.15;

/// Bonus per overlapping tone tag.
pub const TONE_TAG_BONUS: f64 = 0.05;

/// Bonus when the example carries the preferred region tag.
pub const REGION_BONUS: f64 = 0.10;

/// Hybrid retrieval over the vector and relational stores.
pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    examples: Arc<dyn ExampleStore>,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService").finish_non_exhaustive()
    }
}

impl RetrievalService {
    /// Creates the service over its three collaborators.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        examples: Arc<dyn ExampleStore>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            embedder,
            vectors,
            examples,
            metrics,
        }
    }

    /// Searches for examples similar to `query`.
    ///
    /// An empty query is rejected before any provider call. A search in
    /// which no candidate clears the similarity floor returns an empty
    /// list, not an error.
    ///
    /// # Errors
    ///
    /// Propagates provider failures from the embedder and both stores.
    pub async fn search(
        &self,
        query: &str,
        filter: &MetadataFilter,
        prefs: &RetrievalPreferences,
    ) -> Result<Vec<RankedExample>, EngineError> {
        if query.trim().is_empty() {
            return Err(EngineError::validation(
                "search query must not be empty",
            ));
        }
        self.metrics.increment(metrics::RETRIEVAL_QUERIES_TOTAL);

        let vector = self.embedder.embed(query).await?;

        // Over-fetch so the floor and stale-id drops still leave enough
        // candidates to fill the requested count.
        let top_k = prefs.max_examples.max(1);
        let matches = self.vectors.query(&vector, top_k * 2, filter).await?;

        let mut similarities: HashMap<String, f64> = HashMap::new();
        for m in matches {
            let normalized = normalize_score(m.score);
            if normalized < SIMILARITY_FLOOR {
                continue;
            }
            // Duplicate ids keep the higher score.
            let entry = similarities.entry(m.id).or_insert(normalized);
            if normalized > *entry {
                *entry = normalized;
            }
        }

        if similarities.is_empty() {
            self.metrics.increment(metrics::RETRIEVAL_EMPTY_TOTAL);
            tracing::debug!(query_len = query.len(), "no candidates above similarity floor");
            return Ok(Vec::new());
        }

        let ids: Vec<String> = similarities.keys().cloned().collect();
        // Ids missing from the relational store are stale index entries
        // and are dropped without comment.
        let records = self.examples.find_by_ids(&ids).await?;

        let mut ranked: Vec<RankedExample> = records
            .into_iter()
            .filter_map(|record| {
                let similarity = *similarities.get(&record.id)?;
                let score = similarity + preference_bonus(&record, prefs);
                Some(RankedExample {
                    example: record,
                    similarity,
                    score,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(prefs.max_examples);

        if ranked.is_empty() {
            self.metrics.increment(metrics::RETRIEVAL_EMPTY_TOTAL);
        }
        Ok(ranked)
    }
}

/// Scores above 1 are assumed to be on a 0-100 scale.
fn normalize_score(score: f64) -> f64 {
    let normalized = if score > 1.0 { score / 100.0 } else { score };
    normalized.clamp(0.0, 1.0)
}

/// Matching is case-insensitive and whitespace-tolerant on both sides.
fn canonical(text: &str) -> String {
    text.trim().to_lowercase()
}

fn preference_bonus(
    record: &crate::retrieval::ExampleRecord,
    prefs: &RetrievalPreferences,
) -> f64 {
    let mut bonus = 0.0;
    let tags: HashSet<String> = record.tags.iter().map(|tag| canonical(tag)).collect();

    if prefs
        .category
        .as_deref()
        .is_some_and(|category| canonical(category) == canonical(&record.category))
    {
        bonus += CATEGORY_BONUS;
    }
    // Tones intersect as sets, so a tone repeated in the preferences
    // earns its bonus once.
    let tones: HashSet<String> = prefs.tones.iter().map(|tone| canonical(tone)).collect();
    for tone in &tones {
        if tags.contains(tone) {
            bonus += TONE_TAG_BONUS;
        }
    }
    if prefs
        .region
        .as_deref()
        .is_some_and(|region| tags.contains(&canonical(region)))
    {
        bonus += REGION_BONUS;
    }
    bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ExampleRecord;
    use crate::testing::{CountingEmbedder, InMemoryExampleStore, InMemoryVectorStore};
    use crate::retrieval::VectorMatch;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(id: &str, category: &str, tags: &[&str]) -> ExampleRecord {
        ExampleRecord {
            id: id.to_string(),
            title: format!("example {id}"),
            content: json!({"script": "..." }),
            category: category.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    fn vector_match(id: &str, score: f64) -> VectorMatch {
        VectorMatch {
            id: id.to_string(),
            score,
            metadata: HashMap::new(),
        }
    }

    fn service(
        embedder: Arc<CountingEmbedder>,
        vectors: Arc<InMemoryVectorStore>,
        examples: Arc<InMemoryExampleStore>,
    ) -> RetrievalService {
        RetrievalService::new(embedder, vectors, examples, Arc::new(MetricsRegistry::new()))
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_embedding() {
        let embedder = Arc::new(CountingEmbedder::new());
        let svc = service(
            Arc::clone(&embedder),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(InMemoryExampleStore::new()),
        );

        let err = svc
            .search("   ", &MetadataFilter::default(), &RetrievalPreferences::top_k(3))
            .await
            .expect_err("should reject");
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(embedder.call_count(), 0);
    }

    #[tokio::test]
    async fn similarity_floor_filters_and_top_k_truncates() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![
            vector_match("a", 0.95),
            vector_match("b", 0.92),
            vector_match("c", 0.85),
            vector_match("d", 0.99),
        ]);
        let examples = Arc::new(InMemoryExampleStore::new());
        for id in ["a", "b", "c", "d"] {
            examples.seed(record(id, "food", &[]));
        }
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let results = svc
            .search("taco ad", &MetadataFilter::default(), &RetrievalPreferences::top_k(2))
            .await
            .expect("search");
        let ids: Vec<&str> = results.iter().map(|r| r.example.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[tokio::test]
    async fn scores_on_a_percent_scale_are_normalized() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("a", 95.0), vector_match("b", 80.0)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("a", "food", &[]));
        examples.seed(record("b", "food", &[]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let results = svc
            .search("q", &MetadataFilter::default(), &RetrievalPreferences::top_k(5))
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn category_bonus_outranks_plain_similarity() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("plain", 0.93), vector_match("boosted", 0.91)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("plain", "food", &[]));
        examples.seed(record("boosted", "fitness", &["upbeat"]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let prefs = RetrievalPreferences {
            category: Some("fitness".to_string()),
            tones: vec!["upbeat".to_string()],
            ..RetrievalPreferences::top_k(2)
        };
        let results = svc
            .search("q", &MetadataFilter::default(), &prefs)
            .await
            .expect("search");
        assert_eq!(results[0].example.id, "boosted");
        assert!((results[0].score - (0.91 + CATEGORY_BONUS + TONE_TAG_BONUS)).abs() < 1e-9);
        assert!((results[0].similarity - 0.91).abs() < 1e-9);
    }

    #[tokio::test]
    async fn duplicate_ids_keep_the_higher_score() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("a", 0.91), vector_match("a", 0.97)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("a", "food", &[]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let results = svc
            .search("q", &MetadataFilter::default(), &RetrievalPreferences::top_k(5))
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity - 0.97).abs() < 1e-9);
    }

    #[tokio::test]
    async fn stale_index_ids_are_dropped_silently() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("live", 0.95), vector_match("stale", 0.99)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("live", "food", &[]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let results = svc
            .search("q", &MetadataFilter::default(), &RetrievalPreferences::top_k(5))
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].example.id, "live");
    }

    #[tokio::test]
    async fn nothing_above_the_floor_is_an_empty_result() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("a", 0.5), vector_match("b", 0.2)]);
        let svc = service(
            Arc::new(CountingEmbedder::new()),
            vectors,
            Arc::new(InMemoryExampleStore::new()),
        );

        let results = svc
            .search("q", &MetadataFilter::default(), &RetrievalPreferences::top_k(5))
            .await
            .expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn preference_matching_ignores_case_and_whitespace() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("a", 0.92)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("a", "Fitness", &["Upbeat"]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let prefs = RetrievalPreferences {
            category: Some(" fitness ".to_string()),
            tones: vec!["upbeat".to_string()],
            ..RetrievalPreferences::top_k(1)
        };
        let results = svc
            .search("q", &MetadataFilter::default(), &prefs)
            .await
            .expect("search");
        assert!(
            (results[0].score - (0.92 + CATEGORY_BONUS + TONE_TAG_BONUS)).abs() < 1e-9
        );
    }

    #[tokio::test]
    async fn repeated_preference_tones_score_once() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("a", 0.92)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("a", "food", &["upbeat"]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let prefs = RetrievalPreferences {
            tones: vec!["upbeat".to_string(), "Upbeat".to_string()],
            ..RetrievalPreferences::top_k(1)
        };
        let results = svc
            .search("q", &MetadataFilter::default(), &prefs)
            .await
            .expect("search");
        assert!((results[0].score - (0.92 + TONE_TAG_BONUS)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn region_tag_earns_its_bonus() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        vectors.script_matches(vec![vector_match("a", 0.92)]);
        let examples = Arc::new(InMemoryExampleStore::new());
        examples.seed(record("a", "food", &["emea"]));
        let svc = service(Arc::new(CountingEmbedder::new()), vectors, examples);

        let prefs = RetrievalPreferences {
            region: Some("emea".to_string()),
            ..RetrievalPreferences::top_k(1)
        };
        let results = svc
            .search("q", &MetadataFilter::default(), &prefs)
            .await
            .expect("search");
        assert!((results[0].score - (0.92 + REGION_BONUS)).abs() < 1e-9);
    }
}
