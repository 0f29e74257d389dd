//! End-to-end tests for the local analyzer.

use async_trait::async_trait;
use pulse_analyzer::embedding::{EmbeddingModel, HashingEmbedder};
use pulse_analyzer::progress::{ChannelProgress, NoopProgress, ProgressEvent};
use pulse_analyzer::sentiment::{LexiconSentiment, SentimentModel};
use pulse_analyzer::{
    aggregate, aggregate_with_nodes, Analyzer, KpiDimension, LazyCapability, LocalAnalyzer, Node,
    PolarityCategory,
};
use pulse_common::{Config, Error};
use std::sync::Arc;

fn scenario_texts() -> Vec<String> {
    vec![
        "I love this transparent and fair process".to_string(),
        "This is so frustrating and broken".to_string(),
        "The weather is nice today".to_string(),
    ]
}

fn scenario_nodes() -> Vec<Node> {
    vec![
        Node::new("A", "Trust & Fairness", &["trust", "fair", "transparent"]),
        Node::new("B", "Frustration", &["frustration", "broken", "difficult"]),
    ]
}

fn local() -> LocalAnalyzer {
    LocalAnalyzer::from_config(&Config::default()).unwrap()
}

/// Hashing embedder that fails on any text containing "boom".
struct FlakyEmbedder(HashingEmbedder);

#[async_trait]
impl EmbeddingModel for FlakyEmbedder {
    fn name(&self) -> &str {
        "flaky"
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text.contains("boom") {
            anyhow::bail!("embedding backend crashed");
        }
        self.0.embed(text).await
    }
}

fn lexicon_capability() -> LazyCapability<dyn SentimentModel> {
    let model: Arc<dyn SentimentModel> = Arc::new(LexiconSentiment::new().unwrap());
    LazyCapability::ready("sentiment", model)
}

#[tokio::test]
async fn test_scenario_attribution_and_polarity() {
    let analyzer = local();
    let run = analyzer
        .analyze(&scenario_texts(), &scenario_nodes(), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(run.results.len(), 3);
    assert!(run.warnings.is_empty());
    assert!(!run.is_partial());

    let love = &run.results[0];
    assert_eq!(love.node_id, "A");
    assert_eq!(love.node_name, "Trust & Fairness");
    assert_eq!(love.polarity, PolarityCategory::Positive);
    assert!(love.polarity_score > 0.0);
    assert!(love.kpi_scores.trust > 0.0);
    assert!(love.kpi_scores.fairness > 0.0);

    let broken = &run.results[1];
    assert_eq!(broken.node_id, "B");
    assert_eq!(broken.polarity, PolarityCategory::Negative);
    assert!(broken.polarity_score < 0.0);
    assert!(broken.kpi_scores.frustration > 0.0);

    let weather = &run.results[2];
    assert_eq!(weather.polarity, PolarityCategory::Neutral);
    assert!(weather.polarity_score.abs() < 0.3);
    assert!(weather.node_id == "A" || weather.node_id == "B");
}

#[tokio::test]
async fn test_results_respect_bounds_and_node_membership() {
    let analyzer = local();
    let nodes = scenario_nodes();
    let texts: Vec<String> = vec![
        "Absolutely wonderful, clear and accessible for everyone".into(),
        "terrible, useless, broken and unfair".into(),
        "".into(),
        "!!!".into(),
        "ok".into(),
        "word ".repeat(700),
    ];
    let run = analyzer.analyze(&texts, &nodes, &NoopProgress).await.unwrap();

    assert_eq!(run.results.len(), texts.len());
    for (record, text) in run.results.iter().zip(&texts) {
        assert_eq!(&record.text, text);
        assert!((-1.0..=1.0).contains(&record.polarity_score));
        assert!((0.0..=0.95).contains(&record.confidence));
        for (_, value) in record.kpi_scores.iter() {
            assert!((-1.0..=1.0).contains(&value));
        }
        assert!(nodes.iter().any(|n| n.id == record.node_id));
        assert!(!record.fallback);
    }
}

#[tokio::test]
async fn test_repeat_analysis_is_identical() {
    let analyzer = local();
    let nodes = scenario_nodes();
    let first = analyzer
        .analyze(&scenario_texts(), &nodes, &NoopProgress)
        .await
        .unwrap();
    let second = analyzer
        .analyze(&scenario_texts(), &nodes, &NoopProgress)
        .await
        .unwrap();

    assert_eq!(first.results, second.results);
    assert!(analyzer.caches().embeddings.stats().hits > 0);
    assert!(analyzer.caches().sentiments.stats().hits > 0);
}

#[tokio::test]
async fn test_negation_lowers_trust_and_fairness() {
    let analyzer = local();
    let nodes = scenario_nodes();
    let plain = analyzer
        .analyze_item("This process is reliable and fair", &nodes)
        .await
        .unwrap();
    let negated = analyzer
        .analyze_item("This process is not reliable and not fair", &nodes)
        .await
        .unwrap();

    assert!(negated.kpi_scores.get(KpiDimension::Trust) < plain.kpi_scores.get(KpiDimension::Trust));
    assert!(
        negated.kpi_scores.get(KpiDimension::Fairness)
            < plain.kpi_scores.get(KpiDimension::Fairness)
    );
    assert!(negated.polarity_score < plain.polarity_score);
}

#[tokio::test]
async fn test_low_success_rate_warning() {
    let embedder: Arc<dyn EmbeddingModel> = Arc::new(FlakyEmbedder(HashingEmbedder::default()));
    let analyzer = LocalAnalyzer::new(
        &Config::default(),
        LazyCapability::ready("embedding", embedder),
        lexicon_capability(),
    )
    .unwrap();

    let mut texts: Vec<String> = (0..8).map(|i| format!("a fair process number {i}")).collect();
    texts.push("boom goes the service".into());
    texts.push("another boom".into());

    let run = analyzer
        .analyze(&texts, &scenario_nodes(), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(run.results.len(), 8);
    assert_eq!(run.stats.failed, 2);
    assert!((run.stats.success_rate - 0.8).abs() < 1e-9);
    assert!(run.has_low_success_rate());
    assert!(run.results.iter().all(|r| !r.text.contains("boom")));
}

#[tokio::test]
async fn test_single_failure_in_large_run_is_not_flagged() {
    let embedder: Arc<dyn EmbeddingModel> = Arc::new(FlakyEmbedder(HashingEmbedder::default()));
    let analyzer = LocalAnalyzer::new(
        &Config::default(),
        LazyCapability::ready("embedding", embedder),
        lexicon_capability(),
    )
    .unwrap();

    let mut texts: Vec<String> = (0..19).map(|i| format!("clear docs {i}")).collect();
    texts.push("boom".into());
    let run = analyzer
        .analyze(&texts, &scenario_nodes(), &NoopProgress)
        .await
        .unwrap();

    assert_eq!(run.results.len(), 19);
    assert!(!run.has_low_success_rate());
}

#[tokio::test]
async fn test_capability_failure_aborts_run() {
    let embedding: LazyCapability<dyn EmbeddingModel> =
        LazyCapability::new("embedding", || async {
            Err(anyhow::anyhow!("model weights not found"))
        });
    let analyzer =
        LocalAnalyzer::new(&Config::default(), embedding, lexicon_capability()).unwrap();

    let err = analyzer
        .analyze(&scenario_texts(), &scenario_nodes(), &NoopProgress)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::CapabilityInit { .. }));
}

#[tokio::test]
async fn test_invalid_node_sets_rejected() {
    let analyzer = local();
    let err = analyzer
        .analyze(&scenario_texts(), &[], &NoopProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let dup = vec![Node::new("A", "x", &[]), Node::new("A", "y", &[])];
    assert!(analyzer
        .analyze(&scenario_texts(), &dup, &NoopProgress)
        .await
        .is_err());
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completes() {
    let analyzer = local();
    let (sink, mut rx) = ChannelProgress::new();
    let texts: Vec<String> = (0..120).map(|i| format!("text {i} about fair access")).collect();

    let run = analyzer.analyze(&texts, &scenario_nodes(), &sink).await.unwrap();
    assert_eq!(run.stats.batch_size, 250);
    assert_eq!(run.stats.batches, 1);
    drop(sink);

    let mut percents = Vec::new();
    let mut statuses = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Progress(p) => percents.push(p),
            ProgressEvent::Status(s) => statuses.push(s),
        }
    }

    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
    assert!(statuses.iter().any(|s| s.contains("Loading")));
}

#[tokio::test]
async fn test_aggregation_over_scenario() {
    let analyzer = local();
    let nodes = scenario_nodes();
    let run = analyzer
        .analyze(&scenario_texts(), &nodes, &NoopProgress)
        .await
        .unwrap();

    let groups = aggregate(&run.results);
    let total: usize = groups.iter().map(|g| g.total_texts).sum();
    assert_eq!(total, 3);
    assert!(groups.iter().all(|g| g.total_texts >= 1));
    assert!(groups.iter().all(|g| g.avg_polarity.is_finite()));

    let ordered = aggregate_with_nodes(&run.results, &nodes);
    assert_eq!(ordered[0].node_id, "A");

    let a = &ordered[0];
    assert_eq!(
        a.sentiment_distribution.total(),
        a.total_texts,
        "distribution counts add up"
    );
}
