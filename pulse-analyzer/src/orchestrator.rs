//! Local analyzer: in-process models with adaptive batching.
//!
//! Texts are processed one batch at a time. Inside a batch every item runs
//! concurrently and the batch is joined before progress is reported and the
//! next batch starts. A failing item is logged and dropped; only capability
//! initialization failures abort the run.

use async_trait::async_trait;
use futures_util::future::{join_all, try_join};
use pulse_common::{AnalysisConfig, BatchingConfig, Config, Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analyzer::{AnalysisRun, Analyzer, RunStats, RunWarning};
use crate::cache::AnalysisCaches;
use crate::capability::LazyCapability;
use crate::embedding::{EmbeddingModel, EmbeddingService, HashingEmbedder};
use crate::kpi::KpiScorer;
use crate::negation::NegationWindow;
use crate::nodes::NodeAttributor;
use crate::normalizer::{TextLength, TextNormalizer};
use crate::polarity::PolarityCalibrator;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::sentiment::{LexiconSentiment, SentimentModel, SentimentService};
use crate::types::{validate_nodes, Node, RawSentiment, SentimentResult};

/// Weight of sentiment certainty in the overall confidence.
const SENTIMENT_CONFIDENCE_WEIGHT: f64 = 0.6;

/// Weight of node similarity in the overall confidence.
const NODE_CONFIDENCE_WEIGHT: f64 = 0.4;

/// Confidence multiplier for short texts.
const SHORT_TEXT_CONFIDENCE: f64 = 0.9;

/// Pick the batch size for a corpus. First matching rule wins:
/// small corpus, long texts, large corpus, otherwise the default.
pub fn select_batch_size(config: &BatchingConfig, texts: &[String]) -> usize {
    let n = texts.len();
    let size = if n < config.small_corpus_items {
        config.small_corpus_batch
    } else {
        let total_chars: usize = texts.iter().map(|t| t.chars().count()).sum();
        let mean_chars = total_chars as f64 / n as f64;
        if mean_chars > config.long_text_chars {
            config.long_text_batch
        } else if n > config.large_corpus_items {
            config.large_corpus_batch
        } else {
            config.default_batch
        }
    };
    size.max(1)
}

/// Polarity fed into KPI modulation. Short texts are attenuated by `damping`.
pub fn kpi_modulation_polarity(polarity: f64, length: TextLength, damping: f64) -> f64 {
    if length == TextLength::Short {
        polarity * damping
    } else {
        polarity
    }
}

/// Overall confidence in [0, max_confidence] from sentiment certainty and
/// node similarity.
pub fn overall_confidence(
    raw: RawSentiment,
    node_confidence: f64,
    length: TextLength,
    max_confidence: f64,
) -> f64 {
    let certainty = ((raw.score - 0.5) * 2.0).clamp(0.0, 1.0);
    let mut confidence = SENTIMENT_CONFIDENCE_WEIGHT * certainty
        + NODE_CONFIDENCE_WEIGHT * node_confidence.clamp(0.0, 1.0);
    if length == TextLength::Short {
        confidence *= SHORT_TEXT_CONFIDENCE;
    }
    if confidence.is_finite() {
        confidence.clamp(0.0, max_confidence)
    } else {
        0.0
    }
}

/// In-process analyzer.
pub struct LocalAnalyzer {
    analysis: AnalysisConfig,
    batching: BatchingConfig,
    normalizer: TextNormalizer,
    calibrator: PolarityCalibrator,
    caches: Arc<AnalysisCaches>,
    embeddings: Arc<EmbeddingService>,
    sentiment: SentimentService,
    kpi: KpiScorer,
    nodes: NodeAttributor,
}

impl LocalAnalyzer {
    /// Build an analyzer around the given model handles with fresh caches.
    pub fn new(
        config: &Config,
        embedding_model: LazyCapability<dyn EmbeddingModel>,
        sentiment_model: LazyCapability<dyn SentimentModel>,
    ) -> Result<Self> {
        let analysis = config.analysis.clone();
        let normalizer = TextNormalizer::from_config(&analysis);
        let caches = Arc::new(AnalysisCaches::new());

        let embeddings = Arc::new(EmbeddingService::new(
            embedding_model,
            normalizer.clone(),
            caches.clone(),
        ));
        let sentiment =
            SentimentService::new(sentiment_model, caches.clone(), analysis.sentiment_key_chars);
        let kpi = KpiScorer::new(&analysis, embeddings.clone(), caches.clone())?;
        let nodes = NodeAttributor::new(
            analysis.node_keyword_limit,
            normalizer.clone(),
            embeddings.clone(),
            caches.clone(),
        );

        Ok(Self {
            calibrator: PolarityCalibrator::from_config(&analysis),
            batching: config.batching.clone(),
            analysis,
            normalizer,
            caches,
            embeddings,
            sentiment,
            kpi,
            nodes,
        })
    }

    /// Build an analyzer with the built-in hashing embedder and lexicon
    /// sentiment model, loaded on first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedding = LazyCapability::new("embedding", || async {
            let model: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder::default());
            Ok(model)
        });
        let negation = NegationWindow::from_config(&config.analysis);
        let sentiment = LazyCapability::new("sentiment", move || async move {
            let model: Arc<dyn SentimentModel> =
                Arc::new(LexiconSentiment::new()?.with_negation_window(negation));
            Ok(model)
        });
        Self::new(config, embedding, sentiment)
    }

    pub fn caches(&self) -> &AnalysisCaches {
        &self.caches
    }

    /// Load capabilities and warm concept and node embeddings.
    async fn prepare(&self, nodes: &[Node]) -> Result<()> {
        try_join(self.embeddings.ensure_ready(), self.sentiment.ensure_ready()).await?;
        self.kpi.prepare().await?;
        self.nodes.prepare(nodes).await?;
        Ok(())
    }

    /// Analyze a single text against the node set.
    pub async fn analyze_item(&self, text: &str, nodes: &[Node]) -> Result<SentimentResult> {
        let normalized = self.normalizer.normalize(text);
        let length = self.normalizer.classify(&normalized);

        let (embedding, raw) = try_join(
            self.embeddings.embed(&normalized),
            self.sentiment.classify(&normalized),
        )
        .await?;

        let polarity = self.calibrator.calibrate(raw);
        let modulating =
            kpi_modulation_polarity(polarity.value, length, self.analysis.short_text_damping);

        let kpi_scores = self.kpi.score(&embedding, &normalized, modulating).await?;
        let matched = self.nodes.attribute(&embedding, nodes).await?;
        let node = nodes
            .iter()
            .find(|n| n.id == matched.node_id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown node {}", matched.node_id)))?;

        Ok(SentimentResult {
            text: text.to_string(),
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            polarity: polarity.category,
            polarity_score: polarity.value,
            kpi_scores,
            confidence: overall_confidence(
                raw,
                matched.confidence,
                length,
                self.analysis.max_confidence,
            ),
            fallback: false,
        })
    }
}

#[async_trait]
impl Analyzer for LocalAnalyzer {
    fn name(&self) -> &str {
        "local"
    }

    async fn analyze(
        &self,
        texts: &[String],
        nodes: &[Node],
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisRun> {
        validate_nodes(nodes)?;

        let mut tracker = ProgressTracker::new(progress, texts.len());
        tracker.phase("Loading models");
        self.prepare(nodes).await?;

        let batch_size = select_batch_size(&self.batching, texts);
        let batches = texts.len().div_ceil(batch_size);
        info!(
            texts = texts.len(),
            nodes = nodes.len(),
            batch_size,
            batches,
            "Starting local analysis"
        );

        let mut results = Vec::with_capacity(texts.len());
        let mut failed = 0usize;

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            let outcomes = join_all(batch.iter().enumerate().map(|(i, text)| async move {
                (offset + i, self.analyze_item(text, nodes).await)
            }))
            .await;

            for (index, outcome) in outcomes {
                match outcome {
                    Ok(record) => results.push(record),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        let err = Error::item(index, e);
                        warn!(index, error = %err, "Dropping item");
                        failed += 1;
                    }
                }
            }

            debug!(batch = batch_index + 1, of = batches, "Batch complete");
            let phase = format!("Analyzing batch {}/{}", batch_index + 1, batches);
            tracker.advance(batch.len(), &phase);
        }

        let success_rate = RunStats::success_rate_of(results.len(), texts.len());
        let mut warnings = Vec::new();
        if success_rate < self.analysis.min_success_rate {
            warn!(
                success_rate,
                threshold = self.analysis.min_success_rate,
                failed,
                "Low success rate"
            );
            warnings.push(RunWarning::LowSuccessRate {
                success_rate,
                threshold: self.analysis.min_success_rate,
            });
        }

        let stats = RunStats {
            total: texts.len(),
            analyzed: results.len(),
            failed,
            fallbacks: 0,
            success_rate,
            elapsed_ms: tracker.elapsed_ms(),
            batch_size,
            batches,
        };

        for (name, cache) in self.caches.summary() {
            debug!(
                cache = name,
                entries = cache.entries,
                hits = cache.hits,
                misses = cache.misses,
                "Cache stats"
            );
        }
        info!(
            analyzed = stats.analyzed,
            failed = stats.failed,
            elapsed_ms = stats.elapsed_ms,
            "Local analysis complete"
        );
        tracker.finish(&format!("Analyzed {}/{} texts", stats.analyzed, stats.total));

        Ok(AnalysisRun {
            results,
            stats,
            warnings,
            partial: None,
        })
    }
}

impl std::fmt::Debug for LocalAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAnalyzer")
            .field("embeddings", &self.embeddings)
            .field("sentiment", &self.sentiment)
            .finish()
    }
}
