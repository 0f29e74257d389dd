//! Remote analyzer pipeline.
//!
//! Texts go out in fixed-size batches, several in flight at once up to the
//! parallelism cap. Answers are matched back to their inputs and every input
//! always yields exactly one record: items the service could not analyze get
//! a neutral fallback record.
//!
//! A rate limit, an exhausted quota or a timeout stops the run. Finished
//! batches are kept, in-flight requests are dropped, and the run is returned
//! tagged with the [`AbortReason`].

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use pulse_common::util::truncate_with_ellipsis;
use pulse_common::{RemoteConfig, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::client::{AnalysisService, HttpAnalysisService};
use super::repair::parse_items;
use crate::analyzer::{AbortReason, AnalysisRun, Analyzer, RunStats};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::types::{
    clamp_unit, validate_nodes, KpiDimension, KpiScores, Node, PolarityCategory, SentimentResult,
};

/// Characters of each text sent to the service.
const MAX_PROMPT_TEXT_CHARS: usize = 2000;

/// Confidence assumed when the service omits one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Highest confidence a record may carry.
const MAX_CONFIDENCE: f64 = 0.95;

/// Polarity magnitude below which a score counts as neutral when the service
/// omits the category.
const NEUTRAL_BAND: f64 = 0.1;

const SYSTEM_PROMPT: &str = "You are a sentiment analysis engine. For every numbered text, \
return one JSON object with the fields: index (the text's number), nodeId (the id of the \
best-matching node), polarity (\"positive\", \"neutral\" or \"negative\"), polarityScore \
(-1 to 1), kpiScores (an object with trust, optimism, frustration, clarity, access and \
fairness, each -1 to 1) and confidence (0 to 1). Respond with a single JSON array and \
nothing else.";

/// Analyzer backed by a remote completion service.
pub struct RemoteAnalyzer {
    service: Arc<dyn AnalysisService>,
    batch_size: usize,
    max_parallel: usize,
    run_timeout: Option<Duration>,
}

impl RemoteAnalyzer {
    pub fn new(service: Arc<dyn AnalysisService>, config: &RemoteConfig) -> Self {
        Self {
            service,
            batch_size: config.batch_size.max(1),
            max_parallel: config.max_parallel.max(1),
            run_timeout: config.run_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Analyzer talking to the configured OpenAI-compatible endpoint.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let service: Arc<dyn AnalysisService> = Arc::new(HttpAnalysisService::new(config)?);
        Ok(Self::new(service, config))
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    fn build_prompt(batch: &[String], nodes: &[Node]) -> String {
        let mut prompt = String::from("Nodes:\n");
        for node in nodes {
            prompt.push_str(&format!(
                "- id: {} | name: {} | keywords: {}\n",
                node.id,
                node.name,
                node.keywords.join(", ")
            ));
        }
        prompt.push_str("\nTexts:\n");
        for (i, text) in batch.iter().enumerate() {
            let text = truncate_with_ellipsis(text.trim(), MAX_PROMPT_TEXT_CHARS);
            prompt.push_str(&format!("{i}. {}\n", text.replace('\n', " ")));
        }
        prompt
    }

    /// Analyze one batch. Only service errors propagate; unparseable or
    /// missing answers become fallback records.
    async fn analyze_batch(
        &self,
        batch_index: usize,
        batch: &[String],
        nodes: &[Node],
    ) -> Result<Vec<SentimentResult>> {
        let prompt = Self::build_prompt(batch, nodes);
        let content = self.service.complete(SYSTEM_PROMPT, &prompt).await?;

        let items = match parse_items(&content) {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    batch = batch_index,
                    error = %e,
                    "Unparseable batch response, using fallbacks"
                );
                Vec::new()
            }
        };

        let records = assemble_batch(batch, nodes, &items);
        let fallbacks = records.iter().filter(|r| r.fallback).count();
        debug!(batch = batch_index, items = batch.len(), fallbacks, "Remote batch done");
        Ok(records)
    }
}

// ============================================================================
// Answer mapping
// ============================================================================

fn field<'a>(item: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| item.get(*name))
}

fn resolve_node<'a>(item: &Value, nodes: &'a [Node]) -> &'a Node {
    let wanted = field(item, &["nodeId", "node_id", "node", "nodeName"]).and_then(|v| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    wanted
        .and_then(|w| {
            nodes
                .iter()
                .find(|n| n.id == w)
                .or_else(|| nodes.iter().find(|n| n.name.eq_ignore_ascii_case(&w)))
        })
        .unwrap_or(&nodes[0])
}

/// Build a record from one answer object. Values are clamped into range.
fn record_from_item(text: &str, item: &Value, nodes: &[Node]) -> SentimentResult {
    let node = resolve_node(item, nodes);

    let polarity_score = clamp_unit(
        field(item, &["polarityScore", "polarity_score", "score"])
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    );
    let polarity = field(item, &["polarity", "category", "sentiment"])
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<PolarityCategory>().ok())
        .unwrap_or(if polarity_score > NEUTRAL_BAND {
            PolarityCategory::Positive
        } else if polarity_score < -NEUTRAL_BAND {
            PolarityCategory::Negative
        } else {
            PolarityCategory::Neutral
        });

    let mut kpi_scores = KpiScores::default();
    if let Some(kpis) = field(item, &["kpiScores", "kpi_scores", "kpis"]) {
        for dim in KpiDimension::ALL {
            if let Some(v) = kpis.get(dim.as_str()).and_then(Value::as_f64) {
                kpi_scores.set(dim, v);
            }
        }
    }

    let confidence = field(item, &["confidence"])
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, MAX_CONFIDENCE);

    SentimentResult {
        text: text.to_string(),
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        polarity,
        polarity_score,
        kpi_scores,
        confidence,
        fallback: false,
    }
}

/// Match answers to batch positions and fill gaps with fallback records.
///
/// Answers carrying a valid `index` go to that position; the rest fill the
/// remaining positions in order. The first answer for a position wins.
/// Returns nothing when `nodes` is empty.
pub fn assemble_batch(batch: &[String], nodes: &[Node], items: &[Value]) -> Vec<SentimentResult> {
    if nodes.is_empty() {
        return Vec::new();
    }
    let mut slots: Vec<Option<&Value>> = vec![None; batch.len()];
    let mut unindexed = Vec::new();

    for item in items {
        let index = field(item, &["index", "id", "idx"])
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .filter(|i| *i < batch.len());
        match index {
            Some(i) if slots[i].is_none() => slots[i] = Some(item),
            Some(_) => {}
            None => unindexed.push(item),
        }
    }

    let mut unindexed = unindexed.into_iter();
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        match unindexed.next() {
            Some(item) => *slot = Some(item),
            None => break,
        }
    }

    batch
        .iter()
        .zip(slots)
        .map(|(text, slot)| match slot {
            Some(item) => record_from_item(text, item, nodes),
            None => SentimentResult::neutral_fallback(text.as_str(), &nodes[0]),
        })
        .collect()
}

fn fallback_batch(batch: &[String], nodes: &[Node]) -> Vec<SentimentResult> {
    batch
        .iter()
        .map(|text| SentimentResult::neutral_fallback(text.as_str(), &nodes[0]))
        .collect()
}

// ============================================================================
// Analyzer
// ============================================================================

#[async_trait]
impl Analyzer for RemoteAnalyzer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn analyze(
        &self,
        texts: &[String],
        nodes: &[Node],
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisRun> {
        validate_nodes(nodes)?;

        let mut tracker = ProgressTracker::new(progress, texts.len());
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        info!(
            service = self.service.name(),
            texts = texts.len(),
            batches = batches.len(),
            batch_size = self.batch_size,
            max_parallel = self.max_parallel,
            "Starting remote analysis"
        );
        tracker.phase("Sending texts to the analysis service");

        let deadline = self
            .run_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        let requests: Vec<BoxFuture<'_, (usize, Result<Vec<SentimentResult>>)>> = batches
            .iter()
            .enumerate()
            .map(|(i, batch)| {
                let batch: &[String] = batch;
                async move { (i, self.analyze_batch(i, batch, nodes).await) }.boxed()
            })
            .collect();
        let mut pending = stream::iter(requests).buffer_unordered(self.max_parallel);

        let mut slots: Vec<Option<Vec<SentimentResult>>> = vec![None; batches.len()];
        let mut partial = None;
        let mut finished = 0usize;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        partial = Some(AbortReason::Timeout {
                            detail: "run deadline exceeded".into(),
                        });
                        break;
                    }
                },
                None => pending.next().await,
            };
            let Some((index, outcome)) = next else {
                break;
            };

            let records = match outcome {
                Ok(records) => records,
                Err(e) => match AbortReason::from_error(&e) {
                    Some(reason) => {
                        warn!(batch = index, reason = %reason, "Aborting remote analysis");
                        partial = Some(reason);
                        break;
                    }
                    None => {
                        warn!(batch = index, error = %e, "Batch failed, using fallbacks");
                        fallback_batch(batches[index], nodes)
                    }
                },
            };

            finished += 1;
            tracker.advance(
                records.len(),
                &format!("Received batch {finished}/{}", batches.len()),
            );
            slots[index] = Some(records);
        }
        drop(pending);

        let mut results = Vec::with_capacity(texts.len());
        for (slot, batch) in slots.into_iter().zip(&batches) {
            match slot {
                Some(records) => results.extend(records),
                None => results.extend(fallback_batch(batch, nodes)),
            }
        }

        let fallbacks = results.iter().filter(|r| r.fallback).count();
        let analyzed = results.len() - fallbacks;
        let stats = RunStats {
            total: texts.len(),
            analyzed,
            failed: fallbacks,
            fallbacks,
            success_rate: RunStats::success_rate_of(analyzed, texts.len()),
            elapsed_ms: tracker.elapsed_ms(),
            batch_size: self.batch_size,
            batches: batches.len(),
        };

        match &partial {
            Some(reason) => {
                warn!(
                    reason = %reason,
                    analyzed,
                    fallbacks,
                    "Remote analysis stopped early"
                );
                tracker.phase(reason.advisory());
            }
            None => {
                info!(
                    analyzed,
                    fallbacks,
                    elapsed_ms = stats.elapsed_ms,
                    "Remote analysis complete"
                );
                tracker.finish(&format!("Analyzed {analyzed}/{} texts", texts.len()));
            }
        }

        Ok(AnalysisRun {
            results,
            stats,
            warnings: Vec::new(),
            partial,
        })
    }
}

impl std::fmt::Debug for RemoteAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAnalyzer")
            .field("service", &self.service.name())
            .field("batch_size", &self.batch_size)
            .field("max_parallel", &self.max_parallel)
            .field("run_timeout", &self.run_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use pulse_common::Error;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("A", "Trust & Fairness", &["trust", "fair"]),
            Node::new("B", "Frustration", &["broken"]),
        ]
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text number {i}")).collect()
    }

    /// Answers each batch positively, failing from call `fail_from` on.
    struct ScriptedService {
        calls: AtomicUsize,
        fail_from: usize,
        failure: fn() -> Error,
    }

    #[async_trait]
    impl AnalysisService for ScriptedService {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_from {
                return Err((self.failure)());
            }
            let count = prompt.lines().filter(|l| l.starts_with(char::is_numeric)).count();
            let items: Vec<Value> = (0..count)
                .map(|i| {
                    json!({
                        "index": i,
                        "nodeId": "B",
                        "polarity": "positive",
                        "polarityScore": 0.7,
                        "kpiScores": {"trust": 0.5},
                        "confidence": 0.8
                    })
                })
                .collect();
            Ok(Value::Array(items).to_string())
        }
    }

    fn analyzer(fail_from: usize, failure: fn() -> Error) -> RemoteAnalyzer {
        let service = Arc::new(ScriptedService {
            calls: AtomicUsize::new(0),
            fail_from,
            failure,
        });
        let config = RemoteConfig {
            batch_size: 2,
            max_parallel: 1,
            ..RemoteConfig::default()
        };
        RemoteAnalyzer::new(service, &config)
    }

    #[test]
    fn test_assemble_by_index_and_clamps() {
        let batch = texts(3);
        let items = vec![
            json!({"index": 2, "nodeId": "B", "polarityScore": -3.0, "confidence": 7}),
            json!({"index": 0, "nodeId": "nope", "polarity": "Positive", "polarityScore": 0.4}),
        ];
        let records = assemble_batch(&batch, &nodes(), &items);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].node_id, "A");
        assert_eq!(records[0].polarity, PolarityCategory::Positive);
        assert!(records[1].fallback);
        assert_eq!(records[2].polarity_score, -1.0);
        assert_eq!(records[2].polarity, PolarityCategory::Negative);
        assert_eq!(records[2].confidence, 0.95);
        assert_eq!(records[2].text, "text number 2");
    }

    #[test]
    fn test_assemble_positional_and_by_name() {
        let batch = texts(2);
        let items = vec![json!({"node": "frustration", "kpiScores": {"frustration": 2.0}})];
        let records = assemble_batch(&batch, &nodes(), &items);
        assert_eq!(records[0].node_id, "B");
        assert_eq!(records[0].kpi_scores.frustration, 1.0);
        assert_eq!(records[0].polarity, PolarityCategory::Neutral);
        assert!(records[1].fallback);
    }

    #[tokio::test]
    async fn test_full_run_has_parity() {
        let run = analyzer(usize::MAX, || Error::Timeout)
            .analyze(&texts(5), &nodes(), &NoopProgress)
            .await
            .unwrap();
        assert_eq!(run.results.len(), 5);
        assert!(!run.is_partial());
        assert!(run.results.iter().all(|r| !r.fallback && r.node_id == "B"));
        assert_eq!(run.stats.batches, 3);
        assert_eq!(run.stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_finished_batches() {
        let run = analyzer(1, || Error::RateLimited("429".into()))
            .analyze(&texts(6), &nodes(), &NoopProgress)
            .await
            .unwrap();

        assert!(matches!(run.partial, Some(AbortReason::RateLimited { .. })));
        assert_eq!(run.results.len(), 6);
        assert!(run.results[..2].iter().all(|r| !r.fallback));
        assert!(run.results[2..].iter().all(|r| r.fallback));
        assert_eq!(run.stats.analyzed, 2);
    }

    #[tokio::test]
    async fn test_quota_is_distinct_from_rate_limit() {
        let run = analyzer(0, || Error::QuotaExceeded("billing".into()))
            .analyze(&texts(3), &nodes(), &NoopProgress)
            .await
            .unwrap();
        assert!(matches!(run.partial, Some(AbortReason::QuotaExhausted { .. })));
        assert!(run.results.iter().all(|r| r.fallback));
    }

    #[tokio::test]
    async fn test_non_abort_error_falls_back_and_continues() {
        let run = analyzer(0, || Error::External("HTTP 500".into()))
            .analyze(&texts(4), &nodes(), &NoopProgress)
            .await
            .unwrap();
        assert!(!run.is_partial());
        assert_eq!(run.results.len(), 4);
        assert_eq!(run.stats.fallbacks, 4);
    }

    #[tokio::test]
    async fn test_invalid_nodes_rejected() {
        let err = analyzer(0, || Error::Timeout)
            .analyze(&texts(1), &[], &NoopProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
