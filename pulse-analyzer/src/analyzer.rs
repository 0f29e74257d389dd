//! The analyzer seam and run report types.

use async_trait::async_trait;
use pulse_common::{AnalyzerKind, Config, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::orchestrator::LocalAnalyzer;
use crate::progress::ProgressSink;
use crate::remote::RemoteAnalyzer;
use crate::types::{Node, SentimentResult};

/// Analyzes an ordered list of texts against a node set.
///
/// Implementations share the per-item [`SentimentResult`] contract; which one
/// runs is a configuration decision.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        texts: &[String],
        nodes: &[Node],
        progress: &dyn ProgressSink,
    ) -> Result<AnalysisRun>;
}

/// Build the analyzer selected by `config.analyzer`.
pub fn create_analyzer(config: &Config) -> Result<Arc<dyn Analyzer>> {
    match config.analyzer {
        AnalyzerKind::Local => Ok(Arc::new(LocalAnalyzer::from_config(config)?)),
        AnalyzerKind::Remote => Ok(Arc::new(RemoteAnalyzer::from_config(&config.remote)?)),
    }
}

// ============================================================================
// Run report
// ============================================================================

/// Why a remote run stopped before every batch was analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    RateLimited { detail: String },
    QuotaExhausted { detail: String },
    Timeout { detail: String },
}

impl AbortReason {
    /// Map an aborting error to its reason. Non-abort errors give `None`.
    pub fn from_error(err: &Error) -> Option<Self> {
        match err.root() {
            Error::RateLimited(detail) => Some(Self::RateLimited {
                detail: detail.clone(),
            }),
            Error::QuotaExceeded(detail) => Some(Self::QuotaExhausted {
                detail: detail.clone(),
            }),
            Error::Timeout => Some(Self::Timeout {
                detail: "request timed out".into(),
            }),
            _ => None,
        }
    }

    pub fn advisory(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => {
                "The analysis service is rate limiting requests; wait a moment and retry."
            }
            Self::QuotaExhausted { .. } => {
                "The analysis service quota is exhausted; check the account's billing or limits."
            }
            Self::Timeout { .. } => {
                "The analysis timed out; try again with fewer or shorter texts."
            }
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, detail) = match self {
            Self::RateLimited { detail } => ("rate limited", detail),
            Self::QuotaExhausted { detail } => ("quota exhausted", detail),
            Self::Timeout { detail } => ("timed out", detail),
        };
        write!(f, "{kind}: {detail}")
    }
}

/// Non-fatal conditions surfaced alongside results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum RunWarning {
    /// Too many items failed and were dropped.
    LowSuccessRate { success_rate: f64, threshold: f64 },
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Input texts
    pub total: usize,
    /// Records produced from a real analysis
    pub analyzed: usize,
    /// Items dropped (local) or replaced by fallbacks (remote)
    pub failed: usize,
    /// Neutral stand-in records
    pub fallbacks: usize,
    pub success_rate: f64,
    pub elapsed_ms: u64,
    pub batch_size: usize,
    pub batches: usize,
}

impl RunStats {
    pub fn success_rate_of(analyzed: usize, total: usize) -> f64 {
        if total == 0 {
            1.0
        } else {
            analyzed as f64 / total as f64
        }
    }
}

/// Outcome of one analyzer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    /// Records in input order
    pub results: Vec<SentimentResult>,
    pub stats: RunStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RunWarning>,
    /// Set when a remote run aborted early
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<AbortReason>,
}

impl AnalysisRun {
    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    pub fn has_low_success_rate(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, RunWarning::LowSuccessRate { .. }))
    }
}
