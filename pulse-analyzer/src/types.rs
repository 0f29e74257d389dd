//! Core data types shared by both analyzer implementations.

use pulse_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Maximum number of nodes accepted for one run.
pub const MAX_NODES: usize = 10;

/// Unit-normalized embedding vector, shared read-only between caches and callers.
pub type Embedding = Arc<[f32]>;

// ============================================================================
// Nodes
// ============================================================================

/// A user-defined topic bucket that every analyzed text is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Ordered keyword list
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

/// Check a run's node set: 1..=10 nodes with unique, non-empty ids.
pub fn validate_nodes(nodes: &[Node]) -> Result<()> {
    if nodes.is_empty() {
        return Err(Error::InvalidInput("at least one node is required".into()));
    }
    if nodes.len() > MAX_NODES {
        return Err(Error::InvalidInput(format!(
            "{} nodes supplied, at most {MAX_NODES} are supported",
            nodes.len()
        )));
    }

    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(Error::InvalidInput("node id must not be empty".into()));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(Error::InvalidInput(format!("duplicate node id: {}", node.id)));
        }
    }
    Ok(())
}

/// Best-matching node for one text.
///
/// `confidence` is the raw cosine similarity, not a distribution across nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMatch {
    pub node_id: String,
    pub confidence: f64,
}

// ============================================================================
// Sentiment
// ============================================================================

/// Label emitted by a sentiment capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
}

/// Raw capability output: a label and the model's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSentiment {
    pub label: SentimentLabel,
    /// Confidence in `label`, in [0, 1]
    pub score: f64,
}

impl RawSentiment {
    pub fn new(label: SentimentLabel, score: f64) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.5 };
        Self { label, score }
    }
}

/// Three-way polarity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarityCategory {
    Positive,
    Neutral,
    Negative,
}

impl std::fmt::Display for PolarityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Neutral => write!(f, "neutral"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

impl std::str::FromStr for PolarityCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Ok(Self::Positive),
            "neutral" | "mixed" => Ok(Self::Neutral),
            "negative" | "neg" => Ok(Self::Negative),
            other => Err(format!("unknown polarity: {other}")),
        }
    }
}

/// Calibrated polarity: signed value in [-1, 1] plus category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarityScore {
    pub value: f64,
    pub category: PolarityCategory,
}

impl PolarityScore {
    pub fn neutral() -> Self {
        Self {
            value: 0.0,
            category: PolarityCategory::Neutral,
        }
    }
}

// ============================================================================
// KPI scores
// ============================================================================

/// The six thematic KPI dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiDimension {
    Trust,
    Optimism,
    Frustration,
    Clarity,
    Access,
    Fairness,
}

impl KpiDimension {
    pub const ALL: [KpiDimension; 6] = [
        Self::Trust,
        Self::Optimism,
        Self::Frustration,
        Self::Clarity,
        Self::Access,
        Self::Fairness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trust => "trust",
            Self::Optimism => "optimism",
            Self::Frustration => "frustration",
            Self::Clarity => "clarity",
            Self::Access => "access",
            Self::Fairness => "fairness",
        }
    }

    /// Position of this dimension in [`KpiDimension::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Trust => 0,
            Self::Optimism => 1,
            Self::Frustration => 2,
            Self::Clarity => 3,
            Self::Access => 4,
            Self::Fairness => 5,
        }
    }

    /// Frustration rises as polarity falls; every other dimension follows polarity.
    pub fn is_inverse(&self) -> bool {
        matches!(self, Self::Frustration)
    }
}

impl std::fmt::Display for KpiDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Six bounded KPI scores, each in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KpiScores {
    pub trust: f64,
    pub optimism: f64,
    pub frustration: f64,
    pub clarity: f64,
    pub access: f64,
    pub fairness: f64,
}

impl KpiScores {
    pub fn get(&self, dim: KpiDimension) -> f64 {
        match dim {
            KpiDimension::Trust => self.trust,
            KpiDimension::Optimism => self.optimism,
            KpiDimension::Frustration => self.frustration,
            KpiDimension::Clarity => self.clarity,
            KpiDimension::Access => self.access,
            KpiDimension::Fairness => self.fairness,
        }
    }

    /// Set a dimension, clamping into [-1, 1]. Non-finite input becomes 0.
    pub fn set(&mut self, dim: KpiDimension, value: f64) {
        let value = clamp_unit(value);
        match dim {
            KpiDimension::Trust => self.trust = value,
            KpiDimension::Optimism => self.optimism = value,
            KpiDimension::Frustration => self.frustration = value,
            KpiDimension::Clarity => self.clarity = value,
            KpiDimension::Access => self.access = value,
            KpiDimension::Fairness => self.fairness = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (KpiDimension, f64)> + '_ {
        KpiDimension::ALL.iter().map(move |d| (*d, self.get(*d)))
    }
}

/// Clamp into [-1, 1], mapping NaN/inf to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Result record
// ============================================================================

/// Per-item output, identical in shape for the local and remote analyzers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResult {
    /// Original input text
    pub text: String,
    pub node_id: String,
    pub node_name: String,
    pub polarity: PolarityCategory,
    /// Calibrated polarity in [-1, 1]
    pub polarity_score: f64,
    pub kpi_scores: KpiScores,
    /// Overall confidence in [0, 0.95]
    pub confidence: f64,
    /// True when the record is a neutral stand-in for an item the remote
    /// service could not analyze
    #[serde(default)]
    pub fallback: bool,
}

impl SentimentResult {
    /// Neutral stand-in record attributed to `node`.
    pub fn neutral_fallback(text: impl Into<String>, node: &Node) -> Self {
        Self {
            text: text.into(),
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            polarity: PolarityCategory::Neutral,
            polarity_score: 0.0,
            kpi_scores: KpiScores::default(),
            confidence: 0.0,
            fallback: true,
        }
    }
}
