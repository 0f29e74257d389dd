//! Pulse Analyzer - sentiment, KPI and node attribution for short texts.
//!
//! Two analyzers implement the same per-item contract:
//! - [`LocalAnalyzer`] runs in-process embedding and sentiment capabilities
//!   with adaptive batching
//! - [`RemoteAnalyzer`] delegates classification to an OpenAI-compatible
//!   chat completion service
//!
//! Both return an [`AnalysisRun`] whose records can be summarized per node
//! with [`aggregate`].

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod aggregate;
pub mod analyzer;
pub mod cache;
pub mod capability;
pub mod embedding;
pub mod kpi;
pub mod negation;
pub mod nodes;
pub mod normalizer;
pub mod orchestrator;
pub mod polarity;
pub mod progress;
pub mod remote;
pub mod sentiment;
pub mod types;

pub use aggregate::{aggregate, aggregate_with_nodes, NodeAnalysis, SentimentDistribution};
pub use analyzer::{create_analyzer, AbortReason, AnalysisRun, Analyzer, RunStats, RunWarning};
pub use cache::{AnalysisCaches, CacheStats};
pub use capability::LazyCapability;
pub use embedding::{cosine_similarity, EmbeddingModel, EmbeddingService, HashingEmbedder};
pub use kpi::KpiScorer;
pub use nodes::NodeAttributor;
pub use normalizer::{TextLength, TextNormalizer};
pub use orchestrator::{select_batch_size, LocalAnalyzer};
pub use polarity::PolarityCalibrator;
pub use progress::{ChannelProgress, LogProgress, NoopProgress, ProgressEvent, ProgressSink};
pub use remote::{AnalysisService, HttpAnalysisService, RemoteAnalyzer};
pub use sentiment::{LexiconSentiment, SentimentModel, SentimentService};
pub use types::{
    KpiDimension, KpiScores, Node, NodeMatch, PolarityCategory, PolarityScore, RawSentiment,
    SentimentLabel, SentimentResult,
};
