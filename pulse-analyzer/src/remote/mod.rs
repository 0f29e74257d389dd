//! Remote analyzer.
//!
//! Delegates per-item classification to an OpenAI-compatible chat completion
//! service, batch by batch, and reassembles the answers into the same
//! [`SentimentResult`](crate::types::SentimentResult) records the local
//! analyzer produces.

pub mod client;
pub mod pipeline;
pub mod repair;

pub use client::{AnalysisService, HttpAnalysisService};
pub use pipeline::RemoteAnalyzer;
