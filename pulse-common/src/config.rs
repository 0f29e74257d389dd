//! Configuration management for Pulse.
//!
//! Configuration lives at `~/.pulse/config.json`. Every field has a default,
//! so a missing file or a partial file is always valid input.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (PULSE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PULSE_ANALYZER` → analyzer ("local" | "remote")
//! - `PULSE_LOG_LEVEL` → observability.log_level
//! - `PULSE_LOG_FORMAT` → observability.log_format
//! - `PULSE_REMOTE_URL` → remote.base_url
//! - `PULSE_REMOTE_MODEL` → remote.model
//! - `PULSE_REMOTE_API_KEY` → remote.api_key (falls back to `OPENAI_API_KEY`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pulse"),
        |dirs| dirs.home_dir().join(".pulse"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Top-level Configuration
// ============================================================================

/// Which analyzer implementation a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// In-process embedding and sentiment models
    #[default]
    Local,
    /// Remote text-analysis service
    Remote,
}

impl std::str::FromStr for AnalyzerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown analyzer: {other} (expected local or remote)")),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Analyzer implementation selected for runs
    #[serde(default)]
    pub analyzer: AnalyzerKind,

    /// Scoring constants
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Adaptive batch size table
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Remote service settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(kind) = std::env::var("PULSE_ANALYZER") {
            match kind.parse() {
                Ok(kind) => self.analyzer = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring PULSE_ANALYZER"),
            }
        }

        if let Ok(level) = std::env::var("PULSE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("PULSE_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Ok(url) = std::env::var("PULSE_REMOTE_URL") {
            self.remote.base_url = url;
        }
        if let Ok(model) = std::env::var("PULSE_REMOTE_MODEL") {
            self.remote.model = model;
        }

        // Dedicated key wins over the generic OpenAI key
        if let Ok(key) = std::env::var("PULSE_REMOTE_API_KEY") {
            self.remote.api_key = Some(key);
        } else if self.remote.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.remote.api_key = Some(key);
            }
        }
    }
}

// ============================================================================
// Analysis Configuration
// ============================================================================

/// Scoring constants for normalization, calibration, and KPI blending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Raw score below which polarity is reported as neutral
    #[serde(default = "default_neutral_threshold")]
    pub neutral_threshold: f64,

    /// Raw score where the calibrated value switches to the steep segment
    #[serde(default = "default_scale_threshold")]
    pub scale_threshold: f64,

    /// Tokens scanned before a keyword for negators
    #[serde(default = "default_negation_window_tokens")]
    pub negation_window_tokens: usize,

    /// Characters scanned before a keyword for negators
    #[serde(default = "default_negation_window_chars")]
    pub negation_window_chars: usize,

    /// Multiplier applied to the summed keyword weights
    #[serde(default = "default_keyword_scale")]
    pub keyword_scale: f64,

    /// Absolute bound on the keyword contribution
    #[serde(default = "default_keyword_clip")]
    pub keyword_clip: f64,

    /// Texts with fewer tokens than this are "short"
    #[serde(default = "default_short_text_tokens")]
    pub short_text_tokens: usize,

    /// Texts with more tokens than this are "long" and get chunked
    #[serde(default = "default_long_text_tokens")]
    pub long_text_tokens: usize,

    /// Token window used when chunking long texts
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,

    /// Normalized text is truncated to this many characters
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Factor applied to the polarity that modulates KPIs of short texts
    #[serde(default = "default_short_text_damping")]
    pub short_text_damping: f64,

    /// Prefix length used as the sentiment cache key
    #[serde(default = "default_sentiment_key_chars")]
    pub sentiment_key_chars: usize,

    /// Keywords per node used to build its context sentence
    #[serde(default = "default_node_keyword_limit")]
    pub node_keyword_limit: usize,

    /// Upper bound for result confidence
    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,

    /// Success rate under which a run raises a warning
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            neutral_threshold: default_neutral_threshold(),
            scale_threshold: default_scale_threshold(),
            negation_window_tokens: default_negation_window_tokens(),
            negation_window_chars: default_negation_window_chars(),
            keyword_scale: default_keyword_scale(),
            keyword_clip: default_keyword_clip(),
            short_text_tokens: default_short_text_tokens(),
            long_text_tokens: default_long_text_tokens(),
            chunk_tokens: default_chunk_tokens(),
            max_text_chars: default_max_text_chars(),
            short_text_damping: default_short_text_damping(),
            sentiment_key_chars: default_sentiment_key_chars(),
            node_keyword_limit: default_node_keyword_limit(),
            max_confidence: default_max_confidence(),
            min_success_rate: default_min_success_rate(),
        }
    }
}

fn default_neutral_threshold() -> f64 {
    0.60
}

fn default_scale_threshold() -> f64 {
    0.65
}

fn default_negation_window_tokens() -> usize {
    3
}

fn default_negation_window_chars() -> usize {
    30
}

fn default_keyword_scale() -> f64 {
    0.20
}

fn default_keyword_clip() -> f64 {
    0.5
}

fn default_short_text_tokens() -> usize {
    20
}

fn default_long_text_tokens() -> usize {
    500
}

fn default_chunk_tokens() -> usize {
    500
}

fn default_max_text_chars() -> usize {
    5000
}

fn default_short_text_damping() -> f64 {
    0.8
}

fn default_sentiment_key_chars() -> usize {
    200
}

fn default_node_keyword_limit() -> usize {
    10
}

fn default_max_confidence() -> f64 {
    0.95
}

fn default_min_success_rate() -> f64 {
    0.90
}

// ============================================================================
// Batching Configuration
// ============================================================================

/// Adaptive batch size table, evaluated once per run.
///
/// Rules are checked in order: small corpus, long texts, large corpus,
/// otherwise the default size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    #[serde(default = "default_small_corpus_items")]
    pub small_corpus_items: usize,
    #[serde(default = "default_small_corpus_batch")]
    pub small_corpus_batch: usize,
    #[serde(default = "default_long_text_chars")]
    pub long_text_chars: f64,
    #[serde(default = "default_long_text_batch")]
    pub long_text_batch: usize,
    #[serde(default = "default_large_corpus_items")]
    pub large_corpus_items: usize,
    #[serde(default = "default_large_corpus_batch")]
    pub large_corpus_batch: usize,
    #[serde(default = "default_batch")]
    pub default_batch: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            small_corpus_items: default_small_corpus_items(),
            small_corpus_batch: default_small_corpus_batch(),
            long_text_chars: default_long_text_chars(),
            long_text_batch: default_long_text_batch(),
            large_corpus_items: default_large_corpus_items(),
            large_corpus_batch: default_large_corpus_batch(),
            default_batch: default_batch(),
        }
    }
}

fn default_small_corpus_items() -> usize {
    100
}

fn default_small_corpus_batch() -> usize {
    50
}

fn default_long_text_chars() -> f64 {
    1000.0
}

fn default_long_text_batch() -> usize {
    100
}

fn default_large_corpus_items() -> usize {
    10_000
}

fn default_large_corpus_batch() -> usize {
    500
}

fn default_batch() -> usize {
    250
}

// ============================================================================
// Remote Configuration
// ============================================================================

/// Remote text-analysis service (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// API base URL, without the `/chat/completions` suffix
    #[serde(default = "default_remote_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_remote_model")]
    pub model: String,

    /// Bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Items per remote request
    #[serde(default = "default_remote_batch_size")]
    pub batch_size: usize,

    /// Remote requests in flight at once
    #[serde(default = "default_remote_max_parallel")]
    pub max_parallel: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_remote_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for the whole run in seconds
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    /// Request a streamed (SSE) response
    #[serde(default)]
    pub stream: bool,

    /// Sampling temperature
    #[serde(default = "default_remote_temperature")]
    pub temperature: f64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            model: default_remote_model(),
            api_key: None,
            batch_size: default_remote_batch_size(),
            max_parallel: default_remote_max_parallel(),
            request_timeout_secs: default_remote_request_timeout(),
            run_timeout_secs: None,
            stream: false,
            temperature: default_remote_temperature(),
        }
    }
}

fn default_remote_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_remote_model() -> String {
    "gpt-4o-mini".into()
}

fn default_remote_batch_size() -> usize {
    20
}

fn default_remote_max_parallel() -> usize {
    3
}

fn default_remote_request_timeout() -> u64 {
    60
}

fn default_remote_temperature() -> f64 {
    0.1
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
