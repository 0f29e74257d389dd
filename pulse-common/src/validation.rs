//! Configuration validation for Pulse.
//!
//! Ensures scoring constants, batch sizes, and logging options are within
//! usable ranges before a run starts.

use thiserror::Error;

use crate::config::{AnalysisConfig, BatchingConfig, Config, ObservabilityConfig, RemoteConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.analysis.validate(),
            self.batching.validate(),
            self.remote.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for AnalysisConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(0.5..1.0).contains(&self.neutral_threshold) {
            return Err(invalid("analysis.neutral_threshold", "must be in [0.5, 1.0)"));
        }
        if !(0.5..1.0).contains(&self.scale_threshold) {
            return Err(invalid("analysis.scale_threshold", "must be in [0.5, 1.0)"));
        }
        if self.chunk_tokens == 0 {
            return Err(invalid("analysis.chunk_tokens", "must be greater than 0"));
        }
        if self.max_text_chars == 0 {
            return Err(invalid("analysis.max_text_chars", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.short_text_damping) {
            return Err(invalid("analysis.short_text_damping", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.max_confidence) {
            return Err(invalid("analysis.max_confidence", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(invalid("analysis.min_success_rate", "must be in [0, 1]"));
        }
        if self.keyword_clip < 0.0 {
            return Err(invalid("analysis.keyword_clip", "must not be negative"));
        }
        Ok(())
    }
}

impl Validate for BatchingConfig {
    fn validate(&self) -> ValidationResult<()> {
        let sizes = [
            ("batching.small_corpus_batch", self.small_corpus_batch),
            ("batching.long_text_batch", self.long_text_batch),
            ("batching.large_corpus_batch", self.large_corpus_batch),
            ("batching.default_batch", self.default_batch),
        ];
        for (field, size) in sizes {
            if size == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }
        Ok(())
    }
}

impl Validate for RemoteConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "remote.base_url".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(invalid("remote.batch_size", "must be greater than 0"));
        }
        if self.max_parallel == 0 {
            return Err(invalid("remote.max_parallel", "must be greater than 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("remote.request_timeout_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}
