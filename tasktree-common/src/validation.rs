//! Configuration validation.
//!
//! Each section checks its own ranges; `Config::validate` collects every
//! violation so the user sees them all at once.

use thiserror::Error;

use crate::config::{
    Config, EmbeddingConfig, LoggingConfig, PipelineConfig, SearchConfig, SummarizerConfig,
};

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

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for crate::error::Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for SummarizerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.enabled && self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "summarizer.baseUrl".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::invalid(
                "summarizer.temperature",
                format!("must be between 0.0 and 2.0, got {}", self.temperature),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::invalid(
                "summarizer.timeoutSecs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validate for EmbeddingConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.dimensions == 0 {
            return Err(ValidationError::invalid(
                "embedding.dimensions",
                "must be greater than 0",
            ));
        }
        if self.enabled && self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "embedding.model".into(),
            });
        }
        Ok(())
    }
}

impl Validate for SearchConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ValidationError::invalid(
                "search.threshold",
                format!("must be between -1.0 and 1.0, got {}", self.threshold),
            ));
        }
        if self.top_k == 0 {
            return Err(ValidationError::invalid("search.topK", "must be at least 1"));
        }
        Ok(())
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.debounce_ms == 0 {
            return Err(ValidationError::invalid(
                "pipeline.debounceMs",
                "must be greater than 0",
            ));
        }
        if self.concurrency == 0 {
            return Err(ValidationError::invalid(
                "pipeline.concurrency",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(self.format.as_str(), "pretty" | "json") {
            return Err(ValidationError::invalid(
                "logging.format",
                format!("expected 'pretty' or 'json', got '{}'", self.format),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 5] = [
            &self.summarizer,
            &self.embedding,
            &self.search,
            &self.pipeline,
            &self.logging,
        ];

        let mut errors: Vec<ValidationError> =
            sections.iter().filter_map(|s| s.validate().err()).collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}
