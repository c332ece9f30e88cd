//! Error types for the alert correlator.

use thiserror::Error;

/// Errors raised while normalizing an inbound webhook payload.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Payload is not a JSON object
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// `alerts` field is present but not an array
    #[error("`alerts` must be an array")]
    AlertsNotArray,

    /// Entry in `alerts` is not an object
    #[error("alert at index {index} must be a JSON object")]
    InvalidAlert { index: usize },

    /// Payload fields have the wrong types
    #[error("invalid payload: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Errors raised while generating an incident report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider is not configured (e.g. missing API key)
    #[error("report generator not configured: {0}")]
    NotConfigured(String),

    /// Provider returned an error response
    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider response could not be parsed
    #[error("failed to parse LLM response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Provider returned no text
    #[error("LLM returned an empty report")]
    Empty,

    /// Report generation exceeded the configured timeout
    #[error("report generation timed out after {0}s")]
    Timeout(u64),

    /// No alerts were supplied
    #[error("cannot generate a report for an empty session")]
    NoAlerts,
}

/// Errors raised while validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A duration setting must be positive
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },

    /// Bind address could not be parsed
    #[error("invalid bind address {addr}: {reason}")]
    InvalidBindAddr { addr: String, reason: String },
}

/// Result alias for report generation.
pub type ReportResult<T> = Result<T, ReportError>;
