//! Incident report generation.
//!
//! The session monitor hands every closed session to a [`ReportGenerator`].
//! Generators return an explicit result; the monitor turns errors into
//! report text so its metrics and logging are the same on both paths.

pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::alert::AlertRecord;
use crate::error::ReportResult;

pub use openai::{LlmProvider, OpenAiReportGenerator};

/// Produces human-readable incident reports from a closed session.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Get the generator name (e.g., "openai").
    fn name(&self) -> &'static str;

    /// Generate a report for a non-empty, arrival-ordered list of alerts.
    async fn generate(&self, alerts: &[AlertRecord]) -> ReportResult<String>;
}

/// Process-wide incident identifier sequence (`INC1`, `INC2`, ...).
#[derive(Debug, Default)]
pub struct IncidentIds {
    next: AtomicU64,
}

impl IncidentIds {
    /// Create a sequence starting at `INC1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next identifier.
    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("INC{n}")
    }
}

/// Text recorded in place of a report when generation fails.
#[must_use]
pub fn error_report_text(reason: &str) -> String {
    format!("Error generating incident report: {reason}")
}
