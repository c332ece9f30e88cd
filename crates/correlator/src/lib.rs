//! Alert correlation and incident reporting.
//!
//! Alerts arriving from Alertmanager are grouped into a single incident
//! session. A session stays open while alerts keep arriving; once it has been
//! quiet for the inactivity gap, or has lived for the maximum duration, the
//! session monitor drains it and asks an LLM for an incident report.
//!
//! # Architecture
//!
//! - [`webhook`] normalizes inbound payloads into [`AlertRecord`]s and serves HTTP
//! - [`SessionWindow`] owns the one active session behind a single lock
//! - [`SessionMonitor`] polls the window and runs the close sequence
//! - [`ReportGenerator`] turns a closed session into report text
//! - [`CorrelatorMetrics`] exposes Prometheus metrics for all of the above
//!
//! # Usage
//!
//! ```no_run
//! use alert_correlator::{
//!     AlertRecord, CorrelatorMetrics, LlmProvider, MonitorConfig, OpenAiReportGenerator,
//!     SessionMonitor, SessionWindow,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let metrics = CorrelatorMetrics::new();
//! let window = Arc::new(SessionWindow::new(metrics.clone()));
//! let reporter = Arc::new(OpenAiReportGenerator::new(LlmProvider::Ollama));
//! let monitor = SessionMonitor::new(window.clone(), reporter, metrics, MonitorConfig::default());
//!
//! window.ingest(AlertRecord::builder("HighErrorRate").service("checkout").build()).await;
//! monitor.tick().await;
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod config;
pub mod demo;
pub mod error;
pub mod metrics;
pub mod report;
pub mod session;
pub mod webhook;

pub use alert::{AlertRecord, AlertStatus};
pub use config::{CorrelatorConfig, LlmConfig, ServeArgs};
pub use error::{ConfigError, NormalizeError, ReportError, ReportResult};
pub use metrics::CorrelatorMetrics;
pub use report::{IncidentIds, LlmProvider, OpenAiReportGenerator, ReportGenerator};
pub use session::{
    ClosePolicy, DrainedSession, IncidentOutcome, IngestOutcome, MonitorConfig, SessionMonitor,
    SessionSnapshot, SessionWindow,
};
