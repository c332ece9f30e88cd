//! Prometheus metrics for alert ingestion and session lifecycle.
//!
//! Metric names follow what the dashboards already scrape:
//!
//! - `alerts_total{alert_name,severity,service,status}`
//! - `active_session_alerts`
//! - `sessions_processed_total`
//! - `session_duration_seconds`
//! - `session_alerts_total`
//! - `alert_resolution_time_seconds`
//! - `correlated_alerts_total`
//! - `incident_reports_generated_total`

use std::sync::Arc;
use std::time::Duration;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::alert::AlertRecord;

/// Content type of the exposition produced by [`CorrelatorMetrics::encode`].
pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Label set for the per-alert counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AlertLabels {
    /// Alert name
    pub alert_name: String,
    /// Alert severity
    pub severity: String,
    /// Affected service
    pub service: String,
    /// Firing / resolved / unknown
    pub status: String,
}

impl From<&AlertRecord> for AlertLabels {
    fn from(alert: &AlertRecord) -> Self {
        Self {
            alert_name: alert.alert_name.clone(),
            severity: alert.severity.clone(),
            service: alert.service.clone(),
            status: alert.status.as_str().to_string(),
        }
    }
}

/// All metrics emitted by the correlator.
///
/// Cloning is cheap; clones share the same underlying series.
#[derive(Clone)]
pub struct CorrelatorMetrics {
    registry: Arc<Registry>,
    alerts: Family<AlertLabels, Counter>,
    active_session_alerts: Gauge,
    sessions_processed: Counter,
    session_duration_seconds: Histogram,
    session_alerts: Counter,
    alert_resolution_time_seconds: Histogram,
    correlated_alerts: Counter,
    incident_reports_generated: Counter,
}

impl std::fmt::Debug for CorrelatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelatorMetrics")
            .field("active_session_alerts", &self.active_session_alerts.get())
            .field("sessions_processed", &self.sessions_processed.get())
            .finish_non_exhaustive()
    }
}

impl Default for CorrelatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelatorMetrics {
    /// Create the metrics and register them with a fresh registry.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let alerts = Family::<AlertLabels, Counter>::default();
        registry.register("alerts", "Total number of alerts received", alerts.clone());

        let active_session_alerts = Gauge::default();
        registry.register(
            "active_session_alerts",
            "Number of alerts in the current active session",
            active_session_alerts.clone(),
        );

        let sessions_processed = Counter::default();
        registry.register(
            "sessions_processed",
            "Total number of sessions processed",
            sessions_processed.clone(),
        );

        // 1s .. ~68min, covers the default 30 minute session ceiling
        let session_duration_seconds = Histogram::new(exponential_buckets(1.0, 2.0, 13));
        registry.register(
            "session_duration_seconds",
            "Duration of alert sessions in seconds",
            session_duration_seconds.clone(),
        );

        let session_alerts = Counter::default();
        registry.register(
            "session_alerts",
            "Total number of alerts processed in sessions",
            session_alerts.clone(),
        );

        let alert_resolution_time_seconds = Histogram::new(exponential_buckets(1.0, 2.0, 13));
        registry.register(
            "alert_resolution_time_seconds",
            "Time between the first and last alert of a session in seconds",
            alert_resolution_time_seconds.clone(),
        );

        let correlated_alerts = Counter::default();
        registry.register(
            "correlated_alerts",
            "Total number of alerts closed in sessions with more than one alert",
            correlated_alerts.clone(),
        );

        let incident_reports_generated = Counter::default();
        registry.register(
            "incident_reports_generated",
            "Total number of incident reports generated",
            incident_reports_generated.clone(),
        );

        Self {
            registry: Arc::new(registry),
            alerts,
            active_session_alerts,
            sessions_processed,
            session_duration_seconds,
            session_alerts,
            alert_resolution_time_seconds,
            correlated_alerts,
            incident_reports_generated,
        }
    }

    /// Count one ingested alert.
    pub fn record_alert(&self, alert: &AlertRecord) {
        self.alerts.get_or_create(&AlertLabels::from(alert)).inc();
    }

    /// Set the number of alerts in the active session.
    pub fn set_active_session_alerts(&self, count: usize) {
        self.active_session_alerts.set(count as i64);
    }

    /// Record a closed session.
    ///
    /// `duration` is the session age at drain time and `resolution_time`
    /// the span between its first and last alert.
    pub fn record_session_closed(
        &self,
        alert_count: usize,
        duration: Duration,
        resolution_time: Duration,
    ) {
        let count = alert_count as u64;
        self.sessions_processed.inc();
        self.session_duration_seconds.observe(duration.as_secs_f64());
        self.session_alerts.inc_by(count);
        self.alert_resolution_time_seconds
            .observe(resolution_time.as_secs_f64());
        if alert_count > 1 {
            self.correlated_alerts.inc_by(count);
        }
    }

    /// Count one successfully generated incident report.
    pub fn record_report_generated(&self) {
        self.incident_reports_generated.inc();
    }

    /// Number of alerts received for the given label set.
    #[must_use]
    pub fn alerts_received(&self, labels: &AlertLabels) -> u64 {
        self.alerts.get_or_create(labels).get()
    }

    /// Current value of the in-session gauge.
    #[must_use]
    pub fn active_session_alerts(&self) -> i64 {
        self.active_session_alerts.get()
    }

    /// Sessions closed so far.
    #[must_use]
    pub fn sessions_processed(&self) -> u64 {
        self.sessions_processed.get()
    }

    /// Alerts closed in sessions so far.
    #[must_use]
    pub fn session_alerts(&self) -> u64 {
        self.session_alerts.get()
    }

    /// Alerts closed in multi-alert sessions so far.
    #[must_use]
    pub fn correlated_alerts(&self) -> u64 {
        self.correlated_alerts.get()
    }

    /// Incident reports generated so far.
    #[must_use]
    pub fn incident_reports_generated(&self) -> u64 {
        self.incident_reports_generated.get()
    }

    /// Encode all metrics in the OpenMetrics text format.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("failed to encode prometheus metrics");
            return String::new();
        }
        buffer
    }
}

#[cfg(test)]
impl CorrelatorMetrics {
    /// Number of observations of a histogram, read from the exposition.
    pub(crate) fn histogram_count(&self, name: &str) -> u64 {
        let prefix = format!("{name}_count ");
        self.encode()
            .lines()
            .find_map(|line| line.strip_prefix(&prefix))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }
}
