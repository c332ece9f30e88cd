//! Background task that closes idle or long-running sessions.
//!
//! Each tick applies the [`ClosePolicy`] to the active session and, on a
//! positive decision, drains the window in the same critical section and
//! generates the incident report. Report generation runs after the window
//! lock is released. Delivery is
//! at-most-once: a failed report is recorded as error text and the alerts
//! are not re-queued.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ReportError, ReportResult};
use crate::metrics::CorrelatorMetrics;
use crate::report::{error_report_text, IncidentIds, ReportGenerator};

use super::window::{DrainedSession, SessionSnapshot, SessionWindow};

/// Thresholds that decide when a session is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePolicy {
    /// Idle time after the last alert before the session closes
    pub inactivity_gap: Duration,
    /// Hard ceiling on session lifetime
    pub max_session_duration: Duration,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            inactivity_gap: Duration::from_secs(60),
            max_session_duration: Duration::from_secs(1800),
        }
    }
}

impl ClosePolicy {
    /// Check whether a session with this timing should close.
    #[must_use]
    pub fn should_close(&self, snapshot: &SessionSnapshot) -> bool {
        snapshot.inactivity >= self.inactivity_gap || snapshot.age >= self.max_session_duration
    }
}

/// Monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Closing thresholds
    pub policy: ClosePolicy,
    /// How often the session is checked
    pub poll_interval: Duration,
    /// Upper bound on one report generation call
    pub report_timeout: Duration,
    /// Close and report a still-open session when shutting down
    pub flush_on_shutdown: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            policy: ClosePolicy::default(),
            poll_interval: Duration::from_secs(10),
            report_timeout: Duration::from_secs(60),
            flush_on_shutdown: false,
        }
    }
}

/// Result of closing one session.
#[derive(Debug)]
pub struct IncidentOutcome {
    /// Assigned incident identifier (`INC<n>`)
    pub incident_id: String,
    /// Number of alerts in the session
    pub alert_count: usize,
    /// Session age at drain time
    pub session_duration: Duration,
    /// Span between first and last alert
    pub resolution_time: Duration,
    /// Distinct services in first-seen order
    pub services: Vec<String>,
    /// Wall-clock open time
    pub opened_at: DateTime<Utc>,
    /// Wall-clock close time
    pub closed_at: DateTime<Utc>,
    /// Generated report or the reason it failed
    pub report: ReportResult<String>,
}

impl IncidentOutcome {
    /// Report text, or the error text recorded in its place.
    #[must_use]
    pub fn report_text(&self) -> String {
        match &self.report {
            Ok(text) => text.clone(),
            Err(e) => error_report_text(&e.to_string()),
        }
    }

    /// Check if the report was generated.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        self.report.is_ok()
    }
}

/// Polls a [`SessionWindow`] and runs the close sequence.
pub struct SessionMonitor {
    window: Arc<SessionWindow>,
    reporter: Arc<dyn ReportGenerator>,
    metrics: CorrelatorMetrics,
    incident_ids: IncidentIds,
    config: MonitorConfig,
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("reporter", &self.reporter.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(
        window: Arc<SessionWindow>,
        reporter: Arc<dyn ReportGenerator>,
        metrics: CorrelatorMetrics,
        config: MonitorConfig,
    ) -> Self {
        Self {
            window,
            reporter,
            metrics,
            incident_ids: IncidentIds::new(),
            config,
        }
    }

    /// Run one poll: close the session if the policy says so.
    ///
    /// Returns the outcome when a session was closed.
    pub async fn tick(&self) -> Option<IncidentOutcome> {
        let drained = self.window.drain_if(&self.config.policy).await?;
        info!(
            alerts = drained.alert_count(),
            age_secs = drained.age.as_secs(),
            "Session window closed, processing alerts"
        );
        Some(self.process(drained).await)
    }

    /// Drain the window unconditionally and report on whatever it held.
    ///
    /// Returns `None` if another caller already drained the session.
    pub async fn close_session(&self) -> Option<IncidentOutcome> {
        let drained = self.window.drain().await?;
        Some(self.process(drained).await)
    }

    async fn process(&self, drained: DrainedSession) -> IncidentOutcome {
        let incident_id = self.incident_ids.next_id();
        let report = self.generate_report(&drained).await;

        let alert_count = drained.alert_count();
        self.metrics
            .record_session_closed(alert_count, drained.age, drained.resolution_time);

        let outcome = IncidentOutcome {
            incident_id,
            alert_count,
            session_duration: drained.age,
            resolution_time: drained.resolution_time,
            services: drained.services(),
            opened_at: drained.opened_at,
            closed_at: drained.closed_at,
            report,
        };

        match &outcome.report {
            Ok(report) => {
                self.metrics.record_report_generated();
                info!(
                    incident_id = %outcome.incident_id,
                    timestamp = %outcome.closed_at.to_rfc3339(),
                    alert_count = outcome.alert_count,
                    duration_seconds = outcome.session_duration.as_secs_f64(),
                    services = ?outcome.services,
                    report = %report,
                    "Incident report"
                );
            }
            Err(e) => {
                error!(
                    incident_id = %outcome.incident_id,
                    timestamp = %outcome.closed_at.to_rfc3339(),
                    alert_count = outcome.alert_count,
                    duration_seconds = outcome.session_duration.as_secs_f64(),
                    services = ?outcome.services,
                    report = %outcome.report_text(),
                    error = %e,
                    "Incident report generation failed"
                );
            }
        }

        outcome
    }

    async fn generate_report(&self, drained: &DrainedSession) -> ReportResult<String> {
        let timeout = self.config.report_timeout;
        match tokio::time::timeout(timeout, self.reporter.generate(&drained.alerts)).await {
            Ok(result) => result,
            Err(_) => Err(ReportError::Timeout(timeout.as_secs())),
        }
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// Cancellation is only observed between ticks, so a close sequence that
    /// has started always finishes.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            inactivity_gap_secs = self.config.policy.inactivity_gap.as_secs(),
            max_session_duration_secs = self.config.policy.max_session_duration.as_secs(),
            reporter = self.reporter.name(),
            "Starting session monitor"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn shutdown(&self) {
        if self.config.flush_on_shutdown {
            if let Some(outcome) = self.close_session().await {
                info!(
                    incident_id = %outcome.incident_id,
                    alert_count = outcome.alert_count,
                    "Flushed open session on shutdown"
                );
            }
        } else {
            let pending = self.window.alert_count().await;
            if pending > 0 {
                warn!(
                    alerts = pending,
                    "Session monitor stopped with an open session; alerts were not reported"
                );
            }
        }
        info!("Session monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn snapshot(age: u64, inactivity: u64) -> SessionSnapshot {
        SessionSnapshot {
            age: Duration::from_secs(age),
            inactivity: Duration::from_secs(inactivity),
            alert_count: 1,
            opened_at: Utc::now(),
        }
    }

    /// Records calls and replies with a fixed result.
    struct StubReporter {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl StubReporter {
        fn ok() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReportGenerator for StubReporter {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn generate(&self, alerts: &[AlertRecord]) -> ReportResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push(alerts.iter().map(|a| a.alert_name.clone()).collect());
            if self.fail {
                Err(ReportError::Api {
                    status: 500,
                    message: "upstream unavailable".to_string(),
                })
            } else {
                Ok(format!("{} correlated alerts", alerts.len()))
            }
        }
    }

    /// Never answers.
    struct HangingReporter;

    #[async_trait]
    impl ReportGenerator for HangingReporter {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn generate(&self, _alerts: &[AlertRecord]) -> ReportResult<String> {
            std::future::pending().await
        }
    }

    fn setup(
        reporter: Arc<dyn ReportGenerator>,
    ) -> (Arc<SessionWindow>, SessionMonitor, CorrelatorMetrics) {
        let metrics = CorrelatorMetrics::new();
        let window = Arc::new(SessionWindow::new(metrics.clone()));
        let monitor = SessionMonitor::new(
            Arc::clone(&window),
            reporter,
            metrics.clone(),
            MonitorConfig::default(),
        );
        (window, monitor, metrics)
    }

    #[test]
    fn test_close_policy_thresholds() {
        let policy = ClosePolicy::default();
        assert!(!policy.should_close(&snapshot(1799, 10)));
        assert!(policy.should_close(&snapshot(1801, 0)));
        assert!(policy.should_close(&snapshot(100, 61)));
    }

    #[test]
    fn test_close_policy_boundaries_are_inclusive() {
        let policy = ClosePolicy::default();
        assert!(policy.should_close(&snapshot(60, 60)));
        assert!(policy.should_close(&snapshot(1800, 0)));
        assert!(!policy.should_close(&snapshot(59, 59)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_idle_is_noop() {
        let reporter = Arc::new(StubReporter::ok());
        let (_, monitor, metrics) = setup(reporter.clone());

        assert!(monitor.tick().await.is_none());
        assert!(reporter.calls().is_empty());
        assert_eq!(metrics.sessions_processed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_keeps_active_session_open() {
        let reporter = Arc::new(StubReporter::ok());
        let (window, monitor, _) = setup(reporter.clone());

        window.ingest(AlertRecord::builder("A").build()).await;
        tokio::time::advance(Duration::from_secs(59)).await;

        assert!(monitor.tick().await.is_none());
        assert_eq!(window.alert_count().await, 1);
        assert!(reporter.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skips_session_extended_after_gap() {
        let reporter = Arc::new(StubReporter::ok());
        let (window, monitor, metrics) = setup(reporter.clone());

        window.ingest(AlertRecord::builder("A").build()).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        let stale = window.snapshot().await.unwrap();
        assert!(ClosePolicy::default().should_close(&stale));

        window.ingest(AlertRecord::builder("B").build()).await;

        assert!(monitor.tick().await.is_none());
        assert_eq!(window.alert_count().await, 2);
        assert!(reporter.calls().is_empty());
        assert_eq!(metrics.sessions_processed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_alert_session_closes_without_correlation() {
        let reporter = Arc::new(StubReporter::ok());
        let (window, monitor, metrics) = setup(reporter.clone());

        window.ingest(AlertRecord::builder("A").build()).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let outcome = monitor.tick().await.unwrap();
        assert_eq!(outcome.incident_id, "INC1");
        assert_eq!(outcome.alert_count, 1);
        assert_eq!(outcome.resolution_time, Duration::ZERO);
        assert_eq!(metrics.sessions_processed(), 1);
        assert_eq!(metrics.correlated_alerts(), 0);
        assert_eq!(metrics.histogram_count("alert_resolution_time_seconds"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_failure_still_closes_session() {
        let reporter = Arc::new(StubReporter::failing());
        let (window, monitor, metrics) = setup(reporter.clone());

        window.ingest(AlertRecord::builder("A").build()).await;
        window.ingest(AlertRecord::builder("B").build()).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let outcome = monitor.tick().await.unwrap();
        assert!(!outcome.is_reported());
        assert_eq!(
            outcome.report_text(),
            "Error generating incident report: LLM API error (500): upstream unavailable"
        );
        assert_eq!(metrics.sessions_processed(), 1);
        assert_eq!(metrics.incident_reports_generated(), 0);
        assert_eq!(metrics.correlated_alerts(), 2);
        assert_eq!(metrics.active_session_alerts(), 0);

        // Not retried, not re-queued.
        assert!(window.snapshot().await.is_none());
        assert!(monitor.tick().await.is_none());
        assert_eq!(reporter.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_timeout_is_recorded_as_error() {
        let (window, monitor, metrics) = setup(Arc::new(HangingReporter));

        window.ingest(AlertRecord::builder("A").build()).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let outcome = monitor.tick().await.unwrap();
        assert!(matches!(outcome.report, Err(ReportError::Timeout(60))));
        assert_eq!(metrics.sessions_processed(), 1);
        assert_eq!(metrics.incident_reports_generated(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_during_report_opens_new_session() {
        let (window, monitor, _) = setup(Arc::new(HangingReporter));
        let monitor = Arc::new(monitor);

        window.ingest(AlertRecord::builder("A").build()).await;
        tokio::time::advance(Duration::from_secs(60)).await;

        let closing = tokio::spawn({
            let monitor = Arc::clone(&monitor);
            async move { monitor.tick().await }
        });
        // Let the close sequence drain and block on the reporter.
        tokio::task::yield_now().await;
        while window.alert_count().await != 0 {
            tokio::task::yield_now().await;
        }

        window.ingest(AlertRecord::builder("B").build()).await;
        let snapshot = window.snapshot().await.unwrap();
        assert_eq!(snapshot.alert_count, 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        let outcome = closing.await.unwrap().unwrap();
        assert_eq!(outcome.alert_count, 1);
        assert_eq!(window.alert_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incident_ids_increment_per_close() {
        let reporter = Arc::new(StubReporter::ok());
        let (window, monitor, _) = setup(reporter);

        for expected in ["INC1", "INC2", "INC3"] {
            window.ingest(AlertRecord::builder("A").build()).await;
            tokio::time::advance(Duration::from_secs(60)).await;
            let outcome = monitor.tick().await.unwrap();
            assert_eq!(outcome.incident_id, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel_and_flushes() {
        let reporter = Arc::new(StubReporter::ok());
        let metrics = CorrelatorMetrics::new();
        let window = Arc::new(SessionWindow::new(metrics.clone()));
        let monitor = Arc::new(SessionMonitor::new(
            Arc::clone(&window),
            reporter.clone(),
            metrics.clone(),
            MonitorConfig {
                flush_on_shutdown: true,
                ..MonitorConfig::default()
            },
        ));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&monitor).run(shutdown.clone()));

        window.ingest(AlertRecord::builder("A").build()).await;
        tokio::time::advance(Duration::from_secs(15)).await;
        tokio::task::yield_now().await;
        assert_eq!(window.alert_count().await, 1);

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(window.alert_count().await, 0);
        assert_eq!(reporter.calls(), vec![vec!["A".to_string()]]);
        assert_eq!(metrics.sessions_processed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_flush_leaves_session_unreported() {
        let reporter = Arc::new(StubReporter::ok());
        let (window, monitor, metrics) = setup(reporter.clone());
        let monitor = Arc::new(monitor);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&monitor).run(shutdown.clone()));

        window.ingest(AlertRecord::builder("A").build()).await;
        window.ingest(AlertRecord::builder("B").build()).await;
        tokio::time::advance(Duration::from_secs(15)).await;
        tokio::task::yield_now().await;

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(window.alert_count().await, 2);
        assert!(reporter.calls().is_empty());
        assert_eq!(metrics.sessions_processed(), 0);
        assert_eq!(metrics.active_session_alerts(), 2);
    }
}
