//! The single active incident session.
//!
//! [`SessionWindow`] owns at most one [`Session`] behind one mutex. Every
//! mutation (`ingest`, `drain`) and every consistent read (`snapshot`) takes
//! that lock for a short, non-blocking critical section. Nothing holds the
//! lock across I/O, so report generation for a drained session never blocks
//! the next session from forming.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::alert::AlertRecord;
use crate::metrics::CorrelatorMetrics;

use super::monitor::ClosePolicy;

/// The mutable session aggregate.
///
/// Invariants: `alerts` is never empty and `last_alert_time >= start_time`.
#[derive(Debug)]
struct Session {
    start_time: Instant,
    last_alert_time: Instant,
    opened_at: DateTime<Utc>,
    alerts: Vec<AlertRecord>,
}

impl Session {
    fn open(alert: AlertRecord, now: Instant) -> Self {
        Self {
            start_time: now,
            last_alert_time: now,
            opened_at: Utc::now(),
            alerts: vec![alert],
        }
    }

    fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            age: now.saturating_duration_since(self.start_time),
            inactivity: now.saturating_duration_since(self.last_alert_time),
            alert_count: self.alerts.len(),
            opened_at: self.opened_at,
        }
    }
}

/// Point-in-time timing view of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Time since the first alert
    pub age: Duration,
    /// Time since the most recent alert
    pub inactivity: Duration,
    /// Alerts in the session
    pub alert_count: usize,
    /// Wall-clock time the session was opened
    pub opened_at: DateTime<Utc>,
}

/// Whether an ingested alert opened a session or joined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new session was created for this alert
    Opened,
    /// The alert was appended; carries the new alert count
    Extended(usize),
}

/// Everything captured from a session at drain time.
#[derive(Debug, Clone)]
pub struct DrainedSession {
    /// Alerts in arrival order
    pub alerts: Vec<AlertRecord>,
    /// Session age at drain time
    pub age: Duration,
    /// Span between the first and last alert
    pub resolution_time: Duration,
    /// Wall-clock time the session was opened
    pub opened_at: DateTime<Utc>,
    /// Wall-clock time the session was drained
    pub closed_at: DateTime<Utc>,
}

impl DrainedSession {
    /// Number of drained alerts.
    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    /// Distinct services in first-seen order.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = Vec::new();
        for alert in &self.alerts {
            if !services.contains(&alert.service) {
                services.push(alert.service.clone());
            }
        }
        services
    }
}

/// Owner of the one active session.
#[derive(Debug)]
pub struct SessionWindow {
    session: Mutex<Option<Session>>,
    metrics: CorrelatorMetrics,
}

impl SessionWindow {
    /// Create an empty window publishing to the given metrics.
    #[must_use]
    pub fn new(metrics: CorrelatorMetrics) -> Self {
        Self {
            session: Mutex::new(None),
            metrics,
        }
    }

    /// Add an alert, opening a session if none exists.
    pub async fn ingest(&self, alert: AlertRecord) -> IngestOutcome {
        self.metrics.record_alert(&alert);

        let mut guard = self.session.lock().await;
        let now = Instant::now();
        match guard.as_mut() {
            Some(session) => {
                debug!(
                    alert_name = %alert.alert_name,
                    service = %alert.service,
                    "Adding alert to active session"
                );
                session.alerts.push(alert);
                session.last_alert_time = now;
                let count = session.alerts.len();
                self.metrics.set_active_session_alerts(count);
                IngestOutcome::Extended(count)
            }
            None => {
                info!(
                    alert_name = %alert.alert_name,
                    severity = %alert.severity,
                    service = %alert.service,
                    "New session created"
                );
                *guard = Some(Session::open(alert, now));
                self.metrics.set_active_session_alerts(1);
                IngestOutcome::Opened
            }
        }
    }

    /// Read the active session's timing without mutating it.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let guard = self.session.lock().await;
        guard.as_ref().map(|session| session.snapshot(Instant::now()))
    }

    /// Take all alerts out of the active session and reset to "no session".
    ///
    /// Returns `None` when no session exists; concurrent callers race for the
    /// lock and only the first one receives the alerts.
    pub async fn drain(&self) -> Option<DrainedSession> {
        let session = {
            let mut guard = self.session.lock().await;
            let session = guard.take()?;
            self.metrics.set_active_session_alerts(0);
            session
        };
        Some(Self::finish(session))
    }

    /// Drain the active session only if `policy` says it should close.
    ///
    /// The policy is evaluated under the same lock acquisition as the take,
    /// so an alert that has just extended the session keeps it open.
    pub async fn drain_if(&self, policy: &ClosePolicy) -> Option<DrainedSession> {
        let session = {
            let mut guard = self.session.lock().await;
            let snapshot = guard.as_ref()?.snapshot(Instant::now());
            if !policy.should_close(&snapshot) {
                return None;
            }
            let session = guard.take()?;
            self.metrics.set_active_session_alerts(0);
            session
        };
        Some(Self::finish(session))
    }

    fn finish(session: Session) -> DrainedSession {
        let now = Instant::now();
        DrainedSession {
            age: now.saturating_duration_since(session.start_time),
            resolution_time: session
                .last_alert_time
                .saturating_duration_since(session.start_time),
            opened_at: session.opened_at,
            closed_at: Utc::now(),
            alerts: session.alerts,
        }
    }

    /// Number of alerts in the active session (0 when idle).
    pub async fn alert_count(&self) -> usize {
        self.session
            .lock()
            .await
            .as_ref()
            .map_or(0, |session| session.alerts.len())
    }
}
