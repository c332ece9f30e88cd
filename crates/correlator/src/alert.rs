//! Normalized alert records.
//!
//! Every webhook shape accepted by the HTTP layer is reduced to an
//! [`AlertRecord`] before it reaches the session window. All fields carry
//! defaults, so a record is always well-formed once constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value used for missing name, severity and service labels.
pub const UNKNOWN: &str = "unknown";

/// Placeholder used when an alert carries no description.
pub const NO_DESCRIPTION: &str = "No description";

/// Alert status as reported by Alertmanager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Alert is currently firing
    Firing,
    /// Alert has been resolved
    Resolved,
    /// Status was missing or unrecognized
    #[default]
    Unknown,
}

impl AlertStatus {
    /// Parse a status string, falling back to `Unknown`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "firing" => Self::Firing,
            "resolved" => Self::Resolved,
            _ => Self::Unknown,
        }
    }

    /// Get the status as a label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
            Self::Unknown => UNKNOWN,
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Alert name (`alertname` label)
    pub alert_name: String,
    /// Severity (critical, warning, info, ...)
    pub severity: String,
    /// Affected service
    pub service: String,
    /// Instance the alert fired on
    pub instance: Option<String>,
    /// Firing / resolved
    pub status: AlertStatus,
    /// Human-readable description
    pub description: String,
    /// Link to the runbook for this alert
    pub runbook_url: Option<String>,
    /// When the alert started firing
    pub starts_at: Option<DateTime<Utc>>,
    /// When the alert ended
    pub ends_at: Option<DateTime<Utc>>,
    /// Alertmanager fingerprint
    pub fingerprint: Option<String>,
    /// Alertmanager group key of the delivery
    pub group_key: Option<String>,
    /// Alertmanager external URL
    pub external_url: Option<String>,
    /// Labels without a dedicated field
    #[serde(default)]
    pub additional_labels: BTreeMap<String, String>,
    /// Annotations without a dedicated field
    #[serde(default)]
    pub additional_annotations: BTreeMap<String, String>,
}

impl Default for AlertRecord {
    fn default() -> Self {
        Self {
            alert_name: UNKNOWN.to_string(),
            severity: UNKNOWN.to_string(),
            service: UNKNOWN.to_string(),
            instance: None,
            status: AlertStatus::Unknown,
            description: NO_DESCRIPTION.to_string(),
            runbook_url: None,
            starts_at: None,
            ends_at: None,
            fingerprint: None,
            group_key: None,
            external_url: None,
            additional_labels: BTreeMap::new(),
            additional_annotations: BTreeMap::new(),
        }
    }
}

impl AlertRecord {
    /// Start building a record with the given alert name.
    pub fn builder(alert_name: impl Into<String>) -> AlertRecordBuilder {
        AlertRecordBuilder {
            record: Self {
                alert_name: alert_name.into(),
                ..Self::default()
            },
        }
    }
}

/// Builder for [`AlertRecord`].
#[derive(Debug, Clone)]
pub struct AlertRecordBuilder {
    record: AlertRecord,
}

impl AlertRecordBuilder {
    /// Set the severity.
    #[must_use]
    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.record.severity = severity.into();
        self
    }

    /// Set the service.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.record.service = service.into();
        self
    }

    /// Set the instance.
    #[must_use]
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.record.instance = Some(instance.into());
        self
    }

    /// Set the status.
    #[must_use]
    pub fn status(mut self, status: AlertStatus) -> Self {
        self.record.status = status;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = description.into();
        self
    }

    /// Set the runbook URL.
    #[must_use]
    pub fn runbook_url(mut self, url: impl Into<String>) -> Self {
        self.record.runbook_url = Some(url.into());
        self
    }

    /// Add an extra label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.record
            .additional_labels
            .insert(key.into(), value.into());
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> AlertRecord {
        self.record
    }
}
