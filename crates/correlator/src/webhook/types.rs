//! Inbound webhook payload shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alertmanager webhook payload.
///
/// Reference: <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>
///
/// Only `alerts` is required; everything else defaults so that hand-written
/// test deliveries are accepted too.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    /// Version of the payload format
    #[serde(default)]
    pub version: String,
    /// Unique identifier for this group of alerts
    #[serde(default)]
    pub group_key: String,
    /// Number of truncated alerts (if any)
    #[serde(default)]
    pub truncated_alerts: u32,
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Receiver that matched this alert
    #[serde(default)]
    pub receiver: String,
    /// Labels common to all alerts in this group
    #[serde(default)]
    pub group_labels: BTreeMap<String, String>,
    /// Labels common to all alerts (may include group labels)
    #[serde(default)]
    pub common_labels: BTreeMap<String, String>,
    /// Annotations common to all alerts
    #[serde(default)]
    pub common_annotations: BTreeMap<String, String>,
    /// External URL for Alertmanager
    #[serde(default, rename = "externalURL", alias = "externalUrl")]
    pub external_url: String,
    /// List of alerts in this notification
    pub alerts: Vec<LabeledAlert>,
}

/// A Prometheus-style alert: labels plus annotations.
///
/// Used both for entries of [`AlertmanagerPayload::alerts`] and for a single
/// alert posted on its own.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledAlert {
    /// Status: "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Alert labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Alert annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// When the alert started firing
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// When the alert ended (zero time while still firing)
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// URL of the rule that generated the alert
    #[serde(default, rename = "generatorURL", alias = "generatorUrl")]
    pub generator_url: String,
    /// Unique fingerprint for this alert
    #[serde(default)]
    pub fingerprint: String,
}

/// Flat single-alert body, as sent by simple scripts:
///
/// ```json
/// {"alert_name": "HighErrorRate", "severity": "critical",
///  "service": "ServiceA", "description": "Error rate exceeded threshold"}
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlatAlert {
    /// Alert name
    #[serde(default, alias = "alertname")]
    pub alert_name: Option<String>,
    /// Severity
    #[serde(default)]
    pub severity: Option<String>,
    /// Affected service
    #[serde(default)]
    pub service: Option<String>,
    /// Instance
    #[serde(default)]
    pub instance: Option<String>,
    /// Status
    #[serde(default)]
    pub status: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Runbook link
    #[serde(default)]
    pub runbook_url: Option<String>,
    /// Any other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alertmanager_payload_parses() {
        let json = serde_json::json!({
            "version": "4",
            "groupKey": "{}:{alertname=\"HighMemory\"}",
            "status": "firing",
            "receiver": "correlator",
            "externalURL": "http://alertmanager:9093",
            "alerts": [{
                "status": "firing",
                "labels": {"alertname": "HighMemory", "severity": "warning"},
                "annotations": {"description": "Memory above 85%"},
                "startsAt": "2024-03-01T10:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z",
                "generatorURL": "http://prometheus:9090/graph",
                "fingerprint": "abc123"
            }]
        });

        let payload: AlertmanagerPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.external_url, "http://alertmanager:9093");
        assert_eq!(payload.alerts.len(), 1);
        assert_eq!(
            payload.alerts[0].labels.get("alertname").map(String::as_str),
            Some("HighMemory")
        );
        assert_eq!(payload.alerts[0].generator_url, "http://prometheus:9090/graph");
        assert!(payload.alerts[0].starts_at.is_some());
    }

    #[test]
    fn test_flat_alert_collects_extra_keys() {
        let json = serde_json::json!({
            "alert_name": "HighErrorRate",
            "region": "eu-west-1",
            "replicas": 3
        });

        let alert: FlatAlert = serde_json::from_value(json).unwrap();
        assert_eq!(alert.alert_name.as_deref(), Some("HighErrorRate"));
        assert!(alert.severity.is_none());
        assert_eq!(alert.extra.len(), 2);
    }
}
