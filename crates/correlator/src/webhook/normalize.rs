//! Reduces webhook payloads to [`AlertRecord`]s.
//!
//! Three shapes are accepted:
//! - Alertmanager group deliveries (`{"alerts": [...]}`)
//! - a single Prometheus-style alert (`{"labels": {...}, "annotations": {...}}`)
//! - a flat alert (`{"alert_name": ..., "service": ...}`)

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::alert::{AlertRecord, AlertStatus, NO_DESCRIPTION, UNKNOWN};
use crate::error::NormalizeError;

use super::types::{AlertmanagerPayload, FlatAlert, LabeledAlert};

/// Group-level fields copied onto every alert of a delivery.
#[derive(Debug, Default)]
struct GroupContext<'a> {
    status: Option<&'a str>,
    group_key: Option<&'a str>,
    external_url: Option<&'a str>,
}

/// Normalize a webhook body into alert records, in payload order.
pub fn normalize(payload: Value) -> Result<Vec<AlertRecord>, NormalizeError> {
    let Value::Object(object) = &payload else {
        return Err(NormalizeError::NotAnObject(json_type(&payload)));
    };

    if let Some(alerts) = object.get("alerts") {
        let Value::Array(entries) = alerts else {
            return Err(NormalizeError::AlertsNotArray);
        };
        if let Some(index) = entries.iter().position(|entry| !entry.is_object()) {
            return Err(NormalizeError::InvalidAlert { index });
        }
        let group: AlertmanagerPayload = serde_json::from_value(payload)?;
        return Ok(normalize_group(&group));
    }

    if object.contains_key("labels") {
        let alert: LabeledAlert = serde_json::from_value(payload)?;
        return Ok(vec![from_labeled(alert, &GroupContext::default())]);
    }

    let alert: FlatAlert = serde_json::from_value(payload)?;
    Ok(vec![from_flat(alert)])
}

fn normalize_group(payload: &AlertmanagerPayload) -> Vec<AlertRecord> {
    let context = GroupContext {
        status: non_empty(&payload.status),
        group_key: non_empty(&payload.group_key),
        external_url: non_empty(&payload.external_url),
    };
    payload
        .alerts
        .iter()
        .cloned()
        .map(|alert| from_labeled(alert, &context))
        .collect()
}

fn from_labeled(alert: LabeledAlert, context: &GroupContext<'_>) -> AlertRecord {
    let LabeledAlert {
        status,
        mut labels,
        mut annotations,
        starts_at,
        ends_at,
        generator_url,
        fingerprint,
    } = alert;

    let alert_name = take_or_unknown(&mut labels, "alertname");
    let severity = take_or_unknown(&mut labels, "severity");
    let service = labels
        .remove("service")
        .or_else(|| labels.remove("job"))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let instance = labels.remove("instance");

    let description = annotations
        .remove("description")
        .or_else(|| annotations.remove("summary"))
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());
    let runbook_url = annotations.remove("runbook_url");
    if !generator_url.is_empty() {
        annotations.insert("generator_url".to_string(), generator_url);
    }

    let status = non_empty(&status)
        .or(context.status)
        .map_or(AlertStatus::Unknown, AlertStatus::parse);

    AlertRecord {
        alert_name,
        severity,
        service,
        instance,
        status,
        description,
        runbook_url,
        starts_at: starts_at.filter(is_set),
        ends_at: ends_at.filter(is_set),
        fingerprint: non_empty(&fingerprint).map(str::to_string),
        group_key: context.group_key.map(str::to_string),
        external_url: context.external_url.map(str::to_string),
        additional_labels: labels,
        additional_annotations: annotations,
    }
}

fn from_flat(alert: FlatAlert) -> AlertRecord {
    let additional_labels = alert
        .extra
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect();

    AlertRecord {
        alert_name: alert.alert_name.unwrap_or_else(|| UNKNOWN.to_string()),
        severity: alert.severity.unwrap_or_else(|| UNKNOWN.to_string()),
        service: alert.service.unwrap_or_else(|| UNKNOWN.to_string()),
        instance: alert.instance,
        status: alert
            .status
            .as_deref()
            .map_or(AlertStatus::Unknown, AlertStatus::parse),
        description: alert
            .description
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        runbook_url: alert.runbook_url,
        additional_labels,
        ..AlertRecord::default()
    }
}

fn take_or_unknown(map: &mut BTreeMap<String, String>, key: &str) -> String {
    map.remove(key).unwrap_or_else(|| UNKNOWN.to_string())
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

/// Alertmanager sends `0001-01-01T00:00:00Z` for "not set".
fn is_set(timestamp: &DateTime<Utc>) -> bool {
    timestamp.year() > 1
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
