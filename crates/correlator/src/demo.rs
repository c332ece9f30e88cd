//! Sample alert sender for end-to-end checks against a running correlator.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

/// Two related alerts from the monitoring stack, as Alertmanager deliveries.
#[must_use]
pub fn sample_deliveries() -> Vec<Value> {
    vec![
        json!({
            "version": "4",
            "status": "firing",
            "receiver": "alert-correlator",
            "groupKey": "{}:{alertname=\"AlertmanagerHighMemoryUsage\"}",
            "alerts": [{
                "status": "firing",
                "labels": {
                    "alertname": "AlertmanagerHighMemoryUsage",
                    "severity": "warning",
                    "instance": "alertmanager-main-0",
                    "job": "alertmanager"
                },
                "annotations": {
                    "summary": "Alertmanager high memory usage",
                    "description": "Alertmanager instance alertmanager-main-0 is using more than 85% of its memory.",
                    "runbook_url": "http://localhost:3000/#alertmanager/high_memory_usage"
                }
            }]
        }),
        json!({
            "version": "4",
            "status": "firing",
            "receiver": "alert-correlator",
            "groupKey": "{}:{alertname=\"PrometheusHighQueryLoad\"}",
            "alerts": [{
                "status": "firing",
                "labels": {
                    "alertname": "PrometheusHighQueryLoad",
                    "severity": "warning",
                    "instance": "prometheus-k8s-0",
                    "job": "prometheus"
                },
                "annotations": {
                    "summary": "Prometheus high query load",
                    "description": "Prometheus instance prometheus-k8s-0 is experiencing high query load.",
                    "runbook_url": "http://localhost:3000/#prometheus/high_query_load"
                }
            }]
        }),
    ]
}

/// Post the sample deliveries to `url`, pausing `delay` between them.
///
/// # Errors
///
/// Returns an error if a request fails or the correlator rejects a delivery.
pub async fn send_demo(client: &reqwest::Client, url: &str, delay: Duration) -> Result<usize> {
    let deliveries = sample_deliveries();
    let total = deliveries.len();

    for (i, delivery) in deliveries.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        let name = delivery["alerts"][0]["labels"]["alertname"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        let response = client
            .post(url)
            .json(&delivery)
            .send()
            .await
            .with_context(|| format!("Failed to send alert {name}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Correlator rejected alert {name} ({status}): {body}");
        }
        info!(alert = %name, status = %status, "Sent alert");
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::normalize;

    #[test]
    fn test_sample_deliveries_normalize() {
        let services: Vec<String> = sample_deliveries()
            .into_iter()
            .flat_map(|delivery| normalize(delivery).unwrap())
            .map(|record| record.service)
            .collect();
        assert_eq!(services, ["alertmanager", "prometheus"]);
    }
}
