//! Prompt construction for incident reports.

use std::fmt::Write as _;

use crate::alert::AlertRecord;

/// System prompt sent with every report request.
pub const SYSTEM_PROMPT: &str = "You are an incident response assistant.";

/// Render one bullet line per alert, in arrival order.
#[must_use]
pub fn describe_alerts(alerts: &[AlertRecord]) -> String {
    let mut out = String::new();
    for alert in alerts {
        let _ = write!(out, "- {}: {}", alert.alert_name, alert.description);
        let _ = write!(
            out,
            " (severity={}, service={}, status={}",
            alert.severity, alert.service, alert.status
        );
        if let Some(instance) = &alert.instance {
            let _ = write!(out, ", instance={instance}");
        }
        out.push(')');
        if let Some(runbook) = &alert.runbook_url {
            let _ = write!(out, " runbook: {runbook}");
        }
        out.push('\n');
    }
    out
}

/// Build the user prompt for a closed session.
#[must_use]
pub fn build_user_prompt(alerts: &[AlertRecord]) -> String {
    format!(
        "We received the following alerts:\n{}\nPlease provide an incident summary that correlates \
         these alerts, identifies potential root causes, and suggests remediation steps.",
        describe_alerts(alerts)
    )
}
