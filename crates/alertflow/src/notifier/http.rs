use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use super::channel::{ChatConfig, ForwardConfig, WebhookConfig};
use crate::{
    alert::{Severity, UnifiedAlert},
    template::format_alert_message,
    Error, Result,
};

pub fn webhook_payload(alert: &UnifiedAlert) -> JsonValue {
    json!({
        "alert_id": alert.id,
        "source": alert.source,
        "alert_name": alert.alert_name,
        "severity": alert.severity,
        "status": alert.status,
        "starts_at": alert.starts_at,
        "labels": alert.labels,
        "annotations": alert.annotations,
        "workload_id": alert.workload_id,
        "pod_name": alert.pod_name,
        "node_name": alert.node_name,
    })
}

pub fn dingtalk_payload(alert: &UnifiedAlert) -> JsonValue {
    json!({
        "msgtype": "markdown",
        "markdown": {
            "title": format!("Alert: {}", alert.alert_name),
            "text": format_alert_message(alert),
        },
    })
}

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "danger",
        Severity::High => "warning",
        Severity::Warning => "#FFA500",
        Severity::Info => "good",
    }
}

pub fn slack_payload(alert: &UnifiedAlert) -> JsonValue {
    json!({
        "attachments": [{
            "color": severity_color(alert.severity),
            "title": format!("Alert: {}", alert.alert_name),
            "text": format_alert_message(alert),
            "timestamp": alert.starts_at.timestamp(),
        }],
    })
}

pub fn alertmanager_payload(alert: &UnifiedAlert) -> JsonValue {
    let mut item = json!({
        "labels": alert.labels,
        "annotations": alert.annotations,
        "startsAt": alert.starts_at.to_rfc3339(),
    });
    if let Some(ends_at) = alert.ends_at {
        item["endsAt"] = json!(ends_at.to_rfc3339());
    }
    json!([item])
}

async fn post_json(
    client: &Client,
    target: &str,
    url: &str,
    headers: Option<&std::collections::HashMap<String, String>>,
    body: &JsonValue,
) -> Result<()> {
    let mut request = client.post(url).json(body);
    if let Some(headers) = headers {
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
    }

    let response = request
        .send()
        .await
        .map_err(|e| Error::Notification(format!("failed to send {}: {}", target, e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Notification(format!(
            "{} returned status {}",
            target,
            status.as_u16()
        )));
    }
    Ok(())
}

pub async fn send_webhook(client: &Client, config: &WebhookConfig, alert: &UnifiedAlert) -> Result<()> {
    post_json(client, "webhook", &config.url, Some(&config.headers), &webhook_payload(alert)).await?;
    info!("Webhook notification sent for alert {}", alert.id);
    Ok(())
}

pub async fn send_dingtalk(client: &Client, config: &ChatConfig, alert: &UnifiedAlert) -> Result<()> {
    post_json(client, "DingTalk", &config.webhook_url, None, &dingtalk_payload(alert)).await?;
    info!("DingTalk notification sent for alert {}", alert.id);
    Ok(())
}

pub async fn send_slack(client: &Client, config: &ChatConfig, alert: &UnifiedAlert) -> Result<()> {
    post_json(client, "Slack", &config.webhook_url, None, &slack_payload(alert)).await?;
    info!("Slack notification sent for alert {}", alert.id);
    Ok(())
}

pub async fn send_alertmanager(client: &Client, config: &ForwardConfig, alert: &UnifiedAlert) -> Result<()> {
    let url = format!("{}/api/v1/alerts", config.url.trim_end_matches('/'));
    post_json(client, "AlertManager", &url, None, &alertmanager_payload(alert)).await?;
    info!("Alert {} forwarded to AlertManager", alert.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSource;
    use chrono::{TimeZone, Utc};

    fn alert() -> UnifiedAlert {
        let mut alert = UnifiedAlert::new("a1", AlertSource::Log, "OOMError");
        alert.severity = Severity::High;
        alert.starts_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        alert.pod_name = "trainer-0".to_string();
        alert
    }

    #[test]
    fn test_webhook_payload_is_flat() {
        let payload = webhook_payload(&alert());
        assert_eq!(payload["alert_id"], "a1");
        assert_eq!(payload["source"], "log");
        assert_eq!(payload["severity"], "high");
        assert_eq!(payload["status"], "firing");
        assert_eq!(payload["pod_name"], "trainer-0");
        assert!(payload["labels"].is_object());
    }

    #[test]
    fn test_chat_payloads() {
        let ding = dingtalk_payload(&alert());
        assert_eq!(ding["msgtype"], "markdown");
        assert_eq!(ding["markdown"]["title"], "Alert: OOMError");
        assert!(ding["markdown"]["text"].as_str().unwrap().contains("**Pod**: trainer-0"));

        let slack = slack_payload(&alert());
        assert_eq!(slack["attachments"][0]["color"], "warning");
        assert_eq!(slack["attachments"][0]["timestamp"], 1714557600);
    }

    #[test]
    fn test_severity_colors() {
        assert_eq!(severity_color(Severity::Critical), "danger");
        assert_eq!(severity_color(Severity::Warning), "#FFA500");
        assert_eq!(severity_color(Severity::Info), "good");
    }

    #[test]
    fn test_alertmanager_payload_end_time_is_optional() {
        let mut alert = alert();
        let payload = alertmanager_payload(&alert);
        assert_eq!(payload[0]["startsAt"], "2024-05-01T10:00:00+00:00");
        assert!(payload[0].get("endsAt").is_none());

        alert.ends_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
        assert_eq!(alertmanager_payload(&alert)[0]["endsAt"], "2024-05-01T11:00:00+00:00");
    }
}
