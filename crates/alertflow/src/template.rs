//! Message bodies for notification channels.
//!
//! The email HTML body is rendered with Tera; chat channels and the plain-text
//! email part share the markdown summary from [`format_alert_message`].

use serde::Serialize;
use std::collections::BTreeMap;
use tera::{Context, Tera};

use crate::{alert::UnifiedAlert, Result};

const EMAIL_TEMPLATE_NAME: &str = "alert_email.html";

const EMAIL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<style>
  body { font-family: Helvetica, Arial, sans-serif; background: #f4f4f6; margin: 0; padding: 24px; }
  .card { max-width: 640px; margin: 0 auto; background: #ffffff; border-radius: 6px; overflow: hidden; }
  .banner { padding: 18px 22px; color: #ffffff; }
  .banner.critical { background: #c0392b; }
  .banner.high { background: #e67e22; }
  .banner.warning { background: #f1c40f; color: #2c3e50; }
  .banner.info { background: #2980b9; }
  .banner h2 { margin: 0 0 4px 0; font-size: 19px; }
  .banner .meta { font-size: 13px; }
  .body { padding: 18px 22px; }
  .row { margin-bottom: 12px; }
  .name { font-size: 11px; color: #7f8c8d; text-transform: uppercase; }
  .value { font-size: 14px; color: #2c3e50; }
  .tag { display: inline-block; background: #ecf0f1; border-radius: 3px; padding: 2px 6px; margin: 2px; font-size: 12px; }
  .foot { padding: 12px 22px; border-top: 1px solid #ecf0f1; font-size: 12px; color: #95a5a6; }
</style>
</head>
<body>
<div class="card">
  <div class="banner {{ severity }}">
    <h2>{{ alert_name }}</h2>
    <div class="meta">Status: {{ status }} | Severity: {{ severity | upper }}</div>
  </div>
  <div class="body">
    <div class="row"><div class="name">Source</div><div class="value">{{ source }}</div></div>
    <div class="row"><div class="name">Time</div><div class="value">{{ starts_at }}</div></div>
    {% if workload_id %}<div class="row"><div class="name">Workload</div><div class="value">{{ workload_id }}</div></div>{% endif %}
    {% if pod_name %}<div class="row"><div class="name">Pod</div><div class="value">{{ pod_name }}</div></div>{% endif %}
    {% if node_name %}<div class="row"><div class="name">Node</div><div class="value">{{ node_name }}</div></div>{% endif %}
    {% if cluster_name %}<div class="row"><div class="name">Cluster</div><div class="value">{{ cluster_name }}</div></div>{% endif %}
    {% if description %}<div class="row"><div class="name">Description</div><div class="value">{{ description }}</div></div>{% endif %}
    {% if labels %}<div class="row"><div class="name">Labels</div><div class="value">
      {% for key, value in labels %}<span class="tag">{{ key }}={{ value }}</span>{% endfor %}
    </div></div>{% endif %}
  </div>
  <div class="foot">Alert ID: {{ id }} | alertflow</div>
</div>
</body>
</html>
"#;

#[derive(Debug, Serialize)]
struct EmailView<'a> {
    id: &'a str,
    alert_name: &'a str,
    severity: &'a str,
    status: String,
    source: String,
    starts_at: String,
    workload_id: &'a str,
    pod_name: &'a str,
    node_name: &'a str,
    cluster_name: &'a str,
    description: &'a str,
    labels: BTreeMap<&'a str, &'a str>,
}

impl<'a> EmailView<'a> {
    fn new(alert: &'a UnifiedAlert) -> Self {
        let description = alert
            .annotations
            .get("description")
            .or_else(|| alert.annotations.get("summary"))
            .map(String::as_str)
            .unwrap_or_default();
        Self {
            id: &alert.id,
            alert_name: &alert.alert_name,
            severity: alert.severity.as_str(),
            status: alert.status.to_string(),
            source: alert.source.to_string(),
            starts_at: alert.starts_at.to_rfc3339(),
            workload_id: &alert.workload_id,
            pod_name: &alert.pod_name,
            node_name: &alert.node_name,
            cluster_name: &alert.cluster_name,
            description,
            labels: alert
                .labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        }
    }
}

/// Compiled notification templates.
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(EMAIL_TEMPLATE_NAME, EMAIL_TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render_email_html(&self, alert: &UnifiedAlert) -> Result<String> {
        let context = Context::from_serialize(EmailView::new(alert))?;
        Ok(self.tera.render(EMAIL_TEMPLATE_NAME, &context)?)
    }
}

pub fn email_subject(alert: &UnifiedAlert) -> String {
    format!(
        "[{}] Alert: {} - {}",
        alert.severity.as_str().to_uppercase(),
        alert.alert_name,
        alert.status
    )
}

/// Markdown summary used by chat channels and plain-text email.
pub fn format_alert_message(alert: &UnifiedAlert) -> String {
    let mut msg = format!("**Severity**: {}\n", alert.severity);
    msg.push_str(&format!("**Source**: {}\n", alert.source));
    msg.push_str(&format!("**Status**: {}\n", alert.status));
    msg.push_str(&format!("**Time**: {}\n", alert.starts_at.to_rfc3339()));

    for (label, value) in [
        ("Workload", &alert.workload_id),
        ("Pod", &alert.pod_name),
        ("Node", &alert.node_name),
    ] {
        if !value.is_empty() {
            msg.push_str(&format!("**{}**: {}\n", label, value));
        }
    }

    if let Some(description) = alert.annotations.get("description") {
        msg.push_str(&format!("\n**Description**: {}\n", description));
    }
    if let Some(summary) = alert.annotations.get("summary") {
        msg.push_str(&format!("\n**Summary**: {}\n", summary));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSource, Severity};
    use chrono::{TimeZone, Utc};

    fn alert() -> UnifiedAlert {
        let mut alert = UnifiedAlert::new("abc123", AlertSource::Metric, "GPUMemoryHigh");
        alert.severity = Severity::Critical;
        alert.starts_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        alert.workload_id = "wl-1".to_string();
        alert.labels.insert("gpu".to_string(), "3".to_string());
        alert
    }

    #[test]
    fn test_format_alert_message_layout() {
        let mut alert = alert();
        alert.annotations.insert("summary".to_string(), "GPU 3 at 98%".to_string());

        assert_eq!(
            format_alert_message(&alert),
            "**Severity**: critical\n**Source**: metric\n**Status**: firing\n\
             **Time**: 2024-05-01T10:00:00+00:00\n**Workload**: wl-1\n\
             \n**Summary**: GPU 3 at 98%\n"
        );
    }

    #[test]
    fn test_email_subject() {
        assert_eq!(email_subject(&alert()), "[CRITICAL] Alert: GPUMemoryHigh - firing");
    }

    #[test]
    fn test_email_html_uses_severity_class_and_summary_fallback() {
        let mut alert = alert();
        alert.annotations.insert("summary".to_string(), "memory <high>".to_string());

        let html = TemplateRenderer::new().unwrap().render_email_html(&alert).unwrap();
        assert!(html.contains(r#"class="banner critical""#));
        assert!(html.contains("Severity: CRITICAL"));
        assert!(html.contains("memory &lt;high&gt;"));
        assert!(html.contains("gpu=3"));
        assert!(html.contains("Alert ID: abc123"));
        assert!(!html.contains("Cluster</div>"));
    }
}
