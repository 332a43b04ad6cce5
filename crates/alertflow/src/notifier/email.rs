use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::info;

use super::channel::EmailConfig;
use crate::{
    alert::UnifiedAlert,
    template::{email_subject, format_alert_message, TemplateRenderer},
    Error, Result,
};

fn mailbox(address: &str, name: Option<&str>) -> Result<Mailbox> {
    let address: Address = address
        .trim()
        .parse()
        .map_err(|e| Error::Email(format!("invalid address {:?}: {}", address, e)))?;
    Ok(Mailbox::new(name.filter(|n| !n.is_empty()).map(str::to_string), address))
}

/// Builds the multipart/alternative message for an alert.
pub fn build_message(config: &EmailConfig, alert: &UnifiedAlert, html: String) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&config.from, Some(&config.from_name))?)
        .subject(email_subject(alert));
    for to in &config.to {
        builder = builder.to(mailbox(to, None)?);
    }
    for cc in &config.cc {
        builder = builder.cc(mailbox(cc, None)?);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(format_alert_message(alert), html))
        .map_err(|e| Error::Email(format!("failed to build email: {}", e)))
}

fn transport(config: &EmailConfig, timeout: Duration) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let tls_parameters = || {
        TlsParameters::builder(config.smtp_host.clone())
            .dangerous_accept_invalid_certs(config.skip_verify)
            .build()
            .map_err(|e| Error::Email(format!("invalid TLS settings: {}", e)))
    };
    let tls = if config.use_tls {
        Tls::Wrapper(tls_parameters()?)
    } else if config.use_starttls {
        Tls::Opportunistic(tls_parameters()?)
    } else {
        Tls::None
    };

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        .port(config.smtp_port)
        .tls(tls)
        .timeout(Some(timeout));
    if let Some(credentials) = credentials(config) {
        builder = builder.credentials(credentials);
    }
    Ok(builder.build())
}

/// SMTP AUTH is only attempted when both username and password are set.
fn credentials(config: &EmailConfig) -> Option<Credentials> {
    if config.username.is_empty() || config.password.is_empty() {
        return None;
    }
    Some(Credentials::new(config.username.clone(), config.password.clone()))
}

pub async fn send_email(
    renderer: &TemplateRenderer,
    config: &EmailConfig,
    alert: &UnifiedAlert,
    timeout: Duration,
) -> Result<()> {
    let html = renderer.render_email_html(alert)?;
    let message = build_message(config, alert, html)?;

    transport(config, timeout)?
        .send(message)
        .await
        .map_err(|e| Error::Email(format!("failed to send email: {}", e)))?;

    info!("Email notification sent for alert {} to {:?}", alert.id, config.to);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertSource, Severity};

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from: "alerts@example.com".to_string(),
            from_name: "Alert Bot".to_string(),
            to: vec!["oncall@example.com".to_string()],
            cc: vec!["lead@example.com".to_string()],
            use_tls: false,
            use_starttls: true,
            skip_verify: false,
        }
    }

    #[test]
    fn test_build_message_headers_and_parts() {
        let mut alert = UnifiedAlert::new("a1", AlertSource::Metric, "NodeDown");
        alert.severity = Severity::Critical;

        let message = build_message(&config(), &alert, "<p>down</p>".to_string()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [CRITICAL] Alert: NodeDown - firing"));
        assert!(raw.contains("Alert Bot"));
        assert!(raw.contains("<alerts@example.com>"));
        assert!(raw.contains("To: oncall@example.com"));
        assert!(raw.contains("Cc: lead@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_invalid_recipient_is_an_email_error() {
        let mut config = config();
        config.to = vec!["not an address".to_string()];
        let alert = UnifiedAlert::new("a1", AlertSource::Metric, "NodeDown");
        assert!(matches!(
            build_message(&config, &alert, String::new()),
            Err(Error::Email(_))
        ));
    }

    #[test]
    fn test_credentials_need_username_and_password() {
        let mut config = config();
        assert!(credentials(&config).is_none());
        config.username = "bot".to_string();
        assert!(credentials(&config).is_none());
        config.password = "secret".to_string();
        assert!(credentials(&config).is_some());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let mut config = config();
        config.smtp_host = "127.0.0.1".to_string();
        config.smtp_port = 1;
        config.use_starttls = false;
        let renderer = TemplateRenderer::new().unwrap();
        let alert = UnifiedAlert::new("a1", AlertSource::Metric, "NodeDown");

        let result = send_email(&renderer, &config, &alert, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Email(_))));
    }
}
