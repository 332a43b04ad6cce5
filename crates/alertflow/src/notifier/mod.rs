//! Per-channel delivery with an audit record for every attempt.

mod channel;
mod email;
mod http;

pub use channel::{ChannelConfig, ChatConfig, EmailConfig, ForwardConfig, WebhookConfig};
pub use email::build_message;
pub use self::http::{alertmanager_payload, dingtalk_payload, severity_color, slack_payload, webhook_payload};

use async_trait::async_trait;
use chrono::Utc;
use futures::{future::join_all, FutureExt};
use reqwest::Client;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    alert::UnifiedAlert,
    dispatcher::TaskHandler,
    metrics,
    router::{default_route, Router},
    store::{NotificationRecord, NotificationStatus, Store},
    template::TemplateRenderer,
    Error, Result,
};

pub struct Notifier {
    store: Arc<dyn Store>,
    client: Client,
    templates: TemplateRenderer,
    timeout: Duration,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            store,
            client,
            templates: TemplateRenderer::new()?,
            timeout,
        })
    }

    /// Delivers one alert to one channel. A pending record is written first
    /// and always finished as `sent` or `failed`.
    pub async fn send(&self, alert: &UnifiedAlert, channel: &ChannelConfig) -> Result<()> {
        self.record_delivery(alert, channel, self.dispatch(alert, channel)).await
    }

    async fn record_delivery(
        &self,
        alert: &UnifiedAlert,
        channel: &ChannelConfig,
        delivery: impl Future<Output = Result<()>>,
    ) -> Result<()> {
        info!("Sending notification for alert {} via {}", alert.id, channel.channel_type());

        let mut record = NotificationRecord {
            id: Uuid::new_v4().to_string(),
            alert_id: alert.id.clone(),
            channel: channel.channel_type().to_string(),
            channel_config: channel.snapshot(),
            status: NotificationStatus::Pending,
            sent_at: None,
            error_message: None,
            payload: serde_json::to_value(alert).unwrap_or_default(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create_notification(&record).await {
            error!("Failed to create notification record for {}: {}", alert.id, e);
        }

        let result = match AssertUnwindSafe(delivery).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(Error::Notification(format!(
                "{} sender panicked",
                channel.channel_type()
            ))),
        };

        match &result {
            Ok(()) => {
                record.status = NotificationStatus::Sent;
                record.sent_at = Some(Utc::now());
                metrics::record_notification(&record.channel, "sent");
            }
            Err(e) => {
                warn!("Notification via {} failed for alert {}: {}", record.channel, alert.id, e);
                record.status = NotificationStatus::Failed;
                record.error_message = Some(e.to_string());
                metrics::record_notification(&record.channel, "failed");
            }
        }
        if let Err(e) = self.store.upsert_notification(&record).await {
            error!("Failed to update notification status for {}: {}", alert.id, e);
        }

        result
    }

    async fn dispatch(&self, alert: &UnifiedAlert, channel: &ChannelConfig) -> Result<()> {
        match channel {
            ChannelConfig::Webhook(config) => http::send_webhook(&self.client, config, alert).await,
            ChannelConfig::Email(config) => {
                email::send_email(&self.templates, config, alert, self.timeout).await
            }
            ChannelConfig::DingTalk(config) => http::send_dingtalk(&self.client, config, alert).await,
            ChannelConfig::WeChat(_) => {
                info!("WeChat delivery requested for alert {}", alert.id);
                Err(Error::Notification("WeChat notification not implemented".to_string()))
            }
            ChannelConfig::Slack(config) => http::send_slack(&self.client, config, alert).await,
            ChannelConfig::AlertManager(config) => {
                http::send_alertmanager(&self.client, config, alert).await
            }
            ChannelConfig::Unsupported { reason, .. } => Err(Error::Notification(reason.clone())),
        }
    }
}

/// Routes a firing alert and fans it out to every channel of every route.
pub struct NotificationService {
    router: Router,
    notifier: Notifier,
    default_webhook_url: String,
}

impl NotificationService {
    pub fn new(router: Router, notifier: Notifier, default_webhook_url: impl Into<String>) -> Self {
        Self {
            router,
            notifier,
            default_webhook_url: default_webhook_url.into(),
        }
    }

    pub async fn notify(&self, alert: &UnifiedAlert) {
        let routes = match self.router.routes_for_alert(alert).await {
            Ok(routes) => routes,
            Err(e) => {
                warn!("Route lookup failed for alert {}, using default route: {}", alert.id, e);
                Vec::new()
            }
        };
        let mut channels: Vec<ChannelConfig> =
            routes.into_iter().flat_map(|route| route.channels).collect();
        if channels.is_empty() {
            debug!("No channels configured for alert {}, using default route", alert.id);
            channels = default_route(&self.default_webhook_url).channels;
        }

        let sends = channels.iter().map(|channel| self.notifier.send(alert, channel));
        let results = join_all(sends).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Delivered alert {} to {} of {} channels",
            alert.id,
            results.len() - failed,
            results.len()
        );
    }
}

#[async_trait]
impl TaskHandler<UnifiedAlert> for NotificationService {
    async fn handle(&self, alert: UnifiedAlert) {
        self.notify(&alert).await;
    }
}
