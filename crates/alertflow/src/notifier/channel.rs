use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

/// Accepts either a JSON array of strings or one comma-separated string.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Joined(String),
    }

    let items = match Option::<ListOrString>::deserialize(deserializer)? {
        Some(ListOrString::List(items)) => items,
        Some(ListOrString::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        None => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default, deserialize_with = "string_list")]
    pub to: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub cc: Vec<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_true")]
    pub use_starttls: bool,
    #[serde(default)]
    pub skip_verify: bool,
}

/// Incoming-webhook style chat integrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub url: String,
}

/// A notification channel, decoded once from its `{type, config}` JSON form.
/// Decoding never fails: bad entries become `Unsupported` and are reported
/// as failed deliveries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum ChannelConfig {
    Webhook(WebhookConfig),
    Email(EmailConfig),
    DingTalk(ChatConfig),
    WeChat(ChatConfig),
    Slack(ChatConfig),
    AlertManager(ForwardConfig),
    Unsupported { channel_type: String, reason: String },
}

fn decode_config<T: for<'de> Deserialize<'de>>(channel_type: &str, config: &JsonValue) -> Result<T, String> {
    let config = if config.is_null() {
        JsonValue::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(config).map_err(|e| format!("invalid {} channel config: {}", channel_type, e))
}

fn require(value: &str, message: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(message.to_string())
    } else {
        Ok(())
    }
}

impl ChannelConfig {
    pub fn webhook(url: impl Into<String>) -> Self {
        ChannelConfig::Webhook(WebhookConfig {
            url: url.into(),
            headers: HashMap::new(),
        })
    }

    pub fn decode(value: &JsonValue) -> Self {
        let channel_type = value
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let config = value.get("config").unwrap_or(&JsonValue::Null);

        let decoded = match channel_type.as_str() {
            "webhook" => decode_config::<WebhookConfig>(&channel_type, config).and_then(|c| {
                require(&c.url, "webhook URL not configured")?;
                Ok(ChannelConfig::Webhook(c))
            }),
            "email" => decode_config::<EmailConfig>(&channel_type, config).and_then(|c| {
                require(&c.smtp_host, "smtp_host is required")?;
                require(&c.from, "from email address is required")?;
                if c.to.is_empty() {
                    return Err("at least one recipient (to) is required".to_string());
                }
                Ok(ChannelConfig::Email(c))
            }),
            "dingtalk" => decode_config::<ChatConfig>(&channel_type, config).and_then(|c| {
                require(&c.webhook_url, "DingTalk webhook URL not configured")?;
                Ok(ChannelConfig::DingTalk(c))
            }),
            // No delivery is implemented for WeChat, so an empty URL is accepted.
            "wechat" => decode_config::<ChatConfig>(&channel_type, config).map(ChannelConfig::WeChat),
            "slack" => decode_config::<ChatConfig>(&channel_type, config).and_then(|c| {
                require(&c.webhook_url, "Slack webhook URL not configured")?;
                Ok(ChannelConfig::Slack(c))
            }),
            "alertmanager" => decode_config::<ForwardConfig>(&channel_type, config).and_then(|c| {
                require(&c.url, "AlertManager URL not configured")?;
                Ok(ChannelConfig::AlertManager(c))
            }),
            "" => Err("channel type missing".to_string()),
            other => Err(format!("unsupported notification channel: {}", other)),
        };

        decoded.unwrap_or_else(|reason| ChannelConfig::Unsupported {
            channel_type: if channel_type.is_empty() {
                "unknown".to_string()
            } else {
                channel_type
            },
            reason,
        })
    }

    /// Channel name as stored on notification records.
    pub fn channel_type(&self) -> &str {
        match self {
            ChannelConfig::Webhook(_) => "webhook",
            ChannelConfig::Email(_) => "email",
            ChannelConfig::DingTalk(_) => "dingtalk",
            ChannelConfig::WeChat(_) => "wechat",
            ChannelConfig::Slack(_) => "slack",
            ChannelConfig::AlertManager(_) => "alertmanager",
            ChannelConfig::Unsupported { channel_type, .. } => channel_type,
        }
    }

    /// Serialized form for audit records. Secrets are omitted.
    pub fn snapshot(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

impl<'de> Deserialize<'de> for ChannelConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(ChannelConfig::decode(&value))
    }
}
