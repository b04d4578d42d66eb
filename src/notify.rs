use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{info, warn};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::{
    config::{DingTalkConfig, FeishuConfig},
    error::MonitorError,
};

pub const DINGTALK_ENDPOINT: &str = "https://oapi.dingtalk.com/robot/send";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

/// A chat-bot channel that can carry a plain-text message.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, title: &str, content: &str) -> anyhow::Result<()>;
}

fn webhook_client() -> anyhow::Result<Client> {
    Ok(ClientBuilder::new().timeout(WEBHOOK_TIMEOUT).build()?)
}

fn hmac_base64(key: &[u8], message: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(key).context("invalid HMAC key")?;
    mac.update(message);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// DingTalk signature: HMAC-SHA256 keyed by the secret over `"<ms>\n<secret>"`.
pub fn dingtalk_sign(timestamp_ms: i64, secret: &str) -> anyhow::Result<String> {
    hmac_base64(
        secret.as_bytes(),
        format!("{timestamp_ms}\n{secret}").as_bytes(),
    )
}

/// Feishu signature: HMAC-SHA256 keyed by `"<secs>\n<secret>"` over nothing.
pub fn feishu_sign(timestamp_secs: i64, secret: &str) -> anyhow::Result<String> {
    hmac_base64(format!("{timestamp_secs}\n{secret}").as_bytes(), b"")
}

#[derive(Debug, Deserialize)]
struct DingTalkReply {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

pub struct DingTalkNotifier {
    client: Client,
    config: DingTalkConfig,
}

impl DingTalkNotifier {
    pub fn new(config: DingTalkConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: webhook_client()?,
            config,
        })
    }
}

#[async_trait]
impl Notifier for DingTalkNotifier {
    fn name(&self) -> &str {
        "dingtalk"
    }

    async fn notify(&self, title: &str, content: &str) -> anyhow::Result<()> {
        let timestamp = Utc::now().timestamp_millis();
        let sign = dingtalk_sign(timestamp, &self.config.secret)?;
        let timestamp = timestamp.to_string();
        let body = json!({
            "msgtype": "text",
            "text": { "content": format!("{title}\n{content}") },
        });
        let reply: DingTalkReply = self
            .client
            .post(DINGTALK_ENDPOINT)
            .query(&[
                ("access_token", self.config.token.as_str()),
                ("timestamp", timestamp.as_str()),
                ("sign", sign.as_str()),
            ])
            .json(&body)
            .send()
            .await
            .context("DingTalk robot unreachable")?
            .error_for_status()?
            .json()
            .await?;
        if reply.errcode != 0 {
            anyhow::bail!("DingTalk rejected message: {} {}", reply.errcode, reply.errmsg);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FeishuReply {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

pub struct FeishuNotifier {
    client: Client,
    config: FeishuConfig,
}

impl FeishuNotifier {
    pub fn new(config: FeishuConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: webhook_client()?,
            config,
        })
    }
}

#[async_trait]
impl Notifier for FeishuNotifier {
    fn name(&self) -> &str {
        "feishu"
    }

    async fn notify(&self, title: &str, content: &str) -> anyhow::Result<()> {
        let timestamp = Utc::now().timestamp();
        let body = json!({
            "timestamp": timestamp.to_string(),
            "sign": feishu_sign(timestamp, &self.config.secret)?,
            "msg_type": "text",
            "content": { "text": format!("{title}\n{content}") },
        });
        let reply: FeishuReply = self
            .client
            .post(&self.config.webhook_url)
            .json(&body)
            .send()
            .await
            .context("Feishu robot unreachable")?
            .error_for_status()?
            .json()
            .await?;
        if reply.code != 0 {
            anyhow::bail!("Feishu rejected message: {} {}", reply.code, reply.msg);
        }
        Ok(())
    }
}

/// Fans a message out to the mandatory channel and any optional ones.
#[derive(Default)]
pub struct NotificationDispatcher {
    primary: Option<Box<dyn Notifier>>,
    secondary: Vec<Box<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(primary: Option<Box<dyn Notifier>>, secondary: Vec<Box<dyn Notifier>>) -> Self {
        Self { primary, secondary }
    }

    pub fn from_config(
        dingtalk: Option<&DingTalkConfig>,
        feishu: Option<&FeishuConfig>,
    ) -> anyhow::Result<Self> {
        let primary = match dingtalk {
            Some(config) => {
                Some(Box::new(DingTalkNotifier::new(config.clone())?) as Box<dyn Notifier>)
            }
            None => {
                warn!("DD_BOT_TOKEN/DD_BOT_SECRET not set, notifications will only be logged");
                None
            }
        };
        let mut secondary: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(config) = feishu {
            secondary.push(Box::new(FeishuNotifier::new(config.clone())?));
        }
        Ok(Self::new(primary, secondary))
    }

    /// Mandatory channel only. Its failure is the caller's problem.
    pub async fn send_primary(&self, title: &str, content: &str) -> Result<(), MonitorError> {
        let Some(primary) = &self.primary else {
            return Ok(());
        };
        primary
            .notify(title, content)
            .await
            .map_err(|e| MonitorError::Notification(format!("{}: {e:#}", primary.name())))?;
        info!("Notification delivered via {}", primary.name());
        Ok(())
    }

    /// Every channel. Optional channels only log their failures.
    pub async fn send(&self, title: &str, content: &str) -> Result<(), MonitorError> {
        self.send_primary(title, content).await?;
        for notifier in &self.secondary {
            match notifier.notify(title, content).await {
                Ok(()) => info!("Notification delivered via {}", notifier.name()),
                Err(e) => warn!("{} notification failed: {e:#}", notifier.name()),
            }
        }
        Ok(())
    }
}
