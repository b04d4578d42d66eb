use std::{fmt, path::PathBuf, str::FromStr};

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

use crate::error::MonitorError;

pub const DEFAULT_PORTAL_BASE_URL: &str = "http://zhjw.qfnu.edu.cn";
pub const DEFAULT_SEMESTER: &str = "2024-2025-2";
pub const DEFAULT_CAPTCHA_OCR_URL: &str = "http://127.0.0.1:9898/ocr";

/// The env vars read at startup. Everything optional here is validated
/// into a [`MonitorConfig`].
#[derive(Debug, Default, Deserialize)]
pub struct MonitorEnv {
    #[serde(default = "default_account_index")]
    pub account_index: String,
    pub user_account_1: Option<String>,
    pub user_password_1: Option<String>,
    pub user_account_2: Option<String>,
    pub user_password_2: Option<String>,
    pub semester: Option<String>,
    pub dd_bot_token: Option<String>,
    pub dd_bot_secret: Option<String>,
    pub feishu_bot_url: Option<String>,
    pub feishu_bot_secret: Option<String>,
    pub portal_base_url: Option<String>,
    pub captcha_ocr_url: Option<String>,
    pub data_dir: Option<PathBuf>,
}

fn default_account_index() -> String {
    "1".to_string()
}

/// Which of the two configured accounts this process watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountIndex {
    First,
    Second,
}

impl FromStr for AccountIndex {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(AccountIndex::First),
            "2" => Ok(AccountIndex::Second),
            other => Err(MonitorError::Configuration(format!(
                "ACCOUNT_INDEX必须为1或2，当前为{other:?}"
            ))),
        }
    }
}

impl fmt::Display for AccountIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountIndex::First => write!(f, "1"),
            AccountIndex::Second => write!(f, "2"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub secret: String,
}

impl Credentials {
    /// First two characters of the account, the rest starred out.
    pub fn masked_account(&self) -> String {
        let visible: String = self.account.chars().take(2).collect();
        let hidden = self.account.chars().count().saturating_sub(2);
        format!("{visible}{}", "*".repeat(hidden))
    }

    pub fn masked_secret(&self) -> String {
        "*".repeat(self.secret.chars().count())
    }
}

// Never print the secret, not even in debug output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.masked_account())
            .field("secret", &self.masked_secret())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub base_url: String,
}

impl PortalConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone)]
pub struct DingTalkConfig {
    pub token: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct FeishuConfig {
    pub webhook_url: String,
    pub secret: String,
}

/// Validated configuration for one account run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub account_index: AccountIndex,
    pub credentials: Credentials,
    pub semester: String,
    pub portal: PortalConfig,
    pub captcha_ocr_url: String,
    pub dingtalk: Option<DingTalkConfig>,
    pub feishu: Option<FeishuConfig>,
    pub data_dir: PathBuf,
}

impl MonitorConfig {
    pub fn load() -> Result<Self, MonitorError> {
        let env = MonitorEnv::load_from_env()
            .map_err(|e| MonitorError::Configuration(format!("{e:#}")))?;
        Self::from_env(env)
    }

    pub fn from_env(env: MonitorEnv) -> Result<Self, MonitorError> {
        let account_index: AccountIndex = env.account_index.parse()?;
        let (account, secret) = match account_index {
            AccountIndex::First => (env.user_account_1, env.user_password_1),
            AccountIndex::Second => (env.user_account_2, env.user_password_2),
        };
        let credentials = match (non_empty(account), non_empty(secret)) {
            (Some(account), Some(secret)) => Credentials { account, secret },
            _ => {
                return Err(MonitorError::Configuration(format!(
                    "请设置账号{account_index}的USER_ACCOUNT_{account_index}和USER_PASSWORD_{account_index}"
                )));
            }
        };

        let dingtalk = match (non_empty(env.dd_bot_token), non_empty(env.dd_bot_secret)) {
            (Some(token), Some(secret)) => Some(DingTalkConfig { token, secret }),
            _ => None,
        };
        let feishu = match (
            non_empty(env.feishu_bot_url),
            non_empty(env.feishu_bot_secret),
        ) {
            (Some(webhook_url), Some(secret)) => Some(FeishuConfig {
                webhook_url,
                secret,
            }),
            _ => None,
        };

        Ok(Self {
            account_index,
            credentials,
            semester: non_empty(env.semester).unwrap_or_else(|| DEFAULT_SEMESTER.to_string()),
            portal: PortalConfig {
                base_url: non_empty(env.portal_base_url)
                    .unwrap_or_else(|| DEFAULT_PORTAL_BASE_URL.to_string()),
            },
            captcha_ocr_url: non_empty(env.captcha_ocr_url)
                .unwrap_or_else(|| DEFAULT_CAPTCHA_OCR_URL.to_string()),
            dingtalk,
            feishu,
            data_dir: env.data_dir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
