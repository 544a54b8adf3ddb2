//! Typed settings, read from a JSON file. Every section falls back to defaults so a
//! minimal file only needs the mailbox account and payee handles.

use crate::domain::ports::MailboxConfigSource;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mailbox: MailboxSettings,
    pub schedule: ScheduleSettings,
    pub links: LinkSettings,
}

/// How `MailboxSettings::encrypted_secret` is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretCipherKind {
    #[default]
    Plain,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxSettings {
    pub host: String,
    pub port: u16,
    pub account: String,
    /// Password as produced by `secret_cipher`.
    pub encrypted_secret: String,
    pub secret_cipher: SecretCipherKind,
    pub folder: String,
    /// Handled messages are moved here after being marked read.
    pub processed_folder: Option<String>,
    pub timeout_secs: u64,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 993,
            account: String::new(),
            encrypted_secret: String::new(),
            secret_cipher: SecretCipherKind::default(),
            folder: "INBOX".to_string(),
            processed_folder: None,
            timeout_secs: 30,
        }
    }
}

impl MailboxSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub interval_secs: u64,
    pub first_reminder_after_secs: u64,
    pub reminder_every_secs: u64,
    pub max_attempts: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            first_reminder_after_secs: 30 * 60,
            reminder_every_secs: 60 * 60,
            max_attempts: 48,
        }
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub product_name: String,
    pub venmo_handle: Option<String>,
    pub paypal_handle: Option<String>,
    pub cashtag: Option<String>,
    pub venmo_scheme: String,
    pub paypal_domain: String,
    pub cash_domain: String,
    /// Minimum edge length of rendered QR codes, in pixels.
    pub qr_size: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            product_name: "Shop".to_string(),
            venmo_handle: None,
            paypal_handle: None,
            cashtag: None,
            venmo_scheme: "venmo".to_string(),
            paypal_domain: "paypal.me".to_string(),
            cash_domain: "cash.app".to_string(),
            qr_size: 240,
        }
    }
}

impl Settings {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        if s.interval_secs == 0 {
            return Err(PaymentError::Config("schedule.interval_secs must be > 0".into()));
        }
        if s.max_attempts == 0 {
            return Err(PaymentError::Config("schedule.max_attempts must be > 0".into()));
        }
        if s.first_reminder_after_secs < s.interval_secs || s.reminder_every_secs < s.interval_secs
        {
            return Err(PaymentError::Config(
                "reminder spacing must be at least one polling interval".into(),
            ));
        }
        if self.mailbox.timeout_secs == 0 {
            return Err(PaymentError::Config("mailbox.timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Serves the mailbox section of already-loaded settings.
#[derive(Debug, Clone)]
pub struct StaticMailboxConfig(pub MailboxSettings);

#[async_trait]
impl MailboxConfigSource for StaticMailboxConfig {
    async fn mailbox_settings(&self) -> Result<MailboxSettings> {
        Ok(self.0.clone())
    }
}
