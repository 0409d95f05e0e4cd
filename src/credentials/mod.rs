//! Encrypted per-user settings: analytics credentials, cached access token,
//! LLM provider selection and usage metering.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       SettingsStore                      │
//! │  - one settings row per user             │
//! │  - cached token read/write               │
//! │  - usage metering                        │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Encryptor (AES-256-GCM)            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use askdata::credentials::{AdobeSettingsInput, SettingsStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("ASKDATA_ENCRYPTION_KEY")?;
//! let store = SettingsStore::new("askdata.db", &encryption_key)?;
//!
//! store.save_adobe(
//!     "user1",
//!     &AdobeSettingsInput {
//!         client_id: "client".to_string(),
//!         client_secret: "secret".to_string(),
//!         org_id: "ABC123@AdobeOrg".to_string(),
//!         company_id: "acme0".to_string(),
//!         report_suite_id: "acme.prod".to_string(),
//!     },
//! )?;
//!
//! if let Some(settings) = store.get("user1")? {
//!     let credentials = settings.adobe_credentials(store.encryptor())?;
//!     println!("Company: {}", credentials.company_id);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod encryption;
mod storage;

pub use encryption::{validate_key, Encryptor};
pub use storage::SettingsStore;

/// Analytics platform a user has connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsPlatform {
    AdobeAnalytics,
    #[serde(rename = "google_analytics_4")]
    GoogleAnalytics4,
}

impl AnalyticsPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsPlatform::AdobeAnalytics => "adobe_analytics",
            AnalyticsPlatform::GoogleAnalytics4 => "google_analytics_4",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "adobe_analytics" => Some(AnalyticsPlatform::AdobeAnalytics),
            "google_analytics_4" => Some(AnalyticsPlatform::GoogleAnalytics4),
            _ => None,
        }
    }
}

/// LLM provider selected for natural-language queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Claude,
    OpenAi,
    Gemini,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Claude => "claude",
            LlmProvider::OpenAi => "openai",
            LlmProvider::Gemini => "gemini",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "claude" => Some(LlmProvider::Claude),
            "openai" => Some(LlmProvider::OpenAi),
            "gemini" => Some(LlmProvider::Gemini),
            _ => None,
        }
    }
}

/// Adobe Analytics OAuth server-to-server credentials.
///
/// All five fields are required; see [`AdobeCredentials::missing_field`].
#[derive(Clone, PartialEq, Eq)]
pub struct AdobeCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// IMS organization, `...@AdobeOrg`
    pub org_id: String,
    /// Global company id used in every reporting path
    pub company_id: String,
    /// Report suite used when a call does not name one
    pub report_suite_id: String,
}

impl std::fmt::Debug for AdobeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdobeCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("org_id", &self.org_id)
            .field("company_id", &self.company_id)
            .field("report_suite_id", &self.report_suite_id)
            .finish()
    }
}

impl AdobeCredentials {
    /// Name of the first empty field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("org_id", &self.org_id),
            ("company_id", &self.company_id),
            ("report_suite_id", &self.report_suite_id),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Access token cached alongside the credentials it was issued for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    /// Absolute expiry, milliseconds since the Unix epoch
    pub expires_at: i64,
}

/// Why a settings row could not yield usable Adobe credentials.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Adobe Analytics is not the selected analytics platform")]
    WrongPlatform,

    #[error("Adobe Analytics configuration incomplete: missing {0}")]
    MissingField(&'static str),

    #[error("Stored Adobe client secret could not be decrypted")]
    Undecryptable,
}

/// Persisted settings row for one user.
///
/// Secrets only exist here in encrypted form.
#[derive(Clone, Debug, PartialEq)]
pub struct UserSettings {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub analytics_platform: Option<AnalyticsPlatform>,
    pub adobe_client_id: Option<String>,
    pub adobe_client_secret_encrypted: Option<String>,
    pub adobe_org_id: Option<String>,
    pub adobe_company_id: Option<String>,
    pub adobe_report_suite_id: Option<String>,
    pub adobe_access_token_encrypted: Option<String>,
    pub adobe_token_expires_at: Option<i64>,
    pub selected_llm: Option<LlmProvider>,
    pub llm_api_key_encrypted: Option<String>,
}

impl UserSettings {
    /// Decrypt and assemble the Adobe credential set.
    pub fn adobe_credentials(
        &self,
        encryptor: &Encryptor,
    ) -> Result<AdobeCredentials, CredentialsError> {
        if self.analytics_platform != Some(AnalyticsPlatform::AdobeAnalytics) {
            return Err(CredentialsError::WrongPlatform);
        }

        fn required(
            value: &Option<String>,
            name: &'static str,
        ) -> Result<String, CredentialsError> {
            value
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
                .ok_or(CredentialsError::MissingField(name))
        }

        let client_id = required(&self.adobe_client_id, "client_id")?;
        let encrypted_secret = required(&self.adobe_client_secret_encrypted, "client_secret")?;
        let org_id = required(&self.adobe_org_id, "org_id")?;
        let company_id = required(&self.adobe_company_id, "company_id")?;
        let report_suite_id = required(&self.adobe_report_suite_id, "report_suite_id")?;

        let client_secret = encryptor
            .decrypt(&encrypted_secret)
            .map_err(|_| CredentialsError::Undecryptable)?;

        Ok(AdobeCredentials {
            client_id,
            client_secret,
            org_id,
            company_id,
            report_suite_id,
        })
    }
}

/// Adobe fields submitted from the settings form.
#[derive(Clone, Deserialize)]
pub struct AdobeSettingsInput {
    pub client_id: String,
    pub client_secret: String,
    pub org_id: String,
    pub company_id: String,
    pub report_suite_id: String,
}

/// One metered request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub analytics_platform: AnalyticsPlatform,
    /// Provider name, or `none` when no LLM was involved
    pub llm_provider: String,
    pub llm_tokens_used: i64,
    pub analytics_api_calls: i64,
}
