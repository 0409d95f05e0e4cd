//! Settings storage using SQLite.
//!
//! One `user_settings` row per user holds the analytics credentials (secret
//! encrypted), the cached access token (encrypted) and the LLM selection.
//! `api_usage` is an append-only metering log.

use super::{
    AdobeSettingsInput, AnalyticsPlatform, CachedToken, Encryptor, LlmProvider, UsageRecord,
    UserSettings,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SETTINGS_COLUMNS: &str = r#"
    id, user_id, created_at, updated_at, analytics_platform,
    adobe_client_id, adobe_client_secret_encrypted, adobe_org_id,
    adobe_company_id, adobe_report_suite_id,
    adobe_access_token_encrypted, adobe_token_expires_at,
    selected_llm, llm_api_key_encrypted
"#;

/// Encrypted settings storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE user_settings (
///     id TEXT PRIMARY KEY,
///     user_id TEXT NOT NULL UNIQUE,
///     created_at TEXT NOT NULL,                 -- RFC 3339
///     updated_at TEXT NOT NULL,                 -- RFC 3339
///     analytics_platform TEXT,
///     adobe_client_id TEXT,
///     adobe_client_secret_encrypted TEXT,       -- Encrypted
///     adobe_org_id TEXT,
///     adobe_company_id TEXT,
///     adobe_report_suite_id TEXT,
///     adobe_access_token_encrypted TEXT,        -- Encrypted
///     adobe_token_expires_at INTEGER,           -- ms since epoch
///     selected_llm TEXT,
///     llm_api_key_encrypted TEXT                -- Encrypted
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - No lock spans a network call; token refresh races resolve as last writer wins
pub struct SettingsStore {
    conn: Mutex<Connection>,
    encryptor: Encryptor,
}

impl SettingsStore {
    /// Creates or opens a settings store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let encryptor = Encryptor::from_base64(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_settings (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                analytics_platform TEXT,
                adobe_client_id TEXT,
                adobe_client_secret_encrypted TEXT,
                adobe_org_id TEXT,
                adobe_company_id TEXT,
                adobe_report_suite_id TEXT,
                adobe_access_token_encrypted TEXT,
                adobe_token_expires_at INTEGER,
                selected_llm TEXT,
                llm_api_key_encrypted TEXT
            );

            CREATE TABLE IF NOT EXISTS api_usage (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                analytics_platform TEXT NOT NULL,
                llm_provider TEXT NOT NULL,
                llm_tokens_used INTEGER NOT NULL,
                analytics_api_calls INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_api_usage_user ON api_usage(user_id);
            "#,
        )
        .context("Failed to create settings schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryptor,
        })
    }

    /// Encryptor for secrets in rows returned by this store.
    pub fn encryptor(&self) -> &Encryptor {
        &self.encryptor
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Settings database lock poisoned"))
    }

    /// Retrieves the settings row for a user.
    ///
    /// `Ok(None)` means the user never saved settings, which is distinct from
    /// a row whose analytics fields are all null.
    pub fn get(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM user_settings WHERE user_id = ?1", SETTINGS_COLUMNS);
        conn.query_row(&sql, params![user_id], read_settings_row)
            .optional()
            .context("Failed to load settings")
    }

    /// Saves Adobe credentials, creating the row if needed.
    ///
    /// The secret is encrypted before it touches the database. Any cached
    /// token is dropped since it was issued for the previous credentials.
    pub fn save_adobe(&self, user_id: &str, input: &AdobeSettingsInput) -> Result<()> {
        let secret_encrypted = self
            .encryptor
            .encrypt(&input.client_secret)
            .context("Failed to encrypt client secret")?;
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO user_settings (
                    id, user_id, created_at, updated_at, analytics_platform,
                    adobe_client_id, adobe_client_secret_encrypted, adobe_org_id,
                    adobe_company_id, adobe_report_suite_id,
                    adobe_access_token_encrypted, adobe_token_expires_at
                )
                VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL)
                ON CONFLICT(user_id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    analytics_platform = excluded.analytics_platform,
                    adobe_client_id = excluded.adobe_client_id,
                    adobe_client_secret_encrypted = excluded.adobe_client_secret_encrypted,
                    adobe_org_id = excluded.adobe_org_id,
                    adobe_company_id = excluded.adobe_company_id,
                    adobe_report_suite_id = excluded.adobe_report_suite_id,
                    adobe_access_token_encrypted = NULL,
                    adobe_token_expires_at = NULL
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    now,
                    AnalyticsPlatform::AdobeAnalytics.as_str(),
                    input.client_id,
                    secret_encrypted,
                    input.org_id,
                    input.company_id,
                    input.report_suite_id,
                ],
            )
            .context("Failed to save Adobe settings")?;

        Ok(())
    }

    /// Saves the LLM provider selection and its encrypted API key.
    pub fn save_llm(&self, user_id: &str, provider: LlmProvider, api_key: &str) -> Result<()> {
        let key_encrypted = self
            .encryptor
            .encrypt(api_key)
            .context("Failed to encrypt LLM API key")?;
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO user_settings (
                    id, user_id, created_at, updated_at, selected_llm, llm_api_key_encrypted
                )
                VALUES (?1, ?2, ?3, ?3, ?4, ?5)
                ON CONFLICT(user_id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    selected_llm = excluded.selected_llm,
                    llm_api_key_encrypted = excluded.llm_api_key_encrypted
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    now,
                    provider.as_str(),
                    key_encrypted,
                ],
            )
            .context("Failed to save LLM settings")?;

        Ok(())
    }

    /// Deletes a user's settings row.
    ///
    /// Returns `Ok(false)` if there was nothing to delete.
    pub fn delete(&self, user_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM user_settings WHERE user_id = ?1",
                params![user_id],
            )
            .context("Failed to delete settings")?;

        Ok(rows_affected > 0)
    }

    /// Loads the cached Adobe access token for a user.
    ///
    /// A token that no longer decrypts is reported as absent so the caller
    /// simply fetches a new one.
    pub fn load_token(&self, user_id: &str) -> Result<Option<CachedToken>> {
        let row: Option<(Option<String>, Option<i64>)> = self
            .conn()?
            .query_row(
                r#"
                SELECT adobe_access_token_encrypted, adobe_token_expires_at
                FROM user_settings WHERE user_id = ?1
                "#,
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to load cached token")?;

        let Some((encrypted, Some(expires_at))) = row else {
            return Ok(None);
        };

        Ok(self
            .encryptor
            .safe_decrypt(encrypted.as_deref())
            .map(|access_token| CachedToken {
                access_token,
                expires_at,
            }))
    }

    /// Replaces the cached token for a user.
    ///
    /// Both columns are written in one statement so a reader never sees a new
    /// token with an old expiry. Returns `Ok(false)` when the user has no row.
    pub fn store_token(&self, user_id: &str, token: &CachedToken) -> Result<bool> {
        let encrypted = self
            .encryptor
            .encrypt(&token.access_token)
            .context("Failed to encrypt access token")?;

        let rows_affected = self
            .conn()?
            .execute(
                r#"
                UPDATE user_settings
                SET adobe_access_token_encrypted = ?1,
                    adobe_token_expires_at = ?2,
                    updated_at = ?3
                WHERE user_id = ?4
                "#,
                params![encrypted, token.expires_at, Utc::now().to_rfc3339(), user_id],
            )
            .context("Failed to store access token")?;

        Ok(rows_affected > 0)
    }

    /// Appends a usage record.
    pub fn record_usage(
        &self,
        user_id: &str,
        platform: AnalyticsPlatform,
        llm_provider: &str,
        llm_tokens_used: i64,
        analytics_api_calls: i64,
    ) -> Result<UsageRecord> {
        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            analytics_platform: platform,
            llm_provider: llm_provider.to_string(),
            llm_tokens_used,
            analytics_api_calls,
        };

        self.conn()?
            .execute(
                r#"
                INSERT INTO api_usage (
                    id, user_id, created_at, analytics_platform,
                    llm_provider, llm_tokens_used, analytics_api_calls
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    record.id,
                    record.user_id,
                    record.created_at.to_rfc3339(),
                    record.analytics_platform.as_str(),
                    record.llm_provider,
                    record.llm_tokens_used,
                    record.analytics_api_calls,
                ],
            )
            .context("Failed to record usage")?;

        Ok(record)
    }

    /// Lists a user's usage records, oldest first.
    pub fn list_usage(&self, user_id: &str) -> Result<Vec<UsageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, user_id, created_at, analytics_platform,
                       llm_provider, llm_tokens_used, analytics_api_calls
                FROM api_usage
                WHERE user_id = ?1
                ORDER BY rowid
                "#,
            )
            .context("Failed to prepare query")?;

        let records = stmt
            .query_map(params![user_id], |row| {
                let platform: String = row.get(3)?;
                Ok(UsageRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: parse_timestamp(row, 2)?,
                    analytics_platform: AnalyticsPlatform::parse(&platform).ok_or_else(|| {
                        invalid_column(3, format!("unknown analytics platform '{}'", platform))
                    })?,
                    llm_provider: row.get(4)?,
                    llm_tokens_used: row.get(5)?,
                    analytics_api_calls: row.get(6)?,
                })
            })
            .context("Failed to execute query")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read results")?;

        Ok(records)
    }
}

fn read_settings_row(row: &Row<'_>) -> rusqlite::Result<UserSettings> {
    let platform: Option<String> = row.get(4)?;
    let llm: Option<String> = row.get(12)?;

    Ok(UserSettings {
        id: row.get(0)?,
        user_id: row.get(1)?,
        created_at: parse_timestamp(row, 2)?,
        updated_at: parse_timestamp(row, 3)?,
        analytics_platform: platform.as_deref().and_then(AnalyticsPlatform::parse),
        adobe_client_id: row.get(5)?,
        adobe_client_secret_encrypted: row.get(6)?,
        adobe_org_id: row.get(7)?,
        adobe_company_id: row.get(8)?,
        adobe_report_suite_id: row.get(9)?,
        adobe_access_token_encrypted: row.get(10)?,
        adobe_token_expires_at: row.get(11)?,
        selected_llm: llm.as_deref().and_then(LlmProvider::parse),
        llm_api_key_encrypted: row.get(13)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid_column(idx, e.to_string()))
}

fn invalid_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
