//! Adobe IMS client-credentials exchange and the cached-token lifecycle.
//!
//! The settings store is the system of record for the cached token; this
//! module reads through it and writes every fresh token back before handing
//! it out.

use askdata::credentials::{AdobeCredentials, CachedToken, SettingsStore};
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::{join_url, SCOPE, TOKEN_PATH, TOKEN_REFRESH_MARGIN_MS};
use crate::error::AdobeError;

/// Source of "now" in milliseconds since the Unix epoch.
pub type Clock = fn() -> i64;

fn system_clock() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whether a token must be refreshed before use.
///
/// A token with `TOKEN_REFRESH_MARGIN_MS` or less left counts as expired, so
/// it cannot lapse in the middle of the request that follows.
pub fn is_token_expired(expires_at: Option<i64>, now_ms: i64) -> bool {
    match expires_at {
        Some(expires_at) => expires_at.saturating_sub(now_ms) <= TOKEN_REFRESH_MARGIN_MS,
        None => true,
    }
}

/// Absolute expiry for a token issued `now_ms` with `expires_in` seconds of life.
///
/// `None` for a negative lifetime or one that overflows the millisecond clock.
pub fn calculate_token_expiration(expires_in: i64, now_ms: i64) -> Option<i64> {
    if expires_in < 0 {
        return None;
    }
    expires_in
        .checked_mul(1000)
        .and_then(|lifetime_ms| now_ms.checked_add(lifetime_ms))
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    scope: &'a str,
}

/// Successful IMS token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// IMS error body.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn message(self) -> String {
        match (self.error, self.error_description) {
            (Some(error), Some(description)) => format!("{}: {}", error, description),
            (Some(error), None) => error,
            (None, Some(description)) => description,
            (None, None) => "Unknown error".to_string(),
        }
    }
}

/// Obtains, caches and refreshes Adobe access tokens per owner.
///
/// Without a refresh lease, two callers that both see an expired token both
/// exchange and the last write wins; both tokens stay valid until their own
/// expiry. [`TokenManager::with_refresh_lease`] serializes refreshes per owner
/// so only the first caller hits IMS.
pub struct TokenManager {
    store: Arc<SettingsStore>,
    http: Client,
    token_url: String,
    clock: Clock,
    refresh_leases: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(store: Arc<SettingsStore>, http: Client, ims_url: &str) -> Self {
        Self {
            store,
            http,
            token_url: join_url(ims_url, TOKEN_PATH),
            clock: system_clock,
            refresh_leases: None,
        }
    }

    /// Serialize refreshes for the same owner.
    pub fn with_refresh_lease(mut self) -> Self {
        self.refresh_leases = Some(DashMap::new());
        self
    }

    /// Replace the wall clock (tests pin "now" to check expiry boundaries).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Return a usable access token for `owner`, refreshing it if needed.
    ///
    /// A cached token with more than the refresh margin left is returned
    /// without touching the network. Otherwise a new token is exchanged,
    /// persisted, and returned. Failures are not retried.
    pub async fn get_valid_token(
        &self,
        owner: &str,
        credentials: &AdobeCredentials,
    ) -> Result<String, AdobeError> {
        if let Some(field) = credentials.missing_field() {
            return Err(AdobeError::Configuration(format!(
                "Adobe Analytics configuration incomplete: missing {}",
                field
            )));
        }

        if let Some(token) = self.fresh_cached_token(owner)? {
            debug!(user_id = %owner, "Using cached Adobe access token");
            return Ok(token.access_token);
        }

        let Some(leases) = &self.refresh_leases else {
            return self.refresh(owner, credentials).await;
        };

        let lease = leases
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let outcome = self.refresh_under_lease(&lease, owner, credentials).await;

        // Drop the entry once no other caller holds or waits on it
        drop(lease);
        leases.remove_if(owner, |_, lease| Arc::strong_count(lease) == 1);

        outcome
    }

    async fn refresh_under_lease(
        &self,
        lease: &Mutex<()>,
        owner: &str,
        credentials: &AdobeCredentials,
    ) -> Result<String, AdobeError> {
        let _guard = lease.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.fresh_cached_token(owner)? {
            debug!(user_id = %owner, "Token refreshed by concurrent caller");
            return Ok(token.access_token);
        }

        self.refresh(owner, credentials).await
    }

    fn fresh_cached_token(&self, owner: &str) -> Result<Option<CachedToken>, AdobeError> {
        let cached = self.store.load_token(owner).map_err(AdobeError::storage)?;
        let now = (self.clock)();
        Ok(cached.filter(|token| !is_token_expired(Some(token.expires_at), now)))
    }

    async fn refresh(
        &self,
        owner: &str,
        credentials: &AdobeCredentials,
    ) -> Result<String, AdobeError> {
        debug!(user_id = %owner, "Cached Adobe token missing or expiring, refreshing");

        let response = self.request_access_token(credentials).await?;
        let expires_at = calculate_token_expiration(response.expires_in, (self.clock)())
            .ok_or_else(|| {
                AdobeError::InvalidResponse(format!(
                    "token response: unusable expires_in {}",
                    response.expires_in
                ))
            })?;
        let token = CachedToken {
            access_token: response.access_token,
            expires_at,
        };

        let stored = self
            .store
            .store_token(owner, &token)
            .map_err(AdobeError::storage)?;
        if !stored {
            warn!(user_id = %owner, "No settings row to cache Adobe token in");
        }

        info!(
            user_id = %owner,
            expires_at = token.expires_at,
            "Adobe access token refreshed"
        );

        Ok(token.access_token)
    }

    /// Perform one client-credentials exchange against IMS.
    pub async fn request_access_token(
        &self,
        credentials: &AdobeCredentials,
    ) -> Result<TokenResponse, AdobeError> {
        let form = TokenRequest {
            grant_type: "client_credentials",
            client_id: &credentials.client_id,
            client_secret: &credentials.client_secret,
            scope: SCOPE,
        };

        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(AdobeError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(AdobeError::transport)?;
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .unwrap_or_default()
                .message();
            warn!(status = %status, error = %message, "Adobe token exchange rejected");
            return Err(AdobeError::Auth(message));
        }

        let body = response.bytes().await.map_err(AdobeError::transport)?;
        serde_json::from_slice(&body)
            .map_err(|e| AdobeError::InvalidResponse(format!("token response: {}", e)))
    }
}
