pub mod api;
pub mod auth;
pub mod config;
pub mod schema;
pub mod types;

use askdata::config::AdobeConfig;
use askdata::credentials::{AdobeCredentials, SettingsStore};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::AdobeError;

pub use self::api::AdobeClient;
pub use self::auth::{Clock, TokenManager};
pub use self::schema::SchemaCatalog;

/// Entry point for Adobe Analytics access.
///
/// Holds the shared pieces (settings store, token manager, HTTP client) and
/// hands out a ready [`AdobeClient`] per owner via [`AdobeConnector::initialize`].
pub struct AdobeConnector {
    store: Arc<SettingsStore>,
    tokens: TokenManager,
    http: Client,
    api_url: String,
}

impl AdobeConnector {
    pub fn new(store: Arc<SettingsStore>, config: &AdobeConfig) -> Result<Self, AdobeError> {
        let http = config::build_http_client(Duration::from_secs(config.request_timeout_seconds))?;

        let mut tokens = TokenManager::new(Arc::clone(&store), http.clone(), &config.ims_url);
        if config.serialize_token_refresh {
            tokens = tokens.with_refresh_lease();
        }

        Ok(Self {
            store,
            tokens,
            http,
            api_url: config.api_url.clone(),
        })
    }

    pub fn with_clock(self, clock: Clock) -> Self {
        Self {
            tokens: self.tokens.with_clock(clock),
            ..self
        }
    }

    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.store
    }

    /// Decrypted credentials for `owner`.
    ///
    /// A missing settings row and a row without Adobe selected both read as
    /// "not configured"; a partially filled row names the missing field.
    pub fn load_credentials(&self, owner: &str) -> Result<AdobeCredentials, AdobeError> {
        let settings = self
            .store
            .get(owner)
            .map_err(AdobeError::storage)?
            .ok_or_else(AdobeError::not_configured)?;

        Ok(settings.adobe_credentials(self.store.encryptor())?)
    }

    /// Load credentials, obtain a valid token and return a ready client.
    ///
    /// Nothing touches the network when the credentials are incomplete.
    pub async fn initialize(&self, owner: &str) -> Result<AdobeClient, AdobeError> {
        let credentials = self.load_credentials(owner)?;
        let token = self.tokens.get_valid_token(owner, &credentials).await?;

        info!(
            user_id = %owner,
            company_id = %credentials.company_id,
            "Adobe Analytics client initialized"
        );

        AdobeClient::new(self.http.clone(), self.api_url.clone(), credentials, &token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdata::credentials::AdobeSettingsInput;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use mockito::{Server, ServerGuard};

    const NOW: i64 = 1_700_000_000_000;

    fn fixed_clock() -> i64 {
        NOW
    }

    fn settings_input() -> AdobeSettingsInput {
        AdobeSettingsInput {
            client_id: "client-123".to_string(),
            client_secret: "p8e-secret".to_string(),
            org_id: "ABC123@AdobeOrg".to_string(),
            company_id: "acme0".to_string(),
            report_suite_id: "acme.prod".to_string(),
        }
    }

    fn connector(server: &ServerGuard) -> AdobeConnector {
        let store = SettingsStore::new(":memory:", &BASE64.encode([7u8; 32])).unwrap();
        let config = AdobeConfig {
            ims_url: server.url(),
            api_url: server.url(),
            request_timeout_seconds: 5,
            serialize_token_refresh: false,
        };
        AdobeConnector::new(Arc::new(store), &config)
            .unwrap()
            .with_clock(fixed_clock)
    }

    #[tokio::test]
    async fn test_initialize_without_settings_is_not_configured() {
        let mut server = Server::new_async().await;
        let token = server.mock("POST", "/ims/token/v3").expect(0).create_async().await;
        let connector = connector(&server);

        let err = connector.initialize("nobody").await.err().unwrap();
        assert!(matches!(err, AdobeError::Configuration(_)));
        assert_eq!(err.to_string(), "Adobe Analytics not configured");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_initialize_with_partial_settings_makes_no_network_call() {
        let mut server = Server::new_async().await;
        let token = server.mock("POST", "/ims/token/v3").expect(0).create_async().await;
        let connector = connector(&server);

        let mut input = settings_input();
        input.report_suite_id = String::new();
        connector.store().save_adobe("user1", &input).unwrap();

        let err = connector.initialize("user1").await.err().unwrap();
        assert!(matches!(err, AdobeError::Configuration(_)));
        assert!(err.to_string().contains("report_suite_id"));
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_cold_cache_exchanges_once_then_discovers() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/ims/token/v3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "fresh-token", "token_type": "bearer", "expires_in": 86399}"#)
            .expect(1)
            .create_async()
            .await;
        let discovery = server
            .mock("GET", "/discovery/me")
            .match_header("authorization", "Bearer fresh-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"imsOrgs": [{"imsOrgId": "ABC123@AdobeOrg", "companies": [{"globalCompanyId": "acme0", "companyName": "ACME"}]}]}"#)
            .expect(1)
            .create_async()
            .await;

        let connector = connector(&server);
        connector.store().save_adobe("user1", &settings_input()).unwrap();

        let client = connector.initialize("user1").await.unwrap();
        let company = client.get_company().await.unwrap();

        assert_eq!(company.global_company_id, "acme0");
        assert_eq!(
            connector.load_credentials("user1").unwrap().client_secret,
            "p8e-secret"
        );
        token.assert_async().await;
        discovery.assert_async().await;

        let cached = connector.store().load_token("user1").unwrap().unwrap();
        assert_eq!(cached.access_token, "fresh-token");
    }
}
