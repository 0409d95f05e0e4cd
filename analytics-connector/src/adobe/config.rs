use crate::error::AdobeError;
use reqwest::Client;
use std::time::Duration;

/// Client-credentials token endpoint, relative to the IMS host.
pub const TOKEN_PATH: &str = "/ims/token/v3";

/// Scope string required by Adobe for server-to-server Analytics access.
pub const SCOPE: &str = "openid,AdobeID,read_organizations,additional_info.projectedProductContext,additional_info.roles";

/// Tokens expiring within this window are refreshed before use.
pub const TOKEN_REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

/// Build the HTTP client shared by the token manager and API client.
///
/// The timeout is the only cancellation mechanism for in-flight requests.
pub fn build_http_client(timeout: Duration) -> Result<Client, AdobeError> {
    Client::builder()
        .user_agent("askdata-analytics-connector/0.1")
        .timeout(timeout)
        .build()
        .map_err(|e| AdobeError::Configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
