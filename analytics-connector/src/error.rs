use askdata::credentials::CredentialsError;
use thiserror::Error;

/// Failures of the Adobe token lifecycle and API client.
///
/// Every failure reaches the immediate caller; nothing is retried here.
#[derive(Debug, Error)]
pub enum AdobeError {
    /// Credentials absent or incomplete. Not retryable.
    #[error("{0}")]
    Configuration(String),

    /// The identity provider rejected the client-credentials exchange.
    #[error("Adobe authentication failed: {0}")]
    Auth(String),

    /// An expected resource was missing from a provider response.
    #[error("{0}")]
    NotFound(String),

    /// The provider rejected the request (bad metric id, forbidden rsid, ...).
    #[error("Adobe API error ({status}): {message}")]
    Request { status: u16, message: String },

    /// Network-level failure: DNS, connect, timeout, reset.
    #[error("Adobe transport error: {0}")]
    Transport(String),

    /// Success status but the body did not match the expected shape.
    #[error("Invalid response from Adobe: {0}")]
    InvalidResponse(String),

    /// The settings store failed underneath the connector.
    #[error("Settings storage error: {0}")]
    Storage(String),
}

impl AdobeError {
    /// Whether retrying the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdobeError::Transport(_))
    }

    pub(crate) fn not_configured() -> Self {
        AdobeError::Configuration("Adobe Analytics not configured".to_string())
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        AdobeError::Storage(format!("{:#}", err))
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        AdobeError::Transport(err.to_string())
    }
}

impl From<CredentialsError> for AdobeError {
    fn from(err: CredentialsError) -> Self {
        match err {
            CredentialsError::WrongPlatform => AdobeError::not_configured(),
            other => AdobeError::Configuration(other.to_string()),
        }
    }
}
