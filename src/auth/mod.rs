use axum::http::HeaderMap;

#[cfg(test)]
mod tests;

/// Owner id used for every request when bearer auth is disabled.
pub const DEFAULT_USER_ID: &str = "default";

/// Resolve the settings owner for a request.
///
/// With auth enabled the bearer token *is* the owner id (sessions are handled
/// upstream, this service only sees the resolved identity). With auth disabled
/// every caller shares [`DEFAULT_USER_ID`].
pub fn resolve_user_id(headers: &HeaderMap, auth_enabled: bool) -> Result<String, IdentityError> {
    if !auth_enabled {
        return Ok(DEFAULT_USER_ID.to_string());
    }

    extract_bearer_token(headers)
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, IdentityError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(IdentityError::Missing)?
        .to_str()
        .map_err(|_| IdentityError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, IdentityError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(IdentityError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(IdentityError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(IdentityError::Empty);
    }

    Ok(token.to_string())
}

/// Identity extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum IdentityError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>" or not valid header text
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Missing => write!(f, "Authorization token not provided"),
            IdentityError::InvalidFormat => write!(f, "Invalid authorization token format"),
            IdentityError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for IdentityError {}
