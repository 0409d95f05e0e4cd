use super::*;
use axum::http::HeaderMap;

fn headers_with(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", value.parse().unwrap());
    headers
}

mod extract_bearer_token_tests {
    use super::*;

    #[test]
    fn valid_bearer_token() {
        let headers = headers_with("Bearer user-7f3a");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "user-7f3a");
    }

    #[test]
    fn valid_bearer_token_with_extra_whitespace() {
        let headers = headers_with("Bearer   user-7f3a  ");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "user-7f3a");
    }

    #[test]
    fn case_insensitive_bearer() {
        let headers = headers_with("bearer user-7f3a");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "user-7f3a");
    }

    #[test]
    fn missing_authorization_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), Err(IdentityError::Missing));
    }

    #[test]
    fn missing_bearer_prefix() {
        let headers = headers_with("user-7f3a");
        assert_eq!(
            extract_bearer_token(&headers),
            Err(IdentityError::InvalidFormat)
        );
    }

    #[test]
    fn wrong_auth_scheme() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert_eq!(
            extract_bearer_token(&headers),
            Err(IdentityError::InvalidFormat)
        );
    }

    #[test]
    fn bearer_without_token() {
        let headers = headers_with("Bearer");
        assert_eq!(
            extract_bearer_token(&headers),
            Err(IdentityError::InvalidFormat)
        );
    }

    #[test]
    fn bearer_with_empty_token() {
        let headers = headers_with("Bearer  ");
        assert_eq!(extract_bearer_token(&headers), Err(IdentityError::Empty));
    }
}

mod resolve_user_id_tests {
    use super::*;

    #[test]
    fn auth_disabled_uses_default_owner() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_user_id(&headers, false).unwrap(), DEFAULT_USER_ID);
    }

    #[test]
    fn auth_disabled_ignores_bearer() {
        let headers = headers_with("Bearer someone-else");
        assert_eq!(resolve_user_id(&headers, false).unwrap(), DEFAULT_USER_ID);
    }

    #[test]
    fn auth_enabled_uses_bearer_as_owner() {
        let headers = headers_with("Bearer user-42");
        assert_eq!(resolve_user_id(&headers, true).unwrap(), "user-42");
    }

    #[test]
    fn auth_enabled_requires_header() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_user_id(&headers, true), Err(IdentityError::Missing));
    }
}
