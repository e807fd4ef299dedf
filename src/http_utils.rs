use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use oauth2::{AccessToken, ClientId, ClientSecret};

pub const MIME_TYPE_JSON: &str = "application/json";
pub const MIME_TYPE_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

pub const BASIC: &str = "Basic";
pub const BEARER: &str = "Bearer";

pub fn header_starts_with_ignoring_case(header: &HeaderValue, expected_start: &str) -> bool {
    header
        .to_str()
        .ok()
        .filter(|ct| ct.to_lowercase().starts_with(&expected_start.to_lowercase()))
        .is_some()
}

pub fn content_type_is(headers: &HeaderMap, expected_content_type: &str) -> bool {
    // Section 3.1.1.1 of RFC 7231 indicates that media types are case insensitive and
    // may be followed by optional whitespace and/or a parameter (e.g., charset).
    // See https://tools.ietf.org/html/rfc7231#section-3.1.1.1.
    headers
        .get(CONTENT_TYPE)
        .map(|content_type| header_starts_with_ignoring_case(content_type, expected_content_type))
        .unwrap_or(false)
}

pub fn auth_bearer(access_token: &AccessToken) -> Result<(HeaderName, HeaderValue), String> {
    HeaderValue::from_str(&format!("{} {}", BEARER, access_token.secret()))
        .map(|value| (AUTHORIZATION, value))
        .map_err(|_| "access token is not a valid header value".to_string())
}

// Credentials are joined verbatim; some identity providers reject form-encoded client secrets.
pub fn auth_basic(
    client_id: &ClientId,
    client_secret: Option<&ClientSecret>,
) -> Result<(HeaderName, HeaderValue), String> {
    let credentials = format!(
        "{}:{}",
        client_id.as_str(),
        client_secret.map(|secret| secret.secret().as_str()).unwrap_or_default()
    );
    HeaderValue::from_str(&format!(
        "{} {}",
        BASIC,
        BASE64_STANDARD.encode(credentials)
    ))
    .map(|value| (AUTHORIZATION, value))
    .map_err(|_| "client credentials are not a valid header value".to_string())
}

#[cfg(test)]
mod tests {
    use super::{auth_basic, auth_bearer, content_type_is, MIME_TYPE_JSON};

    use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
    use oauth2::{AccessToken, ClientId, ClientSecret};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_type_ignores_case_and_parameters() {
        let mut headers = HeaderMap::new();
        assert!(!content_type_is(&headers, MIME_TYPE_JSON));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=UTF-8"),
        );
        assert!(content_type_is(&headers, MIME_TYPE_JSON));
        assert!(!content_type_is(&headers, "text/plain"));
    }

    #[test]
    fn test_auth_basic_joins_credentials_verbatim() {
        let (name, value) = auth_basic(
            &ClientId::new("client id".to_string()),
            Some(&ClientSecret::new("s3cr3t&".to_string())),
        )
        .unwrap();
        assert_eq!(AUTHORIZATION, name);
        // base64("client id:s3cr3t&")
        assert_eq!("Basic Y2xpZW50IGlkOnMzY3IzdCY=", value.to_str().unwrap());
    }

    #[test]
    fn test_auth_bearer() {
        let (_, value) = auth_bearer(&AccessToken::new("AT1".to_string())).unwrap();
        assert_eq!("Bearer AT1", value.to_str().unwrap());

        assert!(auth_bearer(&AccessToken::new("bad\ntoken".to_string())).is_err());
    }
}
