use crate::helpers::flatten_claim_value;
use crate::http_utils::{auth_bearer, MIME_TYPE_JSON};
use crate::types::UserInfoUrl;
use crate::{AccessToken, HttpRequest, HttpResponse, SyncHttpClient};

use http::header::{HeaderValue, ACCEPT};
use http::{Method, StatusCode};
use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use std::collections::BTreeMap;

/// Error fetching claims from the UserInfo endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UserInfoError<RE>
where
    RE: std::error::Error + 'static,
{
    /// An unexpected error occurred.
    #[error("Other error: {0}")]
    Other(String),
    /// Failed to parse server response.
    #[error("Failed to parse server response")]
    Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
    /// An error occurred while sending the request or receiving the response (e.g., network
    /// connectivity failed).
    #[error("Request failed")]
    Request(#[source] RE),
    /// Server returned an invalid response.
    #[error("Server returned invalid response: {2}")]
    Response(StatusCode, Vec<u8>, String),
}

/// UserInfo request authenticated with the access token from the code exchange.
pub struct UserInfoRequest<'a> {
    url: &'a UserInfoUrl,
    access_token: &'a AccessToken,
}

impl<'a> UserInfoRequest<'a> {
    pub fn new(url: &'a UserInfoUrl, access_token: &'a AccessToken) -> Self {
        Self { url, access_token }
    }

    /// Fetches the user's claims. A blank response body yields no claims.
    pub fn request<C>(
        self,
        http_client: &C,
    ) -> Result<Map<String, Value>, UserInfoError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        let http_request = self.prepare_request()?;
        http_client
            .call(http_request)
            .map_err(UserInfoError::Request)
            .and_then(|http_response| self.user_info_response(http_response))
    }

    fn prepare_request<RE>(&self) -> Result<HttpRequest, UserInfoError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        let (auth_header, auth_value) =
            auth_bearer(self.access_token).map_err(UserInfoError::Other)?;
        http::Request::builder()
            .uri(self.url.as_str())
            .method(Method::GET)
            .header(ACCEPT, HeaderValue::from_static(MIME_TYPE_JSON))
            .header(auth_header, auth_value)
            .body(Vec::new())
            .map_err(|err| UserInfoError::Other(format!("failed to prepare request: {err}")))
    }

    fn user_info_response<RE>(
        &self,
        http_response: HttpResponse,
    ) -> Result<Map<String, Value>, UserInfoError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        if !http_response.status().is_success() {
            return Err(UserInfoError::Response(
                http_response.status(),
                http_response.body().to_owned(),
                format!(
                    "HTTP status code {} at {}",
                    http_response.status(),
                    self.url.as_str()
                ),
            ));
        }

        if http_response.body().iter().all(u8::is_ascii_whitespace) {
            debug!("empty response from the UserInfo endpoint; proceeding without user claims");
            return Ok(Map::new());
        }

        serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(
            http_response.body(),
        ))
        .map_err(UserInfoError::Parse)
    }
}

/// Adds UserInfo claims to `attributes`, replacing ID token values of the same name.
///
/// `null` claims are skipped; arrays are joined with `separator`.
pub fn merge_user_info_claims(
    attributes: &mut BTreeMap<String, String>,
    user_info: &Map<String, Value>,
    separator: &str,
    log_user_claims: bool,
) {
    for (name, value) in user_info.iter().filter(|(_, value)| !value.is_null()) {
        let value = flatten_claim_value(value, separator);
        if log_user_claims {
            debug!("adding claim from UserInfo endpoint: {} - {}", name, value);
        }
        attributes.insert(name.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::{merge_user_info_claims, UserInfoError, UserInfoRequest};
    use crate::types::UserInfoUrl;
    use crate::{AccessToken, HttpRequest, HttpResponse};

    use http::header::{ACCEPT, AUTHORIZATION};
    use http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use thiserror::Error;

    use std::collections::BTreeMap;

    #[derive(Debug, Error)]
    #[error("fake network failure")]
    struct FakeError;

    fn response(status: StatusCode, body: &str) -> HttpResponse {
        http::Response::builder()
            .status(status)
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn test_user_info_request() {
        let url = UserInfoUrl::new("https://idp.example/userinfo".to_string()).unwrap();
        let access_token = AccessToken::new("AT1".to_string());

        let claims = UserInfoRequest::new(&url, &access_token)
            .request(&|request: HttpRequest| {
                assert_eq!(Method::GET, request.method());
                assert_eq!("https://idp.example/userinfo", request.uri().to_string());
                assert_eq!("Bearer AT1", request.headers()[AUTHORIZATION].to_str().unwrap());
                assert_eq!("application/json", request.headers()[ACCEPT].to_str().unwrap());
                Ok::<_, FakeError>(response(
                    StatusCode::OK,
                    r#"{"email":"u@example.com","roles":["a","b"]}"#,
                ))
            })
            .unwrap();

        assert_eq!(Some(&json!("u@example.com")), claims.get("email"));
        assert_eq!(Some(&json!(["a", "b"])), claims.get("roles"));
    }

    #[test]
    fn test_blank_body_yields_no_claims() {
        let url = UserInfoUrl::new("https://idp.example/userinfo".to_string()).unwrap();
        let access_token = AccessToken::new("AT1".to_string());

        let claims = UserInfoRequest::new(&url, &access_token)
            .request(&|_: HttpRequest| Ok::<_, FakeError>(response(StatusCode::OK, " \n")))
            .unwrap();
        assert!(claims.is_empty());
    }

    #[test]
    fn test_user_info_errors() {
        let url = UserInfoUrl::new("https://idp.example/userinfo".to_string()).unwrap();
        let access_token = AccessToken::new("AT1".to_string());

        assert!(matches!(
            UserInfoRequest::new(&url, &access_token).request(&|_: HttpRequest| {
                Ok::<_, FakeError>(response(StatusCode::UNAUTHORIZED, ""))
            }),
            Err(UserInfoError::Response(StatusCode::UNAUTHORIZED, _, _))
        ));
        assert!(matches!(
            UserInfoRequest::new(&url, &access_token)
                .request(&|_: HttpRequest| Ok::<_, FakeError>(response(StatusCode::OK, "[1]"))),
            Err(UserInfoError::Parse(_))
        ));
        assert!(matches!(
            UserInfoRequest::new(&url, &access_token)
                .request(&|_: HttpRequest| Err::<HttpResponse, _>(FakeError)),
            Err(UserInfoError::Request(FakeError))
        ));
    }

    #[test]
    fn test_merge_user_info_claims() {
        let mut attributes = BTreeMap::new();
        attributes.insert("email".to_string(), "old@example.com".to_string());
        attributes.insert("sub".to_string(), "user42".to_string());

        let user_info = json!({
            "email": "new@example.com",
            "roles": ["admin", "dev"],
            "phone_number": null,
        });
        merge_user_info_claims(
            &mut attributes,
            user_info.as_object().unwrap(),
            ",,,",
            true,
        );

        assert_eq!(Some(&"new@example.com".to_string()), attributes.get("email"));
        assert_eq!(Some(&"admin,,,dev".to_string()), attributes.get("roles"));
        assert_eq!(Some(&"user42".to_string()), attributes.get("sub"));
        assert!(!attributes.contains_key("phone_number"));
    }
}
