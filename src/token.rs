use crate::config::ConfigurationError;
use crate::helpers::deserialize_number_or_string_opt;
use crate::http_utils::{auth_basic, content_type_is, MIME_TYPE_FORM_URLENCODED, MIME_TYPE_JSON};
use crate::{
    AccessToken, AuthType, AuthorizationCode, ClientId, ClientSecret, HttpRequest, HttpResponse,
    RefreshToken, SyncHttpClient, TokenUrl,
};

use http::header::{HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN};
use http::{Method, StatusCode};
use log::debug;
use oauth2::basic::BasicErrorResponse;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::form_urlencoded;

use std::collections::HashMap;
use std::time::Duration;

const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// Error exchanging an authorization code at the token endpoint.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenExchangeError<RE>
where
    RE: std::error::Error + 'static,
{
    /// The token request could not be built from the authenticator configuration.
    #[error("Configuration error")]
    Configuration(#[from] ConfigurationError),
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
    /// Server returned an OAuth2 error response.
    #[error("Server returned error response: {0}")]
    ServerResponse(BasicErrorResponse),
    /// Server returned an invalid response.
    #[error("Server returned invalid response: {2}")]
    Response(StatusCode, Vec<u8>, String),
}

/// Successful response from the token endpoint.
///
/// Only the fields this authenticator consumes are typed; everything else the identity provider
/// returns is available through [`TokenResponse::extra_field`].
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    access_token: Option<AccessToken>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<RefreshToken>,
    #[serde(default, deserialize_with = "deserialize_number_or_string_opt")]
    expires_in: Option<u64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(flatten)]
    extra_fields: HashMap<String, Value>,
}

impl TokenResponse {
    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// The compact ID token, if the identity provider returned one.
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in.map(Duration::from_secs)
    }

    /// Scopes granted by the identity provider, as returned (space-delimited).
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Any response parameter not covered by the typed accessors.
    pub fn extra_field(&self, name: &str) -> Option<&Value> {
        self.extra_fields.get(name)
    }
}

/// Authorization code grant request (RFC 6749 section 4.1.3).
#[derive(Debug)]
pub struct CodeTokenRequest<'a> {
    token_url: &'a TokenUrl,
    client_id: &'a ClientId,
    client_secret: Option<&'a ClientSecret>,
    code: AuthorizationCode,
    redirect_uri: String,
    auth_type: AuthType,
    origin: Option<&'a str>,
}

impl<'a> CodeTokenRequest<'a> {
    pub fn new(
        token_url: &'a TokenUrl,
        client_id: &'a ClientId,
        code: AuthorizationCode,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            token_url,
            client_id,
            client_secret: None,
            code,
            redirect_uri: redirect_uri.into(),
            auth_type: AuthType::RequestBody,
            origin: None,
        }
    }

    pub fn set_client_secret(mut self, client_secret: Option<&'a ClientSecret>) -> Self {
        self.client_secret = client_secret;
        self
    }

    /// Selects HTTP Basic client authentication or client credentials in the request body.
    pub fn set_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    /// Value for the `Origin` request header.
    pub fn set_origin(mut self, origin: &'a str) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Synchronously sends the request to the token endpoint.
    pub fn request<C>(
        self,
        http_client: &C,
    ) -> Result<TokenResponse, TokenExchangeError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        let http_request = self.prepare_request()?;
        http_client
            .call(http_request)
            .map_err(TokenExchangeError::Request)
            .and_then(|http_response| self.token_response(http_response))
    }

    fn prepare_request<RE>(&self) -> Result<HttpRequest, TokenExchangeError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        let mut body = form_urlencoded::Serializer::new(String::new());
        body.append_pair("grant_type", GRANT_TYPE_AUTHORIZATION_CODE)
            .append_pair("code", self.code.secret())
            .append_pair("redirect_uri", &self.redirect_uri);

        let mut builder = http::Request::builder()
            .uri(self.token_url.as_str())
            .method(Method::POST)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static(MIME_TYPE_FORM_URLENCODED),
            )
            .header(ACCEPT, HeaderValue::from_static(MIME_TYPE_JSON));

        if let Some(origin) = self.origin {
            builder = builder.header(ORIGIN, origin);
        }

        match self.auth_type {
            AuthType::BasicAuth => {
                debug!(
                    "authenticating to token endpoint {} with HTTP basic authentication",
                    self.token_url.as_str()
                );
                let (name, value) = auth_basic(self.client_id, self.client_secret)
                    .map_err(TokenExchangeError::Other)?;
                builder = builder.header(name, value);
            }
            _ => {
                debug!(
                    "authenticating to token endpoint {} with client credentials in the request body",
                    self.token_url.as_str()
                );
                body.append_pair("client_id", self.client_id.as_str());
                if let Some(client_secret) = self.client_secret {
                    body.append_pair("client_secret", client_secret.secret());
                }
            }
        }

        builder
            .body(body.finish().into_bytes())
            .map_err(|err| TokenExchangeError::Other(format!("failed to prepare request: {err}")))
    }

    fn token_response<RE>(
        &self,
        http_response: HttpResponse,
    ) -> Result<TokenResponse, TokenExchangeError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        let status = http_response.status();
        if !status.is_success() {
            if let Ok(error_response) =
                serde_json::from_slice::<BasicErrorResponse>(http_response.body())
            {
                return Err(TokenExchangeError::ServerResponse(error_response));
            }
            return Err(TokenExchangeError::Response(
                status,
                http_response.body().to_owned(),
                format!("HTTP status code {} at {}", status, self.token_url.as_str()),
            ));
        }

        let fields = if content_type_is(http_response.headers(), MIME_TYPE_FORM_URLENCODED) {
            Value::Object(
                form_urlencoded::parse(http_response.body())
                    .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
                    .collect(),
            )
        } else {
            serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(
                http_response.body(),
            ))
            .map_err(TokenExchangeError::Parse)?
        };

        // Some providers report protocol errors with a success status.
        if fields.get("error").is_some() {
            let error_response: BasicErrorResponse =
                serde_path_to_error::deserialize(fields).map_err(TokenExchangeError::Parse)?;
            return Err(TokenExchangeError::ServerResponse(error_response));
        }

        serde_path_to_error::deserialize(fields).map_err(TokenExchangeError::Parse)
    }
}
