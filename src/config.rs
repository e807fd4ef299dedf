use crate::helpers::{non_blank, serde_string_bool};
use crate::types::{EndSessionUrl, LoginType, ServerUrl, UserInfoUrl};
use crate::{AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};

use serde::Deserialize;
use thiserror::Error;

use std::collections::HashMap;

const CLIENT_ID: &str = "ClientId";
const AUTHORIZATION_ENDPOINT: &str = "OAuth2AuthzEPUrl";
const TOKEN_ENDPOINT: &str = "OAuth2TokenEPUrl";
const USER_INFO_ENDPOINT: &str = "UserInfoUrl";
const LOGOUT_ENDPOINT: &str = "OIDCLogoutEPUrl";
const CALLBACK_URL: &str = "callbackUrl";

pub const DEFAULT_AUTHENTICATOR_NAME: &str = "OpenIDConnectAuthenticator";
pub const DEFAULT_LOGIN_TYPE: &str = "OIDC";
pub const DEFAULT_MULTI_ATTRIBUTE_SEPARATOR: &str = ",,,";
pub const DEFAULT_SUPER_TENANT_DOMAIN: &str = "carbon.super";
const COMMON_AUTH_PATH: &str = "commonauth";

/// Error reading or validating authenticator configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// A property required by the current operation is absent or blank.
    #[error("missing required property `{0}`")]
    MissingProperty(&'static str),
    /// A property holds a value that is not an absolute URL.
    #[error("property `{property}` is not a valid URL")]
    InvalidUrl {
        /// Name of the offending property.
        property: &'static str,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The property map could not be interpreted.
    #[error("failed to parse authenticator properties")]
    Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
}

/// Per-identity-provider authenticator properties.
///
/// This mirrors the flat property map that identity servers store for each federated
/// authenticator. Endpoint URLs are kept exactly as configured and validated when an operation
/// needs them, so a bad logout URL does not prevent logins.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthenticatorConfig {
    #[serde(rename = "ClientId", default)]
    client_id: Option<ClientId>,
    #[serde(rename = "ClientSecret", default)]
    client_secret: Option<ClientSecret>,
    #[serde(rename = "OAuth2AuthzEPUrl", default)]
    authorization_endpoint: Option<String>,
    #[serde(rename = "OAuth2TokenEPUrl", default)]
    token_endpoint: Option<String>,
    #[serde(rename = "UserInfoUrl", default)]
    user_info_endpoint: Option<String>,
    #[serde(rename = "OIDCLogoutEPUrl", default)]
    logout_endpoint: Option<String>,
    #[serde(rename = "Scopes", default)]
    scopes: Option<String>,
    #[serde(rename = "callbackUrl", default)]
    callback_url: Option<String>,
    #[serde(rename = "commonAuthQueryParams", default)]
    query_params: Option<String>,
    #[serde(
        rename = "IsBasicAuthEnabled",
        default,
        deserialize_with = "serde_string_bool::deserialize"
    )]
    basic_auth_enabled: bool,
    #[serde(
        rename = "IsUserIdInClaims",
        default,
        deserialize_with = "serde_string_bool::deserialize"
    )]
    user_id_in_claims: bool,
    #[serde(
        rename = "RequireIdToken",
        default = "default_true",
        deserialize_with = "serde_string_bool::deserialize"
    )]
    require_id_token: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            authorization_endpoint: None,
            token_endpoint: None,
            user_info_endpoint: None,
            logout_endpoint: None,
            scopes: None,
            callback_url: None,
            query_params: None,
            basic_auth_enabled: false,
            user_id_in_claims: false,
            require_id_token: true,
        }
    }
}

impl AuthenticatorConfig {
    /// Builds a configuration from the identity server's property map. Unknown keys are ignored.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigurationError> {
        let value = serde_json::Value::Object(
            properties
                .iter()
                .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
                .collect(),
        );
        serde_path_to_error::deserialize(value).map_err(ConfigurationError::Parse)
    }

    pub fn set_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn set_client_secret(mut self, client_secret: Option<ClientSecret>) -> Self {
        self.client_secret = client_secret;
        self
    }

    pub fn set_authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(url.into());
        self
    }

    pub fn set_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    pub fn set_user_info_endpoint(mut self, url: Option<String>) -> Self {
        self.user_info_endpoint = url;
        self
    }

    pub fn set_logout_endpoint(mut self, url: Option<String>) -> Self {
        self.logout_endpoint = url;
        self
    }

    pub fn set_scopes(mut self, scopes: Option<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn set_callback_url(mut self, callback_url: Option<String>) -> Self {
        self.callback_url = callback_url;
        self
    }

    pub fn set_query_params(mut self, template: Option<String>) -> Self {
        self.query_params = template;
        self
    }

    pub fn set_basic_auth_enabled(mut self, enabled: bool) -> Self {
        self.basic_auth_enabled = enabled;
        self
    }

    pub fn set_user_id_in_claims(mut self, enabled: bool) -> Self {
        self.user_id_in_claims = enabled;
        self
    }

    pub fn set_require_id_token(mut self, required: bool) -> Self {
        self.require_id_token = required;
        self
    }

    /// Client identifier registered at the identity provider.
    pub fn client_id(&self) -> Result<&ClientId, ConfigurationError> {
        self.client_id
            .as_ref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigurationError::MissingProperty(CLIENT_ID))
    }

    pub fn client_secret(&self) -> Option<&ClientSecret> {
        self.client_secret.as_ref()
    }

    pub fn authorization_url(&self) -> Result<AuthUrl, ConfigurationError> {
        let raw = non_blank(self.authorization_endpoint.as_deref())
            .ok_or(ConfigurationError::MissingProperty(AUTHORIZATION_ENDPOINT))?;
        AuthUrl::new(raw.to_string()).map_err(|source| ConfigurationError::InvalidUrl {
            property: AUTHORIZATION_ENDPOINT,
            source,
        })
    }

    pub fn token_url(&self) -> Result<TokenUrl, ConfigurationError> {
        let raw = non_blank(self.token_endpoint.as_deref())
            .ok_or(ConfigurationError::MissingProperty(TOKEN_ENDPOINT))?;
        TokenUrl::new(raw.to_string()).map_err(|source| ConfigurationError::InvalidUrl {
            property: TOKEN_ENDPOINT,
            source,
        })
    }

    /// Token endpoint as configured, for diagnostics.
    pub fn token_endpoint(&self) -> Option<&str> {
        self.token_endpoint.as_deref()
    }

    /// Returns `None` when no UserInfo endpoint is configured.
    pub fn user_info_url(&self) -> Result<Option<UserInfoUrl>, ConfigurationError> {
        non_blank(self.user_info_endpoint.as_deref())
            .map(|raw| {
                UserInfoUrl::new(raw.to_string()).map_err(|source| {
                    ConfigurationError::InvalidUrl {
                        property: USER_INFO_ENDPOINT,
                        source,
                    }
                })
            })
            .transpose()
    }

    /// Returns `None` when no logout endpoint is configured.
    pub fn logout_url(&self) -> Result<Option<EndSessionUrl>, ConfigurationError> {
        non_blank(self.logout_endpoint.as_deref())
            .map(|raw| {
                EndSessionUrl::new(raw.to_string()).map_err(|source| {
                    ConfigurationError::InvalidUrl {
                        property: LOGOUT_ENDPOINT,
                        source,
                    }
                })
            })
            .transpose()
    }

    pub fn scopes(&self) -> Option<&str> {
        non_blank(self.scopes.as_deref())
    }

    /// The configured callback URL, falling back to the server's `/commonauth` endpoint.
    pub fn callback_url(&self, settings: &ServerSettings) -> Result<RedirectUrl, ConfigurationError> {
        match non_blank(self.callback_url.as_deref()) {
            Some(raw) => RedirectUrl::new(raw.to_string()),
            None => settings.default_callback_url(),
        }
        .map_err(|source| ConfigurationError::InvalidUrl {
            property: CALLBACK_URL,
            source,
        })
    }

    /// Extra query string template appended to the authorization request.
    pub fn query_params(&self) -> Option<&str> {
        non_blank(self.query_params.as_deref())
    }

    pub fn basic_auth_enabled(&self) -> bool {
        self.basic_auth_enabled
    }

    pub fn user_id_in_claims(&self) -> bool {
        self.user_id_in_claims
    }

    pub fn require_id_token(&self) -> bool {
        self.require_id_token
    }
}

/// Settings owned by the hosting server rather than by an individual identity provider.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    public_url: ServerUrl,
    authenticator_name: String,
    login_type: LoginType,
    default_attribute_separator: String,
    super_tenant_domain: String,
    log_user_claims: bool,
}

impl ServerSettings {
    pub fn new(public_url: ServerUrl) -> Self {
        Self {
            public_url,
            authenticator_name: DEFAULT_AUTHENTICATOR_NAME.to_string(),
            login_type: LoginType::new(DEFAULT_LOGIN_TYPE.to_string()),
            default_attribute_separator: DEFAULT_MULTI_ATTRIBUTE_SEPARATOR.to_string(),
            super_tenant_domain: DEFAULT_SUPER_TENANT_DOMAIN.to_string(),
            log_user_claims: false,
        }
    }

    pub fn set_authenticator_name(mut self, name: impl Into<String>) -> Self {
        self.authenticator_name = name.into();
        self
    }

    pub fn set_login_type(mut self, login_type: LoginType) -> Self {
        self.login_type = login_type;
        self
    }

    pub fn set_default_attribute_separator(mut self, separator: impl Into<String>) -> Self {
        self.default_attribute_separator = separator.into();
        self
    }

    pub fn set_super_tenant_domain(mut self, domain: impl Into<String>) -> Self {
        self.super_tenant_domain = domain.into();
        self
    }

    /// Enables debug logging of ID token claims and attribute values.
    pub fn set_log_user_claims(mut self, enabled: bool) -> Self {
        self.log_user_claims = enabled;
        self
    }

    pub fn public_url(&self) -> &ServerUrl {
        &self.public_url
    }

    /// Value sent in the `Origin` header of token requests.
    pub fn origin(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    pub fn default_callback_url(&self) -> Result<RedirectUrl, url::ParseError> {
        RedirectUrl::new(format!("{}/{}", self.origin(), COMMON_AUTH_PATH))
    }

    pub fn authenticator_name(&self) -> &str {
        &self.authenticator_name
    }

    pub fn login_type(&self) -> &LoginType {
        &self.login_type
    }

    pub fn default_attribute_separator(&self) -> &str {
        &self.default_attribute_separator
    }

    pub fn super_tenant_domain(&self) -> &str {
        &self.super_tenant_domain
    }

    pub fn log_user_claims(&self) -> bool {
        self.log_user_claims
    }
}
