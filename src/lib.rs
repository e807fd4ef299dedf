//!
//! Federated login through an external [OpenID Connect](https://openid.net/connect/) identity
//! provider, for identity servers that broker authentication on behalf of their applications.
//!
//! The crate implements the relying-party side of the OpenID Connect authorization code flow as a
//! pluggable authenticator:
//!
//!  1. An initial login request is turned into a redirect to the identity provider's
//!     authorization endpoint. The `state` parameter carries the caller's flow context identifier
//!     and a login-type tag, so the callback can be correlated with the flow that issued it.
//!  2. The identity provider's callback is handled by exchanging the authorization code at the
//!     token endpoint, decoding the ID token claims, resolving the authenticated subject and its
//!     attributes, and optionally merging claims from the UserInfo endpoint.
//!  3. Logout is delegated to the identity provider's end session endpoint, when one is
//!     configured.
//!
//! All per-flow state lives in a caller-owned [`FlowContext`]. The authenticator itself is
//! immutable once built.
//!
//! # HTTP clients
//!
//! Outbound requests (the code exchange and the UserInfo request) go through the
//! [`oauth2::SyncHttpClient`] trait. Any closure taking an [`HttpRequest`] and returning a
//! `Result<HttpResponse, E>` is a client, and `reqwest::blocking::Client` is one when the
//! `reqwest-blocking` feature is enabled (the default).
//!
//! # Getting started
//!
//! ```rust,no_run
//! use oidc_federation::{
//!     AuthenticatorConfig, ClaimMetadataError, ClientId, ClientSecret, ContextIdentifier,
//!     ExternalClaim, ExternalIdp, FlowContext, FlowStatus, HttpRequest, HttpResponse,
//!     InboundRequest, OidcAuthenticator, SeparatorLookupError, ServerSettings, ServerUrl,
//! };
//!
//! # fn err_wrapper() -> Result<(), anyhow::Error> {
//! // Translation of local claim URIs to the OpenID Connect dialect, usually backed by the
//! // identity server's claim metadata store.
//! fn oidc_claims(_tenant_domain: &str) -> Result<Vec<ExternalClaim>, ClaimMetadataError> {
//!     Ok(vec![ExternalClaim::new("email", "http://wso2.org/claims/emailaddress")])
//! }
//!
//! // The tenant's separator for multi-valued attributes; `None` selects the server default.
//! fn attribute_separator(_tenant_domain: &str) -> Result<Option<String>, SeparatorLookupError> {
//!     Ok(None)
//! }
//!
//! let authenticator = OidcAuthenticator::new(
//!     ServerSettings::new(ServerUrl::new("https://localhost:9443".to_string())?),
//!     oidc_claims,
//!     attribute_separator,
//! );
//!
//! let config = AuthenticatorConfig::default()
//!     .set_client_id(ClientId::new("client_id".to_string()))
//!     .set_client_secret(Some(ClientSecret::new("client_secret".to_string())))
//!     .set_authorization_endpoint("https://accounts.example.com/authorize")
//!     .set_token_endpoint("https://accounts.example.com/token");
//!
//! let mut context = FlowContext::new(
//!     ContextIdentifier::new("b2f7d1c4".to_string()),
//!     ExternalIdp::new("Example"),
//! )
//! .set_authenticator_config(Some(config));
//!
//! let http_client = |_request: HttpRequest| -> Result<HttpResponse, std::io::Error> {
//!     unimplemented!("send the request")
//! };
//!
//! // The login page posts back with the state issued for this authenticator.
//! let request = InboundRequest::from_query("state=b2f7d1c4,OIDC");
//! if let FlowStatus::Redirect(url) = authenticator.process(&request, &mut context, &http_client)? {
//!     println!("Redirect the browser to: {}", url);
//! }
//!
//! // Later, the identity provider redirects back to the callback URL.
//! let callback = InboundRequest::from_query("code=XYZ&state=b2f7d1c4,OIDC");
//! authenticator.process(&callback, &mut context, &http_client)?;
//! if let Some(subject) = context.subject() {
//!     println!("Authenticated {}", subject.subject().as_str());
//! }
//! # Ok(())
//! # }
//! ```
//!

pub use oauth2::{
    AccessToken, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, HttpRequest,
    HttpResponse, RedirectUrl, RefreshToken, SyncHttpClient, TokenUrl,
};

pub use crate::authorization::AuthorizationRequest;
pub use crate::claims::{
    AttributeSeparatorSource, ClaimDialectMapper, ClaimMetadataError, ClaimsResolver,
    ExternalClaim, SeparatorLookupError, SubjectResolutionError, NON_USER_ATTRIBUTES,
};
pub use crate::config::{
    AuthenticatorConfig, ConfigurationError, ServerSettings, DEFAULT_AUTHENTICATOR_NAME,
    DEFAULT_LOGIN_TYPE, DEFAULT_MULTI_ATTRIBUTE_SEPARATOR, DEFAULT_SUPER_TENANT_DOMAIN,
};
pub use crate::context::{AuthenticatedSubject, ClaimMapping, ExternalIdp, FlowContext};
pub use crate::flow::{
    AuthenticationError, FlowError, FlowStatus, LogoutError, OidcAuthenticator,
};
pub use crate::id_token::{IdTokenClaims, IdTokenError};
pub use crate::logout::LogoutRequest;
pub use crate::profile::{IdpProfile, StandardProfile, SubjectClaimProfile};
pub use crate::request::InboundRequest;
pub use crate::state::AuthorizationState;
pub use crate::template::{resolve_query_params, QueryParams, QueryTemplate};
pub use crate::token::{CodeTokenRequest, TokenExchangeError, TokenResponse};
pub use crate::types::{
    ContextIdentifier, EndSessionUrl, IdToken, LoginType, ServerUrl, SubjectIdentifier,
    UserInfoUrl,
};
pub use crate::user_info::{merge_user_info_claims, UserInfoError, UserInfoRequest};

// Declared before the modules that expand its macros.
#[macro_use]
mod macros;

mod authorization;
mod claims;
mod config;
mod context;
mod flow;
mod helpers;
mod http_utils;
mod id_token;
mod logout;
mod profile;
mod request;
mod state;
mod template;
mod token;
mod types;
mod user_info;
