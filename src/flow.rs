use crate::authorization::AuthorizationRequest;
use crate::claims::{
    AttributeSeparatorSource, ClaimDialectMapper, ClaimMetadataError, ClaimsResolver,
    SeparatorLookupError, SubjectResolutionError,
};
use crate::config::{AuthenticatorConfig, ConfigurationError, ServerSettings};
use crate::context::{AuthenticatedSubject, FlowContext};
use crate::helpers::{is_blank, non_blank};
use crate::id_token::{IdTokenClaims, IdTokenError};
use crate::logout::LogoutRequest;
use crate::profile::{IdpProfile, StandardProfile};
use crate::request::{InboundRequest, CODE, DOMAIN, ERROR, ERROR_DESCRIPTION};
use crate::state::AuthorizationState;
use crate::template::resolve_query_params;
use crate::token::{CodeTokenRequest, TokenExchangeError, TokenResponse};
use crate::types::{ContextIdentifier, SubjectIdentifier};
use crate::user_info::{merge_user_info_claims, UserInfoRequest};
use crate::{AccessToken, AuthType, AuthorizationCode, SyncHttpClient};

use chrono::Utc;
use log::{debug, error, info, trace};
use thiserror::Error;
use url::Url;

use std::collections::BTreeMap;

const REDIRECT_URI: &str = "redirect_uri";

/// Outcome of a successful call to [`OidcAuthenticator::process`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowStatus {
    /// The user agent must be redirected to the given URL; the flow is incomplete.
    Redirect(Url),
    /// The authenticated subject was written to the context, or a logout response was handled.
    Completed,
    /// The authenticator did nothing; the caller should apply its default behavior.
    Continue,
}

/// Failure of a federated login.
///
/// Every variant has a stable [`code`](AuthenticationError::code). Its `Display` output is the
/// human-readable message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthenticationError<RE>
where
    RE: std::error::Error + 'static,
{
    /// No authenticator properties were resolved for the flow.
    #[error("Authenticator properties are not configured for the flow")]
    ConfigurationMissing,
    /// The authorization redirect could not be built.
    #[error("Failed to build the authorization request")]
    AuthorizationRequestBuildFailed(#[source] ConfigurationError),
    /// The identity provider redirected back with an OAuth2 error.
    #[error("Identity provider returned error `{error}`")]
    AuthorizationResponse {
        /// The `error` parameter.
        error: String,
        /// The `error_description` parameter, if any.
        description: Option<String>,
    },
    /// The token request failed or the token endpoint returned an error.
    #[error("Failed to exchange the authorization code for tokens")]
    TokenExchange(#[source] TokenExchangeError<RE>),
    /// The token response had no usable access token.
    #[error("Access token is empty or null (token endpoint: {token_endpoint}, client id: {client_id})")]
    AccessTokenMissing {
        /// Configured token endpoint.
        token_endpoint: String,
        /// Configured client id.
        client_id: String,
    },
    /// The token response had no ID token, but one is required.
    #[error("ID token is required but missing (token endpoint: {token_endpoint}, client id: {client_id})")]
    IdTokenMissing {
        /// Configured token endpoint.
        token_endpoint: String,
        /// Configured client id.
        client_id: String,
    },
    /// The ID token payload could not be decoded.
    #[error("Malformed ID token")]
    MalformedIdToken(#[source] IdTokenError),
    /// No subject could be resolved from the claims.
    #[error("Cannot find the user id in the ID token claims")]
    SubjectNotFound,
    /// The user id claim could not be translated through the claim dialect.
    #[error("Error while mapping the user id claim of identity provider `{idp}`")]
    ClaimDialectResolutionFailed {
        /// Name of the identity provider.
        idp: String,
        /// Error reported by the claim metadata service.
        #[source]
        source: ClaimMetadataError,
    },
    /// The tenant's multi-attribute separator could not be read.
    #[error("Error while reading the multi-attribute separator for the authenticated user")]
    AttributeSeparatorLookupFailed {
        /// The subject that had already been resolved.
        subject: SubjectIdentifier,
        /// Error reported by the user store.
        #[source]
        source: SeparatorLookupError,
    },
}

impl<RE> AuthenticationError<RE>
where
    RE: std::error::Error + 'static,
{
    /// Stable code identifying the kind of failure.
    pub fn code(&self) -> &'static str {
        match self {
            AuthenticationError::ConfigurationMissing => "OIDC-60001",
            AuthenticationError::AuthorizationRequestBuildFailed(_) => "OIDC-60002",
            AuthenticationError::AuthorizationResponse { .. } => "OIDC-60003",
            AuthenticationError::TokenExchange(_) => "OIDC-60004",
            AuthenticationError::AccessTokenMissing { .. } => "OIDC-60005",
            AuthenticationError::IdTokenMissing { .. } => "OIDC-60006",
            AuthenticationError::MalformedIdToken(_) => "OIDC-60007",
            AuthenticationError::SubjectNotFound => "OIDC-60008",
            AuthenticationError::ClaimDialectResolutionFailed { .. } => "OIDC-60009",
            AuthenticationError::AttributeSeparatorLookupFailed { .. } => "OIDC-60010",
        }
    }

    /// The partially authenticated identity, when one was resolved before the failure.
    pub fn partial_subject(&self) -> Option<&SubjectIdentifier> {
        match self {
            AuthenticationError::AttributeSeparatorLookupFailed { subject, .. } => Some(subject),
            _ => None,
        }
    }
}

/// Failure to initiate logout at the identity provider.
#[derive(Debug, Error)]
#[error("Error occurred while initiating the logout request to identity provider `{idp}` of tenant `{tenant_domain}`")]
pub struct LogoutError {
    idp: String,
    tenant_domain: String,
    #[source]
    source: ConfigurationError,
}

impl LogoutError {
    /// Stable code identifying the failure.
    pub fn code(&self) -> &'static str {
        "OIDC-60011"
    }

    pub fn idp(&self) -> &str {
        &self.idp
    }

    pub fn tenant_domain(&self) -> &str {
        &self.tenant_domain
    }
}

/// Error returned by [`OidcAuthenticator::process`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowError<RE>
where
    RE: std::error::Error + 'static,
{
    #[error(transparent)]
    Authentication(#[from] AuthenticationError<RE>),
    #[error(transparent)]
    Logout(#[from] LogoutError),
}

///
/// Federated authenticator that delegates login to an external OpenID Connect identity provider
/// using the authorization code flow.
///
/// The authenticator holds no per-flow state. Everything a flow needs across the redirect to the
/// identity provider lives in the caller's [`FlowContext`].
///
pub struct OidcAuthenticator {
    settings: ServerSettings,
    profile: Box<dyn IdpProfile>,
    dialect_mapper: Box<dyn ClaimDialectMapper>,
    separator_source: Box<dyn AttributeSeparatorSource>,
}

impl OidcAuthenticator {
    pub fn new<M, S>(settings: ServerSettings, dialect_mapper: M, separator_source: S) -> Self
    where
        M: ClaimDialectMapper + 'static,
        S: AttributeSeparatorSource + 'static,
    {
        Self {
            settings,
            profile: Box::new(StandardProfile),
            dialect_mapper: Box::new(dialect_mapper),
            separator_source: Box::new(separator_source),
        }
    }

    /// Replaces the [`StandardProfile`] used to read token responses.
    pub fn set_profile<P>(mut self, profile: P) -> Self
    where
        P: IdpProfile + 'static,
    {
        self.profile = Box::new(profile);
        self
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Name under which this authenticator is registered with the framework.
    pub fn name(&self) -> &str {
        self.settings.authenticator_name()
    }

    /// Returns `true` if the request's `state` was issued by this authenticator.
    pub fn can_handle(&self, request: &InboundRequest) -> bool {
        trace!("inside OidcAuthenticator::can_handle()");
        request.state().map_or(false, |state| {
            state.login_type() == Some(self.settings.login_type().as_str())
        })
    }

    /// Returns `true` unless the request is a logout or carries an authorization response.
    pub fn is_initial_request(&self, request: &InboundRequest, context: &FlowContext) -> bool {
        !context.is_logout_request() && !request.has_non_blank(CODE) && !request.has_non_blank(ERROR)
    }

    /// The flow context identifier carried in the request's `state`.
    pub fn context_identifier(&self, request: &InboundRequest) -> Option<ContextIdentifier> {
        request.state().map(|state| state.context_id())
    }

    ///
    /// Advances the flow for an inbound request.
    ///
    /// An initial request redirects to the identity provider. A callback exchanges the
    /// authorization code and writes the authenticated subject to `context`. A logout context
    /// redirects to the identity provider's end session endpoint, if one is configured.
    ///
    pub fn process<C>(
        &self,
        request: &InboundRequest,
        context: &mut FlowContext,
        http_client: &C,
    ) -> Result<FlowStatus, FlowError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        if self.is_initial_request(request, context)
            && (self.can_handle(request) || request.handled())
        {
            return Ok(self.start_authentication::<C::Error>(request, context)?);
        }

        if context.is_logout_request() {
            if !self.can_handle(request) {
                return Ok(self.initiate_logout_request(context)?);
            }
            info!(
                "logout response received for context `{}`",
                context.context_id().as_str()
            );
            return Ok(FlowStatus::Completed);
        }

        if !self.can_handle(request) {
            return Ok(self.start_authentication::<C::Error>(request, context)?);
        }

        self.process_authentication_response(request, context, http_client)?;
        Ok(FlowStatus::Completed)
    }

    fn start_authentication<RE>(
        &self,
        request: &InboundRequest,
        context: &mut FlowContext,
    ) -> Result<FlowStatus, AuthenticationError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        if context.last_failed_authenticator() == Some(self.name()) {
            context.set_retrying(true);
        }
        let url = self.initiate_authentication_request(request, context)?;
        context.set_current_authenticator(self.settings.authenticator_name());
        Ok(FlowStatus::Redirect(url))
    }

    /// Builds the authorization redirect and stores the resolved extra query parameters in
    /// `context` for the callback.
    pub fn initiate_authentication_request<RE>(
        &self,
        request: &InboundRequest,
        context: &mut FlowContext,
    ) -> Result<Url, AuthenticationError<RE>>
    where
        RE: std::error::Error + 'static,
    {
        let config = context
            .authenticator_config()
            .cloned()
            .ok_or(AuthenticationError::ConfigurationMissing)?;

        let auth_url = config
            .authorization_url()
            .map_err(AuthenticationError::AuthorizationRequestBuildFailed)?;
        let client_id = config
            .client_id()
            .map_err(AuthenticationError::AuthorizationRequestBuildFailed)?;
        let callback_url = config
            .callback_url(&self.settings)
            .map_err(AuthenticationError::AuthorizationRequestBuildFailed)?;
        let state = AuthorizationState::encode(context.context_id(), self.settings.login_type());

        let query_params = resolve_query_params(
            config.query_params(),
            config.scopes(),
            request,
            context.runtime_params(),
        );

        let url = AuthorizationRequest::new(&auth_url, client_id, callback_url, state)
            .set_scope(config.scopes().map(ToString::to_string))
            .set_domain_hint(non_blank(request.param(DOMAIN)).map(ToString::to_string))
            .set_extra_params(query_params.as_ref())
            .url();
        debug!("redirecting to identity provider: {}", url);

        context.set_query_params(query_params);
        Ok(url)
    }

    ///
    /// Handles the identity provider's callback: exchanges the authorization code, resolves the
    /// subject and its attributes, and writes them to `context`.
    ///
    pub fn process_authentication_response<C>(
        &self,
        request: &InboundRequest,
        context: &mut FlowContext,
        http_client: &C,
    ) -> Result<(), AuthenticationError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        if let Some(error) = non_blank(request.param(ERROR)) {
            return Err(AuthenticationError::AuthorizationResponse {
                error: error.to_string(),
                description: non_blank(request.param(ERROR_DESCRIPTION)).map(ToString::to_string),
            });
        }
        let code = non_blank(request.param(CODE)).ok_or_else(|| {
            AuthenticationError::AuthorizationResponse {
                error: "invalid_request".to_string(),
                description: Some("authorization code is missing".to_string()),
            }
        })?;

        let config = context
            .authenticator_config()
            .cloned()
            .ok_or(AuthenticationError::ConfigurationMissing)?;

        let token_response = self
            .exchange_code(&config, context, AuthorizationCode::new(code.to_string()), http_client)
            .map_err(AuthenticationError::TokenExchange)?;

        if let Some(scope) = token_response.scope() {
            debug!("scopes granted by the identity provider: {}", scope);
        }

        let missing_context = || {
            (
                config.token_endpoint().unwrap_or_default().to_string(),
                config
                    .client_id()
                    .map(|client_id| client_id.as_str().to_string())
                    .unwrap_or_default(),
            )
        };

        let access_token = self
            .profile
            .extract_access_token(&token_response)
            .ok_or_else(|| {
                let (token_endpoint, client_id) = missing_context();
                AuthenticationError::AccessTokenMissing {
                    token_endpoint,
                    client_id,
                }
            })?;

        let id_token = self.profile.extract_id_token(&token_response);
        if id_token.is_none() && config.require_id_token() {
            let (token_endpoint, client_id) = missing_context();
            return Err(AuthenticationError::IdTokenMissing {
                token_endpoint,
                client_id,
            });
        }

        let claims = match &id_token {
            Some(id_token) => {
                let claims = id_token
                    .claims()
                    .map_err(AuthenticationError::MalformedIdToken)?;
                if self.settings.log_user_claims() {
                    debug!("retrieved the ID token claims: {:?}", claims);
                }
                claims
            }
            None => IdTokenClaims::default(),
        };

        context.set_access_token(access_token.clone());
        context.set_id_token(id_token);
        context.set_refresh_token(token_response.refresh_token().cloned());
        context.set_granted_scope(token_response.scope().map(ToString::to_string));
        context.set_expires_at(
            token_response
                .expires_in()
                .and_then(|expires_in| chrono::Duration::from_std(expires_in).ok())
                .and_then(|expires_in| Utc::now().checked_add_signed(expires_in)),
        );

        let idp_name = context.external_idp().name().to_string();
        if let Some(session_id) = non_blank(claims.session_id()) {
            if !is_blank(&idp_name) {
                context.set_federated_session_id(&idp_name, session_id);
            }
        }

        let tenant_domain = non_blank(context.tenant_domain())
            .unwrap_or_else(|| self.settings.super_tenant_domain())
            .to_string();
        let resolver = ClaimsResolver::new(
            self.dialect_mapper.as_ref(),
            self.separator_source.as_ref(),
            self.settings.default_attribute_separator(),
        )
        .set_log_user_claims(self.settings.log_user_claims());

        let subject = resolver
            .resolve_subject(
                context.external_idp(),
                &tenant_domain,
                config.user_id_in_claims(),
                &claims,
                self.profile.as_ref(),
                &token_response,
            )
            .map_err(|err| match err {
                SubjectResolutionError::ClaimDialect { idp, source } => {
                    AuthenticationError::ClaimDialectResolutionFailed { idp, source }
                }
                SubjectResolutionError::SubjectNotFound => AuthenticationError::SubjectNotFound,
            })?;

        let separator = resolver
            .attribute_separator(&tenant_domain)
            .map_err(|source| AuthenticationError::AttributeSeparatorLookupFailed {
                subject: subject.clone(),
                source,
            })?;

        let mut attributes = resolver.attributes(&claims, &separator);
        self.merge_user_info(&config, &access_token, &mut attributes, &separator, http_client);

        info!(
            "federated user `{}` authenticated by identity provider `{}`",
            subject.as_str(),
            idp_name
        );
        context.set_subject(AuthenticatedSubject::new(subject, attributes));
        Ok(())
    }

    ///
    /// Redirects to the identity provider's end session endpoint.
    ///
    /// Returns [`FlowStatus::Continue`] when no logout endpoint is configured.
    ///
    pub fn initiate_logout_request(&self, context: &FlowContext) -> Result<FlowStatus, LogoutError> {
        let logout_error = |source| LogoutError {
            idp: context.external_idp().name().to_string(),
            tenant_domain: context.tenant_domain().unwrap_or_default().to_string(),
            source,
        };

        let Some(config) = context.authenticator_config() else {
            return Ok(FlowStatus::Continue);
        };
        let Some(end_session_url) = config.logout_url().map_err(logout_error)? else {
            debug!(
                "no logout endpoint configured for identity provider `{}`",
                context.external_idp().name()
            );
            return Ok(FlowStatus::Continue);
        };
        let callback_url = config
            .callback_url(&self.settings)
            .map_err(logout_error)?;

        let url = LogoutRequest::from(end_session_url)
            .set_id_token_hint(context.id_token_hint())
            .set_post_logout_redirect_uri(callback_url)
            .set_state(AuthorizationState::encode(
                context.context_id(),
                self.settings.login_type(),
            ))
            .http_get_url();
        debug!("redirecting to logout endpoint: {}", url);
        Ok(FlowStatus::Redirect(url))
    }

    fn exchange_code<C>(
        &self,
        config: &AuthenticatorConfig,
        context: &FlowContext,
        code: AuthorizationCode,
        http_client: &C,
    ) -> Result<TokenResponse, TokenExchangeError<<C as SyncHttpClient>::Error>>
    where
        C: SyncHttpClient,
    {
        let token_url = config.token_url()?;
        let client_id = config.client_id()?;
        let redirect_uri = match context
            .query_params()
            .and_then(|params| non_blank(params.get(REDIRECT_URI)))
        {
            Some(redirect_uri) => redirect_uri.to_string(),
            None => config.callback_url(&self.settings)?.as_str().to_string(),
        };
        let auth_type = if config.basic_auth_enabled() {
            AuthType::BasicAuth
        } else {
            AuthType::RequestBody
        };

        CodeTokenRequest::new(&token_url, client_id, code, redirect_uri)
            .set_client_secret(config.client_secret())
            .set_auth_type(auth_type)
            .set_origin(self.settings.origin())
            .request(http_client)
    }

    fn merge_user_info<C>(
        &self,
        config: &AuthenticatorConfig,
        access_token: &AccessToken,
        attributes: &mut BTreeMap<String, String>,
        separator: &str,
        http_client: &C,
    ) where
        C: SyncHttpClient,
    {
        let user_info_url = match config.user_info_url() {
            Ok(Some(url)) => url,
            Ok(None) => return,
            Err(err) => {
                error!("invalid UserInfo endpoint; skipping user claims: {}", err);
                return;
            }
        };

        match UserInfoRequest::new(&user_info_url, access_token).request(http_client) {
            Ok(user_info) => merge_user_info_claims(
                attributes,
                &user_info,
                separator,
                self.settings.log_user_claims(),
            ),
            Err(err) => error!(
                "failed to fetch user claims from {}: {}",
                user_info_url.as_str(),
                err
            ),
        }
    }
}
