use crate::config::AuthenticatorConfig;
use crate::template::QueryParams;
use crate::types::{ContextIdentifier, IdToken, SubjectIdentifier};
use crate::{AccessToken, RefreshToken};

use chrono::{DateTime, Utc};

use std::collections::{BTreeMap, HashMap};

/// Mapping of a claim URI used by the identity provider to the local claim URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimMapping {
    remote_claim: String,
    local_claim: String,
}

impl ClaimMapping {
    pub fn new(remote_claim: impl Into<String>, local_claim: impl Into<String>) -> Self {
        Self {
            remote_claim: remote_claim.into(),
            local_claim: local_claim.into(),
        }
    }

    pub fn remote_claim(&self) -> &str {
        &self.remote_claim
    }

    pub fn local_claim(&self) -> &str {
        &self.local_claim
    }
}

/// Descriptor of the external identity provider this flow federates to, as resolved by the
/// hosting framework.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalIdp {
    name: String,
    claim_mappings: Vec<ClaimMapping>,
    uses_local_dialect: bool,
    user_id_claim_uri: Option<String>,
}

impl ExternalIdp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn set_claim_mappings(mut self, claim_mappings: Vec<ClaimMapping>) -> Self {
        self.claim_mappings = claim_mappings;
        self
    }

    /// Whether the identity provider's claims are expressed in the local claim dialect.
    pub fn set_uses_local_dialect(mut self, uses_local_dialect: bool) -> Self {
        self.uses_local_dialect = uses_local_dialect;
        self
    }

    /// Claim URI that identifies the user, in the identity provider's dialect.
    pub fn set_user_id_claim_uri(mut self, uri: Option<String>) -> Self {
        self.user_id_claim_uri = uri;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn claim_mappings(&self) -> &[ClaimMapping] {
        &self.claim_mappings
    }

    pub fn uses_local_dialect(&self) -> bool {
        self.uses_local_dialect
    }

    pub fn user_id_claim_uri(&self) -> Option<&str> {
        self.user_id_claim_uri.as_deref()
    }
}

/// The user authenticated by the identity provider, with flattened attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedSubject {
    subject: SubjectIdentifier,
    attributes: BTreeMap<String, String>,
}

impl AuthenticatedSubject {
    pub fn new(subject: SubjectIdentifier, attributes: BTreeMap<String, String>) -> Self {
        Self {
            subject,
            attributes,
        }
    }

    pub fn subject(&self) -> &SubjectIdentifier {
        &self.subject
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Per-flow state owned by the caller and carried across the redirect to the identity provider.
///
/// The authenticator never creates or retains a context. It reads the inputs the framework put
/// here and writes its results back into designated slots.
#[derive(Clone, Debug)]
pub struct FlowContext {
    context_id: ContextIdentifier,
    tenant_domain: Option<String>,
    external_idp: ExternalIdp,
    authenticator_config: Option<AuthenticatorConfig>,
    runtime_params: HashMap<String, String>,
    logout_request: bool,
    retrying: bool,
    current_authenticator: Option<String>,
    last_failed_authenticator: Option<String>,
    query_params: Option<QueryParams>,
    access_token: Option<AccessToken>,
    id_token: Option<IdToken>,
    refresh_token: Option<RefreshToken>,
    granted_scope: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    federated_session_ids: HashMap<String, String>,
    subject: Option<AuthenticatedSubject>,
}

impl FlowContext {
    pub fn new(context_id: ContextIdentifier, external_idp: ExternalIdp) -> Self {
        Self {
            context_id,
            tenant_domain: None,
            external_idp,
            authenticator_config: None,
            runtime_params: HashMap::new(),
            logout_request: false,
            retrying: false,
            current_authenticator: None,
            last_failed_authenticator: None,
            query_params: None,
            access_token: None,
            id_token: None,
            refresh_token: None,
            granted_scope: None,
            expires_at: None,
            federated_session_ids: HashMap::new(),
            subject: None,
        }
    }

    pub fn set_tenant_domain(mut self, tenant_domain: Option<String>) -> Self {
        self.tenant_domain = tenant_domain;
        self
    }

    pub fn set_authenticator_config(mut self, config: Option<AuthenticatorConfig>) -> Self {
        self.authenticator_config = config;
        self
    }

    /// Parameters supplied outside of HTTP (e.g., by an adaptive authentication policy), used to
    /// resolve `$authparam{name}` placeholders.
    pub fn set_runtime_params(mut self, runtime_params: HashMap<String, String>) -> Self {
        self.runtime_params = runtime_params;
        self
    }

    pub fn set_logout_request(mut self, logout_request: bool) -> Self {
        self.logout_request = logout_request;
        self
    }

    /// Name of the authenticator that failed last in this flow, if any.
    pub fn set_last_failed_authenticator(mut self, name: Option<String>) -> Self {
        self.last_failed_authenticator = name;
        self
    }

    pub fn context_id(&self) -> &ContextIdentifier {
        &self.context_id
    }

    pub fn tenant_domain(&self) -> Option<&str> {
        self.tenant_domain.as_deref()
    }

    pub fn external_idp(&self) -> &ExternalIdp {
        &self.external_idp
    }

    pub fn authenticator_config(&self) -> Option<&AuthenticatorConfig> {
        self.authenticator_config.as_ref()
    }

    pub fn runtime_params(&self) -> &HashMap<String, String> {
        &self.runtime_params
    }

    pub fn is_logout_request(&self) -> bool {
        self.logout_request
    }

    /// Whether the last redirect was issued as a retry after this authenticator failed.
    pub fn is_retrying(&self) -> bool {
        self.retrying
    }

    pub fn current_authenticator(&self) -> Option<&str> {
        self.current_authenticator.as_deref()
    }

    pub fn last_failed_authenticator(&self) -> Option<&str> {
        self.last_failed_authenticator.as_deref()
    }

    /// Extra query parameters resolved when the authorization redirect was built.
    pub fn query_params(&self) -> Option<&QueryParams> {
        self.query_params.as_ref()
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    pub fn id_token(&self) -> Option<&IdToken> {
        self.id_token.as_ref()
    }

    /// ID token sent as `id_token_hint` when logging out of the identity provider.
    pub fn id_token_hint(&self) -> Option<&IdToken> {
        self.id_token.as_ref().filter(|token| !token.trim().is_empty())
    }

    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    pub fn granted_scope(&self) -> Option<&str> {
        self.granted_scope.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Identity provider session id (the ID token's `sid` claim) for the named identity provider.
    pub fn federated_session_id(&self, idp_name: &str) -> Option<&str> {
        self.federated_session_ids.get(idp_name).map(String::as_str)
    }

    pub fn subject(&self) -> Option<&AuthenticatedSubject> {
        self.subject.as_ref()
    }

    pub(crate) fn set_retrying(&mut self, retrying: bool) {
        self.retrying = retrying;
    }

    pub(crate) fn set_current_authenticator(&mut self, name: &str) {
        self.current_authenticator = Some(name.to_string());
    }

    pub(crate) fn set_query_params(&mut self, query_params: Option<QueryParams>) {
        self.query_params = query_params;
    }

    pub(crate) fn set_access_token(&mut self, access_token: AccessToken) {
        self.access_token = Some(access_token);
    }

    pub(crate) fn set_id_token(&mut self, id_token: Option<IdToken>) {
        self.id_token = id_token;
    }

    pub(crate) fn set_refresh_token(&mut self, refresh_token: Option<RefreshToken>) {
        self.refresh_token = refresh_token;
    }

    pub(crate) fn set_granted_scope(&mut self, scope: Option<String>) {
        self.granted_scope = scope;
    }

    pub(crate) fn set_expires_at(&mut self, expires_at: Option<DateTime<Utc>>) {
        self.expires_at = expires_at;
    }

    pub(crate) fn set_federated_session_id(&mut self, idp_name: &str, session_id: &str) {
        self.federated_session_ids
            .insert(idp_name.to_string(), session_id.to_string());
    }

    pub(crate) fn set_subject(&mut self, subject: AuthenticatedSubject) {
        self.subject = Some(subject);
    }
}
