use crate::context::ExternalIdp;
use crate::helpers::{flatten_claim_value, is_blank};
use crate::id_token::IdTokenClaims;
use crate::profile::IdpProfile;
use crate::token::TokenResponse;
use crate::types::SubjectIdentifier;

use log::{debug, warn};
use thiserror::Error;

use std::collections::BTreeMap;

/// JWT claims that describe the token rather than the user, never exposed as attributes.
pub const NON_USER_ATTRIBUTES: [&str; 6] = ["at_hash", "iss", "iat", "exp", "aud", "azp"];

/// Error reported by a [`ClaimDialectMapper`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ClaimMetadataError(pub String);

/// Error reported by an [`AttributeSeparatorSource`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SeparatorLookupError(pub String);

/// A claim of the OpenID Connect dialect and the local claim it maps to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalClaim {
    claim_uri: String,
    mapped_local_claim: String,
}

impl ExternalClaim {
    pub fn new(claim_uri: impl Into<String>, mapped_local_claim: impl Into<String>) -> Self {
        Self {
            claim_uri: claim_uri.into(),
            mapped_local_claim: mapped_local_claim.into(),
        }
    }

    pub fn claim_uri(&self) -> &str {
        &self.claim_uri
    }

    pub fn mapped_local_claim(&self) -> &str {
        &self.mapped_local_claim
    }
}

/// Claim metadata service: translates local claim URIs to the OpenID Connect dialect.
pub trait ClaimDialectMapper {
    /// Returns the OpenID Connect dialect claims defined for the tenant.
    fn oidc_claims(&self, tenant_domain: &str) -> Result<Vec<ExternalClaim>, ClaimMetadataError>;
}

impl<F> ClaimDialectMapper for F
where
    F: Fn(&str) -> Result<Vec<ExternalClaim>, ClaimMetadataError>,
{
    fn oidc_claims(&self, tenant_domain: &str) -> Result<Vec<ExternalClaim>, ClaimMetadataError> {
        self(tenant_domain)
    }
}

/// User store configuration: the separator used to store multi-valued attributes.
pub trait AttributeSeparatorSource {
    /// Returns the tenant's multi-attribute separator, or `None` if it has none configured.
    fn multi_attribute_separator(
        &self,
        tenant_domain: &str,
    ) -> Result<Option<String>, SeparatorLookupError>;
}

impl<F> AttributeSeparatorSource for F
where
    F: Fn(&str) -> Result<Option<String>, SeparatorLookupError>,
{
    fn multi_attribute_separator(
        &self,
        tenant_domain: &str,
    ) -> Result<Option<String>, SeparatorLookupError> {
        self(tenant_domain)
    }
}

/// Error resolving the authenticated subject.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubjectResolutionError {
    /// The claim metadata service failed while translating the user id claim.
    #[error("Failed to resolve the user id claim for identity provider `{idp}`")]
    ClaimDialect {
        /// Name of the identity provider being processed.
        idp: String,
        /// Error reported by the claim metadata service.
        #[source]
        source: ClaimMetadataError,
    },
    /// Neither the configured user id claim nor the fallback yielded a subject.
    #[error("Subject not found in ID token")]
    SubjectNotFound,
}

/// Resolves the subject and attributes of a federated user from ID token claims.
pub struct ClaimsResolver<'a> {
    dialect_mapper: &'a dyn ClaimDialectMapper,
    separator_source: &'a dyn AttributeSeparatorSource,
    default_separator: &'a str,
    log_user_claims: bool,
}

impl<'a> ClaimsResolver<'a> {
    pub fn new(
        dialect_mapper: &'a dyn ClaimDialectMapper,
        separator_source: &'a dyn AttributeSeparatorSource,
        default_separator: &'a str,
    ) -> Self {
        Self {
            dialect_mapper,
            separator_source,
            default_separator,
            log_user_claims: false,
        }
    }

    /// Enables debug logging of claim values.
    pub fn set_log_user_claims(mut self, log_user_claims: bool) -> Self {
        self.log_user_claims = log_user_claims;
        self
    }

    /// Resolves the subject, preferring the identity provider's user id claim when
    /// `user_id_in_claims` is set and falling back to the profile (by default, `sub`).
    pub fn resolve_subject(
        &self,
        idp: &ExternalIdp,
        tenant_domain: &str,
        user_id_in_claims: bool,
        claims: &IdTokenClaims,
        profile: &dyn IdpProfile,
        token_response: &TokenResponse,
    ) -> Result<SubjectIdentifier, SubjectResolutionError> {
        if user_id_in_claims {
            let subject = self
                .subject_from_user_id_claim(idp, tenant_domain, claims)
                .map_err(|source| SubjectResolutionError::ClaimDialect {
                    idp: idp.name().to_string(),
                    source,
                })?;
            if let Some(subject) = subject.filter(|s| !is_blank(s)) {
                debug!("authenticated user id `{}` was found among ID token claims", subject);
                return Ok(SubjectIdentifier::new(subject));
            }
            debug!(
                "user id claim not found among ID token claims of identity provider `{}`; \
                 using the fallback subject",
                idp.name()
            );
        }

        let subject = profile
            .resolve_fallback_subject(claims, token_response)
            .ok_or(SubjectResolutionError::SubjectNotFound)?;
        debug!("authenticated user id `{}` taken from the fallback subject claim", subject);
        Ok(SubjectIdentifier::new(subject))
    }

    /// Looks up the identity provider's user id claim in the decoded claims.
    ///
    /// Returns `Ok(None)` when the claim URI cannot be translated, is absent from the claims or
    /// is not a string.
    pub fn subject_from_user_id_claim(
        &self,
        idp: &ExternalIdp,
        tenant_domain: &str,
        claims: &IdTokenClaims,
    ) -> Result<Option<String>, ClaimMetadataError> {
        let Some(claim_uri) = self.user_id_claim_in_oidc_dialect(idp, tenant_domain)? else {
            debug!(
                "no OpenID Connect user id claim resolved for identity provider `{}`",
                idp.name()
            );
            return Ok(None);
        };
        debug!("looking up subject in ID token claim `{}`", claim_uri);

        match claims.get(&claim_uri) {
            Some(serde_json::Value::String(subject)) => Ok(Some(subject.clone())),
            Some(other) => {
                warn!("Unable to map subject claim (non-string type): {}", other);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn user_id_claim_in_oidc_dialect(
        &self,
        idp: &ExternalIdp,
        tenant_domain: &str,
    ) -> Result<Option<String>, ClaimMetadataError> {
        let user_id_claim_uri = idp.user_id_claim_uri().filter(|uri| !is_blank(uri));

        let local_claim = if idp.uses_local_dialect() {
            if user_id_claim_uri.is_none() {
                debug!(
                    "user id claim URI is not configured for identity provider `{}`",
                    idp.name()
                );
            }
            user_id_claim_uri
        } else {
            idp.claim_mappings()
                .iter()
                .find(|mapping| Some(mapping.remote_claim()) == user_id_claim_uri)
                .map(|mapping| mapping.local_claim())
        };

        let Some(local_claim) = local_claim else {
            return Ok(None);
        };
        // The last matching claim wins when several OIDC claims map to the same local claim.
        Ok(self
            .dialect_mapper
            .oidc_claims(tenant_domain)?
            .into_iter()
            .filter(|claim| claim.mapped_local_claim() == local_claim)
            .last()
            .map(|claim| claim.claim_uri))
    }

    /// Returns the tenant's multi-attribute separator, or the server default.
    pub fn attribute_separator(&self, tenant_domain: &str) -> Result<String, SeparatorLookupError> {
        let separator = self
            .separator_source
            .multi_attribute_separator(tenant_domain)?
            .filter(|separator| !is_blank(separator))
            .unwrap_or_else(|| self.default_separator.to_string());
        debug!(
            "using `{}` as the multi-attribute separator in tenant `{}`",
            separator, tenant_domain
        );
        Ok(separator)
    }

    /// Flattens the user claims into attributes, excluding [`NON_USER_ATTRIBUTES`].
    pub fn attributes(&self, claims: &IdTokenClaims, separator: &str) -> BTreeMap<String, String> {
        claims
            .iter()
            .filter(|(name, _)| !NON_USER_ATTRIBUTES.contains(&name.as_str()))
            .map(|(name, value)| {
                let value = flatten_claim_value(value, separator);
                if self.log_user_claims {
                    debug!("adding claim mapping: {} <> {} : {}", name, name, value);
                }
                (name.clone(), value)
            })
            .collect()
    }
}
