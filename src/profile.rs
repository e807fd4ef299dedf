use crate::helpers::is_blank;
use crate::id_token::IdTokenClaims;
use crate::token::TokenResponse;
use crate::types::IdToken;
use crate::AccessToken;

/// Provider-specific hooks for reading a token response.
///
/// Most identity providers follow OpenID Connect closely enough for [`StandardProfile`]. A
/// provider that returns its tokens or user identifier somewhere else gets its own profile,
/// selected per identity provider when the authenticator is configured.
pub trait IdpProfile {
    /// Returns the access token to use for the UserInfo request. `None` fails the flow.
    fn extract_access_token(&self, response: &TokenResponse) -> Option<AccessToken> {
        response
            .access_token()
            .filter(|token| !is_blank(token.secret()))
            .cloned()
    }

    /// Returns the ID token, if the response carries one.
    fn extract_id_token(&self, response: &TokenResponse) -> Option<IdToken> {
        response
            .id_token()
            .filter(|token| !is_blank(token))
            .map(|token| IdToken::new(token.to_string()))
    }

    /// Returns the subject to use when no configured user id claim applies.
    ///
    /// `claims` is empty when the identity provider returned no ID token.
    fn resolve_fallback_subject(
        &self,
        claims: &IdTokenClaims,
        _response: &TokenResponse,
    ) -> Option<String> {
        claims.subject().map(ToString::to_string)
    }
}

/// Reads `access_token` and `id_token` from the token response and falls back to the `sub`
/// claim.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardProfile;

impl IdpProfile for StandardProfile {}

/// Like [`StandardProfile`], but falls back to a different string claim (e.g., `email`) for
/// providers whose `sub` is not a usable identifier.
#[derive(Clone, Debug)]
pub struct SubjectClaimProfile {
    claim: String,
}

impl SubjectClaimProfile {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
        }
    }
}

impl IdpProfile for SubjectClaimProfile {
    fn resolve_fallback_subject(
        &self,
        claims: &IdTokenClaims,
        _response: &TokenResponse,
    ) -> Option<String> {
        claims.get_str(&self.claim).map(ToString::to_string)
    }
}
