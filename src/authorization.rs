use crate::helpers::is_blank;
use crate::state::AuthorizationState;
use crate::template::QueryParams;
use crate::{AuthUrl, ClientId, RedirectUrl};

use url::Url;

pub(crate) const OPENID_SCOPE: &str = "openid";
const RESPONSE_TYPE_CODE: &str = "code";
const SCOPE: &str = "scope";
const REDIRECT_URI: &str = "redirect_uri";
const FEDERATED_IDP_HINT: &str = "fidp";

/// Authorization code request to the identity provider's authorization endpoint.
///
/// `scope` and `redirect_uri` are only added when the extra query parameters do not already
/// carry them, so that the identity provider never sees either key twice:
///
/// | extra parameters contain | added by the builder |
/// |---|---|
/// | `scope` and `redirect_uri` | neither |
/// | `scope` only | `redirect_uri` |
/// | `redirect_uri` only | `scope=openid` |
/// | neither | both |
#[derive(Clone, Debug)]
pub struct AuthorizationRequest<'a> {
    auth_url: &'a AuthUrl,
    client_id: &'a ClientId,
    redirect_url: RedirectUrl,
    state: AuthorizationState,
    scope: Option<String>,
    domain_hint: Option<String>,
    extra_params: Option<&'a QueryParams>,
}

impl<'a> AuthorizationRequest<'a> {
    pub fn new(
        auth_url: &'a AuthUrl,
        client_id: &'a ClientId,
        redirect_url: RedirectUrl,
        state: AuthorizationState,
    ) -> Self {
        Self {
            auth_url,
            client_id,
            redirect_url,
            state,
            scope: None,
            domain_hint: None,
            extra_params: None,
        }
    }

    /// Scope to request when the extra parameters don't specify one. Blank means `openid`.
    pub fn set_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Federated identity provider hint, sent as `fidp`.
    pub fn set_domain_hint(mut self, domain: Option<String>) -> Self {
        self.domain_hint = domain;
        self
    }

    /// Resolved extra query parameters, appended after everything else.
    pub fn set_extra_params(mut self, extra_params: Option<&'a QueryParams>) -> Self {
        self.extra_params = extra_params;
        self
    }

    /// Returns the URL to redirect the user agent to.
    pub fn url(self) -> Url {
        let extra_params = self.extra_params.filter(|params| !params.is_empty());
        let has_scope = extra_params
            .map(|params| params.contains_key_ignoring_case(SCOPE))
            .unwrap_or(false);
        let has_redirect_uri = extra_params
            .map(|params| params.contains_key_ignoring_case(REDIRECT_URI))
            .unwrap_or(false);

        let mut url = self.auth_url.url().clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("state", self.state.as_str())
                .append_pair("response_type", RESPONSE_TYPE_CODE)
                .append_pair("client_id", self.client_id.as_str());

            if !has_redirect_uri {
                query.append_pair(REDIRECT_URI, self.redirect_url.as_str());
            }
            if !has_scope {
                let scope = if has_redirect_uri {
                    OPENID_SCOPE
                } else {
                    self.scope
                        .as_deref()
                        .filter(|scope| !is_blank(scope))
                        .unwrap_or(OPENID_SCOPE)
                };
                query.append_pair(SCOPE, scope);
            }
            if let Some(domain) = self.domain_hint.as_deref().filter(|d| !is_blank(d)) {
                query.append_pair(FEDERATED_IDP_HINT, domain);
            }
        }

        // Extra values are already encoded; appending them through the serializer would escape
        // them a second time.
        if let Some(extra) = extra_params.map(QueryParams::to_query_string) {
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => {
                    if extra.starts_with('&') {
                        format!("{}{}", existing, extra)
                    } else {
                        format!("{}&{}", existing, extra)
                    }
                }
                _ => extra.trim_start_matches('&').to_string(),
            };
            url.set_query(Some(&query));
        }
        url
    }
}

/// Decodes the query string of an authorization URL into ordered pairs.
#[cfg(test)]
pub(crate) fn query_pairs(url: &Url) -> Vec<(String, String)> {
    url::form_urlencoded::parse(url.query().unwrap_or_default().as_bytes())
        .into_owned()
        .collect()
}
