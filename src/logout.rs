use crate::state::AuthorizationState;
use crate::types::{EndSessionUrl, IdToken};
use crate::RedirectUrl;

use url::Url;

///
/// A request to the identity provider's end session endpoint, following [OpenID Connect
/// RP-Initiated Logout 1.0](https://openid.net/specs/openid-connect-rpinitiated-1_0.html).
///
pub struct LogoutRequest {
    end_session_endpoint: EndSessionUrl,
    parameters: LogoutRequestParameters,
}

#[derive(Default)]
struct LogoutRequestParameters {
    id_token_hint: Option<IdToken>,
    post_logout_redirect_uri: Option<RedirectUrl>,
    state: Option<AuthorizationState>,
}

impl From<EndSessionUrl> for LogoutRequest {
    fn from(value: EndSessionUrl) -> Self {
        LogoutRequest {
            end_session_endpoint: value,
            parameters: Default::default(),
        }
    }
}

impl LogoutRequest {
    ///
    /// Provides the ID token issued during the federated login as a hint about the user's
    /// identity. Omitted from the URL when `None`.
    ///
    pub fn set_id_token_hint(mut self, id_token_hint: Option<&IdToken>) -> Self {
        self.parameters.id_token_hint = id_token_hint.cloned();
        self
    }

    ///
    /// Where the identity provider sends the user agent once logout completes.
    ///
    pub fn set_post_logout_redirect_uri(mut self, redirect_uri: RedirectUrl) -> Self {
        self.parameters.post_logout_redirect_uri = Some(redirect_uri);
        self
    }

    pub fn set_state(mut self, state: AuthorizationState) -> Self {
        self.parameters.state = Some(state);
        self
    }

    ///
    /// Returns the full logout URL, to which the user agent should be redirected.
    ///
    pub fn http_get_url(self) -> Url {
        let mut url = self.end_session_endpoint.url().to_owned();
        {
            let mut query = url.query_pairs_mut();

            macro_rules! add_pair {
                ($name:ident, $acc:expr) => {
                    if let Some($name) = self.parameters.$name {
                        query.append_pair(stringify!($name), $acc);
                    }
                };
            }

            add_pair!(id_token_hint, id_token_hint.raw());
            add_pair!(post_logout_redirect_uri, post_logout_redirect_uri.as_str());
            add_pair!(state, state.as_str());
        }
        url
    }
}
