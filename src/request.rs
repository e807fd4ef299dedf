use crate::helpers::is_blank;
use crate::state::AuthorizationState;

use url::{form_urlencoded, Url};

use std::collections::HashMap;

pub(crate) const CODE: &str = "code";
pub(crate) const ERROR: &str = "error";
pub(crate) const ERROR_DESCRIPTION: &str = "error_description";
pub(crate) const STATE: &str = "state";
pub(crate) const DOMAIN: &str = "domain";

/// Parameters of the HTTP request being handled, as seen by the authenticator.
///
/// The hosting framework owns the actual HTTP exchange; this only carries the query/form
/// parameters (in arrival order per name) and the framework's "already handled" marker.
#[derive(Clone, Debug, Default)]
pub struct InboundRequest {
    params: HashMap<String, Vec<String>>,
    handled: bool,
}

impl InboundRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    pub fn from_query(query: &str) -> Self {
        form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .fold(Self::new(), |request, (name, value)| {
                request.add_param(name, value)
            })
    }

    /// Collects the query parameters of a request URL.
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    pub fn add_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Marks the request as one the framework has already decided this authenticator handles.
    pub fn set_handled(mut self, handled: bool) -> Self {
        self.handled = handled;
        self
    }

    pub fn handled(&self) -> bool {
        self.handled
    }

    /// Returns the first value of the named parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns every value of the named parameter, in arrival order.
    pub fn params(&self, name: &str) -> &[String] {
        self.params.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn has_non_blank(&self, name: &str) -> bool {
        self.param(name).map(|value| !is_blank(value)).unwrap_or(false)
    }

    /// The `state` parameter, if present.
    pub fn state(&self) -> Option<AuthorizationState> {
        self.param(STATE)
            .map(|state| AuthorizationState::new(state.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::InboundRequest;

    use pretty_assertions::assert_eq;
    use url::Url;

    #[test]
    fn test_from_query_keeps_value_order() {
        let request = InboundRequest::from_query("?a=1&b=x%20y&a=2&empty=");
        assert_eq!(Some("1"), request.param("a"));
        assert_eq!(&["1".to_string(), "2".to_string()], request.params("a"));
        assert_eq!(Some("x y"), request.param("b"));
        assert_eq!(Some(""), request.param("empty"));
        assert!(!request.has_non_blank("empty"));
        assert!(request.params("missing").is_empty());
    }

    #[test]
    fn test_from_url_state() {
        let url = Url::parse("https://is.example/commonauth?state=abc123%2COIDC&code=XYZ").unwrap();
        let request = InboundRequest::from_url(&url);
        let state = request.state().unwrap();
        assert_eq!("abc123", state.context_id().as_str());
        assert_eq!(Some("OIDC"), state.login_type());
        assert!(request.has_non_blank("code"));
        assert!(!request.handled());
    }
}
