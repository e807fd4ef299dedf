//! Resolution of the configurable extra query string appended to authorization requests.
//!
//! Templates support two placeholder grammars:
//!
//!  * `${name}` is replaced with the first value of the inbound request parameter `name`. The
//!    value is inserted as-is, without URL-encoding; deployed templates rely on this, so request
//!    values that need escaping must arrive pre-encoded.
//!  * `$authparam{name}` is replaced with the URL-encoded runtime parameter `name` (values
//!    supplied by the hosting framework outside of HTTP, e.g. by an adaptive policy).
//!
//! In both cases an unknown name resolves to the empty string. Names consist of ASCII letters,
//! digits and underscores; anything else is left in the output verbatim.

use crate::helpers::is_blank;
use crate::request::InboundRequest;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use std::collections::HashMap;

const REQUEST_PARAM_OPEN: &str = "${";
const AUTH_PARAM_OPEN: &str = "$authparam{";
const PLACEHOLDER_CLOSE: char = '}';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    RequestParam(&'a str),
    AuthParam(&'a str),
}

/// A tokenized query string template.
#[derive(Clone, Debug)]
pub struct QueryTemplate<'a> {
    segments: Vec<Segment<'a>>,
}

impl<'a> QueryTemplate<'a> {
    /// Splits the template into literal and placeholder segments in a single pass.
    pub fn parse(template: &'a str) -> Self {
        let mut segments = Vec::new();
        let mut literal_start = 0;
        let mut pos = 0;

        while let Some(offset) = template[pos..].find('$') {
            let dollar = pos + offset;
            let rest = &template[dollar..];

            let placeholder = if let Some(name) = placeholder_name(rest, REQUEST_PARAM_OPEN) {
                Some((Segment::RequestParam(name), REQUEST_PARAM_OPEN.len() + name.len() + 1))
            } else {
                placeholder_name(rest, AUTH_PARAM_OPEN)
                    .map(|name| (Segment::AuthParam(name), AUTH_PARAM_OPEN.len() + name.len() + 1))
            };

            match placeholder {
                Some((segment, len)) => {
                    if literal_start < dollar {
                        segments.push(Segment::Literal(&template[literal_start..dollar]));
                    }
                    segments.push(segment);
                    pos = dollar + len;
                    literal_start = pos;
                }
                None => pos = dollar + 1,
            }
        }
        if literal_start < template.len() {
            segments.push(Segment::Literal(&template[literal_start..]));
        }

        Self { segments }
    }

    /// Substitutes every placeholder and returns the resolved query string.
    pub fn resolve(
        &self,
        request: &InboundRequest,
        runtime_params: &HashMap<String, String>,
    ) -> String {
        self.segments
            .iter()
            .map(|segment| match *segment {
                Segment::Literal(text) => text.to_string(),
                Segment::RequestParam(name) => {
                    let value = request.param(name).unwrap_or_default();
                    debug!("resolved request parameter `{}` to `{}`", name, value);
                    value.to_string()
                }
                Segment::AuthParam(name) => {
                    let value = runtime_params
                        .get(name)
                        .map(String::as_str)
                        .unwrap_or_default();
                    let encoded = form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>();
                    debug!("resolved authenticator parameter `{}` to `{}`", name, encoded);
                    encoded
                }
            })
            .collect()
    }
}

// Returns the name of a `<open>name}` placeholder at the start of `input`.
fn placeholder_name<'a>(input: &'a str, open: &str) -> Option<&'a str> {
    let body = input.strip_prefix(open)?;
    let end = body.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))?;
    if end > 0 && body[end..].starts_with(PLACEHOLDER_CLOSE) {
        Some(&body[..end])
    } else {
        None
    }
}

/// Ordered query parameter map parsed from a resolved template.
///
/// Entries without `=` or with an empty name are dropped. A repeated name keeps its first
/// position and its last value.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits on `&`, then on the first `=` of each entry. Values are taken as-is (not decoded).
    pub fn parse(query: &str) -> Self {
        query
            .split('&')
            .filter_map(|entry| entry.split_once('='))
            .filter(|(name, _)| !name.is_empty())
            .fold(Self::new(), |mut params, (name, value)| {
                params.insert(name, value);
                params
            })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn contains_key_ignoring_case(&self, name: &str) -> bool {
        self.0
            .iter()
            .any(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Serializes back to a query string, URL-encoding every value.
    pub fn to_query_string(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    name,
                    form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>()
                )
            })
            .join("&")
    }
}

/// Resolves the configured extra query string (with the configured scopes appended as
/// `scope=...`) into a parameter map.
///
/// Returns `None` when there is nothing to resolve or the template resolves to a blank string.
pub fn resolve_query_params(
    template: Option<&str>,
    scopes: Option<&str>,
    request: &InboundRequest,
    runtime_params: &HashMap<String, String>,
) -> Option<QueryParams> {
    let mut raw = template.unwrap_or_default().to_string();
    if let Some(scopes) = scopes.filter(|s| !is_blank(s)) {
        raw.push_str("&scope=");
        raw.push_str(scopes);
    }
    if is_blank(&raw) {
        return None;
    }

    let resolved = QueryTemplate::parse(&raw).resolve(request, runtime_params);
    debug!("resolved query string template to `{}`", resolved);
    if is_blank(&resolved) {
        return None;
    }
    Some(QueryParams::parse(&resolved))
}

#[cfg(test)]
mod tests {
    use super::{resolve_query_params, QueryParams, QueryTemplate, Segment};
    use crate::request::InboundRequest;

    use pretty_assertions::assert_eq;

    use std::collections::HashMap;

    fn runtime(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            vec![
                Segment::Literal("a="),
                Segment::RequestParam("foo"),
                Segment::Literal("&b="),
                Segment::AuthParam("bar_1"),
            ],
            QueryTemplate::parse("a=${foo}&b=$authparam{bar_1}").segments
        );
        assert_eq!(
            vec![Segment::Literal("cost=$5&x=${not valid}&y=$authparam{}&z=${open")],
            QueryTemplate::parse("cost=$5&x=${not valid}&y=$authparam{}&z=${open").segments
        );
        assert!(QueryTemplate::parse("").segments.is_empty());
    }

    #[test]
    fn test_request_param_substitution() {
        let request = InboundRequest::new()
            .add_param("foo", "bar")
            .add_param("foo", "second")
            .add_param("raw", "a b&c");
        let template = QueryTemplate::parse("pre${foo}post");
        assert_eq!("prebarpost", template.resolve(&request, &HashMap::new()));

        let template = QueryTemplate::parse("x=${missing}&y=${raw}");
        assert_eq!("x=&y=a b&c", template.resolve(&request, &HashMap::new()));
    }

    #[test]
    fn test_auth_param_substitution_is_encoded_and_independent() {
        let request = InboundRequest::new().add_param("x", "from-request");
        let params = runtime(&[("x", "from policy&more"), ("empty", "")]);

        let template = QueryTemplate::parse("a=$authparam{x}&b=${x}&c=$authparam{empty}&d=$authparam{nope}");
        assert_eq!(
            "a=from+policy%26more&b=from-request&c=&d=",
            template.resolve(&request, &params)
        );
    }

    #[test]
    fn test_resolved_values_are_not_rescanned() {
        let request = InboundRequest::new().add_param("a", "${b}").add_param("b", "nope");
        let template = QueryTemplate::parse("v=${a}");
        assert_eq!("v=${b}", template.resolve(&request, &HashMap::new()));
    }

    #[test]
    fn test_query_params_parse() {
        let params = QueryParams::parse("a=1&flag&=orphan&b=x=y&a=2&c=");
        assert_eq!(
            vec![("a", "2"), ("b", "x=y"), ("c", "")],
            params.iter().collect::<Vec<_>>()
        );
        assert_eq!(Some("x=y"), params.get("b"));
        assert!(params.contains_key_ignoring_case("B"));
        assert_eq!("a=2&b=x%3Dy&c=", params.to_query_string());
    }

    #[test]
    fn test_resolve_query_params_appends_scopes() {
        let request = InboundRequest::new().add_param("login_hint", "alice@example.com");

        let params = resolve_query_params(
            Some("login_hint=${login_hint}"),
            Some("openid email"),
            &request,
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(Some("alice@example.com"), params.get("login_hint"));
        assert_eq!(Some("openid email"), params.get("scope"));
        assert_eq!(
            "login_hint=alice%40example.com&scope=openid+email",
            params.to_query_string()
        );

        let params =
            resolve_query_params(None, Some("openid"), &request, &HashMap::new()).unwrap();
        assert_eq!(vec![("scope", "openid")], params.iter().collect::<Vec<_>>());

        assert_eq!(
            None,
            resolve_query_params(None, Some("  "), &request, &HashMap::new())
        );
        assert_eq!(
            None,
            resolve_query_params(Some("${missing}"), None, &request, &HashMap::new())
        );
    }
}
