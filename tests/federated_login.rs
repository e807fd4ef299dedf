use http::header::{AUTHORIZATION, ORIGIN};
use http::{Method, StatusCode};
use oidc_federation::{
    AuthenticationError, AuthenticatorConfig, ClaimMapping, ContextIdentifier, ExternalIdp,
    FlowContext, FlowError, FlowStatus, InboundRequest, SubjectClaimProfile, TokenExchangeError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;

use std::collections::HashMap;


use fed_common::{
    authenticator, config, id_token, init_log, new_context, FakeHttpError, FakeIdentityProvider,
    CLIENT_ID, IDP_NAME, LOCAL_EMAIL_CLAIM, SERVER_URL, TOKEN_ENDPOINT, USER_INFO_ENDPOINT,
};

fn redirect_url(status: FlowStatus) -> Url {
    match status {
        FlowStatus::Redirect(url) => url,
        other => panic!("expected a redirect, got {:?}", other),
    }
}

fn query_pairs(url: &Url) -> Vec<(String, String)> {
    url.query_pairs().into_owned().collect()
}

fn authentication_error(err: FlowError<FakeHttpError>) -> AuthenticationError<FakeHttpError> {
    match err {
        FlowError::Authentication(err) => err,
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_initial_request_redirects_with_state() {
    init_log("initial_request_redirects_with_state");

    let authenticator = authenticator();
    let mut context = new_context("abc123", config());
    let request = InboundRequest::from_query("state=abc123,OIDC");
    let idp = FakeIdentityProvider::new(json!({}));

    assert!(authenticator.is_initial_request(&request, &context));
    assert!(authenticator.can_handle(&request));

    let url = redirect_url(
        authenticator
            .process(&request, &mut context, &idp.http_client())
            .unwrap(),
    );
    log_info!("authorization URL: {}", url);

    assert!(url
        .as_str()
        .starts_with("https://idp.example/authorize?state=abc123%2COIDC&response_type=code&"));
    assert_eq!(
        vec![
            ("state".to_string(), "abc123,OIDC".to_string()),
            ("response_type".to_string(), "code".to_string()),
            ("client_id".to_string(), CLIENT_ID.to_string()),
            (
                "redirect_uri".to_string(),
                format!("{}/commonauth", SERVER_URL)
            ),
            ("scope".to_string(), "openid".to_string()),
        ],
        query_pairs(&url)
    );
    assert!(idp.requests().is_empty());
}

#[test]
fn test_scope_and_redirect_uri_appear_once() {
    init_log("scope_and_redirect_uri_appear_once");

    let authenticator = authenticator();
    for template in [
        None,
        Some("scope=x"),
        Some("redirect_uri=https://rp.example/cb"),
        Some("scope=x&redirect_uri=https://rp.example/cb"),
    ] {
        let mut context = new_context(
            "abc123",
            config().set_query_params(template.map(ToString::to_string)),
        );
        let url = redirect_url(
            authenticator
                .process(
                    &InboundRequest::from_query("state=abc123,OIDC"),
                    &mut context,
                    &FakeIdentityProvider::new(json!({})).http_client(),
                )
                .unwrap(),
        );
        log_info!("template {:?} -> {}", template, url);

        let pairs = query_pairs(&url);
        for name in ["scope", "redirect_uri"] {
            assert_eq!(
                1,
                pairs.iter().filter(|(key, _)| key == name).count(),
                "`{}` in {}",
                name,
                url
            );
        }
    }
}

#[test]
fn test_runtime_and_request_parameters_in_template() {
    init_log("runtime_and_request_parameters_in_template");

    let authenticator = authenticator();
    let mut runtime_params = HashMap::new();
    runtime_params.insert("acr".to_string(), "mfa".to_string());
    let mut context = new_context(
        "abc123",
        config().set_query_params(Some(
            "login_hint=${username}&acr_values=$authparam{acr}&ui=${missing}".to_string(),
        )),
    )
    .set_runtime_params(runtime_params);

    let url = redirect_url(
        authenticator
            .process(
                &InboundRequest::from_query("state=abc123,OIDC&username=alice"),
                &mut context,
                &FakeIdentityProvider::new(json!({})).http_client(),
            )
            .unwrap(),
    );

    let pairs = query_pairs(&url);
    assert!(pairs.contains(&("login_hint".to_string(), "alice".to_string())));
    assert!(pairs.contains(&("acr_values".to_string(), "mfa".to_string())));
    assert!(pairs.contains(&("ui".to_string(), String::new())));
}

#[test]
fn test_callback_resolves_subject_and_stores_tokens() {
    init_log("callback_resolves_subject_and_stores_tokens");

    let authenticator = authenticator();
    let mut context = new_context("abc123", config());
    let idp = FakeIdentityProvider::new(json!({
        "access_token": "AT1",
        "token_type": "Bearer",
        "id_token": id_token(json!({"sub": "user42"})),
    }));
    let callback = InboundRequest::from_query("code=XYZ&state=abc123,OIDC");

    assert!(!authenticator.is_initial_request(&callback, &context));
    assert_eq!(
        Some(ContextIdentifier::new("abc123".to_string())),
        authenticator.context_identifier(&callback)
    );

    let status = authenticator
        .process(&callback, &mut context, &idp.http_client())
        .unwrap();
    assert_eq!(FlowStatus::Completed, status);

    let subject = context.subject().unwrap();
    assert_eq!("user42", subject.subject().as_str());
    assert_eq!(Some("user42"), subject.attribute("sub"));
    assert_eq!("AT1", context.access_token().unwrap().secret().as_str());

    let requests = idp.requests();
    assert_eq!(1, requests.len());
    assert_eq!(Method::POST, requests[0].method);
    assert_eq!(TOKEN_ENDPOINT, requests[0].uri);
    assert_eq!(SERVER_URL, requests[0].headers[ORIGIN].to_str().unwrap());
    assert!(requests[0]
        .form
        .contains(&("code".to_string(), "XYZ".to_string())));
}

#[test]
fn test_subject_from_configured_user_id_claim() {
    init_log("subject_from_configured_user_id_claim");

    let authenticator = authenticator();
    let new_context = |idp: ExternalIdp| {
        FlowContext::new(ContextIdentifier::new("abc123".to_string()), idp)
            .set_authenticator_config(Some(config().set_user_id_in_claims(true)))
    };
    let callback = InboundRequest::from_query("code=XYZ&state=abc123,OIDC");

    // Identity provider configured with local claim URIs.
    let mut context = new_context(
        ExternalIdp::new(IDP_NAME)
            .set_uses_local_dialect(true)
            .set_user_id_claim_uri(Some(LOCAL_EMAIL_CLAIM.to_string())),
    );
    let idp = FakeIdentityProvider::new(json!({
        "access_token": "AT1",
        "id_token": id_token(json!({"sub": "user42", "email": "u@example.com"})),
    }));
    authenticator
        .process(&callback, &mut context, &idp.http_client())
        .unwrap();
    assert_eq!(
        "u@example.com",
        context.subject().unwrap().subject().as_str()
    );

    // Identity provider with its own claim names mapped to local claims.
    let mut context = new_context(
        ExternalIdp::new(IDP_NAME)
            .set_claim_mappings(vec![ClaimMapping::new("mail", LOCAL_EMAIL_CLAIM)])
            .set_user_id_claim_uri(Some("mail".to_string())),
    );
    authenticator
        .process(&callback, &mut context, &idp.http_client())
        .unwrap();
    assert_eq!(
        "u@example.com",
        context.subject().unwrap().subject().as_str()
    );

    // Falls back to `sub` when the claim is absent.
    let idp = FakeIdentityProvider::new(json!({
        "access_token": "AT1",
        "id_token": id_token(json!({"sub": "user42"})),
    }));
    let mut context = new_context(
        ExternalIdp::new(IDP_NAME)
            .set_uses_local_dialect(true)
            .set_user_id_claim_uri(Some(LOCAL_EMAIL_CLAIM.to_string())),
    );
    authenticator
        .process(&callback, &mut context, &idp.http_client())
        .unwrap();
    assert_eq!("user42", context.subject().unwrap().subject().as_str());
}

#[test]
fn test_subject_claim_profile() {
    init_log("subject_claim_profile");

    let authenticator = authenticator().set_profile(SubjectClaimProfile::new("preferred_username"));
    let mut context = new_context("abc123", config());
    let idp = FakeIdentityProvider::new(json!({
        "access_token": "AT1",
        "id_token": id_token(json!({"sub": "opaque-1", "preferred_username": "alice"})),
    }));

    authenticator
        .process(
            &InboundRequest::from_query("code=XYZ&state=abc123,OIDC"),
            &mut context,
            &idp.http_client(),
        )
        .unwrap();
    assert_eq!("alice", context.subject().unwrap().subject().as_str());
}

#[test]
fn test_form_encoded_token_response() {
    init_log("form_encoded_token_response");

    let authenticator = authenticator();
    let mut context = new_context("abc123", config());
    let body = format!(
        "access_token=AT1&expires_in=60&id_token={}",
        id_token(json!({"sub": "user42"}))
    );
    let idp = FakeIdentityProvider::with_raw_token_response(
        StatusCode::OK,
        &body,
        "application/x-www-form-urlencoded; charset=UTF-8",
    );

    authenticator
        .process(
            &InboundRequest::from_query("code=XYZ&state=abc123,OIDC"),
            &mut context,
            &idp.http_client(),
        )
        .unwrap();
    assert_eq!("user42", context.subject().unwrap().subject().as_str());
    assert!(context.expires_at().is_some());
}

#[test]
fn test_token_endpoint_error() {
    init_log("token_endpoint_error");

    let authenticator = authenticator();
    let mut context = new_context("abc123", config());
    let idp = FakeIdentityProvider::with_raw_token_response(
        StatusCode::BAD_REQUEST,
        r#"{"error":"invalid_grant","error_description":"code expired"}"#,
        "application/json",
    );

    let err = authentication_error(
        authenticator
            .process(
                &InboundRequest::from_query("code=XYZ&state=abc123,OIDC"),
                &mut context,
                &idp.http_client(),
            )
            .unwrap_err(),
    );
    log_info!("token endpoint error: {}", err);

    assert_eq!("OIDC-60004", err.code());
    assert!(matches!(
        err,
        AuthenticationError::TokenExchange(TokenExchangeError::ServerResponse(_))
    ));
    assert!(context.subject().is_none());
    assert!(context.access_token().is_none());
}

#[test]
fn test_missing_id_token_fails() {
    init_log("missing_id_token_fails");

    let authenticator = authenticator();
    let mut context = new_context("abc123", config());
    let idp = FakeIdentityProvider::new(json!({"access_token": "AT1", "id_token": ""}));

    let err = authentication_error(
        authenticator
            .process(
                &InboundRequest::from_query("code=XYZ&state=abc123,OIDC"),
                &mut context,
                &idp.http_client(),
            )
            .unwrap_err(),
    );
    assert!(matches!(err, AuthenticationError::IdTokenMissing { .. }));
    assert!(context.subject().is_none());
}

#[test]
fn test_user_info_claims_and_basic_auth() {
    init_log("user_info_claims_and_basic_auth");

    let authenticator = authenticator();
    let mut properties = HashMap::new();
    for (key, value) in [
        ("ClientId", CLIENT_ID),
        ("ClientSecret", "s3cr3t"),
        ("OAuth2AuthzEPUrl", "https://idp.example/authorize"),
        ("OAuth2TokenEPUrl", TOKEN_ENDPOINT),
        ("UserInfoUrl", USER_INFO_ENDPOINT),
        ("IsBasicAuthEnabled", "true"),
    ] {
        properties.insert(key.to_string(), value.to_string());
    }
    let config = AuthenticatorConfig::from_properties(&properties).unwrap();
    let mut context = new_context("abc123", config);
    let idp = FakeIdentityProvider::new(json!({
        "access_token": "AT1",
        "id_token": id_token(json!({"sub": "user42", "iss": "https://idp.example"})),
    }))
    .set_user_info(json!({"groups": ["admin", "dev"], "nickname": null}));

    authenticator
        .process(
            &InboundRequest::from_query("code=XYZ&state=abc123,OIDC"),
            &mut context,
            &idp.http_client(),
        )
        .unwrap();

    let subject = context.subject().unwrap();
    assert_eq!(Some("admin,,,dev"), subject.attribute("groups"));
    assert_eq!(None, subject.attribute("nickname"));
    assert_eq!(None, subject.attribute("iss"));

    let requests = idp.requests();
    assert_eq!(2, requests.len());
    assert_eq!(
        "Basic Y2xpZW50OnMzY3IzdA==",
        requests[0].headers[AUTHORIZATION].to_str().unwrap()
    );
    assert!(!requests[0]
        .form
        .iter()
        .any(|(key, _)| key == "client_secret"));
    assert_eq!(Method::GET, requests[1].method);
    assert_eq!(USER_INFO_ENDPOINT, requests[1].uri);
    assert_eq!(
        "Bearer AT1",
        requests[1].headers[AUTHORIZATION].to_str().unwrap()
    );
}
