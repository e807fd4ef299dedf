use serde::{Deserialize, Serialize};

new_type![
    /// Identifier of the end user, as asserted by the federated identity provider.
    ///
    /// A resolved subject is never empty; an absent subject is reported as an error instead.
    #[derive(Deserialize, Hash, Ord, PartialOrd, Serialize)]
    SubjectIdentifier(String)
];

new_type![
    /// Tag appended to the `state` parameter that identifies which authenticator issued the
    /// authorization redirect (e.g., `OIDC`).
    #[derive(Deserialize, Hash, Serialize)]
    LoginType(String)
];

new_type![
    /// Opaque identifier of the caller-owned flow context, carried through the identity
    /// provider inside the `state` parameter.
    #[derive(Deserialize, Hash, Serialize)]
    ContextIdentifier(String)
];

new_type![
    /// Compact serialization of an ID token issued by the identity provider.
    #[derive(Deserialize, Serialize)]
    IdToken(String)
    impl {
        /// Returns the compact JWT serialization.
        pub fn raw(&self) -> &str {
            &self.0
        }
    }
];

new_url_type![
    /// Public base URL of the hosting server (e.g., `https://localhost:9443`).
    ServerUrl
];

new_url_type![
    /// URL of the identity provider's UserInfo endpoint.
    UserInfoUrl
];

new_url_type![
    /// URL for the [OpenID Connect RP-Initiated Logout 1.0](
    /// https://openid.net/specs/openid-connect-rpinitiated-1_0.html) end session endpoint.
    EndSessionUrl
];
