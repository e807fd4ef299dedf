use crate::types::{ContextIdentifier, LoginType};

use serde::{Deserialize, Serialize};

const SEPARATOR: char = ',';

new_type![
    /// Value of the OAuth2 `state` parameter: `<context id>,<login type>`.
    ///
    /// The state is the only value that survives the round trip through the identity provider,
    /// so it is what correlates a callback with the flow context that issued the redirect. The
    /// first comma-separated segment is always the context identifier; the second, if present,
    /// names the authenticator that issued the redirect.
    #[derive(Deserialize, Hash, Serialize)]
    AuthorizationState(String)
    impl {
        /// Encodes the state for a new authorization (or logout) redirect.
        pub fn encode(context_id: &ContextIdentifier, login_type: &LoginType) -> Self {
            Self(format!(
                "{}{}{}",
                context_id.as_str(),
                SEPARATOR,
                login_type.as_str()
            ))
        }

        /// Returns the context identifier carried in the first segment.
        pub fn context_id(&self) -> ContextIdentifier {
            ContextIdentifier::new(
                self.0
                    .split(SEPARATOR)
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            )
        }

        /// Returns the login type carried in the second segment, if any.
        pub fn login_type(&self) -> Option<&str> {
            self.0.split(SEPARATOR).nth(1).filter(|segment| !segment.is_empty())
        }
    }
];
