use crate::types::IdToken;

use base64::prelude::{BASE64_STANDARD_NO_PAD, BASE64_URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

const SUBJECT: &str = "sub";
const SESSION_ID: &str = "sid";

/// Error decoding the payload of an ID token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdTokenError {
    /// The token does not have a second `.`-separated segment.
    #[error("ID token has no payload segment")]
    MissingPayload,
    /// The payload is neither base64url nor base64.
    #[error("ID token payload is not valid base64")]
    Base64(#[source] base64::DecodeError),
    /// The payload is not valid JSON.
    #[error("Failed to parse ID token payload")]
    Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
    /// The payload is valid JSON but not an object.
    #[error("ID token payload is not a JSON object")]
    NotAnObject,
    /// The payload is an empty JSON object.
    #[error("ID token payload contains no claims")]
    EmptyClaims,
}

/// Claims decoded from an ID token payload.
///
/// The signature is not verified; the token is trusted because it was received directly from the
/// token endpoint over the back channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdTokenClaims(Map<String, Value>);

impl IdTokenClaims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the named claim if it is a JSON string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.get_str(SUBJECT)
    }

    /// The `sid` claim, identifying the session at the identity provider.
    pub fn session_id(&self) -> Option<&str> {
        self.get_str(SESSION_ID)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl IdToken {
    /// Decodes the payload segment of this token.
    ///
    /// Both base64url and standard base64 are accepted, with or without padding, since some
    /// identity providers do not follow the JWS encoding rules exactly.
    pub fn claims(&self) -> Result<IdTokenClaims, IdTokenError> {
        let payload = self
            .raw()
            .split('.')
            .nth(1)
            .ok_or(IdTokenError::MissingPayload)?
            .trim_end_matches('=');

        let decoded = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .or_else(|err| BASE64_STANDARD_NO_PAD.decode(payload).map_err(|_| err))
            .map_err(IdTokenError::Base64)?;

        let value: Value =
            serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&decoded))
                .map_err(IdTokenError::Parse)?;
        match value {
            Value::Object(claims) if claims.is_empty() => Err(IdTokenError::EmptyClaims),
            Value::Object(claims) => Ok(IdTokenClaims(claims)),
            _ => Err(IdTokenError::NotAnObject),
        }
    }
}
