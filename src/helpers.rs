use itertools::Itertools;
use serde::de::{self, Deserializer, Visitor};
use serde_json::Value;

use std::fmt;

// Property maps are stringly typed, so booleans usually arrive as "true"/"false". Anything other
// than a case-insensitive "true" is false, matching how the identity server parses flags.
pub(crate) mod serde_string_bool {
    use serde::{de, Deserializer};

    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FlagVisitor;

        impl<'de> de::Visitor<'de> for FlagVisitor {
            type Value = bool;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a boolean or a \"true\"/\"false\" string")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.trim().eq_ignore_ascii_case("true"))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(false)
            }
        }
        deserializer.deserialize_any(FlagVisitor)
    }
}

// Some token endpoints return `expires_in` as a string.
pub(crate) fn deserialize_number_or_string_opt<'de, D>(
    deserializer: D,
) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct NumberLikeVisitor;

    impl<'de> Visitor<'de> for NumberLikeVisitor {
        type Value = Option<u64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a non-negative number or numeric string")
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_finite() && v >= 0.0 {
                Ok(Some(v as u64))
            } else {
                Err(E::custom(format!("invalid expiry `{}`", v)))
            }
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed.parse().map(Some).map_err(E::custom)
            }
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(self)
        }
    }

    deserializer.deserialize_option(NumberLikeVisitor)
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Returns the value if it contains anything other than whitespace.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !is_blank(v))
}

/// Renders a claim value as a single attribute string.
///
/// Arrays are joined with `separator` (an empty array yields `""`), strings are taken verbatim and
/// `null` yields `""`. Any other value uses its JSON rendering.
pub(crate) fn flatten_claim_value(value: &Value, separator: &str) -> String {
    match value {
        Value::Array(values) => values.iter().map(scalar_to_string).join(separator),
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
