/// Declares a transparent new-type wrapper around a `String`-like value.
///
/// Adapted from the `oauth2` crate's internal macro of the same name (not part of that crate's
/// public interface).
macro_rules! new_type {
    // Convenience pattern without an impl.
    (
        $(#[$attr:meta])*
        $name:ident(
            $(#[$type_attr:meta])*
            $type:ty
        )
    ) => {
        new_type![
            $(#[$attr])*
            $name(
                $(#[$type_attr])*
                $type
            )
            impl {}
        ];
    };
    // Main entry point with an impl.
    (
        $(#[$attr:meta])*
        $name:ident(
            $(#[$type_attr:meta])*
            $type:ty
        )
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name(
            $(#[$type_attr])*
            $type
        );
        impl $name {
            $($item)*

            #[doc = concat!("Create a new `", stringify!($name), "` to wrap the given `", stringify!($type), "`.")]
            pub fn new(s: $type) -> Self {
                $name(s)
            }
        }
        impl std::ops::Deref for $name {
            type Target = $type;
            fn deref(&self) -> &$type {
                &self.0
            }
        }
        impl From<$name> for $type {
            fn from(t: $name) -> $type {
                t.0
            }
        }
        impl AsRef<$type> for $name {
            fn as_ref(&self) -> &$type {
                self
            }
        }
    };
}

/// Declares a new-type wrapper around a validated URL that remembers the string it was parsed
/// from.
///
/// The original string is kept so that serializing or displaying the value never re-normalizes
/// what the administrator configured.
macro_rules! new_url_type {
    // Convenience pattern without an impl.
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        new_url_type![
            $(#[$attr])*
            $name
            impl {}
        ];
    };
    // Main entry point with an impl.
    (
        $(#[$attr:meta])*
        $name:ident
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name(url::Url, String);
        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "` from a `String` to wrap a URL.")]
            pub fn new(url: String) -> Result<Self, url::ParseError> {
                Ok($name(url::Url::parse(&url)?, url))
            }
            #[doc = concat!("Create a new `", stringify!($name), "` from a `Url` to wrap a URL.")]
            pub fn from_url(url: url::Url) -> Self {
                let s = url.to_string();
                Self(url, s)
            }
            #[doc = concat!("Return this `", stringify!($name), "` as a parsed `Url`.")]
            pub fn url(&self) -> &url::Url {
                &self.0
            }
            $($item)*
        }
        impl std::ops::Deref for $name {
            type Target = String;
            fn deref(&self) -> &String {
                &self.1
            }
        }
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                let mut debug_trait_builder = f.debug_tuple(stringify!($name));
                debug_trait_builder.field(&self.1);
                debug_trait_builder.finish()
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.1)
            }
        }
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::de::Deserializer<'de>,
            {
                struct UrlVisitor;
                impl<'de> serde::de::Visitor<'de> for UrlVisitor {
                    type Value = $name;

                    fn expecting(
                        &self,
                        formatter: &mut std::fmt::Formatter
                    ) -> std::fmt::Result {
                        formatter.write_str(stringify!($name))
                    }

                    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        $name::new(v.to_string()).map_err(E::custom)
                    }
                }
                deserializer.deserialize_str(UrlVisitor {})
            }
        }
        impl serde::Serialize for $name {
            fn serialize<SE>(&self, serializer: SE) -> Result<SE::Ok, SE::Error>
            where
                SE: serde::Serializer,
            {
                serializer.serialize_str(&self.1)
            }
        }
        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                std::hash::Hash::hash(&(self.1), state);
            }
        }
        impl PartialEq for $name {
            fn eq(&self, other: &$name) -> bool {
                self.1 == other.1
            }
        }
        impl Eq for $name {}
    };
}
