//! Macros for defining typed id types.

/// Macro to define a typed reference id with a prefix for freshly minted values.
///
/// This generates a newtype wrapper around `String` with:
/// - A `PREFIX` constant
/// - `new()` to mint a fresh `{prefix}_{ulid}` id
/// - `parse()` to validate an opaque reference
/// - `Display`, `FromStr`, `AsRef<str>` and `Borrow<str>`
/// - `Serialize` and `Deserialize` (as a plain string, validated on the way in)
///
/// # Example
///
/// ```ignore
/// define_id!(NodeId, "node");
///
/// let fresh = NodeId::new();
/// let parsed: NodeId = "node_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse()?;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        /// A typed reference id for this resource type.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// The prefix used when minting new ids of this type.
            pub const PREFIX: &'static str = $prefix;

            /// Mints a new id with a fresh ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}_{}", Self::PREFIX, $crate::Ulid::new()))
            }

            /// Parses an opaque reference id.
            pub fn parse(s: &str) -> Result<Self, $crate::IdError> {
                $crate::validate_ref(s)?;
                Ok(Self(s.to_string()))
            }

            /// Returns the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}
