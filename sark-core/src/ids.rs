//! Identifier types shared across the governance surface.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::random()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::parse_str(s).map_err(Error::from)?;
                Ok(Self::from_uuid(uuid))
            }
        }
    };
}

uuid_id!(PrincipalId, "Unique identifier for an authenticated principal.");
uuid_id!(ResourceId, "Unique identifier for a governed resource (MCP server, gRPC service, REST API).");
uuid_id!(RequestId, "Unique identifier for a single invocation request, used for correlation across audit records.");

/// Identifier for a capability exposed by a resource.
///
/// Capability ids are not UUIDs: they carry the owning resource's endpoint as a
/// prefix so a capability can be resolved back to a live transport without an
/// extra lookup. The canonical form is `"{endpoint}#{capability_name}"`, split
/// on the last unescaped `#`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    /// Builds a capability id from an owning endpoint and a capability name.
    #[must_use]
    pub fn new(endpoint: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self(format!("{}#{}", endpoint.as_ref(), name.as_ref()))
    }

    /// Splits the id back into `(endpoint, capability_name)` on the last `#`.
    ///
    /// Returns `None` if the id was not constructed via [`CapabilityId::new`]
    /// (no `#` separator present).
    #[must_use]
    pub fn split(&self) -> Option<(&str, &str)> {
        self.0.rsplit_once('#')
    }

    /// Returns the full id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CapabilityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CapabilityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CapabilityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_principal_id() {
        let id = PrincipalId::random();
        let parsed = id.to_string().parse::<PrincipalId>().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn capability_id_splits_on_last_hash() {
        let id = CapabilityId::new("stdio://server#with#hash", "read_file");
        let (endpoint, name) = id.split().expect("split");
        assert_eq!(endpoint, "stdio://server#with#hash");
        assert_eq!(name, "read_file");
    }

    #[test]
    fn capability_id_without_separator_does_not_split() {
        let id = CapabilityId::from("opaque-id");
        assert!(id.split().is_none());
    }
}
