//! Cluster-wide identifiers
//!
//! Every entity the gateway hands out (objects, actors, placement groups,
//! tasks, event subscribers) is named by a random v4 UUID wrapped in its own
//! type, so an `ActorId` can never be passed where an `ObjectId` is expected.
//!
//! Identifiers render as `<prefix>-<32 hex digits>` and parse back from the
//! same form, which is how a reference received as text from another process
//! is re-hydrated.

use crate::errors::ValidationError;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generates a UUID-backed identifier newtype with a textual prefix.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Textual prefix used by `Display` and `FromStr`
            pub const PREFIX: &'static str = $prefix;

            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Rebuild from the 16 raw bytes
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Get the underlying UUID
            pub fn uuid(&self) -> Uuid {
                self.0
            }

            /// Raw 16-byte form, as carried on the wire
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Lowercase hex without prefix or dashes
            pub fn hex(&self) -> String {
                hex::encode(self.0.as_bytes())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0.simple())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let malformed = || ValidationError::MalformedId {
                    kind: stringify!($name),
                    input: s.to_string(),
                };

                let body = s
                    .strip_prefix($prefix)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .ok_or_else(malformed)?;

                let raw = hex::decode(body).map_err(|_| malformed())?;
                let bytes: [u8; 16] = raw.try_into().map_err(|_| malformed())?;
                Ok(Self(Uuid::from_bytes(bytes)))
            }
        }
    };
}

define_uuid_id!(
    /// Names a value stored in the distributed object store
    ObjectId, "obj"
);

define_uuid_id!(
    /// Names a long-lived stateful worker
    ActorId, "actor"
);

define_uuid_id!(
    /// Names a reserved set of resource bundles
    PlacementGroupId, "pg"
);

define_uuid_id!(
    /// Names one remote invocation (task or actor method call)
    TaskId, "task"
);

define_uuid_id!(
    /// Names a lifecycle event subscriber
    SubscriberId, "sub"
);
