//! Identifier newtypes.
//!
//! Every identity in the system is a UUID. Wrapping each kind in its own type
//! keeps a `UserId` from being passed where a `PullRequestId` is expected, and
//! `Ord` gives the deterministic tie-break used by candidate ordering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from the canonical hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s.trim())?))
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id! {
    /// Identity of a team. Generated by the store on first registration.
    TeamId
}

uuid_id! {
    /// Identity of a user. Supplied by the caller and globally unique.
    UserId
}

uuid_id! {
    /// Identity of a pull request. Supplied by the caller and globally unique.
    PullRequestId
}

impl TeamId {
    /// Generate a fresh team identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}
