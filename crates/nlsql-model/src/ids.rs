//! Newtype identifiers.
//!
//! Sessions, requests, queries and tasks are all UUIDs underneath, but the
//! store and flow APIs pass several of them around together (`session_id`,
//! `request_id`, `query_id`, `parent_id`, ...). A bare `Uuid` makes it easy to
//! swap two positional arguments without the compiler noticing; a newtype per
//! entity turns that mistake into a type error.

use std::fmt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(SessionId);
uuid_id!(RequestId);
uuid_id!(QueryId);
uuid_id!(TaskId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_uuid() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        let session = SessionId::new();
        let request = RequestId::new();
        assert_ne!(session.as_uuid(), Uuid::nil());
        assert_ne!(request.as_uuid(), Uuid::nil());
    }
}
