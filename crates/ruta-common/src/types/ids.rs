//! Strongly typed identifiers
//!
//! Every id wraps a UUIDv7 so a worker id can never be passed where a trip id is
//! expected. Serialized transparently as the bare UUID string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh time-ordered id
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Ride or delivery request
    TripId
);
uuid_id!(
    /// Driver or courier
    WorkerId
);
uuid_id!(
    /// Passenger or sender
    RequesterId
);
uuid_id!(
    /// Wallet ledger entry
    TransactionId
);

/// Whoever issued a command, recorded on the trip for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum ActorId {
    Requester(RequesterId),
    Worker(WorkerId),
    /// Back-office operator, identified by the external identity service
    Admin(String),
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorId::Requester(id) => write!(f, "requester:{}", id),
            ActorId::Worker(id) => write!(f, "worker:{}", id),
            ActorId::Admin(id) => write!(f, "admin:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_v7() {
        let id = TripId::new();
        assert_eq!(id.as_uuid().get_version_num(), 7);
        assert_ne!(id, TripId::new());
    }

    #[test]
    fn test_parse_roundtrip_through_display() {
        let id = WorkerId::new();
        let parsed: WorkerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<WorkerId>().is_err());
    }

    #[test]
    fn test_actor_serialization() {
        let actor = ActorId::Admin("ops-7".into());
        let json = serde_json::to_value(&actor).unwrap();
        assert_eq!(json["role"], "admin");
        assert_eq!(json["id"], "ops-7");
    }
}
