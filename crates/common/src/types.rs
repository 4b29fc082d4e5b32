use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype.
///
/// Each identifier gets its own type so an order id can never be passed
/// where a user id is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses an identifier from its hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a finalized order.
    OrderId
);

uuid_id!(
    /// Unique identifier for a single line of an order.
    OrderItemId
);

uuid_id!(
    /// Identifier of a customer profile.
    UserId
);

uuid_id!(
    /// Identifier of an abandoned cart snapshot.
    CartId
);

uuid_id!(
    /// Identifier of an email audit event.
    EmailEventId
);

impl OrderId {
    /// Short human-facing order number: the last eight characters of the
    /// id, upper-cased.
    pub fn short_number(&self) -> String {
        let s = self.0.simple().to_string();
        s[s.len() - 8..].to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_new_creates_unique_ids() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn user_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = UserId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn parse_accepts_surrounding_whitespace() {
        let uuid = Uuid::new_v4();
        let parsed = OrderId::parse(&format!("  {uuid} ")).unwrap();
        assert_eq!(parsed.as_uuid(), uuid);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(CartId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn short_number_is_last_eight_upper() {
        let uuid = Uuid::parse_str("0b8f2c1e-5d4a-4e3b-9c2d-1a2b3c4d5e6f").unwrap();
        let id = OrderId::from_uuid(uuid);
        assert_eq!(id.short_number(), "3C4D5E6F");
    }

    #[test]
    fn id_serialization_is_transparent() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
