//! Identifier newtypes.
//!
//! Static data (units, buildings, research) is keyed by string ids as it
//! appears in the RON tables. Persistent aggregates use numeric ids.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new id.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }
    };
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new id.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

string_id!(
    /// Unit type identifier (land unit or ship).
    UnitId
);
string_id!(
    /// Building type identifier.
    BuildingId
);
string_id!(
    /// Research identifier.
    ResearchId
);

numeric_id!(
    /// Player-owned city.
    CityId
);
numeric_id!(
    /// Unaffiliated village.
    VillageId
);
numeric_id!(
    /// In-flight movement.
    MovementId
);
numeric_id!(
    /// Player-visible report.
    ReportId
);
numeric_id!(
    /// Player account.
    PlayerId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_serializes_transparently() {
        let id = UnitId::new("swordsman");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"swordsman\"");
        let back: UnitId = ron::from_str("\"swordsman\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_numeric_id_display() {
        assert_eq!(CityId::new(7).to_string(), "CityId#7");
        assert_eq!(MovementId::new(3).0, 3);
    }
}
