//! Canonical identifiers for registry records.
//!
//! Every record in the registry (concepts, authorities, workgroups, users, supporting
//! vocabulary) is keyed by a UUID. To keep identifiers stable across the CLI, the REST API and
//! on-disk snapshots, the registry uses a *canonical* textual form: **32 lowercase hexadecimal
//! characters** (no hyphens).
//!
//! This crate provides:
//! - [`CanonicalUuid`], a wrapper that *guarantees* the canonical format once constructed.
//! - Typed identifiers ([`ItemId`], [`AuthorityId`], [`WorkgroupId`], [`UserId`], ...) so that a
//!   workgroup id can never be passed where an item id is expected.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`CanonicalUuid::parse`].

mod service;

pub use service::{CanonicalUuid, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;

/// Declares a typed identifier backed by a [`CanonicalUuid`].
macro_rules! registry_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(CanonicalUuid);

        impl $name {
            /// Allocates a fresh identifier.
            pub fn new() -> Self {
                Self(CanonicalUuid::new())
            }

            /// Parses an identifier that must already be in canonical form.
            pub fn parse(input: &str) -> UuidResult<Self> {
                CanonicalUuid::parse(input).map(Self)
            }

            /// Wraps an existing canonical UUID.
            pub fn from_canonical(uuid: CanonicalUuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying `uuid::Uuid`.
            pub fn uuid(&self) -> Uuid {
                self.0.uuid()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = UuidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(&self.0)
            }
        }

        #[cfg(feature = "serde")]
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

registry_id!(
    /// Identifier of a managed concept (object class, data element, package, ...).
    ItemId
);
registry_id!(
    /// Identifier of a registration authority.
    AuthorityId
);
registry_id!(
    /// Identifier of a workgroup.
    WorkgroupId
);
registry_id!(
    /// Identifier of a user (and of that user's profile).
    UserId
);
registry_id!(
    /// Identifier of a status ledger row.
    StatusId
);
registry_id!(
    /// Identifier of an unmanaged vocabulary entry (measure, unit, representation class,
    /// glossary item).
    VocabularyId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ids_round_trip_through_display() {
        let id = ItemId::new();
        let parsed: ItemId = id.to_string().parse().expect("canonical id parses");
        assert_eq!(id, parsed);
    }

    #[test]
    fn typed_ids_reject_hyphenated_input() {
        let err = WorkgroupId::parse("550e8400-e29b-41d4-a716-446655440000")
            .expect_err("hyphenated form is not canonical");
        assert!(matches!(err, UuidError::InvalidInput(_)));
    }

    #[test]
    fn typed_ids_serialise_as_canonical_strings() {
        let id = AuthorityId::parse("550e8400e29b41d4a716446655440000").expect("valid");
        let json = serde_json::to_string(&id).expect("serialise");
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");
        let back: AuthorityId = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, id);
    }
}
