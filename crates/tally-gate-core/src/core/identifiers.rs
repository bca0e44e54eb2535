// crates/tally-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Tally Gate Identifiers
// Description: Canonical opaque identifiers for groups, decisions, items, and votes.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque and serialize as plain strings or numbers on the
//! wire. String identifiers reject empty input at construction boundaries
//! that accept untrusted data ([`GroupId::parse`] and friends); numeric vote
//! identifiers enforce the non-zero, 1-based invariant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted length for string identifiers (bytes).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Identifier was empty or whitespace.
    #[error("{kind} identifier must be non-empty")]
    Empty {
        /// Identifier kind label.
        kind: &'static str,
    },
    /// Identifier exceeded [`MAX_IDENTIFIER_LENGTH`].
    #[error("{kind} identifier exceeds {max} bytes", max = MAX_IDENTIFIER_LENGTH)]
    TooLong {
        /// Identifier kind label.
        kind: &'static str,
    },
}

/// Validates raw identifier text shared by all string identifier kinds.
fn validate_identifier(kind: &'static str, raw: &str) -> Result<(), IdentifierError> {
    if raw.trim().is_empty() {
        return Err(IdentifierError::Empty {
            kind,
        });
    }
    if raw.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong {
            kind,
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Declares an opaque string identifier with the shared constructor surface.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier without validation.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Parses an identifier from untrusted input.
            ///
            /// # Errors
            ///
            /// Returns [`IdentifierError`] when the input is empty or overlong.
            pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
                validate_identifier($kind, raw)?;
                Ok(Self(raw.to_string()))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier!(
    /// Group identifier. A group owns decisions and holds memberships.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization is applied.
    GroupId,
    "group"
);

string_identifier!(
    /// Decision identifier. A decision carries the approval rule for its items.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization is applied.
    DecisionId,
    "decision"
);

string_identifier!(
    /// Item identifier. Items are the votable proposals of a decision.
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization is applied.
    ItemId,
    "item"
);

string_identifier!(
    /// Voter identifier (the user casting a vote).
    ///
    /// # Invariants
    /// - Opaque UTF-8 string; no normalization is applied.
    VoterId,
    "voter"
);

// ============================================================================
// SECTION: Selection Identifier
// ============================================================================

/// Selection identifier, freshly generated for every insert attempt.
///
/// # Invariants
/// - Generated values are UUID v4 in hyphenated lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionId(String);

impl SelectionId {
    /// Generates a fresh random selection identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Wraps a stored selection identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Vote Identifier
// ============================================================================

/// Vote row identifier assigned by the vote store.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(NonZeroU64);

impl VoteId {
    /// Creates a vote identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::GroupId;
    use super::IdentifierError;
    use super::MAX_IDENTIFIER_LENGTH;
    use super::SelectionId;
    use super::VoteId;

    #[test]
    fn parse_rejects_blank_identifiers() {
        assert_eq!(
            GroupId::parse("   "),
            Err(IdentifierError::Empty {
                kind: "group"
            })
        );
    }

    #[test]
    fn parse_rejects_overlong_identifiers() {
        let raw = "g".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(matches!(GroupId::parse(&raw), Err(IdentifierError::TooLong { .. })));
    }

    #[test]
    fn generated_selection_ids_are_distinct() {
        assert_ne!(SelectionId::generate(), SelectionId::generate());
    }

    #[test]
    fn vote_id_rejects_zero() {
        assert!(VoteId::from_raw(0).is_none());
        assert_eq!(VoteId::from_raw(7).map(VoteId::get), Some(7));
    }
}
