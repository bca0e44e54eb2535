// crates/tally-gate-core/src/core/vote.rs
// ============================================================================
// Module: Tally Gate Votes
// Description: Vote rows, vote writes, and the vote value invariants.
// Purpose: Validate and merge vote writes before they reach a store.
// Dependencies: bigdecimal, serde, thiserror
// ============================================================================

//! ## Overview
//! A vote is unique per (voter, item) and mutable: the latest write wins.
//! Writes are partial. Each field is left unchanged, set, or cleared, and
//! the merged row must still carry a like flag or a rating. Stores call
//! [`VoteWrite::merge`] against the existing row inside their write
//! transaction so a rejected write never touches storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use bigdecimal::Zero;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ItemId;
use crate::core::identifiers::VoteId;
use crate::core::identifiers::VoterId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lowest accepted rating.
pub const MIN_RATING: u8 = 1;
/// Highest accepted rating.
pub const MAX_RATING: u8 = 5;
/// Ratings at or above this value count as approvals, whatever the rule type.
pub const APPROVAL_MIN_RATING: u8 = 4;
/// Maximum accepted length of a weight literal.
const MAX_WEIGHT_LITERAL_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Vote invariant violations, raised before any row is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteError {
    /// The vote (after merging) breaks a vote invariant.
    #[error("invalid vote: {0}")]
    InvalidVote(String),
}

// ============================================================================
// SECTION: Vote Values
// ============================================================================

/// Star rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Creates a rating, rejecting values outside `1..=5`.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError::InvalidVote`] when the value is out of range.
    pub fn new(value: u8) -> Result<Self, VoteError> {
        if (MIN_RATING ..= MAX_RATING).contains(&value) {
            Ok(Self(value))
        } else {
            Err(VoteError::InvalidVote(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {value}"
            )))
        }
    }

    /// Returns the raw rating value.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns true when the rating counts as an approval.
    #[must_use]
    pub const fn is_approving(self) -> bool {
        self.0 >= APPROVAL_MIN_RATING
    }
}

impl TryFrom<u8> for Rating {
    type Error = VoteError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

/// Decimal vote weight. Defaults to 1 and is carried for consumers; the
/// approval count does not apply it.
///
/// # Invariants
/// - Strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoteWeight(BigDecimal);

impl VoteWeight {
    /// Parses a decimal weight literal.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError::InvalidVote`] when the literal is not a positive decimal.
    pub fn parse(raw: &str) -> Result<Self, VoteError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_WEIGHT_LITERAL_LENGTH {
            return Err(VoteError::InvalidVote("weight literal is empty or too long".to_string()));
        }
        let value = BigDecimal::from_str(trimmed)
            .map_err(|_| VoteError::InvalidVote(format!("weight is not a decimal: {trimmed}")))?;
        if value <= BigDecimal::zero() {
            return Err(VoteError::InvalidVote("weight must be greater than zero".to_string()));
        }
        Ok(Self(value.normalized()))
    }

    /// Returns the weight as a decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }
}

impl Default for VoteWeight {
    fn default() -> Self {
        Self(BigDecimal::from(1_i64))
    }
}

impl fmt::Display for VoteWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for VoteWeight {
    type Error = VoteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VoteWeight> for String {
    fn from(value: VoteWeight) -> Self {
        value.to_string()
    }
}

/// Returns true when a vote with these values counts as an approval.
#[must_use]
pub fn is_approval(is_like: Option<bool>, rating: Option<Rating>) -> bool {
    is_like == Some(true) || rating.is_some_and(Rating::is_approving)
}

// ============================================================================
// SECTION: Vote Rows
// ============================================================================

/// Stored vote row.
///
/// # Invariants
/// - `is_like` and `rating` are never both `None`.
/// - Unique per (`voter_id`, `item_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Vote row identifier.
    pub id: VoteId,
    /// Item the vote is cast on.
    pub item_id: ItemId,
    /// Voter casting the vote.
    pub voter_id: VoterId,
    /// Like/dislike flag.
    pub is_like: Option<bool>,
    /// 1 to 5 rating.
    pub rating: Option<Rating>,
    /// Decimal weight.
    pub weight: VoteWeight,
    /// First write time.
    pub created_at: Timestamp,
    /// Latest write time.
    pub updated_at: Timestamp,
}

impl Vote {
    /// Returns true when this vote counts as an approval.
    #[must_use]
    pub fn is_approval(&self) -> bool {
        is_approval(self.is_like, self.rating)
    }
}

// ============================================================================
// SECTION: Vote Writes
// ============================================================================

/// Partial update of a single nullable vote field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    /// Keep the stored value (null for a new row).
    #[default]
    Unchanged,
    /// Store this value.
    Set(T),
    /// Store null.
    Clear,
}

impl<T> FieldUpdate<T> {
    /// Applies the update to the currently stored value.
    #[must_use]
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Self::Unchanged => current,
            Self::Set(value) => Some(value),
            Self::Clear => None,
        }
    }
}

impl<T> From<Option<T>> for FieldUpdate<T> {
    /// `Some` sets the value; `None` leaves the stored value unchanged.
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unchanged, Self::Set)
    }
}

/// Insert-or-update request for the vote of `voter_id` on `item_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteWrite {
    /// Target item.
    pub item_id: ItemId,
    /// Voter casting the vote.
    pub voter_id: VoterId,
    /// Like flag update.
    pub is_like: FieldUpdate<bool>,
    /// Rating update.
    pub rating: FieldUpdate<Rating>,
    /// Weight override; `None` keeps the stored weight (1 for new rows).
    pub weight: Option<VoteWeight>,
}

impl VoteWrite {
    /// Creates a write that changes nothing yet.
    #[must_use]
    pub fn new(item_id: ItemId, voter_id: VoterId) -> Self {
        Self {
            item_id,
            voter_id,
            is_like: FieldUpdate::Unchanged,
            rating: FieldUpdate::Unchanged,
            weight: None,
        }
    }

    /// Builds a write from optional values, where `None` means "unchanged".
    #[must_use]
    pub fn from_options(
        item_id: ItemId,
        voter_id: VoterId,
        is_like: Option<bool>,
        rating: Option<Rating>,
    ) -> Self {
        Self {
            is_like: is_like.into(),
            rating: rating.into(),
            ..Self::new(item_id, voter_id)
        }
    }

    /// Sets the like flag.
    #[must_use]
    pub fn like(mut self, is_like: bool) -> Self {
        self.is_like = FieldUpdate::Set(is_like);
        self
    }

    /// Sets the rating.
    #[must_use]
    pub fn rating(mut self, rating: Rating) -> Self {
        self.rating = FieldUpdate::Set(rating);
        self
    }

    /// Clears the like flag.
    #[must_use]
    pub fn clear_like(mut self) -> Self {
        self.is_like = FieldUpdate::Clear;
        self
    }

    /// Clears the rating.
    #[must_use]
    pub fn clear_rating(mut self) -> Self {
        self.rating = FieldUpdate::Clear;
        self
    }

    /// Overrides the weight.
    #[must_use]
    pub fn weight(mut self, weight: VoteWeight) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Merges the write with the existing row and enforces the vote invariant.
    ///
    /// # Errors
    ///
    /// Returns [`VoteError::InvalidVote`] when the merged vote would carry
    /// neither a like flag nor a rating.
    pub fn merge(&self, existing: Option<&Vote>) -> Result<MergedVote, VoteError> {
        let is_like = self.is_like.apply(existing.and_then(|vote| vote.is_like));
        let rating = self.rating.apply(existing.and_then(|vote| vote.rating));
        if is_like.is_none() && rating.is_none() {
            return Err(VoteError::InvalidVote(
                "vote must carry is_like or rating".to_string(),
            ));
        }
        let weight = match (&self.weight, existing) {
            (Some(weight), _) => weight.clone(),
            (None, Some(vote)) => vote.weight.clone(),
            (None, None) => VoteWeight::default(),
        };
        Ok(MergedVote {
            is_like,
            rating,
            weight,
        })
    }
}

/// Vote values after merging a write with the stored row.
///
/// # Invariants
/// - `is_like` and `rating` are never both `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedVote {
    /// Like/dislike flag.
    pub is_like: Option<bool>,
    /// 1 to 5 rating.
    pub rating: Option<Rating>,
    /// Decimal weight.
    pub weight: VoteWeight,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests unwrap deterministic fixtures.")]

    use super::FieldUpdate;
    use super::Rating;
    use super::Vote;
    use super::VoteError;
    use super::VoteWeight;
    use super::VoteWrite;
    use super::is_approval;
    use crate::core::identifiers::ItemId;
    use crate::core::identifiers::VoteId;
    use crate::core::identifiers::VoterId;
    use crate::core::time::Timestamp;

    fn stored(is_like: Option<bool>, rating: Option<u8>) -> Vote {
        Vote {
            id: VoteId::from_raw(1).unwrap(),
            item_id: ItemId::new("item"),
            voter_id: VoterId::new("voter"),
            is_like,
            rating: rating.map(|value| Rating::new(value).unwrap()),
            weight: VoteWeight::parse("2.5").unwrap(),
            created_at: Timestamp::from_unix_millis(1),
            updated_at: Timestamp::from_unix_millis(1),
        }
    }

    #[test]
    fn rating_bounds_are_enforced() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).map(Rating::get), Ok(5));
    }

    #[test]
    fn approval_uses_fixed_rating_floor() {
        assert!(is_approval(Some(true), None));
        assert!(!is_approval(Some(false), None));
        assert!(is_approval(None, Rating::new(4).ok()));
        assert!(!is_approval(None, Rating::new(3).ok()));
        assert!(is_approval(Some(false), Rating::new(5).ok()));
    }

    #[test]
    fn new_vote_without_values_is_rejected() {
        let write = VoteWrite::new(ItemId::new("item"), VoterId::new("voter"));
        assert!(matches!(write.merge(None), Err(VoteError::InvalidVote(_))));
    }

    #[test]
    fn partial_write_keeps_stored_fields() {
        let existing = stored(Some(true), Some(4));
        let write = VoteWrite::new(ItemId::new("item"), VoterId::new("voter"))
            .rating(Rating::new(3).unwrap());
        let merged = write.merge(Some(&existing)).unwrap();
        assert_eq!(merged.is_like, Some(true));
        assert_eq!(merged.rating.map(Rating::get), Some(3));
        assert_eq!(merged.weight, VoteWeight::parse("2.5").unwrap());
    }

    #[test]
    fn clearing_the_last_value_is_rejected() {
        let existing = stored(None, Some(4));
        let write = VoteWrite::new(ItemId::new("item"), VoterId::new("voter")).clear_rating();
        assert!(matches!(write.merge(Some(&existing)), Err(VoteError::InvalidVote(_))));
    }

    #[test]
    fn option_conversion_treats_none_as_unchanged() {
        assert_eq!(FieldUpdate::from(None::<bool>), FieldUpdate::Unchanged);
        assert_eq!(FieldUpdate::from(Some(true)), FieldUpdate::Set(true));
    }

    #[test]
    fn weight_defaults_to_one_and_rejects_non_positive() {
        assert_eq!(VoteWeight::default().to_string(), "1");
        assert!(VoteWeight::parse("0").is_err());
        assert!(VoteWeight::parse("-1.5").is_err());
        assert!(VoteWeight::parse("heavy").is_err());
    }
}
