// crates/tally-gate-core/src/core/tally.rs
// ============================================================================
// Module: Tally Gate Vote Tally
// Description: Aggregated approval counts for a single item.
// Purpose: Carry the tally from the vote store into evaluation.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A tally counts votes, not weights. `approvals` is the evaluator's
//! numerator; `total` is reported for audit and logs only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::vote::Vote;

// ============================================================================
// SECTION: Tally
// ============================================================================

/// Vote counts for an item.
///
/// # Invariants
/// - `approvals <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    /// Votes with `is_like = true` or `rating >= 4`.
    pub approvals: u32,
    /// All votes on the item.
    pub total: u32,
}

impl VoteTally {
    /// Aggregates a tally from stored votes.
    #[must_use]
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        votes.into_iter().fold(Self::default(), |tally, vote| Self {
            approvals: tally.approvals.saturating_add(u32::from(vote.is_approval())),
            total: tally.total.saturating_add(1),
        })
    }
}
