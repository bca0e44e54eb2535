// crates/tally-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Tally Gate Interfaces
// Description: Backend-agnostic traits for votes, membership, rules, and selections.
// Purpose: Define the seams between the evaluation pipeline and its storage.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The evaluation pipeline pulls everything it needs through these traits.
//! Store backends implement them over a single write transaction so the
//! vote write, the reads, and the selection insert commit or roll back
//! together. Membership and rule lookups may also be supplied by external
//! collaborators; any error they return aborts the enclosing write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::DecisionBinding;
use crate::core::DecisionId;
use crate::core::GroupId;
use crate::core::InsertOutcome;
use crate::core::ItemId;
use crate::core::RuleSpec;
use crate::core::Selection;
use crate::core::Timestamp;
use crate::core::Vote;
use crate::core::VoteError;
use crate::core::VoteTally;
use crate::core::VoteWrite;
use crate::core::VoterId;

// ============================================================================
// SECTION: Vote Store
// ============================================================================

/// Vote store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteStoreError {
    /// The merged vote breaks a vote invariant; nothing was written.
    #[error(transparent)]
    Invalid(#[from] VoteError),
    /// The vote targets an item the store does not know.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    /// Backend failure.
    #[error("vote store error: {0}")]
    Store(String),
}

/// Per-(voter, item) vote rows.
pub trait VoteStore {
    /// Loads the vote of `voter_id` on `item_id`.
    ///
    /// # Errors
    ///
    /// Returns [`VoteStoreError`] when the backend fails.
    fn vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<Option<Vote>, VoteStoreError>;

    /// Inserts or updates a vote after merging the write with the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`VoteStoreError::Invalid`] when the merged vote carries
    /// neither a like flag nor a rating.
    fn upsert_vote(&self, write: &VoteWrite, now: Timestamp) -> Result<Vote, VoteStoreError>;

    /// Deletes a vote. Returns true when a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`VoteStoreError`] when the backend fails.
    fn delete_vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<bool, VoteStoreError>;

    /// Counts approving and total votes on an item.
    ///
    /// # Errors
    ///
    /// Returns [`VoteStoreError`] when the backend fails.
    fn tally(&self, item_id: &ItemId) -> Result<VoteTally, VoteStoreError>;
}

// ============================================================================
// SECTION: Membership Oracle
// ============================================================================

/// Membership lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembershipError {
    /// The group does not exist.
    #[error("unknown group: {0}")]
    UnknownGroup(GroupId),
    /// Lookup failed; the caller should retry the whole write.
    #[error("membership lookup failed: {0}")]
    Unavailable(String),
}

/// Source of confirmed-member counts.
pub trait MembershipOracle {
    /// Returns the number of confirmed members of a group, computed fresh.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] when the lookup fails.
    fn confirmed_member_count(&self, group_id: &GroupId) -> Result<u32, MembershipError>;
}

// ============================================================================
// SECTION: Rule Resolver
// ============================================================================

/// Rule lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleResolverError {
    /// The item does not exist.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),
    /// The decision does not exist.
    #[error("unknown decision: {0}")]
    UnknownDecision(DecisionId),
    /// A stored rule no longer validates.
    #[error("stored rule is invalid: {0}")]
    Corrupt(String),
    /// Lookup failed; the caller should retry the whole write.
    #[error("rule lookup failed: {0}")]
    Unavailable(String),
}

/// Source of validated rules and item-to-decision bindings.
pub trait RuleResolver {
    /// Resolves the decision an item belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`RuleResolverError`] when the lookup fails.
    fn decision_for_item(&self, item_id: &ItemId) -> Result<DecisionBinding, RuleResolverError>;

    /// Returns the validated rule of a decision.
    ///
    /// # Errors
    ///
    /// Returns [`RuleResolverError`] when the lookup fails.
    fn rule(&self, decision_id: &DecisionId) -> Result<RuleSpec, RuleResolverError>;
}

// ============================================================================
// SECTION: Selection Store
// ============================================================================

/// Selection store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionStoreError {
    /// A stored selection failed integrity checks.
    #[error("selection store corruption: {0}")]
    Corrupt(String),
    /// Backend failure.
    #[error("selection store error: {0}")]
    Store(String),
}

/// Zero-or-one selection lookup.
pub trait SelectionReader {
    /// Returns the selection for a (decision, item) pair, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionStoreError`] when the backend fails or the stored
    /// row is corrupt.
    fn get(
        &self,
        decision_id: &DecisionId,
        item_id: &ItemId,
    ) -> Result<Option<Selection>, SelectionStoreError>;
}

/// Write-once selection sink.
///
/// # Invariants
/// - At most one selection per (decision, item); a second insert is a no-op.
/// - No update or delete path exists.
pub trait SelectionStore: SelectionReader {
    /// Inserts the selection unless one already exists for its pair.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionStoreError`] when the backend fails.
    fn insert_if_absent(&self, selection: &Selection) -> Result<InsertOutcome, SelectionStoreError>;
}
