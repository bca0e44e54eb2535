// crates/tally-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Tally Gate In-Memory Store
// Description: In-memory groups, decisions, votes, and selections.
// Purpose: Provide a transactional store implementation without external deps.
// Dependencies: crate::{core, interfaces, runtime::pipeline}, thiserror
// ============================================================================

//! ## Overview
//! [`InMemoryTallyStore`] keeps the whole ledger behind one mutex. A vote
//! submission works on a copy of the ledger while holding the lock and
//! swaps it back in only when the write and its evaluation both succeed,
//! which gives the same all-or-nothing behavior as the SQLite store. It is
//! intended for tests and embedding, not for large data sets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use thiserror::Error;

use crate::core::DecisionBinding;
use crate::core::DecisionId;
use crate::core::GroupId;
use crate::core::InsertOutcome;
use crate::core::ItemId;
use crate::core::MembershipStatus;
use crate::core::RuleSpec;
use crate::core::Selection;
use crate::core::Timestamp;
use crate::core::Vote;
use crate::core::VoteId;
use crate::core::VoteTally;
use crate::core::VoteWrite;
use crate::core::VoterId;
use crate::interfaces::MembershipError;
use crate::interfaces::MembershipOracle;
use crate::interfaces::RuleResolver;
use crate::interfaces::RuleResolverError;
use crate::interfaces::SelectionReader;
use crate::interfaces::SelectionStore;
use crate::interfaces::SelectionStoreError;
use crate::interfaces::VoteStore;
use crate::interfaces::VoteStoreError;
use crate::runtime::pipeline::EvaluationError;
use crate::runtime::pipeline::EvaluationPipeline;
use crate::runtime::pipeline::SubmitError;
use crate::runtime::pipeline::VoteSubmission;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// In-memory store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InMemoryStoreError {
    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Record already exists.
    #[error("already exists: {0}")]
    Conflict(String),
    /// Vote write rejected or failed.
    #[error(transparent)]
    Vote(#[from] VoteStoreError),
    /// Evaluation failed; the vote write was rolled back.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    /// Internal store failure.
    #[error("in-memory store error: {0}")]
    Store(String),
}

impl From<SubmitError> for InMemoryStoreError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Vote(err) => Self::Vote(err),
            SubmitError::Evaluation(err) => Self::Evaluation(err),
        }
    }
}

// ============================================================================
// SECTION: Ledger State
// ============================================================================

/// Decision row.
#[derive(Debug, Clone)]
struct DecisionRecord {
    /// Group that owns the decision.
    owning_group_id: GroupId,
    /// Validated approval rule.
    rule: RuleSpec,
}

/// Complete in-memory ledger.
#[derive(Debug, Clone, Default)]
struct LedgerState {
    /// Known groups.
    groups: BTreeSet<GroupId>,
    /// Membership status keyed by (group, user).
    memberships: BTreeMap<(GroupId, VoterId), MembershipStatus>,
    /// Decisions keyed by identifier.
    decisions: BTreeMap<DecisionId, DecisionRecord>,
    /// Groups each decision is shared with.
    shares: BTreeSet<(DecisionId, GroupId)>,
    /// Item to decision mapping.
    items: BTreeMap<ItemId, DecisionId>,
    /// Votes keyed by (item, voter).
    votes: BTreeMap<(ItemId, VoterId), Vote>,
    /// Selections keyed by (decision, item).
    selections: BTreeMap<(DecisionId, ItemId), Selection>,
    /// Last allocated vote identifier.
    last_vote_id: u64,
}

impl LedgerState {
    /// Allocates the next 1-based vote identifier.
    fn allocate_vote_id(&mut self) -> Result<VoteId, VoteStoreError> {
        let next = self
            .last_vote_id
            .checked_add(1)
            .ok_or_else(|| VoteStoreError::Store("vote id space exhausted".to_string()))?;
        let id = VoteId::from_raw(next)
            .ok_or_else(|| VoteStoreError::Store("vote id must be non-zero".to_string()))?;
        self.last_vote_id = next;
        Ok(id)
    }

    /// Counts votes on an item.
    fn tally(&self, item_id: &ItemId) -> VoteTally {
        VoteTally::from_votes(
            self.votes.iter().filter(|((item, _), _)| item == item_id).map(|(_, vote)| vote),
        )
    }

    /// Returns the decision binding of an item.
    fn binding(&self, item_id: &ItemId) -> Result<DecisionBinding, RuleResolverError> {
        let decision_id =
            self.items.get(item_id).ok_or_else(|| RuleResolverError::UnknownItem(item_id.clone()))?;
        let record = self
            .decisions
            .get(decision_id)
            .ok_or_else(|| RuleResolverError::UnknownDecision(decision_id.clone()))?;
        Ok(DecisionBinding {
            decision_id: decision_id.clone(),
            owning_group_id: record.owning_group_id.clone(),
        })
    }

    /// Ensures a group exists.
    fn require_group(&self, group_id: &GroupId) -> Result<(), InMemoryStoreError> {
        if self.groups.contains(group_id) {
            Ok(())
        } else {
            Err(InMemoryStoreError::NotFound(format!("group {group_id}")))
        }
    }
}

// ============================================================================
// SECTION: Transaction View
// ============================================================================

/// Working copy of the ledger for one vote submission.
struct LedgerTx {
    /// Mutable working copy; committed by swapping it into the store.
    state: RefCell<LedgerState>,
}

impl VoteStore for LedgerTx {
    fn vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<Option<Vote>, VoteStoreError> {
        Ok(self.state.borrow().votes.get(&(item_id.clone(), voter_id.clone())).cloned())
    }

    fn upsert_vote(&self, write: &VoteWrite, now: Timestamp) -> Result<Vote, VoteStoreError> {
        let mut state = self.state.borrow_mut();
        if !state.items.contains_key(&write.item_id) {
            return Err(VoteStoreError::UnknownItem(write.item_id.clone()));
        }
        let key = (write.item_id.clone(), write.voter_id.clone());
        let existing = state.votes.get(&key).cloned();
        let merged = write.merge(existing.as_ref())?;
        let vote = match existing {
            Some(existing) => Vote {
                is_like: merged.is_like,
                rating: merged.rating,
                weight: merged.weight,
                updated_at: now,
                ..existing
            },
            None => Vote {
                id: state.allocate_vote_id()?,
                item_id: write.item_id.clone(),
                voter_id: write.voter_id.clone(),
                is_like: merged.is_like,
                rating: merged.rating,
                weight: merged.weight,
                created_at: now,
                updated_at: now,
            },
        };
        state.votes.insert(key, vote.clone());
        Ok(vote)
    }

    fn delete_vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<bool, VoteStoreError> {
        Ok(self.state.borrow_mut().votes.remove(&(item_id.clone(), voter_id.clone())).is_some())
    }

    fn tally(&self, item_id: &ItemId) -> Result<VoteTally, VoteStoreError> {
        Ok(self.state.borrow().tally(item_id))
    }
}

impl RuleResolver for LedgerTx {
    fn decision_for_item(&self, item_id: &ItemId) -> Result<DecisionBinding, RuleResolverError> {
        self.state.borrow().binding(item_id)
    }

    fn rule(&self, decision_id: &DecisionId) -> Result<RuleSpec, RuleResolverError> {
        self.state
            .borrow()
            .decisions
            .get(decision_id)
            .map(|record| record.rule.clone())
            .ok_or_else(|| RuleResolverError::UnknownDecision(decision_id.clone()))
    }
}

impl MembershipOracle for LedgerTx {
    fn confirmed_member_count(&self, group_id: &GroupId) -> Result<u32, MembershipError> {
        let state = self.state.borrow();
        if !state.groups.contains(group_id) {
            return Err(MembershipError::UnknownGroup(group_id.clone()));
        }
        let count = state
            .memberships
            .iter()
            .filter(|((group, _), status)| {
                group == group_id && **status == MembershipStatus::Confirmed
            })
            .count();
        u32::try_from(count)
            .map_err(|_| MembershipError::Unavailable("member count exceeds u32".to_string()))
    }
}

impl SelectionReader for LedgerTx {
    fn get(
        &self,
        decision_id: &DecisionId,
        item_id: &ItemId,
    ) -> Result<Option<Selection>, SelectionStoreError> {
        Ok(self.state.borrow().selections.get(&(decision_id.clone(), item_id.clone())).cloned())
    }
}

impl SelectionStore for LedgerTx {
    fn insert_if_absent(&self, selection: &Selection) -> Result<InsertOutcome, SelectionStoreError> {
        let mut state = self.state.borrow_mut();
        let key = (selection.decision_id.clone(), selection.item_id.clone());
        if state.selections.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        state.selections.insert(key, selection.clone());
        Ok(InsertOutcome::Inserted)
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory tally store for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTallyStore {
    /// Ledger protected by a mutex.
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryTallyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Locks the ledger.
    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, InMemoryStoreError> {
        self.state
            .lock()
            .map_err(|_| InMemoryStoreError::Store("tally store mutex poisoned".to_string()))
    }

    /// Creates a group.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Conflict`] when the group exists.
    pub fn create_group(&self, group_id: &GroupId) -> Result<(), InMemoryStoreError> {
        let mut state = self.lock()?;
        if !state.groups.insert(group_id.clone()) {
            return Err(InMemoryStoreError::Conflict(format!("group {group_id}")));
        }
        Ok(())
    }

    /// Creates or updates a membership record.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::NotFound`] when the group is unknown.
    pub fn set_membership(
        &self,
        group_id: &GroupId,
        user_id: &VoterId,
        status: MembershipStatus,
    ) -> Result<(), InMemoryStoreError> {
        let mut state = self.lock()?;
        state.require_group(group_id)?;
        state.memberships.insert((group_id.clone(), user_id.clone()), status);
        Ok(())
    }

    /// Removes a membership record. Returns true when a record was removed.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Store`] when the store lock is poisoned.
    pub fn remove_membership(
        &self,
        group_id: &GroupId,
        user_id: &VoterId,
    ) -> Result<bool, InMemoryStoreError> {
        let mut state = self.lock()?;
        Ok(state.memberships.remove(&(group_id.clone(), user_id.clone())).is_some())
    }

    /// Creates a decision owned by `owning_group_id`.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError`] when the group is unknown or the
    /// decision exists.
    pub fn create_decision(
        &self,
        decision_id: &DecisionId,
        owning_group_id: &GroupId,
        rule: RuleSpec,
    ) -> Result<(), InMemoryStoreError> {
        let mut state = self.lock()?;
        state.require_group(owning_group_id)?;
        if state.decisions.contains_key(decision_id) {
            return Err(InMemoryStoreError::Conflict(format!("decision {decision_id}")));
        }
        state.decisions.insert(
            decision_id.clone(),
            DecisionRecord {
                owning_group_id: owning_group_id.clone(),
                rule,
            },
        );
        Ok(())
    }

    /// Replaces a decision's rule. Existing selections keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::NotFound`] when the decision is unknown.
    pub fn update_rule(
        &self,
        decision_id: &DecisionId,
        rule: RuleSpec,
    ) -> Result<(), InMemoryStoreError> {
        let mut state = self.lock()?;
        let record = state
            .decisions
            .get_mut(decision_id)
            .ok_or_else(|| InMemoryStoreError::NotFound(format!("decision {decision_id}")))?;
        record.rule = rule;
        Ok(())
    }

    /// Shares a decision with another group. Shared groups never count
    /// toward approval denominators.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::NotFound`] when the decision or group is unknown.
    pub fn share_decision(
        &self,
        decision_id: &DecisionId,
        group_id: &GroupId,
    ) -> Result<(), InMemoryStoreError> {
        let mut state = self.lock()?;
        state.require_group(group_id)?;
        if !state.decisions.contains_key(decision_id) {
            return Err(InMemoryStoreError::NotFound(format!("decision {decision_id}")));
        }
        state.shares.insert((decision_id.clone(), group_id.clone()));
        Ok(())
    }

    /// Returns the groups a decision is shared with.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Store`] when the store lock is poisoned.
    pub fn shared_groups(&self, decision_id: &DecisionId) -> Result<Vec<GroupId>, InMemoryStoreError> {
        let state = self.lock()?;
        Ok(state
            .shares
            .iter()
            .filter(|(decision, _)| decision == decision_id)
            .map(|(_, group)| group.clone())
            .collect())
    }

    /// Creates an item within a decision.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError`] when the decision is unknown or the item exists.
    pub fn create_item(
        &self,
        item_id: &ItemId,
        decision_id: &DecisionId,
    ) -> Result<(), InMemoryStoreError> {
        let mut state = self.lock()?;
        if !state.decisions.contains_key(decision_id) {
            return Err(InMemoryStoreError::NotFound(format!("decision {decision_id}")));
        }
        if state.items.contains_key(item_id) {
            return Err(InMemoryStoreError::Conflict(format!("item {item_id}")));
        }
        state.items.insert(item_id.clone(), decision_id.clone());
        Ok(())
    }

    /// Writes a vote and evaluates its item using the stored memberships and rules.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Vote`] for invalid votes and
    /// [`InMemoryStoreError::Evaluation`] when evaluation fails. Nothing is
    /// persisted on error.
    pub fn submit_vote(&self, write: &VoteWrite) -> Result<VoteSubmission, InMemoryStoreError> {
        self.transact(|tx| EvaluationPipeline::new(tx, tx, tx, tx).submit_vote(write, Timestamp::now()))
    }

    /// Writes a vote and evaluates its item with caller-supplied collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError`] when the write or any collaborator
    /// fails. Nothing is persisted on error.
    pub fn submit_vote_with<M, R>(
        &self,
        write: &VoteWrite,
        membership: &M,
        rules: &R,
    ) -> Result<VoteSubmission, InMemoryStoreError>
    where
        M: MembershipOracle + ?Sized,
        R: RuleResolver + ?Sized,
    {
        self.transact(|tx| {
            EvaluationPipeline::new(tx, rules, membership, tx).submit_vote(write, Timestamp::now())
        })
    }

    /// Runs `body` against a working copy and commits it on success.
    fn transact<T>(
        &self,
        body: impl FnOnce(&LedgerTx) -> Result<T, SubmitError>,
    ) -> Result<T, InMemoryStoreError> {
        let mut guard = self.lock()?;
        let tx = LedgerTx {
            state: RefCell::new(guard.clone()),
        };
        let output = body(&tx)?;
        *guard = tx.state.into_inner();
        Ok(output)
    }

    /// Deletes a vote without re-evaluating. Selections are never retracted.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Store`] when the store lock is poisoned.
    pub fn delete_vote(
        &self,
        item_id: &ItemId,
        voter_id: &VoterId,
    ) -> Result<bool, InMemoryStoreError> {
        self.transact(|tx| tx.delete_vote(item_id, voter_id).map_err(SubmitError::from))
    }

    /// Loads a single vote.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Store`] when the store lock is poisoned.
    pub fn vote(
        &self,
        item_id: &ItemId,
        voter_id: &VoterId,
    ) -> Result<Option<Vote>, InMemoryStoreError> {
        let state = self.lock()?;
        Ok(state.votes.get(&(item_id.clone(), voter_id.clone())).cloned())
    }

    /// Counts votes on an item.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Store`] when the store lock is poisoned.
    pub fn tally(&self, item_id: &ItemId) -> Result<VoteTally, InMemoryStoreError> {
        Ok(self.lock()?.tally(item_id))
    }

    /// Lists the selections of a decision ordered by item.
    ///
    /// # Errors
    ///
    /// Returns [`InMemoryStoreError::Store`] when the store lock is poisoned.
    pub fn list_selections(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<Selection>, InMemoryStoreError> {
        let state = self.lock()?;
        Ok(state
            .selections
            .iter()
            .filter(|((decision, _), _)| decision == decision_id)
            .map(|(_, selection)| selection.clone())
            .collect())
    }
}

impl SelectionReader for InMemoryTallyStore {
    fn get(
        &self,
        decision_id: &DecisionId,
        item_id: &ItemId,
    ) -> Result<Option<Selection>, SelectionStoreError> {
        let state = self
            .state
            .lock()
            .map_err(|_| SelectionStoreError::Store("tally store mutex poisoned".to_string()))?;
        Ok(state.selections.get(&(decision_id.clone(), item_id.clone())).cloned())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests unwrap deterministic fixtures.")]

    use super::InMemoryStoreError;
    use super::InMemoryTallyStore;
    use crate::core::DecisionId;
    use crate::core::GroupId;
    use crate::core::ItemId;
    use crate::core::MembershipStatus;
    use crate::core::RuleSpec;
    use crate::core::VoteWrite;
    use crate::core::VoterId;
    use crate::interfaces::VoteStoreError;

    #[test]
    fn vote_on_unknown_item_is_rejected() {
        let store = InMemoryTallyStore::new();
        let write = VoteWrite::new(ItemId::new("missing"), VoterId::new("ana")).like(true);
        assert_eq!(
            store.submit_vote(&write),
            Err(InMemoryStoreError::Vote(VoteStoreError::UnknownItem(ItemId::new("missing"))))
        );
    }

    #[test]
    fn management_ops_reject_duplicates_and_unknown_parents() {
        let store = InMemoryTallyStore::new();
        let group = GroupId::new("g");
        store.create_group(&group).unwrap();
        assert!(matches!(store.create_group(&group), Err(InMemoryStoreError::Conflict(_))));
        assert!(matches!(
            store.set_membership(&GroupId::new("nope"), &VoterId::new("ana"), MembershipStatus::Confirmed),
            Err(InMemoryStoreError::NotFound(_))
        ));
        assert!(matches!(
            store.create_item(&ItemId::new("i"), &DecisionId::new("d")),
            Err(InMemoryStoreError::NotFound(_))
        ));
        store.create_decision(&DecisionId::new("d"), &group, RuleSpec::Unanimous).unwrap();
        assert!(matches!(
            store.create_decision(&DecisionId::new("d"), &group, RuleSpec::Unanimous),
            Err(InMemoryStoreError::Conflict(_))
        ));
    }

    #[test]
    fn vote_ids_are_one_based_and_stable_across_updates() {
        let store = InMemoryTallyStore::new();
        let group = GroupId::new("g");
        store.create_group(&group).unwrap();
        store.create_decision(&DecisionId::new("d"), &group, RuleSpec::Unanimous).unwrap();
        store.create_item(&ItemId::new("i"), &DecisionId::new("d")).unwrap();
        let first = store
            .submit_vote(&VoteWrite::new(ItemId::new("i"), VoterId::new("ana")).like(false))
            .unwrap();
        assert_eq!(first.vote.id.get(), 1);
        let second = store
            .submit_vote(&VoteWrite::new(ItemId::new("i"), VoterId::new("ana")).like(true))
            .unwrap();
        assert_eq!(second.vote.id, first.vote.id);
        assert_eq!(second.vote.is_like, Some(true));
        assert_eq!(store.tally(&ItemId::new("i")).unwrap().total, 1);
    }
}
