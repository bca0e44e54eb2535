// crates/tally-gate-core/src/runtime/pipeline.rs
// ============================================================================
// Module: Tally Gate Evaluation Pipeline
// Description: Vote-write hook that tallies, evaluates, and materializes selections.
// Purpose: Orchestrate collaborator reads around the pure evaluator.
// Dependencies: crate::{core, interfaces}, thiserror
// ============================================================================

//! ## Overview
//! [`EvaluationPipeline`] binds the four collaborators of a single write
//! transaction. [`EvaluationPipeline::submit_vote`] upserts the vote and then
//! runs [`EvaluationPipeline::on_vote_written`]; stores commit only when both
//! succeed. Any collaborator error propagates so the caller rolls back the
//! vote write together with the evaluation.
//!
//! Once a selection exists for an item, later evaluations never alter it:
//! the insert is conditional and a conflict is reported as
//! [`SelectionOutcome::AlreadySelected`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::DecisionBinding;
use crate::core::InsertOutcome;
use crate::core::ItemId;
use crate::core::Selection;
use crate::core::SelectionId;
use crate::core::Timestamp;
use crate::core::Vote;
use crate::core::VoteTally;
use crate::core::VoteWrite;
use crate::interfaces::MembershipError;
use crate::interfaces::MembershipOracle;
use crate::interfaces::RuleResolver;
use crate::interfaces::RuleResolverError;
use crate::interfaces::SelectionStore;
use crate::interfaces::SelectionStoreError;
use crate::interfaces::VoteStore;
use crate::interfaces::VoteStoreError;
use crate::runtime::evaluator::ApprovalEvaluator;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Evaluation failures. Every variant aborts the enclosing vote write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Tally read failed.
    #[error("tally failed: {0}")]
    Votes(#[source] VoteStoreError),
    /// Rule or decision binding lookup failed.
    #[error(transparent)]
    Rule(#[from] RuleResolverError),
    /// Membership count lookup failed.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// Selection insert failed.
    #[error(transparent)]
    Selection(#[from] SelectionStoreError),
}

/// Vote submission failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The vote write was rejected or failed.
    #[error(transparent)]
    Vote(#[from] VoteStoreError),
    /// The evaluation triggered by the write failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// What the materializer did for a single evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// The rule was not satisfied; nothing was written.
    NotSatisfied,
    /// The rule was satisfied and this evaluation created the selection.
    Created(Selection),
    /// The rule was satisfied but a selection already existed.
    AlreadySelected,
}

impl SelectionOutcome {
    /// Returns the stable outcome label used in logs and CLI output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotSatisfied => "not_satisfied",
            Self::Created(_) => "created",
            Self::AlreadySelected => "already_selected",
        }
    }
}

/// Result of one `on_vote_written` run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    /// Evaluated item.
    pub item_id: ItemId,
    /// Decision binding of the item.
    pub binding: DecisionBinding,
    /// Vote counts at evaluation time.
    pub tally: VoteTally,
    /// Confirmed members of the owning group at evaluation time.
    pub confirmed_members: u32,
    /// True when the rule was satisfied.
    pub satisfied: bool,
    /// Materializer outcome.
    pub selection: SelectionOutcome,
}

/// Result of a vote submission.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSubmission {
    /// Stored vote after the write.
    pub vote: Vote,
    /// Evaluation run by the write.
    pub evaluation: EvaluationOutcome,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Collaborators of one vote-write transaction.
pub struct EvaluationPipeline<'a, V: ?Sized, R: ?Sized, M: ?Sized, S: ?Sized> {
    /// Vote rows.
    votes: &'a V,
    /// Rules and item bindings.
    rules: &'a R,
    /// Membership counts.
    membership: &'a M,
    /// Selection sink.
    selections: &'a S,
    /// Pure rule evaluator.
    evaluator: ApprovalEvaluator,
}

impl<'a, V, R, M, S> EvaluationPipeline<'a, V, R, M, S>
where
    V: VoteStore + ?Sized,
    R: RuleResolver + ?Sized,
    M: MembershipOracle + ?Sized,
    S: SelectionStore + ?Sized,
{
    /// Binds the collaborators of a write transaction.
    #[must_use]
    pub const fn new(votes: &'a V, rules: &'a R, membership: &'a M, selections: &'a S) -> Self {
        Self {
            votes,
            rules,
            membership,
            selections,
            evaluator: ApprovalEvaluator::new(),
        }
    }

    /// Upserts a vote and evaluates its item.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Vote`] when the vote is invalid (evaluation
    /// does not run) and [`SubmitError::Evaluation`] when evaluation fails.
    /// The caller must roll back the vote write on any error.
    pub fn submit_vote(
        &self,
        write: &VoteWrite,
        now: Timestamp,
    ) -> Result<VoteSubmission, SubmitError> {
        let vote = self.votes.upsert_vote(write, now)?;
        let evaluation = self.on_vote_written(&vote.item_id, now)?;
        Ok(VoteSubmission {
            vote,
            evaluation,
        })
    }

    /// Evaluates an item after a successful vote insert or update.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] when any collaborator fails.
    pub fn on_vote_written(
        &self,
        item_id: &ItemId,
        now: Timestamp,
    ) -> Result<EvaluationOutcome, EvaluationError> {
        let binding = self.rules.decision_for_item(item_id)?;
        let rule = self.rules.rule(&binding.decision_id)?;
        let tally = self.votes.tally(item_id).map_err(EvaluationError::Votes)?;
        let confirmed_members =
            self.membership.confirmed_member_count(&binding.owning_group_id)?;
        let verdict = self.evaluator.evaluate(&rule, confirmed_members, tally);

        let selection = if verdict.satisfied {
            let selection = Selection {
                id: SelectionId::generate(),
                decision_id: binding.decision_id.clone(),
                item_id: item_id.clone(),
                created_at: now,
                snapshot: verdict.snapshot,
            };
            match self.selections.insert_if_absent(&selection)? {
                InsertOutcome::Inserted => SelectionOutcome::Created(selection),
                InsertOutcome::AlreadyPresent => SelectionOutcome::AlreadySelected,
            }
        } else {
            SelectionOutcome::NotSatisfied
        };

        Ok(EvaluationOutcome {
            item_id: item_id.clone(),
            binding,
            tally,
            confirmed_members,
            satisfied: verdict.satisfied,
            selection,
        })
    }
}
