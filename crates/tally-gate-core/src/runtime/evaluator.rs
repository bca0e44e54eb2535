// crates/tally-gate-core/src/runtime/evaluator.rs
// ============================================================================
// Module: Tally Gate Approval Evaluator
// Description: Pure approval rule evaluation and snapshot construction.
// Purpose: Decide whether a tally satisfies a rule without any I/O.
// Dependencies: bigdecimal, crate::core
// ============================================================================

//! ## Overview
//! The evaluator is a pure function of `(rule, confirmed_members, approvals)`.
//! Threshold comparisons use exact decimal arithmetic
//! (`approvals >= value * members`), so a ratio sitting exactly on the
//! threshold always passes and float rounding never flips an outcome.
//! An empty owning group never satisfies any rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;

use crate::core::RuleSpec;
use crate::core::SelectionSnapshot;
use crate::core::VoteTally;

// ============================================================================
// SECTION: Approval Evaluator
// ============================================================================

/// Stateless approval rule evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalEvaluator;

impl ApprovalEvaluator {
    /// Creates a new evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates a rule against a tally.
    #[must_use]
    pub fn evaluate(
        &self,
        rule: &RuleSpec,
        confirmed_members: u32,
        tally: VoteTally,
    ) -> ApprovalVerdict {
        let satisfied = is_satisfied(rule, confirmed_members, tally.approvals);
        ApprovalVerdict {
            satisfied,
            snapshot: build_snapshot(rule, confirmed_members, tally.approvals),
        }
    }
}

/// Evaluator output.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalVerdict {
    /// True when the rule is satisfied.
    pub satisfied: bool,
    /// Approval context at evaluation time.
    pub snapshot: SelectionSnapshot,
}

// ============================================================================
// SECTION: Rule Evaluation
// ============================================================================

/// Returns true when `approvals` satisfies `rule` for the given group size.
#[must_use]
pub fn is_satisfied(rule: &RuleSpec, confirmed_members: u32, approvals: u32) -> bool {
    if confirmed_members == 0 {
        return false;
    }
    match rule {
        RuleSpec::Unanimous => approvals == confirmed_members,
        RuleSpec::Threshold {
            value,
        } => {
            let required = value.as_decimal() * BigDecimal::from(i64::from(confirmed_members));
            BigDecimal::from(i64::from(approvals)) >= required
        }
    }
}

/// Returns `approvals / confirmed_members`, or `None` for an empty group.
#[must_use]
pub fn approval_ratio(approvals: u32, confirmed_members: u32) -> Option<f64> {
    (confirmed_members > 0).then(|| f64::from(approvals) / f64::from(confirmed_members))
}

/// Builds the snapshot frozen into a selection.
#[must_use]
pub fn build_snapshot(rule: &RuleSpec, confirmed_members: u32, approvals: u32) -> SelectionSnapshot {
    let (threshold, ratio) = match rule {
        RuleSpec::Unanimous => (None, None),
        RuleSpec::Threshold {
            value,
        } => (Some(value.value()), approval_ratio(approvals, confirmed_members)),
    };
    SelectionSnapshot {
        approvals,
        total_members: confirmed_members,
        rule: rule.clone(),
        threshold,
        approval_ratio: ratio,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
