// crates/tally-gate-core/src/core/selection.rs
// ============================================================================
// Module: Tally Gate Selections
// Description: Write-once selection records and their frozen snapshots.
// Purpose: Define the persisted shape of an item that met its approval rule.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A selection is the immutable record that an item satisfied its decision's
//! rule. The snapshot freezes the approval context at creation time; later
//! rule edits or membership churn never rewrite it.
//!
//! Snapshot wire form:
//! `{"approvals", "total_members", "rule": {"type", "value"?}, "threshold"?, "approval_ratio"?}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DecisionId;
use crate::core::identifiers::ItemId;
use crate::core::identifiers::SelectionId;
use crate::core::rule::RuleSpec;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Approval context frozen when a selection is created.
///
/// # Invariants
/// - `threshold` and `approval_ratio` are present only for threshold rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    /// Approving votes at creation time.
    pub approvals: u32,
    /// Confirmed members of the owning group at creation time.
    pub total_members: u32,
    /// Rule echo at creation time.
    pub rule: RuleSpec,
    /// Threshold value (threshold rules only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    /// `approvals / total_members` (threshold rules only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ratio: Option<f64>,
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Materialized selection ("favourite") of an item within a decision.
///
/// # Invariants
/// - At most one per (`decision_id`, `item_id`).
/// - Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Selection identifier.
    pub id: SelectionId,
    /// Decision identifier.
    pub decision_id: DecisionId,
    /// Item identifier.
    pub item_id: ItemId,
    /// Creation time.
    pub created_at: Timestamp,
    /// Frozen approval context.
    pub snapshot: SelectionSnapshot,
}

/// Result of an idempotent selection insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written.
    Inserted,
    /// A selection for the (decision, item) pair already existed; nothing changed.
    AlreadyPresent,
}
