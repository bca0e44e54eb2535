// crates/tally-gate-core/src/core/decision.rs
// ============================================================================
// Module: Tally Gate Decisions
// Description: Decision bindings and membership status values.
// Purpose: Describe the collaborator data the evaluator consumes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A decision is owned by exactly one group and may be shared with others.
//! Only confirmed members of the owning group count toward the approval
//! denominator; shared groups never do.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DecisionId;
use crate::core::identifiers::GroupId;

// ============================================================================
// SECTION: Decision Binding
// ============================================================================

/// The decision an item belongs to, with the decision's owning group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionBinding {
    /// Decision identifier.
    pub decision_id: DecisionId,
    /// Group that created the decision.
    pub owning_group_id: GroupId,
}

// ============================================================================
// SECTION: Membership Status
// ============================================================================

/// Membership record status.
///
/// # Invariants
/// - Only [`MembershipStatus::Confirmed`] counts toward approval denominators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Invited or requested, not yet confirmed.
    Pending,
    /// Confirmed member.
    Confirmed,
    /// Rejected request or invitation.
    Rejected,
}

impl MembershipStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
