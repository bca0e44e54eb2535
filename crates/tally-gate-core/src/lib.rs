// crates/tally-gate-core/src/lib.rs
// ============================================================================
// Module: Tally Gate Core Library
// Description: Public API surface for the Tally Gate core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Tally Gate turns group votes into write-once selections. Every successful
//! vote write runs a deterministic approval evaluation inside the same
//! transaction; when the decision's rule is satisfied the item is selected
//! exactly once, with a frozen snapshot of the approval context. The core is
//! storage-agnostic and integrates through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::MembershipError;
pub use interfaces::MembershipOracle;
pub use interfaces::RuleResolver;
pub use interfaces::RuleResolverError;
pub use interfaces::SelectionReader;
pub use interfaces::SelectionStore;
pub use interfaces::SelectionStoreError;
pub use interfaces::VoteStore;
pub use interfaces::VoteStoreError;
pub use runtime::ApprovalEvaluator;
pub use runtime::ApprovalVerdict;
pub use runtime::EvaluationError;
pub use runtime::EvaluationOutcome;
pub use runtime::EvaluationPipeline;
pub use runtime::InMemoryStoreError;
pub use runtime::InMemoryTallyStore;
pub use runtime::SelectionOutcome;
pub use runtime::SubmitError;
pub use runtime::VoteSubmission;
