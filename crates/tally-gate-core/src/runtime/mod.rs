// crates/tally-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Tally Gate Runtime
// Description: Approval evaluator, vote-write pipeline, and in-memory store.
// Purpose: Execute approval evaluation against pluggable collaborators.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the pure evaluator, the evaluation pipeline run
//! inside every vote write, and an in-memory store. Every store backend
//! drives the same pipeline so selection semantics never diverge.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod evaluator;
pub mod pipeline;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use evaluator::ApprovalEvaluator;
pub use evaluator::ApprovalVerdict;
pub use evaluator::approval_ratio;
pub use evaluator::build_snapshot;
pub use evaluator::is_satisfied;
pub use pipeline::EvaluationError;
pub use pipeline::EvaluationOutcome;
pub use pipeline::EvaluationPipeline;
pub use pipeline::SelectionOutcome;
pub use pipeline::SubmitError;
pub use pipeline::VoteSubmission;
pub use store::InMemoryStoreError;
pub use store::InMemoryTallyStore;
