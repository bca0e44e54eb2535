// crates/tally-gate-core/src/core/mod.rs
// ============================================================================
// Module: Tally Gate Core Types
// Description: Canonical vote, rule, and selection structures.
// Purpose: Provide stable, serializable types shared by every store backend.
// Dependencies: bigdecimal, serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! Core types define votes, approval rules, tallies, and selections. They are
//! the single source of truth for the SQLite store, the in-memory store, and
//! the CLI's JSON output.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod decision;
pub mod hashing;
pub mod identifiers;
pub mod rule;
pub mod selection;
pub mod tally;
pub mod time;
pub mod vote;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use decision::DecisionBinding;
pub use decision::MembershipStatus;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use identifiers::DecisionId;
pub use identifiers::GroupId;
pub use identifiers::IdentifierError;
pub use identifiers::ItemId;
pub use identifiers::SelectionId;
pub use identifiers::VoteId;
pub use identifiers::VoterId;
pub use rule::RuleSpec;
pub use rule::RuleValidationError;
pub use rule::ThresholdValue;
pub use selection::InsertOutcome;
pub use selection::Selection;
pub use selection::SelectionSnapshot;
pub use tally::VoteTally;
pub use time::Timestamp;
pub use vote::FieldUpdate;
pub use vote::MergedVote;
pub use vote::Rating;
pub use vote::Vote;
pub use vote::VoteError;
pub use vote::VoteWeight;
pub use vote::VoteWrite;
pub use vote::is_approval;
