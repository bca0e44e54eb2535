// crates/tally-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Tally Gate SQLite Store Library
// Description: Public API surface for the SQLite-backed tally store.
// Purpose: Expose the durable store, its configuration, and its errors.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! `SQLite`-backed implementation of the Tally Gate store. Every vote write,
//! its evaluation, and the resulting selection insert run in a single
//! `BEGIN IMMEDIATE` transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod schema;
pub mod store;
mod tx;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_SNAPSHOT_BYTES;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteTallyStore;
