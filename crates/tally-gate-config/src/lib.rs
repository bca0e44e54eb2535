// crates/tally-gate-config/src/lib.rs
// ============================================================================
// Module: Tally Gate Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for tally-gate.toml semantics.
// Dependencies: serde, tally-gate-store-sqlite, toml
// ============================================================================

//! ## Overview
//! `tally-gate-config` defines the configuration model for Tally Gate: the
//! `SQLite` store settings and the logging filter. Loading is strict and
//! fails closed on oversized, non-UTF-8, or out-of-range input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
