// crates/tally-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and command execution.
// Purpose: Ensure invalid input is rejected at parse time and commands emit JSON.
// Dependencies: tally-gate-cli main helpers
// ============================================================================

//! ## Overview
//! Validates flag parsing into vote writes, timestamp rendering, and the JSON
//! documents produced by store-backed commands against a temporary database.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::Parser;
use serde_json::json;
use tally_gate_core::FieldUpdate;
use tally_gate_core::MembershipStatus;
use tally_gate_core::Rating;
use tally_gate_core::Timestamp;
use tally_gate_store_sqlite::SqliteStoreConfig;
use tally_gate_store_sqlite::SqliteTallyStore;
use tempfile::TempDir;

use super::Cli;
use super::Commands;
use super::StoreCommand;
use super::VoteCommand;
use super::execute;
use super::format_timestamp;
use super::parse_rating;
use super::parse_status;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn store_command(args: &[&str]) -> StoreCommand {
    let mut argv = vec!["tally-gate"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Store(command) => command,
        Commands::Config {
            ..
        } => panic!("expected a store command"),
    }
}

fn run(store: &SqliteTallyStore, args: &[&str]) -> serde_json::Value {
    execute(store_command(args), store).unwrap()
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn rating_parser_enforces_range() {
    assert_eq!(parse_rating("4").unwrap(), Rating::new(4).unwrap());
    assert!(parse_rating("0").is_err());
    assert!(parse_rating("6").is_err());
    assert!(parse_rating("four").is_err());
}

#[test]
fn status_parser_accepts_storage_labels() {
    assert_eq!(parse_status("pending").unwrap(), MembershipStatus::Pending);
    assert_eq!(parse_status(" rejected ").unwrap(), MembershipStatus::Rejected);
    assert!(parse_status("invited").is_err());
}

#[test]
fn vote_flags_map_to_field_updates() {
    let command = store_command(&[
        "vote",
        "submit",
        "--item",
        "tacos",
        "--voter",
        "ana",
        "--rating",
        "5",
        "--clear-like",
    ]);
    let StoreCommand::Vote {
        command: VoteCommand::Submit(submit),
    } = command
    else {
        panic!("expected vote submit");
    };
    let write = submit.to_write();
    assert_eq!(write.is_like, FieldUpdate::Clear);
    assert_eq!(write.rating, FieldUpdate::Set(Rating::new(5).unwrap()));
    assert!(write.weight.is_none());
}

#[test]
fn conflicting_vote_flags_are_rejected() {
    let result = Cli::try_parse_from([
        "tally-gate",
        "vote",
        "submit",
        "--item",
        "tacos",
        "--voter",
        "ana",
        "--like",
        "true",
        "--clear-like",
    ]);
    assert!(result.is_err());
}

#[test]
fn invalid_rule_is_rejected_at_parse_time() {
    let result = Cli::try_parse_from([
        "tally-gate",
        "decision",
        "create",
        "--decision",
        "dinner",
        "--group",
        "household",
        "--rule",
        r#"{"type":"threshold","value":1.5}"#,
    ]);
    assert!(result.is_err());
}

#[test]
fn blank_identifiers_are_rejected_at_parse_time() {
    let result = Cli::try_parse_from(["tally-gate", "group", "create", "--group", "  "]);
    assert!(result.is_err());
}

#[test]
fn timestamps_render_as_rfc3339() {
    assert_eq!(format_timestamp(Timestamp::from_unix_millis(0)).unwrap(), "1970-01-01T00:00:00Z");
    assert_eq!(
        format_timestamp(Timestamp::from_unix_millis(1_700_000_000_000)).unwrap(),
        "2023-11-14T22:13:20Z"
    );
}

// ============================================================================
// SECTION: Execution
// ============================================================================

#[test]
fn commands_drive_a_selection_end_to_end() {
    let dir = TempDir::new().unwrap();
    let store = SqliteTallyStore::new(&SqliteStoreConfig::new(dir.path().join("cli.db"))).unwrap();

    assert_eq!(run(&store, &["init"]), json!({"status": "initialized"}));
    run(&store, &["group", "create", "--group", "household"]);
    run(&store, &["member", "set", "--group", "household", "--user", "ana"]);
    run(&store, &["member", "set", "--group", "household", "--user", "ben"]);
    let pending =
        run(&store, &["member", "set", "--group", "household", "--user", "cy", "--status", "pending"]);
    assert_eq!(pending["status"], "pending");
    run(&store, &[
        "decision",
        "create",
        "--decision",
        "dinner",
        "--group",
        "household",
        "--rule",
        r#"{"type":"threshold","value":0.5}"#,
    ]);
    run(&store, &["item", "create", "--item", "tacos", "--decision", "dinner"]);
    run(&store, &["item", "create", "--item", "pizza", "--decision", "dinner"]);

    let first =
        run(&store, &["vote", "submit", "--item", "tacos", "--voter", "ana", "--like", "true"]);
    assert_eq!(first["evaluation"]["outcome"], "created");
    assert_eq!(first["evaluation"]["approvals"], 1);
    assert_eq!(first["evaluation"]["confirmed_members"], 2);
    assert_eq!(first["vote"]["weight"], "1");
    assert_eq!(
        first["evaluation"]["selection"]["snapshot"],
        json!({
            "approvals": 1,
            "total_members": 2,
            "rule": {"type": "threshold", "value": 0.5},
            "threshold": 0.5,
            "approval_ratio": 0.5
        })
    );

    let second =
        run(&store, &["vote", "submit", "--item", "tacos", "--voter", "ben", "--rating", "2"]);
    assert_eq!(second["evaluation"]["outcome"], "already_selected");
    assert_eq!(second["evaluation"]["total_votes"], 2);

    let below =
        run(&store, &["vote", "submit", "--item", "pizza", "--voter", "ben", "--rating", "2"]);
    assert_eq!(below["evaluation"]["outcome"], "not_satisfied");
    assert_eq!(below["evaluation"]["approvals"], 0);
    assert!(below["evaluation"]["selection"].is_null());

    let listed = run(&store, &["selection", "list", "--decision", "dinner"]);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    let fetched = run(&store, &["selection", "get", "--decision", "dinner", "--item", "tacos"]);
    assert_eq!(fetched["item_id"], "tacos");

    let tally = run(&store, &["tally", "--item", "tacos"]);
    assert_eq!(tally, json!({"item_id": "tacos", "approvals": 1, "total_votes": 2}));
}

#[test]
fn empty_vote_fails_without_output() {
    let dir = TempDir::new().unwrap();
    let store = SqliteTallyStore::new(&SqliteStoreConfig::new(dir.path().join("cli.db"))).unwrap();
    run(&store, &["group", "create", "--group", "household"]);
    run(&store, &[
        "decision",
        "create",
        "--decision",
        "dinner",
        "--group",
        "household",
        "--rule",
        r#"{"type":"unanimous"}"#,
    ]);
    run(&store, &["item", "create", "--item", "tacos", "--decision", "dinner"]);

    let result = execute(
        store_command(&["vote", "submit", "--item", "tacos", "--voter", "ana"]),
        &store,
    );
    assert!(result.is_err());
    let missing = run(&store, &["selection", "get", "--decision", "dinner", "--item", "tacos"]);
    assert!(missing.is_null());
}
