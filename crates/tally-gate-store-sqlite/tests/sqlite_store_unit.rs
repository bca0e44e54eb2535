// crates/tally-gate-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Tally Store Tests
// Description: Durable vote, evaluation, and selection flows on SQLite.
// Purpose: Validate transactional evaluation, integrity checks, and path safety.
// ============================================================================

//! ## Overview
//! Exercises the `SQLite` tally store end to end:
//! - Unanimous and threshold selections with exact snapshots
//! - Invalid votes and failing collaborators leave no rows behind
//! - Concurrent writers on separate connections create one selection
//! - Hash mismatches, unknown schema versions, and corrupt rules fail closed

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::thread;

use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tally_gate_core::DecisionBinding;
use tally_gate_core::DecisionId;
use tally_gate_core::EvaluationError;
use tally_gate_core::GroupId;
use tally_gate_core::ItemId;
use tally_gate_core::MembershipError;
use tally_gate_core::MembershipOracle;
use tally_gate_core::MembershipStatus;
use tally_gate_core::Rating;
use tally_gate_core::RuleResolver;
use tally_gate_core::RuleResolverError;
use tally_gate_core::RuleSpec;
use tally_gate_core::SelectionOutcome;
use tally_gate_core::SelectionReader;
use tally_gate_core::SelectionStoreError;
use tally_gate_core::VoteError;
use tally_gate_core::VoteStoreError;
use tally_gate_core::VoteWrite;
use tally_gate_core::VoterId;
use tally_gate_store_sqlite::SqliteStoreConfig;
use tally_gate_store_sqlite::SqliteStoreError;
use tally_gate_store_sqlite::SqliteStoreMode;
use tally_gate_store_sqlite::SqliteSyncMode;
use tally_gate_store_sqlite::SqliteTallyStore;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const GROUP: &str = "household";
const DECISION: &str = "dinner";
const ITEM: &str = "tacos";

fn config_for(path: &Path) -> SqliteStoreConfig {
    SqliteStoreConfig {
        path: path.to_path_buf(),
        busy_timeout_ms: 10_000,
        journal_mode: SqliteStoreMode::Wal,
        sync_mode: SqliteSyncMode::Normal,
    }
}

fn seeded_store(path: &Path, rule: &RuleSpec, members: &[&str]) -> SqliteTallyStore {
    let store = SqliteTallyStore::new(&config_for(path)).unwrap();
    let group = GroupId::new(GROUP);
    store.create_group(&group).unwrap();
    for member in members {
        store.set_membership(&group, &VoterId::new(*member), MembershipStatus::Confirmed).unwrap();
    }
    store.create_decision(&DecisionId::new(DECISION), &group, rule).unwrap();
    store.create_item(&ItemId::new(ITEM), &DecisionId::new(DECISION)).unwrap();
    store
}

fn like(voter: &str) -> VoteWrite {
    VoteWrite::new(ItemId::new(ITEM), VoterId::new(voter)).like(true)
}

fn rate(voter: &str, stars: u8) -> VoteWrite {
    VoteWrite::new(ItemId::new(ITEM), VoterId::new(voter)).rating(Rating::new(stars).unwrap())
}

fn snapshot_json(store: &SqliteTallyStore) -> Option<serde_json::Value> {
    store
        .selection(&DecisionId::new(DECISION), &ItemId::new(ITEM))
        .unwrap()
        .map(|selection| serde_json::to_value(selection.snapshot).unwrap())
}

/// Membership oracle that always fails.
struct UnavailableMembership;

impl MembershipOracle for UnavailableMembership {
    fn confirmed_member_count(&self, _group_id: &GroupId) -> Result<u32, MembershipError> {
        Err(MembershipError::Unavailable("directory offline".to_string()))
    }
}

/// Rule resolver binding every item to the seeded unanimous decision.
struct FixedRules;

impl RuleResolver for FixedRules {
    fn decision_for_item(&self, _item_id: &ItemId) -> Result<DecisionBinding, RuleResolverError> {
        Ok(DecisionBinding {
            decision_id: DecisionId::new(DECISION),
            owning_group_id: GroupId::new(GROUP),
        })
    }

    fn rule(&self, _decision_id: &DecisionId) -> Result<RuleSpec, RuleResolverError> {
        Ok(RuleSpec::Unanimous)
    }
}

// ============================================================================
// SECTION: Selection Flows
// ============================================================================

/// Verifies a unanimous decision selects on the last approval and persists it.
#[test]
fn unanimous_selection_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");
    {
        let store = seeded_store(&path, &RuleSpec::Unanimous, &["ana", "ben"]);
        let first = store.submit_vote(&like("ana")).unwrap();
        assert_eq!(first.evaluation.selection, SelectionOutcome::NotSatisfied);
        let second = store.submit_vote(&rate("ben", 5)).unwrap();
        assert!(matches!(second.evaluation.selection, SelectionOutcome::Created(_)));
    }

    let reopened = SqliteTallyStore::new(&config_for(&path)).unwrap();
    assert_eq!(
        snapshot_json(&reopened),
        Some(json!({"approvals": 2, "total_members": 2, "rule": {"type": "unanimous"}}))
    );
    assert_eq!(reopened.tally(&ItemId::new(ITEM)).unwrap().total, 2);
    assert_eq!(reopened.list_selections(&DecisionId::new(DECISION)).unwrap().len(), 1);
}

/// Verifies a threshold decision records the ratio in its snapshot.
#[test]
fn threshold_selection_records_ratio() {
    let dir = TempDir::new().unwrap();
    let store =
        seeded_store(&dir.path().join("tally.db"), &RuleSpec::threshold(0.66).unwrap(), &[
            "ana", "ben", "cy",
        ]);
    store.submit_vote(&like("ana")).unwrap();
    let outcome = store.submit_vote(&rate("ben", 4)).unwrap();
    assert!(outcome.evaluation.satisfied);

    let snapshot =
        store.get(&DecisionId::new(DECISION), &ItemId::new(ITEM)).unwrap().unwrap().snapshot;
    assert_eq!(snapshot.approvals, 2);
    assert_eq!(snapshot.total_members, 3);
    assert_eq!(snapshot.threshold, Some(0.66));
    assert!((snapshot.approval_ratio.unwrap() - 0.667).abs() < 0.001);
}

/// Verifies vote updates keep their identity and merge omitted fields.
#[test]
fn vote_updates_keep_identity() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana", "ben"]);
    let first = store.submit_vote(&rate("ana", 2)).unwrap();
    let second = store.submit_vote(&like("ana")).unwrap();
    assert_eq!(first.vote.id, second.vote.id);
    assert_eq!(second.vote.rating, Some(Rating::new(2).unwrap()));
    assert_eq!(second.vote.is_like, Some(true));
    assert_eq!(second.evaluation.tally.approvals, 1);
    assert_eq!(second.evaluation.tally.total, 1);
}

/// Verifies a downgrade after selection leaves the stored selection untouched.
#[test]
fn downgrade_after_selection_keeps_selection() {
    let dir = TempDir::new().unwrap();
    let store =
        seeded_store(&dir.path().join("tally.db"), &RuleSpec::threshold(0.66).unwrap(), &[
            "ana", "ben", "cy",
        ]);
    store.submit_vote(&rate("ana", 4)).unwrap();
    store.submit_vote(&like("ben")).unwrap();
    let before = store.selection(&DecisionId::new(DECISION), &ItemId::new(ITEM)).unwrap();

    let downgrade = store.submit_vote(&rate("ana", 3)).unwrap();
    assert_eq!(downgrade.evaluation.selection, SelectionOutcome::NotSatisfied);
    let regained = store.submit_vote(&like("cy")).unwrap();
    assert_eq!(regained.evaluation.selection, SelectionOutcome::AlreadySelected);

    let after = store.selection(&DecisionId::new(DECISION), &ItemId::new(ITEM)).unwrap();
    assert!(before.is_some());
    assert_eq!(before, after);
}

/// Verifies shared groups never widen the approval denominator.
#[test]
fn shared_group_members_do_not_count() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana"]);
    let guests = GroupId::new("guests");
    store.create_group(&guests).unwrap();
    store.set_membership(&guests, &VoterId::new("zed"), MembershipStatus::Confirmed).unwrap();
    store
        .set_membership(&GroupId::new(GROUP), &VoterId::new("pat"), MembershipStatus::Pending)
        .unwrap();
    store.share_decision(&DecisionId::new(DECISION), &guests).unwrap();
    assert_eq!(store.shared_groups(&DecisionId::new(DECISION)).unwrap(), vec![guests]);

    let outcome = store.submit_vote(&like("ana")).unwrap();
    assert_eq!(outcome.evaluation.confirmed_members, 1);
    assert!(matches!(outcome.evaluation.selection, SelectionOutcome::Created(_)));
}

/// Verifies deleting a vote never retracts a selection.
#[test]
fn delete_vote_keeps_selection() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana"]);
    store.submit_vote(&like("ana")).unwrap();
    assert!(store.delete_vote(&ItemId::new(ITEM), &VoterId::new("ana")).unwrap());
    assert!(!store.delete_vote(&ItemId::new(ITEM), &VoterId::new("ana")).unwrap());
    assert_eq!(store.tally(&ItemId::new(ITEM)).unwrap().total, 0);
    assert!(snapshot_json(&store).is_some());

    let again = store.submit_vote(&like("ana")).unwrap();
    assert_eq!(again.vote.id.get(), 2);
    assert_eq!(again.evaluation.selection, SelectionOutcome::AlreadySelected);
}

// ============================================================================
// SECTION: Rollback
// ============================================================================

/// Verifies an empty vote is rejected without writing a row.
#[test]
fn empty_vote_is_rejected_without_row() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana"]);
    let write = VoteWrite::from_options(ItemId::new(ITEM), VoterId::new("ana"), None, None);
    let result = store.submit_vote(&write);
    assert!(matches!(
        result,
        Err(SqliteStoreError::Vote(VoteStoreError::Invalid(VoteError::InvalidVote(_))))
    ));
    assert!(store.vote(&ItemId::new(ITEM), &VoterId::new("ana")).unwrap().is_none());
}

/// Verifies votes on unknown items are rejected.
#[test]
fn unknown_item_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana"]);
    let write = VoteWrite::new(ItemId::new("pizza"), VoterId::new("ana")).like(true);
    assert!(matches!(
        store.submit_vote(&write),
        Err(SqliteStoreError::Vote(VoteStoreError::UnknownItem(_)))
    ));
}

/// Verifies a failing membership lookup rolls back the vote write.
#[test]
fn membership_failure_rolls_back_vote() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana"]);
    let result = store.submit_vote_with(&like("ana"), &UnavailableMembership, &FixedRules);
    assert!(matches!(
        result,
        Err(SqliteStoreError::Evaluation(EvaluationError::Membership(
            MembershipError::Unavailable(_)
        )))
    ));
    assert!(store.vote(&ItemId::new(ITEM), &VoterId::new("ana")).unwrap().is_none());
    assert_eq!(store.tally(&ItemId::new(ITEM)).unwrap().total, 0);
    assert!(snapshot_json(&store).is_none());
}

/// Verifies a stored rule that no longer parses aborts the write.
#[test]
fn corrupt_stored_rule_aborts_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");
    let store = seeded_store(&path, &RuleSpec::Unanimous, &["ana"]);
    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE decisions SET rule_json = ?1 WHERE decision_id = ?2",
        params![r#"{"type":"quorum"}"#, DECISION],
    )
    .unwrap();

    let result = store.submit_vote(&like("ana"));
    assert!(matches!(
        result,
        Err(SqliteStoreError::Evaluation(EvaluationError::Rule(RuleResolverError::Corrupt(_))))
    ));
    assert!(store.vote(&ItemId::new(ITEM), &VoterId::new("ana")).unwrap().is_none());
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

/// Verifies concurrent writers on separate connections create one selection.
#[test]
fn concurrent_writers_create_one_selection() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");
    let voters: Vec<String> = (0 .. 8).map(|index| format!("voter-{index}")).collect();
    let member_refs: Vec<&str> = voters.iter().map(String::as_str).collect();
    seeded_store(&path, &RuleSpec::threshold(0.5).unwrap(), &member_refs);

    let stores: Vec<SqliteTallyStore> =
        voters.iter().map(|_| SqliteTallyStore::new(&config_for(&path)).unwrap()).collect();
    let created = thread::scope(|scope| {
        let handles: Vec<_> = stores
            .iter()
            .zip(voters.iter())
            .map(|(store, voter)| scope.spawn(move || store.submit_vote(&like(voter)).unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|submission| {
                matches!(submission.evaluation.selection, SelectionOutcome::Created(_))
            })
            .count()
    });

    assert_eq!(created, 1);
    let store = SqliteTallyStore::new(&config_for(&path)).unwrap();
    assert_eq!(store.list_selections(&DecisionId::new(DECISION)).unwrap().len(), 1);
    assert_eq!(store.tally(&ItemId::new(ITEM)).unwrap().approvals, 8);
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

/// Verifies tampered snapshots fail closed on load.
#[test]
fn tampered_snapshot_is_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");
    let store = seeded_store(&path, &RuleSpec::Unanimous, &["ana"]);
    store.submit_vote(&like("ana")).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE selections SET snapshot_json = ?1",
        params![br#"{"approvals":9,"rule":{"type":"unanimous"},"total_members":9}"#.to_vec()],
    )
    .unwrap();

    let result = store.selection(&DecisionId::new(DECISION), &ItemId::new(ITEM));
    assert!(matches!(result, Err(SqliteStoreError::Corrupt(_))));
    let through_trait = store.get(&DecisionId::new(DECISION), &ItemId::new(ITEM));
    assert!(matches!(through_trait, Err(SelectionStoreError::Corrupt(_))));
}

/// Verifies unknown hash algorithms are rejected.
#[test]
fn unknown_hash_algorithm_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");
    let store = seeded_store(&path, &RuleSpec::Unanimous, &["ana"]);
    store.submit_vote(&like("ana")).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE selections SET hash_algorithm = 'md5'", params![]).unwrap();
    let result = store.list_selections(&DecisionId::new(DECISION));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

/// Verifies unknown schema versions are rejected on open.
#[test]
fn schema_version_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");
    drop(SqliteTallyStore::new(&config_for(&path)).unwrap());

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE store_meta SET version = 99", params![]).unwrap();
    drop(conn);

    let result = SqliteTallyStore::new(&config_for(&path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

/// Verifies directory paths are rejected.
#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = SqliteTallyStore::new(&config_for(dir.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

/// Verifies overlong path components are rejected.
#[test]
fn overlong_path_component_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a".repeat(300));
    let result = SqliteTallyStore::new(&config_for(&path));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

/// Verifies management operations report conflicts and missing parents.
#[test]
fn management_reports_conflicts_and_missing_parents() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir.path().join("tally.db"), &RuleSpec::Unanimous, &["ana"]);
    assert!(matches!(
        store.create_group(&GroupId::new(GROUP)),
        Err(SqliteStoreError::Conflict(_))
    ));
    assert!(matches!(
        store.create_item(&ItemId::new(ITEM), &DecisionId::new(DECISION)),
        Err(SqliteStoreError::Conflict(_))
    ));
    assert!(matches!(
        store.create_item(&ItemId::new("pizza"), &DecisionId::new("lunch")),
        Err(SqliteStoreError::NotFound(_))
    ));
    assert!(matches!(
        store.set_membership(&GroupId::new("nobody"), &VoterId::new("ana"), MembershipStatus::Confirmed),
        Err(SqliteStoreError::NotFound(_))
    ));
    assert!(matches!(
        store.update_rule(&DecisionId::new("lunch"), &RuleSpec::Unanimous),
        Err(SqliteStoreError::NotFound(_))
    ));
}
