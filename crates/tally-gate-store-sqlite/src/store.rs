// crates/tally-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Tally Store
// Description: Durable groups, decisions, votes, and selections backed by SQLite.
// Purpose: Run every vote write and its evaluation in one write transaction.
// Dependencies: rusqlite, serde, tally-gate-core, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteTallyStore`] persists the collaborator tables (groups,
//! memberships, decisions, items) alongside votes and selections. A vote
//! submission opens a `BEGIN IMMEDIATE` transaction, upserts the vote, runs
//! the evaluation pipeline against the same transaction, and commits only
//! when both succeed. Writers on other connections wait on the busy timeout.
//!
//! Selection snapshots are stored as canonical JSON with a digest; loads
//! verify the digest and fail closed on mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use tally_gate_core::DecisionId;
use tally_gate_core::EvaluationError;
use tally_gate_core::EvaluationPipeline;
use tally_gate_core::GroupId;
use tally_gate_core::ItemId;
use tally_gate_core::MembershipOracle;
use tally_gate_core::MembershipStatus;
use tally_gate_core::RuleResolver;
use tally_gate_core::RuleSpec;
use tally_gate_core::Selection;
use tally_gate_core::SelectionOutcome;
use tally_gate_core::SelectionReader;
use tally_gate_core::SelectionStoreError;
use tally_gate_core::SubmitError;
use tally_gate_core::Timestamp;
use tally_gate_core::Vote;
use tally_gate_core::VoteStore;
use tally_gate_core::VoteStoreError;
use tally_gate_core::VoteSubmission;
use tally_gate_core::VoteTally;
use tally_gate_core::VoteWrite;
use tally_gate_core::VoterId;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::schema::ensure_parent_dir;
use crate::schema::initialize_schema;
use crate::schema::open_connection;
use crate::schema::validate_store_path;
use crate::tx::TxView;
use crate::tx::fetch_selection;
use crate::tx::fetch_selections;
use crate::tx::fetch_tally;
use crate::tx::fetch_vote;
use crate::tx::selection_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum snapshot payload size accepted on load.
pub const MAX_SNAPSHOT_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` tally store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` bounds how long a vote write waits for the write lock.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw snapshot payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Record already exists.
    #[error("already exists: {0}")]
    Conflict(String),
    /// Vote write rejected or failed; nothing was persisted.
    #[error(transparent)]
    Vote(#[from] VoteStoreError),
    /// Evaluation failed; the vote write was rolled back.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl From<SubmitError> for SqliteStoreError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Vote(err) => Self::Vote(err),
            SubmitError::Evaluation(err) => Self::Evaluation(err),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed tally store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Every write runs in a `BEGIN IMMEDIATE` transaction.
#[derive(Clone)]
pub struct SqliteTallyStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteTallyStore {
    /// Opens (and initializes when empty) an `SQLite`-backed tally store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid, the database
    /// cannot be opened, or its schema version is unsupported.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite tally store");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs `body` in a `BEGIN IMMEDIATE` transaction; commits on success.
    fn write_tx<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let output = body(&tx)?;
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(output)
    }

    /// Runs a read against the shared connection.
    fn read<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))?;
        body(&guard)
    }

    // ------------------------------------------------------------------------
    // Management
    // ------------------------------------------------------------------------

    /// Creates a group.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Conflict`] when the group exists.
    pub fn create_group(&self, group_id: &GroupId) -> Result<(), SqliteStoreError> {
        self.write_tx(|conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO groups (group_id, created_at) VALUES (?1, ?2)
                     ON CONFLICT(group_id) DO NOTHING",
                    params![group_id.as_str(), Timestamp::now().as_unix_millis()],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if inserted == 0 {
                return Err(SqliteStoreError::Conflict(format!("group {group_id}")));
            }
            Ok(())
        })?;
        debug!(group_id = %group_id, "group created");
        Ok(())
    }

    /// Creates or updates a membership record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the group is unknown.
    pub fn set_membership(
        &self,
        group_id: &GroupId,
        user_id: &VoterId,
        status: MembershipStatus,
    ) -> Result<(), SqliteStoreError> {
        self.write_tx(|conn| {
            require_row(conn, "SELECT 1 FROM groups WHERE group_id = ?1", group_id.as_str(), || {
                format!("group {group_id}")
            })?;
            conn.execute(
                "INSERT INTO memberships (group_id, user_id, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(group_id, user_id) DO UPDATE SET
                   status = excluded.status,
                   updated_at = excluded.updated_at",
                params![
                    group_id.as_str(),
                    user_id.as_str(),
                    status.as_str(),
                    Timestamp::now().as_unix_millis()
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        })?;
        debug!(group_id = %group_id, user_id = %user_id, status = %status, "membership set");
        Ok(())
    }

    /// Removes a membership record. Returns true when a record was removed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the delete fails.
    pub fn remove_membership(
        &self,
        group_id: &GroupId,
        user_id: &VoterId,
    ) -> Result<bool, SqliteStoreError> {
        let removed = self.write_tx(|conn| {
            conn.execute(
                "DELETE FROM memberships WHERE group_id = ?1 AND user_id = ?2",
                params![group_id.as_str(), user_id.as_str()],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))
        })?;
        debug!(group_id = %group_id, user_id = %user_id, removed, "membership removed");
        Ok(removed > 0)
    }

    /// Creates a decision owned by `owning_group_id` with a validated rule.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the group is unknown or the decision exists.
    pub fn create_decision(
        &self,
        decision_id: &DecisionId,
        owning_group_id: &GroupId,
        rule: &RuleSpec,
    ) -> Result<(), SqliteStoreError> {
        self.write_tx(|conn| {
            require_row(
                conn,
                "SELECT 1 FROM groups WHERE group_id = ?1",
                owning_group_id.as_str(),
                || format!("group {owning_group_id}"),
            )?;
            let now = Timestamp::now().as_unix_millis();
            let inserted = conn
                .execute(
                    "INSERT INTO decisions (decision_id, owning_group_id, rule_json, created_at, \
                     updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)
                     ON CONFLICT(decision_id) DO NOTHING",
                    params![
                        decision_id.as_str(),
                        owning_group_id.as_str(),
                        rule.to_json().to_string(),
                        now
                    ],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if inserted == 0 {
                return Err(SqliteStoreError::Conflict(format!("decision {decision_id}")));
            }
            Ok(())
        })?;
        info!(
            decision_id = %decision_id,
            owning_group_id = %owning_group_id,
            rule = rule.kind(),
            "decision created"
        );
        Ok(())
    }

    /// Replaces a decision's rule. Existing selections keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the decision is unknown.
    pub fn update_rule(
        &self,
        decision_id: &DecisionId,
        rule: &RuleSpec,
    ) -> Result<(), SqliteStoreError> {
        self.write_tx(|conn| {
            let updated = conn
                .execute(
                    "UPDATE decisions SET rule_json = ?2, updated_at = ?3 WHERE decision_id = ?1",
                    params![
                        decision_id.as_str(),
                        rule.to_json().to_string(),
                        Timestamp::now().as_unix_millis()
                    ],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!("decision {decision_id}")));
            }
            Ok(())
        })?;
        info!(decision_id = %decision_id, rule = rule.kind(), "decision rule updated");
        Ok(())
    }

    /// Shares a decision with another group. Shared groups never count
    /// toward approval denominators.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the decision or group is unknown.
    pub fn share_decision(
        &self,
        decision_id: &DecisionId,
        group_id: &GroupId,
    ) -> Result<(), SqliteStoreError> {
        self.write_tx(|conn| {
            require_row(
                conn,
                "SELECT 1 FROM decisions WHERE decision_id = ?1",
                decision_id.as_str(),
                || format!("decision {decision_id}"),
            )?;
            require_row(conn, "SELECT 1 FROM groups WHERE group_id = ?1", group_id.as_str(), || {
                format!("group {group_id}")
            })?;
            conn.execute(
                "INSERT INTO decision_shares (decision_id, group_id) VALUES (?1, ?2)
                 ON CONFLICT(decision_id, group_id) DO NOTHING",
                params![decision_id.as_str(), group_id.as_str()],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        })?;
        debug!(decision_id = %decision_id, group_id = %group_id, "decision shared");
        Ok(())
    }

    /// Returns the groups a decision is shared with, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn shared_groups(&self, decision_id: &DecisionId) -> Result<Vec<GroupId>, SqliteStoreError> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT group_id FROM decision_shares WHERE decision_id = ?1 ORDER BY group_id",
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![decision_id.as_str()], |row| row.get::<_, String>(0))
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let mut groups = Vec::new();
            for row in rows {
                groups.push(GroupId::new(row.map_err(|err| SqliteStoreError::Db(err.to_string()))?));
            }
            Ok(groups)
        })
    }

    /// Creates an item within a decision.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the decision is unknown or the item exists.
    pub fn create_item(
        &self,
        item_id: &ItemId,
        decision_id: &DecisionId,
    ) -> Result<(), SqliteStoreError> {
        self.write_tx(|conn| {
            require_row(
                conn,
                "SELECT 1 FROM decisions WHERE decision_id = ?1",
                decision_id.as_str(),
                || format!("decision {decision_id}"),
            )?;
            let inserted = conn
                .execute(
                    "INSERT INTO items (item_id, decision_id, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(item_id) DO NOTHING",
                    params![
                        item_id.as_str(),
                        decision_id.as_str(),
                        Timestamp::now().as_unix_millis()
                    ],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if inserted == 0 {
                return Err(SqliteStoreError::Conflict(format!("item {item_id}")));
            }
            Ok(())
        })?;
        debug!(item_id = %item_id, decision_id = %decision_id, "item created");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Votes
    // ------------------------------------------------------------------------

    /// Writes a vote and evaluates its item against the stored rule and
    /// memberships, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Vote`] for invalid votes and
    /// [`SqliteStoreError::Evaluation`] when evaluation fails. Nothing is
    /// persisted on error.
    pub fn submit_vote(&self, write: &VoteWrite) -> Result<VoteSubmission, SqliteStoreError> {
        self.submit(write, |view, now| {
            EvaluationPipeline::new(view, view, view, view).submit_vote(write, now)
        })
    }

    /// Writes a vote and evaluates its item with caller-supplied membership
    /// and rule collaborators, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the write or any collaborator fails.
    /// Nothing is persisted on error.
    pub fn submit_vote_with<M, R>(
        &self,
        write: &VoteWrite,
        membership: &M,
        rules: &R,
    ) -> Result<VoteSubmission, SqliteStoreError>
    where
        M: MembershipOracle + ?Sized,
        R: RuleResolver + ?Sized,
    {
        self.submit(write, |view, now| {
            EvaluationPipeline::new(view, rules, membership, view).submit_vote(write, now)
        })
    }

    /// Shared vote submission path with logging.
    fn submit(
        &self,
        write: &VoteWrite,
        run: impl FnOnce(&TxView<'_>, Timestamp) -> Result<VoteSubmission, SubmitError>,
    ) -> Result<VoteSubmission, SqliteStoreError> {
        let result = self.write_tx(|conn| {
            let view = TxView {
                conn,
            };
            run(&view, Timestamp::now()).map_err(SqliteStoreError::from)
        });
        match &result {
            Ok(submission) => log_submission(submission),
            Err(err) => warn!(
                item_id = %write.item_id,
                voter_id = %write.voter_id,
                error = %err,
                "vote write rolled back"
            ),
        }
        result
    }

    /// Deletes a vote without re-evaluating. Selections are never retracted.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the delete fails.
    pub fn delete_vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<bool, SqliteStoreError> {
        let removed = self.write_tx(|conn| {
            let view = TxView {
                conn,
            };
            view.delete_vote(item_id, voter_id).map_err(SqliteStoreError::from)
        })?;
        info!(item_id = %item_id, voter_id = %voter_id, removed, "vote deleted");
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Loads a single vote.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the row is corrupt.
    pub fn vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<Option<Vote>, SqliteStoreError> {
        self.read(|conn| fetch_vote(conn, item_id, voter_id))
    }

    /// Counts approving and total votes on an item.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn tally(&self, item_id: &ItemId) -> Result<VoteTally, SqliteStoreError> {
        self.read(|conn| fetch_tally(conn, item_id))
    }

    /// Loads and verifies the selection of a (decision, item) pair.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when the stored digest does not match.
    pub fn selection(
        &self,
        decision_id: &DecisionId,
        item_id: &ItemId,
    ) -> Result<Option<Selection>, SqliteStoreError> {
        self.read(|conn| fetch_selection(conn, decision_id, item_id))
    }

    /// Loads and verifies every selection of a decision, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Corrupt`] when any stored digest does not match.
    pub fn list_selections(
        &self,
        decision_id: &DecisionId,
    ) -> Result<Vec<Selection>, SqliteStoreError> {
        self.read(|conn| fetch_selections(conn, decision_id))
    }
}

impl SelectionReader for SqliteTallyStore {
    fn get(
        &self,
        decision_id: &DecisionId,
        item_id: &ItemId,
    ) -> Result<Option<Selection>, SelectionStoreError> {
        self.selection(decision_id, item_id).map_err(selection_error)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fails with [`SqliteStoreError::NotFound`] when `sql` returns no row for `key`.
fn require_row(
    conn: &Connection,
    sql: &str,
    key: &str,
    describe: impl FnOnce() -> String,
) -> Result<(), SqliteStoreError> {
    let found: Option<i64> = conn
        .prepare_cached(sql)
        .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if found.is_none() {
        return Err(SqliteStoreError::NotFound(describe()));
    }
    Ok(())
}

/// Emits the structured events for a committed vote submission.
fn log_submission(submission: &VoteSubmission) {
    let evaluation = &submission.evaluation;
    info!(
        item_id = %evaluation.item_id,
        decision_id = %evaluation.binding.decision_id,
        vote_id = submission.vote.id.get(),
        approvals = evaluation.tally.approvals,
        total_votes = evaluation.tally.total,
        confirmed_members = evaluation.confirmed_members,
        outcome = evaluation.selection.label(),
        "vote evaluated"
    );
    if let SelectionOutcome::Created(selection) = &evaluation.selection {
        info!(
            selection_id = %selection.id,
            decision_id = %selection.decision_id,
            item_id = %selection.item_id,
            "selection created"
        );
    }
}
