// crates/tally-gate-store-sqlite/src/tx.rs
// ============================================================================
// Module: SQLite Tally Store Transaction View
// Description: Core store traits implemented over an open SQLite transaction.
// Purpose: Let the evaluation pipeline read and write inside one transaction.
// Dependencies: rusqlite, serde_json, tally-gate-core
// ============================================================================

//! ## Overview
//! [`TxView`] borrows the connection of an open `BEGIN IMMEDIATE`
//! transaction. Everything the pipeline reads or writes through it commits
//! or rolls back together with the vote write. Row decoding treats database
//! contents as untrusted and fails closed on out-of-range values or hash
//! mismatches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tally_gate_core::DEFAULT_HASH_ALGORITHM;
use tally_gate_core::DecisionBinding;
use tally_gate_core::DecisionId;
use tally_gate_core::GroupId;
use tally_gate_core::HashAlgorithm;
use tally_gate_core::InsertOutcome;
use tally_gate_core::ItemId;
use tally_gate_core::MembershipError;
use tally_gate_core::MembershipOracle;
use tally_gate_core::Rating;
use tally_gate_core::RuleResolver;
use tally_gate_core::RuleResolverError;
use tally_gate_core::RuleSpec;
use tally_gate_core::Selection;
use tally_gate_core::SelectionId;
use tally_gate_core::SelectionReader;
use tally_gate_core::SelectionSnapshot;
use tally_gate_core::SelectionStore;
use tally_gate_core::SelectionStoreError;
use tally_gate_core::Timestamp;
use tally_gate_core::Vote;
use tally_gate_core::VoteId;
use tally_gate_core::VoteStore;
use tally_gate_core::VoteStoreError;
use tally_gate_core::VoteTally;
use tally_gate_core::VoteWeight;
use tally_gate_core::VoteWrite;
use tally_gate_core::VoterId;
use tally_gate_core::canonical_json_bytes;
use tally_gate_core::hash_bytes;
use tally_gate_core::core::vote::APPROVAL_MIN_RATING;

use crate::store::MAX_SNAPSHOT_BYTES;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Transaction View
// ============================================================================

/// Core store traits over the connection of an open write transaction.
pub(crate) struct TxView<'a> {
    /// Connection running the transaction.
    pub(crate) conn: &'a Connection,
}

impl VoteStore for TxView<'_> {
    fn vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<Option<Vote>, VoteStoreError> {
        fetch_vote(self.conn, item_id, voter_id).map_err(|err| VoteStoreError::Store(err.to_string()))
    }

    fn upsert_vote(&self, write: &VoteWrite, now: Timestamp) -> Result<Vote, VoteStoreError> {
        let item_known: Option<i64> = self
            .conn
            .prepare_cached("SELECT 1 FROM items WHERE item_id = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![write.item_id.as_str()], |row| row.get(0)).optional()
            })
            .map_err(|err| VoteStoreError::Store(err.to_string()))?;
        if item_known.is_none() {
            return Err(VoteStoreError::UnknownItem(write.item_id.clone()));
        }
        let existing = self.vote(&write.item_id, &write.voter_id)?;
        let merged = write.merge(existing.as_ref())?;
        let (vote_id, created_at): (i64, i64) = self
            .conn
            .prepare_cached(
                "INSERT INTO votes (item_id, voter_id, is_like, rating, weight, created_at, \
                 updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(voter_id, item_id) DO UPDATE SET
                   is_like = excluded.is_like,
                   rating = excluded.rating,
                   weight = excluded.weight,
                   updated_at = excluded.updated_at
                 RETURNING vote_id, created_at",
            )
            .and_then(|mut stmt| {
                stmt.query_row(
                    params![
                        write.item_id.as_str(),
                        write.voter_id.as_str(),
                        merged.is_like,
                        merged.rating.map(Rating::get),
                        merged.weight.to_string(),
                        now.as_unix_millis(),
                    ],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .map_err(|err| VoteStoreError::Store(err.to_string()))?;
        let id = u64::try_from(vote_id)
            .ok()
            .and_then(VoteId::from_raw)
            .ok_or_else(|| VoteStoreError::Store(format!("invalid vote id: {vote_id}")))?;
        Ok(Vote {
            id,
            item_id: write.item_id.clone(),
            voter_id: write.voter_id.clone(),
            is_like: merged.is_like,
            rating: merged.rating,
            weight: merged.weight,
            created_at: Timestamp::from_unix_millis(created_at),
            updated_at: now,
        })
    }

    fn delete_vote(&self, item_id: &ItemId, voter_id: &VoterId) -> Result<bool, VoteStoreError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM votes WHERE item_id = ?1 AND voter_id = ?2",
                params![item_id.as_str(), voter_id.as_str()],
            )
            .map_err(|err| VoteStoreError::Store(err.to_string()))?;
        Ok(removed > 0)
    }

    fn tally(&self, item_id: &ItemId) -> Result<VoteTally, VoteStoreError> {
        fetch_tally(self.conn, item_id).map_err(|err| VoteStoreError::Store(err.to_string()))
    }
}

impl RuleResolver for TxView<'_> {
    fn decision_for_item(&self, item_id: &ItemId) -> Result<DecisionBinding, RuleResolverError> {
        let row: Option<(String, String)> = self
            .conn
            .prepare_cached(
                "SELECT items.decision_id, decisions.owning_group_id
                 FROM items JOIN decisions ON decisions.decision_id = items.decision_id
                 WHERE items.item_id = ?1",
            )
            .and_then(|mut stmt| {
                stmt.query_row(params![item_id.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()
            })
            .map_err(|err| RuleResolverError::Unavailable(err.to_string()))?;
        let (decision_id, owning_group_id) =
            row.ok_or_else(|| RuleResolverError::UnknownItem(item_id.clone()))?;
        Ok(DecisionBinding {
            decision_id: DecisionId::new(decision_id),
            owning_group_id: GroupId::new(owning_group_id),
        })
    }

    fn rule(&self, decision_id: &DecisionId) -> Result<RuleSpec, RuleResolverError> {
        let raw: Option<String> = self
            .conn
            .prepare_cached("SELECT rule_json FROM decisions WHERE decision_id = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![decision_id.as_str()], |row| row.get(0)).optional()
            })
            .map_err(|err| RuleResolverError::Unavailable(err.to_string()))?;
        let raw = raw.ok_or_else(|| RuleResolverError::UnknownDecision(decision_id.clone()))?;
        RuleSpec::from_json_str(&raw).map_err(|err| {
            RuleResolverError::Corrupt(format!("decision {decision_id}: {err}"))
        })
    }
}

impl MembershipOracle for TxView<'_> {
    fn confirmed_member_count(&self, group_id: &GroupId) -> Result<u32, MembershipError> {
        let known: Option<i64> = self
            .conn
            .prepare_cached("SELECT 1 FROM groups WHERE group_id = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![group_id.as_str()], |row| row.get(0)).optional()
            })
            .map_err(|err| MembershipError::Unavailable(err.to_string()))?;
        if known.is_none() {
            return Err(MembershipError::UnknownGroup(group_id.clone()));
        }
        let count: i64 = self
            .conn
            .prepare_cached(
                "SELECT COUNT(*) FROM memberships WHERE group_id = ?1 AND status = 'confirmed'",
            )
            .and_then(|mut stmt| stmt.query_row(params![group_id.as_str()], |row| row.get(0)))
            .map_err(|err| MembershipError::Unavailable(err.to_string()))?;
        u32::try_from(count)
            .map_err(|_| MembershipError::Unavailable(format!("invalid member count: {count}")))
    }
}

impl SelectionReader for TxView<'_> {
    fn get(
        &self,
        decision_id: &DecisionId,
        item_id: &ItemId,
    ) -> Result<Option<Selection>, SelectionStoreError> {
        fetch_selection(self.conn, decision_id, item_id).map_err(selection_error)
    }
}

impl SelectionStore for TxView<'_> {
    fn insert_if_absent(&self, selection: &Selection) -> Result<InsertOutcome, SelectionStoreError> {
        let bytes = canonical_json_bytes(&selection.snapshot)
            .map_err(|err| SelectionStoreError::Store(err.to_string()))?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        let inserted = self
            .conn
            .prepare_cached(
                "INSERT INTO selections (selection_id, decision_id, item_id, snapshot_json, \
                 snapshot_hash, hash_algorithm, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(decision_id, item_id) DO NOTHING",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    selection.id.as_str(),
                    selection.decision_id.as_str(),
                    selection.item_id.as_str(),
                    bytes,
                    digest.value,
                    digest.algorithm.label(),
                    selection.created_at.as_unix_millis(),
                ])
            })
            .map_err(|err| SelectionStoreError::Store(err.to_string()))?;
        Ok(if inserted == 0 { InsertOutcome::AlreadyPresent } else { InsertOutcome::Inserted })
    }
}

// ============================================================================
// SECTION: Row Helpers
// ============================================================================

/// Maps store errors onto selection store errors.
pub(crate) fn selection_error(error: SqliteStoreError) -> SelectionStoreError {
    match error {
        SqliteStoreError::Corrupt(message) | SqliteStoreError::Invalid(message) => {
            SelectionStoreError::Corrupt(message)
        }
        other => SelectionStoreError::Store(other.to_string()),
    }
}

/// Raw vote columns.
type VoteColumns = (i64, Option<i64>, Option<i64>, String, i64, i64);

/// Loads and decodes a single vote row.
pub(crate) fn fetch_vote(
    conn: &Connection,
    item_id: &ItemId,
    voter_id: &VoterId,
) -> Result<Option<Vote>, SqliteStoreError> {
    let row: Option<VoteColumns> = conn
        .prepare_cached(
            "SELECT vote_id, is_like, rating, weight, created_at, updated_at
             FROM votes WHERE item_id = ?1 AND voter_id = ?2",
        )
        .and_then(|mut stmt| {
            stmt.query_row(params![item_id.as_str(), voter_id.as_str()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
            })
            .optional()
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let Some((vote_id, is_like, rating, weight, created_at, updated_at)) = row else {
        return Ok(None);
    };
    let id = u64::try_from(vote_id)
        .ok()
        .and_then(VoteId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid vote id: {vote_id}")))?;
    let is_like = match is_like {
        None => None,
        Some(0) => Some(false),
        Some(1) => Some(true),
        Some(other) => {
            return Err(SqliteStoreError::Corrupt(format!("invalid is_like value: {other}")));
        }
    };
    let rating = rating
        .map(|raw| {
            u8::try_from(raw)
                .ok()
                .and_then(|value| Rating::new(value).ok())
                .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid rating: {raw}")))
        })
        .transpose()?;
    let weight =
        VoteWeight::parse(&weight).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
    Ok(Some(Vote {
        id,
        item_id: item_id.clone(),
        voter_id: voter_id.clone(),
        is_like,
        rating,
        weight,
        created_at: Timestamp::from_unix_millis(created_at),
        updated_at: Timestamp::from_unix_millis(updated_at),
    }))
}

/// Counts approving and total votes on an item.
pub(crate) fn fetch_tally(conn: &Connection, item_id: &ItemId) -> Result<VoteTally, SqliteStoreError> {
    let (total, approvals): (i64, i64) = conn
        .prepare_cached(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN is_like = 1 OR rating >= ?2 THEN 1 ELSE 0 END), 0)
             FROM votes WHERE item_id = ?1",
        )
        .and_then(|mut stmt| {
            stmt.query_row(params![item_id.as_str(), APPROVAL_MIN_RATING], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let total = u32::try_from(total)
        .map_err(|_| SqliteStoreError::Invalid(format!("vote count out of range: {total}")))?;
    let approvals = u32::try_from(approvals)
        .map_err(|_| SqliteStoreError::Invalid(format!("approval count out of range: {approvals}")))?;
    Ok(VoteTally {
        approvals,
        total,
    })
}

/// Raw selection columns.
struct SelectionRow {
    /// Selection identifier.
    selection_id: String,
    /// Item identifier.
    item_id: String,
    /// Canonical snapshot bytes.
    snapshot_json: Vec<u8>,
    /// Stored snapshot digest.
    snapshot_hash: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
    /// Creation time (unix millis).
    created_at: i64,
}

/// Maps a selection row.
fn map_selection_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SelectionRow> {
    Ok(SelectionRow {
        selection_id: row.get(0)?,
        item_id: row.get(1)?,
        snapshot_json: row.get(2)?,
        snapshot_hash: row.get(3)?,
        hash_algorithm: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Verifies a selection row and decodes it.
fn decode_selection(
    decision_id: &DecisionId,
    row: SelectionRow,
) -> Result<Selection, SqliteStoreError> {
    if row.snapshot_json.len() > MAX_SNAPSHOT_BYTES {
        return Err(SqliteStoreError::Invalid(format!(
            "snapshot for selection {} exceeds {MAX_SNAPSHOT_BYTES} bytes",
            row.selection_id
        )));
    }
    let algorithm = HashAlgorithm::from_label(&row.hash_algorithm).ok_or_else(|| {
        SqliteStoreError::Invalid(format!("unsupported hash algorithm: {}", row.hash_algorithm))
    })?;
    let expected = hash_bytes(algorithm, &row.snapshot_json);
    if expected.value != row.snapshot_hash {
        return Err(SqliteStoreError::Corrupt(format!(
            "hash mismatch for selection {}",
            row.selection_id
        )));
    }
    let snapshot: SelectionSnapshot = serde_json::from_slice(&row.snapshot_json)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    Ok(Selection {
        id: SelectionId::new(row.selection_id),
        decision_id: decision_id.clone(),
        item_id: ItemId::new(row.item_id),
        created_at: Timestamp::from_unix_millis(row.created_at),
        snapshot,
    })
}

/// Loads and verifies the selection of a (decision, item) pair.
pub(crate) fn fetch_selection(
    conn: &Connection,
    decision_id: &DecisionId,
    item_id: &ItemId,
) -> Result<Option<Selection>, SqliteStoreError> {
    let row = conn
        .prepare_cached(
            "SELECT selection_id, item_id, snapshot_json, snapshot_hash, hash_algorithm, \
             created_at
             FROM selections WHERE decision_id = ?1 AND item_id = ?2",
        )
        .and_then(|mut stmt| {
            stmt.query_row(params![decision_id.as_str(), item_id.as_str()], map_selection_row)
                .optional()
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    row.map(|row| decode_selection(decision_id, row)).transpose()
}

/// Loads and verifies every selection of a decision, oldest first.
pub(crate) fn fetch_selections(
    conn: &Connection,
    decision_id: &DecisionId,
) -> Result<Vec<Selection>, SqliteStoreError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT selection_id, item_id, snapshot_json, snapshot_hash, hash_algorithm, \
             created_at
             FROM selections WHERE decision_id = ?1
             ORDER BY created_at, item_id",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![decision_id.as_str()], map_selection_row)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut selections = Vec::new();
    for row in rows {
        let row = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        selections.push(decode_selection(decision_id, row)?);
    }
    Ok(selections)
}
