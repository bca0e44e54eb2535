// crates/tally-gate-cli/src/main.rs
// ============================================================================
// Module: Tally Gate CLI Entry Point
// Description: Command dispatcher for the local Tally Gate store.
// Purpose: Manage groups, decisions, and items, submit votes, and read selections.
// Dependencies: clap, serde, tally-gate-config, tally-gate-core,
//               tally-gate-store-sqlite, time, tracing-subscriber.
// ============================================================================

//! ## Overview
//! The Tally Gate CLI drives a local `SQLite` store. Every command prints a
//! single JSON document on stdout; logs and errors go to stderr. Identifiers,
//! ratings, weights, and rules are validated at argument parsing so invalid
//! input never reaches the store.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tally_gate_config::LoggingConfig;
use tally_gate_config::TallyGateConfig;
use tally_gate_core::DecisionId;
use tally_gate_core::EvaluationOutcome;
use tally_gate_core::GroupId;
use tally_gate_core::ItemId;
use tally_gate_core::MembershipStatus;
use tally_gate_core::Rating;
use tally_gate_core::RuleSpec;
use tally_gate_core::Selection;
use tally_gate_core::SelectionOutcome;
use tally_gate_core::SelectionSnapshot;
use tally_gate_core::Timestamp;
use tally_gate_core::Vote;
use tally_gate_core::VoteSubmission;
use tally_gate_core::VoteWeight;
use tally_gate_core::VoteWrite;
use tally_gate_core::VoterId;
use tally_gate_store_sqlite::SqliteTallyStore;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tally-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to tally-gate.toml or `TALLY_GATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Store-backed commands.
    #[command(flatten)]
    Store(StoreCommand),
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate,
}

/// Commands that operate on the `SQLite` store.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Create the database and schema if missing.
    Init,
    /// Group management.
    Group {
        /// Selected group subcommand.
        #[command(subcommand)]
        command: GroupCommand,
    },
    /// Group membership management.
    Member {
        /// Selected member subcommand.
        #[command(subcommand)]
        command: MemberCommand,
    },
    /// Decision management.
    Decision {
        /// Selected decision subcommand.
        #[command(subcommand)]
        command: DecisionCommand,
    },
    /// Item management.
    Item {
        /// Selected item subcommand.
        #[command(subcommand)]
        command: ItemCommand,
    },
    /// Vote submission and removal.
    Vote {
        /// Selected vote subcommand.
        #[command(subcommand)]
        command: VoteCommand,
    },
    /// Selection reads.
    Selection {
        /// Selected selection subcommand.
        #[command(subcommand)]
        command: SelectionCommand,
    },
    /// Show the vote tally of an item.
    Tally(TallyCommand),
}

/// Group subcommands.
#[derive(Subcommand, Debug)]
enum GroupCommand {
    /// Create a group.
    Create {
        /// Group identifier.
        #[arg(long, value_parser = GroupId::parse)]
        group: GroupId,
    },
}

/// Member subcommands.
#[derive(Subcommand, Debug)]
enum MemberCommand {
    /// Create or update a membership.
    Set {
        /// Group identifier.
        #[arg(long, value_parser = GroupId::parse)]
        group: GroupId,
        /// User identifier.
        #[arg(long, value_parser = VoterId::parse)]
        user: VoterId,
        /// Membership status.
        #[arg(long, value_parser = parse_status, default_value = "confirmed")]
        status: MembershipStatus,
    },
    /// Remove a membership.
    Remove {
        /// Group identifier.
        #[arg(long, value_parser = GroupId::parse)]
        group: GroupId,
        /// User identifier.
        #[arg(long, value_parser = VoterId::parse)]
        user: VoterId,
    },
}

/// Decision subcommands.
#[derive(Subcommand, Debug)]
enum DecisionCommand {
    /// Create a decision owned by a group.
    Create {
        /// Decision identifier.
        #[arg(long, value_parser = DecisionId::parse)]
        decision: DecisionId,
        /// Owning group identifier.
        #[arg(long, value_parser = GroupId::parse)]
        group: GroupId,
        /// Rule JSON, e.g. `{"type":"threshold","value":0.66}`.
        #[arg(long, value_parser = RuleSpec::from_json_str)]
        rule: RuleSpec,
    },
    /// Replace the rule of a decision.
    SetRule {
        /// Decision identifier.
        #[arg(long, value_parser = DecisionId::parse)]
        decision: DecisionId,
        /// Rule JSON.
        #[arg(long, value_parser = RuleSpec::from_json_str)]
        rule: RuleSpec,
    },
    /// Share a decision with another group.
    Share {
        /// Decision identifier.
        #[arg(long, value_parser = DecisionId::parse)]
        decision: DecisionId,
        /// Group to share with.
        #[arg(long, value_parser = GroupId::parse)]
        group: GroupId,
    },
}

/// Item subcommands.
#[derive(Subcommand, Debug)]
enum ItemCommand {
    /// Create an item within a decision.
    Create {
        /// Item identifier.
        #[arg(long, value_parser = ItemId::parse)]
        item: ItemId,
        /// Decision identifier.
        #[arg(long, value_parser = DecisionId::parse)]
        decision: DecisionId,
    },
}

/// Vote subcommands.
#[derive(Subcommand, Debug)]
enum VoteCommand {
    /// Create or update a vote and evaluate its item.
    Submit(VoteSubmitCommand),
    /// Delete a vote. Existing selections are kept.
    Delete {
        /// Item identifier.
        #[arg(long, value_parser = ItemId::parse)]
        item: ItemId,
        /// Voter identifier.
        #[arg(long, value_parser = VoterId::parse)]
        voter: VoterId,
    },
}

/// Arguments for vote submission.
#[derive(Args, Debug)]
struct VoteSubmitCommand {
    /// Item identifier.
    #[arg(long, value_parser = ItemId::parse)]
    item: ItemId,
    /// Voter identifier.
    #[arg(long, value_parser = VoterId::parse)]
    voter: VoterId,
    /// Like flag (`true` or `false`).
    #[arg(long, conflicts_with = "clear_like")]
    like: Option<bool>,
    /// Star rating (1-5).
    #[arg(long, value_parser = parse_rating, conflicts_with = "clear_rating")]
    rating: Option<Rating>,
    /// Clear the stored like flag.
    #[arg(long)]
    clear_like: bool,
    /// Clear the stored rating.
    #[arg(long)]
    clear_rating: bool,
    /// Vote weight (decimal).
    #[arg(long, value_parser = VoteWeight::parse)]
    weight: Option<VoteWeight>,
}

impl VoteSubmitCommand {
    /// Builds the vote write described by the flags.
    fn to_write(&self) -> VoteWrite {
        let mut write = VoteWrite::new(self.item.clone(), self.voter.clone());
        if let Some(is_like) = self.like {
            write = write.like(is_like);
        }
        if let Some(rating) = self.rating {
            write = write.rating(rating);
        }
        if self.clear_like {
            write = write.clear_like();
        }
        if self.clear_rating {
            write = write.clear_rating();
        }
        if let Some(weight) = &self.weight {
            write = write.weight(weight.clone());
        }
        write
    }
}

/// Selection subcommands.
#[derive(Subcommand, Debug)]
enum SelectionCommand {
    /// Show the selection of an item, if any.
    Get {
        /// Decision identifier.
        #[arg(long, value_parser = DecisionId::parse)]
        decision: DecisionId,
        /// Item identifier.
        #[arg(long, value_parser = ItemId::parse)]
        item: ItemId,
    },
    /// List every selection of a decision, oldest first.
    List {
        /// Decision identifier.
        #[arg(long, value_parser = DecisionId::parse)]
        decision: DecisionId,
    },
}

/// Arguments for the tally command.
#[derive(Args, Debug)]
struct TallyCommand {
    /// Item identifier.
    #[arg(long, value_parser = ItemId::parse)]
    item: ItemId,
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// JSON view of a vote.
#[derive(Debug, Serialize)]
struct VoteView {
    /// Stable vote identifier.
    vote_id: u64,
    /// Item voted on.
    item_id: String,
    /// Voter.
    voter_id: String,
    /// Like flag, if set.
    is_like: Option<bool>,
    /// Rating, if set.
    rating: Option<u8>,
    /// Weight as a decimal string.
    weight: String,
    /// Creation time (RFC 3339).
    created_at: String,
    /// Last update time (RFC 3339).
    updated_at: String,
}

impl VoteView {
    /// Builds the view of a stored vote.
    fn from_vote(vote: &Vote) -> CliResult<Self> {
        Ok(Self {
            vote_id: vote.id.get(),
            item_id: vote.item_id.to_string(),
            voter_id: vote.voter_id.to_string(),
            is_like: vote.is_like,
            rating: vote.rating.map(Rating::get),
            weight: vote.weight.to_string(),
            created_at: format_timestamp(vote.created_at)?,
            updated_at: format_timestamp(vote.updated_at)?,
        })
    }
}

/// JSON view of a selection.
#[derive(Debug, Serialize)]
struct SelectionView<'a> {
    /// Selection identifier.
    selection_id: &'a str,
    /// Decision identifier.
    decision_id: &'a str,
    /// Selected item.
    item_id: &'a str,
    /// Creation time (RFC 3339).
    created_at: String,
    /// Frozen evaluation snapshot.
    snapshot: &'a SelectionSnapshot,
}

impl<'a> SelectionView<'a> {
    /// Builds the view of a selection.
    fn from_selection(selection: &'a Selection) -> CliResult<Self> {
        Ok(Self {
            selection_id: selection.id.as_str(),
            decision_id: selection.decision_id.as_str(),
            item_id: selection.item_id.as_str(),
            created_at: format_timestamp(selection.created_at)?,
            snapshot: &selection.snapshot,
        })
    }
}

/// JSON view of an evaluation outcome.
#[derive(Debug, Serialize)]
struct EvaluationView<'a> {
    /// Decision the item belongs to.
    decision_id: &'a str,
    /// Owning group of the decision.
    owning_group_id: &'a str,
    /// Approving votes.
    approvals: u32,
    /// All votes.
    total_votes: u32,
    /// Confirmed members of the owning group.
    confirmed_members: u32,
    /// Rule satisfied at evaluation time.
    satisfied: bool,
    /// Materializer outcome label.
    outcome: &'static str,
    /// Selection created by this evaluation.
    selection: Option<SelectionView<'a>>,
}

impl<'a> EvaluationView<'a> {
    /// Builds the view of an evaluation outcome.
    fn from_outcome(outcome: &'a EvaluationOutcome) -> CliResult<Self> {
        let selection = match &outcome.selection {
            SelectionOutcome::Created(selection) => Some(SelectionView::from_selection(selection)?),
            SelectionOutcome::NotSatisfied | SelectionOutcome::AlreadySelected => None,
        };
        Ok(Self {
            decision_id: outcome.binding.decision_id.as_str(),
            owning_group_id: outcome.binding.owning_group_id.as_str(),
            approvals: outcome.tally.approvals,
            total_votes: outcome.tally.total,
            confirmed_members: outcome.confirmed_members,
            satisfied: outcome.satisfied,
            outcome: outcome.selection.label(),
            selection,
        })
    }
}

/// JSON view of a vote submission.
#[derive(Debug, Serialize)]
struct SubmissionView<'a> {
    /// Stored vote.
    vote: VoteView,
    /// Evaluation triggered by the write.
    evaluation: EvaluationView<'a>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = TallyGateConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    init_tracing(&config.logging)?;

    let output = match cli.command {
        Commands::Config {
            command: ConfigCommand::Validate,
        } => config_summary(&config),
        Commands::Store(command) => {
            let store = open_store(&config)?;
            execute(command, &store)?
        }
    };
    write_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Installs the stderr subscriber; `RUST_LOG` overrides the configured filter.
fn init_tracing(logging: &LoggingConfig) -> CliResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(logging.filter.trim())
            .map_err(|err| CliError::new(format!("invalid logging.filter: {err}")))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(logging.ansi)
        .with_target(false)
        .try_init()
        .map_err(|err| CliError::new(format!("failed to install logger: {err}")))
}

/// Opens the configured `SQLite` store.
fn open_store(config: &TallyGateConfig) -> CliResult<SqliteTallyStore> {
    SqliteTallyStore::new(&config.store.to_store_config())
        .map_err(|err| CliError::new(format!("failed to open store: {err}")))
}

/// Summarizes a validated configuration.
fn config_summary(config: &TallyGateConfig) -> Value {
    json!({
        "status": "ok",
        "store": {
            "path": config.store.path.display().to_string(),
            "busy_timeout_ms": config.store.busy_timeout_ms,
            "journal_mode": config.store.journal_mode.pragma_value(),
            "sync_mode": config.store.sync_mode.pragma_value(),
        },
        "logging": {
            "filter": config.logging.filter,
            "ansi": config.logging.ansi,
        },
    })
}

// ============================================================================
// SECTION: Store Commands
// ============================================================================

/// Executes a store-backed command and returns its JSON output.
fn execute(command: StoreCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    debug!(command = command_name(&command), "executing command");
    match command {
        StoreCommand::Init => Ok(json!({"status": "initialized"})),
        StoreCommand::Group {
            command,
        } => command_group(command, store),
        StoreCommand::Member {
            command,
        } => command_member(command, store),
        StoreCommand::Decision {
            command,
        } => command_decision(command, store),
        StoreCommand::Item {
            command,
        } => command_item(command, store),
        StoreCommand::Vote {
            command,
        } => command_vote(command, store),
        StoreCommand::Selection {
            command,
        } => command_selection(command, store),
        StoreCommand::Tally(command) => {
            let tally = store.tally(&command.item).map_err(store_error)?;
            Ok(json!({
                "item_id": command.item.as_str(),
                "approvals": tally.approvals,
                "total_votes": tally.total,
            }))
        }
    }
}

/// Executes group subcommands.
fn command_group(command: GroupCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    match command {
        GroupCommand::Create {
            group,
        } => {
            store.create_group(&group).map_err(store_error)?;
            Ok(json!({"group_id": group.as_str()}))
        }
    }
}

/// Executes member subcommands.
fn command_member(command: MemberCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    match command {
        MemberCommand::Set {
            group,
            user,
            status,
        } => {
            store.set_membership(&group, &user, status).map_err(store_error)?;
            Ok(json!({
                "group_id": group.as_str(),
                "user_id": user.as_str(),
                "status": status.as_str(),
            }))
        }
        MemberCommand::Remove {
            group,
            user,
        } => {
            let removed = store.remove_membership(&group, &user).map_err(store_error)?;
            Ok(json!({
                "group_id": group.as_str(),
                "user_id": user.as_str(),
                "removed": removed,
            }))
        }
    }
}

/// Executes decision subcommands.
fn command_decision(command: DecisionCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    match command {
        DecisionCommand::Create {
            decision,
            group,
            rule,
        } => {
            store.create_decision(&decision, &group, &rule).map_err(store_error)?;
            Ok(json!({
                "decision_id": decision.as_str(),
                "owning_group_id": group.as_str(),
                "rule": rule.to_json(),
            }))
        }
        DecisionCommand::SetRule {
            decision,
            rule,
        } => {
            store.update_rule(&decision, &rule).map_err(store_error)?;
            Ok(json!({
                "decision_id": decision.as_str(),
                "rule": rule.to_json(),
            }))
        }
        DecisionCommand::Share {
            decision,
            group,
        } => {
            store.share_decision(&decision, &group).map_err(store_error)?;
            let shared = store.shared_groups(&decision).map_err(store_error)?;
            let shared: Vec<&str> = shared.iter().map(GroupId::as_str).collect();
            Ok(json!({
                "decision_id": decision.as_str(),
                "shared_with": shared,
            }))
        }
    }
}

/// Executes item subcommands.
fn command_item(command: ItemCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    match command {
        ItemCommand::Create {
            item,
            decision,
        } => {
            store.create_item(&item, &decision).map_err(store_error)?;
            Ok(json!({
                "item_id": item.as_str(),
                "decision_id": decision.as_str(),
            }))
        }
    }
}

/// Executes vote subcommands.
fn command_vote(command: VoteCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    match command {
        VoteCommand::Submit(command) => {
            let submission = store.submit_vote(&command.to_write()).map_err(store_error)?;
            submission_json(&submission)
        }
        VoteCommand::Delete {
            item,
            voter,
        } => {
            let removed = store.delete_vote(&item, &voter).map_err(store_error)?;
            Ok(json!({
                "item_id": item.as_str(),
                "voter_id": voter.as_str(),
                "removed": removed,
            }))
        }
    }
}

/// Executes selection subcommands.
fn command_selection(command: SelectionCommand, store: &SqliteTallyStore) -> CliResult<Value> {
    match command {
        SelectionCommand::Get {
            decision,
            item,
        } => {
            let selection = store.selection(&decision, &item).map_err(store_error)?;
            match selection {
                Some(selection) => to_json(&SelectionView::from_selection(&selection)?),
                None => Ok(Value::Null),
            }
        }
        SelectionCommand::List {
            decision,
        } => {
            let selections = store.list_selections(&decision).map_err(store_error)?;
            let views = selections
                .iter()
                .map(SelectionView::from_selection)
                .collect::<CliResult<Vec<_>>>()?;
            to_json(&views)
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns a stable name for a store command.
const fn command_name(command: &StoreCommand) -> &'static str {
    match command {
        StoreCommand::Init => "init",
        StoreCommand::Group {
            ..
        } => "group",
        StoreCommand::Member {
            ..
        } => "member",
        StoreCommand::Decision {
            ..
        } => "decision",
        StoreCommand::Item {
            ..
        } => "item",
        StoreCommand::Vote {
            ..
        } => "vote",
        StoreCommand::Selection {
            ..
        } => "selection",
        StoreCommand::Tally(_) => "tally",
    }
}

/// Parses a 1-5 star rating argument.
fn parse_rating(raw: &str) -> Result<Rating, String> {
    let value: u8 = raw.trim().parse().map_err(|_| format!("rating must be an integer: {raw}"))?;
    Rating::new(value).map_err(|err| err.to_string())
}

/// Parses a membership status label.
fn parse_status(raw: &str) -> Result<MembershipStatus, String> {
    MembershipStatus::from_label(raw.trim())
        .ok_or_else(|| format!("unknown membership status: {raw}"))
}

/// Formats a timestamp as RFC 3339.
fn format_timestamp(timestamp: Timestamp) -> CliResult<String> {
    let nanos = i128::from(timestamp.as_unix_millis()) * 1_000_000;
    let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|err| CliError::new(format!("timestamp out of range: {err}")))?;
    datetime.format(&Rfc3339).map_err(|err| CliError::new(format!("timestamp format failed: {err}")))
}

/// Builds the JSON output of a vote submission.
fn submission_json(submission: &VoteSubmission) -> CliResult<Value> {
    to_json(&SubmissionView {
        vote: VoteView::from_vote(&submission.vote)?,
        evaluation: EvaluationView::from_outcome(&submission.evaluation)?,
    })
}

/// Serializes an output view.
fn to_json<T: Serialize>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value).map_err(|err| CliError::new(format!("failed to encode output: {err}")))
}

/// Maps store errors to CLI errors.
fn store_error(error: impl std::fmt::Display) -> CliError {
    CliError::new(format!("store error: {error}"))
}

/// Writes a JSON document to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    write_stdout_line(&rendered).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
