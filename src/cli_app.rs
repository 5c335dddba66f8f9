//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use thiserror::Error;

use disk_tree::core::config::Config;
use disk_tree::core::errors::DtrError;
use disk_tree::core::logging;
use disk_tree::model::wire::{ImportRequest, ItemsResponse};
use disk_tree::model::{NodeId, Timestamp};
use disk_tree::tree::TreeService;

/// dtr — file/folder forest with derived sizes, timestamps and history.
#[derive(Debug, Parser)]
#[command(
    name = "dtr",
    author,
    version,
    about = "Disk tree reconciliation engine",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override the tree database path.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Apply one import batch read from a JSON file (or `-` for stdin).
    Import(ImportArgs),
    /// Show a node with its children expanded.
    Get(NodeArgs),
    /// Delete a node, its subtree and their history.
    Delete(DeleteArgs),
    /// List files changed in the 24 hours up to a date.
    Updates(UpdatesArgs),
    /// Show a node's history within a date range.
    History(HistoryArgs),
    /// View and check configuration state.
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    /// Address to listen on (overrides `server.bind`).
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ImportArgs {
    /// Batch file, or `-` to read standard input.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct NodeArgs {
    #[arg(value_name = "ID")]
    id: String,
}

#[derive(Debug, Clone, Args)]
struct DeleteArgs {
    #[arg(value_name = "ID")]
    id: String,
    /// Stamp the former parent chain with this date and record its history.
    #[arg(long, value_name = "DATE")]
    date: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct UpdatesArgs {
    /// End of the window (inclusive), RFC 3339.
    #[arg(long, value_name = "DATE")]
    date: String,
}

#[derive(Debug, Clone, Args)]
struct HistoryArgs {
    #[arg(value_name = "ID")]
    id: String,
    /// Start of the range (inclusive), RFC 3339.
    #[arg(long, value_name = "DATE")]
    start: String,
    /// End of the range (inclusive), RFC 3339.
    #[arg(long, value_name = "DATE")]
    end: String,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<DtrError> for CliError {
    fn from(value: DtrError) -> Self {
        match value {
            DtrError::CycleDetected { .. } => Self::Internal(value.to_string()),
            DtrError::InvalidConfig { .. }
            | DtrError::MissingConfig { .. }
            | DtrError::ConfigParse { .. }
            | DtrError::NotFound { .. } => Self::User(value.to_string()),
            _ if value.is_input_error() => Self::User(value.to_string()),
            _ => Self::Runtime(value.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Config(args) => run_config(cli, args),
        Command::Serve(args) => run_serve(cli, args),
        Command::Import(args) => {
            let request = read_import(args)?;
            let report = open_service(cli)?.import(&request)?;
            write_json_line(&json!({
                "command": "import",
                "updateDate": request.update_date,
                "items": report.items,
                "created": report.created,
                "updated": report.updated,
                "unchanged": report.unchanged,
                "stamped": report.stamped,
                "resized": report.resized,
                "written": report.written,
                "history": report.history,
            }))
        }
        Command::Get(args) => {
            let id: NodeId = args.id.parse()?;
            let view = open_service(cli)?.get_node(id)?;
            write_json_line(&serde_json::to_value(view)?)
        }
        Command::Delete(args) => {
            let id: NodeId = args.id.parse()?;
            let date = args.date.as_deref().map(Timestamp::parse).transpose()?;
            let report = open_service(cli)?.delete(id, date)?;
            write_json_line(&json!({
                "command": "delete",
                "id": id,
                "removed": report.removed,
                "historyRemoved": report.history_removed,
                "resized": report.resized,
                "stamped": report.stamped,
                "historyRecorded": report.history_recorded,
            }))
        }
        Command::Updates(args) => {
            let date = Timestamp::parse(&args.date)?;
            let items = open_service(cli)?.recent_files(date)?;
            write_json_line(&serde_json::to_value(ItemsResponse { items })?)
        }
        Command::History(args) => {
            let id: NodeId = args.id.parse()?;
            let start = Timestamp::parse(&args.start)?;
            let end = Timestamp::parse(&args.end)?;
            let items = open_service(cli)?.history(id, start, end)?;
            write_json_line(&serde_json::to_value(ItemsResponse { items })?)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.store.path.clone_from(db);
    }
    logging::init(&config.logging);
    Ok(config)
}

fn open_service(cli: &Cli) -> Result<TreeService, CliError> {
    let config = load_config(cli)?;
    Ok(TreeService::from_config(&config)?)
}

fn read_import(args: &ImportArgs) -> Result<ImportRequest, CliError> {
    let raw = if args.input.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(&args.input).map_err(|e| {
            CliError::User(format!("cannot read {}: {e}", args.input.display()))
        })?
    };
    serde_json::from_str(&raw)
        .map_err(|e| CliError::from(DtrError::malformed(format!("import body: {e}"))))
}

#[cfg(feature = "server")]
fn run_serve(cli: &Cli, args: &ServeArgs) -> Result<(), CliError> {
    use std::sync::Arc;

    let mut config = load_config(cli)?;
    if let Some(bind) = &args.bind {
        config.server.bind.clone_from(bind);
    }
    let addr = config.server.socket_addr()?;
    let hash = config.stable_hash()?;
    tracing::info!(
        config = %config.config_file.display(),
        db = %config.store.path.display(),
        %hash,
        "starting dtr"
    );
    let service = Arc::new(TreeService::from_config(&config)?);
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Runtime(format!("tokio runtime: {e}")))?;
    runtime.block_on(disk_tree::server::serve(service, addr))?;
    Ok(())
}

#[cfg(not(feature = "server"))]
fn run_serve(_cli: &Cli, _args: &ServeArgs) -> Result<(), CliError> {
    Err(CliError::User(
        "this build has no HTTP server; rebuild with the `server` feature".to_string(),
    ))
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            write_json_line(&json!({
                "command": "config path",
                "path": path.to_string_lossy(),
                "exists": path.exists(),
            }))
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;
            write_json_line(&json!({
                "command": "config show",
                "source": config.config_file.to_string_lossy(),
                "config": serde_json::to_value(&config)?,
            }))
        }
        Some(ConfigCommand::Validate) => {
            let config = load_config(cli)?;
            write_json_line(&json!({
                "command": "config validate",
                "valid": true,
                "source": config.config_file.to_string_lossy(),
                "hash": config.stable_hash()?,
            }))
        }
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parser_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = Cli::try_parse_from(["dtr", "get", "abc", "--db", "/tmp/t.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/t.db")));
        assert!(matches!(cli.command, Command::Get(_)));
    }

    #[test]
    fn history_requires_both_bounds() {
        assert!(Cli::try_parse_from(["dtr", "history", "abc", "--start", "x"]).is_err());
    }

    #[test]
    fn exit_codes_follow_error_class() {
        let id = NodeId::random();
        assert_eq!(CliError::from(DtrError::NotFound { id }).exit_code(), 1);
        assert_eq!(CliError::from(DtrError::validation("x")).exit_code(), 1);
        assert_eq!(
            CliError::from(DtrError::Sql {
                context: "t",
                details: String::new()
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliError::from(DtrError::CycleDetected {
                details: String::new()
            })
            .exit_code(),
            3
        );
    }
}
