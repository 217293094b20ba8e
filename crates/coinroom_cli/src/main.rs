//! Coinroom command-line entry point.
//!
//! # Responsibility
//! - Bootstrap logging, configuration and the ledger database.
//! - Run the one-shot legacy importer, or dispatch one JSON call and print
//!   the response.
//!
//! # Invariants
//! - Logging is initialized before anything else can log.
//! - `call` exits non-zero when the response status is not 2xx.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coinroom_api::EconomyApi;
use coinroom_core::{
    default_log_level, import_legacy_dir, init_logging, init_stderr_logging, AccountMutator,
    EconomyConfig, SqliteLedgerStore,
};
use log::info;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

/// Coinroom virtual economy ledger.
#[derive(Parser)]
#[command(name = "coinroom", version, about, long_about = None)]
struct Cli {
    /// Economy configuration file (TOML); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite ledger database file
    #[arg(long, global = true, env = "COINROOM_DB", default_value = "coinroom.db")]
    db: PathBuf,

    /// Absolute directory for rotated log files; logs go to stderr when omitted
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "COINROOM_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the legacy JSON data set from a directory
    Import {
        /// Directory holding user_data.json, saving.json, ...
        dir: PathBuf,
    },
    /// Dispatch one API call and print the JSON response
    Call {
        /// HTTP method, e.g. GET or POST
        method: String,
        /// Route path, optionally with a query string
        path: String,
        /// JSON request body
        body: Option<String>,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    match cli.log_dir.as_deref() {
        Some(dir) => init_logging(level, dir),
        None => init_stderr_logging(level),
    }
    .map_err(anyhow::Error::msg)
    .context("failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => EconomyConfig::load(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => EconomyConfig::default(),
    };
    let store = SqliteLedgerStore::open_with_timeout(&cli.db, config.busy_timeout())
        .with_context(|| format!("failed to open ledger `{}`", cli.db.display()))?
        .with_limits(config.ledger_limits());
    info!(
        "event=cli_start module=cli status=ok db={}",
        cli.db.display()
    );

    match cli.command {
        Commands::Import { dir } => {
            let report = import_legacy_dir(&store, &dir)
                .with_context(|| format!("legacy import from `{}` failed", dir.display()))?;
            let summary = json!({
                "imported": report.imported(),
                "accounts": report.accounts,
                "rooms": report.rooms,
                "attendance": report.attendance,
                "mining": report.mining,
                "deposits": report.deposits,
                "stocks": report.stocks,
                "skipped": report.skipped,
                "rejected": report.rejected,
                "missingFiles": report.missing_files,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Call { method, path, body } => {
            let body = match body {
                Some(text) => serde_json::from_str::<Value>(&text)
                    .context("request body is not valid JSON")?,
                None => Value::Null,
            };
            let api = EconomyApi::new(AccountMutator::new(store, config));
            let (status, payload) = api.dispatch(&method, &path, &body);
            println!("{}", serde_json::to_string_pretty(&payload)?);
            if (200..300).contains(&status) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn call_parses_positional_body() {
        let cli = Cli::parse_from([
            "coinroom",
            "--db",
            "/tmp/ledger.db",
            "call",
            "POST",
            "/api/mine",
            r#"{"id":"a"}"#,
        ]);
        assert_eq!(cli.db.to_str(), Some("/tmp/ledger.db"));
        match cli.command {
            Commands::Call { method, path, body } => {
                assert_eq!(method, "POST");
                assert_eq!(path, "/api/mine");
                assert_eq!(body.as_deref(), Some(r#"{"id":"a"}"#));
            }
            Commands::Import { .. } => panic!("expected call"),
        }
    }
}
