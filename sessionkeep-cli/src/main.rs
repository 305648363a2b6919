//! SessionKeep CLI - operator interface to the session database
//!
//! Runs the store against the configured SQLite database only. Client media
//! belong to the browser runtime and are never probed from here.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use sessionkeep_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success,
    SessionKeepConfig,
};
use sessionkeep_store::{
    BackendProbe, SessionScope, SessionStore, StoreResult, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "sessionkeep")]
#[command(about = "Inspect, issue and expire persisted login sessions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database url, overrides `database.url`
    #[arg(short, long)]
    database: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Issue a new session for a subject
    Login {
        subject: String,

        /// Display name, usually the email address
        #[arg(short, long, default_value = "")]
        name: String,

        #[arg(short, long, default_value = "Admin")]
        role: String,
    },

    /// Show the active session of a subject
    Status {
        subject: String,

        /// Also list every stored row for the subject
        #[arg(long)]
        rows: bool,
    },

    /// Remove every session of a subject
    Logout { subject: String },

    /// Delete expired sessions from the database
    Sweep,

    /// List the backends this runtime can use
    Backends,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);

    if let Commands::InitConfig { force } = &cli.command {
        let path = config_path.context("No configuration directory available, pass --config")?;
        return init_config(&path, *force);
    }

    let mut config = load_config(config_path.as_deref(), cli.config.is_some())?;
    if let Some(url) = cli.database {
        config.database.url = Some(url);
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    info!("Starting sessionkeep v{}", env!("CARGO_PKG_VERSION"));

    let store = SessionStore::from_config(&config, BackendProbe::new(), Arc::new(SystemClock))
        .await
        .context("Failed to open the session store")?;

    match cli.command {
        Commands::InitConfig { .. } => Ok(()),
        Commands::Login {
            subject,
            name,
            role,
        } => handle_login(&store, &subject, &name, &role).await,
        Commands::Status { subject, rows } => handle_status(&store, &subject, rows).await,
        Commands::Logout { subject } => handle_logout(&store, &subject).await,
        Commands::Sweep => handle_sweep(&store).await,
        Commands::Backends => handle_backends(&store),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sessionkeep").join("config.toml"))
}

/// An explicit `--config` must exist; a missing default file means defaults.
fn load_config(path: Option<&Path>, explicit: bool) -> anyhow::Result<SessionKeepConfig> {
    match path {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Loading configuration");
            SessionKeepConfig::from_file(path)
                .with_context(|| format!("Invalid configuration in {}", path.display()))
        }
        Some(path) if explicit => Err(config_error!(
            format!("{} does not exist", path.display()),
            "cli"
        )
        .into()),
        _ => Ok(SessionKeepConfig::default()),
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, use --force to overwrite", path.display());
    }
    SessionKeepConfig::default().save_to_file(path)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

async fn handle_login(
    store: &SessionStore,
    subject: &str,
    name: &str,
    role: &str,
) -> anyhow::Result<()> {
    require_database(store)?;
    log_operation_start!("login", subject = subject);

    let mut scope = SessionScope::new();
    let saved = store.save(&mut scope, subject, name, role).await?;
    if saved.result.outcome("database").is_some_and(|o| !o.is_success()) {
        let error = anyhow::anyhow!("{}", describe(&saved.result));
        log_operation_error!("login", error, subject = subject);
        return Err(error);
    }

    log_operation_success!("login", subject = subject);
    print_json(&json!({
        "session": saved.record,
        "backends": outcomes_json(&saved.result),
    }))
}

async fn handle_status(store: &SessionStore, subject: &str, rows: bool) -> anyhow::Result<()> {
    let mut scope = SessionScope::new();
    scope.seed_subject(subject);
    let report = store.load_with_report(&mut scope).await;

    let mut output = json!({
        "subject": subject,
        "signed_in": report.record.is_some(),
        "source": report.source,
        "session": report.record,
        "faults": report
            .faults
            .iter()
            .map(|f| json!({ "backend": f.backend, "error": f.error().map(|e| e.to_string()) }))
            .collect::<Vec<_>>(),
    });

    if rows {
        if let Some(database) = store.registry().database() {
            let stored: Vec<_> = database
                .list_rows()
                .await?
                .into_iter()
                .filter(|row| row.subject_id == subject)
                .map(|row| {
                    json!({
                        "session_id": row.session_id,
                        "created_at": row.created_at,
                        "expires_at": row.expires_at,
                        "last_accessed": row.last_accessed,
                    })
                })
                .collect();
            output["rows"] = json!(stored);
        }
    }

    print_json(&output)
}

async fn handle_logout(store: &SessionStore, subject: &str) -> anyhow::Result<()> {
    require_database(store)?;
    let result = store.clear(&mut SessionScope::new(), subject).await;
    print_json(&json!({
        "subject": subject,
        "backends": outcomes_json(&result),
    }))
}

async fn handle_sweep(store: &SessionStore) -> anyhow::Result<()> {
    require_database(store)?;
    let deleted = store.sweep_expired().await?;
    print_json(&json!({ "deleted": deleted }))
}

fn handle_backends(store: &SessionStore) -> anyhow::Result<()> {
    print_json(&json!(store.registry().probed()))
}

fn require_database(store: &SessionStore) -> anyhow::Result<()> {
    if store.registry().database().is_none() {
        bail!("No session database available, set database.url or pass --database");
    }
    Ok(())
}

fn outcomes_json(result: &StoreResult) -> serde_json::Value {
    json!(result
        .outcomes
        .iter()
        .map(|outcome| json!({
            "backend": outcome.backend,
            "capability": outcome.capability,
            "ok": outcome.is_success(),
            "error": outcome.error().map(|e| e.to_string()),
        }))
        .collect::<Vec<_>>())
}

fn describe(result: &StoreResult) -> String {
    result
        .failures()
        .map(|outcome| match outcome.error() {
            Some(error) => format!("{}: {}", outcome.backend, error),
            None => outcome.backend.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
