//! `rmsync` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments into `SyncOptions` and database paths.
//! - Open both databases, run one synchronization, print the summary.
//! - Exit `0` on success and `1` on any connection or sync failure.

use clap::Parser;
use log::info;
use rmsync_core::{
    default_log_level, init_logging, open_genealogy_db, open_tag_db, LegacyRepair,
    SqliteGenealogySource, SqliteTagStore, SyncError, SyncOptions, SyncReport, SyncService,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug)]
struct CliError {
    code: &'static str,
    message: String,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<SyncError> for CliError {
    fn from(value: SyncError) -> Self {
        let code = match &value {
            SyncError::InvalidOptions(_) => "invalid_options",
            SyncError::Connection(_) => "connection_error",
            SyncError::SourceQuery(_) => "source_query_error",
            SyncError::StoreQuery(_) => "store_query_error",
            SyncError::Transaction(_) => "transaction_error",
        };
        Self::new(code, value.to_string())
    }
}

#[derive(Parser, Debug)]
#[command(name = "rmsync")]
#[command(about = "Mirror RootsMagic people into digiKam person tags")]
#[command(version)]
struct Cli {
    /// RootsMagic database (opened read-only).
    #[arg(short = 'r', long = "rootsmagic")]
    rootsmagic: PathBuf,
    /// digiKam database holding the tag tree.
    #[arg(short = 'd', long = "digikam")]
    digikam: PathBuf,
    /// Root-level tag mirroring the family tree.
    #[arg(short = 'p', long = "parent-tag", default_value = rmsync_core::config::DEFAULT_PRIMARY_BRANCH)]
    parent_tag: String,
    /// Root-level tag receiving people no longer in the tree.
    #[arg(short = 'l', long = "lost-found", default_value = rmsync_core::config::DEFAULT_CATCH_ALL_BRANCH)]
    lost_found: String,
    /// When to repair tags written by older versions: auto|always|never.
    #[arg(long, default_value = "auto")]
    legacy_repair: LegacyRepair,
    /// trace|debug|info|warn|error; defaults by build profile.
    #[arg(long)]
    log_level: Option<String>,
    /// Directory for rolling log files; no file logging when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_output = cli.json;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_output {
                let payload = json!({
                    "error": {
                        "code": err.code,
                        "message": err.message,
                    }
                });
                eprintln!("{payload}");
            } else {
                eprintln!("rmsync: {} ({})", err.message, err.code);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        let log_dir = absolute_dir(log_dir)?;
        init_logging(level, &log_dir.to_string_lossy())
            .map_err(|message| CliError::new("logging_error", message))?;
    }

    let options = SyncOptions {
        primary_branch: cli.parent_tag,
        catch_all_branch: cli.lost_found,
        legacy_repair: cli.legacy_repair,
    };

    let genealogy_conn = open_genealogy_db(&cli.rootsmagic).map_err(SyncError::from)?;
    let tag_conn = open_tag_db(&cli.digikam).map_err(SyncError::from)?;
    let source = SqliteGenealogySource::try_new(&genealogy_conn).map_err(SyncError::from)?;
    let store = SqliteTagStore::try_new(&tag_conn).map_err(SyncError::from)?;

    let service = SyncService::new(source, store, options)?;
    let report = service.run()?;
    info!(
        "event=cli_sync module=cli status=ok run_id={}",
        report.run_id
    );

    if cli.json {
        let payload = serde_json::to_string_pretty(&report)
            .map_err(|err| CliError::new("json_error", err.to_string()))?;
        println!("{payload}");
    } else {
        print_summary(&report, service.options());
    }
    Ok(())
}

fn absolute_dir(path: &Path) -> Result<PathBuf, CliError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|err| CliError::new("cwd_error", err.to_string()))?;
    Ok(cwd.join(path))
}

fn print_summary(report: &SyncReport, options: &SyncOptions) {
    println!("Synchronization completed (run {}):", report.run_id);
    println!("  People loaded:              {}", report.people_loaded);
    println!("  Families loaded:            {}", report.families_loaded);
    println!("  Tags created:               {}", report.created);
    println!("  Tags updated:               {}", report.updated);
    println!("  Tags rescued:               {}", report.rescued);
    println!(
        "  Tags moved to {:<13} {}",
        format!("{}:", options.catch_all_branch),
        report.orphaned
    );
    println!("  Duplicates removed:         {}", report.duplicates_removed);
    println!("  Family groups created:      {}", report.family_groups_created);
    if report.legacy_bound > 0 || report.legacy_renamed > 0 {
        println!("  Legacy tags bound:          {}", report.legacy_bound);
        println!("  Legacy tags renamed:        {}", report.legacy_renamed);
    }
    println!(
        "  Tags under {}: {}",
        options.primary_branch, report.primary_branch_size
    );
    println!(
        "  Tags under {}: {}",
        options.catch_all_branch, report.catch_all_branch_size
    );
    if !report.failed.is_empty() {
        println!("  Failures:                   {}", report.failed.len());
        for failure in &report.failed {
            println!(
                "    OwnerID {}: {} ({})",
                failure.owner_id, failure.label, failure.reason
            );
        }
    }
}
