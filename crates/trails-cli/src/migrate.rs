use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;
use trails_db::{MigrationStatus, Migrator, SqliteStore, hoa_migrations};

#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Apply every pending migration
    Up,

    /// Revert the most recently applied migrations
    Down {
        /// How many migrations to revert
        #[arg(default_value_t = 1)]
        count: usize,
    },

    /// Show declared migrations and whether they are applied
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cmd: MigrateCommand, db_path: &Path) -> Result<()> {
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let migrator = Migrator::new(hoa_migrations())?;

    match cmd {
        MigrateCommand::Up => {
            let applied = migrator.apply_all(&store).context("migrate up failed")?;
            if applied.is_empty() {
                println!("Database is up to date.");
            }
            for record in applied {
                println!("Applied {}_{}", record.version, record.name);
            }
        }
        MigrateCommand::Down { count } => {
            let reverted = migrator
                .revert_last(&store, count)
                .context("migrate down failed")?;
            if reverted.is_empty() {
                println!("Nothing to revert.");
            }
            for record in reverted {
                println!("Reverted {}_{}", record.version, record.name);
            }
        }
        MigrateCommand::Status { json } => {
            let status = migrator.status(&store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status_json(&status))?);
            } else {
                for line in status_lines(&status) {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

fn status_lines(status: &[MigrationStatus]) -> Vec<String> {
    status
        .iter()
        .map(|s| {
            let state = match (&s.applied_at, s.undeclared) {
                (_, true) => "applied, not declared".to_string(),
                (Some(at), false) => format!("applied {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                (None, false) => "pending".to_string(),
            };
            format!("{:>10}  {:<24} {state}", s.version, s.name)
        })
        .collect()
}

fn status_json(status: &[MigrationStatus]) -> serde_json::Value {
    status
        .iter()
        .map(|s| {
            json!({
                "version": s.version,
                "name": s.name,
                "applied_at": s.applied_at.map(|at| at.to_rfc3339()),
                "declared": !s.undeclared,
            })
        })
        .collect()
}
