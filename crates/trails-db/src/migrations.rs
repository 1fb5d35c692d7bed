//! Migration system for tracking and applying schema changes.
//!
//! Each migration has a version, a name and an `up`/`down` pair of
//! operations. Migrations are applied in ascending version order, each in its
//! own transaction together with its `_migrations` ledger entry.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use trails_common::{Error, Result};

use crate::store::{MigrationLedger, SchemaStore, Store, Transaction};

pub type MigrationFn = fn(&mut dyn SchemaStore) -> Result<()>;

#[derive(Clone, Copy)]
pub struct Migration {
    /// Timestamp-based version; ordering key and ledger identity.
    pub version: u64,
    pub name: &'static str,
    pub up: MigrationFn,
    pub down: MigrationFn,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ledger entry for an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: u64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// State of one migration as reported by [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: u64,
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
    /// Present in the ledger but not in the declared list.
    pub undeclared: bool,
}

/// Applies and reverts an explicit, version-ordered list of migrations.
#[derive(Debug)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    /// Sort `migrations` by version. Two migrations sharing a version is a
    /// configuration error.
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(Error::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].name.to_string(),
                second: pair[1].name.to_string(),
            });
        }
        Ok(Self { migrations })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Declared migrations not yet in the ledger, ascending.
    pub fn pending<S: Store>(&self, store: &S) -> Result<Vec<&Migration>> {
        let applied: HashSet<u64> = store
            .applied_migrations()?
            .iter()
            .map(|r| r.version)
            .collect();
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect())
    }

    pub fn status<S: Store>(&self, store: &S) -> Result<Vec<MigrationStatus>> {
        let mut applied: BTreeMap<u64, MigrationRecord> = store
            .applied_migrations()?
            .into_iter()
            .map(|r| (r.version, r))
            .collect();

        let mut out: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name.to_string(),
                applied_at: applied.remove(&m.version).map(|r| r.applied_at),
                undeclared: false,
            })
            .collect();

        out.extend(applied.into_values().map(|r| MigrationStatus {
            version: r.version,
            name: r.name,
            applied_at: Some(r.applied_at),
            undeclared: true,
        }));
        out.sort_by_key(|s| s.version);
        Ok(out)
    }

    /// Apply every pending migration in ascending order, stopping at the first
    /// failure. Returns the ledger entries written by this call.
    pub fn apply_all<S: Store>(&self, store: &S) -> Result<Vec<MigrationRecord>> {
        let ledger = store.applied_migrations()?;
        let declared: HashSet<u64> = self.migrations.iter().map(|m| m.version).collect();
        for record in ledger.iter().filter(|r| !declared.contains(&r.version)) {
            warn!(
                "ledger contains undeclared migration {} ({})",
                record.version, record.name
            );
        }

        let applied: HashSet<u64> = ledger.iter().map(|r| r.version).collect();
        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect();

        if pending.is_empty() {
            info!("migrations up to date ({} applied)", applied.len());
            return Ok(Vec::new());
        }

        let mut done = Vec::with_capacity(pending.len());
        for migration in pending {
            let record = apply_one(store, migration).inspect_err(|e| {
                error!(
                    "migration {} ({}) failed, halting: {e}",
                    migration.version, migration.name
                );
            })?;
            done.push(record);
        }

        info!("applied {} migration(s)", done.len());
        Ok(done)
    }

    /// Revert the `n` most recently applied migrations, newest first.
    /// Returns the ledger entries removed by this call.
    pub fn revert_last<S: Store>(&self, store: &S, n: usize) -> Result<Vec<MigrationRecord>> {
        let mut ledger = store.applied_migrations()?;
        ledger.sort_by_key(|r| std::cmp::Reverse(r.version));
        ledger.truncate(n);

        if ledger.is_empty() {
            info!("no migrations to revert");
            return Ok(Vec::new());
        }

        let mut reverted = Vec::with_capacity(ledger.len());
        for record in ledger {
            let Some(migration) = self.migrations.iter().find(|m| m.version == record.version)
            else {
                error!(
                    "cannot revert {} ({}): migration is not declared",
                    record.version, record.name
                );
                return Err(Error::NotFound(format!(
                    "migration {} ({}) is applied but not declared",
                    record.version, record.name
                )));
            };

            revert_one(store, migration).inspect_err(|e| {
                error!(
                    "revert of {} ({}) failed, halting: {e}",
                    migration.version, migration.name
                );
            })?;
            reverted.push(record);
        }

        info!("reverted {} migration(s)", reverted.len());
        Ok(reverted)
    }
}

fn apply_one<S: Store>(store: &S, migration: &Migration) -> Result<MigrationRecord> {
    info!("applying migration {} ({})", migration.version, migration.name);
    let mut tx = store.begin()?;
    (migration.up)(&mut tx)?;

    let record = MigrationRecord {
        version: migration.version,
        name: migration.name.to_string(),
        applied_at: Utc::now(),
    };
    tx.record_applied(&record)?;
    tx.commit()?;
    Ok(record)
}

fn revert_one<S: Store>(store: &S, migration: &Migration) -> Result<()> {
    info!("reverting migration {} ({})", migration.version, migration.name);
    let mut tx = store.begin()?;
    (migration.down)(&mut tx)?;
    tx.remove_applied(migration.version)?;
    tx.commit()
}

/// Delete a collection if it exists. Used by `down` steps, which must be
/// safe against partially applied state.
pub fn drop_collection_if_exists(store: &mut dyn SchemaStore, name: &str) -> Result<()> {
    match store.delete_collection(name) {
        Err(e) if e.is_not_found() => {
            info!("collection `{name}` not present, nothing to drop");
            Ok(())
        }
        other => other,
    }
}
