//! In-memory [`Store`] used as a test double for the SQLite store.
//!
//! Transactions work on a copy of the whole state taken at `begin` and swap
//! it in on `commit`. Validation, unique indexes and store-wide index names
//! behave as in [`SqliteStore`](crate::SqliteStore).

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use trails_common::{Error, Result};

use crate::migrations::MigrationRecord;
use crate::record::{Record, RecordData, new_record_id};
use crate::schema::{CollectionDef, IndexDef};
use crate::store::{MigrationLedger, SchemaStore, Store, Transaction};

/// Everything the store holds. Cloned for every transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    collections: BTreeMap<String, CollectionDef>,
    records: BTreeMap<String, Vec<Record>>,
    ledger: BTreeMap<u64, MigrationRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_commits: AtomicBool,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with a database error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of successful transaction commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StoreState {
        self.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn contains_collection(&self, name: &str) -> bool {
        self.lock()
            .map(|s| s.collections.contains_key(name))
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| Error::Database("memory store lock poisoned".into()))
    }

    /// Run `op` against a copy of the state and keep the result only on success.
    fn autocommit<T>(&self, op: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let out = op(&mut working)?;
        *guard = working;
        Ok(out)
    }
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self) -> Result<MemoryTx<'_>> {
        let guard = self.lock()?;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            store: self,
        })
    }

    fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        Ok(self.lock()?.ledger.values().cloned().collect())
    }
}

impl SchemaStore for MemoryStore {
    fn collections(&self) -> Result<Vec<CollectionDef>> {
        Ok(self.lock()?.collections.values().cloned().collect())
    }

    fn find_collection(&self, name: &str) -> Result<Option<CollectionDef>> {
        Ok(self.lock()?.collections.get(name).cloned())
    }

    fn create_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        self.autocommit(|s| s.create_collection(collection))
    }

    fn update_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        self.autocommit(|s| s.update_collection(collection))
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        self.autocommit(|s| s.delete_collection(name))
    }

    fn insert_record(&mut self, collection: &str, data: RecordData) -> Result<Record> {
        self.autocommit(|s| s.insert_record(collection, data))
    }

    fn update_record(&mut self, collection: &str, id: &str, patch: RecordData) -> Result<Record> {
        self.autocommit(|s| s.update_record(collection, id, patch))
    }

    fn delete_record(&mut self, collection: &str, id: &str) -> Result<()> {
        self.autocommit(|s| s.delete_record(collection, id))
    }

    fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        self.lock()?.get_record(collection, id)
    }

    fn list_records(&self, collection: &str) -> Result<Vec<Record>> {
        self.lock()?.list_records(collection)
    }
}

pub struct MemoryTx<'a> {
    guard: MutexGuard<'a, StoreState>,
    working: StoreState,
    store: &'a MemoryStore,
}

impl Transaction for MemoryTx<'_> {
    fn commit(self) -> Result<()> {
        let MemoryTx {
            mut guard,
            working,
            store,
        } = self;
        if store.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Database("commit failed: store unavailable".into()));
        }
        *guard = working;
        store.commits.fetch_add(1, Ordering::SeqCst);
        debug!("memory transaction committed");
        Ok(())
    }
}

impl MigrationLedger for MemoryTx<'_> {
    fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        Ok(self.working.ledger.values().cloned().collect())
    }

    fn record_applied(&mut self, record: &MigrationRecord) -> Result<()> {
        if self.working.ledger.contains_key(&record.version) {
            return Err(Error::Constraint(format!(
                "migration {} is already recorded",
                record.version
            )));
        }
        self.working.ledger.insert(record.version, record.clone());
        Ok(())
    }

    fn remove_applied(&mut self, version: u64) -> Result<()> {
        self.working
            .ledger
            .remove(&version)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("ledger entry for migration {version}")))
    }
}

impl SchemaStore for MemoryTx<'_> {
    fn collections(&self) -> Result<Vec<CollectionDef>> {
        Ok(self.working.collections.values().cloned().collect())
    }

    fn find_collection(&self, name: &str) -> Result<Option<CollectionDef>> {
        Ok(self.working.collections.get(name).cloned())
    }

    fn create_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        self.working.create_collection(collection)
    }

    fn update_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        self.working.update_collection(collection)
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        self.working.delete_collection(name)
    }

    fn insert_record(&mut self, collection: &str, data: RecordData) -> Result<Record> {
        self.working.insert_record(collection, data)
    }

    fn update_record(&mut self, collection: &str, id: &str, patch: RecordData) -> Result<Record> {
        self.working.update_record(collection, id, patch)
    }

    fn delete_record(&mut self, collection: &str, id: &str) -> Result<()> {
        self.working.delete_record(collection, id)
    }

    fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        self.working.get_record(collection, id)
    }

    fn list_records(&self, collection: &str) -> Result<Vec<Record>> {
        self.working.list_records(collection)
    }
}

impl StoreState {
    fn collection(&self, name: &str) -> Result<&CollectionDef> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("collection `{name}`")))
    }

    fn create_collection(&mut self, def: &CollectionDef) -> Result<()> {
        if self.collections.contains_key(&def.name) {
            return Err(Error::Constraint(format!(
                "collection `{}` already exists",
                def.name
            )));
        }
        self.store_definition(def)
    }

    fn update_collection(&mut self, def: &CollectionDef) -> Result<()> {
        self.collection(&def.name)?;
        self.store_definition(def)
    }

    /// Validate `def`, reshape existing records to it and store it.
    fn store_definition(&mut self, def: &CollectionDef) -> Result<()> {
        def.validate()?;

        for (other_name, other) in &self.collections {
            if other_name == &def.name {
                continue;
            }
            if let Some(clash) = def
                .indexes
                .iter()
                .find(|i| other.indexes.iter().any(|o| o.name == i.name))
            {
                return Err(Error::Database(format!(
                    "index `{}` already exists on `{other_name}`",
                    clash.name
                )));
            }
        }

        let mut records = self.records.get(&def.name).cloned().unwrap_or_default();
        if let Some(old) = self.collections.get(&def.name) {
            for record in &mut records {
                reshape(record, old, def);
            }
        }
        for index in def.indexes.iter().filter(|i| i.unique) {
            check_unique_among(&records, index)?;
        }

        self.records.insert(def.name.clone(), records);
        self.collections.insert(def.name.clone(), def.clone());
        Ok(())
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        self.collection(name)?;
        self.collections.remove(name);
        self.records.remove(name);
        Ok(())
    }

    fn insert_record(&mut self, collection: &str, mut data: RecordData) -> Result<Record> {
        let def = self.collection(collection)?.clone();
        let id = take_id(&mut data)?.unwrap_or_else(new_record_id);
        let prepared = def.prepare_record(&data)?;

        let now = Utc::now();
        let record = Record {
            id,
            collection: collection.to_string(),
            data: prepared,
            created: now,
            updated: now,
        };

        let records = self.records.entry(collection.to_string()).or_default();
        if records.iter().any(|r| r.id == record.id) {
            return Err(Error::Constraint(format!(
                "record id `{}` already exists in `{collection}`",
                record.id
            )));
        }
        for index in def.indexes.iter().filter(|i| i.unique) {
            check_unique_against(records, &record, index)?;
        }
        records.push(record.clone());
        Ok(record)
    }

    fn update_record(&mut self, collection: &str, id: &str, patch: RecordData) -> Result<Record> {
        let def = self.collection(collection)?.clone();
        let records = self.records.entry(collection.to_string()).or_default();
        let pos = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("record `{id}` in `{collection}`")))?;

        let mut merged = records[pos].data.clone();
        merged.extend(patch);
        let mut updated = records[pos].clone();
        updated.data = def.prepare_record(&merged)?;
        updated.updated = Utc::now();

        for index in def.indexes.iter().filter(|i| i.unique) {
            check_unique_against(records, &updated, index)?;
        }
        records[pos] = updated.clone();
        Ok(updated)
    }

    fn delete_record(&mut self, collection: &str, id: &str) -> Result<()> {
        self.collection(collection)?;
        let records = self.records.entry(collection.to_string()).or_default();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(Error::NotFound(format!("record `{id}` in `{collection}`")));
        }
        Ok(())
    }

    fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        self.collection(collection)?;
        Ok(self
            .records
            .get(collection)
            .and_then(|rs| rs.iter().find(|r| r.id == id).cloned()))
    }

    fn list_records(&self, collection: &str) -> Result<Vec<Record>> {
        self.collection(collection)?;
        Ok(self.records.get(collection).cloned().unwrap_or_default())
    }
}

/// Pull an explicit `id` out of insert data.
pub(crate) fn take_id(data: &mut RecordData) -> Result<Option<String>> {
    match data.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if !id.is_empty() => Ok(Some(id)),
        Some(other) => Err(Error::Constraint(format!("invalid record id {other}"))),
    }
}

/// Adapt stored values to a changed definition: removed fields disappear,
/// added or retyped fields start out null.
fn reshape(record: &mut Record, old: &CollectionDef, new: &CollectionDef) {
    let mut data = RecordData::new();
    for field in &new.fields {
        let kept = old
            .field(&field.name)
            .filter(|o| o.kind.type_name() == field.kind.type_name())
            .filter(|o| o.kind.is_multi() == field.kind.is_multi())
            .and_then(|_| record.data.get(&field.name).cloned())
            .unwrap_or(Value::Null);
        data.insert(field.name.clone(), kept);
    }
    record.data = data;
}

fn index_key(record: &Record, index: &IndexDef) -> Option<Vec<Value>> {
    let key: Vec<Value> = index.columns.iter().map(|c| record.get(c)).collect();
    // NULLs never collide in a unique index.
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

fn check_unique_against(records: &[Record], candidate: &Record, index: &IndexDef) -> Result<()> {
    let Some(key) = index_key(candidate, index) else {
        return Ok(());
    };
    let clash = records
        .iter()
        .filter(|r| r.id != candidate.id)
        .any(|r| index_key(r, index).as_ref() == Some(&key));
    if clash {
        return Err(unique_violation(index));
    }
    Ok(())
}

fn check_unique_among(records: &[Record], index: &IndexDef) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if let Some(key) = index_key(record, index)
            && !seen.insert(serde_json::to_string(&key)?)
        {
            return Err(unique_violation(index));
        }
    }
    Ok(())
}

fn unique_violation(index: &IndexDef) -> Error {
    Error::Constraint(format!(
        "UNIQUE constraint failed: {} ({})",
        index.name,
        index.columns.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::record_data;
    use crate::schema::FieldDef;

    fn posts() -> CollectionDef {
        CollectionDef::base("posts")
            .with_field(FieldDef::text("slug", Some(1), None).required())
            .with_field(FieldDef::text("title", None, None))
            .with_index(IndexDef::unique("idx_posts_slug", &["slug"]))
    }

    #[test]
    fn uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().unwrap();
            tx.create_collection(&posts()).unwrap();
        }
        assert!(!store.contains_collection("posts"));
        assert_eq!(store.commit_count(), 0);
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let mut store = MemoryStore::new();
        store.create_collection(&posts()).unwrap();
        store
            .insert_record("posts", record_data(json!({"slug": "hello"})))
            .unwrap();

        let err = store
            .insert_record("posts", record_data(json!({"slug": "hello"})))
            .unwrap_err();
        assert!(err.is_constraint());
        assert_eq!(store.list_records("posts").unwrap().len(), 1);
    }

    #[test]
    fn index_names_are_store_wide() {
        let mut store = MemoryStore::new();
        store.create_collection(&posts()).unwrap();

        let other = CollectionDef::base("pages")
            .with_field(FieldDef::text("slug", None, None))
            .with_index(IndexDef::new("idx_posts_slug", &["slug"]));
        assert!(store.create_collection(&other).is_err());
    }

    #[test]
    fn creating_an_existing_collection_fails_and_keeps_records() {
        let mut store = MemoryStore::new();
        store.create_collection(&posts()).unwrap();
        store
            .insert_record("posts", record_data(json!({"slug": "kept", "title": "Kept"})))
            .unwrap();

        let clash =
            CollectionDef::base("posts").with_field(FieldDef::text("headline", None, None));
        assert!(store.create_collection(&clash).unwrap_err().is_constraint());

        assert_eq!(store.find_collection("posts").unwrap(), Some(posts()));
        let records = store.list_records("posts").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("title"), Some("Kept"));
    }

    #[test]
    fn updating_a_missing_collection_is_a_lookup_failure() {
        let mut store = MemoryStore::new();
        assert!(store.update_collection(&posts()).unwrap_err().is_not_found());
        assert!(!store.contains_collection("posts"));
    }

    #[test]
    fn removing_a_field_drops_its_values() {
        let mut store = MemoryStore::new();
        store.create_collection(&posts()).unwrap();
        let rec = store
            .insert_record("posts", record_data(json!({"slug": "a", "title": "A"})))
            .unwrap();

        let mut def = posts();
        def.remove_field("title");
        store.update_collection(&def).unwrap();

        let after = store.get_record("posts", &rec.id).unwrap().unwrap();
        assert!(after.data.get("title").is_none());
        assert_eq!(after.get_str("slug"), Some("a"));
    }

    #[test]
    fn update_merges_and_revalidates() {
        let mut store = MemoryStore::new();
        store.create_collection(&posts()).unwrap();
        let rec = store
            .insert_record("posts", record_data(json!({"slug": "a"})))
            .unwrap();

        let updated = store
            .update_record("posts", &rec.id, record_data(json!({"title": "Title"})))
            .unwrap();
        assert_eq!(updated.get_str("slug"), Some("a"));
        assert_eq!(updated.get_str("title"), Some("Title"));

        let err = store
            .update_record("posts", &rec.id, record_data(json!({"slug": ""})))
            .unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn missing_collection_and_record_are_lookup_failures() {
        let mut store = MemoryStore::new();
        assert!(store.delete_collection("posts").unwrap_err().is_not_found());
        assert!(store
            .insert_record("posts", RecordData::new())
            .unwrap_err()
            .is_not_found());

        store.create_collection(&posts()).unwrap();
        assert!(store.delete_record("posts", "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn explicit_ids_are_honoured_and_unique() {
        let mut store = MemoryStore::new();
        store.create_collection(&posts()).unwrap();
        let rec = store
            .insert_record("posts", record_data(json!({"id": "fixedid", "slug": "a"})))
            .unwrap();
        assert_eq!(rec.id, "fixedid");

        let err = store
            .insert_record("posts", record_data(json!({"id": "fixedid", "slug": "b"})))
            .unwrap_err();
        assert!(err.is_constraint());
    }
}
