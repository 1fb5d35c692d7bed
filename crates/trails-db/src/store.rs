//! Storage interfaces the migration runner and the record API depend on.

use serde_json::Value;
use trails_common::{Error, Result};

use crate::migrations::MigrationRecord;
use crate::record::{Record, RecordData};
use crate::schema::CollectionDef;

/// Collection and record operations.
pub trait SchemaStore {
    fn collections(&self) -> Result<Vec<CollectionDef>>;

    fn find_collection(&self, name: &str) -> Result<Option<CollectionDef>>;

    /// Create a new collection. An existing collection of the same name is a
    /// constraint violation and stays untouched.
    fn create_collection(&mut self, collection: &CollectionDef) -> Result<()>;

    /// Replace the definition of an existing collection, reshaping stored
    /// records to match. A missing collection is a lookup failure.
    fn update_collection(&mut self, collection: &CollectionDef) -> Result<()>;

    /// Drop a collection with all its records. Missing collections are a
    /// lookup failure.
    fn delete_collection(&mut self, name: &str) -> Result<()>;

    /// Validate and insert. An `id` key in `data` picks the record id.
    fn insert_record(&mut self, collection: &str, data: RecordData) -> Result<Record>;

    /// Merge `patch` into an existing record and validate the result.
    fn update_record(&mut self, collection: &str, id: &str, patch: RecordData) -> Result<Record>;

    fn delete_record(&mut self, collection: &str, id: &str) -> Result<()>;

    fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>>;

    /// All records in insertion order.
    fn list_records(&self, collection: &str) -> Result<Vec<Record>>;

    fn get_collection(&self, name: &str) -> Result<CollectionDef> {
        self.find_collection(name)?
            .ok_or_else(|| Error::NotFound(format!("collection `{name}`")))
    }

    fn find_records_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>> {
        Ok(self
            .list_records(collection)?
            .into_iter()
            .filter(|r| &r.get(field) == value)
            .collect())
    }
}

/// Persisted record of applied migrations.
pub trait MigrationLedger {
    /// Applied migrations, ascending by version.
    fn applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    fn record_applied(&mut self, record: &MigrationRecord) -> Result<()>;

    fn remove_applied(&mut self, version: u64) -> Result<()>;
}

/// An atomic unit of work. Dropping it without `commit` rolls it back.
pub trait Transaction: SchemaStore + MigrationLedger {
    fn commit(self) -> Result<()>;
}

/// A store able to open transactions.
pub trait Store {
    type Tx<'a>: Transaction
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::Tx<'_>>;

    fn applied_migrations(&self) -> Result<Vec<MigrationRecord>>;
}
