pub mod catalog;
pub mod memory_store;
pub mod migrations;
pub mod query;
pub mod record;
pub mod schema;
pub mod sqlite_store;
pub mod store;
pub mod validation;

pub use catalog::hoa_migrations;
pub use memory_store::MemoryStore;
pub use migrations::{Migration, MigrationRecord, MigrationStatus, Migrator};
pub use query::{Page, RecordQuery};
pub use record::Record;
pub use schema::{AccessRules, CollectionDef, FieldDef, FieldKind, IndexDef};
pub use sqlite_store::SqliteStore;
pub use store::{MigrationLedger, SchemaStore, Store, Transaction};
