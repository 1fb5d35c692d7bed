use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use tracing::{debug, info, warn};
use trails_common::{Error, Result};

use crate::memory_store::take_id;
use crate::migrations::MigrationRecord;
use crate::record::{Record, RecordData, format_datetime, new_record_id, parse_datetime};
use crate::schema::{CollectionDef, FieldDef, FieldKind, IndexDef};
use crate::store::{MigrationLedger, SchemaStore, Store, Transaction};

/// SQLite-backed collection store.
///
/// Each collection is a table with `id`, `created`, `updated` and one column
/// per field. Definitions live as JSON in `_collections`, applied migrations
/// in `_migrations`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening collection store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _collections (
                name TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                definition TEXT NOT NULL,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::Database(format!("failed to create system tables: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("collection store lock poisoned".into()))
    }

    /// Run a write outside an explicit transaction atomically.
    fn write<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.begin()?;
        let out = op(&tx.conn)?;
        tx.commit()?;
        Ok(out)
    }
}

impl Store for SqliteStore {
    type Tx<'a> = SqliteTx<'a>;

    fn begin(&self) -> Result<SqliteTx<'_>> {
        let conn = self.connection()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        Ok(SqliteTx {
            conn,
            finished: false,
        })
    }

    fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        applied_migrations(&*self.connection()?)
    }
}

impl SchemaStore for SqliteStore {
    fn collections(&self) -> Result<Vec<CollectionDef>> {
        collections(&*self.connection()?)
    }

    fn find_collection(&self, name: &str) -> Result<Option<CollectionDef>> {
        find_collection(&*self.connection()?, name)
    }

    fn create_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        self.write(|conn| create_collection(conn, collection))
    }

    fn update_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        self.write(|conn| update_collection(conn, collection))
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        self.write(|conn| delete_collection(conn, name))
    }

    fn insert_record(&mut self, collection: &str, data: RecordData) -> Result<Record> {
        self.write(|conn| insert_record(conn, collection, data))
    }

    fn update_record(&mut self, collection: &str, id: &str, patch: RecordData) -> Result<Record> {
        self.write(|conn| update_record(conn, collection, id, patch))
    }

    fn delete_record(&mut self, collection: &str, id: &str) -> Result<()> {
        self.write(|conn| delete_record(conn, collection, id))
    }

    fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        get_record(&*self.connection()?, collection, id)
    }

    fn list_records(&self, collection: &str) -> Result<Vec<Record>> {
        list_records(&*self.connection()?, collection)
    }
}

/// An open `BEGIN IMMEDIATE` transaction holding the store's connection.
pub struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Transaction for SqliteTx<'_> {
    fn commit(mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))?;
        self.finished = true;
        debug!("transaction committed");
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("failed to roll back transaction: {e}");
            } else {
                debug!("transaction rolled back");
            }
        }
    }
}

impl MigrationLedger for SqliteTx<'_> {
    fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        applied_migrations(&self.conn)
    }

    fn record_applied(&mut self, record: &MigrationRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![
                    version_to_sql(record.version)?,
                    record.name,
                    format_datetime(&record.applied_at)
                ],
            )
            .map_err(db_err("failed to record migration"))?;
        Ok(())
    }

    fn remove_applied(&mut self, version: u64) -> Result<()> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM _migrations WHERE version = ?1",
                params![version_to_sql(version)?],
            )
            .map_err(db_err("failed to remove migration record"))?;
        if removed == 0 {
            return Err(Error::NotFound(format!(
                "ledger entry for migration {version}"
            )));
        }
        Ok(())
    }
}

impl SchemaStore for SqliteTx<'_> {
    fn collections(&self) -> Result<Vec<CollectionDef>> {
        collections(&self.conn)
    }

    fn find_collection(&self, name: &str) -> Result<Option<CollectionDef>> {
        find_collection(&self.conn, name)
    }

    fn create_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        create_collection(&self.conn, collection)
    }

    fn update_collection(&mut self, collection: &CollectionDef) -> Result<()> {
        update_collection(&self.conn, collection)
    }

    fn delete_collection(&mut self, name: &str) -> Result<()> {
        delete_collection(&self.conn, name)
    }

    fn insert_record(&mut self, collection: &str, data: RecordData) -> Result<Record> {
        insert_record(&self.conn, collection, data)
    }

    fn update_record(&mut self, collection: &str, id: &str, patch: RecordData) -> Result<Record> {
        update_record(&self.conn, collection, id, patch)
    }

    fn delete_record(&mut self, collection: &str, id: &str) -> Result<()> {
        delete_record(&self.conn, collection, id)
    }

    fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        get_record(&self.conn, collection, id)
    }

    fn list_records(&self, collection: &str) -> Result<Vec<Record>> {
        list_records(&self.conn, collection)
    }
}

/// Map a rusqlite error, keeping constraint failures distinguishable.
fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ffi::ErrorCode::ConstraintViolation =>
        {
            Error::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => Error::Database(format!("{context}: {e}")),
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn version_to_sql(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| Error::Database(format!("migration version {version} out of range")))
}

fn applied_migrations(conn: &Connection) -> Result<Vec<MigrationRecord>> {
    let mut stmt = conn
        .prepare("SELECT version, name, applied_at FROM _migrations ORDER BY version ASC")
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(MigrationRecord {
                version: row.get::<_, i64>(0)? as u64,
                name: row.get(1)?,
                applied_at: parse_datetime(&row.get::<_, String>(2)?).unwrap_or_else(Utc::now),
            })
        })
        .map_err(|e| Error::Database(format!("failed to query migrations: {e}")))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(
            row.map_err(|e| Error::Database(format!("failed to read migration row: {e}")))?,
        );
    }
    Ok(records)
}

fn collections(conn: &Connection) -> Result<Vec<CollectionDef>> {
    let mut stmt = conn
        .prepare("SELECT definition FROM _collections ORDER BY name ASC")
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Database(format!("failed to query collections: {e}")))?;

    let mut out = Vec::new();
    for row in rows {
        let json =
            row.map_err(|e| Error::Database(format!("failed to read collection row: {e}")))?;
        out.push(serde_json::from_str(&json)?);
    }
    Ok(out)
}

fn find_collection(conn: &Connection, name: &str) -> Result<Option<CollectionDef>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT definition FROM _collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load collection `{name}`: {e}")))?;

    json.map(|j| serde_json::from_str(&j).map_err(Error::from))
        .transpose()
}

fn get_collection(conn: &Connection, name: &str) -> Result<CollectionDef> {
    find_collection(conn, name)?.ok_or_else(|| Error::NotFound(format!("collection `{name}`")))
}

fn column_def(field: &FieldDef) -> String {
    format!("{} {}", quote(&field.name), field.kind.column_type())
}

fn create_index(conn: &Connection, table: &str, index: &IndexDef) -> Result<()> {
    let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
    let sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote(&index.name),
        quote(table),
        columns.join(", ")
    );
    conn.execute_batch(&sql)
        .map_err(db_err("failed to create index"))
}

/// Same storage shape: same type and single/multi layout.
fn same_storage(a: &FieldKind, b: &FieldKind) -> bool {
    a.type_name() == b.type_name() && a.is_multi() == b.is_multi()
}

fn create_collection(conn: &Connection, def: &CollectionDef) -> Result<()> {
    def.validate()?;
    if find_collection(conn, &def.name)?.is_some() {
        return Err(Error::Constraint(format!(
            "collection `{}` already exists",
            def.name
        )));
    }

    let mut columns = vec![
        "\"id\" TEXT PRIMARY KEY NOT NULL".to_string(),
        "\"created\" TEXT NOT NULL".to_string(),
        "\"updated\" TEXT NOT NULL".to_string(),
    ];
    columns.extend(def.fields.iter().map(column_def));
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote(&def.name),
        columns.join(", ")
    ))
    .map_err(db_err("failed to create collection table"))?;

    for index in &def.indexes {
        create_index(conn, &def.name, index)?;
    }

    let now = format_datetime(&Utc::now());
    conn.execute(
        "INSERT INTO _collections (name, type, definition, created, updated)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![def.name, def.kind.as_str(), serde_json::to_string(def)?, now],
    )
    .map_err(db_err("failed to store collection definition"))?;
    info!("created collection `{}`", def.name);
    Ok(())
}

fn update_collection(conn: &Connection, def: &CollectionDef) -> Result<()> {
    def.validate()?;
    let old = get_collection(conn, &def.name)?;
    let table = quote(&def.name);

    for index in &old.indexes {
        conn.execute_batch(&format!("DROP INDEX IF EXISTS {}", quote(&index.name)))
            .map_err(db_err("failed to drop index"))?;
    }

    for field in &old.fields {
        let keep = def
            .field(&field.name)
            .is_some_and(|f| same_storage(&f.kind, &field.kind));
        if !keep {
            conn.execute_batch(&format!(
                "ALTER TABLE {table} DROP COLUMN {}",
                quote(&field.name)
            ))
            .map_err(db_err("failed to drop column"))?;
        }
    }

    for field in &def.fields {
        let existing = old
            .field(&field.name)
            .is_some_and(|f| same_storage(&f.kind, &field.kind));
        if !existing {
            conn.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {}",
                column_def(field)
            ))
            .map_err(db_err("failed to add column"))?;
        }
    }

    for index in &def.indexes {
        create_index(conn, &def.name, index)?;
    }

    conn.execute(
        "UPDATE _collections SET type = ?2, definition = ?3, updated = ?4 WHERE name = ?1",
        params![
            def.name,
            def.kind.as_str(),
            serde_json::to_string(def)?,
            format_datetime(&Utc::now())
        ],
    )
    .map_err(db_err("failed to update collection definition"))?;
    info!("updated collection `{}`", def.name);
    Ok(())
}

fn delete_collection(conn: &Connection, name: &str) -> Result<()> {
    get_collection(conn, name)?;
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(name)))
        .map_err(db_err("failed to drop collection table"))?;
    conn.execute("DELETE FROM _collections WHERE name = ?1", params![name])
        .map_err(db_err("failed to delete collection definition"))?;
    info!("deleted collection `{name}`");
    Ok(())
}

fn to_sql(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(serde_json::to_string(value)?),
    })
}

/// `Json` fields are always stored serialized, so a string stays a string.
fn field_to_sql(field: &FieldDef, value: &Value) -> Result<SqlValue> {
    match (&field.kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (FieldKind::Json, v) => Ok(SqlValue::Text(serde_json::to_string(v)?)),
        (_, v) => to_sql(v),
    }
}

fn from_sql(field: &FieldDef, value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match field.kind {
            FieldKind::Bool => Value::Bool(i != 0),
            _ => Value::from(i),
        },
        ValueRef::Real(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Value::from(f as i64)
            } else {
                Value::from(f)
            }
        }
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if field.kind.is_multi() || matches!(field.kind, FieldKind::Json) {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            } else {
                Value::String(text)
            }
        }
        ValueRef::Blob(_) => Value::Null,
    }
}

fn select_sql(def: &CollectionDef) -> String {
    let mut columns = vec!["\"id\"".to_string(), "\"created\"".into(), "\"updated\"".into()];
    columns.extend(def.fields.iter().map(|f| quote(&f.name)));
    format!("SELECT {} FROM {}", columns.join(", "), quote(&def.name))
}

fn read_row(row: &rusqlite::Row<'_>, def: &CollectionDef) -> rusqlite::Result<Record> {
    let created: String = row.get(1)?;
    let updated: String = row.get(2)?;
    let mut data = RecordData::new();
    for (i, field) in def.fields.iter().enumerate() {
        data.insert(field.name.clone(), from_sql(field, row.get_ref(i + 3)?));
    }
    Ok(Record {
        id: row.get(0)?,
        collection: def.name.clone(),
        data,
        created: parse_datetime(&created).unwrap_or_else(Utc::now),
        updated: parse_datetime(&updated).unwrap_or_else(Utc::now),
    })
}

fn get_record(conn: &Connection, collection: &str, id: &str) -> Result<Option<Record>> {
    let def = get_collection(conn, collection)?;
    conn.query_row(
        &format!("{} WHERE \"id\" = ?1", select_sql(&def)),
        params![id],
        |row| read_row(row, &def),
    )
    .optional()
    .map_err(|e| Error::Database(format!("failed to load record: {e}")))
}

fn list_records(conn: &Connection, collection: &str) -> Result<Vec<Record>> {
    let def = get_collection(conn, collection)?;
    let mut stmt = conn
        .prepare(&format!("{} ORDER BY rowid ASC", select_sql(&def)))
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
    let rows = stmt
        .query_map([], |row| read_row(row, &def))
        .map_err(|e| Error::Database(format!("failed to query records: {e}")))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(|e| Error::Database(format!("failed to read record row: {e}")))?);
    }
    Ok(records)
}

fn insert_record(conn: &Connection, collection: &str, mut data: RecordData) -> Result<Record> {
    let def = get_collection(conn, collection)?;
    let id = take_id(&mut data)?.unwrap_or_else(new_record_id);
    let prepared = def.prepare_record(&data)?;
    let now = Utc::now();
    let stamp = format_datetime(&now);

    let mut columns = vec!["\"id\"".to_string(), "\"created\"".into(), "\"updated\"".into()];
    let mut values = vec![
        SqlValue::Text(id.clone()),
        SqlValue::Text(stamp.clone()),
        SqlValue::Text(stamp),
    ];
    for field in &def.fields {
        columns.push(quote(&field.name));
        values.push(field_to_sql(field, &prepared[&field.name])?);
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();

    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(collection),
            columns.join(", "),
            placeholders.join(", ")
        ),
        params_from_iter(values),
    )
    .map_err(db_err("failed to insert record"))?;

    debug!("inserted record {id} into `{collection}`");
    Ok(Record {
        id,
        collection: collection.to_string(),
        data: prepared,
        created: now,
        updated: now,
    })
}

fn update_record(
    conn: &Connection,
    collection: &str,
    id: &str,
    patch: RecordData,
) -> Result<Record> {
    let def = get_collection(conn, collection)?;
    let existing = get_record(conn, collection, id)?
        .ok_or_else(|| Error::NotFound(format!("record `{id}` in `{collection}`")))?;

    let mut merged = existing.data.clone();
    merged.extend(patch);
    let prepared = def.prepare_record(&merged)?;
    let now = Utc::now();

    let mut assignments = vec!["\"updated\" = ?1".to_string()];
    let mut values = vec![SqlValue::Text(format_datetime(&now))];
    for field in &def.fields {
        values.push(field_to_sql(field, &prepared[&field.name])?);
        assignments.push(format!("{} = ?{}", quote(&field.name), values.len()));
    }
    values.push(SqlValue::Text(id.to_string()));

    conn.execute(
        &format!(
            "UPDATE {} SET {} WHERE \"id\" = ?{}",
            quote(collection),
            assignments.join(", "),
            values.len()
        ),
        params_from_iter(values),
    )
    .map_err(db_err("failed to update record"))?;

    Ok(Record {
        data: prepared,
        updated: now,
        ..existing
    })
}

fn delete_record(conn: &Connection, collection: &str, id: &str) -> Result<()> {
    get_collection(conn, collection)?;
    let removed = conn
        .execute(
            &format!("DELETE FROM {} WHERE \"id\" = ?1", quote(collection)),
            params![id],
        )
        .map_err(db_err("failed to delete record"))?;
    if removed == 0 {
        return Err(Error::NotFound(format!("record `{id}` in `{collection}`")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::record_data;
    use crate::schema::{AccessRules, NumberOptions, SelectOptions};

    fn posts() -> CollectionDef {
        CollectionDef::base("posts")
            .with_field(FieldDef::text("slug", Some(1), None).required())
            .with_field(FieldDef::text("title", None, None))
            .with_field(FieldDef::new("featured", FieldKind::Bool))
            .with_field(FieldDef::new(
                "order",
                FieldKind::Number(NumberOptions::default()),
            ))
            .with_field(FieldDef::new(
                "tags",
                FieldKind::Select(SelectOptions {
                    max_select: 3,
                    values: vec!["news".into(), "events".into()],
                }),
            ))
            .with_index(IndexDef::unique("idx_posts_slug", &["slug"]))
            .with_index(IndexDef::new("idx_posts_order", &["order"]))
            .with_rules(AccessRules::public_read())
    }

    #[test]
    fn definitions_round_trip_through_catalog_table() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();

        assert_eq!(store.find_collection("posts").unwrap(), Some(posts()));
        assert_eq!(store.collections().unwrap().len(), 1);
        assert!(store.find_collection("missing").unwrap().is_none());
    }

    #[test]
    fn values_keep_their_json_types() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();
        let rec = store
            .insert_record(
                "posts",
                record_data(json!({
                    "slug": "hello",
                    "featured": true,
                    "order": 2,
                    "tags": ["news", "events"]
                })),
            )
            .unwrap();

        let loaded = store.get_record("posts", &rec.id).unwrap().unwrap();
        assert_eq!(loaded.get("featured"), json!(true));
        assert_eq!(loaded.get("order"), json!(2));
        assert_eq!(loaded.get("tags"), json!(["news", "events"]));
        assert_eq!(loaded.get("title"), Value::Null);
        assert_eq!(loaded.data, rec.data);
    }

    #[test]
    fn reserved_word_columns_are_quoted() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();
        store
            .insert_record("posts", record_data(json!({"slug": "a", "order": 1})))
            .unwrap();
        assert_eq!(store.list_records("posts").unwrap().len(), 1);
    }

    #[test]
    fn unique_index_violation_is_a_constraint_error() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();
        store
            .insert_record("posts", record_data(json!({"slug": "same"})))
            .unwrap();
        let err = store
            .insert_record("posts", record_data(json!({"slug": "same"})))
            .unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
    }

    #[test]
    fn altering_adds_and_drops_columns() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();
        let rec = store
            .insert_record("posts", record_data(json!({"slug": "a", "title": "A"})))
            .unwrap();

        let mut def = posts();
        def.remove_field("title");
        def.fields.push(FieldDef::text("summary", None, Some(10)));
        store.update_collection(&def).unwrap();

        let loaded = store.get_record("posts", &rec.id).unwrap().unwrap();
        assert!(loaded.data.get("title").is_none());
        assert_eq!(loaded.get("summary"), Value::Null);
        assert_eq!(loaded.get_str("slug"), Some("a"));
    }

    #[test]
    fn dropped_index_frees_its_name() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();

        let mut def = posts();
        def.remove_index("idx_posts_order");
        store.update_collection(&def).unwrap();

        let other = CollectionDef::base("pages")
            .with_field(FieldDef::new("order", FieldKind::Number(NumberOptions::default())))
            .with_index(IndexDef::new("idx_posts_order", &["order"]));
        store.create_collection(&other).unwrap();
    }

    #[test]
    fn rolled_back_transaction_leaves_no_trace() {
        let store = SqliteStore::in_memory().unwrap();
        {
            let mut tx = store.begin().unwrap();
            tx.create_collection(&posts()).unwrap();
            tx.record_applied(&MigrationRecord {
                version: 1,
                name: "posts".into(),
                applied_at: Utc::now(),
            })
            .unwrap();
        }
        assert!(store.find_collection("posts").unwrap().is_none());
        assert!(Store::applied_migrations(&store).unwrap().is_empty());
    }

    #[test]
    fn committed_ledger_entries_are_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        for version in [30, 10, 20] {
            tx.record_applied(&MigrationRecord {
                version,
                name: format!("m{version}"),
                applied_at: Utc::now(),
            })
            .unwrap();
        }
        tx.commit().unwrap();

        let versions: Vec<u64> = Store::applied_migrations(&store)
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![10, 20, 30]);
    }

    #[test]
    fn creating_an_existing_collection_fails_and_keeps_records() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();
        store
            .insert_record("posts", record_data(json!({"slug": "kept", "title": "Kept"})))
            .unwrap();

        let clash =
            CollectionDef::base("posts").with_field(FieldDef::text("headline", None, None));
        let err = store.create_collection(&clash).unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");

        assert_eq!(store.find_collection("posts").unwrap(), Some(posts()));
        let records = store.list_records("posts").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_str("title"), Some("Kept"));
    }

    #[test]
    fn updating_a_missing_collection_is_a_lookup_failure() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert!(store.update_collection(&posts()).unwrap_err().is_not_found());
        assert!(store.find_collection("posts").unwrap().is_none());
    }

    #[test]
    fn delete_collection_drops_table_and_definition() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.create_collection(&posts()).unwrap();
        store.delete_collection("posts").unwrap();
        assert!(store.find_collection("posts").unwrap().is_none());
        assert!(store.list_records("posts").unwrap_err().is_not_found());
        assert!(store.delete_collection("posts").unwrap_err().is_not_found());
    }
}
