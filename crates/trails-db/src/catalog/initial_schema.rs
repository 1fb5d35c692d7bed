//! Announcements and documents.

use trails_common::Result;

use super::{ANNOUNCEMENTS, DOCUMENTS};
use crate::migrations::drop_collection_if_exists;
use crate::schema::{
    AccessRules, CollectionDef, DateOptions, EditorOptions, FieldDef, FieldKind, FileOptions,
    IndexDef, NumberOptions, SelectOptions, TextOptions,
};
use crate::store::SchemaStore;

const SLUG_PATTERN: &str = r"^[a-z0-9]+(?:-[a-z0-9]+)*$";

pub const DOCUMENT_CATEGORIES: [&str; 4] = [
    "Meeting Minutes",
    "Bylaws",
    "Financial Reports",
    "Architectural Guidelines",
];

pub fn announcements_collection() -> CollectionDef {
    CollectionDef::base(ANNOUNCEMENTS)
        .with_field(FieldDef::text("title", Some(1), Some(200)).required())
        .with_field(
            FieldDef::new(
                "slug",
                FieldKind::Text(TextOptions {
                    min: Some(1),
                    max: Some(200),
                    pattern: Some(SLUG_PATTERN.to_string()),
                }),
            )
            .required(),
        )
        .with_field(
            FieldDef::new(
                "content",
                FieldKind::Editor(EditorOptions { convert_urls: true }),
            )
            .required(),
        )
        .with_field(
            FieldDef::new("published_date", FieldKind::Date(DateOptions::default())).required(),
        )
        .with_field(FieldDef::new("featured", FieldKind::Bool))
        .with_index(IndexDef::unique("idx_unique_slug", &["slug"]))
        .with_rules(AccessRules::public_read())
}

pub fn documents_collection() -> CollectionDef {
    CollectionDef::base(DOCUMENTS)
        .with_field(FieldDef::text("title", Some(1), Some(200)).required())
        .with_field(
            FieldDef::new(
                "category",
                FieldKind::Select(SelectOptions {
                    max_select: 1,
                    values: DOCUMENT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
                }),
            )
            .required(),
        )
        .with_field(
            FieldDef::new(
                "year",
                FieldKind::Number(NumberOptions {
                    min: Some(2000.0),
                    max: Some(2100.0),
                    no_decimal: false,
                }),
            )
            .required(),
        )
        .with_field(
            FieldDef::new(
                "file",
                FieldKind::File(FileOptions {
                    max_select: 1,
                    max_size: 10 * 1024 * 1024,
                    mime_types: vec!["application/pdf".to_string()],
                }),
            )
            .required(),
        )
        .with_field(FieldDef::text("description", None, Some(500)))
        .with_index(IndexDef::new("idx_category", &["category"]))
        .with_index(IndexDef::new("idx_year", &["year"]))
        .with_rules(AccessRules::public_read())
}

pub fn up(store: &mut dyn SchemaStore) -> Result<()> {
    store.create_collection(&announcements_collection())?;
    store.create_collection(&documents_collection())
}

pub fn down(store: &mut dyn SchemaStore) -> Result<()> {
    drop_collection_if_exists(store, ANNOUNCEMENTS)?;
    drop_collection_if_exists(store, DOCUMENTS)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::record::record_data;

    #[test]
    fn definitions_are_valid() {
        announcements_collection().validate().unwrap();
        documents_collection().validate().unwrap();
    }

    #[test]
    fn slug_pattern_rejects_uppercase_and_spaces() {
        let mut store = MemoryStore::new();
        up(&mut store).unwrap();
        for slug in ["Hello", "two words", "trailing-", "-leading"] {
            let err = store
                .insert_record(
                    ANNOUNCEMENTS,
                    record_data(json!({
                        "title": "t",
                        "slug": slug,
                        "content": "<p>x</p>",
                        "published_date": "2024-01-01 00:00:00.000Z",
                    })),
                )
                .unwrap_err();
            assert!(err.is_constraint(), "slug `{slug}` accepted");
        }
    }

    #[test]
    fn documents_need_a_pdf_in_a_known_category() {
        let mut store = MemoryStore::new();
        up(&mut store).unwrap();
        let doc = |category: &str, file: &str| {
            record_data(json!({
                "title": "Minutes",
                "category": category,
                "year": 2024,
                "file": file,
            }))
        };
        store
            .insert_record(DOCUMENTS, doc("Meeting Minutes", "minutes.pdf"))
            .unwrap();
        assert!(store
            .insert_record(DOCUMENTS, doc("Gossip", "minutes.pdf"))
            .unwrap_err()
            .is_constraint());
        assert!(store
            .insert_record(DOCUMENTS, doc("Bylaws", "bylaws.docx"))
            .unwrap_err()
            .is_constraint());
    }
}
