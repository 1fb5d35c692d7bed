//! Board member profiles shown on the "about" page.

use trails_common::Result;

use super::BOARD_MEMBERS;
use crate::migrations::drop_collection_if_exists;
use crate::schema::{
    AccessRules, CollectionDef, EmailOptions, FieldDef, FieldKind, FileOptions, IndexDef,
    NumberOptions,
};
use crate::store::SchemaStore;

pub fn board_members_collection() -> CollectionDef {
    CollectionDef::base(BOARD_MEMBERS)
        .with_field(FieldDef::text("firstname", Some(1), Some(100)).required())
        .with_field(FieldDef::text("lastname", Some(1), Some(100)).required())
        .with_field(FieldDef::new("email", FieldKind::Email(EmailOptions::default())).required())
        .with_field(FieldDef::new(
            "headshot",
            FieldKind::File(FileOptions {
                max_select: 1,
                max_size: 5 * 1024 * 1024,
                mime_types: ["image/jpeg", "image/png", "image/webp"]
                    .map(String::from)
                    .to_vec(),
            }),
        ))
        .with_field(FieldDef::text("pronouns", None, Some(50)))
        .with_field(FieldDef::text("position", None, Some(100)))
        .with_field(FieldDef::text("bio", None, Some(1000)))
        .with_field(FieldDef::new(
            "order",
            FieldKind::Number(NumberOptions {
                min: Some(0.0),
                ..Default::default()
            }),
        ))
        .with_index(IndexDef::new("idx_order", &["order"]))
        .with_rules(AccessRules::public_read())
}

pub fn up(store: &mut dyn SchemaStore) -> Result<()> {
    store.create_collection(&board_members_collection())
}

pub fn down(store: &mut dyn SchemaStore) -> Result<()> {
    drop_collection_if_exists(store, BOARD_MEMBERS)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::record::record_data;

    #[test]
    fn definition_is_valid() {
        board_members_collection().validate().unwrap();
    }

    #[test]
    fn order_cannot_be_negative() {
        let mut store = MemoryStore::new();
        up(&mut store).unwrap();
        let member = |order: i64| {
            record_data(json!({
                "firstname": "Dana",
                "lastname": "Reyes",
                "email": "dana@example.com",
                "order": order,
            }))
        };
        store.insert_record(BOARD_MEMBERS, member(1)).unwrap();
        assert!(store
            .insert_record(BOARD_MEMBERS, member(-1))
            .unwrap_err()
            .is_constraint());
    }

    #[test]
    fn email_starts_out_required() {
        let mut store = MemoryStore::new();
        up(&mut store).unwrap();
        let err = store
            .insert_record(
                BOARD_MEMBERS,
                record_data(json!({"firstname": "Sam", "lastname": "Okafor"})),
            )
            .unwrap_err();
        assert!(err.is_constraint());
    }
}
